//! Local operation outbox with type-keyed handler dispatch.
//!
//! Deferred writes are queued as [`op::Operation`]s, buffered in memory until
//! storage is ready, persisted through an [`persist::OperationRepository`]
//! and replayed oldest-first against the handler registered for their kind.
//! Successful operations are deleted; failed ones are kept and flagged.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use opsync::{
//!     core::clock::SystemClock,
//!     dispatch::{registry::HandlerRegistry, router::HandlerDispatcher, traits::OperationHandler},
//!     op::{Operation, OperationKind},
//!     persist::memory::MemoryRepository,
//!     result::CallResult,
//!     runtime::handle::{SyncConfig, spawn_operation_sync},
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct PostComment {
//!     text: String,
//! }
//!
//! impl OperationKind for PostComment {
//!     const KIND: &'static str = "post_comment";
//! }
//!
//! struct PostCommentHandler;
//!
//! #[async_trait]
//! impl OperationHandler<PostComment> for PostCommentHandler {
//!     async fn handle_operation(
//!         &self,
//!         _operation: &Operation,
//!         payload: PostComment,
//!     ) -> anyhow::Result<CallResult> {
//!         assert_eq!(payload.text, "hello");
//!         Ok(CallResult::success())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = HandlerRegistry::new().with::<PostComment, _>(PostCommentHandler);
//! let dispatcher = HandlerDispatcher::new(Arc::new(registry));
//! let config = SyncConfig { sweep_on_add: false, ..SyncConfig::default() };
//! let sync = spawn_operation_sync(
//!     Arc::new(MemoryRepository::new()),
//!     Arc::new(dispatcher),
//!     Arc::new(SystemClock),
//!     config,
//! );
//!
//! // Buffered until the store is ready.
//! sync.add_operation::<PostComment, _>(|op| op.text = "hello".to_string())
//!     .await
//!     .expect("add");
//! sync.initialize().await.expect("init");
//!
//! let result = sync.handle_pending_operations().await.expect("sweep");
//! assert!(result.successful());
//! assert!(sync.get_all_operations().await.expect("all").is_empty());
//! # }
//! ```
#![warn(missing_docs)]

/// Queue service and time source.
pub mod core;
/// Handler contracts, registry and dispatchers.
pub mod dispatch;
/// Opt-in logging setup.
pub mod logging;
/// Operation model and persistence envelope.
pub mod op;
/// Repository contract and implementations.
pub mod persist;
/// Uniform call outcome model.
pub mod result;
/// Event bus, processing service and spawned handle.
pub mod runtime;
/// Shared identifiers and timestamps.
pub mod types;
