/// In-process repository.
pub mod memory;
/// SQLite-backed repository.
pub mod sqlite;

use async_trait::async_trait;

use crate::{op::Operation, types::OperationId};

/// Failures raised by an [`OperationRepository`].
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// SQLite failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Envelope (de)serialization failure.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Anything else, e.g. a blocking task that could not be joined.
    #[error("{0}")]
    Message(String),
}

/// Result alias for repository calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// Durable keyed storage for operations.
///
/// No ordering is promised by `get_all`; writes are last-write-wins per id.
#[async_trait]
pub trait OperationRepository: Send + Sync {
    /// Reads every stored operation.
    async fn get_all(&self) -> PersistResult<Vec<Operation>>;
    /// Inserts or replaces the operation stored under `operation.id`.
    async fn upsert_item(&self, operation: &Operation) -> PersistResult<()>;
    /// Removes the operation stored under `id`. Missing ids are not an error.
    async fn delete_item(&self, id: &OperationId) -> PersistResult<()>;
}
