use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    op::{Operation, OperationKind, PayloadError},
    result::CallResult,
};

/// Executes the side effect of one concrete operation subtype.
///
/// Returning `Err` is a thrown failure; a recognized failure should be an
/// `Ok` result with Error status.
#[async_trait]
pub trait OperationHandler<T: OperationKind>: Send + Sync + 'static {
    /// Handles one operation whose payload was decoded as `T`.
    async fn handle_operation(&self, operation: &Operation, payload: T)
    -> anyhow::Result<CallResult>;
}

/// Type-erased handler, keyed by operation kind.
#[async_trait]
pub trait ErasedOperationHandler: Send + Sync {
    /// Kind this handler accepts.
    fn kind(&self) -> &'static str;
    /// Decodes the payload and runs the typed handler.
    async fn handle(&self, operation: &Operation) -> Result<CallResult, DispatchError>;
}

/// Looks up the handler registered for an operation kind.
pub trait HandlerResolver: Send + Sync {
    /// Handler for `kind`, if any.
    fn resolve(&self, kind: &str) -> Option<Arc<dyn ErasedOperationHandler>>;
}

/// Outcome of offering an operation to one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// The dispatcher claimed the operation and its handler returned this.
    Handled(CallResult),
    /// The dispatcher does not know this kind; try the next one.
    Unsupported,
}

/// Failures raised while dispatching an operation.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No dispatcher recognized the kind.
    #[error("operation type '{kind}' is not supported")]
    UnsupportedOperation {
        /// Kind of the rejected operation.
        kind: String,
    },
    /// The kind is routed but nothing is registered for it.
    #[error("could not resolve handler for operation of type '{kind}'")]
    HandlerNotFound {
        /// Kind of the operation.
        kind: String,
    },
    /// The payload does not decode as the routed subtype.
    #[error(transparent)]
    Payload(#[from] PayloadError),
    /// The handler itself failed.
    #[error("handler for operation type '{kind}' failed")]
    Handler {
        /// Kind of the operation.
        kind: String,
        /// Failure raised by the handler.
        #[source]
        source: anyhow::Error,
    },
}

/// Routes an operation to its handler.
#[async_trait]
pub trait OperationDispatcher: Send + Sync {
    /// Offers `operation`, signalling [`Dispatched::Unsupported`] for unknown kinds.
    async fn dispatch(&self, operation: &Operation) -> Result<Dispatched, DispatchError>;

    /// Dispatches `operation`, treating an unknown kind as an error.
    async fn handle_operation(&self, operation: &Operation) -> Result<CallResult, DispatchError> {
        match self.dispatch(operation).await? {
            Dispatched::Handled(result) => Ok(result),
            Dispatched::Unsupported => Err(DispatchError::UnsupportedOperation {
                kind: operation.kind.clone(),
            }),
        }
    }
}
