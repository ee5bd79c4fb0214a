use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::op::Operation;

use super::traits::{DispatchError, Dispatched, OperationDispatcher};

/// Tries delegate dispatchers in registration order; first claim wins.
///
/// A delegate answering [`Dispatched::Unsupported`] passes the operation on.
/// A delegate that claims the operation and then fails ends the search with
/// that failure. When nobody claims it the chain itself answers
/// `Unsupported`, so chains nest.
#[derive(Default, Clone)]
pub struct ChainDispatcher {
    delegates: Vec<Arc<dyn OperationDispatcher>>,
}

impl ChainDispatcher {
    /// Creates a chain over `delegates`, keeping their order.
    pub fn new<I>(delegates: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn OperationDispatcher>>,
    {
        Self {
            delegates: delegates.into_iter().collect(),
        }
    }

    /// Appends a delegate after the existing ones.
    pub fn push(&mut self, delegate: Arc<dyn OperationDispatcher>) {
        self.delegates.push(delegate);
    }

    /// Number of delegates.
    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    /// True when the chain has no delegates.
    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

#[async_trait]
impl OperationDispatcher for ChainDispatcher {
    async fn dispatch(&self, operation: &Operation) -> Result<Dispatched, DispatchError> {
        for (index, delegate) in self.delegates.iter().enumerate() {
            match delegate.dispatch(operation).await? {
                Dispatched::Unsupported => {
                    trace!(kind = %operation.kind, delegate = index, "delegate passed");
                }
                handled => return Ok(handled),
            }
        }
        Ok(Dispatched::Unsupported)
    }
}
