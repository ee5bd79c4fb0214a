use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashSet;
use tracing::trace;

use crate::op::{Operation, OperationKind};

use super::traits::{DispatchError, Dispatched, HandlerResolver, OperationDispatcher};

enum Routes {
    All,
    Only(HashSet<&'static str>),
}

/// Dispatcher backed by a single [`HandlerResolver`].
///
/// Built with [`HandlerDispatcher::new`] it claims every operation, so a kind
/// without a handler fails with [`DispatchError::HandlerNotFound`]. Built
/// with [`HandlerDispatcher::for_kinds`] it only claims the kinds added with
/// [`HandlerDispatcher::route`] and reports every other kind as unsupported,
/// which lets it sit inside a [`super::chain::ChainDispatcher`].
pub struct HandlerDispatcher {
    resolver: Arc<dyn HandlerResolver>,
    routes: Routes,
}

impl HandlerDispatcher {
    /// Claims every operation.
    pub fn new(resolver: Arc<dyn HandlerResolver>) -> Self {
        Self {
            resolver,
            routes: Routes::All,
        }
    }

    /// Claims only the kinds added with [`HandlerDispatcher::route`].
    pub fn for_kinds(resolver: Arc<dyn HandlerResolver>) -> Self {
        Self {
            resolver,
            routes: Routes::Only(HashSet::new()),
        }
    }

    /// Adds subtype `T` to the claimed kinds. No effect on a claim-all dispatcher.
    pub fn route<T: OperationKind>(mut self) -> Self {
        if let Routes::Only(kinds) = &mut self.routes {
            kinds.insert(T::KIND);
        }
        self
    }

    /// True when this dispatcher claims `kind`.
    pub fn recognizes(&self, kind: &str) -> bool {
        match &self.routes {
            Routes::All => true,
            Routes::Only(kinds) => kinds.contains(kind),
        }
    }
}

#[async_trait]
impl OperationDispatcher for HandlerDispatcher {
    async fn dispatch(&self, operation: &Operation) -> Result<Dispatched, DispatchError> {
        if !self.recognizes(&operation.kind) {
            trace!(kind = %operation.kind, "kind not routed here");
            return Ok(Dispatched::Unsupported);
        }

        let handler =
            self.resolver
                .resolve(&operation.kind)
                .ok_or_else(|| DispatchError::HandlerNotFound {
                    kind: operation.kind.clone(),
                })?;

        handler.handle(operation).await.map(Dispatched::Handled)
    }
}
