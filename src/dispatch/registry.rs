use std::{marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::{
    op::{Operation, OperationKind},
    result::CallResult,
};

use super::traits::{DispatchError, ErasedOperationHandler, HandlerResolver, OperationHandler};

struct TypedHandler<T, H> {
    handler: H,
    _kind: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T, H> ErasedOperationHandler for TypedHandler<T, H>
where
    T: OperationKind,
    H: OperationHandler<T>,
{
    fn kind(&self) -> &'static str {
        T::KIND
    }

    async fn handle(&self, operation: &Operation) -> Result<CallResult, DispatchError> {
        let payload = operation.decode::<T>()?;
        self.handler
            .handle_operation(operation, payload)
            .await
            .map_err(|source| DispatchError::Handler {
                kind: operation.kind.clone(),
                source,
            })
    }
}

/// Handler table populated at startup.
///
/// Registering a second handler for the same kind replaces the first.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn ErasedOperationHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for operations of subtype `T`.
    pub fn register<T, H>(&mut self, handler: H) -> &mut Self
    where
        T: OperationKind,
        H: OperationHandler<T>,
    {
        let erased: Arc<dyn ErasedOperationHandler> = Arc::new(TypedHandler {
            handler,
            _kind: PhantomData,
        });
        if self.handlers.insert(T::KIND, erased).is_some() {
            warn!(kind = T::KIND, "handler already registered, replacing");
        } else {
            debug!(kind = T::KIND, "registered operation handler");
        }
        self
    }

    /// Builder-style [`HandlerRegistry::register`].
    pub fn with<T, H>(mut self, handler: H) -> Self
    where
        T: OperationKind,
        H: OperationHandler<T>,
    {
        self.register::<T, H>(handler);
        self
    }

    /// True when a handler is registered for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, in no particular order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, kind: &str) -> Option<Arc<dyn ErasedOperationHandler>> {
        self.handlers.get(kind).cloned()
    }
}
