//! Routing of operations to their handlers.

/// Ordered composition of dispatchers.
pub mod chain;
/// Handler table keyed by operation kind.
pub mod registry;
/// Resolver-backed dispatcher.
pub mod router;
/// Handler, resolver and dispatcher contracts.
pub mod traits;
