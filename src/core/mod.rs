//! Operation queue service and its time source.

/// Time sources for creation timestamps.
pub mod clock;
/// Buffering, persisting operation queue.
pub mod queue;
