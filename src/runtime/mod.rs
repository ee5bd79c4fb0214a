//! Event bus, processing service and runtime wiring.

/// Operation notifications and the bus carrying them.
pub mod events;
/// Spawned handle bundling queue, processor and listener.
pub mod handle;
/// Single-flight processing of pending operations.
pub mod processor;
