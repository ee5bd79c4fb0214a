use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    core::{
        clock::Clock,
        queue::{OperationQueue, QueueError},
    },
    dispatch::traits::OperationDispatcher,
    op::{NewOperation, Operation, OperationKind},
    persist::OperationRepository,
    result::{CallResult, CallResultStatus},
    types::OperationId,
};

use super::{
    events::{DEFAULT_EVENT_CAPACITY, EventBus, OperationEvent},
    processor::{ListenerGuard, OperationProcessor, ProcessError},
};

/// Wiring options for [`spawn_operation_sync`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Undelivered events buffered per subscriber.
    pub event_capacity: usize,
    /// Start a background sweep whenever an operation is stored.
    pub sweep_on_add: bool,
    /// Result statuses that set `last_sync_failed` on the operation.
    pub mark_failed_on: Vec<CallResultStatus>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            sweep_on_add: true,
            mark_failed_on: vec![CallResultStatus::Error],
        }
    }
}

/// Cloneable entry point bundling the queue, the processor and the listener.
#[derive(Clone)]
pub struct SyncHandle {
    queue: Arc<OperationQueue>,
    processor: Arc<OperationProcessor>,
    events: EventBus,
    listener: Arc<Mutex<Option<ListenerGuard>>>,
}

/// Wires an event bus, queue service and processing service together.
///
/// The queue starts out buffering; call [`SyncHandle::initialize`] once the
/// repository is ready. Must be called inside a tokio runtime when
/// `sweep_on_add` is set.
pub fn spawn_operation_sync(
    repository: Arc<dyn OperationRepository>,
    dispatcher: Arc<dyn OperationDispatcher>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
) -> SyncHandle {
    let events = EventBus::new(config.event_capacity);
    let queue = Arc::new(OperationQueue::new(repository, events.clone(), clock));
    let processor = Arc::new(OperationProcessor::with_failure_statuses(
        Arc::clone(&queue),
        dispatcher,
        config.mark_failed_on.iter().copied(),
    ));

    let listener = config.sweep_on_add.then(|| processor.listen(&events));
    info!(
        sweep_on_add = config.sweep_on_add,
        mark_failed_on = ?config.mark_failed_on,
        "operation sync started"
    );

    SyncHandle {
        queue,
        processor,
        events,
        listener: Arc::new(Mutex::new(listener)),
    }
}

impl SyncHandle {
    /// Subscribes to operation events.
    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.events.subscribe()
    }

    /// The queue service.
    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    /// The processing service.
    pub fn processor(&self) -> &Arc<OperationProcessor> {
        &self.processor
    }

    /// See [`OperationQueue::initialize`].
    pub async fn initialize(&self) -> Result<(), QueueError> {
        self.queue.initialize().await
    }

    /// See [`OperationQueue::add_operation`].
    pub async fn add_operation<T, F>(&self, enrich: F) -> Result<OperationId, QueueError>
    where
        T: OperationKind,
        F: FnOnce(&mut NewOperation<T>),
    {
        self.queue.add_operation(enrich).await
    }

    /// See [`OperationQueue::try_add_operation`].
    pub async fn try_add_operation<T, F, E>(&self, enrich: F) -> Result<OperationId, QueueError>
    where
        T: OperationKind,
        F: FnOnce(&mut NewOperation<T>) -> Result<(), E>,
        E: Into<anyhow::Error>,
    {
        self.queue.try_add_operation(enrich).await
    }

    /// See [`OperationQueue::get_all_operations`].
    pub async fn get_all_operations(&self) -> Result<Vec<Operation>, QueueError> {
        self.queue.get_all_operations().await
    }

    /// See [`OperationQueue::update_operation`].
    pub async fn update_operation(&self, operation: &Operation) -> Result<(), QueueError> {
        self.queue.update_operation(operation).await
    }

    /// See [`OperationQueue::delete_operation`].
    pub async fn delete_operation(&self, operation: &Operation) -> Result<(), QueueError> {
        self.queue.delete_operation(operation).await
    }

    /// See [`OperationProcessor::handle_pending_operations`].
    pub async fn handle_pending_operations(&self) -> Result<CallResult, ProcessError> {
        self.processor.handle_pending_operations().await
    }

    /// See [`OperationProcessor::mark_operation_as_failed`].
    pub async fn mark_operation_as_failed(&self, operation: &mut Operation) -> Result<(), QueueError> {
        self.processor.mark_operation_as_failed(operation).await
    }

    /// True while added operations trigger background sweeps.
    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Stops reacting to added operations and waits for the sweep currently
    /// holding the gate, if any.
    ///
    /// A sweep spawned by the listener just before it stopped may still start
    /// afterwards; it runs to completion like any explicit sweep.
    pub async fn shutdown(&self) {
        let guard = match self.listener.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(guard);
        self.processor.wait_idle().await;
        info!("operation sync listener stopped");
    }
}
