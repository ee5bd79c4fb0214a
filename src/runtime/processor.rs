use std::sync::Arc;

use hashbrown::HashSet;
use tokio::{
    sync::{Mutex, broadcast::error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    core::queue::{OperationQueue, QueueError},
    dispatch::traits::OperationDispatcher,
    op::Operation,
    result::{CallResult, CallResultError, CallResultStatus},
};

use super::events::{EventBus, OperationEvent};

/// Failures that abort a whole sweep.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Pending operations could not be read.
    #[error("pending operations could not be loaded: {0}")]
    Load(#[source] QueueError),
}

/// Replays pending operations against their handlers.
///
/// At most one sweep runs at a time per processor; further callers wait for
/// the running one to finish and then run their own.
pub struct OperationProcessor {
    queue: Arc<OperationQueue>,
    dispatcher: Arc<dyn OperationDispatcher>,
    mark_failed_on: HashSet<CallResultStatus>,
    sweep_gate: Mutex<()>,
}

impl OperationProcessor {
    /// Creates a processor that marks operations failed on Error results only.
    pub fn new(queue: Arc<OperationQueue>, dispatcher: Arc<dyn OperationDispatcher>) -> Self {
        Self::with_failure_statuses(queue, dispatcher, [CallResultStatus::Error])
    }

    /// Creates a processor that marks operations failed on any of `statuses`.
    ///
    /// Success in `statuses` is ignored; successful operations are always deleted.
    pub fn with_failure_statuses<I>(
        queue: Arc<OperationQueue>,
        dispatcher: Arc<dyn OperationDispatcher>,
        statuses: I,
    ) -> Self
    where
        I: IntoIterator<Item = CallResultStatus>,
    {
        Self {
            queue,
            dispatcher,
            mark_failed_on: statuses
                .into_iter()
                .filter(|s| *s != CallResultStatus::Success)
                .collect(),
            sweep_gate: Mutex::new(()),
        }
    }

    /// Runs one sweep over every pending operation, oldest first.
    ///
    /// Successful operations are deleted. Operations whose dispatch errored or
    /// failed are marked failed and kept. One operation's failure never stops
    /// the sweep; it shows up as an Error entry in the combined result.
    pub async fn handle_pending_operations(&self) -> Result<CallResult, ProcessError> {
        let _gate = self.sweep_gate.lock().await;

        let pending = self
            .queue
            .get_all_operations()
            .await
            .map_err(ProcessError::Load)?;
        if pending.is_empty() {
            return Ok(CallResult::success());
        }

        let total = pending.len();
        let mut results = Vec::with_capacity(total);
        for mut operation in pending {
            let result = match self.process_operation(&mut operation).await {
                Ok(result) => result,
                Err(err) => {
                    error!(
                        operation_id = %operation.id,
                        kind = %operation.kind,
                        error = %format!("{err:#}"),
                        "error while handling operation"
                    );
                    if let Err(mark_err) = self.mark_operation_as_failed(&mut operation).await {
                        error!(
                            operation_id = %operation.id,
                            error = %mark_err,
                            "operation could not be marked as failed"
                        );
                    }
                    CallResult::error(CallResultError::from_error(&err))
                }
            };
            results.push(result);
        }

        let combined = CallResult::combine(results);
        info!(total, status = ?combined.status(), "pending operations handled");
        Ok(combined)
    }

    /// Flags `operation` as failed and persists it. Safe to repeat.
    pub async fn mark_operation_as_failed(
        &self,
        operation: &mut Operation,
    ) -> Result<(), QueueError> {
        operation.last_sync_failed = true;
        self.queue.update_operation(operation).await
    }

    /// Waits for the sweep currently holding the gate, if any.
    pub async fn wait_idle(&self) {
        drop(self.sweep_gate.lock().await);
    }

    /// Starts a sweep in the background without waiting for it.
    ///
    /// Failures are logged, never returned.
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<()> {
        let processor = Arc::clone(self);
        tokio::spawn(async move {
            match processor.handle_pending_operations().await {
                Ok(result) if result.errored() => {
                    warn!(
                        error = ?result.call_error().map(CallResultError::technical_message),
                        "background sweep finished with errors"
                    );
                }
                Ok(result) => debug!(status = ?result.status(), "background sweep finished"),
                Err(err) => error!(error = %err, "background sweep failed"),
            }
        })
    }

    /// Runs a background sweep for every [`OperationEvent::Added`] on `events`.
    ///
    /// The subscription lives as long as the returned guard.
    pub fn listen(self: &Arc<Self>, events: &EventBus) -> ListenerGuard {
        let mut rx = events.subscribe();
        let processor = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(OperationEvent::Added { id }) => {
                        debug!(operation_id = %id, "operation added, scheduling sweep");
                        processor.trigger();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "operation events lagged, scheduling sweep");
                        processor.trigger();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        ListenerGuard { task }
    }

    async fn process_operation(&self, operation: &mut Operation) -> anyhow::Result<CallResult> {
        let result = self.dispatcher.handle_operation(operation).await?;
        self.process_call_result(result, operation).await
    }

    async fn process_call_result(
        &self,
        result: CallResult,
        operation: &mut Operation,
    ) -> anyhow::Result<CallResult> {
        if result.successful() {
            self.queue.delete_operation(operation).await?;
        } else if self.mark_failed_on.contains(&result.status()) {
            self.mark_operation_as_failed(operation).await?;
        }
        Ok(result)
    }
}

/// Keeps an event subscription alive; dropping it unsubscribes.
#[derive(Debug)]
pub struct ListenerGuard {
    task: JoinHandle<()>,
}

impl ListenerGuard {
    /// True once the listener task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
