use std::{collections::VecDeque, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::{
    op::{NewOperation, Operation, OperationKind},
    persist::{OperationRepository, PersistError},
    runtime::events::{EventBus, OperationEvent},
    types::OperationId,
};

use super::clock::Clock;

/// Failures raised by [`OperationQueue`].
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The enrichment callback refused the new operation.
    #[error("operation enrichment failed: {0:#}")]
    Enrich(anyhow::Error),
    /// The typed payload could not be turned into JSON.
    #[error("operation payload could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The repository failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Where new operations go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    /// Storage not ready; new operations are held in memory.
    Buffering,
    /// The buffer is being replayed into storage.
    Draining,
    /// New operations go straight to storage.
    Persisting,
}

#[derive(Debug)]
struct QueueState {
    phase: QueuePhase,
    buffer: VecDeque<Operation>,
}

/// Durable, ordered home for pending operations.
///
/// Operations added before [`OperationQueue::initialize`] are buffered in
/// memory and replayed into the repository, in FIFO order, by the first
/// successful initialization. The phase and the buffer sit behind one lock,
/// so an add can never be buffered after the drain has seen the buffer empty.
pub struct OperationQueue {
    repository: Arc<dyn OperationRepository>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
    init_gate: Mutex<()>,
}

impl OperationQueue {
    /// Creates a queue in the buffering phase.
    pub fn new(
        repository: Arc<dyn OperationRepository>,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            events,
            clock,
            state: Mutex::new(QueueState {
                phase: QueuePhase::Buffering,
                buffer: VecDeque::new(),
            }),
            init_gate: Mutex::new(()),
        }
    }

    /// Creates a new operation of subtype `T` and queues it.
    ///
    /// The creation timestamp is stamped before `enrich` runs.
    pub async fn add_operation<T, F>(&self, enrich: F) -> Result<OperationId, QueueError>
    where
        T: OperationKind,
        F: FnOnce(&mut NewOperation<T>),
    {
        self.try_add_operation::<T, _, std::convert::Infallible>(|op| {
            enrich(op);
            Ok(())
        })
        .await
    }

    /// Like [`OperationQueue::add_operation`], with a fallible enrichment.
    ///
    /// An enrichment error is returned as [`QueueError::Enrich`] and nothing is queued.
    pub async fn try_add_operation<T, F, E>(&self, enrich: F) -> Result<OperationId, QueueError>
    where
        T: OperationKind,
        F: FnOnce(&mut NewOperation<T>) -> Result<(), E>,
        E: Into<anyhow::Error>,
    {
        let mut draft = NewOperation::<T>::new(self.clock.now());
        enrich(&mut draft).map_err(|e| QueueError::Enrich(e.into()))?;
        let operation = draft.into_operation()?;
        let id = operation.id.clone();
        self.enqueue(operation).await?;
        Ok(id)
    }

    /// Every stored operation, oldest first.
    ///
    /// Ties on the creation timestamp keep the repository's order. The
    /// in-memory buffer is not consulted.
    pub async fn get_all_operations(&self) -> Result<Vec<Operation>, QueueError> {
        let mut operations = self.repository.get_all().await?;
        operations.sort_by(|a, b| a.creation_timestamp.cmp(&b.creation_timestamp));
        Ok(operations)
    }

    /// Writes `operation` back to storage.
    pub async fn update_operation(&self, operation: &Operation) -> Result<(), QueueError> {
        self.repository.upsert_item(operation).await?;
        Ok(())
    }

    /// Removes `operation` from storage.
    pub async fn delete_operation(&self, operation: &Operation) -> Result<(), QueueError> {
        self.repository.delete_item(&operation.id).await?;
        Ok(())
    }

    /// Switches from buffering to persisting, replaying the buffer first.
    ///
    /// Idempotent and safe to call concurrently: one caller drains while the
    /// others wait for it. An operation leaves the buffer only once it is
    /// stored, so a failed or cancelled drain loses nothing. On failure the
    /// queue returns to buffering and the error is returned; the next call
    /// retries.
    pub async fn initialize(&self) -> Result<(), QueueError> {
        if self.phase().await == QueuePhase::Persisting {
            return Ok(());
        }

        let _gate = self.init_gate.lock().await;
        {
            let mut state = self.state.lock().await;
            if state.phase == QueuePhase::Persisting {
                return Ok(());
            }
            state.phase = QueuePhase::Draining;
        }

        let mut drained = 0usize;
        loop {
            // Adds skip the buffer while draining, so only this loop touches it.
            let next = {
                let mut state = self.state.lock().await;
                match state.buffer.front() {
                    Some(operation) => operation.clone(),
                    None => {
                        state.phase = QueuePhase::Persisting;
                        break;
                    }
                }
            };

            if let Err(err) = self.persist(&next).await {
                error!(
                    operation_id = %next.id,
                    kind = %next.kind,
                    drained,
                    error = %err,
                    "error initializing operation queue"
                );
                self.state.lock().await.phase = QueuePhase::Buffering;
                return Err(err);
            }
            self.state.lock().await.buffer.pop_front();
            drained += 1;
        }

        info!(drained, "operation queue initialized");
        Ok(())
    }

    /// Current phase.
    pub async fn phase(&self) -> QueuePhase {
        self.state.lock().await.phase
    }

    /// True once initialization has completed.
    pub async fn is_initialized(&self) -> bool {
        self.phase().await == QueuePhase::Persisting
    }

    /// Number of operations waiting in memory.
    pub async fn buffered_len(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    async fn enqueue(&self, operation: Operation) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            if state.phase == QueuePhase::Buffering {
                debug!(
                    operation_id = %operation.id,
                    kind = %operation.kind,
                    "storage not ready, buffering operation"
                );
                state.buffer.push_back(operation);
                return Ok(());
            }
        }
        self.persist(&operation).await
    }

    async fn persist(&self, operation: &Operation) -> Result<(), QueueError> {
        self.repository.upsert_item(operation).await?;
        debug!(operation_id = %operation.id, kind = %operation.kind, "operation stored");
        self.events.send(OperationEvent::Added {
            id: operation.id.clone(),
        });
        Ok(())
    }
}
