//! In-process operation repository.

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::Mutex;

use crate::{op::Operation, types::OperationId};

use super::{OperationRepository, PersistResult};

#[derive(Debug, Default)]
struct Slots {
    records: HashMap<OperationId, Operation>,
    order: Vec<OperationId>,
}

/// Repository keeping operations in memory.
///
/// `get_all` returns operations in first-insert order; an upsert of an
/// existing id keeps its slot.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    slots: Mutex<Slots>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored operations.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.records.len()
    }

    /// True when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Clone of the operation stored under `id`.
    pub async fn get(&self, id: &OperationId) -> Option<Operation> {
        self.slots.lock().await.records.get(id).cloned()
    }
}

#[async_trait]
impl OperationRepository for MemoryRepository {
    async fn get_all(&self) -> PersistResult<Vec<Operation>> {
        let slots = self.slots.lock().await;
        Ok(slots
            .order
            .iter()
            .filter_map(|id| slots.records.get(id).cloned())
            .collect())
    }

    async fn upsert_item(&self, operation: &Operation) -> PersistResult<()> {
        let mut slots = self.slots.lock().await;
        if slots
            .records
            .insert(operation.id.clone(), operation.clone())
            .is_none()
        {
            slots.order.push(operation.id.clone());
        }
        Ok(())
    }

    async fn delete_item(&self, id: &OperationId) -> PersistResult<()> {
        let mut slots = self.slots.lock().await;
        if slots.records.remove(id).is_some() {
            slots.order.retain(|stored| stored != id);
        }
        Ok(())
    }
}
