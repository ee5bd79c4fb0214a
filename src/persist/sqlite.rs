//! SQLite-backed operation repository.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use rusqlite::{Connection, params};
use tokio::sync::Mutex;

use crate::{
    op::{OP_FORMAT_VERSION, Operation, StoredOperationEnvelope},
    types::OperationId,
};

use super::{OperationRepository, PersistError, PersistResult};

/// SQLite implementation of [`crate::persist::OperationRepository`].
///
/// Rows come back in first-insert order. Upserts of an existing id keep the
/// original row.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Opens or creates a SQLite-backed repository at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite repository.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> PersistResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> PersistResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| PersistError::Message(format!("join error: {e}")))?
    }
}

#[async_trait]
impl OperationRepository for SqliteRepository {
    async fn get_all(&self) -> PersistResult<Vec<Operation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT payload FROM operations ORDER BY seq ASC")?;
            let rows = stmt.query_map([], |row| {
                let payload: Vec<u8> = row.get(0)?;
                decode_operation_payload(&payload).map_err(|err| {
                    rusqlite::Error::FromSqlConversionFailure(
                        payload.len(),
                        rusqlite::types::Type::Blob,
                        Box::new(std::io::Error::other(err)),
                    )
                })
            })?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    async fn upsert_item(&self, operation: &Operation) -> PersistResult<()> {
        let payload = serde_json::to_vec(&StoredOperationEnvelope::new(operation.clone()))?;
        let id = operation.id.to_string();
        let kind = operation.kind.clone();
        let created_at = operation.creation_timestamp.to_rfc3339();
        let failed = operation.last_sync_failed;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO operations(id, kind, created_at, last_sync_failed, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    created_at = excluded.created_at,
                    last_sync_failed = excluded.last_sync_failed,
                    payload = excluded.payload",
                params![id, kind, created_at, failed, payload],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_item(&self, id: &OperationId) -> PersistResult<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM operations WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }
}

fn decode_operation_payload(payload: &[u8]) -> Result<Operation, String> {
    let envelope = serde_json::from_slice::<StoredOperationEnvelope>(payload)
        .map_err(|e| format!("operation payload decode failed: {e}"))?;
    if envelope.format_version != OP_FORMAT_VERSION {
        return Err(format!(
            "unsupported operation format version: {}",
            envelope.format_version
        ));
    }
    Ok(envelope.operation)
}
