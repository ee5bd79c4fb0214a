use std::sync::Arc;

use chrono::{DateTime, Duration};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use opsync::{
    core::{clock::ManualClock, queue::OperationQueue},
    op::{Operation, OperationKind},
    persist::{OperationRepository, PersistError, sqlite::SqliteRepository},
    runtime::events::EventBus,
    types::Timestamp,
};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct LikePost {
    post_id: u64,
    like: bool,
}

impl OperationKind for LikePost {
    const KIND: &'static str = "like_post";
}

fn ts(s: &str) -> Timestamp {
    DateTime::parse_from_rfc3339(s).expect("timestamp")
}

fn like(post_id: u64, at: &str) -> Operation {
    Operation::new(ts(at), &LikePost { post_id, like: true }).expect("operation")
}

#[tokio::test]
async fn operations_survive_reopen() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("outbox.db");

    let first = like(1, "2023-08-28T10:00:00+02:00");
    let second = like(2, "2023-08-28T10:05:00+02:00");
    {
        let repo = SqliteRepository::open(&db_path).expect("open");
        repo.upsert_item(&first).await.expect("first");
        repo.upsert_item(&second).await.expect("second");
    }

    let reopened = SqliteRepository::open(&db_path).expect("reopen");
    let all = reopened.get_all().await.expect("all");
    assert_eq!(all, vec![first, second]);
    assert_eq!(
        all[1].decode::<LikePost>().expect("decode"),
        LikePost {
            post_id: 2,
            like: true
        }
    );
    // The offset is kept, not just the instant.
    assert_eq!(all[0].creation_timestamp.offset().local_minus_utc(), 2 * 3600);
}

#[tokio::test]
async fn upsert_replaces_in_place() {
    let repo = SqliteRepository::open_in_memory().expect("open");
    let mut a = like(1, "2023-08-28T10:00:00Z");
    let b = like(2, "2023-08-28T09:00:00Z");
    repo.upsert_item(&a).await.expect("a");
    repo.upsert_item(&b).await.expect("b");

    a.last_sync_failed = true;
    repo.upsert_item(&a).await.expect("update a");

    let all = repo.get_all().await.expect("all");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, a.id);
    assert!(all[0].last_sync_failed);
    assert!(!all[1].last_sync_failed);
}

#[tokio::test]
async fn delete_is_by_id_and_tolerates_missing_rows() {
    let repo = SqliteRepository::open_in_memory().expect("open");
    let a = like(1, "2023-08-28T10:00:00Z");
    let b = like(2, "2023-08-28T10:00:00Z");
    repo.upsert_item(&a).await.expect("a");
    repo.upsert_item(&b).await.expect("b");

    repo.delete_item(&a.id).await.expect("delete");
    repo.delete_item(&a.id).await.expect("delete again");

    let all = repo.get_all().await.expect("all");
    assert_eq!(all, vec![b]);
}

#[tokio::test]
async fn unknown_format_version_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("outbox.db");
    let repo = SqliteRepository::open(&db_path).expect("open");
    repo.upsert_item(&like(1, "2023-08-28T10:00:00Z"))
        .await
        .expect("insert");

    let conn = Connection::open(&db_path).expect("raw open");
    let blob: Vec<u8> = conn
        .query_row("SELECT payload FROM operations", [], |row| row.get(0))
        .expect("payload");
    let mut envelope: serde_json::Value = serde_json::from_slice(&blob).expect("json");
    envelope["format_version"] = serde_json::json!(99);
    conn.execute(
        "UPDATE operations SET payload = ?1",
        params![serde_json::to_vec(&envelope).expect("encode")],
    )
    .expect("tamper");
    drop(conn);

    let err = repo.get_all().await.expect_err("version");
    assert!(matches!(err, PersistError::Sqlite(_)));
    assert!(err.to_string().contains("unsupported operation format version: 99"));
}

#[tokio::test]
async fn queue_over_sqlite_drains_and_sorts() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("outbox.db");
    let clock = Arc::new(ManualClock::new(ts("2023-08-28T12:00:00+00:00")));

    let ids = {
        let repo = Arc::new(SqliteRepository::open(&db_path).expect("open"));
        let queue = OperationQueue::new(repo, EventBus::default(), clock.clone());

        let later = queue
            .add_operation::<LikePost, _>(|op| op.post_id = 10)
            .await
            .expect("later");
        clock.advance(Duration::hours(-1));
        let earlier = queue
            .add_operation::<LikePost, _>(|op| op.post_id = 11)
            .await
            .expect("earlier");

        queue.initialize().await.expect("init");
        vec![earlier, later]
    };

    let repo = Arc::new(SqliteRepository::open(&db_path).expect("reopen"));
    let queue = OperationQueue::new(repo, EventBus::default(), clock);
    let order: Vec<_> = queue
        .get_all_operations()
        .await
        .expect("all")
        .into_iter()
        .map(|op| op.id)
        .collect();
    assert_eq!(order, ids);
}
