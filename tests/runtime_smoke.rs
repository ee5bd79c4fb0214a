use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use opsync::{
    core::clock::SystemClock,
    dispatch::{registry::HandlerRegistry, router::HandlerDispatcher, traits::OperationHandler},
    logging::init_logging,
    op::{Operation, OperationKind},
    persist::{OperationRepository, memory::MemoryRepository},
    result::{CallResult, CallResultStatus},
    runtime::{
        events::OperationEvent,
        handle::{SyncConfig, SyncHandle, spawn_operation_sync},
    },
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct FollowUser {
    user_id: u64,
}

impl OperationKind for FollowUser {
    const KIND: &'static str = "follow_user";
}

struct Counting {
    calls: Arc<AtomicUsize>,
    outcome: CallResult,
}

#[async_trait]
impl OperationHandler<FollowUser> for Counting {
    async fn handle_operation(
        &self,
        _operation: &Operation,
        _payload: FollowUser,
    ) -> anyhow::Result<CallResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome.clone())
    }
}

fn spawn(
    repo: Arc<MemoryRepository>,
    outcome: CallResult,
    config: SyncConfig,
) -> (SyncHandle, Arc<AtomicUsize>) {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = HandlerRegistry::new().with::<FollowUser, _>(Counting {
        calls: Arc::clone(&calls),
        outcome,
    });
    let handle = spawn_operation_sync(
        repo,
        Arc::new(HandlerDispatcher::new(Arc::new(registry))),
        Arc::new(SystemClock),
        config,
    );
    (handle, calls)
}

async fn wait_until_empty(repo: &MemoryRepository) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !repo.is_empty().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("background sweep did not drain the store");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn added_operation_is_swept_in_background() {
    let repo = Arc::new(MemoryRepository::new());
    let (sync, calls) = spawn(repo.clone(), CallResult::success(), SyncConfig::default());
    let mut events = sync.subscribe();
    assert!(sync.is_listening());

    sync.initialize().await.expect("init");
    let id = sync
        .add_operation::<FollowUser, _>(|op| op.user_id = 7)
        .await
        .expect("add");

    assert_eq!(
        events.recv().await.expect("event"),
        OperationEvent::Added { id }
    );
    wait_until_empty(&repo).await;
    assert!(calls.load(Ordering::SeqCst) >= 1);

    sync.shutdown().await;
    assert!(!sync.is_listening());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn buffered_operations_are_swept_after_initialize() {
    let repo = Arc::new(MemoryRepository::new());
    let (sync, _calls) = spawn(repo.clone(), CallResult::success(), SyncConfig::default());

    for user_id in 0..3 {
        sync.add_operation::<FollowUser, _>(|op| op.user_id = user_id)
            .await
            .expect("add");
    }
    assert!(repo.is_empty().await);

    sync.initialize().await.expect("init");
    wait_until_empty(&repo).await;
    sync.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_background_sweeps() {
    let repo = Arc::new(MemoryRepository::new());
    let (sync, calls) = spawn(repo.clone(), CallResult::success(), SyncConfig::default());
    sync.initialize().await.expect("init");
    sync.shutdown().await;

    sync.add_operation::<FollowUser, _>(|_| {})
        .await
        .expect("add");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(repo.len().await, 1);

    // Explicit sweeps still work.
    assert!(sync.handle_pending_operations().await.expect("sweep").successful());
    assert!(repo.is_empty().await);
}

#[tokio::test]
async fn manual_mode_marks_configured_statuses() {
    let repo = Arc::new(MemoryRepository::new());
    let config = SyncConfig {
        sweep_on_add: false,
        mark_failed_on: vec![CallResultStatus::Error, CallResultStatus::NoConnection],
        ..SyncConfig::default()
    };
    let (sync, calls) = spawn(repo.clone(), CallResult::no_connection(), config);
    assert!(!sync.is_listening());

    sync.initialize().await.expect("init");
    sync.add_operation::<FollowUser, _>(|_| {})
        .await
        .expect("add");

    let out = sync.handle_pending_operations().await.expect("sweep");
    assert!(out.no_connection_status());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stored = repo.get_all().await.expect("all");
    assert_eq!(stored.len(), 1);
    assert!(stored[0].last_sync_failed);
}

struct Slow {
    started: Arc<Notify>,
    finished: Arc<AtomicUsize>,
}

#[async_trait]
impl OperationHandler<FollowUser> for Slow {
    async fn handle_operation(
        &self,
        _operation: &Operation,
        _payload: FollowUser,
    ) -> anyhow::Result<CallResult> {
        self.started.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(CallResult::success())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_waits_for_running_sweep() {
    let repo = Arc::new(MemoryRepository::new());
    let started = Arc::new(Notify::new());
    let finished = Arc::new(AtomicUsize::new(0));
    let registry = HandlerRegistry::new().with::<FollowUser, _>(Slow {
        started: Arc::clone(&started),
        finished: Arc::clone(&finished),
    });
    let sync = spawn_operation_sync(
        repo.clone(),
        Arc::new(HandlerDispatcher::new(Arc::new(registry))),
        Arc::new(SystemClock),
        SyncConfig::default(),
    );
    sync.initialize().await.expect("init");
    sync.add_operation::<FollowUser, _>(|op| op.user_id = 1)
        .await
        .expect("add");

    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .expect("sweep did not start");
    sync.shutdown().await;

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert!(repo.is_empty().await);
}

#[test]
fn config_fills_missing_fields_with_defaults() {
    let config: SyncConfig =
        serde_json::from_str(r#"{ "sweep_on_add": false }"#).expect("config");
    assert!(!config.sweep_on_add);
    assert_eq!(config.mark_failed_on, vec![CallResultStatus::Error]);
    assert_eq!(config.event_capacity, SyncConfig::default().event_capacity);
}
