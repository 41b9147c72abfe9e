//! End-to-end tests for fieldsync-engine
//!
//! Every test builds its own engine over in-memory or temp-dir storage and a
//! scripted remote store, then drives connectivity by hand.

use async_trait::async_trait;
use fieldsync_engine::config::{DEAD_LETTER_KEY, QUEUE_KEY};
use fieldsync_engine::{
    Clock, DocId, DrainReport, Error, FileStorage, InMemoryRemote, KeyValueStorage, ManualClock,
    MemoryAttachmentStore, MemoryStorage, MutationKind, MutationRecord, Payload,
    PendingAttachment, RemoteStore, SyncConfig, SyncEngine, SyncStatus, Timestamp, WriteOutcome,
    WriteRequest, MAX_RETRIES,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const USER: &str = "tech-42";

// ============================================================================
// Fakes
// ============================================================================

/// Remote store that can be switched into failure mode or slowed down.
struct ScriptedRemote {
    inner: InMemoryRemote,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedRemote {
    fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: InMemoryRemote::new(clock),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn enter(&self) -> fieldsync_engine::error::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Remote("503 service unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemote {
    async fn add(
        &self,
        user_id: &str,
        collection: &str,
        payload: Payload,
    ) -> fieldsync_engine::error::Result<DocId> {
        self.enter().await?;
        self.inner.add(user_id, collection, payload).await
    }

    async fn update(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        payload: Payload,
    ) -> fieldsync_engine::error::Result<()> {
        self.enter().await?;
        self.inner.update(user_id, collection, doc_id, payload).await
    }

    async fn merge(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        payload: Payload,
    ) -> fieldsync_engine::error::Result<()> {
        self.enter().await?;
        self.inner.merge(user_id, collection, doc_id, payload).await
    }

    async fn updated_at(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
    ) -> fieldsync_engine::error::Result<Option<Timestamp>> {
        self.enter().await?;
        self.inner.updated_at(user_id, collection, doc_id).await
    }
}

struct Fixture {
    engine: SyncEngine,
    remote: Arc<ScriptedRemote>,
    attachments: Arc<MemoryAttachmentStore>,
    clock: Arc<ManualClock>,
}

fn fixture_with(storage: Arc<dyn KeyValueStorage>) -> Fixture {
    let clock = Arc::new(ManualClock::new(1_000));
    let remote = Arc::new(ScriptedRemote::new(clock.clone()));
    let attachments = Arc::new(MemoryAttachmentStore::new());
    let engine = SyncEngine::builder(SyncConfig::default())
        .storage(storage)
        .remote(remote.clone())
        .attachments(attachments.clone())
        .clock(clock.clone())
        .build()
        .unwrap();
    Fixture {
        engine,
        remote,
        attachments,
        clock,
    }
}

fn fixture() -> Fixture {
    fixture_with(Arc::new(MemoryStorage::new()))
}

fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap()
}

/// Wait until the status satisfies `predicate`, failing after a second.
async fn wait_for_status(engine: &SyncEngine, predicate: impl FnMut(&SyncStatus) -> bool) {
    let mut rx = engine.subscribe_status();
    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(predicate))
        .await
        .expect("status never reached the expected state")
        .unwrap();
}

/// Report the device online and wait for the reconnect drain to finish.
///
/// Expects a session that has not drained yet.
async fn go_online(engine: &SyncEngine) {
    engine.monitor().report(true);
    wait_for_status(engine, |s| {
        s.is_online && !s.is_syncing && s.last_sync_at.is_some()
    })
    .await;
}

/// Start a drain on a background task and wait until it is running.
async fn start_slow_drain(fx: &Fixture) -> tokio::task::JoinHandle<Option<DrainReport>> {
    fx.remote.slow_down(Duration::from_millis(50));
    let engine = fx.engine.clone();
    let drain = tokio::spawn(async move { engine.flush_queue(USER).await });
    wait_for_status(&fx.engine, |s| s.is_syncing).await;
    drain
}

// ============================================================================
// Offline capture and reconnect
// ============================================================================

#[tokio::test]
async fn offline_adds_drain_on_reconnect() {
    let fx = fixture();
    fx.engine.initialize(USER).await;

    for title in ["Boiler", "Gutter", "Fence"] {
        let outcome = fx
            .engine
            .offline_write(
                MutationKind::Add,
                USER,
                "jobs",
                None,
                payload(json!({ "title": title })),
            )
            .await
            .unwrap();
        assert!(outcome.is_queued());
    }
    assert_eq!(fx.engine.status().pending_count, 3);
    assert!(!fx.engine.status().is_online);

    fx.engine.monitor().report(true);
    wait_for_status(&fx.engine, |s| s.last_report.is_some()).await;

    let status = fx.engine.status();
    let report = status.last_report.unwrap();
    assert_eq!(
        (report.processed, report.failed, report.stale),
        (3, 0, 0)
    );
    assert_eq!(status.pending_count, 0);
    assert!(status.is_online);
    assert_eq!(fx.engine.orchestrator().drain_count(), 1);

    let titles: Vec<_> = fx
        .remote
        .inner
        .writes()
        .into_iter()
        .map(|w| w.payload["title"].clone())
        .collect();
    assert_eq!(titles, vec![json!("Boiler"), json!("Gutter"), json!("Fence")]);
}

#[tokio::test]
async fn online_to_online_does_not_flush_again() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    fx.engine
        .enqueue_mutation(MutationRecord::add("jobs", Payload::new(), 1_000))
        .await
        .unwrap();

    fx.engine.monitor().report(true);
    wait_for_status(&fx.engine, |s| s.last_report.is_some()).await;
    assert_eq!(fx.engine.orchestrator().drain_count(), 1);

    fx.engine.monitor().report(true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fx.engine.orchestrator().drain_count(), 1);
}

#[tokio::test]
async fn flapping_connection_flushes_once_per_edge() {
    let fx = fixture();
    fx.engine.initialize(USER).await;

    fx.engine.monitor().report(true);
    wait_for_status(&fx.engine, |s| s.last_sync_at.is_some()).await;

    fx.engine.monitor().report(false);
    fx.clock.advance(10);
    fx.engine.monitor().report(true);
    wait_for_status(&fx.engine, |s| s.last_sync_at == Some(1_010)).await;

    assert_eq!(fx.engine.orchestrator().drain_count(), 2);
}

#[tokio::test]
async fn initialize_online_flushes_restored_work() {
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    {
        let fx = fixture_with(storage.clone());
        fx.engine.initialize(USER).await;
        fx.engine
            .offline_write(MutationKind::Add, USER, "jobs", None, Payload::new())
            .await
            .unwrap();
    }

    let fx = fixture_with(storage);
    fx.engine.monitor().report(true);
    fx.engine.initialize(USER).await;

    let status = fx.engine.status();
    assert_eq!(status.pending_count, 0);
    assert_eq!(status.last_report.map(|r| r.processed), Some(1));
    assert_eq!(fx.engine.orchestrator().drain_count(), 1);
}

// ============================================================================
// Single flight
// ============================================================================

#[tokio::test]
async fn concurrent_flushes_run_one_drain() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    fx.engine
        .enqueue_mutation(MutationRecord::add("jobs", Payload::new(), 1_000))
        .await
        .unwrap();
    fx.remote.slow_down(Duration::from_millis(50));

    let (first, second) = tokio::join!(
        fx.engine.flush_queue(USER),
        fx.engine.flush_queue(USER)
    );

    let ran: Vec<_> = [first, second].into_iter().flatten().collect();
    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].processed, 1);
    assert_eq!(fx.engine.orchestrator().drain_count(), 2);
    assert_eq!(fx.remote.inner.writes().len(), 1);
    assert!(!fx.engine.orchestrator().is_syncing());
}

#[tokio::test]
async fn is_syncing_is_visible_during_a_drain() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    fx.engine
        .enqueue_mutation(MutationRecord::add("jobs", Payload::new(), 1_000))
        .await
        .unwrap();

    let drain = start_slow_drain(&fx).await;
    assert_eq!(fx.engine.flush_queue(USER).await, None);

    assert!(drain.await.unwrap().is_some());
    assert!(!fx.engine.status().is_syncing);
}

#[tokio::test]
async fn enqueue_during_a_drain_waits_for_the_next_one() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    fx.engine
        .enqueue_mutation(MutationRecord::add("jobs", Payload::new(), 1_000))
        .await
        .unwrap();

    let drain = start_slow_drain(&fx).await;
    fx.engine
        .enqueue_mutation(MutationRecord::merge("jobs", "job-2", Payload::new(), 1_000))
        .await
        .unwrap();

    let report = drain.await.unwrap().unwrap();
    assert_eq!(report.total(), 1);
    assert_eq!(report.processed, 1);
    assert_eq!(fx.engine.status().pending_count, 1);
    assert_eq!(fx.remote.inner.writes().len(), 1);

    let next = fx.engine.flush_queue(USER).await.unwrap();
    assert_eq!(next.processed, 1);
    assert_eq!(fx.remote.inner.writes()[1].doc_id, "job-2");
    assert_eq!(fx.engine.status().pending_count, 0);
}

// ============================================================================
// Retries and dead letters
// ============================================================================

#[tokio::test]
async fn failing_mutation_is_dead_lettered_after_max_retries() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    let id = fx
        .engine
        .enqueue_mutation(MutationRecord::merge(
            "invoices",
            "inv-1",
            payload(json!({"paid": true})),
            1_000,
        ))
        .await
        .unwrap();
    fx.remote.fail(true);

    for attempt in 1..MAX_RETRIES {
        let report = fx.engine.flush_queue(USER).await.unwrap();
        assert_eq!(report.failed, 1);
        let pending = fx.engine.orchestrator().status().pending_count;
        assert_eq!(pending, 1, "still queued after attempt {}", attempt);
        assert!(fx.engine.dead_letters().is_empty());
    }

    let report = fx.engine.flush_queue(USER).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(fx.engine.status().pending_count, 0);

    let dead = fx.engine.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].mutation.id, id);
    assert_eq!(dead[0].mutation.retry_count, MAX_RETRIES);

    // Exactly MAX_RETRIES attempts reached the remote.
    assert_eq!(fx.remote.calls.load(Ordering::SeqCst), MAX_RETRIES as usize);

    let report = fx.engine.flush_queue(USER).await.unwrap();
    assert_eq!(report.total(), 0);
}

#[tokio::test]
async fn one_failure_does_not_block_later_items() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    fx.engine
        .enqueue_mutation(MutationRecord::update(
            "jobs",
            "missing",
            payload(json!({"status": "done"})),
            1_000,
        ))
        .await
        .unwrap();
    fx.engine
        .enqueue_mutation(MutationRecord::add("jobs", Payload::new(), 1_000))
        .await
        .unwrap();

    let report = fx.engine.flush_queue(USER).await.unwrap();
    assert_eq!((report.processed, report.failed), (1, 1));
    assert_eq!(fx.engine.status().pending_count, 1);
}

#[tokio::test]
async fn dead_letter_can_be_requeued() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    fx.engine
        .enqueue_mutation(MutationRecord::add("clients", Payload::new(), 1_000))
        .await
        .unwrap();
    fx.remote.fail(true);
    for _ in 0..MAX_RETRIES {
        fx.engine.flush_queue(USER).await;
    }
    let id = fx.engine.dead_letters()[0].mutation.id.clone();

    fx.remote.fail(false);
    fx.engine.requeue_dead_letter(&id).await.unwrap();
    assert!(fx.engine.dead_letters().is_empty());
    assert_eq!(fx.engine.status().pending_count, 1);

    let report = fx.engine.flush_queue(USER).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(fx.remote.inner.document_count(), 1);
}

// ============================================================================
// Stale updates
// ============================================================================

#[tokio::test]
async fn update_older_than_remote_is_discarded() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    fx.remote
        .inner
        .seed(USER, "jobs", "job-1", payload(json!({"status": "open"})), 1_000);

    fx.engine
        .enqueue_mutation(MutationRecord::update(
            "jobs",
            "job-1",
            payload(json!({"status": "done"})),
            900,
        ))
        .await
        .unwrap();

    let report = fx.engine.flush_queue(USER).await.unwrap();
    assert_eq!((report.processed, report.stale), (0, 1));
    assert_eq!(fx.engine.status().pending_count, 0);
    assert!(fx.remote.inner.writes().is_empty());
    let doc = fx.remote.inner.get(USER, "jobs", "job-1").unwrap();
    assert_eq!(doc["status"], "open");
}

#[tokio::test]
async fn update_at_same_instant_is_applied() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    fx.remote
        .inner
        .seed(USER, "jobs", "job-1", payload(json!({"status": "open"})), 1_000);

    fx.engine
        .enqueue_mutation(MutationRecord::update(
            "jobs",
            "job-1",
            payload(json!({"status": "done"})),
            1_000,
        ))
        .await
        .unwrap();

    let report = fx.engine.flush_queue(USER).await.unwrap();
    assert_eq!((report.processed, report.stale), (1, 0));
    let doc = fx.remote.inner.get(USER, "jobs", "job-1").unwrap();
    assert_eq!(doc["status"], "done");
}

#[tokio::test]
async fn merge_is_never_stale() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    fx.remote
        .inner
        .seed(USER, "jobs", "job-1", payload(json!({"status": "open"})), 5_000);

    fx.engine
        .enqueue_mutation(MutationRecord::merge(
            "jobs",
            "job-1",
            payload(json!({"notes": "gate code 1234"})),
            1_000,
        ))
        .await
        .unwrap();

    let report = fx.engine.flush_queue(USER).await.unwrap();
    assert_eq!((report.processed, report.stale), (1, 0));
    let doc = fx.remote.inner.get(USER, "jobs", "job-1").unwrap();
    assert_eq!(doc["status"], "open");
    assert_eq!(doc["notes"], "gate code 1234");
}

// ============================================================================
// Durability
// ============================================================================

#[tokio::test]
async fn queue_survives_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();

    let ids = {
        let fx = fixture_with(Arc::new(FileStorage::new(dir.path())));
        fx.engine.initialize(USER).await;
        let mut ids = Vec::new();
        for n in 0..3 {
            let outcome = fx
                .engine
                .offline_write(
                    MutationKind::Merge,
                    USER,
                    "jobs",
                    Some(&format!("job-{}", n)),
                    payload(json!({ "n": n })),
                )
                .await
                .unwrap();
            match outcome {
                WriteOutcome::Queued { mutation_id } => ids.push(mutation_id),
                other => panic!("expected queued write, got {:?}", other),
            }
        }
        ids
    };

    let fx = fixture_with(Arc::new(FileStorage::new(dir.path())));
    fx.engine.initialize(USER).await;
    assert_eq!(fx.engine.status().pending_count, ids.len());

    go_online(&fx.engine).await;
    assert_eq!(fx.engine.status().pending_count, 0);
    let docs: Vec<_> = fx
        .remote
        .inner
        .writes()
        .into_iter()
        .map(|w| w.doc_id)
        .collect();
    assert_eq!(docs, vec!["job-0", "job-1", "job-2"]);
}

#[tokio::test]
async fn teardown_discards_work_for_the_next_user() {
    let dir = tempfile::tempdir().unwrap();
    let fx = fixture_with(Arc::new(FileStorage::new(dir.path())));
    fx.engine.initialize(USER).await;
    fx.engine
        .offline_write(MutationKind::Add, USER, "jobs", None, Payload::new())
        .await
        .unwrap();

    fx.engine.teardown().await;
    assert_eq!(fx.engine.status(), SyncStatus::default());

    let next = fixture_with(Arc::new(FileStorage::new(dir.path())));
    next.engine.initialize("tech-7").await;
    assert_eq!(next.engine.status().pending_count, 0);
}

#[tokio::test]
async fn teardown_stops_reconnect_flushes() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    fx.engine.teardown().await;

    fx.engine.monitor().report(true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fx.engine.orchestrator().drain_count(), 0);
}

#[tokio::test]
async fn teardown_during_a_drain_stops_remaining_writes() {
    let storage = Arc::new(MemoryStorage::new());
    let fx = fixture_with(storage.clone());
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    for doc in ["job-1", "job-2"] {
        fx.engine
            .enqueue_mutation(MutationRecord::merge("jobs", doc, Payload::new(), 1_000))
            .await
            .unwrap();
    }

    let drain = start_slow_drain(&fx).await;
    fx.engine.teardown().await;
    let report = drain.await.unwrap().unwrap();

    // The call already in flight may land; nothing after it does.
    let written: Vec<_> = fx
        .remote
        .inner
        .writes()
        .into_iter()
        .map(|w| w.doc_id)
        .collect();
    assert!(written.len() <= 1);
    assert!(!written.contains(&"job-2".to_string()));
    assert!(report.total() <= 1);

    assert_eq!(fx.engine.status(), SyncStatus::default());
    assert_eq!(storage.peek(QUEUE_KEY), None);
    assert!(fx.engine.dead_letters().is_empty());
}

#[tokio::test]
async fn teardown_during_a_drain_does_not_dead_letter() {
    let storage = Arc::new(MemoryStorage::new());
    let fx = fixture_with(storage.clone());
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;

    let mut last_try = MutationRecord::merge("invoices", "inv-1", Payload::new(), 1_000);
    last_try.retry_count = MAX_RETRIES - 1;
    fx.engine.enqueue_mutation(last_try).await.unwrap();
    fx.engine
        .enqueue_mutation(MutationRecord::merge("invoices", "inv-2", Payload::new(), 1_000))
        .await
        .unwrap();
    fx.remote.fail(true);

    let drain = start_slow_drain(&fx).await;
    fx.engine.teardown().await;
    drain.await.unwrap();

    assert!(fx.engine.dead_letters().is_empty());
    assert_eq!(storage.peek(DEAD_LETTER_KEY), None);
    assert_eq!(storage.peek(QUEUE_KEY), None);
    // Only the call in flight at teardown reached the remote.
    assert_eq!(fx.remote.calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Write routing
// ============================================================================

#[tokio::test]
async fn online_write_goes_straight_to_the_remote() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;

    let outcome = fx
        .engine
        .offline_write(
            MutationKind::Add,
            USER,
            "clients",
            None,
            payload(json!({"name": "Acme Plumbing"})),
        )
        .await
        .unwrap();

    let WriteOutcome::Applied { doc_id } = outcome else {
        panic!("expected applied write");
    };
    assert!(fx.remote.inner.get(USER, "clients", &doc_id).is_some());
    assert_eq!(fx.engine.status().pending_count, 0);
}

#[tokio::test]
async fn failed_online_write_falls_back_to_queue() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    fx.remote.fail(true);

    let outcome = fx
        .engine
        .offline_write(
            MutationKind::Merge,
            USER,
            "jobs",
            Some("job-9"),
            payload(json!({"status": "en route"})),
        )
        .await
        .unwrap();
    assert!(outcome.is_queued());
    assert_eq!(outcome.local_id(Some("job-9")), "job-9");
    assert_eq!(fx.engine.status().pending_count, 1);

    fx.remote.fail(false);
    let report = fx.engine.flush_queue(USER).await.unwrap();
    assert_eq!(report.processed, 1);
}

#[tokio::test]
async fn malformed_write_is_rejected() {
    let fx = fixture();
    fx.engine.initialize(USER).await;

    let result = fx
        .engine
        .offline_write(MutationKind::Update, USER, "jobs", None, Payload::new())
        .await;
    assert!(matches!(result, Err(Error::InvalidMutation(_))));
    assert_eq!(fx.engine.status().pending_count, 0);
}

// ============================================================================
// Attachments
// ============================================================================

#[tokio::test]
async fn attachments_are_uploaded_before_apply() {
    let fx = fixture();
    fx.engine.initialize(USER).await;

    let request = WriteRequest::new(
        MutationKind::Merge,
        "jobs",
        Some("job-1".into()),
        payload(json!({"signature": {"image": "file:///sig.png"}})),
    )
    .with_attachments(vec![PendingAttachment::new(
        "signature.image",
        "file:///sig.png",
    )]);
    fx.engine.write(USER, request).await.unwrap();

    fx.clock.set(2_000);
    go_online(&fx.engine).await;

    let doc = fx.remote.inner.get(USER, "jobs", "job-1").unwrap();
    assert_eq!(
        doc["signature"]["image"],
        "memory://users/tech-42/jobs/signature.image_2000"
    );
    assert_eq!(fx.attachments.len(), 1);
}

#[tokio::test]
async fn failed_upload_keeps_local_reference() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    fx.attachments.fail_on("file:///photo.jpg");

    let request = WriteRequest::new(
        MutationKind::Add,
        "jobs",
        None,
        payload(json!({"photo": "file:///photo.jpg"})),
    )
    .with_attachments(vec![PendingAttachment::new("photo", "file:///photo.jpg")]);
    let outcome = fx.engine.write(USER, request).await.unwrap();

    let WriteOutcome::Applied { doc_id } = outcome else {
        panic!("expected applied write");
    };
    let doc = fx.remote.inner.get(USER, "jobs", &doc_id).unwrap();
    assert_eq!(doc["photo"], "file:///photo.jpg");
    assert!(fx.attachments.is_empty());
}

#[tokio::test]
async fn queued_fallback_does_not_upload_twice() {
    let fx = fixture();
    fx.engine.initialize(USER).await;
    go_online(&fx.engine).await;
    fx.remote.fail(true);

    let request = WriteRequest::new(
        MutationKind::Merge,
        "jobs",
        Some("job-3".into()),
        payload(json!({"photo": "file:///before.jpg"})),
    )
    .with_attachments(vec![PendingAttachment::new("photo", "file:///before.jpg")]);
    let outcome = fx.engine.write(USER, request).await.unwrap();
    assert!(outcome.is_queued());
    assert_eq!(fx.attachments.len(), 1);

    fx.remote.fail(false);
    fx.clock.set(3_000);
    let report = fx.engine.flush_queue(USER).await.unwrap();
    assert_eq!(report.processed, 1);

    assert_eq!(fx.attachments.len(), 1);
    let doc = fx.remote.inner.get(USER, "jobs", "job-3").unwrap();
    assert_eq!(doc["photo"], "memory://users/tech-42/jobs/photo_1000");
}
