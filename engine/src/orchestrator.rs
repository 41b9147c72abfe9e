//! Sync orchestrator.
//!
//! Owns the [`SyncStatus`] the UI reads, the single-flight flush trigger and
//! the wiring between the connectivity monitor and the queue processor. One
//! instance is created per application root and shared by cloning; clones
//! share state.
//!
//! Session lifecycle:
//!
//! - [`initialize`](SyncOrchestrator::initialize) loads the log, reads the
//!   network state, mirrors connectivity into the status, arms the reconnect
//!   flush, and flushes right away when online with pending work.
//! - [`teardown`](SyncOrchestrator::teardown) disarms everything and discards
//!   whatever is still queued (sign-out).

use crate::clock::Clock;
use crate::connectivity::{ConnectivityMonitor, Subscription};
use crate::processor::{DrainReport, QueueProcessor};
use crate::queue::MutationLog;
use crate::status::SyncStatus;
use crate::{error::Result, DeadLetterRecord, Error, MutationId, MutationRecord};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;

struct Inner {
    log: Arc<MutationLog>,
    monitor: Arc<ConnectivityMonitor>,
    processor: QueueProcessor,
    clock: Arc<dyn Clock>,
    status: watch::Sender<SyncStatus>,
    syncing: AtomicBool,
    /// Bumped on teardown so a drain that outlives its session does not
    /// write status into the next one
    session: AtomicU64,
    drains: AtomicU64,
    subscription: Mutex<Option<Subscription>>,
    user_id: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears the single-flight flag however the drain ends.
struct SyncingGuard<'a> {
    inner: &'a Inner,
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.inner.syncing.store(false, Ordering::SeqCst);
        self.inner.status.send_modify(|s| s.is_syncing = false);
    }
}

/// Coordinates the mutation log, connectivity and draining.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("status", &self.status())
            .finish()
    }
}

impl SyncOrchestrator {
    pub fn new(
        log: Arc<MutationLog>,
        monitor: Arc<ConnectivityMonitor>,
        processor: QueueProcessor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            inner: Arc::new(Inner {
                log,
                monitor,
                processor,
                clock,
                status,
                syncing: AtomicBool::new(false),
                session: AtomicU64::new(0),
                drains: AtomicU64::new(0),
                subscription: Mutex::new(None),
                user_id: Mutex::new(None),
            }),
        }
    }

    /// Start a session for `user_id`.
    ///
    /// Must be called from within a Tokio runtime: reconnect flushes are
    /// spawned onto it.
    pub async fn initialize(&self, user_id: &str) {
        *lock(&self.inner.user_id) = Some(user_id.to_string());

        let pending = self.inner.log.load().await;
        let online = self.inner.monitor.fetch_state().await;
        self.inner.status.send_modify(|s| {
            s.is_online = online;
            s.pending_count = pending;
        });

        let weak = Arc::downgrade(&self.inner);
        let subscription = self.inner.monitor.subscribe(move |online| {
            if let Some(inner) = weak.upgrade() {
                inner.status.send_modify(|s| s.is_online = online);
            }
        });
        *lock(&self.inner.subscription) = Some(subscription);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let runtime = tokio::runtime::Handle::current();
        self.inner.monitor.on_reconnect(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let Some(user_id) = lock(&inner.user_id).clone() else {
                return;
            };
            let orchestrator = SyncOrchestrator { inner };
            runtime.spawn(async move {
                orchestrator.flush_queue(&user_id).await;
            });
        });

        tracing::info!(user_id = %user_id, pending, online, "sync session initialized");

        if online && pending > 0 {
            self.flush_queue(user_id).await;
        }
    }

    /// Append a mutation to the log and refresh `pendingCount`.
    pub async fn enqueue_mutation(&self, item: MutationRecord) -> Result<MutationId> {
        let id = self.inner.log.enqueue(item).await?;
        self.refresh_pending();
        Ok(id)
    }

    /// Run one drain unless one is already running or the device is offline.
    ///
    /// Returns `None` when the call was skipped. Never fails.
    pub async fn flush_queue(&self, user_id: &str) -> Option<DrainReport> {
        if !self.inner.monitor.is_connected() {
            tracing::debug!("offline, skipping flush");
            return None;
        }
        if self
            .inner
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("flush already in progress");
            return None;
        }
        let _guard = SyncingGuard { inner: &self.inner };

        let session = self.inner.session.load(Ordering::SeqCst);
        self.inner.drains.fetch_add(1, Ordering::SeqCst);
        self.inner.status.send_modify(|s| s.is_syncing = true);

        let report = self.inner.processor.process(user_id).await;

        if self.inner.session.load(Ordering::SeqCst) == session {
            let now = self.inner.clock.now();
            let pending = self.inner.log.len();
            self.inner.status.send_modify(|s| {
                s.pending_count = pending;
                s.last_sync_at = Some(now);
                s.last_report = Some(report);
            });
        }
        Some(report)
    }

    /// End the session: stop listening, drop queued and dead-lettered
    /// mutations, reset the status.
    pub async fn teardown(&self) {
        self.inner.session.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.subscription).take();
        self.inner.monitor.clear_reconnect();
        *lock(&self.inner.user_id) = None;

        let discarded = self.inner.log.len();
        self.inner.log.clear().await;
        self.inner.log.clear_dead_letters().await;
        self.inner.status.send_replace(SyncStatus::default());

        tracing::info!(discarded, "sync session torn down");
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Whether a drain is running right now.
    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::SeqCst)
    }

    /// Number of drains actually run since construction.
    pub fn drain_count(&self) -> u64 {
        self.inner.drains.load(Ordering::SeqCst)
    }

    /// The connectivity monitor this orchestrator listens to.
    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.inner.monitor
    }

    /// Mutations that exhausted their retries, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetterRecord> {
        self.inner.log.dead_letters()
    }

    /// Put a dead-lettered mutation back at the end of the log with a fresh
    /// retry budget.
    pub async fn requeue_dead_letter(&self, id: &str) -> Result<MutationId> {
        let dead = self
            .inner
            .log
            .take_dead_letter(id)
            .await
            .ok_or_else(|| Error::MutationNotFound(id.to_string()))?;
        let mut mutation = dead.mutation;
        mutation.retry_count = 0;
        tracing::info!(mutation_id = %mutation.id, "dead letter requeued");
        self.enqueue_mutation(mutation).await
    }

    fn refresh_pending(&self) {
        let pending = self.inner.log.len();
        self.inner.status.send_modify(|s| s.pending_count = pending);
    }
}
