//! Composition root.
//!
//! [`SyncEngine`] wires storage, connectivity, adapters, the processor, the
//! orchestrator and the write router into one explicitly constructed
//! instance. The app builds it once at startup and passes it down; tests build
//! as many independent instances as they like.

use crate::attachments::{AttachmentResolver, AttachmentStore};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::http::{HttpAttachmentStore, HttpRemote};
use crate::orchestrator::SyncOrchestrator;
use crate::processor::{DrainReport, QueueProcessor};
use crate::queue::MutationLog;
use crate::remote::RemoteStore;
use crate::router::{WriteOutcome, WriteRequest, WriteRouter};
use crate::status::SyncStatus;
use crate::storage::{FileStorage, KeyValueStorage};
use crate::{error::Result, DeadLetterRecord, Error, MutationKind, MutationRecord, Payload};
use std::sync::Arc;
use tokio::sync::watch;

/// Builder for [`SyncEngine`]. Unset parts fall back to the configured
/// defaults: file storage under `storage_dir`, HTTP adapters against
/// `remote_base_url`, the system clock and a probe-less monitor.
pub struct SyncEngineBuilder {
    config: SyncConfig,
    storage: Option<Arc<dyn KeyValueStorage>>,
    remote: Option<Arc<dyn RemoteStore>>,
    attachments: Option<Arc<dyn AttachmentStore>>,
    monitor: Option<Arc<ConnectivityMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    token: Option<String>,
}

impl SyncEngineBuilder {
    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn attachments(mut self, attachments: Arc<dyn AttachmentStore>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    pub fn monitor(mut self, monitor: Arc<ConnectivityMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Bearer token for the default HTTP adapters.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn build(self) -> Result<SyncEngine> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(FileStorage::new(config.storage_dir.clone())));
        let monitor = self
            .monitor
            .unwrap_or_else(|| Arc::new(ConnectivityMonitor::new()));

        let base_url = config.remote_base_url.as_deref();
        let remote: Arc<dyn RemoteStore> = match (self.remote, base_url) {
            (Some(remote), _) => remote,
            (None, Some(url)) => Arc::new(with_token(HttpRemote::new(url), &self.token)),
            (None, None) => {
                return Err(Error::Config(
                    "no remote store given and FIELDSYNC_REMOTE_URL is unset".into(),
                ))
            }
        };
        let attachments: Arc<dyn AttachmentStore> = match (self.attachments, base_url) {
            (Some(store), _) => store,
            (None, Some(url)) => {
                let store = HttpAttachmentStore::new(url);
                Arc::new(match &self.token {
                    Some(token) => store.with_token(token.clone()),
                    None => store,
                })
            }
            (None, None) => {
                return Err(Error::Config(
                    "no attachment store given and FIELDSYNC_REMOTE_URL is unset".into(),
                ))
            }
        };

        let log = Arc::new(MutationLog::with_keys(
            storage,
            config.queue_key.clone(),
            config.dead_letter_key.clone(),
        ));
        let resolver = Arc::new(
            AttachmentResolver::new(attachments, clock.clone()).with_timeout(config.call_timeout),
        );
        let processor =
            QueueProcessor::new(log.clone(), remote.clone(), resolver.clone(), clock.clone())
                .with_max_retries(config.max_retries)
                .with_timeout(config.call_timeout);
        let sync = SyncOrchestrator::new(log, monitor.clone(), processor, clock.clone());
        let router = WriteRouter::new(monitor, remote, resolver, sync.clone(), clock)
            .with_timeout(config.call_timeout);

        Ok(SyncEngine { sync, router })
    }
}

fn with_token(remote: HttpRemote, token: &Option<String>) -> HttpRemote {
    match token {
        Some(token) => remote.with_token(token.clone()),
        None => remote,
    }
}

/// The caller-facing surface of the engine.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    sync: SyncOrchestrator,
    router: WriteRouter,
}

impl SyncEngine {
    pub fn builder(config: SyncConfig) -> SyncEngineBuilder {
        SyncEngineBuilder {
            config,
            storage: None,
            remote: None,
            attachments: None,
            monitor: None,
            clock: None,
            token: None,
        }
    }

    /// Start a session. See [`SyncOrchestrator::initialize`].
    pub async fn initialize(&self, user_id: &str) {
        self.sync.initialize(user_id).await
    }

    /// End a session, discarding pending work. See [`SyncOrchestrator::teardown`].
    pub async fn teardown(&self) {
        self.sync.teardown().await
    }

    /// Route a write. See [`WriteRouter::offline_write`].
    pub async fn offline_write(
        &self,
        kind: MutationKind,
        user_id: &str,
        collection: &str,
        doc_id: Option<&str>,
        payload: Payload,
    ) -> Result<WriteOutcome> {
        self.router
            .offline_write(kind, user_id, collection, doc_id, payload)
            .await
    }

    /// Route a write with pending attachments.
    pub async fn write(&self, user_id: &str, request: WriteRequest) -> Result<WriteOutcome> {
        self.router.write(user_id, request).await
    }

    /// Queue a prepared mutation directly.
    pub async fn enqueue_mutation(&self, item: MutationRecord) -> Result<String> {
        self.sync.enqueue_mutation(item).await
    }

    /// Manual drain, e.g. pull-to-refresh.
    pub async fn flush_queue(&self, user_id: &str) -> Option<DrainReport> {
        self.sync.flush_queue(user_id).await
    }

    pub fn status(&self) -> SyncStatus {
        self.sync.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.sync.subscribe_status()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterRecord> {
        self.sync.dead_letters()
    }

    pub async fn requeue_dead_letter(&self, id: &str) -> Result<String> {
        self.sync.requeue_dead_letter(id).await
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.sync
    }

    pub fn router(&self) -> &WriteRouter {
        &self.router
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        self.sync.monitor()
    }
}
