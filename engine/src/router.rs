//! Write router.
//!
//! Every logical write from the app goes through [`WriteRouter::offline_write`]:
//! when the device looks offline the write is queued straight away; when it
//! looks online the write is attempted against the remote store and queued
//! only if that attempt fails. A queued fallback keeps the attachments that
//! already uploaded, so the drain does not upload them twice. A write is never lost to connectivity, but an
//! `Add` that ends up queued has no remote id yet, only the mutation id as a
//! temporary local identifier.

use crate::attachments::AttachmentResolver;
use crate::clock::Clock;
use crate::connectivity::ConnectivityMonitor;
use crate::orchestrator::SyncOrchestrator;
use crate::remote::{self, RemoteStore};
use crate::{
    error::Result, DocId, MutationId, MutationKind, MutationRecord, Payload, PendingAttachment,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// What happened to a routed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum WriteOutcome {
    /// Written to the remote store; `doc_id` is authoritative.
    #[serde(rename_all = "camelCase")]
    Applied { doc_id: DocId },
    /// Deferred to the mutation log.
    #[serde(rename_all = "camelCase")]
    Queued { mutation_id: MutationId },
}

impl WriteOutcome {
    /// Id to key local caches by: the remote id when applied, otherwise the
    /// given document id or, for a queued `Add`, the mutation id.
    pub fn local_id<'a>(&'a self, doc_id: Option<&'a str>) -> &'a str {
        match self {
            WriteOutcome::Applied { doc_id: remote_id } => remote_id.as_str(),
            WriteOutcome::Queued { mutation_id } => doc_id.unwrap_or(mutation_id.as_str()),
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, WriteOutcome::Queued { .. })
    }
}

/// A single write request.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub kind: MutationKind,
    pub collection: String,
    pub doc_id: Option<DocId>,
    pub payload: Payload,
    pub attachments: Vec<PendingAttachment>,
}

impl WriteRequest {
    pub fn new(
        kind: MutationKind,
        collection: impl Into<String>,
        doc_id: Option<DocId>,
        payload: Payload,
    ) -> Self {
        Self {
            kind,
            collection: collection.into(),
            doc_id,
            payload,
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<PendingAttachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Routes writes to the remote store or the mutation log.
#[derive(Clone)]
pub struct WriteRouter {
    monitor: Arc<ConnectivityMonitor>,
    remote: Arc<dyn RemoteStore>,
    resolver: Arc<AttachmentResolver>,
    sync: SyncOrchestrator,
    clock: Arc<dyn Clock>,
    call_timeout: Option<Duration>,
}

impl std::fmt::Debug for WriteRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteRouter")
            .field("online", &self.monitor.is_connected())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl WriteRouter {
    pub fn new(
        monitor: Arc<ConnectivityMonitor>,
        remote: Arc<dyn RemoteStore>,
        resolver: Arc<AttachmentResolver>,
        sync: SyncOrchestrator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            monitor,
            remote,
            resolver,
            sync,
            clock,
            call_timeout: None,
        }
    }

    /// Bound the immediate remote attempt; a timeout falls back to queueing.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Route one write.
    ///
    /// Fails only if the request itself is malformed (`docId` missing for
    /// `Update`/`Merge` or present for `Add`).
    pub async fn offline_write(
        &self,
        kind: MutationKind,
        user_id: &str,
        collection: &str,
        doc_id: Option<&str>,
        payload: Payload,
    ) -> Result<WriteOutcome> {
        let request = WriteRequest::new(kind, collection, doc_id.map(str::to_string), payload);
        self.write(user_id, request).await
    }

    /// Route a write that may carry pending attachments.
    pub async fn write(&self, user_id: &str, request: WriteRequest) -> Result<WriteOutcome> {
        let mut mutation = MutationRecord::new(
            request.kind,
            request.collection,
            request.doc_id,
            request.payload,
            self.clock.now(),
        )
        .with_attachments(request.attachments);
        mutation.validate()?;

        if !self.monitor.is_connected() {
            return self.defer(mutation).await;
        }

        let collection = mutation.collection.clone();
        self.resolver.resolve(user_id, &collection, &mut mutation).await;
        let attempt = remote::with_timeout(
            self.call_timeout,
            remote::dispatch(
                self.remote.as_ref(),
                user_id,
                &mutation.collection,
                mutation.kind,
                mutation.doc_id.as_deref(),
                mutation.payload.clone(),
            ),
        )
        .await;

        match attempt {
            Ok(doc_id) => Ok(WriteOutcome::Applied { doc_id }),
            Err(e) => {
                tracing::warn!(
                    collection = %mutation.collection,
                    kind = ?mutation.kind,
                    error = %e,
                    "remote write failed, queueing"
                );
                self.defer(mutation).await
            }
        }
    }

    /// Shorthand for an `Add`.
    pub async fn add(
        &self,
        user_id: &str,
        collection: &str,
        payload: Payload,
    ) -> Result<WriteOutcome> {
        self.offline_write(MutationKind::Add, user_id, collection, None, payload)
            .await
    }

    /// Shorthand for an `Update`.
    pub async fn update(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        payload: Payload,
    ) -> Result<WriteOutcome> {
        self.offline_write(MutationKind::Update, user_id, collection, Some(doc_id), payload)
            .await
    }

    /// Shorthand for a `Merge`.
    pub async fn merge(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        payload: Payload,
    ) -> Result<WriteOutcome> {
        self.offline_write(MutationKind::Merge, user_id, collection, Some(doc_id), payload)
            .await
    }

    async fn defer(&self, mutation: MutationRecord) -> Result<WriteOutcome> {
        let mutation_id = self.sync.enqueue_mutation(mutation).await?;
        Ok(WriteOutcome::Queued { mutation_id })
    }
}
