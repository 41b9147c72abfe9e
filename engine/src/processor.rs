//! Queue processor: one drain pass over the mutation log.
//!
//! # Algorithm
//!
//! 1. Snapshot the log. Mutations enqueued while the drain runs wait for the
//!    next drain.
//! 2. For each mutation, in FIFO order:
//!    - `Update` only: read the remote `updatedAt`. If it is strictly newer
//!      than the mutation's `enqueuedAt`, the local edit is stale: drop it
//!      without writing.
//!    - Upload pending attachments and rewrite the payload.
//!    - A mutation that left the log meanwhile (sign-out clears it) is
//!      skipped and not counted.
//!    - Dispatch to `add`, `update` or `merge`.
//!    - On success remove the mutation from the log.
//!    - On failure bump `retryCount`; at `max_retries` move the mutation to
//!      dead-letter storage, otherwise persist the new count and the
//!      resolved payload and leave it queued.
//! 3. Report `{processed, failed, stale}`.
//!
//! Mutations are applied strictly one at a time so two edits to the same
//! document land in write order.

use crate::attachments::AttachmentResolver;
use crate::clock::Clock;
use crate::config::MAX_RETRIES;
use crate::queue::MutationLog;
use crate::remote::{self, RemoteStore};
use crate::{error::Result, Error, MutationKind, MutationRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Outcome counts of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Applied and removed from the log
    pub processed: usize,
    /// Attempted and failed; retried later or dead-lettered
    pub failed: usize,
    /// Discarded because the remote document was newer
    pub stale: usize,
}

impl DrainReport {
    /// Total mutations looked at.
    pub fn total(&self) -> usize {
        self.processed + self.failed + self.stale
    }
}

/// What happened to a single mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Applied,
    Stale,
    Failed,
    /// Left the log after the snapshot was taken; not counted.
    Skipped,
}

/// Drains the mutation log against the remote store.
pub struct QueueProcessor {
    log: Arc<MutationLog>,
    remote: Arc<dyn RemoteStore>,
    resolver: Arc<AttachmentResolver>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
    call_timeout: Option<Duration>,
}

impl std::fmt::Debug for QueueProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProcessor")
            .field("max_retries", &self.max_retries)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl QueueProcessor {
    pub fn new(
        log: Arc<MutationLog>,
        remote: Arc<dyn RemoteStore>,
        resolver: Arc<AttachmentResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            log,
            remote,
            resolver,
            clock,
            max_retries: MAX_RETRIES,
            call_timeout: None,
        }
    }

    /// Attempts allowed before dead-lettering.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Bound each remote read and write; an elapsed call is a transient failure.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Run one drain for `user_id`. Never fails: every error ends up in the
    /// report counters or the dead-letter log.
    pub async fn process(&self, user_id: &str) -> DrainReport {
        let snapshot = self.log.all();
        let mut report = DrainReport::default();

        tracing::info!(user_id = %user_id, pending = snapshot.len(), "drain started");

        for item in snapshot {
            match self.process_one(user_id, item).await {
                Outcome::Applied => report.processed += 1,
                Outcome::Stale => report.stale += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Skipped => {}
            }
        }

        tracing::info!(
            user_id = %user_id,
            processed = report.processed,
            failed = report.failed,
            stale = report.stale,
            remaining = self.log.len(),
            "drain finished"
        );
        report
    }

    async fn process_one(&self, user_id: &str, mut item: MutationRecord) -> Outcome {
        if !self.still_queued(&item) {
            return Outcome::Skipped;
        }

        if item.kind == MutationKind::Update {
            match self.is_stale(user_id, &item).await {
                Ok(true) => {
                    tracing::info!(
                        mutation_id = %item.id,
                        collection = %item.collection,
                        "remote document is newer, discarding stale update"
                    );
                    self.log.dequeue(&item.id).await;
                    return Outcome::Stale;
                }
                Ok(false) => {}
                Err(e) => {
                    self.record_failure(item, e).await;
                    return Outcome::Failed;
                }
            }
            if !self.still_queued(&item) {
                return Outcome::Skipped;
            }
        }

        match self.apply(user_id, &mut item).await {
            Ok(()) => {
                self.log.dequeue(&item.id).await;
                Outcome::Applied
            }
            Err(Error::MutationNotFound(_)) => Outcome::Skipped,
            Err(e) => {
                self.record_failure(item, e).await;
                Outcome::Failed
            }
        }
    }

    /// The log is cleared on sign-out while a drain may still hold a snapshot.
    fn still_queued(&self, item: &MutationRecord) -> bool {
        let queued = self.log.contains(&item.id);
        if !queued {
            tracing::debug!(mutation_id = %item.id, "mutation left the log, skipping");
        }
        queued
    }

    async fn is_stale(&self, user_id: &str, item: &MutationRecord) -> Result<bool> {
        let doc_id = doc_id(item)?;
        let remote_updated = remote::with_timeout(
            self.call_timeout,
            self.remote.updated_at(user_id, &item.collection, doc_id),
        )
        .await?;
        Ok(matches!(remote_updated, Some(remote) if remote > item.enqueued_at))
    }

    /// Upload attachments, then write. Uploads are kept on `item` so a failed
    /// write is retried without uploading them again.
    async fn apply(&self, user_id: &str, item: &mut MutationRecord) -> Result<()> {
        let collection = item.collection.clone();
        self.resolver.resolve(user_id, &collection, item).await;
        if !self.still_queued(item) {
            return Err(Error::MutationNotFound(item.id.clone()));
        }
        let doc_id = remote::with_timeout(
            self.call_timeout,
            remote::dispatch(
                self.remote.as_ref(),
                user_id,
                &item.collection,
                item.kind,
                item.doc_id.as_deref(),
                item.payload.clone(),
            ),
        )
        .await?;
        tracing::debug!(
            mutation_id = %item.id,
            doc_id = %doc_id,
            kind = ?item.kind,
            "queued mutation applied"
        );
        Ok(())
    }

    async fn record_failure(&self, mut item: MutationRecord, error: Error) {
        item.retry_count = item.retry_count.saturating_add(1);

        if item.retry_count >= self.max_retries {
            tracing::error!(
                mutation_id = %item.id,
                collection = %item.collection,
                retries = item.retry_count,
                error = %error,
                "mutation exhausted retries, moving to dead letters"
            );
            self.log.dead_letter(item, self.clock.now()).await;
            return;
        }

        tracing::warn!(
            mutation_id = %item.id,
            retries = item.retry_count,
            error = %error,
            "mutation failed, will retry on next drain"
        );
        let id = item.id.clone();
        if self.log.update(item).await.is_err() {
            // Removed from the log while the drain was running (e.g. sign-out).
            tracing::debug!(mutation_id = %id, "failed mutation no longer queued");
        }
    }
}

fn doc_id(item: &MutationRecord) -> Result<&str> {
    item.doc_id
        .as_deref()
        .ok_or_else(|| Error::InvalidMutation(format!("mutation {} has no docId", item.id)))
}
