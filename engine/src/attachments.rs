//! Attachment resolution.
//!
//! Photos and signatures are captured as local file references. Before a
//! mutation is applied, each pending attachment is uploaded to durable blob
//! storage under `users/{userId}/{collection}/{fieldPath}_{timestamp}` and the
//! payload field is rewritten to the returned remote reference.
//!
//! A failed upload leaves that field's local reference in place and does not
//! stop the remaining uploads. The attachment stays pending on the mutation,
//! so a retry uploads only what is still missing.

use crate::clock::Clock;
use crate::{error::Result, Error, MutationRecord, Payload};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Blob storage addressed by path.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Upload the file behind `local_ref` to `remote_path` and return a
    /// durable reference (URL) to it.
    async fn upload(&self, remote_path: &str, local_ref: &str) -> Result<String>;
}

/// Uploads pending attachments and rewrites payloads.
pub struct AttachmentResolver {
    store: Arc<dyn AttachmentStore>,
    clock: Arc<dyn Clock>,
    call_timeout: Option<Duration>,
}

impl std::fmt::Debug for AttachmentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentResolver")
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl AttachmentResolver {
    pub fn new(store: Arc<dyn AttachmentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            call_timeout: None,
        }
    }

    /// Bound each upload; an upload that exceeds it counts as failed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Deterministic remote path for an attachment.
    pub fn remote_path(user_id: &str, collection: &str, field_path: &str, at: u64) -> String {
        format!("users/{}/{}/{}_{}", user_id, collection, field_path, at)
    }

    /// Upload the pending attachments of `mutation` and rewrite its payload
    /// in place.
    ///
    /// Uploaded attachments are dropped from `pending_attachments`; the ones
    /// that failed stay there so a later attempt uploads only those.
    pub async fn resolve(&self, user_id: &str, collection: &str, mutation: &mut MutationRecord) {
        let pending = std::mem::take(&mut mutation.pending_attachments);

        for attachment in pending {
            let path = Self::remote_path(
                user_id,
                collection,
                &attachment.field_path,
                self.clock.now(),
            );
            match self.upload(&path, &attachment.local_ref).await {
                Ok(url) => {
                    set_field(&mut mutation.payload, &attachment.field_path, Value::String(url));
                }
                Err(e) => {
                    tracing::warn!(
                        mutation_id = %mutation.id,
                        field = %attachment.field_path,
                        error = %e,
                        "attachment upload failed, keeping local reference"
                    );
                    mutation.pending_attachments.push(attachment);
                }
            }
        }
    }

    async fn upload(&self, path: &str, local_ref: &str) -> Result<String> {
        crate::remote::with_timeout(self.call_timeout, self.store.upload(path, local_ref)).await
    }
}

/// Write `value` at a dotted `path`, creating intermediate objects.
///
/// A non-object value in the middle of the path is replaced by an object.
pub fn set_field(payload: &mut Payload, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = match segments.pop() {
        Some(last) => last,
        None => return,
    };

    let mut current = payload;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
    current.insert(last.to_string(), value);
}

/// Attachment store kept in memory.
///
/// Returns `memory://{path}` references. Local references listed through
/// [`fail_on`](Self::fail_on) are rejected.
#[derive(Debug, Default)]
pub struct MemoryAttachmentStore {
    blobs: Mutex<HashMap<String, String>>,
    failing: Mutex<Vec<String>>,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make uploads of `local_ref` fail.
    pub fn fail_on(&self, local_ref: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(local_ref.into());
    }

    /// Local reference stored at `remote_path`, if any.
    pub fn get(&self, remote_path: &str) -> Option<String> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(remote_path)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn upload(&self, remote_path: &str, local_ref: &str) -> Result<String> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|f| f == local_ref);
        if failing {
            return Err(Error::Attachment {
                field: remote_path.into(),
                reason: format!("cannot read {}", local_ref),
            });
        }
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(remote_path.into(), local_ref.into());
        Ok(format!("memory://{}", remote_path))
    }
}
