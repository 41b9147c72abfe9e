//! Remote write adapter.
//!
//! The three write primitives the engine replays against the remote document
//! store, plus the single read the stale check needs. Every document lives
//! under a per-user namespace and carries a server-stamped `updatedAt`
//! (`createdAt` too, for documents created through `add`).
//!
//! Any error from an adapter means "the write did not apply"; callers treat it
//! as transient and retry.

use crate::clock::{Clock, SystemClock};
use crate::{error::Result, CollectionName, DocId, Error, MutationKind, Payload, Timestamp};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Field stamped on every write.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Field stamped on `add`.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Per-user remote document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a document and return its new id.
    async fn add(&self, user_id: &str, collection: &str, payload: Payload) -> Result<DocId>;

    /// Overwrite fields of an existing document.
    async fn update(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        payload: Payload,
    ) -> Result<()>;

    /// Merge fields into a document, creating it when absent.
    async fn merge(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        payload: Payload,
    ) -> Result<()>;

    /// Read a document's `updatedAt`, `None` when the document or the field
    /// is missing.
    async fn updated_at(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<Timestamp>>;
}

/// Run `kind` against `remote` and return the id of the written document.
///
/// For `Add` that is the id the remote store assigned; for `Update` and
/// `Merge` it is `doc_id`.
pub async fn dispatch(
    remote: &dyn RemoteStore,
    user_id: &str,
    collection: &str,
    kind: MutationKind,
    doc_id: Option<&str>,
    payload: Payload,
) -> Result<DocId> {
    match kind {
        MutationKind::Add => remote.add(user_id, collection, payload).await,
        MutationKind::Update | MutationKind::Merge => {
            let doc_id = doc_id.ok_or_else(|| {
                Error::InvalidMutation(format!("{:?} on {} without docId", kind, collection))
            })?;
            if kind == MutationKind::Update {
                remote.update(user_id, collection, doc_id, payload).await?;
            } else {
                remote.merge(user_id, collection, doc_id, payload).await?;
            }
            Ok(doc_id.to_string())
        }
    }
}

/// Await `call`, failing with [`Error::Timeout`] once `limit` elapses.
pub async fn with_timeout<T>(
    limit: Option<Duration>,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| Error::Timeout(limit.as_millis() as u64))?,
        None => call.await,
    }
}

/// Read a millisecond timestamp from a document field.
pub fn timestamp_field(fields: &Payload, name: &str) -> Option<Timestamp> {
    match fields.get(name)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as Timestamp)),
        _ => None,
    }
}

/// One write observed by [`InMemoryRemote`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWrite {
    pub kind: MutationKind,
    pub user_id: String,
    pub collection: CollectionName,
    pub doc_id: DocId,
    pub payload: Payload,
}

type DocKey = (String, CollectionName, DocId);

#[derive(Default)]
struct MemoryState {
    documents: HashMap<DocKey, Payload>,
    writes: Vec<RemoteWrite>,
    next_id: u64,
}

/// A remote store kept in memory.
///
/// Useful for local development and as the reference behaviour for tests:
/// it stamps timestamps the same way the server does and records every write
/// in application order.
pub struct InMemoryRemote {
    clock: Arc<dyn Clock>,
    state: Mutex<MemoryState>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for InMemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("InMemoryRemote")
            .field("documents", &state.documents.len())
            .field("writes", &state.writes.len())
            .finish()
    }
}

impl InMemoryRemote {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch a document.
    pub fn get(&self, user_id: &str, collection: &str, doc_id: &str) -> Option<Payload> {
        self.state()
            .documents
            .get(&key(user_id, collection, doc_id))
            .cloned()
    }

    /// Put a document in place without recording a write, e.g. to simulate
    /// an edit made by another device.
    pub fn seed(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        mut fields: Payload,
        updated_at: Timestamp,
    ) {
        fields.insert(UPDATED_AT_FIELD.into(), updated_at.into());
        self.state()
            .documents
            .insert(key(user_id, collection, doc_id), fields);
    }

    /// Every applied write, oldest first.
    pub fn writes(&self) -> Vec<RemoteWrite> {
        self.state().writes.clone()
    }

    /// Number of documents in all namespaces.
    pub fn document_count(&self) -> usize {
        self.state().documents.len()
    }
}

fn key(user_id: &str, collection: &str, doc_id: &str) -> DocKey {
    (user_id.into(), collection.into(), doc_id.into())
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn add(&self, user_id: &str, collection: &str, payload: Payload) -> Result<DocId> {
        let now = self.clock.now();
        let mut state = self.state();
        state.next_id += 1;
        let doc_id = format!("doc-{}", state.next_id);

        let mut fields = payload.clone();
        fields.insert(CREATED_AT_FIELD.into(), now.into());
        fields.insert(UPDATED_AT_FIELD.into(), now.into());
        state
            .documents
            .insert(key(user_id, collection, &doc_id), fields);
        state.writes.push(RemoteWrite {
            kind: MutationKind::Add,
            user_id: user_id.into(),
            collection: collection.into(),
            doc_id: doc_id.clone(),
            payload,
        });
        Ok(doc_id)
    }

    async fn update(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        payload: Payload,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state();
        let doc = state
            .documents
            .get_mut(&key(user_id, collection, doc_id))
            .ok_or_else(|| Error::DocumentNotFound {
                collection: collection.into(),
                doc_id: doc_id.into(),
            })?;
        for (field, value) in &payload {
            doc.insert(field.clone(), value.clone());
        }
        doc.insert(UPDATED_AT_FIELD.into(), now.into());
        state.writes.push(RemoteWrite {
            kind: MutationKind::Update,
            user_id: user_id.into(),
            collection: collection.into(),
            doc_id: doc_id.into(),
            payload,
        });
        Ok(())
    }

    async fn merge(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        payload: Payload,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state();
        let doc = state
            .documents
            .entry(key(user_id, collection, doc_id))
            .or_default();
        for (field, value) in &payload {
            doc.insert(field.clone(), value.clone());
        }
        doc.insert(UPDATED_AT_FIELD.into(), now.into());
        state.writes.push(RemoteWrite {
            kind: MutationKind::Merge,
            user_id: user_id.into(),
            collection: collection.into(),
            doc_id: doc_id.into(),
            payload,
        });
        Ok(())
    }

    async fn updated_at(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<Timestamp>> {
        Ok(self
            .get(user_id, collection, doc_id)
            .and_then(|doc| timestamp_field(&doc, UPDATED_AT_FIELD)))
    }
}
