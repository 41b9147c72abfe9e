//! Mutation records: the unit of queued work.
//!
//! A write that cannot be applied to the remote store right away is captured
//! as a [`MutationRecord`] and appended to the mutation log. Records that
//! exhaust their retry budget become [`DeadLetterRecord`]s.

use crate::{error::Result, CollectionName, DocId, Error, MutationId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key-to-value mapping written to a remote document.
pub type Payload = Map<String, Value>;

/// The three remote write primitives a mutation can replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    /// Create a new document; the remote store assigns the id.
    Add,
    /// Overwrite fields of an existing document.
    Update,
    /// Merge-set fields into a document, creating it if absent.
    Merge,
}

impl MutationKind {
    /// Whether this kind addresses an existing document id.
    pub fn requires_doc_id(self) -> bool {
        matches!(self, MutationKind::Update | MutationKind::Merge)
    }
}

/// A binary field that still points at a local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAttachment {
    /// Dotted path of the payload field the remote reference is written to
    pub field_path: String,
    /// Local reference (file path or `file://` URI)
    pub local_ref: String,
}

impl PendingAttachment {
    pub fn new(field_path: impl Into<String>, local_ref: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            local_ref: local_ref.into(),
        }
    }
}

/// A deferred write operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    /// Locally generated identifier (`{timestamp}-{random}`)
    pub id: MutationId,
    pub kind: MutationKind,
    /// Logical entity type, e.g. `jobs` or `clients`
    pub collection: CollectionName,
    /// Target document; present iff `kind` is `Update` or `Merge`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<DocId>,
    pub payload: Payload,
    #[serde(default)]
    pub pending_attachments: Vec<PendingAttachment>,
    /// Local "as-of" time of the edit, compared against the remote `updatedAt`
    pub enqueued_at: Timestamp,
    #[serde(default)]
    pub retry_count: u32,
}

impl MutationRecord {
    /// Build a new record with a freshly generated id and zero retries.
    pub fn new(
        kind: MutationKind,
        collection: impl Into<CollectionName>,
        doc_id: Option<DocId>,
        payload: Payload,
        enqueued_at: Timestamp,
    ) -> Self {
        Self {
            id: generate_id(enqueued_at),
            kind,
            collection: collection.into(),
            doc_id,
            payload,
            pending_attachments: Vec::new(),
            enqueued_at,
            retry_count: 0,
        }
    }

    /// Shorthand for an `Add` mutation.
    pub fn add(collection: impl Into<CollectionName>, payload: Payload, at: Timestamp) -> Self {
        Self::new(MutationKind::Add, collection, None, payload, at)
    }

    /// Shorthand for an `Update` mutation.
    pub fn update(
        collection: impl Into<CollectionName>,
        doc_id: impl Into<DocId>,
        payload: Payload,
        at: Timestamp,
    ) -> Self {
        Self::new(
            MutationKind::Update,
            collection,
            Some(doc_id.into()),
            payload,
            at,
        )
    }

    /// Shorthand for a `Merge` mutation.
    pub fn merge(
        collection: impl Into<CollectionName>,
        doc_id: impl Into<DocId>,
        payload: Payload,
        at: Timestamp,
    ) -> Self {
        Self::new(
            MutationKind::Merge,
            collection,
            Some(doc_id.into()),
            payload,
            at,
        )
    }

    /// Attach local binary references that must be uploaded before applying.
    pub fn with_attachments(mut self, attachments: Vec<PendingAttachment>) -> Self {
        self.pending_attachments = attachments;
        self
    }

    /// Check the `docId` invariant.
    pub fn validate(&self) -> Result<()> {
        if self.collection.is_empty() {
            return Err(Error::InvalidMutation("collection is empty".into()));
        }
        match (self.kind.requires_doc_id(), &self.doc_id) {
            (true, None) => Err(Error::InvalidMutation(format!(
                "{:?} mutation {} has no docId",
                self.kind, self.id
            ))),
            (true, Some(id)) if id.is_empty() => Err(Error::InvalidMutation(format!(
                "{:?} mutation {} has an empty docId",
                self.kind, self.id
            ))),
            (false, Some(_)) => Err(Error::InvalidMutation(format!(
                "add mutation {} must not carry a docId",
                self.id
            ))),
            _ => Ok(()),
        }
    }
}

/// A mutation that exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    #[serde(flatten)]
    pub mutation: MutationRecord,
    pub failed_at: Timestamp,
}

impl DeadLetterRecord {
    pub fn new(mutation: MutationRecord, failed_at: Timestamp) -> Self {
        Self {
            mutation,
            failed_at,
        }
    }
}

/// Generate a mutation id: millisecond timestamp plus a random suffix.
///
/// Ids sort roughly by creation time but uniqueness comes from the suffix.
pub fn generate_id(timestamp: Timestamp) -> MutationId {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", timestamp, &random[..12])
}
