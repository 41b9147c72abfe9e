//! # Fieldsync Engine
//!
//! Offline mutation queue and synchronization engine for field-service apps.
//!
//! Field workers keep creating and editing jobs, clients, invoices and photos
//! while disconnected. Writes that cannot reach the remote document store are
//! captured as mutations in a durable log and replayed, in order, once the
//! device is back online.
//!
//! ## Components
//!
//! - [`ConnectivityMonitor`] - last-known online state, transition listeners
//!   and a reconnect callback fired on each offline→online edge
//! - [`MutationLog`] - durable FIFO of pending [`MutationRecord`]s plus the
//!   dead-letter list
//! - [`RemoteStore`] - the `add` / `update` / `merge` primitives, per user
//! - [`AttachmentResolver`] - uploads local photos/signatures and rewrites
//!   payload fields to remote references
//! - [`QueueProcessor`] - drains a snapshot of the log: stale check, upload,
//!   apply, retry or dead-letter
//! - [`SyncOrchestrator`] - [`SyncStatus`], single-flight flushing, session
//!   lifecycle
//! - [`WriteRouter`] - writes through when online, queues otherwise
//!
//! ## Conflict rule
//!
//! A queued `Update` whose `enqueuedAt` is older than the remote document's
//! `updatedAt` is discarded instead of applied. There is no other conflict
//! resolution: the remote wins when it is demonstrably newer, otherwise the
//! last writer wins.
//!
//! ## Quick Start
//!
//! ```rust
//! use fieldsync_engine::{
//!     InMemoryRemote, MemoryAttachmentStore, MemoryStorage, MutationKind, SyncConfig,
//!     SyncEngine,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let remote = Arc::new(InMemoryRemote::default());
//! let engine = SyncEngine::builder(SyncConfig::default())
//!     .storage(Arc::new(MemoryStorage::new()))
//!     .remote(remote.clone())
//!     .attachments(Arc::new(MemoryAttachmentStore::new()))
//!     .build()
//!     .unwrap();
//!
//! engine.initialize("user-1").await;
//!
//! // Offline: the write is queued.
//! let payload = json!({"title": "Replace boiler valve"});
//! let outcome = engine
//!     .offline_write(
//!         MutationKind::Add,
//!         "user-1",
//!         "jobs",
//!         None,
//!         payload.as_object().cloned().unwrap(),
//!     )
//!     .await
//!     .unwrap();
//! assert!(outcome.is_queued());
//! assert_eq!(engine.status().pending_count, 1);
//!
//! // Back online: the reconnect drains the queue in the background.
//! let mut status = engine.subscribe_status();
//! engine.monitor().report(true);
//! let synced = status.wait_for(|s| s.last_report.is_some()).await.unwrap().clone();
//! assert_eq!(synced.last_report.unwrap().processed, 1);
//! assert_eq!(synced.pending_count, 0);
//! assert_eq!(remote.writes().len(), 1);
//! # }
//! ```

pub mod attachments;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod http;
pub mod mutation;
pub mod orchestrator;
pub mod processor;
pub mod queue;
pub mod remote;
pub mod router;
pub mod status;
pub mod storage;

// Re-export main types at crate root
pub use attachments::{AttachmentResolver, AttachmentStore, MemoryAttachmentStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SyncConfig, MAX_RETRIES};
pub use connectivity::{ConnectivityMonitor, NetworkProbe, Subscription};
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use error::Error;
pub use http::{HttpAttachmentStore, HttpRemote};
pub use mutation::{DeadLetterRecord, MutationKind, MutationRecord, Payload, PendingAttachment};
pub use orchestrator::SyncOrchestrator;
pub use processor::{DrainReport, QueueProcessor};
pub use queue::MutationLog;
pub use remote::{InMemoryRemote, RemoteStore, RemoteWrite};
pub use router::{WriteOutcome, WriteRequest, WriteRouter};
pub use status::SyncStatus;
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};

/// Type aliases for clarity
pub type MutationId = String;
pub type CollectionName = String;
pub type DocId = String;
pub type Timestamp = u64;
