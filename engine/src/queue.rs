//! Persistent mutation log.
//!
//! An ordered list of pending [`MutationRecord`]s mirrored to durable storage,
//! plus the append-only dead-letter list for mutations that ran out of
//! retries.
//!
//! Every mutating call updates the in-memory list first and then persists the
//! full list. A failed write is logged and otherwise ignored: the queue stays
//! usable and only durability across a crash is lost. A stored blob that
//! cannot be parsed is treated as an empty queue on [`MutationLog::load`].

use crate::config::{DEAD_LETTER_KEY, QUEUE_KEY};
use crate::storage::KeyValueStorage;
use crate::{error::Result, DeadLetterRecord, Error, MutationId, MutationRecord, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Durable FIFO of pending mutations.
pub struct MutationLog {
    storage: Arc<dyn KeyValueStorage>,
    queue_key: String,
    dead_letter_key: String,
    items: Mutex<Vec<MutationRecord>>,
    dead_letters: Mutex<Vec<DeadLetterRecord>>,
    /// Serializes writes so the last write always carries the latest state
    persist_lock: tokio::sync::Mutex<()>,
    loaded: AtomicBool,
}

impl std::fmt::Debug for MutationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationLog")
            .field("queue_key", &self.queue_key)
            .field("len", &self.len())
            .field("dead_letters", &lock(&self.dead_letters).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MutationLog {
    /// Create an empty log using the default storage keys.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_keys(storage, QUEUE_KEY, DEAD_LETTER_KEY)
    }

    /// Create an empty log persisted under custom keys.
    pub fn with_keys(
        storage: Arc<dyn KeyValueStorage>,
        queue_key: impl Into<String>,
        dead_letter_key: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            queue_key: queue_key.into(),
            dead_letter_key: dead_letter_key.into(),
            items: Mutex::new(Vec::new()),
            dead_letters: Mutex::new(Vec::new()),
            persist_lock: tokio::sync::Mutex::new(()),
            loaded: AtomicBool::new(false),
        }
    }

    /// Hydrate from durable storage and return the number of pending mutations.
    ///
    /// Calling this again in the same session is a no-op. Items enqueued
    /// before the first load are kept after the stored ones.
    pub async fn load(&self) -> usize {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return self.len();
        }

        let stored: Vec<MutationRecord> = self.read_list(&self.queue_key).await;
        let stored_dead: Vec<DeadLetterRecord> = self.read_list(&self.dead_letter_key).await;

        let count = {
            let mut items = lock(&self.items);
            let known: HashSet<MutationId> = stored.iter().map(|m| m.id.clone()).collect();
            let early: Vec<MutationRecord> = items
                .drain(..)
                .filter(|m| !known.contains(&m.id))
                .collect();
            items.extend(stored);
            items.extend(early);
            items.len()
        };
        {
            let mut dead = lock(&self.dead_letters);
            let early = std::mem::take(&mut *dead);
            dead.extend(stored_dead);
            dead.extend(early);
        }

        tracing::debug!(pending = count, "mutation log loaded");
        count
    }

    /// Append a mutation and return its id.
    ///
    /// Fails only when the record violates the `docId` invariant.
    pub async fn enqueue(&self, item: MutationRecord) -> Result<MutationId> {
        item.validate()?;
        let id = item.id.clone();
        let len = {
            let mut items = lock(&self.items);
            items.push(item);
            items.len()
        };
        tracing::debug!(mutation_id = %id, pending = len, "mutation enqueued");
        self.persist_queue().await;
        Ok(id)
    }

    /// Remove a mutation by id. Unknown ids are ignored.
    pub async fn dequeue(&self, id: &str) {
        let removed = {
            let mut items = lock(&self.items);
            let before = items.len();
            items.retain(|m| m.id != id);
            before != items.len()
        };
        if removed {
            tracing::debug!(mutation_id = %id, "mutation dequeued");
            self.persist_queue().await;
        }
    }

    /// Replace a stored mutation in place, keeping its queue position.
    pub async fn update(&self, item: MutationRecord) -> Result<()> {
        {
            let mut items = lock(&self.items);
            let slot = items
                .iter_mut()
                .find(|m| m.id == item.id)
                .ok_or_else(|| Error::MutationNotFound(item.id.clone()))?;
            *slot = item;
        }
        self.persist_queue().await;
        Ok(())
    }

    /// Whether a mutation with this id is still pending.
    pub fn contains(&self, id: &str) -> bool {
        lock(&self.items).iter().any(|m| m.id == id)
    }

    /// Number of pending mutations.
    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the pending mutations in FIFO order.
    pub fn all(&self) -> Vec<MutationRecord> {
        lock(&self.items).clone()
    }

    /// Drop every pending mutation, in memory and on disk.
    ///
    /// The next [`load`](Self::load) reads storage again.
    pub async fn clear(&self) {
        lock(&self.items).clear();
        self.loaded.store(false, Ordering::SeqCst);

        let _guard = self.persist_lock.lock().await;
        if let Err(e) = self.storage.remove(&self.queue_key).await {
            tracing::warn!(key = %self.queue_key, error = %e, "failed to clear mutation queue");
        }
    }

    /// Move a mutation from the pending log into dead-letter storage.
    ///
    /// A mutation that is no longer in the log (dequeued, or wiped by
    /// [`clear`](Self::clear)) is not dead-lettered. Returns whether it was.
    pub async fn dead_letter(&self, item: MutationRecord, failed_at: Timestamp) -> bool {
        let removed = {
            let mut items = lock(&self.items);
            let before = items.len();
            items.retain(|m| m.id != item.id);
            before != items.len()
        };
        if !removed {
            tracing::debug!(mutation_id = %item.id, "not dead-lettering a mutation that left the log");
            return false;
        }
        lock(&self.dead_letters).push(DeadLetterRecord::new(item, failed_at));
        self.persist_queue().await;
        self.persist_dead_letters().await;
        true
    }

    /// Copy of all dead-lettered mutations, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetterRecord> {
        lock(&self.dead_letters).clone()
    }

    /// Remove one dead letter and return it, e.g. to replay it by hand.
    pub async fn take_dead_letter(&self, id: &str) -> Option<DeadLetterRecord> {
        let taken = {
            let mut dead = lock(&self.dead_letters);
            let pos = dead.iter().position(|d| d.mutation.id == id)?;
            dead.remove(pos)
        };
        self.persist_dead_letters().await;
        Some(taken)
    }

    /// Drop the dead-letter list, in memory and on disk.
    pub async fn clear_dead_letters(&self) {
        lock(&self.dead_letters).clear();
        let _guard = self.persist_lock.lock().await;
        if let Err(e) = self.storage.remove(&self.dead_letter_key).await {
            tracing::warn!(key = %self.dead_letter_key, error = %e, "failed to clear dead letters");
        }
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.storage.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to read stored list, starting empty");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    bytes = raw.len(),
                    "stored list is corrupt, starting empty"
                );
                Vec::new()
            }
        }
    }

    async fn persist_queue(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.all();
        write_list(self.storage.as_ref(), &self.queue_key, &snapshot).await;
    }

    async fn persist_dead_letters(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.dead_letters();
        write_list(self.storage.as_ref(), &self.dead_letter_key, &snapshot).await;
    }
}

async fn write_list<T: Serialize>(storage: &dyn KeyValueStorage, key: &str, list: &[T]) {
    let raw = match serde_json::to_string(list) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "failed to serialize list");
            return;
        }
    };
    if let Err(e) = storage.set(key, &raw).await {
        tracing::warn!(key = %key, error = %e, "failed to persist list");
    }
}
