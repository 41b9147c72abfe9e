//! Network reachability tracking.
//!
//! The monitor keeps a last-known online/offline snapshot that can be read
//! synchronously, notifies subscribers on every transition, and fires a single
//! reconnect callback on each offline→online edge. The platform integration
//! feeds it through [`ConnectivityMonitor::report`]; a fresh reading can be
//! forced through an injected [`NetworkProbe`].
//!
//! Transitions are not debounced: a flapping connection fires one reconnect
//! per offline→online edge.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Called with the new state on every transition.
pub type ChangeListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Called once per offline→online edge.
pub type ReconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Source of a fresh reachability reading.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

type Listeners = Mutex<Vec<(u64, ChangeListener)>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Tracks whether the device is online.
///
/// Starts offline until the first report or [`fetch_state`](Self::fetch_state).
pub struct ConnectivityMonitor {
    connected: AtomicBool,
    listeners: Arc<Listeners>,
    next_listener: AtomicU64,
    reconnect: Mutex<Option<ReconnectCallback>>,
    probe: Option<Arc<dyn NetworkProbe>>,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("connected", &self.is_connected())
            .field("listeners", &lock(&self.listeners).len())
            .finish()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    /// A monitor without a probe; state changes only through `report`.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
            reconnect: Mutex::new(None),
            probe: None,
        }
    }

    /// A monitor that asks `probe` when [`fetch_state`](Self::fetch_state) is called.
    pub fn with_probe(probe: Arc<dyn NetworkProbe>) -> Self {
        Self {
            probe: Some(probe),
            ..Self::new()
        }
    }

    /// Last known state. Never blocks.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Force a fresh reading from the probe and record it.
    ///
    /// Without a probe this returns the current snapshot.
    pub async fn fetch_state(&self) -> bool {
        match &self.probe {
            Some(probe) => {
                let reachable = probe.is_reachable().await;
                self.report(reachable);
                reachable
            }
            None => self.is_connected(),
        }
    }

    /// Record a reachability change reported by the platform.
    ///
    /// Reporting the current state again is not a transition and notifies
    /// nobody.
    pub fn report(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if previous == connected {
            return;
        }

        tracing::info!(online = connected, "connectivity changed");

        let listeners: Vec<ChangeListener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(connected);
        }

        if connected {
            let callback = lock(&self.reconnect).clone();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    /// Register a listener for state transitions.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped or explicitly unsubscribed.
    pub fn subscribe(&self, on_change: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners).push((id, Arc::new(on_change)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Set the callback fired on each offline→online edge, replacing any
    /// previous one.
    pub fn on_reconnect(&self, callback: impl Fn() + Send + Sync + 'static) {
        *lock(&self.reconnect) = Some(Arc::new(callback));
    }

    /// Remove the reconnect callback.
    pub fn clear_reconnect(&self) {
        *lock(&self.reconnect) = None;
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

/// Handle returned by [`ConnectivityMonitor::subscribe`].
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    /// Stop receiving transitions.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
