//! StateStore - reconciles full states and updates into one current snapshot
//!
//! The current snapshot lives in a `watch` channel as `Option<Arc<Snapshot>>`.
//! Replacement is serialised behind `replace_lock`; readers just clone the
//! `Arc` and never observe a half-applied update.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::events::{HandleOutcome, StoreEvent, SubscriberFn, SubscriptionId};
use crate::connection::ConnectionHandler;
use crate::model::{PatchEffect, ProtocolVersion, Snapshot};
use crate::protocol::{Envelope, StatePayload, UpdatePayload};

/// Holds the current device snapshot and notifies subscribers on change
pub struct StateStore {
    snapshot: watch::Sender<Option<Arc<Snapshot>>>,
    connected: AtomicBool,
    replace_lock: Mutex<()>,
    subscribers: RwLock<Vec<(SubscriptionId, SubscriberFn)>>,
    next_subscription: AtomicUsize,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create an empty store (no snapshot, not connected)
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            snapshot,
            connected: AtomicBool::new(false),
            replace_lock: Mutex::new(()),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicUsize::new(0),
        }
    }

    /// Current snapshot, or None before the first full state / after a disconnect
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connected and holding real state
    pub fn is_available(&self) -> bool {
        self.is_connected() && self.snapshot.borrow().is_some()
    }

    /// Receiver that observes every snapshot replacement
    pub fn watch(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.snapshot.subscribe()
    }

    /// Wait until a snapshot is present, up to `timeout`
    pub async fn wait_for_snapshot(&self, timeout: Duration) -> Option<Arc<Snapshot>> {
        let mut rx = self.watch();
        let ready = tokio::time::timeout(timeout, rx.wait_for(|s| s.is_some())).await;
        match ready {
            Ok(Ok(snapshot)) => snapshot.clone(),
            _ => None,
        }
    }

    /// Subscribe to store events
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.subscribers.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a subscriber; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    /// Apply one decoded envelope
    pub fn handle(&self, envelope: Envelope) -> HandleOutcome {
        match envelope {
            Envelope::State(state) => self.apply_state(&state),
            Envelope::Update(update) => self.apply_update(&update),
            Envelope::Unknown { message_type } => {
                debug!("Unknown message type {:?}, ignoring", message_type);
                HandleOutcome::Ignored
            },
        }
    }

    /// Mark the connection as live. State only becomes available once the
    /// device sends its first full state.
    pub fn handle_connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        debug!("State store: connected, waiting for full state");
    }

    /// Drop the snapshot so every dependent control turns unavailable
    pub fn handle_disconnect(&self) {
        let _guard = self.replace_lock.lock();
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        let previous = self.snapshot.send_replace(None);

        if previous.is_some() || was_connected {
            debug!("State store: disconnected, snapshot cleared");
            self.notify(&StoreEvent::DataChanged);
        }
    }

    fn apply_state(&self, state: &StatePayload) -> HandleOutcome {
        let next = Arc::new(Snapshot::from_state(state));

        let _guard = self.replace_lock.lock();
        let previous = self.snapshot.send_replace(Some(Arc::clone(&next)));

        let Some(previous) = previous else {
            info!(
                "📥 First state received: {} (protocol {}), {} strips, {} buses",
                next.kind(),
                next.protocol(),
                next.strips().len(),
                next.buses().len()
            );
            self.notify(&StoreEvent::DataChanged);
            return HandleOutcome::FirstState;
        };

        // Version check takes precedence; a major change already implies a
        // full reinitialisation, so no topology signal accompanies it.
        let (outcome, invalidation) = if !previous.protocol().same_major(next.protocol()) {
            warn!(
                "Protocol major version changed {} -> {}, session must be reinitialised",
                previous.protocol(),
                next.protocol()
            );
            (
                HandleOutcome::ProtocolChanged,
                Some(StoreEvent::ProtocolChanged {
                    previous: previous.protocol().clone(),
                    current: next.protocol().clone(),
                }),
            )
        } else if previous.kind() != next.kind() {
            info!(
                "🔀 Device kind changed {} -> {}, rebuilding topology",
                previous.kind(),
                next.kind()
            );
            (
                HandleOutcome::TopologyChanged,
                Some(StoreEvent::TopologyChanged {
                    previous: previous.kind(),
                    current: next.kind(),
                }),
            )
        } else {
            if previous.protocol().minor() != next.protocol().minor() {
                self.minor_version_changed(previous.protocol(), next.protocol());
            }
            debug!("Full state replaced current snapshot");
            (HandleOutcome::Replaced, None)
        };

        if let Some(event) = invalidation {
            self.notify(&event);
        }
        self.notify(&StoreEvent::DataChanged);
        outcome
    }

    fn apply_update(&self, update: &UpdatePayload) -> HandleOutcome {
        let _guard = self.replace_lock.lock();

        let Some(current) = self.current() else {
            warn!(
                "Received update before state, ignoring ({} {} {})",
                update.target, update.index, update.param
            );
            return HandleOutcome::Rejected;
        };

        let (next, effect) = current.with_update(update);
        match effect {
            PatchEffect::Applied => {
                debug!(
                    target_kind = %update.target,
                    index = update.index,
                    param = %update.param,
                    value = %update.value,
                    "Update applied"
                );
            },
            PatchEffect::UnknownIndex => {
                debug!("Update for unknown {} index {}, dropped", update.target, update.index);
            },
            PatchEffect::UnknownParam => {
                debug!("Update for unknown {} param {:?}, dropped", update.target, update.param);
            },
            PatchEffect::InvalidValue => {
                warn!(
                    "Update {} {} {} has an invalid value {}, dropped",
                    update.target, update.index, update.param, update.value
                );
            },
        }

        self.snapshot.send_replace(Some(Arc::new(next)));
        self.notify(&StoreEvent::DataChanged);
        HandleOutcome::Patched(effect)
    }

    /// Hook for minor protocol changes. Accepted silently for now; kept so a
    /// consumer-facing signal can be added without touching the dispatch.
    fn minor_version_changed(&self, previous: &ProtocolVersion, current: &ProtocolVersion) {
        info!("Protocol minor version changed {} -> {}", previous, current);
    }

    fn notify(&self, event: &StoreEvent) {
        // Clone the list so a callback may (un)subscribe without deadlocking
        let subscribers: Vec<SubscriberFn> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for subscriber in subscribers {
            subscriber(event);
        }
    }
}

impl ConnectionHandler for StateStore {
    fn on_connect(&self) {
        self.handle_connect();
    }

    fn on_disconnect(&self) {
        self.handle_disconnect();
    }

    fn on_message(&self, envelope: Envelope) {
        self.handle(envelope);
    }
}
