//! Store notifications and per-envelope outcomes

use std::sync::Arc;

use crate::model::{DeviceKind, PatchEffect, ProtocolVersion};

/// Notification emitted by the StateStore after a snapshot is installed or cleared
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The current snapshot was replaced or cleared
    DataChanged,
    /// The device kind changed while connected; kind-dependent structures
    /// (control sets, bus-slot names) must be rebuilt
    TopologyChanged {
        previous: DeviceKind,
        current: DeviceKind,
    },
    /// The protocol major version changed while connected; the session must
    /// be fully reinitialised
    ProtocolChanged {
        previous: ProtocolVersion,
        current: ProtocolVersion,
    },
}

impl StoreEvent {
    /// Whether consumers must rebuild something beyond re-reading values
    pub fn is_invalidation(&self) -> bool {
        !matches!(self, StoreEvent::DataChanged)
    }
}

/// Result of handing one envelope to the StateStore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// First full state of the connection was adopted
    FirstState,
    /// Full state replaced a snapshot with the same kind and major version
    Replaced,
    /// Full state replaced a snapshot of another device kind
    TopologyChanged,
    /// Full state replaced a snapshot with another protocol major version
    ProtocolChanged,
    /// Update applied to the current snapshot (possibly as a no-op)
    Patched(PatchEffect),
    /// Update arrived with no baseline snapshot and was dropped
    Rejected,
    /// Unknown message type, ignored
    Ignored,
}

/// Subscriber callback type
///
/// Called synchronously after the snapshot has been installed. Callbacks must
/// not feed envelopes back into the store.
pub type SubscriberFn = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Handle returned by `StateStore::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(super) usize);
