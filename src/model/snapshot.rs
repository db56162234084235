//! Immutable mixer snapshot
//!
//! `Snapshot`, `Strip` and `Bus` are plain values. Nothing mutates them once
//! built: updates produce a new `Snapshot` (see `patch`), which is what lets
//! readers hold an `Arc<Snapshot>` without locking.

use std::collections::HashSet;
use tracing::{debug, warn};

use super::kind::{BusSlot, DeviceKind};
use super::version::ProtocolVersion;
use crate::protocol::{BusPayload, StatePayload, StripPayload};

/// Routing flags of one strip, one per bus slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Routes([bool; BusSlot::COUNT]);

impl Routes {
    pub fn get(&self, slot: BusSlot) -> bool {
        self.0[slot.position()]
    }

    /// Copy with one flag replaced
    pub fn with(mut self, slot: BusSlot, enabled: bool) -> Self {
        self.0[slot.position()] = enabled;
        self
    }

    /// Slots this strip is routed to
    pub fn active(&self) -> impl Iterator<Item = BusSlot> + '_ {
        BusSlot::all().filter(|slot| self.get(*slot))
    }
}

impl FromIterator<(BusSlot, bool)> for Routes {
    fn from_iter<I: IntoIterator<Item = (BusSlot, bool)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Routes::default(), |routes, (slot, on)| routes.with(slot, on))
    }
}

/// Input strip
#[derive(Debug, Clone, PartialEq)]
pub struct Strip {
    pub index: usize,
    pub label: String,
    pub mute: bool,
    /// Gain in dB
    pub gain: f64,
    pub is_virtual: bool,
    pub routes: Routes,
}

impl Strip {
    fn from_payload(kind: DeviceKind, payload: &StripPayload) -> Self {
        let routes = [
            (BusSlot::A1, payload.a1),
            (BusSlot::A2, payload.a2),
            (BusSlot::A3, payload.a3),
            (BusSlot::A4, payload.a4),
            (BusSlot::A5, payload.a5),
            (BusSlot::B1, payload.b1),
            (BusSlot::B2, payload.b2),
            (BusSlot::B3, payload.b3),
        ]
        .into_iter()
        .collect();

        Self {
            index: payload.index,
            label: resolve_label(payload.label.as_deref(), || kind.strip_label(payload.index)),
            mute: payload.mute,
            gain: payload.gain,
            is_virtual: payload.is_virtual,
            routes,
        }
    }
}

/// Output bus
#[derive(Debug, Clone, PartialEq)]
pub struct Bus {
    pub index: usize,
    pub label: String,
    pub mute: bool,
    /// Master gain in dB
    pub gain: f64,
}

impl Bus {
    fn from_payload(kind: DeviceKind, payload: &BusPayload) -> Self {
        Self {
            index: payload.index,
            label: resolve_label(payload.label.as_deref(), || kind.bus_label(payload.index)),
            mute: payload.mute,
            gain: payload.gain,
        }
    }
}

/// Device labels win; missing or blank labels fall back to the positional default
fn resolve_label(label: Option<&str>, fallback: impl FnOnce() -> String) -> String {
    match label {
        Some(l) if !l.trim().is_empty() => l.to_string(),
        _ => fallback(),
    }
}

/// Full device state at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    kind: DeviceKind,
    protocol: ProtocolVersion,
    strips: Vec<Strip>,
    buses: Vec<Bus>,
}

impl Snapshot {
    /// Build a snapshot, keeping the first occurrence of any duplicated index
    pub fn new(kind: DeviceKind, protocol: ProtocolVersion, strips: Vec<Strip>, buses: Vec<Bus>) -> Self {
        let strips = dedup_by_index(strips, |s| s.index, "strip");
        let buses = dedup_by_index(buses, |b| b.index, "bus");

        if strips.len() != kind.strip_count() || buses.len() != kind.bus_count() {
            debug!(
                kind = %kind,
                strips = strips.len(),
                buses = buses.len(),
                "Snapshot layout differs from the nominal layout of its kind"
            );
        }

        Self {
            kind,
            protocol,
            strips,
            buses,
        }
    }

    /// Build from a decoded full-state message, filling in default labels
    pub fn from_state(state: &StatePayload) -> Self {
        let strips = state
            .strips
            .iter()
            .map(|s| Strip::from_payload(state.kind, s))
            .collect();
        let buses = state
            .buses
            .iter()
            .map(|b| Bus::from_payload(state.kind, b))
            .collect();
        Self::new(state.kind, state.protocol.clone(), strips, buses)
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn protocol(&self) -> &ProtocolVersion {
        &self.protocol
    }

    pub fn strips(&self) -> &[Strip] {
        &self.strips
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn strip(&self, index: usize) -> Option<&Strip> {
        self.strips.iter().find(|s| s.index == index)
    }

    pub fn bus(&self, index: usize) -> Option<&Bus> {
        self.buses.iter().find(|b| b.index == index)
    }

    /// Whether `strip` is routed to the bus at `bus_index`, resolved through
    /// this snapshot's bus-slot naming
    pub fn is_routed(&self, strip: usize, bus_index: usize) -> Option<bool> {
        let slot = self.kind.bus_slot(bus_index)?;
        self.strip(strip).map(|s| s.routes.get(slot))
    }

    pub(super) fn with_strips(&self, strips: Vec<Strip>) -> Self {
        Self {
            kind: self.kind,
            protocol: self.protocol.clone(),
            strips,
            buses: self.buses.clone(),
        }
    }

    pub(super) fn with_buses(&self, buses: Vec<Bus>) -> Self {
        Self {
            kind: self.kind,
            protocol: self.protocol.clone(),
            strips: self.strips.clone(),
            buses,
        }
    }
}

fn dedup_by_index<T>(items: Vec<T>, index: impl Fn(&T) -> usize, what: &str) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let i = index(item);
            let fresh = seen.insert(i);
            if !fresh {
                warn!("Duplicate {} index {} in state message, keeping the first", what, i);
            }
            fresh
        })
        .collect()
}
