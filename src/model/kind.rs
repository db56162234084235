//! Device kinds and bus-slot naming
//!
//! Each Voicemeeter edition has a fixed strip/bus layout. Bus slots are the
//! canonical routing names ("a1".."a5", "b1".."b3") used both as strip fields
//! on the wire and as update parameter names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Voicemeeter edition reported by the companion app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Basic,
    Banana,
    Potato,
}

impl DeviceKind {
    /// All known kinds
    pub fn all() -> &'static [DeviceKind] {
        &[DeviceKind::Basic, DeviceKind::Banana, DeviceKind::Potato]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Basic => "basic",
            DeviceKind::Banana => "banana",
            DeviceKind::Potato => "potato",
        }
    }

    /// Parse from the wire name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "basic" => Some(DeviceKind::Basic),
            "banana" => Some(DeviceKind::Banana),
            "potato" => Some(DeviceKind::Potato),
            _ => None,
        }
    }

    pub fn hardware_strips(&self) -> usize {
        match self {
            DeviceKind::Basic => 2,
            DeviceKind::Banana => 3,
            DeviceKind::Potato => 5,
        }
    }

    pub fn virtual_strips(&self) -> usize {
        match self {
            DeviceKind::Basic => 1,
            DeviceKind::Banana => 2,
            DeviceKind::Potato => 3,
        }
    }

    /// Total strips (hardware inputs first, then virtual inputs)
    pub fn strip_count(&self) -> usize {
        self.hardware_strips() + self.virtual_strips()
    }

    pub fn bus_count(&self) -> usize {
        self.bus_slots().len()
    }

    /// Bus slots in bus-index order
    pub fn bus_slots(&self) -> &'static [BusSlot] {
        use BusSlot::*;
        match self {
            DeviceKind::Basic => &[A1, A2, B1],
            DeviceKind::Banana => &[A1, A2, A3, B1, B2],
            DeviceKind::Potato => &[A1, A2, A3, A4, A5, B1, B2, B3],
        }
    }

    /// Bus slot addressed by a bus index, if the kind has one there
    pub fn bus_slot(&self, bus_index: usize) -> Option<BusSlot> {
        self.bus_slots().get(bus_index).copied()
    }

    /// Positional default label for a strip
    pub fn strip_label(&self, index: usize) -> String {
        let hardware = self.hardware_strips();
        if index < hardware {
            return format!("Stereo Input {}", index + 1);
        }
        const VIRTUAL_LABELS: [&str; 3] =
            ["Voicemeeter Input", "Voicemeeter AUX Input", "Voicemeeter VAIO3"];
        let virtual_index = index - hardware;
        if virtual_index < self.virtual_strips() {
            return VIRTUAL_LABELS[virtual_index].to_string();
        }
        format!("Strip {}", index)
    }

    /// Positional default label for a bus
    pub fn bus_label(&self, index: usize) -> String {
        match self.bus_slot(index) {
            Some(slot) => slot.label().to_string(),
            None => format!("Bus {}", index),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical output bus slot (physical A-buses, virtual B-buses)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BusSlot {
    A1,
    A2,
    A3,
    A4,
    A5,
    B1,
    B2,
    B3,
}

/// Lookup table: canonical name -> slot. Order matches `BusSlot::position`.
static SLOT_TABLE: [(&str, BusSlot); BusSlot::COUNT] = [
    ("a1", BusSlot::A1),
    ("a2", BusSlot::A2),
    ("a3", BusSlot::A3),
    ("a4", BusSlot::A4),
    ("a5", BusSlot::A5),
    ("b1", BusSlot::B1),
    ("b2", BusSlot::B2),
    ("b3", BusSlot::B3),
];

impl BusSlot {
    pub const COUNT: usize = 8;

    pub fn all() -> impl Iterator<Item = BusSlot> {
        SLOT_TABLE.iter().map(|(_, slot)| *slot)
    }

    /// Resolve a wire/param name ("a1", "B2", ...) to a slot
    pub fn from_name(name: &str) -> Option<Self> {
        SLOT_TABLE
            .iter()
            .find(|(slot_name, _)| slot_name.eq_ignore_ascii_case(name))
            .map(|(_, slot)| *slot)
    }

    /// Lowercase wire name
    pub fn name(&self) -> &'static str {
        SLOT_TABLE[self.position()].0
    }

    /// Uppercase display label
    pub fn label(&self) -> &'static str {
        match self {
            BusSlot::A1 => "A1",
            BusSlot::A2 => "A2",
            BusSlot::A3 => "A3",
            BusSlot::A4 => "A4",
            BusSlot::A5 => "A5",
            BusSlot::B1 => "B1",
            BusSlot::B2 => "B2",
            BusSlot::B3 => "B3",
        }
    }

    /// Index into a routing flag array
    pub fn position(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for BusSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
