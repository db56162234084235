//! Control catalogue derived from a snapshot
//!
//! Mirrors what a host UI exposes per device: strip mute, gain and routing
//! switches, and bus mute and master gain. Controls hold only addresses;
//! values are always read from whatever snapshot is current.

use serde_json::Value;
use std::fmt;

use crate::model::{BusSlot, DeviceKind, Snapshot};
use crate::protocol::{Command, Target};

/// Gain slider range in dB
pub const GAIN_MIN_DB: f64 = -60.0;
pub const GAIN_MAX_DB: f64 = 12.0;
pub const GAIN_STEP_DB: f64 = 0.1;

/// What a control addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlTarget {
    StripMute { strip: usize },
    StripGain { strip: usize },
    StripRoute { strip: usize, bus: usize },
    BusMute { bus: usize },
    BusGain { bus: usize },
}

impl ControlTarget {
    pub fn is_switch(&self) -> bool {
        !matches!(self, ControlTarget::StripGain { .. } | ControlTarget::BusGain { .. })
    }
}

/// Current or requested value of a control
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlValue {
    Switch(bool),
    Level(f64),
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlValue::Switch(true) => write!(f, "on"),
            ControlValue::Switch(false) => write!(f, "off"),
            ControlValue::Level(db) => write!(f, "{:.1} dB", db),
        }
    }
}

/// One addressable control
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    unique_id: String,
    kind: DeviceKind,
    target: ControlTarget,
}

impl Control {
    fn new(prefix: &str, kind: DeviceKind, target: ControlTarget) -> Self {
        let local = match target {
            ControlTarget::StripMute { strip } => format!("strip_{}_mute", strip),
            ControlTarget::StripGain { strip } => format!("strip_{}_gain", strip),
            ControlTarget::StripRoute { strip, bus } => format!("strip_{}-bus_{}_toggle", strip, bus),
            ControlTarget::BusMute { bus } => format!("bus_{}_mute", bus),
            ControlTarget::BusGain { bus } => format!("bus_{}_gain", bus),
        };
        Self {
            unique_id: format!("{}_{}", prefix, local),
            kind,
            target,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn target(&self) -> ControlTarget {
        self.target
    }

    /// Display name, preferring live labels and falling back to positional ones
    pub fn name(&self, snapshot: Option<&Snapshot>) -> String {
        let strip_label = |index: usize| {
            snapshot
                .and_then(|s| s.strip(index))
                .map(|s| s.label.clone())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| self.kind.strip_label(index))
        };
        let bus_label = |index: usize| {
            snapshot
                .and_then(|s| s.bus(index))
                .map(|b| b.label.clone())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| self.kind.bus_label(index))
        };

        match self.target {
            ControlTarget::StripMute { strip } => format!("{} Mute", strip_label(strip)),
            ControlTarget::StripGain { strip } => format!("{} Gain", strip_label(strip)),
            ControlTarget::StripRoute { strip, bus } => {
                format!("{} - {} Toggle", strip_label(strip), bus_label(bus))
            },
            ControlTarget::BusMute { bus } => format!("{} Master Mute", bus_label(bus)),
            ControlTarget::BusGain { bus } => format!("{} Master Gain", bus_label(bus)),
        }
    }

    /// Value in the given snapshot; None when absent or the target is gone
    pub fn value(&self, snapshot: Option<&Snapshot>) -> Option<ControlValue> {
        let snapshot = snapshot?;
        match self.target {
            ControlTarget::StripMute { strip } => snapshot.strip(strip).map(|s| ControlValue::Switch(s.mute)),
            ControlTarget::StripGain { strip } => snapshot.strip(strip).map(|s| ControlValue::Level(s.gain)),
            ControlTarget::StripRoute { strip, bus } => {
                snapshot.is_routed(strip, bus).map(ControlValue::Switch)
            },
            ControlTarget::BusMute { bus } => snapshot.bus(bus).map(|b| ControlValue::Switch(b.mute)),
            ControlTarget::BusGain { bus } => snapshot.bus(bus).map(|b| ControlValue::Level(b.gain)),
        }
    }

    /// Outbound command setting this control, or None if the value does not
    /// fit the control or the route has no bus slot for this kind
    pub fn command(&self, value: ControlValue) -> Option<Command> {
        match (self.target, value) {
            (ControlTarget::StripMute { strip }, ControlValue::Switch(on)) => {
                Some(Command::new(Target::Strip, strip, "mute", on))
            },
            (ControlTarget::StripGain { strip }, ControlValue::Level(db)) => {
                Some(Command::new(Target::Strip, strip, "gain", gain_value(db)?))
            },
            (ControlTarget::StripRoute { strip, bus }, ControlValue::Switch(on)) => {
                let slot = self.kind.bus_slot(bus)?;
                Some(Command::new(Target::Strip, strip, slot.name(), on))
            },
            (ControlTarget::BusMute { bus }, ControlValue::Switch(on)) => {
                Some(Command::new(Target::Bus, bus, "mute", on))
            },
            (ControlTarget::BusGain { bus }, ControlValue::Level(db)) => {
                Some(Command::new(Target::Bus, bus, "gain", gain_value(db)?))
            },
            _ => None,
        }
    }

    /// Interpret a user or wire value for this control: booleans (or
    /// "on"/"off") for switches, numbers for gains
    pub fn parse_value(&self, value: &Value) -> Option<ControlValue> {
        if self.target.is_switch() {
            match value {
                Value::Bool(on) => Some(ControlValue::Switch(*on)),
                Value::String(s) if s.eq_ignore_ascii_case("on") => Some(ControlValue::Switch(true)),
                Value::String(s) if s.eq_ignore_ascii_case("off") => Some(ControlValue::Switch(false)),
                _ => None,
            }
        } else {
            value.as_f64().map(ControlValue::Level)
        }
    }

    /// Whether this control sets `param` on `target` `index`
    fn addresses(&self, target: Target, index: usize, param: &str) -> bool {
        match (self.target, target) {
            (ControlTarget::StripMute { strip }, Target::Strip) => strip == index && param == "mute",
            (ControlTarget::StripGain { strip }, Target::Strip) => strip == index && param == "gain",
            (ControlTarget::StripRoute { strip, bus }, Target::Strip) => {
                strip == index
                    && self
                        .kind
                        .bus_slot(bus)
                        .is_some_and(|slot| BusSlot::from_name(param) == Some(slot))
            },
            (ControlTarget::BusMute { bus }, Target::Bus) => bus == index && param == "mute",
            (ControlTarget::BusGain { bus }, Target::Bus) => bus == index && param == "gain",
            _ => false,
        }
    }
}

/// Clamp into the slider range; NaN has no sensible JSON form
fn gain_value(db: f64) -> Option<Value> {
    if db.is_nan() {
        return None;
    }
    Some(Value::from(db.clamp(GAIN_MIN_DB, GAIN_MAX_DB)))
}

/// All controls for one device snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSet {
    kind: DeviceKind,
    strips: Vec<usize>,
    buses: Vec<usize>,
    controls: Vec<Control>,
}

impl ControlSet {
    /// Build the catalogue for `snapshot`; `prefix` is the endpoint id
    pub fn build(prefix: &str, snapshot: &Snapshot) -> Self {
        let kind = snapshot.kind();
        let mut controls = Vec::new();

        for strip in snapshot.strips() {
            controls.push(Control::new(prefix, kind, ControlTarget::StripMute { strip: strip.index }));
            controls.push(Control::new(prefix, kind, ControlTarget::StripGain { strip: strip.index }));
            for bus in snapshot.buses() {
                controls.push(Control::new(
                    prefix,
                    kind,
                    ControlTarget::StripRoute {
                        strip: strip.index,
                        bus: bus.index,
                    },
                ));
            }
        }
        for bus in snapshot.buses() {
            controls.push(Control::new(prefix, kind, ControlTarget::BusMute { bus: bus.index }));
            controls.push(Control::new(prefix, kind, ControlTarget::BusGain { bus: bus.index }));
        }

        Self {
            kind,
            strips: snapshot.strips().iter().map(|s| s.index).collect(),
            buses: snapshot.buses().iter().map(|b| b.index).collect(),
            controls,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter()
    }

    pub fn get(&self, unique_id: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.unique_id == unique_id)
    }

    pub fn switches(&self) -> usize {
        self.controls.iter().filter(|c| c.target.is_switch()).count()
    }

    /// Control that sets `param` on `target` `index`, if any
    pub fn find(&self, target: Target, index: usize, param: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.addresses(target, index, param))
    }

    /// Rebuild for `snapshot` if its layout differs; true when rebuilt
    pub fn refresh(&mut self, prefix: &str, snapshot: &Snapshot) -> bool {
        let same_layout = self.kind == snapshot.kind()
            && self.strips.iter().copied().eq(snapshot.strips().iter().map(|s| s.index))
            && self.buses.iter().copied().eq(snapshot.buses().iter().map(|b| b.index));
        if same_layout {
            return false;
        }
        *self = ControlSet::build(prefix, snapshot);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::banana_state;
    use crate::protocol::UpdatePayload;
    use serde_json::json;
    use std::collections::HashSet;

    const PREFIX: &str = "192.168.1.63:27001";

    fn snapshot() -> Snapshot {
        Snapshot::from_state(&banana_state("1.0"))
    }

    #[test]
    fn test_catalogue_shape() {
        let snapshot = snapshot();
        let set = ControlSet::build(PREFIX, &snapshot);

        let strips = snapshot.strips().len();
        let buses = snapshot.buses().len();
        assert_eq!(set.len(), strips * (2 + buses) + buses * 2);
        assert_eq!(set.switches(), strips * (1 + buses) + buses);

        let ids: HashSet<_> = set.iter().map(|c| c.unique_id()).collect();
        assert_eq!(ids.len(), set.len(), "unique ids must be unique");
        assert!(set.get("192.168.1.63:27001_strip_0_mute").is_some());
        assert!(set.get("192.168.1.63:27001_strip_2-bus_4_toggle").is_some());
        assert!(set.get("192.168.1.63:27001_bus_1_gain").is_some());
    }

    #[test]
    fn test_names_use_labels_with_fallback() {
        let snapshot = snapshot();
        let set = ControlSet::build(PREFIX, &snapshot);

        let mute = set.get("192.168.1.63:27001_strip_0_mute").unwrap();
        assert_eq!(mute.name(Some(&snapshot)), format!("{} Mute", snapshot.strip(0).unwrap().label));
        assert_eq!(mute.name(None), "Stereo Input 1 Mute");

        let route = set.get("192.168.1.63:27001_strip_3-bus_3_toggle").unwrap();
        assert_eq!(route.name(None), "Voicemeeter Input - B1 Toggle");

        let bus = set.get("192.168.1.63:27001_bus_0_mute").unwrap();
        assert_eq!(bus.name(None), "A1 Master Mute");
    }

    #[test]
    fn test_values_follow_current_snapshot() {
        let snapshot = snapshot();
        let set = ControlSet::build(PREFIX, &snapshot);
        let mute = set.get("192.168.1.63:27001_strip_1_mute").unwrap();

        assert_eq!(mute.value(Some(&snapshot)), Some(ControlValue::Switch(false)));
        assert_eq!(mute.value(None), None);

        let (next, _) = snapshot.with_update(&UpdatePayload {
            target: Target::Strip,
            index: 1,
            param: "mute".to_string(),
            value: json!(true),
        });
        assert_eq!(mute.value(Some(&next)), Some(ControlValue::Switch(true)));
    }

    #[test]
    fn test_route_command_uses_slot_name() {
        let set = ControlSet::build(PREFIX, &snapshot());
        let route = set.get("192.168.1.63:27001_strip_0-bus_3_toggle").unwrap();

        let command = route.command(ControlValue::Switch(true)).unwrap();
        assert_eq!(command, Command::new(Target::Strip, 0, "b1", true));
        assert!(route.command(ControlValue::Level(1.0)).is_none());
    }

    #[test]
    fn test_gain_command_is_clamped() {
        let set = ControlSet::build(PREFIX, &snapshot());
        let gain = set.get("192.168.1.63:27001_bus_0_gain").unwrap();

        let loud = gain.command(ControlValue::Level(40.0)).unwrap();
        assert_eq!(loud.value, json!(12.0));
        let quiet = gain.command(ControlValue::Level(-100.0)).unwrap();
        assert_eq!(quiet.value, json!(-60.0));
        assert!(gain.command(ControlValue::Level(f64::NAN)).is_none());
    }

    #[test]
    fn test_find_by_address() {
        let set = ControlSet::build(PREFIX, &snapshot());

        let route = set.find(Target::Strip, 1, "B2").unwrap();
        assert_eq!(route.unique_id(), "192.168.1.63:27001_strip_1-bus_4_toggle");
        assert_eq!(
            set.find(Target::Bus, 2, "gain").unwrap().target(),
            ControlTarget::BusGain { bus: 2 }
        );

        // Banana has no A4 slot, and labels are not controls
        assert!(set.find(Target::Strip, 0, "a4").is_none());
        assert!(set.find(Target::Strip, 0, "label").is_none());
        assert!(set.find(Target::Strip, 99, "mute").is_none());
    }

    #[test]
    fn test_parse_value_per_control_type() {
        let set = ControlSet::build(PREFIX, &snapshot());
        let mute = set.get("192.168.1.63:27001_strip_0_mute").unwrap();
        let gain = set.get("192.168.1.63:27001_strip_0_gain").unwrap();

        assert_eq!(mute.parse_value(&json!(true)), Some(ControlValue::Switch(true)));
        assert_eq!(mute.parse_value(&json!("OFF")), Some(ControlValue::Switch(false)));
        assert_eq!(mute.parse_value(&json!(1)), None);
        assert_eq!(gain.parse_value(&json!(-6)), Some(ControlValue::Level(-6.0)));
        assert_eq!(gain.parse_value(&json!(true)), None);
    }

    #[test]
    fn test_refresh_rebuilds_only_on_layout_change() {
        let banana = snapshot();
        let mut set = ControlSet::build(PREFIX, &banana);
        assert!(!set.refresh(PREFIX, &banana));

        let mut potato_state = banana_state("1.0");
        potato_state.kind = DeviceKind::Potato;
        let potato = Snapshot::from_state(&potato_state);
        assert!(set.refresh(PREFIX, &potato));
        assert_eq!(set.kind(), DeviceKind::Potato);

        // Route params now resolve through the potato slot table
        let route = set.get("192.168.1.63:27001_strip_0-bus_3_toggle").unwrap();
        assert_eq!(
            route.command(ControlValue::Switch(true)),
            Some(Command::new(Target::Strip, 0, "a4", true))
        );
        assert!(!set.refresh(PREFIX, &potato));

        // Same kind with a strip missing is a layout change too
        potato_state.strips.pop();
        assert!(set.refresh(PREFIX, &Snapshot::from_state(&potato_state)));
        assert!(set.get("192.168.1.63:27001_strip_4_mute").is_none());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(ControlValue::Switch(true).to_string(), "on");
        assert_eq!(ControlValue::Level(-3.5).to_string(), "-3.5 dB");
    }
}
