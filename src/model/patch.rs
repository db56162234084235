//! Copy-on-write application of single-parameter updates

use serde_json::Value;

use super::kind::BusSlot;
use super::snapshot::{Bus, Snapshot, Strip};
use crate::protocol::{Target, UpdatePayload};

/// What applying an update did to the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchEffect {
    /// The named field of the target was replaced
    Applied,
    /// No strip/bus has the target index
    UnknownIndex,
    /// The parameter names no field of the target
    UnknownParam,
    /// The parameter exists but the value has the wrong JSON type
    InvalidValue,
}

/// Field of a strip addressed by an update parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StripParam {
    Mute,
    Gain,
    Label,
    Route(BusSlot),
}

impl StripParam {
    fn parse(param: &str) -> Option<Self> {
        match param {
            "mute" => Some(StripParam::Mute),
            "gain" => Some(StripParam::Gain),
            "label" => Some(StripParam::Label),
            other => BusSlot::from_name(other).map(StripParam::Route),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusParam {
    Mute,
    Gain,
    Label,
}

impl BusParam {
    fn parse(param: &str) -> Option<Self> {
        match param {
            "mute" => Some(BusParam::Mute),
            "gain" => Some(BusParam::Gain),
            "label" => Some(BusParam::Label),
            _ => None,
        }
    }
}

impl Snapshot {
    /// Return a new snapshot with `update` applied. The receiver is untouched;
    /// when the effect is anything but `Applied` the result equals `self`.
    pub fn with_update(&self, update: &UpdatePayload) -> (Snapshot, PatchEffect) {
        match update.target {
            Target::Strip => self.patch_strip(update),
            Target::Bus => self.patch_bus(update),
        }
    }

    fn patch_strip(&self, update: &UpdatePayload) -> (Snapshot, PatchEffect) {
        let Some(position) = self.strips().iter().position(|s| s.index == update.index) else {
            return (self.clone(), PatchEffect::UnknownIndex);
        };
        let Some(param) = StripParam::parse(&update.param) else {
            return (self.clone(), PatchEffect::UnknownParam);
        };
        let Some(strip) = apply_to_strip(&self.strips()[position], param, &update.value) else {
            return (self.clone(), PatchEffect::InvalidValue);
        };

        let mut strips = self.strips().to_vec();
        strips[position] = strip;
        (self.with_strips(strips), PatchEffect::Applied)
    }

    fn patch_bus(&self, update: &UpdatePayload) -> (Snapshot, PatchEffect) {
        let Some(position) = self.buses().iter().position(|b| b.index == update.index) else {
            return (self.clone(), PatchEffect::UnknownIndex);
        };
        let Some(param) = BusParam::parse(&update.param) else {
            return (self.clone(), PatchEffect::UnknownParam);
        };
        let Some(bus) = apply_to_bus(&self.buses()[position], param, &update.value) else {
            return (self.clone(), PatchEffect::InvalidValue);
        };

        let mut buses = self.buses().to_vec();
        buses[position] = bus;
        (self.with_buses(buses), PatchEffect::Applied)
    }
}

fn apply_to_strip(strip: &Strip, param: StripParam, value: &Value) -> Option<Strip> {
    let mut next = strip.clone();
    match param {
        StripParam::Mute => next.mute = value.as_bool()?,
        StripParam::Gain => next.gain = value.as_f64()?,
        StripParam::Label => next.label = value.as_str()?.to_string(),
        StripParam::Route(slot) => next.routes = strip.routes.with(slot, value.as_bool()?),
    }
    Some(next)
}

fn apply_to_bus(bus: &Bus, param: BusParam, value: &Value) -> Option<Bus> {
    let mut next = bus.clone();
    match param {
        BusParam::Mute => next.mute = value.as_bool()?,
        BusParam::Gain => next.gain = value.as_f64()?,
        BusParam::Label => next.label = value.as_str()?.to_string(),
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::snapshot::tests::banana_state;
    use serde_json::json;

    fn update(target: Target, index: usize, param: &str, value: Value) -> UpdatePayload {
        UpdatePayload {
            target,
            index,
            param: param.to_string(),
            value,
        }
    }

    fn base() -> Snapshot {
        Snapshot::from_state(&banana_state("1.0"))
    }

    #[test]
    fn test_strip_mute_touches_only_that_field() {
        let before = base();
        let (after, effect) = before.with_update(&update(Target::Strip, 1, "mute", json!(true)));

        assert_eq!(effect, PatchEffect::Applied);
        assert!(after.strip(1).unwrap().mute);
        assert!(!before.strip(1).unwrap().mute, "original must not be mutated");

        let mut expected = before.strip(1).unwrap().clone();
        expected.mute = true;
        assert_eq!(after.strip(1).unwrap(), &expected);

        for (a, b) in after.strips().iter().zip(before.strips()) {
            if a.index != 1 {
                assert_eq!(a, b);
            }
        }
        assert_eq!(after.buses(), before.buses());
        assert_eq!(after.kind(), before.kind());
        assert_eq!(after.protocol(), before.protocol());
    }

    #[test]
    fn test_strip_route_by_slot_name() {
        let (after, effect) = base().with_update(&update(Target::Strip, 0, "b1", json!(true)));
        assert_eq!(effect, PatchEffect::Applied);
        assert!(after.strip(0).unwrap().routes.get(BusSlot::B1));
        assert!(after.strip(0).unwrap().routes.get(BusSlot::A1));
    }

    #[test]
    fn test_bus_gain() {
        let (after, effect) = base().with_update(&update(Target::Bus, 2, "gain", json!(-12.5)));
        assert_eq!(effect, PatchEffect::Applied);
        assert_eq!(after.bus(2).unwrap().gain, -12.5);
        assert_eq!(after.strips(), base().strips());
    }

    #[test]
    fn test_integer_gain_is_accepted() {
        let (after, _) = base().with_update(&update(Target::Strip, 0, "gain", json!(3)));
        assert_eq!(after.strip(0).unwrap().gain, 3.0);
    }

    #[test]
    fn test_unknown_index_is_noop() {
        let before = base();
        let (after, effect) = before.with_update(&update(Target::Strip, 99, "mute", json!(true)));
        assert_eq!(effect, PatchEffect::UnknownIndex);
        assert_eq!(after, before);
    }

    #[test]
    fn test_unknown_param_is_noop() {
        let before = base();
        let (after, effect) = before.with_update(&update(Target::Bus, 0, "b1", json!(true)));
        assert_eq!(effect, PatchEffect::UnknownParam);
        assert_eq!(after, before);

        let (after, effect) = before.with_update(&update(Target::Strip, 0, "pan", json!(0.5)));
        assert_eq!(effect, PatchEffect::UnknownParam);
        assert_eq!(after, before);
    }

    #[test]
    fn test_wrong_value_type_is_noop() {
        let before = base();
        let (after, effect) = before.with_update(&update(Target::Strip, 0, "mute", json!("yes")));
        assert_eq!(effect, PatchEffect::InvalidValue);
        assert_eq!(after, before);
    }
}
