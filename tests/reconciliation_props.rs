//! Property tests for the reconciliation engine.

use proptest::prelude::*;
use serde_json::{json, Value};

use vm_mirror::model::{BusSlot, DeviceKind};
use vm_mirror::protocol::{decode, Envelope};
use vm_mirror::state::{HandleOutcome, StateStore};

const SLOTS: [&str; 8] = ["a1", "a2", "a3", "a4", "a5", "b1", "b2", "b3"];

#[derive(Debug, Clone)]
struct StripValues {
    mute: bool,
    gain: f64,
    routes: [bool; 8],
}

fn kind_strategy() -> impl Strategy<Value = DeviceKind> {
    prop_oneof![
        Just(DeviceKind::Basic),
        Just(DeviceKind::Banana),
        Just(DeviceKind::Potato),
    ]
}

fn strip_strategy() -> impl Strategy<Value = StripValues> {
    (any::<bool>(), -60.0f64..12.0, any::<[bool; 8]>())
        .prop_map(|(mute, gain, routes)| StripValues { mute, gain, routes })
}

/// Full state for `kind` with randomised strip values
fn state_strategy() -> impl Strategy<Value = (DeviceKind, Vec<StripValues>)> {
    kind_strategy().prop_flat_map(|kind| {
        (
            Just(kind),
            proptest::collection::vec(strip_strategy(), kind.strip_count()),
        )
    })
}

fn state_envelope(kind: DeviceKind, strips: &[StripValues], protocol: &str) -> Envelope {
    let strips: Vec<Value> = strips
        .iter()
        .enumerate()
        .map(|(index, values)| {
            let mut strip = json!({
                "index": index,
                "mute": values.mute,
                "gain": values.gain,
                "virtual": index >= kind.hardware_strips(),
            });
            for (slot, enabled) in SLOTS.iter().zip(values.routes) {
                strip[*slot] = json!(enabled);
            }
            strip
        })
        .collect();
    let buses: Vec<Value> = (0..kind.bus_count())
        .map(|index| json!({"index": index, "mute": false, "gain": 0.0}))
        .collect();

    let frame = json!({
        "type": "state",
        "kind": kind.as_str(),
        "protocol": protocol,
        "strips": strips,
        "buses": buses,
    });
    decode(&frame.to_string()).unwrap()
}

fn update_envelope(target: &str, index: usize, param: &str, value: Value) -> Envelope {
    let frame = json!({"type": "update", "target": target, "index": index, "param": param, "value": value});
    decode(&frame.to_string()).unwrap()
}

proptest! {
    #[test]
    fn same_state_twice_yields_equal_snapshots((kind, strips) in state_strategy()) {
        let store = StateStore::new();
        store.handle(state_envelope(kind, &strips, "1.0"));
        let first = store.current().unwrap();

        prop_assert_eq!(store.handle(state_envelope(kind, &strips, "1.0")), HandleOutcome::Replaced);
        let second = store.current().unwrap();
        prop_assert_eq!(&*first, &*second);
    }

    #[test]
    fn updates_without_state_never_create_one(
        updates in proptest::collection::vec((0usize..8, any::<bool>()), 1..20)
    ) {
        let store = StateStore::new();
        for (index, value) in updates {
            prop_assert_eq!(
                store.handle(update_envelope("strip", index, "mute", json!(value))),
                HandleOutcome::Rejected
            );
        }
        prop_assert!(store.current().is_none());
    }

    #[test]
    fn update_touches_only_the_named_field(
        (kind, strips) in state_strategy(),
        pick in any::<prop::sample::Index>(),
        mute in any::<bool>(),
    ) {
        let store = StateStore::new();
        store.handle(state_envelope(kind, &strips, "1.0"));
        let before = store.current().unwrap();
        let target = pick.index(strips.len());

        store.handle(update_envelope("strip", target, "mute", json!(mute)));
        let after = store.current().unwrap();

        prop_assert_eq!(after.strip(target).unwrap().mute, mute);
        for (b, a) in before.strips().iter().zip(after.strips()) {
            if b.index == target {
                prop_assert_eq!(b.gain, a.gain);
                prop_assert_eq!(b.routes, a.routes);
                prop_assert_eq!(&b.label, &a.label);
            } else {
                prop_assert_eq!(b, a);
            }
        }
        prop_assert_eq!(before.buses(), after.buses());
    }

    #[test]
    fn route_update_flips_one_slot(
        (kind, strips) in state_strategy(),
        pick in any::<prop::sample::Index>(),
        slot_pick in any::<prop::sample::Index>(),
        enabled in any::<bool>(),
    ) {
        let store = StateStore::new();
        store.handle(state_envelope(kind, &strips, "1.0"));
        let before = store.current().unwrap();
        let target = pick.index(strips.len());
        let slot = BusSlot::all().nth(slot_pick.index(BusSlot::COUNT)).unwrap();

        store.handle(update_envelope("strip", target, slot.name(), json!(enabled)));
        let after = store.current().unwrap();

        for other in BusSlot::all() {
            let expected = if other == slot {
                enabled
            } else {
                before.strip(target).unwrap().routes.get(other)
            };
            prop_assert_eq!(after.strip(target).unwrap().routes.get(other), expected);
        }
    }

    #[test]
    fn unknown_index_changes_nothing(
        (kind, strips) in state_strategy(),
        offset in 0usize..100,
        on_bus in any::<bool>(),
    ) {
        let store = StateStore::new();
        store.handle(state_envelope(kind, &strips, "1.0"));
        let before = store.current().unwrap();

        let (target, index) = if on_bus {
            ("bus", kind.bus_count() + offset)
        } else {
            ("strip", kind.strip_count() + offset)
        };
        store.handle(update_envelope(target, index, "mute", json!(true)));

        prop_assert_eq!(&*store.current().unwrap(), &*before);
    }

    #[test]
    fn kind_change_signals_topology_exactly_when_kind_differs(
        (first_kind, first) in state_strategy(),
        (second_kind, second) in state_strategy(),
    ) {
        let store = StateStore::new();
        store.handle(state_envelope(first_kind, &first, "1.0"));
        let outcome = store.handle(state_envelope(second_kind, &second, "1.2"));

        if first_kind == second_kind {
            prop_assert_eq!(outcome, HandleOutcome::Replaced);
        } else {
            prop_assert_eq!(outcome, HandleOutcome::TopologyChanged);
        }
        prop_assert_eq!(store.current().unwrap().kind(), second_kind);
    }
}
