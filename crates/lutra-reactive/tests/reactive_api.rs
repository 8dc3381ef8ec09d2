//! Virtualization factory and public-surface behavior:
//! identity stability, mode dominance rules, raw round-trips, eligibility,
//! and identity-cache weakness.

mod common;

use common::key;
use lutra_reactive::registry::identity_map_len;
use lutra_reactive::{
    is_reactive, is_readonly, is_shallow, is_virtualized, mark_raw, readonly, reactive,
    shallow_reactive, shallow_readonly, sweep_identity_maps, to_raw, to_reactive, to_readonly,
};
use lutra_value::cell::{cell, readonly_cell};
use lutra_value::{RawObject, Value};

// ============================================================================
// Identity
// ============================================================================

#[test]
fn identity_stable_across_repeated_calls() {
    let raw = Value::object(RawObject::new_object());
    for make in [reactive, shallow_reactive, readonly, shallow_readonly] {
        let first = make(raw.clone());
        let second = make(raw.clone());
        assert_eq!(first, second, "same (raw, mode) must yield the same proxy");
    }
}

#[test]
fn modes_do_not_share_proxies() {
    let raw = Value::object(RawObject::new_object());
    let deep = reactive(raw.clone());
    let shallow = shallow_reactive(raw.clone());
    let ro = readonly(raw.clone());
    assert_ne!(deep, shallow);
    assert_ne!(deep, ro);
    assert_ne!(shallow, ro);
}

#[test]
fn virtualizing_a_proxy_returns_it() {
    let raw = Value::object(RawObject::new_object());
    let proxy = reactive(raw.clone());
    assert_eq!(reactive(proxy.clone()), proxy);

    let ro = readonly(raw);
    assert_eq!(readonly(ro.clone()), ro);
}

// ============================================================================
// Mode dominance
// ============================================================================

#[test]
fn readonly_dominates_mutable() {
    let raw = Value::object(RawObject::new_object());
    let ro = readonly(raw);
    assert_eq!(reactive(ro.clone()), ro);
    assert_eq!(shallow_reactive(ro.clone()), ro);
}

#[test]
fn readonly_over_reactive_is_distinct() {
    let raw_obj = RawObject::new_object();
    let raw = Value::object(raw_obj.clone());
    let rx = reactive(raw.clone());
    let ro = readonly(rx.clone());

    assert_ne!(ro, rx);
    // the layered view still resolves to the same raw container
    assert!(to_raw(&ro).as_object().unwrap().ptr_eq(&raw_obj));
    // and is both readonly and (through the inner layer) reactive
    assert!(is_readonly(&ro));
    assert!(is_reactive(&ro));
    // stable identity for the layered view too
    assert_eq!(readonly(rx), ro);
}

#[test]
fn readonly_of_raw_is_not_reactive() {
    let raw = Value::object(RawObject::new_object());
    let ro = readonly(raw);
    assert!(is_readonly(&ro));
    assert!(!is_reactive(&ro));
}

// ============================================================================
// Raw round-trips and flags
// ============================================================================

#[test]
fn raw_round_trip_every_mode() {
    let raw_obj = RawObject::new_object();
    let raw = Value::object(raw_obj.clone());
    for make in [reactive, shallow_reactive, readonly, shallow_readonly] {
        let proxy = make(raw.clone());
        assert!(to_raw(&proxy).as_object().unwrap().ptr_eq(&raw_obj));
    }
    // non-proxies round-trip to themselves
    assert_eq!(to_raw(&Value::int32(3)), Value::int32(3));
}

#[test]
fn flag_queries() {
    let raw = Value::object(RawObject::new_object());

    let rx = reactive(raw.clone());
    assert!(is_reactive(&rx) && !is_readonly(&rx) && !is_shallow(&rx));
    assert!(is_virtualized(&rx));

    let srx = shallow_reactive(raw.clone());
    assert!(is_reactive(&srx) && is_shallow(&srx));

    let ro = readonly(raw.clone());
    assert!(is_readonly(&ro) && !is_shallow(&ro));

    let sro = shallow_readonly(raw.clone());
    assert!(is_readonly(&sro) && is_shallow(&sro));

    assert!(!is_virtualized(&raw));
    assert!(!is_virtualized(&Value::int32(1)));
}

#[test]
fn readonly_cells_count_as_readonly() {
    let c = readonly_cell(Value::int32(1));
    assert!(is_readonly(&c));
    assert!(!is_readonly(&cell(Value::int32(1))));
}

// ============================================================================
// Eligibility
// ============================================================================

#[test]
fn primitives_pass_through() {
    for v in [
        Value::Undefined,
        Value::Null,
        Value::boolean(true),
        Value::int32(5),
        Value::number(1.5),
        Value::string("hi"),
    ] {
        assert_eq!(reactive(v.clone()), v);
        assert_eq!(readonly(v.clone()), v);
    }
}

#[test]
fn cells_pass_through() {
    let c = cell(Value::int32(1));
    assert_eq!(reactive(c.clone()), c);
}

#[test]
fn skip_respected() {
    let raw = mark_raw(Value::object(RawObject::new_object()));
    for make in [reactive, shallow_reactive, readonly, shallow_readonly] {
        assert_eq!(make(raw.clone()), raw);
    }
}

#[test]
fn non_extensible_pass_through() {
    let obj = RawObject::new_object();
    obj.prevent_extensions();
    let raw = Value::object(obj);
    assert_eq!(reactive(raw.clone()), raw);
}

#[test]
fn collections_pass_through_without_handler() {
    let map = Value::object(RawObject::new_map());
    assert_eq!(reactive(map.clone()), map);
    let set = Value::object(RawObject::new_set());
    assert_eq!(reactive(set.clone()), set);
}

// ============================================================================
// Read/write coherence
// ============================================================================

#[test]
fn write_then_read_coherence() {
    let (_, proxy) = common::reactive_object([("a", Value::int32(1))]);
    assert!(proxy.set(&key("b"), Value::string("fresh")));
    assert_eq!(proxy.get(&key("b")), Value::string("fresh"));
}

#[test]
fn structural_writes_store_raw_and_read_virtualized() {
    let (raw, proxy) = common::reactive_object([("a", Value::int32(1))]);
    let nested_raw = RawObject::object_from([("x", Value::int32(9))]);
    let nested_proxy = reactive(Value::object(nested_raw.clone()));

    // storing a virtualized value lands its raw form in the container
    assert!(proxy.set(&key("child"), nested_proxy.clone()));
    let stored = raw.plain_get(&key("child"));
    assert!(stored.as_object().unwrap().ptr_eq(&nested_raw));

    // reading it back re-virtualizes to the cached proxy
    assert_eq!(proxy.get(&key("child")), nested_proxy);
}

#[test]
fn nested_reads_propagate_readonly() {
    let nested = RawObject::object_from([("x", Value::int32(1))]);
    let obj = RawObject::object_from([("child", Value::object(nested))]);
    let ro = readonly(Value::object(obj));

    let child = ro.get(&key("child"));
    assert!(is_readonly(&child));
    // and the read-only child rejects writes while reporting success
    assert!(child.set(&key("x"), Value::int32(2)));
    assert_eq!(child.get(&key("x")), Value::int32(1));
}

#[test]
fn readonly_over_reactive_wraps_nested_children_readonly() {
    let inner = RawObject::object_from([("x", Value::int32(1))]);
    let outer = RawObject::object_from([("child", Value::object(inner))]);
    let rx = reactive(Value::object(outer));
    let ro = readonly(rx.clone());

    let child_ro = ro.get(&key("child"));
    assert!(is_readonly(&child_ro));
    assert!(is_reactive(&child_ro), "layered over the reactive child");
    assert_ne!(child_ro, rx.get(&key("child")));
}

#[test]
fn shallow_reads_do_not_wrap() {
    let nested = RawObject::object_from([("x", Value::int32(1))]);
    let obj = RawObject::object_from([("child", Value::object(nested.clone()))]);
    let shallow = shallow_reactive(Value::object(obj));

    let child = shallow.get(&key("child"));
    assert!(child.is_structural(), "shallow reads return the raw value");
    assert!(child.as_object().unwrap().ptr_eq(&nested));
}

#[test]
fn readonly_write_is_a_silent_no_op() {
    common::init_diagnostics();
    let raw = RawObject::object_from([("a", Value::int32(1))]);
    let ro = readonly(Value::object(raw.clone()));

    assert!(ro.set(&key("a"), Value::int32(2)), "caller sees success");
    assert_eq!(raw.plain_get(&key("a")), Value::int32(1), "raw unchanged");

    assert!(ro.remove(&key("a")), "delete also reports success");
    assert!(raw.has_own(&key("a")), "key survives");
}

// ============================================================================
// Helpers
// ============================================================================

#[test]
fn to_reactive_and_to_readonly_only_touch_structural_values() {
    assert_eq!(to_reactive(Value::int32(1)), Value::int32(1));
    assert_eq!(to_readonly(Value::string("s")), Value::string("s"));

    let raw = Value::object(RawObject::new_object());
    assert!(is_reactive(&to_reactive(raw.clone())));
    assert!(is_readonly(&to_readonly(raw)));
}

#[test]
fn json_documents_virtualize_end_to_end() {
    let doc = serde_json::json!({ "user": { "name": "ada" }, "tags": ["a"] });
    let state = reactive(lutra_value::from_json(&doc));

    assert_eq!(
        state.get(&key("user")).get(&key("name")),
        Value::string("ada")
    );
    state.get(&key("tags")).push(Value::string("b"));

    assert_eq!(
        lutra_value::to_json(&to_raw(&state)).unwrap(),
        serde_json::json!({ "user": { "name": "ada" }, "tags": ["a", "b"] })
    );
}

// ============================================================================
// Cache weakness
// ============================================================================

#[test]
fn cache_releases_dead_proxies_and_targets() {
    sweep_identity_maps();
    let base = identity_map_len();

    let raw = Value::object(RawObject::new_object());
    let proxy = reactive(raw.clone());
    assert_eq!(identity_map_len(), base + 1);

    // dropping every external proxy handle releases the entry
    drop(proxy);
    sweep_identity_maps();
    assert_eq!(identity_map_len(), base);

    // a cache entry must never keep the raw container alive
    let weak = {
        let inner = RawObject::new_object();
        let weak = inner.downgrade();
        let proxy = reactive(Value::object(inner));
        assert!(weak.upgrade().is_some());
        drop(proxy);
        weak
    };
    assert!(
        weak.upgrade().is_none(),
        "raw container must be collectible once application references drop"
    );
    sweep_identity_maps();
    assert_eq!(identity_map_len(), base);
}
