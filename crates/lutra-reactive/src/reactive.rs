//! The virtualization factory and the public surface.
//!
//! [`virtualize`] is total: for every input and mode it returns either a
//! proxy or the input unchanged, never panicking and never erroring.
//! Ineligible inputs (primitives, skipped or non-extensible containers,
//! collection shapes with no handler registered) degrade to passthrough,
//! with a development-mode diagnostic where the caller probably made a
//! mistake.

use std::sync::Arc;

use lutra_value::{Mode, ObjectKind, Value, Virtualized};

use crate::registry;
use crate::traps::ReactiveProxy;

/// Deep mutable virtualization: reads observed, writes reported, nested
/// structural values virtualized on read.
pub fn reactive(value: Value) -> Value {
    virtualize(value, Mode::REACTIVE)
}

/// Root-level-only mutable virtualization: nested values returned as-is,
/// cells not unwrapped.
pub fn shallow_reactive(value: Value) -> Value {
    virtualize(value, Mode::SHALLOW_REACTIVE)
}

/// Deep read-only view: writes rejected (reported successful, warned about
/// in development), nested values read-only as well.
pub fn readonly(value: Value) -> Value {
    virtualize(value, Mode::READONLY)
}

/// Root-level-only read-only view: top-level writes rejected, nested values
/// returned as-is.
pub fn shallow_readonly(value: Value) -> Value {
    virtualize(value, Mode::SHALLOW_READONLY)
}

/// The factory: wrap `value` under `mode`, or return it unchanged when it
/// is ineligible or already adequately virtualized.
pub fn virtualize(value: Value, mode: Mode) -> Value {
    // only structural values are virtualizable; cells are already reactive
    // collaborators and pass through silently
    match &value {
        Value::Object(_) | Value::Proxy(_) => {}
        Value::Cell(_) => return value,
        other => {
            tracing::warn!(
                target: "lutra_reactive",
                kind = other.kind_name(),
                "value cannot be virtualized"
            );
            return value;
        }
    }

    // read-only dominates: a read-only view requested as mutable stays
    // read-only
    if !mode.readonly && is_readonly(&value) {
        return value;
    }

    // an existing proxy is returned unchanged, except that a read-only view
    // may be layered over a mutable-reactive proxy
    if let Value::Proxy(existing) = &value {
        let layering_readonly_over_reactive = mode.readonly && !existing.mode().readonly;
        if !layering_readonly_over_reactive {
            return value;
        }
    }

    if let Some(cached) = registry::lookup(mode, &value) {
        return Value::Proxy(cached);
    }

    let raw = match &value {
        Value::Object(obj) => obj.clone(),
        Value::Proxy(proxy) => proxy.raw(),
        _ => return value,
    };
    if raw.is_skipped() || !raw.is_extensible() {
        return value;
    }

    match raw.kind() {
        ObjectKind::Plain | ObjectKind::Sequence => {
            let proxy: Arc<dyn Virtualized> = ReactiveProxy::new(value.clone(), mode);
            registry::insert(mode, &value, &proxy);
            Value::Proxy(proxy)
        }
        ObjectKind::Map | ObjectKind::Set => match registry::collection_handler() {
            Some(handler) => {
                let proxy = handler.virtualize(raw, mode);
                registry::insert(mode, &value, &proxy);
                Value::Proxy(proxy)
            }
            None => {
                tracing::debug!(
                    target: "lutra_reactive",
                    kind = ?raw.kind(),
                    "no collection handler registered; returning the container unwrapped"
                );
                value
            }
        },
    }
}

/// Whether `value` is a mutable-reactive virtualization (looking through
/// read-only views layered on top of one).
pub fn is_reactive(value: &Value) -> bool {
    match value {
        Value::Proxy(proxy) => {
            if proxy.mode().readonly {
                is_reactive(&proxy.target())
            } else {
                true
            }
        }
        _ => false,
    }
}

/// Whether `value` rejects writes: a read-only virtualization or a
/// read-only cell.
pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::Proxy(proxy) => proxy.mode().readonly,
        Value::Cell(cell) => cell.is_readonly(),
        _ => false,
    }
}

/// Whether `value` is a root-level-only (shallow) virtualization or cell.
pub fn is_shallow(value: &Value) -> bool {
    match value {
        Value::Proxy(proxy) => proxy.mode().shallow,
        Value::Cell(cell) => cell.is_shallow(),
        _ => false,
    }
}

/// Whether `value` is virtualized at all: reactive or read-only.
pub fn is_virtualized(value: &Value) -> bool {
    is_reactive(value) || is_readonly(value)
}

/// Follow proxy targets to the innermost non-virtualized value.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Proxy(proxy) => to_raw(&proxy.target()),
        other => other.clone(),
    }
}

/// Permanently opt a structural value out of virtualization. Returns the
/// value for chaining.
pub fn mark_raw(value: Value) -> Value {
    if let Value::Object(obj) = &value {
        obj.mark_skip();
    }
    value
}

/// Virtualize structural values mutably; return everything else unchanged.
pub fn to_reactive(value: Value) -> Value {
    if value.is_structural() {
        reactive(value)
    } else {
        value
    }
}

/// Virtualize structural values read-only; return everything else unchanged.
pub fn to_readonly(value: Value) -> Value {
    if value.is_structural() {
        readonly(value)
    } else {
        value
    }
}
