//! The interception trap set for plain and sequence containers.
//!
//! One implementation, parameterized by [`Mode`] at construction — the four
//! mode variants are configurations of the same trap logic, not separate
//! trap tables. Each trap forwards through the proxy's target (which may
//! itself be a proxy, for read-only views layered over reactive ones),
//! observes the read or reports the mutation, and applies the nested
//! re-virtualization / cell-unwrap policy.
//!
//! Every trap is total: illegal operations degrade to a well-defined result
//! with a development-mode diagnostic, never a panic.

use std::sync::Arc;

use lutra_value::object::{self, PropertyKey};
use lutra_value::{Mode, RawObject, Value, Virtualized};

use crate::reactive::{is_readonly, is_shallow, to_raw, virtualize};
use crate::track::{self, DepKey, TrackOp, TriggerOp};

/// The base interception proxy: one structural container, one mode.
pub struct ReactiveProxy {
    target: Value,
    mode: Mode,
}

impl ReactiveProxy {
    /// Construct a proxy. Callers (the factory) guarantee the target is a
    /// raw container, or — for read-only views over reactive containers — a
    /// mutable proxy.
    pub(crate) fn new(target: Value, mode: Mode) -> Arc<Self> {
        Arc::new(Self { target, mode })
    }

    /// The raw container behind mutable proxies. Mutation traps are only
    /// reachable on mutable proxies, whose target is always raw.
    fn mutable_raw(&self) -> Option<RawObject> {
        match &self.target {
            Value::Object(obj) => Some(obj.clone()),
            _ => None,
        }
    }

    /// Apply the read-side policy to a forwarded value: keep cells for
    /// sequence index reads, unwrap them otherwise, and re-virtualize
    /// nested structural values (read-only propagates, shallowness does
    /// not).
    fn wrap_read(&self, value: Value, index_read: bool) -> Value {
        if self.mode.shallow {
            return value;
        }
        if let Value::Cell(cell) = &value {
            if index_read {
                return value;
            }
            return cell.get();
        }
        // nested structural values re-virtualize; values that come back
        // already virtualized (reads forwarded through an inner reactive
        // layer) go through the factory too, so a read-only view yields
        // read-only children
        if value.is_structural() || value.is_virtualized() {
            return virtualize(value, self.mode.nested());
        }
        value
    }

    /// The storage policy the write trap applies to incoming values: deep
    /// modes unwrap virtualized values before they land in the raw
    /// container, unless the value is itself read-only or explicitly
    /// shallow.
    fn store_value(&self, value: Value) -> Value {
        if !self.mode.shallow && !is_readonly(&value) && !is_shallow(&value) {
            to_raw(&value)
        } else {
            value
        }
    }

    fn track_all_elements(&self, raw: &RawObject) {
        for i in 0..raw.seq_len() {
            track::track(
                raw,
                TrackOp::Get,
                &DepKey::Key(PropertyKey::Index(i as u32)),
            );
        }
    }

    /// Report the per-index and length notifications a sequence mutation
    /// produced, by diffing the elements against a pre-mutation snapshot.
    /// A pure append reports only `Add` entries; shrinks and shifts also
    /// report the `length` change.
    fn emit_seq_diff(&self, raw: &RawObject, before: &[Value]) {
        let after = raw.elements_snapshot();
        let (old_len, new_len) = (before.len(), after.len());
        let mut moved = false;

        for i in 0..old_len.min(new_len) {
            if !after[i].same_value(&before[i]) {
                moved = true;
                track::trigger(
                    raw,
                    TriggerOp::Set,
                    &DepKey::Key(PropertyKey::Index(i as u32)),
                    Some(&after[i]),
                    Some(&before[i]),
                );
            }
        }
        if new_len > old_len {
            for (i, item) in after.iter().enumerate().take(new_len).skip(old_len) {
                track::trigger(
                    raw,
                    TriggerOp::Add,
                    &DepKey::Key(PropertyKey::Index(i as u32)),
                    Some(item),
                    None,
                );
            }
        } else {
            for (i, item) in before.iter().enumerate().take(old_len).skip(new_len) {
                track::trigger(
                    raw,
                    TriggerOp::Delete,
                    &DepKey::Key(PropertyKey::Index(i as u32)),
                    None,
                    Some(item),
                );
            }
        }
        if new_len != old_len && (new_len < old_len || moved) {
            track::trigger(
                raw,
                TriggerOp::Set,
                &DepKey::length(),
                Some(&Value::number(new_len as f64)),
                Some(&Value::number(old_len as f64)),
            );
        }
    }
}

/// Keys that never participate in dependency tracking: the prototype-link
/// key and the well-known symbols.
fn non_trackable(key: &PropertyKey) -> bool {
    key.is_proto_link() || matches!(key, PropertyKey::Symbol(s) if s.is_well_known())
}

/// Pointer identity of the receiver's underlying raw container.
fn receiver_raw_id(receiver: &Value) -> Option<usize> {
    match receiver {
        Value::Object(obj) => Some(obj.ptr_id()),
        Value::Proxy(proxy) => Some(proxy.raw().ptr_id()),
        _ => None,
    }
}

impl Virtualized for ReactiveProxy {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn target(&self) -> Value {
        self.target.clone()
    }

    fn raw(&self) -> RawObject {
        match &self.target {
            Value::Object(obj) => obj.clone(),
            Value::Proxy(inner) => inner.raw(),
            _ => unreachable!("proxy targets are structural"),
        }
    }

    fn get_with_receiver(&self, key: &PropertyKey, receiver: &Value) -> Value {
        let res = match &self.target {
            Value::Object(obj) => object::ordinary_get(obj, key, receiver),
            Value::Proxy(inner) => inner.get_with_receiver(key, receiver),
            _ => Value::Undefined,
        };
        if non_trackable(key) {
            return res;
        }
        let raw = self.raw();
        if !self.mode.readonly {
            track::track(&raw, TrackOp::Get, &DepKey::key(key));
        }
        let index_read = key.as_index().is_some() && raw.is_sequence();
        self.wrap_read(res, index_read)
    }

    fn set_with_receiver(&self, key: &PropertyKey, value: Value, receiver: &Value) -> bool {
        if self.mode.readonly {
            tracing::warn!(
                target: "lutra_reactive",
                key = %key,
                "set ignored: target is read-only"
            );
            return true;
        }
        let Some(raw) = self.mutable_raw() else {
            return false;
        };

        let mut value = value;
        let mut old = raw.plain_get(key);

        // a read-only boxed cell cannot be replaced through its container
        if is_readonly(&old) && old.is_cell() && !value.is_cell() {
            return false;
        }

        if !self.mode.shallow && !is_readonly(&value) {
            if !is_shallow(&value) {
                value = to_raw(&value);
                old = to_raw(&old);
            }
            // cell-in-object assignment forwards through the box
            if !raw.is_sequence() && !value.is_cell() {
                if let Value::Cell(cell) = &old {
                    return cell.set(value);
                }
            }
        }

        let had_key = match key.as_index() {
            Some(i) if raw.is_sequence() => (i as usize) < raw.seq_len(),
            _ => raw.has_own(key),
        };
        let result = object::ordinary_set(&raw, key, value.clone(), receiver);

        // don't notify when the trap fired through a prototype-chain proxy
        // that is not the receiver's own container
        if result && receiver_raw_id(receiver) == Some(raw.ptr_id()) {
            if !had_key {
                track::trigger(&raw, TriggerOp::Add, &DepKey::key(key), Some(&value), None);
            } else if !value.same_value(&old) {
                track::trigger(
                    &raw,
                    TriggerOp::Set,
                    &DepKey::key(key),
                    Some(&value),
                    Some(&old),
                );
            }
        }
        result
    }

    fn remove(&self, key: &PropertyKey) -> bool {
        if self.mode.readonly {
            tracing::warn!(
                target: "lutra_reactive",
                key = %key,
                "delete ignored: target is read-only"
            );
            return true;
        }
        let Some(raw) = self.mutable_raw() else {
            return false;
        };
        let had_key = raw.has_own(key);
        let old = raw.get_own(key).unwrap_or(Value::Undefined);
        let result = raw.remove(key);
        if result && had_key {
            track::trigger(&raw, TriggerOp::Delete, &DepKey::key(key), None, Some(&old));
        }
        result
    }

    fn has(&self, key: &PropertyKey) -> bool {
        let result = match &self.target {
            Value::Object(obj) => obj.has(key),
            Value::Proxy(inner) => inner.has(key),
            _ => false,
        };
        let builtin_symbol = matches!(key, PropertyKey::Symbol(s) if s.is_well_known());
        if !self.mode.readonly && !builtin_symbol {
            track::track(&self.raw(), TrackOp::Has, &DepKey::key(key));
        }
        result
    }

    fn own_keys(&self) -> Vec<PropertyKey> {
        if !self.mode.readonly {
            let raw = self.raw();
            let dep = if raw.is_sequence() {
                DepKey::length()
            } else {
                DepKey::Iterate
            };
            track::track(&raw, TrackOp::Iterate, &dep);
        }
        match &self.target {
            Value::Object(obj) => obj.own_keys(),
            Value::Proxy(inner) => inner.own_keys(),
            _ => Vec::new(),
        }
    }

    fn seq_contains(&self, needle: &Value, receiver: &Value) -> bool {
        let raw = self.raw();
        if self.mode.readonly {
            // read-only views search through their own (virtualized) reads
            return (0..raw.seq_len()).any(|i| {
                self.get_with_receiver(&PropertyKey::Index(i as u32), receiver)
                    .same_value_zero(needle)
            });
        }
        self.track_all_elements(&raw);
        let elements = raw.elements_snapshot();
        if elements.iter().any(|e| e.same_value_zero(needle)) {
            return true;
        }
        // the needle may be a virtualized form of a raw element (or vice
        // versa): retry fully unwrapped
        let raw_needle = to_raw(needle);
        elements.iter().any(|e| e.same_value_zero(&raw_needle))
    }

    fn seq_index_of(&self, needle: &Value, receiver: &Value) -> Option<usize> {
        let raw = self.raw();
        if self.mode.readonly {
            return (0..raw.seq_len()).position(|i| {
                self.get_with_receiver(&PropertyKey::Index(i as u32), receiver)
                    .strict_equals(needle)
            });
        }
        self.track_all_elements(&raw);
        let elements = raw.elements_snapshot();
        if let Some(i) = elements.iter().position(|e| e.strict_equals(needle)) {
            return Some(i);
        }
        let raw_needle = to_raw(needle);
        elements.iter().position(|e| e.strict_equals(&raw_needle))
    }

    fn seq_last_index_of(&self, needle: &Value, receiver: &Value) -> Option<usize> {
        let raw = self.raw();
        if self.mode.readonly {
            return (0..raw.seq_len()).rev().find(|&i| {
                self.get_with_receiver(&PropertyKey::Index(i as u32), receiver)
                    .strict_equals(needle)
            });
        }
        self.track_all_elements(&raw);
        let elements = raw.elements_snapshot();
        if let Some(i) = elements.iter().rposition(|e| e.strict_equals(needle)) {
            return Some(i);
        }
        let raw_needle = to_raw(needle);
        elements.iter().rposition(|e| e.strict_equals(&raw_needle))
    }

    fn seq_push(&self, items: &[Value], receiver: &Value) -> usize {
        if self.mode.readonly {
            tracing::warn!(target: "lutra_reactive", "push ignored: target is read-only");
            return self.raw().seq_len();
        }
        let Some(raw) = self.mutable_raw() else {
            return 0;
        };
        // length reads inside the mutation must not register dependencies;
        // a dependent that appends would otherwise re-trigger itself
        let _guard = track::suspend_tracking();
        let mut index = raw.seq_len() as u32;
        for item in items {
            self.set_with_receiver(&PropertyKey::Index(index), item.clone(), receiver);
            index += 1;
        }
        raw.seq_len()
    }

    fn seq_pop(&self, _receiver: &Value) -> Value {
        if self.mode.readonly {
            tracing::warn!(target: "lutra_reactive", "pop ignored: target is read-only");
            return Value::Undefined;
        }
        let Some(raw) = self.mutable_raw() else {
            return Value::Undefined;
        };
        let before = raw.elements_snapshot();
        if before.is_empty() {
            return Value::Undefined;
        }
        let removed = {
            let _guard = track::suspend_tracking();
            raw.raw_pop().unwrap_or(Value::Undefined)
        };
        self.emit_seq_diff(&raw, &before);
        self.wrap_read(removed, true)
    }

    fn seq_shift(&self, _receiver: &Value) -> Value {
        if self.mode.readonly {
            tracing::warn!(target: "lutra_reactive", "shift ignored: target is read-only");
            return Value::Undefined;
        }
        let Some(raw) = self.mutable_raw() else {
            return Value::Undefined;
        };
        let before = raw.elements_snapshot();
        if before.is_empty() {
            return Value::Undefined;
        }
        let removed = {
            let _guard = track::suspend_tracking();
            raw.raw_remove(0)
        };
        self.emit_seq_diff(&raw, &before);
        self.wrap_read(removed, true)
    }

    fn seq_unshift(&self, items: &[Value], _receiver: &Value) -> usize {
        if self.mode.readonly {
            tracing::warn!(target: "lutra_reactive", "unshift ignored: target is read-only");
            return self.raw().seq_len();
        }
        let Some(raw) = self.mutable_raw() else {
            return 0;
        };
        let before = raw.elements_snapshot();
        {
            let _guard = track::suspend_tracking();
            for (i, item) in items.iter().enumerate() {
                raw.raw_insert(i, self.store_value(item.clone()));
            }
        }
        self.emit_seq_diff(&raw, &before);
        raw.seq_len()
    }

    fn seq_splice(
        &self,
        start: usize,
        delete_count: usize,
        items: &[Value],
        _receiver: &Value,
    ) -> Vec<Value> {
        if self.mode.readonly {
            tracing::warn!(target: "lutra_reactive", "splice ignored: target is read-only");
            return Vec::new();
        }
        let Some(raw) = self.mutable_raw() else {
            return Vec::new();
        };
        let before = raw.elements_snapshot();
        let removed = {
            let _guard = track::suspend_tracking();
            let stored = items.iter().map(|v| self.store_value(v.clone())).collect();
            raw.raw_splice(start, delete_count, stored)
        };
        self.emit_seq_diff(&raw, &before);
        removed.into_iter().map(|v| self.wrap_read(v, true)).collect()
    }
}

impl std::fmt::Debug for ReactiveProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveProxy")
            .field("mode", &self.mode)
            .field("target", &self.target)
            .finish()
    }
}
