//! Capability interfaces through which the virtualization layer and its
//! external collaborators compose.
//!
//! There is no shared base type for "things that behave reactively" —
//! instead, boxed cells implement [`Boxed`] and interception proxies
//! implement [`Virtualized`], and the layer dispatches on capability. This
//! keeps the ref and collection-handler collaborators fully external: they
//! only need to satisfy the trait contract.

use crate::object::{PropertyKey, RawObject};
use crate::value::Value;

/// Virtualization mode: two independent axes.
///
/// One trap-set implementation is parameterized by this configuration; the
/// four named modes are the only values in circulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mode {
    /// Writes rejected (with a diagnostics-only warning) instead of applied.
    pub readonly: bool,
    /// Nested values returned as-is instead of re-virtualized.
    pub shallow: bool,
}

impl Mode {
    /// Deep, mutable, observed.
    pub const REACTIVE: Mode = Mode {
        readonly: false,
        shallow: false,
    };
    /// Root-level-only mutable observation.
    pub const SHALLOW_REACTIVE: Mode = Mode {
        readonly: false,
        shallow: true,
    };
    /// Deep read-only view.
    pub const READONLY: Mode = Mode {
        readonly: true,
        shallow: false,
    };
    /// Root-level-only read-only view.
    pub const SHALLOW_READONLY: Mode = Mode {
        readonly: true,
        shallow: true,
    };

    /// Stable index for per-mode identity maps.
    pub fn cache_index(self) -> usize {
        ((self.readonly as usize) << 1) | (self.shallow as usize)
    }

    /// The mode nested values are virtualized under on deep reads:
    /// read-only propagates, shallowness does not.
    pub fn nested(self) -> Mode {
        Mode {
            readonly: self.readonly,
            shallow: false,
        }
    }
}

/// A boxed single-value reactive cell.
///
/// The full cell implementation (its own dependency wiring, computed cells,
/// and so on) lives in the external ref collaborator; this layer only needs
/// to recognize cells, read and write their boxed value, and respect their
/// read-only and shallow flags.
pub trait Boxed: Send + Sync {
    /// Read the boxed value.
    fn get(&self) -> Value;

    /// Replace the boxed value. Returns `false` when the cell rejects the
    /// write (read-only cells do).
    fn set(&self, value: Value) -> bool;

    /// Whether the cell rejects writes.
    fn is_readonly(&self) -> bool {
        false
    }

    /// Whether reads of the boxed value skip nested virtualization.
    fn is_shallow(&self) -> bool {
        false
    }
}

/// An interception proxy over exactly one structural container under exactly
/// one [`Mode`].
///
/// The trap surface is the whole protocol: reads, writes, deletes,
/// membership, enumeration, and the sequence methods whose semantics are
/// identity- or length-sensitive. External collection handlers supply their
/// own implementations of this trait for map/set shapes.
///
/// The sequence methods have default implementations that act directly on
/// the raw backing store, unobserved; implementations that intercept
/// sequences override them.
pub trait Virtualized: Send + Sync {
    /// The mode this proxy was constructed under.
    fn mode(&self) -> Mode;

    /// The direct target this proxy wraps. Usually a raw container; a
    /// read-only proxy layered over a mutable-reactive one returns that
    /// inner proxy.
    fn target(&self) -> Value;

    /// The innermost raw container, following nested proxy targets.
    fn raw(&self) -> RawObject;

    /// Read trap.
    fn get_with_receiver(&self, key: &PropertyKey, receiver: &Value) -> Value;

    /// Write trap.
    fn set_with_receiver(&self, key: &PropertyKey, value: Value, receiver: &Value) -> bool;

    /// Delete trap.
    fn remove(&self, key: &PropertyKey) -> bool;

    /// Membership trap (walks the prototype chain).
    fn has(&self, key: &PropertyKey) -> bool;

    /// Enumeration trap: own enumerable keys in enumeration order.
    fn own_keys(&self) -> Vec<PropertyKey>;

    /// Identity-sensitive membership search.
    fn seq_contains(&self, needle: &Value, _receiver: &Value) -> bool {
        self.raw()
            .elements_snapshot()
            .iter()
            .any(|e| e.same_value_zero(needle))
    }

    /// Identity-sensitive first-index search.
    fn seq_index_of(&self, needle: &Value, _receiver: &Value) -> Option<usize> {
        self.raw()
            .elements_snapshot()
            .iter()
            .position(|e| e.strict_equals(needle))
    }

    /// Identity-sensitive last-index search.
    fn seq_last_index_of(&self, needle: &Value, _receiver: &Value) -> Option<usize> {
        self.raw()
            .elements_snapshot()
            .iter()
            .rposition(|e| e.strict_equals(needle))
    }

    /// Append; returns the new length.
    fn seq_push(&self, items: &[Value], _receiver: &Value) -> usize {
        let raw = self.raw();
        for item in items {
            raw.raw_push(item.clone());
        }
        raw.seq_len()
    }

    /// Remove and return the last element.
    fn seq_pop(&self, _receiver: &Value) -> Value {
        self.raw().raw_pop().unwrap_or(Value::Undefined)
    }

    /// Remove and return the first element.
    fn seq_shift(&self, _receiver: &Value) -> Value {
        let raw = self.raw();
        if raw.seq_len() == 0 {
            Value::Undefined
        } else {
            raw.raw_remove(0)
        }
    }

    /// Insert at the front; returns the new length.
    fn seq_unshift(&self, items: &[Value], _receiver: &Value) -> usize {
        let raw = self.raw();
        for (i, item) in items.iter().enumerate() {
            raw.raw_insert(i, item.clone());
        }
        raw.seq_len()
    }

    /// Remove `delete_count` elements at `start`, insert `items`, return the
    /// removed elements.
    fn seq_splice(
        &self,
        start: usize,
        delete_count: usize,
        items: &[Value],
        _receiver: &Value,
    ) -> Vec<Value> {
        self.raw().raw_splice(start, delete_count, items.to_vec())
    }
}
