//! Boxed single-value cells.
//!
//! [`ReactiveCell`] is the minimal concrete [`Boxed`] implementation: a
//! shared, lockable slot with read-only and shallow flags. The full ref
//! collaborator (dependency wiring, computed cells) lives outside this
//! layer; everything here is just enough to satisfy the capability contract
//! the traps rely on — recognize a cell, read it, write through it, respect
//! its flags.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::traits::Boxed;
use crate::value::Value;

/// A shared mutable (or read-only) boxed value.
pub struct ReactiveCell {
    value: RwLock<Value>,
    readonly: bool,
    shallow: bool,
}

impl ReactiveCell {
    /// Create a writable deep cell.
    pub fn new(value: Value) -> Arc<Self> {
        Arc::new(Self {
            value: RwLock::new(value),
            readonly: false,
            shallow: false,
        })
    }

    /// Create a read-only cell: writes through containers are rejected.
    pub fn new_readonly(value: Value) -> Arc<Self> {
        Arc::new(Self {
            value: RwLock::new(value),
            readonly: true,
            shallow: false,
        })
    }

    /// Create a shallow cell: container reads return its boxed value as-is.
    pub fn new_shallow(value: Value) -> Arc<Self> {
        Arc::new(Self {
            value: RwLock::new(value),
            readonly: false,
            shallow: true,
        })
    }
}

impl Boxed for ReactiveCell {
    fn get(&self) -> Value {
        self.value.read().clone()
    }

    fn set(&self, value: Value) -> bool {
        if self.readonly {
            return false;
        }
        *self.value.write() = value;
        true
    }

    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn is_shallow(&self) -> bool {
        self.shallow
    }
}

impl std::fmt::Debug for ReactiveCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("value", &*self.value.read())
            .field("readonly", &self.readonly)
            .finish()
    }
}

/// Wrap a value in a writable cell.
pub fn cell(value: Value) -> Value {
    Value::Cell(ReactiveCell::new(value))
}

/// Wrap a value in a read-only cell.
pub fn readonly_cell(value: Value) -> Value {
    Value::Cell(ReactiveCell::new_readonly(value))
}
