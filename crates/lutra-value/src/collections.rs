//! Backing stores for map- and set-shaped containers.
//!
//! Entries live in a `Vec` in insertion order; deleted entries become `None`
//! (tombstones) so live iteration snapshots stay cheap, and a side
//! `FxHashMap` gives O(1) key lookup. Keys compare under SameValueZero via
//! [`ValueKey`].
//!
//! The interception trap set for these shapes is supplied by the external
//! collection handler; this module is only the storage it forwards to.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::value::Value;

/// Hashable SameValueZero wrapper around [`Value`].
#[derive(Clone, Debug)]
pub struct ValueKey(Value);

impl ValueKey {
    /// Wrap a value as a collection key.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The wrapped value.
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_value_zero(&other.0)
    }
}

impl Eq for ValueKey {}

impl std::hash::Hash for ValueKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&canonical(&self.0)).hash(state);
        match canonical(&self.0) {
            Canonical::Nothing => {}
            Canonical::Bool(b) => b.hash(state),
            Canonical::Bits(bits) => bits.hash(state),
            Canonical::Text(s) => s.hash(state),
            Canonical::Id(id) => id.hash(state),
        }
    }
}

enum Canonical<'a> {
    Nothing,
    Bool(bool),
    Bits(u64),
    Text(&'a str),
    Id(usize),
}

fn canonical(value: &Value) -> Canonical<'_> {
    match value {
        Value::Undefined | Value::Null => Canonical::Nothing,
        Value::Bool(b) => Canonical::Bool(*b),
        Value::Int(_) | Value::Number(_) => {
            // SameValueZero: fold -0.0 into +0.0 and all NaNs together
            let n = value.as_number().unwrap_or(0.0);
            let n = if n.is_nan() {
                f64::NAN
            } else if n == 0.0 {
                0.0
            } else {
                n
            };
            Canonical::Bits(n.to_bits())
        }
        Value::String(s) => Canonical::Text(s),
        Value::Symbol(s) => Canonical::Id(s.id() as usize),
        Value::Object(o) => Canonical::Id(o.ptr_id()),
        Value::Cell(c) => Canonical::Id(std::sync::Arc::as_ptr(c) as *const () as usize),
        Value::Proxy(p) => Canonical::Id(std::sync::Arc::as_ptr(p) as *const () as usize),
    }
}

struct MapInner {
    /// Insertion-ordered entries; `None` is a tombstone.
    entries: Vec<Option<(ValueKey, Value)>>,
    /// Key → index in `entries`.
    index: FxHashMap<ValueKey, usize>,
    /// Live entry count.
    size: usize,
}

/// Insertion-ordered key→value store with SameValueZero keys.
pub struct MapStore {
    inner: RwLock<MapInner>,
}

impl Default for MapStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MapStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MapInner {
                entries: Vec::new(),
                index: FxHashMap::default(),
                size: 0,
            }),
        }
    }

    /// Live entry count.
    pub fn size(&self) -> usize {
        self.inner.read().size
    }

    /// Value for `key`, if present.
    pub fn get(&self, key: &Value) -> Option<Value> {
        let inner = self.inner.read();
        let idx = *inner.index.get(&ValueKey::new(key.clone()))?;
        inner
            .entries
            .get(idx)
            .and_then(|e| e.as_ref())
            .map(|(_, v)| v.clone())
    }

    /// Whether `key` is present.
    pub fn has(&self, key: &Value) -> bool {
        self.inner
            .read()
            .index
            .contains_key(&ValueKey::new(key.clone()))
    }

    /// Insert or update. Returns `true` when this updated an existing entry.
    pub fn set(&self, key: Value, value: Value) -> bool {
        let mut inner = self.inner.write();
        let vk = ValueKey::new(key);
        if let Some(&idx) = inner.index.get(&vk) {
            if let Some(Some((_, slot))) = inner.entries.get_mut(idx) {
                *slot = value;
                return true;
            }
        }
        let idx = inner.entries.len();
        inner.index.insert(vk.clone(), idx);
        inner.entries.push(Some((vk, value)));
        inner.size += 1;
        false
    }

    /// Remove `key`, returning its previous value.
    pub fn remove(&self, key: &Value) -> Option<Value> {
        let mut inner = self.inner.write();
        let idx = inner.index.remove(&ValueKey::new(key.clone()))?;
        let removed = inner.entries.get_mut(idx)?.take();
        removed.map(|(_, v)| {
            inner.size -= 1;
            v
        })
    }

    /// Remove every entry. Returns whether anything was removed.
    pub fn clear(&self) -> bool {
        let mut inner = self.inner.write();
        let had = inner.size > 0;
        inner.entries.clear();
        inner.index.clear();
        inner.size = 0;
        had
    }

    /// Live entries in insertion order.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.inner
            .read()
            .entries
            .iter()
            .flatten()
            .map(|(k, v)| (k.value().clone(), v.clone()))
            .collect()
    }

    /// Live keys in insertion order.
    pub fn keys(&self) -> Vec<Value> {
        self.inner
            .read()
            .entries
            .iter()
            .flatten()
            .map(|(k, _)| k.value().clone())
            .collect()
    }
}

impl std::fmt::Debug for MapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapStore")
            .field("size", &self.size())
            .finish()
    }
}

struct SetInner {
    entries: Vec<Option<ValueKey>>,
    index: FxHashMap<ValueKey, usize>,
    size: usize,
}

/// Insertion-ordered membership store with SameValueZero members.
pub struct SetStore {
    inner: RwLock<SetInner>,
}

impl Default for SetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SetStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SetInner {
                entries: Vec::new(),
                index: FxHashMap::default(),
                size: 0,
            }),
        }
    }

    /// Live member count.
    pub fn size(&self) -> usize {
        self.inner.read().size
    }

    /// Whether `value` is a member.
    pub fn has(&self, value: &Value) -> bool {
        self.inner
            .read()
            .index
            .contains_key(&ValueKey::new(value.clone()))
    }

    /// Add a member. Returns `true` when the value was newly added.
    pub fn add(&self, value: Value) -> bool {
        let mut inner = self.inner.write();
        let vk = ValueKey::new(value);
        if inner.index.contains_key(&vk) {
            return false;
        }
        let idx = inner.entries.len();
        inner.index.insert(vk.clone(), idx);
        inner.entries.push(Some(vk));
        inner.size += 1;
        true
    }

    /// Remove a member. Returns whether it was present.
    pub fn remove(&self, value: &Value) -> bool {
        let mut inner = self.inner.write();
        let Some(idx) = inner.index.remove(&ValueKey::new(value.clone())) else {
            return false;
        };
        if let Some(slot) = inner.entries.get_mut(idx) {
            if slot.take().is_some() {
                inner.size -= 1;
                return true;
            }
        }
        false
    }

    /// Remove every member. Returns whether anything was removed.
    pub fn clear(&self) -> bool {
        let mut inner = self.inner.write();
        let had = inner.size > 0;
        inner.entries.clear();
        inner.index.clear();
        inner.size = 0;
        had
    }

    /// Live members in insertion order.
    pub fn values(&self) -> Vec<Value> {
        self.inner
            .read()
            .entries
            .iter()
            .flatten()
            .map(|k| k.value().clone())
            .collect()
    }
}

impl std::fmt::Debug for SetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetStore")
            .field("size", &self.size())
            .finish()
    }
}
