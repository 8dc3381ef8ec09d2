//! Structural containers: plain objects, sequences, maps, and sets.
//!
//! A [`RawObject`] is a shared handle (`Arc`) with interior mutability
//! behind `parking_lot` locks. Property storage is an insertion-ordered
//! table of descriptors; sequences additionally carry a dense element
//! vector and expose a `length` pseudo-key. Prototype links are `Value`s,
//! so a chain may pass through an interception proxy — the receiver-aware
//! get/set walks dispatch through the proxy's traps when it does.
//!
//! Nothing in this module observes reads or reports writes; it is the
//! un-virtualized substrate the reactive layer wraps.

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::collections::{MapStore, SetStore};
use crate::value::{Symbol, Value};

/// Property key: string, integer index, or symbol.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String key.
    String(Arc<str>),
    /// Integer index (dense element access on sequences).
    Index(u32),
    /// Symbol key.
    Symbol(Symbol),
}

impl PropertyKey {
    /// Create a string key.
    pub fn string(s: &str) -> Self {
        Self::String(Arc::from(s))
    }

    /// Create an index key.
    pub fn index(i: u32) -> Self {
        Self::Index(i)
    }

    /// The `length` pseudo-key of sequences.
    pub fn length() -> Self {
        Self::string("length")
    }

    /// Integer index, if this key is one.
    pub fn as_index(&self) -> Option<u32> {
        match self {
            Self::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// Whether this is the `length` pseudo-key.
    pub fn is_length(&self) -> bool {
        matches!(self, Self::String(s) if &**s == "length")
    }

    /// Whether this is the prototype-link key, which never participates in
    /// dependency tracking.
    pub fn is_proto_link(&self) -> bool {
        matches!(self, Self::String(s) if &**s == "__proto__")
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::Index(i)
    }
}

impl From<Symbol> for PropertyKey {
    fn from(sym: Symbol) -> Self {
        Self::Symbol(sym)
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Index(i) => write!(f, "{i}"),
            Self::Symbol(s) => match s.description() {
                Some(d) => write!(f, "{d}"),
                None => write!(f, "Symbol()"),
            },
        }
    }
}

/// Property attributes.
#[derive(Clone, Copy, Debug)]
pub struct PropertyAttributes {
    /// Value may be replaced.
    pub writable: bool,
    /// Key shows up in enumeration.
    pub enumerable: bool,
    /// Property may be deleted or redefined.
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Default data property attributes.
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable.
    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::data()
    }
}

/// Accessor getter: receives the receiver (the proxy, when read through one).
pub type GetterFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
/// Accessor setter: receives the receiver and the incoming value.
pub type SetterFn = Arc<dyn Fn(&Value, Value) + Send + Sync>;

/// Property descriptor: plain data slot or accessor pair.
#[derive(Clone)]
pub enum PropertyDescriptor {
    /// Data property.
    Data {
        /// Stored value.
        value: Value,
        /// Attributes.
        attributes: PropertyAttributes,
    },
    /// Accessor property.
    Accessor {
        /// Getter, if readable.
        get: Option<GetterFn>,
        /// Setter, if writable.
        set: Option<SetterFn>,
        /// Attributes.
        attributes: PropertyAttributes,
    },
}

impl PropertyDescriptor {
    /// Data property with default attributes.
    pub fn data(value: Value) -> Self {
        Self::Data {
            value,
            attributes: PropertyAttributes::data(),
        }
    }

    /// Data property with explicit attributes.
    pub fn data_with_attrs(value: Value, attributes: PropertyAttributes) -> Self {
        Self::Data { value, attributes }
    }

    /// Accessor property with default attributes.
    pub fn accessor(get: Option<GetterFn>, set: Option<SetterFn>) -> Self {
        Self::Accessor {
            get,
            set,
            attributes: PropertyAttributes::data(),
        }
    }

    /// The attributes of either variant.
    pub fn attributes(&self) -> PropertyAttributes {
        match self {
            Self::Data { attributes, .. } | Self::Accessor { attributes, .. } => *attributes,
        }
    }

    /// Stored value, for data properties.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }
}

impl std::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data { value, .. } => f.debug_tuple("Data").field(value).finish(),
            Self::Accessor { get, set, .. } => f
                .debug_struct("Accessor")
                .field("get", &get.is_some())
                .field("set", &set.is_some())
                .finish(),
        }
    }
}

/// Structural shape of a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// Plain keyed container.
    Plain,
    /// Dense sequence container.
    Sequence,
    /// Keyed collection (virtualized by the external collection handler).
    Map,
    /// Membership collection (virtualized by the external collection handler).
    Set,
}

enum CollectionStore {
    Map(MapStore),
    Set(SetStore),
}

type PropertyTable = IndexMap<PropertyKey, PropertyDescriptor, FxBuildHasher>;

struct ObjectData {
    kind: ObjectKind,
    properties: RwLock<PropertyTable>,
    elements: RwLock<Vec<Value>>,
    collection: Option<CollectionStore>,
    prototype: RwLock<Option<Value>>,
    extensible: AtomicBool,
    skip: AtomicBool,
}

/// Shared handle to a structural container. Cloning shares; identity is
/// pointer identity.
#[derive(Clone)]
pub struct RawObject(Arc<ObjectData>);

/// Weak handle to a container, used by the identity cache so entries never
/// keep the container alive.
#[derive(Clone)]
pub struct WeakRawObject(Weak<ObjectData>);

impl WeakRawObject {
    /// Upgrade back to a strong handle, if the container is still alive.
    pub fn upgrade(&self) -> Option<RawObject> {
        self.0.upgrade().map(RawObject)
    }

    /// Pointer identity of the referent (valid only while it is alive).
    pub fn ptr_id(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl RawObject {
    fn with_kind(kind: ObjectKind, collection: Option<CollectionStore>) -> Self {
        Self(Arc::new(ObjectData {
            kind,
            properties: RwLock::new(PropertyTable::default()),
            elements: RwLock::new(Vec::new()),
            collection,
            prototype: RwLock::new(None),
            extensible: AtomicBool::new(true),
            skip: AtomicBool::new(false),
        }))
    }

    /// Create an empty plain container.
    pub fn new_object() -> Self {
        Self::with_kind(ObjectKind::Plain, None)
    }

    /// Create an empty sequence container.
    pub fn new_sequence() -> Self {
        Self::with_kind(ObjectKind::Sequence, None)
    }

    /// Create an empty map container.
    pub fn new_map() -> Self {
        Self::with_kind(ObjectKind::Map, Some(CollectionStore::Map(MapStore::new())))
    }

    /// Create an empty set container.
    pub fn new_set() -> Self {
        Self::with_kind(ObjectKind::Set, Some(CollectionStore::Set(SetStore::new())))
    }

    /// Build a plain container from key/value pairs.
    pub fn object_from<K, I>(entries: I) -> Self
    where
        K: Into<PropertyKey>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let obj = Self::new_object();
        for (key, value) in entries {
            obj.define_data(key.into(), value);
        }
        obj
    }

    /// Build a sequence container from elements.
    pub fn sequence_from<I: IntoIterator<Item = Value>>(elements: I) -> Self {
        let obj = Self::new_sequence();
        {
            let mut elems = obj.0.elements.write();
            elems.extend(elements);
        }
        obj
    }

    /// Structural shape.
    pub fn kind(&self) -> ObjectKind {
        self.0.kind
    }

    /// Whether this is a sequence container.
    pub fn is_sequence(&self) -> bool {
        self.0.kind == ObjectKind::Sequence
    }

    /// Pointer identity.
    pub fn ptr_id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Same-container check.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Weak handle for identity caching.
    pub fn downgrade(&self) -> WeakRawObject {
        WeakRawObject(Arc::downgrade(&self.0))
    }

    /// Whether new properties may be added.
    pub fn is_extensible(&self) -> bool {
        self.0.extensible.load(Ordering::Acquire)
    }

    /// Forbid adding new properties.
    pub fn prevent_extensions(&self) {
        self.0.extensible.store(false, Ordering::Release);
    }

    /// Whether this container opted out of virtualization.
    pub fn is_skipped(&self) -> bool {
        self.0.skip.load(Ordering::Acquire)
    }

    /// Permanently opt this container out of virtualization.
    pub fn mark_skip(&self) {
        self.0.skip.store(true, Ordering::Release);
    }

    /// Prototype link, if any.
    pub fn prototype(&self) -> Option<Value> {
        self.0.prototype.read().clone()
    }

    /// Replace the prototype link. Only structural values and proxies make
    /// sense here; anything else clears the link.
    pub fn set_prototype(&self, proto: Option<Value>) {
        let proto = proto.filter(|p| p.is_structural() || p.is_virtualized());
        *self.0.prototype.write() = proto;
    }

    /// Backing map store, for map-shaped containers.
    pub fn map_store(&self) -> Option<&MapStore> {
        match &self.0.collection {
            Some(CollectionStore::Map(m)) => Some(m),
            _ => None,
        }
    }

    /// Backing set store, for set-shaped containers.
    pub fn set_store(&self) -> Option<&SetStore> {
        match &self.0.collection {
            Some(CollectionStore::Set(s)) => Some(s),
            _ => None,
        }
    }

    /// Own property descriptor, with sequence elements and the `length`
    /// pseudo-key surfaced as synthesized data descriptors.
    pub fn own_descriptor(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        if self.is_sequence() {
            if let Some(i) = key.as_index() {
                let elems = self.0.elements.read();
                return elems
                    .get(i as usize)
                    .map(|v| PropertyDescriptor::data(v.clone()));
            }
            if key.is_length() {
                let len = self.0.elements.read().len();
                return Some(PropertyDescriptor::data_with_attrs(
                    Value::number(len as f64),
                    PropertyAttributes {
                        writable: true,
                        enumerable: false,
                        configurable: false,
                    },
                ));
            }
        }
        self.0.properties.read().get(key).cloned()
    }

    /// Define (or replace) a data property with default attributes.
    pub fn define_data(&self, key: PropertyKey, value: Value) -> bool {
        self.define_property(key, PropertyDescriptor::data(value))
    }

    /// Define (or replace) a property descriptor.
    pub fn define_property(&self, key: PropertyKey, desc: PropertyDescriptor) -> bool {
        if self.is_sequence() {
            if let Some(i) = key.as_index() {
                if let Some(value) = desc.value() {
                    return self.seq_store(i, value.clone());
                }
                return false;
            }
            if key.is_length() {
                return false;
            }
        }
        let mut props = self.0.properties.write();
        if !self.is_extensible() && !props.contains_key(&key) {
            return false;
        }
        props.insert(key, desc);
        true
    }

    /// Own-key presence (no prototype walk).
    pub fn has_own(&self, key: &PropertyKey) -> bool {
        if self.is_sequence() {
            if let Some(i) = key.as_index() {
                return (i as usize) < self.0.elements.read().len();
            }
            if key.is_length() {
                return true;
            }
        }
        self.0.properties.read().contains_key(key)
    }

    /// Presence including the prototype chain (dispatching through proxy
    /// prototypes).
    pub fn has(&self, key: &PropertyKey) -> bool {
        if self.has_own(key) {
            return true;
        }
        match self.prototype() {
            Some(Value::Object(proto)) => proto.has(key),
            Some(Value::Proxy(proto)) => proto.has(key),
            _ => false,
        }
    }

    /// Own value read: data value, or the accessor's getter run with this
    /// container as receiver.
    pub fn get_own(&self, key: &PropertyKey) -> Option<Value> {
        let desc = self.own_descriptor(key)?;
        match desc {
            PropertyDescriptor::Data { value, .. } => Some(value),
            PropertyDescriptor::Accessor { get, .. } => {
                Some(match get {
                    Some(getter) => getter(&Value::Object(self.clone())),
                    None => Value::Undefined,
                })
            }
        }
    }

    /// Prototype-walking read with this container as receiver.
    pub fn plain_get(&self, key: &PropertyKey) -> Value {
        ordinary_get(self, key, &Value::Object(self.clone()))
    }

    /// Delete a property. Absent keys delete successfully; non-configurable
    /// properties (and the `length` pseudo-key) do not. Deleting a sequence
    /// element leaves a hole without shrinking the sequence.
    pub fn remove(&self, key: &PropertyKey) -> bool {
        if self.is_sequence() {
            if let Some(i) = key.as_index() {
                let mut elems = self.0.elements.write();
                if (i as usize) < elems.len() {
                    elems[i as usize] = Value::Undefined;
                }
                return true;
            }
            if key.is_length() {
                return false;
            }
        }
        let mut props = self.0.properties.write();
        match props.get(key) {
            Some(desc) if !desc.attributes().configurable => false,
            Some(_) => {
                props.shift_remove(key);
                true
            }
            None => true,
        }
    }

    /// Own enumerable keys: indices ascending, then string keys in insertion
    /// order, then symbols. The `length` pseudo-key is not enumerable.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let mut indices: SmallVec<[u32; 16]> = SmallVec::new();
        let mut strings: SmallVec<[PropertyKey; 16]> = SmallVec::new();
        let mut symbols: SmallVec<[PropertyKey; 4]> = SmallVec::new();

        if self.is_sequence() {
            let len = self.0.elements.read().len() as u32;
            indices.extend(0..len);
        }
        for (key, desc) in self.0.properties.read().iter() {
            if !desc.attributes().enumerable {
                continue;
            }
            match key {
                PropertyKey::Index(i) => indices.push(*i),
                PropertyKey::String(_) => strings.push(key.clone()),
                PropertyKey::Symbol(_) => symbols.push(key.clone()),
            }
        }
        indices.sort_unstable();

        let mut keys = Vec::with_capacity(indices.len() + strings.len() + symbols.len());
        keys.extend(indices.into_iter().map(PropertyKey::Index));
        keys.extend(strings);
        keys.extend(symbols);
        keys
    }

    // -- sequence element storage ------------------------------------------

    /// Number of elements (sequences; zero otherwise).
    pub fn seq_len(&self) -> usize {
        self.0.elements.read().len()
    }

    /// Element at `i`, if in bounds.
    pub fn seq_get(&self, i: usize) -> Option<Value> {
        self.0.elements.read().get(i).cloned()
    }

    /// Store at `i`, growing (with undefined fill) when the container is
    /// extensible. Returns whether the write landed.
    pub fn seq_store(&self, i: u32, value: Value) -> bool {
        let mut elems = self.0.elements.write();
        let idx = i as usize;
        if idx < elems.len() {
            elems[idx] = value;
            true
        } else if self.is_extensible() {
            elems.resize(idx, Value::Undefined);
            elems.push(value);
            true
        } else {
            false
        }
    }

    /// Truncate or extend (undefined fill) to `len`.
    pub fn set_seq_len(&self, len: usize) {
        self.0.elements.write().resize(len, Value::Undefined);
    }

    /// Clone of the current elements.
    pub fn elements_snapshot(&self) -> Vec<Value> {
        self.0.elements.read().clone()
    }

    /// Append; returns the new length.
    pub fn raw_push(&self, value: Value) -> usize {
        let mut elems = self.0.elements.write();
        elems.push(value);
        elems.len()
    }

    /// Remove and return the last element.
    pub fn raw_pop(&self) -> Option<Value> {
        self.0.elements.write().pop()
    }

    /// Insert at `i` (clamped to the current length).
    pub fn raw_insert(&self, i: usize, value: Value) {
        let mut elems = self.0.elements.write();
        let i = i.min(elems.len());
        elems.insert(i, value);
    }

    /// Remove and return the element at `i` (must be in bounds).
    pub fn raw_remove(&self, i: usize) -> Value {
        self.0.elements.write().remove(i)
    }

    /// Vector splice with clamped bounds; returns the removed elements.
    pub fn raw_splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let mut elems = self.0.elements.write();
        let start = start.min(elems.len());
        let delete_count = delete_count.min(elems.len() - start);
        elems.splice(start..start + delete_count, items).collect()
    }
}

impl std::fmt::Debug for RawObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawObject")
            .field("kind", &self.0.kind)
            .field("properties", &self.0.properties.read().len())
            .field("elements", &self.0.elements.read().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Receiver-aware property walks
// ---------------------------------------------------------------------------

/// Prototype-walking read. Accessor getters observe `receiver` as the value
/// being read through (the proxy, when one is in front). Prototype links
/// that are proxies are dispatched through their traps.
pub fn ordinary_get(obj: &RawObject, key: &PropertyKey, receiver: &Value) -> Value {
    if let Some(desc) = obj.own_descriptor(key) {
        return match desc {
            PropertyDescriptor::Data { value, .. } => value,
            PropertyDescriptor::Accessor { get: Some(getter), .. } => getter(receiver),
            PropertyDescriptor::Accessor { get: None, .. } => Value::Undefined,
        };
    }
    match obj.prototype() {
        Some(Value::Object(proto)) => ordinary_get(&proto, key, receiver),
        Some(Value::Proxy(proto)) => proto.get_with_receiver(key, receiver),
        _ => Value::Undefined,
    }
}

fn receiver_container(receiver: &Value) -> Option<RawObject> {
    match receiver {
        Value::Object(o) => Some(o.clone()),
        Value::Proxy(p) => Some(p.raw()),
        _ => None,
    }
}

fn apply_receiver_write(container: &RawObject, key: &PropertyKey, value: Value) -> bool {
    if container.is_sequence() {
        if let Some(i) = key.as_index() {
            return container.seq_store(i, value);
        }
        if key.is_length() {
            return match value.as_number() {
                Some(n) if n >= 0.0 && n.fract() == 0.0 => {
                    container.set_seq_len(n as usize);
                    true
                }
                _ => false,
            };
        }
    }

    let existing = container.own_descriptor(key);
    match existing {
        Some(PropertyDescriptor::Data { attributes, .. }) => {
            if !attributes.writable {
                return false;
            }
            let mut props = container.0.properties.write();
            if let Some(PropertyDescriptor::Data { value: slot, .. }) = props.get_mut(key) {
                *slot = value;
                true
            } else {
                false
            }
        }
        Some(PropertyDescriptor::Accessor { set: Some(setter), .. }) => {
            setter(&Value::Object(container.clone()), value);
            true
        }
        Some(PropertyDescriptor::Accessor { set: None, .. }) => false,
        None => {
            if !container.is_extensible() {
                return false;
            }
            container.define_data(key.clone(), value)
        }
    }
}

/// Prototype-walking write. The value lands on the (unwrapped) receiver;
/// accessor setters along the chain observe `receiver` as `this`; prototype
/// links that are proxies are dispatched through their traps, carrying the
/// original receiver with them.
pub fn ordinary_set(obj: &RawObject, key: &PropertyKey, value: Value, receiver: &Value) -> bool {
    match obj.own_descriptor(key) {
        Some(PropertyDescriptor::Data { attributes, .. }) => {
            if !attributes.writable {
                return false;
            }
            match receiver_container(receiver) {
                Some(container) => apply_receiver_write(&container, key, value),
                None => false,
            }
        }
        Some(PropertyDescriptor::Accessor { set: Some(setter), .. }) => {
            setter(receiver, value);
            true
        }
        Some(PropertyDescriptor::Accessor { set: None, .. }) => false,
        None => match obj.prototype() {
            Some(Value::Object(proto)) => ordinary_set(&proto, key, value, receiver),
            Some(Value::Proxy(proto)) => proto.set_with_receiver(key, value, receiver),
            _ => match receiver_container(receiver) {
                Some(container) => apply_receiver_write(&container, key, value),
                None => false,
            },
        },
    }
}
