//! Identity cache and collaborator registration.
//!
//! Four identity maps — one per virtualization mode — guarantee at most one
//! live proxy per (target, mode) pair. The maps are untraced side tables
//! keyed by pointer identity and hold weak handles on both sides: they never
//! keep a target alive, and a proxy nobody references is collectible.
//! Because a freed allocation's address can be reused, every entry also
//! keeps a weak handle to the keyed target and is validated on contact;
//! stale entries are dropped when touched and swept in bulk once a map
//! doubles past its watermark.

use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Weak};

use lutra_value::{Mode, RawObject, Value, Virtualized, WeakRawObject};

const SWEEP_FLOOR: usize = 64;

enum TargetRef {
    Object(WeakRawObject),
    Proxy(Weak<dyn Virtualized>),
}

impl TargetRef {
    fn is_alive_at(&self, key: usize) -> bool {
        match self {
            TargetRef::Object(weak) => weak
                .upgrade()
                .is_some_and(|obj| obj.ptr_id() == key),
            TargetRef::Proxy(weak) => weak
                .upgrade()
                .is_some_and(|proxy| Arc::as_ptr(&proxy) as *const () as usize == key),
        }
    }
}

struct Slot {
    target: TargetRef,
    proxy: Weak<dyn Virtualized>,
}

struct ModeMap {
    slots: FxHashMap<usize, Slot>,
    sweep_at: usize,
}

impl ModeMap {
    fn new() -> Self {
        Self {
            slots: FxHashMap::default(),
            sweep_at: SWEEP_FLOOR,
        }
    }

    fn sweep(&mut self) {
        self.slots
            .retain(|key, slot| slot.target.is_alive_at(*key) && slot.proxy.upgrade().is_some());
        self.sweep_at = (self.slots.len() * 2).max(SWEEP_FLOOR);
    }
}

thread_local! {
    static IDENTITY_MAPS: RefCell<[ModeMap; 4]> = RefCell::new([
        ModeMap::new(),
        ModeMap::new(),
        ModeMap::new(),
        ModeMap::new(),
    ]);
}

/// Pointer identity of a cacheable target (raw container or proxy).
fn identity_of(target: &Value) -> Option<usize> {
    match target {
        Value::Object(obj) => Some(obj.ptr_id()),
        Value::Proxy(proxy) => Some(Arc::as_ptr(proxy) as *const () as usize),
        _ => None,
    }
}

fn target_ref_of(target: &Value) -> Option<TargetRef> {
    match target {
        Value::Object(obj) => Some(TargetRef::Object(obj.downgrade())),
        Value::Proxy(proxy) => Some(TargetRef::Proxy(Arc::downgrade(proxy))),
        _ => None,
    }
}

/// Previously produced proxy for `(mode, target)`, if still live.
pub(crate) fn lookup(mode: Mode, target: &Value) -> Option<Arc<dyn Virtualized>> {
    let key = identity_of(target)?;
    IDENTITY_MAPS.with(|maps| {
        let mut maps = maps.borrow_mut();
        let map = &mut maps[mode.cache_index()];
        let alive = match map.slots.get(&key) {
            None => return None,
            // a hit is only valid while the keyed allocation is the one
            // that produced it — addresses get reused
            Some(slot) if slot.target.is_alive_at(key) => slot.proxy.upgrade(),
            Some(_) => None,
        };
        if alive.is_none() {
            map.slots.remove(&key);
        }
        alive
    })
}

/// Record the proxy produced for `(mode, target)`. Called at most once per
/// pair: the factory always looks up before constructing.
pub(crate) fn insert(mode: Mode, target: &Value, proxy: &Arc<dyn Virtualized>) {
    let Some(key) = identity_of(target) else {
        return;
    };
    let Some(target_ref) = target_ref_of(target) else {
        return;
    };
    IDENTITY_MAPS.with(|maps| {
        let mut maps = maps.borrow_mut();
        let map = &mut maps[mode.cache_index()];
        map.slots.insert(
            key,
            Slot {
                target: target_ref,
                proxy: Arc::downgrade(proxy),
            },
        );
        if map.slots.len() >= map.sweep_at {
            map.sweep();
        }
    });
}

/// Drop every identity-map entry whose target or proxy has died.
///
/// Pruning also happens opportunistically on lookup/insert; this hook exists
/// for embedders that want a deterministic sweep point.
pub fn sweep_identity_maps() {
    IDENTITY_MAPS.with(|maps| {
        for map in maps.borrow_mut().iter_mut() {
            map.sweep();
        }
    });
}

/// Number of live identity-map entries across all modes (diagnostics).
pub fn identity_map_len() -> usize {
    sweep_identity_maps();
    IDENTITY_MAPS.with(|maps| maps.borrow().iter().map(|m| m.slots.len()).sum())
}

// ---------------------------------------------------------------------------
// Collection handler registration
// ---------------------------------------------------------------------------

/// Factory for the externally implemented map/set trap sets.
///
/// When a map- or set-shaped container reaches the virtualization factory,
/// construction is delegated here; with no handler registered those shapes
/// are returned unwrapped.
pub trait CollectionHandler {
    /// Build a proxy over a map/set container under `mode`.
    fn virtualize(&self, raw: RawObject, mode: Mode) -> Arc<dyn Virtualized>;
}

thread_local! {
    static COLLECTION_HANDLER: RefCell<Option<Rc<dyn CollectionHandler>>> =
        const { RefCell::new(None) };
}

/// Install the thread's collection handler, returning the previous one.
pub fn install_collection_handler(
    handler: Rc<dyn CollectionHandler>,
) -> Option<Rc<dyn CollectionHandler>> {
    COLLECTION_HANDLER.with(|slot| slot.borrow_mut().replace(handler))
}

/// Remove the thread's collection handler, returning it.
pub fn clear_collection_handler() -> Option<Rc<dyn CollectionHandler>> {
    COLLECTION_HANDLER.with(|slot| slot.borrow_mut().take())
}

pub(crate) fn collection_handler() -> Option<Rc<dyn CollectionHandler>> {
    COLLECTION_HANDLER.with(|slot| slot.borrow().clone())
}
