//! Test doubles for the external tracking/scheduling collaborator.
//!
//! `RecordingSink` captures every `track`/`trigger` call verbatim so tests
//! can assert on the exact observation protocol. `MiniEffects` is a minimal
//! synchronous effect runner — just enough dependency graph to exercise
//! re-run behavior (and to detect runaway re-execution loops).

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use lutra_reactive::{
    DepKey, DependencySink, TrackOp, TriggerOp, install_sink, resume_tracking,
};
use lutra_value::{PropertyKey, RawObject, Value};

/// A single observed sink call.
#[derive(Clone, Debug)]
pub enum Event {
    Track {
        target: usize,
        op: TrackOp,
        key: DepKey,
    },
    Trigger {
        target: usize,
        op: TriggerOp,
        key: DepKey,
        new_value: Option<Value>,
        old_value: Option<Value>,
    },
}

/// Records every sink call for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    events: RefCell<Vec<Event>>,
}

impl RecordingSink {
    /// Create and install a recording sink for this thread.
    pub fn install() -> Rc<Self> {
        let sink = Rc::new(Self::default());
        install_sink(sink.clone());
        sink
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn tracks(&self) -> Vec<(usize, TrackOp, DepKey)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Track { target, op, key } => Some((*target, *op, key.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn triggers(&self) -> Vec<(usize, TriggerOp, DepKey)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Trigger {
                    target, op, key, ..
                } => Some((*target, *op, key.clone())),
                _ => None,
            })
            .collect()
    }

    /// Trigger events with their carried values, for old/new assertions.
    pub fn trigger_values(&self) -> Vec<(TriggerOp, DepKey, Option<Value>, Option<Value>)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Trigger {
                    op,
                    key,
                    new_value,
                    old_value,
                    ..
                } => Some((*op, key.clone(), new_value.clone(), old_value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn tracked(&self, target: &RawObject, op: TrackOp, key: &DepKey) -> bool {
        self.tracks()
            .iter()
            .any(|(t, o, k)| *t == target.ptr_id() && *o == op && k == key)
    }

    pub fn track_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Track { .. }))
            .count()
    }

    pub fn trigger_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Trigger { .. }))
            .count()
    }
}

impl DependencySink for RecordingSink {
    fn track(&self, target: &RawObject, op: TrackOp, key: &DepKey) {
        self.events.borrow_mut().push(Event::Track {
            target: target.ptr_id(),
            op,
            key: key.clone(),
        });
    }

    fn trigger(
        &self,
        target: &RawObject,
        op: TriggerOp,
        key: &DepKey,
        new_value: Option<&Value>,
        old_value: Option<&Value>,
    ) {
        self.events.borrow_mut().push(Event::Trigger {
            target: target.ptr_id(),
            op,
            key: key.clone(),
            new_value: new_value.cloned(),
            old_value: old_value.cloned(),
        });
    }
}

/// Hard ceiling on synchronous re-runs of a single effect; hitting it means
/// a mutation inside a dependent re-triggered that dependent forever.
const RUNAWAY_LIMIT: u32 = 100;

type EffectFn = Rc<dyn Fn()>;

/// A minimal synchronous effect engine over the sink interface.
///
/// Dependencies are keyed `(container identity, dependency key)`. Structural
/// mutations (`Add`/`Delete`/`Clear`) also notify the iteration sentinel and
/// the `length` pseudo-key, per the sink contract.
#[derive(Default)]
pub struct MiniEffects {
    deps: RefCell<HashMap<(usize, DepKey), HashSet<usize>>>,
    effects: RefCell<Vec<EffectFn>>,
    run_counts: RefCell<Vec<u32>>,
    active: Cell<Option<usize>>,
}

impl MiniEffects {
    /// Create and install an effect engine for this thread.
    pub fn install() -> Rc<Self> {
        let engine = Rc::new(Self::default());
        install_sink(engine.clone());
        engine
    }

    /// Register an effect and run it once immediately (tracking its reads).
    pub fn effect(&self, body: impl Fn() + 'static) -> usize {
        let id = {
            let mut effects = self.effects.borrow_mut();
            effects.push(Rc::new(body));
            self.run_counts.borrow_mut().push(0);
            effects.len() - 1
        };
        self.run(id);
        id
    }

    /// How many times an effect has run (including its initial run).
    pub fn runs(&self, id: usize) -> u32 {
        self.run_counts.borrow()[id]
    }

    fn run(&self, id: usize) {
        {
            let mut counts = self.run_counts.borrow_mut();
            counts[id] += 1;
            assert!(
                counts[id] < RUNAWAY_LIMIT,
                "effect {id} re-ran {RUNAWAY_LIMIT} times: runaway update loop"
            );
        }
        // drop this effect's stale dependency edges before re-tracking
        for subscribers in self.deps.borrow_mut().values_mut() {
            subscribers.remove(&id);
        }
        let body = self.effects.borrow()[id].clone();
        let previous = self.active.replace(Some(id));
        // a dependent re-run from inside a suspended mutation still records
        // its own reads
        let _resume = resume_tracking();
        body();
        self.active.set(previous);
    }

    fn notify(&self, target: usize, key: &DepKey) -> HashSet<usize> {
        self.deps
            .borrow()
            .get(&(target, key.clone()))
            .cloned()
            .unwrap_or_default()
    }
}

impl DependencySink for MiniEffects {
    fn track(&self, target: &RawObject, _op: TrackOp, key: &DepKey) {
        if let Some(effect) = self.active.get() {
            self.deps
                .borrow_mut()
                .entry((target.ptr_id(), key.clone()))
                .or_default()
                .insert(effect);
        }
    }

    fn trigger(
        &self,
        target: &RawObject,
        op: TriggerOp,
        key: &DepKey,
        _new_value: Option<&Value>,
        _old_value: Option<&Value>,
    ) {
        // collect ids first, then run with no borrows held — effects may
        // re-enter this sink synchronously
        let id = target.ptr_id();
        let mut pending = self.notify(id, key);
        if matches!(op, TriggerOp::Add | TriggerOp::Delete | TriggerOp::Clear) {
            pending.extend(self.notify(id, &DepKey::Iterate));
            pending.extend(self.notify(id, &DepKey::length()));
        }
        let mut pending: Vec<_> = pending.into_iter().collect();
        pending.sort_unstable();
        for effect in pending {
            self.run(effect);
        }
    }
}

/// Convenience: a reactive plain object from key/value pairs.
pub fn reactive_object<const N: usize>(entries: [(&str, Value); N]) -> (RawObject, Value) {
    let raw = RawObject::object_from(entries);
    let proxy = lutra_reactive::reactive(Value::object(raw.clone()));
    (raw, proxy)
}

/// Convenience: a reactive sequence from elements.
pub fn reactive_sequence<const N: usize>(elements: [Value; N]) -> (RawObject, Value) {
    let raw = RawObject::sequence_from(elements);
    let proxy = lutra_reactive::reactive(Value::object(raw.clone()));
    (raw, proxy)
}

/// Route development-mode diagnostics to the test output when `RUST_LOG`
/// asks for them.
pub fn init_diagnostics() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Shorthand for a string property key.
pub fn key(name: &str) -> PropertyKey {
    PropertyKey::string(name)
}

/// Shorthand for an index property key.
pub fn idx(i: u32) -> DepKey {
    DepKey::Key(PropertyKey::Index(i))
}
