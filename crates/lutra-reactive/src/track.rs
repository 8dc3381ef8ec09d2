//! The dependency-tracking interface.
//!
//! The engine that records "who is reading" and decides "who must re-run"
//! is an external collaborator. This layer consumes exactly two primitives
//! from it — [`DependencySink::track`] and [`DependencySink::trigger`] —
//! through a sink installed per thread. With no sink installed, observation
//! is a no-op and virtualized containers behave like plain ones.
//!
//! Tracking can be suspended for the duration of an internal operation via
//! [`suspend_tracking`]. Suspension is a depth counter restored by an RAII
//! guard, so nested suspensions compose; it affects only `track` — `trigger`
//! always fires, because notifications must not be lost to an unrelated
//! suspension.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;

use lutra_value::{PropertyKey, RawObject, Value};

/// The kind of read being registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackOp {
    /// Property read.
    Get,
    /// Key-presence test.
    Has,
    /// Key-set enumeration.
    Iterate,
}

/// The kind of mutation being reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerOp {
    /// A key that did not exist now does.
    Add,
    /// An existing key's value changed.
    Set,
    /// An existing key was removed.
    Delete,
    /// The whole container was emptied.
    Clear,
}

/// Dependency key: a concrete property key, or the opaque iteration
/// sentinel standing for "the whole key-set was enumerated".
///
/// Sequence enumeration is keyed on the `length` pseudo-key instead of the
/// sentinel, so length changes and enumeration invalidate each other.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A concrete property key.
    Key(PropertyKey),
    /// The iteration sentinel.
    Iterate,
}

impl DepKey {
    /// Dependency key for a property.
    pub fn key(key: &PropertyKey) -> Self {
        Self::Key(key.clone())
    }

    /// Dependency key for sequence length.
    pub fn length() -> Self {
        Self::Key(PropertyKey::length())
    }
}

/// The consumed tracking/notification primitives.
///
/// `track` is called while a read is being observed; implementations that
/// have no currently-running dependent should treat it as a no-op. `trigger`
/// is called strictly after the raw mutation has been applied, so a
/// dependent re-running synchronously from inside the notification observes
/// the post-mutation state.
///
/// Contract for structural mutations: on `Add` and `Delete`, dependents
/// registered against the iteration sentinel (or the `length` pseudo-key of
/// sequences) must also be notified — the coarse enumeration dependency
/// exists precisely so shape changes reach enumerators.
pub trait DependencySink {
    /// Register that the current dependent read `key` on `target`.
    fn track(&self, target: &RawObject, op: TrackOp, key: &DepKey);

    /// Notify dependents of `(target, key)` that they must re-run.
    fn trigger(
        &self,
        target: &RawObject,
        op: TriggerOp,
        key: &DepKey,
        new_value: Option<&Value>,
        old_value: Option<&Value>,
    );
}

thread_local! {
    static SINK: RefCell<Option<Rc<dyn DependencySink>>> = const { RefCell::new(None) };
    static SUSPEND_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Install the thread's dependency sink, returning the previous one.
pub fn install_sink(sink: Rc<dyn DependencySink>) -> Option<Rc<dyn DependencySink>> {
    SINK.with(|slot| slot.borrow_mut().replace(sink))
}

/// Remove the thread's dependency sink, returning it.
pub fn clear_sink() -> Option<Rc<dyn DependencySink>> {
    SINK.with(|slot| slot.borrow_mut().take())
}

/// Whether reads are currently being recorded (a sink is installed and no
/// suspension is active).
pub fn is_tracking() -> bool {
    SUSPEND_DEPTH.get() == 0 && SINK.with(|slot| slot.borrow().is_some())
}

/// Register a read with the installed sink, if tracking is active.
///
/// Public so external trap sets (collection handlers) can observe reads the
/// same way the base traps do.
pub fn track(target: &RawObject, op: TrackOp, key: &DepKey) {
    if SUSPEND_DEPTH.get() != 0 {
        return;
    }
    let sink = SINK.with(|slot| slot.borrow().clone());
    if let Some(sink) = sink {
        sink.track(target, op, key);
    }
}

/// Report a mutation to the installed sink. Not affected by suspension.
///
/// Public so external trap sets (collection handlers) can report mutations
/// the same way the base traps do.
pub fn trigger(
    target: &RawObject,
    op: TriggerOp,
    key: &DepKey,
    new_value: Option<&Value>,
    old_value: Option<&Value>,
) {
    let sink = SINK.with(|slot| slot.borrow().clone());
    if let Some(sink) = sink {
        sink.trigger(target, op, key, new_value, old_value);
    }
}

/// Suspend read recording until the returned guard drops.
///
/// Nestable: each guard bumps a depth counter on creation and restores it on
/// drop, so an inner suspension ending never un-suspends an outer one.
pub fn suspend_tracking() -> TrackingSuspension {
    SUSPEND_DEPTH.set(SUSPEND_DEPTH.get() + 1);
    TrackingSuspension {
        _not_send: PhantomData,
    }
}

/// RAII guard produced by [`suspend_tracking`].
pub struct TrackingSuspension {
    // Thread-local bookkeeping: the guard must drop on the thread it was
    // created on.
    _not_send: PhantomData<*const ()>,
}

impl Drop for TrackingSuspension {
    fn drop(&mut self) {
        SUSPEND_DEPTH.set(SUSPEND_DEPTH.get().saturating_sub(1));
    }
}

/// Re-enable read recording until the returned guard drops, saving the
/// current suspension depth and restoring it afterwards.
///
/// For the effect-runner collaborator: a dependent re-run synchronously from
/// inside a suspended mutation (an append notification, say) must still
/// record its own reads, so the runner brackets each dependent's execution
/// with this.
pub fn resume_tracking() -> TrackingResumption {
    let saved = SUSPEND_DEPTH.replace(0);
    TrackingResumption {
        saved,
        _not_send: PhantomData,
    }
}

/// RAII guard produced by [`resume_tracking`].
pub struct TrackingResumption {
    saved: u32,
    _not_send: PhantomData<*const ()>,
}

impl Drop for TrackingResumption {
    fn drop(&mut self) {
        SUSPEND_DEPTH.set(self.saved);
    }
}
