//! # Lutra Reactive
//!
//! The reactive object virtualization layer: wraps structural values
//! ([`lutra_value::Value`] containers) in interception proxies so that every
//! read is observed and every mutation reported, without changing how
//! callers access the structure.
//!
//! ## Design Principles
//!
//! - **Total**: no path in the layer panics or errors — ineligible inputs
//!   and illegal mutations degrade to well-defined results, with
//!   development-mode diagnostics via `tracing`
//! - **Identity-stable**: one live proxy per (target, mode) pair, enforced
//!   by weak identity maps that never retain the raw value
//! - **External scheduling**: who re-runs and when is the installed
//!   [`DependencySink`]'s contract; this layer only reports what was read
//!   and what changed
//!
//! ```
//! use lutra_reactive::{reactive, to_raw};
//! use lutra_value::{PropertyKey, RawObject, Value};
//!
//! let raw = RawObject::object_from([("count", Value::int32(0))]);
//! let state = reactive(Value::object(raw.clone()));
//!
//! state.set(&PropertyKey::string("count"), Value::int32(1));
//! assert_eq!(state.get(&PropertyKey::string("count")), Value::int32(1));
//! assert!(to_raw(&state).as_object().unwrap().ptr_eq(&raw));
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod reactive;
pub mod registry;
pub mod track;
pub mod traps;

pub use reactive::{
    is_reactive, is_readonly, is_shallow, is_virtualized, mark_raw, readonly, reactive,
    shallow_reactive, shallow_readonly, to_raw, to_reactive, to_readonly, virtualize,
};
pub use registry::{
    CollectionHandler, clear_collection_handler, install_collection_handler, sweep_identity_maps,
};
pub use track::{
    DepKey, DependencySink, TrackOp, TrackingResumption, TrackingSuspension, TriggerOp,
    clear_sink, install_sink, is_tracking, resume_tracking, suspend_tracking, track, trigger,
};
pub use traps::ReactiveProxy;

pub use lutra_value::Mode;
