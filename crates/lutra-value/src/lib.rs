//! # Lutra Value
//!
//! Dynamic value model for the Lutra reactive virtualization layer.
//!
//! ## Design Principles
//!
//! - **Shared handles**: all heap data is behind `Arc`; values clone cheaply
//!   and identity is pointer identity
//! - **Capability dispatch**: cells and proxies are recognized through the
//!   [`Boxed`] and [`Virtualized`] traits, not a shared base type
//! - **Unobserved substrate**: nothing here tracks reads or reports writes —
//!   that is the reactive layer's job, layered on top

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cell;
pub mod collections;
pub mod convert;
pub mod object;
pub mod traits;
pub mod value;

pub use cell::ReactiveCell;
pub use collections::{MapStore, SetStore, ValueKey};
pub use convert::{ConvertError, from_json, to_json};
pub use object::{
    ObjectKind, PropertyAttributes, PropertyDescriptor, PropertyKey, RawObject, WeakRawObject,
};
pub use traits::{Boxed, Mode, Virtualized};
pub use value::{Symbol, Value, WellKnownSymbol};
