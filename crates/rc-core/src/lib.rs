//! # rc-core
//!
//! Shared vocabulary for the remote-control bridge.
//!
//! - **Values**: [`Value`], the engine-independent tagged union every read,
//!   write, and notification travels as
//! - **Object references**: [`ObjectRef`], a weak handle to a live engine object
//! - **Type descriptors**: [`TypeDesc`] with the shape check and coercion rules
//!   applied before any mutation
//! - **Paths**: [`FieldPath`] parsing for `Object.Field[2].Sub` addresses
//! - **Codec**: CBOR and JSON wire formats with lossless round-tripping
//! - **Errors**: the [`RcError`] taxonomy and its stable wire codes
//! - **Logging**: `tracing` subscriber setup and capture helpers for tests

#![deny(unsafe_code)]

pub mod codec;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod object_ref;
pub mod path;
pub mod types;
pub mod value;

pub use codec::{Diagnostics, ValueEncoder, WireCodec, WireFormat};
pub use errors::{RcError, Result};
pub use ids::{PresetId, SessionId, SignatureId, SubscriptionId};
pub use object_ref::ObjectRef;
pub use path::{FieldPath, Segment};
pub use types::{FunctionDesc, ObjectDesc, ParamDesc, PropertyDesc, TypeDesc};
pub use value::{Value, ValueKind};
