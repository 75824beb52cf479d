//! # rc-presets
//!
//! Presets give clients stable field names over engine paths. A field can be
//! rebound to a different path without breaking clients that use its name.
//!
//! The registry persists each preset as a JSON file and reloads them at
//! startup. Fields may carry a range mapping used by protocol inputs.
//! Signatures stamp the same set of member paths onto many objects.

#![deny(unsafe_code)]

pub mod range;
pub mod registry;
pub mod signature;
pub mod store;
pub mod types;

pub use registry::{PresetListener, PresetRegistry};
pub use signature::{ApplyReport, Signature, SignatureField, SignatureRegistry};
pub use store::{FsPresetStore, MemoryPresetStore, PresetPersister, PresetRecord, PresetStore};
pub use types::{FieldKind, PresetChange, PresetEvent, PresetField, PresetSummary, RangePoint};
