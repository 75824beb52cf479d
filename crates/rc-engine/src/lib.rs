//! # rc-engine
//!
//! The engine side of the bridge.
//!
//! - [`Reflection`]: the capability the bridge needs from an engine
//! - [`EngineContext`]: the single thread that owns the engine; all work is
//!   submitted as jobs
//! - [`resolver`]: address to [`Handle`] resolution
//! - [`executor`]: get/set/invoke/describe on resolved handles
//! - [`SceneGraph`]: an in-memory engine used by the demo binary and tests

#![deny(unsafe_code)]

pub mod context;
pub mod executor;
pub mod reflection;
pub mod resolver;
pub mod scene;

pub use context::{EngineConfig, EngineContext, Pending};
pub use executor::{ModifyFlags, Operation, execute};
pub use reflection::{ChangeHook, EngineEvent, EventSink, HookId, Reflection};
pub use resolver::{AliasSource, FunctionHandle, Handle, NoAliases, PropertyHandle, resolve, resolve_engine_path};
pub use scene::{ObjectBuilder, SceneGraph};
