//! Request routing: envelopes, parameters, the method registry and handlers.

pub mod context;
pub mod handlers;
pub mod params;
pub mod registry;
pub mod types;
