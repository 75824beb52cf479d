//! WebSocket sessions: outbox, heartbeat, frame decoding, and the session loop.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod session;
