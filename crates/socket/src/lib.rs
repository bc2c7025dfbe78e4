//! Parallax push channel
//!
//! Owns the persistent websocket to the remote API: connect and
//! authenticate, detect fatal versus recoverable closure, reconnect with a
//! bounded attempt count, and decode raw frames into typed events. The
//! socket layer never touches reconciliation state; it only forwards
//! [`SocketEvent`]s into the engine's single-writer queue.

pub mod errors;
pub mod ingest;
pub mod lifecycle;

pub use errors::{ParseError, SocketError};
pub use lifecycle::{
    Identity, SocketConfig, SocketEvent, SocketManager, SocketState, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_PING_INTERVAL, DEFAULT_RECONNECT_DELAY,
};
