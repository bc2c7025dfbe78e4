//! Client-side state reconciliation for the Parallax desktop client.
//!
//! The engine merges two sources of truth about the social graph: a push
//! channel delivering real-time deltas over a websocket, and a pull
//! channel fetching authoritative HTTP snapshots. A single writer task
//! owns the store, applies every mutation in arrival order, and publishes
//! immutable snapshots (friends, active instances, activity log, pending
//! requests) through watch channels.

pub mod activity;
pub mod aggregate;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod runtime;
pub mod scheduler;
pub mod store;

pub use activity::ActivityLog;
pub use collaborators::{ImageResolver, NoopResolver, SnapshotApi};
pub use config::EngineConfig;
pub use errors::{ConsistencyGap, EngineError};
pub use runtime::{Engine, EngineCommand, EngineHandle};
pub use scheduler::{ManualDecision, RefreshScheduler, SessionTag};
pub use store::{
    AppliedDelta, FriendChange, ImageSlot, PendingRequests, ReconStore, ReplaceOutcome,
};
