//! Core data model and wire types for the Parallax reconciliation engine.
//!
//! Everything in this crate is plain data: entity records held by the
//! reconciliation store, the typed events decoded from the push channel,
//! and the frame shapes exchanged with the remote API. No I/O lives here.

pub mod activity;
pub mod events;
pub mod friend;
pub mod ids;
pub mod instance;
pub mod requests;
pub mod ws;
