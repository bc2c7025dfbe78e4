//! Parallax pull channel
//!
//! Request/response access to the remote API: authenticated HTTP calls
//! returning full, authoritative snapshots in `{data}` envelopes. This is
//! the snapshot-fetcher half of the reconciliation engine; the push
//! channel lives in `parallax-socket`.

pub mod api;
pub mod connection;
pub mod errors;

pub use api::{Api, InstancePage, InstanceSort, SortDirection};
pub use connection::{Connection, DEFAULT_REQUEST_TIMEOUT};
pub use errors::ClientError;
pub use url::Url;
