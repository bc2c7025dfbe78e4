use reqwest::StatusCode;
use thiserror::Error;

/// Failures surfaced by the pull channel.
///
/// All of these are terminal for the single call that produced them; the
/// refresh scheduler decides whether to retry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Socket-level or HTTP-transport failure, including per-call timeout.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("request failed with status {status}")]
    Status { status: StatusCode },

    /// Authentication was rejected; the session needs fresh credentials.
    #[error("authentication rejected")]
    Unauthorized,

    /// A 2xx response whose envelope carried no `data` field.
    #[error("response envelope missing data")]
    MissingData,
}
