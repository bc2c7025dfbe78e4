use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An inbound push-channel frame, prior to typed decoding.
///
/// `response_type` tags the payload; tags outside the known set are logged
/// and dropped by the ingest layer, never treated as fatal.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Frame {
    pub response_type: i32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Known `response_type` tags.
pub mod response_type {
    pub const NOTICE: i32 = 0;
    pub const FRIEND_UPDATE: i32 = 1;
    pub const FRIEND_REQUESTS: i32 = 2;
    pub const INVITES: i32 = 3;
    pub const INVITE_REQUESTS: i32 = 4;
    pub const INSTANCE_CLOSED: i32 = 5;
}

/// An outbound command frame. Fire-and-forget: the engine does not
/// correlate responses to commands.
#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct CommandFrame {
    #[serde(rename = "RequestType")]
    pub request_type: i32,
    #[serde(rename = "Data")]
    pub data: Value,
}

impl CommandFrame {
    #[must_use]
    pub const fn new(request_type: i32, data: Value) -> Self {
        Self { request_type, data }
    }
}

/// Known `RequestType` tags for outbound commands.
pub mod request_type {
    pub const SEND_INVITE: i32 = 1;
    pub const RESPOND_INVITE: i32 = 2;
    pub const REQUEST_INVITE: i32 = 3;
}
