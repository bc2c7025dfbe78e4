//! Frame decoding for the push channel
//!
//! [`parse_text`] is a pure function from a raw text frame to a typed
//! event. Tags outside the known set are forward-compatible: they produce
//! a warning and no event, never an error.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use parallax_primitives::events::PushEvent;
use parallax_primitives::ws::{response_type, Frame};

use crate::errors::ParseError;

/// Decodes one raw text frame.
///
/// Returns `Ok(None)` for frames tagged with an unknown `responseType`.
pub fn parse_text(text: &str) -> Result<Option<PushEvent>, ParseError> {
    let frame: Frame = serde_json::from_str(text)?;

    decode(frame)
}

/// Decodes an already-parsed frame into a typed event.
pub fn decode(frame: Frame) -> Result<Option<PushEvent>, ParseError> {
    let tag = frame.response_type;

    let event = match tag {
        response_type::NOTICE => PushEvent::Notice(frame.message.unwrap_or_default()),
        response_type::FRIEND_UPDATE => PushEvent::FriendUpdate(payload(tag, frame.data)?),
        response_type::FRIEND_REQUESTS => PushEvent::FriendRequests(payload(tag, frame.data)?),
        response_type::INVITES => PushEvent::Invites(payload(tag, frame.data)?),
        response_type::INVITE_REQUESTS => PushEvent::InviteRequests(payload(tag, frame.data)?),
        response_type::INSTANCE_CLOSED => PushEvent::InstanceClosed(payload(tag, frame.data)?),
        unknown => {
            warn!(tag = unknown, "dropping frame with unknown response type");

            return Ok(None);
        }
    };

    Ok(Some(event))
}

fn payload<T: DeserializeOwned>(tag: i32, data: Value) -> Result<T, ParseError> {
    serde_json::from_value(data).map_err(|source| ParseError::Payload { tag, source })
}
