use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

/// A frame that could not be decoded into a typed event.
///
/// Parse errors are logged and the frame dropped; they never tear down the
/// connection or trigger a reconnect.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    #[error("binary frames are not part of the protocol")]
    BinaryFrame,

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("payload of frame tagged {tag} did not decode: {source}")]
    Payload {
        tag: i32,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SocketError {
    #[error("socket is not connected")]
    NotConnected,

    #[error("websocket failure: {0}")]
    Transport(#[from] WsError),
}
