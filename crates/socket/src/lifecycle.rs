//! Connection lifecycle management
//!
//! The [`SocketManager`] owns the websocket: it dials with the session
//! identity, classifies closures, retries recoverable ones after a fixed
//! delay, and gives up with a fatal event once the attempt bound is
//! reached. Reaching [`SocketState::Fatal`] is terminal; recovering from
//! it requires a fresh [`SocketManager::connect`] call with new
//! credentials.

use std::fmt;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use parallax_primitives::events::PushEvent;
use parallax_primitives::ws::CommandFrame;

use crate::errors::{ParseError, SocketError};
use crate::ingest;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Credentials the socket authenticates with on connect.
///
/// Changing identity while connected forces a disconnect first; there is
/// no credential swap on a live socket.
#[derive(Clone, Eq, PartialEq)]
pub struct Identity(String);

impl Identity {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the token must not end up in logs
        f.write_str("Identity(..)")
    }
}

#[derive(Clone, Debug)]
pub struct SocketConfig {
    pub url: Url,
    pub reconnect_delay: Duration,
    pub max_attempts: u32,
    pub ping_interval: Duration,
}

impl SocketConfig {
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self {
            url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum SocketState {
    Idle,
    Connecting,
    Connected,
    Closing,
    Closed,
    Fatal,
}

/// Lifecycle and data events emitted to the engine.
#[derive(Clone, Debug)]
pub enum SocketEvent {
    Connected,
    Closed { code: u16, reason: String },
    Fatal(String),
    Event(PushEvent),
}

/// Close codes after which a reconnect is attempted. Policy violations
/// (1008) and application codes (>= 4000) usually mean the credentials
/// were rejected, so retrying with the same identity would loop forever.
#[must_use]
pub const fn is_recoverable(code: u16) -> bool {
    matches!(code, 1000 | 1001 | 1005 | 1006 | 1012 | 1013)
}

#[derive(Debug)]
pub struct SocketManager {
    config: SocketConfig,
    events_tx: mpsc::Sender<SocketEvent>,
    state_tx: watch::Sender<SocketState>,
    identity: Option<Identity>,
    out_tx: Option<mpsc::UnboundedSender<CommandFrame>>,
    cancel: Option<CancellationToken>,
    driver: Option<JoinHandle<()>>,
}

impl SocketManager {
    #[must_use]
    pub fn new(config: SocketConfig) -> (Self, mpsc::Receiver<SocketEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let (state_tx, _) = watch::channel(SocketState::Idle);

        let manager = Self {
            config,
            events_tx,
            state_tx,
            identity: None,
            out_tx: None,
            cancel: None,
            driver: None,
        };

        (manager, events_rx)
    }

    /// Observable connection state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<SocketState> {
        self.state_tx.subscribe()
    }

    /// Connects (or reconnects) with the given identity.
    ///
    /// A live socket with a different identity is torn down first. A live
    /// socket with the same identity is left alone.
    pub async fn connect(&mut self, identity: Identity) {
        if self.cancel.is_some() {
            if self.identity.as_ref() == Some(&identity) {
                debug!("connect with unchanged identity on a live socket is a no-op");

                return;
            }

            self.disconnect("identity changed").await;
        }

        let cancel = CancellationToken::new();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let driver = tokio::spawn(drive(
            self.config.clone(),
            identity.clone(),
            self.state_tx.clone(),
            self.events_tx.clone(),
            out_rx,
            cancel.clone(),
        ));

        self.identity = Some(identity);
        self.out_tx = Some(out_tx);
        self.cancel = Some(cancel);
        self.driver = Some(driver);
    }

    /// Tears the connection down and returns to `Idle`.
    pub async fn disconnect(&mut self, reason: &str) {
        let Some(cancel) = self.cancel.take() else {
            return;
        };

        debug!(reason, "disconnecting socket");
        // send_replace: the latest state must be readable by receivers
        // subscribing after the fact
        let _previous = self.state_tx.send_replace(SocketState::Closing);

        cancel.cancel();

        if let Some(driver) = self.driver.take() {
            let _ignored = driver.await;
        }

        self.out_tx = None;
        self.identity = None;

        let _previous = self.state_tx.send_replace(SocketState::Idle);
    }

    /// Queues an outbound command frame. Fire-and-forget: delivery is not
    /// acknowledged and failures surface only as a later closure.
    pub fn send(&self, frame: CommandFrame) -> Result<(), SocketError> {
        let out_tx = self.out_tx.as_ref().ok_or(SocketError::NotConnected)?;

        out_tx.send(frame).map_err(|_| SocketError::NotConnected)
    }
}

/// How a single connection ended.
struct Closure {
    code: u16,
    reason: String,
}

async fn drive(
    config: SocketConfig,
    identity: Identity,
    state_tx: watch::Sender<SocketState>,
    events_tx: mpsc::Sender<SocketEvent>,
    mut out_rx: mpsc::UnboundedReceiver<CommandFrame>,
    cancel: CancellationToken,
) {
    // Attempts are consecutive across the whole session: only a fresh
    // `connect` call resets the budget.
    let mut attempts: u32 = 0;

    loop {
        let _previous = state_tx.send_replace(SocketState::Connecting);

        let outcome = tokio::select! {
            () = cancel.cancelled() => break,
            outcome = run_connection(&config, &identity, &state_tx, &events_tx, &mut out_rx) => outcome,
        };

        let closure = match outcome {
            Ok(closure) => closure,
            Err(err) => Closure {
                code: 1006,
                reason: err.to_string(),
            },
        };

        let _previous = state_tx.send_replace(SocketState::Closed);

        // a full event channel must not be able to deadlock disconnect()
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = events_tx.send(SocketEvent::Closed {
                code: closure.code,
                reason: closure.reason.clone(),
            }) => {}
        }

        if !is_recoverable(closure.code) {
            fatal(
                &state_tx,
                &events_tx,
                &cancel,
                format!("closed with unrecoverable code {}", closure.code),
            )
            .await;

            return;
        }

        attempts += 1;

        if attempts >= config.max_attempts {
            fatal(
                &state_tx,
                &events_tx,
                &cancel,
                format!("gave up after {attempts} reconnection attempts"),
            )
            .await;

            return;
        }

        debug!(
            attempts,
            delay = ?config.reconnect_delay,
            "scheduling reconnection"
        );

        tokio::select! {
            () = cancel.cancelled() => break,
            () = sleep(config.reconnect_delay) => {}
        }
    }

    // explicit disconnect
    let _previous = state_tx.send_replace(SocketState::Idle);
}

async fn fatal(
    state_tx: &watch::Sender<SocketState>,
    events_tx: &mpsc::Sender<SocketEvent>,
    cancel: &CancellationToken,
    reason: String,
) {
    warn!(%reason, "socket entered fatal state");

    let _previous = state_tx.send_replace(SocketState::Fatal);

    tokio::select! {
        () = cancel.cancelled() => {}
        _ = events_tx.send(SocketEvent::Fatal(reason)) => {}
    }
}

async fn run_connection(
    config: &SocketConfig,
    identity: &Identity,
    state_tx: &watch::Sender<SocketState>,
    events_tx: &mpsc::Sender<SocketEvent>,
    out_rx: &mut mpsc::UnboundedReceiver<CommandFrame>,
) -> Result<Closure, SocketError> {
    let mut url = config.url.clone();
    let _ignored = url
        .query_pairs_mut()
        .append_pair("authToken", identity.token());

    let (stream, _) = connect_async(url.as_str()).await?;
    let (mut sink, mut source) = stream.split();

    let _previous = state_tx.send_replace(SocketState::Connected);
    let _ignored = events_tx.send(SocketEvent::Connected).await;

    let mut ping = interval(config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick fires immediately
    let _ignored = ping.tick().await;

    loop {
        tokio::select! {
            message = source.next() => {
                let Some(message) = message else {
                    return Ok(Closure { code: 1006, reason: "stream ended".to_owned() });
                };

                if let Some(closure) = handle_message(message?, events_tx, &mut sink).await? {
                    return Ok(closure);
                }
            }
            Some(frame) = out_rx.recv() => {
                match serde_json::to_string(&frame) {
                    Ok(text) => sink.send(WsMessage::Text(text)).await?,
                    Err(err) => warn!(%err, "failed to encode outbound command"),
                }
            }
            _ = ping.tick() => {
                sink.send(WsMessage::Ping(Vec::new())).await?;
            }
        }
    }
}

async fn handle_message(
    message: WsMessage,
    events_tx: &mpsc::Sender<SocketEvent>,
    sink: &mut WsSink,
) -> Result<Option<Closure>, SocketError> {
    match message {
        WsMessage::Text(text) => match ingest::parse_text(&text) {
            Ok(Some(event)) => {
                let _ignored = events_tx.send(SocketEvent::Event(event)).await;
            }
            Ok(None) => {}
            // malformed frames are dropped; they never trigger reconnection
            Err(err) => warn!(%err, "ignoring malformed frame"),
        },
        WsMessage::Binary(_) => {
            warn!(err = %ParseError::BinaryFrame, "ignoring binary frame");
        }
        // liveness only, no state change
        WsMessage::Ping(payload) => sink.send(WsMessage::Pong(payload)).await?,
        WsMessage::Pong(_) => {}
        WsMessage::Close(frame) => {
            let (code, reason) = frame
                .map(|frame| (u16::from(frame.code), frame.reason.into_owned()))
                .unwrap_or((1005, String::new()));

            return Ok(Some(Closure { code, reason }));
        }
        WsMessage::Frame(_) => {}
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::is_recoverable;

    #[test]
    fn recoverable_close_codes() {
        for code in [1000, 1001, 1005, 1006, 1012, 1013] {
            assert!(is_recoverable(code), "code {code} should reconnect");
        }
    }

    #[test]
    fn auth_rejections_are_fatal() {
        for code in [1008, 4001, 4401] {
            assert!(!is_recoverable(code), "code {code} must not reconnect");
        }
    }
}
