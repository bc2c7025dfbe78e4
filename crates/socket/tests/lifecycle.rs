//! Loopback tests for the connection lifecycle manager.
//!
//! A local listener plays the remote end so closure classification,
//! reconnection and the attempt bound can be exercised for real.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use futures_util::SinkExt;
use parallax_socket::{Identity, SocketConfig, SocketEvent, SocketManager, SocketState};

fn init_logs() {
    let _ignored = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config(url: Url) -> SocketConfig {
    let mut config = SocketConfig::new(url);
    config.reconnect_delay = Duration::from_millis(10);
    config.ping_interval = Duration::from_secs(60);
    config
}

async fn local_url(listener: &TcpListener) -> Url {
    let addr = listener.local_addr().unwrap();
    format!("ws://{addr}/pipeline").parse().unwrap()
}

/// Accepts connections and immediately closes each with `code`.
fn close_loop(listener: TcpListener, code: u16, accepts: Arc<AtomicU32>) {
    drop(tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let _ignored = accepts.fetch_add(1, Ordering::SeqCst);

            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };

            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            };
            let _ignored = ws.close(Some(frame)).await;
        }
    }));
}

#[tokio::test]
async fn five_recoverable_closures_emit_fatal_and_no_sixth_attempt() {
    init_logs();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = local_url(&listener).await;

    let accepts = Arc::new(AtomicU32::new(0));
    close_loop(listener, 1012, Arc::clone(&accepts));

    let (mut manager, mut events) = SocketManager::new(test_config(url));
    manager.connect(Identity::new("token-a")).await;

    let mut closures = 0;
    loop {
        match events.recv().await.expect("event stream ended early") {
            SocketEvent::Closed { code, .. } => {
                assert_eq!(code, 1012);
                closures += 1;
            }
            SocketEvent::Fatal(_) => break,
            SocketEvent::Connected | SocketEvent::Event(_) => {}
        }
    }

    assert_eq!(closures, 5);

    // give a would-be sixth attempt time to show up
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 5);

    assert_eq!(*manager.state().borrow(), SocketState::Fatal);
}

#[tokio::test]
async fn unrecoverable_closure_is_immediately_fatal() {
    init_logs();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = local_url(&listener).await;

    let accepts = Arc::new(AtomicU32::new(0));
    close_loop(listener, 1008, Arc::clone(&accepts));

    let (mut manager, mut events) = SocketManager::new(test_config(url));
    manager.connect(Identity::new("token-a")).await;

    let mut closures = 0;
    loop {
        match events.recv().await.expect("event stream ended early") {
            SocketEvent::Closed { code, .. } => {
                assert_eq!(code, 1008);
                closures += 1;
            }
            SocketEvent::Fatal(_) => break,
            SocketEvent::Connected | SocketEvent::Event(_) => {}
        }
    }

    assert_eq!(closures, 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 1);

    // a receiver subscribing after the fact still reads the terminal state
    assert_eq!(*manager.state().borrow(), SocketState::Fatal);
}

#[tokio::test]
async fn disconnect_completes_while_events_are_unconsumed() {
    init_logs();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = local_url(&listener).await;

    let accepts = Arc::new(AtomicU32::new(0));
    close_loop(listener, 1012, Arc::clone(&accepts));

    let (mut manager, events) = SocketManager::new(test_config(url));
    manager.connect(Identity::new("token-a")).await;

    // let closure cycles queue events nobody is reading
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(1), manager.disconnect("test over"))
        .await
        .expect("disconnect must not hang on queued events");

    assert_eq!(*manager.state().borrow(), SocketState::Idle);
    drop(events);
}

#[tokio::test]
async fn frames_flow_and_malformed_input_does_not_reconnect() {
    init_logs();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = local_url(&listener).await;

    let accepts = Arc::new(AtomicU32::new(0));
    let accepts_in_task = Arc::clone(&accepts);

    drop(tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ignored = accepts_in_task.fetch_add(1, Ordering::SeqCst);

        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // garbage first: must be dropped without tearing the socket down
        ws.send(WsMessage::Text("{not json".to_owned()))
            .await
            .unwrap();

        let frame = json!({
            "responseType": 1,
            "data": {"id": "usr_1", "online": true},
        })
        .to_string();
        ws.send(WsMessage::Text(frame)).await.unwrap();

        // hold the connection open
        tokio::time::sleep(Duration::from_secs(5)).await;
    }));

    let (mut manager, mut events) = SocketManager::new(test_config(url));
    manager.connect(Identity::new("token-a")).await;

    match events.recv().await.unwrap() {
        SocketEvent::Connected => {}
        other => panic!("expected Connected, got {other:?}"),
    }

    match events.recv().await.unwrap() {
        SocketEvent::Event(event) => {
            let debug = format!("{event:?}");
            assert!(debug.contains("usr_1"), "unexpected event: {debug}");
        }
        other => panic!("expected a push event, got {other:?}"),
    }

    assert_eq!(accepts.load(Ordering::SeqCst), 1);

    manager.disconnect("test over").await;
    assert_eq!(*manager.state().borrow(), SocketState::Idle);
}
