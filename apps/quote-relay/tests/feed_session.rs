//! Feed Session Integration Tests
//!
//! Runs the feed client against a local WebSocket server speaking the framed
//! quote protocol: handshake, heartbeat echo, quote extraction, reconnection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;

use quote_relay::{
    FeedClient, FeedClientConfig, FeedClientError, FeedEvent, Frame, FrameCodec, Price,
    RetryConfig,
};

const SYMBOL: &str = "BINANCE:ADAUSD";
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

async fn accept(
    listener: &TcpListener,
    origins: &Arc<Mutex<Vec<Option<String>>>>,
) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    let origins = Arc::clone(origins);
    tokio_tungstenite::accept_hdr_async(
        stream,
        move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let origin = req
                .headers()
                .get("origin")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            origins.lock().push(origin);
            Ok(resp)
        },
    )
    .await
    .unwrap()
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match timeout(STEP_TIMEOUT, ws.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
            Some(Ok(_)) => {}
            other => panic!("expected text message, got {other:?}"),
        }
    }
}

async fn read_handshake(ws: &mut WebSocketStream<TcpStream>) -> Vec<(String, Vec<Value>)> {
    let codec = FrameCodec::new();
    let mut frames = Vec::new();
    for _ in 0..3 {
        match codec.decode(&next_text(ws).await).unwrap() {
            Frame::Data { method, params } => frames.push((method, params)),
            Frame::Heartbeat => panic!("unexpected heartbeat during handshake"),
        }
    }
    frames
}

async fn next_event(rx: &mut mpsc::Receiver<FeedEvent>) -> FeedEvent {
    timeout(STEP_TIMEOUT, rx.recv()).await.unwrap().unwrap()
}

fn assert_handshake(frames: &[(String, Vec<Value>)], session_id: &str) {
    assert_eq!(
        frames,
        [
            ("quote_create_session".to_string(), vec![json!(session_id)]),
            (
                "quote_set_fields".to_string(),
                vec![json!(session_id), json!("lp")]
            ),
            (
                "quote_add_symbols".to_string(),
                vec![json!(session_id), json!(SYMBOL)]
            ),
        ]
    );
}

fn connected_session(event: FeedEvent) -> String {
    match event {
        FeedEvent::Connected { session_id } => session_id,
        other => panic!("expected Connected, got {other:?}"),
    }
}

#[tokio::test]
async fn streams_quotes_and_reconnects_with_new_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let origins = Arc::new(Mutex::new(Vec::new()));
    let (drop_tx, drop_rx) = oneshot::channel::<()>();

    let server_origins = Arc::clone(&origins);
    let server = tokio::spawn(async move {
        // First connection: handshake, two heartbeats, one quote, abrupt drop.
        let mut ws = accept(&listener, &server_origins).await;
        let first = read_handshake(&mut ws).await;

        let heartbeats = ["~m~4~m~~h~1", "~m~4~m~~h~2"];
        let mut echoes = Vec::new();
        for heartbeat in heartbeats {
            ws.send(Message::Text(heartbeat.to_string().into())).await.unwrap();
            echoes.push(next_text(&mut ws).await);
        }

        let quote = FrameCodec::wrap(
            r#"{"m":"qsd","p":["qs_x",{"n":"BINANCE:ADAUSD","s":"ok","v":{"lp":0.6123}}]}"#,
        );
        ws.send(Message::Text(quote.into())).await.unwrap();
        drop_rx.await.unwrap();
        drop(ws);

        // Second connection: handshake, then hold until the client closes.
        let mut ws = accept(&listener, &server_origins).await;
        let second = read_handshake(&mut ws).await;
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }

        (first, echoes, second)
    });

    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let config = FeedClientConfig::new(SYMBOL)
        .with_url(format!("ws://{addr}"))
        .with_reconnect(RetryConfig::immediate());
    let client = Arc::new(FeedClient::new(config, tx, cancel.clone()));
    let client_handle = tokio::spawn(Arc::clone(&client).run());

    let first_session = connected_session(next_event(&mut rx).await);

    match next_event(&mut rx).await {
        FeedEvent::Quote(record) => {
            assert_eq!(record.symbol(), SYMBOL);
            assert_eq!(record.price(), Price::Last(Decimal::new(6123, 4)));
        }
        other => panic!("expected Quote, got {other:?}"),
    }
    drop_tx.send(()).unwrap();

    assert!(matches!(next_event(&mut rx).await, FeedEvent::Disconnected));
    assert!(matches!(
        next_event(&mut rx).await,
        FeedEvent::Reconnecting { attempt: 1 }
    ));
    let second_session = connected_session(next_event(&mut rx).await);

    cancel.cancel();
    let result = timeout(STEP_TIMEOUT, client_handle).await.unwrap().unwrap();
    assert!(result.is_ok());

    let (first, echoes, second) = timeout(STEP_TIMEOUT, server).await.unwrap().unwrap();

    assert_handshake(&first, &first_session);
    assert_handshake(&second, &second_session);
    assert_ne!(first_session, second_session);
    assert_eq!(echoes, ["~m~4~m~~h~1", "~m~4~m~~h~2"]);

    for session_id in [&first_session, &second_session] {
        let suffix = session_id.strip_prefix("qs_").unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
    }

    assert_eq!(
        *origins.lock(),
        vec![
            Some("https://data.tradingview.com".to_string()),
            Some("https://data.tradingview.com".to_string()),
        ]
    );
}

#[tokio::test]
async fn gives_up_after_bounded_reconnect_attempts() {
    // Reserve a port, then close it so every connect is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (tx, mut rx) = mpsc::channel(64);
    let config = FeedClientConfig::new(SYMBOL)
        .with_url(format!("ws://{addr}"))
        .with_reconnect(RetryConfig::immediate().with_max_attempts(2));
    let client = Arc::new(FeedClient::new(config, tx, CancellationToken::new()));

    let result = timeout(STEP_TIMEOUT, client.run()).await.unwrap();
    assert!(matches!(
        result,
        Err(FeedClientError::MaxReconnectAttemptsExceeded)
    ));

    let mut disconnects = 0;
    let mut attempts = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            FeedEvent::Disconnected => disconnects += 1,
            FeedEvent::Reconnecting { attempt } => attempts.push(attempt),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(disconnects, 3);
    assert_eq!(attempts, [1, 2]);
}

#[tokio::test]
async fn cancellation_stops_client_while_streaming() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let origins = Arc::new(Mutex::new(Vec::new()));

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener, &origins).await;
        read_handshake(&mut ws).await;
        // Hello frame carries no method and must not disturb the session.
        ws.send(Message::Text(
            FrameCodec::wrap(r#"{"session_id":"<0.1.2>","timestamp":1}"#).into(),
        ))
        .await
        .unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    });

    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let config = FeedClientConfig::new(SYMBOL).with_url(format!("ws://{addr}"));
    let client = Arc::new(FeedClient::new(config, tx, cancel.clone()));
    let client_handle = tokio::spawn(Arc::clone(&client).run());

    connected_session(next_event(&mut rx).await);

    cancel.cancel();
    let result = timeout(STEP_TIMEOUT, client_handle).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(client.state().as_str(), "closed");

    timeout(STEP_TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn reconnects_once_after_fixed_delay() {
    const DELAY: Duration = Duration::from_secs(5);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let origins = Arc::new(Mutex::new(Vec::new()));
    let accepted = Arc::new(AtomicUsize::new(0));
    let (drop_tx, drop_rx) = oneshot::channel::<()>();

    let server_accepted = Arc::clone(&accepted);
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener, &origins).await;
        server_accepted.fetch_add(1, Ordering::SeqCst);
        read_handshake(&mut ws).await;
        drop_rx.await.unwrap();
        drop(ws);

        let mut ws = accept(&listener, &origins).await;
        server_accepted.fetch_add(1, Ordering::SeqCst);
        read_handshake(&mut ws).await;
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    });

    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let config = FeedClientConfig::new(SYMBOL)
        .with_url(format!("ws://{addr}"))
        .with_reconnect(RetryConfig::fixed(DELAY));
    let client = Arc::new(FeedClient::new(config, tx, cancel.clone()));
    let client_handle = tokio::spawn(Arc::clone(&client).run());

    let first_session = connected_session(next_event(&mut rx).await);
    drop_tx.send(()).unwrap();
    assert!(matches!(next_event(&mut rx).await, FeedEvent::Disconnected));

    // The client is now parked in its reconnect delay; drive the clock by hand.
    tokio::time::pause();
    let paused_at = Instant::now();
    assert!(matches!(
        rx.recv().await.unwrap(),
        FeedEvent::Reconnecting { attempt: 1 }
    ));

    tokio::time::advance(DELAY - Duration::from_millis(100)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert!(rx.try_recv().is_err());

    tokio::time::advance(Duration::from_millis(100)).await;
    tokio::time::resume();

    let second_session = connected_session(next_event(&mut rx).await);
    assert!(paused_at.elapsed() >= DELAY - Duration::from_millis(100));
    assert_ne!(first_session, second_session);
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert!(rx.try_recv().is_err());

    cancel.cancel();
    let result = timeout(STEP_TIMEOUT, client_handle).await.unwrap().unwrap();
    assert!(result.is_ok());
    timeout(STEP_TIMEOUT, server).await.unwrap().unwrap();
}
