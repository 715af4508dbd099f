//! Quote Session Client
//!
//! Connects to the quote socket, opens a quote session for one symbol, and
//! streams last-price updates as [`FeedEvent`]s.
//!
//! # Stream URL
//!
//! - Default: `wss://data.tradingview.com/socket.io/websocket`
//!
//! The server refuses upgrades without an `Origin` header, so the client
//! always sends the configured origin.
//!
//! # Session Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Handshaking -> Streaming -> Closed | Failed
//!       ^                                                        |
//!       +-------------------- reconnect delay -------------------+
//! ```
//!
//! Each connection creates a fresh `qs_` session and replays the full
//! handshake. Heartbeats are echoed verbatim; the peer closes the socket when
//! they go unanswered.

use std::sync::Arc;

use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::RwLock;
use rand::Rng;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::codec::{Frame, FrameCodec, FrameError};
use crate::domain::quote::{self, LAST_PRICE_FIELD, QuoteRecord};
use crate::infrastructure::metrics;
use crate::infrastructure::retry::{RetryConfig, RetryPolicy};

/// Default quote socket endpoint.
pub const DEFAULT_FEED_URL: &str = "wss://data.tradingview.com/socket.io/websocket";

/// Default `Origin` header.
pub const DEFAULT_FEED_ORIGIN: &str = "https://data.tradingview.com";

/// Quote update method.
pub const METHOD_QUOTE_DATA: &str = "qsd";
/// Opens a quote session.
pub const METHOD_CREATE_SESSION: &str = "quote_create_session";
/// Selects the fields streamed by a session.
pub const METHOD_SET_FIELDS: &str = "quote_set_fields";
/// Subscribes a session to a symbol.
pub const METHOD_ADD_SYMBOLS: &str = "quote_add_symbols";

const SESSION_PREFIX: &str = "qs_";
const SESSION_SUFFIX_LEN: usize = 12;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The endpoint or origin could not form an upgrade request.
    #[error("invalid feed request: {0}")]
    InvalidRequest(String),

    /// A handshake frame could not be encoded.
    #[error("handshake failed: {0}")]
    Handshake(#[from] FrameError),

    /// Connection closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Events and State
// =============================================================================

/// Events emitted by the feed client.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Handshake sent; the session is streaming.
    Connected {
        /// Quote session identifier.
        session_id: String,
    },
    /// Disconnected from server.
    Disconnected,
    /// Reconnecting to server.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Extracted last-price observation.
    Quote(QuoteRecord),
    /// Non-fatal protocol error.
    Error(String),
}

impl FeedEvent {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Quote(_) => "quote",
            Self::Error(_) => "error",
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected.
    Disconnected,
    /// Opening the WebSocket.
    Connecting,
    /// Sending session setup frames.
    Handshaking,
    /// Receiving quote updates.
    Streaming,
    /// Stopped by cancellation.
    Closed,
    /// Connection lost or refused.
    Failed,
}

impl SessionState {
    /// Label used in logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// `Origin` header value.
    pub origin: String,
    /// Subscribed symbol, e.g. `BINANCE:ADAUSD`.
    pub symbol: String,
    /// Reconnection schedule.
    pub reconnect: RetryConfig,
}

impl FeedClientConfig {
    /// Configuration for the default endpoint.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            origin: DEFAULT_FEED_ORIGIN.to_string(),
            symbol: symbol.into(),
            reconnect: RetryConfig::default(),
        }
    }

    /// Override the endpoint.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Override the reconnection schedule.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: RetryConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Generate a quote session identifier: `qs_` followed by 12 lowercase letters.
#[must_use]
pub fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SESSION_SUFFIX_LEN)
        .map(|_| char::from(rng.random_range(b'a'..=b'z')))
        .collect();
    format!("{SESSION_PREFIX}{suffix}")
}

// =============================================================================
// Feed Client
// =============================================================================

/// WebSocket client for the quote feed.
///
/// Manages the connection lifecycle including:
/// - Session handshake
/// - Heartbeat echo
/// - Fixed-delay reconnection
pub struct FeedClient {
    config: FeedClientConfig,
    codec: FrameCodec,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
    state: RwLock<SessionState>,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: FrameCodec::new(),
            event_tx,
            cancel,
            state: RwLock::new(SessionState::Disconnected),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            tracing::debug!(from = previous.as_str(), to = state.as_str(), "Feed state changed");
        }
    }

    /// Run the connection loop until cancelled.
    ///
    /// Every connection failure is followed by a reconnect after the policy
    /// delay; the policy resets once a handshake completes.
    ///
    /// # Errors
    ///
    /// Returns `FeedClientError::MaxReconnectAttemptsExceeded` once a bounded
    /// policy runs out of attempts.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedClientError> {
        let mut reconnect_policy = RetryPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Feed client cancelled");
                self.set_state(SessionState::Closed);
                return Ok(());
            }

            match self.connect_and_run(&mut reconnect_policy).await {
                Ok(()) => {
                    tracing::info!("Feed client stopped");
                    self.set_state(SessionState::Closed);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, symbol = %self.config.symbol, "Feed connection error");
                    self.set_state(SessionState::Failed);
                    metrics::set_feed_connected(false);

                    let _ = self.event_tx.send(FeedEvent::Disconnected).await;

                    let Some(delay) = reconnect_policy.next_delay() else {
                        self.set_state(SessionState::Disconnected);
                        return Err(FeedClientError::MaxReconnectAttemptsExceeded);
                    };

                    let attempt = reconnect_policy.attempt_count();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to quote feed"
                    );
                    metrics::record_reconnect();
                    self.set_state(SessionState::Disconnected);

                    let _ = self.event_tx.send(FeedEvent::Reconnecting { attempt }).await;

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("Feed client cancelled during reconnect delay");
                            self.set_state(SessionState::Closed);
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Connect, handshake, and stream until error or cancellation.
    async fn connect_and_run(&self, policy: &mut RetryPolicy) -> Result<(), FeedClientError> {
        self.set_state(SessionState::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to quote feed");

        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| FeedClientError::InvalidRequest(e.to_string()))?;
        let origin = HeaderValue::from_str(&self.config.origin)
            .map_err(|e| FeedClientError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(ORIGIN, origin);

        let connect = tokio_tungstenite::connect_async(request);
        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = connect => result?,
        };

        let (mut write, mut read) = ws_stream.split();

        self.set_state(SessionState::Handshaking);
        let session_id = generate_session_id();
        self.send_handshake(&mut write, &session_id).await?;

        policy.reset();
        self.set_state(SessionState::Streaming);
        metrics::set_feed_connected(true);
        tracing::info!(session_id = %session_id, symbol = %self.config.symbol, "Quote session streaming");
        let _ = self
            .event_tx
            .send(FeedEvent::Connected {
                session_id: session_id.clone(),
            })
            .await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.close().await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text, &mut write).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Server sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Open a quote session and subscribe to the configured symbol.
    async fn send_handshake<W>(&self, write: &mut W, session_id: &str) -> Result<(), FeedClientError>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let frames = [
            (METHOD_CREATE_SESSION, vec![json!(session_id)]),
            (METHOD_SET_FIELDS, vec![json!(session_id), json!(LAST_PRICE_FIELD)]),
            (
                METHOD_ADD_SYMBOLS,
                vec![json!(session_id), json!(self.config.symbol)],
            ),
        ];

        for (method, params) in frames {
            let frame = self.codec.encode(method, &params)?;
            tracing::debug!(method, "Sending handshake frame");
            write.send(Message::Text(frame.into())).await?;
        }

        Ok(())
    }

    /// Handle one text message, which may carry several frames.
    async fn handle_text_message<W>(&self, text: &str, write: &mut W) -> Result<(), FeedClientError>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        for segment in self.codec.split(text) {
            let segment = match segment {
                Ok(segment) => segment,
                Err(e) => {
                    self.report_frame_error(&e, text);
                    break;
                }
            };

            match self.codec.decode(segment) {
                Ok(Frame::Heartbeat) => {
                    metrics::record_frame_received("heartbeat");
                    write.send(Message::Text(segment.to_string().into())).await?;
                    metrics::record_heartbeat_echoed();
                    tracing::trace!(heartbeat = segment, "Heartbeat echoed");
                }
                Ok(Frame::Data { method, params }) => {
                    metrics::record_frame_received("data");
                    self.handle_data_frame(&method, &params);
                }
                Err(FrameError::MissingMethod) => {
                    tracing::debug!(payload = segment, "Ignoring frame without method");
                }
                Err(e) => self.report_frame_error(&e, segment),
            }
        }

        Ok(())
    }

    fn handle_data_frame(&self, method: &str, params: &[Value]) {
        if method != METHOD_QUOTE_DATA {
            tracing::trace!(method, "Ignoring unhandled method");
            return;
        }

        let Some(value) = params.get(1).and_then(|update| update.get("v")) else {
            tracing::debug!(params = ?params, "Quote update without value object");
            return;
        };

        match quote::extract(&self.config.symbol, value) {
            Ok(record) => {
                tracing::debug!(price = %record.price(), "Quote extracted");
                self.emit(FeedEvent::Quote(record));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Quote extraction failed");
                self.emit(FeedEvent::Error(e.to_string()));
            }
        }
    }

    fn report_frame_error(&self, error: &FrameError, raw: &str) {
        metrics::record_frame_error(frame_error_kind(error));
        tracing::warn!(error = %error, raw, "Dropping undecodable frame");
        self.emit(FeedEvent::Error(error.to_string()));
    }

    /// Hand a streaming event to the receiver without waiting. A full channel
    /// drops the event so the read loop keeps echoing heartbeats.
    fn emit(&self, event: FeedEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let kind = event.kind();
                metrics::record_event_dropped(kind);
                tracing::warn!(kind, "Feed event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Feed event receiver closed");
            }
        }
    }
}

const fn frame_error_kind(error: &FrameError) -> &'static str {
    match error {
        FrameError::UnknownPrefix(_) => "unknown_prefix",
        FrameError::InvalidLength(_) => "invalid_length",
        FrameError::Incomplete { .. } => "incomplete",
        FrameError::Malformed(_) => "malformed",
        FrameError::MissingMethod => "missing_method",
        FrameError::Encode(_) => "encode",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::Price;
    use futures_util::sink;
    use rust_decimal::Decimal;

    fn client(capacity: usize) -> (FeedClient, mpsc::Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let client = FeedClient::new(
            FeedClientConfig::new("BINANCE:ADAUSD"),
            tx,
            CancellationToken::new(),
        );
        (client, rx)
    }

    fn collecting_sink() -> (
        impl Sink<Message, Error = tungstenite::Error> + Unpin,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = sink::unfold(tx, |tx, msg: Message| async move {
            let _ = tx.send(msg);
            Ok::<_, tungstenite::Error>(tx)
        });
        (Box::pin(sink), rx)
    }

    fn text(message: Message) -> String {
        message.into_text().unwrap().to_string()
    }

    #[test]
    fn session_id_format() {
        let id = generate_session_id();

        assert!(id.starts_with("qs_"));
        assert_eq!(id.len(), 15);
        assert!(id[3..].chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn session_ids_differ() {
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn default_config() {
        let config = FeedClientConfig::new("BINANCE:ADAUSD");

        assert_eq!(config.url, DEFAULT_FEED_URL);
        assert_eq!(config.origin, DEFAULT_FEED_ORIGIN);
        assert_eq!(config.reconnect, RetryConfig::default());
    }

    #[test]
    fn new_client_is_disconnected() {
        let (client, _rx) = client(1);
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn handshake_order() {
        let (client, _rx) = client(1);
        let (mut sink, mut sent) = collecting_sink();

        client.send_handshake(&mut sink, "qs_abcdefghijkl").await.unwrap();

        let texts: Vec<String> = std::iter::from_fn(|| sent.try_recv().ok())
            .map(text)
            .collect();
        assert_eq!(
            texts,
            vec![
                FrameCodec::wrap(r#"{"m":"quote_create_session","p":["qs_abcdefghijkl"]}"#),
                FrameCodec::wrap(r#"{"m":"quote_set_fields","p":["qs_abcdefghijkl","lp"]}"#),
                FrameCodec::wrap(
                    r#"{"m":"quote_add_symbols","p":["qs_abcdefghijkl","BINANCE:ADAUSD"]}"#
                ),
            ]
        );
    }

    #[tokio::test]
    async fn echoes_each_heartbeat_verbatim() {
        let (client, _rx) = client(4);
        let (mut sink, mut sent) = collecting_sink();

        client
            .handle_text_message("~m~4~m~~h~1~m~4~m~~h~2", &mut sink)
            .await
            .unwrap();

        assert_eq!(text(sent.try_recv().unwrap()), "~m~4~m~~h~1");
        assert_eq!(text(sent.try_recv().unwrap()), "~m~4~m~~h~2");
        assert!(sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn quote_update_emits_record() {
        let (client, mut rx) = client(4);
        let (mut sink, mut sent) = collecting_sink();
        let raw = FrameCodec::wrap(
            r#"{"m":"qsd","p":["qs_x",{"n":"BINANCE:ADAUSD","s":"ok","v":{"lp":0.6123}}]}"#,
        );

        client.handle_text_message(&raw, &mut sink).await.unwrap();

        match rx.try_recv().unwrap() {
            FeedEvent::Quote(record) => {
                assert_eq!(record.symbol(), "BINANCE:ADAUSD");
                assert_eq!(record.price(), Price::Last(Decimal::new(6123, 4)));
            }
            other => panic!("expected quote, got {other:?}"),
        }
        assert!(sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn other_methods_are_ignored() {
        let (client, mut rx) = client(4);
        let (mut sink, _sent) = collecting_sink();
        let raw = FrameCodec::wrap(r#"{"m":"quote_completed","p":["qs_x","BINANCE:ADAUSD"]}"#);

        client.handle_text_message(&raw, &mut sink).await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_frame_is_reported_and_survived() {
        let (client, mut rx) = client(4);
        let (mut sink, mut sent) = collecting_sink();
        let raw = format!("~m~9~m~not json!{}", "~m~4~m~~h~3");

        client.handle_text_message(&raw, &mut sink).await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), FeedEvent::Error(_)));
        assert_eq!(text(sent.try_recv().unwrap()), "~m~4~m~~h~3");
    }

    #[tokio::test]
    async fn session_hello_is_not_an_error() {
        let (client, mut rx) = client(4);
        let (mut sink, _sent) = collecting_sink();
        let raw = FrameCodec::wrap(r#"{"session_id":"<0.1.2>","timestamp":1744126673}"#);

        client.handle_text_message(&raw, &mut sink).await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_event_channel_does_not_block_heartbeat_echo() {
        let (client, mut rx) = client(1);
        let (mut sink, mut sent) = collecting_sink();
        let quote = FrameCodec::wrap(
            r#"{"m":"qsd","p":["qs_x",{"n":"BINANCE:ADAUSD","s":"ok","v":{"lp":0.6123}}]}"#,
        );
        let raw = format!("{quote}{quote}~m~4~m~~h~1");

        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            client.handle_text_message(&raw, &mut sink),
        )
        .await
        .expect("message handling blocked on a full channel")
        .unwrap();

        assert_eq!(text(sent.try_recv().unwrap()), "~m~4~m~~h~1");
        assert!(matches!(rx.try_recv().unwrap(), FeedEvent::Quote(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn event_kinds() {
        assert_eq!(FeedEvent::Disconnected.kind(), "disconnected");
        assert_eq!(FeedEvent::Error("x".to_string()).kind(), "error");
        assert_eq!(FeedEvent::Reconnecting { attempt: 1 }.kind(), "reconnecting");
    }
}
