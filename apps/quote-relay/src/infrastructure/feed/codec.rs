//! Frame Codec
//!
//! Encoding and decoding for the quote socket's length-prefixed text framing.
//!
//! # Wire Format
//!
//! Every frame is its payload preceded by the payload's byte length:
//!
//! ```text
//! ~m~52~m~{"m":"quote_create_session","p":["qs_abcdefghijkl"]}
//! ```
//!
//! Payloads beginning with `~h~` are heartbeats and must be echoed back.
//! Other payloads carry a JSON object `{"m": method, "p": [params...]}`.
//! A single WebSocket message may hold several frames back to back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Delimiter around the length header.
pub const FRAME_MARKER: &str = "~m~";

/// Prefix of heartbeat payloads.
pub const HEARTBEAT_MARKER: &str = "~h~";

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Keepalive that the peer expects to be echoed.
    Heartbeat,
    /// Method call carrying positional parameters.
    Data {
        /// Method name, e.g. `qsd`.
        method: String,
        /// Positional parameters.
        params: Vec<Value>,
    },
}

/// Codec errors. All of them drop the frame, never the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Input begins with neither frame nor heartbeat marker.
    #[error("unknown frame prefix: {0:?}")]
    UnknownPrefix(String),

    /// The length header is missing or not a number.
    #[error("invalid frame length header: {0:?}")]
    InvalidLength(String),

    /// Fewer payload bytes than the header announced.
    #[error("incomplete frame: expected {expected} bytes, got {available}")]
    Incomplete {
        /// Bytes announced by the header.
        expected: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// The payload holds no parseable JSON object.
    #[error("malformed frame payload: {0}")]
    Malformed(String),

    /// The payload object has no method (e.g. the session hello).
    #[error("frame payload has no method")]
    MissingMethod,

    /// Encoding the payload failed.
    #[error("frame encode error: {0}")]
    Encode(String),
}

#[derive(Serialize)]
struct OutboundPayload<'a> {
    m: &'a str,
    p: &'a [Value],
}

#[derive(Deserialize)]
struct InboundPayload {
    m: Option<String>,
    #[serde(default)]
    p: Vec<Value>,
}

/// Codec for the length-prefixed quote socket protocol.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new frame codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a method call as a compact, length-prefixed frame.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::Encode` if the parameters cannot be serialized.
    pub fn encode(&self, method: &str, params: &[Value]) -> Result<String, FrameError> {
        let payload = serde_json::to_string(&OutboundPayload {
            m: method,
            p: params,
        })
        .map_err(|e| FrameError::Encode(e.to_string()))?;

        Ok(Self::wrap(&payload))
    }

    /// Prefix a payload with its byte length.
    #[must_use]
    pub fn wrap(payload: &str) -> String {
        format!("{FRAME_MARKER}{}{FRAME_MARKER}{payload}", payload.len())
    }

    /// Iterate over the frames of one WebSocket message.
    #[must_use]
    pub const fn split<'a>(&self, raw: &'a str) -> FrameSplit<'a> {
        FrameSplit { remaining: raw }
    }

    /// Decode a single frame.
    ///
    /// # Errors
    ///
    /// Returns `FrameError` if the frame is truncated, has an unknown prefix,
    /// or its payload is not a JSON object with a method.
    pub fn decode(&self, raw: &str) -> Result<Frame, FrameError> {
        if raw.starts_with(HEARTBEAT_MARKER) {
            return Ok(Frame::Heartbeat);
        }

        if !raw.starts_with(FRAME_MARKER) {
            return Err(FrameError::UnknownPrefix(
                raw.chars().take(16).collect(),
            ));
        }

        let (header_len, payload_len) = parse_header(raw)?;
        let payload = raw
            .get(header_len..header_len + payload_len)
            .ok_or_else(|| incomplete_or_invalid(raw, header_len, payload_len))?;

        if payload.starts_with(HEARTBEAT_MARKER) {
            return Ok(Frame::Heartbeat);
        }

        decode_payload(payload)
    }
}

fn decode_payload(payload: &str) -> Result<Frame, FrameError> {
    let object = find_json_object(payload)
        .ok_or_else(|| FrameError::Malformed("no JSON object in payload".to_string()))?;

    let inbound: InboundPayload =
        serde_json::from_str(object).map_err(|e| FrameError::Malformed(e.to_string()))?;

    let method = inbound.m.ok_or(FrameError::MissingMethod)?;
    Ok(Frame::Data {
        method,
        params: inbound.p,
    })
}

/// Returns `(header length, payload length)` for a `~m~<n>~m~` header.
fn parse_header(raw: &str) -> Result<(usize, usize), FrameError> {
    let after_marker = &raw[FRAME_MARKER.len()..];
    let digits_end = after_marker
        .find(FRAME_MARKER)
        .ok_or_else(|| FrameError::InvalidLength(raw.chars().take(16).collect()))?;
    let digits = &after_marker[..digits_end];

    let payload_len = digits
        .parse::<usize>()
        .map_err(|_| FrameError::InvalidLength(digits.to_string()))?;

    Ok((FRAME_MARKER.len() * 2 + digits_end, payload_len))
}

fn incomplete_or_invalid(raw: &str, header_len: usize, payload_len: usize) -> FrameError {
    let available = raw.len() - header_len;
    if available < payload_len {
        FrameError::Incomplete {
            expected: payload_len,
            available,
        }
    } else {
        FrameError::InvalidLength(format!("{payload_len} splits a character"))
    }
}

/// Locate the first complete JSON object by brace matching.
///
/// Braces inside string literals (including escaped quotes) are ignored, so
/// nested objects and bracket-bearing strings are handled.
pub fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Iterator over the frames packed into one message.
///
/// Stops after the first framing error, since the remaining bytes cannot be
/// delimited reliably.
#[derive(Debug)]
pub struct FrameSplit<'a> {
    remaining: &'a str,
}

impl<'a> Iterator for FrameSplit<'a> {
    type Item = Result<&'a str, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        let raw = std::mem::take(&mut self.remaining);
        if !raw.starts_with(FRAME_MARKER) {
            return Some(Ok(raw));
        }

        let (header_len, payload_len) = match parse_header(raw) {
            Ok(lengths) => lengths,
            Err(e) => return Some(Err(e)),
        };

        let end = header_len + payload_len;
        if end > raw.len() || !raw.is_char_boundary(end) {
            return Some(Err(incomplete_or_invalid(raw, header_len, payload_len)));
        }

        self.remaining = &raw[end..];
        Some(Ok(&raw[..end]))
    }
}
