//! Quote Feed Adapters
//!
//! WebSocket client for the upstream quote socket.
//!
//! # Architecture
//!
//! - [`codec`]: length-prefixed frame encoding and decoding
//! - [`session`]: connection lifecycle, handshake, heartbeat echo

pub mod codec;
pub mod session;

pub use codec::{Frame, FrameCodec, FrameError};
pub use session::{
    FeedClient, FeedClientConfig, FeedClientError, FeedEvent, SessionState, generate_session_id,
};
