//! Transport layer for research session sync.
//!
//! Provides:
//! - Wire protocol (JSON)
//! - Push-channel adapter over any `PushConnector`
//! - WebSocket connector (feature: websocket)
//! - Poll adapter over any `ResearchApi`
//! - HTTP research API client (feature: http)

pub mod api;
pub mod error;
pub mod event;
pub mod poll;
pub mod protocol;
pub mod stream;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "http")]
pub mod http;

pub use api::ResearchApi;
pub use error::{ApiError, TransportError};
pub use event::{Envelope, Epoch, EventSender, PollFailure, TransportEvent};
pub use poll::{PollAdapter, PollSettings};
pub use protocol::{ClientMessage, HealthStatus, ServerMessage, SessionSnapshot};
pub use stream::{FrameSink, FrameStream, PushConnector, StreamAdapter, StreamState};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;

#[cfg(feature = "http")]
pub use http::HttpApi;
