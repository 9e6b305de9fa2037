//! WebSocket push channel.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, future};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{
    error::TransportError,
    stream::{FrameSink, FrameStream, PushConnector},
};

/// [`PushConnector`] over a WebSocket (`ws://.../ws/research`).
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushConnector for WebSocketConnector {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), TransportError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(url = %self.url, "WebSocket connected");

        let (sender, receiver) = socket.split();

        let sink: FrameSink = Box::pin(
            sender
                .sink_map_err(|e| TransportError::WebSocket(e.to_string()))
                .with(|text: String| future::ready(Ok::<_, TransportError>(Message::text(text)))),
        );

        let frames: FrameStream = receiver
            .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(data)) => String::from_utf8(data.to_vec()).ok().map(Ok),
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::WebSocket(e.to_string()))),
                })
            })
            .boxed();

        Ok((sink, frames))
    }
}
