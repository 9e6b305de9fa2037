//! Push-channel adapter.
//!
//! Owns one connection for one activation:
//! `Idle -> Connecting -> Open -> Closed`. The adapter never reconnects;
//! an unexpected close is reported and the owner decides what to do next.

use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use futures::{Sink, SinkExt, StreamExt, stream::BoxStream};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    error::TransportError,
    event::{EventSender, TransportEvent},
    protocol::{ClientMessage, ServerMessage},
};

/// Outgoing text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Incoming text frames. The stream ends when the peer closes.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// Trait for establishing a push channel.
#[async_trait]
pub trait PushConnector: Send + Sync {
    /// Open a connection and complete its handshake.
    async fn connect(&self) -> Result<(FrameSink, FrameStream), TransportError>;
}

/// Push channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Handle to a running push-channel activation.
///
/// Dropping the handle closes the channel.
pub struct StreamAdapter {
    state: watch::Receiver<StreamState>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    close_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl StreamAdapter {
    /// Start connecting. Progress is reported through `events`.
    #[must_use]
    pub fn open(connector: Arc<dyn PushConnector>, events: EventSender) -> Self {
        let (state_tx, state) = watch::channel(StreamState::Idle);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        let task = tokio::spawn(run(connector, events, state_tx, outbound_rx, close_rx));

        Self {
            state,
            outbound,
            close_tx: Some(close_tx),
            task,
        }
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Whether the channel has not closed yet.
    ///
    /// Once this is `false`, any close event has already been queued.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() != StreamState::Closed && !self.task.is_finished()
    }

    /// Queue a message for the server.
    ///
    /// Messages queued before the handshake completes are sent once open.
    ///
    /// # Errors
    /// Returns error if the channel has already closed.
    pub fn send(&self, msg: ClientMessage) -> Result<(), TransportError> {
        self.outbound
            .send(msg)
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Close the channel. No close event is reported for an explicit close.
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the connection task to finish.
    pub async fn closed(&mut self) {
        let _ = self.state.wait_for(|s| *s == StreamState::Closed).await;
    }
}

impl Drop for StreamAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run(
    connector: Arc<dyn PushConnector>,
    events: EventSender,
    state: watch::Sender<StreamState>,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    mut close_rx: oneshot::Receiver<()>,
) {
    state.send_replace(StreamState::Connecting);

    let connected = tokio::select! {
        _ = &mut close_rx => {
            state.send_replace(StreamState::Closed);
            return;
        }
        result = connector.connect() => result,
    };

    let (mut sink, mut frames) = match connected {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!("Push channel failed to open: {e}");
            // Queue the event before observers can see `Closed`.
            events.emit(TransportEvent::StreamClosed {
                reason: Some(e.to_string()),
            });
            state.send_replace(StreamState::Closed);
            return;
        }
    };

    state.send_replace(StreamState::Open);
    tracing::debug!("Push channel open");
    events.emit(TransportEvent::StreamOpened);

    let mut finished = false;
    let mut reason = None;

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                let _ = sink.close().await;
                state.send_replace(StreamState::Closed);
                tracing::debug!("Push channel closed by owner");
                return;
            }
            Some(msg) = outbound.recv() => {
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("Failed to serialize message: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(json).await {
                    reason = Some(e.to_string());
                    break;
                }
            }
            frame = frames.next() => match frame {
                Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(msg) => {
                        finished |= msg.is_terminal();
                        events.emit(TransportEvent::StreamMessage(msg));
                    }
                    Err(e) => tracing::warn!("Discarding malformed server message: {e}"),
                },
                Some(Err(e)) => {
                    tracing::warn!("Push channel error: {e}");
                    reason = Some(e.to_string());
                    break;
                }
                None => break,
            },
        }
    }

    if finished {
        tracing::debug!("Push channel closed after terminal message");
    } else {
        tracing::info!("Push channel closed unexpectedly");
        events.emit(TransportEvent::StreamClosed { reason });
    }
    state.send_replace(StreamState::Closed);
}
