//! Events delivered from transport adapters to their owner.

use std::fmt;

use tokio::sync::mpsc;

use crate::protocol::{ServerMessage, SessionSnapshot};

/// Identifies one adapter activation.
///
/// The owner bumps the epoch whenever it starts or stops an adapter, and
/// drops events whose epoch is no longer current.
pub type Epoch = u64;

/// Why polling gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollFailure {
    /// The server no longer knows the session (404, 5xx or repeated errors).
    SessionLost { status: Option<u16> },
    /// Repeated network-level failures.
    Unreachable { reason: String },
}

impl fmt::Display for PollFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionLost { status: Some(code) } => {
                write!(f, "Research session was lost (server returned {code})")
            }
            Self::SessionLost { status: None } => f.write_str("Research session was lost"),
            Self::Unreachable { .. } => f.write_str("Cannot reach the research server"),
        }
    }
}

/// Something an adapter observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The push channel finished its handshake.
    StreamOpened,
    /// A well-formed message arrived on the push channel.
    StreamMessage(ServerMessage),
    /// The push channel closed without a terminal message.
    StreamClosed { reason: Option<String> },
    /// A poll succeeded.
    PollSnapshot(SessionSnapshot),
    /// Polling stopped on an unrecoverable failure.
    PollFailed(PollFailure),
}

/// A transport event tagged with the activation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub epoch: Epoch,
    pub event: TransportEvent,
}

/// Sending half handed to an adapter.
#[derive(Debug, Clone)]
pub struct EventSender {
    epoch: Epoch,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSender {
    #[must_use]
    pub const fn new(epoch: Epoch, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { epoch, tx }
    }

    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Deliver an event. Returns `false` if the owner is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Envelope {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}
