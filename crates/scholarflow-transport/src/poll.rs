//! Pull-loop adapter.
//!
//! Fetches the session status once immediately and then on a fixed
//! interval until it observes a terminal status, gives up after repeated
//! failures, or is stopped. There is no backoff.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use crate::{
    api::ResearchApi,
    error::ApiError,
    event::{EventSender, PollFailure, TransportEvent},
};

/// Default interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of consecutive failures tolerated.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Poll loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_failures: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_failures: DEFAULT_MAX_FAILURES,
        }
    }
}

/// Handle to a running poll loop.
///
/// Stopping only prevents future ticks: a fetch already in flight runs to
/// completion and its result is still emitted under this activation's
/// epoch. Dropping the handle stops the loop.
pub struct PollAdapter {
    session_id: String,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollAdapter {
    /// Start polling `session_id`.
    #[must_use]
    pub fn start(
        api: Arc<dyn ResearchApi>,
        session_id: impl Into<String>,
        settings: PollSettings,
        events: EventSender,
    ) -> Self {
        let session_id = session_id.into();
        let (stop_tx, stop_rx) = watch::channel(false);
        tracing::info!(%session_id, interval = ?settings.interval, "Polling session");

        let task = tokio::spawn(run(api, session_id.clone(), settings, events, stop_rx));

        Self {
            session_id,
            stop_tx,
            task,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !*self.stop_tx.borrow() && !self.task.is_finished()
    }
}

impl Drop for PollAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    api: Arc<dyn ResearchApi>,
    session_id: String,
    settings: PollSettings,
    events: EventSender,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        match api.fetch_session(&session_id).await {
            Ok(snapshot) => {
                failures = 0;
                let terminal = snapshot.is_terminal();
                if !events.emit(TransportEvent::PollSnapshot(snapshot)) || terminal {
                    break;
                }
            }
            Err(ApiError::Decode(e)) => {
                tracing::warn!(%session_id, "Discarding malformed status response: {e}");
            }
            Err(e @ (ApiError::Status(_) | ApiError::InvalidUrl(_))) => {
                failures += 1;
                let status = match &e {
                    ApiError::Status(code) => Some(*code),
                    _ => None,
                };
                if e.is_session_lost() || failures >= settings.max_failures {
                    tracing::error!(%session_id, failures, "Session lost: {e}");
                    events.emit(TransportEvent::PollFailed(PollFailure::SessionLost { status }));
                    break;
                }
                tracing::warn!(%session_id, failures, "Poll failed: {e}");
            }
            Err(ApiError::Network(reason)) => {
                failures += 1;
                if failures >= settings.max_failures {
                    tracing::error!(%session_id, failures, "Server unreachable: {reason}");
                    events.emit(TransportEvent::PollFailed(PollFailure::Unreachable { reason }));
                    break;
                }
                tracing::warn!(%session_id, failures, "Poll failed, retrying: {reason}");
            }
        }
    }

    tracing::debug!(%session_id, "Polling stopped");
}
