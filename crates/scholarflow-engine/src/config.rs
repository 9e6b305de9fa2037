//! Engine configuration.

use std::time::Duration;

use scholarflow_core::{activity::DEFAULT_ACTIVITY_LIMIT, history::DEFAULT_HISTORY_LIMIT};
use scholarflow_transport::{
    PollSettings,
    poll::{DEFAULT_MAX_FAILURES, DEFAULT_POLL_INTERVAL},
};
use serde::{Deserialize, Serialize};

/// Explicit engine configuration. Nothing is read from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Push channel URL.
    pub stream_url: String,
    /// Research server origin for the pull and export endpoints.
    pub server_url: String,
    /// Seconds between polls.
    pub poll_interval_secs: u64,
    /// Consecutive poll failures before giving up.
    pub max_poll_failures: u32,
    pub history_limit: usize,
    pub activity_limit: usize,
    /// Characters of the current question shown in researcher activity.
    pub preview_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_url: "ws://localhost:8000/ws/research".to_string(),
            server_url: "http://localhost:8000".to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            max_poll_failures: DEFAULT_MAX_FAILURES,
            history_limit: DEFAULT_HISTORY_LIMIT,
            activity_limit: DEFAULT_ACTIVITY_LIMIT,
            preview_len: 60,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = url.into();
        self
    }

    #[must_use]
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_secs = interval.as_secs();
        self
    }

    #[must_use]
    pub const fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        // A zero interval would spin; tokio rejects it outright.
        Duration::from_secs(if self.poll_interval_secs == 0 {
            1
        } else {
            self.poll_interval_secs
        })
    }

    #[must_use]
    pub const fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval(),
            max_failures: self.max_poll_failures,
        }
    }
}
