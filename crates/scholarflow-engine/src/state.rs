//! State exposed to presentation code.

use scholarflow_core::{ActivityLog, History, Session};

/// Everything a view needs to render the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    /// The session being tracked or replayed.
    pub session: Option<Session>,
    pub activity: ActivityLog,
    pub history: History,
    /// User-visible error message.
    pub error: Option<String>,
    /// A live session is in progress.
    pub loading: bool,
    /// Updates arrive by polling rather than the push channel.
    pub polling: bool,
    /// Query sent on the push channel, awaiting the server's `started`.
    pub pending_query: Option<String>,
}

impl EngineState {
    #[must_use]
    pub fn new(activity_limit: usize, history: History) -> Self {
        Self {
            activity: ActivityLog::new(activity_limit),
            history,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    #[must_use]
    pub fn report(&self) -> Option<&str> {
        self.session.as_ref().and_then(Session::report)
    }
}
