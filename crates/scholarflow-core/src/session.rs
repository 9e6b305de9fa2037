//! Research session data model.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// Session identifier, assigned by the research server.
pub type SessionId = String;

/// Session status.
///
/// The server owns this vocabulary. Values this client does not know are
/// kept verbatim in [`SessionStatus::Other`] and round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionStatus {
    /// The planner is breaking the query into questions.
    Planning,
    /// Questions are being investigated.
    Researching,
    /// The final report is being written.
    Writing,
    /// The report is available.
    Completed,
    /// The server gave up on the session.
    Error,
    /// Any status string not listed above.
    Other(String),
}

impl SessionStatus {
    /// Whether no further transitions are expected.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Planning => "planning",
            Self::Researching => "researching",
            Self::Writing => "writing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for SessionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "planning" => Self::Planning,
            "researching" => Self::Researching,
            "writing" => Self::Writing,
            "completed" => Self::Completed,
            "error" => Self::Error,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for SessionStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<SessionStatus> for String {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source document discovered while researching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub title: String,
    /// Identifier of the document at its source (an arXiv id in practice).
    #[serde(default, alias = "arxiv_id")]
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    /// Short preview of the abstract, when the server sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// One tracked research task and its accumulated state.
///
/// This is also the persisted "current session" record, so every field
/// needs a serde default: older snapshots may lack newer fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub status: SessionStatus,
    #[serde(default)]
    pub plan: Vec<String>,
    #[serde(default)]
    pub current_task_index: usize,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default)]
    pub original_query: String,
    /// Tail of the server's own log lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    /// Server-side step counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
}

impl Session {
    /// A freshly started session in the planning state.
    #[must_use]
    pub fn new(session_id: impl Into<SessionId>, original_query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Planning,
            plan: Vec::new(),
            current_task_index: 0,
            documents: Vec::new(),
            report: None,
            original_query: original_query.into(),
            logs: Vec::new(),
            step: None,
        }
    }

    /// The report, if one was received and it is not blank.
    #[must_use]
    pub fn report(&self) -> Option<&str> {
        self.report.as_deref().filter(|r| !r.trim().is_empty())
    }

    /// Completed with a non-empty report, i.e. eligible for history.
    #[must_use]
    pub fn is_archivable(&self) -> bool {
        self.status == SessionStatus::Completed && self.report().is_some()
    }

    /// The plan item currently under investigation.
    #[must_use]
    pub fn current_task(&self) -> Option<&str> {
        self.plan.get(self.current_task_index).map(String::as_str)
    }
}

/// A frozen snapshot of a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: SessionId,
    #[serde(default)]
    pub original_query: String,
    pub status: SessionStatus,
    pub report: String,
    #[serde(default)]
    pub documents: Vec<Document>,
    /// Unix epoch milliseconds.
    pub completed_at: i64,
}

impl HistoryEntry {
    /// Freeze a session for history.
    ///
    /// Returns `None` unless the session is completed with a report.
    #[must_use]
    pub fn from_session(session: &Session, completed_at: i64) -> Option<Self> {
        if !session.is_archivable() {
            return None;
        }
        let report = session.report()?.to_owned();
        Some(Self {
            session_id: session.session_id.clone(),
            original_query: session.original_query.clone(),
            status: session.status.clone(),
            report,
            documents: session.documents.clone(),
            completed_at,
        })
    }

    /// Re-inflate into a read-only session for display.
    #[must_use]
    pub fn to_session(&self) -> Session {
        Session {
            session_id: self.session_id.clone(),
            status: self.status.clone(),
            plan: Vec::new(),
            current_task_index: 0,
            documents: self.documents.clone(),
            report: Some(self.report.clone()),
            original_query: self.original_query.clone(),
            logs: Vec::new(),
            step: None,
        }
    }
}

/// Current time as Unix epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
