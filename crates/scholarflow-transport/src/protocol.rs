//! Wire protocol for the research server.

use scholarflow_core::{Document, SessionStatus};
use serde::{Deserialize, Serialize};

/// Message from client to server over the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a new research session.
    Start { query: String },
}

impl ClientMessage {
    #[must_use]
    pub fn start(query: impl Into<String>) -> Self {
        Self::Start {
            query: query.into(),
        }
    }
}

/// Message from server to client over the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session accepted and assigned an id.
    Started {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Incremental progress after a workflow node ran.
    Progress {
        /// Which workflow node produced this update (`planner`,
        /// `researcher`, `writer`, ...).
        #[serde(default)]
        node: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<SessionStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_task_index: Option<usize>,
        #[serde(default)]
        plan: Vec<String>,
        #[serde(default)]
        documents: Vec<Document>,
        #[serde(default)]
        logs: Vec<String>,
    },
    /// The report is ready.
    Completed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default)]
        report: Option<String>,
        #[serde(default)]
        documents: Vec<Document>,
    },
    /// The server gave up.
    Error { message: String },
}

impl ServerMessage {
    /// Whether this message ends the session's stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}

/// Response of `GET /api/session/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub report: Option<String>,
    #[serde(default)]
    pub plan: Vec<String>,
    #[serde(default)]
    pub current_task_index: usize,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub original_query: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SessionSnapshot {
    /// Whether polling should stop after this snapshot.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub api_configured: bool,
}

impl HealthStatus {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
