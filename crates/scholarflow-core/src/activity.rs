//! Bounded, time-ordered log of human-readable progress events.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default number of retained entries.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 21;

/// What kind of progress an activity entry reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Started,
    Planning,
    Researching,
    Writing,
    Completed,
    Polling,
    Restoring,
    LoadedFromHistory,
    Error,
}

/// A single activity log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub action: ActivityAction,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl ActivityEntry {
    #[must_use]
    pub fn new(action: ActivityAction, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            action,
            message: message.into(),
            detail: None,
            timestamp,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Ring buffer of activity entries.
///
/// Eviction is strictly by count: once `limit` entries are held, every
/// push drops the oldest one first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    limit: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_LIMIT)
    }
}

impl ActivityLog {
    /// Create an empty log holding at most `limit` entries.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Append an entry, evicting the oldest past the limit.
    pub fn push(&mut self, entry: ActivityEntry) {
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Drop everything and start over with a single entry.
    pub fn reset_to(&mut self, entry: ActivityEntry) {
        self.entries.clear();
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Oldest entry first.
    pub fn iter(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn first(&self) -> Option<&ActivityEntry> {
        self.entries.front()
    }

    #[must_use]
    pub fn last(&self) -> Option<&ActivityEntry> {
        self.entries.back()
    }

    /// Snapshot of the entries, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ActivityEntry> {
        self.entries.iter().cloned().collect()
    }
}
