//! Bounded list of completed sessions, newest first.

use std::collections::VecDeque;

use crate::session::HistoryEntry;

/// Default number of retained history entries.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Most-recent-first list of completed sessions, unique by session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit),
            limit: limit.max(1),
        }
    }

    /// Rebuild from a persisted list, assumed newest first.
    ///
    /// Duplicates keep their first (newest) occurrence, and the list is cut
    /// to the limit.
    #[must_use]
    pub fn from_entries(entries: Vec<HistoryEntry>, limit: usize) -> Self {
        let mut history = Self::new(limit);
        for entry in entries {
            if history.contains(&entry.session_id) {
                continue;
            }
            if history.entries.len() == history.limit {
                break;
            }
            history.entries.push_back(entry);
        }
        history
    }

    /// Insert at the front, evicting the oldest past the limit.
    ///
    /// Returns `false` (and changes nothing) if the session is already
    /// present.
    pub fn insert(&mut self, entry: HistoryEntry) -> bool {
        if self.contains(&entry.session_id) {
            return false;
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.limit);
        true
    }

    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.iter().any(|e| e.session_id == session_id)
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.session_id == session_id)
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

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}
