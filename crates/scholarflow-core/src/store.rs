//! Durable key/value storage for the current session and history.

use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::session::{HistoryEntry, Session};

/// Key holding the current-session snapshot.
pub const CURRENT_SESSION_KEY: &str = "scholarflow.current_session";
/// Key holding the history list.
pub const HISTORY_KEY: &str = "scholarflow.history";

/// Storage error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage quota exceeded")]
    QuotaExceeded,
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for key/value storage backends.
///
/// Implementations must not block on slow I/O in `set`/`remove`; the engine
/// calls them inline while reducing events.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    /// Returns error if the backend rejects the write.
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    /// Returns error if the backend rejects the delete.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Wait until every write issued so far is durable.
    ///
    /// Backends that write synchronously have nothing to wait for.
    fn flush(&self) -> BoxFuture<'_, ()> {
        future::ready(()).boxed()
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn flush(&self) -> BoxFuture<'_, ()> {
        (**self).flush()
    }
}

/// Typed, best-effort view over a [`KeyValueStore`].
///
/// Every failure is logged and swallowed: reads fall back to "nothing
/// stored" and writes are dropped, so callers keep working in memory.
#[derive(Clone)]
pub struct PersistentStore {
    backend: Arc<dyn KeyValueStore>,
}

impl PersistentStore {
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn load_current(&self) -> Option<Session> {
        self.read(CURRENT_SESSION_KEY)
    }

    pub fn save_current(&self, session: &Session) {
        self.write(CURRENT_SESSION_KEY, session);
    }

    pub fn clear_current(&self) {
        if let Err(e) = self.backend.remove(CURRENT_SESSION_KEY) {
            tracing::warn!("Failed to clear current session: {e}");
        }
    }

    /// Stored history, newest first. Empty if missing or unreadable.
    #[must_use]
    pub fn load_history(&self) -> Vec<HistoryEntry> {
        self.read(HISTORY_KEY).unwrap_or_default()
    }

    pub fn save_history(&self, entries: &[HistoryEntry]) {
        self.write(HISTORY_KEY, &entries);
    }

    /// Wait until every write issued so far has reached the backend.
    pub async fn flush(&self) {
        self.backend.flush().await;
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Failed to read {key}: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding unreadable {key}: {e}");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(StoreError::from)
            .and_then(|json| self.backend.set(key, json));
        if let Err(e) = result {
            tracing::warn!("Failed to persist {key}: {e}");
        }
    }
}
