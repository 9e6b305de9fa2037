//! Storage that stores nothing.

use scholarflow_core::{KeyValueStore, StoreError};

/// Fallback used when durable storage is disabled or could not be opened.
///
/// Reads always miss and writes always succeed, so the engine runs purely
/// in memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

impl KeyValueStore for NoopStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: String) -> Result<(), StoreError> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
