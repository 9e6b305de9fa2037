//! Core abstractions for research session synchronization.
//!
//! This crate provides the fundamental building blocks:
//! - `Session`, `HistoryEntry`, `Document` - the tracked data model
//! - `ActivityLog` - bounded ring of progress events
//! - `History` - bounded, de-duplicated list of completed sessions
//! - `KeyValueStore` / `PersistentStore` - best-effort durable storage

pub mod activity;
pub mod history;
pub mod session;
pub mod store;

pub use activity::{ActivityAction, ActivityEntry, ActivityLog};
pub use history::History;
pub use session::{Document, HistoryEntry, Session, SessionId, SessionStatus, now_millis};
pub use store::{KeyValueStore, PersistentStore, StoreError};
