//! Session synchronization engine for ScholarFlow research sessions.
//!
//! Tracks a long-running server-side research session, preferring the push
//! channel and falling back to polling, persists the latest state so a
//! restart does not lose progress, and keeps a bounded history of
//! completed sessions.
//!
//! Provides:
//! - `SessionController` - the engine instance and its public operations
//! - `reducer` - pure `(state, event) -> (state, effects)` transitions
//! - `EngineConfig` - explicit configuration
//! - `ExportArtifact` - Markdown/PDF exports

pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod reducer;
pub mod state;

pub use config::EngineConfig;
pub use controller::SessionController;
pub use error::EngineError;
pub use export::ExportArtifact;
pub use state::EngineState;
