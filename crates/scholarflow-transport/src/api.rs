//! Request/response access to the research server.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::ApiError,
    protocol::{HealthStatus, SessionSnapshot},
};

/// Trait for the research server's pull endpoints.
#[async_trait]
pub trait ResearchApi: Send + Sync {
    /// `GET /api/session/{id}`.
    async fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, ApiError>;

    /// `GET /api/session/{id}/pdf`.
    async fn fetch_pdf(&self, session_id: &str) -> Result<Bytes, ApiError>;

    /// `GET /health`.
    async fn health(&self) -> Result<HealthStatus, ApiError>;
}
