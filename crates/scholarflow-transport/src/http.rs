//! HTTP client for the research server.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use crate::{
    api::ResearchApi,
    error::ApiError,
    protocol::{HealthStatus, SessionSnapshot},
};

/// [`ResearchApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base: Url,
}

impl HttpApi {
    /// Create a client for the server at `server_url`
    /// (e.g. `http://localhost:8000`).
    ///
    /// # Errors
    /// Returns error if `server_url` is not an absolute http(s) URL.
    pub fn new(server_url: &str) -> Result<Self, ApiError> {
        Self::with_client(Client::new(), server_url)
    }

    /// Create with a preconfigured `reqwest` client.
    ///
    /// # Errors
    /// Returns error if `server_url` is not an absolute http(s) URL.
    pub fn with_client(client: Client, server_url: &str) -> Result<Self, ApiError> {
        let base = Url::parse(server_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(server_url.to_string()));
        }
        Ok(Self { client, base })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Bytes, ApiError> {
        tracing::debug!(%url, "GET");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        resp.bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let body = self.get(url).await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ResearchApi for HttpApi {
    async fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, ApiError> {
        let url = self.url(&["api", "session", session_id])?;
        self.get_json(url).await
    }

    async fn fetch_pdf(&self, session_id: &str) -> Result<Bytes, ApiError> {
        let url = self.url(&["api", "session", session_id, "pdf"])?;
        self.get(url).await
    }

    async fn health(&self) -> Result<HealthStatus, ApiError> {
        let url = self.url(&["health"])?;
        self.get_json(url).await
    }
}
