//! Downloadable artifacts built from a session.

use std::path::{Path, PathBuf};

use bytes::Bytes;

/// An exported file, ready to hand to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Bytes,
}

impl ExportArtifact {
    #[must_use]
    pub fn markdown(session_id: &str, report: &str) -> Self {
        Self {
            file_name: format!("research-{}.md", short_id(session_id)),
            content_type: "text/markdown",
            bytes: Bytes::from(report.to_owned()),
        }
    }

    #[must_use]
    pub fn pdf(session_id: &str, bytes: Bytes) -> Self {
        Self {
            file_name: format!("research-{}.pdf", short_id(session_id)),
            content_type: "application/pdf",
            bytes,
        }
    }

    /// Write the artifact into `dir`, returning the full path.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub async fn write_to(&self, dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        Ok(path)
    }
}

/// First eight characters of a session id.
fn short_id(session_id: &str) -> &str {
    session_id
        .char_indices()
        .nth(8)
        .map_or(session_id, |(i, _)| &session_id[..i])
}
