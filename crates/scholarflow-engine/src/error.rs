//! Engine errors.

use scholarflow_transport::ApiError;

/// Engine error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("PDF export failed: {0}")]
    Export(#[source] ApiError),
    #[error("Research server error: {0}")]
    Api(#[from] ApiError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
