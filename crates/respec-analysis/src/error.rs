//! Error types for dynamic analysis.

use respec_core::error::RespecError;
use thiserror::Error;

/// Errors from registering requests or reading probe output.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The same key was registered twice on a node with different requests.
    #[error("conflicting analysis request '{key}' on {node}")]
    ConflictingRequest { node: String, key: String },

    /// The probe payload could not be decoded.
    #[error("malformed runtime payload: {message}")]
    MalformedPayload { message: String },

    /// IO error while writing the helper or reading the payload.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

impl From<AnalysisError> for RespecError {
    fn from(err: AnalysisError) -> Self {
        RespecError::InternalError {
            message: err.to_string(),
        }
    }
}
