//! Error types and error code constants for respec.
//!
//! This module provides a unified error type (`RespecError`) that bridges
//! domain-specific errors from the subsystems (syntax, analysis, sandbox,
//! configuration) into a common format suitable for JSON output.
//!
//! ## Error Code Mapping
//!
//! Exit codes:
//! - `2`: Invalid arguments (bad input from caller, bad configuration)
//! - `3`: Resolution errors (file not found, file not parsable)
//! - `4`: Apply errors (failed to write converted files)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! Soft outcomes (a rule that cannot convert in its context, an edit that
//! overlaps another, runtime analysis that could not run) are never errors;
//! they travel as notices in the conversion report.

use std::fmt;

use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output.
///
/// These codes map to CLI exit codes and appear in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad input, malformed configuration).
    InvalidArguments = 2,
    /// Resolution errors (file not found, unparsable source).
    ResolutionError = 3,
    /// Apply errors (failed to write changes, file changed underneath us).
    ApplyError = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum RespecError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {message}")]
    ConfigError { message: String },

    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// A file could not be turned into a syntax tree.
    #[error("failed to parse {file}: {message}")]
    ParseFailed { file: String, message: String },

    /// Failed to apply changes.
    #[error("apply error: {message}")]
    ApplyError {
        message: String,
        file: Option<String>,
    },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&RespecError> for OutputErrorCode {
    fn from(err: &RespecError) -> Self {
        match err {
            RespecError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            RespecError::ConfigError { .. } => OutputErrorCode::InvalidArguments,
            RespecError::FileNotFound { .. } => OutputErrorCode::ResolutionError,
            RespecError::ParseFailed { .. } => OutputErrorCode::ResolutionError,
            RespecError::ApplyError { .. } => OutputErrorCode::ApplyError,
            RespecError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<RespecError> for OutputErrorCode {
    fn from(err: RespecError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl RespecError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        RespecError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        RespecError::FileNotFound { path: path.into() }
    }

    /// Create a parse failure for one file.
    pub fn parse_failed(file: impl Into<String>, message: impl Into<String>) -> Self {
        RespecError::ParseFailed {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        RespecError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod error_code_mapping {
        use super::*;

        #[test]
        fn invalid_arguments_maps_to_invalid_arguments() {
            let err = RespecError::invalid_args("unknown rule 'foo'");
            assert_eq!(err.error_code(), OutputErrorCode::InvalidArguments);
            assert_eq!(err.error_code().code(), 2);
        }

        #[test]
        fn config_error_maps_to_invalid_arguments() {
            let err = RespecError::ConfigError {
                message: "bad toml".to_string(),
            };
            assert_eq!(err.error_code(), OutputErrorCode::InvalidArguments);
        }

        #[test]
        fn parse_failure_maps_to_resolution_error() {
            let err = RespecError::parse_failed("spec/a_spec.rb", "unexpected ')'");
            assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
            assert_eq!(err.error_code().code(), 3);
        }

        #[test]
        fn apply_error_maps_to_apply_error() {
            let err = RespecError::ApplyError {
                message: "file changed on disk".to_string(),
                file: Some("spec/a_spec.rb".to_string()),
            };
            assert_eq!(OutputErrorCode::from(&err), OutputErrorCode::ApplyError);
            assert_eq!(err.error_code().code(), 4);
        }

        #[test]
        fn internal_error_maps_to_internal_error() {
            let err = RespecError::internal("unexpected state");
            assert_eq!(OutputErrorCode::from(err), OutputErrorCode::InternalError);
        }
    }

    mod error_display {
        use super::*;

        #[test]
        fn parse_failed_display() {
            let err = RespecError::parse_failed("a_spec.rb", "bad dump");
            assert_eq!(err.to_string(), "failed to parse a_spec.rb: bad dump");
        }

        #[test]
        fn file_not_found_display() {
            let err = RespecError::file_not_found("missing_spec.rb");
            assert_eq!(err.to_string(), "file not found: missing_spec.rb");
        }

        #[test]
        fn code_display_shows_number() {
            assert_eq!(format!("{}", OutputErrorCode::ResolutionError), "3");
            assert_eq!(format!("{}", OutputErrorCode::InternalError), "10");
        }
    }
}
