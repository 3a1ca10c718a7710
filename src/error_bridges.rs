//! Error bridge implementations.
//!
//! `impl From<X> for RespecError` for the error types defined in this crate.
//! Member crates bridge their own errors next to their definitions.

use respec_core::error::RespecError;

use crate::config::ConfigError;
use crate::rules::UnknownRule;

// ============================================================================
// Bridge: ConfigError -> RespecError
// ============================================================================

impl From<ConfigError> for RespecError {
    fn from(err: ConfigError) -> Self {
        RespecError::ConfigError {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Bridge: UnknownRule -> RespecError
// ============================================================================

impl From<UnknownRule> for RespecError {
    fn from(err: UnknownRule) -> Self {
        RespecError::InvalidArguments {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
