// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Errors raised while building a syntax tree.

use respec_core::error::RespecError;
use respec_core::patch::Span;
use thiserror::Error;

/// Structural problems with an AST dump or the tree built from it.
///
/// Any of these aborts processing for the one file it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// The dump text is not a well-formed S-expression.
    #[error("malformed AST dump: {message}")]
    Malformed { message: String },

    /// A node range does not fit the source buffer.
    #[error("node range {range} is invalid for source of length {len}")]
    InvalidRange { range: Span, len: usize },

    /// A node was given to two different parents.
    #[error("node {node} already has a parent")]
    AlreadyAdopted { node: u32 },

    /// A child refers to a node that was never built.
    #[error("unknown node id {node}")]
    UnknownNode { node: u32 },

    /// A node other than the root was left without a parent.
    #[error("node {node} is not reachable from the root")]
    Detached { node: u32 },

    /// The external AST producer failed.
    #[error("AST producer failed: {message}")]
    Producer { message: String },
}

impl SyntaxError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        SyntaxError::Malformed {
            message: message.into(),
        }
    }

    /// Create a producer failure.
    pub fn producer(message: impl Into<String>) -> Self {
        SyntaxError::Producer {
            message: message.into(),
        }
    }
}

/// Result type for syntax operations.
pub type SyntaxResult<T> = Result<T, SyntaxError>;

// ============================================================================
// Bridge: SyntaxError -> RespecError
// ============================================================================

impl From<SyntaxError> for RespecError {
    fn from(err: SyntaxError) -> Self {
        match err {
            // The parser could not be started: the configured command is wrong.
            SyntaxError::Producer { message } => RespecError::InvalidArguments { message },
            other => RespecError::InternalError {
                message: other.to_string(),
            },
        }
    }
}
