//! JSON output types and serialization for CLI responses.
//!
//! ## Design Principles
//!
//! 1. **Status first:** Every response has `status` as first field
//! 2. **Deterministic:** Same input -> same output (field order, array ordering)
//! 3. **Versioned:** Schema version in response enables forward compatibility

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{OutputErrorCode, RespecError};

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Error Response
// ============================================================================

/// Error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
    /// File the error relates to, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ErrorInfo {
    /// Create from a RespecError.
    pub fn from_error(err: &RespecError) -> Self {
        let file = match err {
            RespecError::FileNotFound { path } => Some(path.clone()),
            RespecError::ParseFailed { file, .. } => Some(file.clone()),
            RespecError::ApplyError { file, .. } => file.clone(),
            _ => None,
        };
        ErrorInfo {
            code: OutputErrorCode::from(err).code(),
            message: err.to_string(),
            file,
        }
    }
}

/// Top-level error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `"error"`.
    pub status: String,
    /// Schema version.
    pub schema_version: String,
    /// Error details.
    pub error: ErrorInfo,
}

impl ErrorResponse {
    /// Build an error response for `err`.
    pub fn new(err: &RespecError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Convert Response
// ============================================================================

/// One conversion that was applied to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionInfo {
    /// Rule that produced the conversion (e.g. `"should"`).
    pub rule: String,
    /// Where the converted expression starts.
    pub line: u32,
    /// Column of the converted expression.
    pub col: u32,
}

/// Something the user should know about a file that did not stop processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeInfo {
    /// Notice category: `context_unavailable` or `edit_conflict`.
    pub kind: String,
    /// Rule the notice belongs to.
    pub rule: String,
    /// Human-readable message.
    pub message: String,
    /// Line of the affected expression.
    pub line: u32,
    /// Column of the affected expression.
    pub col: u32,
}

/// Outcome for a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    /// Path relative to the project root.
    pub path: String,
    /// `"converted"`, `"unchanged"`, or `"parse_error"`.
    pub status: String,
    /// Whether the file content changed.
    pub changed: bool,
    /// Conversions applied.
    pub conversions: Vec<ConversionInfo>,
    /// Notices raised while converting.
    pub notices: Vec<NoticeInfo>,
    /// Parse failure message, for `parse_error` files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Totals across a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertSummary {
    /// Files considered.
    pub files: usize,
    /// Files whose content changed.
    pub changed: usize,
    /// Conversions applied across all files.
    pub conversions: usize,
    /// Notices raised across all files.
    pub notices: usize,
    /// Files that could not be parsed.
    pub parse_failures: usize,
    /// Whether runtime facts were available for this run.
    pub dynamic_analysis: bool,
}

/// Response for the `convert` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Schema version.
    pub schema_version: String,
    /// Whether files were written.
    pub dry_run: bool,
    /// Per-file results, in input order.
    pub files: Vec<FileResult>,
    /// Totals.
    pub summary: ConvertSummary,
}

impl ConvertResponse {
    /// Build a response, computing the summary from `files`.
    pub fn new(files: Vec<FileResult>, dry_run: bool, dynamic_analysis: bool) -> Self {
        let summary = ConvertSummary {
            files: files.len(),
            changed: files.iter().filter(|f| f.changed).count(),
            conversions: files.iter().map(|f| f.conversions.len()).sum(),
            notices: files.iter().map(|f| f.notices.len()).sum(),
            parse_failures: files.iter().filter(|f| f.status == "parse_error").count(),
            dynamic_analysis,
        };
        ConvertResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            dry_run,
            files,
            summary,
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Emit a response as pretty-printed JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================
