//! Core infrastructure for respec.
//!
//! This crate provides the language-agnostic pieces every other crate leans on:
//! - Rewrite coordinator for anchored text edits with overlap detection
//! - Error types and exit code mapping
//! - JSON output types for CLI responses
//! - Text utilities for byte offset and line:column conversion

pub mod error;
pub mod output;
pub mod patch;
pub mod text;
