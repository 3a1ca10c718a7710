//! respec: context-aware migration of RSpec spec files
//!
//! Converts deprecated RSpec syntax (`x.should eq 1`, `x.stub(:m)`,
//! `be_close(a, d)`) to its current form. Conversions that are only legal in
//! an example-group context consult a static classification of the node's
//! lexical nesting, corroborated by an optional dynamic pass that runs the
//! instrumented suite once and reads runtime facts back.

// Core infrastructure - re-exported from respec-core
pub use respec_core::error;
pub use respec_core::output;
pub use respec_core::patch;
pub use respec_core::text;

// Syntax tree and context classification
pub use respec_syntax as syntax;

// Runtime analysis
pub use respec_analysis as analysis;

pub mod config;
pub mod parse;
pub mod rules;
pub mod sandbox;

// Pipeline
pub mod cli;
pub mod convert;
pub mod dynamic;

// Error bridges - converts subsystem errors to RespecError
mod error_bridges;
