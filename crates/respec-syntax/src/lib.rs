// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Syntax layer for respec.
//!
//! Provides the arena-backed syntax tree read from an AST dump, scope tag
//! classification for spec-DSL nesting, the depth-first [`scan`] that drives
//! conversion rules, and the [`StaticContextInspector`] used for point
//! queries against a single node.
//!
//! ```ignore
//! use respec_syntax::{parse_sexp, scan, NodeRef, ScanContext, ScanVisitor, VisitResult};
//!
//! struct Printer;
//!
//! impl<'t> ScanVisitor<'t> for Printer {
//!     fn visit(&mut self, node: NodeRef<'t>, ctx: &ScanContext<'_, 't>) -> VisitResult {
//!         println!("{} {}", node.kind(), ctx.in_example_group_context());
//!         VisitResult::Continue
//!     }
//! }
//!
//! let tree = parse_sexp("spec/a_spec.rb", source, dump)?;
//! scan(tree.root(), true, &mut Printer);
//! ```

pub mod error;
pub mod inspector;
pub mod scanner;
pub mod scope;
pub mod sexp;
pub mod tree;

pub use error::{SyntaxError, SyntaxResult};
pub use inspector::StaticContextInspector;
pub use scanner::{scan, ScanContext, ScanVisitor, VisitResult};
pub use scope::{ScopeStack, ScopeTag};
pub use sexp::parse_sexp;
pub use tree::{Child, Literal, Node, NodeId, NodeRef, Tree, TreeBuilder};
