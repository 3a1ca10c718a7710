//! Probe injection.
//!
//! Every node with requests is wrapped in a call to the probe:
//!
//! ```text
//! respec_analyze((ORIGINAL), self, {"key" => ["context", "code"]}, "spec/a_spec.rb", 10, 25)
//! ```
//!
//! The original expression is passed through untouched, so its value and side
//! effects are preserved. The trailing arguments identify the node the
//! requests were registered on.
//!
//! Two shapes need care:
//! - A call that takes a block is wrapped together with its block.
//! - When the wrapped code contains a heredoc and nothing but a comment
//!   follows it on the opener line, the closing half of the wrapper goes on a
//!   new line after the heredoc terminator. If more code follows on that
//!   line, the closing half stays at the end of the node.
//!
//! Wrapping goes through the [`Rewriter`], so it is subject to the same
//! conflict checks as any edit. A rejected wrap skips that node; it falls
//! back to static classification.

use respec_core::patch::{Edit, Rewriter, Span};
use respec_syntax::{NodeId, NodeRef, Tree};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::helper::PROBE_NAME;
use crate::registry::{AnalysisRegistry, AnalysisRequest};

/// Result of instrumenting one tree.
#[derive(Debug, Clone)]
pub struct Instrumented {
    /// Instrumented source text.
    pub source: String,
    /// Nodes whose probe was inserted.
    pub instrumented: Vec<NodeId>,
    /// Nodes whose probe was rejected.
    pub skipped: Vec<NodeId>,
}

/// Wrap every requested node of `tree` in a probe call.
pub fn instrument(tree: &Tree, registry: &AnalysisRegistry) -> Instrumented {
    let mut rewriter = Rewriter::new(tree.source());
    let mut instrumented = Vec::new();
    let mut skipped = Vec::new();

    for (id, requests) in registry.iter() {
        let node = tree.node(id);
        let edits = probe_edits(node, requests);
        match rewriter.submit_all(edits) {
            Ok(()) => instrumented.push(id),
            Err(err) => {
                debug!(node = %node.range(), error = %err, "skipping probe");
                skipped.push(id);
            }
        }
    }

    info!(
        path = tree.path(),
        probes = instrumented.len(),
        skipped = skipped.len(),
        "instrumented source"
    );
    Instrumented {
        source: rewriter.process(),
        instrumented,
        skipped,
    }
}

/// The node actually wrapped for a request on `node`.
fn wrap_target(node: NodeRef<'_>) -> NodeRef<'_> {
    match node.parent() {
        Some(parent)
            if matches!(parent.kind(), "block" | "numblock")
                && node.index_in_parent() == Some(0) =>
        {
            parent
        }
        _ => node,
    }
}

fn probe_edits(node: NodeRef<'_>, requests: &BTreeMap<String, AnalysisRequest>) -> Vec<Edit> {
    let target = wrap_target(node);
    let range = target.range();
    let front = format!("{}((", PROBE_NAME);
    let rear = probe_rear(node, requests);

    let closing = match target.heredoc_end() {
        Some(end) if end > range.end && opener_line_is_done(target) => {
            Edit::insert_after(Span::new(range.start, end), format!("\n{}", rear))
        }
        _ => Edit::insert_after(range, rear),
    };
    vec![Edit::insert_before(range, front), closing]
}

/// Whether only blanks or a comment follow `node` on its last line.
fn opener_line_is_done(node: NodeRef<'_>) -> bool {
    let rest = &node.tree().source()[node.range().end..];
    let line = rest.split('\n').next().unwrap_or_default().trim();
    line.is_empty() || line.starts_with('#')
}

fn probe_rear(node: NodeRef<'_>, requests: &BTreeMap<String, AnalysisRequest>) -> String {
    let pairs: Vec<String> = requests
        .iter()
        .map(|(key, request)| {
            format!(
                "{} => [{}, {}]",
                ruby_string(key),
                ruby_string(request.target.as_str()),
                ruby_string(&request.code)
            )
        })
        .collect();
    let range = node.range();
    format!(
        "), self, {{{}}}, {}, {}, {})",
        pairs.join(", "),
        ruby_string(node.tree().path()),
        range.start,
        range.end
    )
}

/// Double-quoted Ruby string literal with interpolation disabled.
fn ruby_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '#' => out.push_str("\\#"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EvalTarget;
    use respec_syntax::parse_sexp;

    #[test]
    fn wraps_node_with_metadata() {
        let tree = parse_sexp(
            "spec/a_spec.rb",
            "x = a.should b",
            "(lvasgn @0..14 :x (send @4..14 (send @4..5 nil :a) :should (send @13..14 nil :b)))",
        )
        .unwrap();
        let should = tree.root().child_node(1).unwrap();
        let mut registry = AnalysisRegistry::new();
        registry
            .register(should, "expect_available?", "respond_to?(:expect)", EvalTarget::Context)
            .unwrap();
        registry
            .register(should, "class", "self.class.name", EvalTarget::Object)
            .unwrap();

        let out = instrument(&tree, &registry);
        assert_eq!(
            out.source,
            "x = respec_analyze((a.should b), self, {\"class\" => [\"self\", \"self.class.name\"], \
             \"expect_available?\" => [\"context\", \"respond_to?(:expect)\"]}, \
             \"spec/a_spec.rb\", 4, 14)"
        );
        assert_eq!(out.instrumented, vec![should.id()]);
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn block_taking_call_wraps_the_block() {
        let tree = parse_sexp(
            "a_spec.rb",
            "expect { x }.to raise_error",
            "(send @0..27 (block @0..12 (send @0..6 nil :expect) (args) (send @9..10 nil :x)) :to (send @16..27 nil :raise_error))",
        )
        .unwrap();
        let call = tree.root().receiver().unwrap().child_node(0).unwrap();
        let mut registry = AnalysisRegistry::new();
        registry.register(call, "k", "c", EvalTarget::Object).unwrap();

        let out = instrument(&tree, &registry);
        assert_eq!(
            out.source,
            "respec_analyze((expect { x }), self, {\"k\" => [\"self\", \"c\"]}, \"a_spec.rb\", 0, 6).to raise_error"
        );
    }

    #[test]
    fn heredoc_closes_after_terminator() {
        let source = "foo(<<~EOS).should be_ok\n  body\nEOS\n";
        let dump = "(send @0..24 (send @0..11 nil :foo (str @4..10 ~25..35 \"body\\n\")) :should (send @19..24 nil :be_ok))";
        let tree = parse_sexp("a_spec.rb", source, dump).unwrap();
        let mut registry = AnalysisRegistry::new();
        registry.register(tree.root(), "k", "c", EvalTarget::Context).unwrap();

        let out = instrument(&tree, &registry);
        assert_eq!(
            out.source,
            "respec_analyze((foo(<<~EOS).should be_ok\n  body\nEOS\n), self, {\"k\" => [\"context\", \"c\"]}, \"a_spec.rb\", 0, 24)\n"
        );
    }

    #[test]
    fn heredoc_with_trailing_code_closes_at_node_end() {
        let source = "foo(<<~EOS).should be_ok; bar\n  body\nEOS\n";
        let dump = "(begin @0..29 (send @0..24 (send @0..11 nil :foo (str @4..10 ~30..40 \"body\\n\")) :should (send @19..24 nil :be_ok)) (send @26..29 nil :bar))";
        let tree = parse_sexp("a_spec.rb", source, dump).unwrap();
        let should = tree.root().child_node(0).unwrap();
        let mut registry = AnalysisRegistry::new();
        registry.register(should, "k", "c", EvalTarget::Context).unwrap();

        let out = instrument(&tree, &registry);
        assert_eq!(
            out.source,
            "respec_analyze((foo(<<~EOS).should be_ok), self, {\"k\" => [\"context\", \"c\"]}, \"a_spec.rb\", 0, 24); bar\n  body\nEOS\n"
        );
    }

    #[test]
    fn heredoc_followed_by_comment_closes_after_terminator() {
        let source = "foo(<<~EOS).should be_ok # ok\n  body\nEOS\n";
        let dump = "(send @0..24 (send @0..11 nil :foo (str @4..10 ~30..40 \"body\\n\")) :should (send @19..24 nil :be_ok))";
        let tree = parse_sexp("a_spec.rb", source, dump).unwrap();
        let mut registry = AnalysisRegistry::new();
        registry.register(tree.root(), "k", "c", EvalTarget::Context).unwrap();

        let out = instrument(&tree, &registry);
        assert_eq!(
            out.source,
            "respec_analyze((foo(<<~EOS).should be_ok # ok\n  body\nEOS\n), self, {\"k\" => [\"context\", \"c\"]}, \"a_spec.rb\", 0, 24)\n"
        );
    }

    #[test]
    fn nested_targets_nest_probes() {
        let tree = parse_sexp(
            "a.rb",
            "a.b",
            "(send @0..3 (send @0..1 nil :a) :b)",
        )
        .unwrap();
        let inner = tree.root().receiver().unwrap();
        let mut registry = AnalysisRegistry::new();
        registry.register(tree.root(), "outer", "1", EvalTarget::Object).unwrap();
        registry.register(inner, "inner", "2", EvalTarget::Object).unwrap();

        let out = instrument(&tree, &registry);
        assert_eq!(
            out.source,
            "respec_analyze((respec_analyze((a), self, {\"inner\" => [\"self\", \"2\"]}, \"a.rb\", 0, 1).b), \
             self, {\"outer\" => [\"self\", \"1\"]}, \"a.rb\", 0, 3)"
        );
        assert_eq!(out.instrumented.len(), 2);
    }

    #[test]
    fn no_requests_leaves_source_unchanged() {
        let tree = parse_sexp("a.rb", "a.b", "(send @0..3 (send @0..1 nil :a) :b)").unwrap();
        let out = instrument(&tree, &AnalysisRegistry::new());
        assert_eq!(out.source, "a.b");
    }

    #[test]
    fn ruby_strings_disable_interpolation() {
        assert_eq!(ruby_string("#{x}\"\\\n"), "\"\\#{x}\\\"\\\\\\n\"");
    }
}
