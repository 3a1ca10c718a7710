//! Per-file conversion.
//!
//! A single scan of the tree detects every rule application in pre-order.
//! The same detection feeds both phases: [`collect_requests`] for the
//! dynamic pass and [`convert_tree`] for the rewrite, so a node asks for
//! runtime facts exactly when it will later consult them.

use respec_analysis::{AnalysisRegistry, AnalysisResult, RuntimeData};
use respec_core::output::{ConversionInfo, NoticeInfo};
use respec_core::patch::Rewriter;
use respec_core::text::byte_offset_to_position;
use respec_syntax::{scan, NodeRef, ScanContext, ScanVisitor, Tree, VisitResult};
use tracing::debug;

use crate::rules::{detect, Rule, RuleContext, RuleKind};

/// Result of converting one tree.
#[derive(Debug, Clone)]
pub struct FileConversion {
    /// Rewritten source text.
    pub source: String,
    /// Whether `source` differs from the original.
    pub changed: bool,
    pub conversions: Vec<ConversionInfo>,
    pub notices: Vec<NoticeInfo>,
}

struct RuleCollector<'r, 't> {
    enabled: &'r [RuleKind],
    found: Vec<Rule<'t>>,
}

impl<'t> ScanVisitor<'t> for RuleCollector<'_, 't> {
    fn visit(&mut self, node: NodeRef<'t>, ctx: &ScanContext<'_, 't>) -> VisitResult {
        if let Some(rule) = detect(self.enabled, node) {
            debug!(
                rule = %rule.kind(),
                node = %node.range(),
                in_example_group = ctx.in_example_group_context(),
                "detected"
            );
            self.found.push(rule);
        }
        VisitResult::Continue
    }
}

/// Every rule application in `tree`, in pre-order.
pub fn detect_rules<'t>(tree: &'t Tree, enabled: &[RuleKind]) -> Vec<Rule<'t>> {
    let mut collector = RuleCollector {
        enabled,
        found: Vec::new(),
    };
    scan(tree.root(), true, &mut collector);
    collector.found
}

/// Runtime requests of every rule application in `tree`.
pub fn collect_requests(tree: &Tree, enabled: &[RuleKind]) -> AnalysisResult<AnalysisRegistry> {
    let mut registry = AnalysisRegistry::new();
    for rule in detect_rules(tree, enabled) {
        rule.register_requests(&mut registry)?;
    }
    Ok(registry)
}

/// Apply every enabled rule to `tree`.
///
/// Rules that cannot convert leave their text alone and add a notice;
/// other rules are unaffected.
pub fn convert_tree(tree: &Tree, enabled: &[RuleKind], runtime: &RuntimeData) -> FileConversion {
    let source = tree.source();
    let ctx = RuleContext { runtime };
    let mut rewriter = Rewriter::new(source);
    let mut conversions = Vec::new();
    let mut notices = Vec::new();

    for rule in detect_rules(tree, enabled) {
        let (line, col) = byte_offset_to_position(source, rule.node().range().start);
        match rule.apply(&mut rewriter, &ctx) {
            Ok(conversion) => conversions.push(ConversionInfo {
                rule: conversion.rule.name().to_string(),
                line,
                col,
            }),
            Err(err) => {
                debug!(path = tree.path(), line, col, error = %err, "conversion skipped");
                notices.push(NoticeInfo {
                    kind: err.kind().to_string(),
                    rule: err.rule().name().to_string(),
                    message: err.to_string(),
                    line,
                    col,
                });
            }
        }
    }

    let rewritten = rewriter.process();
    FileConversion {
        changed: rewritten != source,
        source: rewritten,
        conversions,
        notices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use respec_syntax::parse_sexp;

    const MIXED: &str = "describe A do\n  it { x.should eq 1 }\nend\ny.should eq 2\n";
    const MIXED_DUMP: &str = "(begin @0..54
        (block @0..40 (send @0..10 nil :describe (const @9..10 nil :A)) (args)
          (block @16..36 (send @16..18 nil :it) (args)
            (send @21..34 (send @21..22 nil :x) :should (send @30..34 nil :eq (int @33..34 1)))))
        (send @41..54 (send @41..42 nil :y) :should (send @50..54 nil :eq (int @53..54 2))))";

    fn mixed() -> Tree {
        parse_sexp("spec/a_spec.rb", MIXED, MIXED_DUMP).unwrap()
    }

    #[test]
    fn converts_in_context_and_reports_the_rest() {
        let tree = mixed();
        let out = convert_tree(&tree, &RuleKind::ALL, &RuntimeData::empty());
        assert!(out.changed);
        assert_eq!(
            out.source,
            "describe A do\n  it { expect(x).to eq 1 }\nend\ny.should eq 2\n"
        );
        assert_eq!(
            out.conversions,
            vec![ConversionInfo {
                rule: "should".to_string(),
                line: 2,
                col: 8,
            }]
        );
        assert_eq!(out.notices.len(), 1);
        let notice = &out.notices[0];
        assert_eq!(notice.kind, "context_unavailable");
        assert_eq!((notice.line, notice.col), (4, 1));
    }

    #[test]
    fn runtime_facts_unlock_top_level_conversion() {
        let tree = mixed();
        let runtime = RuntimeData::load(
            r#"{"spec/a_spec.rb:41:54": {"expect_available?": {"result": true}}}"#,
        )
        .unwrap();
        let out = convert_tree(&tree, &RuleKind::ALL, &runtime);
        assert!(out.source.ends_with("end\nexpect(y).to eq 2\n"));
        assert_eq!(out.conversions.len(), 2);
        assert!(out.notices.is_empty());
    }

    #[test]
    fn disabled_rules_leave_source_untouched() {
        let tree = mixed();
        let out = convert_tree(&tree, &[RuleKind::Stub], &RuntimeData::empty());
        assert!(!out.changed);
        assert_eq!(out.source, MIXED);
        assert!(out.conversions.is_empty() && out.notices.is_empty());
    }

    #[test]
    fn overlapping_rule_is_dropped_with_notice() {
        let tree = parse_sexp(
            "spec/a_spec.rb",
            "describe { it { be_close(y.stub(:a), 1) } }",
            "(block @0..43 (send @0..8 nil :describe) (args)
               (block @11..41 (send @11..13 nil :it) (args)
                 (send @16..39 nil :be_close
                   (send @25..35 (send @25..26 nil :y) :stub (sym @32..34 :a))
                   (int @37..38 1))))",
        )
        .unwrap();
        let out = convert_tree(&tree, &RuleKind::ALL, &RuntimeData::empty());
        assert_eq!(out.source, "describe { it { be_within(1).of(y.stub(:a)) } }");
        assert_eq!(out.conversions.len(), 1);
        assert_eq!(out.conversions[0].rule, "be_close");
        assert_eq!(out.notices.len(), 1);
        assert_eq!(out.notices[0].kind, "edit_conflict");
        assert_eq!(out.notices[0].rule, "stub");
    }

    #[test]
    fn block_attached_call_takes_the_block_context() {
        let tree = parse_sexp(
            "spec/a_spec.rb",
            "describe { x.stub(:m) { 1 } }",
            "(block @0..29 (send @0..8 nil :describe) (args)
               (block @11..27 (send @11..21 (send @11..12 nil :x) :stub (sym @18..20 :m))
                 (args) (int @24..25 1)))",
        )
        .unwrap();
        let out = convert_tree(&tree, &RuleKind::ALL, &RuntimeData::empty());
        assert_eq!(out.source, "describe { allow(x).to receive(:m) { 1 } }");
        assert_eq!(out.conversions.len(), 1);
        assert!(out.notices.is_empty());
    }

    #[test]
    fn requests_follow_detection() {
        let tree = mixed();
        let registry = collect_requests(&tree, &RuleKind::ALL).unwrap();
        assert_eq!(registry.len(), 2);
        let none = collect_requests(&tree, &[RuleKind::BeClose]).unwrap();
        assert!(none.is_empty());
    }
}
