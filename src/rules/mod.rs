//! Conversion rules.
//!
//! Each rule recognizes one deprecated node shape and knows how to rewrite
//! it. [`RuleKind`] is the catalogue; [`detect`] picks the first enabled kind
//! that claims a node and returns a [`Rule`] bound to it.
//!
//! A detected rule takes part in both phases:
//!
//! 1. [`Rule::register_requests`] asks the dynamic pass for the runtime facts
//!    it would like to see (nothing, for context-free rules).
//! 2. [`Rule::apply`] decides whether conversion is legal here, preferring a
//!    recorded runtime fact over the static answer, and submits its edits.
//!
//! Failures in step 2 are soft: the original text stays and the caller
//! records a notice.

use std::fmt;
use std::str::FromStr;

use respec_analysis::{AnalysisRegistry, AnalysisResult, EvalTarget, RuntimeData};
use respec_core::patch::{Edit, RewriteError, Rewriter, Span};
use respec_syntax::NodeRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

mod be_close;
mod should;
mod stub;

pub use be_close::BeCloseRule;
pub use should::ShouldRule;
pub use stub::StubRule;

// ============================================================================
// Rule Kinds
// ============================================================================

/// The rules respec knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// `x.should m` to `expect(x).to m`.
    Should,
    /// `x.stub(:m)` to `allow(x).to receive(:m)`.
    Stub,
    /// `be_close(e, d)` to `be_within(d).of(e)`.
    BeClose,
}

impl RuleKind {
    pub const ALL: [RuleKind; 3] = [RuleKind::Should, RuleKind::Stub, RuleKind::BeClose];

    pub fn name(self) -> &'static str {
        match self {
            RuleKind::Should => "should",
            RuleKind::Stub => "stub",
            RuleKind::BeClose => "be_close",
        }
    }

    /// Bind this kind to `node` if the node has its shape.
    pub fn detect<'t>(self, node: NodeRef<'t>) -> Option<Rule<'t>> {
        match self {
            RuleKind::Should => ShouldRule::detect(node).map(Rule::Should),
            RuleKind::Stub => StubRule::detect(node).map(Rule::Stub),
            RuleKind::BeClose => BeCloseRule::detect(node).map(Rule::BeClose),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A rule name that is not in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown rule '{0}' (expected one of: should, stub, be_close)")]
pub struct UnknownRule(pub String);

impl FromStr for RuleKind {
    type Err = UnknownRule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownRule(s.to_string()))
    }
}

/// First enabled rule that claims `node`.
pub fn detect<'t>(enabled: &[RuleKind], node: NodeRef<'t>) -> Option<Rule<'t>> {
    enabled.iter().find_map(|kind| kind.detect(node))
}

// ============================================================================
// Detected Rules
// ============================================================================

/// A rule bound to the node it will rewrite.
#[derive(Debug, Clone)]
pub enum Rule<'t> {
    Should(ShouldRule<'t>),
    Stub(StubRule<'t>),
    BeClose(BeCloseRule<'t>),
}

impl<'t> Rule<'t> {
    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::Should(_) => RuleKind::Should,
            Rule::Stub(_) => RuleKind::Stub,
            Rule::BeClose(_) => RuleKind::BeClose,
        }
    }

    /// The node the rule was detected on.
    pub fn node(&self) -> NodeRef<'t> {
        match self {
            Rule::Should(rule) => rule.node(),
            Rule::Stub(rule) => rule.node(),
            Rule::BeClose(rule) => rule.node(),
        }
    }

    /// Register the runtime facts this rule consults.
    pub fn register_requests(&self, registry: &mut AnalysisRegistry) -> AnalysisResult<()> {
        match self {
            Rule::Should(rule) => rule.register_requests(registry),
            Rule::Stub(rule) => rule.register_requests(registry),
            Rule::BeClose(_) => Ok(()),
        }
    }

    /// Submit this rule's edits if conversion is legal here.
    pub fn apply(
        &self,
        rewriter: &mut Rewriter<'_>,
        ctx: &RuleContext<'_>,
    ) -> Result<Conversion, ConversionError> {
        match self {
            Rule::Should(rule) => rule.apply(rewriter, ctx),
            Rule::Stub(rule) => rule.apply(rewriter, ctx),
            Rule::BeClose(rule) => rule.apply(rewriter),
        }
    }
}

/// What rules may consult while applying.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub runtime: &'a RuntimeData,
}

/// A conversion that was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub rule: RuleKind,
    /// Range of the converted expression in the original source.
    pub range: Span,
}

/// Why a rule left its node alone.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The replacement syntax is not callable where the node runs.
    #[error("cannot convert `{rule}` here: {reason}")]
    ContextUnavailable { rule: RuleKind, reason: String },

    /// The edits were rejected by the rewriter.
    #[error("`{rule}` conversion dropped: {source}")]
    EditConflict {
        rule: RuleKind,
        #[source]
        source: RewriteError,
    },
}

impl ConversionError {
    /// Notice category used in output.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::ContextUnavailable { .. } => "context_unavailable",
            ConversionError::EditConflict { .. } => "edit_conflict",
        }
    }

    pub fn rule(&self) -> RuleKind {
        match self {
            ConversionError::ContextUnavailable { rule, .. } => *rule,
            ConversionError::EditConflict { rule, .. } => *rule,
        }
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// A DSL method whose availability at a node can be checked at runtime.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Availability {
    pub key: &'static str,
    pub method: &'static str,
}

/// `expect(...)` without the monkey-patched `should` syntax.
pub(crate) const EXPECT: Availability = Availability {
    key: "expect_available?",
    method: "expect",
};

/// `allow(...)` without the monkey-patched `stub` syntax.
pub(crate) const ALLOW: Availability = Availability {
    key: "allow_available?",
    method: "allow",
};

impl Availability {
    fn code(&self) -> String {
        format!("respond_to?(:{}, true)", self.method)
    }

    pub fn register(&self, node: NodeRef<'_>, registry: &mut AnalysisRegistry) -> AnalysisResult<()> {
        registry.register(node, self.key, self.code(), EvalTarget::Context)
    }

    /// Runtime answer when one was recorded, else `static_answer`.
    pub fn check(&self, node: NodeRef<'_>, ctx: &RuleContext<'_>, static_answer: bool) -> bool {
        match ctx.runtime.truthy(node, self.key) {
            Some(answer) => {
                debug!(node = %node.range(), key = self.key, answer, "runtime availability");
                answer
            }
            None => static_answer,
        }
    }

    pub fn unavailable(&self, rule: RuleKind) -> ConversionError {
        ConversionError::ContextUnavailable {
            rule,
            reason: format!("`{}` is not available in this context", self.method),
        }
    }
}

/// Submit a rule's edits as one group.
pub(crate) fn submit(
    rule: RuleKind,
    rewriter: &mut Rewriter<'_>,
    edits: Vec<Edit>,
) -> Result<(), ConversionError> {
    rewriter
        .submit_all(edits)
        .map_err(|source| ConversionError::EditConflict { rule, source })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in RuleKind::ALL {
            assert_eq!(kind.name().parse::<RuleKind>().unwrap(), kind);
        }
        assert_eq!("its".parse::<RuleKind>(), Err(UnknownRule("its".to_string())));
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(serde_json::to_string(&RuleKind::BeClose).unwrap(), "\"be_close\"");
    }

    #[test]
    fn detect_respects_enabled_set() {
        let tree = tree(
            "a.should b",
            "(send @0..10 (send @0..1 nil :a) :should (send @9..10 nil :b))",
        );
        let node = tree.root();
        assert!(matches!(detect(&RuleKind::ALL, node), Some(Rule::Should(_))));
        assert!(detect(&[RuleKind::Stub, RuleKind::BeClose], node).is_none());
    }

    #[test]
    fn runtime_answer_overrides_static() {
        let tree = tree(
            "a.should b",
            "(send @0..10 (send @0..1 nil :a) :should (send @9..10 nil :b))",
        );
        let node = tree.root();
        let payload = r#"{"spec/a_spec.rb:0:10": {"expect_available?": {"result": true}}}"#;
        let runtime = RuntimeData::load(payload).unwrap();
        let ctx = RuleContext { runtime: &runtime };
        assert!(EXPECT.check(node, &ctx, false));

        let empty = RuntimeData::empty();
        let ctx = RuleContext { runtime: &empty };
        assert!(!EXPECT.check(node, &ctx, false));
        assert!(EXPECT.check(node, &ctx, true));
    }

    #[test]
    fn availability_requests_use_calling_instance() {
        let tree = tree("a", "(send @0..1 nil :a)");
        let mut registry = AnalysisRegistry::new();
        ALLOW.register(tree.root(), &mut registry).unwrap();
        let requests = registry.requests_for(tree.root().id()).unwrap();
        let request = &requests["allow_available?"];
        assert_eq!(request.target, EvalTarget::Context);
        assert_eq!(request.code, "respond_to?(:allow, true)");
    }
}
