//! `stub` / `stub!` to `allow(...).to receive` / `receive_messages`.

use respec_analysis::{AnalysisRegistry, AnalysisResult};
use respec_core::patch::{Edit, Rewriter, Span};
use respec_syntax::{NodeRef, StaticContextInspector};

use super::{submit, Conversion, ConversionError, RuleContext, RuleKind, ALLOW};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StubForm {
    /// `x.stub(:m)`
    Single,
    /// `x.stub(a: 1, b: 2)`
    Messages,
}

/// `object.stub(:name)` or `object.stub(name: value, ...)`.
///
/// Chained configuration (`.and_return(1)`, `.with(...)`) follows the stub
/// call and carries over unchanged.
#[derive(Debug, Clone)]
pub struct StubRule<'t> {
    node: NodeRef<'t>,
    object: NodeRef<'t>,
    selector: Span,
    form: StubForm,
}

impl<'t> StubRule<'t> {
    pub fn detect(node: NodeRef<'t>) -> Option<Self> {
        if !node.is("send") || !matches!(node.method_name()?, "stub" | "stub!") {
            return None;
        }
        let object = node.receiver()?;
        let args = node.arguments();
        let [arg] = args.as_slice() else {
            return None;
        };
        let form = match arg.kind() {
            "sym" | "str" | "dsym" => StubForm::Single,
            "hash" | "kwargs" => StubForm::Messages,
            _ => return None,
        };
        let selector = node.selector_range()?;
        Some(StubRule {
            node,
            object,
            selector,
            form,
        })
    }

    pub fn node(&self) -> NodeRef<'t> {
        self.node
    }

    pub fn register_requests(&self, registry: &mut AnalysisRegistry) -> AnalysisResult<()> {
        ALLOW.register(self.node, registry)
    }

    pub fn apply(
        &self,
        rewriter: &mut Rewriter<'_>,
        ctx: &RuleContext<'_>,
    ) -> Result<Conversion, ConversionError> {
        let inspector = StaticContextInspector::new(self.node);
        if !ALLOW.check(self.node, ctx, inspector.non_monkey_patch_mock_available()) {
            return Err(ALLOW.unavailable(RuleKind::Stub));
        }

        let matcher = match self.form {
            StubForm::Single => "receive",
            StubForm::Messages => "receive_messages",
        };
        let edits = vec![
            Edit::insert_before(self.object.range(), "allow("),
            Edit::replace(
                Span::new(self.object.range().end, self.selector.end),
                format!(").to {}", matcher),
            ),
        ];
        submit(RuleKind::Stub, rewriter, edits)?;
        Ok(Conversion {
            rule: RuleKind::Stub,
            range: self.node.range(),
        })
    }
}
