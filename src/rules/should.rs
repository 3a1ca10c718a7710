//! `should` / `should_not` to `expect(...).to` / `not_to`.

use respec_analysis::{AnalysisRegistry, AnalysisResult};
use respec_core::patch::{Edit, Rewriter, Span};
use respec_syntax::{NodeRef, StaticContextInspector};

use super::{submit, Conversion, ConversionError, RuleContext, RuleKind, EXPECT};

/// `subject.should matcher`, with exactly one matcher argument.
///
/// Operator matchers (`x.should == 1`) parse as a bare `should` with the
/// operator applied to its result; they have no argument and are not
/// claimed.
#[derive(Debug, Clone)]
pub struct ShouldRule<'t> {
    node: NodeRef<'t>,
    subject: NodeRef<'t>,
    selector: Span,
    negative: bool,
}

impl<'t> ShouldRule<'t> {
    pub fn detect(node: NodeRef<'t>) -> Option<Self> {
        if !node.is("send") {
            return None;
        }
        let negative = match node.method_name()? {
            "should" => false,
            "should_not" => true,
            _ => return None,
        };
        let subject = node.receiver()?;
        if node.arguments().len() != 1 {
            return None;
        }
        let selector = node.selector_range()?;
        Some(ShouldRule {
            node,
            subject,
            selector,
            negative,
        })
    }

    pub fn node(&self) -> NodeRef<'t> {
        self.node
    }

    pub fn register_requests(&self, registry: &mut AnalysisRegistry) -> AnalysisResult<()> {
        EXPECT.register(self.node, registry)
    }

    pub fn apply(
        &self,
        rewriter: &mut Rewriter<'_>,
        ctx: &RuleContext<'_>,
    ) -> Result<Conversion, ConversionError> {
        let inspector = StaticContextInspector::new(self.node);
        if !EXPECT.check(
            self.node,
            ctx,
            inspector.non_monkey_patch_expectation_available(),
        ) {
            return Err(EXPECT.unavailable(RuleKind::Should));
        }

        let to = if self.negative { "not_to" } else { "to" };
        let tail = Span::new(self.subject.range().end, self.selector.end);
        let edits = match block_constructor(self.subject) {
            // lambda { ... }.should raise_error  =>  expect { ... }.to raise_error
            Some(constructor) => vec![
                Edit::replace(constructor.range(), "expect"),
                Edit::replace(tail, format!(".{}", to)),
            ],
            None => vec![
                Edit::insert_before(self.subject.range(), "expect("),
                Edit::replace(tail, format!(").{}", to)),
            ],
        };
        submit(RuleKind::Should, rewriter, edits)?;
        Ok(Conversion {
            rule: RuleKind::Should,
            range: self.node.range(),
        })
    }
}

/// For `lambda { }`, `proc { }` and `-> { }` subjects without block
/// parameters, the node naming the constructor.
fn block_constructor(subject: NodeRef<'_>) -> Option<NodeRef<'_>> {
    if !subject.is("block") {
        return None;
    }
    let call = subject.child_node(0)?;
    let params = subject.child_node(1)?;
    if params.child_nodes().next().is_some() {
        return None;
    }
    let is_constructor = call.is("lambda")
        || (call.is("send")
            && call.receiver().is_none()
            && matches!(call.method_name(), Some("lambda" | "proc")));
    is_constructor.then_some(call)
}
