//! `be_close(expected, delta)` to `be_within(delta).of(expected)`.

use respec_core::patch::{Edit, Rewriter};
use respec_syntax::NodeRef;

use super::{submit, Conversion, ConversionError, RuleKind};

/// Receiver-less `be_close` with two arguments. Valid in any context.
#[derive(Debug, Clone)]
pub struct BeCloseRule<'t> {
    node: NodeRef<'t>,
    expected: NodeRef<'t>,
    delta: NodeRef<'t>,
}

impl<'t> BeCloseRule<'t> {
    pub fn detect(node: NodeRef<'t>) -> Option<Self> {
        if !node.is("send") || node.method_name()? != "be_close" || node.receiver().is_some() {
            return None;
        }
        let args = node.arguments();
        let [expected, delta] = args.as_slice() else {
            return None;
        };
        Some(BeCloseRule {
            node,
            expected: *expected,
            delta: *delta,
        })
    }

    pub fn node(&self) -> NodeRef<'t> {
        self.node
    }

    pub fn apply(&self, rewriter: &mut Rewriter<'_>) -> Result<Conversion, ConversionError> {
        let text = format!(
            "be_within({}).of({})",
            self.delta.source(),
            self.expected.source()
        );
        submit(
            RuleKind::BeClose,
            rewriter,
            vec![Edit::replace(self.node.range(), text)],
        )?;
        Ok(Conversion {
            rule: RuleKind::BeClose,
            range: self.node.range(),
        })
    }
}
