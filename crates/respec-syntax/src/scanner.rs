// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Depth-first tree scan with ancestor and scope tracking.
//!
//! [`scan`] visits every node in pre-order and hands the visitor a
//! [`ScanContext`] describing where the node sits: its ancestor chain and the
//! open scopes around it.
//!
//! The walk is iterative over an explicit work list, so deep trees cannot
//! overflow the stack. A scope node's tag is pushed once before its first
//! child and popped once after its last, so every child of the node (the
//! call of a block and the receiver of a `defs` included) sees the tag.
//!
//! All traversal state lives in the `scan` call, so repeated or concurrent
//! scans of the same tree are independent.

use crate::scope::{ScopeStack, ScopeTag};
use crate::tree::NodeRef;

/// Result of visiting a node - controls traversal behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VisitResult {
    /// Continue traversal into children.
    #[default]
    Continue,

    /// Skip children, continue with siblings.
    SkipChildren,

    /// Stop traversal entirely.
    Stop,
}

/// Position of the visited node.
pub struct ScanContext<'a, 't> {
    ancestors: &'a [NodeRef<'t>],
    scopes: &'a ScopeStack,
}

impl<'a, 't> ScanContext<'a, 't> {
    /// Ancestors of the visited node, outermost first.
    pub fn ancestors(&self) -> &'a [NodeRef<'t>] {
        self.ancestors
    }

    /// Open scopes around the visited node, outermost first.
    pub fn scopes(&self) -> &'a ScopeStack {
        self.scopes
    }

    pub fn in_example_group_context(&self) -> bool {
        self.scopes.in_example_group_context()
    }
}

/// Receives nodes from [`scan`].
pub trait ScanVisitor<'t> {
    fn visit(&mut self, node: NodeRef<'t>, ctx: &ScanContext<'_, 't>) -> VisitResult;
}

enum Step<'t> {
    Visit(NodeRef<'t>),
    PushScope(ScopeTag),
    PopScope,
    PopAncestor,
}

/// Visit `root` and its descendants in pre-order.
///
/// `root` is treated as top level: nodes above it are not considered. With
/// `yield_root` false the root itself is not passed to the visitor, but its
/// descendants are.
pub fn scan<'t, V>(root: NodeRef<'t>, yield_root: bool, visitor: &mut V)
where
    V: ScanVisitor<'t> + ?Sized,
{
    let mut ancestors: Vec<NodeRef<'t>> = Vec::new();
    let mut scopes = ScopeStack::new();
    let mut work = vec![Step::Visit(root)];

    while let Some(step) = work.pop() {
        let node = match step {
            Step::Visit(node) => node,
            Step::PushScope(tag) => {
                scopes.push(tag);
                continue;
            }
            Step::PopScope => {
                scopes.pop();
                continue;
            }
            Step::PopAncestor => {
                ancestors.pop();
                continue;
            }
        };

        if yield_root || node != root {
            let ctx = ScanContext {
                ancestors: &ancestors,
                scopes: &scopes,
            };
            match visitor.visit(node, &ctx) {
                VisitResult::Continue => {}
                VisitResult::SkipChildren => continue,
                VisitResult::Stop => return,
            }
        }

        ancestors.push(node);
        work.push(Step::PopAncestor);

        let children: Vec<NodeRef<'t>> = node.child_nodes().map(|(_, n)| n).collect();
        let tag = ScopeTag::of(node);
        if tag.is_some() {
            work.push(Step::PopScope);
        }
        work.extend(children.into_iter().rev().map(Step::Visit));
        if let Some(tag) = tag {
            work.push(Step::PushScope(tag));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexp::parse_sexp;
    use crate::tree::{NodeId, Tree};

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(NodeId, Vec<NodeId>, bool)>,
    }

    impl<'t> ScanVisitor<'t> for Recorder {
        fn visit(&mut self, node: NodeRef<'t>, ctx: &ScanContext<'_, 't>) -> VisitResult {
            self.seen.push((
                node.id(),
                ctx.ancestors().iter().map(|a| a.id()).collect(),
                ctx.in_example_group_context(),
            ));
            VisitResult::Continue
        }
    }

    /// describe 'x' do
    ///   it { a.b }
    /// end
    fn group_tree() -> Tree {
        let source = "describe 'x' do\n  it { a.b }\nend\n";
        let dump = concat!(
            "(block @0..32 (send @0..12 nil :describe (str @9..12 \"x\")) (args)",
            " (block @18..28 (send @18..20 nil :it) (args)",
            " (send @23..26 (send @23..24 nil :a) :b)))"
        );
        parse_sexp("a_spec.rb", source, dump).unwrap()
    }

    fn find<'t>(tree: &'t Tree, text: &str) -> NodeRef<'t> {
        tree.nodes().find(|n| n.source() == text).unwrap()
    }

    #[test]
    fn visits_in_pre_order() {
        let tree = group_tree();
        let mut recorder = Recorder::default();
        scan(tree.root(), true, &mut recorder);
        let order: Vec<NodeId> = recorder.seen.iter().map(|(id, _, _)| *id).collect();
        let expected: Vec<NodeId> = tree.nodes().map(|n| n.id()).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn yield_root_false_skips_only_the_root() {
        let tree = group_tree();
        let mut recorder = Recorder::default();
        scan(tree.root(), false, &mut recorder);
        assert_eq!(recorder.seen.len(), tree.len() - 1);
        assert!(recorder.seen.iter().all(|(id, _, _)| *id != tree.root().id()));
    }

    #[test]
    fn group_call_is_inside_the_group() {
        let tree = group_tree();
        let mut recorder = Recorder::default();
        scan(tree.root(), true, &mut recorder);
        let flag = |text: &str| {
            let id = find(&tree, text).id();
            recorder.seen.iter().find(|(n, _, _)| *n == id).unwrap().2
        };
        // The root block itself is visited before its tag is pushed.
        assert!(!flag(tree.root().source()));
        // [ExampleGroup]
        assert!(!flag("describe 'x'"));
        // [ExampleGroup, Example]
        assert!(flag("it"));
        assert!(flag("a.b"));
        assert!(flag("a"));
    }

    #[test]
    fn scope_brackets_every_child() {
        // describe { x.stub(:m) { 1 } }
        let source = "describe { x.stub(:m) { 1 } }";
        let dump = concat!(
            "(block @0..29 (send @0..8 nil :describe) (args)",
            " (block @11..27 (send @11..21 (send @11..12 nil :x) :stub (sym @18..20 :m))",
            " (args) (int @24..25 1)))"
        );
        let tree = parse_sexp("a_spec.rb", source, dump).unwrap();

        struct Scopes(Vec<(String, Vec<ScopeTag>)>);
        impl<'t> ScanVisitor<'t> for Scopes {
            fn visit(&mut self, node: NodeRef<'t>, ctx: &ScanContext<'_, 't>) -> VisitResult {
                self.0.push((node.source().to_string(), ctx.scopes().tags().to_vec()));
                VisitResult::Continue
            }
        }
        let mut scopes = Scopes(Vec::new());
        scan(tree.root(), true, &mut scopes);
        let tags_of = |text: &str| {
            scopes.0.iter().find(|(s, _)| s == text).unwrap().1.clone()
        };
        assert_eq!(tags_of("describe"), [ScopeTag::ExampleGroup]);
        assert_eq!(
            tags_of("x.stub(:m)"),
            [ScopeTag::ExampleGroup, ScopeTag::PlainBlock]
        );
        assert_eq!(
            tags_of("1"),
            [ScopeTag::ExampleGroup, ScopeTag::PlainBlock]
        );
    }

    #[test]
    fn ancestor_chain_lists_every_ancestor() {
        let tree = group_tree();
        let mut recorder = Recorder::default();
        scan(tree.root(), true, &mut recorder);
        let a = find(&tree, "a");
        let (_, chain, _) = recorder.seen.iter().find(|(n, _, _)| *n == a.id()).unwrap();
        let mut expected: Vec<NodeId> = a.ancestors().map(|n| n.id()).collect();
        expected.reverse();
        assert_eq!(chain, &expected);
    }

    #[test]
    fn skip_children_and_stop() {
        let tree = group_tree();

        struct Skipper(usize);
        impl<'t> ScanVisitor<'t> for Skipper {
            fn visit(&mut self, node: NodeRef<'t>, _: &ScanContext<'_, 't>) -> VisitResult {
                self.0 += 1;
                if node.is("block") && node.parent().is_some() {
                    VisitResult::SkipChildren
                } else {
                    VisitResult::Continue
                }
            }
        }
        let mut skipper = Skipper(0);
        scan(tree.root(), true, &mut skipper);
        // root block, describe send, str, args, inner block
        assert_eq!(skipper.0, 5);

        struct Stopper(usize);
        impl<'t> ScanVisitor<'t> for Stopper {
            fn visit(&mut self, _: NodeRef<'t>, _: &ScanContext<'_, 't>) -> VisitResult {
                self.0 += 1;
                if self.0 == 2 {
                    VisitResult::Stop
                } else {
                    VisitResult::Continue
                }
            }
        }
        let mut stopper = Stopper(0);
        scan(tree.root(), true, &mut stopper);
        assert_eq!(stopper.0, 2);
    }

    #[test]
    fn scanning_twice_is_identical() {
        let tree = group_tree();
        let mut first = Recorder::default();
        let mut second = Recorder::default();
        scan(tree.root(), true, &mut first);
        scan(tree.root(), true, &mut second);
        assert_eq!(first.seen, second.seen);
    }
}
