// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Arena-backed syntax tree.
//!
//! Nodes live in a single `Vec` owned by the [`Tree`]; children are referred to
//! by [`NodeId`]. Each node also records its parent's id. That link is set
//! once by [`TreeBuilder`] when the parent is pushed and is only ever read,
//! so ownership stays strictly top-down.
//!
//! Node kinds follow the Ruby `parser` gem (`send`, `block`, `class`, `def`,
//! ...). Children are a mix of nodes and literal slots, in the gem's order:
//!
//! ```text
//! (send (lvar :user) :should (send nil :be_valid))
//!  ^^^^ ^^^^^^^^^^^^ ^^^^^^^ ^^^^^^^^^^^^^^^^^^^^^
//!  kind receiver      method  argument
//! ```
//!
//! The tree is immutable once built. Rewriting happens on text through
//! [`respec_core::patch::Rewriter`], never by mutating nodes.

use std::fmt;

use respec_core::patch::Span;

use crate::error::{SyntaxError, SyntaxResult};

// ============================================================================
// Identifiers and Slots
// ============================================================================

/// Index of a node within its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A non-node child slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Symbol(String),
    Str(String),
}

impl Literal {
    /// The symbol name, if this is a symbol.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Literal::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

/// One child slot of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Node(NodeId),
    Literal(Literal),
}

impl Child {
    /// The node id, if this slot holds a node.
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Child::Node(id) => Some(*id),
            Child::Literal(_) => None,
        }
    }
}

/// Stored node data.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: String,
    pub range: Span,
    /// Heredoc body through its terminator line, for heredoc string nodes.
    pub heredoc: Option<Span>,
    pub children: Vec<Child>,
    pub parent: Option<NodeId>,
}

// ============================================================================
// Tree
// ============================================================================

/// A parsed source file: its text plus the node arena.
#[derive(Debug, Clone)]
pub struct Tree {
    path: String,
    source: String,
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Path the source was read from, as given to the builder.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The full source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root node.
    pub fn root(&self) -> NodeRef<'_> {
        self.node(self.root)
    }

    /// Borrow a node by id.
    ///
    /// Ids come from this tree; an id from another tree is a logic error and
    /// panics on out-of-range access like any slice index.
    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    /// Raw node data.
    pub fn data(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the tree has no nodes (never true for a built tree).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in pre-order, root first.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.root().each_node()
    }
}

// ============================================================================
// NodeRef
// ============================================================================

/// A borrowed view of one node with navigation helpers.
#[derive(Clone, Copy)]
pub struct NodeRef<'t> {
    tree: &'t Tree,
    id: NodeId,
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.kind(), self.id, self.range())
    }
}

impl<'t> NodeRef<'t> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    fn data(&self) -> &'t Node {
        &self.tree.nodes[self.id.index()]
    }

    /// Node kind, e.g. `"send"`.
    pub fn kind(&self) -> &'t str {
        &self.data().kind
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind() == kind
    }

    /// Byte range of the node's expression.
    pub fn range(&self) -> Span {
        self.data().range
    }

    /// Heredoc body range, for heredoc string nodes.
    pub fn heredoc_range(&self) -> Option<Span> {
        self.data().heredoc
    }

    /// Source text of the node's expression.
    pub fn source(&self) -> &'t str {
        let range = self.range();
        &self.tree.source[range.start..range.end]
    }

    pub fn children(&self) -> &'t [Child] {
        &self.data().children
    }

    /// The child at `index` if it is a node.
    pub fn child_node(&self, index: usize) -> Option<NodeRef<'t>> {
        self.children()
            .get(index)
            .and_then(Child::as_node)
            .map(|id| self.tree.node(id))
    }

    /// The child at `index` if it is a literal.
    pub fn literal(&self, index: usize) -> Option<&'t Literal> {
        match self.children().get(index) {
            Some(Child::Literal(lit)) => Some(lit),
            _ => None,
        }
    }

    /// Child slots that hold nodes, in order, with their slot index.
    pub fn child_nodes(&self) -> impl Iterator<Item = (usize, NodeRef<'t>)> + 't {
        let tree = self.tree;
        self.children()
            .iter()
            .enumerate()
            .filter_map(move |(i, c)| c.as_node().map(|id| (i, tree.node(id))))
    }

    pub fn parent(&self) -> Option<NodeRef<'t>> {
        self.data().parent.map(|id| self.tree.node(id))
    }

    /// Slot index of this node within its parent's children.
    pub fn index_in_parent(&self) -> Option<usize> {
        let parent = self.parent()?;
        parent
            .children()
            .iter()
            .position(|c| c.as_node() == Some(self.id))
    }

    /// Parents from nearest to the root.
    pub fn ancestors(&self) -> Ancestors<'t> {
        Ancestors {
            tree: self.tree,
            next: self.data().parent,
        }
    }

    /// Every node below this one, in pre-order.
    pub fn descendants(&self) -> PreOrder<'t> {
        let mut iter = self.each_node();
        iter.next();
        iter
    }

    /// This node followed by its descendants, in pre-order.
    pub fn each_node(&self) -> PreOrder<'t> {
        PreOrder {
            tree: self.tree,
            stack: vec![self.id],
        }
    }

    /// End of the last heredoc body in this subtree, if any.
    pub fn heredoc_end(&self) -> Option<usize> {
        self.each_node()
            .filter_map(|n| n.heredoc_range())
            .map(|r| r.end)
            .max()
    }

    // ------------------------------------------------------------------------
    // Call helpers (`send` / `csend`)
    // ------------------------------------------------------------------------

    /// True for method call nodes.
    pub fn is_send(&self) -> bool {
        matches!(self.kind(), "send" | "csend")
    }

    /// Explicit receiver of a call; `None` for receiver-less calls.
    pub fn receiver(&self) -> Option<NodeRef<'t>> {
        if !self.is_send() {
            return None;
        }
        self.child_node(0)
    }

    /// Invoked method name of a call.
    pub fn method_name(&self) -> Option<&'t str> {
        if !self.is_send() {
            return None;
        }
        self.literal(1).and_then(Literal::as_symbol)
    }

    /// Argument nodes of a call.
    pub fn arguments(&self) -> Vec<NodeRef<'t>> {
        if !self.is_send() {
            return Vec::new();
        }
        self.child_nodes()
            .filter(|(i, _)| *i >= 2)
            .map(|(_, n)| n)
            .collect()
    }

    /// Byte range of the method name in a call, found by scanning the text
    /// after the receiver.
    pub fn selector_range(&self) -> Option<Span> {
        let name = self.method_name()?;
        let source = self.tree.source();
        let pos = match self.receiver() {
            Some(receiver) => {
                let mut pos = skip_whitespace(source, receiver.range().end);
                for op in ["&.", "::", "."] {
                    if source[pos..].starts_with(op) {
                        pos += op.len();
                        break;
                    }
                }
                skip_whitespace(source, pos)
            }
            None => self.range().start,
        };
        if !source[pos..].starts_with(name) {
            return None;
        }
        let end = pos + name.len();
        if end > self.range().end {
            return None;
        }
        Some(Span::new(pos, end))
    }

    /// For a `(const scope :Name)` node, the constant name.
    pub fn const_name(&self) -> Option<&'t str> {
        if !self.is("const") {
            return None;
        }
        self.literal(1).and_then(Literal::as_symbol)
    }

    /// True for `Name` or `::Name` with no further namespace.
    pub fn is_top_level_const(&self, name: &str) -> bool {
        if self.const_name() != Some(name) {
            return false;
        }
        match self.child_node(0) {
            None => true,
            Some(scope) => scope.is("cbase"),
        }
    }
}

fn skip_whitespace(source: &str, from: usize) -> usize {
    let rest = &source[from..];
    from + (rest.len() - rest.trim_start().len())
}

/// Iterator over a node's ancestors.
pub struct Ancestors<'t> {
    tree: &'t Tree,
    next: Option<NodeId>,
}

impl<'t> Iterator for Ancestors<'t> {
    type Item = NodeRef<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.nodes[id.index()].parent;
        Some(self.tree.node(id))
    }
}

/// Pre-order iterator over a subtree with an explicit stack.
pub struct PreOrder<'t> {
    tree: &'t Tree,
    stack: Vec<NodeId>,
}

impl<'t> Iterator for PreOrder<'t> {
    type Item = NodeRef<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = &self.tree.nodes[id.index()];
        self.stack
            .extend(node.children.iter().rev().filter_map(Child::as_node));
        Some(self.tree.node(id))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builds a [`Tree`] bottom-up: children are pushed before their parent.
pub struct TreeBuilder {
    path: String,
    source: String,
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new(path: impl Into<String>, source: impl Into<String>) -> Self {
        TreeBuilder {
            path: path.into(),
            source: source.into(),
            nodes: Vec::new(),
        }
    }

    fn check_range(&self, range: Span) -> SyntaxResult<()> {
        let len = self.source.len();
        if range.end > len
            || !self.source.is_char_boundary(range.start)
            || !self.source.is_char_boundary(range.end)
        {
            return Err(SyntaxError::InvalidRange { range, len });
        }
        Ok(())
    }

    /// Add a node whose node children were all pushed earlier.
    ///
    /// Sets each child's parent link. A child may be adopted only once.
    pub fn push(
        &mut self,
        kind: impl Into<String>,
        range: Span,
        heredoc: Option<Span>,
        children: Vec<Child>,
    ) -> SyntaxResult<NodeId> {
        self.check_range(range)?;
        if let Some(body) = heredoc {
            self.check_range(body)?;
        }
        let id = NodeId(self.nodes.len() as u32);
        for child in children.iter().filter_map(Child::as_node) {
            let slot = self
                .nodes
                .get(child.index())
                .ok_or(SyntaxError::UnknownNode { node: child.0 })?;
            if slot.parent.is_some() {
                return Err(SyntaxError::AlreadyAdopted { node: child.0 });
            }
        }
        for child in children.iter().filter_map(Child::as_node) {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(Node {
            kind: kind.into(),
            range,
            heredoc,
            children,
            parent: None,
        });
        Ok(id)
    }

    /// Finish with `root`; every other node must be reachable from it.
    pub fn finish(self, root: NodeId) -> SyntaxResult<Tree> {
        let root_node = self
            .nodes
            .get(root.index())
            .ok_or(SyntaxError::UnknownNode { node: root.0 })?;
        if root_node.parent.is_some() {
            return Err(SyntaxError::AlreadyAdopted { node: root.0 });
        }
        if let Some(i) = self
            .nodes
            .iter()
            .enumerate()
            .position(|(i, n)| i != root.index() && n.parent.is_none())
        {
            return Err(SyntaxError::Detached { node: i as u32 });
        }
        Ok(Tree {
            path: self.path,
            source: self.source,
            nodes: self.nodes,
            root,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Child {
        Child::Literal(Literal::Symbol(name.to_string()))
    }

    /// `user.should be_valid`
    fn should_tree() -> Tree {
        let source = "user.should be_valid";
        let mut b = TreeBuilder::new("a_spec.rb", source);
        let user = b
            .push(
                "send",
                Span::new(0, 4),
                None,
                vec![Child::Literal(Literal::Nil), sym("user")],
            )
            .unwrap();
        let matcher = b
            .push(
                "send",
                Span::new(12, 20),
                None,
                vec![Child::Literal(Literal::Nil), sym("be_valid")],
            )
            .unwrap();
        let should = b
            .push(
                "send",
                Span::new(0, 20),
                None,
                vec![Child::Node(user), sym("should"), Child::Node(matcher)],
            )
            .unwrap();
        b.finish(should).unwrap()
    }

    mod navigation_tests {
        use super::*;

        #[test]
        fn call_helpers() {
            let tree = should_tree();
            let root = tree.root();
            assert_eq!(root.method_name(), Some("should"));
            assert_eq!(root.receiver().unwrap().source(), "user");
            assert_eq!(root.arguments().len(), 1);
            assert_eq!(root.arguments()[0].source(), "be_valid");
            assert_eq!(root.selector_range(), Some(Span::new(5, 11)));
        }

        #[test]
        fn receiverless_call_has_no_receiver() {
            let tree = should_tree();
            let matcher = tree.root().arguments()[0];
            assert!(matcher.receiver().is_none());
            assert_eq!(matcher.selector_range(), Some(Span::new(12, 20)));
        }

        #[test]
        fn parent_links_match_children() {
            let tree = should_tree();
            for node in tree.root().descendants() {
                let parent = node.parent().unwrap();
                let index = node.index_in_parent().unwrap();
                assert_eq!(parent.children()[index].as_node(), Some(node.id()));
            }
            assert!(tree.root().parent().is_none());
        }

        #[test]
        fn pre_order_visits_root_first() {
            let tree = should_tree();
            let kinds: Vec<_> = tree.nodes().map(|n| n.source()).collect();
            assert_eq!(kinds, vec!["user.should be_valid", "user", "be_valid"]);
        }

        #[test]
        fn ancestors_walk_to_root() {
            let tree = should_tree();
            let user = tree.root().receiver().unwrap();
            let chain: Vec<_> = user.ancestors().map(|n| n.id()).collect();
            assert_eq!(chain, vec![tree.root().id()]);
        }
    }

    mod builder_tests {
        use super::*;

        #[test]
        fn rejects_range_past_end() {
            let mut b = TreeBuilder::new("a.rb", "abc");
            let err = b.push("int", Span::new(0, 4), None, vec![]).unwrap_err();
            assert!(matches!(err, SyntaxError::InvalidRange { len: 3, .. }));
        }

        #[test]
        fn rejects_double_adoption() {
            let mut b = TreeBuilder::new("a.rb", "ab");
            let leaf = b.push("int", Span::new(0, 1), None, vec![]).unwrap();
            b.push("begin", Span::new(0, 2), None, vec![Child::Node(leaf)])
                .unwrap();
            let err = b
                .push("begin", Span::new(0, 2), None, vec![Child::Node(leaf)])
                .unwrap_err();
            assert_eq!(err, SyntaxError::AlreadyAdopted { node: leaf.0 });
        }

        #[test]
        fn rejects_detached_nodes() {
            let mut b = TreeBuilder::new("a.rb", "ab");
            b.push("int", Span::new(0, 1), None, vec![]).unwrap();
            let root = b.push("int", Span::new(1, 2), None, vec![]).unwrap();
            assert_eq!(b.finish(root).unwrap_err(), SyntaxError::Detached { node: 0 });
        }
    }
}
