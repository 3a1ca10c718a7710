// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Point queries about the context a single node runs in.
//!
//! [`StaticContextInspector`] rebuilds the scope stack for one node by
//! walking its parent links, without scanning the rest of the file. Every
//! scope-introducing ancestor contributes its tag, whichever child slot the
//! node hangs from, so the answer matches [`crate::scan`] from the root.

use crate::scope::{ScopeStack, ScopeTag};
use crate::tree::NodeRef;

/// Context queries for one node.
#[derive(Debug, Clone)]
pub struct StaticContextInspector<'t> {
    node: NodeRef<'t>,
    scopes: ScopeStack,
}

impl<'t> StaticContextInspector<'t> {
    pub fn new(node: NodeRef<'t>) -> Self {
        let mut tags: Vec<ScopeTag> = node.ancestors().filter_map(ScopeTag::of).collect();
        tags.reverse();
        StaticContextInspector {
            node,
            scopes: ScopeStack::from(tags),
        }
    }

    pub fn node(&self) -> NodeRef<'t> {
        self.node
    }

    /// Open scopes around the node, outermost first.
    pub fn scopes(&self) -> &ScopeStack {
        &self.scopes
    }

    pub fn in_example_group_context(&self) -> bool {
        self.scopes.in_example_group_context()
    }

    /// Whether `expect(...)` can be called here without monkey patching.
    pub fn non_monkey_patch_expectation_available(&self) -> bool {
        self.in_example_group_context()
    }

    /// Whether `allow(...)` / `receive` can be called here without monkey
    /// patching.
    pub fn non_monkey_patch_mock_available(&self) -> bool {
        self.in_example_group_context()
    }
}
