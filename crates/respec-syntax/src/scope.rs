// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Scope tags and the example-group context rule.
//!
//! Each scope-introducing node (module, class, singleton class, method
//! definitions, blocks) maps to a [`ScopeTag`]. A [`ScopeStack`] holds the
//! tags of the open scopes around a position, outermost first, and answers
//! whether code at that position runs as an instance of an example group.
//!
//! # Block Classification
//!
//! A block's tag depends on the call it is attached to, in this order:
//!
//! 1. `RSpec.configure { }` (or `::RSpec.configure`) is a configuration block
//! 2. any other call with an explicit receiver is a plain block, whatever the
//!    method name (`foo.describe { }` is not an example group)
//! 3. `describe`, `context`, `shared_examples`, ... open an example group
//! 4. `it`/`specify`, `let`/`subject` and `before`/`after`/`around` are
//!    refined to example, helper and hook tags
//! 5. everything else is a plain block
//!
//! Refined tags behave exactly like plain blocks in the context rule.
//!
//! # Extent
//!
//! A tag covers every child of its node, not only the body: the call a
//! block is attached to, a class name and superclass, and the receiver of
//! `def self.x` all see the tag of the node they belong to.

use std::fmt;

use serde::Serialize;

use crate::tree::NodeRef;

/// Method names that open an example group.
pub const EXAMPLE_GROUP_METHODS: &[&str] = &[
    "describe",
    "context",
    "feature",
    "example_group",
    "shared_examples",
    "shared_context",
    "shared_examples_for",
    "share_examples_for",
    "xdescribe",
    "xcontext",
    "xfeature",
    "fdescribe",
    "fcontext",
    "ffeature",
];

const EXAMPLE_METHODS: &[&str] = &[
    "it",
    "specify",
    "example",
    "scenario",
    "its",
    "focus",
    "fit",
    "fspecify",
    "fexample",
    "fscenario",
    "xit",
    "xspecify",
    "xexample",
    "xscenario",
    "skip",
    "pending",
];

const HELPER_METHODS: &[&str] = &["let", "let!", "subject", "subject!"];

const HOOK_METHODS: &[&str] = &[
    "before",
    "after",
    "around",
    "prepend_before",
    "append_before",
    "prepend_after",
    "append_after",
];

/// Symbolic classification of one lexical nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeTag {
    Module,
    Class,
    SingletonClass,
    Method,
    SingletonMethod,
    PlainBlock,
    ExampleGroup,
    Example,
    Helper,
    Hook,
    Configuration,
}

impl ScopeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeTag::Module => "module",
            ScopeTag::Class => "class",
            ScopeTag::SingletonClass => "singleton_class",
            ScopeTag::Method => "method",
            ScopeTag::SingletonMethod => "singleton_method",
            ScopeTag::PlainBlock => "plain_block",
            ScopeTag::ExampleGroup => "example_group",
            ScopeTag::Example => "example",
            ScopeTag::Helper => "helper",
            ScopeTag::Hook => "hook",
            ScopeTag::Configuration => "configuration",
        }
    }

    /// Tags the context rule treats as a plain block.
    pub fn is_block_like(&self) -> bool {
        matches!(
            self,
            ScopeTag::PlainBlock | ScopeTag::Example | ScopeTag::Helper | ScopeTag::Hook
        )
    }

    /// Tags that open a non-instance context.
    pub fn is_class_like(&self) -> bool {
        matches!(self, ScopeTag::Class | ScopeTag::SingletonClass)
    }

    /// The tag a node introduces, or `None` for nodes that open no scope.
    pub fn of(node: NodeRef<'_>) -> Option<ScopeTag> {
        match node.kind() {
            "module" => Some(ScopeTag::Module),
            "class" => Some(ScopeTag::Class),
            "sclass" => Some(ScopeTag::SingletonClass),
            "def" => Some(ScopeTag::Method),
            "defs" => Some(ScopeTag::SingletonMethod),
            "block" | "numblock" => Some(classify_block(node)),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn classify_block(block: NodeRef<'_>) -> ScopeTag {
    let Some(call) = block.child_node(0).filter(|n| n.is_send()) else {
        return ScopeTag::PlainBlock;
    };
    let method = call.method_name().unwrap_or_default();

    if let Some(receiver) = call.receiver() {
        if receiver.is_top_level_const("RSpec") && method == "configure" {
            return ScopeTag::Configuration;
        }
        return ScopeTag::PlainBlock;
    }

    if EXAMPLE_GROUP_METHODS.contains(&method) {
        ScopeTag::ExampleGroup
    } else if EXAMPLE_METHODS.contains(&method) {
        ScopeTag::Example
    } else if HELPER_METHODS.contains(&method) {
        ScopeTag::Helper
    } else if HOOK_METHODS.contains(&method) {
        ScopeTag::Hook
    } else {
        ScopeTag::PlainBlock
    }
}

// ============================================================================
// ScopeStack
// ============================================================================

/// Open scopes around a position, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeStack(Vec<ScopeTag>);

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack(Vec::new())
    }

    pub fn push(&mut self, tag: ScopeTag) {
        self.0.push(tag);
    }

    pub fn pop(&mut self) -> Option<ScopeTag> {
        self.0.pop()
    }

    pub fn tags(&self) -> &[ScopeTag] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether code at this nesting runs inside an example-group instance.
    ///
    /// Rules, first match wins:
    ///
    /// 1. Anchored at the last example group: false if a class or singleton
    ///    class follows it, else true iff a method or block follows it.
    /// 2. The same, anchored at the last configuration block.
    /// 3. Outermost scope is a method: true unless a class follows.
    /// 4. Anchored at the last module: false if a class follows, else true
    ///    iff a method follows.
    /// 5. Otherwise false.
    ///
    /// Rules 3 and 4 assume top-level and module methods are called from
    /// example groups. That is an over-approximation; rules that need
    /// certainty confirm it with runtime facts.
    pub fn in_example_group_context(&self) -> bool {
        let tags = self.tags();

        if let Some(rest) = after_last(tags, ScopeTag::ExampleGroup) {
            return instance_context_after_anchor(rest);
        }
        if let Some(rest) = after_last(tags, ScopeTag::Configuration) {
            return instance_context_after_anchor(rest);
        }
        if tags.first() == Some(&ScopeTag::Method) {
            return !tags[1..].iter().any(ScopeTag::is_class_like);
        }
        if let Some(rest) = after_last(tags, ScopeTag::Module) {
            return !rest.iter().any(ScopeTag::is_class_like)
                && rest.contains(&ScopeTag::Method);
        }
        false
    }
}

impl From<Vec<ScopeTag>> for ScopeStack {
    fn from(tags: Vec<ScopeTag>) -> Self {
        ScopeStack(tags)
    }
}

fn after_last(tags: &[ScopeTag], anchor: ScopeTag) -> Option<&[ScopeTag]> {
    tags.iter().rposition(|t| *t == anchor).map(|i| &tags[i + 1..])
}

fn instance_context_after_anchor(rest: &[ScopeTag]) -> bool {
    if rest.iter().any(ScopeTag::is_class_like) {
        return false;
    }
    rest.iter()
        .any(|t| *t == ScopeTag::Method || t.is_block_like())
}

// ============================================================================
// Tests
// ============================================================================
