//! Per-node runtime analysis requests.
//!
//! A registry belongs to one [`respec_syntax::Tree`]. Rules call
//! [`AnalysisRegistry::register`] with a node, a key naming the fact they
//! want, and a Ruby expression that computes it. Keys are unique per node;
//! several rules asking for the same fact with the same expression share one
//! request.

use std::collections::BTreeMap;
use std::fmt;

use respec_syntax::{NodeId, NodeRef};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, AnalysisResult};

/// What the expression is evaluated against at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvalTarget {
    /// The value of the wrapped expression.
    #[serde(rename = "self")]
    Object,
    /// The instance the wrapped expression runs in.
    #[serde(rename = "context")]
    Context,
}

impl EvalTarget {
    /// Name used in the probe call.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalTarget::Object => "self",
            EvalTarget::Context => "context",
        }
    }
}

impl fmt::Display for EvalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One expression to evaluate in a node's runtime context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub target: EvalTarget,
    pub code: String,
}

/// Requests collected for one tree.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRegistry {
    requests: BTreeMap<NodeId, BTreeMap<String, AnalysisRequest>>,
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for `code` to be evaluated against `target` when `node` runs,
    /// recorded under `key`.
    ///
    /// # Errors
    ///
    /// `AnalysisError::ConflictingRequest` if `key` is already registered on
    /// `node` with a different request. Registering an identical request
    /// again is a no-op.
    pub fn register(
        &mut self,
        node: NodeRef<'_>,
        key: impl Into<String>,
        code: impl Into<String>,
        target: EvalTarget,
    ) -> AnalysisResult<()> {
        let key = key.into();
        let request = AnalysisRequest {
            target,
            code: code.into(),
        };
        let entries = self.requests.entry(node.id()).or_default();
        match entries.get(&key) {
            Some(existing) if *existing == request => Ok(()),
            Some(_) => Err(AnalysisError::ConflictingRequest {
                node: format!("{} at {}", node.kind(), node.range()),
                key,
            }),
            None => {
                debug!(node = %node.range(), key = %key, "registered analysis request");
                entries.insert(key, request);
                Ok(())
            }
        }
    }

    /// Requests on one node, by key.
    pub fn requests_for(&self, node: NodeId) -> Option<&BTreeMap<String, AnalysisRequest>> {
        self.requests.get(&node)
    }

    /// All nodes with requests, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &BTreeMap<String, AnalysisRequest>)> {
        self.requests.iter().map(|(id, reqs)| (*id, reqs))
    }

    /// Number of nodes with at least one request.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use respec_syntax::parse_sexp;

    fn tree() -> respec_syntax::Tree {
        parse_sexp(
            "a_spec.rb",
            "a.should b",
            "(send @0..10 (send @0..1 nil :a) :should (send @9..10 nil :b))",
        )
        .unwrap()
    }

    #[test]
    fn identical_request_is_a_no_op() {
        let tree = tree();
        let mut registry = AnalysisRegistry::new();
        registry
            .register(tree.root(), "expect_available?", "respond_to?(:expect)", EvalTarget::Context)
            .unwrap();
        registry
            .register(tree.root(), "expect_available?", "respond_to?(:expect)", EvalTarget::Context)
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.requests_for(tree.root().id()).unwrap().len(), 1);
    }

    #[test]
    fn different_request_under_same_key_conflicts() {
        let tree = tree();
        let mut registry = AnalysisRegistry::new();
        registry
            .register(tree.root(), "k", "1", EvalTarget::Context)
            .unwrap();
        let err = registry
            .register(tree.root(), "k", "1", EvalTarget::Object)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ConflictingRequest { ref key, .. } if key == "k"));
    }

    #[test]
    fn keys_accumulate_per_node() {
        let tree = tree();
        let receiver = tree.root().receiver().unwrap();
        let mut registry = AnalysisRegistry::new();
        registry.register(tree.root(), "a", "1", EvalTarget::Context).unwrap();
        registry.register(tree.root(), "b", "2", EvalTarget::Object).unwrap();
        registry.register(receiver, "a", "3", EvalTarget::Object).unwrap();
        assert_eq!(registry.len(), 2);
        let keys: Vec<_> = registry
            .requests_for(tree.root().id())
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn target_names() {
        assert_eq!(EvalTarget::Object.to_string(), "self");
        assert_eq!(serde_json::to_string(&EvalTarget::Context).unwrap(), "\"context\"");
    }
}
