//! Runtime facts read back from the probe payload.
//!
//! The payload is a JSON object keyed by node identity (`"path:begin:end"`),
//! each value mapping request keys to a fact:
//!
//! ```json
//! {
//!   "spec/a_spec.rb:10:25": {
//!     "expect_available?": { "result": true, "context": "RSpec::ExampleGroups::Foo" },
//!     "broken": { "error": "NameError: undefined local variable" }
//!   }
//! }
//! ```
//!
//! A node that never ran (a skipped example, dead code) has no entry. Every
//! query about it answers "absent"; callers must read that as unknown, not
//! as false.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use respec_core::patch::Span;
use respec_syntax::NodeRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AnalysisError, AnalysisResult};

/// Stable identity of a node across the static and dynamic phases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdentity {
    pub path: String,
    pub range: Span,
}

impl NodeIdentity {
    pub fn new(path: impl Into<String>, range: Span) -> Self {
        NodeIdentity {
            path: path.into(),
            range,
        }
    }

    /// Identity of a node in its tree.
    pub fn of(node: NodeRef<'_>) -> Self {
        NodeIdentity::new(node.tree().path(), node.range())
    }

    /// Parse `"path:begin:end"`, splitting from the right so the path may
    /// itself contain colons.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.rsplitn(3, ':');
        let end: usize = parts.next()?.parse().ok()?;
        let begin: usize = parts.next()?.parse().ok()?;
        let path = parts.next()?;
        if path.is_empty() || begin > end {
            return None;
        }
        Some(NodeIdentity::new(path, Span::new(begin, end)))
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.range.start, self.range.end)
    }
}

/// What the probe recorded for one request key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeFact {
    /// Evaluated value (`null` for Ruby `nil`).
    #[serde(default)]
    pub result: Value,
    /// Class of the object the expression was evaluated against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Exception raised by the expression, if it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lookup from node identity to recorded facts. Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct RuntimeData {
    facts: HashMap<NodeIdentity, BTreeMap<String, RuntimeFact>>,
}

impl RuntimeData {
    /// No runtime information: every query answers "absent".
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode a probe payload.
    ///
    /// # Errors
    ///
    /// `AnalysisError::MalformedPayload` if the text is not the expected JSON
    /// shape or a key is not a node identity.
    pub fn load(raw: &str) -> AnalysisResult<Self> {
        let decoded: BTreeMap<String, BTreeMap<String, RuntimeFact>> = serde_json::from_str(raw)
            .map_err(|e| AnalysisError::MalformedPayload {
                message: e.to_string(),
            })?;

        let mut facts = HashMap::with_capacity(decoded.len());
        for (key, entries) in decoded {
            let identity = NodeIdentity::parse(&key).ok_or_else(|| {
                AnalysisError::MalformedPayload {
                    message: format!("invalid node identity '{}'", key),
                }
            })?;
            facts.insert(identity, entries);
        }
        Ok(RuntimeData { facts })
    }

    /// Number of nodes that ran.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Facts for an identity.
    pub fn facts_for(&self, identity: &NodeIdentity) -> Option<&BTreeMap<String, RuntimeFact>> {
        self.facts.get(identity)
    }

    /// The raw fact recorded for `key` on `node`, error or not.
    pub fn fact(&self, node: NodeRef<'_>, key: &str) -> Option<&RuntimeFact> {
        self.facts_for(&NodeIdentity::of(node))?.get(key)
    }

    /// The evaluated value of `key` on `node`, if it was recorded without error.
    pub fn get(&self, node: NodeRef<'_>, key: &str) -> Option<&Value> {
        self.fact(node, key)
            .filter(|fact| fact.error.is_none())
            .map(|fact| &fact.result)
    }

    /// Boolean view of [`get`](Self::get): `Some(truthiness)` when recorded.
    pub fn truthy(&self, node: NodeRef<'_>, key: &str) -> Option<bool> {
        self.get(node, key)
            .map(|value| !matches!(value, Value::Null | Value::Bool(false)))
    }

    /// Whether `node` was reached at runtime at all.
    pub fn run(&self, node: NodeRef<'_>) -> bool {
        self.facts.contains_key(&NodeIdentity::of(node))
    }

    /// Whether `key` was recorded on `node` without error.
    pub fn present(&self, node: NodeRef<'_>, key: &str) -> bool {
        self.get(node, key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use respec_syntax::parse_sexp;

    mod identity_tests {
        use super::*;

        #[test]
        fn display_and_parse() {
            let id = NodeIdentity::new("spec/a_spec.rb", Span::new(10, 25));
            assert_eq!(id.to_string(), "spec/a_spec.rb:10:25");
            assert_eq!(NodeIdentity::parse("spec/a_spec.rb:10:25"), Some(id));
        }

        #[test]
        fn path_may_contain_colons() {
            let id = NodeIdentity::parse("C:/work/a_spec.rb:1:2").unwrap();
            assert_eq!(id.path, "C:/work/a_spec.rb");
            assert_eq!(id.range, Span::new(1, 2));
        }

        #[test]
        fn rejects_malformed_keys() {
            assert_eq!(NodeIdentity::parse("a_spec.rb:1"), None);
            assert_eq!(NodeIdentity::parse(":1:2"), None);
            assert_eq!(NodeIdentity::parse("a.rb:x:2"), None);
            assert_eq!(NodeIdentity::parse("a.rb:5:2"), None);
        }
    }

    mod lookup_tests {
        use super::*;

        fn tree() -> respec_syntax::Tree {
            parse_sexp(
                "spec/a_spec.rb",
                "a.should b",
                "(send @0..10 (send @0..1 nil :a) :should (send @9..10 nil :b))",
            )
            .unwrap()
        }

        const PAYLOAD: &str = r#"{
            "spec/a_spec.rb:0:10": {
                "expect_available?": { "result": true, "context": "RSpec::ExampleGroups::Foo" },
                "nil_result": { "result": null },
                "broken": { "error": "NameError: boom" }
            }
        }"#;

        #[test]
        fn recorded_values() {
            let tree = tree();
            let data = RuntimeData::load(PAYLOAD).unwrap();
            let root = tree.root();
            assert!(data.run(root));
            assert_eq!(data.get(root, "expect_available?"), Some(&Value::Bool(true)));
            assert_eq!(data.truthy(root, "expect_available?"), Some(true));
            assert_eq!(
                data.fact(root, "expect_available?").unwrap().context.as_deref(),
                Some("RSpec::ExampleGroups::Foo")
            );
        }

        #[test]
        fn nil_result_is_present_but_falsy() {
            let tree = tree();
            let data = RuntimeData::load(PAYLOAD).unwrap();
            assert!(data.present(tree.root(), "nil_result"));
            assert_eq!(data.truthy(tree.root(), "nil_result"), Some(false));
        }

        #[test]
        fn recorded_error_is_not_present() {
            let tree = tree();
            let data = RuntimeData::load(PAYLOAD).unwrap();
            assert!(!data.present(tree.root(), "broken"));
            assert_eq!(data.get(tree.root(), "broken"), None);
            assert!(data.fact(tree.root(), "broken").unwrap().error.is_some());
        }

        #[test]
        fn unknown_node_is_absent() {
            let tree = tree();
            let data = RuntimeData::load(PAYLOAD).unwrap();
            let receiver = tree.root().receiver().unwrap();
            assert!(!data.run(receiver));
            assert!(!data.present(receiver, "expect_available?"));
            assert_eq!(data.truthy(receiver, "expect_available?"), None);
        }

        #[test]
        fn empty_data_answers_absent() {
            let tree = tree();
            let data = RuntimeData::empty();
            assert!(data.is_empty());
            assert!(!data.run(tree.root()));
        }

        #[test]
        fn rejects_garbled_payloads() {
            assert!(matches!(
                RuntimeData::load("not json"),
                Err(AnalysisError::MalformedPayload { .. })
            ));
            assert!(matches!(
                RuntimeData::load(r#"{"nope": {}}"#),
                Err(AnalysisError::MalformedPayload { .. })
            ));
        }
    }
}
