//! Evaluation path: the trace tree recorded during one evaluation call.
//!
//! Every resolution and operation opens a [`PathNode`] under the node that
//! triggered it. The finished tree is returned to the caller as the
//! explanation of how each value was obtained.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statute_core::Value;

/// Kind of a trace node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Requirements,
    Requirement,
    Action,
    Operation,
    Value,
    DirectValue,
    Resolve,
    ServiceEvaluation,
    /// A node kind sent by a remote engine that this crate does not know.
    #[serde(other)]
    Other,
}

/// Which resolution strategy produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveType {
    Claim,
    Local,
    Definition,
    Parameter,
    Output,
    Overwrite,
    Source,
    Service,
    None,
}

/// One node of the evaluation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_type: Option<ResolveType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PathNode>,
}

impl PathNode {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        PathNode {
            kind,
            name: name.into(),
            result: Value::Null,
            resolve_type: None,
            required: false,
            details: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// The `path` detail without its `$` sigil, if any.
    pub fn path(&self) -> Option<&str> {
        self.details
            .get("path")
            .and_then(|p| p.as_str())
            .filter(|p| !p.is_empty())
            .map(|p| p.strip_prefix('$').unwrap_or(p))
    }
}

/// Accumulator for the node stack of one evaluation call.
///
/// [`enter`](Trace::enter) opens a node below the current one; the node is
/// attached to its parent when it is closed with [`exit`](Trace::exit).
#[derive(Debug)]
pub struct Trace {
    root: PathNode,
    open: Vec<PathNode>,
}

impl Trace {
    pub fn new(root: PathNode) -> Self {
        Trace {
            root,
            open: Vec::new(),
        }
    }

    pub fn enter(&mut self, node: PathNode) {
        self.open.push(node);
    }

    /// The innermost open node, or the root.
    pub fn current(&mut self) -> &mut PathNode {
        match self.open.last_mut() {
            Some(node) => node,
            None => &mut self.root,
        }
    }

    /// Close the innermost open node and attach it to its parent.
    pub fn exit(&mut self) {
        if let Some(node) = self.open.pop() {
            self.current().children.push(node);
        }
    }

    /// Attach a finished subtree to the current node.
    pub fn attach(&mut self, node: PathNode) {
        self.current().children.push(node);
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Close every open node and return the root.
    pub fn finish(mut self) -> PathNode {
        while !self.open.is_empty() {
            self.exit();
        }
        self.root
    }
}

// ──────────────────────────────────────────────
// Value tree
// ──────────────────────────────────────────────

/// One entry of the flattened value tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueTreeEntry {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_type: Option<ResolveType>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub law: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, ValueTreeEntry>,
}

/// Flatten a trace into the externally sourced values it used.
///
/// Resolutions by claim, source, service or nothing at all are keyed by
/// their reference path; the first occurrence wins. A cross-service
/// evaluation replaces the entry for its path and nests the values the
/// other service resolved under `children`.
pub fn value_tree(root: &PathNode) -> BTreeMap<String, ValueTreeEntry> {
    let mut flat = BTreeMap::new();
    collect(root, &mut flat);
    flat
}

fn collect(node: &PathNode, into: &mut BTreeMap<String, ValueTreeEntry>) {
    let path = node.path().map(str::to_string);

    if let (NodeKind::ServiceEvaluation, Some(path)) = (node.kind, path.as_deref()) {
        let mut entry = ValueTreeEntry {
            value: node.result.clone(),
            resolve_type: Some(ResolveType::Service),
            required: node.required,
            service: detail_str(node, "service"),
            law: detail_str(node, "law"),
            details: node.details.clone(),
            children: BTreeMap::new(),
        };
        for child in &node.children {
            collect(child, &mut entry.children);
        }
        into.insert(path.to_string(), entry);
        return;
    }

    let external = matches!(
        node.resolve_type,
        Some(ResolveType::Service | ResolveType::Source | ResolveType::Claim | ResolveType::None)
    );
    if let (NodeKind::Resolve, true, Some(path)) = (node.kind, external, path) {
        into.entry(path).or_insert_with(|| ValueTreeEntry {
            value: node.result.clone(),
            resolve_type: node.resolve_type,
            required: node.required,
            service: None,
            law: None,
            details: node.details.clone(),
            children: BTreeMap::new(),
        });
    }

    for child in &node.children {
        collect(child, into);
    }
}

fn detail_str(node: &PathNode, key: &str) -> Option<String> {
    node.details
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(path: &str, rt: ResolveType, value: Value) -> PathNode {
        let mut node = PathNode::new(NodeKind::Resolve, format!("Resolving value: {}", path))
            .with_detail("path", path);
        node.resolve_type = Some(rt);
        node.result = value;
        node
    }

    #[test]
    fn trace_attaches_on_exit() {
        let mut trace = Trace::new(PathNode::new(NodeKind::Root, "evaluation"));
        trace.enter(PathNode::new(NodeKind::Action, "Evaluate action for a"));
        trace.enter(PathNode::new(NodeKind::Operation, "Operation: ADD"));
        trace.current().result = Value::Int(3);
        trace.exit();
        assert_eq!(trace.depth(), 1);
        trace.attach(PathNode::new(NodeKind::Value, "literal"));
        let root = trace.finish();

        assert_eq!(root.children.len(), 1);
        let action = &root.children[0];
        assert_eq!(action.kind, NodeKind::Action);
        assert_eq!(action.children.len(), 2);
        assert_eq!(action.children[0].result, Value::Int(3));
    }

    #[test]
    fn current_falls_back_to_root() {
        let mut trace = Trace::new(PathNode::new(NodeKind::Root, "evaluation"));
        trace.current().result = Value::Bool(true);
        trace.exit();
        assert_eq!(trace.finish().result, Value::Bool(true));
    }

    #[test]
    fn node_serializes_with_tags() {
        let node = resolve("$income", ResolveType::Source, Value::Int(100));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "resolve");
        assert_eq!(json["resolve_type"], "SOURCE");
        assert_eq!(json["details"]["path"], "$income");
        assert!(json.get("children").is_none());

        let back: PathNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn remote_node_kinds_deserialize() {
        let node: PathNode = serde_json::from_value(serde_json::json!({
            "type": "root",
            "name": "evaluation",
            "children": [
                {"type": "direct_value", "name": "Direct value assignment", "result": 5},
                {"type": "lookup", "name": "custom step"}
            ]
        }))
        .unwrap();
        assert_eq!(node.children[0].kind, NodeKind::DirectValue);
        assert_eq!(node.children[0].result, Value::Int(5));
        assert_eq!(node.children[1].kind, NodeKind::Other);
        assert_eq!(node.children[1].result, Value::Null);
    }

    #[test]
    fn value_tree_keeps_external_values() {
        let mut root = PathNode::new(NodeKind::Root, "evaluation");
        let mut action = PathNode::new(NodeKind::Action, "Evaluate action for x");
        action
            .children
            .push(resolve("$income", ResolveType::Source, Value::Int(100)));
        action
            .children
            .push(resolve("$income", ResolveType::Source, Value::Int(999)));
        action
            .children
            .push(resolve("$THRESHOLD", ResolveType::Definition, Value::Int(18)));
        action
            .children
            .push(resolve("$partner", ResolveType::None, Value::Null));
        root.children.push(action);

        let tree = value_tree(&root);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree["income"].value, Value::Int(100));
        assert_eq!(tree["partner"].resolve_type, Some(ResolveType::None));
    }

    #[test]
    fn value_tree_nests_service_evaluations() {
        let mut nested_root = PathNode::new(NodeKind::Root, "evaluation");
        nested_root
            .children
            .push(resolve("$birth_date", ResolveType::Source, Value::Text("2000-01-01".into())));

        let mut service = PathNode::new(NodeKind::ServiceEvaluation, "Service call: RvIG.age")
            .with_detail("path", "$age")
            .with_detail("service", "RvIG")
            .with_detail("law", "wet_brp");
        service.result = Value::Int(25);
        service.children.push(nested_root);

        let mut outer = resolve("$age", ResolveType::Service, Value::Int(25));
        outer.children.push(service);
        let mut root = PathNode::new(NodeKind::Root, "evaluation");
        root.children.push(outer);

        let tree = value_tree(&root);
        let age = &tree["age"];
        assert_eq!(age.service.as_deref(), Some("RvIG"));
        assert_eq!(age.law.as_deref(), Some("wet_brp"));
        assert_eq!(age.value, Value::Int(25));
        assert_eq!(
            age.children["birth_date"].value,
            Value::Text("2000-01-01".into())
        );
    }
}
