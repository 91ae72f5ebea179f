//! Tree model — one monomer as an arena of group instances
//!
//! Nodes live in a flat `Vec` and refer to each other by `NodeIdx`.
//! The root always has `id == 0`. A child entry that points back at the root
//! is a closure edge: it turns the main chain into a cycle for the walk without
//! giving the root a parent.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Index of a node inside its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIdx(pub usize);

/// Free-form bond metadata carried on every edge (e.g. attachment sites)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    #[serde(flatten)]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl EdgeData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}

/// One group instance
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Identity within the tree; 0 is reserved for the root
    pub id: u32,
    /// Group label, possibly carrying a `:n` multiplicity suffix
    pub value: String,
    pub children: Vec<(NodeIdx, EdgeData)>,
    pub parent: Option<(NodeIdx, EdgeData)>,
    /// Reached from the parent through a branch rather than the main chain
    pub side_chain: bool,
}

/// A rooted monomer tree
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    pub dag_id: Option<u64>,
}

/// Tree construction and canonicalization errors
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("node id {0} already present in tree")]
    DuplicateId(u32),

    #[error("node id 0 is reserved for the root")]
    ReservedId,

    #[error("unknown node id: {0}")]
    UnknownId(u32),

    #[error("node {0} has more than one parent")]
    MultipleParents(u32),

    #[error("tree has no root (no node with id 0)")]
    MissingRoot,

    #[error("node {0} is not reachable from the root")]
    Unreachable(u32),

    #[error("node {0} keeps more than one main-chain child after ordering")]
    MultipleMainChildren(u32),

    #[error("walk seed {0} is outside the enumerable seed space")]
    SeedOutOfRange(u64),

    #[error("seed space overflows u64 at main-chain node {0}")]
    SeedSpaceOverflow(u32),

    #[error("permutation does not match the side-chain children of main-chain node {0}")]
    InvalidPermutation(u32),

    #[error("augmented walk order diverges from the canonical order at seed 0")]
    AugmentMismatch,
}

impl Tree {
    /// Create a tree holding only its root
    pub fn new(root_value: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node {
                id: 0,
                value: root_value.into(),
                children: Vec::new(),
                parent: None,
                side_chain: false,
            }],
            dag_id: None,
        }
    }

    pub fn with_dag_id(mut self, dag_id: u64) -> Self {
        self.dag_id = Some(dag_id);
        self
    }

    pub fn root(&self) -> NodeIdx {
        NodeIdx(0)
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.0]
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        &mut self.nodes[idx.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = NodeIdx> {
        (0..self.nodes.len()).map(NodeIdx)
    }

    pub fn find(&self, id: u32) -> Option<NodeIdx> {
        self.nodes.iter().position(|n| n.id == id).map(NodeIdx)
    }

    /// True for child entries that close the main chain back onto the root
    pub fn is_sentinel(&self, idx: NodeIdx) -> bool {
        self.nodes[idx.0].id == 0
    }

    /// Attach a new node under `parent`
    pub fn add_child(
        &mut self,
        parent: NodeIdx,
        id: u32,
        value: impl Into<String>,
        edge: EdgeData,
        side_chain: bool,
    ) -> Result<NodeIdx, TreeError> {
        if id == 0 {
            return Err(TreeError::ReservedId);
        }
        if self.find(id).is_some() {
            return Err(TreeError::DuplicateId(id));
        }
        let idx = NodeIdx(self.nodes.len());
        self.nodes.push(Node {
            id,
            value: value.into(),
            children: Vec::new(),
            parent: Some((parent, edge.clone())),
            side_chain,
        });
        self.nodes[parent.0].children.push((idx, edge));
        Ok(idx)
    }

    /// Close the main chain: `leaf` gets the root as a (non-owning) child
    pub fn close_to_root(&mut self, leaf: NodeIdx, edge: EdgeData) {
        self.nodes[leaf.0].children.push((NodeIdx(0), edge));
    }

    /// Children excluding closure edges
    pub fn real_children(&self, idx: NodeIdx) -> impl Iterator<Item = NodeIdx> + '_ {
        self.nodes[idx.0]
            .children
            .iter()
            .map(|(c, _)| *c)
            .filter(move |c| !self.is_sentinel(*c))
    }

    /// Children flagged as side chains, in insertion order
    pub fn side_children(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        self.nodes[idx.0]
            .children
            .iter()
            .map(|(c, _)| *c)
            .filter(|c| self.nodes[c.0].side_chain)
            .collect()
    }

    /// Pre-order traversal (node, then children in insertion order), closure edges skipped
    pub fn preorder(&self) -> Vec<NodeIdx> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(cur) = stack.pop() {
            order.push(cur);
            let children: Vec<NodeIdx> = self.real_children(cur).collect();
            stack.extend(children.into_iter().rev());
        }
        order
    }

    /// Label occurrence counts (after disambiguation, counts of base labels)
    pub fn label_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for idx in self.preorder() {
            let (base, _) = split_label(&self.nodes[idx.0].value);
            *counts.entry(base.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Return a copy whose 2nd, 3rd, … occurrences of a label carry `:1`, `:2`, …
    pub fn disambiguate(&self) -> Tree {
        let mut out = self.clone();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for idx in self.preorder() {
            let base = split_label(&self.nodes[idx.0].value).0.to_string();
            let seen = counts.entry(base.clone()).or_insert(0);
            out.nodes[idx.0].value = suffixed(&base, *seen);
            *seen += 1;
        }
        out
    }

    /// Build a tree from its flat serialized form
    pub fn from_spec(spec: &TreeSpec) -> Result<Self, TreeError> {
        let root_spec = spec
            .nodes
            .iter()
            .find(|n| n.id == 0)
            .ok_or(TreeError::MissingRoot)?;
        let mut values: HashMap<u32, &str> = HashMap::new();
        for n in &spec.nodes {
            if values.insert(n.id, n.value.as_str()).is_some() {
                return Err(TreeError::DuplicateId(n.id));
            }
        }

        let mut children: HashMap<u32, Vec<&EdgeSpec>> = HashMap::new();
        let mut has_parent: HashMap<u32, u32> = HashMap::new();
        for e in &spec.edges {
            if !values.contains_key(&e.parent) {
                return Err(TreeError::UnknownId(e.parent));
            }
            if !values.contains_key(&e.child) {
                return Err(TreeError::UnknownId(e.child));
            }
            if e.child != 0 && has_parent.insert(e.child, e.parent).is_some() {
                return Err(TreeError::MultipleParents(e.child));
            }
            children.entry(e.parent).or_default().push(e);
        }

        let mut tree = Tree::new(root_spec.value.clone());
        tree.dag_id = spec.dag_id;
        let mut queue = VecDeque::from([(0u32, NodeIdx(0))]);
        while let Some((id, idx)) = queue.pop_front() {
            for e in children.get(&id).map(|v| v.as_slice()).unwrap_or(&[]) {
                if e.child == 0 {
                    tree.close_to_root(idx, e.data.clone());
                    continue;
                }
                let value = values[&e.child];
                let child = tree.add_child(idx, e.child, value, e.data.clone(), e.side_chain)?;
                queue.push_back((e.child, child));
            }
        }

        if let Some(missing) = spec.nodes.iter().find(|n| tree.find(n.id).is_none()) {
            return Err(TreeError::Unreachable(missing.id));
        }
        Ok(tree)
    }

    /// Flatten back into the serialized form
    pub fn to_spec(&self) -> TreeSpec {
        let nodes = self
            .nodes
            .iter()
            .map(|n| NodeSpec { id: n.id, value: n.value.clone() })
            .collect();
        let mut edges = Vec::new();
        for n in &self.nodes {
            for (c, data) in &n.children {
                let child = &self.nodes[c.0];
                edges.push(EdgeSpec {
                    parent: n.id,
                    child: child.id,
                    side_chain: child.id != 0 && child.side_chain,
                    data: data.clone(),
                });
            }
        }
        TreeSpec { dag_id: self.dag_id, nodes, edges }
    }

    /// Labels in arena order
    pub fn values(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.value.as_str()).collect()
    }
}

/// Serialized tree: flat node and edge lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSpec {
    #[serde(default)]
    pub dag_id: Option<u64>,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: u32,
    pub value: String,
}

/// `child == 0` marks a closure edge back to the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub parent: u32,
    pub child: u32,
    #[serde(default)]
    pub side_chain: bool,
    #[serde(default)]
    pub data: EdgeData,
}

/// Split `"G2:3"` into `("G2", 3)`; a bare label has suffix 0
pub fn split_label(label: &str) -> (&str, usize) {
    match label.rsplit_once(':') {
        Some((base, n)) => match n.parse::<usize>() {
            Ok(n) => (base, n),
            Err(_) => (label, 0),
        },
        None => (label, 0),
    }
}

/// Inverse of [`split_label`]
pub fn suffixed(base: &str, n: usize) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}:{}", base, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_with_repeats() -> Tree {
        let mut tree = Tree::new("L3");
        let a = tree.add_child(tree.root(), 1, "S20", EdgeData::new(), false).unwrap();
        let b = tree.add_child(a, 2, "S20", EdgeData::new(), false).unwrap();
        tree.add_child(a, 3, "P14", EdgeData::new(), true).unwrap();
        let c = tree.add_child(b, 4, "S20", EdgeData::new(), false).unwrap();
        tree.close_to_root(c, EdgeData::new());
        tree
    }

    #[test]
    fn test_split_label() {
        assert_eq!(split_label("G2"), ("G2", 0));
        assert_eq!(split_label("G2:3"), ("G2", 3));
        assert_eq!(split_label("odd:name"), ("odd:name", 0));
        assert_eq!(suffixed("G2", 0), "G2");
        assert_eq!(suffixed("G2", 2), "G2:2");
    }

    #[test]
    fn test_reserved_and_duplicate_ids() {
        let mut tree = Tree::new("R");
        assert!(matches!(
            tree.add_child(tree.root(), 0, "X", EdgeData::new(), false),
            Err(TreeError::ReservedId)
        ));
        tree.add_child(tree.root(), 1, "X", EdgeData::new(), false).unwrap();
        assert!(matches!(
            tree.add_child(tree.root(), 1, "Y", EdgeData::new(), false),
            Err(TreeError::DuplicateId(1))
        ));
    }

    #[test]
    fn test_preorder_skips_closure() {
        let tree = chain_with_repeats();
        let ids: Vec<u32> = tree.preorder().iter().map(|i| tree.node(*i).id).collect();
        assert_eq!(ids, vec![0, 1, 2, 4, 3]);
    }

    #[test]
    fn test_disambiguate_is_pure() {
        let tree = chain_with_repeats();
        let renamed = tree.disambiguate();
        assert_eq!(tree.values(), vec!["L3", "S20", "S20", "P14", "S20"]);
        assert_eq!(renamed.values(), vec!["L3", "S20", "S20:1", "P14", "S20:2"]);
        assert_eq!(renamed.label_counts()["S20"], 3);
        // idempotent on an already suffixed tree
        assert_eq!(renamed.disambiguate(), renamed);
    }

    #[test]
    fn test_spec_roundtrip() {
        let tree = chain_with_repeats().with_dag_id(7);
        let spec = tree.to_spec();
        let json = serde_json::to_string(&spec).unwrap();
        let back = Tree::from_spec(&serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(back.dag_id, Some(7));
        assert_eq!(back.values(), tree.values());
        assert!(back.node(NodeIdx(3)).side_chain);
        let leaf = back.find(4).unwrap();
        assert!(back.node(leaf).children.iter().any(|(c, _)| back.is_sentinel(*c)));
    }

    #[test]
    fn test_spec_errors() {
        let spec = TreeSpec {
            dag_id: None,
            nodes: vec![NodeSpec { id: 1, value: "A".into() }],
            edges: vec![],
        };
        assert!(matches!(Tree::from_spec(&spec), Err(TreeError::MissingRoot)));

        let spec = TreeSpec {
            dag_id: None,
            nodes: vec![
                NodeSpec { id: 0, value: "R".into() },
                NodeSpec { id: 1, value: "A".into() },
                NodeSpec { id: 2, value: "B".into() },
            ],
            edges: vec![EdgeSpec { parent: 0, child: 1, side_chain: false, data: EdgeData::new() }],
        };
        assert!(matches!(Tree::from_spec(&spec), Err(TreeError::Unreachable(2))));
    }
}
