//! Shared group graph — which groups may bond to which
//!
//! Node insertion order is the shared index space used by every diffusion
//! state vector. Groups used k > 1 times by one monomer get k − 1 duplicate
//! nodes (`G:1`, `G:2`, …) sharing the base group's bonds.

use crate::tree::{split_label, suffixed, EdgeData};
use log::warn;
use nalgebra::DMatrix;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Directed multigraph over group labels
#[derive(Debug, Clone, Default)]
pub struct GroupGraph {
    graph: DiGraph<String, EdgeData>,
    index: HashMap<String, NodeIndex>,
}

/// Serialized group graph: labels in index order plus directed edges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    pub nodes: Vec<String>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub data: EdgeData,
}

impl GroupGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group (no-op if present); returns its index
    pub fn add_group(&mut self, label: &str) -> usize {
        if let Some(idx) = self.index.get(label) {
            return idx.index();
        }
        let idx = self.graph.add_node(label.to_string());
        self.index.insert(label.to_string(), idx);
        idx.index()
    }

    /// Directed edge; parallel edges are kept
    pub fn add_edge(&mut self, source: &str, target: &str, data: EdgeData) {
        let a = NodeIndex::new(self.add_group(source));
        let b = NodeIndex::new(self.add_group(target));
        self.graph.add_edge(a, b, data);
    }

    /// Edge in both directions
    pub fn add_bond(&mut self, a: &str, b: &str, data: EdgeData) {
        self.add_edge(a, b, data.clone());
        self.add_edge(b, a, data);
    }

    pub fn from_spec(spec: &GraphSpec) -> Self {
        let mut graph = Self::new();
        for label in &spec.nodes {
            graph.add_group(label);
        }
        for e in &spec.edges {
            graph.add_edge(&e.source, &e.target, e.data.clone());
        }
        graph
    }

    pub fn to_spec(&self) -> GraphSpec {
        GraphSpec {
            nodes: self.graph.node_weights().cloned().collect(),
            edges: self
                .graph
                .edge_references()
                .map(|e| GraphEdge {
                    source: self.graph[e.source()].clone(),
                    target: self.graph[e.target()].clone(),
                    data: e.weight().clone(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).map(|i| i.index())
    }

    pub fn label(&self, idx: usize) -> &str {
        &self.graph[NodeIndex::new(idx)]
    }

    /// Labels in index order
    pub fn labels(&self) -> Vec<String> {
        self.graph.node_weights().cloned().collect()
    }

    /// Label → position in the shared vector space
    pub fn index_lookup(&self) -> HashMap<String, usize> {
        self.graph
            .node_indices()
            .map(|i| (self.graph[i].clone(), i.index()))
            .collect()
    }

    /// Indices of groups without a multiplicity suffix (walk start points)
    pub fn base_indices(&self) -> Vec<usize> {
        self.graph
            .node_indices()
            .filter(|&i| split_label(&self.graph[i]).1 == 0)
            .map(|i| i.index())
            .collect()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Data of the first edge `source → target`, if any
    pub fn edge_data(&self, source: &str, target: &str) -> Option<&EdgeData> {
        let a = *self.index.get(source)?;
        let b = *self.index.get(target)?;
        self.graph
            .edges_connecting(a, b)
            .next()
            .map(|e| e.weight())
    }

    pub fn is_adjacent(&self, source: &str, target: &str) -> bool {
        self.edge_data(source, target).is_some()
    }

    /// Out-neighbours of a group, in index terms
    pub fn neighbors(&self, idx: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(idx), Direction::Outgoing)
            .map(|n| n.index())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Dense adjacency matrix; parallel edges add up
    pub fn adjacency(&self) -> DMatrix<f64> {
        let n = self.len();
        let mut adj = DMatrix::zeros(n, n);
        for e in self.graph.edge_references() {
            adj[(e.source().index(), e.target().index())] += 1.0;
        }
        adj
    }

    /// Give `label` `count − 1` duplicates with the base group's bonds and no
    /// edges anywhere inside `{label, label:1, …}`
    pub fn expand_multiplicity(&mut self, label: &str, count: usize) {
        if count <= 1 {
            return;
        }
        let Some(&orig) = self.index.get(label) else {
            warn!("group '{}' used {} times but absent from the group graph", label, count);
            return;
        };
        let dup_labels: Vec<String> = (1..count).map(|i| suffixed(label, i)).collect();
        let is_family = |g: &Self, n: NodeIndex| {
            n == orig || dup_labels.iter().any(|d| g.index.get(d) == Some(&n))
        };

        let outgoing: Vec<(NodeIndex, EdgeData)> = self
            .graph
            .edges_directed(orig, Direction::Outgoing)
            .filter(|e| !is_family(self, e.target()))
            .map(|e| (e.target(), e.weight().clone()))
            .collect();
        let incoming: Vec<(NodeIndex, EdgeData)> = self
            .graph
            .edges_directed(orig, Direction::Incoming)
            .filter(|e| !is_family(self, e.source()))
            .map(|e| (e.source(), e.weight().clone()))
            .collect();

        for dup in &dup_labels {
            if self.index.contains_key(dup) {
                continue;
            }
            let d = NodeIndex::new(self.add_group(dup));
            for (target, data) in &outgoing {
                self.graph.add_edge(d, *target, data.clone());
            }
            for (source, data) in &incoming {
                self.graph.add_edge(*source, d, data.clone());
            }
        }

        let family: Vec<NodeIndex> = std::iter::once(label.to_string())
            .chain(dup_labels.iter().cloned())
            .filter_map(|l| self.index.get(&l).copied())
            .collect();
        self.graph.retain_edges(|g, e| match g.edge_endpoints(e) {
            Some((a, b)) => !(family.contains(&a) && family.contains(&b)),
            None => true,
        });
    }
}
