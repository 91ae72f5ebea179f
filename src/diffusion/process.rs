//! Diffusion process — a particle walking one monomer
//!
//! The particle moves non-lazily over the tree with its main chain closed
//! into a cycle:
//! - on the main chain it continues to the next main-chain node or descends
//!   an unvisited side chain
//! - on a side chain it descends until the leaf, then climbs back out
//!
//! The default mode replays the canonical walk deterministically; `split`
//! mode spreads probability mass over children instead.

use super::DiffusionError;
use crate::tree::{CanonicalWalk, NodeIdx, Tree};
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Largest tolerated drift in total probability mass per step
pub const MASS_TOLERANCE: f64 = 1e-6;

/// How a diffusion process steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffusionConfig {
    /// Let mass enter side chains in split mode (otherwise it is dropped there)
    pub side_chains: bool,
    /// Probabilistic branching instead of canonical-walk replay
    pub split: bool,
    /// Canonical walk variant; negative walks the main chain backwards
    pub dfs_seed: i64,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            side_chains: false,
            split: false,
            dfs_seed: 0,
        }
    }
}

impl DiffusionConfig {
    /// Probabilistic branching with side chains enabled
    pub fn branching() -> Self {
        Self {
            side_chains: true,
            split: true,
            dfs_seed: 0,
        }
    }
}

/// A computed but not yet applied tick
#[derive(Debug, Clone)]
pub(crate) struct PendingStep {
    state: DVector<f64>,
    frontier: BTreeMap<NodeIdx, f64>,
}

#[derive(Debug, Clone)]
pub struct DiffusionProcess {
    tree: Tree,
    lookup: Arc<HashMap<String, usize>>,
    config: DiffusionConfig,
    walk: CanonicalWalk,
    dfs_order: Vec<NodeIdx>,
    t: usize,
    state: DVector<f64>,
    frontier: BTreeMap<NodeIdx, f64>,
}

impl DiffusionProcess {
    pub fn new(
        mut tree: Tree,
        lookup: Arc<HashMap<String, usize>>,
        config: DiffusionConfig,
    ) -> Result<Self, DiffusionError> {
        let walk = CanonicalWalk::new(&mut tree)?;
        let dfs_order = if config.split {
            CanonicalWalk::dfs_order(&tree, None)
        } else {
            walk.walk(&tree, config.dfs_seed)?
        };
        let n = lookup.len();
        let mut proc = Self {
            tree,
            lookup,
            config,
            walk,
            dfs_order,
            t: 0,
            state: DVector::zeros(n),
            frontier: BTreeMap::new(),
        };
        proc.reset();
        Ok(proc)
    }

    /// Back to t = 0 with unit mass on the root
    pub fn reset(&mut self) {
        self.t = 0;
        self.state = DVector::zeros(self.lookup.len());
        let root = self.tree.root();
        if let Some(&i) = self.lookup.get(&self.tree.node(root).value) {
            self.state[i] = 1.0;
        }
        self.frontier = BTreeMap::from([(root, 1.0)]);
    }

    /// Advance one tick. On error the process keeps its previous state.
    pub fn step(&mut self) -> Result<(), DiffusionError> {
        let next = self.next_step()?;
        self.commit(next);
        Ok(())
    }

    /// Compute the next tick without applying it
    pub(crate) fn next_step(&self) -> Result<PendingStep, DiffusionError> {
        let mut next: BTreeMap<NodeIdx, f64> = BTreeMap::new();
        let mut dropped = 0.0;
        let expected = if self.config.split {
            for (&cur, &p) in &self.frontier {
                let node = self.tree.node(cur);
                if node.side_chain {
                    if !self.config.side_chains {
                        dropped += p;
                        continue;
                    }
                    if self.tree.real_children(cur).next().is_some() {
                        return Err(DiffusionError::UnsupportedSideChainBranch(node.value.clone()));
                    }
                    match &node.parent {
                        Some((parent, _)) => *next.entry(*parent).or_insert(0.0) += p,
                        None => dropped += p,
                    }
                } else if node.children.is_empty() {
                    debug!("mass {:.4} absorbed at childless main-chain node '{}'", p, node.value);
                    dropped += p;
                } else {
                    let share = p / node.children.len() as f64;
                    for (c, _) in &node.children {
                        *next.entry(*c).or_insert(0.0) += share;
                    }
                }
            }
            self.frontier.values().sum::<f64>()
        } else {
            let node = self.dfs_order[(self.t + 1) % self.dfs_order.len()];
            next.insert(node, 1.0);
            1.0
        };

        let mut state = DVector::<f64>::zeros(self.lookup.len());
        for (&node, &p) in &next {
            let label = &self.tree.node(node).value;
            let i = *self
                .lookup
                .get(label)
                .ok_or_else(|| DiffusionError::UnknownLabel(label.clone()))?;
            state[i] += p;
        }
        let actual = state.sum() + dropped;
        if (actual - expected).abs() > MASS_TOLERANCE {
            return Err(DiffusionError::MassNotConserved { expected, actual });
        }

        Ok(PendingStep { state, frontier: next })
    }

    pub(crate) fn commit(&mut self, next: PendingStep) {
        self.state = next.state;
        self.frontier = next.frontier;
        self.t += 1;
    }

    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    pub fn t(&self) -> usize {
        self.t
    }

    pub fn frontier(&self) -> &BTreeMap<NodeIdx, f64> {
        &self.frontier
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn canonical_walk(&self) -> &CanonicalWalk {
        &self.walk
    }

    /// The node sequence replayed in deterministic mode
    pub fn dfs_order(&self) -> &[NodeIdx] {
        &self.dfs_order
    }

    /// Labels along [`dfs_order`](Self::dfs_order)
    pub fn walk_labels(&self) -> Vec<&str> {
        self.dfs_order
            .iter()
            .map(|i| self.tree.node(*i).value.as_str())
            .collect()
    }

    pub fn num_nodes(&self) -> usize {
        self.dfs_order.len()
    }

    pub fn config(&self) -> &DiffusionConfig {
        &self.config
    }
}
