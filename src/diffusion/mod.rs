//! Diffusion graph — many monomer walks in one shared index space
//!
//! Each input tree gets its own [`DiffusionProcess`]; all of them index their
//! state vectors through the label lookup of one multiplicity-expanded
//! [`GroupGraph`].

mod group_graph;
mod process;

pub use group_graph::{GraphEdge, GraphSpec, GroupGraph};
pub use process::{DiffusionConfig, DiffusionProcess, MASS_TOLERANCE};

use crate::tree::{split_label, Tree, TreeError};
use log::{debug, info};
use nalgebra::DMatrix;
use std::collections::HashMap;
use std::sync::Arc;

/// Diffusion errors
#[derive(Debug, thiserror::Error)]
pub enum DiffusionError {
    #[error("label not in the shared index space: {0}")]
    UnknownLabel(String),

    #[error("side-chain node '{0}' has descendants; branching through it is unsupported")]
    UnsupportedSideChainBranch(String),

    #[error("probability mass not conserved: expected {expected}, got {actual}")]
    MassNotConserved { expected: f64, actual: f64 },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// N diffusion processes over one shared group graph
#[derive(Debug, Clone)]
pub struct DiffusionGraph {
    graph: GroupGraph,
    lookup: Arc<HashMap<String, usize>>,
    adjacency: DMatrix<f64>,
    processes: Vec<DiffusionProcess>,
    t: usize,
}

impl DiffusionGraph {
    /// Expand `graph` for repeated groups, disambiguate every tree and start one
    /// process per tree
    pub fn new(
        trees: Vec<Tree>,
        mut graph: GroupGraph,
        config: &DiffusionConfig,
    ) -> Result<Self, DiffusionError> {
        let mut order: Vec<String> = Vec::new();
        let mut max_count: HashMap<String, usize> = HashMap::new();
        for tree in &trees {
            for idx in tree.preorder() {
                let base = split_label(&tree.node(idx).value).0;
                if !max_count.contains_key(base) {
                    order.push(base.to_string());
                    max_count.insert(base.to_string(), 0);
                }
            }
            for (label, count) in tree.label_counts() {
                let slot = max_count.entry(label).or_insert(0);
                *slot = (*slot).max(count);
            }
        }
        for label in &order {
            let count = max_count[label];
            if count > 1 {
                debug!("group '{}' used up to {} times in one monomer", label, count);
                graph.expand_multiplicity(label, count);
            }
        }

        let lookup = Arc::new(graph.index_lookup());
        let processes = trees
            .iter()
            .map(|tree| {
                DiffusionProcess::new(tree.disambiguate(), Arc::clone(&lookup), config.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;
        let adjacency = graph.adjacency();

        info!(
            "Diffusion graph: {} processes over {} groups ({} edges)",
            processes.len(),
            graph.len(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            lookup,
            adjacency,
            processes,
            t: 0,
        })
    }

    pub fn graph(&self) -> &GroupGraph {
        &self.graph
    }

    pub fn lookup(&self) -> &HashMap<String, usize> {
        &self.lookup
    }

    pub fn adjacency(&self) -> &DMatrix<f64> {
        &self.adjacency
    }

    pub fn processes(&self) -> &[DiffusionProcess] {
        &self.processes
    }

    pub fn labels(&self) -> Vec<String> {
        self.graph.labels()
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn t(&self) -> usize {
        self.t
    }

    pub fn base_indices(&self) -> Vec<usize> {
        self.graph.base_indices()
    }

    pub fn lookup_process(&self, dag_id: u64) -> Option<&DiffusionProcess> {
        self.processes.iter().find(|p| p.tree().dag_id == Some(dag_id))
    }

    pub fn reset(&mut self) {
        self.t = 0;
        for p in &mut self.processes {
            p.reset();
        }
    }

    /// Step every process once. Processes whose walk leaves the shared index
    /// space are skipped; anything else is fatal and leaves every process and
    /// `t` untouched.
    pub fn step(&mut self) -> Result<(), DiffusionError> {
        let mut pending = Vec::with_capacity(self.processes.len());
        for p in &self.processes {
            match p.next_step() {
                Ok(next) => pending.push(Some(next)),
                Err(DiffusionError::UnknownLabel(label)) => {
                    debug!("process {:?} skipped: '{}' not indexed", p.tree().dag_id, label);
                    pending.push(None);
                }
                Err(e) => return Err(e),
            }
        }
        for (p, next) in self.processes.iter_mut().zip(pending) {
            if let Some(next) = next {
                p.commit(next);
            }
        }
        self.t += 1;
        Ok(())
    }

    /// Per-process distributions (one row each), or their normalized sum as a
    /// single row
    pub fn get_state(&self, return_all: bool) -> DMatrix<f64> {
        let n = self.lookup.len();
        let mut all = DMatrix::zeros(self.processes.len(), n);
        for (i, p) in self.processes.iter().enumerate() {
            all.set_row(i, &p.state().transpose());
        }
        if return_all {
            return all;
        }
        let mut summed = DMatrix::from_fn(1, n, |_, j| all.column(j).sum());
        let total = summed.sum();
        if total > 0.0 {
            summed /= total;
        }
        summed
    }
}
