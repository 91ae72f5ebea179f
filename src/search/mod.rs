//! Walk search — sampling and rule extraction over the shared group graph
//!
//! Every searcher runs the same per-step cycle on a [`WalkState`]:
//! score with the transition model, project against the current group's
//! adjacency row, zero moves the trajectory forbids, renormalize.

mod driver;
mod model;
mod projection;
mod replay;
mod rules;
mod sampler;
mod verify;

pub use driver::{
    extract_all_walks, extract_rules, fingerprint, sample_walks, GeneratedWalk, SampleMetrics,
    SampleReport,
};
pub use model::{LaplacianModel, TransitionModel};
pub use projection::{constrain, project, ProjectOptions, Projection};
pub use replay::{replay_walk, EdgeWeights, ReplayOptions};
pub use rules::{extract_rule, ClosedWalk, Extraction, Rule, RuleConfig, SearchMode};
pub use sampler::{sample_walk, SampleConfig, SampledWalk};
pub use verify::{ConnectivityVerifier, StructuralVerifier, VerifiedWalk, VerifyError};

use crate::diffusion::{DiffusionGraph, GroupGraph};
use crate::trajectory::Trajectory;
use crate::tree::TreeError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Search setup errors
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("label not in the shared index space: {0}")]
    UnknownLabel(String),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Read-only view of the shared index space searchers walk over
#[derive(Debug, Clone)]
pub struct WalkSpace {
    labels: Vec<String>,
    lookup: HashMap<String, usize>,
    adjacency: DMatrix<f64>,
    base: Vec<usize>,
}

impl WalkSpace {
    pub fn new(graph: &GroupGraph) -> Self {
        Self {
            labels: graph.labels(),
            lookup: graph.index_lookup(),
            adjacency: graph.adjacency(),
            base: graph.base_indices(),
        }
    }

    pub fn of(diffusion: &DiffusionGraph) -> Self {
        Self::new(diffusion.graph())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn lookup(&self) -> &HashMap<String, usize> {
        &self.lookup
    }

    pub fn adjacency(&self) -> &DMatrix<f64> {
        &self.adjacency
    }

    /// Unsuffixed groups, the start points of every driver
    pub fn base_indices(&self) -> &[usize] {
        &self.base
    }

    pub fn index(&self, label: &str) -> Result<usize, SearchError> {
        self.lookup
            .get(label)
            .copied()
            .ok_or_else(|| SearchError::UnknownLabel(label.to_string()))
    }

    pub fn adjacency_row(&self, i: usize) -> DVector<f64> {
        self.adjacency.row(i).transpose()
    }

    pub fn one_hot(&self, i: usize) -> DVector<f64> {
        let mut v = DVector::zeros(self.len());
        v[i] = 1.0;
        v
    }
}

/// One scored transition `from → to`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeProb {
    pub from: String,
    pub to: String,
    pub prob: f64,
}

/// A partial walk: the unit searchers branch, queue and extend
#[derive(Debug, Clone)]
pub struct WalkState {
    pub trajectory: Trajectory,
    pub state: DVector<f64>,
    pub context: DVector<f64>,
    pub t: usize,
    pub edges: Vec<EdgeProb>,
}

impl WalkState {
    pub fn start(space: &WalkSpace, start: usize) -> Self {
        Self {
            trajectory: Trajectory::new(start),
            state: space.one_hot(start),
            context: DVector::zeros(space.len()),
            t: 0,
            edges: Vec::new(),
        }
    }

    /// Σ log p over the transitions taken so far
    pub fn log_prob(&self) -> f64 {
        self.edges.iter().map(|e| e.prob.ln()).sum()
    }

    /// Run one scoring cycle from the current group. Returns the constrained
    /// next-group distribution (`None` when nothing valid is left) and the
    /// model's new context.
    pub fn propose<M: TransitionModel + ?Sized>(
        &self,
        model: &M,
        space: &WalkSpace,
        options: &ProjectOptions,
    ) -> (Option<DVector<f64>>, DVector<f64>) {
        let cur = self.trajectory.last_head();
        let (update, context) = model.score(&self.state, &self.context, self.t);
        let raw = &self.state + update;
        let projected = project(&raw, &space.adjacency_row(cur), options);
        (constrain(projected, &self.trajectory, space.labels()), context)
    }

    /// Branch into `next`, recording the transition
    pub fn child(
        &self,
        space: &WalkSpace,
        trajectory: Trajectory,
        context: DVector<f64>,
        next: usize,
        prob: f64,
    ) -> Self {
        let mut edges = self.edges.clone();
        edges.push(EdgeProb {
            from: space.labels()[self.trajectory.last_head()].clone(),
            to: space.labels()[next].clone(),
            prob,
        });
        Self {
            trajectory,
            state: space.one_hot(next),
            context,
            t: self.t + 1,
            edges,
        }
    }
}

/// What writing a move into a trajectory did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Appended; the walk goes on
    Extended,
    /// Returned to the start under loop closure
    Closed,
    /// Immediate revisit of the last head
    SelfLoop,
    /// Append refused; trajectory untouched
    Rejected,
}

/// Write the move to `next` into `trajectory`
pub fn advance(trajectory: &mut Trajectory, next: usize, loop_back: bool) -> Advance {
    if next == trajectory.last_head() {
        trajectory.push_terminal(next);
        return Advance::SelfLoop;
    }
    if loop_back && next == trajectory.start() {
        trajectory.push_terminal(next);
        return Advance::Closed;
    }
    match trajectory.append(next) {
        Ok(()) => Advance::Extended,
        Err(e) => {
            log::debug!("move to {} rejected: {}", next, e);
            Advance::Rejected
        }
    }
}
