//! Walk replay — score a known monomer's canonical walk edge by edge

use super::{constrain, project, ProjectOptions, SearchError, TransitionModel, WalkSpace};
use crate::diffusion::DiffusionProcess;
use crate::trajectory::Trajectory;
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayOptions {
    /// Floor for recorded edge weights
    pub eps: f64,
    /// Record every weight in both directions
    pub bidirectional: bool,
    /// Keep the masked per-step distributions
    pub record_states: bool,
    pub projection: ProjectOptions,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            eps: 1e-6,
            bidirectional: true,
            record_states: false,
            projection: ProjectOptions::default(),
        }
    }
}

/// Edge weights along a replayed walk
#[derive(Debug, Clone)]
pub struct EdgeWeights {
    /// `weights[(a, b)]` = model probability of stepping `a → b`
    pub weights: DMatrix<f64>,
    /// Distributions after forbidden moves are masked, one per step; the
    /// first is the one-hot start
    pub states: Vec<DVector<f64>>,
}

/// Replay `process`'s canonical walk through `model`, recording the projected
/// probability of every step actually taken
pub fn replay_walk<M>(
    model: &M,
    space: &WalkSpace,
    process: &DiffusionProcess,
    options: &ReplayOptions,
) -> Result<EdgeWeights, SearchError>
where
    M: TransitionModel + ?Sized,
{
    let n = space.len();
    let order = process
        .walk_labels()
        .into_iter()
        .map(|label| space.index(label))
        .collect::<Result<Vec<_>, _>>()?;
    let mut weights = DMatrix::zeros(n, n);
    let mut states = Vec::new();
    let Some(&start) = order.first() else {
        return Ok(EdgeWeights { weights, states });
    };

    let mut state = space.one_hot(start);
    let mut context = DVector::zeros(n);
    let mut trajectory = Trajectory::new(start);
    let mut prev = start;
    if options.record_states {
        states.push(state.clone());
    }
    for (t, &cur) in order.iter().enumerate().skip(1) {
        let (update, next_context) = model.score(&state, &context, t - 1);
        context = next_context;
        let row = space.adjacency_row(prev);
        let projected = project(&(&state + update), &row, &options.projection);
        if options.record_states {
            let masked = constrain(projected.clone(), &trajectory, space.labels())
                .unwrap_or_else(|| DVector::zeros(n));
            states.push(masked);
        }
        let w = projected[cur].max(options.eps);
        weights[(prev, cur)] = w;
        if options.bidirectional {
            weights[(cur, prev)] = w;
        }
        state = space.one_hot(cur);
        prev = cur;
        if let Err(e) = trajectory.append(cur) {
            debug!("replay of {:?}: {}", process.tree().dag_id, e);
        }
    }
    Ok(EdgeWeights { weights, states })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::{DiffusionConfig, DiffusionGraph, GroupGraph};
    use crate::search::LaplacianModel;
    use crate::tree::{EdgeData, Tree};

    fn setup() -> (DiffusionGraph, WalkSpace, LaplacianModel) {
        let mut g = GroupGraph::new();
        g.add_bond("L3", "S20", EdgeData::new());
        g.add_bond("S20", "P14", EdgeData::new());
        g.add_bond("P14", "L3", EdgeData::new());
        g.add_bond("S20", "S18", EdgeData::new());

        // L3 -> S20 (side S18) -> P14 -> (L3)
        let mut tree = Tree::new("L3").with_dag_id(11);
        let s20 = tree.add_child(tree.root(), 1, "S20", EdgeData::new(), false).unwrap();
        tree.add_child(s20, 3, "S18", EdgeData::new(), true).unwrap();
        let p14 = tree.add_child(s20, 2, "P14", EdgeData::new(), false).unwrap();
        tree.close_to_root(p14, EdgeData::new());

        let dg = DiffusionGraph::new(vec![tree], g, &DiffusionConfig::default()).unwrap();
        let space = WalkSpace::of(&dg);
        let model = LaplacianModel::random_walk(space.adjacency()).unwrap();
        (dg, space, model)
    }

    #[test]
    fn test_replay_records_walk_edges() {
        let (dg, space, model) = setup();
        let proc = dg.lookup_process(11).unwrap();
        assert_eq!(proc.walk_labels(), vec!["L3", "S20", "S18", "S20", "P14"]);

        let out = replay_walk(&model, &space, proc, &ReplayOptions::default()).unwrap();
        let (l3, s20, s18, p14) = (0, 1, 3, 2);
        assert!((out.weights[(l3, s20)] - 0.5).abs() < 1e-12);
        assert!((out.weights[(s18, s20)] - 1.0).abs() < 1e-12);
        // the climb back out of S18 overwrites the mirrored descent weight
        assert!((out.weights[(s20, s18)] - 1.0).abs() < 1e-12);
        assert!((out.weights[(p14, s20)] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(out.weights[(l3, p14)], 0.0);
        assert!(out.states.is_empty());
    }

    #[test]
    fn test_replay_states_and_directed_weights() {
        let (dg, space, model) = setup();
        let proc = dg.lookup_process(11).unwrap();
        let options = ReplayOptions {
            bidirectional: false,
            record_states: true,
            ..ReplayOptions::default()
        };
        let out = replay_walk(&model, &space, proc, &options).unwrap();
        assert_eq!(out.states.len(), 5);
        assert_eq!(out.weights[(1, 0)], 0.0);
        for s in &out.states {
            assert!((s.sum() - 1.0).abs() < 1e-9);
        }
    }
}
