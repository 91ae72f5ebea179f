//! Walk sampler — one stochastic trajectory from a start group

use super::{advance, Advance, ProjectOptions, TransitionModel, WalkSpace, WalkState};
use crate::trajectory::Trajectory;
use log::debug;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleConfig {
    /// A walk only succeeds by returning to its start
    pub loop_back: bool,
    /// Without loop closure, stop successfully once no move beats this
    pub min_thresh: f64,
    pub projection: ProjectOptions,
    /// Novel walks wanted by the driver
    pub num_generate: usize,
    /// Driver gives up after this many samples
    pub max_attempts: usize,
    /// Hard bound on moves in a single walk
    pub max_steps: usize,
    /// Seed for reproducible runs; entropy otherwise
    pub rng_seed: Option<u64>,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            loop_back: true,
            min_thresh: 0.1,
            projection: ProjectOptions::default(),
            num_generate: 15,
            max_attempts: 10_000,
            max_steps: 1_000,
            rng_seed: None,
        }
    }
}

impl SampleConfig {
    /// Open-ended walks that stop when the model runs out of confident moves
    pub fn open() -> Self {
        Self {
            loop_back: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SampledWalk {
    pub trajectory: Trajectory,
    pub good: bool,
    pub log_prob: f64,
}

/// Sample one walk from `start`.
///
/// Success is a return to `start` under loop closure, or (without it) running
/// out of moves above `min_thresh`. A self-loop draw or a rejected append ends
/// the walk unsuccessfully.
pub fn sample_walk<M, R>(
    model: &M,
    space: &WalkSpace,
    start: usize,
    config: &SampleConfig,
    rng: &mut R,
) -> SampledWalk
where
    M: TransitionModel + ?Sized,
    R: Rng + ?Sized,
{
    let mut walk = WalkState::start(space, start);
    let mut good = false;
    for _ in 0..config.max_steps {
        let (dist, context) = walk.propose(model, space, &config.projection);
        let dist = match dist {
            Some(d) if d.max() > config.min_thresh => d,
            _ => {
                good = !config.loop_back;
                break;
            }
        };
        let next = match WeightedIndex::new(dist.iter().copied()) {
            Ok(w) => w.sample(rng),
            Err(e) => {
                debug!("cannot draw from distribution: {}", e);
                break;
            }
        };

        let mut trajectory = walk.trajectory.clone();
        let outcome = advance(&mut trajectory, next, config.loop_back);
        walk = walk.child(space, trajectory, context, next, dist[next]);
        match outcome {
            Advance::Extended => {}
            Advance::Closed => {
                good = true;
                break;
            }
            Advance::SelfLoop | Advance::Rejected => break,
        }
    }
    let log_prob = walk.log_prob();
    SampledWalk {
        trajectory: walk.trajectory,
        good,
        log_prob,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::GroupGraph;
    use crate::search::LaplacianModel;
    use crate::tree::EdgeData;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ring() -> WalkSpace {
        let mut g = GroupGraph::new();
        for (a, b) in [("A", "B"), ("B", "C"), ("C", "D"), ("D", "A"), ("B", "E")] {
            g.add_bond(a, b, EdgeData::new());
        }
        WalkSpace::new(&g)
    }

    #[test]
    fn test_loop_back_good_only_when_closed() {
        let space = ring();
        let model = LaplacianModel::random_walk(space.adjacency()).unwrap();
        let config = SampleConfig {
            min_thresh: 0.0,
            ..SampleConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let mut closed = 0;
        for _ in 0..50 {
            let walk = sample_walk(&model, &space, 0, &config, &mut rng);
            assert!(walk.trajectory.expand().len() <= 2 * config.max_steps + 1);
            assert_eq!(walk.good, walk.trajectory.is_closed());
            if walk.good {
                closed += 1;
                assert_eq!(walk.trajectory.start(), 0);
                assert!(walk.log_prob <= 0.0);
            }
        }
        assert!(closed > 0);
    }

    #[test]
    fn test_open_walk_stops_below_threshold() {
        let space = ring();
        let model = LaplacianModel::random_walk(space.adjacency()).unwrap();
        // every move from A has probability 0.5
        let config = SampleConfig {
            min_thresh: 0.6,
            ..SampleConfig::open()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let walk = sample_walk(&model, &space, 0, &config, &mut rng);
        assert!(walk.good);
        assert_eq!(walk.trajectory.len(), 1);
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let space = ring();
        let model = LaplacianModel::random_walk(space.adjacency()).unwrap();
        let config = SampleConfig::default();
        let a = sample_walk(&model, &space, 1, &config, &mut StdRng::seed_from_u64(42));
        let b = sample_walk(&model, &space, 1, &config, &mut StdRng::seed_from_u64(42));
        assert_eq!(a.trajectory, b.trajectory);
        assert_eq!(a.good, b.good);
    }
}
