//! Rule extraction — systematic search for trajectory extensions
//!
//! Two modes share the scoring cycle:
//! - depth-bounded: expand every move above `min_thresh` until the target
//!   depth, then emit the single best move if it reaches `max_thresh`
//! - best-first: pop the highest cumulative log-probability walk, try every
//!   legal move, verify, and collect walks that close back to their start

use super::{
    advance, Advance, EdgeProb, ProjectOptions, StructuralVerifier, TransitionModel, WalkSpace,
    WalkState,
};
use crate::trajectory::Trajectory;
use crate::tree::Tree;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Rule extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub loop_back: bool,
    /// A depth-bounded rule needs its best move at least this likely
    pub max_thresh: f64,
    /// Moves below this are not expanded in depth-bounded mode
    pub min_thresh: f64,
    /// Largest rule depth the driver asks for
    pub max_rule_depth: usize,
    /// Stop after this many results (unbounded when `None`)
    pub num_generate: Option<usize>,
    pub projection: ProjectOptions,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            loop_back: true,
            max_thresh: 0.9,
            min_thresh: 0.1,
            max_rule_depth: 3,
            num_generate: None,
            projection: ProjectOptions::default(),
        }
    }
}

impl RuleConfig {
    fn limit_reached(&self, found: usize) -> bool {
        self.num_generate.is_some_and(|n| found >= n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Emit rules whose extension happens at this step count (≥ 2)
    DepthBounded(usize),
    BestFirst,
}

/// `source` extended by one confident move
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub depth: usize,
    pub source: Trajectory,
    pub extended: Trajectory,
    pub edges: Vec<EdgeProb>,
    /// Probability of the final move
    pub probability: f64,
}

/// A verified walk that returned to its start
#[derive(Debug, Clone)]
pub struct ClosedWalk {
    pub trajectory: Trajectory,
    pub tree: Tree,
    pub edges: Vec<EdgeProb>,
    pub log_prob: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub rules: Vec<Rule>,
    pub walks: Vec<ClosedWalk>,
}

/// Best-first queue entry; higher log-probability first, then earlier insertion
struct Frontier {
    log_prob: f64,
    seq: u64,
    walk: WalkState,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.log_prob
            .total_cmp(&other.log_prob)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Search from `starts` in the given mode. The verifier is consulted in
/// best-first mode only.
pub fn extract_rule<M, V>(
    model: &M,
    space: &WalkSpace,
    verifier: &V,
    starts: &[usize],
    mode: SearchMode,
    config: &RuleConfig,
) -> Extraction
where
    M: TransitionModel + ?Sized,
    V: StructuralVerifier + ?Sized,
{
    match mode {
        SearchMode::DepthBounded(depth) => Extraction {
            rules: starts
                .iter()
                .flat_map(|&s| depth_bounded(model, space, s, depth, config))
                .collect(),
            walks: Vec::new(),
        },
        SearchMode::BestFirst => Extraction {
            rules: Vec::new(),
            walks: best_first(model, space, verifier, starts, config),
        },
    }
}

fn depth_bounded<M>(
    model: &M,
    space: &WalkSpace,
    start: usize,
    depth: usize,
    config: &RuleConfig,
) -> Vec<Rule>
where
    M: TransitionModel + ?Sized,
{
    let mut rules = Vec::new();
    if depth < 2 {
        return rules;
    }
    let mut stack = vec![WalkState::start(space, start)];
    while let Some(walk) = stack.pop() {
        if config.limit_reached(rules.len()) {
            break;
        }
        let (dist, context) = walk.propose(model, space, &config.projection);
        let Some(dist) = dist else { continue };
        let t = walk.t + 1;

        if t + 1 >= depth {
            let (best, p) = dist.argmax();
            if p < config.max_thresh {
                continue;
            }
            let mut extended = walk.trajectory.clone();
            if advance(&mut extended, best, config.loop_back) == Advance::Rejected {
                continue;
            }
            debug!("depth {} rule {:?} with p={:.3}", depth, extended.to_strings(), p);
            let child = walk.child(space, extended, context, best, p);
            rules.push(Rule {
                depth,
                source: walk.trajectory,
                extended: child.trajectory,
                edges: child.edges,
                probability: p,
            });
            continue;
        }

        for (next, &p) in dist.iter().enumerate() {
            if p <= 0.0 || p < config.min_thresh {
                continue;
            }
            let mut trajectory = walk.trajectory.clone();
            if advance(&mut trajectory, next, config.loop_back) == Advance::Extended {
                stack.push(walk.child(space, trajectory, context.clone(), next, p));
            }
        }
    }
    rules
}

fn best_first<M, V>(
    model: &M,
    space: &WalkSpace,
    verifier: &V,
    starts: &[usize],
    config: &RuleConfig,
) -> Vec<ClosedWalk>
where
    M: TransitionModel + ?Sized,
    V: StructuralVerifier + ?Sized,
{
    let mut found = Vec::new();
    let mut seq = 0u64;
    let mut queue = BinaryHeap::new();
    for &s in starts {
        queue.push(Frontier {
            log_prob: 0.0,
            seq,
            walk: WalkState::start(space, s),
        });
        seq += 1;
    }

    let mut expanded = 0usize;
    while let Some(Frontier { walk, .. }) = queue.pop() {
        if config.limit_reached(found.len()) {
            break;
        }
        expanded += 1;
        let (dist, context) = walk.propose(model, space, &config.projection);
        let Some(dist) = dist else { continue };

        for (next, &p) in dist.iter().enumerate() {
            if p <= 0.0 {
                continue;
            }
            let mut trajectory = walk.trajectory.clone();
            let done = match advance(&mut trajectory, next, true) {
                Advance::Extended => false,
                Advance::Closed => true,
                Advance::SelfLoop | Advance::Rejected => continue,
            };
            let names = trajectory.to_names(space.labels());
            let verified = match verifier.verify(&names, done) {
                Ok(v) => v,
                Err(e) => {
                    debug!("candidate {:?} dropped: {}", names, e);
                    continue;
                }
            };
            let child = walk.child(space, trajectory, context.clone(), next, p);
            if done {
                let log_prob = child.log_prob();
                found.push(ClosedWalk {
                    trajectory: child.trajectory,
                    tree: verified.tree,
                    edges: child.edges,
                    log_prob,
                });
                if config.limit_reached(found.len()) {
                    break;
                }
            } else {
                queue.push(Frontier {
                    log_prob: child.log_prob(),
                    seq,
                    walk: child,
                });
                seq += 1;
            }
        }
        if expanded % 1000 == 0 {
            info!(
                "best-first: {} expanded, {} queued, {} found",
                expanded,
                queue.len(),
                found.len()
            );
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::GroupGraph;
    use crate::search::{ConnectivityVerifier, LaplacianModel};
    use crate::tree::EdgeData;

    /// A-B-C-A triangle with a pendant D on B
    fn space() -> WalkSpace {
        let mut g = GroupGraph::new();
        for (a, b) in [("A", "B"), ("B", "C"), ("C", "A"), ("B", "D")] {
            g.add_bond(a, b, EdgeData::new());
        }
        WalkSpace::new(&g)
    }

    #[test]
    fn test_frontier_order() {
        let space = space();
        let mk = |log_prob, seq| Frontier { log_prob, seq, walk: WalkState::start(&space, 0) };
        let mut heap = BinaryHeap::new();
        heap.push(mk(-2.0, 0));
        heap.push(mk(-0.5, 1));
        heap.push(mk(-0.5, 2));
        heap.push(mk(0.0, 3));
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|f| f.seq)).collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
    }

    #[test]
    fn test_best_first_finds_closed_walks() {
        let space = space();
        let model = LaplacianModel::random_walk(space.adjacency()).unwrap();
        let verifier = ConnectivityVerifier::new(&space);
        let config = RuleConfig::default();
        let out = extract_rule(&model, &space, &verifier, &[0], SearchMode::BestFirst, &config);
        assert!(!out.walks.is_empty());
        for w in &out.walks {
            assert!(w.trajectory.is_closed());
            assert_eq!(w.trajectory.start(), 0);
        }
        // B is popped first (ties go to the earlier entry) and closes at once
        assert_eq!(out.walks[0].trajectory.to_strings(), vec!["0", "1", "0"]);
        assert!((out.walks[0].log_prob - (0.5f64.ln() + (1.0f64 / 3.0).ln())).abs() < 1e-9);
    }

    #[test]
    fn test_best_first_respects_limit() {
        let space = space();
        let model = LaplacianModel::random_walk(space.adjacency()).unwrap();
        let verifier = ConnectivityVerifier::new(&space);
        let config = RuleConfig { num_generate: Some(2), ..RuleConfig::default() };
        let out = extract_rule(&model, &space, &verifier, &[0, 1], SearchMode::BestFirst, &config);
        assert_eq!(out.walks.len(), 2);
    }

    #[test]
    fn test_depth_bounded_emits_confident_moves() {
        let space = space();
        let model = LaplacianModel::random_walk(space.adjacency()).unwrap();
        let verifier = ConnectivityVerifier::new(&space);
        // from D the only move is back to B
        let config = RuleConfig { max_thresh: 0.9, min_thresh: 0.1, ..RuleConfig::default() };
        let mode = SearchMode::DepthBounded(2);
        let out = extract_rule(&model, &space, &verifier, &[3], mode, &config);
        assert_eq!(out.rules.len(), 1);
        let rule = &out.rules[0];
        assert_eq!(rule.source.to_strings(), vec!["3"]);
        assert_eq!(rule.extended.to_strings(), vec!["3", "1"]);
        assert_eq!(rule.probability, 1.0);

        // from A both moves are 0.5: nothing reaches max_thresh
        let out = extract_rule(&model, &space, &verifier, &[0], mode, &config);
        assert!(out.rules.is_empty());
    }

    #[test]
    fn test_depth_three_expands_then_emits() {
        let space = space();
        let model = LaplacianModel::random_walk(space.adjacency()).unwrap();
        let verifier = ConnectivityVerifier::new(&space);
        let config = RuleConfig { max_thresh: 0.9, min_thresh: 0.1, ..RuleConfig::default() };
        // B -> D is expanded; from D the return to B has p = 1 and closes the loop
        let mode = SearchMode::DepthBounded(3);
        let out = extract_rule(&model, &space, &verifier, &[1], mode, &config);
        assert_eq!(out.rules.len(), 1);
        assert_eq!(out.rules[0].source.to_strings(), vec!["1", "3"]);
        assert_eq!(out.rules[0].extended.to_strings(), vec!["1", "3", "1"]);
        assert!(out.rules[0].extended.is_closed());
        assert_eq!(out.rules[0].edges.len(), 2);
        assert!(out.rules.iter().all(|r| r.depth == 3 && r.probability >= 0.9));

        // without loop closure the return folds D into B's excursion
        let open = RuleConfig { loop_back: false, ..config };
        let out = extract_rule(&model, &space, &verifier, &[1], mode, &open);
        assert_eq!(out.rules.len(), 1);
        assert_eq!(out.rules[0].extended.to_strings(), vec!["1[->3]"]);
    }
}
