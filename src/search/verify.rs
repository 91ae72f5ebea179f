//! Structural verification — is a named trajectory a buildable monomer?
//!
//! Searchers hand every candidate to a [`StructuralVerifier`]. Rejections are
//! classified so drivers can count them; they never abort a run.

use super::WalkSpace;
use crate::trajectory::{Trajectory, TrajectoryError};
use crate::tree::{EdgeData, NodeIdx, Tree, TreeError};
use nalgebra::DMatrix;
use std::collections::HashMap;

/// Verification outcome classes
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("groups {0} and {1} are not connected in the group graph")]
    UnknownConnectivity(String, String),

    #[error("chemically invalid: {0}")]
    ChemicallyInvalid(String),

    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl VerifyError {
    /// Walk-level rejection (as opposed to chemistry)
    pub fn is_walk_invalid(&self) -> bool {
        !matches!(self, VerifyError::ChemicallyInvalid(_))
    }
}

/// A verified trajectory rebuilt as a tree, plus its `(parent, child)` id edges
#[derive(Debug, Clone)]
pub struct VerifiedWalk {
    pub tree: Tree,
    pub edges: Vec<(u32, u32)>,
}

pub trait StructuralVerifier: Sync {
    /// `names` is a label-rendered trajectory; with `loop_back` its final token
    /// must return to the start and becomes the closure edge
    fn verify(&self, names: &[String], loop_back: bool) -> Result<VerifiedWalk, VerifyError>;
}

/// Accepts any trajectory whose consecutive groups are adjacent in the shared
/// group graph
#[derive(Debug, Clone)]
pub struct ConnectivityVerifier {
    lookup: HashMap<String, usize>,
    labels: Vec<String>,
    adjacency: DMatrix<f64>,
}

impl ConnectivityVerifier {
    pub fn new(space: &WalkSpace) -> Self {
        Self {
            lookup: space.lookup().clone(),
            labels: space.labels().to_vec(),
            adjacency: space.adjacency().clone(),
        }
    }

    fn check(&self, a: usize, b: usize) -> Result<(), VerifyError> {
        if self.adjacency[(a, b)] == 0.0 {
            return Err(VerifyError::UnknownConnectivity(
                self.labels[a].clone(),
                self.labels[b].clone(),
            ));
        }
        Ok(())
    }
}

impl StructuralVerifier for ConnectivityVerifier {
    fn verify(&self, names: &[String], loop_back: bool) -> Result<VerifiedWalk, VerifyError> {
        let traj = Trajectory::from_names(names, &self.lookup)?;
        let mut tokens = traj.tokens();
        if loop_back {
            if !traj.is_closed() {
                return Err(TrajectoryError::Malformed(names.join(" ")).into());
            }
            tokens = &tokens[..tokens.len() - 1];
        }

        let mut tree = Tree::new(self.labels[tokens[0].head].clone());
        let mut edges = Vec::new();
        let mut next_id = 1u32;
        let mut prev: Option<(NodeIdx, usize)> = None;
        for token in tokens {
            let head = match prev {
                None => tree.root(),
                Some((parent, parent_group)) => {
                    self.check(parent_group, token.head)?;
                    let label = self.labels[token.head].clone();
                    let idx = tree.add_child(parent, next_id, label, EdgeData::new(), false)?;
                    edges.push((tree.node(parent).id, next_id));
                    next_id += 1;
                    idx
                }
            };
            for path in &token.excursions {
                let (mut at, mut at_group) = (head, token.head);
                for &group in path {
                    self.check(at_group, group)?;
                    let label = self.labels[group].clone();
                    let idx = tree.add_child(at, next_id, label, EdgeData::new(), true)?;
                    edges.push((tree.node(at).id, next_id));
                    next_id += 1;
                    at = idx;
                    at_group = group;
                }
            }
            prev = Some((head, token.head));
        }

        if loop_back {
            if let Some((last, last_group)) = prev {
                if last != tree.root() {
                    self.check(last_group, traj.start())?;
                    tree.close_to_root(last, EdgeData::new());
                    edges.push((tree.node(last).id, 0));
                }
            }
        }
        Ok(VerifiedWalk { tree, edges })
    }
}
