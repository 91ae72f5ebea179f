//! Polywalk — canonical walks over group-contribution graphs
//!
//! Monomers are rooted trees of chemical groups. Each tree gets one
//! canonical depth-first walk, the walks diffuse over a shared group graph,
//! and searchers extend bracketed walk trajectories into new monomers and
//! grammar-like rules.

pub mod tree;
pub mod diffusion;
pub mod trajectory;
pub mod search;
pub mod storage;

pub use tree::{CanonicalWalk, Tree, TreeError};
pub use diffusion::{DiffusionConfig, DiffusionGraph, DiffusionProcess, GroupGraph};
pub use trajectory::{Token, Trajectory, TrajectoryError};
pub use search::{LaplacianModel, StructuralVerifier, TransitionModel, WalkSpace};
pub use storage::{MonomerSet, RuleTable};
