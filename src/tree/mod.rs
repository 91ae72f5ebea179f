//! Monomer trees — the structure every walk is derived from
//!
//! A tree is a rooted arena of group instances. Canonicalization fixes one
//! main chain through it; the canonical walk enumerator turns the canonical
//! tree into a seed-indexed family of depth-first visiting orders.

mod node;
mod chain;
mod order;

pub use node::{
    split_label, suffixed, EdgeData, EdgeSpec, Node, NodeIdx, NodeSpec, Tree, TreeError, TreeSpec,
};
pub use order::{factorial, nth_permutation, permutation_rank, CanonicalWalk};
