//! Canonical walk enumeration
//!
//! A walk visits side chains before the main-chain child, descends each side
//! chain and climbs back out along the same path. The seed space is
//! `{side-chain permutation per main-chain node} × {start offset} × {direction}`:
//! `seed % total` picks the permutations (mixed radix, tail to head) and
//! `seed / total` the main-chain start offset; a negative seed walks backwards.

use super::node::{NodeIdx, Tree, TreeError};
use std::collections::HashMap;

/// Enumerator over the canonical walks of one tree
#[derive(Debug, Clone)]
pub struct CanonicalWalk {
    main_chain: Vec<NodeIdx>,
    /// Side-chain children per main-chain node (closing root excluded), ascending id
    side_children: Vec<Vec<NodeIdx>>,
    total: u64,
}

enum Frame {
    Enter(NodeIdx),
    Descend { child: NodeIdx, side: bool },
    Ascend { mark: usize },
}

pub fn factorial(n: usize) -> Option<u64> {
    (1..=n as u64).try_fold(1u64, |acc, k| acc.checked_mul(k))
}

/// Lexicographic permutation of `items` with the given rank (`rank < n!`)
pub fn nth_permutation<T: Clone>(items: &[T], mut rank: u64) -> Vec<T> {
    let mut pool: Vec<T> = items.to_vec();
    let mut out = Vec::with_capacity(items.len());
    for i in (1..=items.len()).rev() {
        let f = factorial(i - 1).unwrap_or(u64::MAX);
        let pick = (rank / f) as usize;
        rank %= f;
        out.push(pool.remove(pick));
    }
    out
}

/// Rank of `perm` among the lexicographic permutations of `items`
pub fn permutation_rank<T: PartialEq>(items: &[T], perm: &[T]) -> Option<u64> {
    if items.len() != perm.len() {
        return None;
    }
    let mut pool: Vec<&T> = items.iter().collect();
    let mut rank = 0u64;
    for (i, p) in perm.iter().enumerate() {
        let pos = pool.iter().position(|x| *x == p)?;
        pool.remove(pos);
        rank += pos as u64 * factorial(items.len() - i - 1)?;
    }
    Some(rank)
}

impl CanonicalWalk {
    /// Canonicalize `tree` and set up its seed space
    pub fn new(tree: &mut Tree) -> Result<Self, TreeError> {
        let main_chain = tree.main_chain()?;
        let mut side_children = Vec::with_capacity(main_chain.len() - 1);
        let mut total = 1u64;
        for &m in &main_chain[..main_chain.len() - 1] {
            let mut sides = tree.side_children(m);
            sides.sort_by_key(|c| tree.node(*c).id);
            let f = factorial(sides.len()).ok_or(TreeError::SeedSpaceOverflow(tree.node(m).id))?;
            total = total
                .checked_mul(f)
                .ok_or(TreeError::SeedSpaceOverflow(tree.node(m).id))?;
            side_children.push(sides);
        }
        Ok(Self { main_chain, side_children, total })
    }

    pub fn main_chain(&self) -> &[NodeIdx] {
        &self.main_chain
    }

    /// Number of distinct side-chain orderings
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Side-chain child counts along the main chain
    pub fn child_counts(&self) -> Vec<usize> {
        self.side_children.iter().map(|s| s.len()).collect()
    }

    /// Permutation of side-chain children selected by `seed` for each main-chain node
    pub fn decode_seed(&self, seed: u64) -> Result<Vec<Vec<NodeIdx>>, TreeError> {
        let mut rest = seed;
        let mut perms = vec![Vec::new(); self.side_children.len()];
        for (i, sides) in self.side_children.iter().enumerate().rev() {
            let f = factorial(sides.len()).ok_or(TreeError::SeedOutOfRange(seed))?;
            perms[i] = nth_permutation(sides, rest % f);
            rest /= f;
        }
        if rest != 0 {
            return Err(TreeError::SeedOutOfRange(seed));
        }
        Ok(perms)
    }

    /// Inverse of [`decode_seed`](Self::decode_seed)
    pub fn encode_seed(&self, tree: &Tree, perms: &[Vec<NodeIdx>]) -> Result<u64, TreeError> {
        let mut seed = 0u64;
        for (i, sides) in self.side_children.iter().enumerate() {
            let id = tree.node(self.main_chain[i]).id;
            let perm = perms.get(i).ok_or(TreeError::InvalidPermutation(id))?;
            let rank = permutation_rank(sides, perm).ok_or(TreeError::InvalidPermutation(id))?;
            let f = factorial(sides.len()).ok_or(TreeError::SeedSpaceOverflow(id))?;
            seed = seed * f + rank;
        }
        Ok(seed)
    }

    /// Depth-first walk honoring side-chains-first ordering. `perms` overrides
    /// the side-chain order at main-chain nodes.
    pub fn dfs_order(tree: &Tree, perms: Option<&HashMap<NodeIdx, Vec<NodeIdx>>>) -> Vec<NodeIdx> {
        let mut res: Vec<NodeIdx> = Vec::new();
        let mut stack = vec![Frame::Enter(tree.root())];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(cur) => {
                    res.push(cur);
                    let mut children: Vec<NodeIdx> = tree.real_children(cur).collect();
                    children.sort_by_key(|c| (!tree.node(*c).side_chain, tree.node(*c).id));
                    if let Some(perm) = perms.and_then(|p| p.get(&cur)) {
                        if !tree.node(cur).side_chain {
                            let split = children
                                .iter()
                                .position(|c| !tree.node(*c).side_chain)
                                .unwrap_or(children.len());
                            let main = children.split_off(split);
                            children = perm.clone();
                            children.extend(main);
                        }
                    }
                    for c in children.into_iter().rev() {
                        stack.push(Frame::Descend { child: c, side: tree.node(c).side_chain });
                    }
                }
                Frame::Descend { child, side } => {
                    if side {
                        stack.push(Frame::Ascend { mark: res.len() - 1 });
                    }
                    stack.push(Frame::Enter(child));
                }
                Frame::Ascend { mark } => {
                    // climb back out: everything since `mark`, reversed, minus the deepest node
                    for i in (mark..res.len() - 1).rev() {
                        res.push(res[i]);
                    }
                }
            }
        }
        res
    }

    /// Canonical walk for the permutation part of a seed (`seed < total`)
    pub fn order_for_seed(&self, tree: &Tree, seed: u64) -> Result<Vec<NodeIdx>, TreeError> {
        let perms = self.decode_seed(seed)?;
        let perm_map: HashMap<NodeIdx, Vec<NodeIdx>> = self.main_chain[..self.main_chain.len() - 1]
            .iter()
            .copied()
            .zip(perms)
            .collect();
        Ok(Self::dfs_order(tree, Some(&perm_map)))
    }

    /// Rotate `res` to start at main-chain position `start` and optionally walk
    /// the main chain backwards. Each segment between consecutive main-chain
    /// nodes keeps its internal order.
    pub fn augment(&self, res: &[NodeIdx], start: u64, forward: bool) -> Vec<NodeIdx> {
        let heads = &self.main_chain[..self.main_chain.len() - 1];
        let mut indices = Vec::with_capacity(heads.len());
        for (j, node) in res.iter().enumerate() {
            if indices.len() < heads.len() && *node == heads[indices.len()] {
                indices.push(j);
            }
        }

        let k = indices.len();
        if k == 0 {
            return res.to_vec();
        }
        let s = (start % k as u64) as usize;
        let mut out = Vec::with_capacity(res.len());
        for step in 0..k {
            let (a, b) = if forward {
                ((s + step) % k, (s + step + 1) % k)
            } else {
                ((s + 2 * k - step - 1) % k, (s + k - step) % k)
            };
            let (from, to) = (indices[a], indices[b]);
            if to <= from {
                out.extend_from_slice(&res[from..]);
                out.extend_from_slice(&res[..to]);
            } else {
                out.extend_from_slice(&res[from..to]);
            }
        }
        out
    }

    /// Full walk for a signed seed: permutations, start offset and direction
    pub fn walk(&self, tree: &Tree, dfs_seed: i64) -> Result<Vec<NodeIdx>, TreeError> {
        let forward = dfs_seed >= 0;
        let seed = dfs_seed.unsigned_abs();
        let res = self.order_for_seed(tree, seed % self.total)?;
        let out = self.augment(&res, seed / self.total, forward);
        if seed == 0 && out != res {
            return Err(TreeError::AugmentMismatch);
        }
        Ok(out)
    }
}
