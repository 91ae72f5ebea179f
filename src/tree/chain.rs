//! Main-chain canonicalization
//!
//! Decides, for every node, which single child continues the main chain.
//! Trees coming from group-contribution data already carry consistent
//! `side_chain` flags; anything else is ordered by lowest child id.

use super::node::{NodeIdx, Tree, TreeError};
use log::debug;

impl Tree {
    /// Number of children not flagged as side chains (closure edges included)
    pub fn main_child_count(&self, idx: NodeIdx) -> usize {
        self.node(idx)
            .children
            .iter()
            .filter(|(c, _)| !self.node(*c).side_chain)
            .count()
    }

    /// Whether some node has more than one main-chain child
    pub fn needs_ordering(&self) -> bool {
        self.preorder().into_iter().any(|idx| self.main_child_count(idx) > 1)
    }

    /// Flag every child as a side chain, then promote the lowest-id child of each
    /// main-chain node back onto the main chain. A closure edge points at the
    /// root (id 0) and so always wins; its node keeps every real child on a side
    /// chain. Side-chain subtrees are flagged throughout with no promotion.
    pub fn impose_order(&mut self) {
        let mut stack = vec![(self.root(), true)];
        while let Some((cur, add_main)) = stack.pop() {
            let children: Vec<NodeIdx> = self.real_children(cur).collect();
            for &c in &children {
                self.node_mut(c).side_chain = true;
            }
            let closes = self.node(cur).children.iter().any(|(c, _)| self.is_sentinel(*c));
            let main = if add_main && !closes {
                children.iter().copied().min_by_key(|c| self.node(*c).id)
            } else {
                None
            };
            if let Some(m) = main {
                self.node_mut(m).side_chain = false;
            }
            for &c in &children {
                stack.push((c, Some(c) == main));
            }
        }
    }

    /// Canonicalize flags if needed and return the cyclic main chain:
    /// root, each main-chain continuation in turn, and finally the root again.
    pub fn main_chain(&mut self) -> Result<Vec<NodeIdx>, TreeError> {
        if self.needs_ordering() {
            debug!("imposing id order on tree {:?}", self.dag_id);
            self.impose_order();
        }

        let root = self.root();
        let mut chain = vec![root];
        loop {
            let last = chain[chain.len() - 1];
            if chain.len() > 1 && last == root {
                break;
            }
            if self.main_child_count(last) > 1 {
                return Err(TreeError::MultipleMainChildren(self.node(last).id));
            }
            let next = self
                .node(last)
                .children
                .iter()
                .map(|(c, _)| *c)
                .find(|c| !self.node(*c).side_chain)
                .unwrap_or(root);
            chain.push(next);
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::{EdgeData, Tree};

    fn ids(tree: &Tree, chain: &[crate::tree::NodeIdx]) -> Vec<u32> {
        chain.iter().map(|i| tree.node(*i).id).collect()
    }

    #[test]
    fn test_flagged_chain_is_kept() {
        let mut tree = Tree::new("R");
        let a = tree.add_child(tree.root(), 5, "A", EdgeData::new(), false).unwrap();
        tree.add_child(tree.root(), 2, "S", EdgeData::new(), true).unwrap();
        let b = tree.add_child(a, 9, "B", EdgeData::new(), false).unwrap();
        tree.close_to_root(b, EdgeData::new());
        assert!(!tree.needs_ordering());
        let chain = tree.main_chain().unwrap();
        assert_eq!(ids(&tree, &chain), vec![0, 5, 9, 0]);
    }

    #[test]
    fn test_lowest_id_becomes_main() {
        let mut tree = Tree::new("R");
        let a = tree.add_child(tree.root(), 4, "A", EdgeData::new(), false).unwrap();
        let b = tree.add_child(tree.root(), 2, "B", EdgeData::new(), false).unwrap();
        tree.add_child(a, 7, "C", EdgeData::new(), false).unwrap();
        tree.add_child(b, 6, "D", EdgeData::new(), false).unwrap();
        tree.add_child(b, 3, "E", EdgeData::new(), false).unwrap();
        assert!(tree.needs_ordering());

        let chain = tree.main_chain().unwrap();
        assert_eq!(ids(&tree, &chain), vec![0, 2, 3, 0]);
        // everything under the demoted branch is side chain
        assert!(tree.node(a).side_chain);
        assert!(tree.node(tree.find(7).unwrap()).side_chain);
        assert!(tree.node(tree.find(6).unwrap()).side_chain);
        for idx in tree.preorder() {
            assert!(tree.main_child_count(idx) <= 1);
        }
    }

    #[test]
    fn test_closure_wins_over_real_children() {
        let mut tree = Tree::new("R");
        let a = tree.add_child(tree.root(), 1, "A", EdgeData::new(), false).unwrap();
        let b = tree.add_child(a, 2, "B", EdgeData::new(), false).unwrap();
        tree.add_child(a, 3, "C", EdgeData::new(), false).unwrap();
        let d = tree.add_child(b, 4, "D", EdgeData::new(), true).unwrap();
        tree.close_to_root(b, EdgeData::new());
        assert!(tree.needs_ordering());

        let chain = tree.main_chain().unwrap();
        assert_eq!(ids(&tree, &chain), vec![0, 1, 2, 0]);
        assert!(tree.node(d).side_chain);
        assert_eq!(tree.main_child_count(b), 1);
    }

    #[test]
    fn test_single_node_chain() {
        let mut tree = Tree::new("R");
        let chain = tree.main_chain().unwrap();
        assert_eq!(ids(&tree, &chain), vec![0, 0]);
    }

    #[test]
    fn test_closure_demotes_main_child() {
        let mut tree = Tree::new("R");
        let a = tree.add_child(tree.root(), 1, "A", EdgeData::new(), false).unwrap();
        let b = tree.add_child(a, 2, "B", EdgeData::new(), false).unwrap();
        tree.close_to_root(a, EdgeData::new());
        let chain = tree.main_chain().unwrap();
        assert_eq!(ids(&tree, &chain), vec![0, 1, 0]);
        assert!(tree.node(b).side_chain);
    }
}
