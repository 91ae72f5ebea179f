//! Trajectory encoder — incremental bracketed record of a walk
//!
//! Visits are appended one at a time. Returning to the head of the
//! second-to-last token closes a side excursion: the last token is folded
//! into that head's bracket list, so `[396, 508[->397]] + 396` becomes
//! `[396[->508->397]]`.

use super::{Token, TrajectoryError};
use crate::tree::split_label;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A walk as a sequence of tokens; never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory {
    tokens: Vec<Token>,
}

impl Trajectory {
    pub fn new(start: usize) -> Self {
        Self {
            tokens: vec![Token::bare(start)],
        }
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Result<Self, TrajectoryError> {
        if tokens.is_empty() {
            return Err(TrajectoryError::Empty);
        }
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn start(&self) -> usize {
        self.tokens[0].head
    }

    /// Head of the most recently written token
    pub fn last_head(&self) -> usize {
        self.tokens[self.tokens.len() - 1].head
    }

    /// A walk that came back to its start as a bare final token
    pub fn is_closed(&self) -> bool {
        self.tokens.len() > 1 && self.tokens.last() == Some(&Token::bare(self.start()))
    }

    /// Heads plus excursion terminals, in written order
    pub fn occurrences(&self) -> Vec<usize> {
        self.tokens.iter().flat_map(|t| t.occurrences()).collect()
    }

    /// The full visiting order this trajectory encodes
    pub fn expand(&self) -> Vec<usize> {
        self.tokens.iter().flat_map(|t| t.expand()).collect()
    }

    /// Record a visit to `next`.
    ///
    /// A first visit becomes a new bare token. A revisit is only legal when it
    /// closes an excursion: `next` occurred exactly once so far and heads the
    /// second-to-last token. A rejected append leaves the trajectory untouched.
    pub fn append(&mut self, next: usize) -> Result<(), TrajectoryError> {
        let occurrences = self.occurrences();
        let seen = occurrences.iter().filter(|&&i| i == next).count();
        if seen == 0 {
            self.tokens.push(Token::bare(next));
            return Ok(());
        }
        if seen != 1 || occurrences.len() == 1 {
            return Err(TrajectoryError::Revisit(next));
        }
        let n = self.tokens.len();
        if n < 2 || self.tokens[n - 2].head != next {
            return Err(TrajectoryError::Revisit(next));
        }
        let last = &self.tokens[n - 1];
        if last.excursions.len() > 1 {
            return Err(TrajectoryError::UnsupportedMerge(last.excursions.len()));
        }

        let mut path = vec![last.head];
        if let Some(inner) = last.excursions.first() {
            path.extend(inner.iter().copied());
        }
        self.tokens.pop();
        self.tokens[n - 2].excursions.push(path);
        Ok(())
    }

    /// Append `next` as a bare token without merge checks (self-loop or loop
    /// closure records)
    pub fn push_terminal(&mut self, next: usize) {
        self.tokens.push(Token::bare(next));
    }

    /// True when a move to `candidate` is forbidden: an immediate revisit of the
    /// last head, or a multiplicity suffix out of order
    pub fn forbids<S: AsRef<str>>(&self, labels: &[S], candidate: usize) -> bool {
        candidate == self.last_head() || !self.colon_order_ok(labels, candidate)
    }

    /// `k:i` needs `k`, `k:1`, …, `k:(i-1)` already visited and no `k:j`
    /// with `j > i`. A candidate outside `labels` is never in order; visits
    /// outside `labels` are ignored.
    pub fn colon_order_ok<S: AsRef<str>>(&self, labels: &[S], candidate: usize) -> bool {
        let Some(label) = labels.get(candidate) else {
            return false;
        };
        let (group, suffix) = split_label(label.as_ref());
        let mut seen = vec![false; suffix];
        for i in self.expand() {
            let Some(label) = labels.get(i) else { continue };
            let (g, s) = split_label(label.as_ref());
            if g != group {
                continue;
            }
            if s > suffix {
                return false;
            }
            if s < suffix {
                seen[s] = true;
            }
        }
        seen.into_iter().all(|v| v)
    }

    /// Render every index as its group label, failing on an index outside
    /// `labels`
    pub fn try_to_names<S: AsRef<str>>(
        &self,
        labels: &[S],
    ) -> Result<Vec<String>, TrajectoryError> {
        if let Some(index) = self.expand().into_iter().find(|&i| i >= labels.len()) {
            return Err(TrajectoryError::IndexOutOfRange { index, len: labels.len() });
        }
        Ok(self.to_names(labels))
    }

    /// Render every index as its group label.
    ///
    /// # Panics
    ///
    /// If any index is outside `labels`. Trajectories built by the searchers
    /// always index their own walk space; use
    /// [`try_to_names`](Self::try_to_names) for parsed input.
    pub fn to_names<S: AsRef<str>>(&self, labels: &[S]) -> Vec<String> {
        self.tokens
            .iter()
            .map(|t| t.render(|i| labels[i].as_ref().to_string()))
            .collect()
    }

    /// Parse a label-rendered trajectory back to indices
    pub fn from_names<S: AsRef<str>>(
        names: &[S],
        lookup: &HashMap<String, usize>,
    ) -> Result<Self, TrajectoryError> {
        let tokens = names
            .iter()
            .map(|s| {
                Token::parse_with(s.as_ref(), |label| {
                    lookup
                        .get(label)
                        .copied()
                        .ok_or_else(|| TrajectoryError::UnknownLabel(label.to_string()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_tokens(tokens)
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.to_string()).collect()
    }

    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, TrajectoryError> {
        let tokens = tokens
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<Token>, _>>()?;
        Self::from_tokens(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traj(tokens: &[&str]) -> Trajectory {
        Trajectory::parse(tokens).unwrap()
    }

    #[test]
    fn test_closing_a_nested_excursion() {
        let mut t = traj(&["396", "508[->397]"]);
        t.append(396).unwrap();
        assert_eq!(t.to_strings(), vec!["396[->508->397]"]);
    }

    #[test]
    fn test_linearizing_into_existing_brackets() {
        let mut t = traj(&["90", "50[->8]", "4[->25]"]);
        t.append(50).unwrap();
        assert_eq!(t.to_strings(), vec!["90", "50[->8,->4->25]"]);
    }

    #[test]
    fn test_first_visit_is_bare() {
        let mut t = Trajectory::new(61);
        t.append(90).unwrap();
        t.append(50).unwrap();
        assert_eq!(t.to_strings(), vec!["61", "90", "50"]);
    }

    #[test]
    fn test_rejected_appends_leave_trajectory() {
        // revisit of the lone start
        let mut t = Trajectory::new(5);
        assert!(matches!(t.append(5), Err(TrajectoryError::Revisit(5))));
        assert_eq!(t.len(), 1);

        // 1 is not the head of the second-to-last token
        let mut t = traj(&["1", "2", "3"]);
        assert!(t.append(1).is_err());
        assert_eq!(t.to_strings(), vec!["1", "2", "3"]);

        // 2 already occurs twice (head and excursion end)
        let mut t = traj(&["2[->4->2]", "6"]);
        assert!(t.append(2).is_err());

        // merging two excursion groups at once is unsupported
        let mut t = traj(&["1", "2[->3,->4]"]);
        assert!(matches!(t.append(1), Err(TrajectoryError::UnsupportedMerge(2))));
        assert_eq!(t.to_strings(), vec!["1", "2[->3,->4]"]);
    }

    #[test]
    fn test_expand_reproduces_visits() {
        let visits = [61, 90, 50, 12, 37, 12, 50, 90, 7];
        let mut t = Trajectory::new(visits[0]);
        for &v in &visits[1..] {
            t.append(v).unwrap();
        }
        assert_eq!(t.to_strings(), vec!["61", "90[->50->12->37]", "7"]);
        assert_eq!(t.expand(), visits.to_vec());
    }

    #[test]
    fn test_expand_after_sibling_excursions() {
        let visits = [90, 50, 8, 50, 4, 25, 4, 50];
        let mut t = Trajectory::new(visits[0]);
        for &v in &visits[1..] {
            t.append(v).unwrap();
        }
        assert_eq!(t.to_strings(), vec!["90", "50[->8,->4->25]"]);
        assert_eq!(t.expand(), visits.to_vec());
    }

    #[test]
    fn test_colon_order() {
        let labels = ["P3", "P3:1", "P3:2", "L3"];
        let t = Trajectory::new(3);
        assert!(t.colon_order_ok(&labels, 0));
        assert!(!t.colon_order_ok(&labels, 1));
        assert!(!t.colon_order_ok(&labels, 2));

        let mut t = Trajectory::new(0);
        t.append(3).unwrap();
        assert!(t.colon_order_ok(&labels, 1));
        assert!(!t.colon_order_ok(&labels, 2));
        t.append(1).unwrap();
        assert!(t.colon_order_ok(&labels, 2));
        // P3:1 seen, so a later bare P3 is out of order
        assert!(!t.colon_order_ok(&labels, 0));
        // base label is compared exactly, not by substring
        let labels = ["P3", "P30:1", "P30"];
        let t = Trajectory::new(0);
        assert!(!t.colon_order_ok(&labels, 1));
    }

    #[test]
    fn test_self_loop_is_forbidden() {
        let labels = ["A", "B", "C"];
        let mut t = Trajectory::new(0);
        t.append(1).unwrap();
        assert!(t.forbids(&labels, 1));
        assert!(!t.forbids(&labels, 2));
        assert!(!t.forbids(&labels, 0));
    }

    #[test]
    fn test_indices_outside_labels() {
        let labels = ["A", "B"];
        let t = traj(&["0", "1[->7]"]);
        assert!(!t.colon_order_ok(&labels, 5));
        assert!(t.forbids(&labels, 5));
        assert!(t.colon_order_ok(&labels, 0));
        assert_eq!(
            t.try_to_names(&labels),
            Err(TrajectoryError::IndexOutOfRange { index: 7, len: 2 })
        );
        assert_eq!(traj(&["1", "0"]).try_to_names(&labels).unwrap(), vec!["B", "A"]);
    }

    #[test]
    fn test_names_roundtrip() {
        let labels = ["L3", "S32", "S20", "P14", "P39", "S18"];
        let lookup: HashMap<String, usize> =
            labels.iter().enumerate().map(|(i, l)| (l.to_string(), i)).collect();
        let t = traj(&["0", "1", "2[->3->4,->5]", "1"]);
        let names = t.to_names(&labels);
        assert_eq!(names, vec!["L3", "S32", "S20[->P14->P39,->S18]", "S32"]);
        assert_eq!(Trajectory::from_names(&names, &lookup).unwrap(), t);
        assert!(matches!(
            Trajectory::from_names(&["L3", "X1"], &lookup),
            Err(TrajectoryError::UnknownLabel(ref l)) if l == "X1"
        ));
    }

    #[test]
    fn test_closed() {
        let mut t = Trajectory::new(4);
        t.append(2).unwrap();
        assert!(!t.is_closed());
        t.push_terminal(4);
        assert!(t.is_closed());
        assert_eq!(serde_json::to_string(&t).unwrap(), r#"["4","2","4"]"#);
    }
}
