//! Trajectory tokens — `42` or `42[->17,->9->3]`
//!
//! A token is a main-walk visit (`head`) plus the side excursions taken from
//! it before the walk moved on. Every excursion is a descent path; the walk
//! climbs back along the same path to the head.

use super::TrajectoryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One written step of a trajectory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token {
    pub head: usize,
    pub excursions: Vec<Vec<usize>>,
}

impl Token {
    pub fn bare(head: usize) -> Self {
        Self {
            head,
            excursions: Vec::new(),
        }
    }

    pub fn is_bare(&self) -> bool {
        self.excursions.is_empty()
    }

    /// Head followed by the deepest node of every excursion, in written order
    pub fn occurrences(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(self.head).chain(self.excursions.iter().filter_map(|e| e.last().copied()))
    }

    /// Every visit this token stands for, including the climbs back to `head`
    pub fn expand(&self) -> Vec<usize> {
        let mut visits = vec![self.head];
        for path in &self.excursions {
            visits.extend(path.iter().copied());
            if path.len() > 1 {
                visits.extend(path[..path.len() - 1].iter().rev().copied());
            }
            visits.push(self.head);
        }
        visits
    }

    /// Render with `name` applied to every index
    pub fn render<F, S>(&self, name: F) -> String
    where
        F: Fn(usize) -> S,
        S: fmt::Display,
    {
        let mut out = name(self.head).to_string();
        if !self.excursions.is_empty() {
            let parts: Vec<String> = self
                .excursions
                .iter()
                .map(|path| path.iter().map(|i| format!("->{}", name(*i))).collect())
                .collect();
            out.push('[');
            out.push_str(&parts.join(","));
            out.push(']');
        }
        out
    }

    /// Parse with `index` resolving every written node
    pub fn parse_with<F>(s: &str, index: F) -> Result<Self, TrajectoryError>
    where
        F: Fn(&str) -> Result<usize, TrajectoryError>,
    {
        let malformed = || TrajectoryError::Malformed(s.to_string());
        let (head, rest) = match s.find('[') {
            Some(open) => (&s[..open], Some(&s[open + 1..])),
            None => (s, None),
        };
        if head.is_empty() {
            return Err(malformed());
        }
        let mut token = Token::bare(index(head)?);
        if let Some(rest) = rest {
            let body = rest.strip_suffix(']').ok_or_else(malformed)?;
            for group in body.split(',') {
                let steps = group.strip_prefix("->").ok_or_else(malformed)?;
                let path = steps
                    .split("->")
                    .map(|step| if step.is_empty() { Err(malformed()) } else { index(step) })
                    .collect::<Result<Vec<_>, _>>()?;
                token.excursions.push(path);
            }
        }
        Ok(token)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(|i| i))
    }
}

impl FromStr for Token {
    type Err = TrajectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Token::parse_with(s, |part| {
            part.parse::<usize>()
                .map_err(|_| TrajectoryError::Malformed(s.to_string()))
        })
    }
}

impl TryFrom<String> for Token {
    type Error = TrajectoryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let t: Token = "42[->17,->9->3]".parse().unwrap();
        assert_eq!(t.head, 42);
        assert_eq!(t.excursions, vec![vec![17], vec![9, 3]]);
        assert_eq!(t.to_string(), "42[->17,->9->3]");
        assert_eq!("7".parse::<Token>().unwrap(), Token::bare(7));
    }

    #[test]
    fn test_malformed_tokens() {
        for bad in ["", "x", "4[->1", "4[1]", "4[->]", "4[->1,]", "[->1]"] {
            assert!(bad.parse::<Token>().is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_occurrences_and_expand() {
        let t: Token = "50[->12->37,->48]".parse().unwrap();
        assert_eq!(t.occurrences().collect::<Vec<_>>(), vec![50, 37, 48]);
        assert_eq!(t.expand(), vec![50, 12, 37, 12, 50, 48, 50]);
    }

    #[test]
    fn test_render_names() {
        let names = ["L3", "S20", "P14"];
        let t: Token = "1[->2->0,->2]".parse().unwrap();
        assert_eq!(t.render(|i| names[i]), "S20[->P14->L3,->P14]");
    }

    #[test]
    fn test_serde_as_string() {
        let t: Token = "3[->1]".parse().unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"3[->1]\"");
        let back: Token = serde_json::from_str("\"3[->1]\"").unwrap();
        assert_eq!(back, t);
    }
}
