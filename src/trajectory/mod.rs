//! Trajectory encoding — bracketed, incrementally extended walk records
//!
//! Rendering example: `['61','90','50[->12->37,->48]']` with group labels
//! becomes `['L3','S32','S20[->P14->P39,->S18]']`.

mod encoder;
mod token;

pub use encoder::Trajectory;
pub use token::Token;

/// Trajectory errors. Rejected appends are branch-local: searchers abandon
/// the branch and move on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrajectoryError {
    #[error("malformed trajectory token: {0}")]
    Malformed(String),

    #[error("unknown group label: {0}")]
    UnknownLabel(String),

    #[error("trajectory has no tokens")]
    Empty,

    #[error("revisit of {0} does not close a side excursion")]
    Revisit(usize),

    #[error("cannot fold a token with {0} excursion groups")]
    UnsupportedMerge(usize),

    #[error("index {index} outside a label space of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}
