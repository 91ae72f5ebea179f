//! Transition models — turn the current state into a proposed update
//!
//! Searchers only see the [`TransitionModel`] trait. [`LaplacianModel`] is the
//! reference implementation: the forward pass of a weighted graph Laplacian
//! over the shared group graph, with a running-mean context.

use super::SearchError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Scores a state: `(update, new_context)`; `state + update` is then projected
/// to a distribution over the next group.
pub trait TransitionModel: Sync {
    /// Dimension of the state space
    fn dim(&self) -> usize;

    fn score(
        &self,
        state: &DVector<f64>,
        context: &DVector<f64>,
        t: usize,
    ) -> (DVector<f64>, DVector<f64>);
}

/// Weighted-Laplacian transition model. Deserialization runs the same shape
/// checks as [`LaplacianModel::new`] and [`LaplacianModel::with_scale`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawLaplacian")]
pub struct LaplacianModel {
    /// Edge weights `E` (N×N)
    pub weights: DMatrix<f64>,
    /// Shared group adjacency `A` (N×N)
    pub adjacency: DMatrix<f64>,
    /// Per-node update scale
    pub scale: DVector<f64>,
    /// Use `diag(colsum(E∘A)) − E` without row normalization
    pub combine_walks: bool,
}

/// Unchecked on-disk form
#[derive(Deserialize)]
struct RawLaplacian {
    weights: DMatrix<f64>,
    adjacency: DMatrix<f64>,
    scale: DVector<f64>,
    combine_walks: bool,
}

impl TryFrom<RawLaplacian> for LaplacianModel {
    type Error = SearchError;

    fn try_from(raw: RawLaplacian) -> Result<Self, Self::Error> {
        Self::new(raw.weights, raw.adjacency, raw.combine_walks)?.with_scale(raw.scale)
    }
}

impl LaplacianModel {
    pub fn new(
        weights: DMatrix<f64>,
        adjacency: DMatrix<f64>,
        combine_walks: bool,
    ) -> Result<Self, SearchError> {
        let n = adjacency.nrows();
        if adjacency.ncols() != n {
            return Err(SearchError::Dimension { expected: n, actual: adjacency.ncols() });
        }
        if weights.shape() != (n, n) {
            let actual = weights.nrows().max(weights.ncols());
            return Err(SearchError::Dimension { expected: n, actual });
        }
        Ok(Self {
            weights,
            adjacency,
            scale: DVector::from_element(n, 1.0),
            combine_walks,
        })
    }

    /// Unbiased random walk over a bidirected group graph: from a one-hot
    /// state all mass moves uniformly onto the neighbours
    pub fn random_walk(adjacency: &DMatrix<f64>) -> Result<Self, SearchError> {
        let n = adjacency.nrows();
        let mut model = Self::new(-adjacency, adjacency.clone(), true)?;
        model.scale = DVector::from_fn(n, |i, _| {
            let degree = adjacency.column(i).sum();
            if degree > 0.0 {
                1.0 / degree
            } else {
                1.0
            }
        });
        Ok(model)
    }

    pub fn with_scale(mut self, scale: DVector<f64>) -> Result<Self, SearchError> {
        if scale.len() != self.dim() {
            return Err(SearchError::Dimension { expected: self.dim(), actual: scale.len() });
        }
        self.scale = scale;
        Ok(self)
    }

    /// The (possibly normalized) Laplacian the update is taken from
    pub fn laplacian(&self) -> DMatrix<f64> {
        if self.combine_walks {
            let degree = self.weights.component_mul(&self.adjacency).row_sum();
            return DMatrix::from_diagonal(&degree.transpose()) - &self.weights;
        }
        let w_hat = (&self.weights * &self.adjacency).row_sum();
        let mut l = DMatrix::from_diagonal(&w_hat.transpose()) - &self.weights;
        for mut row in l.row_iter_mut() {
            let sum = row.sum();
            if sum != 0.0 {
                row /= sum;
            }
        }
        l
    }
}

impl TransitionModel for LaplacianModel {
    fn dim(&self) -> usize {
        self.adjacency.nrows()
    }

    fn score(
        &self,
        state: &DVector<f64>,
        context: &DVector<f64>,
        t: usize,
    ) -> (DVector<f64>, DVector<f64>) {
        let tf = t as f64;
        let context = context * (tf / (tf + 1.0)) + state / (tf + 1.0);
        // update_j = Σ_i x_i · scale_i · L_ji
        let scaled = state.component_mul(&self.scale);
        let update = self.laplacian() * scaled;
        (update, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0])
    }

    fn one_hot(n: usize, i: usize) -> DVector<f64> {
        let mut v = DVector::zeros(n);
        v[i] = 1.0;
        v
    }

    #[test]
    fn test_random_walk_moves_to_neighbours() {
        let model = LaplacianModel::random_walk(&triangle()).unwrap();
        let x = one_hot(3, 0);
        let (update, _) = model.score(&x, &DVector::zeros(3), 0);
        let next = &x + update;
        assert!(next[0].abs() < 1e-12);
        assert!((next[1] - 0.5).abs() < 1e-12);
        assert!((next[2] - 0.5).abs() < 1e-12);
        assert!((next.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_context_is_running_mean() {
        let model = LaplacianModel::random_walk(&triangle()).unwrap();
        let (_, ctx) = model.score(&one_hot(3, 0), &DVector::zeros(3), 0);
        assert_eq!(ctx, one_hot(3, 0));
        let (_, ctx) = model.score(&one_hot(3, 1), &ctx, 1);
        assert!((ctx[0] - 0.5).abs() < 1e-12);
        assert!((ctx[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_normalized_laplacian_rows() {
        let a = triangle();
        let model = LaplacianModel::new(a.clone(), a, false).unwrap();
        let l = model.laplacian();
        for row in l.row_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_shape_checks() {
        let a = triangle();
        assert!(LaplacianModel::new(DMatrix::zeros(2, 2), a.clone(), false).is_err());
        let model = LaplacianModel::new(a.clone(), a, true).unwrap();
        assert!(model.with_scale(DVector::zeros(4)).is_err());
    }

    #[test]
    fn test_deserialize_checks_shapes() {
        let model = LaplacianModel::random_walk(&triangle()).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let back: LaplacianModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scale, model.scale);

        let short_scale = LaplacianModel { scale: DVector::zeros(2), ..model.clone() };
        let json = serde_json::to_string(&short_scale).unwrap();
        assert!(serde_json::from_str::<LaplacianModel>(&json).is_err());

        let small_weights = LaplacianModel { weights: DMatrix::zeros(2, 2), ..model };
        let json = serde_json::to_string(&small_weights).unwrap();
        assert!(serde_json::from_str::<LaplacianModel>(&json).is_err());
    }
}
