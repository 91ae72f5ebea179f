//! Distribution projection — raw model output to a next-group distribution

use crate::trajectory::Trajectory;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// How raw scores become probabilities
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Clip negatives to zero
    Raw,
    /// 1 for every non-negative entry
    Uniform,
    /// `exp(x · temperature)`, normalized
    Softmax { temperature: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectOptions {
    pub projection: Projection,
    /// Zero every entry not adjacent to the current group
    pub mask_adjacency: bool,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            projection: Projection::Raw,
            mask_adjacency: true,
        }
    }
}

impl ProjectOptions {
    pub fn softmax(temperature: f64) -> Self {
        Self {
            projection: Projection::Softmax { temperature },
            ..Self::default()
        }
    }

    pub fn uniform() -> Self {
        Self {
            projection: Projection::Uniform,
            ..Self::default()
        }
    }
}

/// Project `raw` to a distribution. All-zero mass comes back unchanged; the
/// caller decides to stop.
pub fn project(
    raw: &DVector<f64>,
    adjacency_row: &DVector<f64>,
    options: &ProjectOptions,
) -> DVector<f64> {
    let mut p = match options.projection {
        Projection::Raw => raw.map(|x| if x >= 0.0 { x } else { 0.0 }),
        Projection::Uniform => raw.map(|x| if x >= 0.0 { 1.0 } else { 0.0 }),
        Projection::Softmax { temperature } => {
            let scaled = raw * temperature;
            let max = scaled.max();
            let e = scaled.map(|x| (x - max).exp());
            let sum = e.sum();
            e / sum
        }
    };
    if options.mask_adjacency {
        for (v, a) in p.iter_mut().zip(adjacency_row.iter()) {
            if *a == 0.0 {
                *v = 0.0;
            }
        }
    }
    let sum = p.sum();
    if sum > 0.0 {
        p /= sum;
    }
    p
}

/// Zero the moves `trajectory` forbids and renormalize; `None` when nothing
/// valid is left
pub fn constrain<S: AsRef<str>>(
    mut dist: DVector<f64>,
    trajectory: &Trajectory,
    labels: &[S],
) -> Option<DVector<f64>> {
    for i in 0..dist.len() {
        if dist[i] != 0.0 && trajectory.forbids(labels, i) {
            dist[i] = 0.0;
        }
    }
    let sum = dist.sum();
    if !sum.is_finite() || sum <= 0.0 {
        return None;
    }
    dist /= sum;
    if dist.iter().any(|p| !p.is_finite()) {
        return None;
    }
    Some(dist)
}
