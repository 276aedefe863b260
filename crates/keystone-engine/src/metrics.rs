//! Scalar reductions of a status matrix.

use serde::{Deserialize, Serialize};

/// The three scalar reductions every simulation is compared on.
///
/// Computed over per-seed totals (`Σ_r w[r]·S[r,u]` for each seed `u`):
/// the worst seed, the average seed, and the aggregate over all seeds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub max: f64,
    pub mean: f64,
    pub sum: f64,
}

impl Metrics {
    /// Reduce per-seed totals to the three scalars.
    pub fn from_seed_totals(totals: &[f64]) -> Self {
        if totals.is_empty() {
            return Self {
                max: 0.0,
                mean: 0.0,
                sum: 0.0,
            };
        }
        let sum: f64 = totals.iter().sum();
        let max = totals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = sum / totals.len() as f64;
        Self { max, mean, sum }
    }

    /// Per-metric difference `self - other`. Used as
    /// `baseline - intervened`: positive numbers mean the intervention
    /// removed impact.
    pub fn diff(&self, other: &Metrics) -> Metrics {
        Metrics {
            max: self.max - other.max,
            mean: self.mean - other.mean,
            sum: self.sum - other.sum,
        }
    }
}
