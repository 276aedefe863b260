//! Propagation engine configuration.

use serde::{Deserialize, Serialize};

/// Settings for the propagation fixed point.
///
/// Every field is optional in the file; `effective_*` accessors apply the
/// compiled defaults. Law names and exponents are validated when the engine
/// is constructed, before any matrix work.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Aggregation law: `cobb-douglas` (default), `leontief`, `linear`,
    /// or `legacy-cobb-douglas`.
    pub law: Option<String>,
    /// Cobb-Douglas exponent on the developer contribution. Default: 0.5.
    pub alpha_dev: Option<f64>,
    /// Cobb-Douglas exponent on the dependency contribution. Default: 0.5.
    pub alpha_dep: Option<f64>,
    /// Iteration cap for the fixed point. Default: 10000.
    pub iter_max: Option<u64>,
    /// Cache the developer contribution across iterations. Default: true.
    pub stationary: Option<bool>,
    /// Divide weighted output by `sum(w)`. Default: false.
    pub normalize_weights: Option<bool>,
}

impl EngineConfig {
    pub fn effective_law(&self) -> &str {
        self.law.as_deref().unwrap_or("cobb-douglas")
    }

    pub fn effective_alpha_dev(&self) -> f64 {
        self.alpha_dev.unwrap_or(0.5)
    }

    pub fn effective_alpha_dep(&self) -> f64 {
        self.alpha_dep.unwrap_or(0.5)
    }

    pub fn effective_iter_max(&self) -> u64 {
        self.iter_max.unwrap_or(10_000)
    }

    pub fn effective_stationary(&self) -> bool {
        self.stationary.unwrap_or(true)
    }

    pub fn effective_normalize_weights(&self) -> bool {
        self.normalize_weights.unwrap_or(false)
    }
}
