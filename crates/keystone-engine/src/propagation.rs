//! Propagation fixed point.
//!
//! Iterates the chosen aggregation law over the contribution and dependency
//! matrices until the status matrix stops changing, then exposes raw,
//! weighted, and per-seed views of the result.

use keystone_core::config::EngineConfig;
use keystone_core::errors::{DataError, SimulationError};
use keystone_core::source::GraphSource;
use keystone_core::sparse::CsrMatrix;
use tracing::{debug, warn};

use crate::aggregation::AggregationLaw;

/// Which identity matrix seeds the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Seed one column per developer: `init = 0`, `dev_status = I_U`.
    /// Isolates each developer's unique downstream footprint.
    Dev,
    /// Seed one column per repository: `init = I_R`, no developer
    /// re-seeding. Pure dependency cascade, clamped to ≤ 1.
    Repo,
}

/// The pre-materialized matrices one simulation operates on.
///
/// Built once from a [`GraphSource`] before any fan-out; workers receive
/// clones, so no retrieval I/O ever happens inside a simulation.
#[derive(Debug, Clone)]
pub struct EngineInputs {
    /// `D`: repositories × developers.
    pub contribution: CsrMatrix,
    /// `P`: repositories × repositories, row-stochastic.
    pub dependency: CsrMatrix,
    /// `w`: per-repository popularity weight, scalarization only.
    pub weights: Vec<f64>,
}

impl EngineInputs {
    /// Materialize all inputs from a source. This is the single point where
    /// retrieval happens; everything downstream is pure computation.
    pub fn from_source<S: GraphSource>(
        source: &S,
        start_time: i64,
        end_time: i64,
        ref_time: i64,
        filtered: bool,
    ) -> Result<Self, DataError> {
        let contribution = source.contribution_matrix(start_time, end_time)?;
        let dependency = source.dependency_matrix(ref_time, filtered)?;
        if contribution.repos.len() != dependency.repos.len() {
            return Err(DataError::ShapeMismatch {
                context: "rank index",
                expected: format!("{} repositories", contribution.repos.len()),
                actual: format!("{}", dependency.repos.len()),
            });
        }
        let weights = source.repository_weights()?;
        let inputs = Self {
            contribution: contribution.matrix,
            dependency: dependency.matrix,
            weights,
        };
        inputs.validate()?;
        Ok(inputs)
    }

    /// Cross-check shapes. A mismatch means artifacts from different
    /// windows or rank indices were mixed; never silently coerced.
    pub fn validate(&self) -> Result<(), DataError> {
        let repos = self.contribution.rows();
        if self.dependency.rows() != repos || self.dependency.cols() != repos {
            return Err(DataError::ShapeMismatch {
                context: "dependency matrix",
                expected: format!("({repos}, {repos})"),
                actual: format!("({}, {})", self.dependency.rows(), self.dependency.cols()),
            });
        }
        if self.weights.len() != repos {
            return Err(DataError::ShapeMismatch {
                context: "weight vector",
                expected: format!("{repos}"),
                actual: format!("{}", self.weights.len()),
            });
        }
        if let Some((rank, &value)) = self.weights.iter().enumerate().find(|(_, &w)| w < 0.0) {
            return Err(DataError::NegativeWeight { rank, value });
        }
        Ok(())
    }

    /// Number of repository ranks.
    pub fn repo_count(&self) -> usize {
        self.contribution.rows()
    }

    /// Number of developer ranks.
    pub fn dev_count(&self) -> usize {
        self.contribution.cols()
    }
}

/// Outcome of one fixed-point run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub iterations: u64,
    pub converged: bool,
}

/// Iterates the aggregation law to a fixed point.
///
/// One instance owns one set of inputs plus the memoized intermediates
/// (`dev_contrib`, weight sum) computed lazily from them. Replacing inputs
/// goes through [`reset`](Self::reset) so stale memoization can never leak
/// into a new run.
#[derive(Debug)]
pub struct PropagationEngine {
    law: AggregationLaw,
    mode: Mode,
    iter_max: u64,
    stationary: bool,
    normalize_weights: bool,
    inputs: EngineInputs,
    /// Sorted repository ranks whose inbound propagation is blocked.
    vaccinated: Vec<usize>,
    dev_contrib: Option<CsrMatrix>,
    weight_sum: Option<f64>,
    status: Option<CsrMatrix>,
    summary: Option<RunSummary>,
}

impl PropagationEngine {
    /// Validate configuration and input shapes, before any matrix work.
    pub fn new(
        inputs: EngineInputs,
        config: &EngineConfig,
        mode: Mode,
    ) -> Result<Self, SimulationError> {
        let law = AggregationLaw::from_config(config)?;
        if config.effective_iter_max() == 0 {
            return Err(keystone_core::errors::ConfigError::InvalidIterMax.into());
        }
        inputs.validate()?;
        Ok(Self {
            law,
            mode,
            iter_max: config.effective_iter_max(),
            stationary: config.effective_stationary(),
            normalize_weights: config.effective_normalize_weights(),
            inputs,
            vaccinated: Vec::new(),
            dev_contrib: None,
            weight_sum: None,
            status: None,
            summary: None,
        })
    }

    /// Block inbound propagation for the given repository ranks.
    /// Drops any previously computed status; memoized `dev_contrib` stays,
    /// it does not depend on the mask.
    pub fn set_vaccinated(&mut self, mut ranks: Vec<usize>) -> Result<(), DataError> {
        let repos = self.inputs.repo_count();
        if let Some(&bad) = ranks.iter().find(|&&r| r >= repos) {
            return Err(DataError::RankOutOfBounds {
                kind: "repository",
                rank: bad,
                size: repos,
            });
        }
        ranks.sort_unstable();
        ranks.dedup();
        self.vaccinated = ranks;
        self.status = None;
        self.summary = None;
        Ok(())
    }

    /// Replace the inputs and drop every memoized intermediate.
    pub fn reset(&mut self, inputs: EngineInputs) -> Result<(), DataError> {
        inputs.validate()?;
        self.inputs = inputs;
        self.dev_contrib = None;
        self.weight_sum = None;
        self.status = None;
        self.summary = None;
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn law(&self) -> AggregationLaw {
        self.law
    }

    /// Run the fixed point. Idempotent: a second call returns the already
    /// computed status.
    pub fn run(&mut self) -> Result<RunSummary, SimulationError> {
        if let Some(summary) = self.summary {
            return Ok(summary);
        }
        let repos = self.inputs.repo_count();
        let seeds = match self.mode {
            Mode::Dev => self.inputs.dev_count(),
            Mode::Repo => repos,
        };
        let init = match self.mode {
            Mode::Dev => CsrMatrix::zero(repos, seeds),
            Mode::Repo => CsrMatrix::identity(repos),
        };

        let mut status = init.clone();
        let mut iterations = 0u64;
        let mut converged = false;

        // Stationary mode: `dev_status` never changes after the first
        // iteration, so `D · dev_status` is computed once and reused.
        let cached_dev_contrib = if self.stationary {
            Some(self.dev_contrib(seeds)?.clone())
        } else {
            None
        };

        while iterations < self.iter_max {
            let fresh;
            let dev_contrib = match &cached_dev_contrib {
                Some(m) => m,
                None => {
                    fresh = Self::compute_dev_contrib(&self.inputs, self.mode, seeds)?;
                    &fresh
                }
            };
            let deps_contrib = self.inputs.dependency.matmul(&status)?;
            let mut next = self.law.combine(dev_contrib, &deps_contrib)?;
            if !self.vaccinated.is_empty() {
                next = next.zero_rows(&self.vaccinated);
            }
            next = next.add(&init)?;
            if self.mode == Mode::Repo {
                next = next.clamp_max(1.0);
            }
            iterations += 1;

            let delta = next.zip_union(&status, |a, b| a - b)?;
            status = next;
            if delta.is_empty() {
                converged = true;
                break;
            }
        }

        if converged {
            debug!(iterations, law = self.law.name(), "propagation converged");
        } else {
            // Best effort by contract: the caller gets the status as of the
            // cap, never an error.
            warn!(
                iterations,
                iter_max = self.iter_max,
                law = self.law.name(),
                "propagation hit iteration cap before convergence"
            );
        }

        let summary = RunSummary {
            iterations,
            converged,
        };
        self.status = Some(status);
        self.summary = Some(summary);
        Ok(summary)
    }

    /// The converged status matrix (repositories × seeds).
    pub fn get_result(&self) -> Option<&CsrMatrix> {
        self.status.as_ref()
    }

    /// Status with row `r` scaled by `w[r]`, optionally normalized by
    /// `sum(w)`.
    pub fn weighted_status(&mut self) -> Result<CsrMatrix, SimulationError> {
        self.run()?;
        let status = self.status.as_ref().unwrap_or_else(|| unreachable!());
        let mut weighted = status.scale_rows(&self.inputs.weights)?;
        if self.normalize_weights {
            let total = self.weight_sum();
            if total != 0.0 {
                weighted = weighted.map_nonzeros(|v| v / total);
            }
        }
        Ok(weighted)
    }

    /// Per-seed scalarization `Σ_r w[r]·S[r,u]`.
    pub fn seed_totals(&mut self) -> Result<Vec<f64>, SimulationError> {
        self.run()?;
        let status = self.status.as_ref().unwrap_or_else(|| unreachable!());
        let mut totals = status.weighted_column_sums(&self.inputs.weights)?;
        if self.normalize_weights {
            let total = self.weight_sum();
            if total != 0.0 {
                for t in &mut totals {
                    *t /= total;
                }
            }
        }
        Ok(totals)
    }

    fn dev_contrib(&mut self, seeds: usize) -> Result<&CsrMatrix, DataError> {
        if self.dev_contrib.is_none() {
            self.dev_contrib = Some(Self::compute_dev_contrib(&self.inputs, self.mode, seeds)?);
        }
        Ok(self.dev_contrib.as_ref().unwrap_or_else(|| unreachable!()))
    }

    /// `D · dev_status`. In dev mode `dev_status` is the developer
    /// identity for every iteration, so this is just `D`; in repo mode the
    /// developer side is all-zero.
    fn compute_dev_contrib(
        inputs: &EngineInputs,
        mode: Mode,
        seeds: usize,
    ) -> Result<CsrMatrix, DataError> {
        match mode {
            Mode::Dev => inputs
                .contribution
                .matmul(&CsrMatrix::identity(inputs.dev_count())),
            Mode::Repo => Ok(CsrMatrix::zero(inputs.repo_count(), seeds)),
        }
    }

    fn weight_sum(&mut self) -> f64 {
        if self.weight_sum.is_none() {
            self.weight_sum = Some(self.inputs.weights.iter().sum());
        }
        self.weight_sum.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::config::EngineConfig;

    fn config(law: &str) -> EngineConfig {
        EngineConfig {
            law: Some(law.to_string()),
            ..Default::default()
        }
    }

    fn empty_inputs(repos: usize, devs: usize) -> EngineInputs {
        EngineInputs {
            contribution: CsrMatrix::zero(repos, devs),
            dependency: CsrMatrix::zero(repos, repos),
            weights: vec![1.0; repos],
        }
    }

    #[test]
    fn rejects_shape_mismatch_at_construction() {
        let inputs = EngineInputs {
            contribution: CsrMatrix::zero(3, 2),
            dependency: CsrMatrix::zero(2, 2),
            weights: vec![1.0; 3],
        };
        assert!(PropagationEngine::new(inputs, &config("linear"), Mode::Dev).is_err());
    }

    #[test]
    fn rejects_negative_weight_at_construction() {
        let inputs = EngineInputs {
            contribution: CsrMatrix::zero(2, 2),
            dependency: CsrMatrix::zero(2, 2),
            weights: vec![1.0, -0.5],
        };
        let err = inputs.validate().unwrap_err();
        assert!(matches!(err, DataError::NegativeWeight { rank: 1, .. }));
    }

    #[test]
    fn rejects_bad_law_at_construction() {
        let err = PropagationEngine::new(empty_inputs(2, 2), &config("nope"), Mode::Dev)
            .unwrap_err();
        assert!(matches!(err, SimulationError::Config(_)));
    }

    #[test]
    fn zero_matrices_fix_at_init_for_every_law() {
        for law in ["cobb-douglas", "leontief", "linear", "legacy-cobb-douglas"] {
            // Dev mode: init is zero, so the status stays structurally empty.
            let mut dev =
                PropagationEngine::new(empty_inputs(3, 4), &config(law), Mode::Dev).unwrap();
            let summary = dev.run().unwrap();
            assert!(summary.converged);
            assert!(dev.get_result().unwrap().is_empty());

            // Repo mode: init is the identity and nothing cascades.
            let mut repo =
                PropagationEngine::new(empty_inputs(3, 4), &config(law), Mode::Repo).unwrap();
            repo.run().unwrap();
            assert_eq!(repo.get_result().unwrap(), &CsrMatrix::identity(3));
        }
    }

    #[test]
    fn rerun_is_idempotent() {
        let mut engine =
            PropagationEngine::new(empty_inputs(2, 2), &config("linear"), Mode::Repo).unwrap();
        let first = engine.run().unwrap();
        let second = engine.run().unwrap();
        assert_eq!(first.iterations, second.iterations);
    }

    #[test]
    fn reset_drops_memoized_state() {
        let mut engine =
            PropagationEngine::new(empty_inputs(2, 2), &config("linear"), Mode::Dev).unwrap();
        engine.run().unwrap();
        assert!(engine.get_result().unwrap().is_empty());

        let inputs = EngineInputs {
            contribution: CsrMatrix::from_triplets(2, 2, &[(0, 0, 0.4)]).unwrap(),
            dependency: CsrMatrix::zero(2, 2),
            weights: vec![1.0, 1.0],
        };
        engine.reset(inputs).unwrap();
        engine.run().unwrap();
        // The fresh contribution flows through: no stale dev_contrib.
        assert!((engine.get_result().unwrap().get(0, 0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn vaccination_rejects_out_of_bounds_rank() {
        let mut engine =
            PropagationEngine::new(empty_inputs(2, 2), &config("linear"), Mode::Dev).unwrap();
        assert!(engine.set_vaccinated(vec![5]).is_err());
    }

    #[test]
    fn iteration_cap_returns_best_effort() {
        // A self-sustaining two-cycle under the legacy law never settles
        // within one iteration, so a cap of 1 must end unconverged.
        let inputs = EngineInputs {
            contribution: CsrMatrix::from_triplets(2, 1, &[(0, 0, 0.5)]).unwrap(),
            dependency: CsrMatrix::from_triplets(2, 2, &[(1, 0, 1.0), (0, 1, 1.0)]).unwrap(),
            weights: vec![1.0, 1.0],
        };
        let cfg = EngineConfig {
            law: Some("legacy-cobb-douglas".to_string()),
            iter_max: Some(1),
            ..Default::default()
        };
        let mut engine = PropagationEngine::new(inputs, &cfg, Mode::Dev).unwrap();
        let summary = engine.run().unwrap();
        assert!(!summary.converged);
        assert_eq!(summary.iterations, 1);
        assert!(engine.get_result().is_some());
    }
}
