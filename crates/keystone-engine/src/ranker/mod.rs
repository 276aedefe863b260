//! Vaccination ranking — which repository is most worth protecting.
//!
//! Every candidate gets one full fixed-point simulation with its inbound
//! propagation neutralized (or its maintainers relieved, in the semi-greedy
//! variant); candidates are ordered by how much aggregate impact their
//! protection removes relative to the no-intervention baseline.

mod grouped;
pub(crate) mod parallel;

use keystone_core::config::{EngineConfig, PolicyConfig};
use keystone_core::errors::SimulationError;
use keystone_core::sparse::CsrMatrix;
use keystone_storage::{CacheKind, ResultCache};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::metrics::Metrics;
use crate::propagation::{EngineInputs, Mode, PropagationEngine};

/// How a candidate repository is protected in its simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Perturbation {
    /// Zero the candidate's inbound propagation each iteration
    /// (full immunization).
    Vaccinate,
    /// Semi-greedy variant: shrink the candidate's own developers'
    /// contributions by `daily_rate × window_days` (floored at zero),
    /// modeling external contribution absorbing the maintainers' load.
    RelieveMaintainers { daily_rate: f64, window_days: f64 },
}

impl Perturbation {
    /// Maintainer relief with rate and window drawn from the policy config.
    pub fn relieve_from(config: &PolicyConfig) -> Self {
        Self::RelieveMaintainers {
            daily_rate: config.effective_daily_rate(),
            window_days: config.effective_window_days(),
        }
    }
}

/// Total order over repository ranks by descending protective value.
#[derive(Debug, Clone)]
pub struct RankingResult {
    /// Ranks sorted by protective value, best first.
    pub order: Vec<usize>,
    /// Rank → insertion position in `order`.
    pub position: FxHashMap<usize, usize>,
    /// Rank → `baseline − vaccinated` metric differences.
    pub metric: FxHashMap<usize, Metrics>,
}

impl RankingResult {
    /// The accessor triple the reporting layer consumes.
    pub fn get_result(
        &self,
    ) -> (&[usize], &FxHashMap<usize, usize>, &FxHashMap<usize, Metrics>) {
        (&self.order, &self.position, &self.metric)
    }
}

/// Ranks repositories by marginal protective value.
///
/// Inputs are materialized before construction; each simulation is pure
/// computation, which is what makes the parallel and grouped strategies
/// safe to fan out.
pub struct VaccinationRanker {
    inputs: EngineInputs,
    config: EngineConfig,
    mode: Mode,
    perturbation: Perturbation,
}

impl VaccinationRanker {
    pub fn new(
        inputs: EngineInputs,
        config: EngineConfig,
        mode: Mode,
        perturbation: Perturbation,
    ) -> Result<Self, SimulationError> {
        // Construct a throwaway engine up front so configuration and shape
        // problems surface before a batch starts.
        PropagationEngine::new(inputs.clone(), &config, mode)?;
        Ok(Self {
            inputs,
            config,
            mode,
            perturbation,
        })
    }

    pub fn inputs(&self) -> &EngineInputs {
        &self.inputs
    }

    /// Metrics of the unperturbed run. Computed once per batch.
    pub fn baseline(&self) -> Result<Metrics, SimulationError> {
        let mut engine = PropagationEngine::new(self.inputs.clone(), &self.config, self.mode)?;
        let totals = engine.seed_totals()?;
        Ok(Metrics::from_seed_totals(&totals))
    }

    /// Simulate every candidate one after another — the correctness
    /// reference for the parallel and grouped strategies.
    pub fn rank_sequential(
        &self,
        cache: Option<&ResultCache>,
    ) -> Result<RankingResult, SimulationError> {
        let baseline = self.baseline()?;
        let mut outcomes = Vec::with_capacity(self.inputs.repo_count());
        for candidate in 0..self.inputs.repo_count() {
            let metrics = match lookup(cache, candidate)? {
                Some(hit) => hit,
                None => {
                    let metrics = simulate_candidate(
                        &self.inputs,
                        &self.config,
                        self.mode,
                        self.perturbation,
                        candidate,
                    )?;
                    store(cache, candidate, &metrics)?;
                    metrics
                }
            };
            outcomes.push((candidate, metrics));
        }
        debug!(candidates = outcomes.len(), "sequential ranking complete");
        Ok(finish_ranking(baseline, outcomes))
    }
}

/// One candidate simulation: perturb, run to the fixed point, reduce.
pub(crate) fn simulate_candidate(
    inputs: &EngineInputs,
    config: &EngineConfig,
    mode: Mode,
    perturbation: Perturbation,
    candidate: usize,
) -> Result<Metrics, SimulationError> {
    let mut engine = match perturbation {
        Perturbation::Vaccinate => {
            let mut engine = PropagationEngine::new(inputs.clone(), config, mode)?;
            engine.set_vaccinated(vec![candidate])?;
            engine
        }
        Perturbation::RelieveMaintainers {
            daily_rate,
            window_days,
        } => {
            let relieved = relieve_maintainers(inputs, candidate, daily_rate * window_days)?;
            PropagationEngine::new(relieved, config, mode)?
        }
    };
    let totals = engine.seed_totals()?;
    Ok(Metrics::from_seed_totals(&totals))
}

/// Shrink every contribution into `candidate` by `amount`, floored at zero.
pub(crate) fn relieve_maintainers(
    inputs: &EngineInputs,
    candidate: usize,
    amount: f64,
) -> Result<EngineInputs, SimulationError> {
    let d = &inputs.contribution;
    let triplets: Vec<(usize, usize, f64)> = d
        .triplets()
        .map(|(r, c, v)| {
            if r == candidate {
                (r, c, (v - amount).max(0.0))
            } else {
                (r, c, v)
            }
        })
        .collect();
    Ok(EngineInputs {
        contribution: CsrMatrix::from_triplets(d.rows(), d.cols(), &triplets)?,
        dependency: inputs.dependency.clone(),
        weights: inputs.weights.clone(),
    })
}

/// Merge per-candidate outcomes into the final deterministic ordering:
/// `globalsum` difference descending, ties broken by rank ascending.
pub(crate) fn finish_ranking(
    baseline: Metrics,
    outcomes: Vec<(usize, Metrics)>,
) -> RankingResult {
    let mut diffs: Vec<(usize, Metrics)> = outcomes
        .into_iter()
        .map(|(rank, m)| (rank, baseline.diff(&m)))
        .collect();
    diffs.sort_by(|(ra, ma), (rb, mb)| mb.sum.total_cmp(&ma.sum).then(ra.cmp(rb)));

    let mut order = Vec::with_capacity(diffs.len());
    let mut position = FxHashMap::default();
    let mut metric = FxHashMap::default();
    for (pos, (rank, diff)) in diffs.into_iter().enumerate() {
        order.push(rank);
        position.insert(rank, pos);
        metric.insert(rank, diff);
    }
    RankingResult {
        order,
        position,
        metric,
    }
}

/// Reduce a status slice to metrics, honoring weight normalization.
pub(crate) fn reduce_status(
    status: &CsrMatrix,
    weights: &[f64],
    seed_range: std::ops::Range<usize>,
    normalize: bool,
) -> Result<Metrics, SimulationError> {
    let mut totals = status.weighted_column_sums(weights)?;
    let mut totals = totals.drain(seed_range).collect::<Vec<f64>>();
    if normalize {
        let w_sum: f64 = weights.iter().sum();
        if w_sum != 0.0 {
            for t in &mut totals {
                *t /= w_sum;
            }
        }
    }
    Ok(Metrics::from_seed_totals(&totals))
}

pub(crate) fn lookup(
    cache: Option<&ResultCache>,
    candidate: usize,
) -> Result<Option<Metrics>, SimulationError> {
    match cache {
        Some(cache) => Ok(cache.get(CacheKind::Vaccination, candidate as i64)?),
        None => Ok(None),
    }
}

pub(crate) fn store(
    cache: Option<&ResultCache>,
    candidate: usize,
    metrics: &Metrics,
) -> Result<(), SimulationError> {
    if let Some(cache) = cache {
        cache.put_if_absent(CacheKind::Vaccination, candidate as i64, metrics)?;
    }
    Ok(())
}
