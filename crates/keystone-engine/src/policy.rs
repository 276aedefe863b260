//! Policy simulation — what does injecting extra capacity buy?
//!
//! Takes a caller-supplied repository ranking (typically the vaccination
//! ranker's output, but any ranking is accepted) and, for each candidate
//! size `nb_devs`, grafts one synthetic developer onto each of the top
//! `nb_devs` repositories, reruns the propagation fixed point, and reduces
//! the result to the standard metrics.

use std::collections::BTreeMap;

use keystone_core::cancellation::Cancellable;
use keystone_core::config::{EngineConfig, PolicyConfig, RankerConfig};
use keystone_core::errors::{DataError, SimulationError};
use keystone_core::sparse::CsrMatrix;
use keystone_storage::{CacheKind, ResultCache};
use tracing::debug;

use crate::metrics::Metrics;
use crate::propagation::{EngineInputs, Mode, PropagationEngine};
use crate::ranker::parallel::split_even;

/// Observation-window length backing the daily-rate injection.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowDays {
    /// One window length shared by every target.
    Uniform(f64),
    /// Per-repository-rank window lengths, for targets created after the
    /// window opened. Must cover every repository rank.
    PerRepository(Vec<f64>),
}

impl WindowDays {
    fn for_repo(&self, repo: usize) -> f64 {
        match self {
            WindowDays::Uniform(days) => *days,
            WindowDays::PerRepository(days) => days[repo],
        }
    }
}

/// How much the synthetic developer contributes to its target repository.
#[derive(Debug, Clone, PartialEq)]
pub enum Injection {
    /// As productive as the repository's current top contributor.
    MaxValue,
    /// `rate × window_days` commits over the target's observation window.
    DailyCommitRate { rate: f64, window_days: WindowDays },
}

impl Injection {
    /// Daily-rate injection with rate and a uniform window drawn from the
    /// policy config.
    pub fn daily_rate_from(config: &PolicyConfig) -> Self {
        Self::DailyCommitRate {
            rate: config.effective_daily_rate(),
            window_days: WindowDays::Uniform(config.effective_window_days()),
        }
    }
}

/// Evaluates capacity-injection policies over a list of `nb_devs` sizes.
#[derive(Debug)]
pub struct PolicySimulator {
    inputs: EngineInputs,
    config: EngineConfig,
    mode: Mode,
    ranking: Vec<usize>,
    injection: Injection,
}

impl PolicySimulator {
    /// `ranking` is consumed as-is; this component never recomputes it.
    pub fn new(
        inputs: EngineInputs,
        config: EngineConfig,
        mode: Mode,
        ranking: Vec<usize>,
        injection: Injection,
    ) -> Result<Self, SimulationError> {
        PropagationEngine::new(inputs.clone(), &config, mode)?;
        if let Injection::DailyCommitRate {
            window_days: WindowDays::PerRepository(days),
            ..
        } = &injection
        {
            if days.len() != inputs.repo_count() {
                return Err(DataError::ShapeMismatch {
                    context: "window days",
                    expected: format!("{}", inputs.repo_count()),
                    actual: format!("{}", days.len()),
                }
                .into());
            }
        }
        Ok(Self {
            inputs,
            config,
            mode,
            ranking,
            injection,
        })
    }

    /// Evaluate each `nb_devs` size in order.
    pub fn evaluate_sequential(
        &self,
        nb_devs_list: &[usize],
        cache: Option<&ResultCache>,
    ) -> Result<BTreeMap<usize, Metrics>, SimulationError> {
        let mut results = BTreeMap::new();
        for &nb_devs in nb_devs_list {
            let metrics = match self.lookup(cache, nb_devs)? {
                Some(hit) => hit,
                None => {
                    let metrics = self.simulate(nb_devs)?;
                    self.store(cache, nb_devs, &metrics)?;
                    metrics
                }
            };
            results.insert(nb_devs, metrics);
        }
        Ok(results)
    }

    /// Evaluate the `nb_devs` list in parallel, with the worker count from
    /// `config`. Results merge by key, so completion order is irrelevant;
    /// cache writes stay in the parent.
    pub fn evaluate_parallel(
        &self,
        nb_devs_list: &[usize],
        config: &RankerConfig,
        cache: Option<&ResultCache>,
        cancel: Option<&(dyn Cancellable + Sync)>,
    ) -> Result<BTreeMap<usize, Metrics>, SimulationError> {
        let workers = config.effective_workers();
        let mut results = BTreeMap::new();
        let mut pending = Vec::new();
        for &nb_devs in nb_devs_list {
            match self.lookup(cache, nb_devs)? {
                Some(hit) => {
                    results.insert(nb_devs, hit);
                }
                None => pending.push(nb_devs),
            }
        }

        let chunks = split_even(&pending, workers.max(1));
        debug!(
            pending = pending.len(),
            cached = results.len(),
            chunks = chunks.len(),
            "policy fan-out"
        );
        let (tx, rx) =
            crossbeam_channel::unbounded::<Result<(usize, Metrics), (usize, usize, String)>>();
        rayon::scope(|scope| {
            for chunk in &chunks {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let chunk_start = chunk.first().copied().unwrap_or(0);
                    let chunk_end = chunk.last().copied().map(|k| k + 1).unwrap_or(0);
                    for &nb_devs in chunk {
                        if cancel.is_some_and(|c| c.is_cancelled()) {
                            break;
                        }
                        match self.simulate(nb_devs) {
                            Ok(metrics) => {
                                if tx.send(Ok((nb_devs, metrics))).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                let _ = tx.send(Err((chunk_start, chunk_end, e.to_string())));
                                break;
                            }
                        }
                    }
                });
            }
        });
        drop(tx);

        let mut failure = None;
        for message in rx {
            match message {
                Ok((nb_devs, metrics)) => {
                    self.store(cache, nb_devs, &metrics)?;
                    results.insert(nb_devs, metrics);
                }
                Err((chunk_start, chunk_end, message)) => {
                    failure.get_or_insert(SimulationError::Worker {
                        chunk_start,
                        chunk_end,
                        message,
                    });
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(SimulationError::Cancelled);
        }
        Ok(results)
    }

    /// One policy run: inject, iterate, reduce.
    fn simulate(&self, nb_devs: usize) -> Result<Metrics, SimulationError> {
        let injected = self.inject(nb_devs)?;
        let mut engine = PropagationEngine::new(injected, &self.config, self.mode)?;
        let totals = engine.seed_totals()?;
        Ok(Metrics::from_seed_totals(&totals))
    }

    /// Append one synthetic developer column per targeted repository.
    ///
    /// Targets are the top `nb_devs` entries of the ranking (all of it if
    /// the ranking is shorter). The injected value is always written, even
    /// when it equals zero after pruning.
    fn inject(&self, nb_devs: usize) -> Result<EngineInputs, SimulationError> {
        let d = &self.inputs.contribution;
        let targets = &self.ranking[..nb_devs.min(self.ranking.len())];
        let mut triplets: Vec<(usize, usize, f64)> = d.triplets().collect();
        for (offset, &repo) in targets.iter().enumerate() {
            let value = match &self.injection {
                Injection::MaxValue => d.row_max(repo),
                Injection::DailyCommitRate { rate, window_days } => {
                    rate * window_days.for_repo(repo)
                }
            };
            triplets.push((repo, d.cols() + offset, value));
        }
        Ok(EngineInputs {
            contribution: CsrMatrix::from_triplets(
                d.rows(),
                d.cols() + targets.len(),
                &triplets,
            )?,
            dependency: self.inputs.dependency.clone(),
            weights: self.inputs.weights.clone(),
        })
    }

    fn lookup(
        &self,
        cache: Option<&ResultCache>,
        nb_devs: usize,
    ) -> Result<Option<Metrics>, SimulationError> {
        match cache {
            Some(cache) => Ok(cache.get(CacheKind::Policy, nb_devs as i64)?),
            None => Ok(None),
        }
    }

    fn store(
        &self,
        cache: Option<&ResultCache>,
        nb_devs: usize,
        metrics: &Metrics,
    ) -> Result<(), SimulationError> {
        if let Some(cache) = cache {
            cache.put_if_absent(CacheKind::Policy, nb_devs as i64, metrics)?;
        }
        Ok(())
    }
}
