//! Grouped vaccination ranking — many candidates in one engine call.
//!
//! Instead of one fixed point per candidate, a group of `G` candidates is
//! folded into a single larger system: the dependency matrix becomes block
//! diagonal, the contribution matrix and init are row-stacked, and one
//! distinct rank is vaccinated per block. Blocks cannot interact, so
//! slicing the block rows back out reproduces the per-candidate results
//! while amortizing fixed overhead across the group.

use keystone_core::config::RankerConfig;
use keystone_core::errors::SimulationError;
use keystone_core::sparse::CsrMatrix;
use keystone_storage::ResultCache;
use tracing::debug;

use crate::metrics::Metrics;
use crate::propagation::{EngineInputs, Mode, PropagationEngine};
use crate::ranker::{
    finish_ranking, lookup, reduce_status, relieve_maintainers, store, Perturbation,
    RankingResult, VaccinationRanker,
};

impl VaccinationRanker {
    /// Rank all candidates in groups. The group size comes from `config`
    /// (default 100).
    ///
    /// Same ordering as the sequential strategy; grouping is purely an
    /// amortization of per-run overhead.
    pub fn rank_grouped(
        &self,
        config: &RankerConfig,
        cache: Option<&ResultCache>,
    ) -> Result<RankingResult, SimulationError> {
        let group_size = config.effective_group_size();
        if group_size == 0 {
            return Err(keystone_core::errors::ConfigError::InvalidGroupSize.into());
        }
        let baseline = self.baseline()?;

        let mut outcomes: Vec<(usize, Metrics)> = Vec::new();
        let mut pending: Vec<usize> = Vec::new();
        for candidate in 0..self.inputs.repo_count() {
            match lookup(cache, candidate)? {
                Some(hit) => outcomes.push((candidate, hit)),
                None => pending.push(candidate),
            }
        }

        for group in pending.chunks(group_size) {
            let group_outcomes = self.simulate_group(group)?;
            for (candidate, metrics) in group_outcomes {
                store(cache, candidate, &metrics)?;
                outcomes.push((candidate, metrics));
            }
        }
        debug!(candidates = outcomes.len(), group_size, "grouped ranking complete");
        Ok(finish_ranking(baseline, outcomes))
    }

    /// One engine call covering a whole group of candidates.
    fn simulate_group(
        &self,
        group: &[usize],
    ) -> Result<Vec<(usize, Metrics)>, SimulationError> {
        let repos = self.inputs.repo_count();
        let g = group.len();

        // Per-block contribution: identical copies under vaccination,
        // per-candidate relieved copies in the semi-greedy variant.
        let (contribution, masked) = match self.perturbation {
            Perturbation::Vaccinate => {
                let mask = group
                    .iter()
                    .enumerate()
                    .map(|(block, &candidate)| block * repos + candidate)
                    .collect::<Vec<usize>>();
                (self.inputs.contribution.vstack_tile(g), mask)
            }
            Perturbation::RelieveMaintainers {
                daily_rate,
                window_days,
            } => {
                let blocks = group
                    .iter()
                    .map(|&candidate| {
                        relieve_maintainers(&self.inputs, candidate, daily_rate * window_days)
                            .map(|inputs| inputs.contribution)
                    })
                    .collect::<Result<Vec<CsrMatrix>, SimulationError>>()?;
                (CsrMatrix::vstack(&blocks)?, Vec::new())
            }
        };

        let stacked = EngineInputs {
            contribution,
            dependency: self.inputs.dependency.block_diag_tile(g),
            weights: self.inputs.weights.repeat(g),
        };
        let mut engine = PropagationEngine::new(stacked, &self.config, self.mode)?;
        if !masked.is_empty() {
            engine.set_vaccinated(masked)?;
        }
        engine.run()?;
        let status = engine
            .get_result()
            .unwrap_or_else(|| unreachable!("run() populates the status"));

        let normalize = self.config.effective_normalize_weights();
        let mut results = Vec::with_capacity(g);
        for (block, &candidate) in group.iter().enumerate() {
            let rows = status.slice_rows(block * repos, (block + 1) * repos);
            // In repo mode each block's seeds live in its own column span;
            // in dev mode every block shares the developer columns.
            let seed_range = match self.mode {
                Mode::Dev => 0..rows.cols(),
                Mode::Repo => block * repos..(block + 1) * repos,
            };
            let metrics = reduce_status(&rows, &self.inputs.weights, seed_range, normalize)?;
            results.push((candidate, metrics));
        }
        Ok(results)
    }
}
