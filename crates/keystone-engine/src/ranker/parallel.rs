//! Parallel vaccination ranking — chunked fan-out over worker threads.
//!
//! Candidates are split into near-even contiguous chunks, one per worker.
//! Each worker receives its own clone of the pre-materialized inputs (no
//! shared mutable state, no I/O) and streams `(rank, metrics)` records back
//! over a channel; the parent merges by key before sorting, so completion
//! order never affects the ranking.

use keystone_core::cancellation::Cancellable;
use keystone_core::config::RankerConfig;
use keystone_core::errors::SimulationError;
use keystone_storage::ResultCache;
use tracing::debug;

use crate::metrics::Metrics;
use crate::ranker::{
    finish_ranking, lookup, simulate_candidate, store, RankingResult, VaccinationRanker,
};

/// A record streamed from a worker to the parent.
enum WorkerMessage {
    Done(usize, Metrics),
    Failed {
        chunk_start: usize,
        chunk_end: usize,
        message: String,
    },
}

impl VaccinationRanker {
    /// Rank all candidates in parallel. The worker count comes from
    /// `config`, defaulting to the machine's available parallelism.
    ///
    /// Produces the same ordering as [`rank_sequential`](Self::rank_sequential);
    /// parallelism is a performance concern only. Cache reads and writes
    /// stay in the parent, so workers never contend on storage. A
    /// cancelled run persists whatever finished and returns `Cancelled`.
    pub fn rank_parallel(
        &self,
        config: &RankerConfig,
        cache: Option<&ResultCache>,
        cancel: Option<&(dyn Cancellable + Sync)>,
    ) -> Result<RankingResult, SimulationError> {
        let workers = config.effective_workers();
        let baseline = self.baseline()?;

        let mut outcomes: Vec<(usize, Metrics)> = Vec::new();
        let mut pending: Vec<usize> = Vec::new();
        for candidate in 0..self.inputs.repo_count() {
            match lookup(cache, candidate)? {
                Some(hit) => outcomes.push((candidate, hit)),
                None => pending.push(candidate),
            }
        }

        let chunks = split_even(&pending, workers.max(1));
        debug!(
            pending = pending.len(),
            cached = outcomes.len(),
            chunks = chunks.len(),
            "parallel ranking fan-out"
        );

        let (tx, rx) = crossbeam_channel::unbounded::<WorkerMessage>();
        rayon::scope(|scope| {
            for chunk in &chunks {
                let tx = tx.clone();
                let inputs = self.inputs.clone();
                let config = self.config.clone();
                let mode = self.mode;
                let perturbation = self.perturbation;
                scope.spawn(move |_| {
                    let chunk_start = chunk.first().copied().unwrap_or(0);
                    let chunk_end = chunk.last().copied().map(|r| r + 1).unwrap_or(0);
                    for &candidate in chunk {
                        if cancel.is_some_and(|c| c.is_cancelled()) {
                            break;
                        }
                        match simulate_candidate(&inputs, &config, mode, perturbation, candidate)
                        {
                            Ok(metrics) => {
                                if tx.send(WorkerMessage::Done(candidate, metrics)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                let _ = tx.send(WorkerMessage::Failed {
                                    chunk_start,
                                    chunk_end,
                                    message: e.to_string(),
                                });
                                break;
                            }
                        }
                    }
                });
            }
        });
        drop(tx);

        // Drain and merge by key; persist successes before reporting any
        // failure so a rerun can resume from the cache.
        let mut failure: Option<SimulationError> = None;
        for message in rx {
            match message {
                WorkerMessage::Done(candidate, metrics) => {
                    store(cache, candidate, &metrics)?;
                    outcomes.push((candidate, metrics));
                }
                WorkerMessage::Failed {
                    chunk_start,
                    chunk_end,
                    message,
                } => {
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
        Ok(finish_ranking(baseline, outcomes))
    }
}

/// Split items into at most `parts` contiguous chunks, sized as evenly as
/// possible (the first `len % parts` chunks take one extra item).
pub(crate) fn split_even<T: Copy>(items: &[T], parts: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let parts = parts.min(items.len());
    let base = items.len() / parts;
    let extra = items.len() % parts;
    let mut chunks = Vec::with_capacity(parts);
    let mut offset = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        chunks.push(items[offset..offset + size].to_vec());
        offset += size;
    }
    chunks
}
