//! Ranking, policy, and cache behavior over the 4-repository fixture.
//!
//! Hand-checked expectation under the legacy law in dev mode: vaccinating
//! repo 0 removes 110 of the 155 baseline weighted impact, repo 2 removes
//! 32, repo 1 removes 28, repo 3 removes 5 — order [0, 2, 1, 3].

use keystone_core::cancellation::{Cancellable, CancellationToken};
use keystone_core::config::{EngineConfig, PolicyConfig, RankerConfig};
use keystone_core::errors::SimulationError;
use keystone_core::sparse::CsrMatrix;
use keystone_engine::metrics::Metrics;
use keystone_engine::policy::{Injection, PolicySimulator, WindowDays};
use keystone_engine::propagation::{EngineInputs, Mode};
use keystone_engine::ranker::{Perturbation, VaccinationRanker};
use keystone_storage::{CacheKind, ResultCache};

fn fixture() -> EngineInputs {
    let contribution = CsrMatrix::from_triplets(
        4,
        5,
        &[
            (0, 0, 0.2),
            (0, 1, 0.8),
            (1, 0, 1.0),
            (2, 1, 1.0),
            (3, 3, 1.0),
        ],
    )
    .unwrap();
    let dependency =
        CsrMatrix::from_triplets(4, 4, &[(1, 0, 1.0), (2, 0, 0.5), (2, 1, 0.5)]).unwrap();
    EngineInputs {
        contribution,
        dependency,
        weights: vec![100.0, 10.0, 20.0, 5.0],
    }
}

fn legacy_config() -> EngineConfig {
    EngineConfig {
        law: Some("legacy-cobb-douglas".to_string()),
        ..Default::default()
    }
}

fn ranker() -> VaccinationRanker {
    VaccinationRanker::new(fixture(), legacy_config(), Mode::Dev, Perturbation::Vaccinate)
        .unwrap()
}

fn ranker_config(workers: usize, group_size: usize) -> RankerConfig {
    RankerConfig {
        workers: Some(workers),
        group_size: Some(group_size),
    }
}

#[test]
fn sequential_ranking_matches_hand_computed_order() {
    let result = ranker().rank_sequential(None).unwrap();
    assert_eq!(result.order, vec![0, 2, 1, 3]);
    assert_eq!(result.position[&0], 0);
    assert_eq!(result.position[&3], 3);
    assert!((result.metric[&0].sum - 110.0).abs() < 1e-9);
    assert!((result.metric[&2].sum - 32.0).abs() < 1e-9);
    assert!((result.metric[&1].sum - 28.0).abs() < 1e-9);
    assert!((result.metric[&3].sum - 5.0).abs() < 1e-9);
}

#[test]
fn sequential_ranking_is_deterministic() {
    let r = ranker();
    let first = r.rank_sequential(None).unwrap();
    let second = r.rank_sequential(None).unwrap();
    assert_eq!(first.order, second.order);
    for rank in 0..4 {
        assert_eq!(first.metric[&rank], second.metric[&rank]);
        assert_eq!(first.position[&rank], second.position[&rank]);
    }
}

#[test]
fn parallel_and_grouped_match_the_sequential_order() {
    let r = ranker();
    let cfg = ranker_config(3, 2);
    let sequential = r.rank_sequential(None).unwrap();
    let parallel = r.rank_parallel(&cfg, None, None).unwrap();
    let grouped = r.rank_grouped(&cfg, None).unwrap();
    assert_eq!(parallel.order, sequential.order);
    assert_eq!(grouped.order, sequential.order);
    for rank in 0..4 {
        assert!((parallel.metric[&rank].sum - sequential.metric[&rank].sum).abs() < 1e-9);
        assert!((grouped.metric[&rank].sum - sequential.metric[&rank].sum).abs() < 1e-9);
    }
}

#[test]
fn default_ranker_config_drives_both_strategies() {
    // With no explicit knobs the worker count falls back to the machine's
    // available parallelism and the group size to 100; both must still
    // reproduce the sequential ordering.
    let r = ranker();
    let cfg = RankerConfig::default();
    let sequential = r.rank_sequential(None).unwrap();
    let parallel = r.rank_parallel(&cfg, None, None).unwrap();
    let grouped = r.rank_grouped(&cfg, None).unwrap();
    assert_eq!(parallel.order, sequential.order);
    assert_eq!(grouped.order, sequential.order);
}

#[test]
fn grouped_repo_mode_matches_sequential() {
    let r = VaccinationRanker::new(
        fixture(),
        legacy_config(),
        Mode::Repo,
        Perturbation::Vaccinate,
    )
    .unwrap();
    let sequential = r.rank_sequential(None).unwrap();
    let grouped = r.rank_grouped(&ranker_config(1, 3), None).unwrap();
    assert_eq!(grouped.order, sequential.order);
    for rank in 0..4 {
        assert!((grouped.metric[&rank].sum - sequential.metric[&rank].sum).abs() < 1e-9);
    }
}

#[test]
fn cached_ranking_populates_then_reads() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResultCache::open(&dir.path().join("cache.db")).unwrap();
    let r = ranker();

    let first = r.rank_sequential(Some(&cache)).unwrap();
    assert_eq!(cache.count(CacheKind::Vaccination).unwrap(), 4);

    let second = r.rank_sequential(Some(&cache)).unwrap();
    assert_eq!(cache.count(CacheKind::Vaccination).unwrap(), 4);
    assert_eq!(first.order, second.order);
    for rank in 0..4 {
        assert_eq!(first.metric[&rank], second.metric[&rank]);
    }
}

#[test]
fn cached_rows_are_honored_over_recomputation() {
    let cache = ResultCache::open_in_memory().unwrap();
    // Pre-seed rank 3 with a sentinel: zero vaccinated impact, i.e. a
    // protective value equal to the whole baseline sum (155).
    let sentinel = Metrics { max: 0.0, mean: 0.0, sum: 0.0 };
    cache.put_if_absent(CacheKind::Vaccination, 3, &sentinel).unwrap();

    let result = ranker().rank_sequential(Some(&cache)).unwrap();
    // The sentinel, not a recomputation, decides rank 3's standing.
    assert!((result.metric[&3].sum - 155.0).abs() < 1e-9);
    assert_eq!(result.order[0], 3);
}

#[test]
fn cancelled_parallel_run_reports_cancellation() {
    let token = CancellationToken::new();
    token.cancel();
    let err = ranker()
        .rank_parallel(&ranker_config(2, 2), None, Some(&token))
        .unwrap_err();
    assert!(matches!(err, SimulationError::Cancelled));
}

#[test]
fn maintainer_relief_never_increases_impact() {
    let r = VaccinationRanker::new(
        fixture(),
        legacy_config(),
        Mode::Dev,
        Perturbation::RelieveMaintainers {
            daily_rate: 10.0,
            window_days: 1.0,
        },
    )
    .unwrap();
    let result = r.rank_sequential(None).unwrap();
    for rank in 0..4 {
        assert!(
            result.metric[&rank].sum >= -1e-9,
            "relieving rank {rank} increased impact"
        );
    }
    // A rate this large wipes the candidate's whole contribution row, so
    // relieving repo 3 removes exactly its weighted footprint.
    assert!((result.metric[&3].sum - 5.0).abs() < 1e-9);

    let grouped = r.rank_grouped(&ranker_config(1, 2), None).unwrap();
    assert_eq!(grouped.order, result.order);
}

#[test]
fn perturbation_and_injection_draw_defaults_from_policy_config() {
    let policy = PolicyConfig::default();
    assert_eq!(
        Perturbation::relieve_from(&policy),
        Perturbation::RelieveMaintainers {
            daily_rate: 1.0,
            window_days: 365.0,
        }
    );
    assert_eq!(
        Injection::daily_rate_from(&policy),
        Injection::DailyCommitRate {
            rate: 1.0,
            window_days: WindowDays::Uniform(365.0),
        }
    );
}

#[test]
fn policy_injection_grows_with_nb_devs() {
    let ranking = vec![0, 2, 1, 3];
    let sim = PolicySimulator::new(
        fixture(),
        legacy_config(),
        Mode::Dev,
        ranking,
        Injection::MaxValue,
    )
    .unwrap();
    let results = sim.evaluate_sequential(&[1, 2, 3], None).unwrap();
    assert_eq!(results.len(), 3);
    // Each extra synthetic developer adds impact; totals are monotone.
    assert!(results[&1].sum < results[&2].sum);
    assert!(results[&2].sum < results[&3].sum);
}

#[test]
fn policy_parallel_matches_sequential() {
    let sim = PolicySimulator::new(
        fixture(),
        legacy_config(),
        Mode::Dev,
        vec![0, 2, 1, 3],
        Injection::DailyCommitRate {
            rate: 0.001,
            window_days: WindowDays::Uniform(100.0),
        },
    )
    .unwrap();
    let sequential = sim.evaluate_sequential(&[1, 2, 4], None).unwrap();
    let parallel = sim
        .evaluate_parallel(&[1, 2, 4], &ranker_config(2, 2), None, None)
        .unwrap();
    assert_eq!(sequential.len(), parallel.len());
    for (k, m) in &sequential {
        assert!((m.sum - parallel[k].sum).abs() < 1e-9);
    }
}

#[test]
fn policy_cache_checkpoints_by_nb_devs() {
    let cache = ResultCache::open_in_memory().unwrap();
    let sim = PolicySimulator::new(
        fixture(),
        legacy_config(),
        Mode::Dev,
        vec![0, 2, 1, 3],
        Injection::MaxValue,
    )
    .unwrap();
    let first = sim.evaluate_sequential(&[1, 2], Some(&cache)).unwrap();
    assert_eq!(cache.count(CacheKind::Policy).unwrap(), 2);
    let second = sim.evaluate_sequential(&[1, 2], Some(&cache)).unwrap();
    assert_eq!(cache.count(CacheKind::Policy).unwrap(), 2);
    assert_eq!(first, second);
}

#[test]
fn policy_clamps_nb_devs_to_ranking_length() {
    let sim = PolicySimulator::new(
        fixture(),
        legacy_config(),
        Mode::Dev,
        vec![0, 2],
        Injection::MaxValue,
    )
    .unwrap();
    let results = sim.evaluate_sequential(&[10], None).unwrap();
    // Only the two ranked repositories receive a synthetic developer.
    assert!(results.contains_key(&10));
}

#[test]
fn per_repository_window_days_scale_each_target() {
    // Repo 0 was created at the window's end: zero observed days, so its
    // synthetic developer contributes nothing and nb_devs = 1 must match
    // the no-injection run (nb_devs = 0).
    let sim = PolicySimulator::new(
        fixture(),
        legacy_config(),
        Mode::Dev,
        vec![0, 2, 1, 3],
        Injection::DailyCommitRate {
            rate: 1.0,
            window_days: WindowDays::PerRepository(vec![0.0, 10.0, 10.0, 10.0]),
        },
    )
    .unwrap();
    let results = sim.evaluate_sequential(&[0, 1, 2], None).unwrap();
    assert!((results[&1].sum - results[&0].sum).abs() < 1e-12);
    // Repo 2's ten observed days do inject capacity.
    assert!(results[&2].sum > results[&1].sum);

    // Equal per-repository days collapse to the uniform window.
    let per_repo = PolicySimulator::new(
        fixture(),
        legacy_config(),
        Mode::Dev,
        vec![0, 2, 1, 3],
        Injection::DailyCommitRate {
            rate: 1.0,
            window_days: WindowDays::PerRepository(vec![10.0; 4]),
        },
    )
    .unwrap();
    let uniform = PolicySimulator::new(
        fixture(),
        legacy_config(),
        Mode::Dev,
        vec![0, 2, 1, 3],
        Injection::DailyCommitRate {
            rate: 1.0,
            window_days: WindowDays::Uniform(10.0),
        },
    )
    .unwrap();
    let a = per_repo.evaluate_sequential(&[2], None).unwrap();
    let b = uniform.evaluate_sequential(&[2], None).unwrap();
    assert_eq!(a[&2], b[&2]);
}

#[test]
fn per_repository_window_days_must_cover_every_rank() {
    let err = PolicySimulator::new(
        fixture(),
        legacy_config(),
        Mode::Dev,
        vec![0],
        Injection::DailyCommitRate {
            rate: 1.0,
            window_days: WindowDays::PerRepository(vec![10.0; 3]),
        },
    )
    .unwrap_err();
    assert!(matches!(err, SimulationError::Data(_)));
}
