//! Graph source boundary.
//!
//! The surrounding ETL system (crawlers, identity merge, bot filtering)
//! materializes matrices behind this trait. All retrieval I/O happens here,
//! before any parallel simulation begins; workers only ever see
//! already-built matrices.

use rustc_hash::FxHashMap;

use crate::errors::DataError;
use crate::rank::RankIndex;
use crate::sparse::CsrMatrix;

/// Contribution matrix plus the rank indices it was built against.
#[derive(Debug, Clone)]
pub struct ContributionSnapshot {
    /// Repositories × developers, non-negative commit shares or counts.
    pub matrix: CsrMatrix,
    pub repos: RankIndex<u64>,
    pub devs: RankIndex<u64>,
}

/// Dependency matrix plus the repository rank index it was built against.
#[derive(Debug, Clone)]
pub struct DependencySnapshot {
    /// Repositories × repositories, row-stochastic, zero diagonal.
    pub matrix: CsrMatrix,
    pub repos: RankIndex<u64>,
}

/// Supplier of the raw ecosystem graph for one time window.
pub trait GraphSource {
    /// Developer contribution shares per repository inside
    /// `[start_time, end_time]`, bot identities excluded upstream.
    fn contribution_matrix(
        &self,
        start_time: i64,
        end_time: i64,
    ) -> Result<ContributionSnapshot, DataError>;

    /// Dependency shares at the `ref_time` snapshot. `filtered` excludes
    /// edges marked by the external curation step.
    fn dependency_matrix(
        &self,
        ref_time: i64,
        filtered: bool,
    ) -> Result<DependencySnapshot, DataError>;

    /// Popularity weights (e.g. download counts) per repository rank,
    /// used only to scalarize status matrices.
    fn repository_weights(&self) -> Result<Vec<f64>, DataError>;

    /// Human-readable labels per repository rank, for reporting only.
    fn repository_labels(&self) -> Result<FxHashMap<usize, String>, DataError>;
}

/// In-memory source over pre-materialized snapshots.
///
/// Window and snapshot-time arguments are ignored: the held matrices were
/// already restricted to one window by whoever built them.
#[derive(Debug, Clone)]
pub struct MemoryGraphSource {
    contribution: ContributionSnapshot,
    dependency: DependencySnapshot,
    weights: Vec<f64>,
    labels: FxHashMap<usize, String>,
}

impl MemoryGraphSource {
    pub fn new(
        contribution: ContributionSnapshot,
        dependency: DependencySnapshot,
        weights: Vec<f64>,
        labels: FxHashMap<usize, String>,
    ) -> Self {
        Self {
            contribution,
            dependency,
            weights,
            labels,
        }
    }
}

impl GraphSource for MemoryGraphSource {
    fn contribution_matrix(
        &self,
        _start_time: i64,
        _end_time: i64,
    ) -> Result<ContributionSnapshot, DataError> {
        Ok(self.contribution.clone())
    }

    fn dependency_matrix(
        &self,
        _ref_time: i64,
        _filtered: bool,
    ) -> Result<DependencySnapshot, DataError> {
        Ok(self.dependency.clone())
    }

    fn repository_weights(&self) -> Result<Vec<f64>, DataError> {
        Ok(self.weights.clone())
    }

    fn repository_labels(&self) -> Result<FxHashMap<usize, String>, DataError> {
        Ok(self.labels.clone())
    }
}
