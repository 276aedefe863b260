//! Dense rank index — bijection between stable identifiers and `[0, N)`.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::errors::DataError;

/// Bijection between a domain's stable identifiers (repository id,
/// developer id) and dense 0-based ranks.
///
/// Ranks are what the numeric engine operates on; they are recomputed per
/// run and are not persisted identity.
#[derive(Debug, Clone)]
pub struct RankIndex<K: Eq + Hash + Clone> {
    direct: Vec<K>,
    indirect: FxHashMap<K, usize>,
}

impl<K: Eq + Hash + Clone> RankIndex<K> {
    /// Build an index from identifiers in rank order. Duplicates are
    /// rejected — a rank index must be a bijection.
    pub fn from_ids<I: IntoIterator<Item = K>>(ids: I) -> Result<Self, DataError> {
        let direct: Vec<K> = ids.into_iter().collect();
        let mut indirect = FxHashMap::default();
        for (rank, id) in direct.iter().enumerate() {
            if indirect.insert(id.clone(), rank).is_some() {
                return Err(DataError::DuplicateId);
            }
        }
        Ok(Self { direct, indirect })
    }

    /// Number of ranked identifiers.
    pub fn len(&self) -> usize {
        self.direct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty()
    }

    /// Stable identifier for a rank.
    pub fn id(&self, rank: usize) -> Option<&K> {
        self.direct.get(rank)
    }

    /// Rank for a stable identifier.
    pub fn rank(&self, id: &K) -> Option<usize> {
        self.indirect.get(id).copied()
    }

    /// Like [`id`](Self::id) but with a typed out-of-bounds error.
    pub fn try_id(&self, rank: usize, kind: &'static str) -> Result<&K, DataError> {
        self.direct.get(rank).ok_or(DataError::RankOutOfBounds {
            kind,
            rank,
            size: self.direct.len(),
        })
    }

    /// All ranks in order.
    pub fn ranks(&self) -> std::ops::Range<usize> {
        0..self.direct.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ids_and_ranks() {
        let idx = RankIndex::from_ids(vec!["a", "b", "c"]).unwrap();
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.rank(&"b"), Some(1));
        assert_eq!(idx.id(2), Some(&"c"));
        assert_eq!(idx.rank(&"z"), None);
    }

    #[test]
    fn rejects_duplicate_ids() {
        assert!(RankIndex::from_ids(vec![1u64, 2, 1]).is_err());
    }

    #[test]
    fn try_id_reports_bounds() {
        let idx = RankIndex::from_ids(vec![10u64]).unwrap();
        let err = idx.try_id(5, "repository").unwrap_err();
        assert!(matches!(err, DataError::RankOutOfBounds { rank: 5, .. }));
    }
}
