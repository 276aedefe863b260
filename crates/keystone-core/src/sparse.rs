//! Sparse matrix kernel — CSR over `f64`.
//!
//! The propagation fixed point is pure sparse linear algebra: matmul against
//! the dependency matrix, element-wise blending of two contribution sources,
//! row masking for vaccination. Everything the engine needs lives here;
//! nothing here knows about repositories or developers.
//!
//! Element-wise results prune exact zeros, so `nnz() == 0` means structural
//! emptiness. The fixed-point termination test relies on that.

use crate::errors::DataError;

/// Compressed sparse row matrix over `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// All-zero matrix with the given shape.
    pub fn zero(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_ptr: vec![0; rows + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Identity matrix of size `n`.
    pub fn identity(n: usize) -> Self {
        Self {
            rows: n,
            cols: n,
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    /// Build from `(row, col, value)` triplets.
    ///
    /// Duplicates are summed, exact zeros dropped. Out-of-bounds triplets
    /// and negative values are rejected — the engine only ever works with
    /// non-negative contribution and dependency weights.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self, DataError> {
        for &(r, c, v) in triplets {
            if r >= rows || c >= cols {
                return Err(DataError::ShapeMismatch {
                    context: "triplet",
                    expected: format!("< ({rows}, {cols})"),
                    actual: format!("({r}, {c})"),
                });
            }
            if v < 0.0 {
                return Err(DataError::NegativeEntry { row: r, col: c });
            }
        }
        let mut sorted: Vec<(usize, usize, f64)> = triplets.to_vec();
        sorted.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx = Vec::with_capacity(sorted.len());
        let mut values: Vec<f64> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;
        for (r, c, v) in sorted {
            if last == Some((r, c)) {
                *values.last_mut().unwrap() += v;
            } else {
                row_ptr[r + 1] += 1;
                col_idx.push(c);
                values.push(v);
                last = Some((r, c));
            }
        }
        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }
        let mut m = Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        };
        m.prune();
        Ok(m)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored (nonzero) entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entry accessor, O(log row-degree). Intended for tests and reporting,
    /// not for hot loops.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let span = &self.col_idx[self.row_ptr[row]..self.row_ptr[row + 1]];
        match span.binary_search(&col) {
            Ok(i) => self.values[self.row_ptr[row] + i],
            Err(_) => 0.0,
        }
    }

    /// Stored entries of one row as `(col, value)` pairs.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let lo = self.row_ptr[row];
        let hi = self.row_ptr[row + 1];
        self.col_idx[lo..hi]
            .iter()
            .copied()
            .zip(self.values[lo..hi].iter().copied())
    }

    /// All stored entries as `(row, col, value)` triplets.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.rows).flat_map(move |r| self.row(r).map(move |(c, v)| (r, c, v)))
    }

    /// Largest stored value in a row, or 0.0 for an empty row.
    pub fn row_max(&self, row: usize) -> f64 {
        self.row(row).map(|(_, v)| v).fold(0.0, f64::max)
    }

    /// Sparse matrix product `self · rhs`.
    ///
    /// Row-by-row SpGEMM with a dense accumulator over the output row.
    pub fn matmul(&self, rhs: &CsrMatrix) -> Result<CsrMatrix, DataError> {
        if self.cols != rhs.rows {
            return Err(DataError::ShapeMismatch {
                context: "matmul",
                expected: format!("lhs.cols == rhs.rows == {}", self.cols),
                actual: format!("{}", rhs.rows),
            });
        }
        let mut acc = vec![0.0f64; rhs.cols];
        let mut touched: Vec<usize> = Vec::new();

        let mut row_ptr = Vec::with_capacity(self.rows + 1);
        row_ptr.push(0usize);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();

        for r in 0..self.rows {
            for (k, a) in self.row(r) {
                for (c, b) in rhs.row(k) {
                    if acc[c] == 0.0 {
                        touched.push(c);
                    }
                    acc[c] += a * b;
                }
            }
            touched.sort_unstable();
            for &c in &touched {
                let v = acc[c];
                acc[c] = 0.0;
                if v != 0.0 {
                    col_idx.push(c);
                    values.push(v);
                }
            }
            touched.clear();
            row_ptr.push(col_idx.len());
        }
        Ok(CsrMatrix {
            rows: self.rows,
            cols: rhs.cols,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// Element-wise merge over the union of stored entries.
    ///
    /// `f` must satisfy `f(0, 0) == 0`; exact zeros in the result are
    /// pruned. This one primitive carries every aggregation law and the
    /// fixed-point delta test.
    pub fn zip_union<F>(&self, rhs: &CsrMatrix, f: F) -> Result<CsrMatrix, DataError>
    where
        F: Fn(f64, f64) -> f64,
    {
        if self.rows != rhs.rows || self.cols != rhs.cols {
            return Err(DataError::ShapeMismatch {
                context: "zip_union",
                expected: format!("({}, {})", self.rows, self.cols),
                actual: format!("({}, {})", rhs.rows, rhs.cols),
            });
        }
        let mut row_ptr = Vec::with_capacity(self.rows + 1);
        row_ptr.push(0usize);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();

        for r in 0..self.rows {
            let mut left = self.row(r).peekable();
            let mut right = rhs.row(r).peekable();
            loop {
                let v = match (left.peek().copied(), right.peek().copied()) {
                    (Some((lc, lv)), Some((rc, rv))) => {
                        if lc < rc {
                            left.next();
                            (lc, f(lv, 0.0))
                        } else if rc < lc {
                            right.next();
                            (rc, f(0.0, rv))
                        } else {
                            left.next();
                            right.next();
                            (lc, f(lv, rv))
                        }
                    }
                    (Some((lc, lv)), None) => {
                        left.next();
                        (lc, f(lv, 0.0))
                    }
                    (None, Some((rc, rv))) => {
                        right.next();
                        (rc, f(0.0, rv))
                    }
                    (None, None) => break,
                };
                if v.1 != 0.0 {
                    col_idx.push(v.0);
                    values.push(v.1);
                }
            }
            row_ptr.push(col_idx.len());
        }
        Ok(CsrMatrix {
            rows: self.rows,
            cols: self.cols,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// Element-wise sum.
    pub fn add(&self, rhs: &CsrMatrix) -> Result<CsrMatrix, DataError> {
        self.zip_union(rhs, |a, b| a + b)
    }

    /// Apply `f` to every stored entry, pruning exact zeros afterwards.
    /// Entries not stored are untouched, matching the "transform each
    /// nonzero" semantics of the aggregation laws.
    pub fn map_nonzeros<F>(&self, f: F) -> CsrMatrix
    where
        F: Fn(f64) -> f64,
    {
        let mut out = self.clone();
        for v in &mut out.values {
            *v = f(*v);
        }
        out.prune();
        out
    }

    /// Clamp every stored entry to at most `cap`.
    pub fn clamp_max(&self, cap: f64) -> CsrMatrix {
        self.map_nonzeros(|v| v.min(cap))
    }

    /// Zero out entire rows. `rows` must be sorted ascending.
    pub fn zero_rows(&self, rows: &[usize]) -> CsrMatrix {
        let mut out = self.clone();
        for &r in rows {
            let lo = out.row_ptr[r];
            let hi = out.row_ptr[r + 1];
            for v in &mut out.values[lo..hi] {
                *v = 0.0;
            }
        }
        out.prune();
        out
    }

    /// Scale row `r` by `weights[r]`.
    pub fn scale_rows(&self, weights: &[f64]) -> Result<CsrMatrix, DataError> {
        if weights.len() != self.rows {
            return Err(DataError::ShapeMismatch {
                context: "scale_rows",
                expected: format!("{}", self.rows),
                actual: format!("{}", weights.len()),
            });
        }
        let mut out = self.clone();
        for r in 0..self.rows {
            let lo = out.row_ptr[r];
            let hi = out.row_ptr[r + 1];
            for v in &mut out.values[lo..hi] {
                *v *= weights[r];
            }
        }
        out.prune();
        Ok(out)
    }

    /// Per-column totals of `weights[r] * self[r, c]` — the scalarization
    /// that turns a status matrix into one number per seed.
    pub fn weighted_column_sums(&self, weights: &[f64]) -> Result<Vec<f64>, DataError> {
        if weights.len() != self.rows {
            return Err(DataError::ShapeMismatch {
                context: "weighted_column_sums",
                expected: format!("{}", self.rows),
                actual: format!("{}", weights.len()),
            });
        }
        let mut totals = vec![0.0f64; self.cols];
        for r in 0..self.rows {
            let w = weights[r];
            if w == 0.0 {
                continue;
            }
            for (c, v) in self.row(r) {
                totals[c] += w * v;
            }
        }
        Ok(totals)
    }

    /// Stack `copies` copies of `self` vertically.
    pub fn vstack_tile(&self, copies: usize) -> CsrMatrix {
        let mut row_ptr = Vec::with_capacity(self.rows * copies + 1);
        row_ptr.push(0usize);
        let mut col_idx = Vec::with_capacity(self.nnz() * copies);
        let mut values = Vec::with_capacity(self.nnz() * copies);
        for _ in 0..copies {
            for r in 0..self.rows {
                for (c, v) in self.row(r) {
                    col_idx.push(c);
                    values.push(v);
                }
                row_ptr.push(col_idx.len());
            }
        }
        CsrMatrix {
            rows: self.rows * copies,
            cols: self.cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Stack distinct matrices vertically. All inputs must share a column
    /// count; an empty input list is a shape error.
    pub fn vstack(mats: &[CsrMatrix]) -> Result<CsrMatrix, DataError> {
        let cols = match mats.first() {
            Some(m) => m.cols,
            None => {
                return Err(DataError::ShapeMismatch {
                    context: "vstack",
                    expected: ">= 1 matrix".to_string(),
                    actual: "0".to_string(),
                })
            }
        };
        let mut row_ptr = vec![0usize];
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        let mut rows = 0usize;
        for m in mats {
            if m.cols != cols {
                return Err(DataError::ShapeMismatch {
                    context: "vstack",
                    expected: format!("{cols} cols"),
                    actual: format!("{}", m.cols),
                });
            }
            for r in 0..m.rows {
                for (c, v) in m.row(r) {
                    col_idx.push(c);
                    values.push(v);
                }
                row_ptr.push(col_idx.len());
            }
            rows += m.rows;
        }
        Ok(CsrMatrix {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// Place `copies` copies of `self` along the block diagonal.
    pub fn block_diag_tile(&self, copies: usize) -> CsrMatrix {
        let mut row_ptr = Vec::with_capacity(self.rows * copies + 1);
        row_ptr.push(0usize);
        let mut col_idx = Vec::with_capacity(self.nnz() * copies);
        let mut values = Vec::with_capacity(self.nnz() * copies);
        for block in 0..copies {
            let offset = block * self.cols;
            for r in 0..self.rows {
                for (c, v) in self.row(r) {
                    col_idx.push(c + offset);
                    values.push(v);
                }
                row_ptr.push(col_idx.len());
            }
        }
        CsrMatrix {
            rows: self.rows * copies,
            cols: self.cols * copies,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Copy of the row range `[start, end)` as its own matrix.
    pub fn slice_rows(&self, start: usize, end: usize) -> CsrMatrix {
        debug_assert!(start <= end && end <= self.rows);
        let lo = self.row_ptr[start];
        let hi = self.row_ptr[end];
        let row_ptr = self.row_ptr[start..=end].iter().map(|p| p - lo).collect();
        CsrMatrix {
            rows: end - start,
            cols: self.cols,
            row_ptr,
            col_idx: self.col_idx[lo..hi].to_vec(),
            values: self.values[lo..hi].to_vec(),
        }
    }

    /// Drop stored entries that are exactly zero.
    fn prune(&mut self) {
        if !self.values.iter().any(|&v| v == 0.0) {
            return;
        }
        let mut write = 0usize;
        let mut new_ptr = vec![0usize; self.rows + 1];
        for r in 0..self.rows {
            for i in self.row_ptr[r]..self.row_ptr[r + 1] {
                if self.values[i] != 0.0 {
                    self.col_idx[write] = self.col_idx[i];
                    self.values[write] = self.values[i];
                    write += 1;
                }
            }
            new_ptr[r + 1] = write;
        }
        self.col_idx.truncate(write);
        self.values.truncate(write);
        self.row_ptr = new_ptr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> CsrMatrix {
        CsrMatrix::from_triplets(3, 3, &[(0, 1, 2.0), (1, 0, 1.0), (1, 2, 3.0), (2, 2, 4.0)])
            .unwrap()
    }

    #[test]
    fn from_triplets_sums_duplicates_and_prunes_zeros() {
        let m =
            CsrMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (0, 0, 2.0), (1, 1, 0.0)]).unwrap();
        assert_eq!(m.nnz(), 1);
        assert_eq!(m.get(0, 0), 3.0);
        assert_eq!(m.get(1, 1), 0.0);
    }

    #[test]
    fn from_triplets_rejects_negative_and_out_of_bounds() {
        assert!(CsrMatrix::from_triplets(2, 2, &[(0, 0, -1.0)]).is_err());
        assert!(CsrMatrix::from_triplets(2, 2, &[(2, 0, 1.0)]).is_err());
    }

    #[test]
    fn identity_matmul_is_noop() {
        let m = fixture();
        let i = CsrMatrix::identity(3);
        assert_eq!(m.matmul(&i).unwrap(), m);
        assert_eq!(i.matmul(&m).unwrap(), m);
    }

    #[test]
    fn matmul_rejects_shape_mismatch() {
        let m = fixture();
        let bad = CsrMatrix::zero(4, 3);
        assert!(m.matmul(&bad).is_err());
    }

    #[test]
    fn matmul_small_known_product() {
        let a = CsrMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (0, 1, 2.0), (1, 1, 3.0)]).unwrap();
        let b = CsrMatrix::from_triplets(2, 2, &[(0, 0, 4.0), (1, 0, 5.0), (1, 1, 6.0)]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.get(0, 0), 14.0);
        assert_eq!(c.get(0, 1), 12.0);
        assert_eq!(c.get(1, 0), 15.0);
        assert_eq!(c.get(1, 1), 18.0);
    }

    #[test]
    fn zip_union_subtraction_of_equal_matrices_is_structurally_empty() {
        let m = fixture();
        let d = m.zip_union(&m, |a, b| a - b).unwrap();
        assert!(d.is_empty());
    }

    #[test]
    fn zip_union_covers_disjoint_entries() {
        let a = CsrMatrix::from_triplets(1, 3, &[(0, 0, 1.0)]).unwrap();
        let b = CsrMatrix::from_triplets(1, 3, &[(0, 2, 2.0)]).unwrap();
        let c = a.add(&b).unwrap();
        assert_eq!(c.get(0, 0), 1.0);
        assert_eq!(c.get(0, 2), 2.0);
        assert_eq!(c.nnz(), 2);
    }

    #[test]
    fn zero_rows_masks_and_prunes() {
        let m = fixture();
        let z = m.zero_rows(&[1]);
        assert_eq!(z.get(1, 0), 0.0);
        assert_eq!(z.get(1, 2), 0.0);
        assert_eq!(z.get(0, 1), 2.0);
        assert_eq!(z.nnz(), 2);
    }

    #[test]
    fn weighted_column_sums_scalarizes() {
        let m = fixture();
        let totals = m.weighted_column_sums(&[10.0, 1.0, 0.5]).unwrap();
        assert_eq!(totals, vec![1.0, 20.0, 5.0]);
    }

    #[test]
    fn block_diag_and_vstack_tile_shapes() {
        let m = fixture();
        let bd = m.block_diag_tile(3);
        assert_eq!((bd.rows(), bd.cols()), (9, 9));
        assert_eq!(bd.get(4, 3), m.get(1, 0));
        let vs = m.vstack_tile(2);
        assert_eq!((vs.rows(), vs.cols()), (6, 3));
        assert_eq!(vs.get(4, 0), m.get(1, 0));
    }

    #[test]
    fn slice_rows_inverts_vstack() {
        let m = fixture();
        let vs = m.vstack_tile(3);
        for block in 0..3 {
            assert_eq!(vs.slice_rows(block * 3, block * 3 + 3), m);
        }
    }

    #[test]
    fn vstack_requires_matching_cols() {
        let m = fixture();
        let stacked = CsrMatrix::vstack(&[m.clone(), m.clone()]).unwrap();
        assert_eq!(stacked, m.vstack_tile(2));
        assert!(CsrMatrix::vstack(&[m, CsrMatrix::zero(1, 2)]).is_err());
        assert!(CsrMatrix::vstack(&[]).is_err());
    }

    #[test]
    fn row_max_handles_empty_rows() {
        let m = CsrMatrix::from_triplets(2, 2, &[(0, 0, 0.3), (0, 1, 0.9)]).unwrap();
        assert_eq!(m.row_max(0), 0.9);
        assert_eq!(m.row_max(1), 0.0);
    }
}
