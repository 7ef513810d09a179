//! Sparse matrix helpers.
//!
//! The factorization backend consumes compressed sparse column storage of the
//! upper triangle, so most helpers here build CSC matrices from triplets.

use sprs::{CsMat, TriMat};

/// Sparse matrix in CSC format.
pub type SparseCsc = CsMat<f64>;

/// Build a sparse CSC matrix from `(row, col, value)` triplets. Duplicates are
/// summed.
pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> SparseCsc
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new((nrows, ncols));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csc()
}

/// Upper triangle of a symmetric matrix given by its full set of triplets.
///
/// Entries below the diagonal are dropped, and an explicit (possibly zero)
/// entry is stored for every diagonal position so that regularization can be
/// applied without changing the sparsity pattern.
pub fn symmetric_upper<I>(n: usize, triplets: I) -> SparseCsc
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new((n, n));
    for i in 0..n {
        tri.add_triplet(i, i, 0.0);
    }
    for (i, j, v) in triplets {
        if i <= j {
            tri.add_triplet(i, j, v);
        }
    }
    tri.to_csc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_triplets_sums_duplicates() {
        let mat = from_triplets(2, 3, vec![(0, 0, 1.0), (1, 2, 2.0), (0, 0, 3.0)]);
        assert_eq!(mat.rows(), 2);
        assert_eq!(mat.cols(), 3);
        assert_eq!(mat.nnz(), 2);
        assert_eq!(mat.get(0, 0), Some(&4.0));
    }

    #[test]
    fn test_symmetric_upper_keeps_diagonal() {
        // [[0, 1], [1, 0]] stored in full
        let mat = symmetric_upper(2, vec![(0, 1, 1.0), (1, 0, 1.0)]);
        assert_eq!(mat.nnz(), 3);
        assert_eq!(mat.get(0, 0), Some(&0.0));
        assert_eq!(mat.get(1, 1), Some(&0.0));
        assert_eq!(mat.get(0, 1), Some(&1.0));
        assert_eq!(mat.get(1, 0), None);
    }
}
