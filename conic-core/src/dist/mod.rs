//! Distributed containers.
//!
//! Row-distributed objects ([`DistMultiVec`], [`DistSparseMatrix`],
//! [`DistMap`]) share one block partition, [`RowPartition`]. Dense
//! element-cyclic matrices ([`DistMatrix`]) live on a [`Grid`] and carry their
//! distribution as a pair of [`Dist`] tags.

mod grid;
mod map;
mod matrix;
mod multivec;
mod sparse;

pub use grid::Grid;
pub use map::DistMap;
pub use matrix::{Dist, DistMatrix};
pub use multivec::DistMultiVec;
pub use sparse::DistSparseMatrix;

/// Block row partition of `height` rows over `comm_size` ranks.
///
/// Every rank but the last owns `blocksize = height / comm_size` rows; the last
/// rank takes the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPartition {
    pub height: usize,
    pub blocksize: usize,
    pub comm_size: usize,
    pub rank: usize,
}

impl RowPartition {
    pub fn new(height: usize, comm_size: usize, rank: usize) -> Self {
        let comm_size = comm_size.max(1);
        Self {
            height,
            blocksize: height / comm_size,
            comm_size,
            rank,
        }
    }

    /// Rank owning global row `i`.
    #[inline]
    pub fn row_owner(&self, i: usize) -> usize {
        if self.blocksize > 0 {
            (i / self.blocksize).min(self.comm_size - 1)
        } else {
            self.comm_size - 1
        }
    }

    #[inline]
    pub fn first_row_of(&self, rank: usize) -> usize {
        rank * self.blocksize
    }

    pub fn local_height_of(&self, rank: usize) -> usize {
        if rank + 1 < self.comm_size {
            self.blocksize
        } else {
            self.height - (self.comm_size - 1) * self.blocksize
        }
    }

    #[inline]
    pub fn first_local_row(&self) -> usize {
        self.first_row_of(self.rank)
    }

    #[inline]
    pub fn local_height(&self) -> usize {
        self.local_height_of(self.rank)
    }

    /// Whether global row `i` is stored here.
    #[inline]
    pub fn is_local(&self, i: usize) -> bool {
        self.row_owner(i) == self.rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_covers_all_rows() {
        for height in [0, 1, 5, 7, 16] {
            for p in 1..=4 {
                let mut seen = vec![0usize; height];
                for rank in 0..p {
                    let part = RowPartition::new(height, p, rank);
                    let first = part.first_local_row();
                    for i in first..first + part.local_height() {
                        assert_eq!(part.row_owner(i), rank);
                        seen[i] += 1;
                    }
                }
                assert!(seen.iter().all(|&s| s == 1), "height={height} p={p}");
            }
        }
    }

    #[test]
    fn test_small_height_lands_on_last_rank() {
        let part = RowPartition::new(2, 4, 3);
        assert_eq!(part.blocksize, 0);
        assert_eq!(part.row_owner(0), 3);
        assert_eq!(part.row_owner(1), 3);
        assert_eq!(part.local_height(), 2);
        assert_eq!(RowPartition::new(2, 4, 1).local_height(), 0);
    }
}
