//! Row-distributed multivector.

use super::RowPartition;
use crate::comm::Comm;
use nalgebra::{DMatrix, Scalar};
use num_traits::Zero;

/// Dense `height × width` block of rows spread over a communicator.
///
/// Rank `q` stores rows `first_row_of(q) .. first_row_of(q) + local_height_of(q)`
/// of the global matrix in a local `DMatrix`.
#[derive(Debug, Clone)]
pub struct DistMultiVec<T: Scalar, C: Comm> {
    comm: C,
    part: RowPartition,
    width: usize,
    local: DMatrix<T>,
}

impl<T, C> DistMultiVec<T, C>
where
    T: Scalar + Zero + Send,
    C: Comm,
{
    /// Zero-filled multivector.
    pub fn new(comm: C, height: usize, width: usize) -> Self {
        let part = RowPartition::new(height, comm.size(), comm.rank());
        let local = DMatrix::zeros(part.local_height(), width);
        Self {
            comm,
            part,
            width,
            local,
        }
    }

    /// Keep this rank's rows of a replicated global matrix.
    pub fn from_global(comm: C, global: &DMatrix<T>) -> Self {
        let mut v = Self::new(comm, global.nrows(), global.ncols());
        let first = v.part.first_local_row();
        let local_height = v.part.local_height();
        v.local = global.rows(first, local_height).into_owned();
        v
    }

    /// Build a single-column vector from `(global row, value)` pairs held on
    /// arbitrary ranks. Each pair is routed to the owner of its row; rows
    /// nobody supplies stay zero and duplicate rows keep the last arrival.
    pub fn from_entries(comm: C, height: usize, entries: Vec<(usize, T)>) -> Self {
        let mut v = Self::new(comm, height, 1);
        let mut send: Vec<Vec<(usize, T)>> = vec![Vec::new(); v.comm.size()];
        for (i, value) in entries {
            send[v.part.row_owner(i)].push((i, value));
        }
        let first = v.part.first_local_row();
        for (i, value) in v.comm.exchange(send).into_iter().flatten() {
            v.local[(i - first, 0)] = value;
        }
        v
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn partition(&self) -> RowPartition {
        self.part
    }

    pub fn height(&self) -> usize {
        self.part.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn local_height(&self) -> usize {
        self.part.local_height()
    }

    pub fn first_local_row(&self) -> usize {
        self.part.first_local_row()
    }

    pub fn blocksize(&self) -> usize {
        self.part.blocksize
    }

    /// Rank owning global row `i`.
    pub fn row_owner(&self, i: usize) -> usize {
        self.part.row_owner(i)
    }

    pub fn global_row(&self, i_loc: usize) -> usize {
        self.part.first_local_row() + i_loc
    }

    pub fn get_local(&self, i_loc: usize, j: usize) -> T {
        self.local[(i_loc, j)].clone()
    }

    pub fn set_local(&mut self, i_loc: usize, j: usize, value: T) {
        self.local[(i_loc, j)] = value;
    }

    pub fn local(&self) -> &DMatrix<T> {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut DMatrix<T> {
        &mut self.local
    }

    /// Reshape to `height × width`, discarding the contents.
    pub fn resize(&mut self, height: usize, width: usize) {
        self.part = RowPartition::new(height, self.comm.size(), self.comm.rank());
        self.width = width;
        self.local = DMatrix::zeros(self.part.local_height(), width);
    }

    /// Replicate the full matrix on every rank.
    pub fn gather(&self) -> DMatrix<T> {
        let blocks = self.comm.all_gather(self.local.as_slice().to_vec());
        let mut global = DMatrix::zeros(self.height(), self.width);
        for (q, block) in blocks.into_iter().enumerate() {
            let first = self.part.first_row_of(q);
            let local_height = self.part.local_height_of(q);
            if local_height == 0 {
                continue;
            }
            let piece = DMatrix::from_column_slice(local_height, self.width, &block);
            global.rows_mut(first, local_height).copy_from(&piece);
        }
        global
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SelfComm, ThreadComm};

    #[test]
    fn test_from_global_and_gather() {
        let global = DMatrix::from_fn(7, 2, |i, j| (10 * i + j) as f64);
        let gathered = ThreadComm::run(3, |comm| {
            let v = DistMultiVec::from_global(comm, &global);
            assert_eq!(v.local_height(), if v.comm().rank() == 2 { 3 } else { 2 });
            for i_loc in 0..v.local_height() {
                let i = v.global_row(i_loc);
                assert_eq!(v.get_local(i_loc, 1), (10 * i + 1) as f64);
            }
            v.gather()
        });
        for g in gathered {
            assert_eq!(g, global);
        }
    }

    #[test]
    fn test_from_entries_routes_to_owner() {
        let results = ThreadComm::run(2, |comm| {
            // every rank contributes the entries for the other rank's rows
            let rank = comm.rank();
            let entries = (0..5)
                .filter(|i| (i % 2) == rank)
                .map(|i| (i, i as f64 * 1.5))
                .collect();
            DistMultiVec::from_entries(comm, 5, entries).gather()
        });
        for g in results {
            for i in 0..5 {
                assert_eq!(g[(i, 0)], i as f64 * 1.5);
            }
        }
    }

    #[test]
    fn test_resize_zeroes() {
        let mut v = DistMultiVec::<f64, _>::new(SelfComm, 3, 1);
        v.set_local(1, 0, 4.0);
        v.resize(5, 2);
        assert_eq!(v.height(), 5);
        assert_eq!(v.width(), 2);
        assert!(v.local().iter().all(|&x| x == 0.0));
    }
}
