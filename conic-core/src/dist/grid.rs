//! Two-dimensional process grid.

use crate::comm::Comm;
use crate::error::{Result, SolverError};

/// `height × width` arrangement of the ranks of a communicator, stored
/// column-major: rank `q` sits at row `q % height`, column `q / height`.
#[derive(Debug, Clone)]
pub struct Grid<C: Comm> {
    comm: C,
    height: usize,
}

impl<C: Comm> Grid<C> {
    /// Grid whose height is the largest divisor of the process count that does
    /// not exceed its square root.
    pub fn new(comm: C) -> Self {
        let p = comm.size();
        let mut height = (p as f64).sqrt() as usize;
        while height > 1 && p % height != 0 {
            height -= 1;
        }
        Self {
            comm,
            height: height.max(1),
        }
    }

    pub fn with_height(comm: C, height: usize) -> Result<Self> {
        if height == 0 || comm.size() % height != 0 {
            return Err(SolverError::InvalidConfig(format!(
                "grid height {} does not divide {} processes",
                height,
                comm.size()
            )));
        }
        Ok(Self { comm, height })
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.comm.size() / self.height
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// Row of rank `q` in the grid.
    pub fn mc_rank_of(&self, q: usize) -> usize {
        q % self.height
    }

    /// Column of rank `q` in the grid.
    pub fn mr_rank_of(&self, q: usize) -> usize {
        q / self.height
    }

    /// Position of rank `q` in the row-major ordering of the grid.
    pub fn vr_rank_of(&self, q: usize) -> usize {
        self.mr_rank_of(q) + self.mc_rank_of(q) * self.width()
    }

    pub fn mc_rank(&self) -> usize {
        self.mc_rank_of(self.comm.rank())
    }

    pub fn mr_rank(&self) -> usize {
        self.mr_rank_of(self.comm.rank())
    }

    pub fn vc_rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn vr_rank(&self) -> usize {
        self.vr_rank_of(self.comm.rank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SelfComm, ThreadComm};

    #[test]
    fn test_grid_shapes() {
        assert_eq!(Grid::new(SelfComm).height(), 1);
        let shapes = ThreadComm::run(6, |comm| {
            let g = Grid::new(comm);
            (g.height(), g.width())
        });
        assert!(shapes.iter().all(|&s| s == (2, 3)));
        let shapes = ThreadComm::run(4, |comm| {
            let g = Grid::new(comm);
            (g.height(), g.width())
        });
        assert!(shapes.iter().all(|&s| s == (2, 2)));
    }

    #[test]
    fn test_vr_is_a_permutation() {
        let ranks = ThreadComm::run(6, |comm| Grid::new(comm).vr_rank());
        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_bad_height() {
        assert!(Grid::with_height(SelfComm, 2).is_err());
    }
}
