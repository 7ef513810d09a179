//! Row-distributed sparse matrix.

use super::{DistMultiVec, RowPartition};
use crate::comm::Comm;
use crate::error::{Result, SolverError};
use sprs::{CsMat, TriMat};

/// Sparse `height × width` matrix whose rows are block-distributed.
///
/// The local rows are a CSR matrix with local row indices and global column
/// indices.
#[derive(Debug, Clone)]
pub struct DistSparseMatrix<C: Comm> {
    comm: C,
    part: RowPartition,
    width: usize,
    local: CsMat<f64>,
}

impl<C: Comm> DistSparseMatrix<C> {
    /// Assemble from `(row, col, value)` triplets held on any rank.
    ///
    /// Each triplet is routed to the owner of its row; duplicates are summed.
    pub fn from_triplets(
        comm: C,
        height: usize,
        width: usize,
        triplets: Vec<(usize, usize, f64)>,
    ) -> Self {
        let part = RowPartition::new(height, comm.size(), comm.rank());
        let mut send: Vec<Vec<(usize, usize, f64)>> = vec![Vec::new(); comm.size()];
        for (i, j, v) in triplets {
            send[part.row_owner(i)].push((i, j, v));
        }
        let recv = comm.exchange(send).into_iter().flatten();
        Self::from_local_triplets(comm, part, width, recv)
    }

    /// Keep this rank's rows of a replicated matrix.
    pub fn from_global(comm: C, global: &CsMat<f64>) -> Self {
        let part = RowPartition::new(global.rows(), comm.size(), comm.rank());
        let local = global
            .iter()
            .filter(|(_, (i, _))| part.is_local(*i))
            .map(|(&v, (i, j))| (i, j, v));
        Self::from_local_triplets(comm, part, global.cols(), local)
    }

    fn from_local_triplets<I>(comm: C, part: RowPartition, width: usize, triplets: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let first = part.first_local_row();
        let mut tri = TriMat::new((part.local_height(), width));
        for (i, j, v) in triplets {
            tri.add_triplet(i - first, j, v);
        }
        Self {
            comm,
            part,
            width,
            local: tri.to_csr(),
        }
    }

    pub fn comm(&self) -> &C {
        &self.comm
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

    pub fn row_owner(&self, i: usize) -> usize {
        self.part.row_owner(i)
    }

    pub fn local(&self) -> &CsMat<f64> {
        &self.local
    }

    /// Locally stored entries with global indices.
    pub fn local_triplets(&self) -> Vec<(usize, usize, f64)> {
        let first = self.part.first_local_row();
        self.local
            .outer_iterator()
            .enumerate()
            .flat_map(|(i_loc, row)| {
                row.iter()
                    .map(move |(j, &v)| (first + i_loc, j, v))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Every entry of the matrix, replicated on all ranks.
    pub fn global_triplets(&self) -> Vec<(usize, usize, f64)> {
        self.comm
            .all_gather(self.local_triplets())
            .into_iter()
            .flatten()
            .collect()
    }

    /// `y := alpha A x + beta y`
    pub fn multiply(
        &self,
        alpha: f64,
        x: &DistMultiVec<f64, C>,
        beta: f64,
        y: &mut DistMultiVec<f64, C>,
    ) -> Result<()> {
        SolverError::check_dim("A x", self.width, x.height())?;
        SolverError::check_dim("A x output", self.height(), y.height())?;
        let x_global = x.gather();
        let y_local = y.local_mut();
        *y_local *= beta;
        for (i_loc, row) in self.local.outer_iterator().enumerate() {
            for (j, &v) in row.iter() {
                for col in 0..x_global.ncols() {
                    y_local[(i_loc, col)] += alpha * v * x_global[(j, col)];
                }
            }
        }
        Ok(())
    }

    /// `y := alpha A^T x + beta y`
    pub fn multiply_transpose(
        &self,
        alpha: f64,
        x: &DistMultiVec<f64, C>,
        beta: f64,
        y: &mut DistMultiVec<f64, C>,
    ) -> Result<()> {
        SolverError::check_dim("A^T x", self.height(), x.height())?;
        SolverError::check_dim("A^T x output", self.width, y.height())?;
        let width = x.width();
        let mut partial = vec![0.0; self.width * width];
        for (i_loc, row) in self.local.outer_iterator().enumerate() {
            for (j, &v) in row.iter() {
                for col in 0..width {
                    partial[j + col * self.width] += v * x.get_local(i_loc, col);
                }
            }
        }
        // Sum the per-rank partial products in rank order.
        let mut total = vec![0.0; self.width * width];
        for contribution in self.comm.all_gather(partial) {
            for (t, c) in total.iter_mut().zip(contribution) {
                *t += c;
            }
        }
        let first = y.first_local_row();
        let y_local = y.local_mut();
        for i_loc in 0..y_local.nrows() {
            for col in 0..width {
                let entry = &mut y_local[(i_loc, col)];
                *entry = alpha * total[first + i_loc + col * self.width] + beta * *entry;
            }
        }
        Ok(())
    }

    /// `A := diag(d)^{-1} A` using the local rows of `d`.
    pub fn diagonal_solve_rows(&mut self, d: &DistMultiVec<f64, C>) -> Result<()> {
        SolverError::check_dim("row scaling", self.height(), d.height())?;
        let first = self.part.first_local_row();
        let scaled: Vec<_> = self
            .local_triplets()
            .into_iter()
            .map(|(i, j, v)| (i, j, v / d.get_local(i - first, 0)))
            .collect();
        self.local = Self::from_local_triplets(self.comm.clone(), self.part, self.width, scaled).local;
        Ok(())
    }

    /// `A := A diag(d)^{-1}`.
    pub fn diagonal_solve_cols(&mut self, d: &DistMultiVec<f64, C>) -> Result<()> {
        SolverError::check_dim("column scaling", self.width, d.height())?;
        let d_global = d.gather();
        let scaled: Vec<_> = self
            .local_triplets()
            .into_iter()
            .map(|(i, j, v)| (i, j, v / d_global[(j, 0)]))
            .collect();
        self.local = Self::from_local_triplets(self.comm.clone(), self.part, self.width, scaled).local;
        Ok(())
    }

    /// Largest entry magnitude over all ranks.
    pub fn max_norm(&self) -> f64 {
        let local = self.local.data().iter().fold(0.0f64, |m, v| m.max(v.abs()));
        self.comm.all_reduce_max(local)
    }

    /// Replicated symmetric adjacency structure of a square matrix, without
    /// self loops. Rows are sorted and free of duplicates.
    pub fn graph(&self) -> Result<Vec<Vec<usize>>> {
        SolverError::check_dim("graph of square matrix", self.height(), self.width)?;
        let mut adj = vec![Vec::new(); self.height()];
        for (i, j, _) in self.global_triplets() {
            if i != j {
                adj[i].push(j);
                adj[j].push(i);
            }
        }
        for row in adj.iter_mut() {
            row.sort_unstable();
            row.dedup();
        }
        Ok(adj)
    }
}
