//! Element-cyclic dense matrices over a process grid.
//!
//! A [`DistMatrix`] distributes its rows according to one [`Dist`] tag and its
//! columns according to another. The common pairs are:
//!
//! | layout    | rows owned by              | columns owned by          |
//! |-----------|----------------------------|---------------------------|
//! | `[MC,MR]` | grid row, cyclic           | grid column, cyclic       |
//! | `[*,*]`   | everyone                   | everyone                  |
//! | `[MC,*]`  | grid row, cyclic           | everyone                  |
//! | `[*,MR]`  | everyone                   | grid column, cyclic       |
//! | `[*,VR]`  | everyone                   | all ranks, row-major order|
//! | `[VR,*]`  | all ranks, row-major order | everyone                  |
//!
//! Global row `i` lives on the ranks whose distribution rank equals
//! `(i + col_align) % col_stride`. Redistribution goes through a replicated
//! gather, which is simple and exact but not communication-optimal.

use super::Grid;
use crate::comm::Comm;
use crate::error::{Result, SolverError};
use nalgebra::{DMatrix, Scalar};
use num_traits::Zero;
use std::ops::Range;

/// Distribution of one matrix dimension over a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dist {
    /// Cyclic over the grid rows.
    Mc,
    /// Cyclic over the grid columns.
    Mr,
    /// Cyclic over all ranks in column-major order.
    Vc,
    /// Cyclic over all ranks in row-major order.
    Vr,
    /// Replicated.
    Star,
}

impl Dist {
    fn stride<C: Comm>(self, grid: &Grid<C>) -> usize {
        match self {
            Dist::Mc => grid.height(),
            Dist::Mr => grid.width(),
            Dist::Vc | Dist::Vr => grid.size(),
            Dist::Star => 1,
        }
    }

    fn rank_of<C: Comm>(self, grid: &Grid<C>, q: usize) -> usize {
        match self {
            Dist::Mc => grid.mc_rank_of(q),
            Dist::Mr => grid.mr_rank_of(q),
            Dist::Vc => q,
            Dist::Vr => grid.vr_rank_of(q),
            Dist::Star => 0,
        }
    }
}

#[inline]
fn shift(rank: usize, align: usize, stride: usize) -> usize {
    (rank + stride - align % stride) % stride
}

#[inline]
fn length(n: usize, shift: usize, stride: usize) -> usize {
    if n > shift {
        (n - shift - 1) / stride + 1
    } else {
        0
    }
}

/// Dense matrix distributed element-cyclically over a [`Grid`].
#[derive(Debug, Clone)]
pub struct DistMatrix<T: Scalar, C: Comm> {
    grid: Grid<C>,
    col_dist: Dist,
    row_dist: Dist,
    col_align: usize,
    row_align: usize,
    height: usize,
    width: usize,
    local: DMatrix<T>,
}

impl<T, C> DistMatrix<T, C>
where
    T: Scalar + Zero + Send,
    C: Comm,
{
    /// Zero matrix with both alignments at zero.
    pub fn new(grid: &Grid<C>, col_dist: Dist, row_dist: Dist, height: usize, width: usize) -> Self {
        Self::new_aligned(grid, col_dist, row_dist, height, width, 0, 0)
    }

    pub fn new_aligned(
        grid: &Grid<C>,
        col_dist: Dist,
        row_dist: Dist,
        height: usize,
        width: usize,
        col_align: usize,
        row_align: usize,
    ) -> Self {
        let col_stride = col_dist.stride(grid);
        let row_stride = row_dist.stride(grid);
        let col_align = col_align % col_stride;
        let row_align = row_align % row_stride;
        let q = grid.comm().rank();
        let local_height = length(height, shift(col_dist.rank_of(grid, q), col_align, col_stride), col_stride);
        let local_width = length(width, shift(row_dist.rank_of(grid, q), row_align, row_stride), row_stride);
        Self {
            grid: grid.clone(),
            col_dist,
            row_dist,
            col_align,
            row_align,
            height,
            width,
            local: DMatrix::zeros(local_height, local_width),
        }
    }

    /// Keep this rank's entries of a replicated global matrix.
    pub fn from_global(grid: &Grid<C>, col_dist: Dist, row_dist: Dist, global: &DMatrix<T>) -> Self {
        let mut a = Self::new(grid, col_dist, row_dist, global.nrows(), global.ncols());
        a.fill_from_global(global);
        a
    }

    fn fill_from_global(&mut self, global: &DMatrix<T>) {
        for j_loc in 0..self.local.ncols() {
            let j = self.global_col(j_loc);
            for i_loc in 0..self.local.nrows() {
                let i = self.global_row(i_loc);
                self.local[(i_loc, j_loc)] = global[(i, j)].clone();
            }
        }
    }

    pub fn grid(&self) -> &Grid<C> {
        &self.grid
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn dists(&self) -> (Dist, Dist) {
        (self.col_dist, self.row_dist)
    }

    pub fn col_align(&self) -> usize {
        self.col_align
    }

    pub fn row_align(&self) -> usize {
        self.row_align
    }

    pub fn col_stride(&self) -> usize {
        self.col_dist.stride(&self.grid)
    }

    pub fn row_stride(&self) -> usize {
        self.row_dist.stride(&self.grid)
    }

    pub fn col_shift(&self) -> usize {
        self.col_shift_of(self.grid.comm().rank())
    }

    pub fn row_shift(&self) -> usize {
        self.row_shift_of(self.grid.comm().rank())
    }

    fn col_shift_of(&self, q: usize) -> usize {
        shift(self.col_dist.rank_of(&self.grid, q), self.col_align, self.col_stride())
    }

    fn row_shift_of(&self, q: usize) -> usize {
        shift(self.row_dist.rank_of(&self.grid, q), self.row_align, self.row_stride())
    }

    pub fn local_height(&self) -> usize {
        self.local.nrows()
    }

    pub fn local_width(&self) -> usize {
        self.local.ncols()
    }

    #[inline]
    pub fn global_row(&self, i_loc: usize) -> usize {
        self.col_shift() + i_loc * self.col_stride()
    }

    #[inline]
    pub fn global_col(&self, j_loc: usize) -> usize {
        self.row_shift() + j_loc * self.row_stride()
    }

    pub fn local(&self) -> &DMatrix<T> {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut DMatrix<T> {
        &mut self.local
    }

    pub fn get_local(&self, i_loc: usize, j_loc: usize) -> T {
        self.local[(i_loc, j_loc)].clone()
    }

    pub fn set_local(&mut self, i_loc: usize, j_loc: usize, value: T) {
        self.local[(i_loc, j_loc)] = value;
    }

    /// Replicate the whole matrix on every rank.
    pub fn gather(&self) -> DMatrix<T> {
        let blocks = self.grid.comm().all_gather(self.local.as_slice().to_vec());
        let col_stride = self.col_stride();
        let row_stride = self.row_stride();
        let mut global = DMatrix::zeros(self.height, self.width);
        for (q, block) in blocks.into_iter().enumerate() {
            let cs = self.col_shift_of(q);
            let rs = self.row_shift_of(q);
            let lh = length(self.height, cs, col_stride);
            let lw = length(self.width, rs, row_stride);
            for j_loc in 0..lw {
                for i_loc in 0..lh {
                    global[(cs + i_loc * col_stride, rs + j_loc * row_stride)] =
                        block[i_loc + j_loc * lh].clone();
                }
            }
        }
        global
    }

    /// Copy into a new layout with both alignments at zero.
    pub fn redistribute(&self, col_dist: Dist, row_dist: Dist) -> Self {
        self.redistribute_aligned(col_dist, row_dist, 0, 0)
    }

    /// Copy into a new layout with the given alignments.
    pub fn redistribute_aligned(
        &self,
        col_dist: Dist,
        row_dist: Dist,
        col_align: usize,
        row_align: usize,
    ) -> Self {
        let global = self.gather();
        let mut b = Self::new_aligned(
            &self.grid,
            col_dist,
            row_dist,
            self.height,
            self.width,
            col_align,
            row_align,
        );
        b.fill_from_global(&global);
        b
    }

    /// Copy of the block `rows × cols` in the same layout, with alignments
    /// chosen so that no communication is needed.
    pub fn submatrix(&self, rows: Range<usize>, cols: Range<usize>) -> Self {
        let col_stride = self.col_stride();
        let row_stride = self.row_stride();
        let mut b = Self::new_aligned(
            &self.grid,
            self.col_dist,
            self.row_dist,
            rows.len(),
            cols.len(),
            self.col_align + rows.start,
            self.row_align + cols.start,
        );
        let row_off = (rows.start + b.col_shift() - self.col_shift()) / col_stride;
        let col_off = (cols.start + b.row_shift() - self.row_shift()) / row_stride;
        let (lh, lw) = (b.local_height(), b.local_width());
        if lh > 0 && lw > 0 {
            b.local = self.local.view((row_off, col_off), (lh, lw)).into_owned();
        }
        b
    }

    /// Write `src` back over the block starting at `(row_start, col_start)`.
    ///
    /// `src` must have the layout and alignments [`submatrix`](Self::submatrix)
    /// would produce for that block.
    pub fn set_submatrix(&mut self, row_start: usize, col_start: usize, src: &Self) -> Result<()> {
        let col_stride = self.col_stride();
        let row_stride = self.row_stride();
        if src.dists() != self.dists()
            || src.col_align != (self.col_align + row_start) % col_stride
            || src.row_align != (self.row_align + col_start) % row_stride
        {
            return Err(SolverError::Logic(
                "submatrix layout does not match its destination".into(),
            ));
        }
        if row_start + src.height > self.height || col_start + src.width > self.width {
            return Err(SolverError::DimensionMismatch {
                what: "submatrix extent",
                expected: self.height,
                actual: row_start + src.height,
            });
        }
        let (lh, lw) = (src.local_height(), src.local_width());
        if lh > 0 && lw > 0 {
            let row_off = (row_start + src.col_shift() - self.col_shift()) / col_stride;
            let col_off = (col_start + src.row_shift() - self.row_shift()) / row_stride;
            self.local
                .view_mut((row_off, col_off), (lh, lw))
                .copy_from(&src.local);
        }
        Ok(())
    }
}
