//! Distributed dense representation.
//!
//! Matrices are `[MC,MR]` and vectors are `n × 1` `[MC,MR]` with zero
//! alignments, so every vector entry is owned by exactly one rank (a member
//! of grid column 0). Products accumulate per-rank partial sums in rank
//! order. The KKT solver gathers the system to every rank.

use super::ctrl::{KktSystem, RegSolveCtrl};
use super::dense::{dense_from_triplets, dense_kkt_solve, max_step};
use super::repr::{IpfMatrix, IpfVector, KktLinearSolver, Orientation, Side};
use crate::comm::Comm;
use crate::dist::{Dist, DistMatrix, Grid};
use crate::error::{Result, SolverError};
use nalgebra::{DMatrix, DVector};

fn column<C: Comm>(grid: &Grid<C>, values: &[f64]) -> DistMatrix<f64, C> {
    DistMatrix::from_global(
        grid,
        Dist::Mc,
        Dist::Mr,
        &DMatrix::from_column_slice(values.len(), 1, values),
    )
}

fn local_column(v: &DistMatrix<f64, impl Comm>) -> &[f64] {
    v.local().as_slice()
}

impl<C: Comm> IpfVector for DistMatrix<f64, C> {
    fn height(&self) -> usize {
        DistMatrix::height(self)
    }

    fn dot(&self, other: &Self) -> f64 {
        let local: f64 = local_column(self)
            .iter()
            .zip(local_column(other))
            .map(|(a, b)| a * b)
            .sum();
        self.grid().comm().all_reduce_sum(local)
    }

    fn max_norm(&self) -> f64 {
        let local = local_column(self).iter().fold(0.0f64, |m, v| m.max(v.abs()));
        self.grid().comm().all_reduce_max(local)
    }

    fn axpy(&mut self, alpha: f64, x: &Self) {
        *self.local_mut() += x.local() * alpha;
    }

    fn scale(&mut self, alpha: f64) {
        *self.local_mut() *= alpha;
    }

    fn shift(&mut self, alpha: f64) {
        self.local_mut().add_scalar_mut(alpha);
    }

    fn diagonal_scale(&mut self, d: &Self) {
        self.local_mut().component_mul_assign(d.local());
    }

    fn diagonal_solve(&mut self, d: &Self) {
        self.local_mut().component_div_assign(d.local());
    }

    fn num_nonpositive(&self) -> usize {
        let local = local_column(self).iter().filter(|&&v| v <= 0.0).count();
        self.grid().comm().all_reduce_count(local)
    }

    fn min_entry(&self) -> f64 {
        let local = local_column(self).iter().copied().fold(f64::INFINITY, f64::min);
        self.grid().comm().all_reduce_min(local)
    }

    fn max_step_in_positive_cone(&self, ds: &Self, upper_bound: f64) -> f64 {
        let local = max_step(local_column(self), local_column(ds), upper_bound);
        self.grid().comm().all_reduce_min(local)
    }

    fn local_entries(&self) -> Vec<(usize, f64)> {
        (0..self.local_height())
            .flat_map(|i_loc| {
                (0..self.local_width()).map(move |j_loc| (self.global_row(i_loc), self.get_local(i_loc, j_loc)))
            })
            .collect()
    }
}

impl<C: Comm> IpfMatrix for DistMatrix<f64, C> {
    type Vector = DistMatrix<f64, C>;
    type Solver = DistDenseKktSolver<C>;

    fn height(&self) -> usize {
        DistMatrix::height(self)
    }

    fn width(&self) -> usize {
        DistMatrix::width(self)
    }

    fn multiply(
        &self,
        orientation: Orientation,
        alpha: f64,
        x: &Self,
        beta: f64,
        y: &mut Self,
    ) -> Result<()> {
        let (inner, outer) = match orientation {
            Orientation::Normal => (self.width(), self.height()),
            Orientation::Transpose => (self.height(), self.width()),
        };
        SolverError::check_dim("product input", inner, IpfVector::height(x))?;
        SolverError::check_dim("product output", outer, IpfVector::height(y))?;

        let x_global = x.gather();
        let mut partial = vec![0.0; outer];
        for (i, j, v) in self.local_triplets() {
            match orientation {
                Orientation::Normal => partial[i] += v * x_global[(j, 0)],
                Orientation::Transpose => partial[j] += v * x_global[(i, 0)],
            }
        }
        let mut total = vec![0.0; outer];
        for contribution in self.grid().comm().all_gather(partial) {
            for (t, c) in total.iter_mut().zip(contribution) {
                *t += c;
            }
        }
        for i_loc in 0..y.local_height() {
            for j_loc in 0..y.local_width() {
                let i = y.global_row(i_loc);
                let value = alpha * total[i] + beta * y.get_local(i_loc, j_loc);
                y.set_local(i_loc, j_loc, value);
            }
        }
        Ok(())
    }

    fn local_triplets(&self) -> Vec<(usize, usize, f64)> {
        let mut triplets = Vec::new();
        for j_loc in 0..self.local_width() {
            let j = self.global_col(j_loc);
            for i_loc in 0..self.local_height() {
                let v = self.get_local(i_loc, j_loc);
                if v != 0.0 {
                    triplets.push((self.global_row(i_loc), j, v));
                }
            }
        }
        triplets
    }

    fn global_triplets(&self) -> Vec<(usize, usize, f64)> {
        self.grid()
            .comm()
            .all_gather(self.local_triplets())
            .into_iter()
            .flatten()
            .collect()
    }

    fn diagonal_solve(&mut self, side: Side, d: &Self) -> Result<()> {
        let d_global = d.gather();
        let expected = match side {
            Side::Left => self.height(),
            Side::Right => self.width(),
        };
        SolverError::check_dim("diagonal scaling", expected, d_global.nrows())?;
        for j_loc in 0..self.local_width() {
            let j = self.global_col(j_loc);
            for i_loc in 0..self.local_height() {
                let i = self.global_row(i_loc);
                let s = match side {
                    Side::Left => d_global[(i, 0)],
                    Side::Right => d_global[(j, 0)],
                };
                let v = self.get_local(i_loc, j_loc) / s;
                self.set_local(i_loc, j_loc, v);
            }
        }
        Ok(())
    }

    fn vector_from_global(&self, values: &[f64]) -> Self {
        column(self.grid(), values)
    }

    fn vector_from_entries(&self, height: usize, entries: Vec<(usize, f64)>) -> Self {
        let mut values = vec![0.0; height];
        for (i, value) in self.grid().comm().all_gather(entries).into_iter().flatten() {
            values[i] = value;
        }
        column(self.grid(), &values)
    }

    fn kkt_solver(&self) -> DistDenseKktSolver<C> {
        DistDenseKktSolver {
            grid: self.grid().clone(),
        }
    }
}

/// KKT solver for distributed dense problems: the system is replicated on
/// every rank and solved redundantly by LU.
#[derive(Debug, Clone)]
pub struct DistDenseKktSolver<C: Comm> {
    grid: Grid<C>,
}

impl<C: Comm> KktLinearSolver<DistMatrix<f64, C>> for DistDenseKktSolver<C> {
    fn solve(
        &mut self,
        system: KktSystem,
        height: usize,
        triplets: Vec<(usize, usize, f64)>,
        _reg_cand: &DistMatrix<f64, C>,
        rhs: &mut DistMatrix<f64, C>,
        _ctrl: &RegSolveCtrl,
    ) -> Result<usize> {
        let all: Vec<_> = self.grid.comm().all_gather(triplets).into_iter().flatten().collect();
        let j = dense_from_triplets(height, &all);
        let mut d = DVector::from_column_slice(rhs.gather().as_slice());
        dense_kkt_solve(system, j, &mut d)?;
        *rhs = column(&self.grid, d.as_slice());
        Ok(0)
    }
}
