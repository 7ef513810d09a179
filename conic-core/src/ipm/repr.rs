//! Representation seams of the interior point driver.
//!
//! The driver is written once against [`IpfMatrix`] and [`IpfVector`]. Each
//! storage scheme (dense or sparse, serial or distributed) implements the
//! traits and supplies a [`KktLinearSolver`] for the Newton systems. All
//! reductions are collective, so every rank sees the same scalars and takes
//! the same branches.

use super::ctrl::{KktSystem, RegSolveCtrl};
use crate::error::Result;

/// Whether a product uses `A` or `Aᵀ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Normal,
    Transpose,
}

/// Which side a diagonal scaling is applied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Column vector operations needed by the driver.
pub trait IpfVector: Clone {
    fn height(&self) -> usize;

    fn dot(&self, other: &Self) -> f64;

    fn nrm2(&self) -> f64 {
        self.dot(self).sqrt()
    }

    fn max_norm(&self) -> f64;

    /// `self += alpha x`
    fn axpy(&mut self, alpha: f64, x: &Self);

    fn scale(&mut self, alpha: f64);

    /// Add `alpha` to every entry.
    fn shift(&mut self, alpha: f64);

    /// `self_i *= d_i`
    fn diagonal_scale(&mut self, d: &Self);

    /// `self_i /= d_i`
    fn diagonal_solve(&mut self, d: &Self);

    fn num_nonpositive(&self) -> usize;

    fn min_entry(&self) -> f64;

    /// Largest `α ≤ upper_bound` with `self + α ds ≥ 0`.
    fn max_step_in_positive_cone(&self, ds: &Self, upper_bound: f64) -> f64;

    /// Entries stored on this rank as `(global row, value)`.
    fn local_entries(&self) -> Vec<(usize, f64)>;
}

/// Matrix operations needed by the driver.
pub trait IpfMatrix: Clone {
    type Vector: IpfVector;
    type Solver: KktLinearSolver<Self::Vector>;

    fn height(&self) -> usize;

    fn width(&self) -> usize;

    /// `y := alpha op(A) x + beta y`
    fn multiply(
        &self,
        orientation: Orientation,
        alpha: f64,
        x: &Self::Vector,
        beta: f64,
        y: &mut Self::Vector,
    ) -> Result<()>;

    /// Nonzero entries stored on this rank, with global indices. Every entry
    /// is reported by exactly one rank.
    fn local_triplets(&self) -> Vec<(usize, usize, f64)>;

    /// Every nonzero entry, replicated on all ranks.
    fn global_triplets(&self) -> Vec<(usize, usize, f64)>;

    /// `A := diag(d)⁻¹ A` (`Side::Left`) or `A := A diag(d)⁻¹` (`Side::Right`).
    fn diagonal_solve(&mut self, side: Side, d: &Self::Vector) -> Result<()>;

    /// Vector built from replicated global values.
    fn vector_from_global(&self, values: &[f64]) -> Self::Vector;

    /// Vector of the given height built from `(global row, value)` pairs held
    /// on any rank. Rows nobody supplies are zero.
    fn vector_from_entries(&self, height: usize, entries: Vec<(usize, f64)>) -> Self::Vector;

    fn zeros(&self, height: usize) -> Self::Vector {
        self.vector_from_entries(height, Vec::new())
    }

    /// Fresh linear solver for the KKT systems of this representation.
    fn kkt_solver(&self) -> Self::Solver;
}

/// Factor-and-solve service for symmetric KKT matrices.
pub trait KktLinearSolver<V> {
    /// Solve `J d = rhs` in place, where `J` (order `height`) is the sum of
    /// the triplets contributed by all ranks. `reg_cand` holds the signed
    /// regularization candidates for solvers that regularize. Returns the
    /// number of refinement steps taken.
    fn solve(
        &mut self,
        system: KktSystem,
        height: usize,
        triplets: Vec<(usize, usize, f64)>,
        reg_cand: &V,
        rhs: &mut V,
        ctrl: &RegSolveCtrl,
    ) -> Result<usize>;
}
