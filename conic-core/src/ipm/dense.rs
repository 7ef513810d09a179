//! Serial dense representation.

use super::ctrl::{KktSystem, RegSolveCtrl};
use super::repr::{IpfMatrix, IpfVector, KktLinearSolver, Orientation, Side};
use crate::error::{Result, SolverError};
use log::debug;
use nalgebra::{DMatrix, DVector};

pub(crate) fn max_step(s: &[f64], ds: &[f64], upper_bound: f64) -> f64 {
    s.iter()
        .zip(ds)
        .filter(|&(_, &d)| d < 0.0)
        .fold(upper_bound, |alpha, (&si, &di)| alpha.min(-si / di))
}

impl IpfVector for DVector<f64> {
    fn height(&self) -> usize {
        self.nrows()
    }

    fn dot(&self, other: &Self) -> f64 {
        DVector::dot(self, other)
    }

    fn max_norm(&self) -> f64 {
        self.amax()
    }

    fn axpy(&mut self, alpha: f64, x: &Self) {
        DVector::axpy(self, alpha, x, 1.0);
    }

    fn scale(&mut self, alpha: f64) {
        self.scale_mut(alpha);
    }

    fn shift(&mut self, alpha: f64) {
        self.add_scalar_mut(alpha);
    }

    fn diagonal_scale(&mut self, d: &Self) {
        self.component_mul_assign(d);
    }

    fn diagonal_solve(&mut self, d: &Self) {
        self.component_div_assign(d);
    }

    fn num_nonpositive(&self) -> usize {
        self.iter().filter(|&&v| v <= 0.0).count()
    }

    fn min_entry(&self) -> f64 {
        self.iter().copied().fold(f64::INFINITY, f64::min)
    }

    fn max_step_in_positive_cone(&self, ds: &Self, upper_bound: f64) -> f64 {
        max_step(self.as_slice(), ds.as_slice(), upper_bound)
    }

    fn local_entries(&self) -> Vec<(usize, f64)> {
        self.iter().copied().enumerate().collect()
    }
}

impl IpfMatrix for DMatrix<f64> {
    type Vector = DVector<f64>;
    type Solver = DenseKktSolver;

    fn height(&self) -> usize {
        self.nrows()
    }

    fn width(&self) -> usize {
        self.ncols()
    }

    fn multiply(
        &self,
        orientation: Orientation,
        alpha: f64,
        x: &DVector<f64>,
        beta: f64,
        y: &mut DVector<f64>,
    ) -> Result<()> {
        let (inner, outer) = match orientation {
            Orientation::Normal => (self.ncols(), self.nrows()),
            Orientation::Transpose => (self.nrows(), self.ncols()),
        };
        SolverError::check_dim("product input", inner, x.nrows())?;
        SolverError::check_dim("product output", outer, y.nrows())?;
        match orientation {
            Orientation::Normal => y.gemv(alpha, self, x, beta),
            Orientation::Transpose => y.gemv_tr(alpha, self, x, beta),
        }
        Ok(())
    }

    fn local_triplets(&self) -> Vec<(usize, usize, f64)> {
        let mut triplets = Vec::new();
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                let v = self[(i, j)];
                if v != 0.0 {
                    triplets.push((i, j, v));
                }
            }
        }
        triplets
    }

    fn global_triplets(&self) -> Vec<(usize, usize, f64)> {
        self.local_triplets()
    }

    fn diagonal_solve(&mut self, side: Side, d: &DVector<f64>) -> Result<()> {
        match side {
            Side::Left => {
                SolverError::check_dim("row scaling", self.nrows(), d.nrows())?;
                for (i, mut row) in self.row_iter_mut().enumerate() {
                    row /= d[i];
                }
            }
            Side::Right => {
                SolverError::check_dim("column scaling", self.ncols(), d.nrows())?;
                for (j, mut col) in self.column_iter_mut().enumerate() {
                    col /= d[j];
                }
            }
        }
        Ok(())
    }

    fn vector_from_global(&self, values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    fn vector_from_entries(&self, height: usize, entries: Vec<(usize, f64)>) -> DVector<f64> {
        let mut v = DVector::zeros(height);
        for (i, value) in entries {
            v[i] = value;
        }
        v
    }

    fn kkt_solver(&self) -> DenseKktSolver {
        DenseKktSolver
    }
}

/// Assemble a dense symmetric matrix from triplets, summing duplicates.
pub(crate) fn dense_from_triplets(height: usize, triplets: &[(usize, usize, f64)]) -> DMatrix<f64> {
    let mut j = DMatrix::zeros(height, height);
    for &(r, c, v) in triplets {
        j[(r, c)] += v;
    }
    j
}

/// Solve a dense KKT system by LU with partial pivoting.
pub(crate) fn dense_kkt_solve(system: KktSystem, j: DMatrix<f64>, rhs: &mut DVector<f64>) -> Result<()> {
    SolverError::check_dim("KKT right-hand side", j.nrows(), rhs.nrows())?;
    let lu = j.lu();
    if !lu.solve_mut(rhs) {
        return Err(SolverError::Logic(format!(
            "{:?} KKT matrix is singular",
            system
        )));
    }
    debug!("dense {:?} KKT solve of order {}", system, rhs.nrows());
    Ok(())
}

/// KKT solver for serial dense problems. Factors with LU and ignores the
/// regularization candidates.
#[derive(Debug, Clone, Default)]
pub struct DenseKktSolver;

impl KktLinearSolver<DVector<f64>> for DenseKktSolver {
    fn solve(
        &mut self,
        system: KktSystem,
        height: usize,
        triplets: Vec<(usize, usize, f64)>,
        _reg_cand: &DVector<f64>,
        rhs: &mut DVector<f64>,
        _ctrl: &RegSolveCtrl,
    ) -> Result<usize> {
        dense_kkt_solve(system, dense_from_triplets(height, &triplets), rhs)?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_step() {
        let s = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let ds = DVector::from_vec(vec![-2.0, 1.0, -1.0]);
        assert_eq!(s.max_step_in_positive_cone(&ds, 1.0), 0.5);
        assert_eq!(s.max_step_in_positive_cone(&ds, 0.25), 0.25);
        let up = DVector::from_vec(vec![1.0, 1.0, 1.0]);
        assert_eq!(s.max_step_in_positive_cone(&up, 1.0), 1.0);
    }

    #[test]
    fn test_diagonal_solve_sides() {
        let mut a = DMatrix::from_row_slice(2, 2, &[2.0, 4.0, 6.0, 8.0]);
        a.diagonal_solve(Side::Left, &DVector::from_vec(vec![2.0, 2.0])).unwrap();
        a.diagonal_solve(Side::Right, &DVector::from_vec(vec![1.0, 4.0])).unwrap();
        assert_eq!(a, DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 3.0, 1.0]));
    }

    #[test]
    fn test_dense_solver() {
        let triplets = vec![(0, 0, 2.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 0.0)];
        let mut rhs = DVector::from_vec(vec![3.0, 1.0]);
        let its = DenseKktSolver
            .solve(
                KktSystem::Augmented,
                2,
                triplets,
                &DVector::zeros(2),
                &mut rhs,
                &RegSolveCtrl::default(),
            )
            .unwrap();
        assert_eq!(its, 0);
        assert!((rhs[0] - 1.0).abs() < 1e-14);
        assert!((rhs[1] - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_singular_kkt_is_an_error() {
        let mut rhs = DVector::from_vec(vec![1.0, 1.0]);
        let result = DenseKktSolver.solve(
            KktSystem::Full,
            2,
            vec![(0, 0, 1.0)],
            &DVector::zeros(2),
            &mut rhs,
            &RegSolveCtrl::default(),
        );
        assert!(result.is_err());
    }
}
