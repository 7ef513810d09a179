//! Distributed sparse representation.
//!
//! Vectors are [`DistMultiVec`] columns and matrices are row-distributed
//! [`DistSparseMatrix`] values. Newton systems go through nested dissection
//! and the regularized quasi-semidefinite LDL of [`crate::linalg::reg_ldl`].
//! The elimination tree of each KKT system is computed on first use and
//! reused for every later iteration, since the pattern does not change.

use super::ctrl::{KktSystem, RegSolveCtrl};
use super::dense::max_step;
use super::repr::{IpfMatrix, IpfVector, KktLinearSolver, Orientation, Side};
use crate::comm::Comm;
use crate::dist::{DistMultiVec, DistSparseMatrix};
use crate::error::{Result, SolverError};
use crate::linalg::reg_ldl::{regularized_qsd_ldl, solve_after, RegularizedLdlFront};
use crate::nodal::{nested_dissection, DistNodalMultiVec, DistNodalTree, NestedDissectionCtrl};
use log::debug;
use nalgebra::DMatrix;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

impl<C: Comm> IpfVector for DistMultiVec<f64, C> {
    fn height(&self) -> usize {
        DistMultiVec::height(self)
    }

    fn dot(&self, other: &Self) -> f64 {
        self.comm().all_reduce_sum(self.local().dot(other.local()))
    }

    fn max_norm(&self) -> f64 {
        self.comm().all_reduce_max(self.local().amax())
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
        let local = self.local().iter().filter(|&&v| v <= 0.0).count();
        self.comm().all_reduce_count(local)
    }

    fn min_entry(&self) -> f64 {
        let local = self.local().iter().copied().fold(f64::INFINITY, f64::min);
        self.comm().all_reduce_min(local)
    }

    fn max_step_in_positive_cone(&self, ds: &Self, upper_bound: f64) -> f64 {
        let local = max_step(self.local().as_slice(), ds.local().as_slice(), upper_bound);
        self.comm().all_reduce_min(local)
    }

    fn local_entries(&self) -> Vec<(usize, f64)> {
        (0..self.local_height())
            .map(|i_loc| (self.global_row(i_loc), self.get_local(i_loc, 0)))
            .collect()
    }
}

impl<C: Comm> IpfMatrix for DistSparseMatrix<C> {
    type Vector = DistMultiVec<f64, C>;
    type Solver = SparseKktSolver<C>;

    fn height(&self) -> usize {
        DistSparseMatrix::height(self)
    }

    fn width(&self) -> usize {
        DistSparseMatrix::width(self)
    }

    fn multiply(
        &self,
        orientation: Orientation,
        alpha: f64,
        x: &Self::Vector,
        beta: f64,
        y: &mut Self::Vector,
    ) -> Result<()> {
        match orientation {
            Orientation::Normal => DistSparseMatrix::multiply(self, alpha, x, beta, y),
            Orientation::Transpose => self.multiply_transpose(alpha, x, beta, y),
        }
    }

    fn local_triplets(&self) -> Vec<(usize, usize, f64)> {
        DistSparseMatrix::local_triplets(self)
    }

    fn global_triplets(&self) -> Vec<(usize, usize, f64)> {
        DistSparseMatrix::global_triplets(self)
    }

    fn diagonal_solve(&mut self, side: Side, d: &Self::Vector) -> Result<()> {
        match side {
            Side::Left => self.diagonal_solve_rows(d),
            Side::Right => self.diagonal_solve_cols(d),
        }
    }

    fn vector_from_global(&self, values: &[f64]) -> Self::Vector {
        DistMultiVec::from_global(
            self.comm().clone(),
            &DMatrix::from_column_slice(values.len(), 1, values),
        )
    }

    fn vector_from_entries(&self, height: usize, entries: Vec<(usize, f64)>) -> Self::Vector {
        DistMultiVec::from_entries(self.comm().clone(), height, entries)
    }

    fn kkt_solver(&self) -> SparseKktSolver<C> {
        SparseKktSolver::new(self.comm().clone())
    }
}

struct CachedSystem<C: Comm> {
    tree: DistNodalTree<C>,
    front: Option<RegularizedLdlFront>,
}

/// Regularized sparse-direct KKT solver.
///
/// Each call assembles `J`, sets `piv_tol = ‖J‖_max · ε`, factors the
/// tree-ordered front with the candidates added a priori and refines the
/// solution against the unregularized `J`.
pub struct SparseKktSolver<C: Comm> {
    comm: C,
    dissection: NestedDissectionCtrl,
    cache: HashMap<KktSystem, CachedSystem<C>>,
}

impl<C: Comm> SparseKktSolver<C> {
    pub fn new(comm: C) -> Self {
        Self::with_dissection(comm, NestedDissectionCtrl::default())
    }

    pub fn with_dissection(comm: C, dissection: NestedDissectionCtrl) -> Self {
        Self {
            comm,
            dissection,
            cache: HashMap::new(),
        }
    }

    /// Systems whose elimination tree is cached.
    pub fn cached_systems(&self) -> Vec<KktSystem> {
        self.cache.keys().copied().collect()
    }
}

impl<C: Comm> KktLinearSolver<DistMultiVec<f64, C>> for SparseKktSolver<C> {
    fn solve(
        &mut self,
        system: KktSystem,
        height: usize,
        triplets: Vec<(usize, usize, f64)>,
        reg_cand: &DistMultiVec<f64, C>,
        rhs: &mut DistMultiVec<f64, C>,
        ctrl: &RegSolveCtrl,
    ) -> Result<usize> {
        let j = DistSparseMatrix::from_triplets(self.comm.clone(), height, height, triplets);
        let piv_tol = j.max_norm() * f64::EPSILON;

        let cached = match self.cache.entry(system) {
            Entry::Occupied(o) if o.get().tree.info.num_indices() == height => o.into_mut(),
            entry => {
                debug!("analyzing the {:?} KKT system of order {}", system, height);
                let tree = nested_dissection(&j.graph()?, &self.comm, &self.dissection)?;
                let fresh = CachedSystem { tree, front: None };
                match entry {
                    Entry::Occupied(mut o) => {
                        o.insert(fresh);
                        o.into_mut()
                    }
                    Entry::Vacant(v) => v.insert(fresh),
                }
            }
        };
        let DistNodalTree { map, inv_map, info } = &cached.tree;

        match cached.front.as_mut() {
            Some(front) => front.repull(&j, map, info)?,
            None => cached.front = Some(RegularizedLdlFront::pull(&j, map, info)?),
        }
        let front = cached
            .front
            .as_mut()
            .ok_or_else(|| SolverError::Logic("KKT front was not assembled".into()))?;

        let cand_nodal = DistNodalMultiVec::pull(inv_map, info, reg_cand)?;
        let mut reg_nodal = DistNodalMultiVec::new(info, 1);
        regularized_qsd_ldl(info, front, piv_tol, &cand_nodal, &mut reg_nodal, true, &self.comm)?;
        let mut reg = DistMultiVec::new(self.comm.clone(), height, 1);
        reg_nodal.push(inv_map, info, &mut reg)?;

        solve_after(&j, &reg, inv_map, info, front, rhs, ctrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SelfComm, ThreadComm};
    use float_eq::assert_float_eq;
    use sprs::TriMat;

    fn small_matrix() -> sprs::CsMat<f64> {
        let mut tri = TriMat::new((3, 4));
        for &(i, j, v) in &[(0, 0, 1.0), (0, 2, 2.0), (1, 1, 3.0), (2, 0, -1.0), (2, 3, 4.0)] {
            tri.add_triplet(i, j, v);
        }
        tri.to_csc()
    }

    #[test]
    fn test_products_match_serial() {
        let x = [1.0, -1.0, 2.0, 0.5];
        let y = [2.0, 1.0, -1.0];
        let results = ThreadComm::run(3, |comm| {
            let a = DistSparseMatrix::from_global(comm, &small_matrix());
            let dx = a.vector_from_global(&x);
            let dy = a.vector_from_global(&y);
            let mut ax = a.zeros(3);
            IpfMatrix::multiply(&a, Orientation::Normal, 1.0, &dx, 0.0, &mut ax).unwrap();
            let mut aty = a.zeros(4);
            IpfMatrix::multiply(&a, Orientation::Transpose, 2.0, &dy, 0.0, &mut aty).unwrap();
            (ax.gather(), aty.gather(), dx.max_norm(), dy.min_entry())
        });
        for (ax, aty, max_norm, min) in results {
            assert_eq!(ax.as_slice(), &[5.0, -3.0, 1.0]);
            assert_eq!(aty.as_slice(), &[6.0, 6.0, 8.0, -8.0]);
            assert_eq!(max_norm, 2.0);
            assert_eq!(min, -1.0);
        }
    }

    /// `[[2, 0, 1], [0, 2, 1], [1, 1, 0]]`
    fn augmented_triplets() -> Vec<(usize, usize, f64)> {
        vec![
            (0, 0, 2.0),
            (1, 1, 2.0),
            (0, 2, 1.0),
            (2, 0, 1.0),
            (1, 2, 1.0),
            (2, 1, 1.0),
        ]
    }

    fn reg_cand<C: Comm>(comm: C) -> DistMultiVec<f64, C> {
        let eps = f64::EPSILON;
        let cand = [eps.powf(0.75), eps.powf(0.75), -eps.sqrt()];
        DistMultiVec::from_global(comm, &DMatrix::from_column_slice(3, 1, &cand))
    }

    #[test]
    fn test_regularized_solve() {
        for p in 1..=3 {
            let results = ThreadComm::run(p, |comm| {
                let mut solver = SparseKktSolver::new(comm.clone());
                let triplets = if comm.rank() == 0 { augmented_triplets() } else { Vec::new() };
                let mut rhs = DistMultiVec::from_global(comm.clone(), &DMatrix::from_column_slice(3, 1, &[1.0, 2.0, 3.0]));
                solver
                    .solve(
                        KktSystem::Augmented,
                        3,
                        triplets,
                        &reg_cand(comm.clone()),
                        &mut rhs,
                        &RegSolveCtrl::default(),
                    )
                    .unwrap();
                rhs.gather()
            });
            for d in results {
                assert_float_eq!(d[(0, 0)], 1.25, abs <= 1e-10);
                assert_float_eq!(d[(1, 0)], 1.75, abs <= 1e-10);
                assert_float_eq!(d[(2, 0)], -1.5, abs <= 1e-10);
            }
        }
    }

    #[test]
    fn test_trees_are_cached_per_system() {
        let mut solver = SparseKktSolver::new(SelfComm);
        let ctrl = RegSolveCtrl::default();
        let mut first = None;
        for _ in 0..2 {
            let mut rhs = DistMultiVec::from_global(SelfComm, &DMatrix::from_column_slice(3, 1, &[1.0, 2.0, 3.0]));
            solver
                .solve(KktSystem::Augmented, 3, augmented_triplets(), &reg_cand(SelfComm), &mut rhs, &ctrl)
                .unwrap();
            let d = rhs.gather();
            if let Some(prev) = &first {
                assert_eq!(&d, prev);
            }
            first = Some(d);
        }
        assert_eq!(solver.cached_systems(), vec![KktSystem::Augmented]);

        let mut rhs = DistMultiVec::from_global(SelfComm, &DMatrix::from_column_slice(3, 1, &[0.0, 0.0, 0.0]));
        let its = solver
            .solve(KktSystem::Full, 3, augmented_triplets(), &reg_cand(SelfComm), &mut rhs, &ctrl)
            .unwrap();
        assert_eq!(its, 0);
        let mut cached = solver.cached_systems();
        cached.sort_by_key(|s| s.code());
        assert_eq!(cached, vec![KktSystem::Full, KktSystem::Augmented]);
    }
}
