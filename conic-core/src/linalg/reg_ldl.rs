//! Regularized quasi-semidefinite LDLᵀ with iterative refinement.
//!
//! A KKT matrix `J` is gathered in elimination-tree order into a
//! [`RegularizedLdlFront`], factored after adding a diagonal regularization
//! `reg` whose signs follow the block structure (positive on the primal
//! block, negative on the Lagrange and dual blocks), and then used as a
//! preconditioner for iterative refinement against the unregularized `J`.
//!
//! The front is replicated: every rank factors and solves the whole system
//! redundantly. Only the movement of vectors between the natural row
//! distribution and the tree layout is distributed.

use super::ldl::{LdlError, LdlSolver};
use super::sparse::{self, SparseCsc};
use crate::comm::Comm;
use crate::dist::{DistMap, DistMultiVec, DistSparseMatrix};
use crate::error::{Result, SolverError};
use crate::nodal::{DistNodalMultiVec, DistSymmInfo};
use log::debug;
use nalgebra::DMatrix;

/// Iterative refinement controls.
#[derive(Debug, Clone)]
pub struct RegSolveCtrl {
    /// Stop once `‖r‖ ≤ rel_tol · ‖b‖`.
    pub rel_tol: f64,
    pub max_refine_its: usize,
    /// A solve needing more refinement steps than this counts as a large
    /// refinement for the regularization policy.
    pub large_refine_threshold: usize,
    /// Log every refinement step.
    pub progress: bool,
}

impl Default for RegSolveCtrl {
    fn default() -> Self {
        Self {
            rel_tol: f64::EPSILON.powf(0.75),
            max_refine_its: 50,
            large_refine_threshold: 3,
            progress: false,
        }
    }
}

/// Tree-ordered copy of a symmetric matrix together with its factorization.
pub struct RegularizedLdlFront {
    matrix: SparseCsc,
    solver: LdlSolver,
}

impl RegularizedLdlFront {
    /// Gather the upper triangle of `j` in the ordering given by `map`
    /// (original index to tree index) and run the symbolic analysis.
    pub fn pull<C: Comm>(j: &DistSparseMatrix<C>, map: &DistMap<C>, info: &DistSymmInfo) -> Result<Self> {
        let matrix = tree_ordered_upper(j, map, info)?;
        let solver = LdlSolver::new(&matrix)?;
        Ok(Self { matrix, solver })
    }

    /// Replace the values by those of `j`. The symbolic analysis is kept
    /// when the tree-ordered pattern has not changed.
    pub fn repull<C: Comm>(
        &mut self,
        j: &DistSparseMatrix<C>,
        map: &DistMap<C>,
        info: &DistSymmInfo,
    ) -> Result<()> {
        let matrix = tree_ordered_upper(j, map, info)?;
        if !self.solver.matches_pattern(&matrix) {
            debug!("front pattern changed, redoing the symbolic analysis");
            self.solver = LdlSolver::new(&matrix)?;
        }
        self.matrix = matrix;
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.solver.dim()
    }

    /// Solve with the current factorization, one column of the
    /// tree-ordered `b` at a time.
    fn solve(&self, b: &mut DMatrix<f64>) -> Result<()> {
        let n = self.dim();
        if n == 0 {
            return Ok(());
        }
        for col in b.as_mut_slice().chunks_mut(n) {
            self.solver.solve(col)?;
        }
        Ok(())
    }
}

fn tree_ordered_upper<C: Comm>(
    j: &DistSparseMatrix<C>,
    map: &DistMap<C>,
    info: &DistSymmInfo,
) -> Result<SparseCsc> {
    let n = j.height();
    SolverError::check_dim("symmetric matrix width", n, j.width())?;
    SolverError::check_dim("elimination tree size", n, info.num_indices())?;
    SolverError::check_dim("ordering size", n, map.height())?;
    let perm = map.gather();
    let triplets = j
        .global_triplets()
        .into_iter()
        .map(|(r, c, v)| (perm[r], perm[c], v));
    Ok(sparse::symmetric_upper(n, triplets))
}

/// Factor the front after regularizing its diagonal.
///
/// With `a_priori` set, `reg_cand` is added to every diagonal entry. In the
/// dynamic mode a trial factorization runs first. Pivots that are not
/// finite, satisfy `|d_i| ≤ piv_tol` or disagree in sign with `reg_cand_i`
/// receive their candidate before a single refactorization. If the trial
/// breaks down on a zero pivot every candidate is applied. The regularization
/// actually used is stored in `reg`.
pub fn regularized_qsd_ldl<C: Comm>(
    info: &DistSymmInfo,
    front: &mut RegularizedLdlFront,
    piv_tol: f64,
    reg_cand: &DistNodalMultiVec<f64>,
    reg: &mut DistNodalMultiVec<f64>,
    a_priori: bool,
    comm: &C,
) -> Result<()> {
    let n = front.dim();
    SolverError::check_dim("regularization candidate height", n, reg_cand.height())?;
    SolverError::check_dim("regularization height", n, reg.height())?;
    let cand = reg_cand.gather_tree_ordered(info, comm);
    let cand = cand.as_slice();

    let shift: Vec<f64> = if a_priori {
        cand.to_vec()
    } else {
        match front.solver.factor(&front.matrix, &[]) {
            Ok(()) => {
                let pivots = front.solver.pivots().ok_or(LdlError::NotFactored)?;
                pivots
                    .iter()
                    .zip(cand)
                    .map(|(&d, &c)| {
                        if !d.is_finite() || d.abs() <= piv_tol || d.signum() != c.signum() {
                            c
                        } else {
                            0.0
                        }
                    })
                    .collect()
            }
            Err(LdlError::FactorizationFailed) => {
                debug!("trial factorization broke down, regularizing every pivot");
                cand.to_vec()
            }
            Err(e) => return Err(e.into()),
        }
    };

    let num_regularized = shift.iter().filter(|&&s| s != 0.0).count();
    if a_priori || num_regularized > 0 {
        front.solver.factor(&front.matrix, &shift)?;
    }
    debug!(
        "regularized {} of {} pivots (piv_tol = {:e})",
        num_regularized, n, piv_tol
    );

    reg.scatter_tree_ordered(info, &DMatrix::from_column_slice(n, 1, &shift))
}

fn frobenius<C: Comm>(v: &DistMultiVec<f64, C>) -> f64 {
    v.comm().all_reduce_sum(v.local().norm_squared()).sqrt()
}

/// Apply the factored front to `r`, which lives in the natural ordering.
fn apply_inverse<C: Comm>(
    inv_map: &DistMap<C>,
    info: &DistSymmInfo,
    front: &RegularizedLdlFront,
    r: &DistMultiVec<f64, C>,
) -> Result<DistMultiVec<f64, C>> {
    let mut nodal = DistNodalMultiVec::pull(inv_map, info, r)?;
    let mut global = nodal.gather_tree_ordered(info, r.comm());
    front.solve(&mut global)?;
    nodal.scatter_tree_ordered(info, &global)?;
    let mut out = DistMultiVec::new(r.comm().clone(), r.height(), r.width());
    nodal.push(inv_map, info, &mut out)?;
    Ok(out)
}

/// Solve `J x = d` in place by iterative refinement preconditioned with the
/// regularized factorization held in `front`.
///
/// Returns the number of refinement corrections that were applied. The loop
/// stops when the residual falls below `ctrl.rel_tol · ‖d‖`, when a
/// correction fails to reduce the residual, or after `ctrl.max_refine_its`
/// steps.
pub fn solve_after<C: Comm>(
    j: &DistSparseMatrix<C>,
    reg: &DistMultiVec<f64, C>,
    inv_map: &DistMap<C>,
    info: &DistSymmInfo,
    front: &RegularizedLdlFront,
    d: &mut DistMultiVec<f64, C>,
    ctrl: &RegSolveCtrl,
) -> Result<usize> {
    SolverError::check_dim("right-hand side height", j.height(), d.height())?;
    SolverError::check_dim("regularization height", j.height(), reg.height())?;

    let b = d.clone();
    let b_norm = frobenius(&b);
    if b_norm == 0.0 {
        d.local_mut().fill(0.0);
        return Ok(0);
    }
    if ctrl.progress {
        let reg_max = reg.local().amax();
        debug!(
            "refining against the unregularized matrix, max |reg| = {:e}",
            reg.comm().all_reduce_max(reg_max)
        );
    }

    let mut x = apply_inverse(inv_map, info, front, &b)?;
    let mut r = b.clone();
    j.multiply(-1.0, &x, 1.0, &mut r)?;
    let mut r_norm = frobenius(&r);

    let mut refine_its = 0;
    while r_norm > ctrl.rel_tol * b_norm && refine_its < ctrl.max_refine_its {
        let dx = apply_inverse(inv_map, info, front, &r)?;
        let mut x_cand = x.clone();
        *x_cand.local_mut() += dx.local();
        let mut r_cand = b.clone();
        j.multiply(-1.0, &x_cand, 1.0, &mut r_cand)?;
        let r_cand_norm = frobenius(&r_cand);
        if r_cand_norm >= r_norm {
            if ctrl.progress {
                debug!("refinement stalled at relative residual {:e}", r_norm / b_norm);
            }
            break;
        }
        x = x_cand;
        r = r_cand;
        r_norm = r_cand_norm;
        refine_its += 1;
        if ctrl.progress {
            debug!("refinement step {}: relative residual {:e}", refine_its, r_norm / b_norm);
        }
    }

    *d = x;
    Ok(refine_its)
}
