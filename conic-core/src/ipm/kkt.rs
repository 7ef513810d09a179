//! Newton system assembly for the direct-form QP.
//!
//! Full system, ordered `(x, y, z)`:
//!
//! ```text
//! | Q   Aᵀ  −I        | |dx|   | −r_c    |
//! | A   0    0        | |dy| = | −r_b    |
//! | −I  0   −diag(x/z)| |dz|   | r_μ / z |
//! ```
//!
//! Augmented system, with `dz = −(r_μ + z ∘ dx) / x` eliminated:
//!
//! ```text
//! | Q + diag(z/x)  Aᵀ | |dx|   | −r_c − r_μ/x |
//! | A              0  | |dy| = | −r_b         |
//! ```
//!
//! Every rank contributes the triplets and right-hand side entries it owns,
//! so assembly is the same for all representations.

use super::ctrl::{invalid_system, KktSystem, RegSolveCtrl};
use super::regularization::RegularizationState;
use super::repr::{IpfMatrix, IpfVector, KktLinearSolver, Orientation};
use crate::error::{Result, SolverError};
use log::debug;

/// Order of the KKT matrix for `n` variables and `m` equality constraints.
pub fn kkt_height(system: KktSystem, n: usize, m: usize) -> Result<usize> {
    match system {
        KktSystem::Full => Ok(2 * n + m),
        KktSystem::Augmented => Ok(n + m),
        KktSystem::Normal => Err(invalid_system()),
    }
}

/// Locally owned entries of the KKT matrix. Summed over ranks they give `J`
/// with every diagonal position of the `x` and `z` blocks present.
pub fn kkt_triplets<M: IpfMatrix>(
    system: KktSystem,
    q: &M,
    a: &M,
    x: &M::Vector,
    z: &M::Vector,
) -> Result<Vec<(usize, usize, f64)>> {
    let n = a.width();
    let m = a.height();
    let mut triplets = q.local_triplets();
    for (i, j, v) in a.local_triplets() {
        triplets.push((n + i, j, v));
        triplets.push((j, n + i, v));
    }
    for ((i, x_i), (_, z_i)) in x.local_entries().into_iter().zip(z.local_entries()) {
        match system {
            KktSystem::Full => {
                triplets.push((i, n + m + i, -1.0));
                triplets.push((n + m + i, i, -1.0));
                triplets.push((n + m + i, n + m + i, -x_i / z_i));
            }
            KktSystem::Augmented => triplets.push((i, i, z_i / x_i)),
            KktSystem::Normal => return Err(invalid_system()),
        }
    }
    Ok(triplets)
}

/// Right-hand side of the Newton system.
pub fn kkt_rhs<M: IpfMatrix>(
    system: KktSystem,
    a: &M,
    rb: &M::Vector,
    rc: &M::Vector,
    rmu: &M::Vector,
    x: &M::Vector,
    z: &M::Vector,
) -> Result<M::Vector> {
    let n = a.width();
    let m = a.height();
    let height = kkt_height(system, n, m)?;
    let mut entries: Vec<(usize, f64)> = rb.local_entries().into_iter().map(|(i, v)| (n + i, -v)).collect();
    let rows = rc
        .local_entries()
        .into_iter()
        .zip(rmu.local_entries())
        .zip(x.local_entries().into_iter().zip(z.local_entries()));
    for (((i, rc_i), (_, rmu_i)), ((_, x_i), (_, z_i))) in rows {
        match system {
            KktSystem::Full => {
                entries.push((i, -rc_i));
                entries.push((n + m + i, rmu_i / z_i));
            }
            _ => entries.push((i, -rc_i - rmu_i / x_i)),
        }
    }
    Ok(a.vector_from_entries(height, entries))
}

/// Newton step in the original variables.
#[derive(Debug, Clone)]
pub struct KktDirection<V> {
    pub dx: V,
    pub dy: V,
    pub dz: V,
}

/// Split a KKT solution into `(dx, dy, dz)`, recovering `dz` for the
/// augmented system.
pub fn expand_solution<M: IpfMatrix>(
    system: KktSystem,
    a: &M,
    d: &M::Vector,
    rmu: &M::Vector,
    x: &M::Vector,
    z: &M::Vector,
) -> Result<KktDirection<M::Vector>> {
    let n = a.width();
    let m = a.height();
    SolverError::check_dim("KKT solution", kkt_height(system, n, m)?, d.height())?;
    let mut dx_entries = Vec::new();
    let mut dy_entries = Vec::new();
    let mut dz_entries = Vec::new();
    for (k, v) in d.local_entries() {
        if k < n {
            dx_entries.push((k, v));
        } else if k < n + m {
            dy_entries.push((k - n, v));
        } else {
            dz_entries.push((k - n - m, v));
        }
    }
    let dx = a.vector_from_entries(n, dx_entries);
    let dy = a.vector_from_entries(m, dy_entries);
    let dz = match system {
        KktSystem::Full => a.vector_from_entries(n, dz_entries),
        _ => {
            let mut dz = z.clone();
            dz.diagonal_scale(&dx);
            dz.axpy(1.0, rmu);
            dz.diagonal_solve(x);
            dz.scale(-1.0);
            dz
        }
    };
    Ok(KktDirection { dx, dy, dz })
}

/// Current residuals of the QP at the iterate the step is computed from.
#[derive(Debug)]
pub struct NewtonResiduals<'a, V> {
    /// `A x − b`
    pub rb: &'a V,
    /// `Q x + Aᵀ y − z + c`
    pub rc: &'a V,
    /// `x ∘ z − σ μ e`
    pub rmu: &'a V,
}

/// Assemble, factor and solve the Newton system, then expand its solution.
///
/// The regularization candidates in `reg` are escalated when the solve
/// needed many refinement steps.
pub fn search_direction<M: IpfMatrix>(
    system: KktSystem,
    q: &M,
    a: &M,
    x: &M::Vector,
    z: &M::Vector,
    res: NewtonResiduals<'_, M::Vector>,
    solver: &mut M::Solver,
    reg: &mut RegularizationState<M::Vector>,
    ctrl: &RegSolveCtrl,
) -> Result<KktDirection<M::Vector>> {
    let height = kkt_height(system, a.width(), a.height())?;
    let triplets = kkt_triplets(system, q, a, x, z)?;
    let mut d = kkt_rhs(system, a, res.rb, res.rc, res.rmu, x, z)?;
    let num_large_refines = solver.solve(system, height, triplets, reg.candidate(), &mut d, ctrl)?;
    reg.record_solve(num_large_refines, ctrl.large_refine_threshold);

    let dir = expand_solution(system, a, &d, res.rmu, x, z)?;
    if log::log_enabled!(log::Level::Debug) {
        log_step_errors(q, a, x, z, &res, &dir)?;
    }
    Ok(dir)
}

/// Residuals of the three linearized optimality conditions at the step.
fn log_step_errors<M: IpfMatrix>(
    q: &M,
    a: &M,
    x: &M::Vector,
    z: &M::Vector,
    res: &NewtonResiduals<'_, M::Vector>,
    dir: &KktDirection<M::Vector>,
) -> Result<()> {
    let mut dx_err = res.rb.clone();
    a.multiply(Orientation::Normal, 1.0, &dir.dx, 1.0, &mut dx_err)?;

    let mut dy_err = res.rc.clone();
    q.multiply(Orientation::Normal, 1.0, &dir.dx, 1.0, &mut dy_err)?;
    a.multiply(Orientation::Transpose, 1.0, &dir.dy, 1.0, &mut dy_err)?;
    dy_err.axpy(-1.0, &dir.dz);

    let mut dz_err = x.clone();
    dz_err.diagonal_scale(&dir.dz);
    let mut z_dx = z.clone();
    z_dx.diagonal_scale(&dir.dx);
    dz_err.axpy(1.0, &z_dx);
    dz_err.axpy(1.0, res.rmu);

    debug!(
        "|| dxError ||_2 / (1 + || r_b ||_2) = {:e}",
        dx_err.nrm2() / (1.0 + res.rb.nrm2())
    );
    debug!(
        "|| dyError ||_2 / (1 + || r_c ||_2) = {:e}",
        dy_err.nrm2() / (1.0 + res.rc.nrm2())
    );
    debug!(
        "|| dzError ||_2 / (1 + || r_mu ||_2) = {:e}",
        dz_err.nrm2() / (1.0 + res.rmu.nrm2())
    );
    Ok(())
}
