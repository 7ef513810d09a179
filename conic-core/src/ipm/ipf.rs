//! Infeasible path-following interior point method for the direct-form QP
//!
//! ```text
//! min ½ xᵀ Q x + cᵀ x   s.t.   A x = b,  x ≥ 0
//! ```
//!
//! with dual `max −½ xᵀ Q x − bᵀ y` and slack `z = Q x + Aᵀ y + c ≥ 0`.

use super::ctrl::{invalid_system, IpfCtrl, KktSystem};
use super::equil::geom_equil;
use super::init::initialize;
use super::kkt::{search_direction, NewtonResiduals};
use super::line_search::{ipf_line_search, LineSearchInput};
use super::regularization::RegularizationState;
use super::repr::{IpfMatrix, IpfVector, Orientation, Side};
use crate::error::{Result, SolverError};
use log::{debug, info};

/// Convergence data of one iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IpfIterate {
    /// `|p − d| / (1 + |p|)` before the step
    pub obj_conv: f64,
    /// `‖r_b‖ / (1 + ‖b‖)` before the step
    pub rb_conv: f64,
    /// `‖r_c‖ / (1 + ‖c‖)` before the step
    pub rc_conv: f64,
    /// Duality measure `xᵀz / n` before the step
    pub mu: f64,
    /// Largest step keeping `x` and `z` nonnegative
    pub alpha_max: f64,
    /// Step taken
    pub alpha: f64,
    /// Smallest entry of `x` after the step
    pub min_x: f64,
    /// Smallest entry of `z` after the step
    pub min_z: f64,
    /// Largest regularization candidate magnitude used by the factorization
    pub reg_cand_max: f64,
}

/// Summary of a successful solve.
#[derive(Debug, Clone, Default)]
pub struct IpfInfo {
    /// Number of steps taken
    pub num_its: usize,
    pub history: Vec<IpfIterate>,
}

/// Row and column scalings applied to the problem, as vectors.
struct Scaling<V> {
    d_row: V,
    d_col: V,
}

fn check_inputs<M: IpfMatrix>(
    q: &M,
    a: &M,
    b: &M::Vector,
    c: &M::Vector,
    x: &M::Vector,
    y: &M::Vector,
    z: &M::Vector,
    ctrl: &IpfCtrl,
) -> Result<()> {
    if ctrl.system == KktSystem::Normal {
        return Err(invalid_system());
    }
    ctrl.line_search.validate()?;
    let n = a.width();
    let m = a.height();
    SolverError::check_dim("Q height", n, q.height())?;
    SolverError::check_dim("Q width", n, q.width())?;
    SolverError::check_dim("b height", m, b.height())?;
    SolverError::check_dim("c height", n, c.height())?;
    if ctrl.primal_initialized {
        SolverError::check_dim("x height", n, x.height())?;
    }
    if ctrl.dual_initialized {
        SolverError::check_dim("y height", m, y.height())?;
        SolverError::check_dim("z height", n, z.height())?;
    }
    Ok(())
}

/// Scale `A ← D_r⁻¹ A D_c⁻¹`, `Q ← D_c⁻¹ Q D_c⁻¹`, `b ← D_r⁻¹ b` and
/// `c ← D_c⁻¹ c`. The scalings are all ones unless `equilibrate` is set.
fn equilibrate<M: IpfMatrix>(
    q: &mut M,
    a: &mut M,
    b: &mut M::Vector,
    c: &mut M::Vector,
    equilibrate: bool,
) -> Result<Scaling<M::Vector>> {
    let (d_row, d_col) = if equilibrate {
        geom_equil(a.height(), a.width(), &a.global_triplets())
    } else {
        (vec![1.0; a.height()], vec![1.0; a.width()])
    };
    let d_row = a.vector_from_global(&d_row);
    let d_col = a.vector_from_global(&d_col);
    a.diagonal_solve(Side::Left, &d_row)?;
    a.diagonal_solve(Side::Right, &d_col)?;
    q.diagonal_solve(Side::Left, &d_col)?;
    q.diagonal_solve(Side::Right, &d_col)?;
    b.diagonal_solve(&d_row);
    c.diagonal_solve(&d_col);
    Ok(Scaling { d_row, d_col })
}

/// Solve the direct-form QP by infeasible path following.
///
/// `x`, `y` and `z` are read as a starting point when `ctrl` marks them
/// initialized and are overwritten with the solution only when the method
/// converges. The problem data is never modified.
///
/// # Errors
///
/// * [`SolverError::InvalidConfig`] for the normal-equation system or bad
///   line search controls, before any work is done
/// * [`SolverError::DimensionMismatch`] for inconsistent shapes
/// * [`SolverError::NonPositiveIterate`] if `x` or `z` leaves the interior
/// * [`SolverError::MaxIterations`] if `ctrl.max_its` steps do not converge
/// * [`SolverError::LineSearch`] and factorization errors from the steps
pub fn ipf<M: IpfMatrix>(
    q: &M,
    a: &M,
    b: &M::Vector,
    c: &M::Vector,
    x: &mut M::Vector,
    y: &mut M::Vector,
    z: &mut M::Vector,
    ctrl: &IpfCtrl,
) -> Result<IpfInfo> {
    check_inputs(q, a, b, c, x, y, z, ctrl)?;
    let n = a.width();
    let m = a.height();

    let mut q = q.clone();
    let mut a = a.clone();
    let mut b = b.clone();
    let mut c = c.clone();
    let scaling = equilibrate(&mut q, &mut a, &mut b, &mut c, ctrl.equilibrate)?;

    let mut xw = if ctrl.primal_initialized { x.clone() } else { a.zeros(n) };
    let (mut yw, mut zw) = if ctrl.dual_initialized {
        (y.clone(), z.clone())
    } else {
        (a.zeros(m), a.zeros(n))
    };
    if ctrl.primal_initialized {
        xw.diagonal_scale(&scaling.d_col);
    }
    if ctrl.dual_initialized {
        yw.diagonal_scale(&scaling.d_row);
        zw.diagonal_solve(&scaling.d_col);
    }

    let mut solver = a.kkt_solver();
    initialize(
        &q,
        &a,
        &b,
        &c,
        &mut xw,
        &mut yw,
        &mut zw,
        ctrl.primal_initialized,
        ctrl.dual_initialized,
        &mut solver,
        &ctrl.solve_ctrl,
    )?;

    let b_norm = b.nrm2();
    let c_norm = c.nrm2();
    let b_tol = ctrl.tol * (1.0 + b_norm);
    let c_tol = ctrl.tol * (1.0 + c_norm);
    let mut reg = RegularizationState::new(ctrl.system, &a)?;
    let mut info = IpfInfo::default();

    loop {
        let x_nonpositive = xw.num_nonpositive();
        let z_nonpositive = zw.num_nonpositive();
        if x_nonpositive > 0 || z_nonpositive > 0 {
            return Err(SolverError::NonPositiveIterate {
                x_nonpositive,
                z_nonpositive,
            });
        }

        let mut qx = a.zeros(n);
        q.multiply(Orientation::Normal, 1.0, &xw, 0.0, &mut qx)?;
        let x_qx = xw.dot(&qx);
        let prim_obj = 0.5 * x_qx + c.dot(&xw);
        let dual_obj = -0.5 * x_qx - b.dot(&yw);
        let obj_conv = (prim_obj - dual_obj).abs() / (1.0 + prim_obj.abs());

        let mut rb = b.clone();
        a.multiply(Orientation::Normal, 1.0, &xw, -1.0, &mut rb)?;
        let rb_conv = rb.nrm2() / (1.0 + b_norm);

        let mut rc = qx;
        a.multiply(Orientation::Transpose, 1.0, &yw, 1.0, &mut rc)?;
        rc.axpy(-1.0, &zw);
        rc.axpy(1.0, &c);
        let rc_conv = rc.nrm2() / (1.0 + c_norm);

        if ctrl.print {
            info!(
                "iter {}: primal = {:e}, dual = {:e}, |primal - dual|/(1 + |primal|) = {:e}, \
                 ||r_b||_2/(1 + ||b||_2) = {:e}, ||r_c||_2/(1 + ||c||_2) = {:e}",
                info.num_its, prim_obj, dual_obj, obj_conv, rb_conv, rc_conv
            );
        }
        if obj_conv <= ctrl.tol && rb_conv <= ctrl.tol && rc_conv <= ctrl.tol {
            break;
        }
        if info.num_its == ctrl.max_its {
            return Err(SolverError::MaxIterations {
                max_its: ctrl.max_its,
            });
        }

        let mu = xw.dot(&zw) / n as f64;
        let mut rmu = zw.clone();
        rmu.diagonal_scale(&xw);
        rmu.shift(-ctrl.centering * mu);

        let reg_cand_max = reg.max_magnitude();
        let dir = search_direction(
            ctrl.system,
            &q,
            &a,
            &xw,
            &zw,
            NewtonResiduals {
                rb: &rb,
                rc: &rc,
                rmu: &rmu,
            },
            &mut solver,
            &mut reg,
            &ctrl.solve_ctrl,
        )?;

        let alpha_max = xw
            .max_step_in_positive_cone(&dir.dx, 1.0)
            .min(zw.max_step_in_positive_cone(&dir.dz, 1.0));
        let input = LineSearchInput {
            q: &q,
            a: &a,
            b: &b,
            c: &c,
            x: &xw,
            y: &yw,
            z: &zw,
            dx: &dir.dx,
            dy: &dir.dy,
            dz: &dir.dz,
        };
        let alpha = ipf_line_search(&input, 0.99 * alpha_max, b_tol, c_tol, &ctrl.line_search)?;
        if ctrl.print {
            info!("alpha_max = {:e}, alpha = {:e}", alpha_max, alpha);
        }

        xw.axpy(alpha, &dir.dx);
        yw.axpy(alpha, &dir.dy);
        zw.axpy(alpha, &dir.dz);
        info.history.push(IpfIterate {
            obj_conv,
            rb_conv,
            rc_conv,
            mu,
            alpha_max,
            alpha,
            min_x: xw.min_entry(),
            min_z: zw.min_entry(),
            reg_cand_max,
        });
        info.num_its += 1;
    }

    xw.diagonal_solve(&scaling.d_col);
    yw.diagonal_solve(&scaling.d_row);
    zw.diagonal_scale(&scaling.d_col);
    debug!("converged after {} iterations", info.num_its);
    *x = xw;
    *y = yw;
    *z = zw;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use nalgebra::{DMatrix, DVector};

    fn problem() -> (DMatrix<f64>, DMatrix<f64>, DVector<f64>, DVector<f64>) {
        (
            DMatrix::identity(2, 2),
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            DVector::from_vec(vec![2.0]),
            DVector::zeros(2),
        )
    }

    fn ctrl(system: KktSystem) -> IpfCtrl {
        IpfCtrl {
            system,
            centering: 0.1,
            max_its: 100,
            ..IpfCtrl::default()
        }
    }

    #[test]
    fn test_converges_with_both_systems() {
        let (q, a, b, c) = problem();
        for system in [KktSystem::Full, KktSystem::Augmented] {
            let mut x = DVector::zeros(2);
            let mut y = DVector::zeros(1);
            let mut z = DVector::zeros(2);
            let info = ipf(&q, &a, &b, &c, &mut x, &mut y, &mut z, &ctrl(system)).unwrap();
            assert!(info.num_its <= 100);
            assert_eq!(info.history.len(), info.num_its);
            assert_float_eq!(x[0], 1.0, abs <= 1e-6);
            assert_float_eq!(x[1], 1.0, abs <= 1e-6);
            assert_float_eq!(y[0], -1.0, abs <= 1e-6);
            assert!(z.iter().all(|&v| v > 0.0 && v < 1e-6));
        }
    }

    #[test]
    fn test_equilibrated_solve_matches() {
        let q = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.02]);
        let a = DMatrix::from_row_slice(1, 2, &[100.0, 1.0]);
        let b = DVector::from_vec(vec![101.0]);
        let c = DVector::from_vec(vec![1.0, 0.01]);
        let mut results = Vec::new();
        for equilibrate in [false, true] {
            let mut x = DVector::zeros(2);
            let mut y = DVector::zeros(1);
            let mut z = DVector::zeros(2);
            let ctrl = IpfCtrl {
                equilibrate,
                ..ctrl(KktSystem::Augmented)
            };
            ipf(&q, &a, &b, &c, &mut x, &mut y, &mut z, &ctrl).unwrap();
            results.push(x);
        }
        for i in 0..2 {
            assert_float_eq!(results[0][i], results[1][i], abs <= 1e-5);
        }
        assert_float_eq!(100.0 * results[1][0] + results[1][1], 101.0, abs <= 1e-5);
    }

    #[test]
    fn test_outputs_untouched_on_failure() {
        let (q, a, b, c) = problem();
        let mut x = DVector::from_vec(vec![7.0, 7.0]);
        let mut y = DVector::from_vec(vec![7.0]);
        let mut z = DVector::from_vec(vec![7.0, 7.0]);
        let ctrl = IpfCtrl {
            max_its: 1,
            ..ctrl(KktSystem::Full)
        };
        let err = ipf(&q, &a, &b, &c, &mut x, &mut y, &mut z, &ctrl).unwrap_err();
        assert!(matches!(err, SolverError::MaxIterations { max_its: 1 }));
        assert_eq!(x.as_slice(), &[7.0, 7.0]);
        assert_eq!(y.as_slice(), &[7.0]);
        assert_eq!(z.as_slice(), &[7.0, 7.0]);
    }
}
