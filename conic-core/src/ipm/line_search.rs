//! Backtracking line search of the infeasible path-following method.

use super::ctrl::LineSearchCtrl;
use super::repr::{IpfMatrix, IpfVector, Orientation};
use crate::error::{Result, SolverError};
use log::{debug, info};

/// Problem data, iterate and step the line search works on.
pub struct LineSearchInput<'a, M: IpfMatrix> {
    pub q: &'a M,
    pub a: &'a M,
    pub b: &'a M::Vector,
    pub c: &'a M::Vector,
    pub x: &'a M::Vector,
    pub y: &'a M::Vector,
    pub z: &'a M::Vector,
    pub dx: &'a M::Vector,
    pub dy: &'a M::Vector,
    pub dz: &'a M::Vector,
}

/// Largest `α = upper_bound / step_ratioᵏ` that keeps the iterate central,
/// does not let the infeasibility outgrow `μ` and decreases `μ`
/// sufficiently.
///
/// A trial step is accepted when
///
/// 1. `x_α ∘ z_α ≥ γ μ_α`,
/// 2. `‖r_b(α)‖ ≤ max(b_tol, β ‖r_b‖ μ_α / μ)`,
/// 3. `‖r_c(α)‖ ≤ max(c_tol, β ‖r_c‖ μ_α / μ)`,
/// 4. `μ_α ≤ (1 − α/ψ) μ`.
///
/// The residuals are affine in `α`, so both products are formed once.
pub fn ipf_line_search<M: IpfMatrix>(
    input: &LineSearchInput<'_, M>,
    upper_bound: f64,
    b_tol: f64,
    c_tol: f64,
    ctrl: &LineSearchCtrl,
) -> Result<f64> {
    ctrl.validate()?;
    let LineSearchInput { q, a, b, c, x, y, z, dx, dy, dz } = *input;
    let n = x.height() as f64;

    // r_b = A x − b and its directional derivative A dx
    let mut rb = b.clone();
    a.multiply(Orientation::Normal, 1.0, x, -1.0, &mut rb)?;
    let mut rb_dir = a.zeros(a.height());
    a.multiply(Orientation::Normal, 1.0, dx, 0.0, &mut rb_dir)?;

    // r_c = Q x + Aᵀ y − z + c and Q dx + Aᵀ dy − dz
    let mut rc = c.clone();
    q.multiply(Orientation::Normal, 1.0, x, 1.0, &mut rc)?;
    a.multiply(Orientation::Transpose, 1.0, y, 1.0, &mut rc)?;
    rc.axpy(-1.0, z);
    let mut rc_dir = a.zeros(a.width());
    q.multiply(Orientation::Normal, 1.0, dx, 0.0, &mut rc_dir)?;
    a.multiply(Orientation::Transpose, 1.0, dy, 1.0, &mut rc_dir)?;
    rc_dir.axpy(-1.0, dz);

    let mu = x.dot(z) / n;
    let rb_norm = rb.nrm2();
    let rc_norm = rc.nrm2();

    let mut alpha = upper_bound;
    while alpha >= f64::EPSILON {
        let mut x_alpha = x.clone();
        x_alpha.axpy(alpha, dx);
        let mut z_alpha = z.clone();
        z_alpha.axpy(alpha, dz);
        let mu_alpha = x_alpha.dot(&z_alpha) / n;

        let mut xz = x_alpha;
        xz.diagonal_scale(&z_alpha);
        let centered = xz.min_entry() >= ctrl.gamma * mu_alpha;

        let mut rb_alpha = rb.clone();
        rb_alpha.axpy(alpha, &rb_dir);
        let rb_alpha_norm = rb_alpha.nrm2();
        let rb_bound = b_tol.max(ctrl.beta * rb_norm * mu_alpha / mu);

        let mut rc_alpha = rc.clone();
        rc_alpha.axpy(alpha, &rc_dir);
        let rc_alpha_norm = rc_alpha.nrm2();
        let rc_bound = c_tol.max(ctrl.beta * rc_norm * mu_alpha / mu);

        let decreased = mu_alpha <= (1.0 - alpha / ctrl.psi) * mu;

        if ctrl.print {
            info!(
                "alpha = {:e}: centered = {}, ||r_b|| = {:e} (bound {:e}), ||r_c|| = {:e} (bound {:e}), mu = {:e} -> {:e}",
                alpha, centered, rb_alpha_norm, rb_bound, rc_alpha_norm, rc_bound, mu, mu_alpha
            );
        }
        if centered && rb_alpha_norm <= rb_bound && rc_alpha_norm <= rc_bound && decreased {
            debug!("line search accepted alpha = {:e}", alpha);
            return Ok(alpha);
        }
        alpha /= ctrl.step_ratio;
    }
    Err(SolverError::LineSearch(format!(
        "no acceptable step above machine epsilon from an upper bound of {:e}",
        upper_bound
    )))
}
