//! Starting point for the infeasible path-following method.

use super::ctrl::{KktSystem, RegSolveCtrl};
use super::kkt::{kkt_height, kkt_triplets};
use super::regularization::RegularizationState;
use super::repr::{IpfMatrix, IpfVector, KktLinearSolver};
use crate::error::Result;
use log::debug;

/// Split `d = [u; w]` of the augmented system into its `n` and `m` blocks.
fn split<M: IpfMatrix>(a: &M, d: &M::Vector) -> (M::Vector, M::Vector) {
    let n = a.width();
    let (upper, lower): (Vec<_>, Vec<_>) = d.local_entries().into_iter().partition(|&(k, _)| k < n);
    let lower = lower.into_iter().map(|(k, v)| (k - n, v)).collect();
    (a.vector_from_entries(n, upper), a.vector_from_entries(a.height(), lower))
}

/// Shift `s` into the strict interior when it is not already there.
fn standard_shift<V: IpfVector>(s: &mut V) {
    let alpha = -s.min_entry();
    if alpha >= 0.0 {
        s.shift(alpha + 1.0);
    }
}

/// Compute `(x, y, z)` from the augmented system with `x = z = 1`,
/// `J = [Q + I, Aᵀ; A, 0]`.
///
/// Unless `primal_initialized`, `x` solves `J [x; ·] = [0; b]`, the
/// minimum-norm point of `A x = b` in the `Q + I` metric. Unless
/// `dual_initialized`, `J [w; y] = [−c; 0]` gives `y` and `z = −w`. Every
/// computed block is then shifted into the positive orthant.
pub fn initialize<M: IpfMatrix>(
    q: &M,
    a: &M,
    b: &M::Vector,
    c: &M::Vector,
    x: &mut M::Vector,
    y: &mut M::Vector,
    z: &mut M::Vector,
    primal_initialized: bool,
    dual_initialized: bool,
    solver: &mut M::Solver,
    ctrl: &RegSolveCtrl,
) -> Result<()> {
    if primal_initialized && dual_initialized {
        return Ok(());
    }
    let n = a.width();
    let m = a.height();
    let system = KktSystem::Augmented;
    let height = kkt_height(system, n, m)?;
    let ones = a.vector_from_global(&vec![1.0; n]);
    let triplets = kkt_triplets(system, q, a, &ones, &ones)?;
    let reg = RegularizationState::new(system, a)?;

    if !primal_initialized {
        let entries = b.local_entries().into_iter().map(|(i, v)| (n + i, v)).collect();
        let mut d = a.vector_from_entries(height, entries);
        solver.solve(system, height, triplets.clone(), reg.candidate(), &mut d, ctrl)?;
        let (u, _) = split(a, &d);
        *x = u;
        standard_shift(x);
        debug!("primal start: min x = {:e}", x.min_entry());
    }
    if !dual_initialized {
        let entries = c.local_entries().into_iter().map(|(i, v)| (i, -v)).collect();
        let mut d = a.vector_from_entries(height, entries);
        solver.solve(system, height, triplets, reg.candidate(), &mut d, ctrl)?;
        let (mut w, v) = split(a, &d);
        w.scale(-1.0);
        *y = v;
        *z = w;
        standard_shift(z);
        debug!("dual start: min z = {:e}", z.min_entry());
    }
    Ok(())
}
