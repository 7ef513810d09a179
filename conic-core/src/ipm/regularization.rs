//! Signed regularization candidates for the KKT factorizations.

use super::ctrl::{invalid_system, KktSystem};
use super::repr::{IpfMatrix, IpfVector};
use crate::error::Result;
use log::warn;

/// Candidate magnitudes per KKT row, ordered like the system itself.
///
/// The primal block gets `+ε^0.75`. The Lagrange multiplier block and, in
/// the full system, the dual block get `−ε^0.5`.
pub fn reg_candidates(system: KktSystem, n: usize, m: usize) -> Result<Vec<f64>> {
    let eps = f64::EPSILON;
    let primal = eps.powf(0.75);
    let lagrange = -eps.sqrt();
    let dual = -eps.sqrt();
    let mut cand = vec![primal; n];
    match system {
        KktSystem::Full => {
            cand.extend(std::iter::repeat(lagrange).take(m));
            cand.extend(std::iter::repeat(dual).take(n));
        }
        KktSystem::Augmented => cand.extend(std::iter::repeat(lagrange).take(m)),
        KktSystem::Normal => return Err(invalid_system()),
    }
    Ok(cand)
}

/// Regularization candidates of one KKT system across the iterations.
///
/// After a solve that needed more than `large_refine_threshold` refinement
/// steps the candidates are multiplied by ten, once. They never shrink.
#[derive(Debug, Clone)]
pub struct RegularizationState<V> {
    candidate: V,
    escalated: bool,
}

impl<V: IpfVector> RegularizationState<V> {
    pub fn new<M>(system: KktSystem, a: &M) -> Result<Self>
    where
        M: IpfMatrix<Vector = V>,
    {
        let cand = reg_candidates(system, a.width(), a.height())?;
        Ok(Self {
            candidate: a.vector_from_global(&cand),
            escalated: false,
        })
    }

    pub fn candidate(&self) -> &V {
        &self.candidate
    }

    pub fn max_magnitude(&self) -> f64 {
        self.candidate.max_norm()
    }

    pub fn escalated(&self) -> bool {
        self.escalated
    }

    /// Feed back the refinement count of the last solve. Returns whether the
    /// candidates were escalated.
    pub fn record_solve(&mut self, num_large_refines: usize, large_refine_threshold: usize) -> bool {
        if num_large_refines > large_refine_threshold && !self.escalated {
            warn!(
                "{} refinement steps exceeded {}, increasing the regularization tenfold",
                num_large_refines, large_refine_threshold
            );
            self.candidate.scale(10.0);
            self.escalated = true;
            return true;
        }
        false
    }
}
