//! Control structures for the interior point driver.

use crate::error::{Result, SolverError};
use std::sync::OnceLock;

pub use crate::linalg::reg_ldl::RegSolveCtrl;

/// `CONIC_VERBOSE` of 1 or more turns on per-iteration progress logging.
fn verbose_from_env() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var("CONIC_VERBOSE")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .map(|n| n >= 1)
            .unwrap_or(false)
    })
}

/// Which linear system defines the Newton step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KktSystem {
    /// `(x, y, z)` system of order `2n + m`
    Full,
    /// `(x, y)` system of order `n + m` with `z` eliminated
    Augmented,
    /// Normal equations; not available for the direct-form QP
    Normal,
}

impl KktSystem {
    /// Decode the integer used at the C boundary.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(KktSystem::Full),
            1 => Ok(KktSystem::Augmented),
            2 => Ok(KktSystem::Normal),
            _ => Err(invalid_system()),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            KktSystem::Full => 0,
            KktSystem::Augmented => 1,
            KktSystem::Normal => 2,
        }
    }
}

pub(crate) fn invalid_system() -> SolverError {
    SolverError::InvalidConfig("Invalid KKT system choice".into())
}

/// Backtracking line search controls.
#[derive(Debug, Clone)]
pub struct LineSearchCtrl {
    /// Centrality floor: `x_i z_i ≥ gamma · μ`
    pub gamma: f64,

    /// Allowed growth of the infeasibility relative to `μ`
    pub beta: f64,

    /// Required decrease of `μ`: `μ_α ≤ (1 − α/psi) μ`
    pub psi: f64,

    /// Backtracking divisor
    pub step_ratio: f64,

    pub print: bool,
}

impl Default for LineSearchCtrl {
    fn default() -> Self {
        Self {
            gamma: 1e-3,
            beta: 2.0,
            psi: 100.0,
            step_ratio: 1.5,
            print: false,
        }
    }
}

impl LineSearchCtrl {
    pub fn validate(&self) -> Result<()> {
        if !(self.gamma > 0.0 && self.gamma < 1.0) {
            return Err(SolverError::InvalidConfig(format!(
                "line search gamma must lie in (0, 1), got {}",
                self.gamma
            )));
        }
        if !(self.beta >= 1.0) {
            return Err(SolverError::InvalidConfig(format!(
                "line search beta must be at least 1, got {}",
                self.beta
            )));
        }
        if !(self.psi > 0.0) {
            return Err(SolverError::InvalidConfig(format!(
                "line search psi must be positive, got {}",
                self.psi
            )));
        }
        if !(self.step_ratio > 1.0) {
            return Err(SolverError::InvalidConfig(format!(
                "line search step ratio must exceed 1, got {}",
                self.step_ratio
            )));
        }
        Ok(())
    }
}

/// Infeasible path-following controls.
#[derive(Debug, Clone)]
pub struct IpfCtrl {
    /// Use the caller's `x` as the starting point
    pub primal_initialized: bool,

    /// Use the caller's `y` and `z` as the starting point
    pub dual_initialized: bool,

    /// Convergence tolerance on the relative gap and residuals
    pub tol: f64,

    pub max_its: usize,

    /// Centering parameter σ in `r_μ = x ∘ z − σ μ e`
    pub centering: f64,

    pub system: KktSystem,

    /// Geometrically equilibrate `A` before iterating
    pub equilibrate: bool,

    pub solve_ctrl: RegSolveCtrl,

    pub line_search: LineSearchCtrl,

    /// Log per-iteration progress at info level
    pub print: bool,
}

impl IpfCtrl {
    /// Defaults for dense (`is_sparse == false`) or sparse inputs. Sparse
    /// problems default to the augmented system, dense ones to the full one.
    pub fn new(is_sparse: bool) -> Self {
        Self {
            primal_initialized: false,
            dual_initialized: false,
            tol: 1e-8,
            max_its: 1000,
            centering: 0.9,
            system: if is_sparse {
                KktSystem::Augmented
            } else {
                KktSystem::Full
            },
            equilibrate: false,
            solve_ctrl: RegSolveCtrl::default(),
            line_search: LineSearchCtrl::default(),
            print: verbose_from_env(),
        }
    }
}

impl Default for IpfCtrl {
    fn default() -> Self {
        Self::new(false)
    }
}
