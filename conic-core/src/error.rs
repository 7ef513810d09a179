//! Crate-wide error type.
//!
//! Every fallible operation in the engine returns [`Result`]. The variants map
//! onto the failure categories the driver distinguishes: internal bookkeeping
//! errors, rejected configuration, shape errors, loss of strict interiority,
//! iteration exhaustion and factorization breakdown.

use crate::linalg::ldl::LdlError;
use thiserror::Error;

/// Errors raised by the solver stack.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Internal bookkeeping went wrong (count mismatch, inconsistent tree).
    #[error("Logic error: {0}")]
    Logic(String),

    /// A control structure holds an unsupported value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operand shapes do not agree.
    #[error("Dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which operand was checked
        what: &'static str,
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
    },

    /// An iterate left the strict interior of the nonnegative orthant.
    #[error("{x_nonpositive} entries of x were nonpositive and {z_nonpositive} entries of z were nonpositive")]
    NonPositiveIterate {
        /// Number of entries of x that are <= 0
        x_nonpositive: usize,
        /// Number of entries of z that are <= 0
        z_nonpositive: usize,
    },

    /// The iteration cap was reached before convergence.
    #[error("Maximum number of iterations ({max_its}) exceeded")]
    MaxIterations {
        /// The configured cap
        max_its: usize,
    },

    /// The backtracking line search could not find an acceptable step.
    #[error("Line search failed: {0}")]
    LineSearch(String),

    /// The LDL backend failed.
    #[error(transparent)]
    Factorization(#[from] LdlError),
}

impl SolverError {
    /// Stable integer code for each category, used at the C boundary.
    pub fn code(&self) -> i32 {
        match self {
            SolverError::Logic(_) => 1,
            SolverError::InvalidConfig(_) => 2,
            SolverError::DimensionMismatch { .. } => 3,
            SolverError::NonPositiveIterate { .. } => 4,
            SolverError::MaxIterations { .. } => 5,
            SolverError::LineSearch(_) => 6,
            SolverError::Factorization(_) => 7,
        }
    }

    pub(crate) fn check_dim(what: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected != actual {
            return Err(SolverError::DimensionMismatch {
                what,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SolverError>;
