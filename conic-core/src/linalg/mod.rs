//! Linear algebra kernels backing the KKT solves.
//!
//! - `sparse`: CSC helpers over `sprs`
//! - `ldl`: sparse LDLᵀ through the `ldl` crate
//! - `reg_ldl`: regularized factorization of tree-ordered fronts with
//!   iterative refinement

pub mod ldl;
pub mod reg_ldl;
pub mod sparse;

pub use ldl::{LdlError, LdlSolver};
pub use reg_ldl::{regularized_qsd_ldl, solve_after, RegSolveCtrl, RegularizedLdlFront};
