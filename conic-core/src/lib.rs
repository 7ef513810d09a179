//! Conic: a distributed interior point engine for quadratic programs
//!
//! The crate solves the direct-form QP
//!
//! ```text
//! min ½ xᵀQx + cᵀx   s.t.   Ax = b,  x ≥ 0
//! ```
//!
//! with an infeasible path-following method. The driver is generic over the
//! storage scheme, so the same code runs on dense or sparse data held by one
//! process or distributed over many:
//!
//! - **Dense serial**: `DMatrix<f64>` / `DVector<f64>`
//! - **Dense distributed**: element-cyclic [`dist::DistMatrix`] on a process grid
//! - **Sparse distributed**: row-distributed [`dist::DistSparseMatrix`]
//!   with [`dist::DistMultiVec`] vectors; serial sparse problems run on one rank
//!
//! # Components
//!
//! - **KKT assembly** in full or augmented form, factored with a signed
//!   a-priori regularization and iterative refinement against the
//!   unregularized system
//! - **Nodal remapping** ([`nodal::DistNodalMultiVec`]) between the natural row
//!   distribution and the elimination tree ordering of the sparse factorization
//! - **Multi-shift triangular solves** ([`triang`]) with LAPACK-style overflow
//!   protection, used for eigenvectors of triangular matrices
//!
//! # Example
//!
//! ```
//! use conic_core::{ipf, IpfCtrl};
//! use nalgebra::{DMatrix, DVector};
//!
//! // min ½‖x‖² s.t. x₁ + x₂ = 2, x ≥ 0
//! let q = DMatrix::identity(2, 2);
//! let a = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
//! let b = DVector::from_vec(vec![2.0]);
//! let c = DVector::zeros(2);
//! let (mut x, mut y, mut z) = (DVector::zeros(2), DVector::zeros(1), DVector::zeros(2));
//!
//! let ctrl = IpfCtrl { centering: 0.1, ..IpfCtrl::default() };
//! let info = ipf(&q, &a, &b, &c, &mut x, &mut y, &mut z, &ctrl)?;
//! assert!(info.num_its > 0);
//! assert!((x[0] - 1.0).abs() < 1e-6);
//! # Ok::<(), conic_core::SolverError>(())
//! ```
//!
//! Multi-process code is written against the [`comm::Comm`] trait. The
//! crate ships a single-process communicator and an in-process thread mesh.

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // solver kernels take the full problem

pub mod comm;
pub mod dist;
pub mod error;
pub mod ipm;
pub mod linalg;
pub mod nodal;
pub mod qp;
pub mod scalar;
pub mod triang;

pub use error::{Result, SolverError};
pub use ipm::{IpfCtrl, IpfInfo, IpfIterate, KktSystem, LineSearchCtrl};
pub use linalg::RegSolveCtrl;
pub use qp::direct::{ipf, ipf_sparse};
pub use triang::{dist_multi_shift_solve, multi_shift_diagonal_block_solve, multi_shift_solve, MultiShiftCtrl};
