//! Interior point machinery.
//!
//! The driver ([`ipf::ipf`]) is written once against the [`repr`] traits.
//! Four representations implement them:
//!
//! | matrix                 | vector                  | KKT solver                |
//! |------------------------|-------------------------|---------------------------|
//! | `DMatrix<f64>`         | `DVector<f64>`          | [`dense::DenseKktSolver`] |
//! | `DistMatrix<f64, C>`   | `DistMatrix<f64, C>`    | [`dist_dense::DistDenseKktSolver`] |
//! | `DistSparseMatrix<C>`  | `DistMultiVec<f64, C>`  | [`sparse::SparseKktSolver`] |
//!
//! Serial sparse problems go through the distributed sparse representation
//! on a single rank (see [`crate::qp::direct::ipf_sparse`]).

pub mod ctrl;
pub mod dense;
pub mod dist_dense;
pub mod equil;
pub mod init;
pub mod ipf;
pub mod kkt;
pub mod line_search;
pub mod regularization;
pub mod repr;
pub mod sparse;

pub use ctrl::{IpfCtrl, KktSystem, LineSearchCtrl};
pub use ipf::{ipf, IpfInfo, IpfIterate};
pub use repr::{IpfMatrix, IpfVector, KktLinearSolver, Orientation, Side};
