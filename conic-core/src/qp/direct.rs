//! Direct-form QP entry points.

use crate::comm::SelfComm;
use crate::dist::{DistMultiVec, DistSparseMatrix};
use crate::error::Result;
use crate::ipm::{IpfCtrl, IpfInfo};
use nalgebra::{DMatrix, DVector};
use sprs::CsMat;

pub use crate::ipm::ipf::ipf;

fn column(v: &DVector<f64>) -> DistMultiVec<f64, SelfComm> {
    DistMultiVec::from_global(SelfComm, &DMatrix::from_column_slice(v.len(), 1, v.as_slice()))
}

fn into_dvector(v: &DistMultiVec<f64, SelfComm>) -> DVector<f64> {
    DVector::from_column_slice(v.gather().as_slice())
}

/// Solve a serial sparse direct-form QP.
///
/// The problem runs through the distributed sparse representation on a
/// single rank, so it uses the regularized LDL solver with iterative
/// refinement. `q` must hold both triangles.
pub fn ipf_sparse(
    q: &CsMat<f64>,
    a: &CsMat<f64>,
    b: &DVector<f64>,
    c: &DVector<f64>,
    x: &mut DVector<f64>,
    y: &mut DVector<f64>,
    z: &mut DVector<f64>,
    ctrl: &IpfCtrl,
) -> Result<IpfInfo> {
    let q = DistSparseMatrix::from_global(SelfComm, q);
    let a = DistSparseMatrix::from_global(SelfComm, a);
    let mut x_dist = column(x);
    let mut y_dist = column(y);
    let mut z_dist = column(z);
    let info = ipf(&q, &a, &column(b), &column(c), &mut x_dist, &mut y_dist, &mut z_dist, ctrl)?;
    *x = into_dvector(&x_dist);
    *y = into_dvector(&y_dist);
    *z = into_dvector(&z_dist);
    Ok(info)
}
