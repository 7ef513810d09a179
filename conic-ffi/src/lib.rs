//! C ABI for the conic-core engine.
//!
//! Every function returns a [`ConicError`] code. Matrices are passed as
//! column-major `f64` buffers. Output buffers are written only on success.

use conic_core::ipm::{IpfCtrl, KktSystem, LineSearchCtrl};
use conic_core::{ipf, multi_shift_solve, MultiShiftCtrl, RegSolveCtrl, SolverError};
use nalgebra::{DMatrix, DVector};
use std::os::raw::{c_char, c_int};

/// Status code returned across the C boundary.
pub type ConicError = c_int;

pub const CONIC_SUCCESS: ConicError = 0;
pub const CONIC_LOGIC_ERROR: ConicError = 1;
pub const CONIC_INVALID_CONFIG: ConicError = 2;
pub const CONIC_DIMENSION_MISMATCH: ConicError = 3;
pub const CONIC_NONPOSITIVE_ITERATE: ConicError = 4;
pub const CONIC_MAX_ITERATIONS: ConicError = 5;
pub const CONIC_LINE_SEARCH_FAILED: ConicError = 6;
pub const CONIC_FACTORIZATION_FAILED: ConicError = 7;
pub const CONIC_NULL_POINTER: ConicError = -1;

/// Flat mirror of [`IpfCtrl`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ConicIpfCtrl {
    pub primal_initialized: bool,
    pub dual_initialized: bool,
    pub tol: f64,
    pub max_its: usize,
    pub centering: f64,
    /// 0 = full, 1 = augmented, 2 = normal (rejected by the direct QP)
    pub system: c_int,
    pub equilibrate: bool,
    pub print: bool,
    pub line_search_gamma: f64,
    pub line_search_beta: f64,
    pub line_search_psi: f64,
    pub line_search_step_ratio: f64,
    pub line_search_print: bool,
    pub solve_rel_tol: f64,
    pub solve_max_refine_its: usize,
    pub solve_large_refine_threshold: usize,
    pub solve_progress: bool,
}

impl From<&IpfCtrl> for ConicIpfCtrl {
    fn from(ctrl: &IpfCtrl) -> Self {
        Self {
            primal_initialized: ctrl.primal_initialized,
            dual_initialized: ctrl.dual_initialized,
            tol: ctrl.tol,
            max_its: ctrl.max_its,
            centering: ctrl.centering,
            system: ctrl.system.code(),
            equilibrate: ctrl.equilibrate,
            print: ctrl.print,
            line_search_gamma: ctrl.line_search.gamma,
            line_search_beta: ctrl.line_search.beta,
            line_search_psi: ctrl.line_search.psi,
            line_search_step_ratio: ctrl.line_search.step_ratio,
            line_search_print: ctrl.line_search.print,
            solve_rel_tol: ctrl.solve_ctrl.rel_tol,
            solve_max_refine_its: ctrl.solve_ctrl.max_refine_its,
            solve_large_refine_threshold: ctrl.solve_ctrl.large_refine_threshold,
            solve_progress: ctrl.solve_ctrl.progress,
        }
    }
}

impl ConicIpfCtrl {
    fn to_ipf_ctrl(self) -> Result<IpfCtrl, SolverError> {
        Ok(IpfCtrl {
            primal_initialized: self.primal_initialized,
            dual_initialized: self.dual_initialized,
            tol: self.tol,
            max_its: self.max_its,
            centering: self.centering,
            system: KktSystem::from_code(self.system)?,
            equilibrate: self.equilibrate,
            solve_ctrl: RegSolveCtrl {
                rel_tol: self.solve_rel_tol,
                max_refine_its: self.solve_max_refine_its,
                large_refine_threshold: self.solve_large_refine_threshold,
                progress: self.solve_progress,
            },
            line_search: LineSearchCtrl {
                gamma: self.line_search_gamma,
                beta: self.line_search_beta,
                psi: self.line_search_psi,
                step_ratio: self.line_search_step_ratio,
                print: self.line_search_print,
            },
            print: self.print,
        })
    }
}

unsafe fn input<'a>(ptr: *const f64, len: usize) -> Result<&'a [f64], ConicError> {
    if len == 0 {
        Ok(&[])
    } else if ptr.is_null() {
        Err(CONIC_NULL_POINTER)
    } else {
        Ok(std::slice::from_raw_parts(ptr, len))
    }
}

unsafe fn output<'a>(ptr: *mut f64, len: usize) -> Result<&'a mut [f64], ConicError> {
    if len == 0 {
        Ok(&mut [])
    } else if ptr.is_null() {
        Err(CONIC_NULL_POINTER)
    } else {
        Ok(std::slice::from_raw_parts_mut(ptr, len))
    }
}

macro_rules! try_ffi {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(code) => return code,
        }
    };
}

/// Fill `ctrl` with the defaults for dense (`is_sparse == false`) or sparse
/// problems.
///
/// # Safety
///
/// `ctrl` must be null or point to writable memory for one `ConicIpfCtrl`.
#[no_mangle]
pub unsafe extern "C" fn conic_ipf_ctrl_default(ctrl: *mut ConicIpfCtrl, is_sparse: bool) -> ConicError {
    if ctrl.is_null() {
        return CONIC_NULL_POINTER;
    }
    *ctrl = ConicIpfCtrl::from(&IpfCtrl::new(is_sparse));
    CONIC_SUCCESS
}

/// Solve the dense direct-form QP `min ½xᵀQx + cᵀx s.t. Ax = b, x ≥ 0`.
///
/// `q` is `n × n`, `a` is `m × n`, `b` has `m` entries and `c` has `n`.
/// `x` (`n`), `y` (`m`) and `z` (`n`) are read as a starting point when the
/// control marks them initialized and receive the solution on success.
///
/// # Safety
///
/// Every pointer must be valid for the number of `f64` values given above
/// and `ctrl` must point to an initialized `ConicIpfCtrl`.
#[no_mangle]
pub unsafe extern "C" fn conic_qp_direct_ipf_dense(
    m: usize,
    n: usize,
    q: *const f64,
    a: *const f64,
    b: *const f64,
    c: *const f64,
    x: *mut f64,
    y: *mut f64,
    z: *mut f64,
    ctrl: *const ConicIpfCtrl,
) -> ConicError {
    if ctrl.is_null() {
        return CONIC_NULL_POINTER;
    }
    let ctrl = match (*ctrl).to_ipf_ctrl() {
        Ok(ctrl) => ctrl,
        Err(e) => return e.code(),
    };
    let q = DMatrix::from_column_slice(n, n, try_ffi!(input(q, n * n)));
    let a = DMatrix::from_column_slice(m, n, try_ffi!(input(a, m * n)));
    let b = DVector::from_column_slice(try_ffi!(input(b, m)));
    let c = DVector::from_column_slice(try_ffi!(input(c, n)));
    let x_out = try_ffi!(output(x, n));
    let y_out = try_ffi!(output(y, m));
    let z_out = try_ffi!(output(z, n));

    let mut x = DVector::from_column_slice(x_out);
    let mut y = DVector::from_column_slice(y_out);
    let mut z = DVector::from_column_slice(z_out);
    match ipf(&q, &a, &b, &c, &mut x, &mut y, &mut z, &ctrl) {
        Ok(_) => {
            x_out.copy_from_slice(x.as_slice());
            y_out.copy_from_slice(y.as_slice());
            z_out.copy_from_slice(z.as_slice());
            CONIC_SUCCESS
        }
        Err(e) => e.code(),
    }
}

/// Solve `(U − σ_j I) x_j = s_j b_j` for the leading `j` rows of every
/// column `j` of the `n × k` matrix `x`, overwriting it.
///
/// # Safety
///
/// `u` must hold `n · n` values, `shifts` and `scales` `k` values and `x`
/// `n · k` values.
#[no_mangle]
pub unsafe extern "C" fn conic_multi_shift_solve(
    n: usize,
    k: usize,
    u: *const f64,
    shifts: *const f64,
    x: *mut f64,
    scales: *mut f64,
) -> ConicError {
    let u = DMatrix::from_column_slice(n, n, try_ffi!(input(u, n * n)));
    let shifts = try_ffi!(input(shifts, k));
    let x_out = try_ffi!(output(x, n * k));
    let scales_out = try_ffi!(output(scales, k));

    let mut x = DMatrix::from_column_slice(n, k, x_out);
    match multi_shift_solve(&u, shifts, &mut x, &MultiShiftCtrl::default()) {
        Ok(s) => {
            x_out.copy_from_slice(x.as_slice());
            scales_out.copy_from_slice(&s);
            CONIC_SUCCESS
        }
        Err(e) => e.code(),
    }
}

/// Static, NUL-terminated description of a status code.
#[no_mangle]
pub extern "C" fn conic_error_string(code: ConicError) -> *const c_char {
    let msg: &'static [u8] = match code {
        CONIC_SUCCESS => b"success\0",
        CONIC_LOGIC_ERROR => b"logic error\0",
        CONIC_INVALID_CONFIG => b"invalid configuration\0",
        CONIC_DIMENSION_MISMATCH => b"dimension mismatch\0",
        CONIC_NONPOSITIVE_ITERATE => b"iterate left the positive orthant\0",
        CONIC_MAX_ITERATIONS => b"maximum number of iterations exceeded\0",
        CONIC_LINE_SEARCH_FAILED => b"line search failed\0",
        CONIC_FACTORIZATION_FAILED => b"factorization failed\0",
        CONIC_NULL_POINTER => b"null pointer\0",
        _ => b"unknown error\0",
    };
    msg.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::ptr;

    fn default_ctrl() -> ConicIpfCtrl {
        let mut ctrl = ConicIpfCtrl::from(&IpfCtrl::default());
        assert_eq!(unsafe { conic_ipf_ctrl_default(&mut ctrl, false) }, CONIC_SUCCESS);
        ctrl.centering = 0.1;
        ctrl.max_its = 100;
        ctrl
    }

    #[test]
    fn test_dense_qp() {
        let q = [1.0, 0.0, 0.0, 1.0];
        let a = [1.0, 1.0];
        let b = [2.0];
        let c = [0.0, 0.0];
        let mut x = [0.0; 2];
        let mut y = [0.0; 1];
        let mut z = [0.0; 2];
        let ctrl = default_ctrl();
        let status = unsafe {
            conic_qp_direct_ipf_dense(
                1,
                2,
                q.as_ptr(),
                a.as_ptr(),
                b.as_ptr(),
                c.as_ptr(),
                x.as_mut_ptr(),
                y.as_mut_ptr(),
                z.as_mut_ptr(),
                &ctrl,
            )
        };
        assert_eq!(status, CONIC_SUCCESS);
        assert!((x[0] - 1.0).abs() < 1e-6);
        assert!((x[1] - 1.0).abs() < 1e-6);
        assert!((y[0] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bad_arguments() {
        let q = [1.0, 0.0, 0.0, 1.0];
        let (mut x, mut y, mut z) = ([0.0; 2], [0.0; 1], [0.0; 2]);
        let mut ctrl = default_ctrl();
        let status = unsafe {
            conic_qp_direct_ipf_dense(
                1,
                2,
                q.as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                x.as_mut_ptr(),
                y.as_mut_ptr(),
                z.as_mut_ptr(),
                &ctrl,
            )
        };
        assert_eq!(status, CONIC_NULL_POINTER);

        ctrl.system = 9;
        let status = unsafe {
            conic_qp_direct_ipf_dense(
                1,
                2,
                q.as_ptr(),
                q.as_ptr(),
                q.as_ptr(),
                q.as_ptr(),
                x.as_mut_ptr(),
                y.as_mut_ptr(),
                z.as_mut_ptr(),
                &ctrl,
            )
        };
        assert_eq!(status, CONIC_INVALID_CONFIG);
        assert_eq!(unsafe { conic_ipf_ctrl_default(ptr::null_mut(), true) }, CONIC_NULL_POINTER);
    }

    #[test]
    fn test_single_shift_leaves_rhs() {
        let u = [2.0, 0.0, 1.0, 3.0];
        let shifts = [1.0];
        let mut x = [0.0, 0.0];
        let mut scales = [0.0];
        let status = unsafe {
            conic_multi_shift_solve(2, 1, u.as_ptr(), shifts.as_ptr(), x.as_mut_ptr(), scales.as_mut_ptr())
        };
        assert_eq!(status, CONIC_SUCCESS);
        assert_eq!(x, [0.0, 0.0]);
        assert_eq!(scales, [1.0]);
    }

    #[test]
    fn test_error_strings() {
        for code in [CONIC_SUCCESS, CONIC_INVALID_CONFIG, CONIC_NULL_POINTER, 42] {
            let msg = unsafe { CStr::from_ptr(conic_error_string(code)) };
            assert!(!msg.to_bytes().is_empty());
        }
        let msg = unsafe { CStr::from_ptr(conic_error_string(CONIC_MAX_ITERATIONS)) };
        assert_eq!(msg.to_str().unwrap(), "maximum number of iterations exceeded");
    }
}
