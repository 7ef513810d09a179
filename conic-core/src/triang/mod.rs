//! Multi-shift upper-triangular solves with overflow-safe scaling.
//!
//! Given an upper-triangular `U` (`n × n`), shifts `σ_0 … σ_{k-1}` and a
//! right-hand side `X` (`n × k`), these routines solve
//!
//! ```text
//! (U(0:j, 0:j) − σ_j I) x_j = s_j · X(0:j, j)      for every column j
//! ```
//!
//! in place and return the scale factors `s_j ∈ [0, 1]`. Column `j` only
//! involves its leading `j` rows, which is the shape of the right-hand sides
//! that appear when computing eigenvectors of a triangular matrix. Entries of
//! `X` on or below the diagonal must be zero.
//!
//! Scaling follows the LAPACK `xLATRS` strategy: an Anderson-style growth
//! bound decides whether a plain triangular solve is safe, and otherwise a
//! careful back-substitution rescales the column whenever the next operation
//! could overflow.

mod dist;

pub use dist::dist_multi_shift_solve;

use crate::error::{Result, SolverError};
use crate::scalar::{overflow_parameters, Real};
use nalgebra::{ComplexField, DMatrix, RealField};
use num_traits::{One, Zero};

/// Multi-shift solve controls.
#[derive(Debug, Clone)]
pub struct MultiShiftCtrl {
    /// Panel width of the blocked algorithm.
    pub block_size: usize,
    /// Always take the overflow-checked back-substitution.
    pub careful_only: bool,
}

impl Default for MultiShiftCtrl {
    fn default() -> Self {
        Self {
            block_size: 128,
            careful_only: false,
        }
    }
}

#[inline]
fn real<R: Real>(v: f64) -> R {
    nalgebra::convert(v)
}

fn max_abs<'a, T, I>(values: I) -> T::RealField
where
    T: ComplexField + 'a,
    I: IntoIterator<Item = &'a T>,
{
    values
        .into_iter()
        .fold(T::RealField::zero(), |m, v| m.max(v.clone().modulus()))
}

fn scale_column<T: ComplexField>(x: &mut DMatrix<T>, col: usize, rows: std::ops::Range<usize>, s: T::RealField) {
    for i in rows {
        x[(i, col)] = x[(i, col)].clone().scale(s.clone());
    }
}

/// Unblocked multi-shift solve of a diagonal block.
///
/// Local column `j_loc` of `x` corresponds to panel column
/// `j = col_offset + j_loc * col_stride` and is solved against the leading
/// `min(n, j)` rows of `u − shifts[j_loc] I`; column 0 of a panel has nothing
/// to solve. The diagonal of `u` is shifted in place and restored before
/// returning. `scales[j_loc]` is multiplied by every scaling applied to the
/// column.
pub fn multi_shift_diagonal_block_solve<T>(
    u: &mut DMatrix<T>,
    shifts: &[T],
    x: &mut DMatrix<T>,
    scales: &mut [T::RealField],
    col_offset: usize,
    col_stride: usize,
    ctrl: &MultiShiftCtrl,
) -> Result<()>
where
    T: ComplexField,
    T::RealField: Real,
{
    let n = u.nrows();
    SolverError::check_dim("diagonal block width", n, u.ncols())?;
    SolverError::check_dim("right-hand side height", n, x.nrows())?;
    SolverError::check_dim("number of shifts", x.ncols(), shifts.len())?;
    SolverError::check_dim("number of scales", x.ncols(), scales.len())?;

    let (small_num, big_num) = overflow_parameters::<T::RealField>();
    let zero = T::RealField::zero();
    let one = T::RealField::one();
    let half: T::RealField = real(0.5);
    let quarter: T::RealField = real(0.25);

    let diag: Vec<T> = u.diagonal().iter().cloned().collect();
    // Largest off-diagonal magnitude of each column.
    let c_norm: Vec<T::RealField> = (0..n)
        .map(|j| max_abs(u.view((0, j), (j, 1)).iter()))
        .collect();

    for j_loc in 0..x.ncols() {
        let j = col_offset + j_loc * col_stride.max(1);
        let h = n.min(j);
        if h == 0 {
            continue;
        }
        for i in 0..h {
            u[(i, i)] = diag[i].clone() - shifts[j_loc].clone();
        }

        let mut x_max = max_abs(x.view((0, j_loc), (h, 1)).iter());
        if x_max >= big_num {
            let s = half * big_num / x_max;
            scale_column(x, j_loc, 0..h, s);
            x_max *= s;
            scales[j_loc] *= s;
        }
        if x_max <= small_num {
            continue;
        }

        // Growth bound of the unscaled back-substitution.
        let mut inv_g = one / x_max.max(small_num);
        let mut inv_m = inv_g;
        let mut bounded = true;
        for i in (0..h).rev() {
            if inv_g <= small_num {
                bounded = false;
                break;
            }
            let abs_uii = u[(i, i)].clone().modulus();
            inv_m = inv_m.min(abs_uii.min(one) * inv_g);
            if abs_uii + c_norm[i] >= small_num {
                inv_g *= abs_uii / (abs_uii + c_norm[i]);
            } else {
                inv_g = zero;
            }
        }
        let growth_ok = bounded && inv_m > small_num;

        if growth_ok && !ctrl.careful_only {
            let mut xj = x.view_mut((0, j_loc), (h, 1));
            if !u.view((0, 0), (h, h)).solve_upper_triangular_mut(&mut xj) {
                for (i, d) in diag.into_iter().enumerate() {
                    u[(i, i)] = d;
                }
                return Err(SolverError::Logic(format!(
                    "zero pivot in the bounded solve of column {}",
                    j
                )));
            }
            continue;
        }

        let mut s_col = one;
        for i in (0..h).rev() {
            let uii = u[(i, i)].clone();
            let abs_uii = uii.clone().modulus();
            let mut abs_xi = x[(i, j_loc)].clone().modulus();

            if abs_uii > small_num {
                if abs_uii <= one && abs_xi >= abs_uii * big_num {
                    let s = half / abs_xi;
                    scale_column(x, j_loc, 0..h, s);
                    s_col *= s;
                    x_max *= s;
                }
                x[(i, j_loc)] = x[(i, j_loc)].clone() / uii;
            } else if abs_uii > zero {
                if abs_xi >= abs_uii * big_num {
                    let s = half * abs_uii * big_num / abs_xi;
                    scale_column(x, j_loc, 0..h, s);
                    s_col *= s;
                    x_max *= s;
                }
                x[(i, j_loc)] = x[(i, j_loc)].clone() / uii;
            } else if abs_xi >= small_num {
                // Exactly singular: return a null vector of the shifted block.
                scale_column(x, j_loc, 0..h, zero);
                x[(i, j_loc)] = T::one();
                s_col = zero;
                x_max = zero;
            }

            if i > 0 {
                abs_xi = x[(i, j_loc)].clone().modulus();
                if abs_xi > one {
                    if c_norm[i] >= (big_num - x_max) / abs_xi {
                        let s = quarter / abs_xi;
                        scale_column(x, j_loc, 0..h, s);
                        s_col *= s;
                    }
                } else if abs_xi * c_norm[i] >= big_num - x_max {
                    scale_column(x, j_loc, 0..h, quarter);
                    s_col *= quarter;
                }

                let xi = x[(i, j_loc)].clone();
                for l in 0..i {
                    x[(l, j_loc)] = x[(l, j_loc)].clone() - xi.clone() * u[(l, i)].clone();
                }
                x_max = max_abs(x.view((0, j_loc), (i, 1)).iter());
            }
        }
        scales[j_loc] *= s_col;
    }

    for (i, d) in diag.into_iter().enumerate() {
        u[(i, i)] = d;
    }
    Ok(())
}

/// Blocked multi-shift triangular solve.
///
/// Panels of `ctrl.block_size` rows are processed from the bottom-right
/// corner upwards. Each panel is solved with
/// [`multi_shift_diagonal_block_solve`], the resulting column scalings are
/// propagated to the rows above and below, and the rows above are updated by
/// a matrix product guarded against overflow.
pub fn multi_shift_solve<T>(
    u: &DMatrix<T>,
    shifts: &[T],
    x: &mut DMatrix<T>,
    ctrl: &MultiShiftCtrl,
) -> Result<Vec<T::RealField>>
where
    T: ComplexField,
    T::RealField: Real,
{
    let n = u.nrows();
    let k = x.ncols();
    SolverError::check_dim("triangular matrix width", n, u.ncols())?;
    SolverError::check_dim("right-hand side height", n, x.nrows())?;
    SolverError::check_dim("number of shifts", k, shifts.len())?;

    let (small_num, big_num) = overflow_parameters::<T::RealField>();
    let one = T::RealField::one();
    let half: T::RealField = real(0.5);
    let two_small = small_num * real(2.0);

    let mut scales = vec![one; k];
    if n == 0 || k == 0 {
        return Ok(scales);
    }

    // Tame oversized columns up front and track a bound on each column.
    let mut x_bound = Vec::with_capacity(k);
    for j in 0..k {
        let h = n.min(j);
        let mut x_max = max_abs(x.view((0, j), (h, 1)).iter());
        if x_max >= big_num {
            let s = half * big_num / x_max;
            scale_column(x, j, 0..n, s);
            scales[j] *= s;
            x_max *= s;
        }
        x_bound.push(x_max.max(two_small));
    }

    let bsize = ctrl.block_size.max(1);
    let k_last = ((n - 1) / bsize) * bsize;
    for k0 in (0..=k_last).rev().step_by(bsize) {
        if k0 >= k {
            continue;
        }
        let nb = bsize.min(n - k0);
        let num_active = k - k0;

        let mut u11 = u.view((k0, k0), (nb, nb)).into_owned();
        let mut x1 = x.view((k0, k0), (nb, num_active)).into_owned();
        let mut update = vec![one; num_active];
        multi_shift_diagonal_block_solve(&mut u11, &shifts[k0..], &mut x1, &mut update, 0, 1, ctrl)?;
        x.view_mut((k0, k0), (nb, num_active)).copy_from(&x1);

        for (jj, &sigma) in update.iter().enumerate() {
            if sigma < one {
                let j = k0 + jj;
                scale_column(x, j, 0..k0, sigma);
                scale_column(x, j, k0 + nb..n, sigma);
                scales[j] *= sigma;
                x_bound[j] *= sigma;
            }
        }

        if k0 == 0 {
            continue;
        }

        let u01 = u.view((0, k0), (k0, nb));
        let nb_real: T::RealField = nalgebra::convert(nb as f64);
        let mut c_norm = T::RealField::zero();
        for l in 0..nb {
            c_norm += max_abs(u01.column(l).iter());
        }
        c_norm /= nb_real;

        for jj in 0..num_active {
            let j = k0 + jj;
            let x1_max = max_abs(x.view((k0, j), (nb, 1)).iter());
            let x_max = x_bound[j];
            let s = if x1_max > one {
                if c_norm > (big_num - x_max) / x1_max / nb_real {
                    Some(half / (x1_max * nb_real))
                } else {
                    None
                }
            } else if x1_max * c_norm * nb_real > big_num - x_max {
                Some(half / nb_real)
            } else {
                None
            };
            if let Some(s) = s {
                scale_column(x, j, 0..n, s);
                scales[j] *= s;
            }
        }

        let x1 = x.view((k0, k0), (nb, num_active)).into_owned();
        let mut x0 = x.view_mut((0, k0), (k0, num_active));
        x0.gemm(-T::one(), &u01, &x1, T::one());
        for jj in 0..num_active {
            let j = k0 + jj;
            x_bound[j] = max_abs(x.view((0, j), (k0, 1)).iter()).max(two_small);
        }
    }

    Ok(scales)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use nalgebra::Complex;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256StarStar;

    /// Upper-triangular matrix with diagonal `1..=n`, eigenvalue shifts and
    /// the matching eigenvector right-hand sides `X(0:j, j) = -U(0:j, j)`.
    pub(crate) fn eigen_problem(n: usize, seed: u64) -> (DMatrix<f64>, Vec<f64>, DMatrix<f64>) {
        let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
        let mut u = DMatrix::zeros(n, n);
        for j in 0..n {
            u[(j, j)] = (j + 1) as f64;
            for i in 0..j {
                u[(i, j)] = rng.gen_range(-0.5..0.5);
            }
        }
        let shifts: Vec<f64> = (0..n).map(|j| u[(j, j)]).collect();
        let x = DMatrix::from_fn(n, n, |i, j| if i < j { -u[(i, j)] } else { 0.0 });
        (u, shifts, x)
    }

    fn reference_solve<T: ComplexField>(u: &DMatrix<T>, shifts: &[T], b: &DMatrix<T>) -> DMatrix<T> {
        let mut x = b.clone();
        for j in 0..b.ncols() {
            let h = u.nrows().min(j);
            for i in (0..h).rev() {
                let mut acc = x[(i, j)].clone();
                for l in i + 1..h {
                    acc -= u[(i, l)].clone() * x[(l, j)].clone();
                }
                x[(i, j)] = acc / (u[(i, i)].clone() - shifts[j].clone());
            }
        }
        x
    }

    fn assert_close(a: &DMatrix<f64>, b: &DMatrix<f64>, tol: f64) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert_float_eq!(*x, *y, abs <= tol * (1.0 + y.abs()));
        }
    }

    #[test]
    fn test_fast_path_matches_reference() {
        let (u, shifts, b) = eigen_problem(20, 7);
        let mut x = b.clone();
        let scales = multi_shift_solve(&u, &shifts, &mut x, &MultiShiftCtrl::default()).unwrap();
        assert!(scales.iter().all(|&s| s == 1.0));
        assert_close(&x, &reference_solve(&u, &shifts, &b), 1e-12);
    }

    #[test]
    fn test_careful_path_matches_reference() {
        let (u, shifts, b) = eigen_problem(20, 11);
        let mut x = b.clone();
        let ctrl = MultiShiftCtrl {
            careful_only: true,
            ..Default::default()
        };
        let scales = multi_shift_solve(&u, &shifts, &mut x, &ctrl).unwrap();
        assert!(scales.iter().all(|&s| s == 1.0));
        assert_close(&x, &reference_solve(&u, &shifts, &b), 1e-12);
    }

    #[test]
    fn test_blocked_matches_unblocked() {
        let (u, shifts, b) = eigen_problem(23, 3);
        let mut unblocked = b.clone();
        multi_shift_solve(&u, &shifts, &mut unblocked, &MultiShiftCtrl::default()).unwrap();
        for block_size in [1, 4, 7] {
            let mut blocked = b.clone();
            let ctrl = MultiShiftCtrl {
                block_size,
                ..Default::default()
            };
            let scales = multi_shift_solve(&u, &shifts, &mut blocked, &ctrl).unwrap();
            assert!(scales.iter().all(|&s| s == 1.0));
            assert_close(&blocked, &unblocked, 1e-12);
        }
    }

    #[test]
    fn test_single_shift_leaves_rhs_alone() {
        let (u, _, _) = eigen_problem(6, 1);
        let b = DMatrix::from_fn(6, 1, |i, _| i as f64 + 1.0);
        let mut x = b.clone();
        let scales = multi_shift_solve(&u, &[0.5], &mut x, &MultiShiftCtrl::default()).unwrap();
        assert_eq!(scales, vec![1.0]);
        assert_eq!(x, b);
    }

    #[test]
    fn test_huge_rhs_is_scaled() {
        let (u, shifts, _) = eigen_problem(5, 2);
        let mut b = DMatrix::zeros(5, 5);
        for i in 0..4 {
            b[(i, 4)] = 1e300 * (i as f64 + 1.0);
        }
        let mut x = b.clone();
        let scales = multi_shift_solve(&u, &shifts, &mut x, &MultiShiftCtrl::default()).unwrap();
        assert!(scales[4] < 1.0 && scales[4] > 0.0);
        assert!(x.iter().all(|v| v.is_finite()));

        // (U - σ I) x = scale * b, checked in units of scale * |b|
        for i in 0..4 {
            let mut lhs = (u[(i, i)] - shifts[4]) * x[(i, 4)];
            for l in i + 1..4 {
                lhs += u[(i, l)] * x[(l, 4)];
            }
            let rhs = scales[4] * b[(i, 4)];
            assert_float_eq!(lhs, rhs, r2nd <= 1e-12);
        }
    }

    #[test]
    fn test_exactly_singular_shift() {
        // shift 2 hits U(0,0) exactly for column 1
        let u = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 0.0, 3.0]);
        let mut x = DMatrix::from_row_slice(2, 2, &[0.0, -1.0, 0.0, 0.0]);
        let scales = multi_shift_solve(&u, &[5.0, 2.0], &mut x, &MultiShiftCtrl::default()).unwrap();
        assert_eq!(scales, vec![1.0, 0.0]);
        assert_eq!(x[(0, 1)], 1.0);
    }

    #[test]
    fn test_negligible_entry_over_zero_pivot_is_kept() {
        // U(1,1) - σ_2 is exactly zero and X(1,2) is below the underflow
        // threshold, so the entry passes through untouched.
        let u = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 5.0]);
        let mut x = DMatrix::zeros(3, 3);
        x[(0, 2)] = 1.0;
        x[(1, 2)] = 1e-300;
        let scales = multi_shift_solve(&u, &[0.0, 0.0, 5.0], &mut x, &MultiShiftCtrl::default()).unwrap();
        assert_eq!(scales, vec![1.0; 3]);
        assert_eq!(x[(1, 2)], 1e-300);
        assert_float_eq!(x[(0, 2)], -1.0 / 3.0, r2nd <= 1e-15);
    }

    #[test]
    fn test_overflow_guard_threshold_is_inclusive() {
        // |x_1| * c_norm[1] lands exactly on big_num - x_max, which must
        // trigger the quarter rescale.
        let (_, big_num) = overflow_parameters::<f64>();
        let u = DMatrix::from_row_slice(3, 3, &[4.0, big_num, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0]);
        let mut x = DMatrix::zeros(3, 3);
        x[(1, 2)] = 1.0;
        let ctrl = MultiShiftCtrl {
            careful_only: true,
            ..Default::default()
        };
        let scales = multi_shift_solve(&u, &[0.0, 0.0, 1.0], &mut x, &ctrl).unwrap();
        assert_eq!(scales[2], 0.25);
        assert!(x.column(2).iter().all(|v| v.is_finite()));
        assert_eq!(x[(1, 2)], 0.25);
        assert_float_eq!(x[(0, 2)], -0.25 * big_num / 3.0, r2nd <= 1e-15);
    }

    #[test]
    fn test_complex_careful_matches_reference() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(5);
        let n = 9;
        let mut u = DMatrix::from_element(n, n, Complex::new(0.0, 0.0));
        for j in 0..n {
            u[(j, j)] = Complex::new((j + 1) as f64, 0.5 * j as f64);
            for i in 0..j {
                u[(i, j)] = Complex::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5));
            }
        }
        let shifts: Vec<_> = (0..n).map(|j| u[(j, j)]).collect();
        let b = DMatrix::from_fn(n, n, |i, j| if i < j { -u[(i, j)] } else { Complex::new(0.0, 0.0) });
        let expected = reference_solve(&u, &shifts, &b);
        for careful_only in [false, true] {
            let mut x = b.clone();
            let ctrl = MultiShiftCtrl {
                block_size: 4,
                careful_only,
            };
            let scales = multi_shift_solve(&u, &shifts, &mut x, &ctrl).unwrap();
            assert!(scales.iter().all(|&s| s == 1.0));
            for (a, e) in x.iter().zip(expected.iter()) {
                assert!((a - e).norm() <= 1e-12 * (1.0 + e.norm()));
            }
        }
    }

    #[test]
    fn test_shape_errors() {
        let u = DMatrix::<f64>::zeros(3, 3);
        let mut x = DMatrix::zeros(3, 2);
        assert!(multi_shift_solve(&u, &[1.0], &mut x, &MultiShiftCtrl::default()).is_err());
        let mut x = DMatrix::zeros(4, 1);
        assert!(multi_shift_solve(&u, &[1.0], &mut x, &MultiShiftCtrl::default()).is_err());
    }
}
