//! Machine parameters for the overflow-safe triangular kernels.

use nalgebra::RealField;

/// Real scalar with the LAPACK machine constants the scaling logic needs.
pub trait Real: RealField + Copy {
    /// Smallest normalized positive number (`dlamch('S')`).
    fn safe_min() -> Self;
    /// Largest finite number (`dlamch('O')`).
    fn overflow_threshold() -> Self;
    /// Relative machine precision (`dlamch('P')`).
    fn precision() -> Self;
}

impl Real for f64 {
    fn safe_min() -> Self {
        f64::MIN_POSITIVE
    }
    fn overflow_threshold() -> Self {
        f64::MAX
    }
    fn precision() -> Self {
        f64::EPSILON
    }
}

impl Real for f32 {
    fn safe_min() -> Self {
        f32::MIN_POSITIVE
    }
    fn overflow_threshold() -> Self {
        f32::MAX
    }
    fn precision() -> Self {
        f32::EPSILON
    }
}

/// Returns `(small_num, big_num)`.
///
/// `small_num = max(safe_min / ulp, 1 / (overflow * ulp))` and
/// `big_num = 1 / small_num`. Quantities below `small_num` are treated as
/// negligible and anything at or above `big_num` risks overflow on the next
/// multiply.
pub fn overflow_parameters<R: Real>() -> (R, R) {
    let ulp = R::precision();
    let safe_min = R::safe_min();
    let overflow = R::overflow_threshold();
    let one = R::one();
    let small_num = (safe_min / ulp).max(one / (overflow * ulp));
    (small_num, one / small_num)
}
