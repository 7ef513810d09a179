//! Geometric equilibration of the constraint matrix.

use log::debug;

const MAX_SWEEPS: usize = 6;
const RELATIVE_IMPROVEMENT: f64 = 0.9;
const DAMP_TOL: f64 = 1e-4;

fn geometric_scale(max: f64, min: f64) -> f64 {
    let s = (max * min).sqrt();
    if s.is_finite() && s > DAMP_TOL {
        s
    } else {
        1.0
    }
}

fn extremes(scaled: &[(usize, usize, f64)]) -> (f64, f64) {
    scaled
        .iter()
        .filter(|t| t.2 != 0.0)
        .fold((0.0f64, f64::INFINITY), |(max, min), t| (max.max(t.2), min.min(t.2)))
}

/// Row and column scalings `(d_row, d_col)` such that `D_r⁻¹ A D_c⁻¹` has
/// entries of more uniform magnitude.
///
/// Alternates geometric-mean column and row scalings for at most six sweeps,
/// stopping once a sweep fails to cut the max/min ratio by ten percent, then
/// normalizes every column to unit max-norm. `triplets` must hold every
/// nonzero of the `height × width` matrix; duplicates are not allowed.
pub fn geom_equil(height: usize, width: usize, triplets: &[(usize, usize, f64)]) -> (Vec<f64>, Vec<f64>) {
    let mut d_row = vec![1.0; height];
    let mut d_col = vec![1.0; width];
    let mut scaled: Vec<_> = triplets.iter().map(|&(i, j, v)| (i, j, v.abs())).collect();
    if scaled.iter().all(|t| t.2 == 0.0) {
        return (d_row, d_col);
    }

    let (max, min) = extremes(&scaled);
    let mut ratio = max / min;
    for sweep in 0..MAX_SWEEPS {
        let mut col_max = vec![0.0f64; width];
        let mut col_min = vec![f64::INFINITY; width];
        for &(_, j, v) in scaled.iter().filter(|t| t.2 != 0.0) {
            col_max[j] = col_max[j].max(v);
            col_min[j] = col_min[j].min(v);
        }
        let col_scale: Vec<f64> = col_max.iter().zip(&col_min).map(|(&hi, &lo)| geometric_scale(hi, lo)).collect();
        for (d, s) in d_col.iter_mut().zip(&col_scale) {
            *d *= s;
        }
        for t in scaled.iter_mut() {
            t.2 /= col_scale[t.1];
        }

        let mut row_max = vec![0.0f64; height];
        let mut row_min = vec![f64::INFINITY; height];
        for &(i, _, v) in scaled.iter().filter(|t| t.2 != 0.0) {
            row_max[i] = row_max[i].max(v);
            row_min[i] = row_min[i].min(v);
        }
        let row_scale: Vec<f64> = row_max.iter().zip(&row_min).map(|(&hi, &lo)| geometric_scale(hi, lo)).collect();
        for (d, s) in d_row.iter_mut().zip(&row_scale) {
            *d *= s;
        }
        for t in scaled.iter_mut() {
            t.2 /= row_scale[t.0];
        }

        let (max, min) = extremes(&scaled);
        let new_ratio = max / min;
        debug!("equilibration sweep {}: max/min ratio {:e}", sweep, new_ratio);
        if new_ratio >= RELATIVE_IMPROVEMENT * ratio {
            break;
        }
        ratio = new_ratio;
    }

    let mut col_norm = vec![0.0f64; width];
    for &(_, j, v) in &scaled {
        col_norm[j] = col_norm[j].max(v);
    }
    for (d, &s) in d_col.iter_mut().zip(&col_norm) {
        if s > 0.0 {
            *d *= s;
        }
    }
    (d_row, d_col)
}
