use super::{multi_shift_diagonal_block_solve, MultiShiftCtrl};
use crate::comm::Comm;
use crate::dist::{Dist, DistMatrix};
use crate::error::{Result, SolverError};
use crate::scalar::Real;
use nalgebra::ComplexField;
use num_traits::One;

fn check_layout<T, C>(what: &str, a: &DistMatrix<T, C>, expected: (Dist, Dist)) -> Result<()>
where
    T: ComplexField,
    C: Comm,
{
    if a.dists() != expected {
        return Err(SolverError::Logic(format!(
            "{} must be distributed as {:?}, got {:?}",
            what,
            expected,
            a.dists()
        )));
    }
    Ok(())
}

/// Distributed counterpart of [`multi_shift_solve`](super::multi_shift_solve).
///
/// `u` and `x` are `[MC,MR]` matrices and `shifts` is a `k × 1` `[VR,*]`
/// column. Each panel's diagonal block is replicated, the panel columns of
/// `x` are spread over all ranks as `[*,VR]` so every rank solves its own
/// columns with [`multi_shift_diagonal_block_solve`], and the rows above the
/// panel are updated with a local product against a `[MC,*]` copy of the
/// off-diagonal block. Returns the scale factors as a `k × 1` `[VR,*]`
/// column.
///
/// Unlike the serial routine, the trailing update is not guarded against
/// overflow.
pub fn dist_multi_shift_solve<T, C>(
    u: &DistMatrix<T, C>,
    shifts: &DistMatrix<T, C>,
    x: &mut DistMatrix<T, C>,
    ctrl: &MultiShiftCtrl,
) -> Result<DistMatrix<T::RealField, C>>
where
    T: ComplexField,
    T::RealField: Real,
    C: Comm,
{
    check_layout("triangular matrix", u, (Dist::Mc, Dist::Mr))?;
    check_layout("right-hand side", x, (Dist::Mc, Dist::Mr))?;
    check_layout("shifts", shifts, (Dist::Vr, Dist::Star))?;

    let n = u.height();
    let k = x.width();
    SolverError::check_dim("triangular matrix width", n, u.width())?;
    SolverError::check_dim("right-hand side height", n, x.height())?;
    SolverError::check_dim("number of shifts", k, shifts.height())?;
    SolverError::check_dim("shift columns", 1, shifts.width())?;

    let one = T::RealField::one();
    let grid = x.grid().clone();
    let mut scales = DistMatrix::new(&grid, Dist::Vr, Dist::Star, k, 1);
    scales.local_mut().fill(one);
    if n == 0 || k == 0 {
        return Ok(scales);
    }

    let bsize = ctrl.block_size.max(1);
    let k_last = ((n - 1) / bsize) * bsize;
    for k0 in (0..=k_last).rev().step_by(bsize) {
        if k0 >= k {
            continue;
        }
        let nb = bsize.min(n - k0);
        let ind1 = k0..k0 + nb;
        let num_active = k - k0;

        let mut u11 = u.submatrix(ind1.clone(), ind1.clone()).redistribute(Dist::Star, Dist::Star);
        let x1 = x.submatrix(ind1.clone(), k0..k);
        let shifts1 = shifts.submatrix(k0..k, 0..1);

        // Every rank solves the panel columns it owns in [*,VR].
        let mut x1_star_vr = x1.redistribute_aligned(Dist::Star, Dist::Vr, 0, shifts1.col_align());
        let mut update = DistMatrix::new_aligned(
            &grid,
            Dist::Vr,
            Dist::Star,
            num_active,
            1,
            shifts1.col_align(),
            0,
        );
        update.local_mut().fill(one);
        let col_offset = x1_star_vr.row_shift();
        let col_stride = x1_star_vr.row_stride();
        multi_shift_diagonal_block_solve(
            u11.local_mut(),
            shifts1.local().as_slice(),
            x1_star_vr.local_mut(),
            update.local_mut().as_mut_slice(),
            col_offset,
            col_stride,
            ctrl,
        )?;

        let x1_star_mr = x1_star_vr.redistribute_aligned(Dist::Star, Dist::Mr, 0, x1.row_align());
        let x1_new = x1_star_mr.redistribute_aligned(Dist::Mc, Dist::Mr, x1.col_align(), x1.row_align());
        x.set_submatrix(k0, k0, &x1_new)?;

        // Propagate the panel scalings to the rest of each column.
        let update_mr_star = update.redistribute_aligned(Dist::Mr, Dist::Star, x1.row_align(), 0);
        let sigma: Vec<T::RealField> = update_mr_star
            .local()
            .iter()
            .map(|&s| if s < one { s } else { one })
            .collect();
        for rows in [0..k0, k0 + nb..n] {
            if rows.is_empty() {
                continue;
            }
            let start = rows.start;
            let mut block = x.submatrix(rows, k0..k);
            for (j_loc, &s) in sigma.iter().enumerate() {
                if s < one {
                    for v in block.local_mut().column_mut(j_loc).iter_mut() {
                        *v = v.clone().scale(s);
                    }
                }
            }
            x.set_submatrix(start, k0, &block)?;
        }
        let mut scales_active = scales.submatrix(k0..k, 0..1);
        let update_vr = update.redistribute_aligned(Dist::Vr, Dist::Star, scales_active.col_align(), 0);
        for (s, &f) in scales_active
            .local_mut()
            .iter_mut()
            .zip(update_vr.local().iter())
        {
            *s *= f;
        }
        scales.set_submatrix(k0, 0, &scales_active)?;

        if k0 == 0 {
            continue;
        }
        let mut x0 = x.submatrix(0..k0, k0..k);
        let u01 = u
            .submatrix(0..k0, ind1)
            .redistribute_aligned(Dist::Mc, Dist::Star, x0.col_align(), 0);
        x0.local_mut()
            .gemm(-T::one(), u01.local(), x1_star_mr.local(), T::one());
        x.set_submatrix(0, k0, &x0)?;
    }

    Ok(scales)
}

#[cfg(test)]
mod tests {
    use super::super::{multi_shift_solve, tests::eigen_problem};
    use super::*;
    use crate::comm::ThreadComm;
    use crate::dist::Grid;
    use float_eq::assert_float_eq;
    use nalgebra::DMatrix;

    #[test]
    fn test_matches_serial_solve() {
        let (u, shifts, b) = eigen_problem(17, 9);
        let ctrl = MultiShiftCtrl {
            block_size: 4,
            ..Default::default()
        };
        let mut expected = b.clone();
        let expected_scales = multi_shift_solve(&u, &shifts, &mut expected, &ctrl).unwrap();

        for p in [1, 2, 4] {
            let results = ThreadComm::run(p, |comm| {
                let grid = Grid::new(comm);
                let du = DistMatrix::from_global(&grid, Dist::Mc, Dist::Mr, &u);
                let ds = DistMatrix::from_global(
                    &grid,
                    Dist::Vr,
                    Dist::Star,
                    &DMatrix::from_column_slice(shifts.len(), 1, &shifts),
                );
                let mut dx = DistMatrix::from_global(&grid, Dist::Mc, Dist::Mr, &b);
                let scales = dist_multi_shift_solve(&du, &ds, &mut dx, &ctrl).unwrap();
                (dx.gather(), scales.gather())
            });
            for (x, scales) in results {
                assert_eq!(scales.as_slice(), expected_scales.as_slice(), "p = {p}");
                for (a, e) in x.iter().zip(expected.iter()) {
                    assert_float_eq!(*a, *e, abs <= 1e-12 * (1.0 + e.abs()));
                }
            }
        }
    }

    #[test]
    fn test_singular_shift_scales_to_zero() {
        let u = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 0.0, 3.0]);
        let b = DMatrix::from_row_slice(2, 2, &[0.0, -1.0, 0.0, 0.0]);
        let shifts = DMatrix::from_column_slice(2, 1, &[5.0, 2.0]);
        let results = ThreadComm::run(2, |comm| {
            let grid = Grid::new(comm);
            let du = DistMatrix::from_global(&grid, Dist::Mc, Dist::Mr, &u);
            let ds = DistMatrix::from_global(&grid, Dist::Vr, Dist::Star, &shifts);
            let mut dx = DistMatrix::from_global(&grid, Dist::Mc, Dist::Mr, &b);
            let scales = dist_multi_shift_solve(&du, &ds, &mut dx, &MultiShiftCtrl::default()).unwrap();
            (dx.gather(), scales.gather())
        });
        for (x, scales) in results {
            assert_eq!(scales.as_slice(), &[1.0, 0.0]);
            assert_eq!(x[(0, 1)], 1.0);
        }
    }

    #[test]
    fn test_rejects_wrong_layout() {
        let (u, shifts, b) = eigen_problem(4, 1);
        ThreadComm::run(2, |comm| {
            let grid = Grid::new(comm);
            let du = DistMatrix::from_global(&grid, Dist::Star, Dist::Star, &u);
            let ds = DistMatrix::from_global(
                &grid,
                Dist::Vr,
                Dist::Star,
                &DMatrix::from_column_slice(4, 1, &shifts),
            );
            let mut dx = DistMatrix::from_global(&grid, Dist::Mc, Dist::Mr, &b);
            assert!(dist_multi_shift_solve(&du, &ds, &mut dx, &MultiShiftCtrl::default()).is_err());
        });
    }
}
