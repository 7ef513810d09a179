use conic_core::comm::ThreadComm;
use conic_core::dist::{Dist, DistMatrix, DistSparseMatrix, Grid};
use conic_core::ipm::{IpfMatrix, IpfVector};
use conic_core::{ipf, ipf_sparse, IpfCtrl, IpfInfo, KktSystem, LineSearchCtrl, SolverError};
use float_eq::assert_float_eq;
use nalgebra::{DMatrix, DVector};
use sprs::{CsMat, TriMat};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Problem data with its known primal and dual solution.
struct Qp {
    q: DMatrix<f64>,
    a: DMatrix<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
}

/// `min ½‖x‖² s.t. x₁ + x₂ = 2, x ≥ 0`
fn simplex_qp() -> Qp {
    Qp {
        q: DMatrix::identity(2, 2),
        a: DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
        b: vec![2.0],
        c: vec![0.0; 2],
        x: vec![1.0, 1.0],
        y: vec![-1.0],
    }
}

/// Two separable blocks, every bound inactive at the solution.
fn interior_qp() -> Qp {
    Qp {
        q: DMatrix::identity(4, 4),
        a: DMatrix::from_row_slice(2, 4, &[1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]),
        b: vec![2.0, 4.0],
        c: vec![0.0; 4],
        x: vec![1.0, 1.0, 2.0, 2.0],
        y: vec![-1.0, -2.0],
    }
}

/// The bound on the second variable is active with multiplier 1.
fn active_bound_qp() -> Qp {
    Qp {
        q: DMatrix::identity(2, 2),
        a: DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
        b: vec![1.0],
        c: vec![0.0, 2.0],
        x: vec![1.0, 0.0],
        y: vec![-1.0],
    }
}

fn ctrl(system: KktSystem) -> IpfCtrl {
    IpfCtrl {
        system,
        centering: 0.1,
        max_its: 100,
        ..IpfCtrl::default()
    }
}

fn to_csc(m: &DMatrix<f64>) -> CsMat<f64> {
    let mut tri = TriMat::new((m.nrows(), m.ncols()));
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            if m[(i, j)] != 0.0 {
                tri.add_triplet(i, j, m[(i, j)]);
            }
        }
    }
    tri.to_csc()
}

fn assert_solution(qp: &Qp, x: &[f64], y: &[f64]) {
    for (v, e) in x.iter().zip(&qp.x) {
        assert_float_eq!(*v, *e, abs <= 1e-6);
    }
    for (v, e) in y.iter().zip(&qp.y) {
        assert_float_eq!(*v, *e, abs <= 1e-6);
    }
}

fn solve_dense(qp: &Qp, ctrl: &IpfCtrl) -> Result<(IpfInfo, DVector<f64>, DVector<f64>, DVector<f64>), SolverError> {
    let n = qp.a.ncols();
    let m = qp.a.nrows();
    let mut x = DVector::zeros(n);
    let mut y = DVector::zeros(m);
    let mut z = DVector::zeros(n);
    let info = ipf(
        &qp.q,
        &qp.a,
        &DVector::from_column_slice(&qp.b),
        &DVector::from_column_slice(&qp.c),
        &mut x,
        &mut y,
        &mut z,
        ctrl,
    )?;
    Ok((info, x, y, z))
}

#[test]
fn dense_systems_reach_known_solutions() {
    init_logger();
    for qp in [simplex_qp(), interior_qp(), active_bound_qp()] {
        for system in [KktSystem::Full, KktSystem::Augmented] {
            let (info, x, y, z) = solve_dense(&qp, &ctrl(system)).unwrap();
            assert!(info.num_its > 0 && info.num_its <= 100);
            assert_solution(&qp, x.as_slice(), y.as_slice());
            assert!(z.iter().all(|&v| v > 0.0));
        }
    }
}

#[test]
fn history_is_monotone_and_interior() {
    init_logger();
    let (info, ..) = solve_dense(&active_bound_qp(), &ctrl(KktSystem::Full)).unwrap();
    assert_eq!(info.history.len(), info.num_its);
    for it in &info.history {
        assert!(it.min_x > 0.0 && it.min_z > 0.0);
        assert!(it.alpha > 0.0 && it.alpha <= 0.99 * it.alpha_max);
        assert!(it.reg_cand_max > 0.0);
    }
    for pair in info.history.windows(2) {
        assert!(pair[1].mu < pair[0].mu);
        let ratio = pair[1].reg_cand_max / pair[0].reg_cand_max;
        assert!((ratio - 1.0).abs() < 1e-12 || (ratio - 10.0).abs() < 1e-10, "ratio = {ratio}");
    }
}

#[test]
fn sparse_serial_matches_dense() {
    init_logger();
    let qp = active_bound_qp();
    for system in [KktSystem::Full, KktSystem::Augmented] {
        let mut x = DVector::zeros(2);
        let mut y = DVector::zeros(1);
        let mut z = DVector::zeros(2);
        ipf_sparse(
            &to_csc(&qp.q),
            &to_csc(&qp.a),
            &DVector::from_column_slice(&qp.b),
            &DVector::from_column_slice(&qp.c),
            &mut x,
            &mut y,
            &mut z,
            &ctrl(system),
        )
        .unwrap();
        assert_solution(&qp, x.as_slice(), y.as_slice());
        assert_float_eq!(z[1], 1.0, abs <= 1e-6);
    }
}

#[test]
fn sparse_distributed_solve() {
    init_logger();
    for (qp, p) in [(simplex_qp(), 2), (simplex_qp(), 3), (interior_qp(), 3)] {
        let q = to_csc(&qp.q);
        let a = to_csc(&qp.a);
        let (n, m) = (qp.a.ncols(), qp.a.nrows());
        let results = ThreadComm::run(p, |comm| {
            let q = DistSparseMatrix::from_global(comm.clone(), &q);
            let a = DistSparseMatrix::from_global(comm, &a);
            let b = a.vector_from_global(&qp.b);
            let c = a.vector_from_global(&qp.c);
            let mut x = a.zeros(n);
            let mut y = a.zeros(m);
            let mut z = a.zeros(n);
            let info = ipf(&q, &a, &b, &c, &mut x, &mut y, &mut z, &ctrl(KktSystem::Augmented)).unwrap();
            (info.num_its, x.gather(), y.gather(), z.min_entry())
        });
        let num_its = results[0].0;
        for (its, x, y, min_z) in results {
            assert_eq!(its, num_its, "p = {p}");
            assert_solution(&qp, x.as_slice(), y.as_slice());
            assert!(min_z > 0.0);
        }
    }
}

#[test]
fn dense_distributed_solve() {
    init_logger();
    for qp in [simplex_qp(), active_bound_qp()] {
        let results = ThreadComm::run(2, |comm| {
            let grid = Grid::new(comm);
            let q = DistMatrix::from_global(&grid, Dist::Mc, Dist::Mr, &qp.q);
            let a = DistMatrix::from_global(&grid, Dist::Mc, Dist::Mr, &qp.a);
            let b = a.vector_from_global(&qp.b);
            let c = a.vector_from_global(&qp.c);
            let mut x = a.zeros(2);
            let mut y = a.zeros(1);
            let mut z = a.zeros(2);
            ipf(&q, &a, &b, &c, &mut x, &mut y, &mut z, &ctrl(KktSystem::Full)).unwrap();
            (x.gather(), y.gather())
        });
        assert_eq!(results.len(), 2);
        for (x, y) in results {
            assert_solution(&qp, x.as_slice(), y.as_slice());
        }
    }
}

#[test]
fn primal_start_is_used() {
    init_logger();
    let qp = interior_qp();
    let mut x = DVector::from_column_slice(&[1.5, 0.5, 2.5, 1.5]);
    let mut y = DVector::zeros(2);
    let mut z = DVector::zeros(4);
    let ctrl = IpfCtrl {
        primal_initialized: true,
        ..ctrl(KktSystem::Augmented)
    };
    ipf(
        &qp.q,
        &qp.a,
        &DVector::from_column_slice(&qp.b),
        &DVector::from_column_slice(&qp.c),
        &mut x,
        &mut y,
        &mut z,
        &ctrl,
    )
    .unwrap();
    assert_solution(&qp, x.as_slice(), y.as_slice());
}

#[test]
fn iteration_cap_is_reported() {
    let ctrl = IpfCtrl {
        max_its: 2,
        ..ctrl(KktSystem::Full)
    };
    let err = solve_dense(&interior_qp(), &ctrl).unwrap_err();
    assert!(matches!(err, SolverError::MaxIterations { max_its: 2 }));
}

#[test]
fn normal_system_is_rejected() {
    let err = solve_dense(&interior_qp(), &ctrl(KktSystem::Normal)).unwrap_err();
    assert!(matches!(err, SolverError::InvalidConfig(_)));
}

#[test]
fn bad_line_search_control_is_rejected() {
    let ctrl = IpfCtrl {
        line_search: LineSearchCtrl {
            psi: -1.0,
            ..Default::default()
        },
        ..ctrl(KktSystem::Full)
    };
    let err = solve_dense(&interior_qp(), &ctrl).unwrap_err();
    assert!(matches!(err, SolverError::InvalidConfig(_)));
}

#[test]
fn nonpositive_start_is_rejected() {
    let qp = active_bound_qp();
    let mut x = DVector::from_column_slice(&[-1.0, 2.0]);
    let mut y = DVector::zeros(1);
    let mut z = DVector::zeros(2);
    let ctrl = IpfCtrl {
        primal_initialized: true,
        ..ctrl(KktSystem::Full)
    };
    let err = ipf(
        &qp.q,
        &qp.a,
        &DVector::from_column_slice(&qp.b),
        &DVector::from_column_slice(&qp.c),
        &mut x,
        &mut y,
        &mut z,
        &ctrl,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SolverError::NonPositiveIterate {
            x_nonpositive: 1,
            z_nonpositive: 0
        }
    ));
    assert_eq!(x.as_slice(), &[-1.0, 2.0]);
}

#[test]
fn mismatched_shapes_are_rejected() {
    let qp = interior_qp();
    let mut x = DVector::zeros(4);
    let mut y = DVector::zeros(2);
    let mut z = DVector::zeros(4);
    let err = ipf(
        &qp.q,
        &qp.a,
        &DVector::from_column_slice(&[2.0, 4.0, 6.0]),
        &DVector::from_column_slice(&qp.c),
        &mut x,
        &mut y,
        &mut z,
        &ctrl(KktSystem::Full),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SolverError::DimensionMismatch {
            what: "b height",
            expected: 2,
            actual: 3
        }
    ));
}
