//! LDLᵀ factorization wrapper.
//!
//! Sparse `LDLᵀ` of quasi-definite matrices through the `ldl` crate. `L` is
//! unit lower triangular and `D` is diagonal with entries of either sign, so
//! symmetric indefinite systems such as KKT matrices factor without pivoting
//! once they are suitably regularized.
//!
//! The symbolic analysis (elimination tree and column counts) depends only on
//! the sparsity pattern and is computed once per [`LdlSolver`]; each numeric
//! factorization may add a per-entry shift to the diagonal.

use super::sparse::SparseCsc;
use thiserror::Error;

/// LDL backend errors.
#[derive(Error, Debug)]
pub enum LdlError {
    /// A zero pivot was met (matrix not quasi-definite)
    #[error("Factorization failed: matrix not quasi-definite")]
    FactorizationFailed,

    /// The elimination tree could not be built
    #[error("Symbolic analysis failed: {0}")]
    SymbolicFailed(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// The pattern has no stored entry for a diagonal position
    #[error("No stored diagonal entry in column {0}")]
    MissingDiagonal(usize),

    /// The matrix does not have the analysed sparsity pattern
    #[error("Sparsity pattern differs from the analysed one")]
    PatternMismatch,

    /// Solve requested before any numeric factorization
    #[error("No numeric factorization available")]
    NotFactored,
}

/// Numeric factor storage: `L` in CSC form plus `D` and `D⁻¹`.
struct LdlFactorData {
    l_p: Vec<usize>,
    l_i: Vec<usize>,
    l_x: Vec<f64>,
    d: Vec<f64>,
    d_inv: Vec<f64>,
}

/// Sparse LDLᵀ solver bound to one sparsity pattern.
pub struct LdlSolver {
    n: usize,

    /// Analysed pattern (CSC column pointers and row indices)
    a_p: Vec<usize>,
    a_i: Vec<usize>,

    /// Elimination tree
    etree: Vec<Option<usize>>,

    /// L nonzero count per column
    l_nz: Vec<usize>,

    /// Position of each diagonal entry in the CSC data
    diag_positions: Vec<Option<usize>>,

    factorization: Option<LdlFactorData>,

    a_x_work: Vec<f64>,
    bwork: Vec<ldl::Marker>,
    iwork: Vec<usize>,
    fwork: Vec<f64>,
}

impl LdlSolver {
    /// Symbolic analysis of the upper triangle stored in `mat`.
    pub fn new(mat: &SparseCsc) -> Result<Self, LdlError> {
        let n = mat.cols();
        if mat.rows() != n {
            return Err(LdlError::DimensionMismatch {
                expected: n,
                actual: mat.rows(),
            });
        }
        let mat = ensure_csc(mat);
        let indptr = mat.indptr();
        let a_p = indptr.raw_storage();
        let a_i = mat.indices();

        let mut work = vec![0; n];
        let mut l_nz = vec![0; n];
        let mut etree = vec![None; n];
        ldl::etree(n, a_p, a_i, &mut work, &mut l_nz, &mut etree)
            .map_err(|e| LdlError::SymbolicFailed(format!("{:?}", e)))?;

        let mut diag_positions = vec![None; n];
        for (col, pos) in diag_positions.iter_mut().enumerate() {
            *pos = (a_p[col]..a_p[col + 1]).find(|&idx| a_i[idx] == col);
        }

        Ok(Self {
            n,
            a_p: a_p.to_vec(),
            a_i: a_i.to_vec(),
            etree,
            l_nz,
            diag_positions,
            factorization: None,
            a_x_work: Vec::new(),
            bwork: vec![ldl::Marker::Unused; n],
            iwork: vec![0; 3 * n],
            fwork: vec![0.0; n],
        })
    }

    /// Dimension of the factored matrix.
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Whether `mat` has the pattern this solver was analysed with.
    pub fn matches_pattern(&self, mat: &SparseCsc) -> bool {
        if mat.rows() != self.n || mat.cols() != self.n {
            return false;
        }
        let mat = ensure_csc(mat);
        let indptr = mat.indptr();
        indptr.raw_storage() == self.a_p.as_slice() && mat.indices() == self.a_i.as_slice()
    }

    /// Numeric factorization of `mat + diag(shift)`.
    ///
    /// `mat` must have the pattern given to [`LdlSolver::new`]. An empty
    /// `shift` means no shift.
    pub fn factor(&mut self, mat: &SparseCsc, shift: &[f64]) -> Result<(), LdlError> {
        if !self.matches_pattern(mat) {
            return Err(LdlError::PatternMismatch);
        }
        if !shift.is_empty() && shift.len() != self.n {
            return Err(LdlError::DimensionMismatch {
                expected: self.n,
                actual: shift.len(),
            });
        }
        let mat = ensure_csc(mat);
        let a_p = &self.a_p;
        let a_i = &self.a_i;

        self.a_x_work.clear();
        self.a_x_work.extend_from_slice(mat.data());
        for (col, &s) in shift.iter().enumerate() {
            if s == 0.0 {
                continue;
            }
            let idx = self.diag_positions[col].ok_or(LdlError::MissingDiagonal(col))?;
            self.a_x_work[idx] += s;
        }

        let nnz_l: usize = self.l_nz.iter().sum();
        let n = self.n;
        let f = self.factorization.get_or_insert_with(|| LdlFactorData {
            l_p: vec![0; n + 1],
            l_i: vec![0; nnz_l],
            l_x: vec![0.0; nnz_l],
            d: vec![0.0; n],
            d_inv: vec![0.0; n],
        });

        // ldl expects clean markers
        self.bwork.fill(ldl::Marker::Unused);
        self.iwork.fill(0);
        self.fwork.fill(0.0);

        let result = ldl::factor(
            n,
            a_p,
            a_i,
            &self.a_x_work,
            &mut f.l_p,
            &mut f.l_i,
            &mut f.l_x,
            &mut f.d,
            &mut f.d_inv,
            &self.l_nz,
            &self.etree,
            &mut self.bwork,
            &mut self.iwork,
            &mut self.fwork,
        );
        match result {
            Ok(_) => Ok(()),
            Err(_) => {
                self.factorization = None;
                Err(LdlError::FactorizationFailed)
            }
        }
    }

    /// Pivots `D` of the most recent factorization.
    pub fn pivots(&self) -> Option<&[f64]> {
        self.factorization.as_ref().map(|f| f.d.as_slice())
    }

    /// Overwrite `x` with the solution of `L D Lᵀ x = x`.
    pub fn solve(&self, x: &mut [f64]) -> Result<(), LdlError> {
        if x.len() != self.n {
            return Err(LdlError::DimensionMismatch {
                expected: self.n,
                actual: x.len(),
            });
        }
        let f = self.factorization.as_ref().ok_or(LdlError::NotFactored)?;
        ldl::solve(self.n, &f.l_p, &f.l_i, &f.l_x, &f.d_inv, x);
        Ok(())
    }
}

fn ensure_csc(mat: &SparseCsc) -> std::borrow::Cow<'_, SparseCsc> {
    if mat.is_csc() {
        std::borrow::Cow::Borrowed(mat)
    } else {
        std::borrow::Cow::Owned(mat.to_csc())
    }
}
