//! LU decomposition solver
//!
//! LU factorization with partial pivoting for dense systems. Coarse multigrid levels
//! are small enough to factor once and reuse the factors for every cycle.

use ndarray::{Array1, Array2};
use thiserror::Error;

/// Errors that can occur during LU factorization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LuError {
    /// A pivot vanished
    #[error("matrix is singular or nearly singular (pivot {pivot:e} in column {column})")]
    SingularMatrix {
        /// Column where elimination failed
        column: usize,
        /// Largest available pivot
        pivot: f64,
    },
    /// Matrix or right-hand side has the wrong size
    #[error("matrix dimensions mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected size
        expected: usize,
        /// Actual size
        got: usize,
    },
}

const PIVOT_TOLERANCE: f64 = 1e-30;

/// LU factorization result
///
/// Stores L and U factors along with pivot information
#[derive(Debug, Clone)]
pub struct LuFactorization {
    /// Combined L and U matrices (L is unit lower triangular, stored below diagonal)
    pub lu: Array2<f64>,
    /// Row permutation: row `i` of the factors is row `perm[i]` of the matrix
    pub perm: Vec<usize>,
    /// Matrix dimension
    pub n: usize,
}

impl LuFactorization {
    /// Solve Ax = b using the pre-computed LU factorization
    pub fn solve(&self, b: &Array1<f64>) -> Result<Array1<f64>, LuError> {
        if b.len() != self.n {
            return Err(LuError::DimensionMismatch {
                expected: self.n,
                got: b.len(),
            });
        }

        let mut x = Array1::from_iter(self.perm.iter().map(|&p| b[p]));

        // Forward substitution: Ly = Pb
        for i in 0..self.n {
            for j in 0..i {
                x[i] -= self.lu[[i, j]] * x[j];
            }
        }

        // Backward substitution: Ux = y
        for i in (0..self.n).rev() {
            for j in (i + 1)..self.n {
                x[i] -= self.lu[[i, j]] * x[j];
            }
            x[i] /= self.lu[[i, i]];
        }

        Ok(x)
    }
}

/// Compute LU factorization with partial pivoting
pub fn lu_factorize(a: &Array2<f64>) -> Result<LuFactorization, LuError> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(LuError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }

    let mut lu = a.clone();
    let mut perm: Vec<usize> = (0..n).collect();

    for k in 0..n {
        // Find pivot
        let mut max_val = lu[[k, k]].abs();
        let mut max_row = k;
        for i in (k + 1)..n {
            let val = lu[[i, k]].abs();
            if val > max_val {
                max_val = val;
                max_row = i;
            }
        }

        if max_val < PIVOT_TOLERANCE {
            return Err(LuError::SingularMatrix {
                column: k,
                pivot: max_val,
            });
        }

        if max_row != k {
            for j in 0..n {
                lu.swap([k, j], [max_row, j]);
            }
            perm.swap(k, max_row);
        }

        // Compute multipliers and eliminate
        let pivot = lu[[k, k]];
        for i in (k + 1)..n {
            let mult = lu[[i, k]] / pivot;
            lu[[i, k]] = mult;
            for j in (k + 1)..n {
                let update = mult * lu[[k, j]];
                lu[[i, j]] -= update;
            }
        }
    }

    Ok(LuFactorization { lu, perm, n })
}

/// Solve Ax = b using LU decomposition
///
/// This is a convenience function that combines factorization and solve.
pub fn lu_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, LuError> {
    lu_factorize(a)?.solve(b)
}
