//! Direct solvers for linear systems
//!
//! - [`lu_solve`]: LU decomposition with partial pivoting
//! - [`DenseSolver`]: sample a small distributed operator into a dense matrix and factor it

mod dense;
mod lu;

pub use dense::{assemble_dense, DenseSolver};
pub use lu::{lu_factorize, lu_solve, LuError, LuFactorization};
