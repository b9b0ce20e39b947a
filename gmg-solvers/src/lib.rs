//! Linear solvers over distributed patch vectors
//!
//! This crate provides the solvers a multigrid hierarchy is combined with:
//!
//! # Features
//!
//! - **Iterative Solvers**: CG and BiCGStab over [`domain::Vector`], with optional
//!   preconditioning by any [`domain::LinearOperator`]
//! - **Direct Solvers**: LU decomposition and dense coarse-level solves
//!
//! # Example
//!
//! ```ignore
//! use solvers::{cg_preconditioned, KrylovConfig};
//!
//! // Solve with a multigrid cycle as preconditioner
//! let solution = cg_preconditioned(&operator, &cycle, &f, &mut u, &KrylovConfig::default())?;
//! ```

pub mod direct;
pub mod iterative;

// Re-export iterative solvers
pub use iterative::{
    bicgstab, bicgstab_preconditioned, cg, cg_preconditioned, KrylovConfig, KrylovMethod,
    KrylovSolution,
};

// Re-export direct solvers
pub use direct::{assemble_dense, lu_factorize, lu_solve, DenseSolver, LuError, LuFactorization};
