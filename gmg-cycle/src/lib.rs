//! Geometric multigrid over distributed patch hierarchies
//!
//! This crate turns a list of patch [`domain::Domain`]s, finest first, into a multigrid
//! cycle that can be used as a solver or as a Krylov preconditioner.
//!
//! # Features
//!
//! - **Inter-level communication**: [`InterLevelComm`] pairs every fine patch with its
//!   parent, even when the parent lives on another rank
//! - **Transfers**: averaging [`LinearRestrictor`], [`DirectInterpolator`] and
//!   [`LinearInterpolator`]
//! - **Smoothing**: per-patch Gauss-Seidel and Jacobi relaxation behind [`PatchSmoother`]
//! - **Cycles**: V, W and FMG traversals assembled with [`CycleBuilder`]
//! - **Poisson**: a cell-centered star stencil and its [`PoissonFactory`]
//!
//! # Example
//!
//! ```ignore
//! use gmg::{solve_multigrid, CycleBuilder, CycleOpts, MultigridConfig, PoissonFactory};
//!
//! let domains = grid.domains(comm)?;
//! let cycle = CycleBuilder::from_domains(CycleOpts::default(), &domains, &PoissonFactory::default())?;
//! let result = solve_multigrid(&cycle, &f, &mut u, &MultigridConfig::default())?;
//! ```

pub mod builder;
pub mod coarse;
pub mod config;
pub mod cycle;
pub mod interlevel;
pub mod interpolator;
pub mod level;
pub mod poisson;
pub mod restrictor;
pub mod smoother;

pub use builder::{usable_levels, CycleBuilder, LevelFactory, LevelParts};
pub use coarse::{
    CoarseSolver, CoarseSolverType, DenseCoarseSolver, KrylovCoarseSolver, SmootherCoarseSolver,
};
pub use config::{ConfigError, OuterSolver, ProblemConfig, RunConfig};
pub use cycle::{
    solve_multigrid, Cycle, CycleOpts, CycleStage, CycleType, MultigridConfig, MultigridResult,
};
pub use interlevel::{InterLevelComm, PendingTransfer};
pub use interpolator::{
    make_interpolator, DirectInterpolator, Interpolator, InterpolatorType, LinearInterpolator,
};
pub use level::Level;
pub use poisson::{
    add_dirichlet_bc_to_rhs, add_neumann_bc_to_rhs, BoundaryCondition, PoissonFactory,
    StarPatchOperator, StarRelaxation,
};
pub use restrictor::{LinearRestrictor, RestrictionMode, Restrictor};
pub use smoother::{
    compute_residual, residual_norm, PatchSmoother, PatchSolver, Smoother, SmootherConfig,
    SmootherType,
};

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
