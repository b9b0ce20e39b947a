//! JSON configuration for Poisson multigrid runs

use crate::coarse::CoarseSolverType;
use crate::cycle::{CycleOpts, MultigridConfig};
use crate::interpolator::InterpolatorType;
use crate::poisson::{BoundaryCondition, PoissonFactory};
use crate::smoother::SmootherConfig;
use serde::{Deserialize, Serialize};
use solvers::KrylovConfig;
use std::fs;
use std::path::Path;

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Grid and rank layout
    pub problem: ProblemConfig,
    /// Outer solver
    pub solver: OuterSolver,
    /// Cycle shape and level limits
    pub cycle: CycleOpts,
    /// Stationary multigrid iteration
    pub multigrid: MultigridConfig,
    /// Krylov iteration, used by the outer Krylov solvers and Krylov coarse solves
    pub krylov: KrylovConfig,
    /// Relaxation on every level
    pub smoother: SmootherConfig,
    pub interpolator: InterpolatorType,
    pub coarse_solver: CoarseSolverType,
    pub boundary: BoundaryCondition,
}

/// Uniform grid on the unit square or cube
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemConfig {
    /// Spatial dimension, 2 or 3
    pub dim: usize,
    /// Patches along each axis on the finest level, a power of two
    pub patches_per_axis: usize,
    /// Cells along each axis of a patch
    pub cells_per_patch: usize,
    /// Ghost layer width
    pub num_ghost_cells: usize,
    /// In-process ranks
    pub ranks: usize,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            dim: 2,
            patches_per_axis: 4,
            cells_per_patch: 16,
            num_ghost_cells: 1,
            ranks: 1,
        }
    }
}

/// How the cycle is used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OuterSolver {
    /// Cycles as a stationary iteration
    #[default]
    Multigrid,
    /// Cycle-preconditioned Conjugate Gradient
    Cg,
    /// Cycle-preconditioned BiCGStab
    BiCgStab,
}

impl RunConfig {
    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a JSON configuration
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.problem;
        if !(2..=3).contains(&p.dim) {
            return Err(ConfigError::Invalid(format!("dim must be 2 or 3, got {}", p.dim)));
        }
        if !p.patches_per_axis.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "patches_per_axis must be a power of two, got {}",
                p.patches_per_axis
            )));
        }
        if p.cells_per_patch == 0 {
            return Err(ConfigError::Invalid("cells_per_patch must be positive".into()));
        }
        if p.ranks == 0 {
            return Err(ConfigError::Invalid("ranks must be positive".into()));
        }
        if self.interpolator == InterpolatorType::Linear && p.num_ghost_cells == 0 {
            return Err(ConfigError::Invalid(
                "linear interpolation needs num_ghost_cells >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Level factory for the configured Poisson discretization
    pub fn poisson_factory(&self) -> PoissonFactory {
        PoissonFactory {
            boundary: self.boundary,
            smoother: self.smoother.clone(),
            interpolator: self.interpolator,
            coarse_solver: self.coarse_solver,
            krylov: self.krylov.clone(),
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    /// Well-formed but unusable values
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
