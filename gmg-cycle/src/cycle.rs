//! Multigrid cycle implementations
//!
//! Provides V-cycle, W-cycle, and FMG-cycle traversals of a level hierarchy. A
//! [`Cycle`] is a [`LinearOperator`]: applying it to a right-hand side `f` runs one cycle
//! from a zero initial guess, so it can precondition a Krylov solver directly.

use crate::level::Level;
use crate::smoother::compute_residual;
use domain::{Error, LinearOperator, Result, Vector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Multigrid cycle type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CycleType {
    /// V-cycle: descend to coarsest, ascend
    #[default]
    V,
    /// W-cycle: two coarse-grid corrections per level, recursively
    W,
    /// FMG-cycle: a W pattern whose second coarse correction is a V-cycle
    Fmg,
}

impl FromStr for CycleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "V" | "v" => Ok(CycleType::V),
            "W" | "w" => Ok(CycleType::W),
            "F" | "FMG" | "f" | "fmg" => Ok(CycleType::Fmg),
            other => Err(Error::config(format!("Unsupported Cycle type: {other}"))),
        }
    }
}

impl TryFrom<String> for CycleType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<CycleType> for String {
    fn from(kind: CycleType) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for CycleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CycleType::V => "V",
            CycleType::W => "W",
            CycleType::Fmg => "FMG",
        })
    }
}

/// Cycle options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleOpts {
    /// Type of cycle
    pub cycle_type: CycleType,
    /// Maximum number of levels (0 = no limit)
    pub max_levels: usize,
    /// Stop coarsening once a level has fewer patches per rank than this (0 = no limit)
    pub patches_per_proc: f64,
    /// Smoother applications before restricting
    pub pre_sweeps: usize,
    /// Smoother applications after interpolating
    pub post_sweeps: usize,
    /// Smoother applications between the two coarse corrections of W and FMG cycles
    pub mid_sweeps: usize,
    /// Smoother applications on the coarsest level when it has no coarse solver
    pub coarse_sweeps: usize,
}

impl Default for CycleOpts {
    fn default() -> Self {
        Self {
            cycle_type: CycleType::V,
            max_levels: 0,
            patches_per_proc: 0.0,
            pre_sweeps: 1,
            post_sweeps: 1,
            mid_sweeps: 1,
            coarse_sweeps: 1,
        }
    }
}

/// Step of a cycle, used in trace output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    PreSmooth,
    Residual,
    Restrict,
    CoarseSolve,
    Interpolate,
    MidSmooth,
    PostSmooth,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CycleStage::PreSmooth => "pre-smooth",
            CycleStage::Residual => "residual",
            CycleStage::Restrict => "restrict",
            CycleStage::CoarseSolve => "coarse solve",
            CycleStage::Interpolate => "interpolate",
            CycleStage::MidSmooth => "mid-smooth",
            CycleStage::PostSmooth => "post-smooth",
        })
    }
}

/// A multigrid cycle over a hierarchy of at least two levels
#[derive(Debug)]
pub struct Cycle<const D: usize> {
    opts: CycleOpts,
    levels: Vec<Level<D>>,
}

impl<const D: usize> Cycle<D> {
    pub(crate) fn new(opts: CycleOpts, levels: Vec<Level<D>>) -> Self {
        Self { opts, levels }
    }

    pub fn cycle_type(&self) -> CycleType {
        self.opts.cycle_type
    }

    pub fn opts(&self) -> &CycleOpts {
        &self.opts
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Level `index`, 0 being the finest
    pub fn level(&self, index: usize) -> Option<&Level<D>> {
        self.levels.get(index)
    }

    /// Operator of the finest level
    pub fn operator(&self) -> &dyn LinearOperator<D> {
        self.levels[0].operator.as_ref()
    }

    fn smooth(
        &self,
        level: &Level<D>,
        stage: CycleStage,
        sweeps: usize,
        f: &Vector<D>,
        u: &mut Vector<D>,
    ) -> Result<()> {
        for _ in 0..sweeps {
            log::trace!("level {}: {stage}", level.index);
            level.smoother.smooth(f, u)?;
        }
        Ok(())
    }

    /// Restrict the residual `f - A u` to the next coarser level
    fn restrict(&self, level: &Level<D>, f: &Vector<D>, u: &Vector<D>) -> Result<Vector<D>> {
        log::trace!("level {}: {}", level.index, CycleStage::Residual);
        let r = compute_residual(level.operator.as_ref(), f, u)?;
        log::trace!("level {}: {}", level.index, CycleStage::Restrict);
        level.restrictor()?.restrict(&r)
    }

    fn interpolate(&self, coarser: &Level<D>, coarse_u: &Vector<D>, u: &mut Vector<D>) -> Result<()> {
        log::trace!("level {}: {}", coarser.index, CycleStage::Interpolate);
        coarser.interpolator()?.interpolate(coarse_u, u)
    }

    fn visit(&self, index: usize, kind: CycleType, f: &Vector<D>, u: &mut Vector<D>) -> Result<()> {
        let level = &self.levels[index];
        if level.is_coarsest() {
            log::trace!("level {index}: {}", CycleStage::CoarseSolve);
            return level
                .coarse_solve(f, u, self.opts.coarse_sweeps)
                .map_err(|e| e.at_level(index));
        }
        let coarser = &self.levels[index + 1];

        self.smooth(level, CycleStage::PreSmooth, self.opts.pre_sweeps, f, u)
            .map_err(|e| e.at_level(index))?;
        let coarse_f = self.restrict(level, f, u).map_err(|e| e.at_level(index))?;
        let mut coarse_u = coarse_f.zeros_like();
        self.visit(index + 1, kind, &coarse_f, &mut coarse_u)?;
        self.interpolate(coarser, &coarse_u, u)
            .map_err(|e| e.at_level(index + 1))?;

        if kind != CycleType::V {
            self.smooth(level, CycleStage::MidSmooth, self.opts.mid_sweeps, f, u)
                .map_err(|e| e.at_level(index))?;
            let coarse_f = self.restrict(level, f, u).map_err(|e| e.at_level(index))?;
            coarse_u.set_with_ghost(0.0);
            let second = match kind {
                CycleType::W => CycleType::W,
                _ => CycleType::V,
            };
            self.visit(index + 1, second, &coarse_f, &mut coarse_u)?;
            self.interpolate(coarser, &coarse_u, u)
                .map_err(|e| e.at_level(index + 1))?;
        }

        self.smooth(level, CycleStage::PostSmooth, self.opts.post_sweeps, f, u)
            .map_err(|e| e.at_level(index))
    }
}

impl<const D: usize> LinearOperator<D> for Cycle<D> {
    /// Run one cycle on `f` from a zero initial guess, leaving the result in `u`
    fn apply(&self, f: &Vector<D>, u: &mut Vector<D>) -> Result<()> {
        f.check_compatible(u)?;
        u.set_with_ghost(0.0);
        self.visit(0, self.opts.cycle_type, f, u)
    }
}

/// Multigrid solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultigridConfig {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Relative tolerance for convergence
    pub tolerance: f64,
    /// Number of cycles per iteration
    pub cycles_per_iteration: usize,
}

impl Default for MultigridConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-8,
            cycles_per_iteration: 1,
        }
    }
}

/// Multigrid solver result; the solution is left in `x`
#[derive(Debug, Clone)]
pub struct MultigridResult {
    /// Number of iterations performed
    pub iterations: usize,
    /// Final residual norm relative to `||b||`
    pub residual_norm: f64,
    /// Relative residual before the first iteration and after each one
    pub residual_history: Vec<f64>,
    /// Convergence achieved
    pub converged: bool,
}

/// Solve `A x = b` by repeated cycles, `x ← x + M (b - A x)`
///
/// `A` is the finest-level operator of `cycle`; `x` holds the initial guess.
pub fn solve_multigrid<const D: usize>(
    cycle: &Cycle<D>,
    b: &Vector<D>,
    x: &mut Vector<D>,
    config: &MultigridConfig,
) -> Result<MultigridResult> {
    b.check_compatible(x)?;
    let operator = cycle.operator();
    let b_norm = b.two_norm()?.max(1e-300);

    let mut correction = b.zeros_like();
    let mut residual = compute_residual(operator, b, x)?;
    let mut res_norm = residual.two_norm()? / b_norm;
    let mut residual_history = vec![res_norm];
    let mut iterations = 0;

    while iterations < config.max_iterations && res_norm > config.tolerance {
        for _ in 0..config.cycles_per_iteration {
            cycle.apply(&residual, &mut correction)?;
            x.add_scaled(1.0, &correction)?;
            residual = compute_residual(operator, b, x)?;
        }
        res_norm = residual.two_norm()? / b_norm;
        iterations += 1;
        residual_history.push(res_norm);
        log::debug!("{} cycle {iterations}: relative residual {res_norm:.6e}", cycle.cycle_type());
    }

    let converged = res_norm <= config.tolerance;
    if converged {
        log::info!("multigrid converged in {iterations} iterations, relative residual {res_norm:.3e}");
    } else {
        log::warn!("multigrid stopped after {iterations} iterations, relative residual {res_norm:.3e}");
    }
    Ok(MultigridResult {
        iterations,
        residual_norm: res_norm,
        residual_history,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_type_parsing() {
        assert_eq!("V".parse::<CycleType>().unwrap(), CycleType::V);
        assert_eq!("W".parse::<CycleType>().unwrap(), CycleType::W);
        assert_eq!("FMG".parse::<CycleType>().unwrap(), CycleType::Fmg);
        assert_eq!("F".parse::<CycleType>().unwrap(), CycleType::Fmg);

        let err = "X".parse::<CycleType>().unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("Unsupported Cycle type: X"));
    }

    #[test]
    fn test_cycle_opts_serde() {
        let opts: CycleOpts = serde_json::from_str(r#"{"cycle_type": "W", "pre_sweeps": 2}"#).unwrap();
        assert_eq!(opts.cycle_type, CycleType::W);
        assert_eq!(opts.pre_sweeps, 2);
        assert_eq!(opts.post_sweeps, 1);
        assert_eq!(opts.max_levels, 0);

        let json = serde_json::to_string(&CycleOpts::default()).unwrap();
        assert!(json.contains(r#""cycle_type":"V""#));
        assert!(serde_json::from_str::<CycleOpts>(r#"{"cycle_type": "K"}"#).is_err());
    }

    #[test]
    fn test_multigrid_config() {
        let config = MultigridConfig {
            max_iterations: 100,
            tolerance: 1e-10,
            ..Default::default()
        };
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.cycles_per_iteration, 1);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(CycleStage::PreSmooth.to_string(), "pre-smooth");
        assert_eq!(CycleStage::CoarseSolve.to_string(), "coarse solve");
    }
}
