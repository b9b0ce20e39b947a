//! Smoothers for multigrid methods
//!
//! A smoother refreshes the ghost layers, then relaxes every patch independently with
//! its neighbors' values frozen in the ghosts: Jacobi across patches, the chosen
//! relaxation within each patch.

use domain::{Domain, GhostFiller, LinearOperator, PatchInfo, Result, Vector, View, ViewMut};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Smoother type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmootherType {
    /// Gauss-Seidel (sequential)
    #[default]
    GaussSeidel,
    /// Damped Jacobi
    Jacobi,
    /// Symmetric Gauss-Seidel (forward then backward)
    SymmetricGaussSeidel,
}

/// Smoother configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// Type of smoother
    pub smoother_type: SmootherType,
    /// Sweeps per call to [`Smoother::smooth`]
    pub iterations: usize,
    /// Damping factor (for Jacobi)
    pub omega: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            smoother_type: SmootherType::GaussSeidel,
            iterations: 1,
            omega: 2.0 / 3.0, // Optimal for Laplacian
        }
    }
}

/// Approximate solver for `A u = f`, improving `u` in place
pub trait Smoother<const D: usize>: Send + Sync {
    /// Relax `u` towards the solution of `A u = f` (collective)
    fn smooth(&self, f: &Vector<D>, u: &mut Vector<D>) -> Result<()>;
}

/// Relaxation of one patch with its ghost cells held fixed
pub trait PatchSolver<const D: usize>: Send + Sync {
    /// Relax the interior of `u` towards the solution of the patch problem
    fn smooth_patch(&self, pinfo: &PatchInfo<D>, f: &View<'_, D>, u: &mut ViewMut<'_, D>);
}

/// Smoother built from a per-patch solver
pub struct PatchSmoother<const D: usize> {
    domain: Arc<Domain<D>>,
    ghost_filler: Arc<dyn GhostFiller<D>>,
    solver: Arc<dyn PatchSolver<D>>,
    sweeps: usize,
}

impl<const D: usize> PatchSmoother<D> {
    pub fn new(
        domain: Arc<Domain<D>>,
        ghost_filler: Arc<dyn GhostFiller<D>>,
        solver: Arc<dyn PatchSolver<D>>,
        sweeps: usize,
    ) -> Self {
        Self {
            domain,
            ghost_filler,
            solver,
            sweeps,
        }
    }

    pub fn domain(&self) -> &Arc<Domain<D>> {
        &self.domain
    }
}

impl<const D: usize> Smoother<D> for PatchSmoother<D> {
    fn smooth(&self, f: &Vector<D>, u: &mut Vector<D>) -> Result<()> {
        f.check_compatible(u)?;
        let domain = &self.domain;
        let solver = &self.solver;
        for _ in 0..self.sweeps {
            self.ghost_filler.fill_ghost(u)?;
            u.for_each_patch_mut(|i, mut view| {
                solver.smooth_patch(domain.patch_info(i), &f.patch_view(i), &mut view)
            });
        }
        Ok(())
    }
}

/// Compute residual r = f - A*u
pub fn compute_residual<const D: usize, A>(operator: &A, f: &Vector<D>, u: &Vector<D>) -> Result<Vector<D>>
where
    A: LinearOperator<D> + ?Sized,
{
    let mut r = f.zeros_like();
    operator.apply(u, &mut r)?;
    r.scale_then_add(-1.0, f)?;
    Ok(r)
}

/// Compute residual norm (collective)
pub fn residual_norm<const D: usize, A>(operator: &A, f: &Vector<D>, u: &Vector<D>) -> Result<f64>
where
    A: LinearOperator<D> + ?Sized,
{
    compute_residual(operator, f, u)?.two_norm()
}
