//! Solvers for the coarsest level of a cycle

use crate::smoother::Smoother;
use domain::{Error, LinearOperator, Result, Vector};
use serde::{Deserialize, Serialize};
use solvers::{bicgstab, cg, DenseSolver, KrylovConfig, KrylovMethod};
use std::sync::Arc;

/// Solves (or approximately solves) `A u = f` on the coarsest level
pub trait CoarseSolver<const D: usize>: Send + Sync {
    /// Improve `u`, which holds the initial guess (collective)
    fn solve(&self, f: &Vector<D>, u: &mut Vector<D>) -> Result<()>;
}

/// Coarse solver selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoarseSolverType {
    /// Repeated smoothing
    #[default]
    Smoother,
    /// Conjugate Gradient to the Krylov tolerance
    Cg,
    /// BiCGStab to the Krylov tolerance
    BiCgStab,
    /// LU factorization of the assembled operator
    Dense,
}

/// A fixed number of smoother applications
pub struct SmootherCoarseSolver<const D: usize> {
    smoother: Arc<dyn Smoother<D>>,
    sweeps: usize,
}

impl<const D: usize> SmootherCoarseSolver<D> {
    pub fn new(smoother: Arc<dyn Smoother<D>>, sweeps: usize) -> Self {
        Self { smoother, sweeps }
    }
}

impl<const D: usize> CoarseSolver<D> for SmootherCoarseSolver<D> {
    fn solve(&self, f: &Vector<D>, u: &mut Vector<D>) -> Result<()> {
        for _ in 0..self.sweeps {
            self.smoother.smooth(f, u)?;
        }
        Ok(())
    }
}

/// Krylov iteration on the coarse operator
pub struct KrylovCoarseSolver<const D: usize> {
    operator: Arc<dyn LinearOperator<D>>,
    method: KrylovMethod,
    config: KrylovConfig,
}

impl<const D: usize> KrylovCoarseSolver<D> {
    pub fn new(operator: Arc<dyn LinearOperator<D>>, method: KrylovMethod, config: KrylovConfig) -> Self {
        Self {
            operator,
            method,
            config,
        }
    }
}

impl<const D: usize> CoarseSolver<D> for KrylovCoarseSolver<D> {
    fn solve(&self, f: &Vector<D>, u: &mut Vector<D>) -> Result<()> {
        let solution = match self.method {
            KrylovMethod::Cg => cg(self.operator.as_ref(), f, u, &self.config)?,
            KrylovMethod::BiCgStab => bicgstab(self.operator.as_ref(), f, u, &self.config)?,
        };
        log::trace!(
            "coarse {} solve: {} iterations, relative residual {:.3e}",
            self.method.name(),
            solution.iterations,
            solution.residual
        );
        if !solution.converged && solution.residual >= 1.0 {
            return Err(Error::breakdown(
                format!("coarse {}", self.method.name()),
                format!(
                    "no reduction after {} iterations, relative residual {:.3e}",
                    solution.iterations, solution.residual
                ),
            ));
        }
        Ok(())
    }
}

/// Direct solve of a coarsest level held by one rank
#[derive(Debug, Clone)]
pub struct DenseCoarseSolver {
    dense: DenseSolver,
}

impl DenseCoarseSolver {
    /// Assemble and factor `operator` over the patches of `template` (collective)
    pub fn new<const D: usize, A>(operator: &A, template: &Vector<D>) -> Result<Self>
    where
        A: LinearOperator<D> + ?Sized,
    {
        Ok(Self {
            dense: DenseSolver::new(operator, template)?,
        })
    }
}

impl<const D: usize> CoarseSolver<D> for DenseCoarseSolver {
    fn solve(&self, f: &Vector<D>, u: &mut Vector<D>) -> Result<()> {
        self.dense.solve(f, u)
    }
}
