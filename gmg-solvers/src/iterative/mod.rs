//! Krylov solvers over distributed patch vectors
//!
//! - [`cg`]: Conjugate Gradient, for symmetric positive definite operators
//! - [`bicgstab`]: BiCGStab, for general operators
//!
//! Both take the initial guess in `x`, accept an optional preconditioner (a multigrid
//! cycle, typically), and measure convergence relative to `||b||`. Every reduction is
//! collective, so all ranks must call a solver together.

mod bicgstab;
mod cg;

pub use bicgstab::{bicgstab, bicgstab_preconditioned};
pub use cg::{cg, cg_preconditioned};

use serde::{Deserialize, Serialize};

/// Krylov solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KrylovConfig {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Relative tolerance for convergence
    pub tolerance: f64,
    /// Print progress every N iterations (0 = no output)
    pub print_interval: usize,
}

impl Default for KrylovConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-12,
            print_interval: 0,
        }
    }
}

/// Krylov solver result; the solution itself is left in `x`
#[derive(Debug, Clone, PartialEq)]
pub struct KrylovSolution {
    /// Number of iterations
    pub iterations: usize,
    /// Final residual relative to `||b||`
    pub residual: f64,
    /// Whether convergence was achieved
    pub converged: bool,
}

/// Which Krylov method to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KrylovMethod {
    /// Conjugate Gradient
    #[default]
    Cg,
    /// BiCGStab
    BiCgStab,
}

impl KrylovMethod {
    /// Name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            KrylovMethod::Cg => "CG",
            KrylovMethod::BiCgStab => "BiCGStab",
        }
    }
}

fn log_progress(solver: &str, config: &KrylovConfig, iteration: usize, residual: f64) {
    if config.print_interval > 0 && iteration % config.print_interval == 0 {
        log::info!("{solver} iteration {iteration}: relative residual = {residual:.6e}");
    }
}

fn finish(solver: &str, config: &KrylovConfig, solution: KrylovSolution) -> KrylovSolution {
    if solution.converged {
        log::debug!(
            "{solver} converged in {} iterations, relative residual {:.3e}",
            solution.iterations,
            solution.residual
        );
    } else {
        log::warn!(
            "{solver} did not converge in {} iterations (relative residual {:.3e}, tolerance {:.1e})",
            solution.iterations,
            solution.residual,
            config.tolerance
        );
    }
    solution
}

#[cfg(test)]
pub(crate) mod test_support {
    use domain::{LinearOperator, PatchLayout, Result, ThreadComm, Vector};
    use std::sync::Arc;

    /// Tridiagonal operator on a single 1D patch
    pub struct Tridiagonal {
        pub diag: f64,
        pub lower: f64,
        pub upper: f64,
    }

    impl LinearOperator<1> for Tridiagonal {
        fn apply(&self, x: &Vector<1>, y: &mut Vector<1>) -> Result<()> {
            let n = x.layout().ns[0] as i32;
            let xv = x.patch_view(0);
            let mut yv = y.patch_view_mut(0);
            for i in 0..n {
                let mut value = self.diag * xv.get([i]);
                if i > 0 {
                    value += self.lower * xv.get([i - 1]);
                }
                if i + 1 < n {
                    value += self.upper * xv.get([i + 1]);
                }
                yv.set([i], value);
            }
            Ok(())
        }
    }

    pub fn vector(n: usize) -> Vector<1> {
        Vector::with_layout(Arc::new(ThreadComm::single()), PatchLayout::new([n], 1), 1)
    }

    pub fn residual_norm(op: &dyn LinearOperator<1>, b: &Vector<1>, x: &Vector<1>) -> f64 {
        let mut ax = b.zeros_like();
        op.apply(x, &mut ax).unwrap();
        ax.add_scaled(-1.0, b).unwrap();
        ax.two_norm().unwrap()
    }
}
