//! CG (Conjugate Gradient) solver
//!
//! The Conjugate Gradient method for symmetric positive definite systems, optionally
//! preconditioned by a symmetric positive definite operator `M ≈ A^-1`.

use super::{finish, log_progress, KrylovConfig, KrylovSolution};
use domain::{Error, IdentityOperator, LinearOperator, Result, Vector};

/// Solve Ax = b using the Conjugate Gradient method
///
/// Note: This method is only correct for symmetric positive definite operators.
/// For non-symmetric systems, use BiCGStab instead.
pub fn cg<const D: usize, A>(
    operator: &A,
    b: &Vector<D>,
    x: &mut Vector<D>,
    config: &KrylovConfig,
) -> Result<KrylovSolution>
where
    A: LinearOperator<D> + ?Sized,
{
    cg_preconditioned(operator, &IdentityOperator, b, x, config)
}

/// Solve Ax = b using preconditioned Conjugate Gradient
///
/// A vanishing or negative curvature `p'Ap` is reported as a solver breakdown.
pub fn cg_preconditioned<const D: usize, A, M>(
    operator: &A,
    precond: &M,
    b: &Vector<D>,
    x: &mut Vector<D>,
    config: &KrylovConfig,
) -> Result<KrylovSolution>
where
    A: LinearOperator<D> + ?Sized,
    M: LinearOperator<D> + ?Sized,
{
    b.check_compatible(x)?;
    let b_norm = b.two_norm()?;
    if b_norm == 0.0 {
        x.set(0.0);
        return Ok(KrylovSolution {
            iterations: 0,
            residual: 0.0,
            converged: true,
        });
    }

    // r = b - A x
    let mut r = b.zeros_like();
    operator.apply(x, &mut r)?;
    r.scale_then_add(-1.0, b)?;

    let mut residual = r.two_norm()? / b_norm;
    if residual <= config.tolerance {
        return Ok(finish(
            "CG",
            config,
            KrylovSolution {
                iterations: 0,
                residual,
                converged: true,
            },
        ));
    }

    let mut z = b.zeros_like();
    precond.apply(&r, &mut z)?;
    let mut p = z.clone();
    let mut rho = r.dot(&z)?;
    let mut q = b.zeros_like();

    for iter in 0..config.max_iterations {
        // q = A * p
        operator.apply(&p, &mut q)?;

        let pq = p.dot(&q)?;
        if pq <= 0.0 {
            return Err(Error::breakdown(
                "CG",
                format!("p'Ap was {pq:e} on iteration {iter}"),
            ));
        }
        let alpha = rho / pq;

        x.add_scaled(alpha, &p)?;
        r.add_scaled(-alpha, &q)?;

        residual = r.two_norm()? / b_norm;
        log_progress("CG", config, iter + 1, residual);
        if residual <= config.tolerance {
            return Ok(finish(
                "CG",
                config,
                KrylovSolution {
                    iterations: iter + 1,
                    residual,
                    converged: true,
                },
            ));
        }

        precond.apply(&r, &mut z)?;
        let rho_new = r.dot(&z)?;
        if rho == 0.0 {
            return Err(Error::breakdown(
                "CG",
                format!("rho was 0 on iteration {iter}"),
            ));
        }
        let beta = rho_new / rho;
        rho = rho_new;

        // p = z + beta * p
        p.scale_then_add(beta, &z)?;
    }

    Ok(finish(
        "CG",
        config,
        KrylovSolution {
            iterations: config.max_iterations,
            residual,
            converged: false,
        },
    ))
}
