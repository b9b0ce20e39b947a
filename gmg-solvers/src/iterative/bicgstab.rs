//! BiCGStab (Bi-Conjugate Gradient Stabilized) solver
//!
//! BiCGStab is a Krylov subspace method for non-symmetric systems. The preconditioner
//! is applied from the right, so the reported residual is that of the original system.

use super::{finish, log_progress, KrylovConfig, KrylovSolution};
use domain::{Error, IdentityOperator, LinearOperator, Result, Vector};

/// Solve Ax = b using the BiCGStab method
pub fn bicgstab<const D: usize, A>(
    operator: &A,
    b: &Vector<D>,
    x: &mut Vector<D>,
    config: &KrylovConfig,
) -> Result<KrylovSolution>
where
    A: LinearOperator<D> + ?Sized,
{
    bicgstab_preconditioned(operator, &IdentityOperator, b, x, config)
}

/// Solve Ax = b using right-preconditioned BiCGStab
///
/// Fails with a solver breakdown when `rho` or `(r̂, v)` vanishes.
pub fn bicgstab_preconditioned<const D: usize, A, M>(
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
    let rhat = r.clone();

    let mut rho = 1.0;
    let mut alpha = 1.0;
    let mut omega = 1.0;
    let mut p = b.zeros_like();
    let mut v = b.zeros_like();
    let mut ph = b.zeros_like();
    let mut sh = b.zeros_like();
    let mut t = b.zeros_like();

    let mut residual = r.two_norm()? / b_norm;
    let mut iterations = 0;
    while residual > config.tolerance && iterations < config.max_iterations {
        let rho_new = rhat.dot(&r)?;
        if rho_new == 0.0 {
            return Err(Error::breakdown(
                "BiCGStab",
                format!("rho was 0 on iteration {iterations}"),
            ));
        }
        let beta = (rho_new / rho) * (alpha / omega);
        rho = rho_new;

        // p = r + beta * (p - omega * v)
        p.add_scaled(-omega, &v)?;
        p.scale_then_add(beta, &r)?;

        precond.apply(&p, &mut ph)?;
        operator.apply(&ph, &mut v)?;

        let rhat_v = rhat.dot(&v)?;
        if rhat_v == 0.0 {
            return Err(Error::breakdown(
                "BiCGStab",
                format!("(r0, v) was 0 on iteration {iterations}"),
            ));
        }
        alpha = rho / rhat_v;

        // s = r - alpha * v, kept in r
        r.add_scaled(-alpha, &v)?;
        iterations += 1;

        let s_norm = r.two_norm()?;
        if s_norm / b_norm <= config.tolerance {
            x.add_scaled(alpha, &ph)?;
            residual = s_norm / b_norm;
            log_progress("BiCGStab", config, iterations, residual);
            break;
        }

        precond.apply(&r, &mut sh)?;
        operator.apply(&sh, &mut t)?;

        let tt = t.dot(&t)?;
        if tt == 0.0 {
            return Err(Error::breakdown(
                "BiCGStab",
                format!("(t, t) was 0 on iteration {iterations}"),
            ));
        }
        omega = t.dot(&r)? / tt;

        x.add_scaled2(alpha, &ph, omega, &sh)?;
        // r = s - omega * t
        r.add_scaled(-omega, &t)?;

        residual = r.two_norm()? / b_norm;
        log_progress("BiCGStab", config, iterations, residual);

        if omega == 0.0 && residual > config.tolerance {
            return Err(Error::breakdown(
                "BiCGStab",
                format!("omega was 0 on iteration {iterations}"),
            ));
        }
    }

    Ok(finish(
        "BiCGStab",
        config,
        KrylovSolution {
            iterations,
            residual,
            converged: residual <= config.tolerance,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterative::test_support::{residual_norm, vector, Tridiagonal};
    use approx::assert_relative_eq;

    #[test]
    fn test_bicgstab_nonsymmetric() {
        let op = Tridiagonal {
            diag: 4.0,
            lower: -1.5,
            upper: -0.5,
        };
        let mut b = vector(12);
        b.set(1.0);
        let mut x = b.zeros_like();
        let config = KrylovConfig {
            max_iterations: 100,
            tolerance: 1e-10,
            print_interval: 1,
        };

        let solution = bicgstab(&op, &b, &mut x, &config).unwrap();
        assert!(solution.converged);
        assert!(residual_norm(&op, &b, &x) < 1e-8);
    }

    #[test]
    fn test_bicgstab_with_initial_guess() {
        let op = Tridiagonal {
            diag: 3.0,
            lower: -1.0,
            upper: -1.0,
        };
        let mut b = vector(8);
        b.set(1.0);
        let mut x = b.zeros_like();
        bicgstab(&op, &b, &mut x, &KrylovConfig::default()).unwrap();

        // restarting from the solution takes no iterations
        let again = bicgstab(&op, &b, &mut x.clone(), &KrylovConfig {
            tolerance: 1e-8,
            ..KrylovConfig::default()
        })
        .unwrap();
        assert_eq!(again.iterations, 0);
        assert_relative_eq!(again.residual, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_bicgstab_iteration_limit() {
        let op = Tridiagonal {
            diag: 2.0,
            lower: -1.0,
            upper: -1.0,
        };
        let mut b = vector(64);
        b.set(1.0);
        let mut x = b.zeros_like();
        let config = KrylovConfig {
            max_iterations: 2,
            tolerance: 1e-14,
            print_interval: 0,
        };
        let solution = bicgstab(&op, &b, &mut x, &config).unwrap();
        assert!(!solution.converged);
        assert_eq!(solution.iterations, 2);
    }

    #[test]
    fn test_bicgstab_zero_operator_breaks_down() {
        let op = Tridiagonal {
            diag: 0.0,
            lower: 0.0,
            upper: 0.0,
        };
        let mut b = vector(3);
        b.set(1.0);
        let mut x = b.zeros_like();
        let err = bicgstab(&op, &b, &mut x, &KrylovConfig::default()).unwrap_err();
        assert!(err.is_breakdown_error());
        assert!(err.to_string().contains("BiCGStab broke down"));
    }
}
