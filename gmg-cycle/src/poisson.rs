//! Cell-centered Poisson problems
//!
//! [`StarPatchOperator`] applies the `2D + 1` point discretization of `-Δu`. Sides on the
//! domain boundary are folded into the stencil, so boundary ghost cells are never read:
//!
//! - Dirichlet: `u_ghost = 2 g - u`, the diagonal grows by `1/h²` and `2 g / h²` moves
//!   to the right-hand side ([`add_dirichlet_bc_to_rhs`]);
//! - Neumann: `u_ghost = u + h ∂u/∂n`, the diagonal shrinks by `1/h²` and `∂u/∂n / h`
//!   moves to the right-hand side ([`add_neumann_bc_to_rhs`]).

use crate::builder::{LevelFactory, LevelParts};
use crate::coarse::{CoarseSolver, CoarseSolverType, DenseCoarseSolver, KrylovCoarseSolver};
use crate::interlevel::InterLevelComm;
use crate::interpolator::{make_interpolator, Interpolator, InterpolatorType};
use crate::smoother::{PatchSmoother, PatchSolver, SmootherConfig, SmootherType};
use domain::{
    Domain, Error, ExchangeGhostFiller, Face, GhostFiller, GhostFillingType, LinearOperator,
    LinearStrategy, PatchInfo, Region, Result, Vector, View, ViewMut,
};
use serde::{Deserialize, Serialize};
use solvers::{KrylovConfig, KrylovMethod};
use std::sync::Arc;

/// Condition imposed on every side of the domain boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryCondition {
    /// Prescribed value on the boundary
    #[default]
    Dirichlet,
    /// Prescribed outward normal derivative
    Neumann,
}

/// Stencil row of one cell: `y = diag u - Σ weight * u_nbr`
#[derive(Debug, Clone, Copy)]
struct Row<const D: usize> {
    diag: f64,
    /// `[lower, upper]` weight per axis; zero where the neighbor was folded in
    weights: [[f64; 2]; D],
}

/// `-Δ` on one level, applied patch by patch
pub struct StarPatchOperator<const D: usize> {
    domain: Arc<Domain<D>>,
    ghost_filler: Arc<dyn GhostFiller<D>>,
    boundary: BoundaryCondition,
}

impl<const D: usize> StarPatchOperator<D> {
    /// Fails when the patches carry no ghost layer
    pub fn new(
        domain: Arc<Domain<D>>,
        ghost_filler: Arc<dyn GhostFiller<D>>,
        boundary: BoundaryCondition,
    ) -> Result<Self> {
        if domain.num_ghost_cells() == 0 {
            return Err(Error::config("the Poisson stencil needs at least one ghost layer"));
        }
        Ok(Self {
            domain,
            ghost_filler,
            boundary,
        })
    }

    pub fn domain(&self) -> &Arc<Domain<D>> {
        &self.domain
    }

    pub fn ghost_filler(&self) -> &Arc<dyn GhostFiller<D>> {
        &self.ghost_filler
    }

    pub fn boundary(&self) -> BoundaryCondition {
        self.boundary
    }

    fn row(&self, pinfo: &PatchInfo<D>, c: [i32; D]) -> Row<D> {
        let folded = match self.boundary {
            BoundaryCondition::Dirichlet => 1.0,
            BoundaryCondition::Neumann => -1.0,
        };
        let mut row = Row {
            diag: 0.0,
            weights: [[0.0; 2]; D],
        };
        for axis in 0..D {
            let inv_h2 = 1.0 / (pinfo.spacings[axis] * pinfo.spacings[axis]);
            row.diag += 2.0 * inv_h2;
            let edges = [c[axis] == 0, c[axis] == pinfo.ns[axis] as i32 - 1];
            for (side, at_edge) in edges.into_iter().enumerate() {
                if at_edge && !pinfo.has_nbr(Face::side(axis, side == 1)) {
                    row.diag += folded * inv_h2;
                } else {
                    row.weights[axis][side] = inv_h2;
                }
            }
        }
        row
    }

    /// Apply the stencil to one patch whose ghosts are current
    pub fn apply_patch(&self, pinfo: &PatchInfo<D>, u: &View<'_, D>, y: &mut ViewMut<'_, D>) {
        Region::interior(pinfo.ns).for_each(|c| {
            let row = self.row(pinfo, c);
            y.set(c, row.diag * u.get(c) - off_diagonal(&row, u, c));
        });
    }
}

fn off_diagonal<const D: usize>(row: &Row<D>, u: &View<'_, D>, c: [i32; D]) -> f64 {
    let mut sum = 0.0;
    for axis in 0..D {
        let [lower, upper] = row.weights[axis];
        if lower != 0.0 {
            let mut n = c;
            n[axis] -= 1;
            sum += lower * u.get(n);
        }
        if upper != 0.0 {
            let mut n = c;
            n[axis] += 1;
            sum += upper * u.get(n);
        }
    }
    sum
}

impl<const D: usize> LinearOperator<D> for StarPatchOperator<D> {
    fn apply(&self, x: &Vector<D>, y: &mut Vector<D>) -> Result<()> {
        x.check_compatible(y)?;
        let mut u = x.clone();
        self.ghost_filler.fill_ghost(&mut u)?;
        let domain = &self.domain;
        let u = &u;
        y.for_each_patch_mut(|i, mut view| {
            self.apply_patch(domain.patch_info(i), &u.patch_view(i), &mut view)
        });
        Ok(())
    }
}

/// Pointwise relaxation of the Poisson stencil within each patch
pub struct StarRelaxation<const D: usize> {
    operator: Arc<StarPatchOperator<D>>,
    config: SmootherConfig,
}

impl<const D: usize> StarRelaxation<D> {
    pub fn new(operator: Arc<StarPatchOperator<D>>, config: SmootherConfig) -> Self {
        Self { operator, config }
    }

    fn gauss_seidel_sweep(&self, pinfo: &PatchInfo<D>, f: &View<'_, D>, u: &mut ViewMut<'_, D>, backward: bool) {
        let mut cells = Vec::with_capacity(Region::interior(pinfo.ns).len());
        Region::interior(pinfo.ns).for_each(|c| cells.push(c));
        if backward {
            cells.reverse();
        }
        for c in cells {
            let row = self.operator.row(pinfo, c);
            let sigma = off_diagonal(&row, &u.as_view(), c);
            u.set(c, (f.get(c) + sigma) / row.diag);
        }
    }

    fn jacobi_sweep(&self, pinfo: &PatchInfo<D>, f: &View<'_, D>, u: &mut ViewMut<'_, D>) {
        let omega = self.config.omega;
        let mut updates = Vec::with_capacity(Region::interior(pinfo.ns).len());
        {
            let old = u.as_view();
            Region::interior(pinfo.ns).for_each(|c| {
                let row = self.operator.row(pinfo, c);
                let x_gs = (f.get(c) + off_diagonal(&row, &old, c)) / row.diag;
                updates.push((c, omega * x_gs + (1.0 - omega) * old.get(c)));
            });
        }
        for (c, value) in updates {
            u.set(c, value);
        }
    }
}

impl<const D: usize> PatchSolver<D> for StarRelaxation<D> {
    fn smooth_patch(&self, pinfo: &PatchInfo<D>, f: &View<'_, D>, u: &mut ViewMut<'_, D>) {
        match self.config.smoother_type {
            SmootherType::GaussSeidel => self.gauss_seidel_sweep(pinfo, f, u, false),
            SmootherType::Jacobi => self.jacobi_sweep(pinfo, f, u),
            SmootherType::SymmetricGaussSeidel => {
                self.gauss_seidel_sweep(pinfo, f, u, false);
                self.gauss_seidel_sweep(pinfo, f, u, true);
            }
        }
    }
}

/// Visit the interior cells next to each domain-boundary side with the point on that side
fn for_each_boundary_cell<const D: usize>(
    domain: &Domain<D>,
    f: &mut Vector<D>,
    mut visit: impl FnMut(&PatchInfo<D>, usize, bool, [f64; D], &mut f64),
) -> Result<()> {
    if f.num_local_patches() != domain.num_local_patches() {
        return Err(Error::Dimension {
            expected: domain.num_local_patches(),
            got: f.num_local_patches(),
        });
    }
    for (i, pinfo) in domain.patch_infos().iter().enumerate() {
        let mut view = f.patch_view_mut(i);
        for axis in 0..D {
            for upper in [false, true] {
                let face = Face::side(axis, upper);
                if pinfo.has_nbr(face) {
                    continue;
                }
                Region::slice(pinfo.ns, &face, 0..1).for_each(|c| {
                    let mut x = pinfo.cell_center(c);
                    let half = 0.5 * pinfo.spacings[axis];
                    x[axis] += if upper { half } else { -half };
                    let mut value = view.get(c);
                    visit(pinfo, axis, upper, x, &mut value);
                    view.set(c, value);
                });
            }
        }
    }
    Ok(())
}

/// Move the Dirichlet data `g` into the right-hand side `f`
pub fn add_dirichlet_bc_to_rhs<const D: usize, G>(domain: &Domain<D>, f: &mut Vector<D>, g: G) -> Result<()>
where
    G: Fn([f64; D]) -> f64,
{
    for_each_boundary_cell(domain, f, |pinfo, axis, _, x, value| {
        let h = pinfo.spacings[axis];
        *value += 2.0 * g(x) / (h * h);
    })
}

/// Move the Neumann data into the right-hand side `f`, given the gradient of the solution
pub fn add_neumann_bc_to_rhs<const D: usize, G>(domain: &Domain<D>, f: &mut Vector<D>, gradient: G) -> Result<()>
where
    G: Fn([f64; D]) -> [f64; D],
{
    for_each_boundary_cell(domain, f, |pinfo, axis, upper, x, value| {
        let normal = if upper { 1.0 } else { -1.0 };
        *value += normal * gradient(x)[axis] / pinfo.spacings[axis];
    })
}

/// Levels of a Poisson hierarchy
#[derive(Debug, Clone, Default)]
pub struct PoissonFactory {
    pub boundary: BoundaryCondition,
    pub smoother: SmootherConfig,
    pub interpolator: InterpolatorType,
    pub coarse_solver: CoarseSolverType,
    pub krylov: KrylovConfig,
}

impl<const D: usize> LevelFactory<D> for PoissonFactory {
    fn level(&self, domain: &Arc<Domain<D>>) -> Result<LevelParts<D>> {
        let ghost_filler: Arc<dyn GhostFiller<D>> = Arc::new(ExchangeGhostFiller::new(
            domain.clone(),
            GhostFillingType::Faces,
            LinearStrategy,
        )?);
        let operator = Arc::new(StarPatchOperator::new(
            domain.clone(),
            ghost_filler.clone(),
            self.boundary,
        )?);
        let relaxation = Arc::new(StarRelaxation::new(operator.clone(), self.smoother.clone()));
        let smoother = Arc::new(PatchSmoother::new(
            domain.clone(),
            ghost_filler.clone(),
            relaxation,
            self.smoother.iterations,
        ));
        Ok(LevelParts {
            domain: domain.clone(),
            operator,
            smoother,
            ghost_filler,
        })
    }

    fn interpolator(&self, ilc: Arc<InterLevelComm<D>>, coarse: &LevelParts<D>) -> Result<Box<dyn Interpolator<D>>> {
        make_interpolator(self.interpolator, ilc, coarse.ghost_filler.clone())
    }

    fn coarse_solver(&self, coarsest: &LevelParts<D>) -> Result<Option<Box<dyn CoarseSolver<D>>>> {
        let solver: Box<dyn CoarseSolver<D>> = match self.coarse_solver {
            CoarseSolverType::Smoother => return Ok(None),
            CoarseSolverType::Cg => Box::new(KrylovCoarseSolver::new(
                coarsest.operator.clone(),
                KrylovMethod::Cg,
                self.krylov.clone(),
            )),
            CoarseSolverType::BiCgStab => Box::new(KrylovCoarseSolver::new(
                coarsest.operator.clone(),
                KrylovMethod::BiCgStab,
                self.krylov.clone(),
            )),
            CoarseSolverType::Dense => Box::new(DenseCoarseSolver::new(
                coarsest.operator.as_ref(),
                &Vector::new(&coarsest.domain),
            )?),
        };
        Ok(Some(solver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smoother::{residual_norm, Smoother};
    use crate::test_support::on_ranks;
    use approx::assert_relative_eq;
    use domain::tools::set_values;
    use domain::UniformGrid;
    use std::f64::consts::PI;

    fn parts(
        grid: &UniformGrid<2>,
        comm: Arc<dyn domain::Communicator>,
        factory: &PoissonFactory,
    ) -> LevelParts<2> {
        let domain = Arc::new(grid.domain(0, comm).unwrap());
        factory.level(&domain).unwrap()
    }

    #[test]
    fn test_dirichlet_data_matches_linear_field() {
        // -Δu = 0 and the boundary extrapolation is exact for linear u
        let grid = UniformGrid::<2>::new(2, 8, 1).unwrap();
        on_ranks(2, |comm| {
            let level = parts(&grid, comm, &PoissonFactory::default());
            let exact = |x: [f64; 2]| 2.0 * x[0] - x[1] + 1.0;
            let mut u = Vector::new(&level.domain);
            set_values(&level.domain, &mut u, exact).unwrap();

            let mut au = u.zeros_like();
            level.operator.apply(&u, &mut au).unwrap();
            let mut f = u.zeros_like();
            add_dirichlet_bc_to_rhs(&level.domain, &mut f, exact).unwrap();

            for (a, b) in au.interior_values().iter().zip(f.interior_values()) {
                assert_relative_eq!(*a, b, epsilon = 1e-9, max_relative = 1e-12);
            }
        });
    }

    #[test]
    fn test_neumann_data_matches_linear_field() {
        let grid = UniformGrid::<2>::new(2, 4, 1).unwrap();
        on_ranks(1, |comm| {
            let factory = PoissonFactory {
                boundary: BoundaryCondition::Neumann,
                ..PoissonFactory::default()
            };
            let level = parts(&grid, comm, &factory);
            let exact = |x: [f64; 2]| 2.0 * x[0] - x[1];
            let mut u = Vector::new(&level.domain);
            set_values(&level.domain, &mut u, exact).unwrap();

            let mut au = u.zeros_like();
            level.operator.apply(&u, &mut au).unwrap();
            let mut f = u.zeros_like();
            add_neumann_bc_to_rhs(&level.domain, &mut f, |_| [2.0, -1.0]).unwrap();

            for (a, b) in au.interior_values().iter().zip(f.interior_values()) {
                assert_relative_eq!(*a, b, epsilon = 1e-9);
            }
        });
    }

    #[test]
    fn test_operator_is_symmetric() {
        let grid = UniformGrid::<2>::new(2, 4, 1).unwrap();
        on_ranks(2, |comm| {
            let level = parts(&grid, comm, &PoissonFactory::default());
            let mut x = Vector::new(&level.domain);
            let mut y = Vector::new(&level.domain);
            set_values(&level.domain, &mut x, |p| (3.0 * p[0]).sin() + p[1]).unwrap();
            set_values(&level.domain, &mut y, |p| p[0] * p[1] * p[1]).unwrap();
            let mut ax = x.zeros_like();
            let mut ay = y.zeros_like();
            level.operator.apply(&x, &mut ax).unwrap();
            level.operator.apply(&y, &mut ay).unwrap();
            assert_relative_eq!(ax.dot(&y).unwrap(), ay.dot(&x).unwrap(), max_relative = 1e-12);
        });
    }

    #[test]
    fn test_smoothers_reduce_residual() {
        let grid = UniformGrid::<2>::new(2, 8, 1).unwrap();
        for smoother_type in [
            SmootherType::GaussSeidel,
            SmootherType::Jacobi,
            SmootherType::SymmetricGaussSeidel,
        ] {
            on_ranks(2, |comm| {
                let factory = PoissonFactory {
                    smoother: SmootherConfig {
                        smoother_type,
                        iterations: 3,
                        ..SmootherConfig::default()
                    },
                    ..PoissonFactory::default()
                };
                let level = parts(&grid, comm, &factory);
                let mut f = Vector::new(&level.domain);
                set_values(&level.domain, &mut f, |x| {
                    2.0 * PI * PI * (PI * x[0]).sin() * (PI * x[1]).sin()
                })
                .unwrap();
                let mut u = f.zeros_like();
                let initial = residual_norm(level.operator.as_ref(), &f, &u).unwrap();
                level.smoother.smooth(&f, &mut u).unwrap();
                let after = residual_norm(level.operator.as_ref(), &f, &u).unwrap();
                assert!(after < initial, "{smoother_type:?} should reduce the residual");
            });
        }
    }

    #[test]
    fn test_no_ghost_layer_is_rejected() {
        let grid = UniformGrid::<2>::new(1, 4, 0).unwrap();
        let domain = Arc::new(grid.domain(0, Arc::new(domain::ThreadComm::single())).unwrap());
        struct NoFill;
        impl GhostFiller<2> for NoFill {
            fn fill_ghost(&self, _: &mut Vector<2>) -> Result<()> {
                Ok(())
            }
            fn fill_type(&self) -> GhostFillingType {
                GhostFillingType::Faces
            }
        }
        let err = StarPatchOperator::new(domain, Arc::new(NoFill), BoundaryCondition::Dirichlet)
            .err()
            .unwrap();
        assert!(err.is_configuration_error());
    }
}
