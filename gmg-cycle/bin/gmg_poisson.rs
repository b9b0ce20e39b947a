//! Poisson solver driver for patch-based geometric multigrid
//!
//! Solves `-Δu = f` on the unit square or cube with a manufactured solution, running
//! every rank as a thread over the in-process transport, and reports the residual
//! history and the discretization error.
//!
//! Usage:
//!   cargo run --release --bin gmg-poisson -- --patches 8 --cells 16 --ranks 4
//!   cargo run --release --bin gmg-poisson -- --config run.json --solver cg
//!   cargo run --release --bin gmg-poisson -- --help

use anyhow::Context;
use clap::{Parser, ValueEnum};
use domain::tools::{integrate, set_values};
use domain::{Communicator, Domain, ThreadComm, UniformGrid, Vector};
use gmg::{
    add_dirichlet_bc_to_rhs, add_neumann_bc_to_rhs, solve_multigrid, BoundaryCondition,
    CycleBuilder, CycleType, OuterSolver, RunConfig,
};
use solvers::{bicgstab_preconditioned, cg_preconditioned};
use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "gmg-poisson")]
#[command(about = "Poisson solver using patch-based geometric multigrid")]
struct Args {
    /// Path to JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Spatial dimension (2 or 3)
    #[arg(short, long)]
    dim: Option<usize>,

    /// Patches along each axis on the finest level
    #[arg(short, long)]
    patches: Option<usize>,

    /// Cells along each axis of a patch
    #[arg(long)]
    cells: Option<usize>,

    /// Number of in-process ranks
    #[arg(short, long)]
    ranks: Option<usize>,

    /// Cycle type (V, W or FMG)
    #[arg(long)]
    cycle_type: Option<CycleType>,

    /// Maximum outer iterations
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Outer solver
    #[arg(short, long)]
    solver: Option<CliSolver>,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSolver {
    Multigrid,
    Cg,
    Bicgstab,
}

impl From<CliSolver> for OuterSolver {
    fn from(solver: CliSolver) -> Self {
        match solver {
            CliSolver::Multigrid => OuterSolver::Multigrid,
            CliSolver::Cg => OuterSolver::Cg,
            CliSolver::Bicgstab => OuterSolver::BiCgStab,
        }
    }
}

/// What rank 0 reports once the solve is over
#[derive(Debug)]
struct Report {
    num_levels: usize,
    iterations: usize,
    converged: bool,
    residual_history: Vec<f64>,
    max_error: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RunConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    if args.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let p = &config.problem;
    println!("=== Patch GMG Poisson Solver ===");
    println!(
        "  {}D, {} patches per axis of {} cells, {} rank(s)",
        p.dim, p.patches_per_axis, p.cells_per_patch, p.ranks
    );
    println!(
        "  {} cycle, {:?} smoother, {:?} boundary, {:?} outer solver",
        config.cycle.cycle_type, config.smoother.smoother_type, config.boundary, config.solver
    );
    log::info!(
        "per-patch loops: {}",
        if domain::parallel::is_parallel_available() { "rayon" } else { "sequential" }
    );

    let start = Instant::now();
    let report = match p.dim {
        2 => run::<2>(&config)?,
        3 => run::<3>(&config)?,
        other => anyhow::bail!("unsupported dimension {other}"),
    };
    let elapsed = start.elapsed();

    println!("\n  levels: {}", report.num_levels);
    for (i, r) in report.residual_history.iter().enumerate() {
        println!("  iteration {i:3}: relative residual {r:.6e}");
    }
    println!(
        "\n  {} after {} iterations in {:.2?}",
        if report.converged { "converged" } else { "NOT converged" },
        report.iterations,
        elapsed
    );
    println!("  max error vs exact solution: {:.6e}", report.max_error);
    Ok(())
}

fn apply_overrides(config: &mut RunConfig, args: &Args) {
    if let Some(dim) = args.dim {
        config.problem.dim = dim;
    }
    if let Some(patches) = args.patches {
        config.problem.patches_per_axis = patches;
    }
    if let Some(cells) = args.cells {
        config.problem.cells_per_patch = cells;
    }
    if let Some(ranks) = args.ranks {
        config.problem.ranks = ranks;
    }
    if let Some(cycle_type) = args.cycle_type {
        config.cycle.cycle_type = cycle_type;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.multigrid.max_iterations = max_iterations;
        config.krylov.max_iterations = max_iterations;
    }
    if let Some(solver) = args.solver {
        config.solver = solver.into();
    }
}

fn run<const D: usize>(config: &RunConfig) -> anyhow::Result<Report> {
    let p = &config.problem;
    let grid = UniformGrid::<D>::new(p.patches_per_axis, p.cells_per_patch, p.num_ghost_cells)?;
    let comms = ThreadComm::world(p.ranks);

    let reports = thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let grid = &grid;
                s.spawn(move || solve_on_rank(config, grid, Arc::new(comm)))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| anyhow::anyhow!("a rank thread panicked")))
            .collect::<anyhow::Result<Vec<_>>>()
    })?;

    let mut first = None;
    for (rank, report) in reports.into_iter().enumerate() {
        let report = report.with_context(|| format!("rank {rank} failed"))?;
        if first.is_none() {
            first = Some(report);
        }
    }
    first.context("no ranks were run")
}

fn solve_on_rank<const D: usize>(
    config: &RunConfig,
    grid: &UniformGrid<D>,
    comm: Arc<dyn Communicator>,
) -> domain::Result<Report> {
    let domains = grid.domains(comm)?;
    let factory = config.poisson_factory();
    let cycle = CycleBuilder::from_domains(config.cycle.clone(), &domains, &factory)?;
    let finest = &domains[0];

    let exact = manufactured_solution::<D>(config.boundary);
    let mut f = Vector::new(finest);
    set_values(finest, &mut f, |x| D as f64 * PI * PI * exact(x))?;
    match config.boundary {
        BoundaryCondition::Dirichlet => add_dirichlet_bc_to_rhs(finest, &mut f, &exact)?,
        BoundaryCondition::Neumann => add_neumann_bc_to_rhs(finest, &mut f, gradient::<D>)?,
    }

    let mut u = f.zeros_like();
    let (iterations, converged, residual_history) = match config.solver {
        OuterSolver::Multigrid => {
            let result = solve_multigrid(&cycle, &f, &mut u, &config.multigrid)?;
            (result.iterations, result.converged, result.residual_history)
        }
        OuterSolver::Cg => {
            let result = cg_preconditioned(cycle.operator(), &cycle, &f, &mut u, &config.krylov)?;
            (result.iterations, result.converged, vec![result.residual])
        }
        OuterSolver::BiCgStab => {
            let result = bicgstab_preconditioned(cycle.operator(), &cycle, &f, &mut u, &config.krylov)?;
            (result.iterations, result.converged, vec![result.residual])
        }
    };

    let max_error = max_error(finest, &u, &exact, config.boundary)?;
    Ok(Report {
        num_levels: cycle.num_levels(),
        iterations,
        converged,
        residual_history,
        max_error,
    })
}

/// `Π sin(π x)` vanishes on the boundary, `Π cos(π x)` has a zero normal derivative there
fn manufactured_solution<const D: usize>(boundary: BoundaryCondition) -> impl Fn([f64; D]) -> f64 {
    move |x: [f64; D]| {
        x.iter()
            .map(|&xi| match boundary {
                BoundaryCondition::Dirichlet => (PI * xi).sin(),
                BoundaryCondition::Neumann => (PI * xi).cos(),
            })
            .product()
    }
}

fn gradient<const D: usize>(x: [f64; D]) -> [f64; D] {
    let mut grad = [0.0; D];
    for (axis, g) in grad.iter_mut().enumerate() {
        *g = -PI
            * x.iter()
                .enumerate()
                .map(|(j, &xj)| if j == axis { (PI * xj).sin() } else { (PI * xj).cos() })
                .product::<f64>();
    }
    grad
}

/// Max-norm error; Neumann solutions are compared up to their mean (collective)
fn max_error<const D: usize>(
    domain: &Domain<D>,
    u: &Vector<D>,
    exact: &impl Fn([f64; D]) -> f64,
    boundary: BoundaryCondition,
) -> domain::Result<f64> {
    let mut error = u.zeros_like();
    set_values(domain, &mut error, exact)?;
    error.scale(-1.0);
    error.add_scaled(1.0, u)?;
    if boundary == BoundaryCondition::Neumann {
        let mean = integrate(domain, &error)?;
        error.shift(-mean);
    }
    error.inf_norm()
}
