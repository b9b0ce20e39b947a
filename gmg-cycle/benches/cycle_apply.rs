//! Benchmark: ghost filling and cycle application
//!
//! Single-rank 2D Poisson hierarchies of growing size:
//! 1. Ghost fill on the finest level
//! 2. One application of V, W and FMG cycles
//!
//! Run with:
//!   cargo bench -p patchgmg-cycle --bench cycle_apply

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use domain::tools::set_values;
use domain::{
    Communicator, ExchangeGhostFiller, GhostFiller, GhostFillingType, LinearOperator,
    LinearStrategy, ThreadComm, UniformGrid, Vector,
};
use gmg::{CycleBuilder, CycleOpts, CycleType, PoissonFactory};
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

fn single_rank() -> Arc<dyn Communicator> {
    Arc::new(ThreadComm::single())
}

fn bench_ghost_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("ghost_fill_2d");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(3));

    for &patches in &[2, 4, 8] {
        let grid = UniformGrid::<2>::new(patches, 16, 1).unwrap();
        let domain = Arc::new(grid.domain(0, single_rank()).unwrap());
        let filler =
            ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Faces, LinearStrategy).unwrap();
        let mut u = Vector::new(&domain);
        set_values(&domain, &mut u, |x| x[0] * x[1]).unwrap();

        group.throughput(Throughput::Elements((patches * patches) as u64));
        group.bench_with_input(BenchmarkId::new("faces", patches), &patches, |b, _| {
            b.iter(|| filler.fill_ghost(black_box(&mut u)).unwrap());
        });
    }

    group.finish();
}

fn bench_cycle_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle_apply_2d");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(5));

    for &patches in &[4, 8] {
        let grid = UniformGrid::<2>::new(patches, 16, 1).unwrap();
        let domains = grid.domains(single_rank()).unwrap();
        let mut f = Vector::new(&domains[0]);
        set_values(&domains[0], &mut f, |x| {
            2.0 * PI * PI * (PI * x[0]).sin() * (PI * x[1]).sin()
        })
        .unwrap();
        let mut u = f.zeros_like();
        group.throughput(Throughput::Elements(f.num_local_cells() as u64));

        for cycle_type in [CycleType::V, CycleType::W, CycleType::Fmg] {
            let opts = CycleOpts {
                cycle_type,
                ..CycleOpts::default()
            };
            let cycle = CycleBuilder::from_domains(opts, &domains, &PoissonFactory::default()).unwrap();
            group.bench_with_input(
                BenchmarkId::new(cycle_type.to_string(), patches),
                &patches,
                |b, _| b.iter(|| cycle.apply(black_box(&f), &mut u).unwrap()),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_ghost_fill, bench_cycle_apply);
criterion_main!(benches);
