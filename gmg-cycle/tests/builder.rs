//! Cycle assembly: level ordering, level limits and hierarchy validation

use domain::{
    Communicator, Domain, IdentityOperator, LinearOperator, Result, ThreadComm, UniformGrid, Vector,
};
use gmg::{
    usable_levels, CycleBuilder, CycleOpts, InterLevelComm, Interpolator, LevelFactory,
    LevelParts, PoissonFactory, Restrictor, Smoother,
};
use std::sync::Arc;
use std::thread;

struct Passthrough;

impl Restrictor<2> for Passthrough {
    fn restrict(&self, fine: &Vector<2>) -> Result<Vector<2>> {
        Ok(fine.clone())
    }
}

impl Interpolator<2> for Passthrough {
    fn interpolate(&self, _coarse: &Vector<2>, _fine: &mut Vector<2>) -> Result<()> {
        Ok(())
    }
}

impl Smoother<2> for Passthrough {
    fn smooth(&self, _f: &Vector<2>, _u: &mut Vector<2>) -> Result<()> {
        Ok(())
    }
}

fn op() -> Arc<dyn LinearOperator<2>> {
    Arc::new(IdentityOperator)
}

fn smoother() -> Arc<dyn Smoother<2>> {
    Arc::new(Passthrough)
}

fn config_message(err: domain::Error) -> String {
    assert!(err.is_configuration_error(), "{err}");
    err.to_string()
}

#[test]
fn test_levels_must_be_added_in_order() {
    let mut builder = CycleBuilder::<2>::new(CycleOpts::default());
    let err = builder
        .add_intermediate_level(op(), smoother(), Box::new(Passthrough), Box::new(Passthrough))
        .unwrap_err();
    assert!(config_message(err).contains("add_finest_level has not been called yet"));
    let err = builder
        .add_coarsest_level(op(), smoother(), Box::new(Passthrough))
        .unwrap_err();
    assert!(config_message(err).contains("add_finest_level has not been called yet"));

    builder.add_finest_level(op(), smoother(), Box::new(Passthrough)).unwrap();
    let err = builder
        .add_finest_level(op(), smoother(), Box::new(Passthrough))
        .unwrap_err();
    assert!(config_message(err).contains("add_finest_level was already called"));

    builder
        .add_intermediate_level(op(), smoother(), Box::new(Passthrough), Box::new(Passthrough))
        .unwrap();
    builder
        .add_coarsest_level(op(), smoother(), Box::new(Passthrough))
        .unwrap();

    let err = builder
        .add_intermediate_level(op(), smoother(), Box::new(Passthrough), Box::new(Passthrough))
        .unwrap_err();
    assert!(config_message(err).contains("add_coarsest_level has been called"));
    let err = builder
        .add_coarsest_level(op(), smoother(), Box::new(Passthrough))
        .unwrap_err();
    assert!(config_message(err).contains("add_coarsest_level has already been called"));

    let cycle = builder.build().unwrap();
    assert_eq!(cycle.num_levels(), 3);
    let finest = cycle.level(0).unwrap();
    assert!(finest.is_finest() && !finest.is_coarsest());
    let middle = cycle.level(1).unwrap();
    assert!(!middle.is_finest() && !middle.is_coarsest());
    let coarsest = cycle.level(2).unwrap();
    assert!(coarsest.is_coarsest() && !coarsest.is_finest());
    assert!(cycle.level(3).is_none());
}

#[test]
fn test_build_needs_a_coarsest_level() {
    let builder = CycleBuilder::<2>::new(CycleOpts::default());
    let err = builder.build().err().unwrap();
    assert!(config_message(err).contains("add_coarsest_level has not been called"));

    let mut builder = CycleBuilder::<2>::new(CycleOpts::default());
    builder.add_finest_level(op(), smoother(), Box::new(Passthrough)).unwrap();
    let err = builder.build().err().unwrap();
    assert!(config_message(err).contains("add_coarsest_level has not been called"));
}

#[test]
fn test_level_limits() {
    let grid = UniformGrid::<2>::new(4, 4, 1).unwrap();
    let comms = ThreadComm::world(2);
    thread::scope(|s| {
        for comm in comms {
            let grid = &grid;
            s.spawn(move || {
                let comm: Arc<dyn Communicator> = Arc::new(comm);
                let domains = grid.domains(comm).unwrap();
                assert_eq!(usable_levels(&CycleOpts::default(), &domains), 3);

                let opts = CycleOpts {
                    max_levels: 2,
                    ..CycleOpts::default()
                };
                assert_eq!(usable_levels(&opts, &domains), 2);
                let cycle = CycleBuilder::from_domains(opts, &domains, &PoissonFactory::default()).unwrap();
                assert_eq!(cycle.num_levels(), 2);

                // 16, 4 and 1 patches over 2 ranks
                let opts = CycleOpts {
                    patches_per_proc: 1.0,
                    ..CycleOpts::default()
                };
                assert_eq!(usable_levels(&opts, &domains), 2);
                let opts = CycleOpts {
                    patches_per_proc: 3.0,
                    ..CycleOpts::default()
                };
                assert_eq!(usable_levels(&opts, &domains), 1);
                let err = CycleBuilder::from_domains(opts, &domains, &PoissonFactory::default())
                    .err()
                    .unwrap();
                assert!(config_message(err).contains("at least two levels"));
            });
        }
    });
}

#[test]
fn test_inconsistent_hierarchy_is_rejected() {
    let grid = UniformGrid::<2>::new(4, 4, 1).unwrap();
    let comm: Arc<dyn Communicator> = Arc::new(ThreadComm::single());
    let domains = grid.domains(comm).unwrap();
    // skipping a level leaves the fine patches pointing at parents that do not exist
    let skipped: Vec<Arc<Domain<2>>> = vec![domains[0].clone(), domains[2].clone()];
    let err = CycleBuilder::from_domains(CycleOpts::default(), &skipped, &PoissonFactory::default())
        .err()
        .unwrap();
    assert!(err.is_configuration_error(), "{err}");
}

#[test]
fn test_manual_assembly_matches_from_domains() {
    let grid = UniformGrid::<2>::new(2, 4, 1).unwrap();
    let comm: Arc<dyn Communicator> = Arc::new(ThreadComm::single());
    let domains = grid.domains(comm).unwrap();
    let factory = PoissonFactory::default();

    let fine = LevelFactory::<2>::level(&factory, &domains[0]).unwrap();
    let coarse = LevelFactory::<2>::level(&factory, &domains[1]).unwrap();
    let ilc = Arc::new(InterLevelComm::new(domains[1].clone(), domains[0].clone()).unwrap());

    let mut builder = CycleBuilder::new(CycleOpts::default());
    builder
        .add_finest_level(
            fine.operator.clone(),
            fine.smoother.clone(),
            factory.restrictor(ilc.clone()).unwrap(),
        )
        .unwrap();
    builder
        .add_coarsest_level(
            coarse.operator.clone(),
            coarse.smoother.clone(),
            factory.interpolator(ilc, &coarse).unwrap(),
        )
        .unwrap();
    let manual = builder.build().unwrap();
    let automatic = CycleBuilder::from_domains(CycleOpts::default(), &domains, &factory).unwrap();

    let mut f = Vector::new(&domains[0]);
    f.set(1.0);
    let mut a = f.zeros_like();
    let mut b = f.zeros_like();
    manual.apply(&f, &mut a).unwrap();
    automatic.apply(&f, &mut b).unwrap();
    assert_eq!(a.interior_values(), b.interior_values());
    assert!(a.two_norm().unwrap() > 0.0);

    for index in 0..2 {
        let level = automatic.level(index).unwrap();
        assert!(Arc::ptr_eq(level.domain().unwrap(), &domains[index]));
        assert!(level.ghost_filler().is_some());
        let level = manual.level(index).unwrap();
        assert!(level.domain().is_none());
        assert!(level.ghost_filler().is_none());
    }
}

/// Supplies only the per-level parts and keeps every other default
struct PartsOnly(PoissonFactory);

impl LevelFactory<2> for PartsOnly {
    fn level(&self, domain: &Arc<Domain<2>>) -> Result<LevelParts<2>> {
        self.0.level(domain)
    }
}

#[test]
fn test_default_factory_transfers_and_coarse_smoothing() {
    let grid = UniformGrid::<2>::new(2, 4, 1).unwrap();
    let comm: Arc<dyn Communicator> = Arc::new(ThreadComm::single());
    let domains = grid.domains(comm).unwrap();
    let factory = PartsOnly(PoissonFactory::default());
    let coarse = factory.level(&domains[1]).unwrap();
    assert!(factory.coarse_solver(&coarse).unwrap().is_none());

    let cycle = CycleBuilder::from_domains(CycleOpts::default(), &domains, &factory).unwrap();
    assert_eq!(cycle.num_levels(), 2);
    let mut f = Vector::new(&domains[0]);
    f.set(1.0);
    let mut u = f.zeros_like();
    cycle.apply(&f, &mut u).unwrap();
    assert!(u.two_norm().unwrap() > 0.0);
}
