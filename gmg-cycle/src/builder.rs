//! Assembling cycles level by level
//!
//! Levels are added from finest to coarsest: [`CycleBuilder::add_finest_level`] once,
//! [`CycleBuilder::add_intermediate_level`] any number of times, then
//! [`CycleBuilder::add_coarsest_level`] once. [`CycleBuilder::from_domains`] does the
//! same from a list of domains and a [`LevelFactory`].

use crate::coarse::CoarseSolver;
use crate::cycle::{Cycle, CycleOpts};
use crate::interlevel::InterLevelComm;
use crate::interpolator::{DirectInterpolator, Interpolator};
use crate::level::Level;
use crate::restrictor::{LinearRestrictor, RestrictionMode, Restrictor};
use crate::smoother::Smoother;
use domain::{Domain, Error, GhostFiller, LinearOperator, Result};
use std::sync::Arc;

/// Incremental construction of a [`Cycle`]
pub struct CycleBuilder<const D: usize> {
    opts: CycleOpts,
    levels: Vec<Level<D>>,
    /// Restrictor of the last level added, waiting for its coarser neighbor
    pending_restrictor: Option<Box<dyn Restrictor<D>>>,
    has_coarsest: bool,
}

impl<const D: usize> CycleBuilder<D> {
    pub fn new(opts: CycleOpts) -> Self {
        Self {
            opts,
            levels: Vec::new(),
            pending_restrictor: None,
            has_coarsest: false,
        }
    }

    /// Add the finest level, with its restrictor to the next coarser level
    pub fn add_finest_level(
        &mut self,
        operator: Arc<dyn LinearOperator<D>>,
        smoother: Arc<dyn Smoother<D>>,
        restrictor: Box<dyn Restrictor<D>>,
    ) -> Result<()> {
        if !self.levels.is_empty() {
            return Err(Error::config("add_finest_level was already called"));
        }
        self.push(operator, smoother, Some(restrictor), None, None);
        Ok(())
    }

    /// Add a level between the finest and the coarsest
    pub fn add_intermediate_level(
        &mut self,
        operator: Arc<dyn LinearOperator<D>>,
        smoother: Arc<dyn Smoother<D>>,
        restrictor: Box<dyn Restrictor<D>>,
        interpolator: Box<dyn Interpolator<D>>,
    ) -> Result<()> {
        self.check_can_add_coarser("add_coarsest_level has been called")?;
        self.push(operator, smoother, Some(restrictor), Some(interpolator), None);
        Ok(())
    }

    /// Add the coarsest level, solved by `coarse_sweeps` smoother applications
    pub fn add_coarsest_level(
        &mut self,
        operator: Arc<dyn LinearOperator<D>>,
        smoother: Arc<dyn Smoother<D>>,
        interpolator: Box<dyn Interpolator<D>>,
    ) -> Result<()> {
        self.check_can_add_coarser("add_coarsest_level has already been called")?;
        self.push(operator, smoother, None, Some(interpolator), None);
        self.has_coarsest = true;
        Ok(())
    }

    /// Add the coarsest level with a dedicated solver
    pub fn add_coarsest_level_with_solver(
        &mut self,
        operator: Arc<dyn LinearOperator<D>>,
        smoother: Arc<dyn Smoother<D>>,
        interpolator: Box<dyn Interpolator<D>>,
        solver: Box<dyn CoarseSolver<D>>,
    ) -> Result<()> {
        self.check_can_add_coarser("add_coarsest_level has already been called")?;
        self.push(operator, smoother, None, Some(interpolator), Some(solver));
        self.has_coarsest = true;
        Ok(())
    }

    fn check_can_add_coarser(&self, after_coarsest: &str) -> Result<()> {
        if self.levels.is_empty() {
            return Err(Error::config("add_finest_level has not been called yet"));
        }
        if self.has_coarsest {
            return Err(Error::config(after_coarsest));
        }
        Ok(())
    }

    fn push(
        &mut self,
        operator: Arc<dyn LinearOperator<D>>,
        smoother: Arc<dyn Smoother<D>>,
        restrictor: Option<Box<dyn Restrictor<D>>>,
        interpolator: Option<Box<dyn Interpolator<D>>>,
        coarse_solver: Option<Box<dyn CoarseSolver<D>>>,
    ) {
        // a level's restrictor is stored once its coarser neighbor exists
        if let Some(previous) = self.levels.last_mut() {
            previous.restrictor = self.pending_restrictor.take();
        }
        self.pending_restrictor = restrictor;
        self.levels.push(Level {
            index: self.levels.len(),
            operator,
            smoother,
            restrictor: None,
            interpolator,
            coarse_solver,
            domain: None,
            ghost_filler: None,
        });
    }

    /// Record the domain and ghost filler the last level was built from
    fn attach_parts(&mut self, parts: &LevelParts<D>) {
        if let Some(level) = self.levels.last_mut() {
            level.domain = Some(parts.domain.clone());
            level.ghost_filler = Some(parts.ghost_filler.clone());
        }
    }

    /// Finish the cycle
    pub fn build(self) -> Result<Cycle<D>> {
        if !self.has_coarsest {
            return Err(Error::config("add_coarsest_level has not been called"));
        }
        log::info!(
            "built a {} cycle with {} levels",
            self.opts.cycle_type,
            self.levels.len()
        );
        Ok(Cycle::new(self.opts, self.levels))
    }

    /// Build a cycle over `domains`, finest first (collective).
    ///
    /// Coarsening stops at `opts.max_levels` levels, or before the first level whose
    /// average number of patches per rank falls below `opts.patches_per_proc`.
    pub fn from_domains<F>(opts: CycleOpts, domains: &[Arc<Domain<D>>], factory: &F) -> Result<Cycle<D>>
    where
        F: LevelFactory<D> + ?Sized,
    {
        let num_levels = usable_levels(&opts, domains);
        if num_levels < 2 {
            return Err(Error::config(format!(
                "a cycle needs at least two levels, {num_levels} usable out of {} domains",
                domains.len()
            )));
        }

        let parts = domains[..num_levels]
            .iter()
            .enumerate()
            .map(|(index, domain)| factory.level(domain).map_err(|e| e.at_level(index)))
            .collect::<Result<Vec<_>>>()?;
        let ilcs = (1..num_levels)
            .map(|index| {
                InterLevelComm::new(domains[index].clone(), domains[index - 1].clone())
                    .map(Arc::new)
                    .map_err(|e| e.at_level(index))
            })
            .collect::<Result<Vec<_>>>()?;

        let coarsest = num_levels - 1;
        let mut builder = CycleBuilder::new(opts);
        for (index, level) in parts.iter().enumerate() {
            let at = |e: Error| e.at_level(index);
            let operator = level.operator.clone();
            let smoother = level.smoother.clone();
            if index == 0 {
                let restrictor = factory.restrictor(ilcs[0].clone()).map_err(at)?;
                builder.add_finest_level(operator, smoother, restrictor)?;
                builder.attach_parts(level);
                continue;
            }
            let interpolator = factory.interpolator(ilcs[index - 1].clone(), level).map_err(at)?;
            if index < coarsest {
                let restrictor = factory.restrictor(ilcs[index].clone()).map_err(at)?;
                builder.add_intermediate_level(operator, smoother, restrictor, interpolator)?;
            } else {
                match factory.coarse_solver(level).map_err(at)? {
                    Some(solver) => {
                        builder.add_coarsest_level_with_solver(operator, smoother, interpolator, solver)?
                    }
                    None => builder.add_coarsest_level(operator, smoother, interpolator)?,
                }
            }
            builder.attach_parts(level);
        }
        builder.build()
    }
}

/// Number of leading `domains` a cycle built with `opts` uses
pub fn usable_levels<const D: usize>(opts: &CycleOpts, domains: &[Arc<Domain<D>>]) -> usize {
    let mut count = 0;
    for domain in domains {
        if opts.max_levels > 0 && count >= opts.max_levels {
            break;
        }
        if count > 0 && opts.patches_per_proc > 0.0 {
            let per_rank = domain.num_global_patches() as f64 / domain.comm().size() as f64;
            if per_rank < opts.patches_per_proc {
                break;
            }
        }
        count += 1;
    }
    count
}

/// Operators and smoother of one level, built by a [`LevelFactory`]
#[derive(Clone)]
pub struct LevelParts<const D: usize> {
    pub domain: Arc<Domain<D>>,
    pub operator: Arc<dyn LinearOperator<D>>,
    pub smoother: Arc<dyn Smoother<D>>,
    pub ghost_filler: Arc<dyn GhostFiller<D>>,
}

/// Builds the per-level pieces of a cycle from the level's domain
pub trait LevelFactory<const D: usize> {
    /// Operator, smoother and ghost filler of the level over `domain`
    fn level(&self, domain: &Arc<Domain<D>>) -> Result<LevelParts<D>>;

    /// Restrictor from `ilc`'s fine domain to its coarse domain
    fn restrictor(&self, ilc: Arc<InterLevelComm<D>>) -> Result<Box<dyn Restrictor<D>>> {
        Ok(Box::new(LinearRestrictor::new(ilc, RestrictionMode::Average)))
    }

    /// Interpolator from `ilc`'s coarse domain, whose level is `coarse`, to its fine domain
    fn interpolator(&self, ilc: Arc<InterLevelComm<D>>, _coarse: &LevelParts<D>) -> Result<Box<dyn Interpolator<D>>> {
        Ok(Box::new(DirectInterpolator::new(ilc)))
    }

    /// Solver for the coarsest level; `None` smooths `coarse_sweeps` times instead
    fn coarse_solver(&self, _coarsest: &LevelParts<D>) -> Result<Option<Box<dyn CoarseSolver<D>>>> {
        Ok(None)
    }
}
