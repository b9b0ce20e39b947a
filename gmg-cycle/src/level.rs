//! One level of a multigrid hierarchy

use crate::coarse::CoarseSolver;
use crate::interpolator::Interpolator;
use crate::restrictor::Restrictor;
use crate::smoother::Smoother;
use domain::{Domain, Error, GhostFiller, LinearOperator, Result, Vector};
use std::fmt;
use std::sync::Arc;

/// Operators of one level. Level 0 is the finest.
///
/// The restrictor maps this level to the next coarser one; the interpolator maps this
/// level back to the next finer one. Only the coarsest level has a coarse solver.
/// Levels built from domains also keep the domain and ghost filler they came from.
pub struct Level<const D: usize> {
    pub(crate) index: usize,
    pub(crate) operator: Arc<dyn LinearOperator<D>>,
    pub(crate) smoother: Arc<dyn Smoother<D>>,
    pub(crate) restrictor: Option<Box<dyn Restrictor<D>>>,
    pub(crate) interpolator: Option<Box<dyn Interpolator<D>>>,
    pub(crate) coarse_solver: Option<Box<dyn CoarseSolver<D>>>,
    pub(crate) domain: Option<Arc<Domain<D>>>,
    pub(crate) ghost_filler: Option<Arc<dyn GhostFiller<D>>>,
}

impl<const D: usize> Level<D> {
    /// Position in the hierarchy, 0 being the finest
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn operator(&self) -> &Arc<dyn LinearOperator<D>> {
        &self.operator
    }

    pub fn smoother(&self) -> &Arc<dyn Smoother<D>> {
        &self.smoother
    }

    /// Domain of the level; `None` for levels added by hand
    pub fn domain(&self) -> Option<&Arc<Domain<D>>> {
        self.domain.as_ref()
    }

    pub fn ghost_filler(&self) -> Option<&Arc<dyn GhostFiller<D>>> {
        self.ghost_filler.as_ref()
    }

    pub fn is_finest(&self) -> bool {
        self.interpolator.is_none()
    }

    pub fn is_coarsest(&self) -> bool {
        self.restrictor.is_none()
    }

    pub(crate) fn restrictor(&self) -> Result<&dyn Restrictor<D>> {
        self.restrictor
            .as_deref()
            .ok_or_else(|| Error::config("the coarsest level has no restrictor").at_level(self.index))
    }

    pub(crate) fn interpolator(&self) -> Result<&dyn Interpolator<D>> {
        self.interpolator
            .as_deref()
            .ok_or_else(|| Error::config("the finest level has no interpolator").at_level(self.index))
    }

    /// Solve on the coarsest level, falling back to `sweeps` smoother applications
    pub(crate) fn coarse_solve(&self, f: &Vector<D>, u: &mut Vector<D>, sweeps: usize) -> Result<()> {
        match &self.coarse_solver {
            Some(solver) => solver.solve(f, u),
            None => {
                for _ in 0..sweeps {
                    self.smoother.smooth(f, u)?;
                }
                Ok(())
            }
        }
    }
}

impl<const D: usize> fmt::Debug for Level<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Level")
            .field("index", &self.index)
            .field("domain", &self.domain.as_ref().map(|d| d.id()))
            .field("restrictor", &self.restrictor.is_some())
            .field("interpolator", &self.interpolator.is_some())
            .field("coarse_solver", &self.coarse_solver.is_some())
            .finish()
    }
}
