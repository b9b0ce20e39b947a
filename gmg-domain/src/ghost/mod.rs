//! Ghost cell filling
//!
//! After [`GhostFiller::fill_ghost`] returns, every ghost cell across a face that has a
//! neighbor holds the resampled values of that neighbor's interior. Ghost cells on the
//! domain boundary are left as they were; boundary conditions belong to the operator.
//!
//! Callers must refill ghosts after any change to interior values and before any stencil
//! reads neighbor data.

mod exchange;
mod strategy;

pub use exchange::ExchangeGhostFiller;
pub use strategy::{
    CopyStrategy, GhostFillStrategy, InjectionStrategy, LinearStrategy, QuadraticStrategy,
};

use crate::error::Result;
use crate::face::GhostFillingType;
use crate::vector::Vector;

/// Fills the ghost cells of a distributed field.
///
/// `fill_ghost` is collective over the domain's communicator.
pub trait GhostFiller<const D: usize>: Send + Sync {
    /// Refresh every ghost region that faces a neighbor
    fn fill_ghost(&self, u: &mut Vector<D>) -> Result<()>;

    /// Which faces (sides, edges, corners) a pass covers
    fn fill_type(&self) -> GhostFillingType;
}
