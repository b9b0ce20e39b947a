//! Fine-to-coarse transfer
//!
//! Each coarse cell receives the average (or the sum) of the `2^D` fine cells it covers.
//! Fine patches whose parent lives on another rank are restricted into a ghost parent,
//! which is then added into the owner's patch.

use crate::interlevel::InterLevelComm;
use domain::{Error, Orthant, Region, Result, Vector, View, ViewMut};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Restriction of a fine-level field onto the next coarser level
pub trait Restrictor<const D: usize>: Send + Sync {
    /// Restrict `fine` into a new coarse vector (collective)
    fn restrict(&self, fine: &Vector<D>) -> Result<Vector<D>>;
}

/// How fine values combine into a coarse cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionMode {
    /// Mean of the covered fine cells
    #[default]
    Average,
    /// Sum of the covered fine cells
    Sum,
}

impl RestrictionMode {
    fn weight(self, dim: usize) -> f64 {
        match self {
            RestrictionMode::Average => 1.0 / (1usize << dim) as f64,
            RestrictionMode::Sum => 1.0,
        }
    }
}

/// Offset of the orthant on each axis, in fine-cell units
pub(crate) fn orthant_starts<const D: usize>(orth: Orthant, ns: [usize; D]) -> [i32; D] {
    let mut starts = [0; D];
    for (axis, start) in starts.iter_mut().enumerate() {
        if orth.is_upper_on_axis(axis) {
            *start = ns[axis] as i32;
        }
    }
    starts
}

/// Add the restriction of one fine patch into its parent.
///
/// `orth` is the fine patch's orthant on the parent, or `None` for a same-size parent.
pub(crate) fn restrict_patch<const D: usize>(
    fine: &View<'_, D>,
    coarse: &mut ViewMut<'_, D>,
    orth: Option<Orthant>,
    ns: [usize; D],
    weight: f64,
) {
    let interior = Region::interior(ns);
    match orth {
        None => interior.for_each(|c| coarse.add(c, fine.get(c))),
        Some(orth) => {
            let starts = orthant_starts(orth, ns);
            interior.for_each(|c| {
                let mut cc = [0; D];
                for axis in 0..D {
                    cc[axis] = (c[axis] + starts[axis]) / 2;
                }
                coarse.add(cc, weight * fine.get(c));
            });
        }
    }
}

/// Cell-centered restriction between two adjacent levels
#[derive(Debug, Clone)]
pub struct LinearRestrictor<const D: usize> {
    ilc: Arc<InterLevelComm<D>>,
    mode: RestrictionMode,
}

impl<const D: usize> LinearRestrictor<D> {
    /// Restrictor over the schedule `ilc`
    pub fn new(ilc: Arc<InterLevelComm<D>>, mode: RestrictionMode) -> Self {
        Self { ilc, mode }
    }

    pub fn mode(&self) -> RestrictionMode {
        self.mode
    }
}

impl<const D: usize> Restrictor<D> for LinearRestrictor<D> {
    fn restrict(&self, fine: &Vector<D>) -> Result<Vector<D>> {
        let fine_domain = self.ilc.fine_domain();
        if fine.num_local_patches() != fine_domain.num_local_patches() {
            return Err(Error::Dimension {
                expected: fine_domain.num_local_patches(),
                got: fine.num_local_patches(),
            });
        }
        let ns = fine_domain.ns();
        let weight = self.mode.weight(D);
        let mut coarse = Vector::new(self.ilc.coarse_domain());

        let mut ghost = self.ilc.ghost_vector()?;
        ghost.set_with_ghost(0.0);
        for &(g, f) in self.ilc.patches_with_ghost_parent() {
            let orth = fine_domain.patch_info(f).orth_on_parent;
            restrict_patch(&fine.patch_view(f), &mut ghost.patch_view_mut(g), orth, ns, weight);
        }
        let pending = self.ilc.send_ghost_patches_start(&ghost)?;

        for &(c, f) in self.ilc.patches_with_local_parent() {
            let orth = fine_domain.patch_info(f).orth_on_parent;
            restrict_patch(&fine.patch_view(f), &mut coarse.patch_view_mut(c), orth, ns, weight);
        }

        self.ilc.send_ghost_patches_finish(&mut coarse, pending)?;
        Ok(coarse)
    }
}
