//! Coarse-to-fine transfer
//!
//! Interpolation adds a coarse correction into a fine field. Coarse patches with
//! children on other ranks are shipped there first, ghosts included, so that every
//! fine patch can read its whole parent locally.

use crate::interlevel::InterLevelComm;
use crate::restrictor::orthant_starts;
use domain::{Error, Face, GhostFiller, Orthant, PatchInfo, Region, Result, Vector, View, ViewMut};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Interpolation of a coarse correction onto the next finer level
pub trait Interpolator<const D: usize>: Send + Sync {
    /// Add the interpolation of `coarse` into `fine` (collective)
    fn interpolate(&self, coarse: &Vector<D>, fine: &mut Vector<D>) -> Result<()>;
}

/// Available interpolation rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolatorType {
    /// Piecewise constant
    Direct,
    /// Piecewise linear, from central slopes
    #[default]
    Linear,
}

/// Run `kernel(fine pinfo, parent, child)` for every fine patch against its parent
fn for_each_parent<const D: usize, K>(
    ilc: &InterLevelComm<D>,
    coarse: &Vector<D>,
    fine: &mut Vector<D>,
    kernel: K,
) -> Result<()>
where
    K: Fn(&PatchInfo<D>, &View<'_, D>, &mut ViewMut<'_, D>),
{
    let coarse_domain = ilc.coarse_domain();
    let fine_domain = ilc.fine_domain();
    if coarse.num_local_patches() != coarse_domain.num_local_patches() {
        return Err(Error::Dimension {
            expected: coarse_domain.num_local_patches(),
            got: coarse.num_local_patches(),
        });
    }
    if fine.num_local_patches() != fine_domain.num_local_patches() {
        return Err(Error::Dimension {
            expected: fine_domain.num_local_patches(),
            got: fine.num_local_patches(),
        });
    }

    let mut ghost = ilc.ghost_vector()?;
    let pending = ilc.get_ghost_patches_start(coarse)?;
    for &(c, f) in ilc.patches_with_local_parent() {
        kernel(
            fine_domain.patch_info(f),
            &coarse.patch_view(c),
            &mut fine.patch_view_mut(f),
        );
    }
    ilc.get_ghost_patches_finish(&mut ghost, pending)?;
    for &(g, f) in ilc.patches_with_ghost_parent() {
        kernel(
            fine_domain.patch_info(f),
            &ghost.patch_view(g),
            &mut fine.patch_view_mut(f),
        );
    }
    Ok(())
}

/// Add `parent` cell by cell into a same-size child
fn add_same_size<const D: usize>(ns: [usize; D], parent: &View<'_, D>, child: &mut ViewMut<'_, D>) {
    Region::interior(ns).for_each(|c| child.add(c, parent.get(c)));
}

/// Injects each coarse value into the `2^D` fine cells it covers
#[derive(Debug, Clone)]
pub struct DirectInterpolator<const D: usize> {
    ilc: Arc<InterLevelComm<D>>,
}

impl<const D: usize> DirectInterpolator<D> {
    pub fn new(ilc: Arc<InterLevelComm<D>>) -> Self {
        Self { ilc }
    }
}

pub(crate) fn interpolate_direct<const D: usize>(
    ns: [usize; D],
    orth: Option<Orthant>,
    parent: &View<'_, D>,
    child: &mut ViewMut<'_, D>,
) {
    let Some(orth) = orth else {
        add_same_size(ns, parent, child);
        return;
    };
    let starts = orthant_starts(orth, ns);
    Region::interior(ns).for_each(|c| {
        let mut cc = [0; D];
        for axis in 0..D {
            cc[axis] = (c[axis] + starts[axis]) / 2;
        }
        child.add(c, parent.get(cc));
    });
}

impl<const D: usize> Interpolator<D> for DirectInterpolator<D> {
    fn interpolate(&self, coarse: &Vector<D>, fine: &mut Vector<D>) -> Result<()> {
        let ns = self.ilc.fine_domain().ns();
        for_each_parent(&self.ilc, coarse, fine, |pinfo, parent, child| {
            interpolate_direct(ns, pinfo.orth_on_parent, parent, child)
        })
    }
}

/// Reconstructs a linear profile in each coarse cell before sampling it.
///
/// Slopes are central differences of the coarse cell and its face neighbors, with the
/// coarse ghosts filled by `coarse_ghost_filler`. On the domain boundary the slope is
/// one-sided. Linear fields are reproduced exactly.
pub struct LinearInterpolator<const D: usize> {
    ilc: Arc<InterLevelComm<D>>,
    coarse_ghost_filler: Arc<dyn GhostFiller<D>>,
    /// coarse correction with its ghosts filled
    scratch: Mutex<Vector<D>>,
}

impl<const D: usize> LinearInterpolator<D> {
    /// Fails when the coarse patches carry no ghost layer to read neighbors from
    pub fn new(ilc: Arc<InterLevelComm<D>>, coarse_ghost_filler: Arc<dyn GhostFiller<D>>) -> Result<Self> {
        if ilc.coarse_domain().num_ghost_cells() == 0 {
            return Err(Error::config(
                "linear interpolation needs at least one ghost layer on the coarse level",
            ));
        }
        let scratch = Mutex::new(Vector::new(ilc.coarse_domain()));
        Ok(Self {
            ilc,
            coarse_ghost_filler,
            scratch,
        })
    }
}

/// Slope of the coarse field along `axis` at `cc`, in units of one coarse cell
fn slope<const D: usize>(
    parent: &View<'_, D>,
    cc: [i32; D],
    axis: usize,
    has_lower: bool,
    has_upper: bool,
) -> f64 {
    let center = parent.get(cc);
    let mut lo = cc;
    lo[axis] -= 1;
    let mut hi = cc;
    hi[axis] += 1;
    match (has_lower, has_upper) {
        (true, true) => (parent.get(hi) - parent.get(lo)) / 2.0,
        (true, false) => center - parent.get(lo),
        (false, true) => parent.get(hi) - center,
        (false, false) => 0.0,
    }
}

pub(crate) fn interpolate_linear<const D: usize>(
    pinfo: &PatchInfo<D>,
    parent: &View<'_, D>,
    child: &mut ViewMut<'_, D>,
) {
    let ns = pinfo.ns;
    let Some(orth) = pinfo.orth_on_parent else {
        add_same_size(ns, parent, child);
        return;
    };
    // a coarse cell on the parent's edge has a neighbor only where the child does
    let mut open = [[true; 2]; D];
    for (axis, sides) in open.iter_mut().enumerate() {
        sides[0] = pinfo.has_nbr(Face::side(axis, false));
        sides[1] = pinfo.has_nbr(Face::side(axis, true));
    }
    let starts = orthant_starts(orth, ns);
    Region::interior(ns).for_each(|c| {
        let mut cc = [0; D];
        for axis in 0..D {
            cc[axis] = (c[axis] + starts[axis]) / 2;
        }
        let mut value = parent.get(cc);
        for axis in 0..D {
            let has_lower = cc[axis] > 0 || open[axis][0];
            let has_upper = cc[axis] < ns[axis] as i32 - 1 || open[axis][1];
            let sign = if (c[axis] + starts[axis]) % 2 == 0 { -1.0 } else { 1.0 };
            value += sign * slope(parent, cc, axis, has_lower, has_upper) / 4.0;
        }
        child.add(c, value);
    });
}

impl<const D: usize> Interpolator<D> for LinearInterpolator<D> {
    fn interpolate(&self, coarse: &Vector<D>, fine: &mut Vector<D>) -> Result<()> {
        let mut scratch = self.scratch.lock().map_err(|_| {
            Error::protocol(
                self.ilc.coarse_domain().id(),
                None,
                "interpolation scratch was left inconsistent by a failed transfer",
            )
        })?;
        scratch.copy_from(coarse)?;
        self.coarse_ghost_filler.fill_ghost(&mut scratch)?;
        for_each_parent(&self.ilc, &scratch, fine, interpolate_linear)
    }
}

/// Build an interpolator of the given type over `ilc`
pub fn make_interpolator<const D: usize>(
    kind: InterpolatorType,
    ilc: Arc<InterLevelComm<D>>,
    coarse_ghost_filler: Arc<dyn GhostFiller<D>>,
) -> Result<Box<dyn Interpolator<D>>> {
    Ok(match kind {
        InterpolatorType::Direct => Box::new(DirectInterpolator::new(ilc)),
        InterpolatorType::Linear => Box::new(LinearInterpolator::new(ilc, coarse_ghost_filler)?),
    })
}
