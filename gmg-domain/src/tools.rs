//! Helpers for filling and measuring fields from cell coordinates

use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::vector::Vector;

fn check_patch_count<const D: usize>(domain: &Domain<D>, u: &Vector<D>) -> Result<()> {
    if domain.num_local_patches() != u.num_local_patches() || domain.layout() != u.layout() {
        return Err(Error::Dimension {
            expected: domain.num_local_patches() * domain.layout().patch_stride(),
            got: u.num_local_patches() * u.layout().patch_stride(),
        });
    }
    Ok(())
}

/// Set every interior cell of `u` to `f(cell center)`
pub fn set_values<const D: usize, F>(domain: &Domain<D>, u: &mut Vector<D>, f: F) -> Result<()>
where
    F: Fn([f64; D]) -> f64,
{
    check_patch_count(domain, u)?;
    let interior = domain.layout().interior();
    for (i, pinfo) in domain.patch_infos().iter().enumerate() {
        let mut view = u.patch_view_mut(i);
        interior.for_each(|c| view.set(c, f(pinfo.cell_center(c))));
    }
    Ok(())
}

/// Set every cell of `u`, ghosts included, to `f(cell center)`
pub fn set_values_with_ghost<const D: usize, F>(
    domain: &Domain<D>,
    u: &mut Vector<D>,
    f: F,
) -> Result<()>
where
    F: Fn([f64; D]) -> f64,
{
    check_patch_count(domain, u)?;
    let all = domain.layout().with_ghosts();
    for (i, pinfo) in domain.patch_infos().iter().enumerate() {
        let mut view = u.patch_view_mut(i);
        all.for_each(|c| view.set(c, f(pinfo.cell_center(c))));
    }
    Ok(())
}

/// Midpoint-rule integral of `u` over the domain (collective)
pub fn integrate<const D: usize>(domain: &Domain<D>, u: &Vector<D>) -> Result<f64> {
    check_patch_count(domain, u)?;
    let interior = domain.layout().interior();
    let mut local = 0.0;
    for (i, pinfo) in domain.patch_infos().iter().enumerate() {
        let view = u.patch_view(i);
        let mut sum = 0.0;
        interior.for_each(|c| sum += view.get(c));
        local += sum * pinfo.cell_volume();
    }
    Ok(domain.comm().all_reduce_sum(local)?)
}
