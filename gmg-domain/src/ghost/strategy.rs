//! Resampling rules used when filling ghost cells
//!
//! A [`GhostFillStrategy`] decides what a patch contributes to the ghost cells of a
//! neighbor and, for non-conforming interfaces, what a patch contributes to its own ghost
//! cells. Contributions are additive: the filler zeroes each ghost region once per pass
//! and every source adds into it.
//!
//! Coordinates are those of [`crate::view::Region`]. A slab always covers the whole ghost
//! region of the destination face, all ghost layers included, in the destination
//! patch's frame. Neighbors at the same level fill every layer; coarse and fine
//! neighbors fill the innermost layer.

use crate::error::{Error, Result};
use crate::face::{AxisPos, Face, NbrType, Orthant};
use crate::view::{Region, View, ViewMut};
use std::fmt;

/// Resampling rule for one ghost-filling pass.
pub trait GhostFillStrategy<const D: usize>: Send + Sync + fmt::Debug {
    /// Short name used in error messages
    fn name(&self) -> &'static str;

    /// Whether the rule can fill ghosts across neighbors of this type
    fn supports(&self, nbr_type: NbrType) -> bool;

    /// Reject patch layouts the rule cannot handle
    fn check_layout(&self, ns: [usize; D], num_ghost_cells: usize) -> Result<()> {
        check_normal_layout(ns, num_ghost_cells)
    }

    /// Add the contribution of `src` to the ghosts of the neighbor across `face`.
    ///
    /// `nbr_type` is the neighbor's relation to `src`. `orth` is the orthant of the
    /// coarse face covered by the fine side of the interface, for [`NbrType::Coarse`]
    /// and [`NbrType::Fine`] neighbors. `slab` covers
    /// `Region::ghost(ns, &face.opposite(), 0..W)`.
    fn fill_nbr_ghost(
        &self,
        src: &View<'_, D>,
        face: Face<D>,
        nbr_type: NbrType,
        orth: Orthant,
        ns: [usize; D],
        slab: &mut ViewMut<'_, D>,
    );

    /// Add the patch's own contribution to its ghosts across `face`.
    fn fill_local_ghost(&self, u: &mut ViewMut<'_, D>, face: Face<D>, nbr_type: NbrType, ns: [usize; D]);
}

fn check_normal_layout<const D: usize>(ns: [usize; D], num_ghost_cells: usize) -> Result<()> {
    if num_ghost_cells == 0 {
        return Err(Error::config("ghost filling needs at least one ghost layer"));
    }
    if ns.iter().any(|&n| n < num_ghost_cells) {
        return Err(Error::config(format!(
            "patches with {ns:?} cells cannot supply {num_ghost_cells} ghost layers"
        )));
    }
    Ok(())
}

fn check_refined_layout<const D: usize>(ns: [usize; D], num_ghost_cells: usize) -> Result<()> {
    check_normal_layout(ns, num_ghost_cells)?;
    if ns.iter().any(|&n| n % 2 != 0) {
        return Err(Error::config(format!(
            "coarse-fine ghost filling needs an even number of cells per axis, got {ns:?}"
        )));
    }
    Ok(())
}

/// Add `weight` times the interior of `src` next to `face` into the slab of a same-level
/// neighbor, every ghost layer.
pub(crate) fn fill_normal<const D: usize>(
    src: &View<'_, D>,
    face: Face<D>,
    ns: [usize; D],
    weight: f64,
    slab: &mut ViewMut<'_, D>,
) {
    let dest_face = face.opposite();
    slab.region().for_each(|d| {
        let mut s = d;
        for axis in 0..D {
            match dest_face.pos(axis) {
                AxisPos::Lower => s[axis] += ns[axis] as i32,
                AxisPos::Upper => s[axis] -= ns[axis] as i32,
                AxisPos::Span => {}
            }
        }
        slab.add(d, weight * src.get(s));
    });
}

/// Coarse cell under fine cell `fine`, seen from a fine patch whose coarse neighbor lies
/// across `fine_face` and which covers orthant `orth` of the coarse face.
///
/// With `ghost` the result is the coarse patch's ghost cell next to the interface,
/// otherwise its boundary interior cell.
fn coarse_cell<const D: usize>(
    ns: [usize; D],
    fine_face: &Face<D>,
    orth: Orthant,
    fine: [i32; D],
    ghost: bool,
) -> [i32; D] {
    let mut coarse = fine;
    let mut free = 0;
    for axis in 0..D {
        let n = ns[axis] as i32;
        coarse[axis] = match (fine_face.pos(axis), ghost) {
            (AxisPos::Lower, true) => n,
            (AxisPos::Lower, false) => n - 1,
            (AxisPos::Upper, true) => -1,
            (AxisPos::Upper, false) => 0,
            (AxisPos::Span, _) => {
                let c = (fine[axis] + orth.offset(free, ns[axis])) / 2;
                free += 1;
                c
            }
        };
    }
    coarse
}

/// Fine boundary cells next to `face` of `src`, added with `weight` into the coarse
/// neighbor's innermost ghost layer.
pub(crate) fn fill_coarse_nbr<const D: usize>(
    src: &View<'_, D>,
    face: Face<D>,
    orth: Orthant,
    ns: [usize; D],
    weight: f64,
    slab: &mut ViewMut<'_, D>,
) {
    Region::slice(ns, &face, 0..1).for_each(|s| {
        let d = coarse_cell(ns, &face, orth, s, true);
        slab.add(d, weight * src.get(s));
    });
}

/// Coarse boundary cells next to `face` of `src`, added with `weight` into the innermost
/// ghost layer of the fine neighbor covering orthant `orth`.
pub(crate) fn fill_fine_nbr<const D: usize>(
    src: &View<'_, D>,
    face: Face<D>,
    orth: Orthant,
    ns: [usize; D],
    weight: f64,
    slab: &mut ViewMut<'_, D>,
) {
    let fine_face = face.opposite();
    Region::ghost(ns, &fine_face, 0..1).for_each(|d| {
        let s = coarse_cell(ns, &fine_face, orth, d, false);
        slab.add(d, weight * src.get(s));
    });
}

/// Interior cell of a patch next to ghost cell `ghost` across `face`
fn adjacent_interior<const D: usize>(ns: [usize; D], face: &Face<D>, ghost: [i32; D]) -> [i32; D] {
    let mut cell = ghost;
    for axis in 0..D {
        match face.pos(axis) {
            AxisPos::Lower => cell[axis] = 0,
            AxisPos::Upper => cell[axis] = ns[axis] as i32 - 1,
            AxisPos::Span => {}
        }
    }
    cell
}

/// Same-level neighbors only; ghosts are exact copies.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyStrategy;

impl<const D: usize> GhostFillStrategy<D> for CopyStrategy {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn supports(&self, nbr_type: NbrType) -> bool {
        nbr_type == NbrType::Normal
    }

    fn fill_nbr_ghost(
        &self,
        src: &View<'_, D>,
        face: Face<D>,
        _nbr_type: NbrType,
        _orth: Orthant,
        ns: [usize; D],
        slab: &mut ViewMut<'_, D>,
    ) {
        fill_normal(src, face, ns, 1.0, slab);
    }

    fn fill_local_ghost(&self, _u: &mut ViewMut<'_, D>, _face: Face<D>, _nbr_type: NbrType, _ns: [usize; D]) {}
}

/// Zeroth-order coarse-fine rule: coarse ghosts average the fine cells they cover, fine
/// ghosts duplicate the coarse cell they lie in.
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectionStrategy;

impl<const D: usize> GhostFillStrategy<D> for InjectionStrategy {
    fn name(&self) -> &'static str {
        "injection"
    }

    fn supports(&self, _nbr_type: NbrType) -> bool {
        true
    }

    fn check_layout(&self, ns: [usize; D], num_ghost_cells: usize) -> Result<()> {
        check_refined_layout(ns, num_ghost_cells)
    }

    fn fill_nbr_ghost(
        &self,
        src: &View<'_, D>,
        face: Face<D>,
        nbr_type: NbrType,
        orth: Orthant,
        ns: [usize; D],
        slab: &mut ViewMut<'_, D>,
    ) {
        match nbr_type {
            NbrType::Normal => fill_normal(src, face, ns, 1.0, slab),
            NbrType::Coarse => {
                let weight = 1.0 / Orthant::num_orthants(face.free_axes().len()) as f64;
                fill_coarse_nbr(src, face, orth, ns, weight, slab);
            }
            NbrType::Fine => fill_fine_nbr(src, face, orth, ns, 1.0, slab),
        }
    }

    fn fill_local_ghost(&self, _u: &mut ViewMut<'_, D>, _face: Face<D>, _nbr_type: NbrType, _ns: [usize; D]) {}
}

/// Second-order coarse-fine rule (bilinear in 2D, trilinear in 3D).
///
/// Reproduces linear fields exactly across sides, edges and corners. With `m` free axes
/// on the shared face and `n = 2^m` fine cells per coarse cell:
///
/// - coarse ghost: `4/(3n)` times each covered fine cell, minus `1/3` of the coarse
///   interior cell next to it;
/// - fine ghost: `2/3` of the coarse cell it lies in, plus `1/3 + 2(n-1)/(3n)` of the fine
///   interior cell next to it, minus `2/(3n)` of each other fine cell in the same block.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearStrategy;

impl<const D: usize> GhostFillStrategy<D> for LinearStrategy {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn supports(&self, _nbr_type: NbrType) -> bool {
        true
    }

    fn check_layout(&self, ns: [usize; D], num_ghost_cells: usize) -> Result<()> {
        check_refined_layout(ns, num_ghost_cells)
    }

    fn fill_nbr_ghost(
        &self,
        src: &View<'_, D>,
        face: Face<D>,
        nbr_type: NbrType,
        orth: Orthant,
        ns: [usize; D],
        slab: &mut ViewMut<'_, D>,
    ) {
        let n = Orthant::num_orthants(face.free_axes().len()) as f64;
        match nbr_type {
            NbrType::Normal => fill_normal(src, face, ns, 1.0, slab),
            NbrType::Coarse => fill_coarse_nbr(src, face, orth, ns, 4.0 / (3.0 * n), slab),
            NbrType::Fine => fill_fine_nbr(src, face, orth, ns, 2.0 / 3.0, slab),
        }
    }

    fn fill_local_ghost(&self, u: &mut ViewMut<'_, D>, face: Face<D>, nbr_type: NbrType, ns: [usize; D]) {
        let free = face.free_axes();
        let block = Orthant::num_orthants(free.len());
        let n = block as f64;
        let ghosts = Region::ghost(ns, &face, 0..1);
        match nbr_type {
            NbrType::Normal => {}
            NbrType::Fine => ghosts.for_each(|g| {
                let own = u.get(adjacent_interior(ns, &face, g));
                u.add(g, -own / 3.0);
            }),
            NbrType::Coarse => ghosts.for_each(|g| {
                let own = adjacent_interior(ns, &face, g);
                let mut sum = (1.0 / 3.0 + 2.0 * (n - 1.0) / (3.0 * n)) * u.get(own);
                for flip in 1..block {
                    let mut sibling = own;
                    for (j, &axis) in free.iter().enumerate() {
                        if flip & (1 << j) != 0 {
                            sibling[axis] ^= 1;
                        }
                    }
                    sum -= 2.0 / (3.0 * n) * u.get(sibling);
                }
                u.add(g, sum);
            }),
        }
    }
}

/// Cell `depth` layers inward from boundary cell `cell` next to `face`
fn inward<const D: usize>(face: &Face<D>, cell: [i32; D], depth: i32) -> [i32; D] {
    let mut c = cell;
    for axis in 0..D {
        match face.pos(axis) {
            AxisPos::Lower => c[axis] += depth,
            AxisPos::Upper => c[axis] -= depth,
            AxisPos::Span => {}
        }
    }
    c
}

/// Coarse boundary cells, by tangential index, feeding fine ghost `f` of the `2n` fine
/// ghosts along a coarse side of `n` cells
fn quadratic_fine_weights(f: i32, n: i32) -> [(i32, f64); 3] {
    let k = f / 2;
    match f {
        0 => [(0, 3.0 / 4.0), (1, -3.0 / 10.0), (2, 1.0 / 12.0)],
        1 => [(0, 7.0 / 20.0), (1, 7.0 / 30.0), (2, -1.0 / 20.0)],
        f if f == 2 * n - 2 => [(n - 1, 7.0 / 20.0), (n - 2, 7.0 / 30.0), (n - 3, -1.0 / 20.0)],
        f if f == 2 * n - 1 => [(n - 1, 3.0 / 4.0), (n - 2, -3.0 / 10.0), (n - 3, 1.0 / 12.0)],
        f if f % 2 == 0 => [(k - 1, 1.0 / 12.0), (k, 1.0 / 2.0), (k + 1, -1.0 / 20.0)],
        _ => [(k - 1, -1.0 / 20.0), (k, 1.0 / 2.0), (k + 1, 1.0 / 12.0)],
    }
}

/// Coarse boundary cells, by tangential index, the coarse patch adds to its own ghost `i`
/// next to fine neighbors
fn quadratic_coarse_weights(i: i32, n: i32) -> [(i32, f64); 3] {
    match i {
        0 => [(0, -1.0 / 10.0), (1, 1.0 / 15.0), (2, -1.0 / 30.0)],
        i if i == n - 1 => [(n - 1, -1.0 / 10.0), (n - 2, 1.0 / 15.0), (n - 3, -1.0 / 30.0)],
        i => [(i - 1, -1.0 / 30.0), (i, 0.0), (i + 1, -1.0 / 30.0)],
    }
}

/// Third-order coarse-fine rule for 2D patches (biquadratic).
///
/// Reproduces quadratic fields exactly across sides. Ghosts combine the two interior
/// layers normal to the interface; coarse values also enter through a three-cell stencil
/// along the side. Corners use the diagonal cells only.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadraticStrategy;

impl GhostFillStrategy<2> for QuadraticStrategy {
    fn name(&self) -> &'static str {
        "quadratic"
    }

    fn supports(&self, _nbr_type: NbrType) -> bool {
        true
    }

    fn check_layout(&self, ns: [usize; 2], num_ghost_cells: usize) -> Result<()> {
        check_refined_layout(ns, num_ghost_cells)?;
        if ns.iter().any(|&n| n < 4) {
            return Err(Error::config(format!(
                "quadratic ghost filling needs at least 4 cells per axis, got {ns:?}"
            )));
        }
        Ok(())
    }

    fn fill_nbr_ghost(
        &self,
        src: &View<'_, 2>,
        face: Face<2>,
        nbr_type: NbrType,
        orth: Orthant,
        ns: [usize; 2],
        slab: &mut ViewMut<'_, 2>,
    ) {
        match nbr_type {
            NbrType::Normal => fill_normal(src, face, ns, 1.0, slab),
            NbrType::Coarse => {
                let (w0, w1) = if face.codimension() == 1 {
                    (1.0 / 3.0, 1.0 / 5.0)
                } else {
                    (2.0 / 3.0, 2.0 / 5.0)
                };
                Region::slice(ns, &face, 0..1).for_each(|s| {
                    let d = coarse_cell(ns, &face, orth, s, true);
                    slab.add(d, w0 * src.get(s) + w1 * src.get(inward(&face, s, 1)));
                });
            }
            NbrType::Fine => {
                let fine_face = face.opposite();
                let ghosts = Region::ghost(ns, &fine_face, 0..1);
                match fine_face.free_axes().first() {
                    None => ghosts.for_each(|d| {
                        let s = coarse_cell(ns, &fine_face, orth, d, false);
                        slab.add(d, 8.0 / 15.0 * src.get(s));
                    }),
                    Some(&t) => {
                        let n = ns[t] as i32;
                        ghosts.for_each(|d| {
                            let f = d[t] + orth.offset(0, ns[t]);
                            let mut s = coarse_cell(ns, &fine_face, orth, d, false);
                            let mut sum = 0.0;
                            for (k, w) in quadratic_fine_weights(f, n) {
                                s[t] = k;
                                sum += w * src.get(s);
                            }
                            slab.add(d, sum);
                        });
                    }
                }
            }
        }
    }

    fn fill_local_ghost(&self, u: &mut ViewMut<'_, 2>, face: Face<2>, nbr_type: NbrType, ns: [usize; 2]) {
        let ghosts = Region::ghost(ns, &face, 0..1);
        match nbr_type {
            NbrType::Normal => {}
            NbrType::Coarse => ghosts.for_each(|g| {
                let own = adjacent_interior(ns, &face, g);
                let value = 2.0 / 3.0 * u.get(own) - u.get(inward(&face, own, 1)) / 5.0;
                u.add(g, value);
            }),
            NbrType::Fine => match face.free_axes().first() {
                None => ghosts.for_each(|g| {
                    let own = u.get(adjacent_interior(ns, &face, g));
                    u.add(g, -own / 15.0);
                }),
                Some(&t) => {
                    let n = ns[t] as i32;
                    ghosts.for_each(|g| {
                        let mut own = adjacent_interior(ns, &face, g);
                        let mut sum = 0.0;
                        for (k, w) in quadratic_coarse_weights(g[t], n) {
                            own[t] = k;
                            sum += w * u.get(own);
                        }
                        u.add(g, sum);
                    });
                }
            },
        }
    }
}
