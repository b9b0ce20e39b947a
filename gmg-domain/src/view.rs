//! Windows over patch data
//!
//! Patch data is stored axis-0 fastest. Coordinates are signed so that ghost cells can be
//! addressed directly: with `W` ghost layers and `n` cells along an axis, the interior is
//! `0..n` and the ghosts are `-W..0` and `n..n + W`.

use crate::face::{AxisPos, Face};
use std::ops::Range;

/// Half-open box of cell coordinates `lo..hi`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region<const D: usize> {
    /// Inclusive lower corner
    pub lo: [i32; D],
    /// Exclusive upper corner
    pub hi: [i32; D],
}

impl<const D: usize> Region<D> {
    /// Box `lo..hi`
    pub fn new(lo: [i32; D], hi: [i32; D]) -> Self {
        Self { lo, hi }
    }

    /// Interior cells of a patch with `ns` cells
    pub fn interior(ns: [usize; D]) -> Self {
        Self {
            lo: [0; D],
            hi: ns.map(|n| n as i32),
        }
    }

    /// Interior plus `num_ghost_cells` layers on every side
    pub fn with_ghosts(ns: [usize; D], num_ghost_cells: usize) -> Self {
        let w = num_ghost_cells as i32;
        Self {
            lo: [-w; D],
            hi: ns.map(|n| n as i32 + w),
        }
    }

    /// Ghost cells across `face`, ghost layers `layers` counted outward from the patch
    pub fn ghost(ns: [usize; D], face: &Face<D>, layers: Range<usize>) -> Self {
        let mut region = Self::interior(ns);
        for axis in 0..D {
            let n = ns[axis] as i32;
            let (start, end) = (layers.start as i32, layers.end as i32);
            match face.pos(axis) {
                AxisPos::Lower => {
                    region.lo[axis] = -end;
                    region.hi[axis] = -start;
                }
                AxisPos::Upper => {
                    region.lo[axis] = n + start;
                    region.hi[axis] = n + end;
                }
                AxisPos::Span => {}
            }
        }
        region
    }

    /// Interior cells next to `face`, layers `layers` counted inward from the boundary
    pub fn slice(ns: [usize; D], face: &Face<D>, layers: Range<usize>) -> Self {
        let mut region = Self::interior(ns);
        for axis in 0..D {
            let n = ns[axis] as i32;
            let (start, end) = (layers.start as i32, layers.end as i32);
            match face.pos(axis) {
                AxisPos::Lower => {
                    region.lo[axis] = start;
                    region.hi[axis] = end;
                }
                AxisPos::Upper => {
                    region.lo[axis] = n - end;
                    region.hi[axis] = n - start;
                }
                AxisPos::Span => {}
            }
        }
        region
    }

    /// Extent along each axis
    pub fn shape(&self) -> [usize; D] {
        let mut shape = [0; D];
        for axis in 0..D {
            shape[axis] = (self.hi[axis] - self.lo[axis]).max(0) as usize;
        }
        shape
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    /// Whether the box holds no cells
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `coord` lies inside the box
    pub fn contains(&self, coord: [i32; D]) -> bool {
        (0..D).all(|axis| coord[axis] >= self.lo[axis] && coord[axis] < self.hi[axis])
    }

    /// Visit every coordinate, axis 0 fastest
    pub fn for_each(&self, mut f: impl FnMut([i32; D])) {
        if self.is_empty() {
            return;
        }
        let mut coord = self.lo;
        loop {
            f(coord);
            let mut axis = 0;
            loop {
                if axis == D {
                    return;
                }
                coord[axis] += 1;
                if coord[axis] < self.hi[axis] {
                    break;
                }
                coord[axis] = self.lo[axis];
                axis += 1;
            }
        }
    }

    fn strides(&self) -> [usize; D] {
        let shape = self.shape();
        let mut strides = [1; D];
        for axis in 1..D {
            strides[axis] = strides[axis - 1] * shape[axis - 1];
        }
        strides
    }
}

#[inline]
fn offset<const D: usize>(region: &Region<D>, strides: &[usize; D], coord: [i32; D]) -> usize {
    debug_assert!(region.contains(coord), "{coord:?} outside {region:?}");
    let mut idx = 0;
    for axis in 0..D {
        idx += (coord[axis] - region.lo[axis]) as usize * strides[axis];
    }
    idx
}

/// Read-only window over a box of cells
#[derive(Debug, Clone, Copy)]
pub struct View<'a, const D: usize> {
    data: &'a [f64],
    region: Region<D>,
    strides: [usize; D],
}

impl<'a, const D: usize> View<'a, D> {
    /// Window over `data`, which holds exactly the cells of `region`
    pub fn new(data: &'a [f64], region: Region<D>) -> Self {
        debug_assert_eq!(data.len(), region.len());
        Self {
            data,
            strides: region.strides(),
            region,
        }
    }

    /// The box this view covers
    pub fn region(&self) -> Region<D> {
        self.region
    }

    /// Value at `coord`
    #[inline]
    pub fn get(&self, coord: [i32; D]) -> f64 {
        self.data[offset(&self.region, &self.strides, coord)]
    }

    /// Underlying storage
    pub fn as_slice(&self) -> &'a [f64] {
        self.data
    }
}

/// Mutable window over a box of cells
#[derive(Debug)]
pub struct ViewMut<'a, const D: usize> {
    data: &'a mut [f64],
    region: Region<D>,
    strides: [usize; D],
}

impl<'a, const D: usize> ViewMut<'a, D> {
    /// Window over `data`, which holds exactly the cells of `region`
    pub fn new(data: &'a mut [f64], region: Region<D>) -> Self {
        debug_assert_eq!(data.len(), region.len());
        Self {
            data,
            strides: region.strides(),
            region,
        }
    }

    /// The box this view covers
    pub fn region(&self) -> Region<D> {
        self.region
    }

    /// Value at `coord`
    #[inline]
    pub fn get(&self, coord: [i32; D]) -> f64 {
        self.data[offset(&self.region, &self.strides, coord)]
    }

    /// Overwrite the value at `coord`
    #[inline]
    pub fn set(&mut self, coord: [i32; D], value: f64) {
        let idx = offset(&self.region, &self.strides, coord);
        self.data[idx] = value;
    }

    /// Add to the value at `coord`
    #[inline]
    pub fn add(&mut self, coord: [i32; D], value: f64) {
        let idx = offset(&self.region, &self.strides, coord);
        self.data[idx] += value;
    }

    /// Set every cell of `region` to `value`
    pub fn fill_region(&mut self, region: &Region<D>, value: f64) {
        region.for_each(|c| self.set(c, value));
    }

    /// Add `other` (a window over a sub-box) into the matching cells
    pub fn add_view(&mut self, other: &View<'_, D>) {
        let region = other.region();
        region.for_each(|c| self.add(c, other.get(c)));
    }

    /// Borrow as a read-only view
    pub fn as_view(&self) -> View<'_, D> {
        View {
            data: &*self.data,
            region: self.region,
            strides: self.strides,
        }
    }

    /// Underlying storage
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ghost_and_slice_regions() {
        let ns = [4, 3];
        let east = Face::<2>::side(0, true);
        let ghost = Region::ghost(ns, &east, 0..2);
        assert_eq!(ghost, Region::new([4, 0], [6, 3]));
        let slice = Region::slice(ns, &east, 0..1);
        assert_eq!(slice, Region::new([3, 0], [4, 3]));

        let south = Face::<2>::side(1, false);
        assert_eq!(Region::ghost(ns, &south, 0..1), Region::new([0, -1], [4, 0]));
        assert_eq!(Region::slice(ns, &south, 1..2), Region::new([0, 1], [4, 2]));

        let corner = east.opposite();
        let corner = Face::<2>::new([corner.pos(0), AxisPos::Upper]).unwrap();
        assert_eq!(Region::ghost(ns, &corner, 0..1), Region::new([-1, 3], [0, 4]));
    }

    #[test]
    fn test_for_each_order() {
        let mut seen = Vec::new();
        Region::new([-1, 0], [1, 2]).for_each(|c| seen.push(c));
        assert_eq!(seen, vec![[-1, 0], [0, 0], [-1, 1], [0, 1]]);

        let mut count = 0;
        Region::<3>::new([0, 0, 0], [0, 2, 2]).for_each(|_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_view_indexing_with_ghosts() {
        let region = Region::with_ghosts([2, 2], 1);
        assert_eq!(region.len(), 16);
        let mut data = vec![0.0; 16];
        let mut view = ViewMut::new(&mut data, region);
        view.set([-1, -1], 1.0);
        view.set([0, 0], 2.0);
        view.add([2, 2], 3.0);
        assert_eq!(view.get([0, 0]), 2.0);
        assert_eq!(data[0], 1.0);
        assert_eq!(data[5], 2.0);
        assert_eq!(data[15], 3.0);
    }

    #[test]
    fn test_add_view() {
        let mut data = vec![1.0; 9];
        let mut patch = ViewMut::new(&mut data, Region::with_ghosts([1, 1], 1));
        let slab_region = Region::new([-1, 0], [0, 1]);
        let slab = [4.0];
        patch.add_view(&View::new(&slab, slab_region));
        assert_eq!(patch.get([-1, 0]), 5.0);
        assert_eq!(patch.get([0, 0]), 1.0);
    }
}
