//! Patch boundary geometry
//!
//! A [`Face`] names a boundary region of a patch: a side, an edge (3D) or a corner.
//! Along each axis a face is either pinned to the lower or upper boundary, or spans the
//! patch. An [`Orthant`] names one of the `2^k` sub-regions of a `k`-dimensional region
//! and addresses the pieces of a face shared with finer or coarser neighbors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a face sits along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisPos {
    /// Pinned to the lower boundary
    Lower,
    /// Pinned to the upper boundary
    Upper,
    /// Spans the whole patch
    Span,
}

impl AxisPos {
    fn flipped(self) -> Self {
        match self {
            AxisPos::Lower => AxisPos::Upper,
            AxisPos::Upper => AxisPos::Lower,
            AxisPos::Span => AxisPos::Span,
        }
    }

    fn digit(self) -> usize {
        match self {
            AxisPos::Span => 0,
            AxisPos::Lower => 1,
            AxisPos::Upper => 2,
        }
    }
}

/// How much of the ghost region a filling pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GhostFillingType {
    /// Sides only
    #[default]
    Faces,
    /// Sides and edges (in 2D the edges of a patch are its corners)
    Edges,
    /// Sides, edges and corners
    Corners,
}

impl GhostFillingType {
    /// Largest face codimension filled in `D` dimensions
    pub fn max_codimension(self, dim: usize) -> usize {
        match self {
            GhostFillingType::Faces => 1,
            GhostFillingType::Edges => 2.min(dim),
            GhostFillingType::Corners => dim,
        }
    }
}

/// Refinement relation between a patch and its neighbor across a face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NbrType {
    /// Same refinement level
    Normal,
    /// The neighbor is coarser
    Coarse,
    /// The neighbors are finer, one per orthant of the face
    Fine,
}

/// Boundary region of a `D`-dimensional patch
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Face<const D: usize> {
    pos: [AxisPos; D],
}

impl<const D: usize> Face<D> {
    /// Build a face from its per-axis positions. Returns `None` for the patch interior.
    pub fn new(pos: [AxisPos; D]) -> Option<Self> {
        if pos.iter().all(|p| *p == AxisPos::Span) {
            None
        } else {
            Some(Self { pos })
        }
    }

    /// The side normal to `axis`
    pub fn side(axis: usize, upper: bool) -> Self {
        let mut pos = [AxisPos::Span; D];
        pos[axis] = if upper { AxisPos::Upper } else { AxisPos::Lower };
        Self { pos }
    }

    /// Position along `axis`
    pub fn pos(&self, axis: usize) -> AxisPos {
        self.pos[axis]
    }

    /// Number of pinned axes: 1 for sides, `D` for corners
    pub fn codimension(&self) -> usize {
        self.pos.iter().filter(|p| **p != AxisPos::Span).count()
    }

    /// Axes the face spans, in increasing order
    pub fn free_axes(&self) -> Vec<usize> {
        (0..D).filter(|&i| self.pos[i] == AxisPos::Span).collect()
    }

    /// The same region seen from the neighbor on the other side
    pub fn opposite(&self) -> Self {
        Self {
            pos: self.pos.map(AxisPos::flipped),
        }
    }

    /// Whether the face is pinned to the lower boundary of `axis`
    pub fn is_lower_on_axis(&self, axis: usize) -> bool {
        self.pos[axis] == AxisPos::Lower
    }

    /// Whether the face is pinned to the upper boundary of `axis`
    pub fn is_upper_on_axis(&self, axis: usize) -> bool {
        self.pos[axis] == AxisPos::Upper
    }

    /// Unit offset from a patch to the neighbor across this face
    pub fn direction(&self) -> [i32; D] {
        self.pos.map(|p| match p {
            AxisPos::Lower => -1,
            AxisPos::Upper => 1,
            AxisPos::Span => 0,
        })
    }

    /// Dense index in `1..Face::count()`
    pub fn index(&self) -> usize {
        self.pos
            .iter()
            .rev()
            .fold(0, |acc, p| acc * 3 + p.digit())
    }

    /// Inverse of [`Face::index`]
    pub fn from_index(mut index: usize) -> Option<Self> {
        if index >= Self::count() {
            return None;
        }
        let mut pos = [AxisPos::Span; D];
        for p in pos.iter_mut() {
            *p = match index % 3 {
                0 => AxisPos::Span,
                1 => AxisPos::Lower,
                _ => AxisPos::Upper,
            };
            index /= 3;
        }
        Self::new(pos)
    }

    /// Size of the index space, `3^D`
    pub fn count() -> usize {
        3usize.pow(D as u32)
    }

    /// Every face of the given codimension, ordered by index
    pub fn of_codimension(codim: usize) -> Vec<Self> {
        (1..Self::count())
            .filter_map(Self::from_index)
            .filter(|f| f.codimension() == codim)
            .collect()
    }

    /// The `2D` sides
    pub fn sides() -> Vec<Self> {
        Self::of_codimension(1)
    }

    /// Edges of a 3D patch (codimension 2)
    pub fn edges() -> Vec<Self> {
        Self::of_codimension(2)
    }

    /// The `2^D` corners
    pub fn corners() -> Vec<Self> {
        Self::of_codimension(D)
    }

    /// Every face covered by a filling pass of the given type, sides first
    pub fn for_filling(fill: GhostFillingType) -> Vec<Self> {
        (1..=fill.max_codimension(D))
            .flat_map(Self::of_codimension)
            .collect()
    }
}

impl<const D: usize> fmt::Debug for Face<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Face({self})")
    }
}

impl<const D: usize> fmt::Display for Face<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const AXES: [char; 3] = ['x', 'y', 'z'];
        for (axis, p) in self.pos.iter().enumerate() {
            let name = AXES.get(axis).copied().unwrap_or('w');
            match p {
                AxisPos::Lower => write!(f, "{name}-")?,
                AxisPos::Upper => write!(f, "{name}+")?,
                AxisPos::Span => {}
            }
        }
        Ok(())
    }
}

/// One of the `2^dim` orthants of a `dim`-dimensional region.
///
/// Bit `i` is set when the orthant is on the upper half of the region's `i`-th axis.
/// For an orthant on a face, the axes are the face's free axes in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Orthant {
    dim: u8,
    bits: u8,
}

impl Orthant {
    /// Orthant `bits` of a `dim`-dimensional region
    pub fn new(dim: usize, bits: usize) -> Self {
        debug_assert!(bits < Self::num_orthants(dim));
        Self {
            dim: dim as u8,
            bits: bits as u8,
        }
    }

    /// The single orthant of a point
    pub fn whole() -> Self {
        Self { dim: 0, bits: 0 }
    }

    /// `2^dim`
    pub fn num_orthants(dim: usize) -> usize {
        1 << dim
    }

    /// All orthants of a `dim`-dimensional region, in index order
    pub fn all(dim: usize) -> impl Iterator<Item = Orthant> {
        (0..Self::num_orthants(dim)).map(move |bits| Orthant::new(dim, bits))
    }

    /// Dimension of the region
    pub fn dim(&self) -> usize {
        self.dim as usize
    }

    /// Index in `0..2^dim`
    pub fn index(&self) -> usize {
        self.bits as usize
    }

    /// Lower half on `axis`
    pub fn is_lower_on_axis(&self, axis: usize) -> bool {
        self.bits & (1 << axis) == 0
    }

    /// Upper half on `axis`
    pub fn is_upper_on_axis(&self, axis: usize) -> bool {
        !self.is_lower_on_axis(axis)
    }

    /// Drop `axis`, giving the orthant of the region with that axis removed
    pub fn collapse_on_axis(&self, axis: usize) -> Orthant {
        let low = self.bits & ((1 << axis) - 1);
        let high = (self.bits >> (axis + 1)) << axis;
        Orthant {
            dim: self.dim.saturating_sub(1),
            bits: low | high,
        }
    }

    /// Restrict a patch orthant to the free axes of `face`
    pub fn on_face<const D: usize>(&self, face: &Face<D>) -> Orthant {
        let free = face.free_axes();
        let bits = free
            .iter()
            .enumerate()
            .filter(|(_, &axis)| self.is_upper_on_axis(axis))
            .fold(0, |acc, (j, _)| acc | (1 << j));
        Orthant::new(free.len(), bits)
    }

    /// Sides of a `D`-dimensional patch that this orthant touches
    pub fn exterior_sides<const D: usize>(&self) -> Vec<Face<D>> {
        (0..D)
            .map(|axis| Face::side(axis, self.is_upper_on_axis(axis)))
            .collect()
    }

    /// Shift applied to fine coordinates along `axis` before halving them onto a coarse
    /// region of `n` cells
    pub(crate) fn offset(&self, axis: usize, n: usize) -> i32 {
        if self.is_lower_on_axis(axis) {
            0
        } else {
            n as i32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_counts() {
        assert_eq!(Face::<2>::sides().len(), 4);
        assert_eq!(Face::<2>::corners().len(), 4);
        assert_eq!(Face::<3>::sides().len(), 6);
        assert_eq!(Face::<3>::edges().len(), 12);
        assert_eq!(Face::<3>::corners().len(), 8);
        assert_eq!(Face::<3>::for_filling(GhostFillingType::Corners).len(), 26);
        assert_eq!(Face::<3>::for_filling(GhostFillingType::Edges).len(), 18);
        assert_eq!(Face::<2>::for_filling(GhostFillingType::Edges).len(), 8);
        assert_eq!(Face::<2>::for_filling(GhostFillingType::Faces).len(), 4);
    }

    #[test]
    fn test_index_round_trip() {
        for index in 1..Face::<3>::count() {
            let face = Face::<3>::from_index(index).unwrap();
            assert_eq!(face.index(), index);
        }
        assert!(Face::<2>::from_index(0).is_none());
        assert!(Face::<2>::from_index(9).is_none());
    }

    #[test]
    fn test_opposite() {
        let east = Face::<2>::side(0, true);
        assert_eq!(east.opposite(), Face::side(0, false));
        assert_eq!(east.opposite().opposite(), east);
        let corner = Face::<2>::new([AxisPos::Lower, AxisPos::Upper]).unwrap();
        assert_eq!(corner.opposite().direction(), [1, -1]);
        assert_eq!(corner.to_string(), "x-y+");
        assert_eq!(corner.codimension(), 2);
        assert!(corner.free_axes().is_empty());
    }

    #[test]
    fn test_orthant_on_face() {
        // upper on x and z, lower on y
        let orth = Orthant::new(3, 0b101);
        let y_side = Face::<3>::side(1, false);
        let on_face = orth.on_face(&y_side);
        assert_eq!(on_face.dim(), 2);
        assert_eq!(on_face.index(), 0b11);

        let x_side = Face::<3>::side(0, true);
        assert_eq!(orth.on_face(&x_side).index(), 0b10);
        assert_eq!(orth.collapse_on_axis(0), Orthant::new(2, 0b10));
        assert_eq!(orth.collapse_on_axis(1), Orthant::new(2, 0b11));
    }

    #[test]
    fn test_exterior_sides() {
        let orth = Orthant::new(2, 0b10);
        let sides = orth.exterior_sides::<2>();
        assert_eq!(sides, vec![Face::side(0, false), Face::side(1, true)]);
        assert_eq!(Orthant::all(2).count(), 4);
    }
}
