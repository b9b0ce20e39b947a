//! Uniform patch hierarchies
//!
//! [`UniformGrid`] splits an axis-aligned box into `P^D` equal patches and coarsens by
//! merging `2^D` patches into one until a single patch is left. Level 0 is the finest.
//!
//! Finest-level patches are dealt to ranks in contiguous runs of their Morton order; a
//! coarse patch belongs to the rank of its lowest child, so coarser levels use fewer ranks.

use crate::comm::Communicator;
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::face::{Face, GhostFillingType, Orthant};
use crate::patch_info::{NbrInfo, PatchInfo};
use std::sync::Arc;

/// Uniform multi-level patch decomposition of a box
#[derive(Debug, Clone)]
pub struct UniformGrid<const D: usize> {
    patches_per_axis: usize,
    cells_per_axis: usize,
    num_ghost_cells: usize,
    lower: [f64; D],
    upper: [f64; D],
}

impl<const D: usize> UniformGrid<D> {
    /// `patches_per_axis^D` patches of `cells_per_axis^D` cells on the unit box
    pub fn new(patches_per_axis: usize, cells_per_axis: usize, num_ghost_cells: usize) -> Result<Self> {
        if !patches_per_axis.is_power_of_two() {
            return Err(Error::config(format!(
                "patches per axis must be a power of two, got {patches_per_axis}"
            )));
        }
        if cells_per_axis == 0 {
            return Err(Error::config("patches need at least one cell per axis"));
        }
        Ok(Self {
            patches_per_axis,
            cells_per_axis,
            num_ghost_cells,
            lower: [0.0; D],
            upper: [1.0; D],
        })
    }

    /// Use the box `lower..upper` instead of the unit box
    pub fn with_bounds(mut self, lower: [f64; D], upper: [f64; D]) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Number of levels down to a single patch
    pub fn num_levels(&self) -> usize {
        self.patches_per_axis.trailing_zeros() as usize + 1
    }

    /// Patches per axis on `level`
    pub fn patches_on_level(&self, level: usize) -> usize {
        self.patches_per_axis >> level
    }

    /// Cells per patch along each axis
    pub fn ns(&self) -> [usize; D] {
        [self.cells_per_axis; D]
    }

    fn id(&self, level: usize, p: [usize; D]) -> usize {
        let n = self.patches_on_level(level);
        p.iter().rev().fold(0, |acc, &c| acc * n + c)
    }

    fn morton(&self, p: [usize; D]) -> usize {
        let bits = self.patches_per_axis.trailing_zeros() as usize;
        let mut m = 0;
        for b in 0..bits {
            for (axis, &c) in p.iter().enumerate() {
                m |= ((c >> b) & 1) << (b * D + axis);
            }
        }
        m
    }

    /// Rank owning patch `p` of `level` in a group of `num_ranks`
    pub fn rank_of(&self, level: usize, p: [usize; D], num_ranks: usize) -> usize {
        let finest = p.map(|c| c << level);
        let total = self.patches_per_axis.pow(D as u32);
        self.morton(finest) * num_ranks / total
    }

    fn patch_coords(&self, level: usize) -> Vec<[usize; D]> {
        let n = self.patches_on_level(level) as i32;
        let mut coords = Vec::new();
        crate::view::Region::new([0; D], [n; D]).for_each(|c| coords.push(c.map(|v| v as usize)));
        coords
    }

    /// Every patch of `level`, whatever rank owns it
    pub fn patch_infos(&self, level: usize, num_ranks: usize) -> Vec<PatchInfo<D>> {
        let n = self.patches_on_level(level);
        let num_levels = self.num_levels();
        let cells = self.cells_per_axis;
        let mut spacings = [0.0; D];
        for axis in 0..D {
            spacings[axis] = (self.upper[axis] - self.lower[axis]) / (n * cells) as f64;
        }

        self.patch_coords(level)
            .into_iter()
            .map(|p| {
                let mut starts = self.lower;
                for axis in 0..D {
                    starts[axis] += (p[axis] * cells) as f64 * spacings[axis];
                }
                let mut pinfo = PatchInfo::new(
                    self.id(level, p),
                    self.ns(),
                    starts,
                    spacings,
                    self.num_ghost_cells,
                );
                pinfo.rank = self.rank_of(level, p, num_ranks);
                pinfo.refine_level = num_levels - 1 - level;

                for face in Face::<D>::for_filling(GhostFillingType::Corners) {
                    let dir = face.direction();
                    let mut q = p;
                    let inside = (0..D).all(|axis| {
                        let c = p[axis] as i64 + dir[axis] as i64;
                        q[axis] = c.max(0) as usize;
                        c >= 0 && c < n as i64
                    });
                    if inside {
                        pinfo.set_nbr_info(
                            face,
                            Some(NbrInfo::normal(
                                self.id(level, q),
                                self.rank_of(level, q, num_ranks),
                            )),
                        );
                    }
                }

                if level + 1 < num_levels {
                    let parent = p.map(|c| c / 2);
                    let bits = (0..D).fold(0, |acc, axis| acc | ((p[axis] & 1) << axis));
                    pinfo.parent_id = Some(self.id(level + 1, parent));
                    pinfo.parent_rank = Some(self.rank_of(level + 1, parent, num_ranks));
                    pinfo.orth_on_parent = Some(Orthant::new(D, bits));
                }
                if level > 0 {
                    for orth in Orthant::all(D) {
                        let mut child = p.map(|c| c * 2);
                        for (axis, c) in child.iter_mut().enumerate() {
                            if orth.is_upper_on_axis(axis) {
                                *c += 1;
                            }
                        }
                        pinfo.child_ids.push(self.id(level - 1, child));
                        pinfo.child_ranks.push(self.rank_of(level - 1, child, num_ranks));
                    }
                }
                pinfo
            })
            .collect()
    }

    /// The part of `level` owned by this rank (collective)
    pub fn domain(&self, level: usize, comm: Arc<dyn Communicator>) -> Result<Domain<D>> {
        if level >= self.num_levels() {
            return Err(Error::config(format!(
                "level {level} requested from a grid with {} levels",
                self.num_levels()
            )));
        }
        let rank = comm.rank();
        let local: Vec<PatchInfo<D>> = self
            .patch_infos(level, comm.size())
            .into_iter()
            .filter(|p| p.rank == rank)
            .collect();
        Domain::new(comm, level, self.ns(), self.num_ghost_cells, local)
    }

    /// Every level from finest to coarsest (collective)
    pub fn domains(&self, comm: Arc<dyn Communicator>) -> Result<Vec<Arc<Domain<D>>>> {
        (0..self.num_levels())
            .map(|level| self.domain(level, comm.clone()).map(Arc::new))
            .collect()
    }
}
