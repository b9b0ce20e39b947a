//! Distributed cell-centered fields
//!
//! A [`Vector`] stores one scalar value per cell for every local patch of a domain,
//! ghost layers included, in one contiguous buffer. Arithmetic touches interior cells
//! only; reductions are collective over the communicator.

use crate::comm::Communicator;
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::parallel;
use crate::view::{Region, View, ViewMut};
use std::sync::Arc;

/// Storage layout shared by every patch of a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchLayout<const D: usize> {
    /// Interior cells along each axis
    pub ns: [usize; D],
    /// Ghost layers on every side
    pub num_ghost_cells: usize,
}

impl<const D: usize> PatchLayout<D> {
    /// Layout with `ns` interior cells and `num_ghost_cells` ghost layers
    pub fn new(ns: [usize; D], num_ghost_cells: usize) -> Self {
        Self {
            ns,
            num_ghost_cells,
        }
    }

    /// Cells stored per patch, ghosts included
    pub fn patch_stride(&self) -> usize {
        self.with_ghosts().len()
    }

    /// Interior cells per patch
    pub fn num_interior(&self) -> usize {
        self.ns.iter().product()
    }

    /// Interior box
    pub fn interior(&self) -> Region<D> {
        Region::interior(self.ns)
    }

    /// Stored box, ghosts included
    pub fn with_ghosts(&self) -> Region<D> {
        Region::with_ghosts(self.ns, self.num_ghost_cells)
    }

    fn interior_offsets(&self) -> Vec<usize> {
        let region = self.with_ghosts();
        let shape = region.shape();
        let mut offsets = Vec::with_capacity(self.num_interior());
        self.interior().for_each(|c| {
            let mut idx = 0;
            let mut stride = 1;
            for axis in 0..D {
                idx += (c[axis] - region.lo[axis]) as usize * stride;
                stride *= shape[axis];
            }
            offsets.push(idx);
        });
        offsets
    }
}

/// One field over the local patches of a domain
#[derive(Debug, Clone)]
pub struct Vector<const D: usize> {
    comm: Arc<dyn Communicator>,
    layout: PatchLayout<D>,
    num_patches: usize,
    interior: Arc<[usize]>,
    data: Vec<f64>,
}

impl<const D: usize> Vector<D> {
    /// Zero field over the local patches of `domain`
    pub fn new(domain: &Domain<D>) -> Self {
        Self::with_layout(
            domain.comm().clone(),
            domain.layout(),
            domain.num_local_patches(),
        )
    }

    /// Zero field with `num_patches` patches of the given layout
    pub fn with_layout(
        comm: Arc<dyn Communicator>,
        layout: PatchLayout<D>,
        num_patches: usize,
    ) -> Self {
        Self {
            comm,
            layout,
            num_patches,
            interior: layout.interior_offsets().into(),
            data: vec![0.0; layout.patch_stride() * num_patches],
        }
    }

    /// Zero field with the same layout
    pub fn zeros_like(&self) -> Self {
        Self {
            comm: self.comm.clone(),
            layout: self.layout,
            num_patches: self.num_patches,
            interior: self.interior.clone(),
            data: vec![0.0; self.data.len()],
        }
    }

    /// Communicator used by reductions
    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    /// Patch layout
    pub fn layout(&self) -> PatchLayout<D> {
        self.layout
    }

    /// Number of local patches
    pub fn num_local_patches(&self) -> usize {
        self.num_patches
    }

    /// Raw storage of patch `i`, ghosts included
    pub fn patch_slice(&self, i: usize) -> &[f64] {
        let stride = self.layout.patch_stride();
        &self.data[i * stride..(i + 1) * stride]
    }

    /// Mutable raw storage of patch `i`, ghosts included
    pub fn patch_slice_mut(&mut self, i: usize) -> &mut [f64] {
        let stride = self.layout.patch_stride();
        &mut self.data[i * stride..(i + 1) * stride]
    }

    /// View of patch `i`, ghosts included
    pub fn patch_view(&self, i: usize) -> View<'_, D> {
        View::new(self.patch_slice(i), self.layout.with_ghosts())
    }

    /// Mutable view of patch `i`, ghosts included
    pub fn patch_view_mut(&mut self, i: usize) -> ViewMut<'_, D> {
        let region = self.layout.with_ghosts();
        ViewMut::new(self.patch_slice_mut(i), region)
    }

    /// Run `f(i, view)` on every local patch, in parallel when available
    pub fn for_each_patch_mut<F>(&mut self, f: F)
    where
        F: Fn(usize, ViewMut<'_, D>) + Sync + Send,
    {
        let region = self.layout.with_ghosts();
        parallel::for_each_block_mut(&mut self.data, self.layout.patch_stride(), |i, block| {
            f(i, ViewMut::new(block, region))
        });
    }

    /// Check that `other` has the same layout
    pub fn check_compatible(&self, other: &Vector<D>) -> Result<()> {
        if self.layout != other.layout || self.data.len() != other.data.len() {
            return Err(Error::Dimension {
                expected: self.data.len(),
                got: other.data.len(),
            });
        }
        Ok(())
    }

    fn zip_interior_mut(&mut self, other: &Vector<D>, mut f: impl FnMut(&mut f64, f64)) {
        let stride = self.layout.patch_stride();
        for (mine, theirs) in self.data.chunks_mut(stride).zip(other.data.chunks(stride)) {
            for &k in self.interior.iter() {
                f(&mut mine[k], theirs[k]);
            }
        }
    }

    fn for_each_interior_mut(&mut self, mut f: impl FnMut(&mut f64)) {
        let stride = self.layout.patch_stride();
        for block in self.data.chunks_mut(stride) {
            for &k in self.interior.iter() {
                f(&mut block[k]);
            }
        }
    }

    fn for_each_interior(&self, mut f: impl FnMut(f64)) {
        let stride = self.layout.patch_stride();
        for block in self.data.chunks(stride) {
            for &k in self.interior.iter() {
                f(block[k]);
            }
        }
    }

    /// Set every interior cell to `value`
    pub fn set(&mut self, value: f64) {
        self.for_each_interior_mut(|v| *v = value);
    }

    /// Set every cell, ghosts included, to `value`
    pub fn set_with_ghost(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// `self *= alpha`
    pub fn scale(&mut self, alpha: f64) {
        self.for_each_interior_mut(|v| *v *= alpha);
    }

    /// `self += delta` on every interior cell
    pub fn shift(&mut self, delta: f64) {
        self.for_each_interior_mut(|v| *v += delta);
    }

    /// Copy every value of `other`, ghosts included
    pub fn copy_from(&mut self, other: &Vector<D>) -> Result<()> {
        self.check_compatible(other)?;
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    /// `self += alpha * x`
    pub fn add_scaled(&mut self, alpha: f64, x: &Vector<D>) -> Result<()> {
        self.check_compatible(x)?;
        self.zip_interior_mut(x, |v, xv| *v += alpha * xv);
        Ok(())
    }

    /// `self += alpha * x + beta * y`
    pub fn add_scaled2(&mut self, alpha: f64, x: &Vector<D>, beta: f64, y: &Vector<D>) -> Result<()> {
        self.add_scaled(alpha, x)?;
        self.add_scaled(beta, y)
    }

    /// `self = alpha * self + x`
    pub fn scale_then_add(&mut self, alpha: f64, x: &Vector<D>) -> Result<()> {
        self.check_compatible(x)?;
        self.zip_interior_mut(x, |v, xv| *v = alpha * *v + xv);
        Ok(())
    }

    /// Interior cells on this rank
    pub fn num_local_cells(&self) -> usize {
        self.num_patches * self.layout.num_interior()
    }

    /// Interior values of every local patch, patch by patch, axis 0 fastest
    pub fn interior_values(&self) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.num_local_cells());
        self.for_each_interior(|v| values.push(v));
        values
    }

    /// Overwrite interior values from a slice ordered like [`Vector::interior_values`]
    pub fn set_interior_values(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.num_local_cells() {
            return Err(Error::Dimension {
                expected: self.num_local_cells(),
                got: values.len(),
            });
        }
        let mut it = values.iter();
        self.for_each_interior_mut(|v| {
            if let Some(&value) = it.next() {
                *v = value;
            }
        });
        Ok(())
    }

    /// Sum of interior values on this rank
    pub fn local_sum(&self) -> f64 {
        let mut sum = 0.0;
        self.for_each_interior(|v| sum += v);
        sum
    }

    /// Inner product over interior cells (collective)
    pub fn dot(&self, other: &Vector<D>) -> Result<f64> {
        self.check_compatible(other)?;
        let stride = self.layout.patch_stride();
        let local = parallel::sum_indexed(self.num_patches, |i| {
            let (a, b) = (&self.data[i * stride..], &other.data[i * stride..]);
            self.interior.iter().map(|&k| a[k] * b[k]).sum::<f64>()
        });
        Ok(self.comm.all_reduce_sum(local)?)
    }

    /// Euclidean norm over interior cells (collective)
    pub fn two_norm(&self) -> Result<f64> {
        Ok(self.dot(self)?.sqrt())
    }

    /// Largest absolute interior value (collective)
    pub fn inf_norm(&self) -> Result<f64> {
        let mut local: f64 = 0.0;
        self.for_each_interior(|v| local = local.max(v.abs()));
        Ok(self.comm.all_reduce_max(local)?)
    }
}
