//! The patches of one grid level owned by this rank
//!
//! Construction is collective: every rank of the communicator must build its part of a
//! domain in the same order, since global counts are reduced across the group.

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::patch_info::{check_neighbor_symmetry, PatchInfo};
use crate::vector::PatchLayout;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Local patches of one level, with the communicator of its process group
pub struct Domain<const D: usize> {
    id: usize,
    comm: Arc<dyn Communicator>,
    ns: [usize; D],
    num_ghost_cells: usize,
    pinfos: Vec<PatchInfo<D>>,
    index_of: HashMap<usize, usize>,
    num_global_patches: usize,
}

impl<const D: usize> Domain<D> {
    /// Build the local part of domain `id` from the patches this rank owns.
    ///
    /// Assigns local and global indices, resolves local neighbor indices and checks
    /// neighbor symmetry among the local patches.
    pub fn new(
        comm: Arc<dyn Communicator>,
        id: usize,
        ns: [usize; D],
        num_ghost_cells: usize,
        mut pinfos: Vec<PatchInfo<D>>,
    ) -> Result<Self> {
        let rank = comm.rank();
        let mut seen = HashSet::new();
        for pinfo in &pinfos {
            if pinfo.ns != ns || pinfo.num_ghost_cells != num_ghost_cells {
                return Err(Error::config(format!(
                    "patch {} has {:?} cells and {} ghost layers, domain {id} expects {:?} and {}",
                    pinfo.id, pinfo.ns, pinfo.num_ghost_cells, ns, num_ghost_cells
                )));
            }
            if pinfo.rank != rank {
                return Err(Error::config(format!(
                    "patch {} is owned by rank {} but was given to rank {rank}",
                    pinfo.id, pinfo.rank
                )));
            }
            if !seen.insert(pinfo.id) {
                return Err(Error::config(format!(
                    "patch id {} appears twice in domain {id}",
                    pinfo.id
                )));
            }
        }

        let counts = comm.all_gather(pinfos.len() as f64)?;
        let first_global: usize = counts[..rank].iter().map(|&c| c as usize).sum();
        let num_global_patches = counts.iter().map(|&c| c as usize).sum();

        let index_of: HashMap<usize, usize> = pinfos
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id, i))
            .collect();
        for (i, pinfo) in pinfos.iter_mut().enumerate() {
            pinfo.local_index = i;
            pinfo.global_index = first_global + i;
            let patch = pinfo.id;
            for info in pinfo.nbr_infos_mut() {
                info.resolve_local(rank, &index_of).map_err(|missing| {
                    Error::config(format!(
                        "patch {patch} lists neighbor {missing} on rank {rank}, which does not own it"
                    ))
                })?;
            }
        }
        check_neighbor_symmetry(&pinfos)?;

        log::debug!(
            "domain {id}: rank {rank} owns {} of {num_global_patches} patches",
            pinfos.len()
        );

        Ok(Self {
            id,
            comm,
            ns,
            num_ghost_cells,
            pinfos,
            index_of,
            num_global_patches,
        })
    }

    /// Domain id, unique within a hierarchy
    pub fn id(&self) -> usize {
        self.id
    }

    /// Communicator of the process group
    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    /// Cells per patch along each axis
    pub fn ns(&self) -> [usize; D] {
        self.ns
    }

    /// Ghost layers per side
    pub fn num_ghost_cells(&self) -> usize {
        self.num_ghost_cells
    }

    /// Storage layout of one patch
    pub fn layout(&self) -> PatchLayout<D> {
        PatchLayout::new(self.ns, self.num_ghost_cells)
    }

    /// Local patches, indexed by local index
    pub fn patch_infos(&self) -> &[PatchInfo<D>] {
        &self.pinfos
    }

    /// Local patch `local_index`
    pub fn patch_info(&self, local_index: usize) -> &PatchInfo<D> {
        &self.pinfos[local_index]
    }

    /// Local index of patch `id`, if this rank owns it
    pub fn local_index_of(&self, id: usize) -> Option<usize> {
        self.index_of.get(&id).copied()
    }

    /// Patches owned by this rank
    pub fn num_local_patches(&self) -> usize {
        self.pinfos.len()
    }

    /// Patches owned by all ranks
    pub fn num_global_patches(&self) -> usize {
        self.num_global_patches
    }

    /// Interior cells owned by this rank
    pub fn num_local_cells(&self) -> usize {
        self.pinfos.len() * self.ns.iter().product::<usize>()
    }

    /// Interior cells owned by all ranks
    pub fn num_global_cells(&self) -> usize {
        self.num_global_patches * self.ns.iter().product::<usize>()
    }

    /// Measure of the whole domain (collective)
    pub fn volume(&self) -> Result<f64> {
        let local: f64 = self.pinfos.iter().map(PatchInfo::volume).sum();
        Ok(self.comm.all_reduce_sum(local)?)
    }
}

impl<const D: usize> fmt::Debug for Domain<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("id", &self.id)
            .field("rank", &self.comm.rank())
            .field("ns", &self.ns)
            .field("num_ghost_cells", &self.num_ghost_cells)
            .field("num_local_patches", &self.pinfos.len())
            .field("num_global_patches", &self.num_global_patches)
            .finish()
    }
}
