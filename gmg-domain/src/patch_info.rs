//! Patch metadata
//!
//! A [`PatchInfo`] carries the geometry of one patch, its place in the multigrid
//! hierarchy (parent and children), and one [`NbrInfo`] per face that has a neighbor.
//! Faces without a descriptor lie on the domain boundary.

use crate::error::{Error, Result};
use crate::face::{Face, NbrType, Orthant};
use std::collections::HashMap;

/// Neighbor descriptor for one face of a patch
#[derive(Debug, Clone, PartialEq)]
pub enum NbrInfo {
    /// A neighbor at the same refinement level
    Normal {
        /// Neighbor patch id
        id: usize,
        /// Owning rank
        rank: usize,
        /// Local index on this rank, set when the neighbor is local
        local_index: Option<usize>,
    },
    /// A coarser neighbor; this patch covers `orth_on_coarse` of the shared face
    Coarse {
        /// Neighbor patch id
        id: usize,
        /// Owning rank
        rank: usize,
        /// Local index on this rank, set when the neighbor is local
        local_index: Option<usize>,
        /// Orthant of the coarse face covered by this patch
        orth_on_coarse: Orthant,
    },
    /// Finer neighbors, one per orthant of the face, in orthant order
    Fine {
        /// Neighbor patch ids
        ids: Vec<usize>,
        /// Owning ranks
        ranks: Vec<usize>,
        /// Local indices on this rank, set for local neighbors
        local_indexes: Vec<Option<usize>>,
    },
}

impl NbrInfo {
    /// Same-level neighbor
    pub fn normal(id: usize, rank: usize) -> Self {
        NbrInfo::Normal {
            id,
            rank,
            local_index: None,
        }
    }

    /// Coarser neighbor
    pub fn coarse(id: usize, rank: usize, orth_on_coarse: Orthant) -> Self {
        NbrInfo::Coarse {
            id,
            rank,
            local_index: None,
            orth_on_coarse,
        }
    }

    /// Finer neighbors listed in orthant order
    pub fn fine(ids: Vec<usize>, ranks: Vec<usize>) -> Self {
        let local_indexes = vec![None; ids.len()];
        NbrInfo::Fine {
            ids,
            ranks,
            local_indexes,
        }
    }

    /// Refinement relation
    pub fn nbr_type(&self) -> NbrType {
        match self {
            NbrInfo::Normal { .. } => NbrType::Normal,
            NbrInfo::Coarse { .. } => NbrType::Coarse,
            NbrInfo::Fine { .. } => NbrType::Fine,
        }
    }

    /// Ids of every neighbor behind this face
    pub fn ids(&self) -> Vec<usize> {
        match self {
            NbrInfo::Normal { id, .. } | NbrInfo::Coarse { id, .. } => vec![*id],
            NbrInfo::Fine { ids, .. } => ids.clone(),
        }
    }

    /// Owning ranks, parallel to [`NbrInfo::ids`]
    pub fn ranks(&self) -> Vec<usize> {
        match self {
            NbrInfo::Normal { rank, .. } | NbrInfo::Coarse { rank, .. } => vec![*rank],
            NbrInfo::Fine { ranks, .. } => ranks.clone(),
        }
    }

    /// Local indices, parallel to [`NbrInfo::ids`]
    pub fn local_indexes(&self) -> Vec<Option<usize>> {
        match self {
            NbrInfo::Normal { local_index, .. } | NbrInfo::Coarse { local_index, .. } => {
                vec![*local_index]
            }
            NbrInfo::Fine { local_indexes, .. } => local_indexes.clone(),
        }
    }

    /// Resolve local indices of neighbors owned by `rank`
    pub(crate) fn resolve_local(
        &mut self,
        rank: usize,
        index_of: &HashMap<usize, usize>,
    ) -> std::result::Result<(), usize> {
        let lookup = |id: usize, owner: usize| -> std::result::Result<Option<usize>, usize> {
            if owner != rank {
                return Ok(None);
            }
            index_of.get(&id).copied().map(Some).ok_or(id)
        };
        match self {
            NbrInfo::Normal {
                id,
                rank: owner,
                local_index,
            }
            | NbrInfo::Coarse {
                id,
                rank: owner,
                local_index,
                ..
            } => *local_index = lookup(*id, *owner)?,
            NbrInfo::Fine {
                ids,
                ranks,
                local_indexes,
            } => {
                for k in 0..ids.len() {
                    local_indexes[k] = lookup(ids[k], ranks[k])?;
                }
            }
        }
        Ok(())
    }
}

/// Geometry, ownership and connectivity of one patch
#[derive(Debug, Clone, PartialEq)]
pub struct PatchInfo<const D: usize> {
    /// Globally unique id within the domain
    pub id: usize,
    /// Index among the patches of the owning rank
    pub local_index: usize,
    /// Index among all patches of the domain
    pub global_index: usize,
    /// Refinement level (0 is the coarsest)
    pub refine_level: usize,
    /// Owning rank
    pub rank: usize,
    /// Cells along each axis
    pub ns: [usize; D],
    /// Lower corner
    pub starts: [f64; D],
    /// Cell size along each axis
    pub spacings: [f64; D],
    /// Ghost layers on every side
    pub num_ghost_cells: usize,
    /// Id of the patch covering this one on the next coarser level
    pub parent_id: Option<usize>,
    /// Rank owning the parent
    pub parent_rank: Option<usize>,
    /// Orthant of the parent covered by this patch; `None` when the parent has the same extent
    pub orth_on_parent: Option<Orthant>,
    /// Ids of the patches covering this one on the next finer level, in orthant order
    pub child_ids: Vec<usize>,
    /// Ranks owning the children
    pub child_ranks: Vec<usize>,
    nbr_infos: Vec<Option<NbrInfo>>,
}

impl<const D: usize> PatchInfo<D> {
    /// A patch with no neighbors, parent or children
    pub fn new(
        id: usize,
        ns: [usize; D],
        starts: [f64; D],
        spacings: [f64; D],
        num_ghost_cells: usize,
    ) -> Self {
        Self {
            id,
            local_index: 0,
            global_index: 0,
            refine_level: 0,
            rank: 0,
            ns,
            starts,
            spacings,
            num_ghost_cells,
            parent_id: None,
            parent_rank: None,
            orth_on_parent: None,
            child_ids: Vec::new(),
            child_ranks: Vec::new(),
            nbr_infos: vec![None; Face::<D>::count()],
        }
    }

    /// Whether `face` has a neighbor
    pub fn has_nbr(&self, face: Face<D>) -> bool {
        self.nbr_infos[face.index()].is_some()
    }

    /// Neighbor descriptor for `face`
    pub fn nbr_info(&self, face: Face<D>) -> Option<&NbrInfo> {
        self.nbr_infos[face.index()].as_ref()
    }

    /// Refinement relation across `face`
    pub fn nbr_type(&self, face: Face<D>) -> Option<NbrType> {
        self.nbr_info(face).map(NbrInfo::nbr_type)
    }

    /// Replace the descriptor for `face`
    pub fn set_nbr_info(&mut self, face: Face<D>, info: Option<NbrInfo>) {
        self.nbr_infos[face.index()] = info;
    }

    /// Every face with a neighbor, in face index order
    pub fn nbrs(&self) -> impl Iterator<Item = (Face<D>, &NbrInfo)> {
        self.nbr_infos
            .iter()
            .enumerate()
            .filter_map(|(i, info)| Some((Face::from_index(i)?, info.as_ref()?)))
    }

    pub(crate) fn nbr_infos_mut(&mut self) -> impl Iterator<Item = &mut NbrInfo> {
        self.nbr_infos.iter_mut().flatten()
    }

    /// Whether the patch has a parent on a coarser level
    pub fn has_parent(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Whether the parent is larger than this patch
    pub fn has_coarse_parent(&self) -> bool {
        self.orth_on_parent.is_some()
    }

    /// Whether the patch has children on a finer level
    pub fn has_children(&self) -> bool {
        !self.child_ids.is_empty()
    }

    /// Lower corner
    pub fn lower_corner(&self) -> [f64; D] {
        self.starts
    }

    /// Upper corner
    pub fn upper_corner(&self) -> [f64; D] {
        let mut upper = self.starts;
        for axis in 0..D {
            upper[axis] += self.ns[axis] as f64 * self.spacings[axis];
        }
        upper
    }

    /// Measure of the patch
    pub fn volume(&self) -> f64 {
        (0..D)
            .map(|axis| self.ns[axis] as f64 * self.spacings[axis])
            .product()
    }

    /// Measure of one cell
    pub fn cell_volume(&self) -> f64 {
        self.spacings.iter().product()
    }

    /// Center of cell `coord`; ghost coordinates are allowed
    pub fn cell_center(&self, coord: [i32; D]) -> [f64; D] {
        let mut x = self.starts;
        for axis in 0..D {
            x[axis] += (coord[axis] as f64 + 0.5) * self.spacings[axis];
        }
        x
    }
}

/// Check that neighbor relations are mutual across `pinfos`.
///
/// When `A` lists `B` across face `F`, `B` must list `A` across the opposite face with the
/// complementary refinement relation; a fine neighbor must appear in the orthant slot its
/// coarse neighbor descriptor names. Neighbors outside `pinfos` are not checked.
pub fn check_neighbor_symmetry<const D: usize>(pinfos: &[PatchInfo<D>]) -> Result<()> {
    let by_id: HashMap<usize, &PatchInfo<D>> = pinfos.iter().map(|p| (p.id, p)).collect();
    for pinfo in pinfos {
        for (face, info) in pinfo.nbrs() {
            let back_face = face.opposite();
            match info {
                NbrInfo::Normal { id, .. } => {
                    let Some(nbr) = by_id.get(id) else { continue };
                    match nbr.nbr_info(back_face) {
                        Some(NbrInfo::Normal { id: back, .. }) if *back == pinfo.id => {}
                        other => return Err(asymmetry(pinfo.id, face, *id, other)),
                    }
                }
                NbrInfo::Coarse {
                    id, orth_on_coarse, ..
                } => {
                    let Some(nbr) = by_id.get(id) else { continue };
                    match nbr.nbr_info(back_face) {
                        Some(NbrInfo::Fine { ids, .. })
                            if ids.get(orth_on_coarse.index()) == Some(&pinfo.id) => {}
                        other => return Err(asymmetry(pinfo.id, face, *id, other)),
                    }
                }
                NbrInfo::Fine { ids, .. } => {
                    for (k, id) in ids.iter().enumerate() {
                        let Some(nbr) = by_id.get(id) else { continue };
                        match nbr.nbr_info(back_face) {
                            Some(NbrInfo::Coarse {
                                id: back,
                                orth_on_coarse,
                                ..
                            }) if *back == pinfo.id && orth_on_coarse.index() == k => {}
                            other => return Err(asymmetry(pinfo.id, face, *id, other)),
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn asymmetry<const D: usize>(
    id: usize,
    face: Face<D>,
    nbr: usize,
    found: Option<&NbrInfo>,
) -> Error {
    let found = match found {
        Some(info) => format!("{:?} {:?}", info.nbr_type(), info.ids()),
        None => "nothing".to_string(),
    };
    Error::config(format!(
        "patch {id} lists patch {nbr} across {face}, but patch {nbr} lists {found} across {}",
        face.opposite()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (PatchInfo<2>, PatchInfo<2>) {
        let mut west = PatchInfo::new(0, [4, 4], [0.0, 0.0], [0.25, 0.25], 1);
        let mut east = PatchInfo::new(1, [4, 4], [1.0, 0.0], [0.25, 0.25], 1);
        west.set_nbr_info(Face::side(0, true), Some(NbrInfo::normal(1, 0)));
        east.set_nbr_info(Face::side(0, false), Some(NbrInfo::normal(0, 0)));
        (west, east)
    }

    #[test]
    fn test_geometry() {
        let (west, _) = pair();
        assert_eq!(west.upper_corner(), [1.0, 1.0]);
        assert_eq!(west.volume(), 1.0);
        assert_eq!(west.cell_center([0, 3]), [0.125, 0.875]);
        assert_eq!(west.cell_center([-1, 0]), [-0.125, 0.125]);
        assert!(!west.has_parent());
        assert!(!west.has_coarse_parent());
    }

    #[test]
    fn test_nbr_queries() {
        let (west, _) = pair();
        assert!(west.has_nbr(Face::side(0, true)));
        assert!(!west.has_nbr(Face::side(0, false)));
        assert_eq!(west.nbr_type(Face::side(0, true)), Some(NbrType::Normal));
        assert_eq!(west.nbrs().count(), 1);
    }

    #[test]
    fn test_symmetric_pair_passes() {
        let (west, east) = pair();
        check_neighbor_symmetry(&[west, east]).unwrap();
    }

    #[test]
    fn test_one_sided_neighbor_fails() {
        let (west, mut east) = pair();
        east.set_nbr_info(Face::side(0, false), None);
        let err = check_neighbor_symmetry(&[west, east]).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("patch 0 lists patch 1 across x+"));
    }

    #[test]
    fn test_coarse_fine_symmetry() {
        let mut coarse = PatchInfo::<2>::new(0, [4, 4], [0.0, 0.0], [0.25, 0.25], 1);
        let mut lower = PatchInfo::<2>::new(1, [4, 4], [1.0, 0.0], [0.125, 0.125], 1);
        let mut upper = PatchInfo::<2>::new(2, [4, 4], [1.0, 0.5], [0.125, 0.125], 1);
        coarse.set_nbr_info(Face::side(0, true), Some(NbrInfo::fine(vec![1, 2], vec![0, 0])));
        lower.set_nbr_info(
            Face::side(0, false),
            Some(NbrInfo::coarse(0, 0, Orthant::new(1, 0))),
        );
        upper.set_nbr_info(
            Face::side(0, false),
            Some(NbrInfo::coarse(0, 0, Orthant::new(1, 1))),
        );
        check_neighbor_symmetry(&[coarse.clone(), lower.clone(), upper.clone()]).unwrap();

        // swapped orthants
        upper.set_nbr_info(
            Face::side(0, false),
            Some(NbrInfo::coarse(0, 0, Orthant::new(1, 0))),
        );
        assert!(check_neighbor_symmetry(&[coarse, lower, upper]).is_err());
    }
}
