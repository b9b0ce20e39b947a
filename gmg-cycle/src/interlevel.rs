//! Patch transfers between two adjacent levels
//!
//! Every fine patch has exactly one parent on the next coarser level. When the parent is
//! owned by another rank, the fine rank works on a local stand-in for it, a "ghost
//! parent", held in a persistent ghost vector:
//!
//! - restriction: fine patches are restricted into their ghost parents, which are then
//!   added into the real parents on their owners;
//! - interpolation: coarse patches are shipped to the ranks owning their children and
//!   copied into the ghost parents before being interpolated.
//!
//! The schedule is computed once, by a collective handshake that also validates the
//! coarsening: each fine patch claims its parent and each coarse patch checks that the
//! claims it received are exactly its children, with matching geometry.

use domain::{
    CommError, Communicator, Domain, Error, Orthant, PatchInfo, Result, SendRequest, Tag, TransferPhase, Vector,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Relative tolerance for geometry comparisons
const GEOMETRY_TOLERANCE: f64 = 1e-10;

/// A coarse patch owned by another rank, with the fine patches on this rank it covers
#[derive(Debug, Clone)]
struct GhostParent {
    id: usize,
    rank: usize,
}

/// A local coarse patch with children on other ranks
#[derive(Debug, Clone)]
struct RemoteChildren {
    local_index: usize,
    id: usize,
    ranks: Vec<usize>,
}

/// Sends of one transfer, waited on when the transfer finishes
#[must_use = "a transfer must be finished"]
#[derive(Debug)]
pub struct PendingTransfer {
    requests: Vec<SendRequest>,
}

impl PendingTransfer {
    fn wait(self) -> Result<()> {
        for request in self.requests {
            request.wait()?;
        }
        Ok(())
    }
}

/// Claim sent by a fine patch to the owner of its parent
#[derive(Debug, Clone)]
struct Claim<const D: usize> {
    child: usize,
    parent: usize,
    orth: Option<Orthant>,
    starts: [f64; D],
    spacings: [f64; D],
}

impl<const D: usize> Claim<D> {
    const LEN: usize = 3 + 2 * D;

    fn of(pinfo: &PatchInfo<D>, parent: usize) -> Self {
        Self {
            child: pinfo.id,
            parent,
            orth: pinfo.orth_on_parent,
            starts: pinfo.starts,
            spacings: pinfo.spacings,
        }
    }

    fn encode(&self, out: &mut Vec<f64>) {
        out.push(self.child as f64);
        out.push(self.parent as f64);
        out.push(self.orth.map_or(-1.0, |o| o.index() as f64));
        out.extend_from_slice(&self.starts);
        out.extend_from_slice(&self.spacings);
    }

    fn decode(chunk: &[f64]) -> Option<Self> {
        let orth = match chunk[2] {
            o if o < 0.0 => None,
            o if (o as usize) < Orthant::num_orthants(D) => Some(Orthant::new(D, o as usize)),
            _ => return None,
        };
        let mut starts = [0.0; D];
        let mut spacings = [0.0; D];
        starts.copy_from_slice(&chunk[3..3 + D]);
        spacings.copy_from_slice(&chunk[3 + D..3 + 2 * D]);
        Some(Self {
            child: chunk[0] as usize,
            parent: chunk[1] as usize,
            orth,
            starts,
            spacings,
        })
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= GEOMETRY_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Check that a claimed child sits where its parent expects it
fn check_geometry<const D: usize>(parent: &PatchInfo<D>, claim: &Claim<D>) -> std::result::Result<(), String> {
    for axis in 0..D {
        let (expected_spacing, expected_start) = match claim.orth {
            None => (parent.spacings[axis], parent.starts[axis]),
            Some(orth) => {
                let h = parent.spacings[axis] / 2.0;
                let offset = if orth.is_upper_on_axis(axis) {
                    parent.ns[axis] as f64 * h
                } else {
                    0.0
                };
                (h, parent.starts[axis] + offset)
            }
        };
        if !close(claim.spacings[axis], expected_spacing) {
            return Err(format!(
                "patch {} has spacing {} on axis {axis}, parent {} expects {}",
                claim.child, claim.spacings[axis], parent.id, expected_spacing
            ));
        }
        if !close(claim.starts[axis], expected_start) {
            return Err(format!(
                "patch {} starts at {} on axis {axis}, parent {} expects {}",
                claim.child, claim.starts[axis], parent.id, expected_start
            ));
        }
    }
    Ok(())
}

/// Turn a local verdict into one shared by every rank (collective)
fn agree<T, const D: usize>(
    comm: &dyn Communicator,
    local: Result<T>,
    coarse: &Domain<D>,
    fine: &Domain<D>,
) -> Result<T> {
    let failures = comm.all_reduce_sum(if local.is_err() { 1.0 } else { 0.0 })?;
    let value = local?;
    if failures > 0.0 {
        return Err(Error::config(format!(
            "coarsening of domain {} into domain {} is inconsistent on {failures} other rank(s)",
            fine.id(),
            coarse.id()
        )));
    }
    Ok(value)
}

/// Messages one transfer phase waits for, keyed by `(patch id, source rank)`
#[derive(Debug)]
struct Incoming {
    /// key -> (flag slot, local patch index)
    slots: HashMap<(usize, usize), (usize, usize)>,
    received: Mutex<Vec<bool>>,
}

impl Incoming {
    fn new(entries: Vec<((usize, usize), usize)>) -> Self {
        let received = Mutex::new(vec![false; entries.len()]);
        let slots = entries
            .into_iter()
            .enumerate()
            .map(|(slot, (key, index))| (key, (slot, index)))
            .collect();
        Self { slots, received }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Communication schedule between a coarse domain and the next finer one
#[derive(Debug)]
pub struct InterLevelComm<const D: usize> {
    coarse: Arc<Domain<D>>,
    fine: Arc<Domain<D>>,
    local_parents: Vec<(usize, usize)>,
    ghost_parent_of: Vec<(usize, usize)>,
    ghost_parents: Vec<GhostParent>,
    remote_children: Vec<RemoteChildren>,
    restrict_incoming: Incoming,
    interpolate_incoming: Incoming,
    ghost: Mutex<Vector<D>>,
}

impl<const D: usize> InterLevelComm<D> {
    /// Build the schedule between `coarse` and `fine` (collective).
    ///
    /// Fails with a configuration error on every rank when any rank finds that the
    /// fine patches do not exactly cover the coarse ones.
    pub fn new(coarse: Arc<Domain<D>>, fine: Arc<Domain<D>>) -> Result<Self> {
        let comm = fine.comm().clone();
        let (outgoing, own) =
            agree(comm.as_ref(), Self::outgoing_claims(&coarse, &fine), &coarse, &fine)?;
        let claims = Self::exchange_claims(&coarse, outgoing, own)?;
        agree(comm.as_ref(), Self::check_claims(&coarse, claims), &coarse, &fine)?;

        let rank = comm.rank();
        let mut local_parents = Vec::new();
        let mut ghost_index: BTreeMap<usize, usize> = BTreeMap::new();
        let mut ghost_parents = Vec::new();
        let mut ghost_parent_of = Vec::new();
        for pinfo in fine.patch_infos() {
            let (Some(parent), Some(parent_rank)) = (pinfo.parent_id, pinfo.parent_rank) else {
                continue;
            };
            if parent_rank == rank {
                if let Some(c) = coarse.local_index_of(parent) {
                    local_parents.push((c, pinfo.local_index));
                }
            } else {
                let g = *ghost_index.entry(parent).or_insert_with(|| {
                    ghost_parents.push(GhostParent {
                        id: parent,
                        rank: parent_rank,
                    });
                    ghost_parents.len() - 1
                });
                ghost_parent_of.push((g, pinfo.local_index));
            }
        }

        let remote_children = coarse
            .patch_infos()
            .iter()
            .filter_map(|pinfo| {
                let ranks: BTreeSet<usize> = pinfo
                    .child_ranks
                    .iter()
                    .copied()
                    .filter(|&r| r != rank)
                    .collect();
                (!ranks.is_empty()).then(|| RemoteChildren {
                    local_index: pinfo.local_index,
                    id: pinfo.id,
                    ranks: ranks.into_iter().collect(),
                })
            })
            .collect::<Vec<_>>();

        let restrict_incoming = Incoming::new(
            remote_children
                .iter()
                .flat_map(|children| {
                    children
                        .ranks
                        .iter()
                        .map(move |&rank| ((children.id, rank), children.local_index))
                })
                .collect(),
        );
        let interpolate_incoming = Incoming::new(
            ghost_parents
                .iter()
                .enumerate()
                .map(|(g, parent)| ((parent.id, parent.rank), g))
                .collect(),
        );

        let ghost = Vector::with_layout(comm.clone(), coarse.layout(), ghost_parents.len());
        log::info!(
            "inter-level schedule {} -> {} on rank {rank}: {} local parents, {} ghost parents, {} coarse patches with remote children",
            fine.id(),
            coarse.id(),
            local_parents.len(),
            ghost_parents.len(),
            remote_children.len()
        );

        Ok(Self {
            coarse,
            fine,
            local_parents,
            ghost_parent_of,
            ghost_parents,
            remote_children,
            restrict_incoming,
            interpolate_incoming,
            ghost: Mutex::new(ghost),
        })
    }

    /// Claims of the local fine patches: encoded per owning rank, and those kept here
    fn outgoing_claims(coarse: &Domain<D>, fine: &Domain<D>) -> Result<(Vec<Vec<f64>>, Vec<Claim<D>>)> {
        let comm = fine.comm();
        let (rank, size) = (comm.rank(), comm.size());
        if coarse.comm().size() != size || coarse.comm().rank() != rank {
            return Err(Error::config(format!(
                "domains {} and {} live on different process groups",
                coarse.id(),
                fine.id()
            )));
        }
        if coarse.ns() != fine.ns() || coarse.num_ghost_cells() != fine.num_ghost_cells() {
            return Err(Error::config(format!(
                "domain {} has {:?} cells per patch and domain {} has {:?}",
                coarse.id(),
                coarse.ns(),
                fine.id(),
                fine.ns()
            )));
        }

        let mut outgoing: Vec<Vec<f64>> = vec![Vec::new(); size];
        let mut own = Vec::new();
        for pinfo in fine.patch_infos() {
            let (Some(parent), Some(parent_rank)) = (pinfo.parent_id, pinfo.parent_rank) else {
                return Err(Error::config(format!(
                    "patch {} of domain {} has no parent in domain {}",
                    pinfo.id,
                    fine.id(),
                    coarse.id()
                )));
            };
            if parent_rank >= size {
                return Err(Error::config(format!(
                    "patch {} names rank {parent_rank} as owner of its parent, the group has {size} ranks",
                    pinfo.id
                )));
            }
            let claim = Claim::of(pinfo, parent);
            if parent_rank == rank {
                own.push(claim);
            } else {
                claim.encode(&mut outgoing[parent_rank]);
            }
        }
        Ok((outgoing, own))
    }

    /// Send every rank its claims and collect `(source rank, claim)` for the local parents
    fn exchange_claims(
        coarse: &Domain<D>,
        outgoing: Vec<Vec<f64>>,
        own: Vec<Claim<D>>,
    ) -> Result<Vec<(usize, Claim<D>)>> {
        let comm = coarse.comm();
        let rank = comm.rank();
        let tag = Tag::InterLevel {
            domain: coarse.id(),
            phase: TransferPhase::Handshake,
            patch: rank,
        };
        let mut requests = Vec::with_capacity(outgoing.len());
        for (dest, payload) in outgoing.into_iter().enumerate() {
            if dest != rank {
                requests.push(comm.isend(dest, tag, payload)?);
            }
        }

        let mut claims: Vec<(usize, Claim<D>)> = own.into_iter().map(|c| (rank, c)).collect();
        for source in (0..comm.size()).filter(|&r| r != rank) {
            let envelope = comm
                .recv_matching(&mut |from, tag| {
                    from == source
                        && matches!(*tag, Tag::InterLevel { domain, phase: TransferPhase::Handshake, .. } if domain == coarse.id())
                })
                .map_err(|e| match e {
                    CommError::Timeout { waited_ms } => Error::protocol(
                        coarse.id(),
                        None,
                        format!("no handshake from rank {source} after {waited_ms} ms"),
                    ),
                    other => other.into(),
                })?;
            if envelope.payload.len() % Claim::<D>::LEN != 0 {
                return Err(Error::protocol(
                    coarse.id(),
                    None,
                    format!(
                        "handshake from rank {source} has {} values, not a multiple of {}",
                        envelope.payload.len(),
                        Claim::<D>::LEN
                    ),
                ));
            }
            for chunk in envelope.payload.chunks(Claim::<D>::LEN) {
                let claim = Claim::decode(chunk).ok_or_else(|| {
                    Error::protocol(
                        coarse.id(),
                        None,
                        format!("handshake from rank {source} names an invalid orthant"),
                    )
                })?;
                claims.push((source, claim));
            }
        }
        for request in requests {
            request.wait()?;
        }
        Ok(claims)
    }

    /// Check that each local coarse patch was claimed by exactly its children
    fn check_claims(coarse: &Domain<D>, claims: Vec<(usize, Claim<D>)>) -> Result<()> {
        let rank = coarse.comm().rank();
        let mut by_parent: HashMap<usize, Vec<(usize, Claim<D>)>> = HashMap::new();
        for (source, claim) in claims {
            if coarse.local_index_of(claim.parent).is_none() {
                return Err(Error::config(format!(
                    "patch {} on rank {source} claims parent {}, which rank {rank} does not own",
                    claim.child, claim.parent
                )));
            }
            by_parent.entry(claim.parent).or_default().push((source, claim));
        }

        for parent in coarse.patch_infos() {
            let mut got = by_parent.remove(&parent.id).unwrap_or_default();
            got.sort_by_key(|(_, claim)| claim.child);
            let mut expected: Vec<(usize, usize)> = parent
                .child_ids
                .iter()
                .copied()
                .zip(parent.child_ranks.iter().copied())
                .collect();
            expected.sort_unstable();
            let claimed: Vec<(usize, usize)> =
                got.iter().map(|(source, claim)| (claim.child, *source)).collect();
            if expected.is_empty() || claimed != expected {
                return Err(Error::config(format!(
                    "coarse patch {} expects children {:?} but was claimed by {:?}",
                    parent.id, expected, claimed
                )));
            }
            if got.len() > 1 && got.iter().any(|(_, claim)| claim.orth.is_none()) {
                return Err(Error::config(format!(
                    "coarse patch {} is claimed as a same-size parent by one of {} children",
                    parent.id,
                    got.len()
                )));
            }
            for (_, claim) in &got {
                check_geometry(parent, claim).map_err(Error::config)?;
            }
        }
        Ok(())
    }

    /// Coarser of the two domains
    pub fn coarse_domain(&self) -> &Arc<Domain<D>> {
        &self.coarse
    }

    /// Finer of the two domains
    pub fn fine_domain(&self) -> &Arc<Domain<D>> {
        &self.fine
    }

    /// `(coarse local index, fine local index)` for fine patches whose parent is on this rank
    pub fn patches_with_local_parent(&self) -> &[(usize, usize)] {
        &self.local_parents
    }

    /// `(ghost index, fine local index)` for fine patches whose parent is on another rank
    pub fn patches_with_ghost_parent(&self) -> &[(usize, usize)] {
        &self.ghost_parent_of
    }

    /// Number of ghost parents held on this rank
    pub fn num_ghost_patches(&self) -> usize {
        self.ghost_parents.len()
    }

    /// A fresh zero vector over the ghost parents
    pub fn new_ghost_vector(&self) -> Vector<D> {
        Vector::with_layout(
            self.fine.comm().clone(),
            self.coarse.layout(),
            self.ghost_parents.len(),
        )
    }

    /// Lock the persistent ghost vector
    pub fn ghost_vector(&self) -> Result<MutexGuard<'_, Vector<D>>> {
        self.ghost.lock().map_err(|_| {
            Error::protocol(
                self.coarse.id(),
                None,
                "ghost parent buffer was left inconsistent by a failed transfer",
            )
        })
    }

    fn tag(&self, phase: TransferPhase, patch: usize) -> Tag {
        Tag::InterLevel {
            domain: self.coarse.id(),
            phase,
            patch,
        }
    }

    /// Start adding the ghost parents into their owners' patches.
    pub fn send_ghost_patches_start(&self, ghost: &Vector<D>) -> Result<PendingTransfer> {
        let comm = self.fine.comm();
        let mut requests = Vec::with_capacity(self.ghost_parents.len());
        for (g, parent) in self.ghost_parents.iter().enumerate() {
            let payload = ghost.patch_slice(g).to_vec();
            requests.push(comm.isend(
                parent.rank,
                self.tag(TransferPhase::Restrict, parent.id),
                payload,
            )?);
        }
        Ok(PendingTransfer { requests })
    }

    /// Receive every contribution for the local coarse patches and add it into `coarse`.
    pub fn send_ghost_patches_finish(
        &self,
        coarse: &mut Vector<D>,
        pending: PendingTransfer,
    ) -> Result<()> {
        self.receive_patches(TransferPhase::Restrict, &self.restrict_incoming, |index, payload| {
            for (value, add) in coarse.patch_slice_mut(index).iter_mut().zip(payload) {
                *value += add;
            }
        })?;
        log::debug!(
            "restriction {} -> {}: {} contributions sent",
            self.fine.id(),
            self.coarse.id(),
            pending.requests.len()
        );
        pending.wait()
    }

    /// Start shipping the local coarse patches to the ranks owning their children.
    pub fn get_ghost_patches_start(&self, coarse: &Vector<D>) -> Result<PendingTransfer> {
        let comm = self.fine.comm();
        let mut requests = Vec::new();
        for children in &self.remote_children {
            let payload = coarse.patch_slice(children.local_index);
            for &rank in &children.ranks {
                requests.push(comm.isend(
                    rank,
                    self.tag(TransferPhase::Interpolate, children.id),
                    payload.to_vec(),
                )?);
            }
        }
        Ok(PendingTransfer { requests })
    }

    /// Receive every ghost parent into `ghost`.
    pub fn get_ghost_patches_finish(
        &self,
        ghost: &mut Vector<D>,
        pending: PendingTransfer,
    ) -> Result<()> {
        self.receive_patches(TransferPhase::Interpolate, &self.interpolate_incoming, |index, payload| {
            ghost.patch_slice_mut(index).copy_from_slice(payload);
        })?;
        pending.wait()
    }

    /// Drain exactly the `(patch id, source rank)` messages in `incoming`.
    fn receive_patches(
        &self,
        phase: TransferPhase,
        incoming: &Incoming,
        mut deliver: impl FnMut(usize, &[f64]),
    ) -> Result<()> {
        let comm = self.fine.comm();
        let coarse_id = self.coarse.id();
        let stride = self.coarse.layout().patch_stride();
        let mut received = incoming.received.lock().map_err(|_| {
            Error::protocol(coarse_id, None, "receive flags were left inconsistent by a failed transfer")
        })?;
        received.fill(false);
        let mut remaining = incoming.len();
        while remaining > 0 {
            let envelope = comm
                .recv_matching(&mut |source, tag| match *tag {
                    Tag::InterLevel {
                        domain,
                        phase: p,
                        patch,
                    } => {
                        domain == coarse_id
                            && p == phase
                            && incoming
                                .slots
                                .get(&(patch, source))
                                .is_some_and(|&(slot, _)| !received[slot])
                    }
                    _ => false,
                })
                .map_err(|e| match e {
                    CommError::Timeout { waited_ms } => {
                        let mut missing: Vec<String> = incoming
                            .slots
                            .iter()
                            .filter(|(_, (slot, _))| !received[*slot])
                            .map(|((patch, rank), _)| format!("patch {patch} from rank {rank}"))
                            .collect();
                        missing.sort();
                        Error::protocol(
                            coarse_id,
                            None,
                            format!(
                                "no {phase:?} message after {waited_ms} ms, still missing: {}",
                                missing.join(", ")
                            ),
                        )
                    }
                    other => other.into(),
                })?;
            let Tag::InterLevel { patch, .. } = envelope.tag else {
                return Err(Error::protocol(coarse_id, None, "unexpected message kind"));
            };
            let Some(&(slot, index)) = incoming
                .slots
                .get(&(patch, envelope.source))
                .filter(|&&(slot, _)| !received[slot])
            else {
                return Err(Error::protocol(
                    coarse_id,
                    Some(patch),
                    format!("unexpected sender: rank {}", envelope.source),
                ));
            };
            received[slot] = true;
            remaining -= 1;
            if envelope.payload.len() != stride {
                return Err(Error::protocol(
                    coarse_id,
                    Some(patch),
                    format!(
                        "{phase:?} message from rank {} has {} bytes, expected {}",
                        envelope.source,
                        envelope.payload.len() * std::mem::size_of::<f64>(),
                        stride * std::mem::size_of::<f64>()
                    ),
                ));
            }
            deliver(index, &envelope.payload);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Communicator, ThreadComm, UniformGrid};
    use std::thread;

    fn single() -> Arc<dyn Communicator> {
        Arc::new(ThreadComm::single())
    }

    #[test]
    fn test_single_rank_schedule() {
        let grid = UniformGrid::<2>::new(4, 4, 1).unwrap();
        let domains = grid.domains(single()).unwrap();
        let ilc = InterLevelComm::new(domains[1].clone(), domains[0].clone()).unwrap();
        assert_eq!(ilc.patches_with_local_parent().len(), 16);
        assert!(ilc.patches_with_ghost_parent().is_empty());
        assert_eq!(ilc.num_ghost_patches(), 0);
        assert_eq!(ilc.new_ghost_vector().num_local_patches(), 0);
    }

    #[test]
    fn test_missing_child_is_a_configuration_error() {
        let grid = UniformGrid::<2>::new(2, 4, 1).unwrap();
        let comm = single();
        let mut parents = grid.patch_infos(1, 1);
        parents[0].child_ids.pop();
        parents[0].child_ranks.pop();
        let coarse = Arc::new(Domain::new(comm.clone(), 1, grid.ns(), 1, parents).unwrap());
        let fine = Arc::new(grid.domain(0, comm).unwrap());
        let err = InterLevelComm::new(coarse, fine).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("expects children"));
    }

    #[test]
    fn test_misplaced_child_is_a_configuration_error() {
        let grid = UniformGrid::<2>::new(2, 4, 1).unwrap();
        let comm = single();
        let coarse = Arc::new(grid.domain(1, comm.clone()).unwrap());
        let mut pinfos = grid.patch_infos(0, 1);
        pinfos[3].starts[0] += 0.125;
        let fine = Arc::new(Domain::new(comm, 0, grid.ns(), 1, pinfos).unwrap());
        let err = InterLevelComm::new(coarse, fine).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("starts at"));
    }

    #[test]
    fn test_two_rank_round_trip_of_ghost_patches() {
        // level 1 is a single patch on rank 0 whose four children are split 2/2
        let grid = UniformGrid::<2>::new(2, 2, 1).unwrap();
        let comms = ThreadComm::world(2);
        thread::scope(|s| {
            for comm in comms {
                let grid = grid.clone();
                s.spawn(move || {
                    let comm: Arc<dyn Communicator> = Arc::new(comm);
                    let rank = comm.rank();
                    let domains = grid.domains(comm).unwrap();
                    let ilc = InterLevelComm::new(domains[1].clone(), domains[0].clone()).unwrap();
                    assert_eq!(ilc.num_ghost_patches(), if rank == 0 { 0 } else { 1 });
                    assert_eq!(ilc.patches_with_ghost_parent().len(), if rank == 0 { 0 } else { 2 });

                    // interpolation direction
                    let mut coarse = Vector::new(&domains[1]);
                    coarse.set_with_ghost(3.0);
                    let mut ghost = ilc.ghost_vector().unwrap();
                    let pending = ilc.get_ghost_patches_start(&coarse).unwrap();
                    ilc.get_ghost_patches_finish(&mut ghost, pending).unwrap();
                    if rank == 1 {
                        assert!(ghost.patch_slice(0).iter().all(|&v| v == 3.0));
                    }

                    // restriction direction, additive on the owner
                    ghost.set_with_ghost(1.0);
                    let mut sum = Vector::new(&domains[1]);
                    let pending = ilc.send_ghost_patches_start(&ghost).unwrap();
                    ilc.send_ghost_patches_finish(&mut sum, pending).unwrap();
                    if rank == 0 {
                        assert!(sum.patch_slice(0).iter().all(|&v| v == 1.0));
                    }
                });
            }
        });
    }

    #[test]
    fn test_repeated_transfers_reuse_the_schedule() {
        let grid = UniformGrid::<2>::new(2, 2, 1).unwrap();
        let comms = ThreadComm::world(2);
        thread::scope(|s| {
            for comm in comms {
                let grid = grid.clone();
                s.spawn(move || {
                    let comm: Arc<dyn Communicator> = Arc::new(comm);
                    let rank = comm.rank();
                    let domains = grid.domains(comm).unwrap();
                    let ilc = InterLevelComm::new(domains[1].clone(), domains[0].clone()).unwrap();
                    for round in 1..5 {
                        let value = round as f64;
                        let mut coarse = Vector::new(&domains[1]);
                        coarse.set_with_ghost(value);
                        let mut ghost = ilc.ghost_vector().unwrap();
                        let pending = ilc.get_ghost_patches_start(&coarse).unwrap();
                        ilc.get_ghost_patches_finish(&mut ghost, pending).unwrap();
                        if rank == 1 {
                            assert!(ghost.patch_slice(0).iter().all(|&v| v == value));
                        }

                        ghost.set_with_ghost(2.0 * value);
                        let mut sum = Vector::new(&domains[1]);
                        let pending = ilc.send_ghost_patches_start(&ghost).unwrap();
                        ilc.send_ghost_patches_finish(&mut sum, pending).unwrap();
                        if rank == 0 {
                            assert!(sum.patch_slice(0).iter().all(|&v| v == 2.0 * value));
                        }
                    }
                });
            }
        });
    }
}
