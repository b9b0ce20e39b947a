//! Ghost filling by point-to-point exchange
//!
//! The schedule is computed once from the domain's neighbor descriptors. Each pass then
//! runs the same steps:
//!
//! 1. zero the ghost regions of every face that has a neighbor,
//! 2. compute and send the slabs for neighbors on other ranks,
//! 3. compute and add the slabs for neighbors on this rank,
//! 4. add each patch's own contribution (non-conforming interfaces only),
//! 5. receive exactly the expected slabs, in any order, adding each as it arrives,
//! 6. wait for the sends to complete.
//!
//! Every message carries its full destination in its tag, so arrival order within a
//! pass does not matter. Messages of a later pass from the same sender always queue
//! behind those of the current pass.

use super::strategy::GhostFillStrategy;
use super::GhostFiller;
use crate::comm::{CommError, SendRequest, Tag};
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::face::{Face, GhostFillingType, NbrType, Orthant};
use crate::patch_info::NbrInfo;
use crate::vector::Vector;
use crate::view::{Region, View, ViewMut};
use std::collections::HashMap;
use std::sync::Arc;

/// (destination patch id, destination face index, source patch id)
type SlabKey = (usize, usize, usize);

/// One slab computed on this rank
#[derive(Debug, Clone)]
struct Outgoing<const D: usize> {
    src: usize,
    face: Face<D>,
    nbr_type: NbrType,
    orth: Orthant,
    dest: Destination,
}

#[derive(Debug, Clone, Copy)]
enum Destination {
    Local { index: usize },
    Remote { rank: usize, tag: Tag },
}

/// A slab expected from another rank
#[derive(Debug, Clone, Copy)]
struct Incoming<const D: usize> {
    source_rank: usize,
    dest: usize,
    dest_face: Face<D>,
}

#[derive(Debug, Default)]
struct Schedule<const D: usize> {
    zero: Vec<(usize, Face<D>)>,
    outgoing: Vec<Outgoing<D>>,
    self_fills: Vec<(usize, Face<D>, NbrType)>,
    incoming: HashMap<SlabKey, Incoming<D>>,
}

impl<const D: usize> Schedule<D> {
    fn num_remote_sends(&self) -> usize {
        self.outgoing
            .iter()
            .filter(|o| matches!(o.dest, Destination::Remote { .. }))
            .count()
    }
}

/// Ghost filler exchanging slabs between neighboring patches
#[derive(Debug)]
pub struct ExchangeGhostFiller<const D: usize, S> {
    domain: Arc<Domain<D>>,
    fill_type: GhostFillingType,
    strategy: S,
    schedule: Schedule<D>,
}

impl<const D: usize, S: GhostFillStrategy<D>> ExchangeGhostFiller<D, S> {
    /// Build the exchange schedule for `domain`.
    ///
    /// Fails with a configuration error when the strategy cannot handle the patch layout
    /// or one of the neighbor relations, or when a neighbor on this rank was not resolved.
    pub fn new(domain: Arc<Domain<D>>, fill_type: GhostFillingType, strategy: S) -> Result<Self> {
        strategy.check_layout(domain.ns(), domain.num_ghost_cells())?;
        let rank = domain.comm().rank();
        let mut schedule = Schedule::default();

        for pinfo in domain.patch_infos() {
            let i = pinfo.local_index;
            for face in Face::<D>::for_filling(fill_type) {
                let Some(info) = pinfo.nbr_info(face) else {
                    continue;
                };
                let nbr_type = info.nbr_type();
                if !strategy.supports(nbr_type) {
                    return Err(Error::config(format!(
                        "{} ghost filling cannot handle the {nbr_type:?} neighbor across {face} of patch {}",
                        strategy.name(),
                        pinfo.id
                    )));
                }
                schedule.zero.push((i, face));
                if nbr_type != NbrType::Normal {
                    schedule.self_fills.push((i, face, nbr_type));
                }

                let dest_face = face.opposite();
                let (ids, ranks, locals) = (info.ids(), info.ranks(), info.local_indexes());
                for k in 0..ids.len() {
                    let orth = match info {
                        NbrInfo::Normal { .. } => Orthant::whole(),
                        NbrInfo::Coarse { orth_on_coarse, .. } => *orth_on_coarse,
                        NbrInfo::Fine { .. } => Orthant::new(face.free_axes().len(), k),
                    };
                    let dest = if ranks[k] == rank {
                        let index = locals[k].ok_or_else(|| {
                            Error::config(format!(
                                "patch {} lists neighbor {} on rank {rank}, which does not own it",
                                pinfo.id, ids[k]
                            ))
                        })?;
                        Destination::Local { index }
                    } else {
                        schedule.incoming.insert(
                            (pinfo.id, face.index(), ids[k]),
                            Incoming {
                                source_rank: ranks[k],
                                dest: i,
                                dest_face: face,
                            },
                        );
                        Destination::Remote {
                            rank: ranks[k],
                            tag: Tag::Ghost {
                                domain: domain.id(),
                                dest_patch: ids[k],
                                dest_face: dest_face.index(),
                                source_patch: pinfo.id,
                            },
                        }
                    };
                    schedule.outgoing.push(Outgoing {
                        src: i,
                        face,
                        nbr_type,
                        orth,
                        dest,
                    });
                }
            }
        }

        log::info!(
            "ghost schedule for domain {} on rank {rank}: {} local transfers, {} sends, {} receives ({})",
            domain.id(),
            schedule.outgoing.len() - schedule.num_remote_sends(),
            schedule.num_remote_sends(),
            schedule.incoming.len(),
            strategy.name()
        );

        Ok(Self {
            domain,
            fill_type,
            strategy,
            schedule,
        })
    }

    /// Domain whose ghosts are filled
    pub fn domain(&self) -> &Arc<Domain<D>> {
        &self.domain
    }

    /// Resampling strategy
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Messages this rank sends per pass
    pub fn num_sends(&self) -> usize {
        self.schedule.num_remote_sends()
    }

    /// Messages this rank receives per pass
    pub fn num_receives(&self) -> usize {
        self.schedule.incoming.len()
    }

    fn check_vector(&self, u: &Vector<D>) -> Result<()> {
        if u.layout() != self.domain.layout()
            || u.num_local_patches() != self.domain.num_local_patches()
        {
            return Err(Error::Dimension {
                expected: self.domain.num_local_patches() * self.domain.layout().patch_stride(),
                got: u.num_local_patches() * u.layout().patch_stride(),
            });
        }
        Ok(())
    }

    fn slab_region(&self, dest_face: &Face<D>) -> Region<D> {
        Region::ghost(self.domain.ns(), dest_face, 0..self.domain.num_ghost_cells())
    }

    fn compute_slab(&self, u: &Vector<D>, out: &Outgoing<D>) -> (Region<D>, Vec<f64>) {
        let region = self.slab_region(&out.face.opposite());
        let mut data = vec![0.0; region.len()];
        self.strategy.fill_nbr_ghost(
            &u.patch_view(out.src),
            out.face,
            out.nbr_type,
            out.orth,
            self.domain.ns(),
            &mut ViewMut::new(&mut data, region),
        );
        (region, data)
    }

    fn receive_all(&self, u: &mut Vector<D>) -> Result<()> {
        let comm = self.domain.comm();
        let domain_id = self.domain.id();
        let mut pending: HashMap<SlabKey, Incoming<D>> = self.schedule.incoming.clone();

        while !pending.is_empty() {
            let received = comm.recv_matching(&mut |_, tag| match *tag {
                Tag::Ghost {
                    domain,
                    dest_patch,
                    dest_face,
                    source_patch,
                } => domain == domain_id && pending.contains_key(&(dest_patch, dest_face, source_patch)),
                _ => false,
            });
            let envelope = match received {
                Ok(envelope) => envelope,
                Err(CommError::Timeout { waited_ms }) => {
                    let mut missing: Vec<String> = pending
                        .keys()
                        .map(|(dest, face, src)| {
                            let face = Face::<D>::from_index(*face)
                                .map_or_else(|| face.to_string(), |f| f.to_string());
                            format!("patch {src} -> patch {dest} across {face}")
                        })
                        .collect();
                    missing.sort();
                    return Err(Error::protocol(
                        domain_id,
                        None,
                        format!(
                            "no ghost message after {waited_ms} ms, still missing: {}",
                            missing.join(", ")
                        ),
                    ));
                }
                Err(other) => return Err(other.into()),
            };

            let Tag::Ghost {
                dest_patch,
                dest_face,
                source_patch,
                ..
            } = envelope.tag
            else {
                return Err(Error::protocol(domain_id, None, "non-ghost message matched a ghost receive"));
            };
            let key = (dest_patch, dest_face, source_patch);
            let Some(incoming) = pending.remove(&key) else {
                return Err(Error::protocol(
                    domain_id,
                    Some(dest_patch),
                    format!("duplicate ghost message from patch {source_patch}"),
                ));
            };

            if envelope.source != incoming.source_rank {
                return Err(Error::protocol(
                    domain_id,
                    Some(dest_patch),
                    format!(
                        "unexpected sender: ghost slab from patch {source_patch} came from rank {}, expected rank {}",
                        envelope.source, incoming.source_rank
                    ),
                ));
            }
            let region = self.slab_region(&incoming.dest_face);
            if envelope.payload.len() != region.len() {
                return Err(Error::protocol(
                    domain_id,
                    Some(dest_patch),
                    format!(
                        "ghost slab from patch {source_patch} across {} has {} bytes, expected {}",
                        incoming.dest_face,
                        envelope.payload.len() * std::mem::size_of::<f64>(),
                        region.len() * std::mem::size_of::<f64>()
                    ),
                ));
            }
            u.patch_view_mut(incoming.dest)
                .add_view(&View::new(&envelope.payload, region));
        }
        Ok(())
    }
}

impl<const D: usize, S: GhostFillStrategy<D>> GhostFiller<D> for ExchangeGhostFiller<D, S> {
    fn fill_ghost(&self, u: &mut Vector<D>) -> Result<()> {
        self.check_vector(u)?;
        let w = self.domain.num_ghost_cells();
        let ns = self.domain.ns();

        for (i, face) in &self.schedule.zero {
            u.patch_view_mut(*i)
                .fill_region(&Region::ghost(ns, face, 0..w), 0.0);
        }

        let mut requests: Vec<SendRequest> = Vec::with_capacity(self.schedule.num_remote_sends());
        for out in &self.schedule.outgoing {
            if let Destination::Remote { rank, tag } = out.dest {
                let (_, data) = self.compute_slab(u, out);
                requests.push(self.domain.comm().isend(rank, tag, data)?);
            }
        }

        for out in &self.schedule.outgoing {
            if let Destination::Local { index } = out.dest {
                let (region, data) = self.compute_slab(u, out);
                u.patch_view_mut(index).add_view(&View::new(&data, region));
            }
        }

        for (i, face, nbr_type) in &self.schedule.self_fills {
            self.strategy
                .fill_local_ghost(&mut u.patch_view_mut(*i), *face, *nbr_type, ns);
        }

        self.receive_all(u)?;

        for request in requests {
            request.wait()?;
        }
        log::debug!(
            "filled ghosts of domain {} on rank {}",
            self.domain.id(),
            self.domain.comm().rank()
        );
        Ok(())
    }

    fn fill_type(&self) -> GhostFillingType {
        self.fill_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{Communicator, Envelope, ThreadComm};
    use crate::generators::UniformGrid;
    use crate::ghost::{CopyStrategy, GhostFillStrategy, LinearStrategy, QuadraticStrategy};
    use crate::patch_info::PatchInfo;
    use crate::tools::set_values;
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn single() -> Arc<dyn Communicator> {
        Arc::new(ThreadComm::single())
    }

    #[test]
    fn test_single_patch_is_a_no_op() {
        let grid = UniformGrid::<2>::new(1, 4, 1).unwrap();
        let domain = Arc::new(grid.domain(0, single()).unwrap());
        let filler =
            ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Corners, LinearStrategy).unwrap();
        assert_eq!(filler.num_sends(), 0);
        assert_eq!(filler.num_receives(), 0);

        let mut u = Vector::new(&domain);
        u.set_with_ghost(7.0);
        u.patch_view_mut(0).set([1, 2], 3.0);
        let before = u.clone();
        filler.fill_ghost(&mut u).unwrap();
        assert_eq!(u.patch_slice(0), before.patch_slice(0));
    }

    #[test]
    fn test_local_neighbors_copy_every_layer() {
        let grid = UniformGrid::<2>::new(2, 4, 2).unwrap();
        let domain = Arc::new(grid.domain(0, single()).unwrap());
        let filler =
            ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Corners, CopyStrategy).unwrap();
        let mut u = Vector::new(&domain);
        set_values(&domain, &mut u, |[x, y]| x + 10.0 * y).unwrap();
        filler.fill_ghost(&mut u).unwrap();

        // patch 0 is the lower-left patch; its upper neighbors supply ghosts
        let pinfo = domain.patch_info(0);
        let view = u.patch_view(0);
        for coord in [[4, 0], [5, 3], [1, 4], [2, 5], [4, 4], [5, 5]] {
            let [x, y] = pinfo.cell_center(coord);
            assert_abs_diff_eq!(view.get(coord), x + 10.0 * y, epsilon = 1e-12);
        }
        // domain boundary ghosts are untouched
        assert_eq!(view.get([-1, 0]), 0.0);
    }

    #[test]
    fn test_copy_rejects_refined_neighbors() {
        let mut coarse = PatchInfo::<2>::new(0, [2, 2], [0.0, 0.0], [0.5, 0.5], 1);
        let mut lower = PatchInfo::<2>::new(1, [2, 2], [1.0, 0.0], [0.25, 0.25], 1);
        let mut upper = PatchInfo::<2>::new(2, [2, 2], [1.0, 0.5], [0.25, 0.25], 1);
        coarse.set_nbr_info(Face::side(0, true), Some(NbrInfo::fine(vec![1, 2], vec![0, 0])));
        lower.set_nbr_info(Face::side(0, false), Some(NbrInfo::coarse(0, 0, Orthant::new(1, 0))));
        upper.set_nbr_info(Face::side(0, false), Some(NbrInfo::coarse(0, 0, Orthant::new(1, 1))));
        let domain = Arc::new(Domain::new(single(), 0, [2, 2], 1, vec![coarse, lower, upper]).unwrap());

        let err = ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Faces, CopyStrategy)
            .unwrap_err();
        assert!(err.is_configuration_error());

        // the linear rule handles the same interface and is exact for linear fields
        let filler =
            ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Faces, LinearStrategy).unwrap();
        let mut u = Vector::new(&domain);
        set_values(&domain, &mut u, |[x, y]| 2.0 * x - y).unwrap();
        filler.fill_ghost(&mut u).unwrap();
        for (i, coord) in [(0, [2, 0]), (0, [2, 1]), (1, [-1, 0]), (1, [-1, 1]), (2, [-1, 1])] {
            let [x, y] = domain.patch_info(i).cell_center(coord);
            assert_abs_diff_eq!(u.patch_view(i).get(coord), 2.0 * x - y, epsilon = 1e-12);
        }
    }

    /// Counts ghost messages passing through a communicator
    #[derive(Debug)]
    struct CountingComm {
        inner: ThreadComm,
        sends: AtomicUsize,
        receives: AtomicUsize,
    }

    impl Communicator for CountingComm {
        fn rank(&self) -> usize {
            self.inner.rank()
        }

        fn size(&self) -> usize {
            self.inner.size()
        }

        fn isend(&self, dest: usize, tag: Tag, payload: Vec<f64>) -> std::result::Result<SendRequest, CommError> {
            if matches!(tag, Tag::Ghost { .. }) {
                self.sends.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.isend(dest, tag, payload)
        }

        fn recv_matching(
            &self,
            accept: &mut dyn FnMut(usize, &Tag) -> bool,
        ) -> std::result::Result<Envelope, CommError> {
            let envelope = self.inner.recv_matching(accept)?;
            if matches!(envelope.tag, Tag::Ghost { .. }) {
                self.receives.fetch_add(1, Ordering::SeqCst);
            }
            Ok(envelope)
        }
    }

    fn counting_world(size: usize) -> Vec<Arc<CountingComm>> {
        ThreadComm::world(size)
            .into_iter()
            .map(|inner| {
                Arc::new(CountingComm {
                    inner,
                    sends: AtomicUsize::new(0),
                    receives: AtomicUsize::new(0),
                })
            })
            .collect()
    }

    /// Every side ghost facing a neighbor holds `field` at its cell center
    fn assert_side_ghosts(domain: &Domain<2>, u: &Vector<2>, field: impl Fn(f64, f64) -> f64) {
        for pinfo in domain.patch_infos() {
            let view = u.patch_view(pinfo.local_index);
            for face in Face::<2>::sides() {
                if !pinfo.has_nbr(face) {
                    continue;
                }
                Region::ghost(pinfo.ns, &face, 0..1).for_each(|c| {
                    let [x, y] = pinfo.cell_center(c);
                    assert_abs_diff_eq!(view.get(c), field(x, y), epsilon = 1e-12);
                });
            }
        }
    }

    #[test]
    fn test_two_ranks_exchange_two_messages_each() {
        let grid = UniformGrid::<2>::new(2, 4, 1).unwrap();
        let comms = counting_world(2);

        thread::scope(|s| {
            for comm in &comms {
                let grid = &grid;
                s.spawn(move || {
                    let domain = Arc::new(grid.domain(0, comm.clone()).unwrap());
                    let filler =
                        ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Faces, CopyStrategy)
                            .unwrap();
                    let mut u = Vector::new(&domain);
                    set_values(&domain, &mut u, |[x, y]| x * x + 3.0 * y).unwrap();
                    comm.sends.store(0, Ordering::SeqCst);
                    comm.receives.store(0, Ordering::SeqCst);

                    filler.fill_ghost(&mut u).unwrap();
                    assert_eq!(comm.sends.load(Ordering::SeqCst), 2);
                    assert_eq!(comm.receives.load(Ordering::SeqCst), 2);

                    assert_side_ghosts(&domain, &u, |x, y| x * x + 3.0 * y);
                });
            }
        });
    }

    /// A coarse patch on `[0, 1]^2` with two fine neighbors across its upper x side
    fn coarse_with_fine_nbrs(n: usize, coarse_rank: usize, fine_rank: usize) -> Vec<PatchInfo<2>> {
        let hc = 1.0 / n as f64;
        let hf = hc / 2.0;
        let mut coarse = PatchInfo::<2>::new(0, [n, n], [0.0, 0.0], [hc, hc], 1);
        coarse.rank = coarse_rank;
        coarse.set_nbr_info(
            Face::side(0, true),
            Some(NbrInfo::fine(vec![1, 2], vec![fine_rank, fine_rank])),
        );
        let mut patches = vec![coarse];
        for k in 0..2 {
            let mut fine = PatchInfo::<2>::new(1 + k, [n, n], [1.0, 0.5 * k as f64], [hf, hf], 1);
            fine.rank = fine_rank;
            fine.set_nbr_info(
                Face::side(0, false),
                Some(NbrInfo::coarse(0, coarse_rank, Orthant::new(1, k))),
            );
            // the two fine patches touch along y
            fine.set_nbr_info(Face::side(1, k == 0), Some(NbrInfo::normal(2 - k, fine_rank)));
            patches.push(fine);
        }
        patches
    }

    /// Fill ghosts across a coarse/fine side split over two ranks, in both ownership orders
    fn check_refined_interface_on_two_ranks<S>(strategy: S, n: usize, field: fn(f64, f64) -> f64)
    where
        S: GhostFillStrategy<2> + Copy,
    {
        for (coarse_rank, fine_rank) in [(0, 1), (1, 0)] {
            let comms = counting_world(2);
            thread::scope(|s| {
                for comm in &comms {
                    s.spawn(move || {
                        let local: Vec<PatchInfo<2>> = coarse_with_fine_nbrs(n, coarse_rank, fine_rank)
                            .into_iter()
                            .filter(|p| p.rank == comm.rank())
                            .collect();
                        let domain = Arc::new(Domain::new(comm.clone(), 0, [n, n], 1, local).unwrap());
                        let filler =
                            ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Faces, strategy)
                                .unwrap();
                        assert_eq!(filler.num_sends(), 2);
                        assert_eq!(filler.num_receives(), 2);

                        let mut u = Vector::new(&domain);
                        set_values(&domain, &mut u, |[x, y]| field(x, y)).unwrap();
                        for _ in 0..3 {
                            comm.sends.store(0, Ordering::SeqCst);
                            comm.receives.store(0, Ordering::SeqCst);
                            filler.fill_ghost(&mut u).unwrap();
                            assert_eq!(comm.sends.load(Ordering::SeqCst), 2);
                            assert_eq!(comm.receives.load(Ordering::SeqCst), 2);
                            assert_side_ghosts(&domain, &u, field);
                        }
                    });
                }
            });
        }
    }

    #[test]
    fn test_linear_refined_interface_across_ranks() {
        check_refined_interface_on_two_ranks(LinearStrategy, 2, |x, y| 2.0 * x - y + 0.25);
    }

    #[test]
    fn test_quadratic_refined_interface_across_ranks() {
        check_refined_interface_on_two_ranks(QuadraticStrategy, 4, |x, y| {
            x * x - 3.0 * x * y + 2.0 * y * y - x
        });
    }

    #[test]
    fn test_wrong_sender_and_missing_slabs_are_protocol_errors() {
        let grid = UniformGrid::<2>::new(2, 2, 1).unwrap();
        // rank 0's half of a two-rank grid, driven from a single-rank group
        let comm = Arc::new(ThreadComm::single().with_timeout(Duration::from_millis(200)));
        let local: Vec<PatchInfo<2>> = grid
            .patch_infos(0, 2)
            .into_iter()
            .filter(|p| p.rank == 0)
            .collect();
        let domain = Arc::new(Domain::new(comm.clone(), 0, [2, 2], 1, local).unwrap());
        let filler =
            ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Faces, CopyStrategy).unwrap();
        assert_eq!(filler.num_receives(), 2);
        let mut u = Vector::new(&domain);

        let tag = Tag::Ghost {
            domain: 0,
            dest_patch: 0,
            dest_face: Face::<2>::side(1, true).index(),
            source_patch: 2,
        };
        comm.isend(0, tag, vec![0.0; 2]).unwrap().wait().unwrap();
        let err = filler.receive_all(&mut u).unwrap_err();
        assert!(err.is_protocol_error());
        assert!(err.to_string().contains("unexpected sender"));

        let err = filler.receive_all(&mut u).unwrap_err();
        assert!(err.is_protocol_error());
        assert!(err.to_string().contains("still missing"));
    }
}
