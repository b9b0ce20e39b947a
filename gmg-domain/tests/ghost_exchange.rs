//! Ghost exchange across ranks
//!
//! Every test runs one OS thread per rank over the in-process transport.

use approx::assert_abs_diff_eq;
use patchgmg_domain::tools::set_values;
use patchgmg_domain::{
    check_neighbor_symmetry, Communicator, CopyStrategy, ExchangeGhostFiller, Face,
    GhostFiller, GhostFillingType, LinearStrategy, Region, ThreadComm, UniformGrid, Vector,
};
use std::sync::Arc;
use std::thread;

/// Run `f(comm)` on `size` ranks and collect the results in rank order
fn run_ranks<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(Arc<dyn Communicator>) -> T + Sync,
{
    let comms = ThreadComm::world(size);
    thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let f = &f;
                s.spawn(move || f(Arc::new(comm)))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

/// Check every ghost cell facing a neighbor against `field` at its center
fn assert_ghosts_match<const D: usize>(
    u: &Vector<D>,
    domain: &patchgmg_domain::Domain<D>,
    fill_type: GhostFillingType,
    layers: usize,
    field: impl Fn([f64; D]) -> f64,
) -> usize {
    let mut checked = 0;
    for pinfo in domain.patch_infos() {
        let view = u.patch_view(pinfo.local_index);
        for face in Face::<D>::for_filling(fill_type) {
            if !pinfo.has_nbr(face) {
                continue;
            }
            Region::ghost(pinfo.ns, &face, 0..layers).for_each(|c| {
                assert_abs_diff_eq!(view.get(c), field(pinfo.cell_center(c)), epsilon = 1e-12);
                checked += 1;
            });
        }
    }
    checked
}

#[test]
fn test_generated_grids_are_symmetric() {
    for ranks in [1, 2, 3, 5] {
        let grid = UniformGrid::<3>::new(4, 2, 1).unwrap();
        for level in 0..grid.num_levels() {
            check_neighbor_symmetry(&grid.patch_infos(level, ranks)).unwrap();
        }
    }
}

#[test]
fn test_2d_corners_on_four_ranks() {
    let grid = UniformGrid::<2>::new(4, 4, 2).unwrap();
    let field = |[x, y]: [f64; 2]| (3.0 * x).sin() + y * y;
    let checked = run_ranks(4, |comm| {
        let domain = Arc::new(grid.domain(0, comm).unwrap());
        let filler =
            ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Corners, CopyStrategy).unwrap();
        let mut u = Vector::new(&domain);
        set_values(&domain, &mut u, field).unwrap();
        filler.fill_ghost(&mut u).unwrap();
        assert_ghosts_match(&u, &domain, GhostFillingType::Corners, 2, field)
    });
    // 24 interior interfaces, 2 layers of 4 cells each way, plus 18 corner pairs of 4 cells
    assert_eq!(checked.iter().sum::<usize>(), 24 * 2 * 8 + 18 * 2 * 4);
}

#[test]
fn test_3d_edges_on_three_ranks() {
    let grid = UniformGrid::<3>::new(2, 4, 1).unwrap();
    let field = |[x, y, z]: [f64; 3]| x - 2.0 * y + 0.5 * z * x;
    let results = run_ranks(3, |comm| {
        let domain = Arc::new(grid.domain(0, comm).unwrap());
        let filler =
            ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Edges, LinearStrategy).unwrap();
        let mut u = Vector::new(&domain);
        set_values(&domain, &mut u, field).unwrap();
        filler.fill_ghost(&mut u).unwrap();
        assert_ghosts_match(&u, &domain, GhostFillingType::Edges, 1, field);
        (filler.num_sends(), filler.num_receives())
    });
    for (sends, receives) in results {
        assert_eq!(sends, receives);
    }
}

#[test]
fn test_repeated_passes_see_fresh_values() {
    let grid = UniformGrid::<2>::new(2, 4, 1).unwrap();
    run_ranks(2, |comm| {
        let domain = Arc::new(grid.domain(0, comm).unwrap());
        let filler =
            ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Faces, CopyStrategy).unwrap();
        let mut u = Vector::new(&domain);
        for pass in 0..5 {
            let scale = (pass + 1) as f64;
            set_values(&domain, &mut u, |[x, y]| scale * (x + y)).unwrap();
            filler.fill_ghost(&mut u).unwrap();
            assert_ghosts_match(&u, &domain, GhostFillingType::Faces, 1, |[x, y]| {
                scale * (x + y)
            });
        }
    });
}

#[test]
fn test_rank_count_does_not_change_ghosts() {
    let grid = UniformGrid::<2>::new(4, 2, 1).unwrap();
    let field = |[x, y]: [f64; 2]| (x * 7.0).cos() * y;
    let gather = |comm: Arc<dyn Communicator>| {
        let domain = Arc::new(grid.domain(0, comm).unwrap());
        let filler =
            ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Corners, LinearStrategy).unwrap();
        let mut u = Vector::new(&domain);
        set_values(&domain, &mut u, field).unwrap();
        filler.fill_ghost(&mut u).unwrap();
        domain
            .patch_infos()
            .iter()
            .map(|p| (p.id, u.patch_slice(p.local_index).to_vec()))
            .collect::<Vec<_>>()
    };
    let mut serial: Vec<_> = run_ranks(1, gather).into_iter().flatten().collect();
    let mut parallel: Vec<_> = run_ranks(4, gather).into_iter().flatten().collect();
    serial.sort_by_key(|(id, _)| *id);
    parallel.sort_by_key(|(id, _)| *id);
    assert_eq!(serial, parallel);
}
