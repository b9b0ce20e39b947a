//! Patch domains for geometric multigrid
//!
//! This crate holds the distributed data model of a patch-based multigrid solver:
//!
//! - [`Communicator`] and the in-process [`ThreadComm`] transport
//! - [`Face`] / [`Orthant`] boundary geometry and [`PatchInfo`] neighbor descriptors
//! - [`Domain`], the patches of one level owned by a rank
//! - [`Vector`] fields with ghost layers, accessed through [`View`] / [`ViewMut`]
//! - [`GhostFiller`] implementations that keep ghost layers consistent across ranks
//! - [`UniformGrid`], a generator of uniform level hierarchies
//!
//! # Example
//!
//! ```
//! use patchgmg_domain::{
//!     ExchangeGhostFiller, GhostFiller, GhostFillingType, LinearStrategy, ThreadComm,
//!     UniformGrid, Vector,
//! };
//! use std::sync::Arc;
//!
//! let grid = UniformGrid::<2>::new(2, 8, 1).unwrap();
//! let domain = Arc::new(grid.domain(0, Arc::new(ThreadComm::single())).unwrap());
//! let filler = ExchangeGhostFiller::new(domain.clone(), GhostFillingType::Faces, LinearStrategy).unwrap();
//!
//! let mut u = Vector::new(&domain);
//! u.set(1.0);
//! filler.fill_ghost(&mut u).unwrap();
//! assert_eq!(u.patch_view(0).get([8, 0]), 1.0);
//! ```

pub mod comm;
pub mod domain;
pub mod error;
pub mod face;
pub mod generators;
pub mod ghost;
pub mod operator;
pub mod parallel;
pub mod patch_info;
pub mod tools;
pub mod vector;
pub mod view;

pub use comm::{CommError, Communicator, Envelope, SendRequest, Tag, ThreadComm, TransferPhase};
pub use domain::Domain;
pub use error::{Error, Result};
pub use face::{AxisPos, Face, GhostFillingType, NbrType, Orthant};
pub use generators::UniformGrid;
pub use ghost::{
    CopyStrategy, ExchangeGhostFiller, GhostFillStrategy, GhostFiller, InjectionStrategy,
    LinearStrategy, QuadraticStrategy,
};
pub use operator::{IdentityOperator, LinearOperator};
pub use patch_info::{check_neighbor_symmetry, NbrInfo, PatchInfo};
pub use vector::{PatchLayout, Vector};
pub use view::{Region, View, ViewMut};
