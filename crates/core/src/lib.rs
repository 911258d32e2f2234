//! # Streamnet Core
//!
//! Core types, topology and I/O for the streamnet hydrographic network
//! analysis library.
//!
//! This crate provides:
//! - `Flowline` / `FlowlineStore`: directed stream segments with a
//!   rebuildable spatial index
//! - `JoinTable`: bidirectional directed topology with sentinel
//!   origin/terminus semantics
//! - `Barrier`, `Snap`: point obstructions and their snap results
//! - `Crs`: coordinate reference tagging and mismatch detection
//! - `Diagnostics`: non-fatal findings returned alongside outputs
//! - Columnar binary tables with WKB geometry for intermediates
//!
//! The analysis stages that operate on these types live in
//! `streamnet-analysis`.

pub mod barrier;
pub mod crs;
pub mod diagnostics;
pub mod error;
pub mod flowline;
pub mod geometry;
pub mod index;
pub mod io;
pub mod joins;
pub mod store;

pub use barrier::{Barrier, BarrierKind, NameMatch, Snap, SnappedBarrier};
pub use crs::Crs;
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{Error, Result};
pub use flowline::{Flowline, SizeClass};
pub use index::{Bbox, RTree};
pub use joins::{JoinTable, SENTINEL};
pub use store::FlowlineStore;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::barrier::{Barrier, BarrierKind, NameMatch, Snap, SnappedBarrier};
    pub use crate::crs::Crs;
    pub use crate::diagnostics::{Diagnostic, Diagnostics};
    pub use crate::error::{Error, Result};
    pub use crate::flowline::{Flowline, SizeClass};
    pub use crate::index::Bbox;
    pub use crate::joins::{JoinTable, SENTINEL};
    pub use crate::store::FlowlineStore;
}
