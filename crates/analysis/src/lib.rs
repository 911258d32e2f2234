//! # Streamnet Analysis
//!
//! Barrier connectivity analysis for hydrographic networks derived from
//! the NHD High Resolution flowlines.
//!
//! ## Stages
//!
//! - **merge**: concatenate per-basin extracts and stitch joins across
//!   basin borders
//! - **snap**: project barriers onto their nearest flowline with QA
//!   heuristics
//! - **cut**: split flowlines at barrier positions, mint segment ids,
//!   rewire the topology
//! - **network**: partition the cut graph into functional networks by
//!   upstream traversal
//! - **stats**: per-network length, sinuosity, size class and
//!   floodplain summaries
//!
//! [`pipeline::run_pipeline`] chains the stages over one region group;
//! every stage is also callable on its own.

pub mod cut;
pub mod merge;
pub mod network;
pub mod pipeline;
pub mod snap;
pub mod stats;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cut::{cut_flowlines, BarrierJoin, BarrierPredicate, CutParams, IdMinter};
    pub use crate::merge::{merge_regions, validate_topology, MergeParams};
    pub use crate::network::{build_networks, FunctionalNetwork, NetworkKind};
    pub use crate::pipeline::{run_pipeline, write_outputs, PipelineOutput, PipelineParams};
    pub use crate::snap::{snap_barriers, SnapParams};
    pub use crate::stats::{
        barrier_networks, network_stats, BarrierNetworkRecord, FloodplainTable, NetworkStats,
    };
    pub use streamnet_core::prelude::*;
}
