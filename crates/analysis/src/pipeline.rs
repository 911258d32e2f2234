//! End-to-end barrier connectivity pipeline.
//!
//! Wires the stages in order — merge, snap, cut, network assembly,
//! statistics — over exclusively owned inputs. Fatal errors abort the
//! region and nothing is emitted; non-fatal findings accumulate into
//! the returned [`Diagnostics`]. Given identical inputs the outputs are
//! identical, down to row order.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use streamnet_core::io::{store_to_table, Column, Table};
use streamnet_core::{
    Barrier, Crs, Diagnostics, FlowlineStore, JoinTable, NameMatch, Result, SnappedBarrier,
};

use crate::cut::{cut_flowlines, BarrierJoin, CutParams};
use crate::merge::{merge_regions, validate_topology, MergeParams};
use crate::network::{build_networks, FunctionalNetwork};
use crate::snap::{snap_barriers, SnapParams};
use crate::stats::{barrier_networks, network_stats, BarrierNetworkRecord, FloodplainTable, NetworkStats};

/// Configuration for a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineParams {
    pub merge: MergeParams,
    pub snap: SnapParams,
    pub cut: CutParams,
}

/// Everything a successful run produces.
#[derive(Debug)]
pub struct PipelineOutput {
    /// The cut store; every cutting barrier sits on a segment endpoint.
    pub store: FlowlineStore,
    pub joins: JoinTable,
    pub snapped: Vec<SnappedBarrier>,
    pub barrier_joins: Vec<BarrierJoin>,
    pub networks: Vec<FunctionalNetwork>,
    /// Flowline id → network root id.
    pub assignment: BTreeMap<u64, u64>,
    pub network_stats: Vec<NetworkStats>,
    pub barrier_networks: Vec<BarrierNetworkRecord>,
    pub diagnostics: Diagnostics,
}

/// Run the full analysis for one region group.
pub fn run_pipeline(
    parts: Vec<(FlowlineStore, JoinTable)>,
    barriers: &[Barrier],
    floodplain: &FloodplainTable,
    params: &PipelineParams,
) -> Result<PipelineOutput> {
    let mut diagnostics = Diagnostics::new();

    let (mut store, mut joins) = merge_regions(parts, &params.merge, &mut diagnostics)?;
    validate_topology(&store, &joins)?;
    info!(flowlines = store.len(), joins = joins.len(), "region merged");

    let snapped = snap_barriers(&store, barriers, &params.snap, &mut diagnostics)?;
    let barrier_joins =
        cut_flowlines(&mut store, &mut joins, &snapped, &params.cut, &mut diagnostics)?;
    info!(flowlines = store.len(), "flowlines cut");

    let (networks, assignment) = build_networks(&store, &joins, &barrier_joins, &mut diagnostics)?;
    let stats = network_stats(&store, &networks, floodplain)?;
    let barrier_records = barrier_networks(&snapped, &barrier_joins, &assignment, &stats);
    info!(
        networks = networks.len(),
        diagnostics = diagnostics.len(),
        "pipeline complete"
    );

    Ok(PipelineOutput {
        store,
        joins,
        snapped,
        barrier_joins,
        networks,
        assignment,
        network_stats: stats,
        barrier_networks: barrier_records,
        diagnostics,
    })
}

/// Write the three output tables — cut flowlines (with `network_id`),
/// barrier networks, and per-network statistics — into `dir`.
///
/// Each table lands atomically; this is only called on a fully
/// successful run, so a failed region emits nothing.
pub fn write_outputs(output: &PipelineOutput, crs: &Crs, dir: &Path) -> Result<()> {
    store_to_table(&output.store, crs, Some(&output.assignment))?
        .write(&dir.join("flowlines.snt"))?;
    barrier_networks_table(&output.barrier_networks)?.write(&dir.join("barrier_networks.snt"))?;
    network_stats_table(&output.network_stats)?.write(&dir.join("network_stats.snt"))?;
    Ok(())
}

fn name_match_code(name_match: NameMatch) -> u8 {
    match name_match {
        NameMatch::Exact => 2,
        NameMatch::Fuzzy => 1,
        NameMatch::None => 0,
    }
}

fn barrier_networks_table(records: &[BarrierNetworkRecord]) -> Result<Table> {
    let mut table = Table::new();
    table.push_column(
        "barrier_id",
        Column::U64(records.iter().map(|r| r.barrier_id).collect()),
    )?;
    table.push_column(
        "upstream_network_id",
        Column::U64(records.iter().map(|r| r.upstream_network_id.unwrap_or(0)).collect()),
    )?;
    table.push_column(
        "downstream_network_id",
        Column::U64(records.iter().map(|r| r.downstream_network_id.unwrap_or(0)).collect()),
    )?;
    table.push_column(
        "gain_km",
        Column::F64(records.iter().map(|r| r.gain_km.unwrap_or(f64::NAN)).collect()),
    )?;
    table.push_column(
        "snap_dist",
        Column::F64(records.iter().map(|r| r.snap_dist).collect()),
    )?;
    table.push_column(
        "candidates_within_100m",
        Column::U64(records.iter().map(|r| r.candidates_within_100m as u64).collect()),
    )?;
    table.push_column(
        "name_match",
        Column::U8(records.iter().map(|r| name_match_code(r.name_match)).collect()),
    )?;
    table.push_column(
        "at_endpoint",
        Column::Bool(records.iter().map(|r| r.at_endpoint).collect()),
    )?;
    Ok(table)
}

fn network_stats_table(stats: &[NetworkStats]) -> Result<Table> {
    let mut table = Table::new();
    table.push_column(
        "network_id",
        Column::U64(stats.iter().map(|s| s.network_id).collect()),
    )?;
    table.push_column(
        "total_length_km",
        Column::F64(stats.iter().map(|s| s.total_length_km).collect()),
    )?;
    table.push_column(
        "perennial_length_km",
        Column::F64(stats.iter().map(|s| s.perennial_length_km).collect()),
    )?;
    table.push_column(
        "miles",
        Column::F64(stats.iter().map(|s| s.miles).collect()),
    )?;
    table.push_column(
        "num_segments",
        Column::U64(stats.iter().map(|s| s.num_segments as u64).collect()),
    )?;
    table.push_column(
        "size_classes_gained",
        Column::U64(stats.iter().map(|s| s.size_classes_gained as u64).collect()),
    )?;
    table.push_column(
        "sinuosity",
        Column::F64(stats.iter().map(|s| s.sinuosity_length_weighted).collect()),
    )?;
    table.push_column(
        "floodplain_natural_pct",
        Column::F64(
            stats
                .iter()
                .map(|s| s.floodplain_natural_pct.unwrap_or(f64::NAN))
                .collect(),
        ),
    )?;
    Ok(table)
}
