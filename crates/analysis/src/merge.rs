//! Region merging: concatenate per-basin extracts and stitch joins
//! across basin borders.
//!
//! Basins are extracted independently, so a river crossing a HUC4
//! border appears as a terminus in the upstream basin and an origin in
//! the downstream one. Merging unions the stores and join tables, then
//! replaces matching sentinel pairs with a real edge. The result is the
//! same whatever order the basins are supplied in.

use std::collections::BTreeMap;
use tracing::debug;

use streamnet_core::{
    Bbox, Diagnostic, Diagnostics, Error, FlowlineStore, JoinTable, Result, SENTINEL,
};

/// Parameters for region merging
#[derive(Debug, Clone)]
pub struct MergeParams {
    /// Maximum gap between a terminus and the origin that continues it,
    /// in meters.
    pub border_tolerance: f64,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            border_tolerance: 0.01,
        }
    }
}

/// Merge per-basin `(store, joins)` pairs into one region.
///
/// Errors with `DuplicateAcrossBasins` when two basins carry the same
/// flowline id. Border termini with more than one candidate
/// continuation are left as sentinels and reported as
/// [`Diagnostic::BorderAmbiguity`].
pub fn merge_regions(
    parts: Vec<(FlowlineStore, JoinTable)>,
    params: &MergeParams,
    diagnostics: &mut Diagnostics,
) -> Result<(FlowlineStore, JoinTable)> {
    let mut store = FlowlineStore::new();
    let mut joins = JoinTable::new();

    for (part_store, part_joins) in parts {
        for flowline in part_store.into_flowlines() {
            if let Ok(existing) = store.get(flowline.id) {
                return Err(Error::DuplicateAcrossBasins {
                    id: flowline.id,
                    huc4_a: existing.huc4.clone(),
                    huc4_b: flowline.huc4,
                });
            }
            store.insert(flowline)?;
        }
        for (u, d) in part_joins.iter() {
            joins.add(u, d);
        }
    }
    store.rebuild();

    stitch_borders(&store, &mut joins, params, diagnostics)?;

    debug!(
        flowlines = store.len(),
        joins = joins.len(),
        "merged region group"
    );
    Ok((store, joins))
}

/// Reconnect flowlines split by basin export: for every terminus whose
/// end point coincides with exactly one origin's start point in a
/// different basin, drop both sentinels and add the real edge.
fn stitch_borders(
    store: &FlowlineStore,
    joins: &mut JoinTable,
    params: &MergeParams,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let tolerance = params.border_tolerance;
    let mut stitches: Vec<(u64, u64)> = Vec::new();

    for flowline in store.iter() {
        let downs: Vec<u64> = joins.downstream_of(flowline.id).collect();
        if downs != [SENTINEL] {
            continue;
        }
        let end = flowline.end_point();
        let window = Bbox::around_point(end.x, end.y, tolerance);

        let mut candidates: Vec<u64> = Vec::new();
        for candidate_id in store.within(&window)? {
            if candidate_id == flowline.id {
                continue;
            }
            let candidate = store.get(candidate_id)?;
            if candidate.huc4 == flowline.huc4 {
                continue;
            }
            let start = candidate.start_point();
            let gap = ((start.x - end.x).powi(2) + (start.y - end.y).powi(2)).sqrt();
            if gap > tolerance {
                continue;
            }
            let ups: Vec<u64> = joins.upstream_of(candidate_id).collect();
            if ups != [SENTINEL] {
                continue;
            }
            candidates.push(candidate_id);
        }

        match candidates.len() {
            0 => {}
            1 => stitches.push((flowline.id, candidates[0])),
            _ => diagnostics.push(Diagnostic::BorderAmbiguity {
                flowline: flowline.id,
                candidates,
            }),
        }
    }

    for (a, b) in stitches {
        joins.remove(a, SENTINEL);
        joins.remove(SENTINEL, b);
        joins.add(a, b);
    }
    Ok(())
}

/// Verify the merged topology: every join endpoint exists (or is the
/// sentinel), and the graph is acyclic apart from edges flagged as
/// loops on both ends.
pub fn validate_topology(store: &FlowlineStore, joins: &JoinTable) -> Result<()> {
    for (u, d) in joins.iter() {
        if u != SENTINEL && !store.contains(u) {
            return Err(Error::InvalidJoin { upstream: u, downstream: d });
        }
        if d != SENTINEL && !store.contains(d) {
            return Err(Error::InvalidJoin { upstream: u, downstream: d });
        }
    }

    // Downstream adjacency over real edges, skipping loop-flagged pairs
    let mut adjacency: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for (u, d) in joins.iter() {
        if u == SENTINEL || d == SENTINEL {
            continue;
        }
        if store.get(u)?.loop_flag && store.get(d)?.loop_flag {
            continue;
        }
        adjacency.entry(u).or_default().push(d);
    }

    // Iterative DFS coloring: 1 = on stack, 2 = finished
    let mut color: BTreeMap<u64, u8> = BTreeMap::new();
    let starts: Vec<u64> = adjacency.keys().copied().collect();
    for start in starts {
        if color.contains_key(&start) {
            continue;
        }
        color.insert(start, 1);
        let mut stack: Vec<(u64, usize)> = vec![(start, 0)];
        while let Some(top) = stack.last_mut() {
            let (node, child_idx) = *top;
            let next = adjacency.get(&node).and_then(|v| v.get(child_idx)).copied();
            match next {
                Some(child) => {
                    top.1 += 1;
                    match color.get(&child) {
                        Some(1) => return Err(Error::CycleDetected(child)),
                        Some(_) => {}
                        None => {
                            color.insert(child, 1);
                            stack.push((child, 0));
                        }
                    }
                }
                None => {
                    color.insert(node, 2);
                    stack.pop();
                }
            }
        }
    }
    Ok(())
}
