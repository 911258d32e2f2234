//! Flowline cutting at snapped barrier positions.
//!
//! Every cutting barrier must end up on a segment endpoint. Interior
//! snaps split their flowline into children with freshly minted ids and
//! rewired joins; endpoint snaps ride on the joins that are already
//! there. A sidecar table records, per barrier, the segment immediately
//! upstream and downstream — the network builder roots its traversals
//! on those.

use std::collections::BTreeMap;
use tracing::debug;

use streamnet_core::geometry::split_at_positions;
use streamnet_core::{
    BarrierKind, Diagnostic, Diagnostics, Error, FlowlineStore, JoinTable, Result,
    SnappedBarrier, SENTINEL,
};

/// Cut positions closer together than this merge into a single cut;
/// the barriers involved share the resulting endpoint.
const CUT_MERGE_EPSILON: f64 = 0.001;

/// Decides which barrier kinds sever the network for a given analysis.
pub type BarrierPredicate = fn(BarrierKind) -> bool;

fn cuts_all(_: BarrierKind) -> bool {
    true
}

/// Parameters for flowline cutting
#[derive(Debug, Clone)]
pub struct CutParams {
    /// Lowest id the minter may issue; it also always stays above every
    /// id already in the store.
    pub id_counter_base: u64,
    /// Which barrier kinds cut the network.
    pub cuts: BarrierPredicate,
}

impl Default for CutParams {
    fn default() -> Self {
        Self {
            id_counter_base: 1,
            cuts: cuts_all,
        }
    }
}

/// Pipeline-scoped monotonic id allocator for cut products.
#[derive(Debug)]
pub struct IdMinter {
    next: u64,
}

impl IdMinter {
    /// Start minting at `base`, raised above the store's current maximum.
    pub fn above(store: &FlowlineStore, base: u64) -> Self {
        Self {
            next: base.max(store.max_id() + 1),
        }
    }

    /// Issue the next id. Errors with `IdCollision` if it is somehow
    /// already taken.
    pub fn mint(&mut self, store: &FlowlineStore) -> Result<u64> {
        let id = self.next;
        self.next += 1;
        if store.contains(id) {
            return Err(Error::IdCollision(id));
        }
        Ok(id)
    }
}

/// Barrier-to-adjacent-segment mapping recorded during cutting. The
/// sentinel appears when a barrier sits on a network origin or terminus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierJoin {
    pub barrier_id: u64,
    pub upstream_id: u64,
    pub downstream_id: u64,
}

/// Cut the store at every on-network barrier the predicate selects.
///
/// Mutates the store and joins in place, rebuilds the spatial index
/// once at the end, and returns the barrier sidecar table. Barriers
/// snapped to the identical position on the identical flowline as a
/// lower-id barrier are dropped with a diagnostic.
pub fn cut_flowlines(
    store: &mut FlowlineStore,
    joins: &mut JoinTable,
    snapped: &[SnappedBarrier],
    params: &CutParams,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<BarrierJoin>> {
    // (position, barrier id) per target flowline, cutting barriers only
    let mut by_line: BTreeMap<u64, Vec<(f64, u64)>> = BTreeMap::new();
    for sb in snapped {
        let Some(snap) = &sb.snap else { continue };
        if !(params.cuts)(sb.barrier.kind) {
            continue;
        }
        by_line
            .entry(snap.flowline_id)
            .or_default()
            .push((snap.position, sb.barrier.id));
    }

    let mut minter = IdMinter::above(store, params.id_counter_base);
    let mut barrier_joins: Vec<BarrierJoin> = Vec::new();
    let mut cut_count = 0usize;

    for (line_id, mut positions) in by_line {
        positions.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        drop_duplicate_locations(&mut positions, diagnostics);

        let parent = store.get(line_id)?.clone();

        // Partition into endpoint barriers and interior cut clusters
        let mut upstream_end: Vec<u64> = Vec::new();
        let mut downstream_end: Vec<u64> = Vec::new();
        let mut clusters: Vec<(f64, Vec<u64>)> = Vec::new();
        for (position, barrier_id) in positions {
            if position <= CUT_MERGE_EPSILON {
                upstream_end.push(barrier_id);
            } else if parent.length - position <= CUT_MERGE_EPSILON {
                downstream_end.push(barrier_id);
            } else {
                match clusters.last_mut() {
                    Some((at, barriers)) if position - *at <= CUT_MERGE_EPSILON => {
                        barriers.push(barrier_id);
                    }
                    _ => clusters.push((position, vec![barrier_id])),
                }
            }
        }

        // Split, replace, rewire
        let (first_id, last_id) = if clusters.is_empty() {
            (line_id, line_id)
        } else {
            let cut_positions: Vec<f64> = clusters.iter().map(|(at, _)| *at).collect();
            let pieces = split_at_positions(&parent.geometry, &cut_positions);
            let mut child_ids = Vec::with_capacity(pieces.len());
            for _ in &pieces {
                child_ids.push(minter.mint(store)?);
            }

            store.remove(line_id)?;
            let mut total = 0.0;
            for (child_id, piece) in child_ids.iter().zip(pieces) {
                let child = parent.child(*child_id, piece)?;
                total += child.length;
                store.insert(child)?;
            }
            debug_assert!(
                (total - parent.length).abs() <= 0.001,
                "cut length drift: {} vs {}",
                total,
                parent.length
            );

            let predecessors: Vec<u64> = joins.upstream_of(line_id).collect();
            for u in predecessors {
                joins.remove(u, line_id);
                joins.add(u, child_ids[0]);
            }
            let successors: Vec<u64> = joins.downstream_of(line_id).collect();
            for d in successors {
                joins.remove(line_id, d);
                joins.add(child_ids[child_ids.len() - 1], d);
            }
            for pair in child_ids.windows(2) {
                joins.add(pair[0], pair[1]);
            }

            for (i, (_, barriers)) in clusters.iter().enumerate() {
                for &barrier_id in barriers {
                    barrier_joins.push(BarrierJoin {
                        barrier_id,
                        upstream_id: child_ids[i],
                        downstream_id: child_ids[i + 1],
                    });
                }
            }
            cut_count += clusters.len();
            (child_ids[0], child_ids[child_ids.len() - 1])
        };

        // Endpoint barriers map onto the joins already in place; a
        // barrier on an origin or terminus keeps the sentinel side.
        for barrier_id in upstream_end {
            let mut predecessors: Vec<u64> = joins.upstream_of(first_id).collect();
            if predecessors.is_empty() {
                predecessors.push(SENTINEL);
            }
            for u in predecessors {
                barrier_joins.push(BarrierJoin {
                    barrier_id,
                    upstream_id: u,
                    downstream_id: first_id,
                });
            }
        }
        for barrier_id in downstream_end {
            let mut successors: Vec<u64> = joins.downstream_of(last_id).collect();
            if successors.is_empty() {
                successors.push(SENTINEL);
            }
            for d in successors {
                barrier_joins.push(BarrierJoin {
                    barrier_id,
                    upstream_id: last_id,
                    downstream_id: d,
                });
            }
        }
    }

    store.rebuild();
    debug!(
        cuts = cut_count,
        flowlines = store.len(),
        barrier_joins = barrier_joins.len(),
        "cut flowlines"
    );
    Ok(barrier_joins)
}

/// Remove barriers snapped to the identical position as an earlier
/// (lower-id) barrier on the same flowline. `positions` must already be
/// sorted by (position, barrier id).
fn drop_duplicate_locations(positions: &mut Vec<(f64, u64)>, diagnostics: &mut Diagnostics) {
    let mut kept: Vec<(f64, u64)> = Vec::with_capacity(positions.len());
    for &(position, barrier_id) in positions.iter() {
        match kept.last() {
            Some(&(prev_position, prev_id)) if prev_position == position => {
                diagnostics.push(Diagnostic::DuplicateBarrierLocation {
                    barrier: barrier_id,
                    duplicate_of: prev_id,
                });
            }
            _ => kept.push((position, barrier_id)),
        }
    }
    *positions = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point};
    use streamnet_core::geometry::line_length;
    use streamnet_core::{Barrier, Flowline, NameMatch, SizeClass, Snap};

    fn flowline(id: u64, coords: Vec<(f64, f64)>) -> Flowline {
        Flowline::new(id, LineString::from(coords), "0601", SizeClass::Creek).unwrap()
    }

    fn snapped(barrier_id: u64, flowline_id: u64, position: f64, point: (f64, f64)) -> SnappedBarrier {
        snapped_at(barrier_id, flowline_id, position, point, false)
    }

    fn snapped_at(
        barrier_id: u64,
        flowline_id: u64,
        position: f64,
        point: (f64, f64),
        at_endpoint: bool,
    ) -> SnappedBarrier {
        SnappedBarrier {
            barrier: Barrier::new(barrier_id, BarrierKind::Dam, point.0, point.1),
            snap: Some(Snap {
                flowline_id,
                point: Point::new(point.0, point.1),
                snap_dist: 0.0,
                position,
                candidates_within_100m: 1,
                name_match: NameMatch::None,
                at_endpoint,
            }),
        }
    }

    fn single_line_setup() -> (FlowlineStore, JoinTable) {
        let store =
            FlowlineStore::from_flowlines([flowline(1, vec![(0.0, 0.0), (100.0, 0.0)])]).unwrap();
        let joins = JoinTable::from_edges([(SENTINEL, 1), (1, SENTINEL)]);
        (store, joins)
    }

    #[test]
    fn test_single_midspan_cut() {
        let (mut store, mut joins) = single_line_setup();
        let mut diags = Diagnostics::new();
        let barriers = [snapped(10, 1, 50.0, (50.0, 0.0))];

        let barrier_joins = cut_flowlines(
            &mut store,
            &mut joins,
            &barriers,
            &CutParams::default(),
            &mut diags,
        )
        .unwrap();

        // Parent replaced by two children with minted ids
        assert_eq!(store.len(), 2);
        assert!(!store.contains(1));
        let upstream = store.get(2).unwrap();
        let downstream = store.get(3).unwrap();
        assert_eq!(upstream.geometry, LineString::from(vec![(0.0, 0.0), (50.0, 0.0)]));
        assert_eq!(downstream.geometry, LineString::from(vec![(50.0, 0.0), (100.0, 0.0)]));

        // Joins rewired through the children
        assert!(joins.contains(SENTINEL, 2));
        assert!(joins.contains(2, 3));
        assert!(joins.contains(3, SENTINEL));
        assert!(!joins.contains(SENTINEL, 1));

        assert_eq!(
            barrier_joins,
            vec![BarrierJoin { barrier_id: 10, upstream_id: 2, downstream_id: 3 }]
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn test_children_preserve_total_length() {
        let parent = flowline(1, vec![(0.0, 0.0), (30.0, 40.0), (60.0, 0.0), (100.0, 30.0)]);
        let parent_length = parent.length;
        let mut store = FlowlineStore::from_flowlines([parent]).unwrap();
        let mut joins = JoinTable::new();
        let mut diags = Diagnostics::new();

        let barriers = [
            snapped(10, 1, 20.0, (12.0, 16.0)),
            snapped(11, 1, 75.0, (45.0, 20.0)),
            snapped(12, 1, 110.0, (76.0, 12.0)),
        ];
        cut_flowlines(&mut store, &mut joins, &barriers, &CutParams::default(), &mut diags)
            .unwrap();

        assert_eq!(store.len(), 4);
        let total: f64 = store.iter().map(|f| f.length).sum();
        assert!((total - parent_length).abs() < 0.001);

        // Children chained upstream to downstream
        assert!(joins.contains(2, 3));
        assert!(joins.contains(3, 4));
        assert!(joins.contains(4, 5));
    }

    #[test]
    fn test_cut_then_reassemble_geometry() {
        let parent = flowline(1, vec![(0.0, 0.0), (50.0, 10.0), (100.0, 0.0)]);
        let parent_geometry = parent.geometry.clone();
        let mut store = FlowlineStore::from_flowlines([parent]).unwrap();
        let mut joins = JoinTable::new();
        let mut diags = Diagnostics::new();

        let barriers = [snapped(10, 1, 30.0, (29.4, 5.9))];
        cut_flowlines(&mut store, &mut joins, &barriers, &CutParams::default(), &mut diags)
            .unwrap();

        // Re-concatenate children along the recorded wiring
        let upstream = store.get(2).unwrap();
        let downstream = store.get(3).unwrap();
        let mut coords = upstream.geometry.0.clone();
        assert_eq!(coords.last(), downstream.geometry.0.first());
        coords.extend_from_slice(&downstream.geometry.0[1..]);
        let rejoined = LineString::new(coords);
        assert_eq!(line_length(&rejoined), line_length(&parent_geometry));
        // Cut point aside, every original vertex survives
        for coord in &parent_geometry.0 {
            assert!(rejoined.0.contains(coord));
        }
    }

    #[test]
    fn test_endpoint_barrier_becomes_origin_marker() {
        let (mut store, mut joins) = single_line_setup();
        let mut diags = Diagnostics::new();
        let barriers = [snapped_at(10, 1, 0.0, (0.0, 0.0), true)];

        let barrier_joins = cut_flowlines(
            &mut store,
            &mut joins,
            &barriers,
            &CutParams::default(),
            &mut diags,
        )
        .unwrap();

        // No cut happened
        assert_eq!(store.len(), 1);
        assert!(store.contains(1));
        assert_eq!(
            barrier_joins,
            vec![BarrierJoin { barrier_id: 10, upstream_id: SENTINEL, downstream_id: 1 }]
        );
    }

    #[test]
    fn test_endpoint_barrier_at_confluence_maps_every_upstream() {
        // 1 and 2 flow into 3; barrier at 3's upstream endpoint
        let store = FlowlineStore::from_flowlines([
            flowline(1, vec![(0.0, 0.0), (50.0, 0.0)]),
            flowline(2, vec![(0.0, 20.0), (50.0, 0.0)]),
            flowline(3, vec![(50.0, 0.0), (100.0, 0.0)]),
        ])
        .unwrap();
        let mut store = store;
        let mut joins = JoinTable::from_edges([(1, 3), (2, 3), (3, SENTINEL)]);
        let mut diags = Diagnostics::new();

        let barriers = [snapped_at(10, 3, 0.0, (50.0, 0.0), true)];
        let barrier_joins =
            cut_flowlines(&mut store, &mut joins, &barriers, &CutParams::default(), &mut diags)
                .unwrap();

        assert_eq!(
            barrier_joins,
            vec![
                BarrierJoin { barrier_id: 10, upstream_id: 1, downstream_id: 3 },
                BarrierJoin { barrier_id: 10, upstream_id: 2, downstream_id: 3 },
            ]
        );
    }

    #[test]
    fn test_duplicate_location_dropped() {
        let (mut store, mut joins) = single_line_setup();
        let mut diags = Diagnostics::new();
        let barriers = [
            snapped(10, 1, 50.0, (50.0, 0.0)),
            snapped(11, 1, 50.0, (50.0, 0.0)),
        ];

        let barrier_joins = cut_flowlines(
            &mut store,
            &mut joins,
            &barriers,
            &CutParams::default(),
            &mut diags,
        )
        .unwrap();

        assert_eq!(barrier_joins.len(), 1);
        assert_eq!(barrier_joins[0].barrier_id, 10);
        assert!(matches!(
            diags.iter().next(),
            Some(Diagnostic::DuplicateBarrierLocation { barrier: 11, duplicate_of: 10 })
        ));
    }

    #[test]
    fn test_near_coincident_barriers_share_one_cut() {
        let (mut store, mut joins) = single_line_setup();
        let mut diags = Diagnostics::new();
        let barriers = [
            snapped(10, 1, 50.0, (50.0, 0.0)),
            snapped(11, 1, 50.0005, (50.0005, 0.0)),
        ];

        let barrier_joins = cut_flowlines(
            &mut store,
            &mut joins,
            &barriers,
            &CutParams::default(),
            &mut diags,
        )
        .unwrap();

        // One cut, two flowlines, both barriers mapped to the same pair
        assert_eq!(store.len(), 2);
        assert_eq!(barrier_joins.len(), 2);
        assert_eq!(barrier_joins[0].upstream_id, barrier_joins[1].upstream_id);
        assert_eq!(barrier_joins[0].downstream_id, barrier_joins[1].downstream_id);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_predicate_filters_kinds() {
        let (mut store, mut joins) = single_line_setup();
        let mut diags = Diagnostics::new();
        let mut barrier = snapped(10, 1, 50.0, (50.0, 0.0));
        barrier.barrier.kind = BarrierKind::SmallBarrier;

        fn dams_only(kind: BarrierKind) -> bool {
            kind == BarrierKind::Dam
        }
        let params = CutParams {
            id_counter_base: 1,
            cuts: dams_only,
        };

        let barrier_joins =
            cut_flowlines(&mut store, &mut joins, &[barrier], &params, &mut diags).unwrap();
        assert!(barrier_joins.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_minted_ids_respect_base() {
        let (mut store, mut joins) = single_line_setup();
        let mut diags = Diagnostics::new();
        let params = CutParams {
            id_counter_base: 1_000_000,
            cuts: cuts_all,
        };
        cut_flowlines(
            &mut store,
            &mut joins,
            &[snapped(10, 1, 50.0, (50.0, 0.0))],
            &params,
            &mut diags,
        )
        .unwrap();
        assert!(store.contains(1_000_000));
        assert!(store.contains(1_000_001));
    }

    #[test]
    fn test_index_rebuilt_after_cut() {
        let (mut store, mut joins) = single_line_setup();
        let mut diags = Diagnostics::new();
        cut_flowlines(
            &mut store,
            &mut joins,
            &[snapped(10, 1, 50.0, (50.0, 0.0))],
            &CutParams::default(),
            &mut diags,
        )
        .unwrap();
        // Queries work without an explicit rebuild
        let hits = store.nearest(Point::new(25.0, 0.0), 10.0, usize::MAX).unwrap();
        assert_eq!(hits[0].0, 2);
    }
}
