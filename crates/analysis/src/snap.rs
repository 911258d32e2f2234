//! Barrier snapping with QA heuristics.
//!
//! Each barrier is projected onto its nearest flowline within tolerance.
//! The snap carries everything a reviewer needs to judge it: offset
//! distance, how crowded the neighborhood is, and whether the reported
//! stream name agrees with the flowline's GNIS name. Barriers with
//! nothing in range are classified off-network and never cut.
//!
//! Snapping is deterministic: candidate order is (distance, id)
//! ascending, so equidistant flowlines resolve to the lowest id.

use geo::Point;
use std::collections::BTreeSet;
use tracing::debug;

use streamnet_core::geometry::locate_on_line;
use streamnet_core::{
    Barrier, Diagnostic, Diagnostics, FlowlineStore, NameMatch, Result, Snap, SnappedBarrier,
};

/// Radius for the `candidates_within_100m` QA field, independent of the
/// configured snap tolerance.
const QA_RADIUS: f64 = 100.0;

/// Two candidates whose distances differ by less than this are reported
/// as an ambiguous snap.
const AMBIGUITY_SEPARATION: f64 = 0.1;

/// Parameters for barrier snapping
#[derive(Debug, Clone)]
pub struct SnapParams {
    /// Maximum distance between a barrier and a flowline that can still
    /// be snapped, in meters.
    pub max_snap_dist: f64,
    /// Snaps closer than this to a segment end collapse onto the
    /// endpoint instead of producing a sliver cut.
    pub endpoint_epsilon: f64,
    /// Normalized token-set similarity at or above which names count as
    /// a fuzzy match.
    pub name_similarity_threshold: f64,
}

impl Default for SnapParams {
    fn default() -> Self {
        Self {
            max_snap_dist: 100.0,
            endpoint_epsilon: 1.0,
            name_similarity_threshold: 0.8,
        }
    }
}

/// Snap every barrier onto the store.
///
/// Off-network barriers come back with `snap == None` and an
/// [`Diagnostic::OffNetwork`] entry. Near-ties between the two closest
/// candidates are reported as [`Diagnostic::AmbiguousSnap`] alongside
/// the chosen snap.
pub fn snap_barriers(
    store: &FlowlineStore,
    barriers: &[Barrier],
    params: &SnapParams,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<SnappedBarrier>> {
    let mut snapped = Vec::with_capacity(barriers.len());
    let mut off_network = 0usize;

    for barrier in barriers {
        let point = barrier.point();
        let radius = params.max_snap_dist.max(QA_RADIUS);
        let candidates = store.nearest(point, radius, usize::MAX)?;

        let within_100m = candidates.iter().filter(|(_, d)| *d <= QA_RADIUS).count();
        let mut reachable = candidates
            .iter()
            .filter(|(_, d)| *d <= params.max_snap_dist);

        let Some(&(target_id, distance)) = reachable.next() else {
            off_network += 1;
            diagnostics.push(Diagnostic::OffNetwork { barrier: barrier.id });
            snapped.push(SnappedBarrier {
                barrier: barrier.clone(),
                snap: None,
            });
            continue;
        };
        if let Some(&(runner_up, runner_up_dist)) = reachable.next() {
            if runner_up_dist - distance <= AMBIGUITY_SEPARATION {
                diagnostics.push(Diagnostic::AmbiguousSnap {
                    barrier: barrier.id,
                    chosen: target_id,
                    runner_up,
                    separation: runner_up_dist - distance,
                });
            }
        }

        let target = store.get(target_id)?;
        let reference = locate_on_line(&target.geometry, &point);
        let (position, snapped_point, at_endpoint) =
            if reference.position < params.endpoint_epsilon {
                (0.0, Point::from(target.start_point()), true)
            } else if target.length - reference.position < params.endpoint_epsilon {
                (target.length, Point::from(target.end_point()), true)
            } else {
                (reference.position, reference.point, false)
            };

        let name_match = match_names(
            barrier.gnis_name.as_deref(),
            target.gnis_name.as_deref(),
            params.name_similarity_threshold,
        );

        snapped.push(SnappedBarrier {
            barrier: barrier.clone(),
            snap: Some(Snap {
                flowline_id: target_id,
                point: snapped_point,
                snap_dist: reference.distance,
                position,
                candidates_within_100m: within_100m,
                name_match,
                at_endpoint,
            }),
        });
    }

    debug!(
        total = barriers.len(),
        off_network, "snapped barriers"
    );
    Ok(snapped)
}

/// Compare a barrier's reported stream name against a flowline's GNIS
/// name. A missing name on either side yields `None`.
fn match_names(barrier: Option<&str>, flowline: Option<&str>, threshold: f64) -> NameMatch {
    let (Some(barrier), Some(flowline)) = (barrier, flowline) else {
        return NameMatch::None;
    };
    let a = normalize_name(barrier);
    let b = normalize_name(flowline);
    if a.is_empty() || b.is_empty() {
        return NameMatch::None;
    }
    if a == b {
        return NameMatch::Exact;
    }
    if token_set_similarity(&a, &b) >= threshold {
        return NameMatch::Fuzzy;
    }
    NameMatch::None
}

/// Case-fold, strip punctuation, collapse whitespace.
fn normalize_name(name: &str) -> String {
    let folded: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Jaccard similarity over whitespace-separated token sets.
fn token_set_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;
    intersection / union
}
