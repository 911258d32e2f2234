//! Functional network assembly.
//!
//! After cutting, every barrier sits between two segments. Walking
//! upstream from each root — a segment immediately downstream of a
//! barrier, a natural origin, or a terminus — and stopping at other
//! roots partitions the graph into functional networks: the stretches
//! of river a fish could reach without passing a barrier.
//!
//! Roots are processed in ascending id order and loop edges are entered
//! at most once, so the partition is deterministic and loops cannot
//! recurse.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use streamnet_core::{
    Diagnostic, Diagnostics, Error, FlowlineStore, JoinTable, Result, SENTINEL,
};

use crate::cut::BarrierJoin;

/// Why a network exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    /// Rooted at a barrier's downstream segment.
    BarrierUpstream,
    /// Rooted at a natural origin or terminus.
    OriginUpstream,
    /// Disconnected leftover (e.g. an isolated loop), rooted at its
    /// downstream-most member.
    Isolated,
}

/// A maximal barrier-free connected set of flowlines.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionalNetwork {
    /// Downstream-most flowline id; the network's stable identifier.
    pub root_id: u64,
    pub kind: NetworkKind,
    /// Member flowline ids, ascending.
    pub members: Vec<u64>,
}

impl FunctionalNetwork {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Partition the cut graph into functional networks.
///
/// Returns the networks (ascending by root id) and the flowline → root
/// assignment. Every flowline lands in exactly one network.
pub fn build_networks(
    store: &FlowlineStore,
    joins: &JoinTable,
    barrier_joins: &[BarrierJoin],
    diagnostics: &mut Diagnostics,
) -> Result<(Vec<FunctionalNetwork>, BTreeMap<u64, u64>)> {
    let barrier_downstream: BTreeSet<u64> = barrier_joins
        .iter()
        .map(|bj| bj.downstream_id)
        .filter(|&id| id != SENTINEL)
        .collect();

    let mut roots: BTreeSet<u64> = BTreeSet::new();
    for &id in &barrier_downstream {
        if !store.contains(id) {
            return Err(Error::UnknownId(id));
        }
        roots.insert(id);
    }
    for flowline in store.iter() {
        if joins.is_origin(flowline.id) || joins.is_terminus(flowline.id) {
            roots.insert(flowline.id);
        }
    }

    // Upstream walk from every root, stopping at other roots
    let mut assignment: BTreeMap<u64, u64> = BTreeMap::new();
    for &root in &roots {
        assignment.insert(root, root);
        let mut frontier = vec![root];
        while let Some(current) = frontier.pop() {
            let upstream: Vec<u64> = joins.upstream_of(current).collect();
            for candidate in upstream {
                if candidate == SENTINEL || roots.contains(&candidate) {
                    continue;
                }
                if let Some(&prior) = assignment.get(&candidate) {
                    let loop_edge =
                        store.get(candidate)?.loop_flag && store.get(current)?.loop_flag;
                    if !loop_edge {
                        diagnostics.push(Diagnostic::DoubleAssignment {
                            flowline: candidate,
                            network: root,
                            prior_network: prior,
                        });
                    }
                    continue;
                }
                assignment.insert(candidate, root);
                frontier.push(candidate);
            }
        }
    }

    // Disconnected leftovers become their own networks
    let mut remaining: BTreeSet<u64> = store
        .iter()
        .map(|f| f.id)
        .filter(|id| !assignment.contains_key(id))
        .collect();
    let mut isolated_roots: BTreeSet<u64> = BTreeSet::new();
    while let Some(&seed) = remaining.iter().next() {
        let mut component: BTreeSet<u64> = BTreeSet::new();
        let mut stack = vec![seed];
        while let Some(current) = stack.pop() {
            if !component.insert(current) {
                continue;
            }
            remaining.remove(&current);
            for neighbor in joins
                .upstream_of(current)
                .chain(joins.downstream_of(current))
            {
                if neighbor != SENTINEL && remaining.contains(&neighbor) {
                    stack.push(neighbor);
                }
            }
        }
        let root = component
            .iter()
            .copied()
            .filter(|&id| {
                joins
                    .downstream_of(id)
                    .all(|d| d == SENTINEL || !component.contains(&d))
            })
            .min()
            // pure cycle: no member is downstream-most, fall back to lowest id
            .or_else(|| component.iter().copied().min())
            .unwrap_or(seed);
        for &member in &component {
            assignment.insert(member, root);
        }
        isolated_roots.insert(root);
    }

    let mut members_by_root: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for (&id, &root) in &assignment {
        members_by_root.entry(root).or_default().push(id);
    }
    let networks: Vec<FunctionalNetwork> = members_by_root
        .into_iter()
        .map(|(root_id, members)| {
            let kind = if barrier_downstream.contains(&root_id) {
                NetworkKind::BarrierUpstream
            } else if isolated_roots.contains(&root_id) {
                NetworkKind::Isolated
            } else {
                NetworkKind::OriginUpstream
            };
            FunctionalNetwork { root_id, kind, members }
        })
        .collect();

    debug!(
        networks = networks.len(),
        flowlines = assignment.len(),
        "assembled functional networks"
    );
    Ok((networks, assignment))
}
