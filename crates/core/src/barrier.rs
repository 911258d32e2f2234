//! Barrier points and snap results.

use geo::Point;
use std::fmt;

/// What kind of obstruction a barrier is. Which kinds actually sever the
/// network for a given analysis is decided by a predicate at pipeline
/// configuration time, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    Dam,
    Waterfall,
    /// Road/stream crossings and other minor structures.
    SmallBarrier,
}

impl fmt::Display for BarrierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BarrierKind::Dam => "dam",
            BarrierKind::Waterfall => "waterfall",
            BarrierKind::SmallBarrier => "small_barrier",
        };
        write!(f, "{}", label)
    }
}

/// A point obstruction as delivered by the inventory, before snapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Barrier {
    pub id: u64,
    pub kind: BarrierKind,
    pub x: f64,
    pub y: f64,
    /// Stream name reported by the inventory, used for snap QA.
    pub gnis_name: Option<String>,
    /// Opaque source attributes carried through to the outputs.
    pub attributes: Vec<(String, String)>,
}

impl Barrier {
    pub fn new(id: u64, kind: BarrierKind, x: f64, y: f64) -> Self {
        Self {
            id,
            kind,
            x,
            y,
            gnis_name: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.gnis_name = Some(name.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }
}

/// How well the barrier's reported stream name agrees with the snapped
/// flowline's GNIS name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    /// Equal after normalization.
    Exact,
    /// Normalized token-set similarity above the configured threshold.
    Fuzzy,
    /// No agreement, or one of the names is missing.
    None,
}

/// Result of projecting a barrier onto its nearest flowline.
#[derive(Debug, Clone, PartialEq)]
pub struct Snap {
    /// The flowline the barrier snapped to.
    pub flowline_id: u64,
    /// Snapped location on that flowline.
    pub point: Point<f64>,
    /// Distance from the reported barrier location to the snapped point.
    pub snap_dist: f64,
    /// Measured position along the flowline, meters from the upstream end.
    pub position: f64,
    /// Flowlines within 100 m of the reported location.
    pub candidates_within_100m: usize,
    pub name_match: NameMatch,
    /// Collapsed onto an existing segment endpoint; no cut needed.
    pub at_endpoint: bool,
}

/// A barrier together with its snap. `snap == None` marks an off-network
/// barrier: nothing within tolerance, excluded from cutting.
#[derive(Debug, Clone, PartialEq)]
pub struct SnappedBarrier {
    pub barrier: Barrier,
    pub snap: Option<Snap>,
}

impl SnappedBarrier {
    pub fn is_on_network(&self) -> bool {
        self.snap.is_some()
    }

    /// Snap distance, infinite for off-network barriers.
    pub fn snap_dist(&self) -> f64 {
        self.snap.as_ref().map_or(f64::INFINITY, |s| s.snap_dist)
    }
}
