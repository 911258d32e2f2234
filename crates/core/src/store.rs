//! In-memory flowline store with a rebuildable spatial index.
//!
//! The store owns every flowline of a region (or region group) keyed by
//! id, plus an R-tree over their bounding boxes for the proximity
//! queries the snapper and merger run. Structural mutation marks the
//! index stale; spatial queries refuse to run until [`rebuild`] is
//! called, so a missed rebuild surfaces as an error instead of as
//! silently wrong candidates.
//!
//! [`rebuild`]: FlowlineStore::rebuild

use geo::Point;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::flowline::Flowline;
use crate::geometry::locate_on_line;
use crate::index::{Bbox, RTree};

#[derive(Debug, Default)]
pub struct FlowlineStore {
    flowlines: BTreeMap<u64, Flowline>,
    index: RTree,
    stale: bool,
}

impl FlowlineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a flowline sequence and index it.
    pub fn from_flowlines(flowlines: impl IntoIterator<Item = Flowline>) -> Result<Self> {
        let mut store = Self::new();
        for flowline in flowlines {
            store.insert(flowline)?;
        }
        store.rebuild();
        Ok(store)
    }

    /// Insert a flowline. Errors with `DuplicateId` when the id is taken.
    /// Marks the spatial index stale.
    pub fn insert(&mut self, flowline: Flowline) -> Result<()> {
        if self.flowlines.contains_key(&flowline.id) {
            return Err(Error::DuplicateId(flowline.id));
        }
        self.flowlines.insert(flowline.id, flowline);
        self.stale = true;
        Ok(())
    }

    /// Remove and return a flowline. Errors with `UnknownId`.
    /// Marks the spatial index stale.
    pub fn remove(&mut self, id: u64) -> Result<Flowline> {
        let flowline = self.flowlines.remove(&id).ok_or(Error::UnknownId(id))?;
        self.stale = true;
        Ok(flowline)
    }

    pub fn get(&self, id: u64) -> Result<&Flowline> {
        self.flowlines.get(&id).ok_or(Error::UnknownId(id))
    }

    pub fn contains(&self, id: u64) -> bool {
        self.flowlines.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.flowlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flowlines.is_empty()
    }

    /// Largest id currently in the store; 0 when empty.
    pub fn max_id(&self) -> u64 {
        self.flowlines.keys().next_back().copied().unwrap_or(0)
    }

    /// All flowlines in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Flowline> {
        self.flowlines.values()
    }

    /// Consume the store, yielding flowlines in ascending id order.
    pub fn into_flowlines(self) -> impl Iterator<Item = Flowline> {
        self.flowlines.into_values()
    }

    /// Rebuild the spatial index from the current contents.
    pub fn rebuild(&mut self) {
        let items: Vec<(u64, Bbox)> = self
            .flowlines
            .values()
            .map(|f| (f.id, f.bbox()))
            .collect();
        self.index = RTree::build(items);
        self.stale = false;
    }

    /// Flowlines within `max_dist` of `point`, as `(id, distance)` pairs
    /// in ascending distance (ties broken by ascending id), at most
    /// `limit` results. Distance is geometric point-to-polyline.
    pub fn nearest(&self, point: Point<f64>, max_dist: f64, limit: usize) -> Result<Vec<(u64, f64)>> {
        if self.stale {
            return Err(Error::StaleIndex);
        }
        let mut hits: Vec<(u64, f64)> = Vec::new();
        for id in self.index.within_distance(point.x(), point.y(), max_dist) {
            let flowline = self.get(id)?;
            let distance = locate_on_line(&flowline.geometry, &point).distance;
            if distance <= max_dist {
                hits.push((id, distance));
            }
        }
        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Ids whose bounding box intersects the envelope, ascending.
    pub fn within(&self, envelope: &Bbox) -> Result<Vec<u64>> {
        if self.stale {
            return Err(Error::StaleIndex);
        }
        Ok(self.index.search(envelope))
    }
}
