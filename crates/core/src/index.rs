//! Bounding-box R-tree for flowline lookup.
//!
//! Bulk-loaded with Sort-Tile-Recursive packing and rebuilt wholesale
//! after structural mutation — flowline sets change in large batches
//! (region merge, cutting), so incremental maintenance buys nothing.
//! Queries: envelope intersection and all-entries-within-distance of a
//! point. Results are candidate sets over bounding boxes; exact
//! point-to-polyline distances are the store's job.
//!
//! Reference:
//! Leutenegger, S.T., Lopez, M.A., Edgington, J. (1997). STR: a simple
//! and efficient algorithm for R-tree packing. ICDE '97.

use geo::{BoundingRect, LineString};

/// Maximum entries per node.
const NODE_CAPACITY: usize = 16;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bbox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Bounding box of a polyline.
    pub fn of_line(line: &LineString<f64>) -> Self {
        match line.bounding_rect() {
            Some(rect) => Self {
                min_x: rect.min().x,
                min_y: rect.min().y,
                max_x: rect.max().x,
                max_y: rect.max().y,
            },
            None => Self::new(0.0, 0.0, 0.0, 0.0),
        }
    }

    /// Square search window centered on a point.
    pub fn around_point(x: f64, y: f64, radius: f64) -> Self {
        Self::new(x - radius, y - radius, x + radius, y + radius)
    }

    pub fn intersects(&self, other: &Bbox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Smallest box covering both.
    pub fn merge(&self, other: &Bbox) -> Bbox {
        Bbox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Distance from a point to the box; 0 when the point is inside.
    pub fn distance_to_point(&self, x: f64, y: f64) -> f64 {
        let dx = (self.min_x - x).max(0.0).max(x - self.max_x);
        let dy = (self.min_y - y).max(0.0).max(y - self.max_y);
        (dx * dx + dy * dy).sqrt()
    }
}

/// An STR-packed R-tree over `(id, bbox)` entries.
#[derive(Debug, Default)]
pub struct RTree {
    nodes: Vec<RTreeNode>,
    root: Option<usize>,
    len: usize,
}

#[derive(Debug)]
struct RTreeNode {
    bbox: Bbox,
    entries: NodeEntries,
}

#[derive(Debug)]
enum NodeEntries {
    Leaf(Vec<(u64, Bbox)>),
    Inner(Vec<usize>),
}

impl RTree {
    /// Bulk-load a tree from entries. Ordering of the input does not
    /// affect query results.
    pub fn build(mut items: Vec<(u64, Bbox)>) -> Self {
        let len = items.len();
        if items.is_empty() {
            return Self { nodes: Vec::new(), root: None, len: 0 };
        }

        let mut nodes: Vec<RTreeNode> = Vec::with_capacity(2 * len / NODE_CAPACITY + 2);

        // Pack leaves: sort by center x, tile into vertical slices,
        // sort each slice by center y, fill leaves in order.
        items.sort_by(|a, b| {
            cmp_center(a.1.center().0, b.1.center().0).then(a.0.cmp(&b.0))
        });
        let slice_items = slice_capacity(len);
        let mut level: Vec<usize> = Vec::new();
        for slice in items.chunks(slice_items) {
            let mut slice = slice.to_vec();
            slice.sort_by(|a, b| {
                cmp_center(a.1.center().1, b.1.center().1).then(a.0.cmp(&b.0))
            });
            for chunk in slice.chunks(NODE_CAPACITY) {
                let bbox = chunk
                    .iter()
                    .map(|(_, b)| *b)
                    .reduce(|acc, b| acc.merge(&b))
                    .unwrap_or(Bbox::new(0.0, 0.0, 0.0, 0.0));
                nodes.push(RTreeNode {
                    bbox,
                    entries: NodeEntries::Leaf(chunk.to_vec()),
                });
                level.push(nodes.len() - 1);
            }
        }

        // Pack inner levels the same way until one node remains.
        while level.len() > 1 {
            level.sort_by(|a, b| {
                cmp_center(nodes[*a].bbox.center().0, nodes[*b].bbox.center().0)
            });
            let slice_items = slice_capacity(level.len());
            let mut next: Vec<usize> = Vec::new();
            for slice in level.chunks(slice_items) {
                let mut slice = slice.to_vec();
                slice.sort_by(|a, b| {
                    cmp_center(nodes[*a].bbox.center().1, nodes[*b].bbox.center().1)
                });
                for chunk in slice.chunks(NODE_CAPACITY) {
                    let bbox = chunk
                        .iter()
                        .map(|&i| nodes[i].bbox)
                        .reduce(|acc, b| acc.merge(&b))
                        .unwrap_or(Bbox::new(0.0, 0.0, 0.0, 0.0));
                    nodes.push(RTreeNode {
                        bbox,
                        entries: NodeEntries::Inner(chunk.to_vec()),
                    });
                    next.push(nodes.len() - 1);
                }
            }
            level = next;
        }

        let root = level.first().copied();
        Self { nodes, root, len }
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ids whose bounding box intersects the query envelope, ascending.
    pub fn search(&self, query: &Bbox) -> Vec<u64> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.search_node(root, query, &mut out);
        }
        out.sort_unstable();
        out
    }

    /// Ids whose bounding box lies within `dist` of the point, ascending.
    pub fn within_distance(&self, x: f64, y: f64, dist: f64) -> Vec<u64> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.distance_node(root, x, y, dist, &mut out);
        }
        out.sort_unstable();
        out
    }

    fn search_node(&self, idx: usize, query: &Bbox, out: &mut Vec<u64>) {
        let node = &self.nodes[idx];
        if !node.bbox.intersects(query) {
            return;
        }
        match &node.entries {
            NodeEntries::Leaf(entries) => {
                for (id, bbox) in entries {
                    if bbox.intersects(query) {
                        out.push(*id);
                    }
                }
            }
            NodeEntries::Inner(children) => {
                for &child in children {
                    self.search_node(child, query, out);
                }
            }
        }
    }

    fn distance_node(&self, idx: usize, x: f64, y: f64, dist: f64, out: &mut Vec<u64>) {
        let node = &self.nodes[idx];
        if node.bbox.distance_to_point(x, y) > dist {
            return;
        }
        match &node.entries {
            NodeEntries::Leaf(entries) => {
                for (id, bbox) in entries {
                    if bbox.distance_to_point(x, y) <= dist {
                        out.push(*id);
                    }
                }
            }
            NodeEntries::Inner(children) => {
                for &child in children {
                    self.distance_node(child, x, y, dist, out);
                }
            }
        }
    }
}

/// Items per vertical STR slice for `n` entries.
fn slice_capacity(n: usize) -> usize {
    let leaves = n.div_ceil(NODE_CAPACITY);
    let slices = (leaves as f64).sqrt().ceil() as usize;
    n.div_ceil(slices.max(1)).max(1)
}

fn cmp_center(a: f64, b: f64) -> std::cmp::Ordering {
    a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_items(n: usize) -> Vec<(u64, Bbox)> {
        // n x n unit boxes on a 10 m pitch
        let mut items = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let x = (i * 10) as f64;
                let y = (j * 10) as f64;
                items.push(((i * n + j) as u64 + 1, Bbox::new(x, y, x + 1.0, y + 1.0)));
            }
        }
        items
    }

    fn brute_search(items: &[(u64, Bbox)], query: &Bbox) -> Vec<u64> {
        let mut out: Vec<u64> = items
            .iter()
            .filter(|(_, b)| b.intersects(query))
            .map(|(id, _)| *id)
            .collect();
        out.sort_unstable();
        out
    }

    fn brute_within(items: &[(u64, Bbox)], x: f64, y: f64, dist: f64) -> Vec<u64> {
        let mut out: Vec<u64> = items
            .iter()
            .filter(|(_, b)| b.distance_to_point(x, y) <= dist)
            .map(|(id, _)| *id)
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn test_bbox_intersects() {
        let a = Bbox::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Bbox::new(5.0, 5.0, 15.0, 15.0)));
        assert!(a.intersects(&Bbox::new(10.0, 10.0, 20.0, 20.0))); // touching counts
        assert!(!a.intersects(&Bbox::new(11.0, 0.0, 20.0, 10.0)));
    }

    #[test]
    fn test_bbox_distance() {
        let b = Bbox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(b.distance_to_point(5.0, 5.0), 0.0);
        assert_eq!(b.distance_to_point(13.0, 5.0), 3.0);
        assert!((b.distance_to_point(13.0, 14.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_tree() {
        let tree = RTree::build(Vec::new());
        assert!(tree.is_empty());
        assert!(tree.search(&Bbox::new(0.0, 0.0, 100.0, 100.0)).is_empty());
        assert!(tree.within_distance(0.0, 0.0, 1e9).is_empty());
    }

    #[test]
    fn test_single_entry() {
        let tree = RTree::build(vec![(7, Bbox::new(0.0, 0.0, 1.0, 1.0))]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.search(&Bbox::new(0.5, 0.5, 2.0, 2.0)), vec![7]);
        assert!(tree.search(&Bbox::new(5.0, 5.0, 6.0, 6.0)).is_empty());
    }

    #[test]
    fn test_search_matches_brute_force() {
        let items = grid_items(12); // 144 entries, multiple tree levels
        let tree = RTree::build(items.clone());
        for (qx, qy, w) in [(0.0, 0.0, 25.0), (33.0, 47.0, 18.0), (90.0, 5.0, 60.0)] {
            let query = Bbox::new(qx, qy, qx + w, qy + w);
            assert_eq!(tree.search(&query), brute_search(&items, &query));
        }
    }

    #[test]
    fn test_within_distance_matches_brute_force() {
        let items = grid_items(12);
        let tree = RTree::build(items.clone());
        for (x, y, d) in [(0.0, 0.0, 5.0), (55.0, 55.0, 12.0), (110.0, 0.0, 40.0)] {
            assert_eq!(tree.within_distance(x, y, d), brute_within(&items, x, y, d));
        }
    }

    #[test]
    fn test_build_order_independent() {
        let items = grid_items(9);
        let mut reversed = items.clone();
        reversed.reverse();
        let a = RTree::build(items);
        let b = RTree::build(reversed);
        let query = Bbox::new(10.0, 10.0, 50.0, 50.0);
        assert_eq!(a.search(&query), b.search(&query));
    }

    #[test]
    fn test_results_sorted_ascending() {
        let items = grid_items(12);
        let tree = RTree::build(items);
        let hits = tree.search(&Bbox::new(0.0, 0.0, 120.0, 120.0));
        assert_eq!(hits.len(), 144);
        assert!(hits.windows(2).all(|w| w[0] < w[1]));
    }
}
