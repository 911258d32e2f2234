//! Polyline measurements and linear referencing.
//!
//! Flowline geometries are directed: the first coordinate is the upstream
//! end. Positions along a line are measured in meters from that end.
//! All helpers here assume lines with at least two coordinates; the
//! [`Flowline`](crate::flowline::Flowline) constructor enforces that.

use geo::{Coord, Distance, Euclidean, LineInterpolatePoint, LineLocatePoint, LineString, Point};
use geo::line_measures::LengthMeasurable;

/// Minimum meaningful flowline length in meters. Anything shorter is
/// treated as a degenerate geometry at ingest.
pub const MIN_LENGTH: f64 = 0.01;

/// Euclidean length of a polyline in CRS units (meters).
pub fn line_length(line: &LineString<f64>) -> f64 {
    line.length(&Euclidean)
}

/// Sinuosity: polyline length over straight-line distance between its
/// endpoints. Always >= 1; defined as 1 when the endpoints coincide.
pub fn sinuosity(line: &LineString<f64>) -> f64 {
    let start = Point::from(line.0[0]);
    let end = Point::from(line.0[line.0.len() - 1]);
    let straight = Euclidean.distance(start, end);
    if straight > 0.0 {
        (line_length(line) / straight).max(1.0)
    } else {
        1.0
    }
}

/// Result of projecting a point onto a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearReference {
    /// Measured position of the foot point, meters from the upstream end,
    /// clamped to `[0, length]`.
    pub position: f64,
    /// The foot point itself.
    pub point: Point<f64>,
    /// Distance from the query point to the foot point.
    pub distance: f64,
}

/// Project `point` onto `line`: the closest point on the polyline, its
/// measured position, and the offset distance.
pub fn locate_on_line(line: &LineString<f64>, point: &Point<f64>) -> LinearReference {
    let length = line_length(line);
    let fraction = line.line_locate_point(point).unwrap_or(0.0);
    let foot = line
        .line_interpolate_point(fraction)
        .unwrap_or_else(|| Point::from(line.0[0]));
    LinearReference {
        position: fraction * length,
        point: foot,
        distance: Euclidean.distance(*point, foot),
    }
}

/// Split a polyline at ascending measured positions, producing one part
/// per gap. Adjacent parts share the cut coordinate; original vertices
/// are preserved. Positions must be strictly inside `(0, length)` and
/// strictly increasing — the cutter guarantees both.
pub fn split_at_positions(line: &LineString<f64>, positions: &[f64]) -> Vec<LineString<f64>> {
    let coords = &line.0;
    let mut parts = Vec::with_capacity(positions.len() + 1);
    let mut current = vec![coords[0]];
    let mut traversed = 0.0;
    let mut remaining = positions.iter().copied().peekable();

    for pair in coords.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let seg_len = segment_length(a, b);

        while let Some(&target) = remaining.peek() {
            if target > traversed + seg_len {
                break;
            }
            remaining.next();
            let t = if seg_len > 0.0 {
                (target - traversed) / seg_len
            } else {
                0.0
            };
            let cut = Coord {
                x: a.x + t * (b.x - a.x),
                y: a.y + t * (b.y - a.y),
            };
            if current.last() != Some(&cut) {
                current.push(cut);
            }
            parts.push(LineString::new(std::mem::replace(&mut current, vec![cut])));
        }

        if current.last() != Some(&b) {
            current.push(b);
        }
        traversed += seg_len;
    }

    parts.push(LineString::new(current));
    parts
}

fn segment_length(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_line() -> LineString<f64> {
        LineString::from(vec![(0.0, 0.0), (100.0, 0.0)])
    }

    #[test]
    fn test_length() {
        assert!((line_length(&straight_line()) - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_sinuosity_straight() {
        assert!((sinuosity(&straight_line()) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_sinuosity_bent() {
        // Two 5 m legs, endpoints 6 m apart
        let line = LineString::from(vec![(0.0, 0.0), (3.0, 4.0), (6.0, 0.0)]);
        let s = sinuosity(&line);
        assert!((s - 10.0 / 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_sinuosity_closed_loop() {
        let line = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 0.0)]);
        assert_eq!(sinuosity(&line), 1.0);
    }

    #[test]
    fn test_locate_midspan() {
        let lr = locate_on_line(&straight_line(), &Point::new(50.0, 7.0));
        assert!((lr.position - 50.0).abs() < 1e-9);
        assert!((lr.distance - 7.0).abs() < 1e-9);
        assert!((lr.point.x() - 50.0).abs() < 1e-9);
        assert!(lr.point.y().abs() < 1e-9);
    }

    #[test]
    fn test_locate_clamps_to_endpoints() {
        let lr = locate_on_line(&straight_line(), &Point::new(-25.0, 0.0));
        assert_eq!(lr.position, 0.0);
        assert!((lr.distance - 25.0).abs() < 1e-9);

        let lr = locate_on_line(&straight_line(), &Point::new(130.0, 0.0));
        assert!((lr.position - 100.0).abs() < 1e-9);
        assert!((lr.distance - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_single_position() {
        let parts = split_at_positions(&straight_line(), &[50.0]);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0, vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 50.0, y: 0.0 }]);
        assert_eq!(parts[1].0, vec![Coord { x: 50.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }]);
    }

    #[test]
    fn test_split_preserves_length() {
        let line = LineString::from(vec![(0.0, 0.0), (10.0, 10.0), (20.0, 0.0), (30.0, 10.0)]);
        let total = line_length(&line);
        let parts = split_at_positions(&line, &[5.0, 17.0, 30.0]);
        assert_eq!(parts.len(), 4);
        let sum: f64 = parts.iter().map(line_length).sum();
        assert!((sum - total).abs() < 1e-9);
    }

    #[test]
    fn test_split_shares_cut_coordinate() {
        let line = LineString::from(vec![(0.0, 0.0), (10.0, 10.0), (20.0, 0.0)]);
        let parts = split_at_positions(&line, &[7.0]);
        assert_eq!(parts[0].0.last(), parts[1].0.first());
    }

    #[test]
    fn test_split_at_existing_vertex() {
        let line = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        let parts = split_at_positions(&line, &[10.0]);
        assert_eq!(parts.len(), 2);
        // No duplicated vertex on either side of the cut
        assert_eq!(parts[0].0.len(), 2);
        assert_eq!(parts[1].0.len(), 2);
    }

    #[test]
    fn test_split_keeps_interior_vertices() {
        let line = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0)]);
        let parts = split_at_positions(&line, &[15.0]);
        assert_eq!(parts[0].0.len(), 3); // (0,0), (10,0), (15,0)
        assert_eq!(parts[1].0.len(), 3); // (15,0), (20,0), (30,0)
    }

    #[test]
    fn test_split_no_positions() {
        let parts = split_at_positions(&straight_line(), &[]);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0], straight_line());
    }
}
