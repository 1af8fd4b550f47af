use geo::Area;
use geo_types::{Coord, LineString, Polygon};
use log::debug;

use crate::config::emit_error;
use crate::errors::{CplErrType, CplErrorNum};

fn same(a: Coord<f64>, b: Coord<f64>, tolerance: f64) -> bool {
    (a.x - b.x).abs() <= tolerance && (a.y - b.y).abs() <= tolerance
}

fn is_closed(ring: &[Coord<f64>], tolerance: f64) -> bool {
    ring.len() >= 2 && same(ring[0], ring[ring.len() - 1], tolerance)
}

/// Assemble a polygon from unordered boundary edges.
///
/// Edges are chained end to start (either direction) into rings. A ring
/// that cannot be closed from the available edges is closed by repeating
/// its first vertex, with a warning. The ring with the largest area becomes
/// the exterior; every other ring is a hole.
pub fn build_polygon_from_edges(edges: Vec<LineString<f64>>, tolerance: f64) -> Polygon<f64> {
    let mut remaining: Vec<Vec<Coord<f64>>> = edges
        .into_iter()
        .map(|e| e.0)
        .filter(|c| !c.is_empty())
        .collect();
    remaining.reverse();

    let mut rings: Vec<LineString<f64>> = Vec::new();
    while let Some(mut ring) = remaining.pop() {
        while !is_closed(&ring, tolerance) {
            let Some(&tail) = ring.last() else { break };
            let next = remaining.iter().rposition(|e| {
                same(e[0], tail, tolerance) || same(e[e.len() - 1], tail, tolerance)
            });
            let Some(pos) = next else { break };
            let mut edge = remaining.remove(pos);
            if !same(edge[0], tail, tolerance) {
                edge.reverse();
            }
            ring.extend(edge.into_iter().skip(1));
        }

        if !is_closed(&ring, tolerance) {
            emit_error(
                CplErrType::Warning,
                CplErrorNum::AppDefined,
                &format!("Closing an open ring of {} vertices", ring.len()),
            );
            ring.push(ring[0]);
        }
        if ring.len() < 4 {
            debug!("Dropping degenerate ring of {} vertices", ring.len());
            continue;
        }
        rings.push(LineString::new(ring));
    }

    let Some(shell_idx) = rings
        .iter()
        .enumerate()
        .map(|(i, r)| (i, Polygon::new(r.clone(), vec![]).unsigned_area()))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
    else {
        return Polygon::new(LineString::new(vec![]), vec![]);
    };
    let shell = rings.remove(shell_idx);
    Polygon::new(shell, rings)
}

#[cfg(test)]
mod tests {
    use geo_types::line_string;

    use super::*;
    use crate::test_utils::SuppressErrorLog;

    #[test]
    fn test_square_from_reversed_edges() {
        let edges = vec![
            line_string![(x: 0., y: 0.), (x: 4., y: 0.)],
            line_string![(x: 4., y: 4.), (x: 4., y: 0.)],
            line_string![(x: 4., y: 4.), (x: 0., y: 4.), (x: 0., y: 0.)],
        ];
        let polygon = build_polygon_from_edges(edges, 0.0);
        assert_eq!(polygon.exterior().0.len(), 5);
        assert!(polygon.interiors().is_empty());
        assert!((polygon.unsigned_area() - 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_hole_is_smaller_ring() {
        let edges = vec![
            line_string![(x: 1., y: 1.), (x: 2., y: 1.), (x: 2., y: 2.), (x: 1., y: 2.), (x: 1., y: 1.)],
            line_string![(x: 0., y: 0.), (x: 4., y: 0.), (x: 4., y: 4.), (x: 0., y: 4.), (x: 0., y: 0.)],
        ];
        let polygon = build_polygon_from_edges(edges, 0.0);
        assert_eq!(polygon.interiors().len(), 1);
        assert!((polygon.unsigned_area() - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_open_ring_is_closed() {
        let _quiet = SuppressErrorLog::new();
        crate::config::error_reset();
        let edges = vec![line_string![(x: 0., y: 0.), (x: 3., y: 0.), (x: 3., y: 3.)]];
        let polygon = build_polygon_from_edges(edges, 0.0);
        let ring = &polygon.exterior().0;
        assert_eq!(ring.first(), ring.last());
        assert_eq!(ring.len(), 4);
        let last = crate::config::last_error().unwrap();
        assert_eq!(last.class, CplErrType::Warning);
    }

    #[test]
    fn test_no_edges() {
        assert!(build_polygon_from_edges(vec![], 0.0).exterior().0.is_empty());
    }
}
