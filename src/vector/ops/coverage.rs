//! Polygonal coverage operations
//!
//! A coverage is a set of polygons that should not overlap. These functions
//! work on geometries already imported in a [`GeometryContext`] and return
//! handles into the same context, in input order.

use std::str::FromStr;

use geo::{Area, BooleanOps, BoundingRect};
use geo_types::{Geometry as GeoGeometry, LineString, MultiLineString, MultiPolygon};
use log::debug;
use rstar::{RTree, RTreeObject, AABB};

use crate::errors::{GdalVecError, Result};
use crate::progress::Progress;
use crate::vector::layer::Envelope;
use crate::vector::ops::transformations::polygonal_result;
use crate::vector::ops::{GeomHandle, GeometryContext};

/// An envelope tagged with the position of its geometry in a batch.
#[derive(Debug, Clone)]
pub(crate) struct EnvelopeEntry {
    pub idx: usize,
    pub envelope: AABB<[f64; 2]>,
}

impl EnvelopeEntry {
    pub fn new(idx: usize, env: &Envelope) -> Self {
        EnvelopeEntry {
            idx,
            envelope: AABB::from_corners([env.min_x, env.min_y], [env.max_x, env.max_y]),
        }
    }
}

impl RTreeObject for EnvelopeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PartialEq for EnvelopeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.idx == other.idx
    }
}

/// Which polygon keeps an area claimed by two polygons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapStrategy {
    /// The polygon that comes first.
    MinIndex,
    /// The larger polygon.
    MaxArea,
    /// The smaller polygon.
    MinArea,
}

impl OverlapStrategy {
    /// Index of the polygon keeping the overlap of `a` and `b` (`a < b`).
    fn winner(&self, a: usize, b: usize, areas: &[f64]) -> usize {
        match self {
            OverlapStrategy::MinIndex => a,
            OverlapStrategy::MaxArea if areas[b] > areas[a] => b,
            OverlapStrategy::MinArea if areas[b] < areas[a] => b,
            _ => a,
        }
    }
}

impl FromStr for OverlapStrategy {
    type Err = GdalVecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "min-index" => Ok(OverlapStrategy::MinIndex),
            "max-area" => Ok(OverlapStrategy::MaxArea),
            "min-area" => Ok(OverlapStrategy::MinArea),
            _ => Err(GdalVecError::BadArgument(format!(
                "Invalid merge strategy '{s}'. Expected min-index, max-area or min-area"
            ))),
        }
    }
}

fn is_overlap(overlap: &MultiPolygon<f64>, a: f64, b: f64) -> bool {
    overlap.unsigned_area() > 1e-12 * a.max(b).max(1.0)
}

fn collect_polygons(
    ctx: &GeometryContext,
    inputs: &[GeomHandle],
    method_name: &'static str,
) -> Result<Vec<MultiPolygon<f64>>> {
    inputs.iter().map(|h| ctx.polygons(*h, method_name)).collect()
}

fn build_tree(polygons: &[MultiPolygon<f64>]) -> RTree<EnvelopeEntry> {
    let entries = polygons
        .iter()
        .enumerate()
        .filter_map(|(idx, p)| p.bounding_rect().map(|r| EnvelopeEntry::new(idx, &Envelope::from(r))))
        .collect();
    RTree::bulk_load(entries)
}

/// Find the edges along which the polygons of a coverage overlap.
///
/// For each input, returns the boundary of the areas it shares with other
/// inputs as a `MultiLineString`, or `None` when the polygon is correctly
/// coverage-aligned.
pub fn coverage_invalid_edges(
    ctx: &mut GeometryContext,
    inputs: &[GeomHandle],
    progress: &mut Progress,
) -> Result<Vec<Option<GeomHandle>>> {
    let polygons = collect_polygons(ctx, inputs, "coverage_invalid_edges")?;
    let areas: Vec<f64> = polygons.iter().map(|p| p.unsigned_area()).collect();
    let tree = build_tree(&polygons);

    let mut result = Vec::with_capacity(polygons.len());
    for (i, polygon) in polygons.iter().enumerate() {
        let mut edges: Vec<LineString<f64>> = Vec::new();
        if let Some(rect) = polygon.bounding_rect() {
            let query = EnvelopeEntry::new(i, &Envelope::from(rect));
            for candidate in tree.locate_in_envelope_intersecting(&query.envelope) {
                let j = candidate.idx;
                if j == i {
                    continue;
                }
                let overlap = polygon.intersection(&polygons[j]);
                if is_overlap(&overlap, areas[i], areas[j]) {
                    for p in overlap.0 {
                        let (exterior, interiors) = p.into_inner();
                        edges.push(exterior);
                        edges.extend(interiors);
                    }
                }
            }
        }
        let handle = if edges.is_empty() {
            None
        } else {
            debug!("coverage polygon {i} overlaps {} ring(s)", edges.len());
            Some(ctx.insert(GeoGeometry::MultiLineString(MultiLineString::new(edges))))
        };
        result.push(handle);
        progress.report((i + 1) as f64 / polygons.len() as f64, "")?;
    }
    Ok(result)
}

/// Remove overlaps from a coverage.
///
/// Every area claimed by more than one polygon is kept by the polygon chosen
/// by `strategy` and subtracted from the others.
pub fn coverage_clean(
    ctx: &mut GeometryContext,
    inputs: &[GeomHandle],
    strategy: OverlapStrategy,
    progress: &mut Progress,
) -> Result<Vec<GeomHandle>> {
    let mut polygons = collect_polygons(ctx, inputs, "coverage_clean")?;
    let areas: Vec<f64> = polygons.iter().map(|p| p.unsigned_area()).collect();
    let tree = build_tree(&polygons);

    let count = polygons.len();
    for i in 0..count {
        let Some(rect) = polygons[i].bounding_rect() else {
            progress.report((i + 1) as f64 / count as f64, "")?;
            continue;
        };
        let query = EnvelopeEntry::new(i, &Envelope::from(rect));
        let mut candidates: Vec<usize> = tree
            .locate_in_envelope_intersecting(&query.envelope)
            .map(|e| e.idx)
            .filter(|&j| j > i)
            .collect();
        candidates.sort_unstable();
        for j in candidates {
            let overlap = polygons[i].intersection(&polygons[j]);
            if !is_overlap(&overlap, areas[i], areas[j]) {
                continue;
            }
            let winner = strategy.winner(i, j, &areas);
            let loser = if winner == i { j } else { i };
            polygons[loser] = polygons[loser].difference(&polygons[winner]);
        }
        progress.report((i + 1) as f64 / count as f64, "")?;
    }

    Ok(polygons
        .into_iter()
        .map(|p| ctx.insert(polygonal_result(p)))
        .collect())
}
