use std::marker::PhantomData;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use geo::{Area, BooleanOps, BoundingRect};
use geo_types::{Geometry as GeoGeometry, MultiPolygon};

use crate::errors::{GdalVecError, Result};
use crate::spatial_ref::SpatialRef;
use crate::vector::layer::Envelope;
use crate::vector::ops::set::as_multipolygon;
use crate::vector::ops::transformations::polygonal_result;
use crate::vector::Geometry;

thread_local! {
    static LIVE_CONTEXTS: Cell<usize> = const { Cell::new(0) };
}
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A geometry imported into a [`GeometryContext`]. Only valid with the
/// context that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeomHandle {
    context: u64,
    index: usize,
}

/// Execution context of the geometry engine.
///
/// Holds native geometries behind handles for the duration of a batch
/// operation. A context is confined to the thread that created it and is
/// released exactly once when dropped, including on early-return paths.
///
/// ```
/// use gdalvec::vector::Geometry;
/// use gdalvec::vector::ops::GeometryContext;
///
/// # fn main() -> gdalvec::errors::Result<()> {
/// let mut ctx = GeometryContext::new();
/// let a = ctx.import(&Geometry::from_wkt("POLYGON ((0 0, 2 0, 2 2, 0 2, 0 0))")?);
/// let b = ctx.import(&Geometry::from_wkt("POLYGON ((1 0, 3 0, 3 2, 1 2, 1 0))")?);
/// let overlap = ctx.intersection(a, b)?;
/// assert!((ctx.area(overlap)? - 2.0).abs() < 1e-9);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GeometryContext {
    id: u64,
    arena: Vec<Option<GeoGeometry<f64>>>,
    spatial_ref: Option<SpatialRef>,
    // !Send and !Sync
    _not_send: PhantomData<*mut ()>,
}

impl GeometryContext {
    pub fn new() -> Self {
        LIVE_CONTEXTS.with(|n| n.set(n.get() + 1));
        GeometryContext {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::SeqCst),
            arena: Vec::new(),
            spatial_ref: None,
            _not_send: PhantomData,
        }
    }

    /// Number of contexts currently alive on this thread.
    pub fn live_contexts() -> usize {
        LIVE_CONTEXTS.with(Cell::get)
    }

    /// Number of geometries held.
    pub fn len(&self) -> usize {
        self.arena.iter().filter(|g| g.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy a geometry into the context. The first imported spatial reference
    /// is assigned to exported results.
    pub fn import(&mut self, geom: &Geometry) -> GeomHandle {
        if self.spatial_ref.is_none() {
            self.spatial_ref = geom.spatial_ref().cloned();
        }
        self.insert(geom.inner().clone())
    }

    pub(crate) fn insert(&mut self, g: GeoGeometry<f64>) -> GeomHandle {
        self.arena.push(Some(g));
        GeomHandle {
            context: self.id,
            index: self.arena.len() - 1,
        }
    }

    pub(crate) fn get(&self, h: GeomHandle, method_name: &'static str) -> Result<&GeoGeometry<f64>> {
        if h.context != self.id {
            return Err(GdalVecError::GeometryEngine {
                method_name,
                msg: "handle belongs to another context".to_string(),
            });
        }
        self.arena
            .get(h.index)
            .and_then(Option::as_ref)
            .ok_or_else(|| GdalVecError::GeometryEngine {
                method_name,
                msg: format!("handle {} was released", h.index),
            })
    }

    pub(crate) fn polygons(
        &self,
        h: GeomHandle,
        method_name: &'static str,
    ) -> Result<MultiPolygon<f64>> {
        let g = self.get(h, method_name)?;
        as_multipolygon(g).ok_or_else(|| GdalVecError::GeometryEngine {
            method_name,
            msg: "polygonal geometry expected".to_string(),
        })
    }

    /// Copy a geometry back out of the context.
    pub fn export(&self, h: GeomHandle) -> Result<Geometry> {
        let mut g = Geometry::from(self.get(h, "export")?.clone());
        g.set_spatial_ref(self.spatial_ref.clone());
        Ok(g)
    }

    /// Release a geometry, returning it.
    pub fn release(&mut self, h: GeomHandle) -> Result<Geometry> {
        let g = self.export(h)?;
        self.arena[h.index] = None;
        Ok(g)
    }

    pub fn is_polygonal(&self, h: GeomHandle) -> Result<bool> {
        Ok(as_multipolygon(self.get(h, "is_polygonal")?).is_some())
    }

    pub fn is_empty_geom(&self, h: GeomHandle) -> Result<bool> {
        Ok(Geometry::from(self.get(h, "is_empty")?.clone()).is_empty())
    }

    pub fn area(&self, h: GeomHandle) -> Result<f64> {
        Ok(self.get(h, "area")?.unsigned_area())
    }

    pub fn envelope(&self, h: GeomHandle) -> Result<Option<Envelope>> {
        Ok(self.get(h, "envelope")?.bounding_rect().map(Envelope::from))
    }

    pub fn intersection(&mut self, a: GeomHandle, b: GeomHandle) -> Result<GeomHandle> {
        let r = self
            .polygons(a, "intersection")?
            .intersection(&self.polygons(b, "intersection")?);
        Ok(self.insert(polygonal_result(r)))
    }

    pub fn difference(&mut self, a: GeomHandle, b: GeomHandle) -> Result<GeomHandle> {
        let r = self
            .polygons(a, "difference")?
            .difference(&self.polygons(b, "difference")?);
        Ok(self.insert(polygonal_result(r)))
    }

    /// Union of all given polygonal geometries.
    pub fn union_all(&mut self, handles: &[GeomHandle]) -> Result<GeomHandle> {
        let mut acc = MultiPolygon::new(vec![]);
        for h in handles {
            acc = acc.union(&self.polygons(*h, "union_all")?);
        }
        Ok(self.insert(polygonal_result(acc)))
    }
}

impl Default for GeometryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GeometryContext {
    fn drop(&mut self) {
        LIVE_CONTEXTS.with(|n| n.set(n.get().saturating_sub(1)));
    }
}
