use std::sync::Arc;

use log::debug;

use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::non_streaming::{BatchAlgorithm, BatchPlan};
use crate::vector::ops::{GeomHandle, GeometryContext};
use crate::vector::{Defn, Feature, FieldMap, Geometry, GeometryType};

/// A batch operation over the geometries of a whole layer, run inside a
/// [`GeometryContext`].
pub trait CoverageOperation {
    fn name(&self) -> &'static str;

    /// Whether every non-null input geometry must be polygonal.
    fn requires_polygons(&self) -> bool {
        true
    }

    /// Run over the imported inputs. Returns one optional result per input,
    /// in input order.
    fn run(
        &self,
        ctx: &mut GeometryContext,
        inputs: &[GeomHandle],
        progress: &mut Progress,
    ) -> Result<Vec<Option<GeomHandle>>>;

    /// Geometry type of the output field.
    fn output_geometry_type(&self, input: GeometryType) -> GeometryType {
        input
    }

    /// Whether a feature with result `result` is emitted.
    fn keep_feature(&self, _result: Option<&Geometry>) -> bool {
        true
    }
}

/// Runs a [`CoverageOperation`] on one geometry field and emits the results
/// in place of the input geometries, in input order.
///
/// The geometry context lives as long as the batch. Geometries are imported
/// while the source is drained.
pub struct GeosBatch<O> {
    operation: O,
    geom_field: usize,
    map: Option<FieldMap>,
    context: GeometryContext,
    handles: Vec<Option<GeomHandle>>,
    results: Vec<Option<Geometry>>,
}

impl<O: CoverageOperation> GeosBatch<O> {
    /// Process the geometry field named `geom_field` of `source`, or its first
    /// one.
    pub fn new(operation: O, source: &Defn, geom_field: Option<&str>) -> Result<Self> {
        let geom_field = match geom_field {
            Some(name) => source.geom_field_index(name).ok_or_else(|| {
                GdalVecError::GeometryFieldNotFound {
                    field_name: name.to_string(),
                    layer_name: source.name().to_string(),
                }
            })?,
            None if source.geom_field_count() > 0 => 0,
            None => {
                return Err(GdalVecError::GeometryFieldNotFound {
                    field_name: String::new(),
                    layer_name: source.name().to_string(),
                })
            }
        };
        Ok(GeosBatch {
            operation,
            geom_field,
            map: None,
            context: GeometryContext::new(),
            handles: Vec::new(),
            results: Vec::new(),
        })
    }

    pub fn operation(&self) -> &O {
        &self.operation
    }

    /// Number of geometries held by the context.
    pub fn context_len(&self) -> usize {
        self.context.len()
    }
}

impl<O: CoverageOperation> BatchAlgorithm for GeosBatch<O> {
    fn output_defn(&self, source: &Defn) -> Result<Defn> {
        let mut defn = source.clone();
        if let Some(field) = defn.geom_field_mut(self.geom_field) {
            let ty = self.operation.output_geometry_type(field.geometry_type());
            field.set_geometry_type(ty);
        }
        Ok(defn)
    }

    fn observe(&mut self, _idx: usize, feature: &Feature) -> Result<()> {
        let handle = match feature.geometry_by_index(self.geom_field)? {
            None => None,
            Some(geometry) => {
                if self.operation.requires_polygons() && !geometry.geometry_type().is_polygonal() {
                    return Err(GdalVecError::InvalidGeometry {
                        fid: feature.fid(),
                        msg: format!(
                            "{} requires polygonal geometries, got {}",
                            self.operation.name(),
                            geometry.geometry_name()
                        ),
                    });
                }
                Some(self.context.import(geometry))
            }
        };
        self.handles.push(handle);
        Ok(())
    }

    fn process(&mut self, count: usize, progress: &mut Progress) -> Result<BatchPlan> {
        let inputs: Vec<GeomHandle> = self.handles.iter().flatten().copied().collect();
        debug!("{}: running over {} geometries", self.operation.name(), inputs.len());
        let outputs = self.operation.run(&mut self.context, &inputs, progress)?;
        if outputs.len() != inputs.len() {
            return Err(GdalVecError::GeometryEngine {
                method_name: self.operation.name(),
                msg: format!("{} results for {} inputs", outputs.len(), inputs.len()),
            });
        }

        let mut outputs = outputs.into_iter();
        self.results = Vec::with_capacity(count);
        for handle in std::mem::take(&mut self.handles) {
            let result = match handle {
                None => None,
                Some(input) => {
                    self.context.release(input)?;
                    match outputs.next().flatten() {
                        Some(output) => Some(self.context.release(output)?),
                        None => None,
                    }
                }
            };
            self.results.push(result);
        }
        Ok(BatchPlan::in_order(count))
    }

    fn emit(&mut self, defn: &Arc<Defn>, slot: usize, inputs: Vec<Feature>) -> Result<Option<Feature>> {
        let Some(feature) = inputs.into_iter().next() else {
            return Ok(None);
        };
        let result = self.results.get_mut(slot).and_then(Option::take);
        if !self.operation.keep_feature(result.as_ref()) {
            return Ok(None);
        }
        let map = self.map.get_or_insert_with(|| FieldMap::identity(defn));
        let mut feature = feature.remap(defn.clone(), map);
        feature.set_geometry_by_index(self.geom_field, result)?;
        Ok(Some(feature))
    }

    fn reset(&mut self) {
        self.context = GeometryContext::new();
        self.handles.clear();
        self.results.clear();
    }
}
