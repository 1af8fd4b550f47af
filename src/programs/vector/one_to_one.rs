use std::sync::Arc;

use log::debug;

use crate::errors::*;
use crate::programs::vector::output_layer::{FeatureTranslator, PipelineOutputLayer};
use crate::vector::{Defn, Feature, FieldMap, GeomFieldDefn, Geometry, GeometryType, Layer, LayerCaps};

/// Which geometry fields a geometry step processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeomFieldSelection {
    All,
    One(usize),
}

impl GeomFieldSelection {
    /// Resolve an optional geometry field name against `defn`.
    ///
    /// No name selects every geometry field. A name that does not exist is an
    /// error.
    pub fn resolve(defn: &Defn, name: Option<&str>) -> Result<Self> {
        match name {
            None => Ok(GeomFieldSelection::All),
            Some(name) => defn
                .geom_field_index(name)
                .map(GeomFieldSelection::One)
                .ok_or_else(|| GdalVecError::GeometryFieldNotFound {
                    field_name: name.to_string(),
                    layer_name: defn.name().to_string(),
                }),
        }
    }

    pub fn contains(&self, idx: usize) -> bool {
        match self {
            GeomFieldSelection::All => true,
            GeomFieldSelection::One(selected) => *selected == idx,
        }
    }

    /// Selected geometry field indices among `count` fields.
    pub fn indices(&self, count: usize) -> Vec<usize> {
        (0..count).filter(|i| self.contains(*i)).collect()
    }
}

/// A geometry transform producing exactly one geometry per input geometry.
pub trait GeomOneToOneAlgorithm {
    /// Transform one geometry. The result keeps the spatial reference of the
    /// input unless it carries its own.
    fn process(&self, geometry: Geometry) -> Result<Geometry>;

    /// Type the result is forced to for an input of type `input`, if any.
    fn target_type(&self, _input: GeometryType) -> Option<GeometryType> {
        None
    }

    /// Drop features whose result does not land on the target type, or
    /// collapsed to empty. When false such results are emitted as produced.
    fn skip_on_mismatch(&self) -> bool {
        false
    }

    /// Whether results may lie outside the source extent.
    fn changes_extent(&self) -> bool {
        true
    }

    /// Adjust a processed geometry field of the output definition.
    fn update_geom_field(&self, field: &mut GeomFieldDefn) {
        if let Some(ty) = self.target_type(field.geometry_type()) {
            field.set_geometry_type(ty);
        }
    }
}

/// Translator applying a [`GeomOneToOneAlgorithm`] to the selected geometry
/// fields.
pub struct GeomOneToOneTranslator<A> {
    algorithm: A,
    selection: GeomFieldSelection,
    map: FieldMap,
}

impl<A: GeomOneToOneAlgorithm> GeomOneToOneTranslator<A> {
    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    pub fn selection(&self) -> GeomFieldSelection {
        self.selection
    }

    /// `Ok(None)` when the feature must be dropped.
    fn translate_one(&self, defn: &Arc<Defn>, feature: Feature) -> Result<Option<Feature>> {
        let mut feature = feature.remap(defn.clone(), &self.map);
        for idx in self.selection.indices(defn.geom_field_count()) {
            let Some(geometry) = feature.take_geometry(idx) else {
                continue;
            };
            let target = self.algorithm.target_type(geometry.geometry_type());
            let input_empty = geometry.is_empty();
            let spatial_ref = geometry.spatial_ref().cloned();
            let mut result = self.algorithm.process(geometry)?;
            if let Some(ty) = target {
                result = result.force_to(ty);
            }
            if result.spatial_ref().is_none() {
                result.set_spatial_ref(spatial_ref);
            }
            let mismatch = target.is_some_and(|ty| result.geometry_type() != ty)
                || (!input_empty && result.is_empty());
            if mismatch && self.algorithm.skip_on_mismatch() {
                debug!(
                    "dropping feature {:?}: {} result on geometry field {idx}",
                    feature.fid(),
                    if result.is_empty() { "empty" } else { result.geometry_name() }
                );
                return Ok(None);
            }
            feature.set_geometry_by_index(idx, Some(result))?;
        }
        Ok(Some(feature))
    }
}

impl<A: GeomOneToOneAlgorithm> FeatureTranslator for GeomOneToOneTranslator<A> {
    fn translate(&mut self, defn: &Arc<Defn>, feature: Feature, out: &mut Vec<Feature>) -> Result<()> {
        if let Some(feature) = self.translate_one(defn, feature)? {
            out.push(feature);
        }
        Ok(())
    }

    fn proxied_capabilities(&self) -> LayerCaps {
        let mut caps = LayerCaps::RANDOM_READ;
        if !self.algorithm.skip_on_mismatch() {
            caps |= LayerCaps::FAST_FEATURE_COUNT;
        }
        if !self.algorithm.changes_extent() {
            caps |= LayerCaps::FAST_GET_EXTENT;
        }
        caps
    }
}

/// A decorator applying a [`GeomOneToOneAlgorithm`] to every feature of its
/// source.
pub type GeomOneToOneLayer<A> = PipelineOutputLayer<GeomOneToOneTranslator<A>>;

impl<A: GeomOneToOneAlgorithm> PipelineOutputLayer<GeomOneToOneTranslator<A>> {
    /// Wrap `source`, processing the geometry field named `geom_field`, or all
    /// of them.
    ///
    /// The output definition is the source one with the processed geometry
    /// fields updated by the algorithm.
    pub fn one_to_one(source: Box<dyn Layer>, algorithm: A, geom_field: Option<&str>) -> Result<Self> {
        let source_defn = source.defn().clone();
        let selection = GeomFieldSelection::resolve(&source_defn, geom_field)?;
        let mut defn = (*source_defn).clone();
        for idx in selection.indices(defn.geom_field_count()) {
            if let Some(field) = defn.geom_field_mut(idx) {
                algorithm.update_geom_field(field);
            }
        }
        let map = FieldMap::identity(&defn);
        let translator = GeomOneToOneTranslator {
            algorithm,
            selection,
            map,
        };
        Ok(PipelineOutputLayer::new(source, defn, translator))
    }
}
