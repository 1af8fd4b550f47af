use std::sync::Arc;

use bitflags::bitflags;
use geo_types::Rect;

use crate::errors::*;
use crate::spatial_ref::SpatialRef;
use crate::vector::{Defn, Feature};

bitflags! {
    /// Optional layer capabilities, queried through [`Layer::has_capability`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LayerCaps: u32 {
        /// [`Layer::feature_count`] answers without a scan.
        const FAST_FEATURE_COUNT = 0b0000_0001;
        /// [`Layer::extent`] answers without a scan.
        const FAST_GET_EXTENT = 0b0000_0010;
        /// [`Layer::feature`] answers without a scan.
        const RANDOM_READ = 0b0000_0100;
        const SEQUENTIAL_WRITE = 0b0000_1000;
        const STRINGS_AS_UTF8 = 0b0001_0000;
    }
}

/// Axis-aligned 2D extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Envelope {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    pub fn merge(&mut self, other: &Envelope) {
        self.min_x = self.min_x.min(other.min_x);
        self.max_x = self.max_x.max(other.max_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_y = self.max_y.max(other.max_y);
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }
}

impl From<Rect<f64>> for Envelope {
    fn from(r: Rect<f64>) -> Self {
        Envelope::new(r.min().x, r.max().x, r.min().y, r.max().y)
    }
}

/// A named, pull-based sequence of features sharing one definition.
///
/// The definition returned by [`Layer::defn`] does not change during the
/// lifetime of the layer. Capability queries default to "not supported", and
/// the optional operations fall back to a sequential scan of the layer.
pub trait Layer {
    fn name(&self) -> &str;

    fn defn(&self) -> &Arc<Defn>;

    /// Restart iteration from the first feature.
    fn reset_reading(&mut self);

    /// Fetch the next available feature, or `None` at the end of the layer.
    fn next_feature(&mut self) -> Result<Option<Feature>>;

    fn has_capability(&self, _capability: LayerCaps) -> bool {
        false
    }

    /// Fetch a feature by its identifier.
    ///
    /// The default implementation scans the layer and leaves the read cursor
    /// reset.
    fn feature(&mut self, fid: i64) -> Result<Option<Feature>> {
        self.reset_reading();
        let mut found = None;
        while let Some(f) = self.next_feature()? {
            if f.fid() == Some(fid) {
                found = Some(f);
                break;
            }
        }
        self.reset_reading();
        Ok(found)
    }

    /// Number of features, or `None` if it cannot be known cheaply and
    /// `force` is false.
    fn feature_count(&mut self, force: bool) -> Result<Option<u64>> {
        if !force {
            return Ok(None);
        }
        self.reset_reading();
        let mut count = 0;
        while self.next_feature()?.is_some() {
            count += 1;
        }
        self.reset_reading();
        Ok(Some(count))
    }

    /// Extent of the geometry field `geom_field`, or `None` if it cannot be known
    /// cheaply and `force` is false, or if the layer has no geometries.
    fn extent(&mut self, geom_field: usize, force: bool) -> Result<Option<Envelope>> {
        if !force {
            return Ok(None);
        }
        self.reset_reading();
        let mut extent: Option<Envelope> = None;
        while let Some(f) = self.next_feature()? {
            if let Some(env) = f.geometry_by_index(geom_field)?.and_then(|g| g.envelope()) {
                match extent.as_mut() {
                    Some(e) => e.merge(&env),
                    None => extent = Some(env),
                }
            }
        }
        self.reset_reading();
        Ok(extent)
    }

    /// Spatial reference of the first geometry field.
    fn spatial_ref(&self) -> Option<SpatialRef> {
        self.defn()
            .geom_field(0)
            .and_then(|g| g.spatial_ref().cloned())
    }
}

impl<L: Layer + ?Sized> Layer for Box<L> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn defn(&self) -> &Arc<Defn> {
        (**self).defn()
    }

    fn reset_reading(&mut self) {
        (**self).reset_reading()
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        (**self).next_feature()
    }

    fn has_capability(&self, capability: LayerCaps) -> bool {
        (**self).has_capability(capability)
    }

    fn feature(&mut self, fid: i64) -> Result<Option<Feature>> {
        (**self).feature(fid)
    }

    fn feature_count(&mut self, force: bool) -> Result<Option<u64>> {
        (**self).feature_count(force)
    }

    fn extent(&mut self, geom_field: usize, force: bool) -> Result<Option<Envelope>> {
        (**self).extent(geom_field, force)
    }
}

/// Iteration over the features of any layer.
pub trait LayerAccess {
    /// Iterate over all features in this layer, starting from the current cursor.
    fn features(&mut self) -> FeatureIterator<'_>;
}

impl<L: Layer> LayerAccess for L {
    fn features(&mut self) -> FeatureIterator<'_> {
        FeatureIterator { layer: self }
    }
}

impl LayerAccess for dyn Layer + '_ {
    fn features(&mut self) -> FeatureIterator<'_> {
        FeatureIterator { layer: self }
    }
}

/// Iterator over the features of a layer. Errors are yielded in place.
pub struct FeatureIterator<'a> {
    layer: &'a mut dyn Layer,
}

impl Iterator for FeatureIterator<'_> {
    type Item = Result<Feature>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.layer.next_feature().transpose()
    }
}

/// A layer holding its features in memory.
#[derive(Debug)]
pub struct MemoryLayer {
    name: String,
    defn: Arc<Defn>,
    features: Vec<Feature>,
    cursor: usize,
    next_fid: i64,
}

impl MemoryLayer {
    pub fn new(defn: Arc<Defn>) -> Self {
        MemoryLayer {
            name: defn.name().to_string(),
            defn,
            features: Vec::new(),
            cursor: 0,
            next_fid: 0,
        }
    }

    /// Append a feature, assigning the next FID when it has none.
    ///
    /// Returns the feature's FID.
    pub fn create_feature(&mut self, feature: Feature) -> Result<i64> {
        let mut feature = if Arc::ptr_eq(feature.defn(), &self.defn) || **feature.defn() == *self.defn {
            feature.rebind(self.defn.clone())
        } else {
            let map = crate::vector::FieldMap::by_name(feature.defn(), &self.defn);
            feature.remap(self.defn.clone(), &map)
        };
        let fid = match feature.fid() {
            Some(fid) => fid,
            None => {
                let fid = self.next_fid;
                feature.set_fid(Some(fid));
                fid
            }
        };
        self.next_fid = self.next_fid.max(fid + 1);
        self.features.push(feature);
        Ok(fid)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl Layer for MemoryLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn defn(&self) -> &Arc<Defn> {
        &self.defn
    }

    fn reset_reading(&mut self) {
        self.cursor = 0;
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        let f = self.features.get(self.cursor).cloned();
        if f.is_some() {
            self.cursor += 1;
        }
        Ok(f)
    }

    fn has_capability(&self, capability: LayerCaps) -> bool {
        !capability.is_empty()
            && (LayerCaps::FAST_FEATURE_COUNT
                | LayerCaps::FAST_GET_EXTENT
                | LayerCaps::RANDOM_READ
                | LayerCaps::SEQUENTIAL_WRITE
                | LayerCaps::STRINGS_AS_UTF8)
                .contains(capability)
    }

    fn feature(&mut self, fid: i64) -> Result<Option<Feature>> {
        Ok(self.features.iter().find(|f| f.fid() == Some(fid)).cloned())
    }

    fn feature_count(&mut self, _force: bool) -> Result<Option<u64>> {
        Ok(Some(self.features.len() as u64))
    }

    fn extent(&mut self, geom_field: usize, _force: bool) -> Result<Option<Envelope>> {
        let mut extent: Option<Envelope> = None;
        for f in &self.features {
            if let Some(env) = f.geometry_by_index(geom_field)?.and_then(|g| g.envelope()) {
                match extent.as_mut() {
                    Some(e) => e.merge(&env),
                    None => extent = Some(env),
                }
            }
        }
        Ok(extent)
    }
}
