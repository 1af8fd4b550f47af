use std::collections::VecDeque;
use std::sync::Arc;

use crate::errors::*;
use crate::vector::{Defn, Envelope, Feature, Layer, LayerCaps};

/// Per-feature transform of a [`PipelineOutputLayer`].
pub trait FeatureTranslator {
    /// Translate one source feature into zero, one or many output features
    /// bound to `defn`.
    fn translate(&mut self, defn: &Arc<Defn>, feature: Feature, out: &mut Vec<Feature>) -> Result<()>;

    /// Called when the layer restarts reading.
    fn reset(&mut self) {}

    /// Capabilities answered by the source layer on behalf of the decorator.
    ///
    /// Only claim a capability when the translation keeps the answer valid:
    /// `FAST_FEATURE_COUNT` needs a strict 1:1 mapping, `FAST_GET_EXTENT`
    /// unchanged geometries, `RANDOM_READ` a translation that does not depend
    /// on previous features.
    fn proxied_capabilities(&self) -> LayerCaps {
        LayerCaps::empty()
    }
}

/// A layer translating the features of a source layer as they are pulled.
///
/// The decorator owns its source. Its definition is derived once, when the
/// decorator is built, and never changes afterwards.
pub struct PipelineOutputLayer<T> {
    source: Box<dyn Layer>,
    defn: Arc<Defn>,
    translator: T,
    pending: VecDeque<Feature>,
    scratch: Vec<Feature>,
    // features served since the last reset
    position: usize,
}

impl<T: FeatureTranslator> PipelineOutputLayer<T> {
    pub fn new(source: Box<dyn Layer>, defn: Defn, translator: T) -> Self {
        PipelineOutputLayer {
            source,
            defn: Arc::new(defn),
            translator,
            pending: VecDeque::new(),
            scratch: Vec::new(),
            position: 0,
        }
    }

    pub fn source(&self) -> &dyn Layer {
        self.source.as_ref()
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    fn proxies(&self, capability: LayerCaps) -> bool {
        self.translator.proxied_capabilities().contains(capability)
            && self.source.has_capability(capability)
    }

    /// Restart reading and skip the first `position` features, restoring the
    /// cursor a full scan moved.
    fn seek(&mut self, position: usize) -> Result<()> {
        self.reset_reading();
        while self.position < position {
            if self.next_feature()?.is_none() {
                break;
            }
        }
        Ok(())
    }
}

impl<T: FeatureTranslator> Layer for PipelineOutputLayer<T> {
    fn name(&self) -> &str {
        self.defn.name()
    }

    fn defn(&self) -> &Arc<Defn> {
        &self.defn
    }

    fn reset_reading(&mut self) {
        self.position = 0;
        self.pending.clear();
        self.translator.reset();
        self.source.reset_reading();
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        loop {
            if let Some(feature) = self.pending.pop_front() {
                self.position += 1;
                return Ok(Some(feature));
            }
            let Some(src) = self.source.next_feature()? else {
                return Ok(None);
            };
            self.translator.translate(&self.defn, src, &mut self.scratch)?;
            self.pending.extend(self.scratch.drain(..));
        }
    }

    fn has_capability(&self, capability: LayerCaps) -> bool {
        self.proxies(capability)
    }

    fn feature(&mut self, fid: i64) -> Result<Option<Feature>> {
        if !self.proxies(LayerCaps::RANDOM_READ) {
            // scan, through the translation
            let position = self.position;
            self.reset_reading();
            let mut found = None;
            while let Some(f) = self.next_feature()? {
                if f.fid() == Some(fid) {
                    found = Some(f);
                    break;
                }
            }
            self.seek(position)?;
            return Ok(found);
        }
        let Some(src) = self.source.feature(fid)? else {
            return Ok(None);
        };
        let mut out = Vec::new();
        self.translator.translate(&self.defn, src, &mut out)?;
        Ok(out.into_iter().next())
    }

    fn feature_count(&mut self, force: bool) -> Result<Option<u64>> {
        if self.proxies(LayerCaps::FAST_FEATURE_COUNT) {
            return self.source.feature_count(force);
        }
        if !force {
            return Ok(None);
        }
        let position = self.position;
        self.reset_reading();
        let mut count = 0;
        while self.next_feature()?.is_some() {
            count += 1;
        }
        self.seek(position)?;
        Ok(Some(count))
    }

    fn extent(&mut self, geom_field: usize, force: bool) -> Result<Option<Envelope>> {
        if self.proxies(LayerCaps::FAST_GET_EXTENT) {
            return self.source.extent(geom_field, force);
        }
        if !force {
            return Ok(None);
        }
        let position = self.position;
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
        self.seek(position)?;
        Ok(extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::wkt_layer;
    use crate::vector::{FieldMap, GeometryType};

    /// Emits every feature `n` times, where `n` is its `id` field.
    struct Repeat;

    impl FeatureTranslator for Repeat {
        fn translate(&mut self, defn: &Arc<Defn>, feature: Feature, out: &mut Vec<Feature>) -> Result<()> {
            let n = feature.field("id")?.cloned().and_then(|v| v.into_int()).unwrap_or(0);
            let map = FieldMap::identity(defn);
            let feature = feature.remap(defn.clone(), &map);
            out.extend(std::iter::repeat(feature).take(n as usize));
            Ok(())
        }
    }

    #[test]
    fn test_zero_one_many() -> Result<()> {
        // ids 0, 1, 2
        let source = wkt_layer(
            "pts",
            GeometryType::Point,
            &["POINT (0 0)", "POINT (1 1)", "POINT (2 2)"],
        );
        let defn = (**source.defn()).clone();
        let mut layer = PipelineOutputLayer::new(Box::new(source), defn, Repeat);
        let fids: Vec<_> = std::iter::from_fn(|| layer.next_feature().unwrap())
            .map(|f| f.fid())
            .collect();
        assert_eq!(fids, vec![Some(1), Some(2), Some(2)]);
        assert!(layer.next_feature()?.is_none());

        layer.reset_reading();
        assert_eq!(layer.next_feature()?.unwrap().fid(), Some(1));
        // nothing proxied
        assert!(!layer.has_capability(LayerCaps::FAST_FEATURE_COUNT));
        assert_eq!(layer.feature_count(false)?, None);
        assert_eq!(layer.feature_count(true)?, Some(3));
        assert_eq!(layer.feature(2)?.unwrap().fid(), Some(2));
        Ok(())
    }

    #[test]
    fn test_lookup_keeps_cursor() -> Result<()> {
        let source = wkt_layer(
            "pts",
            GeometryType::Point,
            &["POINT (0 0)", "POINT (1 1)", "POINT (2 2)", "POINT (3 3)"],
        );
        let defn = (**source.defn()).clone();
        let mut layer = PipelineOutputLayer::new(Box::new(source), defn, Repeat);
        // ids 1, 2, 2, 3, 3, 3 once repeated
        assert_eq!(layer.next_feature()?.unwrap().fid(), Some(1));
        assert_eq!(layer.next_feature()?.unwrap().fid(), Some(2));

        assert_eq!(layer.feature(3)?.unwrap().fid(), Some(3));
        assert_eq!(layer.feature_count(true)?, Some(6));
        assert!(layer.extent(0, true)?.is_some());

        let rest: Vec<_> = std::iter::from_fn(|| layer.next_feature().unwrap())
            .map(|f| f.fid())
            .collect();
        assert_eq!(rest, vec![Some(2), Some(3), Some(3), Some(3)]);
        Ok(())
    }
}
