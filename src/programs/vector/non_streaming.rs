use std::sync::Arc;

use log::debug;

use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::feature_store::{FeatureStore, StorageKind};
use crate::programs::vector::step::map_layers;
use crate::vector::{Dataset, Defn, Feature, Layer};

/// Emission order computed by a [`BatchAlgorithm`].
///
/// Each slot lists the input indices that make up one output feature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchPlan {
    slots: Vec<Vec<usize>>,
}

impl BatchPlan {
    /// One slot per input, in input order.
    pub fn in_order(count: usize) -> Self {
        BatchPlan {
            slots: (0..count).map(|i| vec![i]).collect(),
        }
    }

    /// One slot per input, in the order given by `order`.
    pub fn permutation(order: Vec<usize>) -> Self {
        BatchPlan {
            slots: order.into_iter().map(|i| vec![i]).collect(),
        }
    }

    /// One slot per group of inputs.
    pub fn groups(groups: Vec<Vec<usize>>) -> Self {
        BatchPlan { slots: groups }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Vec<usize>] {
        &self.slots
    }
}

/// An algorithm that needs every input feature before emitting any.
///
/// The adapter drains the source, showing each feature to
/// [`BatchAlgorithm::observe`] before buffering it, then calls
/// [`BatchAlgorithm::process`] once and emits the planned slots.
pub trait BatchAlgorithm {
    /// Definition of the output features, derived from the source one.
    fn output_defn(&self, source: &Defn) -> Result<Defn>;

    /// Record whatever the batch step needs from input feature `idx`.
    fn observe(&mut self, idx: usize, feature: &Feature) -> Result<()>;

    /// Run the batch over the `count` observed features.
    fn process(&mut self, count: usize, progress: &mut Progress) -> Result<BatchPlan>;

    /// Build the output feature of plan slot `slot` from its input features.
    /// `None` drops the slot.
    fn emit(&mut self, defn: &Arc<Defn>, slot: usize, inputs: Vec<Feature>) -> Result<Option<Feature>>;

    /// Forget everything observed, before a new drain.
    fn reset(&mut self) {}
}

/// A layer materializing its source and emitting the result of a
/// [`BatchAlgorithm`].
///
/// Buffered features are released as they are emitted, so restarting reading
/// runs the batch again from the source.
pub struct NonStreamingLayer<B> {
    source: Box<dyn Layer>,
    defn: Arc<Defn>,
    algorithm: B,
    storage: StorageKind,
    store: Option<FeatureStore>,
    plan: Option<BatchPlan>,
    cursor: usize,
}

impl<B: BatchAlgorithm> NonStreamingLayer<B> {
    pub fn new(source: Box<dyn Layer>, algorithm: B, storage: StorageKind) -> Result<Self> {
        let defn = Arc::new(algorithm.output_defn(source.defn())?);
        Ok(NonStreamingLayer {
            source,
            defn,
            algorithm,
            storage,
            store: None,
            plan: None,
            cursor: 0,
        })
    }

    pub fn algorithm(&self) -> &B {
        &self.algorithm
    }

    pub fn is_prepared(&self) -> bool {
        self.plan.is_some()
    }

    /// Drain the source and run the batch.
    ///
    /// The first half of `progress` covers the drain, when the source count
    /// is known cheaply, the second half the batch itself.
    pub fn prepare(&mut self, progress: &mut Progress) -> Result<()> {
        self.plan = None;
        self.store = None;
        self.cursor = 0;
        self.algorithm.reset();

        let mut store = FeatureStore::new(self.storage)?;
        self.source.reset_reading();
        let total = self.source.feature_count(false)?;
        {
            let mut drain = progress.scaled(0.0, 0.5);
            while let Some(feature) = self.source.next_feature()? {
                let idx = store.len();
                self.algorithm.observe(idx, &feature)?;
                store.push(feature)?;
                let fraction = match total {
                    Some(total) if total > 0 => (idx + 1) as f64 / total as f64,
                    _ => 0.0,
                };
                drain.report(fraction, "")?;
            }
        }
        let count = store.len();
        debug!("{}: buffered {count} features", self.defn.name());
        let plan = self
            .algorithm
            .process(count, &mut progress.scaled(0.5, 1.0))?;
        self.store = Some(store);
        self.plan = Some(plan);
        Ok(())
    }
}

impl<B: BatchAlgorithm> Layer for NonStreamingLayer<B> {
    fn name(&self) -> &str {
        self.defn.name()
    }

    fn defn(&self) -> &Arc<Defn> {
        &self.defn
    }

    fn reset_reading(&mut self) {
        if self.cursor > 0 {
            self.plan = None;
            self.store = None;
            self.cursor = 0;
        }
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        if self.plan.is_none() {
            self.prepare(&mut Progress::none())?;
        }
        let source_defn = self.source.defn().clone();
        loop {
            let (Some(plan), Some(store)) = (self.plan.as_ref(), self.store.as_mut()) else {
                return Ok(None);
            };
            let Some(indices) = plan.slots().get(self.cursor) else {
                return Ok(None);
            };
            let mut inputs = Vec::with_capacity(indices.len());
            for &idx in indices {
                if let Some(feature) = store.take(idx, &source_defn)? {
                    inputs.push(feature);
                }
            }
            let slot = self.cursor;
            self.cursor += 1;
            if let Some(feature) = self.algorithm.emit(&self.defn, slot, inputs)? {
                return Ok(Some(feature));
            }
        }
    }
}

/// Wrap the active layers of `input` in [`NonStreamingLayer`]s built by
/// `make`, and prepare them all. Progress is shared evenly between layers.
pub(crate) fn run_batch_step<B, F>(
    input: Dataset,
    active_layer: Option<&str>,
    storage: StorageKind,
    progress: &mut Progress,
    mut make: F,
) -> Result<Dataset>
where
    B: BatchAlgorithm + 'static,
    F: FnMut(&Defn) -> Result<B>,
{
    let count = match active_layer {
        Some(_) => 1,
        None => input.layer_count().max(1),
    };
    let mut done = 0;
    map_layers(input, active_layer, |source| {
        let algorithm = make(source.defn())?;
        let mut layer = NonStreamingLayer::new(source, algorithm, storage)?;
        let start = done as f64 / count as f64;
        done += 1;
        layer.prepare(&mut progress.scaled(start, done as f64 / count as f64))?;
        Ok(Box::new(layer))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{collect_wkt, wkt_layer};
    use crate::vector::{FieldMap, GeometryType};

    /// Emits features in reverse order, dropping those whose `id` is odd.
    #[derive(Default)]
    struct ReverseEven {
        ids: Vec<i32>,
        resets: usize,
    }

    impl BatchAlgorithm for ReverseEven {
        fn output_defn(&self, source: &Defn) -> Result<Defn> {
            Ok(source.clone())
        }

        fn observe(&mut self, _idx: usize, feature: &Feature) -> Result<()> {
            let id = feature.field("id")?.cloned().and_then(|v| v.into_int());
            self.ids.push(id.unwrap_or_default());
            Ok(())
        }

        fn process(&mut self, count: usize, _progress: &mut Progress) -> Result<BatchPlan> {
            Ok(BatchPlan::permutation((0..count).rev().collect()))
        }

        fn emit(&mut self, defn: &Arc<Defn>, _slot: usize, inputs: Vec<Feature>) -> Result<Option<Feature>> {
            let Some(feature) = inputs.into_iter().next() else {
                return Ok(None);
            };
            let id = feature.field("id")?.cloned().and_then(|v| v.into_int());
            if id.unwrap_or_default() % 2 == 1 {
                return Ok(None);
            }
            Ok(Some(feature.remap(defn.clone(), &FieldMap::identity(defn))))
        }

        fn reset(&mut self) {
            self.ids.clear();
            self.resets += 1;
        }
    }

    fn source() -> Box<dyn Layer> {
        Box::new(wkt_layer(
            "pts",
            GeometryType::Point,
            &["POINT (0 0)", "POINT (1 1)", "POINT (2 2)", "POINT (3 3)", "POINT (4 4)"],
        ))
    }

    #[test]
    fn test_plan_order_and_drop() -> Result<()> {
        for storage in [StorageKind::Memory, StorageKind::TempFile] {
            let mut layer = NonStreamingLayer::new(source(), ReverseEven::default(), storage)?;
            let fids: Vec<_> = collect_wkt(&mut layer).into_iter().map(|(fid, _)| fid).collect();
            assert_eq!(fids, vec![Some(4), Some(2), Some(0)]);
            assert_eq!(layer.algorithm().ids, vec![0, 1, 2, 3, 4]);
        }
        Ok(())
    }

    #[test]
    fn test_reset_reruns_batch() -> Result<()> {
        let mut layer = NonStreamingLayer::new(source(), ReverseEven::default(), StorageKind::Memory)?;
        layer.prepare(&mut Progress::none())?;
        // untouched plan survives a reset
        layer.reset_reading();
        assert!(layer.is_prepared());
        assert_eq!(layer.algorithm().resets, 1);

        assert_eq!(layer.next_feature()?.unwrap().fid(), Some(4));
        layer.reset_reading();
        assert!(!layer.is_prepared());
        assert_eq!(layer.next_feature()?.unwrap().fid(), Some(4));
        assert_eq!(layer.algorithm().resets, 2);
        assert_eq!(layer.feature_count(true)?, Some(3));
        Ok(())
    }

    #[test]
    fn test_prepare_cancelled() -> Result<()> {
        let mut layer = NonStreamingLayer::new(source(), ReverseEven::default(), StorageKind::Memory)?;
        let mut calls = 0;
        let mut cb = |_: f64, _: &str| {
            calls += 1;
            calls < 3
        };
        let err = layer.prepare(&mut Progress::new(&mut cb)).unwrap_err();
        assert!(err.is_user_interrupt());
        assert!(!layer.is_prepared());
        assert_eq!(calls, 3);
        Ok(())
    }
}
