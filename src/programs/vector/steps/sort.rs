use std::str::FromStr;
use std::sync::Arc;

use rstar::RTree;
use structopt::StructOpt;

use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::feature_store::StorageKind;
use crate::programs::vector::non_streaming::{run_batch_step, BatchAlgorithm, BatchPlan};
use crate::programs::vector::step::{parse_step_args, parsed, required_input, StepAlgorithm};
use crate::programs::vector::steps::ActiveArgs;
use crate::vector::ops::coverage::EnvelopeEntry;
use crate::vector::{Dataset, Defn, Envelope, Feature, FieldMap};

/// Spatial ordering used by `sort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMethod {
    /// Position of the envelope center along a Hilbert curve.
    #[default]
    Hilbert,
    /// Leaf order of a bulk-loaded R-tree.
    Strtree,
}

impl FromStr for SortMethod {
    type Err = GdalVecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hilbert" => Ok(SortMethod::Hilbert),
            "strtree" => Ok(SortMethod::Strtree),
            _ => Err(GdalVecError::BadArgument(format!(
                "Invalid sort method '{s}'. Expected hilbert or strtree"
            ))),
        }
    }
}

#[derive(Debug, Clone, StructOpt)]
struct SortArgs {
    /// hilbert or strtree
    #[structopt(long, default_value = "hilbert")]
    method: SortMethod,

    /// Where buffered features are kept: memory or temp-file
    #[structopt(long)]
    storage: Option<StorageKind>,

    #[structopt(flatten)]
    active: ActiveArgs,
}

const HILBERT_ORDER: u32 = 16;

/// Index of cell `(x, y)` along a Hilbert curve filling a
/// `2^HILBERT_ORDER` square grid.
fn hilbert_index(mut x: u32, mut y: u32) -> u64 {
    let n: u32 = 1 << HILBERT_ORDER;
    let mut d: u64 = 0;
    let mut s = n / 2;
    while s > 0 {
        let rx = u32::from((x & s) > 0);
        let ry = u32::from((y & s) > 0);
        d += u64::from(s) * u64::from(s) * u64::from((3 * rx) ^ ry);
        if ry == 0 {
            if rx == 1 {
                x = n - 1 - x;
                y = n - 1 - y;
            }
            std::mem::swap(&mut x, &mut y);
        }
        s /= 2;
    }
    d
}

/// Grid cell of `value` within `[min, max]`.
fn grid_cell(value: f64, min: f64, max: f64) -> u32 {
    let max_cell = ((1u32 << HILBERT_ORDER) - 1) as f64;
    if max <= min {
        return 0;
    }
    (((value - min) / (max - min)) * max_cell).round().clamp(0.0, max_cell) as u32
}

/// Reorders features spatially. Features without geometry go last, in input
/// order.
struct SpatialSort {
    method: SortMethod,
    geom_field: Option<usize>,
    envelopes: Vec<Option<Envelope>>,
    map: Option<FieldMap>,
}

impl SpatialSort {
    fn hilbert_order(&self) -> Vec<usize> {
        let total = self.envelopes.iter().flatten().copied().reduce(|mut total, env| {
            total.merge(&env);
            total
        });
        let Some(total) = total else {
            return (0..self.envelopes.len()).collect();
        };
        let mut keyed: Vec<(u64, usize)> = self
            .envelopes
            .iter()
            .enumerate()
            .filter_map(|(idx, env)| {
                let (cx, cy) = env.as_ref()?.center();
                let x = grid_cell(cx, total.min_x, total.max_x);
                let y = grid_cell(cy, total.min_y, total.max_y);
                Some((hilbert_index(x, y), idx))
            })
            .collect();
        keyed.sort_by_key(|&(key, _)| key);
        keyed.into_iter().map(|(_, idx)| idx).collect()
    }

    fn strtree_order(&self) -> Vec<usize> {
        let entries: Vec<EnvelopeEntry> = self
            .envelopes
            .iter()
            .enumerate()
            .filter_map(|(idx, env)| env.as_ref().map(|env| EnvelopeEntry::new(idx, env)))
            .collect();
        RTree::bulk_load(entries).iter().map(|entry| entry.idx).collect()
    }
}

impl BatchAlgorithm for SpatialSort {
    fn output_defn(&self, source: &Defn) -> Result<Defn> {
        Ok(source.clone())
    }

    fn observe(&mut self, _idx: usize, feature: &Feature) -> Result<()> {
        let envelope = match self.geom_field {
            Some(idx) => feature.geometry_by_index(idx)?.and_then(|g| g.envelope()),
            None => None,
        };
        self.envelopes.push(envelope);
        Ok(())
    }

    fn process(&mut self, _count: usize, progress: &mut Progress) -> Result<BatchPlan> {
        let mut order = match self.method {
            SortMethod::Hilbert => self.hilbert_order(),
            SortMethod::Strtree => self.strtree_order(),
        };
        order.extend(
            self.envelopes
                .iter()
                .enumerate()
                .filter(|(_, env)| env.is_none())
                .map(|(idx, _)| idx),
        );
        self.envelopes.clear();
        progress.report(1.0, "")?;
        Ok(BatchPlan::permutation(order))
    }

    fn emit(&mut self, defn: &Arc<Defn>, _slot: usize, inputs: Vec<Feature>) -> Result<Option<Feature>> {
        let map = self.map.get_or_insert_with(|| FieldMap::identity(defn));
        Ok(inputs
            .into_iter()
            .next()
            .map(|feature| feature.remap(defn.clone(), map)))
    }

    fn reset(&mut self) {
        self.envelopes.clear();
    }
}

/// `sort`: spatially sort features, keeping their FIDs.
#[derive(Debug, Default)]
pub struct SortStep {
    args: Option<SortArgs>,
}

impl StepAlgorithm for SortStep {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        self.args = Some(parse_step_args(self.name(), args)?);
        Ok(())
    }

    fn is_natively_streaming_compatible(&self) -> bool {
        false
    }

    fn run_step(&mut self, input: Option<Dataset>, progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let input = required_input(input, self.name())?;
        let storage = match args.storage {
            Some(storage) => storage,
            None => StorageKind::from_config()?,
        };
        let active_geometry = args.active.active_geometry.as_deref();
        run_batch_step(input, args.active.active_layer.as_deref(), storage, progress, |defn| {
            let geom_field = match active_geometry {
                Some(name) => Some(defn.geom_field_index(name).ok_or_else(|| {
                    GdalVecError::GeometryFieldNotFound {
                        field_name: name.to_string(),
                        layer_name: defn.name().to_string(),
                    }
                })?),
                None if defn.geom_field_count() > 0 => Some(0),
                None => None,
            };
            Ok(SpatialSort {
                method: args.method,
                geom_field,
                envelopes: Vec::new(),
                map: None,
            })
        })
    }
}
