use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};
use structopt::StructOpt;

use crate::cpl::CslStringList;
use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::layer_pool::LayerPool;
use crate::programs::vector::step::{parse_step_args, parsed, StepAlgorithm};
use crate::vector::{
    Dataset, Defn, Feature, FieldDefn, FieldMap, FieldType, FieldValue, GeomFieldDefn,
    GeometryType, Layer,
};

#[derive(Debug, Clone, StructOpt)]
struct ConcatArgs {
    /// Additional dataset whose layers are appended, may be repeated
    #[structopt(long, number_of_values = 1, parse(from_os_str))]
    source: Vec<PathBuf>,

    /// Name of the concatenated layer
    #[structopt(long, default_value = "concat")]
    output_layer: String,

    /// Add a field holding the name of the layer each feature comes from
    #[structopt(long)]
    source_layer_field_name: Option<String>,

    /// Open option KEY=VALUE for the --source datasets, may be repeated
    #[structopt(long = "oo", number_of_values = 1)]
    open_options: Vec<String>,
}

enum ConcatSource {
    /// A layer of the input dataset.
    Owned(Box<dyn Layer>),
    /// Layer `layer` of the dataset at `path`, opened through the pool.
    Pooled {
        path: PathBuf,
        layer: usize,
        consumed: usize,
        restart: bool,
    },
}

struct SourceInfo {
    source: ConcatSource,
    name: String,
    map: FieldMap,
}

/// Output schema: the union of all source fields, matched by name. A
/// geometry field whose name matches no other is matched by position.
fn union_defn(name: &str, sources: &[Arc<Defn>], source_field: Option<&str>) -> Defn {
    let mut defn = Defn::new(name);
    if let Some(field) = source_field {
        defn.add_field(FieldDefn::new(field, FieldType::String));
    }
    for source in sources {
        for field in source.fields() {
            if defn.field_index(field.name()).is_none() {
                defn.add_field(field.clone());
            }
        }
    }
    for source in sources {
        for (i, field) in source.geom_fields().enumerate() {
            let existing = defn.geom_field_index(field.name()).or_else(|| {
                let positional = defn.geom_field(i)?;
                source.geom_field_index(positional.name()).is_none().then_some(i)
            });
            match existing.and_then(|idx| defn.geom_field_mut(idx)) {
                Some(out) => {
                    if out.geometry_type() != field.geometry_type() {
                        out.set_geometry_type(GeometryType::Unknown);
                    }
                    if out.spatial_ref().is_none() {
                        out.set_spatial_ref(field.spatial_ref().cloned());
                    }
                }
                None => defn.add_geom_field(
                    GeomFieldDefn::new(field.name(), field.geometry_type())
                        .with_spatial_ref(field.spatial_ref().cloned()),
                ),
            }
        }
    }
    defn
}

/// Map from a source definition to the union one.
fn source_map(source: &Defn, target: &Defn) -> FieldMap {
    let mut map = FieldMap::by_name(source, target);
    for (i, slot) in map.geom_fields.iter_mut().enumerate() {
        if slot.is_none() && i < source.geom_field_count() {
            let name = source.geom_field(i).map(GeomFieldDefn::name).unwrap_or_default();
            if target.geom_field_index(name).is_none() {
                *slot = Some(i);
            }
        }
    }
    map
}

/// A layer reading its sources one after the other.
///
/// Sources coming from other datasets are opened through a [`LayerPool`]: a
/// source closed by the pool is reopened, and the features it already
/// delivered are skipped. Output FIDs are sequential from 0.
pub struct ConcatLayer {
    defn: Arc<Defn>,
    sources: Vec<SourceInfo>,
    pool: LayerPool,
    source_field: Option<usize>,
    current: usize,
    next_fid: i64,
}

impl ConcatLayer {
    fn new(
        name: &str,
        owned: Vec<Box<dyn Layer>>,
        paths: &[PathBuf],
        mut pool: LayerPool,
        source_field: Option<&str>,
    ) -> Result<Self> {
        let mut pending: Vec<(ConcatSource, String, Arc<Defn>)> = owned
            .into_iter()
            .map(|layer| {
                let name = layer.name().to_string();
                let defn = layer.defn().clone();
                (ConcatSource::Owned(layer), name, defn)
            })
            .collect();
        for path in paths {
            let (dataset, _) = pool.acquire(path)?;
            for idx in 0..dataset.layer_count() {
                let layer = dataset.layer(idx)?;
                pending.push((
                    ConcatSource::Pooled {
                        path: path.clone(),
                        layer: idx,
                        consumed: 0,
                        restart: false,
                    },
                    layer.name().to_string(),
                    layer.defn().clone(),
                ));
            }
        }

        let defns: Vec<Arc<Defn>> = pending.iter().map(|(_, _, defn)| defn.clone()).collect();
        let defn = Arc::new(union_defn(name, &defns, source_field));
        let sources = pending
            .into_iter()
            .map(|(source, name, source_defn)| SourceInfo {
                map: source_map(&source_defn, &defn),
                source,
                name,
            })
            .collect::<Vec<_>>();
        debug!("concat: {} source layers, {} fields", sources.len(), defn.field_count());
        Ok(ConcatLayer {
            source_field: source_field.map(|_| 0),
            defn,
            sources,
            pool,
            current: 0,
            next_fid: 0,
        })
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Number of datasets opened by the pool so far, reopens included.
    pub fn opened(&self) -> usize {
        self.pool.opened()
    }

    fn next_source_feature(&mut self) -> Result<Option<Feature>> {
        let info = &mut self.sources[self.current];
        match &mut info.source {
            ConcatSource::Owned(layer) => layer.next_feature(),
            ConcatSource::Pooled {
                path,
                layer,
                consumed,
                restart,
            } => {
                let (dataset, reopened) = self.pool.acquire(path)?;
                let source = dataset.layer(*layer)?;
                if reopened || *restart {
                    source.reset_reading();
                    for _ in 0..*consumed {
                        source.next_feature()?;
                    }
                    *restart = false;
                }
                let feature = source.next_feature()?;
                if feature.is_some() {
                    *consumed += 1;
                }
                Ok(feature)
            }
        }
    }
}

impl Layer for ConcatLayer {
    fn name(&self) -> &str {
        self.defn.name()
    }

    fn defn(&self) -> &Arc<Defn> {
        &self.defn
    }

    fn reset_reading(&mut self) {
        self.current = 0;
        self.next_fid = 0;
        for info in &mut self.sources {
            match &mut info.source {
                ConcatSource::Owned(layer) => layer.reset_reading(),
                ConcatSource::Pooled {
                    consumed, restart, ..
                } => {
                    *consumed = 0;
                    *restart = true;
                }
            }
        }
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        while self.current < self.sources.len() {
            let Some(feature) = self.next_source_feature()? else {
                self.current += 1;
                continue;
            };
            let info = &self.sources[self.current];
            let mut feature = feature.remap(self.defn.clone(), &info.map);
            if let Some(idx) = self.source_field {
                feature.set_field_by_index(idx, Some(FieldValue::StringValue(info.name.clone())))?;
            }
            feature.set_fid(Some(self.next_fid));
            self.next_fid += 1;
            return Ok(Some(feature));
        }
        Ok(None)
    }
}

/// `concat`: concatenate every input layer, and the layers of the `--source`
/// datasets, into a single layer.
#[derive(Debug, Default)]
pub struct ConcatStep {
    args: Option<ConcatArgs>,
}

impl StepAlgorithm for ConcatStep {
    fn name(&self) -> &'static str {
        "concat"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        self.args = Some(parse_step_args(self.name(), args)?);
        Ok(())
    }

    fn run_step(&mut self, input: Option<Dataset>, progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let (description, owned) = match input {
            Some(input) => (input.description().to_string(), input.into_layers()),
            None => (String::new(), Vec::new()),
        };
        let open_options = CslStringList::try_from(args.open_options.as_slice())?;
        let pool = LayerPool::from_config()?.with_open_options(open_options);
        info!(
            "concat: {} input layers and {} source datasets",
            owned.len(),
            args.source.len()
        );
        let layer = ConcatLayer::new(
            &args.output_layer,
            owned,
            &args.source,
            pool,
            args.source_layer_field_name.as_deref(),
        )?;
        let mut output = Dataset::new(&description);
        output.add_layer(Box::new(layer));
        progress.report(1.0, "")?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{clear_thread_local_config_option, set_thread_local_config_option};
    use crate::programs::vector::step::PipelineStep;
    use crate::test_utils::{wkt_layer, TempFixture};

    fn geojson(name: &str, features: &[(&str, f64)]) -> TempFixture {
        let features: Vec<String> = features
            .iter()
            .map(|(kind, x)| {
                format!(
                    r#"{{"type":"Feature","properties":{{"kind":"{kind}"}},"geometry":{{"type":"Point","coordinates":[{x},0]}}}}"#
                )
            })
            .collect();
        let text = format!(
            r#"{{"type":"FeatureCollection","features":[{}]}}"#,
            features.join(",")
        );
        TempFixture::with_contents(name, text.as_bytes())
    }

    #[test]
    fn test_union_schema() {
        let mut a = Defn::with_geometry("a", "geom", GeometryType::Point, None);
        a.add_field(FieldDefn::new("id", FieldType::Integer));
        let mut b = Defn::with_geometry("b", "", GeometryType::LineString, None);
        b.add_field(FieldDefn::new("ID", FieldType::Integer));
        b.add_field(FieldDefn::new("kind", FieldType::String));
        let defn = union_defn("out", &[Arc::new(a), Arc::new(b.clone())], Some("src"));
        let names: Vec<_> = defn.fields().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["src", "id", "kind"]);
        assert_eq!(defn.geom_field_count(), 1);
        assert_eq!(defn.geometry_type(), GeometryType::Unknown);
        assert_eq!(source_map(&b, &defn).geom_fields, vec![Some(0)]);
    }

    #[test]
    fn test_concat_input_and_sources() -> Result<()> {
        let a = geojson("a.geojson", &[("x", 1.0), ("y", 2.0)]);
        let b = geojson("b.geojson", &[("z", 3.0)]);
        set_thread_local_config_option("GDALVEC_LAYER_POOL_SIZE", "1")?;

        let mut input = Dataset::new("mem");
        input.add_layer(Box::new(wkt_layer("pts", GeometryType::Point, &["POINT (0 0)"])));
        let mut step = PipelineStep::new(Box::<ConcatStep>::default());
        let args: Vec<String> = [
            "--source",
            &a.path().display().to_string(),
            "--source",
            &b.path().display().to_string(),
            "--source-layer-field-name",
            "src",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        step.parse_args(&args)?;
        step.set_input(input);
        let result = step.run_step(&mut Progress::none());
        clear_thread_local_config_option("GDALVEC_LAYER_POOL_SIZE")?;
        result?;

        let mut output = step.take_output().unwrap();
        assert_eq!(output.layer_names(), vec!["concat"]);
        let layer = output.layer(0)?;
        let mut rows = Vec::new();
        while let Some(f) = layer.next_feature()? {
            rows.push((f.fid(), f.field_as_string(0)?, f.field_as_string(3)?));
        }
        assert_eq!(
            rows,
            vec![
                (Some(0), Some("pts".to_string()), None),
                (Some(1), Some("a".to_string()), Some("x".to_string())),
                (Some(2), Some("a".to_string()), Some("y".to_string())),
                (Some(3), Some("b".to_string()), Some("z".to_string())),
            ]
        );
        // every feature carries a geometry through the positional match
        layer.reset_reading();
        while let Some(f) = layer.next_feature()? {
            assert!(f.geometry().is_some());
        }
        Ok(())
    }
}
