use std::sync::Arc;

use log::debug;
use structopt::StructOpt;

use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::one_to_one::GeomFieldSelection;
use crate::programs::vector::output_layer::{FeatureTranslator, PipelineOutputLayer};
use crate::programs::vector::step::{map_layers, parse_step_args, parsed, required_input, StepAlgorithm};
use crate::programs::vector::steps::ActiveArgs;
use crate::vector::{Dataset, Defn, Feature, FieldMap, Geometry, GeometryType, Layer};

#[derive(Debug, Clone, StructOpt)]
struct ExplodeArgs {
    /// Type the exploded parts are coerced to
    #[structopt(long)]
    geometry_type: Option<String>,

    /// Drop parts that cannot be coerced to --geometry-type
    #[structopt(long)]
    skip_on_type_mismatch: bool,

    #[structopt(flatten)]
    active: ActiveArgs,
}

impl ExplodeArgs {
    fn target_type(&self) -> Result<Option<GeometryType>> {
        self.geometry_type
            .as_deref()
            .map(|name| {
                GeometryType::from_name(name).ok_or_else(|| {
                    GdalVecError::BadArgument(format!(
                        "explode-collections: unknown geometry type '{name}'"
                    ))
                })
            })
            .transpose()
    }
}

/// Split the collection geometries of every feature into one feature per
/// part.
///
/// With several selected geometry fields the output is the cartesian product
/// of their parts. Nested collections are flattened recursively. Output
/// features are numbered from 1 in emission order.
pub struct ExplodeTranslator {
    selection: GeomFieldSelection,
    target: Option<GeometryType>,
    skip_on_mismatch: bool,
    map: FieldMap,
    next_fid: i64,
}

impl ExplodeTranslator {
    /// Build the translator and the output definition for `source`.
    pub fn new(
        source: &Defn,
        geom_field: Option<&str>,
        target: Option<GeometryType>,
        skip_on_mismatch: bool,
    ) -> Result<(Self, Defn)> {
        let selection = GeomFieldSelection::resolve(source, geom_field)?;
        let mut defn = source.clone();
        for idx in selection.indices(defn.geom_field_count()) {
            if let Some(field) = defn.geom_field_mut(idx) {
                let ty = target.unwrap_or_else(|| field.geometry_type().to_single());
                field.set_geometry_type(ty);
            }
        }
        let translator = ExplodeTranslator {
            selection,
            target,
            skip_on_mismatch,
            map: FieldMap::identity(&defn),
            next_fid: 1,
        };
        Ok((translator, defn))
    }
}

fn flatten(geometry: Geometry, out: &mut Vec<Geometry>) {
    if geometry.geometry_type().is_collection() {
        for part in geometry.into_parts() {
            flatten(part, out);
        }
    } else {
        out.push(geometry);
    }
}

impl FeatureTranslator for ExplodeTranslator {
    fn translate(&mut self, defn: &Arc<Defn>, feature: Feature, out: &mut Vec<Feature>) -> Result<()> {
        let mut branches = vec![feature.remap(defn.clone(), &self.map)];
        for idx in self.selection.indices(defn.geom_field_count()) {
            let mut expanded = Vec::with_capacity(branches.len());
            for mut branch in branches {
                let Some(geometry) = branch.take_geometry(idx) else {
                    expanded.push(branch);
                    continue;
                };
                // an empty collection has no parts and drops the branch
                let mut parts = Vec::new();
                flatten(geometry, &mut parts);
                for mut part in parts {
                    if let Some(ty) = self.target {
                        part = part.force_to(ty);
                        if part.geometry_type() != ty && self.skip_on_mismatch {
                            debug!("dropping {} part of feature {:?}", part.geometry_name(), branch.fid());
                            continue;
                        }
                    }
                    let mut exploded = branch.clone();
                    exploded.set_geometry_by_index(idx, Some(part))?;
                    expanded.push(exploded);
                }
            }
            branches = expanded;
        }
        for mut feature in branches {
            feature.set_fid(Some(self.next_fid));
            self.next_fid += 1;
            out.push(feature);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.next_fid = 1;
    }
}

/// `explode-collections`: one output feature per collection part.
#[derive(Debug, Default)]
pub struct ExplodeCollectionsStep {
    args: Option<ExplodeArgs>,
}

impl StepAlgorithm for ExplodeCollectionsStep {
    fn name(&self) -> &'static str {
        "explode-collections"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        let args: ExplodeArgs = parse_step_args(self.name(), args)?;
        args.target_type()?;
        self.args = Some(args);
        Ok(())
    }

    fn run_step(&mut self, input: Option<Dataset>, _progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let input = required_input(input, self.name())?;
        let target = args.target_type()?;
        map_layers(input, args.active.active_layer.as_deref(), |source| {
            let (translator, defn) = ExplodeTranslator::new(
                source.defn(),
                args.active.active_geometry.as_deref(),
                target,
                args.skip_on_type_mismatch,
            )?;
            Ok(Box::new(PipelineOutputLayer::new(source, defn, translator)) as Box<dyn Layer>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{collect_wkt, wkt_layer};
    use crate::vector::{GeomFieldDefn, MemoryLayer};

    fn explode(
        source: MemoryLayer,
        target: Option<GeometryType>,
        skip: bool,
    ) -> Result<PipelineOutputLayer<ExplodeTranslator>> {
        let (translator, defn) = ExplodeTranslator::new(source.defn(), None, target, skip)?;
        Ok(PipelineOutputLayer::new(Box::new(source), defn, translator))
    }

    #[test]
    fn test_nested_collections_flattened() -> Result<()> {
        let source = wkt_layer(
            "gc",
            GeometryType::GeometryCollection,
            &["GEOMETRYCOLLECTION (POINT (0 0), MULTIPOINT ((1 1), (2 2)), LINESTRING (0 0, 1 1))"],
        );
        let mut layer = explode(source, None, false)?;
        assert_eq!(layer.defn().geometry_type(), GeometryType::Unknown);
        let rows = collect_wkt(&mut layer);
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows.iter().map(|(fid, _)| *fid).collect::<Vec<_>>(),
            vec![Some(1), Some(2), Some(3), Some(4)]
        );
        Ok(())
    }

    #[test]
    fn test_cartesian_product() -> Result<()> {
        let mut defn = Defn::with_geometry("two", "a", GeometryType::MultiPoint, None);
        defn.add_geom_field(GeomFieldDefn::new("b", GeometryType::MultiLineString));
        let mut source = MemoryLayer::new(Arc::new(defn));
        let mut f = Feature::new(source.defn().clone());
        f.set_geometry_by_index(0, Some(Geometry::from_wkt("MULTIPOINT ((0 0), (1 1), (2 2))")?))?;
        f.set_geometry_by_index(
            1,
            Some(Geometry::from_wkt("MULTILINESTRING ((0 0, 1 1), (2 2, 3 3))")?),
        )?;
        source.create_feature(f)?;

        let mut layer = explode(source, None, false)?;
        assert_eq!(layer.defn().geom_field(0).unwrap().geometry_type(), GeometryType::Point);
        assert_eq!(layer.defn().geom_field(1).unwrap().geometry_type(), GeometryType::LineString);
        let mut count = 0;
        while let Some(f) = layer.next_feature()? {
            count += 1;
            assert_eq!(f.geometry_by_index(0)?.unwrap().geometry_type(), GeometryType::Point);
            assert_eq!(
                f.geometry_by_index(1)?.unwrap().geometry_type(),
                GeometryType::LineString
            );
        }
        assert_eq!(count, 6);
        Ok(())
    }

    #[test]
    fn test_type_mismatch_skipped() -> Result<()> {
        let source = wkt_layer(
            "gc",
            GeometryType::GeometryCollection,
            &["GEOMETRYCOLLECTION (POINT (0 0), LINESTRING (0 0, 1 1), POINT (1 1))"],
        );
        let mut layer = explode(source, Some(GeometryType::Point), true)?;
        assert_eq!(layer.defn().geometry_type(), GeometryType::Point);
        let rows = collect_wkt(&mut layer);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].0, Some(2));
        Ok(())
    }

    #[test]
    fn test_empty_collection_dropped() -> Result<()> {
        let source = wkt_layer(
            "mp",
            GeometryType::MultiPoint,
            &["MULTIPOINT EMPTY", "MULTIPOINT ((0 0), (1 1))", "GEOMETRYCOLLECTION EMPTY"],
        );
        let mut layer = explode(source, Some(GeometryType::Point), false)?;
        let rows = collect_wkt(&mut layer);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows.iter().map(|(fid, _)| *fid).collect::<Vec<_>>(),
            vec![Some(1), Some(2)]
        );
        Ok(())
    }

    #[test]
    fn test_single_geometries_pass_through() -> Result<()> {
        let source = wkt_layer("pts", GeometryType::Point, &["POINT (0 0)", "POINT (1 1)"]);
        let mut layer = explode(source, None, false)?;
        let rows = collect_wkt(&mut layer);
        assert_eq!(rows.len(), 2);
        // restarted numbering after a reset
        assert_eq!(rows[0].0, Some(1));
        assert_eq!(collect_wkt(&mut layer)[0].0, Some(1));
        Ok(())
    }
}
