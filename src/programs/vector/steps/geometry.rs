//! Steps applying a unary geometry operation to every feature.

use structopt::StructOpt;

use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::one_to_one::{GeomOneToOneAlgorithm, GeomOneToOneLayer};
use crate::programs::vector::step::{map_layers, parse_step_args, parsed, required_input, StepAlgorithm};
use crate::programs::vector::steps::ActiveArgs;
use crate::spatial_ref::SpatialRef;
use crate::vector::{Dataset, GeomFieldDefn, Geometry, GeometryType};

/// Wrap every active layer of `input` in a [`GeomOneToOneLayer`] running the
/// algorithm built by `make`.
fn run_one_to_one<A, F>(input: Dataset, active: &ActiveArgs, make: F) -> Result<Dataset>
where
    A: GeomOneToOneAlgorithm + 'static,
    F: Fn() -> A,
{
    map_layers(input, active.active_layer.as_deref(), |layer| {
        let layer = GeomOneToOneLayer::one_to_one(layer, make(), active.active_geometry.as_deref())?;
        Ok(Box::new(layer))
    })
}

/// Implements [`StepAlgorithm`] for a one-to-one geometry step whose
/// argument struct has an `active: ActiveArgs` member and converts into the
/// algorithm.
macro_rules! one_to_one_step {
    ($step:ident, $args:ty, $name:literal) => {
        impl StepAlgorithm for $step {
            fn name(&self) -> &'static str {
                $name
            }

            fn parse_args(&mut self, args: &[String]) -> Result<()> {
                let args: $args = parse_step_args(self.name(), args)?;
                args.validate()?;
                self.args = Some(args);
                Ok(())
            }

            fn run_step(&mut self, input: Option<Dataset>, _progress: &mut Progress) -> Result<Dataset> {
                let args = parsed(&self.args, self.name())?;
                let input = required_input(input, self.name())?;
                run_one_to_one(input, &args.active, || args.algorithm())
            }
        }
    };
}

#[derive(Debug, Clone, StructOpt)]
struct BufferArgs {
    /// Buffer distance, in units of the coordinates. May be negative
    #[structopt(long, allow_hyphen_values = true)]
    distance: f64,

    /// Drop features whose buffer collapses to nothing
    #[structopt(long)]
    skip: bool,

    #[structopt(flatten)]
    active: ActiveArgs,
}

impl BufferArgs {
    fn validate(&self) -> Result<()> {
        if !self.distance.is_finite() {
            return Err(GdalVecError::BadArgument(format!(
                "buffer: invalid distance {}",
                self.distance
            )));
        }
        Ok(())
    }

    fn algorithm(&self) -> BufferGeometry {
        BufferGeometry {
            distance: self.distance,
            skip: self.skip,
        }
    }
}

struct BufferGeometry {
    distance: f64,
    skip: bool,
}

impl GeomOneToOneAlgorithm for BufferGeometry {
    fn process(&self, geometry: Geometry) -> Result<Geometry> {
        geometry.buffer(self.distance)
    }

    fn skip_on_mismatch(&self) -> bool {
        self.skip
    }

    fn update_geom_field(&self, field: &mut GeomFieldDefn) {
        let ty = if field.geometry_type().is_collection() {
            GeometryType::MultiPolygon
        } else {
            GeometryType::Polygon
        };
        field.set_geometry_type(ty);
    }
}

/// `buffer`: grow or shrink geometries by a distance.
#[derive(Debug, Default)]
pub struct BufferStep {
    args: Option<BufferArgs>,
}

one_to_one_step!(BufferStep, BufferArgs, "buffer");

#[derive(Debug, Clone, StructOpt)]
struct SimplifyArgs {
    /// Distance tolerance
    #[structopt(long)]
    tolerance: f64,

    #[structopt(flatten)]
    active: ActiveArgs,
}

impl SimplifyArgs {
    fn validate(&self) -> Result<()> {
        if !(self.tolerance >= 0.0) {
            return Err(GdalVecError::BadArgument(format!(
                "simplify: tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    fn algorithm(&self) -> SimplifyGeometry {
        SimplifyGeometry(self.tolerance)
    }
}

struct SimplifyGeometry(f64);

impl GeomOneToOneAlgorithm for SimplifyGeometry {
    fn process(&self, geometry: Geometry) -> Result<Geometry> {
        geometry.simplify(self.0)
    }
}

/// `simplify`: Douglas-Peucker simplification.
#[derive(Debug, Default)]
pub struct SimplifyStep {
    args: Option<SimplifyArgs>,
}

one_to_one_step!(SimplifyStep, SimplifyArgs, "simplify");

#[derive(Debug, Clone, StructOpt)]
struct SegmentizeArgs {
    /// Maximum length of a segment
    #[structopt(long)]
    max_length: f64,

    #[structopt(flatten)]
    active: ActiveArgs,
}

impl SegmentizeArgs {
    fn validate(&self) -> Result<()> {
        if !(self.max_length > 0.0) {
            return Err(GdalVecError::BadArgument(format!(
                "segmentize: max length must be strictly positive, got {}",
                self.max_length
            )));
        }
        Ok(())
    }

    fn algorithm(&self) -> SegmentizeGeometry {
        SegmentizeGeometry(self.max_length)
    }
}

struct SegmentizeGeometry(f64);

impl GeomOneToOneAlgorithm for SegmentizeGeometry {
    fn process(&self, geometry: Geometry) -> Result<Geometry> {
        geometry.segmentize(self.0)
    }

    fn changes_extent(&self) -> bool {
        false
    }
}

/// `segmentize`: densify lines and rings.
#[derive(Debug, Default)]
pub struct SegmentizeStep {
    args: Option<SegmentizeArgs>,
}

one_to_one_step!(SegmentizeStep, SegmentizeArgs, "segmentize");

#[derive(Debug, Clone, Default, StructOpt)]
struct ActiveOnlyArgs {
    #[structopt(flatten)]
    active: ActiveArgs,
}

impl ActiveOnlyArgs {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

struct SwapXy;

impl GeomOneToOneAlgorithm for SwapXy {
    fn process(&self, geometry: Geometry) -> Result<Geometry> {
        Ok(geometry.swap_xy())
    }
}

/// `swap-xy`: exchange the X and Y coordinates.
#[derive(Debug, Default)]
pub struct SwapXyStep {
    args: Option<ActiveOnlyArgs>,
}

impl StepAlgorithm for SwapXyStep {
    fn name(&self) -> &'static str {
        "swap-xy"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        self.args = Some(parse_step_args(self.name(), args)?);
        Ok(())
    }

    fn run_step(&mut self, input: Option<Dataset>, _progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let input = required_input(input, self.name())?;
        run_one_to_one(input, &args.active, || SwapXy)
    }
}

struct MakeValid;

impl GeomOneToOneAlgorithm for MakeValid {
    fn process(&self, geometry: Geometry) -> Result<Geometry> {
        if geometry.is_valid() {
            return Ok(geometry);
        }
        geometry.make_valid()
    }

    fn update_geom_field(&self, field: &mut GeomFieldDefn) {
        // fixing a polygon may split it
        if field.geometry_type() == GeometryType::Polygon {
            field.set_geometry_type(GeometryType::Unknown);
        }
    }
}

/// `make-valid`: repair invalid geometries.
#[derive(Debug, Default)]
pub struct MakeValidStep {
    args: Option<ActiveOnlyArgs>,
}

impl StepAlgorithm for MakeValidStep {
    fn name(&self) -> &'static str {
        "make-valid"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        self.args = Some(parse_step_args(self.name(), args)?);
        Ok(())
    }

    fn run_step(&mut self, input: Option<Dataset>, _progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let input = required_input(input, self.name())?;
        run_one_to_one(input, &args.active, || MakeValid)
    }
}

#[derive(Debug, Clone, StructOpt)]
struct SetGeomTypeArgs {
    /// Target geometry type, e.g. MultiPolygon
    #[structopt(long)]
    geometry_type: Option<String>,

    /// Promote single geometries to their multi type
    #[structopt(long)]
    multi: bool,

    /// Demote one-part collections to their single type
    #[structopt(long)]
    single: bool,

    /// Drop features whose geometry cannot be converted
    #[structopt(long)]
    skip: bool,

    #[structopt(flatten)]
    active: ActiveArgs,
}

#[derive(Debug, Clone, Copy)]
enum TypeChange {
    To(GeometryType),
    Multi,
    Single,
}

impl SetGeomTypeArgs {
    fn change(&self) -> Result<TypeChange> {
        match (&self.geometry_type, self.multi, self.single) {
            (Some(name), false, false) => GeometryType::from_name(name)
                .map(TypeChange::To)
                .ok_or_else(|| {
                    GdalVecError::BadArgument(format!("set-geom-type: unknown geometry type '{name}'"))
                }),
            (None, true, false) => Ok(TypeChange::Multi),
            (None, false, true) => Ok(TypeChange::Single),
            _ => Err(GdalVecError::BadArgument(
                "set-geom-type: exactly one of --geometry-type, --multi or --single is required"
                    .to_string(),
            )),
        }
    }

    fn validate(&self) -> Result<()> {
        self.change().map(|_| ())
    }

    fn algorithm(&self) -> SetGeomType {
        SetGeomType {
            change: self.change().unwrap_or(TypeChange::To(GeometryType::Unknown)),
            skip: self.skip,
        }
    }
}

struct SetGeomType {
    change: TypeChange,
    skip: bool,
}

impl GeomOneToOneAlgorithm for SetGeomType {
    fn process(&self, geometry: Geometry) -> Result<Geometry> {
        Ok(geometry)
    }

    fn target_type(&self, input: GeometryType) -> Option<GeometryType> {
        match self.change {
            TypeChange::To(ty) if ty == GeometryType::Unknown => None,
            TypeChange::To(ty) => Some(ty),
            TypeChange::Multi => Some(input.to_multi()),
            TypeChange::Single => Some(input.to_single()),
        }
    }

    fn skip_on_mismatch(&self) -> bool {
        self.skip
    }

    fn changes_extent(&self) -> bool {
        false
    }

    fn update_geom_field(&self, field: &mut GeomFieldDefn) {
        let ty = match self.change {
            TypeChange::To(ty) => ty,
            TypeChange::Multi => field.geometry_type().to_multi(),
            TypeChange::Single => field.geometry_type().to_single(),
        };
        field.set_geometry_type(ty);
    }
}

/// `set-geom-type`: coerce geometries to another type.
#[derive(Debug, Default)]
pub struct SetGeomTypeStep {
    args: Option<SetGeomTypeArgs>,
}

one_to_one_step!(SetGeomTypeStep, SetGeomTypeArgs, "set-geom-type");

#[derive(Debug, Clone, StructOpt)]
struct ReprojectArgs {
    /// Target CRS, e.g. EPSG:3857
    #[structopt(long)]
    dst_crs: String,

    /// CRS assumed for geometries without one
    #[structopt(long)]
    src_crs: Option<String>,

    #[structopt(flatten)]
    active: ActiveArgs,
}

impl ReprojectArgs {
    fn validate(&self) -> Result<()> {
        SpatialRef::from_definition(&self.dst_crs)?;
        if let Some(src) = &self.src_crs {
            SpatialRef::from_definition(src)?;
        }
        Ok(())
    }
}

struct Reproject {
    src: Option<SpatialRef>,
    dst: SpatialRef,
}

impl GeomOneToOneAlgorithm for Reproject {
    fn process(&self, mut geometry: Geometry) -> Result<Geometry> {
        if geometry.spatial_ref().is_none() {
            geometry.set_spatial_ref(self.src.clone());
        }
        geometry.transform_to(&self.dst)
    }

    fn update_geom_field(&self, field: &mut GeomFieldDefn) {
        field.set_spatial_ref(Some(self.dst.clone()));
    }
}

/// `reproject`: transform geometries to another coordinate system.
#[derive(Debug, Default)]
pub struct ReprojectStep {
    args: Option<ReprojectArgs>,
}

impl StepAlgorithm for ReprojectStep {
    fn name(&self) -> &'static str {
        "reproject"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        let args: ReprojectArgs = parse_step_args(self.name(), args)?;
        args.validate()?;
        self.args = Some(args);
        Ok(())
    }

    fn run_step(&mut self, input: Option<Dataset>, _progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let input = required_input(input, self.name())?;
        let dst = SpatialRef::from_definition(&args.dst_crs)?;
        let src = args
            .src_crs
            .as_deref()
            .map(SpatialRef::from_definition)
            .transpose()?;
        run_one_to_one(input, &args.active, || Reproject {
            src: src.clone(),
            dst: dst.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::vector::step::PipelineStep;
    use crate::test_utils::{collect_wkt, wkt_dataset};
    use crate::vector::Layer;

    fn run(step: &mut PipelineStep, args: &[&str], input: Dataset) -> Result<Dataset> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        step.parse_args(&args)?;
        step.set_input(input);
        step.run_step(&mut Progress::none())?;
        step.take_output()
            .ok_or_else(|| GdalVecError::BadArgument("no output".into()))
    }

    #[test]
    fn test_buffer_negative_distance_parses() -> Result<()> {
        let input = wkt_dataset("poly", GeometryType::Polygon, &["POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0))"]);
        let mut step = PipelineStep::new(Box::<BufferStep>::default());
        let mut output = run(&mut step, &["--distance", "-1"], input)?;
        let layer = output.layer(0)?;
        let f = layer.next_feature()?.unwrap();
        assert!((f.geometry().unwrap().area() - 64.0).abs() < 0.5);
        assert_eq!(layer.defn().geometry_type(), GeometryType::Polygon);
        Ok(())
    }

    #[test]
    fn test_set_geom_type() -> Result<()> {
        let input = wkt_dataset("pts", GeometryType::Point, &["POINT (1 2)"]);
        let mut step = PipelineStep::new(Box::<SetGeomTypeStep>::default());
        let mut output = run(&mut step, &["--multi"], input)?;
        let layer = output.layer(0)?;
        assert_eq!(layer.defn().geometry_type(), GeometryType::MultiPoint);
        assert_eq!(
            layer.next_feature()?.unwrap().geometry(),
            Some(&Geometry::from_wkt("MULTIPOINT ((1 2))")?)
        );

        let mut step = PipelineStep::new(Box::<SetGeomTypeStep>::default());
        assert!(step.parse_args(&["--multi".into(), "--single".into()]).is_err());
        assert!(step.parse_args(&[]).is_err());
        assert!(step.parse_args(&["--geometry-type".into(), "Blob".into()]).is_err());
        Ok(())
    }

    #[test]
    fn test_set_geom_type_skip() -> Result<()> {
        let input = wkt_dataset(
            "pts",
            GeometryType::Unknown,
            &["POINT (1 2)", "LINESTRING (0 0, 1 1)"],
        );
        let mut step = PipelineStep::new(Box::<SetGeomTypeStep>::default());
        let mut output = run(&mut step, &["--geometry-type", "Point", "--skip"], input)?;
        let rows = collect_wkt(output.layer(0)?);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, Some(0));
        Ok(())
    }

    #[test]
    fn test_reproject() -> Result<()> {
        let input = wkt_dataset("pts", GeometryType::Point, &["POINT (0 0)"]);
        let mut step = PipelineStep::new(Box::<ReprojectStep>::default());
        let mut output = run(
            &mut step,
            &["--dst-crs", "EPSG:3857", "--src-crs", "EPSG:4326"],
            input,
        )?;
        let layer = output.layer(0)?;
        assert_eq!(
            layer.defn().geom_field(0).unwrap().spatial_ref().unwrap().auth_code()?,
            3857
        );
        let f = layer.next_feature()?.unwrap();
        let g = f.geometry().unwrap();
        assert_eq!(g.spatial_ref().unwrap().auth_code()?, 3857);
        let env = g.envelope().unwrap();
        assert!(env.min_x.abs() < 1e-6 && env.min_y.abs() < 1e-6);

        let mut step = PipelineStep::new(Box::<ReprojectStep>::default());
        assert!(step.parse_args(&["--dst-crs".into(), "EPSG:abc".into()]).is_err());
        Ok(())
    }
}
