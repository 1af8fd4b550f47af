use crate::config::{error_reset, last_error};
use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::{PipelineState, VectorPipeline};
use crate::test_utils::{collect_wkt, SuppressErrorLog, TempFixture};
use crate::vector::ops::GeometryContext;
use crate::vector::{Dataset, GeometryType, Layer};

/// A GeoJSON file with one feature per geometry, each with a `name`
/// property `g<i>` and an integer `n` property `i`.
fn geojson_fixture(name: &str, geometries: &[&str]) -> TempFixture {
    let features: Vec<String> = geometries
        .iter()
        .enumerate()
        .map(|(i, geometry)| {
            format!(
                r#"{{"type":"Feature","properties":{{"name":"g{i}","n":{i}}},"geometry":{geometry}}}"#
            )
        })
        .collect();
    let text = format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    );
    TempFixture::with_contents(name, text.as_bytes())
}

fn point(x: f64, y: f64) -> String {
    format!(r#"{{"type":"Point","coordinates":[{x},{y}]}}"#)
}

fn square(x: f64, y: f64, size: f64) -> String {
    format!(
        r#"{{"type":"Polygon","coordinates":[[[{x},{y}],[{x1},{y}],[{x1},{y1}],[{x},{y1}],[{x},{y}]]]}}"#,
        x1 = x + size,
        y1 = y + size
    )
}

/// Run `read <input> ! <steps> ! write out --of MEM` and return the output.
fn run_in_memory(input: &TempFixture, steps: &str) -> Result<Dataset> {
    let chain = if steps.is_empty() {
        format!("read '{}' ! write out --of MEM", input.path().display())
    } else {
        format!("read '{}' ! {steps} ! write out --of MEM", input.path().display())
    };
    let mut pipeline = VectorPipeline::new();
    pipeline.parse(&chain)?;
    assert_eq!(pipeline.state(), PipelineState::Parsed);
    pipeline.run(&mut Progress::none())?;
    assert_eq!(pipeline.state(), PipelineState::Done);
    pipeline
        .take_output()
        .ok_or_else(|| GdalVecError::BadArgument("pipeline has no output".to_string()))
}

fn types_and_fids(layer: &mut dyn Layer) -> Result<Vec<(Option<i64>, Option<GeometryType>)>> {
    layer.reset_reading();
    let mut out = Vec::new();
    while let Some(feature) = layer.next_feature()? {
        out.push((feature.fid(), feature.geometry().map(|g| g.geometry_type())));
    }
    Ok(out)
}

#[test]
fn test_explode_multipoint() -> Result<()> {
    let input = geojson_fixture(
        "multipoint.geojson",
        &[r#"{"type":"MultiPoint","coordinates":[[0,0],[1,1],[2,2]]}"#],
    );
    let mut output = run_in_memory(&input, "explode-collections")?;
    let layer = output.layer(0)?;
    assert_eq!(layer.defn().geometry_type(), GeometryType::Point);
    assert_eq!(
        types_and_fids(layer)?,
        vec![
            (Some(1), Some(GeometryType::Point)),
            (Some(2), Some(GeometryType::Point)),
            (Some(3), Some(GeometryType::Point)),
        ]
    );
    Ok(())
}

#[test]
fn test_explode_cardinality_and_idempotence() -> Result<()> {
    let input = geojson_fixture(
        "nested.geojson",
        &[
            r#"{"type":"GeometryCollection","geometries":[{"type":"MultiPoint","coordinates":[[0,0],[1,1]]},{"type":"LineString","coordinates":[[0,0],[1,1]]}]}"#,
            &point(5.0, 5.0),
        ],
    );
    let mut once = run_in_memory(&input, "explode-collections")?;
    let once = collect_wkt(once.layer(0)?);
    assert_eq!(once.len(), 4);
    assert_eq!(
        once.iter().map(|(fid, _)| *fid).collect::<Vec<_>>(),
        vec![Some(1), Some(2), Some(3), Some(4)]
    );

    let mut twice = run_in_memory(&input, "explode-collections ! explode-collections")?;
    assert_eq!(collect_wkt(twice.layer(0)?), once);
    Ok(())
}

#[test]
fn test_explode_empty_collection() -> Result<()> {
    let input = geojson_fixture(
        "empty.geojson",
        &[
            r#"{"type":"MultiPoint","coordinates":[]}"#,
            r#"{"type":"MultiPoint","coordinates":[[0,0],[1,1]]}"#,
        ],
    );
    let mut output = run_in_memory(&input, "explode-collections --geometry-type POINT")?;
    let layer = output.layer(0)?;
    assert_eq!(
        types_and_fids(layer)?,
        vec![
            (Some(1), Some(GeometryType::Point)),
            (Some(2), Some(GeometryType::Point)),
        ]
    );
    Ok(())
}

#[test]
fn test_buffer_collapse_skip() -> Result<()> {
    let input = geojson_fixture(
        "squares.geojson",
        &[&square(0.0, 0.0, 2.0), &square(10.0, 0.0, 10.0)],
    );

    let mut kept = run_in_memory(&input, "buffer --distance -2")?;
    let layer = kept.layer(0)?;
    assert_eq!(layer.defn().geometry_type(), GeometryType::Polygon);
    let mut empties = Vec::new();
    while let Some(feature) = layer.next_feature()? {
        empties.push(feature.geometry().map(|g| g.is_empty()));
    }
    assert_eq!(empties, vec![Some(true), Some(false)]);

    let mut skipped = run_in_memory(&input, "buffer --distance -2 --skip")?;
    let layer = skipped.layer(0)?;
    let feature = layer.next_feature()?.unwrap();
    assert_eq!(feature.fid(), Some(1));
    let area = feature.geometry().unwrap().area();
    assert!((area - 36.0).abs() < 1e-6, "{area}");
    assert!(layer.next_feature()?.is_none());
    Ok(())
}

#[test]
fn test_read_not_first() {
    let mut pipeline = VectorPipeline::new();
    let err = pipeline
        .parse("reproject --dst-crs EPSG:4326 ! read in.geojson ! write out.geojson")
        .unwrap_err();
    assert!(matches!(err, GdalVecError::InvalidStepChain(_)));
    assert_eq!(pipeline.state(), PipelineState::Unparsed);
    assert!(pipeline.step_names().is_empty());
    assert!(pipeline.run(&mut Progress::none()).is_err());
}

#[test]
fn test_schema_idempotence() -> Result<()> {
    let input = geojson_fixture("pts.geojson", &[&point(0.0, 0.0), &point(1.0, 1.0)]);
    let mut once = run_in_memory(&input, "select name")?;
    let mut twice = run_in_memory(&input, "select name ! select name")?;
    let once = once.layer(0)?;
    let twice = twice.layer(0)?;
    assert_eq!(once.defn(), once.defn());
    let names = |layer: &dyn Layer| -> Vec<String> {
        layer.defn().fields().map(|f| f.name().to_string()).collect()
    };
    assert_eq!(names(once), vec!["name"]);
    assert_eq!(names(once), names(twice));
    assert_eq!(once.defn().geometry_type(), twice.defn().geometry_type());
    Ok(())
}

#[test]
fn test_streaming_matches_batch() -> Result<()> {
    let input = geojson_fixture(
        "scatter.geojson",
        &[
            &point(9.0, 1.0),
            &point(0.0, 0.0),
            &point(4.0, 7.0),
            &point(2.0, 2.0),
            &point(8.0, 8.0),
        ],
    );
    let mut streamed = run_in_memory(&input, "swap-xy")?;
    let streamed = collect_wkt(streamed.layer(0)?);

    for storage in ["memory", "temp-file"] {
        let mut batched = run_in_memory(&input, &format!("sort --storage {storage} ! swap-xy"))?;
        let mut batched = collect_wkt(batched.layer(0)?);
        batched.sort_by_key(|(fid, _)| *fid);
        assert_eq!(batched, streamed, "{storage}");
    }
    Ok(())
}

#[test]
fn test_batch_output_rereads() -> Result<()> {
    let input = geojson_fixture(
        "grid.geojson",
        &[&square(0.0, 0.0, 1.0), &square(1.0, 0.0, 1.0), &square(0.0, 1.0, 1.0)],
    );
    let mut pipeline = VectorPipeline::new();
    pipeline.parse(&format!(
        "read '{}' ! clean-coverage ! write out --of MEM",
        input.path().display()
    ))?;
    pipeline.run(&mut Progress::none())?;
    let layer = pipeline.output_dataset_mut().unwrap().layer(0)?;
    let first = collect_wkt(layer);
    assert_eq!(first.len(), 3);
    assert_eq!(collect_wkt(layer), first);
    Ok(())
}

#[test]
fn test_cancellation() -> Result<()> {
    let input = geojson_fixture(
        "three.geojson",
        &[&point(0.0, 0.0), &point(1.0, 1.0), &point(2.0, 2.0)],
    );
    let chain = format!("read '{}' ! write out --of MEM", input.path().display());

    // the read step reports once, the write step once per feature
    let _quiet = SuppressErrorLog::new();
    let mut calls = 0;
    let mut cancel_third = |_: f64, _: &str| {
        calls += 1;
        calls < 3
    };
    let mut pipeline = VectorPipeline::new();
    pipeline.parse(&chain)?;
    let err = pipeline.run(&mut Progress::new(&mut cancel_third)).unwrap_err();
    assert!(err.is_user_interrupt());
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(pipeline.output_dataset().is_none());
    assert_eq!(calls, 3);

    let mut fractions = Vec::new();
    let mut record = |fraction: f64, _: &str| {
        fractions.push(fraction);
        true
    };
    let mut pipeline = VectorPipeline::new();
    pipeline.parse(&chain)?;
    pipeline.run(&mut Progress::new(&mut record))?;
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(fractions.last().copied(), Some(1.0));
    assert!(pipeline.output_dataset().is_some());
    Ok(())
}

#[test]
fn test_failure_releases_contexts() -> Result<()> {
    let input = geojson_fixture(
        "lines.geojson",
        &[r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#],
    );
    let live = GeometryContext::live_contexts();
    let _quiet = SuppressErrorLog::new();
    error_reset();

    let mut pipeline = VectorPipeline::new();
    pipeline.parse(&format!(
        "read '{}' ! check-coverage ! write out --of MEM",
        input.path().display()
    ))?;
    let err = pipeline.run(&mut Progress::none()).unwrap_err();
    assert!(matches!(err, GdalVecError::InvalidGeometry { fid: Some(0), .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(GeometryContext::live_contexts(), live);
    assert!(last_error().is_some_and(|e| e.msg == err.to_string()));
    Ok(())
}

#[test]
fn test_geojson_round_trip() -> Result<()> {
    let input = geojson_fixture("in.geojson", &[&point(1.0, 2.0)]);
    let output = TempFixture::empty("out.geojson");
    let chain = format!(
        "read '{}' ! buffer --distance 1 ! write '{}'",
        input.path().display(),
        output.path().display()
    );

    let mut pipeline = VectorPipeline::new();
    pipeline.parse(&chain)?;
    pipeline.run(&mut Progress::none())?;
    let written = pipeline.output_dataset_mut().unwrap().layer(0)?;
    assert_eq!(written.defn().geometry_type(), GeometryType::Polygon);
    assert_eq!(written.feature_count(true)?, Some(1));
    assert!(output.path().exists());

    // the file is there now
    let _quiet = SuppressErrorLog::new();
    let mut again = VectorPipeline::new();
    again.parse(&chain)?;
    assert!(matches!(
        again.run(&mut Progress::none()),
        Err(GdalVecError::OutputExists(_))
    ));

    let mut overwrite = VectorPipeline::new();
    overwrite.parse(&format!("{chain} --overwrite"))?;
    overwrite.run(&mut Progress::none())?;
    Ok(())
}

#[test]
fn test_geojson_field_order_kept() -> Result<()> {
    let input = TempFixture::with_contents(
        "ordered.geojson",
        br#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"zone":"a","kind":"road","b":1},
             "geometry":{"type":"Point","coordinates":[1,2]}}]}"#,
    );
    let output = TempFixture::empty("ordered_out.geojson");
    let mut pipeline = VectorPipeline::new();
    pipeline.parse(&format!(
        "read '{}' ! write '{}'",
        input.path().display(),
        output.path().display()
    ))?;
    pipeline.run(&mut Progress::none())?;

    let mut reread = Dataset::open(output.path())?;
    let names: Vec<String> = reread
        .layer(0)?
        .defn()
        .fields()
        .map(|f| f.name().to_string())
        .collect();
    assert_eq!(names, vec!["zone", "kind", "b"]);
    Ok(())
}
