use crate::cpl::CslStringList;
use crate::spatial_ref::SpatialRef;
use crate::vector::GeometryType;

/// Parameters for [`DatasetWriter::create_layer`](crate::driver::DatasetWriter::create_layer).
#[derive(Clone, Debug)]
pub struct LayerOptions<'a> {
    /// The name of the newly created layer. May be an empty string.
    pub name: &'a str,
    /// The SRS of the newly created layer, or `None` for no SRS.
    pub srs: Option<&'a SpatialRef>,
    /// The type of geometry for the new layer. `GeometryType::None` creates a
    /// layer without a geometry field.
    pub ty: GeometryType,
    /// Name of the geometry field.
    pub geometry_name: &'a str,
    /// Additional driver-specific layer creation options.
    pub options: Option<&'a CslStringList>,
}

const EMPTY_LAYER_NAME: &str = "";

impl Default for LayerOptions<'_> {
    /// Returns creation options for a new layer with no name, no SRS and unknown geometry type.
    fn default() -> Self {
        LayerOptions {
            name: EMPTY_LAYER_NAME,
            srs: None,
            ty: GeometryType::Unknown,
            geometry_name: "geom",
            options: None,
        }
    }
}
