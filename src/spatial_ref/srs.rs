use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::errors::{GdalVecError, Result};

const WGS84_WKT: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]]";
const WEB_MERCATOR_WKT: &str = "PROJCS[\"WGS 84 / Pseudo-Mercator\",GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563]],PRIMEM[\"Greenwich\",0],UNIT[\"degree\",0.0174532925199433]],PROJECTION[\"Mercator_1SP\"],PARAMETER[\"central_meridian\",0],PARAMETER[\"scale_factor\",1],PARAMETER[\"false_easting\",0],PARAMETER[\"false_northing\",0],UNIT[\"metre\",1],AUTHORITY[\"EPSG\",\"3857\"]]";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum SrsDef {
    Epsg(u32),
    /// An opaque definition this crate cannot interpret, kept verbatim.
    Other(String),
}

/// A coordinate reference system.
///
/// Two references compare equal when they resolve to the same EPSG code, or
/// when their uninterpreted definitions are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialRef {
    def: SrsDef,
}

impl SpatialRef {
    pub fn from_epsg(epsg_code: u32) -> Result<SpatialRef> {
        if epsg_code == 0 {
            return Err(GdalVecError::UnknownSpatialRef(format!("EPSG:{epsg_code}")));
        }
        Ok(SpatialRef {
            def: SrsDef::Epsg(epsg_code),
        })
    }

    /// Parse a user supplied definition.
    ///
    /// Accepts `EPSG:n`, the well known aliases `WGS84` and `CRS84`, and WKT
    /// carrying a top level `AUTHORITY["EPSG", n]`. Other non-empty strings are
    /// accepted as opaque definitions.
    pub fn from_definition(definition: &str) -> Result<SpatialRef> {
        let definition = definition.trim();
        if definition.is_empty() {
            return Err(GdalVecError::UnknownSpatialRef(definition.to_string()));
        }
        let upper = definition.to_ascii_uppercase();
        if let Some(code) = upper.strip_prefix("EPSG:") {
            return code
                .trim()
                .parse::<u32>()
                .map_err(|_| GdalVecError::UnknownSpatialRef(definition.to_string()))
                .and_then(Self::from_epsg);
        }
        match upper.as_str() {
            "WGS84" | "CRS84" | "OGC:CRS84" | "URN:OGC:DEF:CRS:OGC:1.3:CRS84" => {
                return Self::from_epsg(4326)
            }
            "+PROJ=LONGLAT +DATUM=WGS84 +NO_DEFS" => return Self::from_epsg(4326),
            _ => {}
        }
        if let Some(code) = upper
            .strip_prefix("URN:OGC:DEF:CRS:EPSG::")
            .and_then(|c| c.parse::<u32>().ok())
        {
            return Self::from_epsg(code);
        }
        if let Some(code) = wkt_authority_code(&upper) {
            return Self::from_epsg(code);
        }
        Ok(SpatialRef {
            def: SrsDef::Other(definition.to_string()),
        })
    }

    pub fn auth_name(&self) -> Result<String> {
        match self.def {
            SrsDef::Epsg(_) => Ok("EPSG".to_string()),
            SrsDef::Other(ref d) => Err(GdalVecError::UnknownSpatialRef(d.clone())),
        }
    }

    pub fn auth_code(&self) -> Result<u32> {
        match self.def {
            SrsDef::Epsg(code) => Ok(code),
            SrsDef::Other(ref d) => Err(GdalVecError::UnknownSpatialRef(d.clone())),
        }
    }

    /// `AUTHORITY:CODE`, e.g. `EPSG:4326`.
    pub fn authority(&self) -> Result<String> {
        Ok(format!("{}:{}", self.auth_name()?, self.auth_code()?))
    }

    pub fn to_wkt(&self) -> Result<String> {
        match self.def {
            SrsDef::Epsg(4326) => Ok(WGS84_WKT.to_string()),
            SrsDef::Epsg(3857) => Ok(WEB_MERCATOR_WKT.to_string()),
            SrsDef::Epsg(code) => Err(GdalVecError::UnknownSpatialRef(format!("EPSG:{code}"))),
            SrsDef::Other(ref d) if d.starts_with("GEOGCS[") || d.starts_with("PROJCS[") => {
                Ok(d.clone())
            }
            SrsDef::Other(ref d) => Err(GdalVecError::UnknownSpatialRef(d.clone())),
        }
    }

    pub fn is_geographic(&self) -> bool {
        match self.def {
            SrsDef::Epsg(code) => code == 4326,
            SrsDef::Other(ref d) => d.starts_with("GEOGCS["),
        }
    }

    pub(crate) fn epsg(&self) -> Option<u32> {
        match self.def {
            SrsDef::Epsg(code) => Some(code),
            SrsDef::Other(_) => None,
        }
    }
}

impl Display for SpatialRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.def {
            SrsDef::Epsg(code) => write!(f, "EPSG:{code}"),
            SrsDef::Other(ref d) => f.write_str(d),
        }
    }
}

/// The code of the last `AUTHORITY["EPSG","n"]` node, which in WKT1 is the root's.
fn wkt_authority_code(upper_wkt: &str) -> Option<u32> {
    if !(upper_wkt.starts_with("GEOGCS[") || upper_wkt.starts_with("PROJCS[")) {
        return None;
    }
    let pos = upper_wkt.rfind("AUTHORITY[")?;
    let rest = &upper_wkt[pos + "AUTHORITY[".len()..];
    let end = rest.find(']')?;
    let mut parts = rest[..end].split(',');
    let name = parts.next()?.trim().trim_matches('"');
    let code = parts.next()?.trim().trim_matches('"');
    if name != "EPSG" {
        return None;
    }
    code.parse().ok()
}
