use thiserror::Error;

use crate::vector::{FieldType, GeometryType};

pub type Result<T> = std::result::Result<T, GdalVecError>;

#[derive(Debug, Error)]
pub enum GdalVecError {
    #[error("CPL error class: '{class:?}', error number: '{number:?}', error msg: '{msg}'")]
    CplError {
        class: CplErrType,
        number: CplErrorNum,
        msg: String,
    },
    #[error("BadArgument error: '{0}'")]
    BadArgument(String),
    #[error("Unknown step '{0}'")]
    UnknownStep(String),
    #[error("Invalid step chain: {0}")]
    InvalidStepChain(String),
    #[error("Invalid field name '{field_name}' used on method {method_name}")]
    InvalidFieldName {
        field_name: String,
        method_name: &'static str,
    },
    #[error("Invalid field index {index} used on method {method_name}")]
    InvalidFieldIndex {
        index: usize,
        method_name: &'static str,
    },
    #[error("Geometry field '{field_name}' does not exist in layer '{layer_name}'")]
    GeometryFieldNotFound {
        field_name: String,
        layer_name: String,
    },
    #[error("Unhandled type '{field_type:?}' on method {method_name}")]
    UnhandledFieldType {
        field_type: FieldType,
        method_name: &'static str,
    },
    #[error("Unsupported geometry type '{0:?}'")]
    UnsupportedGeometryType(GeometryType),
    #[error("Invalid geometry for feature {fid:?}: {msg}")]
    InvalidGeometry { fid: Option<i64>, msg: String },
    #[error("Geometry engine method '{method_name}' failed: {msg}")]
    GeometryEngine {
        method_name: &'static str,
        msg: String,
    },
    #[error("Invalid coordinate range while transforming points from {from} to {to}: {msg:?}")]
    InvalidCoordinateRange {
        from: String,
        to: String,
        msg: Option<String>,
    },
    #[error("Unknown spatial reference definition '{0}'")]
    UnknownSpatialRef(String),
    #[error("No driver found for '{0}'")]
    DriverNotFound(String),
    #[error("Driver '{driver}' does not support {capability}")]
    DriverCapability {
        driver: &'static str,
        capability: &'static str,
    },
    #[error("Cannot open '{path}': {msg}")]
    OpenFailed { path: String, msg: String },
    #[error("Output '{0}' already exists; use overwrite to replace it")]
    OutputExists(String),
    #[error("Layer '{0}' not found")]
    LayerNotFound(String),
    #[error("ISO 8211 error: {0}")]
    Iso8211(String),
    #[error("S-57 error: {0}")]
    S57(String),
    #[error("WKT error: {0}")]
    Wkt(String),
    #[error("Date conversion error: {0}")]
    DateError(String),
    #[error("Interrupted by user")]
    UserInterrupt,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    GeoJson(#[from] geojson::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Broad grouping of failures, used by callers deciding how loudly to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad arguments or a malformed step chain. Always raised before any I/O.
    Configuration,
    /// Missing or incompatible field or geometry field.
    Schema,
    /// Invalid geometry, engine failure, unreadable record.
    Data,
    Io,
    UserInterrupt,
}

impl GdalVecError {
    pub fn category(&self) -> ErrorCategory {
        use GdalVecError::*;
        match self {
            BadArgument(_) | UnknownStep(_) | InvalidStepChain(_) | UnknownSpatialRef(_)
            | OutputExists(_) => ErrorCategory::Configuration,
            InvalidFieldName { .. }
            | InvalidFieldIndex { .. }
            | GeometryFieldNotFound { .. }
            | UnhandledFieldType { .. }
            | LayerNotFound(_) => ErrorCategory::Schema,
            DriverNotFound(_) | DriverCapability { .. } | OpenFailed { .. } | Io(_) | Csv(_) => {
                ErrorCategory::Io
            }
            UserInterrupt => ErrorCategory::UserInterrupt,
            CplError { number, .. } => match number {
                CplErrorNum::UserInterrupt => ErrorCategory::UserInterrupt,
                CplErrorNum::IllegalArg => ErrorCategory::Configuration,
                CplErrorNum::FileIO | CplErrorNum::OpenFailed | CplErrorNum::NoWriteAccess => {
                    ErrorCategory::Io
                }
                _ => ErrorCategory::Data,
            },
            _ => ErrorCategory::Data,
        }
    }

    /// The error number reported on the last-error channel for this error.
    pub fn error_num(&self) -> CplErrorNum {
        use GdalVecError::*;
        match self {
            CplError { number, .. } => *number,
            BadArgument(_) | UnknownStep(_) | InvalidStepChain(_) | UnknownSpatialRef(_) => {
                CplErrorNum::IllegalArg
            }
            InvalidFieldName { .. } | InvalidFieldIndex { .. } | GeometryFieldNotFound { .. } => {
                CplErrorNum::IllegalArg
            }
            UnhandledFieldType { .. } | UnsupportedGeometryType(_) | DriverCapability { .. } => {
                CplErrorNum::NotSupported
            }
            OpenFailed { .. } | DriverNotFound(_) | LayerNotFound(_) => CplErrorNum::OpenFailed,
            OutputExists(_) => CplErrorNum::NoWriteAccess,
            Io(_) | Csv(_) => CplErrorNum::FileIO,
            UserInterrupt => CplErrorNum::UserInterrupt,
            _ => CplErrorNum::AppDefined,
        }
    }

    pub fn is_user_interrupt(&self) -> bool {
        self.category() == ErrorCategory::UserInterrupt
    }
}

/// Severity of an error reported on the error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(C)]
pub enum CplErrType {
    None = 0,
    Debug = 1,
    Warning = 2,
    Failure = 3,
    Fatal = 4,
}

/// Error number attached to a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub enum CplErrorNum {
    None = 0,
    AppDefined = 1,
    OutOfMemory = 2,
    FileIO = 3,
    OpenFailed = 4,
    IllegalArg = 5,
    NotSupported = 6,
    AssertionFailed = 7,
    NoWriteAccess = 8,
    UserInterrupt = 9,
    ObjectNull = 10,
}
