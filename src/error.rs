use thiserror::Error;

/// Errors raised by extraction and footprint computation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("footprint is empty: {0}")]
    EmptyFootprint(String),

    #[error("reprojection failed for {} coordinate(s) {coords:?}: {reason}", coords.len())]
    Reprojection {
        coords: Vec<(f64, f64)>,
        reason: String,
    },

    #[error("simplification error: {0}")]
    Simplification(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("cancelled before processing {0}")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Metadata(format!("XML parse error: {}", e))
    }
}
