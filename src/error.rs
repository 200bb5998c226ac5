//! Error types for the landsat-dem library.

use thiserror::Error;

/// Errors raised by the geometry, projection, QA and metadata layers.
///
/// Raster file I/O and staging return `anyhow::Result` instead, so these
/// variants convert into `anyhow::Error` wherever the two meet.
#[derive(Error, Debug)]
pub enum DemError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    /// The affine transform has a zero determinant and cannot be inverted.
    #[error("Geotransform is not invertible: {0:?}")]
    SingularGeoTransform([f64; 6]),

    #[error("Invalid bounding box: lon {lon_min}..{lon_max}, lat {lat_min}..{lat_max}")]
    InvalidBoundingBox {
        lon_min: f64,
        lon_max: f64,
        lat_min: f64,
        lat_max: f64,
    },

    /// The CRS carries no EPSG authority record, so it cannot be handed to a warper.
    #[error("CRS has no EPSG authority code: {0}")]
    MissingEpsg(String),

    #[error("Invalid bit range: high={high}, low={low}")]
    InvalidBitRange { high: u32, low: u32 },

    #[error("Block shape mismatch: expected {expected:?}, got {actual:?}")]
    BlockShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Unsupported Landsat sensor: spacecraft={spacecraft}, sensor={sensor}")]
    UnsupportedSensor { spacecraft: String, sensor: String },

    #[error("Metadata key not found: {0}")]
    MissingMetadata(String),

    #[error("Malformed metadata at line {line}: {content}")]
    MalformedMetadata { line: usize, content: String },

    /// File size doesn't match an SRTM1 or SRTM3 tile.
    #[error("Invalid SRTM tile size: {size} bytes (expected 25934402 for SRTM1 or 2884802 for SRTM3)")]
    InvalidTileSize { size: usize },
}

/// Result type alias using [`DemError`].
pub type Result<T> = std::result::Result<T, DemError>;
