use std::path::PathBuf;

use crate::sensors::sentinel2::Band;

pub type Result<T> = std::result::Result<T, CompositeError>;

#[derive(thiserror::Error, Debug)]
pub enum CompositeError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    NdarrayError(#[from] ndarray::ShapeError),
    #[error(transparent)]
    TiffError(#[from] tiff::TiffError),
    #[cfg(feature = "gdal")]
    #[error(transparent)]
    GdalError(#[from] gdal::errors::GdalError),

    #[error("Rasters must share one CRS: expected {expected}, found {found}")]
    CrsMismatch { expected: String, found: String },
    #[error("Rasters must be on the same pixel grid to merge without resampling")]
    UnalignedGrid,
    #[error("Rasters are not aligned: {0}")]
    Alignment(String),
    #[error("Invalid bounds ({left}, {bottom}, {right}, {top})")]
    InvalidBounds {
        left: f64,
        bottom: f64,
        right: f64,
        top: f64,
    },
    #[error("Calculating aggregates for multi-band rasters is not supported ({bands} bands)")]
    MultiBandAggregate { bands: usize },
    #[error("Cannot calculate standard deviation without mean")]
    MissingMean,
    #[error("Datatake already processed: {datatake}. Pass in sorted order.")]
    InputOrder { datatake: String },
    #[error("Mask does not match raster: {0}")]
    GeometryMismatch(String),

    #[error("Expected {expected} bands, found {found}")]
    BandCountMismatch { expected: usize, found: usize },
    #[error("Pixel array shape {pixels:?} does not match mask shape {mask:?}")]
    ShapeMismatch { pixels: Vec<usize>, mask: Vec<usize> },
    #[error("Raster has no CRS")]
    MissingCrs,
    #[error("Nothing to merge")]
    EmptySources,
    #[error("Band not needed to calculate NDVI: {0}")]
    UnsupportedBand(String),
    #[error("Datatake has no {0:?} raster")]
    MissingBand(Band),
    #[error("Don't mix datatakes when building NDVI rasters: {found} != {expected}")]
    MixedDatatakes { expected: String, found: String },
    #[error("Not a Sentinel-2 product name: {0}")]
    InvalidProductName(String),
    #[error("File {path:?} is missing GeoTIFF tag {tag}")]
    MissingTag { path: PathBuf, tag: &'static str },
    #[error("Unsupported pixel format in {0:?}")]
    UnsupportedPixelFormat(PathBuf),
    #[error("Worker stopped without returning a result")]
    WorkerDisconnected,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
