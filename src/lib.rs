//! Merge aligned rasters into statistical composites, and build monthly
//! Sentinel-2 NDVI composites per UTM zone on top of that.

pub mod components;
pub mod config;
pub mod errors;
pub mod merge;
pub mod sensors;
pub mod sources;

pub use components::{Bounds, CrsGeometry, GeoTransform, Raster, RasterCodec, TiffCodec};
pub use config::NdviConfig;
pub use errors::{CompositeError, Result};
pub use merge::{MergeEngine, MergeMethod, MergeOptions, MergeSource, Merged, Statistic};
pub use sensors::sentinel2::{NdviPipeline, NdviRasters, NdviRequest, Sentinel2};
pub use sources::{GeometryProvider, SourceQuery, SourceResolver};
