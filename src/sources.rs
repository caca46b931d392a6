//! Collaborators that find and fetch source rasters, and supply crop
//! geometries. Searching, downloading and reprojection live behind these
//! traits.

use std::path::PathBuf;

use crate::{
    components::geometry::CrsGeometry,
    errors::Result,
    sensors::sentinel2::{Band, Resolution},
};

/// What to search for: a calendar month of band rasters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery<'a> {
    pub year: i32,
    pub month: u32,
    pub bands: &'a [(Band, Resolution)],
}

/// Finds source raster keys, and fetches them to local files.
pub trait SourceResolver: Sync {
    /// Keys of every band raster, and its detector footprint masks, over the
    /// caller's geometries. Keys must contain the product's `.SAFE` name.
    fn find_raster_keys(&self, query: &SourceQuery) -> Result<Vec<String>>;

    /// Local path of `key`, downloading it if needed. The path must keep
    /// the product's `.SAFE` component.
    fn fetch(&self, key: &str) -> Result<PathBuf>;
}

/// Supplies crop geometries already in a zone's CRS.
pub trait GeometryProvider: Sync {
    /// The caller's geometries within the area of use of `crs`, projected to
    /// `crs`.
    fn geometries_in(&self, crs: &str) -> Result<CrsGeometry>;
}
