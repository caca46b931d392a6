use std::{fmt::Debug, path::Path};

use crate::{
    components::raster::{Raster, RasterHeader},
    errors::Result,
};

/// Reads and writes rasters on disk.
///
/// Implementations must round-trip the transform and CRS exactly, and
/// persist masked pixels as no data.
pub trait RasterCodec: Send + Sync + Debug {
    /// Shape, transform and CRS, without decoding pixels.
    fn read_header(&self, path: &Path) -> Result<RasterHeader>;
    fn read(&self, path: &Path) -> Result<Raster>;
    fn write(&self, raster: &Raster, path: &Path) -> Result<()>;
}
