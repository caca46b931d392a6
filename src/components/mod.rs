pub mod alignment;
pub mod backends;
pub mod bounds;
pub mod codec;
pub mod geometry;
pub mod raster;
pub mod transforms;

pub use alignment::{aligned_pixel_grids, aligned_transforms};
pub use backends::tiff_backend::TiffCodec;
#[cfg(feature = "gdal")]
pub use backends::gdal_backend::GdalCodec;
pub use bounds::{align_bounds_to_transform, Bounds};
pub use codec::RasterCodec;
pub use geometry::{mask_to_geometry, CrsGeometry};
pub use raster::{Raster, RasterHeader};
pub use transforms::GeoTransform;
