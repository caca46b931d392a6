//! Sentinel-2 Level-2A products: file naming, NDVI per datatake, and NDVI
//! composites per UTM zone.

use std::path::Path;

use crate::{errors::Result, sensors::Sensor};

pub mod constants;
pub mod metadata;
pub mod ndvi;
pub mod pipeline;

pub use constants::{Band, Resolution, CLOUD_VALUES, NDVI_BANDS, NDVI_BAND_RESOLUTIONS};
pub use metadata::{MetadataCache, ProductFile, SafeMetadata};
pub use ndvi::{
    apply_detector_footprint, build_and_save_ndvi_raster_for_datatake,
    build_ndvi_raster_for_datatake, calculate_ndvi, cloud_mask, extract_surface_reflectance,
};
pub use pipeline::{NdviPipeline, NdviRasters, NdviRequest, ZoneStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentinel2;

impl Sensor for Sentinel2 {
    type ProductMetadata = SafeMetadata;

    fn product_metadata(path: &Path) -> Result<SafeMetadata> {
        SafeMetadata::from_path(path)
    }
}
