use itertools::Itertools;
use log::info;
use ndarray::{Array2, Zip};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    components::{
        codec::RasterCodec,
        geometry::{mask_to_geometry, CrsGeometry},
        raster::Raster,
    },
    errors::{CompositeError, Result},
    merge::{MergeEngine, MergeOptions, MergeSource, OverlapCheck},
    sensors::sentinel2::{
        constants::{Band, CLOUD_VALUES, NDVI_BANDS, REFLECTANCE_SCALE},
        metadata::{MetadataCache, ProductFile},
        Sentinel2,
    },
};

/// Scale digital numbers in `1..=10000` to reflectance in `0..=1`, masking
/// the `0` no-data value.
pub fn extract_surface_reflectance(raster: Raster) -> Raster {
    raster.map_valid(|value| {
        if value == 0. {
            f64::NAN
        } else {
            value / REFLECTANCE_SCALE
        }
    })
}

fn check_same_grid(rasters: &[(&str, &Raster)]) -> Result<()> {
    let Some((first_name, first)) = rasters.first() else {
        return Ok(());
    };
    for (name, raster) in &rasters[1..] {
        if raster.shape() != first.shape() {
            return Err(CompositeError::Alignment(format!(
                "{name} shape {:?} != {first_name} shape {:?}",
                raster.shape(),
                first.shape()
            )));
        }
        if raster.transform() != first.transform() {
            return Err(CompositeError::Alignment(format!(
                "{name} transform {:?} != {first_name} transform {:?}",
                raster.transform(),
                first.transform()
            )));
        }
        if raster.crs() != first.crs() {
            return Err(CompositeError::Alignment(format!(
                "{name} CRS {} != {first_name} CRS {}",
                raster.crs(),
                first.crs()
            )));
        }
    }
    Ok(())
}

/// `(nir - red) / (nir + red)`, masked wherever either input is masked or
/// the denominator is zero.
pub fn calculate_ndvi(red: &Raster, nir: &Raster) -> Result<Raster> {
    check_same_grid(&[("red", red), ("nir", nir)])?;
    let mut ndvi = Array2::from_elem((red.height(), red.width()), f64::NAN);
    Zip::from(&mut ndvi)
        .and(red.band(0))
        .and(red.band_valid(0))
        .and(nir.band(0))
        .and(nir.band_valid(0))
        .for_each(|ndvi, &red, &red_valid, &nir, &nir_valid| {
            let denominator = nir + red;
            if red_valid && nir_valid && denominator != 0. {
                *ndvi = (nir - red) / denominator;
            }
        });
    Raster::from_band(ndvi, *red.transform(), red.crs())
}

/// Pixels the scene classification marks as cloud.
pub fn cloud_mask(scl: &Raster) -> Array2<bool> {
    let mut clouds = Array2::from_elem((scl.height(), scl.width()), false);
    Zip::from(&mut clouds)
        .and(scl.band(0))
        .and(scl.band_valid(0))
        .for_each(|cloud, &class, &valid| {
            *cloud = valid && CLOUD_VALUES.iter().any(|value| f64::from(*value) == class);
        });
    clouds
}

/// Mask `raster` where its detector footprint mask is masked or zero.
///
/// The footprint mask must be on exactly the raster's grid.
pub fn apply_detector_footprint(raster: Raster, footprint: &Raster) -> Result<Raster> {
    if footprint.shape() != raster.shape()
        || footprint.transform() != raster.transform()
        || footprint.crs() != raster.crs()
    {
        return Err(CompositeError::GeometryMismatch(format!(
            "detector footprint {:?} does not match raster {:?}",
            footprint, raster
        )));
    }
    let mut outside = Array2::from_elem((raster.height(), raster.width()), false);
    Zip::from(&mut outside)
        .and(footprint.band(0))
        .and(footprint.band_valid(0))
        .for_each(|outside, &detector, &valid| *outside = !valid || detector == 0.);
    raster.masked_where(outside.view())
}

/// Merge one band's tiles onto a single grid and mask to `crop_to`.
///
/// Adjacent tiles overlap at their buffered edges, where they should agree;
/// disagreements are logged, and the first tile wins.
fn merge_and_crop_tiles<C: RasterCodec>(
    engine: &MergeEngine<C>,
    paths: &[PathBuf],
    crop_to: Option<&CrsGeometry>,
    resolution: f64,
) -> Result<Raster> {
    let sources: Vec<MergeSource> = paths.iter().map(MergeSource::from).collect();
    let mut options = MergeOptions::new(Arc::new(OverlapCheck::default()).into())
        .without_resampling()
        .with_resolution(resolution);
    if let Some(geometry) = crop_to {
        options = options.with_bounds(geometry.bounds()?);
    }

    let merged = engine
        .merge(&sources, &options)?
        .left()
        .ok_or(CompositeError::EmptySources)?;
    match crop_to {
        Some(geometry) => mask_to_geometry(&merged, geometry, true, false),
        None => Ok(merged),
    }
}

/// Files of one datatake, split into band rasters and footprint masks.
#[derive(Debug, Default)]
struct DatatakeFiles {
    rasters: HashMap<Band, Vec<PathBuf>>,
    masks: HashMap<Band, Vec<PathBuf>>,
}

impl DatatakeFiles {
    fn classify(
        cache: &MetadataCache<Sentinel2>,
        datatake: &str,
        paths: &[PathBuf],
        crop_to: Option<&CrsGeometry>,
    ) -> Result<Self> {
        let mut files = Self::default();
        for path in paths {
            let metadata = cache.product_metadata(path)?;
            if &*metadata.datatake_timestamp != datatake {
                return Err(CompositeError::MixedDatatakes {
                    expected: datatake.to_string(),
                    found: metadata.datatake_timestamp.to_string(),
                });
            }
            if let Some(geometry) = crop_to {
                if geometry.crs() != metadata.crs() {
                    return Err(CompositeError::GeometryMismatch(format!(
                        "geometry CRS {} != raster CRS {}",
                        geometry.crs(),
                        metadata.crs()
                    )));
                }
            }

            let file = ProductFile::from_path(path)?;
            let band = file.band();
            if !NDVI_BANDS.contains(&band) {
                return Err(CompositeError::UnsupportedBand(band.to_string()));
            }
            let files_of_kind = match file {
                ProductFile::Raster(_) => &mut files.rasters,
                ProductFile::DetectorFootprintMask(_) => &mut files.masks,
            };
            files_of_kind.entry(band).or_default().push(path.clone());
        }
        Ok(files)
    }
}

/// Calculate NDVI for one datatake from its red, near infrared and scene
/// classification tiles, plus optional detector footprint masks.
///
/// Tiles of each band are merged at `resolution`, then footprint and cloud
/// masks are applied before the index is calculated.
pub fn build_ndvi_raster_for_datatake<C: RasterCodec>(
    codec: &C,
    cache: &MetadataCache<Sentinel2>,
    datatake: &str,
    paths: &[PathBuf],
    crop_to: Option<&CrsGeometry>,
    resolution: f64,
) -> Result<Raster> {
    info!("Calculating NDVI for datatake: {datatake}");
    let files = DatatakeFiles::classify(cache, datatake, paths, crop_to)?;
    let engine = MergeEngine::new(codec);

    let mut merged: HashMap<Band, Raster> = files
        .rasters
        .iter()
        .map(|(band, tiles)| {
            merge_and_crop_tiles(&engine, tiles, crop_to, resolution).map(|raster| (*band, raster))
        })
        .collect::<Result<_>>()?;

    for (band, tiles) in files.masks.iter().sorted_by_key(|(band, _)| **band) {
        let footprint = merge_and_crop_tiles(&engine, tiles, crop_to, resolution)?;
        let raster = merged.remove(band).ok_or(CompositeError::MissingBand(*band))?;
        merged.insert(*band, apply_detector_footprint(raster, &footprint)?);
    }

    let mut take = |band: Band| merged.remove(&band).ok_or(CompositeError::MissingBand(band));
    let (red, nir, mut scl) = (take(Band::RED)?, take(Band::NIR)?, take(Band::SCL)?);

    // SCL is upsampled from a coarser grid, so it may extend a pixel past
    // red and NIR.
    if scl.shape() != red.shape() {
        scl = scl.crop(&red.bounds())?;
    }
    check_same_grid(&[("red", &red), ("nir", &nir), ("scl", &scl)])?;

    let clouds = cloud_mask(&scl);
    let red = extract_surface_reflectance(red.masked_where(clouds.view())?);
    let nir = extract_surface_reflectance(nir.masked_where(clouds.view())?);
    calculate_ndvi(&red, &nir)
}

/// [build_ndvi_raster_for_datatake], saved as `<output_directory>/<datatake>.tif`.
pub fn build_and_save_ndvi_raster_for_datatake<C: RasterCodec>(
    codec: &C,
    cache: &MetadataCache<Sentinel2>,
    output_directory: &Path,
    datatake: &str,
    paths: &[PathBuf],
    crop_to: Option<&CrsGeometry>,
    resolution: f64,
) -> Result<PathBuf> {
    let ndvi = build_ndvi_raster_for_datatake(codec, cache, datatake, paths, crop_to, resolution)?;
    let path = output_directory.join(format!("{datatake}.tif"));
    codec.write(&ndvi, &path)?;
    Ok(path)
}
