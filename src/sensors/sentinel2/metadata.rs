use parking_lot::Mutex;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    errors::{CompositeError, Result},
    sensors::{
        sentinel2::constants::{Band, Resolution},
        Sensor,
    },
};

fn file_stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|name| name.to_str())
        .ok_or_else(|| CompositeError::InvalidProductName(path.display().to_string()))
}

/// `YYYYMMDDTHHMMSS`
fn is_timestamp(value: &str) -> bool {
    value.len() == 15
        && value.char_indices().all(|(index, c)| match index {
            8 => c == 'T',
            _ => c.is_ascii_digit(),
        })
}

/// Metadata encoded in a product's `.SAFE` directory name, e.g.
/// `S2C_MSIL2A_20241216T184831_N9905_R070_T10SFG_20241216T221754.SAFE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeMetadata {
    pub mission: Arc<str>,
    pub product_level: Arc<str>,
    pub datatake_timestamp: Arc<str>,
    pub processing_baseline: Arc<str>,
    pub relative_orbit: Arc<str>,
    pub tile_id: Arc<str>,
    pub product_discriminator: Arc<str>,
}

impl SafeMetadata {
    /// Parse from any path with a `.SAFE` component: the product itself, or
    /// a file inside it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let invalid = || CompositeError::InvalidProductName(path.display().to_string());
        let safe_name = path
            .iter()
            .filter_map(|component| component.to_str())
            .find_map(|component| component.strip_suffix(".SAFE"))
            .ok_or_else(invalid)?;

        let parts: Vec<&str> = safe_name.split('_').collect();
        let [mission, product_level, datatake_timestamp, processing_baseline, relative_orbit, tile_id, product_discriminator] =
            parts.as_slice()
        else {
            return Err(invalid());
        };
        let tile_id = tile_id.strip_prefix('T').ok_or_else(invalid)?;
        let valid_tile = tile_id.len() == 5
            && tile_id.is_ascii()
            && tile_id[..2].chars().all(|c| c.is_ascii_digit())
            && tile_id[2..].chars().all(|c| c.is_ascii_uppercase());
        if !mission.starts_with("S2") || !valid_tile || !is_timestamp(datatake_timestamp) {
            return Err(invalid());
        }

        Ok(Self {
            mission: Arc::from(*mission),
            product_level: Arc::from(*product_level),
            datatake_timestamp: Arc::from(*datatake_timestamp),
            processing_baseline: Arc::from(*processing_baseline),
            relative_orbit: Arc::from(*relative_orbit),
            tile_id: Arc::from(tile_id),
            product_discriminator: Arc::from(*product_discriminator),
        })
    }

    /// Two digit UTM zone of the tile.
    pub fn utm_zone(&self) -> &str {
        &self.tile_id[..2]
    }

    /// Latitude bands `N` and above are in the northern hemisphere.
    pub fn is_northern(&self) -> bool {
        self.tile_id.as_bytes()[2] >= b'N'
    }

    /// WGS 84 / UTM CRS of the tile.
    pub fn crs(&self) -> String {
        let hemisphere = if self.is_northern() { 326 } else { 327 };
        format!("EPSG:{hemisphere}{}", self.utm_zone())
    }
}

/// Metadata encoded in a band raster's name, e.g.
/// `T10SFG_20241216T184831_B04_10m.jp2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterMetadata {
    pub band: Band,
    pub resolution: Resolution,
}

impl RasterMetadata {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let invalid = || CompositeError::InvalidProductName(path.display().to_string());
        let parts: Vec<&str> = file_stem(path)?.split('_').collect();
        let [tile_id, timestamp, band, resolution] = parts.as_slice() else {
            return Err(invalid());
        };
        if !tile_id.starts_with('T') || !is_timestamp(timestamp) {
            return Err(invalid());
        }
        Ok(Self {
            band: band.parse()?,
            resolution: resolution.parse()?,
        })
    }
}

/// Metadata encoded in a detector footprint mask's name, e.g.
/// `MSK_DETFOO_B04.jp2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorFootprintMaskMetadata {
    pub band: Band,
}

impl DetectorFootprintMaskMetadata {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let band = file_stem(path)?
            .strip_prefix("MSK_DETFOO_")
            .ok_or_else(|| CompositeError::InvalidProductName(path.display().to_string()))?;
        Ok(Self {
            band: band.parse()?,
        })
    }
}

/// What a file inside a product holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductFile {
    Raster(RasterMetadata),
    DetectorFootprintMask(DetectorFootprintMaskMetadata),
}

impl ProductFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        RasterMetadata::from_path(path)
            .map(ProductFile::Raster)
            .or_else(|_| {
                DetectorFootprintMaskMetadata::from_path(path)
                    .map(ProductFile::DetectorFootprintMask)
            })
    }

    pub fn band(&self) -> Band {
        match self {
            ProductFile::Raster(metadata) => metadata.band,
            ProductFile::DetectorFootprintMask(metadata) => metadata.band,
        }
    }
}

/// Memoised product metadata, keyed by path.
///
/// Built once per session and shared by reference; safe to use from worker
/// threads.
#[derive(Debug)]
pub struct MetadataCache<S: Sensor> {
    entries: Mutex<HashMap<PathBuf, S::ProductMetadata>>,
}

impl<S: Sensor> Default for MetadataCache<S> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<S: Sensor> MetadataCache<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product_metadata(&self, path: impl AsRef<Path>) -> Result<S::ProductMetadata> {
        let path = path.as_ref();
        if let Some(metadata) = self.entries.lock().get(path) {
            return Ok(metadata.clone());
        }

        let metadata = S::product_metadata(path)?;
        self.entries
            .lock()
            .insert(path.to_path_buf(), metadata.clone());
        Ok(metadata)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
