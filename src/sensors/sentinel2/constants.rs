use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use crate::errors::CompositeError;

/// Level-2A band rasters and products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    B01,
    B02,
    B03,
    B04,
    B05,
    B06,
    B07,
    B08,
    B8A,
    B09,
    B11,
    B12,
    /// Aerosol optical thickness
    AOT,
    /// Scene classification
    SCL,
    /// True colour image
    TCI,
    /// Water vapour
    WVP,
}

impl Band {
    pub const RED: Band = Band::B04;
    pub const NIR: Band = Band::B08;

    const ALL: [Band; 16] = [
        Band::B01,
        Band::B02,
        Band::B03,
        Band::B04,
        Band::B05,
        Band::B06,
        Band::B07,
        Band::B08,
        Band::B8A,
        Band::B09,
        Band::B11,
        Band::B12,
        Band::AOT,
        Band::SCL,
        Band::TCI,
        Band::WVP,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Band::B01 => "B01",
            Band::B02 => "B02",
            Band::B03 => "B03",
            Band::B04 => "B04",
            Band::B05 => "B05",
            Band::B06 => "B06",
            Band::B07 => "B07",
            Band::B08 => "B08",
            Band::B8A => "B8A",
            Band::B09 => "B09",
            Band::B11 => "B11",
            Band::B12 => "B12",
            Band::AOT => "AOT",
            Band::SCL => "SCL",
            Band::TCI => "TCI",
            Band::WVP => "WVP",
        }
    }
}

impl Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Band {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Band::ALL
            .into_iter()
            .find(|band| band.name() == s)
            .ok_or_else(|| CompositeError::UnsupportedBand(s.to_string()))
    }
}

/// Bands read to calculate NDVI: red and near infrared reflectance, and the
/// scene classification to mask clouds with.
pub const NDVI_BANDS: [Band; 3] = [Band::RED, Band::NIR, Band::SCL];

/// Band rasters and the resolution each is fetched at.
pub const NDVI_BAND_RESOLUTIONS: [(Band, Resolution); 3] = [
    (Band::RED, Resolution::R10),
    (Band::NIR, Resolution::R10),
    (Band::SCL, Resolution::R20),
];

/// Scene classification values masked as cloud: cloud shadows, medium and
/// high probability cloud, and thin cirrus.
pub const CLOUD_VALUES: [u8; 4] = [3, 8, 9, 10];

/// Surface reflectance digital numbers per unit reflectance.
pub const REFLECTANCE_SCALE: f64 = 10_000.;

/// Pixel size of a band raster, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resolution {
    R10,
    R20,
    R60,
}

impl Resolution {
    pub fn metres(&self) -> u32 {
        match self {
            Resolution::R10 => 10,
            Resolution::R20 => 20,
            Resolution::R60 => 60,
        }
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}m", self.metres())
    }
}

impl FromStr for Resolution {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "10m" => Ok(Resolution::R10),
            "20m" => Ok(Resolution::R20),
            "60m" => Ok(Resolution::R60),
            other => Err(CompositeError::InvalidProductName(format!(
                "unknown resolution {other}"
            ))),
        }
    }
}
