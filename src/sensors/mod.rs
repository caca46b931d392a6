use std::{fmt::Debug, path::Path};

use crate::errors::Result;

pub mod sentinel2;
pub use sentinel2::Sentinel2;

pub trait Sensor: Debug {
    /// Product level metadata carried by a file's path.
    type ProductMetadata: Debug + Clone + Send;

    fn product_metadata(path: &Path) -> Result<Self::ProductMetadata>;
}
