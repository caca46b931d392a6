use geo::{BoundingRect, Contains, Coord, Intersects, MultiPolygon, Polygon, Rect};
use ndarray::Array2;
use rayon::prelude::*;
use shrinkwraprs::Shrinkwrap;
use std::sync::Arc;

use crate::{
    components::{bounds::Bounds, raster::Raster},
    errors::{CompositeError, Result},
};

/// Polygons tagged with the CRS their coordinates are in.
///
/// Reprojection happens upstream; rasters are only ever masked by
/// geometries already in their own CRS.
#[derive(Shrinkwrap, Debug, Clone, PartialEq)]
pub struct CrsGeometry {
    crs: Arc<str>,
    #[shrinkwrap(main_field)]
    geometry: MultiPolygon<f64>,
}

impl CrsGeometry {
    pub fn new(crs: impl Into<Arc<str>>, geometry: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            crs: crs.into(),
            geometry: geometry.into(),
        }
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn bounds(&self) -> Result<Bounds> {
        let rect = self
            .geometry
            .bounding_rect()
            .ok_or(CompositeError::InvalidBounds {
                left: f64::NAN,
                bottom: f64::NAN,
                right: f64::NAN,
                top: f64::NAN,
            })?;
        Bounds::try_from(rect)
    }
}

impl From<(&str, Polygon<f64>)> for CrsGeometry {
    fn from(value: (&str, Polygon<f64>)) -> Self {
        CrsGeometry::new(value.0, value.1)
    }
}

/// Mask every pixel of `raster` outside `geometry`.
///
/// With `all_touched`, a pixel is inside if any part of it touches the
/// geometry, otherwise only if its centre lies within it. With `crop`, the
/// raster is first cut to the grid-aligned bounding box of the geometry.
pub fn mask_to_geometry(
    raster: &Raster,
    geometry: &CrsGeometry,
    all_touched: bool,
    crop: bool,
) -> Result<Raster> {
    if geometry.crs() != raster.crs() {
        return Err(CompositeError::GeometryMismatch(format!(
            "geometry CRS {} != raster CRS {}",
            geometry.crs(),
            raster.crs()
        )));
    }

    let raster = if crop {
        raster.crop(&geometry.bounds()?)?
    } else {
        raster.clone()
    };

    let (_, height, width) = raster.shape();
    let transform = *raster.transform();
    let outside: Vec<bool> = (0..height)
        .into_par_iter()
        .flat_map_iter(|row| {
            (0..width).map(move |col| {
                let (left, top) = transform.xy(row as f64, col as f64);
                let (right, bottom) = transform.xy(row as f64 + 1., col as f64 + 1.);
                let inside = if all_touched {
                    let pixel = Rect::new(Coord::from((left, bottom)), Coord::from((right, top)));
                    geometry.geometry().intersects(&pixel)
                } else {
                    let centre = Coord::from(((left + right) / 2., (top + bottom) / 2.));
                    geometry.geometry().contains(&centre)
                };
                !inside
            })
        })
        .collect();

    raster.masked_where(Array2::from_shape_vec((height, width), outside)?.view())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::transforms::GeoTransform;
    use geo::polygon;
    use ndarray::{array, Array3};
    use rstest::{fixture, rstest};

    #[fixture]
    fn raster() -> Raster {
        Raster::from_pixels(
            Array3::from_elem((1, 4, 4), 1.),
            GeoTransform::north_up(0., 40., 10., 10.),
            "EPSG:32614",
        )
        .unwrap()
    }

    fn triangle(crs: &str) -> CrsGeometry {
        CrsGeometry::from((
            crs,
            polygon![(x: 12., y: 28.), (x: 29., y: 28.), (x: 12., y: 11.)],
        ))
    }

    #[rstest]
    fn crops_and_masks_all_touched(raster: Raster) {
        let masked = mask_to_geometry(&raster, &triangle("EPSG:32614"), true, true).unwrap();
        assert_eq!(masked.shape(), (1, 2, 2));
        assert_eq!(
            masked.transform(),
            &GeoTransform::north_up(10., 30., 10., 10.)
        );
        assert_eq!(masked.valid_count(), 4);
    }

    #[rstest]
    fn masks_by_pixel_centre(raster: Raster) {
        let masked = mask_to_geometry(&raster, &triangle("EPSG:32614"), false, true).unwrap();
        assert_eq!(masked.band_valid(0), array![[true, true], [true, false]]);
    }

    #[rstest]
    fn masks_without_crop(raster: Raster) {
        let masked = mask_to_geometry(&raster, &triangle("EPSG:32614"), true, false).unwrap();
        assert_eq!(masked.shape(), (1, 4, 4));
        assert_eq!(masked.valid_count(), 4);
    }

    #[rstest]
    fn rejects_geometry_in_other_crs(raster: Raster) {
        let result = mask_to_geometry(&raster, &triangle("EPSG:4326"), true, true);
        assert!(matches!(result, Err(CompositeError::GeometryMismatch(_))));
    }
}
