use log::debug;
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use std::{fmt::Debug, path::Path, sync::Arc};

use crate::{
    components::{
        bounds::{align_bounds_to_transform, Bounds},
        codec::RasterCodec,
        transforms::GeoTransform,
    },
    errors::{CompositeError, Result},
};

/// Everything about a raster except its pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterHeader {
    pub band_count: usize,
    pub height: usize,
    pub width: usize,
    pub transform: GeoTransform,
    pub crs: Arc<str>,
}

impl RasterHeader {
    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.height, self.width)
    }

    /// Array shape (C, H, W)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.band_count, self.height, self.width)
    }
}

/// Georeferenced, band-major pixel array with a validity mask.
///
/// Pixels where `valid` is `false` are masked: they hold no data and never
/// contribute to aggregates. Operations consume or copy a raster, they never
/// modify one in place.
#[derive(Clone)]
pub struct Raster {
    pixels: Array3<f64>,
    valid: Array3<bool>,
    transform: GeoTransform,
    crs: Arc<str>,
}

impl Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("shape", &self.shape())
            .field("valid_count", &self.valid_count())
            .field("transform", &self.transform)
            .field("crs", &self.crs)
            .finish()
    }
}

impl Raster {
    pub fn new(
        pixels: Array3<f64>,
        valid: Array3<bool>,
        transform: GeoTransform,
        crs: impl Into<Arc<str>>,
    ) -> Result<Self> {
        if pixels.shape() != valid.shape() {
            return Err(CompositeError::ShapeMismatch {
                pixels: pixels.shape().to_vec(),
                mask: valid.shape().to_vec(),
            });
        }
        let crs = crs.into();
        if crs.is_empty() {
            return Err(CompositeError::MissingCrs);
        }
        Ok(Self {
            pixels,
            valid,
            transform,
            crs,
        })
    }

    /// All pixels valid, except NaN.
    pub fn from_pixels(
        pixels: Array3<f64>,
        transform: GeoTransform,
        crs: impl Into<Arc<str>>,
    ) -> Result<Self> {
        let valid = pixels.mapv(|value| !value.is_nan());
        Self::new(pixels, valid, transform, crs)
    }

    /// Single band raster, all pixels valid, except NaN.
    pub fn from_band(
        pixels: Array2<f64>,
        transform: GeoTransform,
        crs: impl Into<Arc<str>>,
    ) -> Result<Self> {
        Self::from_pixels(pixels.insert_axis(Axis(0)), transform, crs)
    }

    /// Pixels equal to `nodata` (or NaN) are masked.
    pub fn masked_equal(
        pixels: Array3<f64>,
        nodata: f64,
        transform: GeoTransform,
        crs: impl Into<Arc<str>>,
    ) -> Result<Self> {
        let valid = pixels.mapv(|value| !value.is_nan() && value != nodata);
        Self::new(pixels, valid, transform, crs)
    }

    pub fn from_file(path: impl AsRef<Path>, codec: &impl RasterCodec) -> Result<Self> {
        codec.read(path.as_ref())
    }

    pub fn save(&self, path: impl AsRef<Path>, codec: &impl RasterCodec) -> Result<()> {
        codec.write(self, path.as_ref())
    }

    pub fn pixels(&self) -> ArrayView3<'_, f64> {
        self.pixels.view()
    }

    pub fn valid(&self) -> ArrayView3<'_, bool> {
        self.valid.view()
    }

    pub fn band(&self, index: usize) -> ArrayView2<'_, f64> {
        self.pixels.index_axis(Axis(0), index)
    }

    pub fn band_valid(&self, index: usize) -> ArrayView2<'_, bool> {
        self.valid.index_axis(Axis(0), index)
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    /// Array shape (C, H, W)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.pixels.dim()
    }

    pub fn band_count(&self) -> usize {
        self.shape().0
    }

    pub fn height(&self) -> usize {
        self.shape().1
    }

    pub fn width(&self) -> usize {
        self.shape().2
    }

    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.height(), self.width())
    }

    pub fn header(&self) -> RasterHeader {
        RasterHeader {
            band_count: self.band_count(),
            height: self.height(),
            width: self.width(),
            transform: self.transform,
            crs: Arc::clone(&self.crs),
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|valid| **valid).count()
    }

    /// Pixel values with masked pixels replaced by `fill`.
    pub fn filled(&self, fill: f64) -> Array3<f64> {
        let mut filled = self.pixels.clone();
        Zip::from(&mut filled)
            .and(&self.valid)
            .for_each(|value, &valid| {
                if !valid {
                    *value = fill
                }
            });
        filled
    }

    /// Valid values, in band-major order.
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.pixels
            .iter()
            .zip(self.valid.iter())
            .filter_map(|(value, valid)| valid.then_some(*value))
    }

    pub fn into_parts(self) -> (Array3<f64>, Array3<bool>, GeoTransform, Arc<str>) {
        (self.pixels, self.valid, self.transform, self.crs)
    }

    /// Mask every band where `invalid` is `true`.
    ///
    /// Never unmasks a pixel.
    pub fn masked_where(mut self, invalid: ArrayView2<bool>) -> Result<Self> {
        let (_, height, width) = self.shape();
        if invalid.dim() != (height, width) {
            return Err(CompositeError::ShapeMismatch {
                pixels: vec![height, width],
                mask: invalid.shape().to_vec(),
            });
        }
        for mut band_valid in self.valid.axis_iter_mut(Axis(0)) {
            Zip::from(&mut band_valid)
                .and(&invalid)
                .for_each(|valid, &invalid| *valid &= !invalid);
        }
        Ok(self)
    }

    /// Apply `f` to every valid pixel. Pixels mapped to NaN become masked.
    pub fn map_valid(mut self, f: impl Fn(f64) -> f64) -> Self {
        Zip::from(&mut self.pixels)
            .and(&mut self.valid)
            .for_each(|value, valid| {
                if *valid {
                    *value = f(*value);
                    *valid = !value.is_nan();
                }
            });
        self
    }

    /// Cut out the grid-aligned window enclosing `bounds`, clipped to the
    /// raster's own extent.
    pub fn crop(&self, bounds: &Bounds) -> Result<Self> {
        let aligned = align_bounds_to_transform(bounds, &self.transform)?;
        let window = self.transform.window(&aligned);

        let row_start = (window.row_off.round().max(0.) as usize).min(self.height());
        let col_start = (window.col_off.round().max(0.) as usize).min(self.width());
        let row_end = ((window.row_off + window.height).round().max(0.) as usize).min(self.height());
        let col_end = ((window.col_off + window.width).round().max(0.) as usize).min(self.width());
        if row_end <= row_start || col_end <= col_start {
            let (left, bottom, right, top) = bounds.as_tuple();
            return Err(CompositeError::InvalidBounds {
                left,
                bottom,
                right,
                top,
            });
        }
        debug!(
            "cropping {:?} to rows {row_start}..{row_end}, cols {col_start}..{col_end}",
            self.shape()
        );

        let (xoff, yoff) = self.transform.xy(row_start as f64, col_start as f64);
        let window = s![.., row_start..row_end, col_start..col_end];
        Self::new(
            self.pixels.slice(window).to_owned(),
            self.valid.slice(window).to_owned(),
            self.transform.with_origin(xoff, yoff),
            Arc::clone(&self.crs),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;
    use rstest::rstest;

    pub(crate) fn raster_3x3(xoff: f64, yoff: f64, values: [[f64; 3]; 3]) -> Raster {
        let pixels = Array2::from(values.to_vec());
        Raster::from_band(
            pixels,
            GeoTransform::north_up(xoff, yoff, 10., 10.),
            "EPSG:5070",
        )
        .unwrap()
    }

    #[rstest]
    fn nan_is_masked() {
        let raster = Raster::from_band(
            array![[4., f64::NAN], [5., 5.]],
            GeoTransform::north_up(0., 0., 1., 1.),
            "EPSG:4326",
        )
        .unwrap();
        assert_eq!(raster.valid_count(), 3);
        assert_eq!(raster.shape(), (1, 2, 2));
        assert_eq!(raster.filled(-9999.), array![[[4., -9999.], [5., 5.]]]);
    }

    #[rstest]
    fn mismatched_mask_is_rejected() {
        let result = Raster::new(
            Array3::zeros((1, 2, 2)),
            Array3::from_elem((1, 2, 3), true),
            GeoTransform::north_up(0., 0., 1., 1.),
            "EPSG:4326",
        );
        assert!(matches!(result, Err(CompositeError::ShapeMismatch { .. })));
    }

    #[rstest]
    fn missing_crs_is_rejected() {
        let result = Raster::from_band(
            Array2::zeros((2, 2)),
            GeoTransform::north_up(0., 0., 1., 1.),
            "",
        );
        assert!(matches!(result, Err(CompositeError::MissingCrs)));
    }

    #[rstest]
    fn masking_never_unmasks() {
        let raster = Raster::masked_equal(
            array![[[0., 1.], [2., 3.]], [[4., 0.], [6., 7.]]],
            0.,
            GeoTransform::north_up(0., 0., 1., 1.),
            "EPSG:4326",
        )
        .unwrap();
        assert_eq!(raster.valid_count(), 6);

        let masked = raster
            .masked_where(array![[true, false], [false, false]].view())
            .unwrap();
        assert_eq!(masked.valid_count(), 5);
        assert_eq!(
            masked.valid(),
            array![[[false, true], [true, true]], [[false, false], [true, true]]]
        );
    }

    #[rstest]
    fn crop_snaps_to_grid() {
        let raster = raster_3x3(
            -176000.,
            2390240.,
            [[5., 6., 7.], [9., 10., 11.], [13., 14., 15.]],
        );
        let cropped = raster
            .crop(&Bounds::new(-175995., 2390215., -175985., 2390235.).unwrap())
            .unwrap();
        assert_eq!(cropped.band(0), array![[5., 6.], [9., 10.], [13., 14.]]);
        assert_eq!(
            cropped.transform(),
            &GeoTransform::north_up(-176000., 2390240., 10., 10.)
        );
    }

    #[rstest]
    fn crop_outside_extent_fails() {
        let raster = raster_3x3(0., 30., [[1.; 3]; 3]);
        let result = raster.crop(&Bounds::new(100., 100., 200., 200.).unwrap());
        assert!(matches!(result, Err(CompositeError::InvalidBounds { .. })));
    }

    #[rstest]
    fn map_valid_skips_masked() {
        let raster = Raster::from_band(
            array![[1., f64::NAN], [0., 4.]],
            GeoTransform::north_up(0., 0., 1., 1.),
            "EPSG:4326",
        )
        .unwrap()
        .map_valid(|value| if value == 0. { f64::NAN } else { 1. / value });
        assert_eq!(raster.valid_count(), 2);
        assert_eq!(raster.band(0)[[1, 1]], 0.25);
    }
}
