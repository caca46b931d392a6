//! Combine many rasters on one grid into a single raster, one source in
//! memory at a time.

mod grid;
pub mod methods;

use either::Either;
use log::{debug, info};
use ndarray::{s, Array2, Axis, Zip};
use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    components::{
        alignment::aligned_pixel_grids,
        bounds::{align_bounds_to_transform, Bounds},
        codec::RasterCodec,
        raster::{Raster, RasterHeader},
        transforms::GeoTransform,
    },
    errors::{CompositeError, Result},
};
use grid::{Accumulator, OutputGrid};
pub use methods::{
    MergeMethod, MergedPixels, OverlapCheck, OverlappingPixelsWarning, PixelCombiner,
    SourcePixels, Statistic,
};

/// A merged raster, either in memory or written to a file.
pub type Merged = Either<Raster, PathBuf>;

/// Input to a merge: a raster in memory or one on disk, read lazily.
#[derive(Debug, Clone, Copy)]
pub enum MergeSource<'a> {
    Raster(&'a Raster),
    File(&'a Path),
}

impl<'a> From<&'a Raster> for MergeSource<'a> {
    fn from(value: &'a Raster) -> Self {
        Self::Raster(value)
    }
}

impl<'a> From<&'a Path> for MergeSource<'a> {
    fn from(value: &'a Path) -> Self {
        Self::File(value)
    }
}

impl<'a> From<&'a PathBuf> for MergeSource<'a> {
    fn from(value: &'a PathBuf) -> Self {
        Self::File(value.as_path())
    }
}

impl<'a> From<&'a Merged> for MergeSource<'a> {
    fn from(value: &'a Merged) -> Self {
        match value {
            Either::Left(raster) => raster.into(),
            Either::Right(path) => path.into(),
        }
    }
}

impl<'a> MergeSource<'a> {
    fn header(&self, codec: &impl RasterCodec) -> Result<RasterHeader> {
        match self {
            Self::Raster(raster) => Ok(raster.header()),
            Self::File(path) => codec.read_header(path),
        }
    }

    fn load(&self, codec: &impl RasterCodec) -> Result<Cow<'a, Raster>> {
        match self {
            Self::Raster(raster) => Ok(Cow::Borrowed(*raster)),
            Self::File(path) => Ok(Cow::Owned(codec.read(path)?)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub method: MergeMethod,
    /// Output extent, snapped outwards to the first source's grid. Defaults
    /// to the union of all sources.
    pub bounds: Option<Bounds>,
    /// Without resampling, every source must sit on the same pixel grid.
    pub allow_resampling: bool,
    /// Output `(x, y)` resolution. Defaults to the first source's.
    pub resolution: Option<(f64, f64)>,
    /// Bands of the output. Built-in methods merge the first bands of every
    /// source; a custom combiner reads all bands of the first source and may
    /// fold them into a different number of output bands.
    pub output_band_count: Option<usize>,
    /// Write the result here instead of returning it.
    pub destination: Option<PathBuf>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            method: MergeMethod::First,
            bounds: None,
            allow_resampling: true,
            resolution: None,
            output_band_count: None,
            destination: None,
        }
    }
}

impl MergeOptions {
    pub fn new(method: MergeMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn without_resampling(mut self) -> Self {
        self.allow_resampling = false;
        self
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some((resolution, resolution));
        self
    }

    pub fn with_output_band_count(mut self, band_count: usize) -> Self {
        self.output_band_count = Some(band_count);
        self
    }

    pub fn write_to(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// Shared CRS of all headers.
fn common_crs(headers: &[RasterHeader]) -> Result<Arc<str>> {
    let first = headers.first().ok_or(CompositeError::EmptySources)?;
    match headers.iter().find(|header| header.crs != first.crs) {
        Some(header) => Err(CompositeError::CrsMismatch {
            expected: first.crs.to_string(),
            found: header.crs.to_string(),
        }),
        None => Ok(Arc::clone(&first.crs)),
    }
}

fn union_bounds(headers: &[RasterHeader]) -> Result<Bounds> {
    headers
        .iter()
        .map(RasterHeader::bounds)
        .reduce(|union, bounds| union.union(&bounds))
        .ok_or(CompositeError::EmptySources)
}

fn check_alignment<'t>(
    bounds: &Bounds,
    transforms: impl IntoIterator<Item = &'t GeoTransform>,
) -> Result<()> {
    if aligned_pixel_grids(bounds, transforms) {
        Ok(())
    } else {
        Err(CompositeError::UnalignedGrid)
    }
}

/// Single band quotient of a sum and count accumulator, masked where
/// nothing was counted.
fn divide_sum_by_count(accumulator: Accumulator, grid: OutputGrid) -> Result<Raster> {
    let (data, valid) = accumulator.view();
    let shape = (grid.height, grid.width);
    let mut quotient = Array2::zeros(shape);
    let mut quotient_valid = Array2::from_elem(shape, false);
    Zip::from(&mut quotient)
        .and(&mut quotient_valid)
        .and(data.index_axis(Axis(0), 0))
        .and(data.index_axis(Axis(0), 1))
        .and(valid.index_axis(Axis(0), 1))
        .for_each(|value, value_valid, &sum, &count, &counted| {
            if counted && count > 0. {
                *value = sum / count;
                *value_valid = true;
            }
        });
    Raster::new(
        quotient.insert_axis(Axis(0)),
        quotient_valid.insert_axis(Axis(0)),
        grid.transform,
        grid.crs,
    )
}

/// Bands read from each source, and bands of the accumulator they are folded
/// into.
///
/// Custom combiners may accumulate into `output_band_count` synthetic bands
/// while reading every band of the first source. Mean always reads one band
/// into a sum and a count band.
fn band_counts(headers: &[RasterHeader], options: &MergeOptions) -> Result<(usize, usize)> {
    let first = headers[0].band_count;
    let output = options.output_band_count.unwrap_or(first);
    match options.method {
        MergeMethod::Mean => {
            if let Some(header) = headers.iter().find(|header| header.band_count > 1) {
                return Err(CompositeError::MultiBandAggregate {
                    bands: header.band_count,
                });
            }
            if options.output_band_count.is_some() {
                return Err(CompositeError::InvalidConfig(
                    "mean always produces one band, don't set output_band_count".into(),
                ));
            }
            Ok((1, 2))
        }
        MergeMethod::Custom(_) => Ok((first, output)),
        _ => Ok((output, output)),
    }
}

/// Merges rasters, reading files through a [RasterCodec].
#[derive(Debug, Clone, Copy)]
pub struct MergeEngine<'c, C: RasterCodec> {
    codec: &'c C,
}

impl<'c, C: RasterCodec> MergeEngine<'c, C> {
    pub fn new(codec: &'c C) -> Self {
        Self { codec }
    }

    fn finish(&self, raster: Raster, destination: Option<&Path>) -> Result<Merged> {
        match destination {
            Some(path) => {
                debug!("Writing {:?} to {path:?}", raster);
                self.codec.write(&raster, path)?;
                Ok(Either::Right(path.to_path_buf()))
            }
            None => Ok(Either::Left(raster)),
        }
    }

    /// Merge `sources` onto one grid, in order, using `options.method` for
    /// overlapping pixels.
    ///
    /// All sources must share a CRS. Pixels no source covers are masked.
    pub fn merge(&self, sources: &[MergeSource], options: &MergeOptions) -> Result<Merged> {
        let headers = sources
            .iter()
            .map(|source| source.header(self.codec))
            .collect::<Result<Vec<_>>>()?;
        let crs = common_crs(&headers)?;
        let first = &headers[0];

        let union = union_bounds(&headers)?;
        if !options.allow_resampling {
            check_alignment(&union, headers.iter().map(|header| &header.transform))?;
        }

        let (read_band_count, accumulator_band_count) = band_counts(&headers, options)?;
        if let Some(header) = headers
            .iter()
            .find(|header| header.band_count < read_band_count)
        {
            return Err(CompositeError::BandCountMismatch {
                expected: read_band_count,
                found: header.band_count,
            });
        }

        let bounds = match &options.bounds {
            Some(bounds) => align_bounds_to_transform(bounds, &first.transform)?,
            None => union,
        };
        let resolution = options
            .resolution
            .unwrap_or_else(|| first.transform.resolution());
        let grid = OutputGrid::covering(&bounds, resolution, crs);
        info!(
            "Merging {} rasters with {:?} into {} x {} pixels",
            sources.len(),
            options.method,
            grid.height,
            grid.width
        );

        let mut accumulator = Accumulator::new(accumulator_band_count, &grid);
        let combiner = options.method.combiner();
        for source in sources {
            let raster = source.load(self.codec)?;
            let Some(placement) = grid.place(&raster, read_band_count) else {
                debug!("{:?} is outside the output grid, skipping", raster);
                continue;
            };
            combiner.combine(accumulator.window(&placement), placement.pixels())?;
        }

        let merged = match options.method {
            MergeMethod::Mean => divide_sum_by_count(accumulator, grid)?,
            _ => accumulator.into_raster(grid)?,
        };
        self.finish(merged, options.destination.as_deref())
    }

    /// Per-pixel population variance of single band `sources` around `mean`.
    ///
    /// The output is on `mean`'s grid, masked where no source has a valid
    /// value or the mean is masked. Sources and mean must be on one pixel
    /// grid.
    pub fn merge_variance(
        &self,
        sources: &[MergeSource],
        mean: MergeSource,
        destination: Option<&Path>,
    ) -> Result<Merged> {
        let variance = self.variance(sources, mean)?;
        self.finish(variance, destination)
    }

    /// Square root of [MergeEngine::merge_variance].
    pub fn merge_stddev(
        &self,
        sources: &[MergeSource],
        mean: MergeSource,
        destination: Option<&Path>,
    ) -> Result<Merged> {
        let variance = self.variance(sources, mean)?;
        self.finish(variance.map_valid(f64::sqrt), destination)
    }

    fn variance(&self, sources: &[MergeSource], mean: MergeSource) -> Result<Raster> {
        let mean = mean.load(self.codec)?;
        if mean.band_count() != 1 {
            return Err(CompositeError::MultiBandAggregate {
                bands: mean.band_count(),
            });
        }

        let mut headers = sources
            .iter()
            .map(|source| source.header(self.codec))
            .collect::<Result<Vec<_>>>()?;
        if headers.is_empty() {
            return Err(CompositeError::EmptySources);
        }
        if let Some(header) = headers.iter().find(|header| header.band_count != 1) {
            return Err(CompositeError::MultiBandAggregate {
                bands: header.band_count,
            });
        }
        headers.insert(0, mean.header());
        common_crs(&headers)?;
        check_alignment(
            &union_bounds(&headers)?,
            headers.iter().map(|header| &header.transform),
        )?;

        let grid = OutputGrid::of(&mean);
        info!(
            "Merging variance of {} rasters into {} x {} pixels",
            sources.len(),
            grid.height,
            grid.width
        );
        let mut accumulator = Accumulator::new(2, &grid);
        let combiner = MergeMethod::Mean.combiner();
        for source in sources {
            let raster = source.load(self.codec)?;
            let Some(mut placement) = grid.place(&raster, 1) else {
                continue;
            };
            let window = s![.., placement.rows.clone(), placement.cols.clone()];
            Zip::from(&mut placement.data)
                .and(&mut placement.valid)
                .and(mean.pixels().slice(window))
                .and(mean.valid().slice(window))
                .for_each(|value, valid, &mean_value, &mean_valid| {
                    *valid &= mean_valid;
                    *value = (*value - mean_value).powi(2);
                });
            combiner.combine(accumulator.window(&placement), placement.pixels())?;
        }

        divide_sum_by_count(accumulator, grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{backends::tiff_backend::TiffCodec, raster::tests::raster_3x3};
    use methods::{CopyLast, SumAndCount};
    use ndarray::array;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    fn float_raster(values: [[f64; 2]; 2]) -> Raster {
        Raster::from_band(
            Array2::from(values.to_vec()),
            GeoTransform::new(1., 0., 0., 0., -1., 0.),
            "EPSG:4326",
        )
        .unwrap()
    }

    #[fixture]
    fn float_rasters() -> [Raster; 2] {
        [
            float_raster([[4., 3.], [5., 5.]]),
            float_raster([[6., f64::NAN], [9., 4.]]),
        ]
    }

    #[fixture]
    fn top_left() -> Raster {
        raster_3x3(
            -176010.,
            2390250.,
            [[0., 1., 2.], [4., 5., 6.], [8., 9., 10.]],
        )
    }

    #[fixture]
    fn bottom_right() -> Raster {
        raster_3x3(
            -176000.,
            2390240.,
            [[5., 6., 7.], [9., 10., 11.], [13., 14., 15.]],
        )
    }

    fn sources(rasters: &[Raster]) -> Vec<MergeSource<'_>> {
        rasters.iter().map(MergeSource::from).collect()
    }

    fn merge_in_memory(rasters: &[Raster], options: &MergeOptions) -> Result<Raster> {
        Ok(MergeEngine::new(&TiffCodec)
            .merge(&sources(rasters), options)?
            .left()
            .unwrap())
    }

    #[rstest]
    #[case::mean(MergeMethod::Mean, array![[5., 3.], [7., 4.5]])]
    #[case::min(MergeMethod::Min, array![[4., 3.], [5., 4.]])]
    #[case::max(MergeMethod::Max, array![[6., 3.], [9., 5.]])]
    #[case::first(MergeMethod::First, array![[4., 3.], [5., 5.]])]
    #[case::last(MergeMethod::Last, array![[6., 3.], [9., 4.]])]
    #[case::count(MergeMethod::Count, array![[2., 1.], [2., 2.]])]
    #[test_log::test]
    fn aggregates(
        float_rasters: [Raster; 2],
        #[case] method: MergeMethod,
        #[case] expected: Array2<f64>,
    ) {
        let merged = merge_in_memory(&float_rasters, &MergeOptions::new(method)).unwrap();
        assert_eq!(merged.band(0), expected);
        assert_eq!(merged.valid_count(), 4);
        assert_eq!(merged.transform(), float_rasters[0].transform());
    }

    #[rstest]
    #[test_log::test]
    fn variance_and_stddev(float_rasters: [Raster; 2]) {
        let engine = MergeEngine::new(&TiffCodec);
        let sources = sources(&float_rasters);
        let mean = engine
            .merge(&sources, &MergeOptions::new(MergeMethod::Mean))
            .unwrap();

        let variance = engine
            .merge_variance(&sources, (&mean).into(), None)
            .unwrap()
            .left()
            .unwrap();
        assert_eq!(variance.band(0), array![[1., 0.], [4., 0.25]]);

        let stddev = engine
            .merge_stddev(&sources, (&mean).into(), None)
            .unwrap()
            .left()
            .unwrap();
        assert_eq!(stddev.band(0), array![[1., 0.], [2., 0.5]]);
    }

    #[rstest]
    fn merges_offset_tiles(top_left: Raster, bottom_right: Raster) {
        let merged = merge_in_memory(
            &[top_left, bottom_right],
            &MergeOptions::default().without_resampling(),
        )
        .unwrap();
        assert_eq!(
            merged.transform(),
            &GeoTransform::north_up(-176010., 2390250., 10., 10.)
        );
        assert_eq!(
            merged.filled(-1.),
            array![[
                [0., 1., 2., -1.],
                [4., 5., 6., 7.],
                [8., 9., 10., 11.],
                [-1., 13., 14., 15.]
            ]]
        );
    }

    #[rstest]
    fn snaps_bounds_to_first_grid(top_left: Raster, bottom_right: Raster) {
        let bounds = Bounds::new(-175995., 2390215., -175975., 2390235.).unwrap();
        let merged = merge_in_memory(
            &[top_left, bottom_right.clone()],
            &MergeOptions::default()
                .without_resampling()
                .with_bounds(bounds),
        )
        .unwrap();
        assert_eq!(merged.transform(), bottom_right.transform());
        assert_eq!(merged.pixels(), bottom_right.pixels());
        assert_eq!(merged.valid_count(), 9);
    }

    #[rstest]
    fn rejects_unaligned_grids(top_left: Raster) {
        let shifted = raster_3x3(-175999., 2390240., [[1.; 3]; 3]);
        let result = merge_in_memory(
            &[top_left, shifted],
            &MergeOptions::default().without_resampling(),
        );
        assert!(matches!(result, Err(CompositeError::UnalignedGrid)));
    }

    #[rstest]
    fn resamples_unaligned_grids_when_allowed(top_left: Raster) {
        let shifted = raster_3x3(-175999., 2390240., [[1.; 3]; 3]);
        let merged = merge_in_memory(&[top_left, shifted], &MergeOptions::default()).unwrap();
        assert_eq!(merged.band(0)[[0, 0]], 0.);
    }

    #[rstest]
    fn rejects_mixed_crs(top_left: Raster) {
        let other = Raster::from_band(
            Array2::zeros((3, 3)),
            *top_left.transform(),
            "EPSG:32610",
        )
        .unwrap();
        let result = merge_in_memory(&[top_left, other], &MergeOptions::default());
        assert!(matches!(result, Err(CompositeError::CrsMismatch { .. })));
    }

    #[rstest]
    fn rejects_empty_input() {
        let result = merge_in_memory(&[], &MergeOptions::default());
        assert!(matches!(result, Err(CompositeError::EmptySources)));
    }

    #[rstest]
    fn mean_rejects_multi_band(top_left: Raster) {
        let (pixels, _, transform, crs) = top_left.into_parts();
        let stacked = ndarray::concatenate(Axis(0), &[pixels.view(), pixels.view()]).unwrap();
        let two_bands = Raster::from_pixels(stacked, transform, crs).unwrap();
        let result = merge_in_memory(&[two_bands], &MergeOptions::new(MergeMethod::Mean));
        assert!(matches!(
            result,
            Err(CompositeError::MultiBandAggregate { bands: 2 })
        ));
    }

    fn two_band(raster: &Raster) -> Raster {
        let (pixels, _, transform, crs) = raster.clone().into_parts();
        let stacked = ndarray::concatenate(Axis(0), &[pixels.view(), pixels.view()]).unwrap();
        Raster::from_pixels(stacked, transform, crs).unwrap()
    }

    #[rstest]
    fn mean_rejects_multi_band_after_first_source(float_rasters: [Raster; 2]) {
        let rasters = [float_rasters[0].clone(), two_band(&float_rasters[1])];
        let result = merge_in_memory(&rasters, &MergeOptions::new(MergeMethod::Mean));
        assert!(matches!(
            result,
            Err(CompositeError::MultiBandAggregate { bands: 2 })
        ));
    }

    #[rstest]
    fn mean_rejects_output_band_count(float_rasters: [Raster; 2]) {
        let options = MergeOptions::new(MergeMethod::Mean).with_output_band_count(1);
        let result = merge_in_memory(&float_rasters, &options);
        assert!(matches!(result, Err(CompositeError::InvalidConfig(_))));
    }

    #[rstest]
    fn custom_combiner_accumulates_synthetic_bands(float_rasters: [Raster; 2]) {
        let method = MergeMethod::custom(|merged: MergedPixels, new: SourcePixels| {
            SumAndCount.combine(merged, new)
        });
        let options = MergeOptions::new(method).with_output_band_count(2);
        let merged = merge_in_memory(&float_rasters, &options).unwrap();
        assert_eq!(merged.shape(), (2, 2, 2));
        assert_eq!(merged.band(0), array![[10., 3.], [14., 9.]]);
        assert_eq!(merged.band(1), array![[2., 1.], [2., 2.]]);
    }

    #[rstest]
    fn custom_combiner_folds_bands_into_one(float_rasters: [Raster; 2]) {
        let rasters = [two_band(&float_rasters[0]), two_band(&float_rasters[1])];
        let method = MergeMethod::custom(|merged: MergedPixels, new: SourcePixels| {
            let sum = new.data.sum_axis(Axis(0)).insert_axis(Axis(0));
            let valid = new
                .valid
                .map_axis(Axis(0), |bands| bands.iter().all(|valid| *valid))
                .insert_axis(Axis(0));
            let folded = SourcePixels {
                data: sum.view(),
                valid: valid.view(),
            };
            CopyLast.combine(merged, folded)
        });
        let options = MergeOptions::new(method).with_output_band_count(1);
        let merged = merge_in_memory(&rasters, &options).unwrap();
        assert_eq!(merged.shape(), (1, 2, 2));
        assert_eq!(merged.band(0), array![[12., 6.], [18., 8.]]);
    }

    #[rstest]
    fn variance_rejects_multi_band_mean(float_rasters: [Raster; 2]) {
        let (pixels, _, transform, crs) = float_rasters[0].clone().into_parts();
        let stacked = ndarray::concatenate(Axis(0), &[pixels.view(), pixels.view()]).unwrap();
        let mean = Raster::from_pixels(stacked, transform, crs).unwrap();
        let result = MergeEngine::new(&TiffCodec).merge_variance(
            &sources(&float_rasters),
            (&mean).into(),
            None,
        );
        assert!(matches!(
            result,
            Err(CompositeError::MultiBandAggregate { bands: 2 })
        ));
    }

    #[rstest]
    fn custom_combiner(float_rasters: [Raster; 2]) {
        let method = MergeMethod::custom(|mut merged: MergedPixels, new: SourcePixels| {
            Zip::from(&mut merged.data)
                .and(&mut merged.valid)
                .and(&new.data)
                .and(&new.valid)
                .for_each(|value, valid, &new_value, &new_valid| {
                    if new_valid {
                        *value = if *valid { value.max(new_value) * 10. } else { new_value };
                        *valid = true;
                    }
                });
            Ok(())
        });
        let merged = merge_in_memory(&float_rasters, &MergeOptions::new(method)).unwrap();
        assert_eq!(merged.band(0), array![[60., 3.], [90., 50.]]);
    }

    #[rstest]
    #[test_log::test]
    fn overlap_check_warns_once_per_disagreeing_merge(top_left: Raster, bottom_right: Raster) {
        let check = Arc::new(OverlapCheck::default());
        let options = MergeOptions::new(Arc::clone(&check).into()).without_resampling();
        let expected = merge_in_memory(
            &[top_left.clone(), bottom_right.clone()],
            &MergeOptions::default(),
        )
        .unwrap();

        merge_in_memory(&[top_left.clone(), bottom_right.clone()], &options).unwrap();
        assert!(check.warnings().is_empty());

        let (mut pixels, _, transform, crs) = bottom_right.into_parts();
        pixels[[0, 0, 0]] = 42.;
        let disagreeing = Raster::from_pixels(pixels, transform, crs).unwrap();
        let merged = merge_in_memory(&[top_left, disagreeing], &options).unwrap();
        assert_eq!(check.warnings().len(), 1);
        assert_eq!(merged.pixels(), expected.pixels());
        assert_eq!(merged.valid(), expected.valid());
    }

    #[rstest]
    fn merges_from_and_to_files(top_left: Raster, bottom_right: Raster) {
        let dir = TempDir::new().unwrap();
        let paths = [dir.path().join("a.tif"), dir.path().join("b.tif")];
        top_left.save(&paths[0], &TiffCodec).unwrap();
        bottom_right.save(&paths[1], &TiffCodec).unwrap();
        let destination = dir.path().join("merged.tif");

        let sources: Vec<MergeSource> = paths.iter().map(MergeSource::from).collect();
        let merged = MergeEngine::new(&TiffCodec)
            .merge(
                &sources,
                &MergeOptions::new(MergeMethod::Max).write_to(&destination),
            )
            .unwrap();
        assert_eq!(merged.right(), Some(destination.clone()));

        let merged = Raster::from_file(&destination, &TiffCodec).unwrap();
        assert_eq!(merged.shape(), (1, 4, 4));
        assert_eq!(merged.band(0)[[1, 1]], 5.);
        assert_eq!(merged.valid_count(), 14);
    }

    #[rstest]
    fn upsamples_to_requested_resolution() {
        let coarse = Raster::from_band(
            array![[1., 2.], [3., 4.]],
            GeoTransform::north_up(0., 40., 20., 20.),
            "EPSG:5070",
        )
        .unwrap();
        let merged = merge_in_memory(&[coarse], &MergeOptions::default().with_resolution(10.))
            .unwrap();
        assert_eq!(merged.shape(), (1, 4, 4));
        assert_eq!(merged.band(0)[[1, 2]], 2.);
    }
}
