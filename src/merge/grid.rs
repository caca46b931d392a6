use ndarray::{s, Array3, ArrayView3};
use std::{ops::Range, sync::Arc};

use crate::{
    components::{bounds::Bounds, raster::Raster, transforms::GeoTransform},
    errors::Result,
    merge::methods::{MergedPixels, SourcePixels},
};

/// Target grid of a merge.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OutputGrid {
    pub transform: GeoTransform,
    pub height: usize,
    pub width: usize,
    pub crs: Arc<str>,
}

impl OutputGrid {
    /// Grid with its top left corner at the top left of `bounds`, sized to
    /// the nearest whole number of pixels.
    pub fn covering(bounds: &Bounds, resolution: (f64, f64), crs: Arc<str>) -> Self {
        let (xres, yres) = resolution;
        let width = ((bounds.width() / xres).round() as usize).max(1);
        let height = ((bounds.height() / yres).round() as usize).max(1);
        Self {
            transform: GeoTransform::north_up(bounds.left(), bounds.top(), xres, yres),
            height,
            width,
            crs,
        }
    }

    pub fn of(raster: &Raster) -> Self {
        Self {
            transform: *raster.transform(),
            height: raster.height(),
            width: raster.width(),
            crs: Arc::from(raster.crs()),
        }
    }

    /// Source pixel index sampled by each output pixel centre along one
    /// axis, or `None` where the centre falls outside the source.
    fn sample_indices(
        output_origin: f64,
        output_res: f64,
        source_origin: f64,
        source_res: f64,
        source_len: usize,
        output_len: usize,
    ) -> (Range<usize>, Vec<usize>) {
        let source_index = |output_index: usize| {
            let centre = output_origin + (output_index as f64 + 0.5) * output_res;
            let index = ((centre - source_origin) / source_res).floor();
            (index >= 0. && index < source_len as f64).then_some(index as usize)
        };

        // Pixel centres are monotonic along an axis, so the covered outputs
        // form one contiguous run.
        let first = (0..output_len).find(|index| source_index(*index).is_some());
        let Some(first) = first else {
            return (0..0, Vec::new());
        };
        let indices: Vec<usize> = (first..output_len).map_while(source_index).collect();
        (first..first + indices.len(), indices)
    }

    /// Sample the first `band_count` bands of `raster` onto the part of this
    /// grid it covers.
    ///
    /// Each output pixel takes the source pixel containing its centre. Returns
    /// `None` when the raster does not cover any output pixel centre.
    pub fn place(&self, raster: &Raster, band_count: usize) -> Option<Placement> {
        let source = raster.transform();
        let (xres, yres) = self.transform.resolution();
        let (source_xres, source_yres) = source.resolution();

        let (cols, source_cols) = Self::sample_indices(
            self.transform.xoff(),
            xres,
            source.xoff(),
            source_xres,
            raster.width(),
            self.width,
        );
        // Rows run downwards, so measure from the top edge.
        let (rows, source_rows) = Self::sample_indices(
            -self.transform.yoff(),
            yres,
            -source.yoff(),
            source_yres,
            raster.height(),
            self.height,
        );
        if cols.is_empty() || rows.is_empty() {
            return None;
        }

        let shape = (band_count.min(raster.band_count()), rows.len(), cols.len());
        let pixels = raster.pixels();
        let valid = raster.valid();
        let data = Array3::from_shape_fn(shape, |(band, row, col)| {
            pixels[[band, source_rows[row], source_cols[col]]]
        });
        let valid = Array3::from_shape_fn(shape, |(band, row, col)| {
            valid[[band, source_rows[row], source_cols[col]]]
        });
        Some(Placement {
            rows,
            cols,
            data,
            valid,
        })
    }
}

/// A source resampled onto a window of the output grid.
pub(crate) struct Placement {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
    pub data: Array3<f64>,
    pub valid: Array3<bool>,
}

impl Placement {
    pub fn pixels(&self) -> SourcePixels<'_> {
        SourcePixels {
            data: self.data.view(),
            valid: self.valid.view(),
        }
    }
}

/// Output pixels being merged into, all masked until a source fills them.
pub(crate) struct Accumulator {
    data: Array3<f64>,
    valid: Array3<bool>,
}

impl Accumulator {
    pub fn new(band_count: usize, grid: &OutputGrid) -> Self {
        let shape = (band_count, grid.height, grid.width);
        Self {
            data: Array3::zeros(shape),
            valid: Array3::from_elem(shape, false),
        }
    }

    pub fn window(&mut self, placement: &Placement) -> MergedPixels<'_> {
        let window = s![.., placement.rows.clone(), placement.cols.clone()];
        MergedPixels {
            data: self.data.slice_mut(window),
            valid: self.valid.slice_mut(window),
        }
    }

    pub fn view(&self) -> (ArrayView3<'_, f64>, ArrayView3<'_, bool>) {
        (self.data.view(), self.valid.view())
    }

    pub fn into_raster(self, grid: OutputGrid) -> Result<Raster> {
        Raster::new(self.data, self.valid, grid.transform, grid.crs)
    }
}
