use geo::{AffineTransform, Coord};
use shrinkwraprs::Shrinkwrap;

use crate::components::bounds::Bounds;

/// Affine map from pixel `(col, row)` to world `(x, y)`.
///
/// Coefficients follow the `(xres, xskew, xoff, yskew, yres, yoff)` order.
/// Grids are assumed axis-aligned and north-up, so `yres` is negative.
#[derive(Shrinkwrap, Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(AffineTransform);

impl GeoTransform {
    pub fn new(xres: f64, xskew: f64, xoff: f64, yskew: f64, yres: f64, yoff: f64) -> Self {
        Self(AffineTransform::new(xres, xskew, xoff, yskew, yres, yoff))
    }

    /// North-up transform with the top left corner at `(xoff, yoff)`.
    pub fn north_up(xoff: f64, yoff: f64, xres: f64, yres: f64) -> Self {
        Self::new(xres, 0., xoff, 0., -yres, yoff)
    }

    /// From GDAL ordering `[xoff, xres, xskew, yoff, yskew, yres]`.
    pub fn from_gdal(gdal_transform: [f64; 6]) -> Self {
        Self::new(
            gdal_transform[1],
            gdal_transform[2],
            gdal_transform[0],
            gdal_transform[4],
            gdal_transform[5],
            gdal_transform[3],
        )
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.xoff(),
            self.a(),
            self.b(),
            self.yoff(),
            self.d(),
            self.e(),
        ]
    }

    /// `(x, y)` resolution, both positive for north-up grids.
    pub fn resolution(&self) -> (f64, f64) {
        (self.a(), -self.e())
    }

    /// Sub-pixel phase of the origin on a grid of this transform's resolution.
    ///
    /// A resolution of `(10, 10)` with an origin at `(16, 10)` has a grid
    /// offset of `(6, 0)`.
    pub fn grid_offset(&self) -> (f64, f64) {
        let (xres, yres) = self.resolution();
        (self.xoff().rem_euclid(xres), self.yoff().rem_euclid(yres))
    }

    /// Fractional `(row, col)` of a world coordinate.
    pub fn rowcol(&self, x: f64, y: f64) -> (f64, f64) {
        ((y - self.yoff()) / self.e(), (x - self.xoff()) / self.a())
    }

    /// World coordinate of the top left corner of pixel `(row, col)`.
    pub fn xy(&self, row: f64, col: f64) -> (f64, f64) {
        let Coord { x, y } = self.apply(Coord { x: col, y: row });
        (x, y)
    }

    /// Bounds covered by a `height` x `width` pixel array on this grid.
    pub fn bounds(&self, height: usize, width: usize) -> Bounds {
        let (left, top) = self.xy(0., 0.);
        let (right, bottom) = self.xy(height as f64, width as f64);
        Bounds::from_corners((left, bottom), (right, top))
    }

    /// Same resolution, translated to a new top left corner.
    pub fn with_origin(&self, xoff: f64, yoff: f64) -> Self {
        Self::new(self.a(), self.b(), xoff, self.d(), self.e(), yoff)
    }

    /// Same origin, new resolution.
    pub fn with_resolution(&self, xres: f64, yres: f64) -> Self {
        Self::new(xres, self.b(), self.xoff(), self.d(), -yres, self.yoff())
    }

    /// Fractional pixel window that `bounds` covers on this grid.
    pub fn window(&self, bounds: &Bounds) -> Window {
        let (row_off, col_off) = self.rowcol(bounds.left(), bounds.top());
        let (row_end, col_end) = self.rowcol(bounds.right(), bounds.bottom());
        Window {
            col_off,
            row_off,
            width: col_end - col_off,
            height: row_end - row_off,
        }
    }
}

/// Fractional pixel window, offsets relative to a grid's origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub col_off: f64,
    pub row_off: f64,
    pub width: f64,
    pub height: f64,
}

impl Window {
    /// Sub-pixel part of the offsets, in `[0, 1)`.
    pub fn fractional_offset(&self) -> (f64, f64) {
        (self.col_off.rem_euclid(1.), self.row_off.rem_euclid(1.))
    }
}
