use geo::{Coord, Polygon, Rect};
use shrinkwraprs::Shrinkwrap;

use crate::{
    components::transforms::GeoTransform,
    errors::{CompositeError, Result},
};

/// Relative tolerance under which a pixel coordinate counts as lying on a
/// pixel boundary.
const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// World-space bounding box `(left, bottom, right, top)` with non-zero area.
#[derive(Shrinkwrap, Debug, Clone, Copy, PartialEq)]
pub struct Bounds(Rect<f64>);

impl Bounds {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Result<Self> {
        let finite = [left, bottom, right, top].iter().all(|v| v.is_finite());
        if !finite || right <= left || top <= bottom {
            return Err(CompositeError::InvalidBounds {
                left,
                bottom,
                right,
                top,
            });
        }
        Ok(Self::from_corners((left, bottom), (right, top)))
    }

    pub(crate) fn from_corners(min: (f64, f64), max: (f64, f64)) -> Self {
        Self(Rect::new(Coord::from(min), Coord::from(max)))
    }

    pub fn left(&self) -> f64 {
        self.0.min().x
    }

    pub fn bottom(&self) -> f64 {
        self.0.min().y
    }

    pub fn right(&self) -> f64 {
        self.0.max().x
    }

    pub fn top(&self) -> f64 {
        self.0.max().y
    }

    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.left(), self.bottom(), self.right(), self.top())
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Self::from_corners(
            (
                self.left().min(other.left()),
                self.bottom().min(other.bottom()),
            ),
            (self.right().max(other.right()), self.top().max(other.top())),
        )
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        self.left() <= other.left()
            && self.bottom() <= other.bottom()
            && self.right() >= other.right()
            && self.top() >= other.top()
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        self.0.to_polygon()
    }
}

impl TryFrom<(f64, f64, f64, f64)> for Bounds {
    type Error = CompositeError;

    fn try_from(value: (f64, f64, f64, f64)) -> Result<Self> {
        let (left, bottom, right, top) = value;
        Bounds::new(left, bottom, right, top)
    }
}

impl TryFrom<Rect<f64>> for Bounds {
    type Error = CompositeError;

    fn try_from(value: Rect<f64>) -> Result<Self> {
        Bounds::new(value.min().x, value.min().y, value.max().x, value.max().y)
    }
}

/// Expand `bounds` outward to the pixel grid of `transform`.
///
/// Left and top snap down to the enclosing pixel edge, right and bottom snap
/// up. A coordinate within floating point noise of a pixel edge snaps to
/// that edge instead of the next one out.
pub fn align_bounds_to_transform(bounds: &Bounds, transform: &GeoTransform) -> Result<Bounds> {
    let (top_row, left_col) = transform.rowcol(bounds.left(), bounds.top());
    let (bottom_row, right_col) = transform.rowcol(bounds.right(), bounds.bottom());

    let (left, top) = transform.xy(floor_unless_close(top_row), floor_unless_close(left_col));
    let (right, bottom) = transform.xy(ceil_unless_close(bottom_row), ceil_unless_close(right_col));
    Bounds::new(left, bottom, right, top)
}

fn is_close(number: f64, boundary: f64) -> bool {
    (number - boundary).abs() <= BOUNDARY_TOLERANCE * number.abs().max(boundary.abs()).max(1.)
}

pub(crate) fn floor_unless_close(number: f64) -> f64 {
    let ceil = number.ceil();
    if is_close(number, ceil) {
        ceil
    } else {
        number.floor()
    }
}

pub(crate) fn ceil_unless_close(number: f64) -> f64 {
    let floor = number.floor();
    if is_close(number, floor) {
        floor
    } else {
        number.ceil()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn bounds() -> Bounds {
        Bounds::new(
            -87.70684656839217,
            41.90305914410823,
            -87.69698317121978,
            41.91004667088552,
        )
        .unwrap()
    }

    #[fixture]
    fn transform() -> GeoTransform {
        GeoTransform::new(
            9.25925927753796e-05,
            0.0,
            -88.00055555649311,
            0.0,
            -9.259259269219641e-05,
            42.00055555599499,
        )
    }

    #[rstest]
    fn aligned_bounds_contain_input(bounds: Bounds, transform: GeoTransform) {
        let aligned = align_bounds_to_transform(&bounds, &transform).unwrap();

        assert!(aligned.left() < bounds.left());
        assert!(aligned.bottom() < bounds.bottom());
        assert!(aligned.right() > bounds.right());
        assert!(aligned.top() > bounds.top());
        assert!(aligned.contains(&bounds));
    }

    #[rstest]
    fn aligned_bounds_sit_on_pixel_edges(bounds: Bounds, transform: GeoTransform) {
        let aligned = align_bounds_to_transform(&bounds, &transform).unwrap();

        let (top_row, left_col) = transform.rowcol(aligned.left(), aligned.top());
        let (bottom_row, right_col) = transform.rowcol(aligned.right(), aligned.bottom());
        for pixel_coordinate in [top_row, left_col, bottom_row, right_col] {
            assert_relative_eq!(
                pixel_coordinate,
                pixel_coordinate.round(),
                max_relative = 1e-9
            );
        }
    }

    #[rstest]
    fn realigning_is_idempotent(bounds: Bounds, transform: GeoTransform) {
        let aligned = align_bounds_to_transform(&bounds, &transform).unwrap();
        let realigned = align_bounds_to_transform(&aligned, &transform).unwrap();
        assert_eq!(aligned, realigned);
    }

    #[rstest]
    fn snaps_to_enclosing_cells() {
        let transform = GeoTransform::north_up(-176010., 2390250., 10., 10.);
        let bounds = Bounds::new(-175995., 2390215., -175975., 2390235.).unwrap();
        let aligned = align_bounds_to_transform(&bounds, &transform).unwrap();
        assert_eq!(
            aligned.as_tuple(),
            (-176000., 2390210., -175970., 2390240.)
        );
    }

    #[rstest]
    fn rounding_noise_does_not_inflate() {
        let transform = GeoTransform::north_up(0., 100., 10., 10.);
        let bounds = Bounds::new(10. - 1e-12, 50. + 1e-12, 40. + 1e-12, 90. - 1e-12).unwrap();
        let aligned = align_bounds_to_transform(&bounds, &transform).unwrap();
        assert_eq!(aligned.as_tuple(), (10., 50., 40., 90.));
    }

    #[rstest]
    #[case((0., 0., 0., 10.))]
    #[case((0., 10., 10., 10.))]
    #[case((10., 0., 0., 10.))]
    #[case((0., 0., f64::NAN, 10.))]
    fn degenerate_bounds_are_rejected(#[case] bounds: (f64, f64, f64, f64)) {
        assert!(matches!(
            Bounds::try_from(bounds),
            Err(CompositeError::InvalidBounds { .. })
        ));
    }
}
