//! Decide whether rasters share one sampling grid, so they can be combined
//! pixel for pixel without resampling.
//!
//! Both checks measure disagreement in pixels of the first grid:
//! [`PIXEL_TOLERANCE`] of a pixel is about 10 cm (roughly 1e-6 degrees) on
//! a grid of ~10 m pixels, and 1 cm on a grid of 1 m pixels. Resolutions
//! must agree to [`RESOLUTION_TOLERANCE`], which on degree-scale grids is
//! about 1 cm of drift per pixel.

use crate::components::{bounds::Bounds, transforms::GeoTransform};

/// Largest tolerated grid phase or extent disagreement, in pixels.
pub const PIXEL_TOLERANCE: f64 = 0.01;

/// Largest tolerated relative resolution disagreement.
pub const RESOLUTION_TOLERANCE: f64 = 1e-7;

/// Distance between two phases in `[0, 1)`, wrapping around.
fn phase_distance(lhs: f64, rhs: f64) -> f64 {
    let distance = (lhs - rhs).abs();
    distance.min(1. - distance)
}

fn resolutions_match(lhs: f64, rhs: f64) -> bool {
    (lhs - rhs).abs() <= RESOLUTION_TOLERANCE * lhs.abs().max(rhs.abs())
}

/// Whether `transforms` describe the same grid, judged from resolution and
/// grid offset alone.
///
/// Grid offsets are compared relative to the first grid: the other origin
/// must fall on a pixel edge of the first grid. Comparing each origin's own
/// phase would scale resolution noise by the origin's distance from zero.
pub fn aligned_transforms<'a>(transforms: impl IntoIterator<Item = &'a GeoTransform>) -> bool {
    let mut transforms = transforms.into_iter();
    let Some(first) = transforms.next() else {
        return true;
    };
    let (xres, yres) = first.resolution();

    transforms.all(|transform| {
        let (other_xres, other_yres) = transform.resolution();
        let (row, col) = first.rowcol(transform.xoff(), transform.yoff());
        resolutions_match(xres, other_xres)
            && resolutions_match(yres, other_yres)
            && phase_distance(0., col.rem_euclid(1.)) <= PIXEL_TOLERANCE
            && phase_distance(0., row.rem_euclid(1.)) <= PIXEL_TOLERANCE
    })
}

/// Whether `transforms` describe the same grid over `bounds`.
///
/// Each grid must place the window covering `bounds` at the same sub-pixel
/// offset and with the same extent in pixels.
pub fn aligned_pixel_grids<'a>(
    bounds: &Bounds,
    transforms: impl IntoIterator<Item = &'a GeoTransform>,
) -> bool {
    let mut windows = transforms
        .into_iter()
        .map(|transform| transform.window(bounds));
    let Some(first) = windows.next() else {
        return true;
    };
    let (col_phase, row_phase) = first.fractional_offset();

    windows.all(|window| {
        let (other_col_phase, other_row_phase) = window.fractional_offset();
        phase_distance(col_phase, other_col_phase) <= PIXEL_TOLERANCE
            && phase_distance(row_phase, other_row_phase) <= PIXEL_TOLERANCE
            && (first.width - window.width).abs() <= PIXEL_TOLERANCE
            && (first.height - window.height).abs() <= PIXEL_TOLERANCE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn perturbed(transform: &GeoTransform, dres: f64, dxoff: f64) -> GeoTransform {
        GeoTransform::new(
            transform.a() + dres,
            transform.b(),
            transform.xoff() + dxoff,
            transform.d(),
            transform.e(),
            transform.yoff(),
        )
    }

    #[rstest]
    #[case::exact(0., 0., true)]
    #[case::slightly_different_resolution(1e-12, 0., true)]
    #[case::slightly_different_offset(0., 1e-7, true)]
    #[case::different_resolution(1e-8, 0., false)]
    #[case::different_offset(0., 5e-5, false)]
    fn aligned_over_bounds(
        bounds: Bounds,
        transform: GeoTransform,
        #[case] dres: f64,
        #[case] dxoff: f64,
        #[case] expected: bool,
    ) {
        let other = perturbed(&transform, dres, dxoff);
        assert_eq!(aligned_pixel_grids(&bounds, [&transform, &other]), expected);
    }

    #[rstest]
    #[case::exact(0., 0., true)]
    #[case::slightly_different_resolution(1e-12, 0., true)]
    #[case::slightly_different_offset(0., 1e-7, true)]
    #[case::different_resolution(1e-8, 0., false)]
    #[case::different_offset(0., 5e-5, false)]
    fn aligned_from_transforms(
        transform: GeoTransform,
        #[case] dres: f64,
        #[case] dxoff: f64,
        #[case] expected: bool,
    ) {
        let other = perturbed(&transform, dres, dxoff);
        assert_eq!(aligned_transforms([&transform, &other]), expected);
    }

    #[rstest]
    fn whole_pixel_shifts_stay_aligned() {
        let transform = GeoTransform::north_up(-176010., 2390250., 10., 10.);
        let shifted = transform.with_origin(-176000., 2390240.);
        let bounds = Bounds::new(-176010., 2390210., -175970., 2390250.).unwrap();
        assert!(aligned_transforms([&transform, &shifted]));
        assert!(aligned_pixel_grids(&bounds, [&transform, &shifted]));
    }

    #[rstest]
    fn sub_pixel_shift_is_unaligned() {
        let transform = GeoTransform::north_up(-176010., 2390250., 10., 10.);
        let shifted = transform.with_origin(-176009., 2390251.);
        let bounds = Bounds::new(-176010., 2390210., -175970., 2390251.).unwrap();
        assert!(!aligned_transforms([&transform, &shifted]));
        assert!(!aligned_pixel_grids(&bounds, [&transform, &shifted]));
    }

    #[rstest]
    #[case::half_tolerance(PIXEL_TOLERANCE / 2., true)]
    #[case::twice_tolerance(PIXEL_TOLERANCE * 2., false)]
    fn offset_tolerance_is_measured_in_pixels(#[case] shift_in_pixels: f64, #[case] expected: bool) {
        let transform = GeoTransform::north_up(500_000., 4_000_060., 10., 10.);
        // 10 m pixels: the tolerance is 10 cm on the ground.
        let shifted = transform.with_origin(500_000. + shift_in_pixels * 10., 4_000_060.);
        let bounds = Bounds::new(500_000., 4_000_000., 500_060., 4_000_060.).unwrap();
        assert_eq!(aligned_transforms([&transform, &shifted]), expected);
        assert_eq!(aligned_pixel_grids(&bounds, [&transform, &shifted]), expected);
    }

    #[rstest]
    fn phases_wrap_around() {
        let transform = GeoTransform::north_up(0., 0., 10., 10.);
        let nearly_whole_pixel = transform.with_origin(9.9999, 0.);
        assert!(aligned_transforms([&transform, &nearly_whole_pixel]));
    }

    #[rstest]
    fn single_grid_is_aligned(transform: GeoTransform, bounds: Bounds) {
        assert!(aligned_transforms([&transform]));
        assert!(aligned_pixel_grids(&bounds, [&transform]));
    }
}
