// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Single channel floating point images.
//!
//! Images are matrices indexed by `(row, column)`, i.e. `(y, x)`.

use nalgebra::{DMatrix, Scalar};
use num_traits::AsPrimitive;

use crate::error::Error;
use crate::misc::type_aliases::{Float, Point2};

/// A single channel image of floating point values.
pub type Image = DMatrix<Float>;

/// Convert an image of any primitive pixel type into a float image,
/// multiplying every value by `scale`.
///
/// Use `1.0 / 255.0` to bring `u8` intensities into `[0, 1]`,
/// and `1.0` to keep raw depth values.
pub fn from_pixels<T>(mat: &DMatrix<T>, scale: Float) -> Image
where
    T: Scalar + AsPrimitive<Float>,
{
    mat.map(|x| scale * x.as_())
}

/// Check that an image has the expected `(rows, cols)` shape.
pub fn check_shape(what: &'static str, image: &Image, expected: (usize, usize)) -> Result<(), Error> {
    let actual = image.shape();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            what,
            expected,
            actual,
        })
    }
}

/// Bilinear interpolation of a pixel with floating point coordinates.
/// Return `None` if the point is outside of the image boundaries
/// or if the value is not finite.
#[allow(clippy::many_single_char_names)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
pub fn interpolate(image: &Image, position: &Point2) -> Option<Float> {
    let (height, width) = image.shape();
    let (x, y) = (position.x, position.y);
    let u = x.floor();
    let v = y.floor();
    if u >= 0.0 && u + 1.0 < width as Float && v >= 0.0 && v + 1.0 < height as Float {
        let u_0 = u as usize;
        let v_0 = v as usize;
        let u_1 = u_0 + 1;
        let v_1 = v_0 + 1;
        let vu_00 = image[(v_0, u_0)];
        let vu_10 = image[(v_1, u_0)];
        let vu_01 = image[(v_0, u_1)];
        let vu_11 = image[(v_1, u_1)];
        let a = x - u;
        let b = y - v;
        let value = (1.0 - b) * (1.0 - a) * vu_00
            + b * (1.0 - a) * vu_10
            + (1.0 - b) * a * vu_01
            + b * a * vu_11;
        Some(value).filter(|v| v.is_finite())
    } else {
        None
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;

    #[test]
    fn interpolate_on_a_ramp_is_exact() {
        let ramp = Image::from_fn(5, 7, |i, j| 2.0 * j as Float + 0.5 * i as Float);
        let value = interpolate(&ramp, &Point2::new(3.25, 1.5)).unwrap();
        approx::assert_relative_eq!(value, 6.5 + 0.75, epsilon = 1e-12);
    }

    #[test]
    fn interpolate_at_integer_coordinates_reads_the_pixel() {
        let img = Image::from_fn(4, 4, |i, j| (10 * i + j) as Float);
        assert_eq!(interpolate(&img, &Point2::new(2.0, 1.0)), Some(12.0));
    }

    #[test]
    fn interpolate_outside_is_none() {
        let img = Image::repeat(4, 6, 1.0);
        assert_eq!(interpolate(&img, &Point2::new(-0.1, 1.0)), None);
        assert_eq!(interpolate(&img, &Point2::new(5.0, 1.0)), None);
        assert_eq!(interpolate(&img, &Point2::new(1.0, 3.2)), None);
        assert!(interpolate(&img, &Point2::new(4.99, 2.99)).is_some());
    }

    #[test]
    fn from_pixels_scales_values() {
        let mat = DMatrix::from_row_slice(1, 2, &[0_u8, 255]);
        let img = from_pixels(&mat, 1.0 / 255.0);
        assert_eq!(img[(0, 1)], 1.0);
        assert_eq!(img[(0, 0)], 0.0);
    }

    #[test]
    fn check_shape_reports_mismatch() {
        let img = Image::zeros(3, 4);
        assert!(check_shape("gray", &img, (3, 4)).is_ok());
        assert_eq!(
            check_shape("gray", &img, (4, 3)),
            Err(Error::ShapeMismatch {
                what: "gray",
                expected: (4, 3),
                actual: (3, 4),
            })
        );
    }
}
