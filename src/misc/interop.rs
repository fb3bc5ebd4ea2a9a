// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interoperability conversions between the image and matrix types.

use image::GrayImage;
use nalgebra::DMatrix;

use crate::core::image::Image;

/// Convert a `GrayImage` into an `u8` matrix.
///
/// The row major image buffer becomes a column major matrix.
pub fn matrix_from_image(img: GrayImage) -> DMatrix<u8> {
    let (width, height) = img.dimensions();
    DMatrix::from_row_slice(height as usize, width as usize, &img.into_raw())
}

/// Intensities of an `u8` matrix brought into `[0, 1]`.
pub fn normalized_intensities(mat: &DMatrix<u8>) -> Image {
    crate::core::image::from_pixels(mat, 1.0 / 255.0)
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use image::Luma;

    #[test]
    fn image_rows_become_matrix_rows() {
        let img = GrayImage::from_fn(5, 3, |x, y| Luma([(10 * y + x) as u8]));
        let mat = matrix_from_image(img);
        assert_eq!(mat.shape(), (3, 5));
        assert_eq!(mat[(2, 4)], 24);
        assert_eq!(mat[(1, 0)], 10);
    }

    #[test]
    fn intensities_are_normalized() {
        let mat = DMatrix::from_row_slice(1, 3, &[0_u8, 51, 255]);
        let img = normalized_intensities(&mat);
        assert_eq!(img[(0, 0)], 0.0);
        assert!((img[(0, 1)] - 0.2).abs() < 1e-12);
        assert!((img[(0, 2)] - 1.0).abs() < 1e-12);
    }
}
