// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Convolution and gradients of float images.

use crate::core::image::Image;
use crate::misc::type_aliases::Float;

/// Horizontal centered difference kernel `[-0.5, 0, 0.5]`.
pub fn kernel_x() -> Image {
    Image::from_row_slice(1, 3, &[-0.5, 0.0, 0.5])
}

/// Vertical centered difference kernel, transpose of `kernel_x`.
pub fn kernel_y() -> Image {
    kernel_x().transpose()
}

/// Filter an image with a kernel of odd dimensions centered on each pixel.
///
/// The kernel is applied as is (correlation, no flipping),
/// so `kernel_x` computes `(I(x+1) - I(x-1)) / 2`.
/// Pixels outside of the image are replaced by the closest border pixel.
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_sign_loss)]
pub fn convolve(image: &Image, kernel: &Image) -> Image {
    let (nrows, ncols) = image.shape();
    let (krows, kcols) = kernel.shape();
    assert!(krows % 2 == 1 && kcols % 2 == 1, "Kernel dimensions must be odd");
    let (half_r, half_c) = ((krows / 2) as isize, (kcols / 2) as isize);
    let clamp = |x: isize, max: usize| x.max(0).min(max as isize - 1) as usize;
    Image::from_fn(nrows, ncols, |i, j| {
        let mut acc: Float = 0.0;
        for ki in 0..krows {
            let ii = clamp(i as isize + ki as isize - half_r, nrows);
            for kj in 0..kcols {
                let jj = clamp(j as isize + kj as isize - half_c, ncols);
                acc += kernel[(ki, kj)] * image[(ii, jj)];
            }
        }
        acc
    })
}

/// Horizontal and vertical centered gradients of an image.
pub fn centered(image: &Image) -> (Image, Image) {
    (convolve(image, &kernel_x()), convolve(image, &kernel_y()))
}

/// Compute the squared norm of a gradient.
pub fn squared_norm(gx: &Image, gy: &Image) -> Image {
    gx.zip_map(gy, |x, y| x * x + y * y)
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;

    #[test]
    fn gradients_of_a_plane() {
        let plane = Image::from_fn(6, 8, |i, j| 0.25 * j as Float - 0.5 * i as Float);
        let (gx, gy) = centered(&plane);
        // Interior pixels see the exact slope, borders are halved by clamping.
        approx::assert_relative_eq!(gx[(3, 4)], 0.25, epsilon = 1e-12);
        approx::assert_relative_eq!(gy[(3, 4)], -0.5, epsilon = 1e-12);
        approx::assert_relative_eq!(gx[(3, 0)], 0.125, epsilon = 1e-12);
        let norm = squared_norm(&gx, &gy);
        approx::assert_relative_eq!(norm[(2, 2)], 0.3125, epsilon = 1e-12);
    }

    #[test]
    fn identity_kernel_keeps_the_image() {
        let img = Image::from_fn(4, 5, |i, j| (i * 5 + j) as Float);
        let identity = Image::from_row_slice(3, 3, &[0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(convolve(&img, &identity), img);
    }
}
