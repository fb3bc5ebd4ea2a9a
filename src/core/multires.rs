// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Multi-resolution images, each level half the resolution of the previous one.

use nalgebra::{DMatrix, Scalar};

use crate::core::gradient;
use crate::core::image::Image;
use crate::error::Error;
use crate::misc::type_aliases::Float;

/// Type alias to easily spot vectors that are indexed over multi-resolution levels.
/// Index 0 is the finest resolution.
pub type Levels<T> = Vec<T>;

/// Pyramid of float images built by 2x2 block averaging.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePyramid {
    octaves: usize,
    levels: Levels<Image>,
}

impl ImagePyramid {
    /// An empty pyramid that will hold `octaves` levels once updated.
    pub fn new(octaves: usize) -> Self {
        Self {
            octaves,
            levels: Vec::with_capacity(octaves),
        }
    }

    /// Build the pyramid of an image directly.
    pub fn from_image(octaves: usize, image: Image) -> Result<Self, Error> {
        let mut pyramid = Self::new(octaves);
        pyramid.update(image)?;
        Ok(pyramid)
    }

    /// Replace the content of the pyramid with the levels of a new image.
    pub fn update(&mut self, image: Image) -> Result<(), Error> {
        let (rows, cols) = image.shape();
        let levels = limited_sequence(self.octaves, image, |m| halve(m, mean_2x2));
        if self.octaves == 0 || levels.len() < self.octaves {
            return Err(Error::DegeneratePyramid {
                octaves: self.octaves,
                rows,
                cols,
            });
        }
        self.levels = levels;
        Ok(())
    }

    /// Number of levels of the pyramid.
    pub fn octaves(&self) -> usize {
        self.octaves
    }

    /// Resolution ratio between two consecutive levels.
    pub fn scale_factor(&self) -> Float {
        0.5
    }

    /// Image at a given level, 0 being the finest.
    /// Panics if the pyramid was never updated.
    pub fn level(&self, level: usize) -> &Image {
        &self.levels[level]
    }

    /// `true` until the first successful `update`.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Iterate over levels, finest first.
    pub fn iter(&self) -> impl Iterator<Item = &Image> {
        self.levels.iter()
    }

    /// Filter every level with the same kernel.
    pub fn convolve(&self, kernel: &Image) -> Self {
        Self {
            octaves: self.octaves,
            levels: self
                .levels
                .iter()
                .map(|img| gradient::convolve(img, kernel))
                .collect(),
        }
    }
}

/// Mean of a 2x2 block.
fn mean_2x2(a: Float, b: Float, c: Float, d: Float) -> Float {
    0.25 * (a + b + c + d)
}

/// Recursively apply a function transforming the image
/// until it's not possible anymore or the max number of iterations is reached.
/// Using iterations = 0 has the same effect than iterations = 1 since it always has
/// at least one matrix (the init matrix).
pub fn limited_sequence<F, T>(iterations: usize, mat: DMatrix<T>, f: F) -> Vec<DMatrix<T>>
where
    F: Fn(&DMatrix<T>) -> Option<DMatrix<T>>,
    T: Scalar,
{
    let mut pyr = vec![mat];
    while pyr.len() < iterations {
        match pyr.last().and_then(|m| f(m)) {
            Some(new_mat) => pyr.push(new_mat),
            None => break,
        }
    }
    pyr
}

/// Halve the resolution of a matrix by applying a function to each 2x2 block.
/// If one size of the matrix is < 2 then this function returns None.
/// If one size is odd, its last line/column is dropped.
///
/// The block is of the form:
///   a c
///   b d
pub fn halve<F, T, U>(mat: &DMatrix<T>, f: F) -> Option<DMatrix<U>>
where
    F: Fn(T, T, T, T) -> U,
    T: Scalar + Copy,
    U: Scalar,
{
    let (r, c) = mat.shape();
    let half_r = r / 2;
    let half_c = c / 2;
    if half_r == 0 || half_c == 0 {
        None
    } else {
        let half_mat = DMatrix::<U>::from_fn(half_r, half_c, |i, j| {
            let a = mat[(2 * i, 2 * j)];
            let b = mat[(2 * i + 1, 2 * j)];
            let c = mat[(2 * i, 2 * j + 1)];
            let d = mat[(2 * i + 1, 2 * j + 1)];
            f(a, b, c, d)
        });
        Some(half_mat)
    }
}

// TESTS #############################################################
