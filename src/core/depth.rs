// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interpretation of raw depth images.

use crate::core::image::Image;
use crate::error::Error;
use crate::misc::type_aliases::{Float, Point2};

/// How raw depth pixels are converted into metric depth.
///
/// It is passed by reference to the components that need it,
/// two trackers can use different depth sensors side by side.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthConfig {
    /// Raw depth units per meter.
    /// This is 5000.0 for the TUM RGB-D dataset 16 bit PNG images.
    pub depth_scale: Float,
    /// Minimum valid depth in meters.
    pub min_depth: Float,
    /// Maximum valid depth in meters.
    pub max_depth: Float,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            depth_scale: 5000.0,
            min_depth: 0.05,
            max_depth: 10.0,
        }
    }
}

impl DepthConfig {
    /// Check that the scale is positive and the range not empty.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.depth_scale > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "depth scale must be > 0 (got {})",
                self.depth_scale
            )));
        }
        if !(self.min_depth >= 0.0 && self.min_depth < self.max_depth) {
            return Err(Error::InvalidConfig(format!(
                "depth range [{}, {}] is empty",
                self.min_depth, self.max_depth
            )));
        }
        Ok(())
    }

    /// Metric depth of a raw depth pixel value.
    /// A value of 0 means that it is unknown.
    pub fn depth_pixel_to_z(&self, pixel: Float) -> Float {
        pixel / self.depth_scale
    }

    /// Raw depth pixel value of a metric depth.
    pub fn z_to_depth_pixel(&self, z: Float) -> Float {
        z * self.depth_scale
    }

    /// Is a metric depth within the valid range.
    pub fn is_valid(&self, z: Float) -> bool {
        z >= self.min_depth && z <= self.max_depth
    }

    /// Metric depth at a floating point position of a raw depth image.
    ///
    /// The four surrounding pixels must all hold a valid depth,
    /// interpolating across missing values would create fake surfaces.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    #[allow(clippy::cast_precision_loss)]
    pub fn interpolate_depth(&self, depth: &Image, position: &Point2) -> Option<Float> {
        let (height, width) = depth.shape();
        let u = position.x.floor();
        let v = position.y.floor();
        if !(u >= 0.0 && v >= 0.0 && u < width as Float && v < height as Float) {
            return None;
        }
        let u_0 = u as usize;
        let v_0 = v as usize;
        // Integer positions on the last row or column do not need a neighbor.
        let u_1 = (u_0 + 1).min(width - 1);
        let v_1 = (v_0 + 1).min(height - 1);
        let a = position.x - u;
        let b = position.y - v;
        if (a > 0.0 && u_1 == u_0) || (b > 0.0 && v_1 == v_0) {
            return None;
        }
        let z = |row: usize, col: usize| {
            let z = self.depth_pixel_to_z(depth[(row, col)]);
            Some(z).filter(|&z| self.is_valid(z))
        };
        let z_00 = z(v_0, u_0)?;
        let z_10 = z(v_1, u_0)?;
        let z_01 = z(v_0, u_1)?;
        let z_11 = z(v_1, u_1)?;
        Some((1.0 - b) * (1.0 - a) * z_00 + b * (1.0 - a) * z_10 + (1.0 - b) * a * z_01 + b * a * z_11)
    }
}

// TESTS #############################################################
