// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synthetic RGB-D frames of a textured room, rendered by ray casting.
//!
//! The camera is expected inside the room.
//! Walls carry a smooth texture defined on world coordinates,
//! so intensity and depth are continuous across the room corners.

use rand::Rng;

use crate::core::camera::Intrinsics;
use crate::core::depth::DepthConfig;
use crate::core::image::Image;
use crate::misc::type_aliases::{Float, Iso3, Point2, Point3, Vec3};

/// Axis aligned box seen from the inside.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    /// Corner with the lowest coordinates.
    pub min: Point3,
    /// Corner with the highest coordinates.
    pub max: Point3,
    /// Spatial period (meters) of the wall texture.
    pub wavelength: Float,
}

impl Default for Room {
    /// A camera at the origin looking at `+z` sees the back wall
    /// and the four surrounding walls.
    fn default() -> Self {
        Self {
            min: Point3::new(-1.0, -0.8, -1.0),
            max: Point3::new(1.0, 0.8, 2.5),
            wavelength: 0.5,
        }
    }
}

impl Room {
    /// Texture intensity, within `[0.2, 0.8]`, of a point on the walls.
    pub fn intensity(&self, point: &Point3) -> Float {
        let k = 2.0 * std::f64::consts::PI / self.wavelength;
        let (x, y, z) = (point.x, point.y, point.z);
        0.5 + 0.1 * (k * (x + 0.3 * y)).sin()
            + 0.1 * (k * (y + 0.2 * z) + 0.4).sin()
            + 0.1 * (k * (z + 0.4 * x) + 1.1).sin()
    }

    /// Distance `t` along `direction` to the walls from a point inside the room.
    pub fn cast(&self, origin: &Point3, direction: &Vec3) -> Option<Float> {
        (0..3)
            .filter_map(|axis| {
                let d = direction[axis];
                if d > 0.0 {
                    Some((self.max[axis] - origin[axis]) / d)
                } else if d < 0.0 {
                    Some((self.min[axis] - origin[axis]) / d)
                } else {
                    None
                }
            })
            .filter(|&t| t > 0.0)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Intensity image in `[0, 1]` and raw depth image seen from a camera pose
    /// (camera to world). Pixels without a hit get an intensity of 0 and a depth of 0.
    #[allow(clippy::cast_precision_loss)]
    pub fn render(
        &self,
        pose: &Iso3,
        intrinsics: &Intrinsics,
        shape: (usize, usize),
        depth_config: &DepthConfig,
    ) -> (Image, Image) {
        let (rows, cols) = shape;
        let origin = Point3::from(pose.translation.vector);
        let mut gray = Image::zeros(rows, cols);
        let mut depth = Image::zeros(rows, cols);
        for j in 0..cols {
            for i in 0..rows {
                // Camera frame ray with a unit z component, so t is the depth.
                let ray = intrinsics.back_project(Point2::new(j as Float, i as Float), 1.0);
                let direction = pose.rotation * ray.coords;
                if let Some(t) = self.cast(&origin, &direction) {
                    gray[(i, j)] = self.intensity(&(origin + t * direction));
                    depth[(i, j)] = depth_config.z_to_depth_pixel(t);
                }
            }
        }
        (gray, depth)
    }
}

/// Add uniform noise in `[-amplitude, amplitude]` to every pixel.
pub fn add_noise<R: Rng>(image: &mut Image, amplitude: Float, rng: &mut R) {
    if amplitude > 0.0 {
        image.apply(|x| *x += rng.gen_range(-amplitude..=amplitude));
    }
}

// TESTS #############################################################
