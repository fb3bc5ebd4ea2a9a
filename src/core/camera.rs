// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pinhole camera intrinsics and their multi-resolution versions.

use crate::misc::type_aliases::{Float, Mat2x3, Point2, Point3, Vec3};

/// Intrinsic parameters of a pinhole camera.
#[derive(PartialEq, Debug, Clone)]
pub struct Intrinsics {
    /// Principal point `(cu, cv)` in pixels.
    pub principal_point: (Float, Float),
    /// Focal lengths `(fu, fv)` in pixels.
    pub focal: (Float, Float),
    /// Skew coefficient.
    pub skew: Float,
}

impl Intrinsics {
    /// Intrinsics of the `n` levels of a pyramid, each level being half the previous one.
    /// Level 0 is the full resolution.
    pub fn multi_res(self, n: usize) -> Vec<Self> {
        std::iter::successors(Some(self), |intrinsics| Some(intrinsics.half_res()))
            .take(n)
            .collect()
    }

    /// Intrinsics of an image with half the resolution.
    pub fn half_res(&self) -> Self {
        self.scaled(0.5)
    }

    /// Intrinsics of an image resized by the given factor,
    /// assuming pixel centers sit at integer coordinates.
    pub fn scaled(&self, factor: Float) -> Self {
        let (cu, cv) = self.principal_point;
        let (fu, fv) = self.focal;
        Self {
            principal_point: ((cu + 0.5) * factor - 0.5, (cv + 0.5) * factor - 0.5),
            focal: (factor * fu, factor * fv),
            skew: factor * self.skew,
        }
    }

    /// Homogeneous projection of a 3D point. Divide by `z` to get pixel coordinates.
    pub fn project(&self, point: Point3) -> Vec3 {
        Vec3::new(
            self.focal.0 * point[0] + self.skew * point[1] + self.principal_point.0 * point[2],
            self.focal.1 * point[1] + self.principal_point.1 * point[2],
            point[2],
        )
    }

    /// Pixel coordinates of a 3D point, `None` if it is not in front of the camera.
    pub fn project_to_pixel(&self, point: &Point3) -> Option<Point2> {
        if point.z > 0.0 {
            let uvz = self.project(*point);
            Some(Point2::new(uvz.x / uvz.z, uvz.y / uvz.z))
        } else {
            None
        }
    }

    /// Back project a pixel with a given depth into a 3D point.
    pub fn back_project(&self, point: Point2, depth: Float) -> Point3 {
        let z = depth;
        let y = (point[1] - self.principal_point.1) * z / self.focal.1;
        let x = ((point[0] - self.principal_point.0) * z - self.skew * y) / self.focal.0;
        Point3::new(x, y, z)
    }

    /// Derivative of the pixel coordinates of a 3D point
    /// with regard to its coordinates.
    #[rustfmt::skip]
    pub fn projection_jacobian(&self, point: &Point3) -> Mat2x3 {
        let (fu, fv) = self.focal;
        let s = self.skew;
        let _z = 1.0 / point.z;
        let _z2 = _z * _z;
        Mat2x3::new(
            fu * _z, s * _z,  -(fu * point.x + s * point.y) * _z2,
            0.0,     fv * _z, -fv * point.y * _z2,
        )
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;

    fn intrinsics() -> Intrinsics {
        Intrinsics {
            principal_point: (79.5, 59.5),
            focal: (160.0, 150.0),
            skew: 0.5,
        }
    }

    #[test]
    fn multi_res_halves_focal_and_principal_point() {
        let levels = intrinsics().multi_res(3);
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[1].focal, (80.0, 75.0));
        assert_eq!(levels[1].principal_point, (39.5, 29.5));
        assert_eq!(levels[2].principal_point, (19.5, 14.5));
        assert!(intrinsics().multi_res(0).is_empty());
    }

    #[test]
    fn project_back_project_round_trip() {
        let k = intrinsics();
        let pixel = Point2::new(12.25, 97.5);
        let point = k.back_project(pixel, 2.5);
        let projected = k.project_to_pixel(&point).unwrap();
        approx::assert_relative_eq!(projected, pixel, epsilon = 1e-12);
        assert!(k.project_to_pixel(&Point3::new(0.1, 0.2, -1.0)).is_none());
    }

    #[test]
    fn projection_jacobian_matches_finite_differences() {
        let k = intrinsics();
        let point = Point3::new(0.3, -0.2, 1.7);
        let jac = k.projection_jacobian(&point);
        let h = 1e-6;
        for i in 0..3 {
            let mut p_plus = point;
            let mut p_minus = point;
            p_plus[i] += h;
            p_minus[i] -= h;
            let diff = (k.project_to_pixel(&p_plus).unwrap() - k.project_to_pixel(&p_minus).unwrap())
                / (2.0 * h);
            approx::assert_relative_eq!(diff, jac.column(i).into_owned(), epsilon = 1e-6);
        }
    }
}
