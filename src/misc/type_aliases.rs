// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Type aliases for common types used all over the code base.

use nalgebra as na;

/// Double precision is used everywhere,
/// finite differences checks of the warp Jacobians need it.
pub type Float = f64;

/// A point with two Float coordinates.
pub type Point2 = na::Point2<Float>;
/// A point with three Float coordinates.
pub type Point3 = na::Point3<Float>;

/// A vector with two Float coordinates.
pub type Vec2 = na::Vector2<Float>;
/// A vector with three Float coordinates.
pub type Vec3 = na::Vector3<Float>;
/// A vector with six Float coordinates.
pub type Vec6 = na::Vector6<Float>;
/// A vector with eight Float coordinates.
pub type Vec8 = na::SVector<Float, 8>;

/// A 2x3 matrix of Floats.
pub type Mat2x3 = na::Matrix2x3<Float>;
/// A 2x6 matrix of Floats.
pub type Mat2x6 = na::Matrix2x6<Float>;
/// A 3x6 matrix of Floats.
pub type Mat3x6 = na::Matrix3x6<Float>;
/// A 3x3 matrix of Floats.
pub type Mat3 = na::Matrix3<Float>;
/// A 4x4 matrix of Floats.
pub type Mat4 = na::Matrix4<Float>;
/// A 6x6 matrix of Floats.
pub type Mat6 = na::Matrix6<Float>;

/// A dynamically sized matrix of Floats.
pub type DMat = na::DMatrix<Float>;
/// A dynamically sized vector of Floats.
pub type DVec = na::DVector<Float>;

/// A direct 3D isometry, also known as rigid body motion.
pub type Iso3 = na::Isometry3<Float>;
