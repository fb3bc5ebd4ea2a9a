// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lie algebra/group functions for 3D rigid body motion.
//!
//! Twists are ordered with the linear velocity first,
//! then the angular velocity.
//!
//! Interesting reads:
//! - Sophus c++ library: <https://github.com/strasdat/Sophus>
//! - Ethan Eade course on Lie Groups for 2D and 3D transformations:
//!     - details: <http://ethaneade.com/lie.pdf>
//!     - summary: <http://ethaneade.com/lie_groups.pdf>

use nalgebra::Translation3;

use crate::math::so3;
use crate::misc::type_aliases::{Float, Iso3, Mat3, Mat4, Mat6, Vec3, Vec6};

const EPSILON_TAYLOR_SERIES: Float = 1e-2;
const EPSILON_TAYLOR_SERIES_2: Float = EPSILON_TAYLOR_SERIES * EPSILON_TAYLOR_SERIES;
const _1_6: Float = 1.0 / 6.0;
const _1_12: Float = 1.0 / 12.0;
const _1_24: Float = 1.0 / 24.0;
const _1_120: Float = 1.0 / 120.0;
const _1_720: Float = 1.0 / 720.0;
const _1_5040: Float = 1.0 / 5040.0;

/// Parameterization of a twist (element of se3).
pub type Twist = Vec6;

/// Retrieve the linear velocity part of the twist parameterization.
pub fn linear_velocity(xi: Twist) -> Vec3 {
    Vec3::new(xi[0], xi[1], xi[2])
}

/// Retrieve the angular velocity part of the twist parameterization.
pub fn angular_velocity(xi: Twist) -> Vec3 {
    Vec3::new(xi[3], xi[4], xi[5])
}

/// Hat operator.
/// Goes from se3 parameters to se3 element (4x4 matrix).
#[rustfmt::skip]
pub fn hat(xi: Twist) -> Mat4 {
    let w1 = xi[3];
    let w2 = xi[4];
    let w3 = xi[5];
    Mat4::new(
         0.0,  -w3,    w2,   xi[0],
         w3,    0.0,  -w1,   xi[1],
        -w2,    w1,    0.0,  xi[2],
         0.0,   0.0,   0.0,  0.0,
    )
}

/// Vee operator. Inverse of hat operator.
/// Warning! does not check that the given top left 3x3 sub-matrix is skew-symmetric.
pub fn vee(mat: Mat4) -> Twist {
    Vec6::new(mat.m14, mat.m24, mat.m34, mat.m32, mat.m13, mat.m21)
}

/// Compute the exponential map from Lie algebra se3 to Lie group SE3.
/// Goes from se3 parameterization to SE3 element (rigid body motion).
///
/// The zero twist maps exactly to the identity.
pub fn exp(xi: Twist) -> Iso3 {
    let xi_v = linear_velocity(xi);
    let xi_w = angular_velocity(xi);
    let theta_2 = xi_w.norm_squared();
    let (coef_omega, coef_omega_2) = if theta_2 < EPSILON_TAYLOR_SERIES_2 {
        let theta_4 = theta_2 * theta_2;
        (
            0.5 - _1_24 * theta_2 + _1_720 * theta_4,    // TAYLOR
            _1_6 - _1_120 * theta_2 + _1_5040 * theta_4, // TAYLOR
        )
    } else {
        let theta = theta_2.sqrt();
        (
            (1.0 - theta.cos()) / theta_2,
            (theta - theta.sin()) / (theta * theta_2),
        )
    };
    let v = Mat3::identity() + coef_omega * so3::hat(xi_w) + coef_omega_2 * so3::hat_2(xi_w);
    Iso3::from_parts(Translation3::from(v * xi_v), so3::exp(xi_w))
}

/// Compute the logarithm map from the Lie group SE3 to the Lie algebra se3.
/// Inverse of the exponential map.
pub fn log(iso: Iso3) -> Twist {
    let w = so3::log(iso.rotation);
    let theta_2 = w.norm_squared();
    let coef_omega_2 = if theta_2 < EPSILON_TAYLOR_SERIES_2 {
        _1_12 + _1_720 * theta_2 // TAYLOR
    } else {
        let theta = theta_2.sqrt();
        let half_theta = 0.5 * theta;
        (1.0 - half_theta * half_theta.cos() / half_theta.sin()) / theta_2
    };
    let v_inv = Mat3::identity() - 0.5 * so3::hat(w) + coef_omega_2 * so3::hat_2(w);
    let xi_v = v_inv * iso.translation.vector;
    Vec6::new(xi_v[0], xi_v[1], xi_v[2], w[0], w[1], w[2])
}

/// Adjoint matrix of a rigid body motion,
/// such that `iso * exp(xi) * iso.inverse() == exp(adjoint(iso) * xi)`.
pub fn adjoint(iso: &Iso3) -> Mat6 {
    let rotation = iso.rotation.to_rotation_matrix().into_inner();
    let t_hat_rotation = so3::hat(iso.translation.vector) * rotation;
    let mut adj = Mat6::zeros();
    adj.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
    adj.fixed_view_mut::<3, 3>(0, 3).copy_from(&t_hat_rotation);
    adj.fixed_view_mut::<3, 3>(3, 3).copy_from(&rotation);
    adj
}

/// Euclidean distance between the positions of two rigid body motions.
pub fn translation_distance(a: &Iso3, b: &Iso3) -> Float {
    (a.translation.vector - b.translation.vector).norm()
}

/// Angle of the relative rotation of two rigid body motions.
pub fn rotation_distance(a: &Iso3, b: &Iso3) -> Float {
    so3::angle_between(&a.rotation, &b.rotation)
}

// TESTS #############################################################
