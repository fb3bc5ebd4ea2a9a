// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lie algebra/group functions for 3D rotations.
//!
//! Interesting reads:
//! - Sophus c++ library: <https://github.com/strasdat/Sophus>
//! - Ethan Eade course on Lie Groups for 2D and 3D transformations:
//!     - details: <http://ethaneade.com/lie.pdf>
//!     - summary: <http://ethaneade.com/lie_groups.pdf>

use nalgebra::{Quaternion, UnitQuaternion};

use crate::misc::type_aliases::{Float, Mat3, Vec3};

/// Threshold for using Taylor series in computations.
const EPSILON_TAYLOR_SERIES: Float = 1e-2;
const EPSILON_TAYLOR_SERIES_2: Float = EPSILON_TAYLOR_SERIES * EPSILON_TAYLOR_SERIES;
const _1_8: Float = 0.125;
const _1_48: Float = 1.0 / 48.0;
const _1_3840: Float = 1.0 / 3840.0;

/// Hat operator.
/// Goes from so3 parameterization to so3 element (skew-symmetric matrix).
#[rustfmt::skip]
pub fn hat(w: Vec3) -> Mat3 {
    Mat3::new(
         0.0,  -w.z,   w.y,
         w.z,   0.0,  -w.x,
        -w.y,   w.x,   0.0,
    )
}

/// Squared hat operator (`hat_2(w) == hat(w) * hat(w)`).
/// Result is a symmetric matrix.
#[rustfmt::skip]
pub fn hat_2(w: Vec3) -> Mat3 {
    let w11 = w.x * w.x;
    let w12 = w.x * w.y;
    let w13 = w.x * w.z;
    let w22 = w.y * w.y;
    let w23 = w.y * w.z;
    let w33 = w.z * w.z;
    Mat3::new(
        -w22 - w33,     w12,           w13,
         w12,          -w11 - w33,     w23,
         w13,           w23,          -w11 - w22,
    )
}

/// Vee operator. Inverse of hat operator.
/// Warning! does not check that the given matrix is skew-symmetric.
pub fn vee(mat: Mat3) -> Vec3 {
    Vec3::new(mat.m32, mat.m13, mat.m21)
}

/// Compute the exponential map from Lie algebra so3 to Lie group SO3.
/// Goes from so3 parameterization to SO3 element (rotation).
///
/// The quaternion built is unit by construction (up to the Taylor truncation),
/// it is only renormalized to absorb that truncation error.
pub fn exp(w: Vec3) -> UnitQuaternion<Float> {
    let theta_2 = w.norm_squared();
    let (real_factor, imag_factor) = if theta_2 < EPSILON_TAYLOR_SERIES_2 {
        let theta_4 = theta_2 * theta_2;
        (
            1.0 - _1_8 * theta_2 + theta_4 / 384.0, // TAYLOR
            0.5 - _1_48 * theta_2 + _1_3840 * theta_4, // TAYLOR
        )
    } else {
        let theta = theta_2.sqrt();
        let half_theta = 0.5 * theta;
        (half_theta.cos(), half_theta.sin() / theta)
    };
    UnitQuaternion::from_quaternion(Quaternion::from_parts(real_factor, imag_factor * w))
}

/// Compute the logarithm map from the Lie group SO3 to the Lie algebra so3.
/// Inverse of the exponential map.
/// The returned angle is within `[0, pi]`.
pub fn log(rotation: UnitQuaternion<Float>) -> Vec3 {
    // q and -q are the same rotation, pick the one with a positive real part.
    let sign = if rotation.scalar() < 0.0 { -1.0 } else { 1.0 };
    let imag_vector = sign * rotation.vector();
    let imag_norm_2 = imag_vector.norm_squared();
    let real_factor = sign * rotation.scalar();
    if imag_norm_2 < EPSILON_TAYLOR_SERIES_2 {
        let x_2 = imag_norm_2 / (real_factor * real_factor);
        let theta_by_imag_norm = 2.0 / real_factor * (1.0 - x_2 / 3.0); // TAYLOR
        theta_by_imag_norm * imag_vector
    } else {
        let imag_norm = imag_norm_2.sqrt();
        let theta = 2.0 * imag_norm.atan2(real_factor);
        (theta / imag_norm) * imag_vector
    }
}

/// Angle (in radians, within `[0, pi]`) of a rotation.
pub fn angle(rotation: &UnitQuaternion<Float>) -> Float {
    let w = rotation.scalar().abs().min(1.0);
    2.0 * rotation.vector().norm().atan2(w)
}

/// Angle of the relative rotation between two rotations.
pub fn angle_between(a: &UnitQuaternion<Float>, b: &UnitQuaternion<Float>) -> Float {
    angle(&(a.inverse() * b))
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;
    use quickcheck_macros;

    // Large angles are wrapped by the round trip,
    // so rotations are compared instead of vectors.
    const EPSILON_ROUNDTRIP_APPROX: Float = 1e-9;

    #[test]
    fn exp_log_round_trip() {
        let w = Vec3::zeros();
        assert_eq!(w, log(exp(w)));
    }

    #[test]
    fn angle_of_axis_rotation() {
        let rotation = exp(Vec3::new(0.0, 0.3, 0.0));
        approx::assert_relative_eq!(angle(&rotation), 0.3, epsilon = 1e-12);
        let small = exp(Vec3::new(1e-4, 0.0, 0.0));
        approx::assert_relative_eq!(angle(&small), 1e-4, epsilon = 1e-12);
    }

    #[test]
    fn angle_between_is_symmetric() {
        let a = exp(Vec3::new(0.1, -0.2, 0.05));
        let b = exp(Vec3::new(-0.3, 0.1, 0.2));
        approx::assert_relative_eq!(angle_between(&a, &b), angle_between(&b, &a), epsilon = 1e-12);
        approx::assert_relative_eq!(angle_between(&a, &a), 0.0, epsilon = 1e-7);
    }

    // PROPERTY TESTS ################################################

    #[quickcheck_macros::quickcheck]
    fn hat_vee_roundtrip(x: i32, y: i32, z: i32) -> bool {
        let element = Vec3::new(Float::from(x), Float::from(y), Float::from(z));
        element == vee(hat(element))
    }

    #[quickcheck_macros::quickcheck]
    fn hat_2_ok(x: i8, y: i8, z: i8) -> bool {
        let element = Vec3::new(Float::from(x), Float::from(y), Float::from(z));
        hat_2(element) == hat(element) * hat(element)
    }

    #[quickcheck_macros::quickcheck]
    fn log_exp_round_trip(roll: i16, pitch: i16, yaw: i16) -> bool {
        let rotation = gen_rotation(roll, pitch, yaw);
        approx::relative_eq!(
            rotation,
            exp(log(rotation)),
            epsilon = EPSILON_ROUNDTRIP_APPROX
        )
    }

    // GENERATORS ####################################################

    fn gen_rotation(roll: i16, pitch: i16, yaw: i16) -> UnitQuaternion<Float> {
        let to_angle = |a: i16| Float::from(a) * 1e-3;
        UnitQuaternion::from_euler_angles(to_angle(roll), to_angle(pitch), to_angle(yaw))
    }
}
