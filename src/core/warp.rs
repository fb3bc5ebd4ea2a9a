// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parametric warp of keyframe points into the current frame.
//!
//! A warp holds the rigid motion from the keyframe camera frame
//! to the current camera frame, and optionally an affine correction
//! of the current frame brightness.
//!
//! Parameters are ordered as the se3 twist (linear then angular velocity),
//! followed by `alpha` and `beta` for the affine lighting variant.
//! All Jacobians computed here are derivatives of the photometric residual
//! with regard to those parameters, under the update convention of the warp.

use crate::core::camera::Intrinsics;
use crate::math::se3;
use crate::math::so3;
use crate::misc::type_aliases::{Float, Iso3, Mat2x6, Mat3, Mat3x6, Mat6, Point3, Vec2, Vec8};

/// Number of rigid parameters.
pub const NB_RIGID_PARAMS: usize = 6;

/// Which parameters are estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpKind {
    /// Rigid motion only (6 parameters).
    Standard,
    /// Rigid motion and affine brightness `(1 + alpha) * I + beta` (8 parameters).
    AffineLighting,
}

impl WarpKind {
    /// Number of parameters estimated for this kind of warp.
    pub fn nb_params(self) -> usize {
        match self {
            WarpKind::Standard => NB_RIGID_PARAMS,
            WarpKind::AffineLighting => NB_RIGID_PARAMS + 2,
        }
    }
}

/// How a parameter increment is composed with the current motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// `T <- exp(delta) * T`
    Forward,
    /// `T <- T * exp(delta)^-1`
    Inverse,
}

/// Rigid motion with optional affine brightness correction.
#[derive(Debug, Clone, PartialEq)]
pub struct Warp {
    kind: WarpKind,
    convention: Convention,
    motion: Iso3,
    alpha: Float,
    beta: Float,
}

impl Warp {
    /// Identity warp.
    pub fn new(kind: WarpKind, convention: Convention) -> Self {
        Self {
            kind,
            convention,
            motion: Iso3::identity(),
            alpha: 0.0,
            beta: 0.0,
        }
    }

    /// Kind of the warp.
    pub fn kind(&self) -> WarpKind {
        self.kind
    }

    /// Update convention of the warp.
    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// Number of estimated parameters, 6 or 8.
    pub fn nb_params(&self) -> usize {
        self.kind.nb_params()
    }

    /// Motion from the keyframe camera frame to the current camera frame.
    pub fn pose(&self) -> Iso3 {
        self.motion
    }

    /// Replace the motion outright. Brightness parameters are kept.
    pub fn set_pose(&mut self, motion: Iso3) {
        self.motion = motion;
    }

    /// Brightness correction `(alpha, beta)`.
    pub fn brightness(&self) -> (Float, Float) {
        (self.alpha, self.beta)
    }

    /// Back to the neutral brightness correction.
    pub fn reset_brightness(&mut self) {
        self.alpha = 0.0;
        self.beta = 0.0;
    }

    /// Compose a parameter increment with the warp.
    /// Only the first `nb_params()` values of `delta` are read.
    pub fn update_parameters(&mut self, delta: &[Float]) {
        assert!(delta.len() >= self.nb_params(), "Parameter increment too short");
        let twist = se3::Twist::from_column_slice(&delta[..NB_RIGID_PARAMS]);
        let increment = se3::exp(twist);
        self.motion = match self.convention {
            Convention::Forward => increment * self.motion,
            Convention::Inverse => self.motion * increment.inverse(),
        };
        self.motion.rotation.renormalize();
        if let WarpKind::AffineLighting = self.kind {
            self.alpha += delta[6];
            self.beta += delta[7];
        }
    }

    /// Transform a keyframe point into the current camera frame.
    pub fn transform(&self, point: &Point3) -> Point3 {
        self.motion * point
    }

    /// Factor mapping parameter increments to right-multiplied twists
    /// of the motion, i.e. `update(delta)` moves `T` to `T * exp(F * delta)`
    /// at first order.
    pub fn parameters_to_right_twist(&self) -> Mat6 {
        match self.convention {
            Convention::Forward => se3::adjoint(&self.motion.inverse()),
            Convention::Inverse => -Mat6::identity(),
        }
    }

    /// Derivative of the current frame pixel coordinates of a keyframe point
    /// with regard to the rigid parameters.
    /// The point must be in front of the camera once transformed.
    pub fn screen_jacobian(&self, point: &Point3, intrinsics: &Intrinsics) -> Mat2x6 {
        let motion_jacobian = point_jacobian(point);
        let rotation = self.rotation_matrix();
        let right_twist = self.parameters_to_right_twist();
        self.screen_jacobian_with(&motion_jacobian, &rotation, &right_twist, point, intrinsics)
    }

    /// Same as `screen_jacobian`, reusing quantities shared by many points:
    /// the point Jacobian (`point_jacobian(point)`),
    /// the rotation matrix of the motion and `parameters_to_right_twist()`.
    pub fn screen_jacobian_with(
        &self,
        motion_jacobian: &Mat3x6,
        rotation: &Mat3,
        right_twist: &Mat6,
        point: &Point3,
        intrinsics: &Intrinsics,
    ) -> Mat2x6 {
        let transformed = self.transform(point);
        intrinsics.projection_jacobian(&transformed) * rotation * motion_jacobian * right_twist
    }

    /// Rotation matrix of the motion.
    pub fn rotation_matrix(&self) -> Mat3 {
        self.motion.rotation.to_rotation_matrix().into_inner()
    }

    /// Jacobian row of a photometric residual,
    /// given the screen Jacobian, the intensity gradient at the warped position
    /// and the warped intensity.
    /// Values past `nb_params()` are zero.
    pub fn compute_jacobian(&self, screen_jacobian: &Mat2x6, gradient: &Vec2, pixel_value: Float) -> Vec8 {
        let geometric = screen_jacobian.tr_mul(gradient);
        let mut jacobian = Vec8::zeros();
        match self.kind {
            WarpKind::Standard => {
                jacobian.fixed_rows_mut::<6>(0).copy_from(&geometric);
            }
            WarpKind::AffineLighting => {
                jacobian
                    .fixed_rows_mut::<6>(0)
                    .copy_from(&((1.0 + self.alpha) * geometric));
                jacobian[6] = pixel_value;
                jacobian[7] = 1.0;
            }
        }
        jacobian
    }

    /// Photometric residual of a reference intensity and its warped counterpart.
    pub fn compute_residual(&self, reference: Float, warped: Float) -> Float {
        match self.kind {
            WarpKind::Standard => warped - reference,
            WarpKind::AffineLighting => (1.0 + self.alpha) * warped + self.beta - reference,
        }
    }
}

/// Derivative of `exp(xi) * point` with regard to the twist `xi`, at `xi = 0`.
/// It is the 3x6 matrix `[ I | -[point]x ]`.
pub fn point_jacobian(point: &Point3) -> Mat3x6 {
    let mut jacobian = Mat3x6::zeros();
    jacobian
        .fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&Mat3::identity());
    jacobian
        .fixed_view_mut::<3, 3>(0, 3)
        .copy_from(&(-so3::hat(point.coords)));
    jacobian
}

// TESTS #############################################################
