// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Strategies computing the Jacobians of the photometric residuals.
//!
//! - Inverse compositional: Jacobians are computed once on the keyframe.
//! - Forward compositional: Jacobians are recomputed on the current frame
//!   at every evaluation.
//! - Efficient second-order minimization (ESM): mean of both.

use crate::core::camera::Intrinsics;
use crate::core::gradient;
use crate::core::image;
use crate::core::keyframe::{Keyframe, ReferenceLevel, ReferencePoint};
use crate::core::multires::{ImagePyramid, Levels};
use crate::core::track::photometric::LevelScratch;
use crate::core::warp::{self, Convention, Warp};
use crate::misc::type_aliases::{Float, Mat3, Mat3x6, Mat6, Point2, Vec2, Vec8};

/// Where the Jacobians are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearizationMode {
    /// Inverse compositional.
    Inverse,
    /// Forward compositional.
    Forward,
    /// Efficient second-order minimization.
    Esm,
}

impl LinearizationMode {
    /// Update convention of the warp used with this mode.
    pub fn convention(self) -> Convention {
        match self {
            LinearizationMode::Forward => Convention::Forward,
            LinearizationMode::Inverse | LinearizationMode::Esm => Convention::Inverse,
        }
    }

    /// Does the keyframe need to store frozen Jacobians.
    pub fn freezes_jacobians(self) -> bool {
        match self {
            LinearizationMode::Forward => false,
            LinearizationMode::Inverse | LinearizationMode::Esm => true,
        }
    }

    /// Strategy implementing this mode, for a pyramid of `octaves` levels.
    pub fn linearizer(self, octaves: usize) -> Box<dyn Linearizer> {
        match self {
            LinearizationMode::Inverse => Box::new(Inverse),
            LinearizationMode::Forward => Box::new(Forward::new(octaves)),
            LinearizationMode::Esm => Box::new(Esm::new(octaves)),
        }
    }
}

/// Computes the Jacobian rows of evaluated residuals.
pub trait Linearizer: std::fmt::Debug {
    /// Called with every new current frame.
    fn update_online_data(&mut self, _current: &ImagePyramid) {}

    /// Called when the keyframe changes.
    fn relinearize(&mut self, _keyframe: &Keyframe) {}

    /// Fill the Jacobian rows of the points with a valid sample
    /// and compact both Jacobians and residuals to the valid prefix.
    /// Returns the number of valid terms.
    fn recompute_jacobians(
        &self,
        scratch: &mut LevelScratch,
        reference: &ReferenceLevel,
        warp: &Warp,
        intrinsics: &Intrinsics,
        level: usize,
    ) -> usize;
}

/// Keep the terms for which `row` gives a Jacobian, in order.
fn compact<F>(scratch: &mut LevelScratch, reference: &ReferenceLevel, nb_params: usize, mut row: F) -> usize
where
    F: FnMut(usize, &ReferencePoint, &Point2, Float) -> Option<Vec8>,
{
    let mut count = 0;
    for (i, point) in reference.iter().enumerate() {
        let (pixel, intensity) = match (scratch.warped_positions[i], scratch.intensities[i]) {
            (Some(pixel), Some(intensity)) => (pixel, intensity),
            _ => continue,
        };
        if let Some(jacobian) = row(i, point, &pixel, intensity) {
            for j in 0..nb_params {
                scratch.jacobians[(count, j)] = jacobian[j];
            }
            scratch.residuals[count] = scratch.residuals[i];
            count += 1;
        }
    }
    scratch.count = count;
    count
}

// INVERSE ###########################################################

/// Inverse compositional linearization, reusing the keyframe Jacobians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inverse;

impl Linearizer for Inverse {
    fn recompute_jacobians(
        &self,
        scratch: &mut LevelScratch,
        reference: &ReferenceLevel,
        warp: &Warp,
        _intrinsics: &Intrinsics,
        _level: usize,
    ) -> usize {
        debug_assert_eq!(warp.convention(), Convention::Inverse);
        compact(scratch, reference, warp.nb_params(), |_, point, _, _| point.jacobian)
    }
}

// FORWARD ###########################################################

/// Gradients of the current frame and motion Jacobians of the keyframe points.
#[derive(Debug, Clone, PartialEq)]
struct OnlineData {
    gx: ImagePyramid,
    gy: ImagePyramid,
    motion_jacobians: Levels<Vec<Mat3x6>>,
}

/// Quantities of the warp shared by every point of an evaluation.
struct WarpFrame {
    rotation: Mat3,
    right_twist: Mat6,
}

impl WarpFrame {
    fn of(warp: &Warp) -> Self {
        Self {
            rotation: warp.rotation_matrix(),
            right_twist: warp.parameters_to_right_twist(),
        }
    }
}

impl OnlineData {
    fn new(octaves: usize) -> Self {
        Self {
            gx: ImagePyramid::new(octaves),
            gy: ImagePyramid::new(octaves),
            motion_jacobians: Vec::new(),
        }
    }

    fn update(&mut self, current: &ImagePyramid) {
        self.gx = current.convolve(&gradient::kernel_x());
        self.gy = current.convolve(&gradient::kernel_y());
    }

    fn relinearize(&mut self, keyframe: &Keyframe) {
        self.motion_jacobians = keyframe
            .levels()
            .map(|points| points.iter().map(|p| warp::point_jacobian(&p.position)).collect())
            .collect();
    }

    /// Jacobian computed with the current frame gradient,
    /// `None` if the gradient cannot be sampled at the warped position.
    #[allow(clippy::too_many_arguments)]
    fn current_jacobian(
        &self,
        level: usize,
        index: usize,
        point: &ReferencePoint,
        pixel: &Point2,
        intensity: Float,
        warp: &Warp,
        frame: &WarpFrame,
        intrinsics: &Intrinsics,
    ) -> Option<Vec8> {
        let gx = image::interpolate(self.gx.level(level), pixel)?;
        let gy = image::interpolate(self.gy.level(level), pixel)?;
        let screen = warp.screen_jacobian_with(
            &self.motion_jacobians[level][index],
            &frame.rotation,
            &frame.right_twist,
            &point.position,
            intrinsics,
        );
        Some(warp.compute_jacobian(&screen, &Vec2::new(gx, gy), intensity))
    }
}

/// Forward compositional linearization on the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Forward {
    online: OnlineData,
}

impl Forward {
    /// Strategy for a pyramid of `octaves` levels.
    pub fn new(octaves: usize) -> Self {
        Self {
            online: OnlineData::new(octaves),
        }
    }
}

impl Linearizer for Forward {
    fn update_online_data(&mut self, current: &ImagePyramid) {
        self.online.update(current);
    }

    fn relinearize(&mut self, keyframe: &Keyframe) {
        self.online.relinearize(keyframe);
    }

    fn recompute_jacobians(
        &self,
        scratch: &mut LevelScratch,
        reference: &ReferenceLevel,
        warp: &Warp,
        intrinsics: &Intrinsics,
        level: usize,
    ) -> usize {
        debug_assert_eq!(warp.convention(), Convention::Forward);
        let frame = WarpFrame::of(warp);
        compact(scratch, reference, warp.nb_params(), |i, point, pixel, intensity| {
            self.online
                .current_jacobian(level, i, point, pixel, intensity, warp, &frame, intrinsics)
        })
    }
}

// ESM ###############################################################

/// Efficient second-order minimization,
/// averaging the keyframe and current frame Jacobians.
#[derive(Debug, Clone, PartialEq)]
pub struct Esm {
    online: OnlineData,
}

impl Esm {
    /// Strategy for a pyramid of `octaves` levels.
    pub fn new(octaves: usize) -> Self {
        Self {
            online: OnlineData::new(octaves),
        }
    }
}

impl Linearizer for Esm {
    fn update_online_data(&mut self, current: &ImagePyramid) {
        self.online.update(current);
    }

    fn relinearize(&mut self, keyframe: &Keyframe) {
        self.online.relinearize(keyframe);
    }

    fn recompute_jacobians(
        &self,
        scratch: &mut LevelScratch,
        reference: &ReferenceLevel,
        warp: &Warp,
        intrinsics: &Intrinsics,
        level: usize,
    ) -> usize {
        debug_assert_eq!(warp.convention(), Convention::Inverse);
        let frame = WarpFrame::of(warp);
        compact(scratch, reference, warp.nb_params(), |i, point, pixel, intensity| {
            let frozen = point.jacobian?;
            let current = self
                .online
                .current_jacobian(level, i, point, pixel, intensity, warp, &frame, intrinsics)?;
            Some(0.5 * (frozen + current))
        })
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::core::depth::DepthConfig;
    use crate::core::image::Image;
    use crate::core::keyframe::{Config, KeyframeBuilder};
    use crate::core::track::photometric::PhotometricError;
    use crate::core::warp::WarpKind;
    use crate::misc::type_aliases::Iso3;
    use approx;

    fn intrinsics() -> Levels<Intrinsics> {
        Intrinsics {
            principal_point: (15.5, 11.5),
            focal: (30.0, 30.0),
            skew: 0.0,
        }
        .multi_res(2)
    }

    /// Cost with a frozen keyframe and the keyframe image as current frame.
    fn cost(mode: LinearizationMode, kind: WarpKind) -> PhotometricError {
        let gray = Image::from_fn(24, 32, |i, j| {
            0.5 + 0.3 * (0.5 * j as Float).sin() * (0.4 * i as Float).cos()
        });
        let depth = Image::from_fn(24, 32, |i, _| 8000.0 + 200.0 * i as Float);
        let builder = KeyframeBuilder::new(Config::default(), DepthConfig::default(), intrinsics(), kind, true);
        let mut cost = PhotometricError::new(intrinsics(), mode.linearizer(2));
        cost.set_current_frame(gray).unwrap();
        let keyframe = builder.build(Iso3::identity(), cost.current(), &depth);
        cost.set_keyframe(keyframe);
        cost
    }

    fn rows(scratch: &LevelScratch) -> Vec<Vec8> {
        (0..scratch.count)
            .map(|k| {
                let mut row = Vec8::zeros();
                for j in 0..scratch.jacobians.ncols() {
                    row[j] = scratch.jacobians[(k, j)];
                }
                row
            })
            .collect()
    }

    fn frozen(cost: &PhotometricError, level: usize) -> Vec<Vec8> {
        cost.keyframe()
            .unwrap()
            .level(level)
            .iter()
            .map(|p| p.jacobian.unwrap())
            .collect()
    }

    #[test]
    fn inverse_keeps_frozen_rows_when_all_points_are_visible() {
        for &kind in &[WarpKind::Standard, WarpKind::AffineLighting] {
            let cost = cost(LinearizationMode::Inverse, kind);
            let warp = Warp::new(kind, Convention::Inverse);
            let mut scratch = LevelScratch::default();
            for level in 0..2 {
                let count = cost.evaluate(&warp, &mut scratch, level);
                assert_eq!(count, cost.keyframe().unwrap().level(level).len());
                assert_eq!(rows(&scratch), frozen(&cost, level));
            }
        }
    }

    #[test]
    fn forward_jacobians_are_opposite_at_identity() {
        let cost = cost(LinearizationMode::Forward, WarpKind::Standard);
        let warp = Warp::new(WarpKind::Standard, Convention::Forward);
        let mut scratch = LevelScratch::default();
        let count = cost.evaluate(&warp, &mut scratch, 0);
        assert_eq!(count, cost.keyframe().unwrap().model_size());
        for (current, reference) in rows(&scratch).iter().zip(frozen(&cost, 0)) {
            approx::assert_relative_eq!(*current, -reference, epsilon = 1e-9);
        }
    }

    #[test]
    fn esm_matches_frozen_rows_at_identity() {
        let cost = cost(LinearizationMode::Esm, WarpKind::AffineLighting);
        let warp = Warp::new(WarpKind::AffineLighting, Convention::Inverse);
        let mut scratch = LevelScratch::default();
        cost.evaluate(&warp, &mut scratch, 1);
        for (current, reference) in rows(&scratch).iter().zip(frozen(&cost, 1)) {
            approx::assert_relative_eq!(*current, reference, epsilon = 1e-9);
        }
    }

    #[test]
    fn invalid_samples_are_compacted_away() {
        let cost = cost(LinearizationMode::Inverse, WarpKind::Standard);
        let mut warp = Warp::new(WarpKind::Standard, Convention::Inverse);
        // Points close to the image border leave it.
        warp.set_pose(Iso3::translation(0.25, 0.0, 0.0));
        let mut scratch = LevelScratch::default();
        let count = cost.evaluate(&warp, &mut scratch, 0);
        let model_size = cost.keyframe().unwrap().model_size();
        assert!(count > 0 && count < model_size);
        let valid: Vec<Vec8> = frozen(&cost, 0)
            .into_iter()
            .zip(scratch.intensities.iter())
            .filter(|(_, intensity)| intensity.is_some())
            .map(|(jacobian, _)| jacobian)
            .collect();
        assert_eq!(rows(&scratch), valid);
    }

    #[test]
    fn modes_and_conventions() {
        assert_eq!(LinearizationMode::Forward.convention(), Convention::Forward);
        assert_eq!(LinearizationMode::Esm.convention(), Convention::Inverse);
        assert!(!LinearizationMode::Forward.freezes_jacobians());
        assert!(LinearizationMode::Inverse.freezes_jacobians());
    }
}
