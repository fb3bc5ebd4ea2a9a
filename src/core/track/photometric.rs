// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Photometric error between a keyframe and the current frame.

use itertools::izip;

use crate::core::camera::Intrinsics;
use crate::core::image::{self, Image};
use crate::core::keyframe::Keyframe;
use crate::core::multires::{ImagePyramid, Levels};
use crate::core::track::linearizer::Linearizer;
use crate::core::warp::Warp;
use crate::error::Error;
use crate::misc::type_aliases::{DMat, Float, Point2};

/// Buffers written by the evaluation of one pyramid level.
///
/// Before linearization, index `i` refers to the `i`-th reference point.
/// After it, the first `count` rows of `jacobians` and values of `residuals`
/// hold the valid terms only.
#[derive(Debug, Clone)]
pub struct LevelScratch {
    /// One Jacobian row per reference point, `nb_params` columns.
    pub jacobians: DMat,
    /// One residual per reference point.
    pub residuals: Vec<Float>,
    /// Projection of each reference point in the current frame.
    pub warped_positions: Vec<Option<Point2>>,
    /// Current frame intensity at each warped position.
    pub intensities: Vec<Option<Float>>,
    /// Number of valid terms after linearization.
    pub count: usize,
}

impl Default for LevelScratch {
    fn default() -> Self {
        Self {
            jacobians: DMat::zeros(0, 0),
            residuals: Vec::new(),
            warped_positions: Vec::new(),
            intensities: Vec::new(),
            count: 0,
        }
    }
}

impl LevelScratch {
    /// Make room for `nb_points` terms, reallocating only on size changes.
    pub fn resize(&mut self, nb_points: usize, nb_params: usize) {
        if self.jacobians.shape() != (nb_points, nb_params) {
            self.jacobians = DMat::zeros(nb_points, nb_params);
        }
        self.residuals.resize(nb_points, 0.0);
        self.warped_positions.resize(nb_points, None);
        self.intensities.resize(nb_points, None);
        self.count = 0;
    }

    /// Valid residuals after linearization.
    pub fn valid_residuals(&self) -> &[Float] {
        &self.residuals[..self.count]
    }

    /// Mean of the squared valid residuals, 0 if there is none.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_squared_residual(&self) -> Float {
        if self.count == 0 {
            0.0
        } else {
            let sum: Float = self.valid_residuals().iter().map(|r| r * r).sum();
            sum / self.count as Float
        }
    }
}

/// Cost function of the direct alignment.
///
/// It holds the keyframe, the current frame pyramid
/// and the linearization strategy used to compute Jacobians.
#[derive(Debug)]
pub struct PhotometricError {
    intrinsics: Levels<Intrinsics>,
    current: ImagePyramid,
    keyframe: Option<Keyframe>,
    linearizer: Box<dyn Linearizer>,
}

impl PhotometricError {
    /// One pyramid level per given intrinsics.
    pub fn new(intrinsics: Levels<Intrinsics>, linearizer: Box<dyn Linearizer>) -> Self {
        let octaves = intrinsics.len();
        Self {
            intrinsics,
            current: ImagePyramid::new(octaves),
            keyframe: None,
            linearizer,
        }
    }

    /// Number of pyramid levels.
    pub fn octaves(&self) -> usize {
        self.intrinsics.len()
    }

    /// Camera intrinsics of every level.
    pub fn intrinsics(&self) -> &Levels<Intrinsics> {
        &self.intrinsics
    }

    /// Pyramid of the current frame.
    pub fn current(&self) -> &ImagePyramid {
        &self.current
    }

    /// Active keyframe, if any.
    pub fn keyframe(&self) -> Option<&Keyframe> {
        self.keyframe.as_ref()
    }

    /// Set the frame that keyframe points are aligned to.
    pub fn set_current_frame(&mut self, gray: Image) -> Result<(), Error> {
        self.current.update(gray)?;
        self.linearizer.update_online_data(&self.current);
        Ok(())
    }

    /// Replace the keyframe.
    pub fn set_keyframe(&mut self, keyframe: Keyframe) {
        self.linearizer.relinearize(&keyframe);
        self.keyframe = Some(keyframe);
    }

    /// Residuals and Jacobians of all keyframe points of a level for a given warp.
    /// Returns the number of valid terms, also stored in `scratch.count`.
    pub fn evaluate(&self, warp: &Warp, scratch: &mut LevelScratch, level: usize) -> usize {
        let keyframe = match &self.keyframe {
            Some(keyframe) if !self.current.is_empty() => keyframe,
            _ => {
                scratch.resize(0, warp.nb_params());
                return 0;
            }
        };
        let reference = keyframe.level(level);
        let intrinsics = &self.intrinsics[level];
        let current = self.current.level(level);
        scratch.resize(reference.len(), warp.nb_params());
        for (point, warped, intensity, residual) in izip!(
            reference.iter(),
            scratch.warped_positions.iter_mut(),
            scratch.intensities.iter_mut(),
            scratch.residuals.iter_mut()
        ) {
            *warped = intrinsics.project_to_pixel(&warp.transform(&point.position));
            *intensity = warped.and_then(|pixel| image::interpolate(current, &pixel));
            *residual = intensity.map_or(0.0, |value| warp.compute_residual(point.intensity, value));
        }
        self.linearizer
            .recompute_jacobians(scratch, reference, warp, intrinsics, level)
    }
}

// TESTS #############################################################
