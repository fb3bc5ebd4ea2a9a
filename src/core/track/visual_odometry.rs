// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Frame to keyframe visual odometry.
//!
//! Each new RGB-D frame is aligned to the active keyframe
//! by coarse-to-fine minimization of the photometric error.
//! The keyframe is rebuilt from the current frame when tracking quality drops
//! or when the camera moved too far from it.

use log::{debug, info};

use crate::core::camera::Intrinsics;
use crate::core::depth::DepthConfig;
use crate::core::image::{self, Image};
use crate::core::keyframe::{self, Keyframe, KeyframeBuilder};
use crate::core::multires::Levels;
use crate::core::track::gauss_newton::{OptimizationResult, Optimizer};
use crate::core::track::linearizer::LinearizationMode;
use crate::core::track::photometric::{LevelScratch, PhotometricError};
use crate::core::warp::{Warp, WarpKind};
use crate::error::Error;
use crate::math::se3;
use crate::misc::type_aliases::{Float, Iso3};

/// Configuration of the Tracker.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of levels in the multi-resolution pyramids of images.
    pub octaves: usize,
    /// Camera intrinsic parameters at full resolution.
    pub intrinsics: Intrinsics,
    /// `(rows, cols)` of the intensity and depth images.
    pub image_shape: (usize, usize),
    /// Interpretation of the raw depth images.
    pub depth: DepthConfig,
    /// Estimate an affine brightness change in addition to the motion.
    pub warp_kind: WarpKind,
    /// Where Jacobians are evaluated.
    pub linearization: LinearizationMode,
    /// Gauss-Newton stopping parameters.
    pub optimizer: Optimizer,
    /// Selection of the keyframe points.
    pub keyframe: keyframe::Config,
    /// When to rebuild the keyframe.
    pub recreation: RecreationPolicy,
    /// Automatically rebuild the keyframe when the policy says so.
    pub auto_reference_update: bool,
}

impl Config {
    /// Default parameters for a given camera and image size.
    pub fn new(intrinsics: Intrinsics, image_shape: (usize, usize)) -> Self {
        Self {
            octaves: 3,
            intrinsics,
            image_shape,
            depth: DepthConfig::default(),
            warp_kind: WarpKind::Standard,
            linearization: LinearizationMode::Inverse,
            optimizer: Optimizer::default(),
            keyframe: keyframe::Config::default(),
            recreation: RecreationPolicy::default(),
            auto_reference_update: true,
        }
    }

    /// Check every value before any frame is processed.
    pub fn validate(&self) -> Result<(), Error> {
        let (rows, cols) = self.image_shape;
        let min_size = 1_usize.checked_shl(self.octaves.saturating_sub(1) as u32);
        if self.octaves == 0 || min_size.map_or(true, |size| rows < size || cols < size) {
            return Err(Error::DegeneratePyramid {
                octaves: self.octaves,
                rows,
                cols,
            });
        }
        let (fu, fv) = self.intrinsics.focal;
        if !(fu > 0.0 && fv > 0.0) {
            return invalid(format!("focal lengths must be > 0 (got {}, {})", fu, fv));
        }
        self.depth.validate()?;
        if self.optimizer.max_iterations == 0 {
            return invalid("at least one iteration per level is needed".to_string());
        }
        if !(self.optimizer.min_parameter_update >= 0.0) {
            return invalid("minimum parameter update must be >= 0".to_string());
        }
        if !(self.keyframe.gradient_threshold >= 0.0) {
            return invalid("gradient threshold must be >= 0".to_string());
        }
        let selection = self.keyframe.selection_pixel_percentage;
        if !(selection > 0.0 && selection <= 1.0) {
            return invalid(format!("selection percentage must be in ]0, 1] (got {})", selection));
        }
        self.recreation.validate()
    }
}

fn invalid(message: String) -> Result<(), Error> {
    Err(Error::InvalidConfig(message))
}

// Keyframe recreation #########################################################

/// Thresholds triggering the creation of a new keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct RecreationPolicy {
    /// Minimum fraction of the keyframe points still valid in the current frame.
    pub min_pixel_percentage: Float,
    /// Maximum mean squared residual.
    pub max_ssd_sqr: Float,
    /// Maximum distance between the keyframe and current camera centers.
    pub max_translation_distance: Float,
    /// Maximum rotation angle (radians) between the keyframe and current camera.
    pub max_rotation_distance: Float,
}

impl Default for RecreationPolicy {
    fn default() -> Self {
        Self {
            min_pixel_percentage: 0.3,
            max_ssd_sqr: 0.04,
            max_translation_distance: 0.4,
            max_rotation_distance: (5.0 as Float).to_radians(),
        }
    }
}

/// Why a new keyframe is needed.
#[derive(Debug, Clone, PartialEq)]
pub enum RecreationReason {
    /// Too few keyframe points are still visible.
    TooFewPixels {
        /// Fraction of valid points.
        fraction: Float,
    },
    /// The photometric error is too high.
    HighCost {
        /// Mean squared residual.
        cost: Float,
    },
    /// The camera moved too far.
    TooFar {
        /// Distance to the keyframe camera center.
        distance: Float,
    },
    /// The camera rotated too much.
    TooMuchRotation {
        /// Angle to the keyframe camera orientation.
        angle: Float,
    },
}

impl RecreationPolicy {
    /// Check that thresholds are in their domain.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.min_pixel_percentage >= 0.0 && self.min_pixel_percentage <= 1.0) {
            return invalid(format!(
                "minimum pixel percentage must be in [0, 1] (got {})",
                self.min_pixel_percentage
            ));
        }
        if !(self.max_ssd_sqr >= 0.0 && self.max_translation_distance >= 0.0 && self.max_rotation_distance >= 0.0)
        {
            return invalid("recreation thresholds must be >= 0".to_string());
        }
        Ok(())
    }

    /// First violated threshold, if any.
    #[allow(clippy::cast_precision_loss)]
    pub fn check(
        &self,
        result: &OptimizationResult,
        model_size: usize,
        keyframe_pose: &Iso3,
        pose: &Iso3,
    ) -> Option<RecreationReason> {
        let fraction = if model_size == 0 {
            0.0
        } else {
            result.num_pixels as Float / model_size as Float
        };
        let distance = se3::translation_distance(keyframe_pose, pose);
        let angle = se3::rotation_distance(keyframe_pose, pose);
        if fraction < self.min_pixel_percentage {
            Some(RecreationReason::TooFewPixels { fraction })
        } else if result.cost > self.max_ssd_sqr {
            Some(RecreationReason::HighCost { cost: result.cost })
        } else if distance > self.max_translation_distance {
            Some(RecreationReason::TooFar { distance })
        } else if angle > self.max_rotation_distance {
            Some(RecreationReason::TooMuchRotation { angle })
        } else {
            None
        }
    }
}

// Tracker #####################################################################

/// Tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    /// No frame received yet.
    NoKeyframe,
    /// Frames are aligned to a keyframe.
    Tracking,
}

/// Event sent to listeners when a keyframe is created.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeAdded {
    /// World pose of the new keyframe.
    pub pose: Iso3,
}

/// Struct used for tracking the camera at each frame.
pub struct Tracker {
    config: Config,
    builder: KeyframeBuilder,
    cost: PhotometricError,
    scratch: Levels<LevelScratch>,
    warp: Warp,
    pose: Iso3,
    last_depth: Option<Image>,
    last_result: Option<OptimizationResult>,
    listeners: Vec<Box<dyn FnMut(&KeyframeAdded)>>,
}

impl Tracker {
    /// Validate the configuration and create a tracker waiting for its first frame.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let intrinsics = config.intrinsics.clone().multi_res(config.octaves);
        let builder = KeyframeBuilder::new(
            config.keyframe.clone(),
            config.depth.clone(),
            intrinsics.clone(),
            config.warp_kind,
            config.linearization.freezes_jacobians(),
        );
        let cost = PhotometricError::new(intrinsics, config.linearization.linearizer(config.octaves));
        let warp = Warp::new(config.warp_kind, config.linearization.convention());
        Ok(Self {
            builder,
            cost,
            scratch: Vec::new(),
            warp,
            pose: Iso3::identity(),
            last_depth: None,
            last_result: None,
            listeners: Vec::new(),
            config,
        })
    }

    /// Configuration of the tracker.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a function called every time a keyframe is created.
    pub fn on_keyframe_added<F>(&mut self, listener: F)
    where
        F: FnMut(&KeyframeAdded) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Track a new frame.
    ///
    /// `pose` is the initial guess of the camera pose (camera to world)
    /// and receives the estimated pose.
    /// The first frame only creates the keyframe, at the given pose.
    /// `gray` intensities are expected in `[0, 1]`, `depth` holds raw depth values.
    pub fn update_pose(&mut self, pose: &mut Iso3, gray: &Image, depth: &Image) -> Result<(), Error> {
        image::check_shape("intensity image", gray, self.config.image_shape)?;
        image::check_shape("depth image", depth, self.config.image_shape)?;
        self.cost.set_current_frame(gray.clone())?;
        self.last_depth = Some(depth.clone());

        let keyframe_pose = match self.keyframe_pose() {
            Some(keyframe_pose) => keyframe_pose,
            None => {
                self.pose = *pose;
                self.add_new_keyframe()?;
                self.last_result = Some(OptimizationResult {
                    cost: 0.0,
                    num_pixels: self.model_size(),
                    iterations: vec![0; self.config.octaves],
                });
                return Ok(());
            }
        };

        self.warp.set_pose(pose.inverse() * keyframe_pose);
        let result = self
            .config
            .optimizer
            .optimize(&self.cost, &mut self.scratch, &mut self.warp);
        self.pose = keyframe_pose * self.warp.pose().inverse();
        *pose = self.pose;
        debug!(
            "Frame tracked: cost {:.3e}, {} / {} pixels",
            result.cost,
            result.num_pixels,
            self.model_size()
        );

        let reason = self
            .config
            .recreation
            .check(&result, self.model_size(), &keyframe_pose, &self.pose);
        self.last_result = Some(result);
        if let (true, Some(reason)) = (self.config.auto_reference_update, reason) {
            info!("Changing keyframe: {:?}", reason);
            self.add_new_keyframe()?;
        }
        Ok(())
    }

    /// Rebuild the keyframe from the last received frame, at the current pose.
    pub fn add_new_keyframe(&mut self) -> Result<(), Error> {
        let depth = self.last_depth.as_ref().ok_or(Error::NoFrame)?;
        let keyframe = self.builder.build(self.pose, self.cost.current(), depth);
        info!("New keyframe with {} points", keyframe.model_size());
        self.cost.set_keyframe(keyframe);
        self.warp.set_pose(Iso3::identity());
        self.warp.reset_brightness();
        let event = KeyframeAdded { pose: self.pose };
        self.listeners.iter_mut().for_each(|listener| listener(&event));
        Ok(())
    }

    /// Current camera pose (camera to world).
    pub fn pose(&self) -> Iso3 {
        self.pose
    }

    /// World pose of the active keyframe.
    pub fn keyframe_pose(&self) -> Option<Iso3> {
        self.cost.keyframe().map(Keyframe::pose)
    }

    /// Active keyframe.
    pub fn keyframe(&self) -> Option<&Keyframe> {
        self.cost.keyframe()
    }

    /// Tracking state.
    pub fn state(&self) -> TrackingState {
        match self.cost.keyframe() {
            Some(_) => TrackingState::Tracking,
            None => TrackingState::NoKeyframe,
        }
    }

    /// Result of the last optimization.
    pub fn last_result(&self) -> Option<&OptimizationResult> {
        self.last_result.as_ref()
    }

    /// Mean squared residual of the last tracked frame.
    pub fn last_ssd(&self) -> Float {
        self.last_result.as_ref().map_or(0.0, |r| r.cost)
    }

    /// Number of valid residuals of the last tracked frame.
    pub fn last_num_pixels(&self) -> usize {
        self.last_result.as_ref().map_or(0, |r| r.num_pixels)
    }

    /// Brightness correction `(alpha, beta)` of the last tracked frame.
    pub fn brightness(&self) -> (Float, Float) {
        self.warp.brightness()
    }

    /// Number of points of the finest keyframe level.
    pub fn model_size(&self) -> usize {
        self.cost.keyframe().map_or(0, Keyframe::model_size)
    }
}

// TESTS #############################################################
