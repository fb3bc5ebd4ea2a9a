// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Coarse-to-fine Gauss-Newton minimization of the photometric error,
//! implemented with the `optimizer::State` trait.

use log::debug;

use crate::core::multires::Levels;
use crate::core::track::photometric::{LevelScratch, PhotometricError};
use crate::core::warp::Warp;
use crate::math::optimizer::{self, Continue, State as _};
use crate::misc::type_aliases::{DMat, DVec, Float};

/// Stopping parameters of the Gauss-Newton iterations, shared by all levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimizer {
    /// Maximum number of parameter updates per level.
    pub max_iterations: usize,
    /// Iterations of a level stop when the update norm is lower than this.
    pub min_parameter_update: Float,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            min_parameter_update: 1e-6,
        }
    }
}

/// Outcome of a coarse-to-fine optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    /// Mean squared residual at the last evaluation of the finest level.
    pub cost: Float,
    /// Number of valid residuals at that evaluation.
    /// A step leaving no valid residual is rejected, so this is the count of the last kept warp.
    pub num_pixels: usize,
    /// Number of parameter updates at each level.
    pub iterations: Levels<usize>,
}

impl Optimizer {
    /// Refine the warp, from the coarsest to the finest level.
    /// `scratch` is grown to one arena per level if needed.
    pub fn optimize(
        &self,
        cost: &PhotometricError,
        scratch: &mut Levels<LevelScratch>,
        warp: &mut Warp,
    ) -> OptimizationResult {
        let octaves = cost.octaves();
        if scratch.len() < octaves {
            scratch.resize_with(octaves, LevelScratch::default);
        }
        let mut result = OptimizationResult {
            cost: 0.0,
            num_pixels: 0,
            iterations: vec![0; octaves],
        };
        for level in (0..octaves).rev() {
            let mut obs = Obs {
                cost,
                scratch: &mut scratch[level],
                level,
                max_iterations: self.max_iterations,
                min_parameter_update: self.min_parameter_update,
            };
            let initial = Candidate {
                warp: warp.clone(),
                update_norm: Float::INFINITY,
            };
            let (state, nb_iter) = GaussNewtonState::iterative_solve(&mut obs, initial);
            debug!(
                "Level {}: {} iterations, {} pixels, cost {:.3e}",
                level, nb_iter, state.eval_data.count, state.eval_data.cost
            );
            *warp = state.eval_data.model;
            result.iterations[level] = nb_iter;
            result.cost = state.eval_data.cost;
            result.num_pixels = state.eval_data.count;
        }
        result
    }
}

// Optimizer state #############################################################

/// State of the Gauss-Newton iterations at one level.
pub struct GaussNewtonState {
    /// Data resulting of the last accepted model evaluation.
    pub eval_data: EvalData,
    max_iterations: usize,
    min_parameter_update: Float,
}

/// Data resulting of a model evaluation.
pub struct EvalData {
    /// Gauss-Newton approximation of the hessian, `J^T J`.
    pub hessian: DMat,
    /// Gradient of the cost, `J^T r`.
    pub gradient: DVec,
    /// Mean squared residual.
    pub cost: Float,
    /// Number of valid residuals.
    pub count: usize,
    /// Evaluated warp.
    pub model: Warp,
}

/// A warp to evaluate, with the norm of the update that produced it.
pub struct Candidate {
    /// Warp after the update.
    pub warp: Warp,
    /// Norm of the parameter update.
    pub update_norm: Float,
}

/// `(evaluation, update norm)` of a candidate.
pub type EvalState = (EvalData, Float);

/// Data available for the iterations of one level.
pub struct Obs<'a> {
    /// Cost function.
    pub cost: &'a PhotometricError,
    /// Buffers of the level.
    pub scratch: &'a mut LevelScratch,
    /// Pyramid level.
    pub level: usize,
    /// Maximum number of parameter updates.
    pub max_iterations: usize,
    /// Minimum norm of a parameter update.
    pub min_parameter_update: Float,
}

impl GaussNewtonState {
    /// Evaluate a warp and build its normal equations.
    fn compute_eval_data(obs: &mut Obs, model: Warp) -> EvalData {
        let count = obs.cost.evaluate(&model, obs.scratch, obs.level);
        let jacobians = obs.scratch.jacobians.rows(0, count);
        let residuals = DVec::from_column_slice(obs.scratch.valid_residuals());
        EvalData {
            hessian: jacobians.tr_mul(&jacobians),
            gradient: jacobians.tr_mul(&residuals),
            cost: obs.scratch.mean_squared_residual(),
            count,
            model,
        }
    }
}

impl<'a> optimizer::State<Obs<'a>, EvalState, Candidate> for GaussNewtonState {
    fn init(obs: &mut Obs<'a>, model: Candidate) -> Self {
        Self {
            eval_data: Self::compute_eval_data(obs, model.warp),
            max_iterations: obs.max_iterations,
            min_parameter_update: obs.min_parameter_update,
        }
    }

    /// Solve the normal equations and apply the update to the warp.
    /// No step is possible without residuals or with a singular system.
    fn step(&self) -> Option<Candidate> {
        if self.eval_data.count == 0 {
            debug!("No valid pixel, level considered converged");
            return None;
        }
        let delta = match solve(&self.eval_data.hessian, &self.eval_data.gradient) {
            Some(delta) => delta,
            None => {
                debug!("Singular system, level considered converged");
                return None;
            }
        };
        let mut warp = self.eval_data.model.clone();
        warp.update_parameters(delta.as_slice());
        Some(Candidate {
            warp,
            update_norm: delta.norm(),
        })
    }

    fn eval(&self, obs: &mut Obs<'a>, new_model: Candidate) -> EvalState {
        (Self::compute_eval_data(obs, new_model.warp), new_model.update_norm)
    }

    /// Stop after `max_iterations` updates or when the update is tiny.
    /// A candidate without any valid pixel is rejected.
    fn stop_criterion(self, nb_iter: usize, eval_state: EvalState) -> (Self, Continue) {
        let (eval_data, update_norm) = eval_state;
        if eval_data.count == 0 {
            return (self, Continue::Stop);
        }
        let continuation = if nb_iter >= self.max_iterations || update_norm < self.min_parameter_update {
            Continue::Stop
        } else {
            Continue::Forward
        };
        let kept_state = Self {
            eval_data,
            max_iterations: self.max_iterations,
            min_parameter_update: self.min_parameter_update,
        };
        (kept_state, continuation)
    }
}

/// Gauss-Newton update `-H^-1 b`,
/// with a Cholesky decomposition and an LU fallback.
pub fn solve(hessian: &DMat, gradient: &DVec) -> Option<DVec> {
    let solution = match hessian.clone().cholesky() {
        Some(cholesky) => cholesky.solve(gradient),
        None => hessian.clone().lu().solve(gradient)?,
    };
    if solution.iter().all(|x| x.is_finite()) {
        Some(-solution)
    } else {
        None
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::core::camera::Intrinsics;
    use crate::core::depth::DepthConfig;
    use crate::core::image::Image;
    use crate::core::keyframe::{Config, KeyframeBuilder};
    use crate::core::track::linearizer::LinearizationMode;
    use crate::core::warp::WarpKind;
    use crate::math::optimizer::State;
    use crate::misc::type_aliases::Iso3;
    use approx;

    fn cost() -> PhotometricError {
        let intrinsics = Intrinsics {
            principal_point: (15.5, 11.5),
            focal: (30.0, 30.0),
            skew: 0.0,
        }
        .multi_res(2);
        let gray = Image::from_fn(24, 32, |i, j| {
            0.5 + 0.3 * (0.5 * j as Float).sin() * (0.4 * i as Float).cos()
        });
        let depth = Image::from_fn(24, 32, |i, j| 8000.0 + 100.0 * i as Float + 50.0 * j as Float);
        let builder = KeyframeBuilder::new(
            Config::default(),
            DepthConfig::default(),
            intrinsics.clone(),
            WarpKind::Standard,
            true,
        );
        let mut cost = PhotometricError::new(intrinsics, LinearizationMode::Inverse.linearizer(2));
        cost.set_current_frame(gray).unwrap();
        let keyframe = builder.build(Iso3::identity(), cost.current(), &depth);
        cost.set_keyframe(keyframe);
        cost
    }

    #[test]
    fn solve_positive_definite_system() {
        let hessian = DMat::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let gradient = DVec::from_column_slice(&[2.0, -2.0]);
        let delta = solve(&hessian, &gradient).unwrap();
        approx::assert_relative_eq!(delta, DVec::from_column_slice(&[-1.0, 0.5]));
    }

    #[test]
    fn solve_falls_back_on_lu() {
        // Invertible but not positive definite.
        let hessian = DMat::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let gradient = DVec::from_column_slice(&[1.0, 2.0]);
        let delta = solve(&hessian, &gradient).unwrap();
        approx::assert_relative_eq!(delta, DVec::from_column_slice(&[-2.0, -1.0]));
    }

    #[test]
    fn solve_singular_system_is_none() {
        let hessian = DMat::zeros(6, 6);
        assert!(solve(&hessian, &DVec::zeros(6)).is_none());
    }

    #[test]
    fn identical_frames_stay_at_identity() {
        let cost = cost();
        let mut warp = Warp::new(WarpKind::Standard, LinearizationMode::Inverse.convention());
        let mut scratch = Vec::new();
        let result = Optimizer::default().optimize(&cost, &mut scratch, &mut warp);
        assert_eq!(scratch.len(), 2);
        assert_eq!(result.num_pixels, cost.keyframe().unwrap().model_size());
        assert!(result.cost < 1e-20);
        assert!(result.iterations.iter().all(|&it| it <= 1));
        approx::assert_relative_eq!(warp.pose(), Iso3::identity(), epsilon = 1e-9);
    }

    #[test]
    fn iterations_are_bounded() {
        let cost = cost();
        let mut warp = Warp::new(WarpKind::Standard, LinearizationMode::Inverse.convention());
        warp.set_pose(Iso3::translation(0.01, -0.01, 0.0));
        let optimizer = Optimizer {
            max_iterations: 3,
            min_parameter_update: 0.0,
        };
        let result = optimizer.optimize(&cost, &mut Vec::new(), &mut warp);
        assert!(result.iterations.iter().all(|&it| it <= 3));
        assert!(result.num_pixels > 0);
    }

    #[test]
    fn candidate_without_pixels_is_rejected() {
        let cost = cost();
        let mut scratch = LevelScratch::default();
        let mut obs = Obs {
            cost: &cost,
            scratch: &mut scratch,
            level: 0,
            max_iterations: 10,
            min_parameter_update: 1e-6,
        };
        let warp = Warp::new(WarpKind::Standard, LinearizationMode::Inverse.convention());
        let initial = Candidate {
            warp: warp.clone(),
            update_norm: Float::INFINITY,
        };
        let state = GaussNewtonState::init(&mut obs, initial);
        let count = state.eval_data.count;
        assert!(count > 0);

        // Moved behind the camera, no point projects.
        let mut lost = warp;
        lost.set_pose(Iso3::translation(0.0, 0.0, -10.0));
        let eval_state = state.eval(&mut obs, Candidate { warp: lost, update_norm: 1.0 });
        assert_eq!(eval_state.0.count, 0);
        let (kept, continuation) = state.stop_criterion(1, eval_state);
        assert_eq!(continuation, Continue::Stop);
        assert_eq!(kept.eval_data.count, count);
        assert_eq!(kept.eval_data.model.pose(), Iso3::identity());
    }

    #[test]
    fn without_keyframe_nothing_moves() {
        let intrinsics = Intrinsics {
            principal_point: (15.5, 11.5),
            focal: (30.0, 30.0),
            skew: 0.0,
        };
        let cost = PhotometricError::new(intrinsics.multi_res(2), LinearizationMode::Forward.linearizer(2));
        let mut warp = Warp::new(WarpKind::Standard, LinearizationMode::Forward.convention());
        let result = Optimizer::default().optimize(&cost, &mut Vec::new(), &mut warp);
        assert_eq!(result.num_pixels, 0);
        assert_eq!(result.iterations, vec![0, 0]);
        assert_eq!(warp.pose(), Iso3::identity());
    }
}
