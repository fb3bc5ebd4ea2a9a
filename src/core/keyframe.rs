// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Keyframes: sets of 3D reference points extracted at every pyramid level.

use log::{debug, warn};

use crate::core::camera::Intrinsics;
use crate::core::depth::DepthConfig;
use crate::core::gradient;
use crate::core::image::Image;
use crate::core::multires::{ImagePyramid, Levels};
use crate::core::warp::{Convention, Warp, WarpKind};
use crate::misc::type_aliases::{Float, Iso3, Point2, Point3, Vec2, Vec8};

/// A point of the keyframe that photometric alignment tries to match.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePoint {
    /// 3D position in the keyframe camera frame.
    pub position: Point3,
    /// Intensity of the keyframe image at this point.
    pub intensity: Float,
    /// Pixel coordinates at its pyramid level.
    pub pixel: Point2,
    /// Intensity gradient at its pyramid level.
    pub gradient: Vec2,
    /// Jacobian row frozen at keyframe creation, if the linearization needs one.
    pub jacobian: Option<Vec8>,
}

/// Reference points of one pyramid level, in raster order.
pub type ReferenceLevel = Vec<ReferencePoint>;

/// Scores a reference point, higher is more informative.
pub type SelectionScore = fn(&ReferencePoint) -> Float;

/// Default information score: the squared norm of the point Jacobian,
/// or of its intensity gradient if it has no Jacobian.
pub fn jacobian_squared_norm(point: &ReferencePoint) -> Float {
    match &point.jacobian {
        Some(jacobian) => jacobian.norm_squared(),
        None => point.gradient.norm_squared(),
    }
}

/// Point selection parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Minimum gradient magnitude of a reference point.
    pub gradient_threshold: Float,
    /// Keep only the most informative points of each level.
    pub use_information_selection: bool,
    /// Fraction of valid points kept when selecting by information.
    pub selection_pixel_percentage: Float,
    /// Score used for the information selection.
    pub selection_score: SelectionScore,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gradient_threshold: 0.02,
            use_information_selection: false,
            selection_pixel_percentage: 0.3,
            selection_score: jacobian_squared_norm,
        }
    }
}

/// The reference of the alignment, built from one RGB-D frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pose: Iso3,
    levels: Levels<ReferenceLevel>,
}

impl Keyframe {
    /// World pose of the keyframe camera.
    pub fn pose(&self) -> Iso3 {
        self.pose
    }

    /// Reference points of a level.
    pub fn level(&self, level: usize) -> &ReferenceLevel {
        &self.levels[level]
    }

    /// Number of levels.
    pub fn nb_levels(&self) -> usize {
        self.levels.len()
    }

    /// Iterate over levels, finest first.
    pub fn levels(&self) -> impl Iterator<Item = &ReferenceLevel> {
        self.levels.iter()
    }

    /// Number of points of the finest level.
    pub fn model_size(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }
}

/// Builds keyframes with a fixed camera, depth sensor and selection strategy.
#[derive(Debug, Clone)]
pub struct KeyframeBuilder {
    config: Config,
    depth: DepthConfig,
    intrinsics: Levels<Intrinsics>,
    warp_kind: WarpKind,
    freeze_jacobians: bool,
}

impl KeyframeBuilder {
    /// `intrinsics` holds the camera of every pyramid level.
    /// When `freeze_jacobians` is set, each point stores its Jacobian
    /// computed on the keyframe, for inverse compositional alignment.
    pub fn new(
        config: Config,
        depth: DepthConfig,
        intrinsics: Levels<Intrinsics>,
        warp_kind: WarpKind,
        freeze_jacobians: bool,
    ) -> Self {
        Self {
            config,
            depth,
            intrinsics,
            warp_kind,
            freeze_jacobians,
        }
    }

    /// Extract the reference points of every level.
    /// `depth` is the full resolution raw depth image.
    #[allow(clippy::cast_possible_wrap)]
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(&self, pose: Iso3, gray: &ImagePyramid, depth: &Image) -> Keyframe {
        let levels: Levels<ReferenceLevel> = gray
            .iter()
            .zip(self.intrinsics.iter())
            .enumerate()
            .map(|(level, (img, intrinsics))| {
                let to_full_res = gray.scale_factor().powi(-(level as i32));
                let points = self.build_level(img, to_full_res, intrinsics, depth);
                debug!("Keyframe level {}: {} reference points", level, points.len());
                points
            })
            .collect();
        if levels.first().map_or(true, Vec::is_empty) {
            warn!("Keyframe has no reference point at full resolution");
        }
        Keyframe { pose, levels }
    }

    /// `to_full_res` maps level pixel sizes to full resolution ones.
    #[allow(clippy::cast_precision_loss)]
    fn build_level(&self, img: &Image, to_full_res: Float, intrinsics: &Intrinsics, depth: &Image) -> ReferenceLevel {
        let (nrows, ncols) = img.shape();
        let (gx, gy) = gradient::centered(img);
        let gradient_norm_2 = gradient::squared_norm(&gx, &gy);
        let threshold_2 = self.config.gradient_threshold * self.config.gradient_threshold;
        let reference_warp = Warp::new(self.warp_kind, Convention::Inverse);
        let mut points = Vec::new();
        for y in 1..nrows.saturating_sub(1) {
            for x in 1..ncols.saturating_sub(1) {
                if gradient_norm_2[(y, x)] < threshold_2 {
                    continue;
                }
                let gradient = Vec2::new(gx[(y, x)], gy[(y, x)]);
                let full_res = Point2::new(
                    (x as Float + 0.5) * to_full_res - 0.5,
                    (y as Float + 0.5) * to_full_res - 0.5,
                );
                let z = match self.depth.interpolate_depth(depth, &full_res) {
                    Some(z) => z,
                    None => continue,
                };
                let pixel = Point2::new(x as Float, y as Float);
                let position = intrinsics.back_project(pixel, z);
                let intensity = img[(y, x)];
                let screen = reference_warp.screen_jacobian(&position, intrinsics);
                let jacobian = reference_warp.compute_jacobian(&screen, &gradient, intensity);
                points.push(ReferencePoint {
                    position,
                    intensity,
                    pixel,
                    gradient,
                    jacobian: Some(jacobian),
                });
            }
        }
        if self.config.use_information_selection {
            points = select_most_informative(
                points,
                self.config.selection_pixel_percentage,
                self.config.selection_score,
            );
        }
        if !self.freeze_jacobians {
            points.iter_mut().for_each(|p| p.jacobian = None);
        }
        points
    }
}

/// Keep the `ceil(fraction * n)` points with the highest score,
/// in their original order.
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn select_most_informative(
    points: Vec<ReferencePoint>,
    fraction: Float,
    score: SelectionScore,
) -> Vec<ReferencePoint> {
    let nb_kept = ((fraction * points.len() as Float).ceil().max(0.0) as usize).min(points.len());
    let scores: Vec<Float> = points.iter().map(score).collect();
    let mut ranking: Vec<usize> = (0..points.len()).collect();
    // Stable sort, ties keep the raster order.
    ranking.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    let mut kept = vec![false; points.len()];
    ranking.into_iter().take(nb_kept).for_each(|i| kept[i] = true);
    points
        .into_iter()
        .zip(kept)
        .filter_map(|(point, keep)| if keep { Some(point) } else { None })
        .collect()
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    fn intrinsics() -> Intrinsics {
        Intrinsics {
            principal_point: (15.5, 11.5),
            focal: (30.0, 30.0),
            skew: 0.0,
        }
    }

    /// Vertical stripes on a fronto-parallel plane at 2 meters.
    fn frame() -> (ImagePyramid, Image) {
        let gray = Image::from_fn(24, 32, |_, j| 0.5 + 0.4 * (0.6 * j as Float).sin());
        let depth = Image::repeat(24, 32, 10_000.0);
        (ImagePyramid::from_image(2, gray).unwrap(), depth)
    }

    fn builder(config: Config, freeze: bool) -> KeyframeBuilder {
        KeyframeBuilder::new(
            config,
            DepthConfig::default(),
            intrinsics().multi_res(2),
            WarpKind::Standard,
            freeze,
        )
    }

    fn point(x: Float, score: Float) -> ReferencePoint {
        ReferencePoint {
            position: Point3::new(0.0, 0.0, 1.0),
            intensity: 0.5,
            pixel: Point2::new(x, 0.0),
            gradient: Vec2::new(score, 0.0),
            jacobian: None,
        }
    }

    #[test]
    fn points_are_on_the_plane_and_in_raster_order() {
        let (gray, depth) = frame();
        let keyframe = builder(Config::default(), true).build(Iso3::identity(), &gray, &depth);
        assert_eq!(keyframe.nb_levels(), 2);
        assert!(keyframe.model_size() > 0);
        for level in keyframe.levels() {
            for p in level {
                assert!((p.position.z - 2.0).abs() < 1e-12);
                assert!(p.jacobian.is_some());
                assert!(p.pixel.x >= 1.0 && p.pixel.y >= 1.0);
                assert!(p.gradient.norm() >= 0.02);
            }
            assert!(level
                .windows(2)
                .all(|w| (w[0].pixel.y, w[0].pixel.x) < (w[1].pixel.y, w[1].pixel.x)));
        }
    }

    #[test]
    fn forward_keyframes_have_no_jacobian() {
        let (gray, depth) = frame();
        let keyframe = builder(Config::default(), false).build(Iso3::identity(), &gray, &depth);
        assert!(keyframe.level(0).iter().all(|p| p.jacobian.is_none()));
    }

    #[test]
    fn missing_depth_removes_points() {
        let (gray, _) = frame();
        let keyframe = builder(Config::default(), true).build(Iso3::identity(), &gray, &Image::zeros(24, 32));
        assert_eq!(keyframe.model_size(), 0);
        assert!(keyframe.level(1).is_empty());
    }

    #[test]
    fn information_selection_keeps_rounded_up_fraction() {
        let (gray, depth) = frame();
        let all = builder(Config::default(), true).build(Iso3::identity(), &gray, &depth);
        let config = Config {
            use_information_selection: true,
            selection_pixel_percentage: 0.3,
            ..Config::default()
        };
        let selected = builder(config, true).build(Iso3::identity(), &gray, &depth);
        let n = all.model_size() as Float;
        assert_eq!(selected.model_size(), (0.3 * n).ceil() as usize);
    }

    #[test]
    fn select_by_score_keeps_order() {
        let points = vec![point(0.0, 1.0), point(1.0, 5.0), point(2.0, 3.0), point(3.0, 4.0)];
        let kept = select_most_informative(points, 0.5, jacobian_squared_norm);
        let xs: Vec<Float> = kept.iter().map(|p| p.pixel.x).collect();
        assert_eq!(xs, vec![1.0, 3.0]);
        let kept = select_most_informative(vec![point(0.0, 1.0)], 0.01, jacobian_squared_norm);
        assert_eq!(kept.len(), 1);
        assert!(select_most_informative(Vec::new(), 0.5, jacobian_squared_norm).is_empty());
    }

    #[test]
    fn custom_score_keeps_the_best_points_in_raster_order() {
        let (gray, depth) = frame();
        let all = builder(Config::default(), false).build(Iso3::identity(), &gray, &depth);
        let right_side: SelectionScore = |p| p.pixel.x;
        let config = Config {
            use_information_selection: true,
            selection_pixel_percentage: 0.3,
            selection_score: right_side,
            ..Config::default()
        };
        let selected = builder(config, false).build(Iso3::identity(), &gray, &depth);
        for (all_level, kept) in all.levels().zip(selected.levels()) {
            assert_eq!(kept.len(), (0.3 * all_level.len() as Float).ceil() as usize);
            assert!(kept.iter().all(|p| p.jacobian.is_none()));
            assert!(kept
                .windows(2)
                .all(|w| (w[0].pixel.y, w[0].pixel.x) < (w[1].pixel.y, w[1].pixel.x)));
            let min_kept = kept.iter().map(|p| p.pixel.x).fold(Float::INFINITY, Float::min);
            let max_dropped = all_level
                .iter()
                .filter(|p| !kept.iter().any(|k| k.pixel == p.pixel))
                .map(|p| p.pixel.x)
                .fold(Float::NEG_INFINITY, Float::max);
            assert!(min_kept >= max_dropped);
        }
    }

    #[test]
    fn default_score_selects_the_same_points_without_frozen_jacobians() {
        let (gray, depth) = frame();
        let config = Config {
            use_information_selection: true,
            selection_pixel_percentage: 0.5,
            ..Config::default()
        };
        let frozen = builder(config.clone(), true).build(Iso3::identity(), &gray, &depth);
        let online = builder(config, false).build(Iso3::identity(), &gray, &depth);
        for (a, b) in frozen.levels().zip(online.levels()) {
            let pixels_a: Vec<Point2> = a.iter().map(|p| p.pixel).collect();
            let pixels_b: Vec<Point2> = b.iter().map(|p| p.pixel).collect();
            assert_eq!(pixels_a, pixels_b);
            assert!(b.iter().all(|p| p.jacobian.is_none()));
        }
    }

    #[test]
    fn coarse_levels_read_depth_at_full_resolution() {
        let gray = Image::from_fn(24, 32, |_, j| 0.5 + 0.4 * (0.6 * j as Float).sin());
        let pyramid = ImagePyramid::from_image(2, gray).unwrap();
        // Depth is linear in the column, so bilinear sampling is exact.
        let depth = Image::from_fn(24, 32, |_, j| 10_000.0 + 100.0 * j as Float);
        let keyframe = builder(Config::default(), true).build(Iso3::identity(), &pyramid, &depth);
        assert!(!keyframe.level(1).is_empty());
        for p in keyframe.level(1) {
            let full_res_x = (p.pixel.x + 0.5) / pyramid.scale_factor() - 0.5;
            let expected_z = (10_000.0 + 100.0 * full_res_x) / 5000.0;
            assert!((p.position.z - expected_z).abs() < 1e-9);
        }
    }

    #[test]
    fn building_twice_gives_identical_sets() {
        let (gray, depth) = frame();
        let b = builder(Config::default(), true);
        assert_eq!(
            b.build(Iso3::identity(), &gray, &depth),
            b.build(Iso3::identity(), &gray, &depth)
        );
    }
}
