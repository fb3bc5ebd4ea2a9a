// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions to handle datasets compatible with TUM RGB-D.

use nalgebra as na;
use std::fmt;
use std::path::PathBuf;

use crate::core::camera::Intrinsics;
use crate::core::depth::DepthConfig;
use crate::misc::type_aliases::{Float, Iso3};

/// U16 depth values are scaled for better precision.
/// So 5000 in the 16 bits gray png corresponds to 1 meter.
pub const DEPTH_SCALE: Float = 5000.0;

/// Depth interpretation of the TUM RGB-D Kinect images.
pub fn depth_config() -> DepthConfig {
    DepthConfig {
        depth_scale: DEPTH_SCALE,
        ..DepthConfig::default()
    }
}

/// Intrinsics parameters of the ICL-NUIM dataset.
pub const INTRINSICS_ICL_NUIM: Intrinsics = Intrinsics {
    principal_point: (319.5, 239.5),
    focal: (481.20, -480.00),
    skew: 0.0,
};

/// Intrinsics parameters of freiburg 1 (fr1) scenes in the TUM RGB-D dataset.
#[allow(clippy::excessive_precision)]
pub const INTRINSICS_FR1: Intrinsics = Intrinsics {
    principal_point: (318.643_040, 255.313_989),
    focal: (517.306_408, 516.469_215),
    skew: 0.0,
};

/// Intrinsics parameters of freiburg 2 (fr2) scenes in the TUM RGB-D dataset.
#[allow(clippy::excessive_precision)]
pub const INTRINSICS_FR2: Intrinsics = Intrinsics {
    principal_point: (325.141_442, 249.701_764),
    focal: (520.908_620, 521.007_327),
    skew: 0.0,
};

/// Intrinsics parameters of freiburg 3 (fr3) scenes in the TUM RGB-D dataset.
#[allow(clippy::excessive_precision)]
pub const INTRINSICS_FR3: Intrinsics = Intrinsics {
    principal_point: (320.106_653, 247.632_132),
    focal: (535.433_105, 539.212_524),
    skew: 0.0,
};

/// Timestamp and 3D camera pose of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Timestamp of the frame.
    pub timestamp: f64,
    /// Pose (rigid body motion / direct isometry) of the frame.
    pub pose: Iso3,
}

/// Association of two related depth and color timestamps and images file paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    /// Timestamp of the depth image.
    pub depth_timestamp: f64,
    /// File path of the depth image.
    pub depth_file_path: PathBuf,
    /// Timestamp of the color image.
    pub color_timestamp: f64,
    /// File path of the color image.
    pub color_file_path: PathBuf,
}

/// Write Frame data in the TUM RGB-D format for trajectories:
/// `timestamp tx ty tz qx qy qz qw`
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let t = self.pose.translation.vector;
        let q = self.pose.rotation.into_inner().coords;
        write!(
            f,
            "{} {} {} {} {} {} {} {}",
            self.timestamp, t.x, t.y, t.z, q.x, q.y, q.z, q.w
        )
    }
}

/// Parse useful files (trajectories, associations, ...) in a dataset using the TUM RGB-D format.
pub mod parse {
    use super::*;
    use nom::{
        branch::alt,
        bytes::complete::{is_not, tag},
        character::complete::{space0, space1},
        combinator::{all_consuming, map, rest, value},
        number::complete::double,
        sequence::{preceded, terminated, tuple},
        IResult,
    };

    /// Parse an association file into a vector of `Association`.
    pub fn associations(file_content: &str) -> Result<Vec<Association>, String> {
        multi_line(association_line, file_content)
    }

    /// Parse a trajectory file into a vector of `Frame`.
    pub fn trajectory(file_content: &str) -> Result<Vec<Frame>, String> {
        multi_line(trajectory_line, file_content)
    }

    fn multi_line<F, T>(line_parser: F, file_content: &str) -> Result<Vec<T>, String>
    where
        F: Fn(&str) -> IResult<&str, Option<T>>,
    {
        let mut vec_data = Vec::new();
        for (line_number, line) in file_content.lines().enumerate() {
            match line_parser(line) {
                Ok((_, Some(data))) => vec_data.push(data),
                Ok(_) => (),
                Err(_) => return Err(format!("Parsing error at line {}: {}", line_number + 1, line)),
            }
        }
        Ok(vec_data)
    }

    // nom parsers #############################################################

    // Comment or empty line.
    fn ignored(input: &str) -> IResult<&str, ()> {
        alt((value((), preceded(tag("#"), rest)), value((), all_consuming(space0))))(input)
    }

    // Associations --------------------

    // Association line is either a comment or two timestamps and file paths.
    fn association_line(input: &str) -> IResult<&str, Option<Association>> {
        alt((map(ignored, |_| None), map(association, Some)))(input)
    }

    // Parse an association of depth and color timestamps and file paths.
    fn association(input: &str) -> IResult<&str, Association> {
        let (input, (depth_timestamp, _, depth_file_path, _, color_timestamp, _, color_file_path)) =
            all_consuming(terminated(
                tuple((double, space1, path, space1, double, space1, path)),
                space0,
            ))(input)?;
        Ok((
            input,
            Association {
                depth_timestamp,
                depth_file_path,
                color_timestamp,
                color_file_path,
            },
        ))
    }

    fn path(input: &str) -> IResult<&str, PathBuf> {
        map(is_not(" \t\r\n"), PathBuf::from)(input)
    }

    // Trajectory ----------------------

    // Trajectory line is either a comment or a frame timestamp and pose.
    fn trajectory_line(input: &str) -> IResult<&str, Option<Frame>> {
        alt((map(ignored, |_| None), map(frame, Some)))(input)
    }

    // Parse a frame.
    fn frame(input: &str) -> IResult<&str, Frame> {
        let (input, (timestamp, tx, ty, tz, qx, qy, qz, qw)) = all_consuming(terminated(
            tuple((double, number, number, number, number, number, number, number)),
            space0,
        ))(input)?;
        let translation = na::Translation3::new(tx, ty, tz);
        let rotation = na::UnitQuaternion::from_quaternion(na::Quaternion::new(qw, qx, qy, qz));
        Ok((
            input,
            Frame {
                timestamp,
                pose: Iso3::from_parts(translation, rotation),
            },
        ))
    }

    // A number preceded by spaces.
    fn number(input: &str) -> IResult<&str, Float> {
        preceded(space1, double)(input)
    }
} // pub mod parse

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;

    #[test]
    fn parse_associations() {
        let content = "# depth rgb\n\
                       1305031102.160407 depth/1305031102.160407.png 1305031102.175304 rgb/1305031102.175304.png\n\
                       \n\
                       1305031102.194330 depth/1305031102.194330.png 1305031102.211214 rgb/1305031102.211214.png\n";
        let associations = parse::associations(content).unwrap();
        assert_eq!(associations.len(), 2);
        assert_eq!(associations[0].depth_timestamp, 1305031102.160407);
        assert_eq!(
            associations[1].color_file_path,
            PathBuf::from("rgb/1305031102.211214.png")
        );
    }

    #[test]
    fn parse_error_reports_the_line() {
        let content = "# comment\n1.0 depth.png\n";
        let error = parse::associations(content).unwrap_err();
        assert!(error.contains("line 2"));
    }

    #[test]
    fn trajectory_round_trip() {
        let frame = Frame {
            timestamp: 1305031102.5,
            pose: Iso3::new(
                na::Vector3::new(1.25, -0.5, 2.0),
                na::Vector3::new(0.1, -0.2, 0.3),
            ),
        };
        let content = format!("# timestamp tx ty tz qx qy qz qw\n{}\n", frame);
        let frames = parse::trajectory(&content).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp, frame.timestamp);
        approx::assert_relative_eq!(frames[0].pose, frame.pose, epsilon = 1e-12);
    }

    #[test]
    fn tum_depth_config() {
        let config = depth_config();
        assert_eq!(config.depth_pixel_to_z(5000.0), 1.0);
        assert!(config.validate().is_ok());
    }
}
