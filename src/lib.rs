// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Direct photometric RGB-D visual odometry.
//!
//! Frames are aligned to a keyframe by minimizing the difference of intensities
//! between keyframe points, warped with their depth, and the current frame.
//! The entry point is `core::track::visual_odometry::Tracker`.

#![warn(missing_docs)]

pub mod core;
pub mod dataset;
pub mod error;
pub mod math;
pub mod misc;

pub use crate::error::Error;
