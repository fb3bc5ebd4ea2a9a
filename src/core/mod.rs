// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Core functionalities of the direct RGB-D odometry.

pub mod camera;
pub mod depth;
pub mod gradient;
pub mod image;
pub mod keyframe;
pub mod multires;
pub mod synthetic;
pub mod track;
pub mod warp;
