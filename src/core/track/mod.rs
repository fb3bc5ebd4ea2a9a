// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Useful types and functions for tracking a camera.

pub mod gauss_newton;
pub mod linearizer;
pub mod photometric;
pub mod visual_odometry;
