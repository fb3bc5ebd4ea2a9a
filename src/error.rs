// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Configuration errors of the tracking pipeline.
//!
//! All of them are detected before any optimization starts
//! and must be fixed by the caller, nothing is retried.

use thiserror::Error;

/// Error type of the crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// An image does not have the `(rows, cols)` shape the tracker was configured with.
    #[error("{what} has shape {actual:?} but {expected:?} was expected")]
    ShapeMismatch {
        /// Which image is wrong.
        what: &'static str,
        /// Expected `(rows, cols)`.
        expected: (usize, usize),
        /// Received `(rows, cols)`.
        actual: (usize, usize),
    },
    /// The image is too small for the requested number of pyramid octaves.
    #[error("cannot build {octaves} octaves from a {rows}x{cols} image")]
    DegeneratePyramid {
        /// Requested number of octaves.
        octaves: usize,
        /// Rows of the finest image.
        rows: usize,
        /// Columns of the finest image.
        cols: usize,
    },
    /// A configuration value is out of its valid domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An operation needed a frame but none was received yet.
    #[error("no frame has been received yet")]
    NoFrame,
}
