// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all imaging-related errors.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImagingError {
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    #[error("Shape mismatch in {stage}: expected {expected}, got {got}")]
    ShapeMismatch {
        stage: &'static str,
        expected: String,
        got: String,
    },

    #[error("The summed weight of all inverted partitions is not positive; nothing usable was inverted")]
    EmptyAccumulation,

    #[error("Unsupported correction: {0}")]
    UnsupportedCorrection(String),
}

impl ImagingError {
    pub(crate) fn shape_mismatch<E: std::fmt::Debug, G: std::fmt::Debug>(
        stage: &'static str,
        expected: E,
        got: G,
    ) -> ImagingError {
        ImagingError::ShapeMismatch {
            stage,
            expected: format!("{expected:?}"),
            got: format!("{got:?}"),
        }
    }
}
