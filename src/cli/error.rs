// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all hyperstack-related errors. This should be the *only*
//! error enum that is publicly visible from the binary.

use thiserror::Error;

use crate::{graph::GraphError, imaging::ImagingError};

#[derive(Error, Debug)]
pub enum HyperstackError {
    /// An imaging operator or its configuration was invalid.
    #[error(transparent)]
    Imaging(#[from] ImagingError),

    /// A node of an imaging pipeline failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Error when trying to read or interpret an argument file.
    #[error("{0}")]
    ArgFile(String),

    /// Bad simulate arguments.
    #[error("{0}")]
    Simulate(String),

    /// Error when serialising results.
    #[error("Couldn't write json: {0}")]
    Json(#[from] serde_json::Error),

    /// A logger was already installed.
    #[error("Couldn't initialise logging: {0}")]
    Logging(#[from] log::SetLoggerError),

    /// An IO error.
    #[error(transparent)]
    IO(#[from] std::io::Error),
}
