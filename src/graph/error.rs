// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from executing a task graph.

use thiserror::Error;

use crate::imaging::ImagingError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// A node's operation failed. The label names the pipeline stage and the
    /// partition the node works on.
    #[error("Graph node '{label}' failed: {source}")]
    Node {
        label: String,
        #[source]
        source: ImagingError,
    },

    #[error("Graph node '{label}' received an input of an unexpected type")]
    WrongType { label: String },

    #[error("No computed value for graph node {index}")]
    Missing { index: usize },
}
