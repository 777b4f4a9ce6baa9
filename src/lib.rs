// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Wide-field radio-interferometric imaging.

The 3-D Fourier relationship between visibilities and the sky is approximated
by partitioning the problem in w (w-stacking) and on the sky (faceting),
applying a closed-form correction per partition and recombining. Operators
nest arbitrarily, and [`graph`] composes them into deferred imaging pipelines.
 */

pub mod calibrate;
pub mod cli;
pub mod config;
pub mod constants;
pub mod deconvolve;
pub mod graph;
pub mod image;
pub mod imaging;
pub(crate) mod math;
pub mod simulate;
pub mod vis;

/// Double-precision complex numbers, named the way the rest of the radio
/// astronomy ecosystem does.
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex64;

// Re-exports.
pub use cli::{Hyperstack, HyperstackError};
pub use config::{DeconvolutionConfig, ImagingConfig};
pub use graph::{Graph, GraphError, Handle};
pub use image::{Image, ImageGrid};
pub use imaging::{ImagingError, InvertOptions, Inverted, Transform};
pub use vis::{RowSelection, Visibilities, UVW};
