// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision.
 */

pub use std::f64::consts::{PI, TAU};

/// The default fractional loss of amplitude tolerated from the w term when
/// deriving a w-slice width.
pub const DEFAULT_WLOSS: f64 = 0.02;

/// The most w slices a dataset may be partitioned into.
pub const MAX_W_SLICES: usize = 1 << 16;

/// The default number of facets on each image axis.
pub const DEFAULT_FACETS: usize = 1;

/// By default, inverted images are normalised by the sum of weights.
pub const DEFAULT_NORMALIZE: bool = true;

/// The default maximum number of CLEAN components.
pub const DEFAULT_CLEAN_NITER: usize = 100;

/// The default CLEAN loop gain.
pub const DEFAULT_CLEAN_GAIN: f64 = 0.1;

/// The default absolute CLEAN threshold [Jy].
pub const DEFAULT_CLEAN_THRESHOLD: f64 = 0.0;

/// The default CLEAN threshold as a fraction of the initial peak.
pub const DEFAULT_CLEAN_FRACTIONAL_THRESHOLD: f64 = 0.1;

/// The default maximum number of gain-calibration iterations.
pub const DEFAULT_CAL_MAX_ITERATIONS: usize = 50;

/// The default gain-calibration stop threshold. Iteration stops when the
/// largest squared change of any antenna gain falls below this.
pub const DEFAULT_CAL_STOP_THRESHOLD: f64 = 1e-8;
