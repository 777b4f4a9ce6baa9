// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Imaging configuration.
//!
//! Every tunable has a documented default, so that an empty configuration is
//! valid. Keys that aren't recognised are collected rather than rejected, so
//! that configurations written for other (e.g. nested) operators still load.


use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    constants::*,
    image::Image,
    imaging::{ImagingError, InvertOptions},
    vis::{
        iterators::{w_slice_count, VisPartitioning, WSlicing},
        Visibilities,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagingConfig {
    /// The number of w slices, if `wstack` isn't given.
    pub vis_slices: Option<usize>,

    /// The width of each w slice [wavelengths]. Takes precedence over
    /// `vis_slices`.
    pub wstack: Option<f64>,

    /// The fractional amplitude loss tolerated from the w term, used to
    /// derive a w-slice width if neither `vis_slices` nor `wstack` is given.
    pub wloss: f64,

    /// The width of time slices [seconds]. If not given, it is derived from
    /// the data.
    pub timeslice: Option<f64>,

    /// Partition the data into this many row ranges instead of time slices.
    pub row_slices: Option<usize>,

    /// The number of facets on each image axis.
    pub facets: usize,

    /// Normalise images by the sum of weights.
    pub normalize: bool,

    /// Make point spread functions rather than dirty images.
    pub dopsf: bool,

    /// Let the base Fourier transform use the exact w term. Only useful as a
    /// reference.
    pub w_projection: bool,

    pub deconvolution: DeconvolutionConfig,

    /// Unrecognised keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        ImagingConfig {
            vis_slices: None,
            wstack: None,
            wloss: DEFAULT_WLOSS,
            timeslice: None,
            row_slices: None,
            facets: DEFAULT_FACETS,
            normalize: DEFAULT_NORMALIZE,
            dopsf: false,
            w_projection: false,
            deconvolution: DeconvolutionConfig::default(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeconvolutionConfig {
    pub niter: usize,
    pub gain: f64,
    pub threshold: f64,
    pub fractional_threshold: f64,
}

impl Default for DeconvolutionConfig {
    fn default() -> Self {
        DeconvolutionConfig {
            niter: DEFAULT_CLEAN_NITER,
            gain: DEFAULT_CLEAN_GAIN,
            threshold: DEFAULT_CLEAN_THRESHOLD,
            fractional_threshold: DEFAULT_CLEAN_FRACTIONAL_THRESHOLD,
        }
    }
}

/// The w-slice width [wavelengths] at which the w term costs at most `wloss`
/// of amplitude across a field of view of `fov` radians.
pub fn w_slice_width(wloss: f64, fov: f64) -> f64 {
    (2.0 * wloss).sqrt() / (PI * fov * fov)
}

impl ImagingConfig {
    /// Check the values that can't be checked by their types. Unknown keys
    /// are logged.
    pub fn validate(&self) -> Result<(), ImagingError> {
        for key in self.extra.keys() {
            debug!("Ignoring unrecognised configuration key '{key}'");
        }
        let invalid = |what: &str| Err(ImagingError::InvalidPartition(what.to_string()));
        if self.facets == 0 {
            return invalid("the number of facets must be positive");
        }
        if self.vis_slices == Some(0) {
            return invalid("the number of w slices must be positive");
        }
        if self.row_slices == Some(0) {
            return invalid("the number of row slices must be positive");
        }
        if matches!(self.wstack, Some(w) if !(w > 0.0)) {
            return invalid("the w-slice width must be positive");
        }
        if matches!(self.timeslice, Some(t) if !(t > 0.0)) {
            return invalid("the time-slice width must be positive");
        }
        if !(self.wloss > 0.0) {
            return invalid("wloss must be positive");
        }
        Ok(())
    }

    /// How to partition the data in w for images shaped like `template`.
    pub fn w_slicing(&self, template: &Image) -> Result<WSlicing, ImagingError> {
        self.validate()?;
        let slicing = match (self.wstack, self.vis_slices) {
            (Some(width), _) => WSlicing::Width(width),
            (None, Some(count)) => WSlicing::Count(count),
            (None, None) => {
                let (ny, nx) = template.plane_dim();
                let fov = ny.max(nx) as f64 * template.grid.cellsize;
                let width = w_slice_width(self.wloss, fov);
                debug!(
                    "Derived a w-slice width of {width:.3} wavelengths from wloss {}",
                    self.wloss
                );
                WSlicing::Width(width)
            }
        };
        Ok(slicing)
    }

    /// The number of w slices to use for `vis`.
    pub fn num_w_slices(
        &self,
        vis: &Visibilities,
        template: &Image,
    ) -> Result<usize, ImagingError> {
        let slicing = self.w_slicing(template)?;
        w_slice_count(vis.max_abs_w().unwrap_or(0.0), slicing)
    }

    /// The flags of the primary invert.
    pub fn invert_options(&self) -> InvertOptions {
        InvertOptions {
            dopsf: self.dopsf,
            normalize: self.normalize,
            imaginary: false,
        }
    }

    /// How the data are split into independent graph inputs.
    pub fn partitioning(&self) -> VisPartitioning {
        match self.row_slices {
            Some(count) => VisPartitioning::Rows(count),
            None => VisPartitioning::Time(self.timeslice),
        }
    }
}
