// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Predict and invert transforms, and the operators that partition them.
//!
//! Every operator implements [`Transform`] and takes its inner transform as a
//! value, so partitioning strategies nest in any order; e.g. facets of
//! w-stacking:
//!
//! ```
//! use hyperstack::imaging::{wstack, DftTransform, Facets};
//! use hyperstack::vis::iterators::WSlicing;
//!
//! let transform = Facets::new(wstack(DftTransform::default(), WSlicing::Count(3)), 2);
//! ```

pub mod accumulate;
mod dft;
mod error;
mod facets;
mod iterated;
mod wstack;

pub use dft::DftTransform;
pub use error::ImagingError;
pub(crate) use facets::gather_inverted;
pub use facets::Facets;
pub use iterated::{timeslice, wstack, VisIterated};
pub use wstack::WStackSingle;

use ndarray::prelude::*;

use crate::{
    c64,
    constants::TAU,
    image::Image,
    math::{cexp, n_minus_one},
    vis::Visibilities,
};

/// Flags for an invert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvertOptions {
    /// Make the point spread function instead of the dirty image.
    pub dopsf: bool,

    /// Divide the image by the sum of weights.
    pub normalize: bool,

    /// Also return the imaginary part of the transform.
    pub imaginary: bool,
}

impl Default for InvertOptions {
    fn default() -> Self {
        InvertOptions {
            dopsf: false,
            normalize: crate::constants::DEFAULT_NORMALIZE,
            imaginary: false,
        }
    }
}

/// The result of an invert: an image and its weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Inverted {
    pub image: Image,

    /// The sum of the weights of the inverted samples, per `[chan][pol]`.
    /// Never negative.
    pub weight: Array2<f64>,

    /// The imaginary plane, if it was requested and the transform supports it.
    pub imaginary: Option<Image>,
}

impl Inverted {
    pub fn total_weight(&self) -> f64 {
        self.weight.sum()
    }
}

/// A pair of predict and invert transforms between visibilities and images.
///
/// Implementations must not modify their arguments.
pub trait Transform: Send + Sync {
    /// Predict visibilities for every row of `vis` from `model`. The returned
    /// dataset has the row layout of `vis`; its visibilities are the
    /// prediction alone.
    fn predict(&self, vis: &Visibilities, model: &Image) -> Result<Visibilities, ImagingError>;

    /// Make an image shaped like `template` from `vis`.
    fn invert(
        &self,
        vis: &Visibilities,
        template: &Image,
        opts: &InvertOptions,
    ) -> Result<Inverted, ImagingError>;
}

impl<T: Transform + ?Sized> Transform for &T {
    fn predict(&self, vis: &Visibilities, model: &Image) -> Result<Visibilities, ImagingError> {
        (**self).predict(vis, model)
    }

    fn invert(
        &self,
        vis: &Visibilities,
        template: &Image,
        opts: &InvertOptions,
    ) -> Result<Inverted, ImagingError> {
        (**self).invert(vis, template, opts)
    }
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn predict(&self, vis: &Visibilities, model: &Image) -> Result<Visibilities, ImagingError> {
        (**self).predict(vis, model)
    }

    fn invert(
        &self,
        vis: &Visibilities,
        template: &Image,
        opts: &InvertOptions,
    ) -> Result<Inverted, ImagingError> {
        (**self).invert(vis, template, opts)
    }
}

/// The correction for imaging a w slice with a 2-D transform at a single w.
pub trait WTerm: Send + Sync {
    /// A complex array shaped like `template`, for samples at `w`
    /// [wavelengths].
    fn w_term(&self, template: &Image, w: f64) -> Array4<c64>;
}

impl<T: WTerm + ?Sized> WTerm for &T {
    fn w_term(&self, template: &Image, w: f64) -> Array4<c64> {
        (**self).w_term(template, w)
    }
}

/// The Fresnel w term, `exp(2πi w (n - 1))`. Pixels beyond the horizon are
/// zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct FresnelWTerm;

impl WTerm for FresnelWTerm {
    fn w_term(&self, template: &Image, w: f64) -> Array4<c64> {
        let (ny, nx) = template.plane_dim();
        let plane = Array2::from_shape_fn((ny, nx), |(y, x)| {
            let (l, m) = template.grid.lm(x, y);
            match n_minus_one(l, m) {
                Some(n1) => cexp(TAU * w * n1),
                None => c64::default(),
            }
        });
        plane
            .broadcast(template.data.dim())
            .map(|b| b.to_owned())
            .unwrap_or_else(|| Array4::zeros(template.data.dim()))
    }
}
