// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! W-stacking of a single w partition.

use log::{debug, trace};
use ndarray::{prelude::*, Zip};

use super::{FresnelWTerm, ImagingError, Inverted, InvertOptions, Transform, WTerm};
use crate::{c64, image::Image, vis::Visibilities};

/// Images one w partition with an inner 2-D transform.
///
/// The partition's mean w is removed from the baselines handed to the inner
/// transform, and the missing phase is restored with the w term at that mean
/// w. Baselines are shifted in a private copy; the caller's dataset is never
/// modified.
///
/// Inverting requires the inner transform to return the imaginary plane.
#[derive(Debug, Clone)]
pub struct WStackSingle<T, W = FresnelWTerm> {
    inner: T,
    w_term: W,
}

impl<T: Transform> WStackSingle<T> {
    pub fn new(inner: T) -> WStackSingle<T> {
        WStackSingle {
            inner,
            w_term: FresnelWTerm,
        }
    }
}

impl<T: Transform, W: WTerm> WStackSingle<T, W> {
    pub fn with_w_term(inner: T, w_term: W) -> WStackSingle<T, W> {
        WStackSingle { inner, w_term }
    }

    /// The w term at the mean w of `vis`, and a copy of `vis` with that w
    /// removed.
    fn shift(
        &self,
        vis: &Visibilities,
        image: &Image,
        stage: &'static str,
    ) -> Result<(Visibilities, Array4<c64>), ImagingError> {
        let w_avg = vis.mean_w().unwrap_or(0.0);
        trace!("{stage}: {} rows with mean w {w_avg:.3}", vis.num_rows());
        let w_term = self.w_term.w_term(image, w_avg);
        image.check_shape(w_term.dim(), stage)?;
        Ok((vis.with_w_offset(-w_avg), w_term))
    }
}

impl<T: Transform, W: WTerm> Transform for WStackSingle<T, W> {
    fn predict(&self, vis: &Visibilities, model: &Image) -> Result<Visibilities, ImagingError> {
        debug!("W-stack predict of {} rows", vis.num_rows());
        let (shifted, w_term) = self.shift(vis, model, "w-stack predict")?;

        let real_model = model.with_data(
            Zip::from(&model.data)
                .and(&w_term)
                .map_collect(|&i, wt| i * wt.re),
        )?;
        let imag_model = model.with_data(
            Zip::from(&model.data)
                .and(&w_term)
                .map_collect(|&i, wt| i * wt.im),
        )?;
        let real = self.inner.predict(&shifted, &real_model)?;
        let imag = self.inner.predict(&shifted, &imag_model)?;
        if real.vis.dim() != vis.vis.dim() || imag.vis.dim() != vis.vis.dim() {
            return Err(ImagingError::shape_mismatch(
                "w-stack predict",
                vis.vis.dim(),
                real.vis.dim(),
            ));
        }

        let mut predicted = real.vis;
        Zip::from(&mut predicted)
            .and(&imag.vis)
            .for_each(|r, &i| *r -= c64::i() * i);
        // The baselines of the result are the caller's, not the shifted ones.
        Ok(Visibilities {
            vis: predicted,
            ..vis.clone()
        })
    }

    fn invert(
        &self,
        vis: &Visibilities,
        template: &Image,
        opts: &InvertOptions,
    ) -> Result<Inverted, ImagingError> {
        debug!("W-stack invert of {} rows", vis.num_rows());
        let (shifted, w_term) = self.shift(vis, template, "w-stack invert")?;

        let inner_opts = InvertOptions {
            imaginary: true,
            ..*opts
        };
        let Inverted {
            image: real,
            weight,
            imaginary,
        } = self.inner.invert(&shifted, template, &inner_opts)?;
        let imag = imaginary.ok_or_else(|| {
            ImagingError::UnsupportedCorrection(
                "w-stacking needs the imaginary plane, but the inner transform didn't provide one"
                    .to_string(),
            )
        })?;
        template.check_shape(real.data.dim(), "w-stack invert")?;
        template.check_shape(imag.data.dim(), "w-stack invert")?;

        let corrected = Zip::from(&real.data)
            .and(&imag.data)
            .and(&w_term)
            .map_collect(|&re, &im, wt| re * wt.re - im * wt.im);
        let corrected_imag = if opts.imaginary {
            Some(template.with_data(
                Zip::from(&real.data)
                    .and(&imag.data)
                    .and(&w_term)
                    .map_collect(|&re, &im, wt| re * wt.im + im * wt.re),
            )?)
        } else {
            None
        };

        Ok(Inverted {
            image: template.with_data(corrected)?,
            weight,
            imaginary: corrected_imag,
        })
    }
}
