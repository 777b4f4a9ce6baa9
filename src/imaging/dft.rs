// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A base transform by direct Fourier summation.

use log::debug;
use ndarray::{parallel::prelude::*, prelude::*, Zip};

use super::{ImagingError, Inverted, InvertOptions, Transform};
use crate::{
    c64,
    image::Image,
    math::{cexp, fourier_phase, n_minus_one},
    vis::Visibilities,
};

/// Predict and invert by summing over every (row, pixel) pair.
///
/// Predict computes `V = Σ I(l,m) exp(-2πi(ul + vm))` over the pixels of the
/// model and invert is its weighted adjoint. If `w_projection` is set, the
/// phase also includes `w(n - 1)`, making the transform exact for
/// non-coplanar arrays. Pixels beyond the horizon are ignored.
///
/// Rows are assigned to the image channel nearest their frequency. This is
/// slow, but simple enough to test all of the partitioning operators against.
#[derive(Debug, Clone, Copy, Default)]
pub struct DftTransform {
    pub w_projection: bool,
}

/// A pixel on the sky.
#[derive(Debug, Clone, Copy)]
struct SkyPixel {
    y: usize,
    x: usize,
    l: f64,
    m: f64,
    /// n - 1
    n1: f64,
}

impl DftTransform {
    fn sky_pixels(image: &Image) -> Vec<SkyPixel> {
        let (ny, nx) = image.plane_dim();
        let mut pixels = Vec::with_capacity(ny * nx);
        for y in 0..ny {
            for x in 0..nx {
                let (l, m) = image.grid.lm(x, y);
                if let Some(n1) = n_minus_one(l, m) {
                    pixels.push(SkyPixel { y, x, l, m, n1 });
                }
            }
        }
        pixels
    }

    fn check_pols(
        vis: &Visibilities,
        image: &Image,
        stage: &'static str,
    ) -> Result<(), ImagingError> {
        if vis.num_pols() != image.num_pols() {
            return Err(ImagingError::ShapeMismatch {
                stage,
                expected: format!("{} polarisations", image.num_pols()),
                got: format!("{} polarisations", vis.num_pols()),
            });
        }
        Ok(())
    }
}

impl Transform for DftTransform {
    fn predict(&self, vis: &Visibilities, model: &Image) -> Result<Visibilities, ImagingError> {
        Self::check_pols(vis, model, "DFT predict")?;
        debug!(
            "DFT predict of {} rows from a {:?} model",
            vis.num_rows(),
            model.data.dim()
        );
        if model.num_chans() == 0 {
            return Ok(vis.zeroed());
        }
        let pixels = Self::sky_pixels(model);
        let w_projection = self.w_projection;

        let mut predicted = Array2::<c64>::zeros(vis.vis.dim());
        predicted
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(vis.uvw.par_iter())
            .zip(vis.frequency.par_iter())
            .for_each(|((mut vis_row, uvw), &freq)| {
                let chan = model.grid.channel(freq);
                let w = if w_projection { Some(uvw.w) } else { None };
                vis_row.iter_mut().enumerate().for_each(|(pol, v)| {
                    let plane = model.data.slice(s![chan, pol, .., ..]);
                    *v = pixels
                        .iter()
                        .filter_map(|p| {
                            let flux = plane[[p.y, p.x]];
                            if flux == 0.0 {
                                None
                            } else {
                                let phase = fourier_phase(uvw.u, uvw.v, w, p.l, p.m, p.n1);
                                Some(cexp(-phase) * flux)
                            }
                        })
                        .sum();
                });
            });

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
        Self::check_pols(vis, template, "DFT invert")?;
        debug!(
            "DFT invert of {} rows into a {:?} image (psf: {}, normalise: {})",
            vis.num_rows(),
            template.data.dim(),
            opts.dopsf,
            opts.normalize
        );

        let num_chans = template.num_chans();
        let mut chan_rows = vec![vec![]; num_chans];
        if num_chans > 0 {
            for (i_row, &freq) in vis.frequency.iter().enumerate() {
                chan_rows[template.grid.channel(freq)].push(i_row);
            }
        }

        let mut weight = Array2::<f64>::zeros((num_chans, template.num_pols()));
        weight.indexed_iter_mut().for_each(|((chan, pol), wt)| {
            *wt = chan_rows[chan].iter().map(|&i| vis.weight[[i, pol]]).sum();
        });

        let samples = if opts.dopsf {
            Array2::from_elem(vis.vis.dim(), c64::new(1.0, 0.0))
        } else {
            vis.vis.clone()
        };

        let mut real = Array4::<f64>::zeros(template.data.dim());
        let mut imag = Array4::<f64>::zeros(template.data.dim());
        let w_projection = self.w_projection;
        Zip::indexed(&mut real)
            .and(&mut imag)
            .par_for_each(|(chan, pol, y, x), re, im| {
                let (l, m) = template.grid.lm(x, y);
                let n1 = match n_minus_one(l, m) {
                    Some(n1) => n1,
                    None => return,
                };
                let sum: c64 = chan_rows[chan]
                    .iter()
                    .map(|&i| {
                        let uvw = vis.uvw[i];
                        let w = if w_projection { Some(uvw.w) } else { None };
                        let phase = fourier_phase(uvw.u, uvw.v, w, l, m, n1);
                        samples[[i, pol]] * cexp(phase) * vis.weight[[i, pol]]
                    })
                    .sum();
                *re = sum.re;
                *im = sum.im;
            });

        if opts.normalize {
            super::accumulate::normalize_sumwt(&mut real, &weight);
            super::accumulate::normalize_sumwt(&mut imag, &weight);
        }

        Ok(Inverted {
            image: template.with_data(real)?,
            weight,
            imaginary: if opts.imaginary {
                Some(template.with_data(imag)?)
            } else {
                None
            },
        })
    }
}
