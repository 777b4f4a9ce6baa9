// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Deconvolution of dirty images.


use log::{debug, trace};
use ndarray::{parallel::prelude::*, prelude::*};

use crate::{config::DeconvolutionConfig, image::Image, imaging::ImagingError};

/// Removes the point spread function from a dirty image.
pub trait Deconvolver: Send + Sync {
    /// Returns the model (clean components) and the residual image, both on
    /// the grid of `dirty`.
    fn deconvolve(&self, dirty: &Image, psf: &Image) -> Result<(Image, Image), ImagingError>;
}

impl<T: Deconvolver + ?Sized> Deconvolver for &T {
    fn deconvolve(&self, dirty: &Image, psf: &Image) -> Result<(Image, Image), ImagingError> {
        (**self).deconvolve(dirty, psf)
    }
}

/// Högbom CLEAN, run independently on every `[chan][pol]` plane.
///
/// The PSF is centred on its peak and may be any size; it is truncated at the
/// edges of the dirty image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hogbom {
    /// The maximum number of components per plane.
    pub niter: usize,

    /// The fraction of the peak removed per component.
    pub gain: f64,

    /// Stop when the absolute peak residual falls below this.
    pub threshold: f64,

    /// Stop when the absolute peak residual falls below this fraction of the
    /// plane's initial absolute peak.
    pub fractional_threshold: f64,
}

impl Default for Hogbom {
    fn default() -> Self {
        Hogbom::from(&DeconvolutionConfig::default())
    }
}

impl From<&DeconvolutionConfig> for Hogbom {
    fn from(c: &DeconvolutionConfig) -> Self {
        Hogbom {
            niter: c.niter,
            gain: c.gain,
            threshold: c.threshold,
            fractional_threshold: c.fractional_threshold,
        }
    }
}

/// The index and value of the largest absolute value.
fn abs_peak(plane: ArrayView2<f64>) -> Option<((usize, usize), f64)> {
    plane
        .indexed_iter()
        .max_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))
        .map(|(i, &v)| (i, v))
}

impl Hogbom {
    /// Clean one plane in place; `model` receives the components.
    fn clean_plane(
        &self,
        mut residual: ArrayViewMut2<f64>,
        mut model: ArrayViewMut2<f64>,
        psf: ArrayView2<f64>,
    ) -> usize {
        let ((psf_y, psf_x), psf_peak) = match abs_peak(psf) {
            Some(p) if p.1 != 0.0 => p,
            _ => return 0,
        };
        let (ny, nx) = residual.dim();
        let (psf_ny, psf_nx) = psf.dim();

        let initial_peak = abs_peak(residual.view()).map(|(_, v)| v.abs()).unwrap_or(0.0);
        let stop = self.threshold.max(self.fractional_threshold * initial_peak);

        let mut num_components = 0;
        for _ in 0..self.niter {
            let ((y, x), peak) = match abs_peak(residual.view()) {
                Some(p) => p,
                None => break,
            };
            if peak.abs() <= stop || peak == 0.0 {
                break;
            }
            let amp = self.gain * peak / psf_peak;
            model[[y, x]] += amp;
            num_components += 1;

            // Overlap of the PSF, centred on (y, x), with the image.
            let y0 = y as isize - psf_y as isize;
            let x0 = x as isize - psf_x as isize;
            let by = (-y0).max(0) as usize..psf_ny.min((ny as isize - y0).max(0) as usize);
            let bx = (-x0).max(0) as usize..psf_nx.min((nx as isize - x0).max(0) as usize);
            if by.is_empty() || bx.is_empty() {
                continue;
            }
            let ty = (by.start as isize + y0) as usize..(by.end as isize + y0) as usize;
            let tx = (bx.start as isize + x0) as usize..(bx.end as isize + x0) as usize;
            residual
                .slice_mut(s![ty, tx])
                .scaled_add(-amp, &psf.slice(s![by, bx]));
        }
        num_components
    }
}

impl Deconvolver for Hogbom {
    fn deconvolve(&self, dirty: &Image, psf: &Image) -> Result<(Image, Image), ImagingError> {
        let (nchan, npol, _, _) = dirty.data.dim();
        let (psf_nchan, psf_npol, _, _) = psf.data.dim();
        if (nchan, npol) != (psf_nchan, psf_npol) {
            return Err(ImagingError::shape_mismatch(
                "deconvolution",
                (nchan, npol),
                (psf_nchan, psf_npol),
            ));
        }
        debug!(
            "Högbom CLEAN of a {:?} image, at most {} components per plane",
            dirty.data.dim(),
            self.niter
        );

        let (ny, nx) = dirty.plane_dim();
        let (psf_ny, psf_nx) = psf.plane_dim();
        let num_planes = nchan * npol;
        let reshape_err = |e: ndarray::ShapeError| ImagingError::ShapeMismatch {
            stage: "deconvolution",
            expected: "a contiguous image".to_string(),
            got: e.to_string(),
        };

        // Flatten to [plane][y][x] so every plane can be cleaned in parallel.
        let mut residual = dirty
            .data
            .to_shape((num_planes, ny, nx))
            .map_err(reshape_err)?
            .into_owned();
        let mut model = Array3::<f64>::zeros((num_planes, ny, nx));
        let psf_planes = psf
            .data
            .to_shape((num_planes, psf_ny, psf_nx))
            .map_err(reshape_err)?;

        let num_components: usize = residual
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(model.axis_iter_mut(Axis(0)).into_par_iter())
            .zip(psf_planes.axis_iter(Axis(0)).into_par_iter())
            .map(|((residual, model), psf)| self.clean_plane(residual, model, psf))
            .sum();
        trace!("Högbom CLEAN found {num_components} components");

        let model = dirty.with_data(
            model
                .into_shape_with_order((nchan, npol, ny, nx))
                .map_err(reshape_err)?,
        )?;
        let residual = dirty.with_data(
            residual
                .into_shape_with_order((nchan, npol, ny, nx))
                .map_err(reshape_err)?,
        )?;
        Ok((model, residual))
    }
}

/// Deconvolve `dirty` and add the components to a copy of `model`.
pub fn deconvolve_and_add<D: Deconvolver + ?Sized>(
    deconvolver: &D,
    dirty: &Image,
    psf: &Image,
    model: &Image,
) -> Result<Image, ImagingError> {
    let (components, _) = deconvolver.deconvolve(dirty, psf)?;
    let mut updated = model.clone();
    updated.add(&components)?;
    Ok(updated)
}
