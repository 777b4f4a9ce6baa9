// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Images and the mapping from their pixels to the sky.

pub mod tiling;

pub use tiling::{RasterTiling, Tiling};

use ndarray::prelude::*;
use serde::Serialize;

use crate::imaging::ImagingError;

/// The mapping from pixels to direction cosines (l, m) relative to the phase
/// centre, plus the frequency of each image channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGrid {
    /// The angular size of a pixel [radians].
    pub cellsize: f64,

    /// The (x, y) position of the phase centre in pixels, zero indexed. This
    /// may lie outside the image (e.g. for a facet).
    pub reference_pixel: (f64, f64),

    /// The frequency of each channel \[Hz\].
    pub frequencies: Vec<f64>,
}

impl ImageGrid {
    /// The direction cosines of pixel (x, y).
    #[inline]
    pub fn lm(&self, x: usize, y: usize) -> (f64, f64) {
        (
            (x as f64 - self.reference_pixel.0) * self.cellsize,
            (y as f64 - self.reference_pixel.1) * self.cellsize,
        )
    }

    /// The image channel closest in frequency to `freq`. Images with a single
    /// channel map every frequency to it.
    pub fn channel(&self, freq: f64) -> usize {
        self.frequencies
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - freq).abs().total_cmp(&(*b - freq).abs()))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// The grid of a sub-image whose first pixel is (x0, y0) of this grid.
    pub fn offset(&self, x0: usize, y0: usize) -> ImageGrid {
        ImageGrid {
            cellsize: self.cellsize,
            reference_pixel: (
                self.reference_pixel.0 - x0 as f64,
                self.reference_pixel.1 - y0 as f64,
            ),
            frequencies: self.frequencies.clone(),
        }
    }
}

/// An image with dimensions `[chan][pol][y][x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub data: Array4<f64>,
    pub grid: ImageGrid,
}

impl Image {
    pub fn new(data: Array4<f64>, grid: ImageGrid) -> Result<Image, ImagingError> {
        if data.len_of(Axis(0)) != grid.frequencies.len() {
            return Err(ImagingError::ShapeMismatch {
                stage: "image creation",
                expected: format!("{} channels", grid.frequencies.len()),
                got: format!("{} channels", data.len_of(Axis(0))),
            });
        }
        Ok(Image { data, grid })
    }

    /// A zero-valued image of `npixel` x `npixel` pixels with the phase centre
    /// at pixel (npixel / 2, npixel / 2).
    pub fn zeros(npixel: usize, cellsize: f64, frequencies: Vec<f64>, num_pols: usize) -> Image {
        let centre = (npixel / 2) as f64;
        Image {
            data: Array4::zeros((frequencies.len(), num_pols, npixel, npixel)),
            grid: ImageGrid {
                cellsize,
                reference_pixel: (centre, centre),
                frequencies,
            },
        }
    }

    /// A zero-valued image with the same shape and grid as this one.
    pub fn empty_like(&self) -> Image {
        Image {
            data: Array4::zeros(self.data.dim()),
            grid: self.grid.clone(),
        }
    }

    /// A new image on this image's grid with different pixel values.
    pub fn with_data(&self, data: Array4<f64>) -> Result<Image, ImagingError> {
        self.check_shape(data.dim(), "image data replacement")?;
        Ok(Image {
            data,
            grid: self.grid.clone(),
        })
    }

    pub fn num_chans(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn num_pols(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// (ny, nx)
    pub fn plane_dim(&self) -> (usize, usize) {
        (self.data.len_of(Axis(2)), self.data.len_of(Axis(3)))
    }

    pub(crate) fn check_shape(
        &self,
        dim: (usize, usize, usize, usize),
        stage: &'static str,
    ) -> Result<(), ImagingError> {
        if self.data.dim() != dim {
            return Err(ImagingError::shape_mismatch(stage, self.data.dim(), dim));
        }
        Ok(())
    }

    /// Add another image of the same shape, pixel by pixel.
    pub fn add(&mut self, other: &Image) -> Result<(), ImagingError> {
        self.check_shape(other.data.dim(), "image addition")?;
        self.data += &other.data;
        Ok(())
    }

    /// Summary statistics over all pixels.
    pub fn stats(&self) -> ImageStats {
        let n = self.data.len();
        if n == 0 {
            return ImageStats::default();
        }
        let sum = self.data.sum();
        let mean = sum / n as f64;
        let rms = (self.data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
        let mut abs: Vec<f64> = self.data.iter().map(|x| x.abs()).collect();
        abs.sort_unstable_by(f64::total_cmp);
        let median_abs = if n % 2 == 1 {
            abs[n / 2]
        } else {
            0.5 * (abs[n / 2 - 1] + abs[n / 2])
        };
        ImageStats {
            max: self.data.fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
            min: self.data.fold(f64::INFINITY, |a, &b| a.min(b)),
            rms,
            sum,
            median_abs,
        }
    }
}

/// Summary statistics of an [`Image`]. `rms` is the standard deviation about
/// the mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ImageStats {
    pub max: f64,
    pub min: f64,
    pub rms: f64,
    pub sum: f64,
    pub median_abs: f64,
}

impl std::fmt::Display for ImageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "max {:.4}, min {:.4}, rms {:.4}, sum {:.4}, median |x| {:.4}",
            self.max, self.min, self.rms, self.sum, self.median_abs
        )
    }
}
