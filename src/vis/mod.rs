// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility datasets, and the row selections used to partition them.

mod gather_scatter;
pub mod iterators;

pub use gather_scatter::{visibility_gather_w, visibility_scatter_w, WScatter};

use std::ops::Range;

use itertools::Either;
use log::trace;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{c64, imaging::ImagingError, math::mean};

/// The (u,v,w) coordinates of a baseline. All units are in wavelengths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UVW {
    pub u: f64,
    pub v: f64,
    pub w: f64,
}

/// A selection of rows of a [`Visibilities`]. Selections never reorder rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSelection {
    /// One boolean per row; selected rows are `true`.
    Mask(Vec<bool>),

    /// A contiguous range of row indices.
    Range(Range<usize>),
}

impl RowSelection {
    /// The selected row indices, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        match self {
            RowSelection::Mask(mask) => Either::Left(
                mask.iter()
                    .enumerate()
                    .filter(|(_, selected)| **selected)
                    .map(|(i, _)| i),
            ),
            RowSelection::Range(range) => Either::Right(range.clone()),
        }
    }

    /// The number of selected rows.
    pub fn len(&self) -> usize {
        match self {
            RowSelection::Mask(mask) => mask.iter().filter(|&&b| b).count(),
            RowSelection::Range(range) => range.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that this selection can be applied to a dataset with `num_rows`
    /// rows.
    fn check(&self, num_rows: usize) -> Result<(), ImagingError> {
        match self {
            RowSelection::Mask(mask) if mask.len() != num_rows => Err(
                ImagingError::shape_mismatch("row selection", num_rows, mask.len()),
            ),
            RowSelection::Range(range) if range.end > num_rows || range.start > range.end => Err(
                ImagingError::shape_mismatch("row selection", 0..num_rows, range),
            ),
            _ => Ok(()),
        }
    }
}

/// An ordered sequence of visibility measurement rows.
///
/// Each row has a complex visibility and a weight per polarisation, a baseline
/// [`UVW`] in wavelengths, a timestamp and integration time \[seconds\], a
/// frequency \[Hz\] and the indices of the two antennas forming the baseline.
/// All per-row vectors have the same length, and `vis` and `weight` have the
/// same shape `[row][pol]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Visibilities {
    pub vis: Array2<c64>,
    pub weight: Array2<f64>,
    pub uvw: Vec<UVW>,
    pub time: Vec<f64>,
    pub integration_time: Vec<f64>,
    pub frequency: Vec<f64>,
    pub antenna1: Vec<usize>,
    pub antenna2: Vec<usize>,
}

impl Visibilities {
    /// Create a new dataset, checking that all of the columns agree on the
    /// number of rows.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vis: Array2<c64>,
        weight: Array2<f64>,
        uvw: Vec<UVW>,
        time: Vec<f64>,
        integration_time: Vec<f64>,
        frequency: Vec<f64>,
        antenna1: Vec<usize>,
        antenna2: Vec<usize>,
    ) -> Result<Visibilities, ImagingError> {
        let num_rows = vis.len_of(Axis(0));
        if weight.dim() != vis.dim() {
            return Err(ImagingError::shape_mismatch(
                "visibility weights",
                vis.dim(),
                weight.dim(),
            ));
        }
        for (name, len) in [
            ("uvw", uvw.len()),
            ("time", time.len()),
            ("integration_time", integration_time.len()),
            ("frequency", frequency.len()),
            ("antenna1", antenna1.len()),
            ("antenna2", antenna2.len()),
        ] {
            if len != num_rows {
                return Err(ImagingError::ShapeMismatch {
                    stage: "visibility columns",
                    expected: format!("{num_rows} rows"),
                    got: format!("{len} rows in {name}"),
                });
            }
        }

        Ok(Visibilities {
            vis,
            weight,
            uvw,
            time,
            integration_time,
            frequency,
            antenna1,
            antenna2,
        })
    }

    /// A dataset with no rows.
    pub fn empty(num_pols: usize) -> Visibilities {
        Visibilities {
            vis: Array2::zeros((0, num_pols)),
            weight: Array2::zeros((0, num_pols)),
            uvw: vec![],
            time: vec![],
            integration_time: vec![],
            frequency: vec![],
            antenna1: vec![],
            antenna2: vec![],
        }
    }

    pub fn num_rows(&self) -> usize {
        self.vis.len_of(Axis(0))
    }

    pub fn num_pols(&self) -> usize {
        self.vis.len_of(Axis(1))
    }

    /// The w coordinate of every row.
    pub fn w(&self) -> impl Iterator<Item = f64> + '_ {
        self.uvw.iter().map(|uvw| uvw.w)
    }

    /// The largest |w| over all rows. `None` if there are no rows.
    pub fn max_abs_w(&self) -> Option<f64> {
        self.w().map(f64::abs).reduce(f64::max)
    }

    /// The mean w over all rows. `None` if there are no rows.
    pub fn mean_w(&self) -> Option<f64> {
        mean(self.w())
    }

    /// The sum of all weights.
    pub fn sum_weights(&self) -> f64 {
        self.weight.sum()
    }

    /// Copy this dataset with all visibilities set to zero.
    pub fn zeroed(&self) -> Visibilities {
        Visibilities {
            vis: Array2::zeros(self.vis.dim()),
            ..self.clone()
        }
    }

    /// Copy this dataset with `offset` added to every w coordinate. The
    /// original is untouched, so concurrent readers never see shifted values.
    pub fn with_w_offset(&self, offset: f64) -> Visibilities {
        let mut shifted = self.clone();
        shifted.uvw.iter_mut().for_each(|uvw| uvw.w += offset);
        shifted
    }

    /// Copy the selected rows into a new dataset, preserving their order.
    pub fn select(&self, rows: &RowSelection) -> Result<Visibilities, ImagingError> {
        rows.check(self.num_rows())?;
        let indices: Vec<usize> = rows.iter().collect();
        trace!("Selecting {} of {} rows", indices.len(), self.num_rows());
        let pick = |v: &[f64]| indices.iter().map(|&i| v[i]).collect::<Vec<_>>();
        let pick_usize = |v: &[usize]| indices.iter().map(|&i| v[i]).collect::<Vec<_>>();
        Ok(Visibilities {
            vis: self.vis.select(Axis(0), &indices),
            weight: self.weight.select(Axis(0), &indices),
            uvw: indices.iter().map(|&i| self.uvw[i]).collect(),
            time: pick(&self.time),
            integration_time: pick(&self.integration_time),
            frequency: pick(&self.frequency),
            antenna1: pick_usize(&self.antenna1),
            antenna2: pick_usize(&self.antenna2),
        })
    }

    /// Overwrite the visibilities of the selected rows with those of `part`,
    /// which must have exactly one row per selected row.
    pub fn insert_rows(
        &mut self,
        rows: &RowSelection,
        part: &Visibilities,
    ) -> Result<(), ImagingError> {
        rows.check(self.num_rows())?;
        if rows.len() != part.num_rows() || self.num_pols() != part.num_pols() {
            return Err(ImagingError::shape_mismatch(
                "visibility row insertion",
                (rows.len(), self.num_pols()),
                part.vis.dim(),
            ));
        }
        for (i_part, i_row) in rows.iter().enumerate() {
            self.vis.row_mut(i_row).assign(&part.vis.row(i_part));
        }
        Ok(())
    }

    /// Check that `other` has the same row layout as this dataset.
    fn check_layout(&self, other: &Visibilities, stage: &'static str) -> Result<(), ImagingError> {
        if self.vis.dim() != other.vis.dim() {
            return Err(ImagingError::shape_mismatch(
                stage,
                self.vis.dim(),
                other.vis.dim(),
            ));
        }
        Ok(())
    }

    /// Add the visibilities of `other` into this dataset, row by row.
    pub fn add_vis(&mut self, other: &Visibilities) -> Result<(), ImagingError> {
        self.check_layout(other, "visibility addition")?;
        self.vis += &other.vis;
        Ok(())
    }

    /// Return a copy of this dataset with the visibilities of `model`
    /// subtracted row by row.
    pub fn subtract(&self, model: &Visibilities) -> Result<Visibilities, ImagingError> {
        self.check_layout(model, "visibility subtraction")?;
        let mut residual = self.clone();
        residual.vis -= &model.vis;
        Ok(residual)
    }
}
