// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Iterators that partition the rows of a [`Visibilities`].
//!
//! Each iterator is constructed from a dataset and a policy, then lazily yields
//! one [`RowSelection`] per partition. They are `Clone`, so a sequence can be
//! restarted without consulting the dataset again. A typical use is to make a
//! sequence of snapshot images:
//!
//! ```ignore
//! for rows in TimeSlices::new(&vis, None)? {
//!     let snapshot = vis.select(&rows)?;
//!     let dirty = transform.invert(&snapshot, &template, &opts)?;
//! }
//! ```


use log::debug;
use serde::{Deserialize, Serialize};

use super::{RowSelection, Visibilities};
use crate::{constants::MAX_W_SLICES, imaging::ImagingError, math::linspace};

/// How a dataset is partitioned in w.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WSlicing {
    /// The width of each slice [wavelengths]. The number of slices is
    /// `1 + 2 * round(max|w| / width)`.
    Width(f64),

    /// The number of slices. The slice width is `2 * max|w| / count`.
    Count(usize),
}

/// A policy for partitioning the rows of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisPartitioning {
    /// All rows in one partition.
    Whole,

    /// Partition by timestamp. If the width \[seconds\] isn't given, it is
    /// derived from the data.
    Time(Option<f64>),

    /// Partition by w.
    W(WSlicing),

    /// Partition into this many contiguous row ranges.
    Rows(usize),
}

/// Partition the rows of `vis` according to `policy`.
///
/// Every policy yields zero partitions for a dataset without rows. Only
/// [`WSlices`] yields `None` (an empty slice); consumers must skip those
/// without running a transform.
pub fn partitions(
    vis: &Visibilities,
    policy: VisPartitioning,
) -> Result<Partitions, ImagingError> {
    Ok(match policy {
        VisPartitioning::Whole => Partitions::Whole(Some(vis.num_rows()).filter(|&n| n > 0)),
        VisPartitioning::Time(width) => Partitions::Time(TimeSlices::new(vis, width)?),
        VisPartitioning::W(slicing) => Partitions::W(WSlices::new(vis, slicing)?),
        VisPartitioning::Rows(count) => Partitions::Rows(RowSlices::new(vis, count)?),
    })
}

/// The partitions of a dataset under any [`VisPartitioning`].
#[derive(Debug, Clone)]
pub enum Partitions {
    Whole(Option<usize>),
    Time(TimeSlices),
    W(WSlices),
    Rows(RowSlices),
}

impl Iterator for Partitions {
    type Item = Option<RowSelection>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Partitions::Whole(num_rows) => num_rows.take().map(|n| Some(RowSelection::Range(0..n))),
            Partitions::Time(it) => it.next().map(Some),
            Partitions::W(it) => it.next(),
            Partitions::Rows(it) => it.next().map(Some),
        }
    }
}

fn check_width(width: f64, what: &str) -> Result<f64, ImagingError> {
    if width.is_finite() && width > 0.0 {
        Ok(width)
    } else {
        Err(ImagingError::InvalidPartition(format!(
            "{what} must be positive, but got {width}"
        )))
    }
}

/// Partitions of a dataset by time.
///
/// Bucket centres are the unique timestamps rounded to the nearest multiple of
/// the bucket width. A row belongs to the bucket whose centre is within half a
/// width of its timestamp (ties go to the centre its timestamp rounds to).
#[derive(Debug, Clone)]
pub struct TimeSlices {
    /// The bucket of each row, in multiples of `width`.
    row_buckets: Vec<i64>,
    /// The unique buckets, ascending.
    buckets: Vec<i64>,
    width: f64,
    next: usize,
}

impl TimeSlices {
    /// If `width` isn't given, it is the gap between the first two distinct
    /// timestamps, or the integration time if there is only one timestamp.
    pub fn new(vis: &Visibilities, width: Option<f64>) -> Result<TimeSlices, ImagingError> {
        let width = match width {
            Some(w) => check_width(w, "The time-slice width")?,
            None => {
                let mut unique_times = vis.time.clone();
                unique_times.sort_unstable_by(f64::total_cmp);
                unique_times.dedup();
                debug!("Found {} unique times", unique_times.len());
                match unique_times.as_slice() {
                    [] => 1.0,
                    [first, second, ..] => {
                        let w = second - first;
                        debug!("Guessing the time interval to be {w:.2}s");
                        check_width(w, "The time-slice width")?
                    }
                    [_] => check_width(
                        vis.integration_time.first().copied().unwrap_or(0.0),
                        "The integration time",
                    )?,
                }
            }
        };

        let row_buckets: Vec<i64> = vis
            .time
            .iter()
            .map(|t| (t / width).round() as i64)
            .collect();
        let mut buckets = row_buckets.clone();
        buckets.sort_unstable();
        buckets.dedup();

        Ok(TimeSlices {
            row_buckets,
            buckets,
            width,
            next: 0,
        })
    }

    /// The bucket width \[seconds\].
    pub fn width(&self) -> f64 {
        self.width
    }

    /// The bucket centres \[seconds\].
    pub fn centres(&self) -> Vec<f64> {
        self.buckets
            .iter()
            .map(|&b| b as f64 * self.width)
            .collect()
    }
}

impl Iterator for TimeSlices {
    type Item = RowSelection;

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = *self.buckets.get(self.next)?;
        self.next += 1;
        Some(RowSelection::Mask(
            self.row_buckets.iter().map(|&b| b == bucket).collect(),
        ))
    }
}

/// The number of w slices `slicing` makes of data whose largest |w| is
/// `wmaxabs`. More than [`MAX_W_SLICES`] is an error.
pub fn w_slice_count(wmaxabs: f64, slicing: WSlicing) -> Result<usize, ImagingError> {
    let count = match slicing {
        WSlicing::Width(width) => {
            let width = check_width(width, "The w-slice width")?;
            1.0 + 2.0 * (wmaxabs / width).round()
        }
        WSlicing::Count(0) => {
            return Err(ImagingError::InvalidPartition(
                "The number of w slices must be positive".to_string(),
            ))
        }
        WSlicing::Count(count) => count as f64,
    };
    // Also catches a NaN.
    if !(count <= MAX_W_SLICES as f64) {
        return Err(ImagingError::InvalidPartition(format!(
            "{count} w slices (max |w| = {wmaxabs}) is more than the limit of {MAX_W_SLICES}"
        )));
    }
    Ok(count as usize)
}

/// Partitions of a dataset by w.
///
/// Slice centres are evenly spaced over `[-max|w|, +max|w|]`. Each row belongs
/// to the slice with the nearest centre, so every row is in exactly one slice.
/// Slices without any rows are yielded as `None`.
#[derive(Debug, Clone)]
pub struct WSlices {
    /// The slice of each row.
    row_slices: Vec<usize>,
    centres: Vec<f64>,
    width: f64,
    next: usize,
}

impl WSlices {
    pub fn new(vis: &Visibilities, slicing: WSlicing) -> Result<WSlices, ImagingError> {
        // Validate the policy before looking at the data, so that bad input is
        // reported even for an empty dataset.
        w_slice_count(0.0, slicing)?;

        let wmaxabs = match vis.max_abs_w() {
            Some(w) => w,
            None => {
                return Ok(WSlices {
                    row_slices: vec![],
                    centres: vec![],
                    width: 0.0,
                    next: 0,
                })
            }
        };

        let count = w_slice_count(wmaxabs, slicing)?;
        let width = match slicing {
            WSlicing::Width(width) => width,
            WSlicing::Count(count) => 2.0 * wmaxabs / count as f64,
        };
        let centres = if count == 1 {
            vec![0.0]
        } else {
            linspace(-wmaxabs, wmaxabs, count)
        };
        debug!("Using {count} w slices of width {width} wavelengths (max |w| = {wmaxabs})");

        let row_slices = if count == 1 {
            vec![0; vis.num_rows()]
        } else if wmaxabs == 0.0 {
            // All centres coincide; use the middle slice.
            vec![(count - 1) / 2; vis.num_rows()]
        } else {
            let spacing = 2.0 * wmaxabs / (count - 1) as f64;
            vis.w()
                .map(|w| {
                    let i = ((w + wmaxabs) / spacing).round();
                    (i.max(0.0) as usize).min(count - 1)
                })
                .collect()
        };

        Ok(WSlices {
            row_slices,
            centres,
            width,
            next: 0,
        })
    }

    /// The nominal slice width [wavelengths].
    pub fn width(&self) -> f64 {
        self.width
    }

    /// The slice centres [wavelengths].
    pub fn centres(&self) -> &[f64] {
        &self.centres
    }
}

impl Iterator for WSlices {
    type Item = Option<RowSelection>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.centres.len() {
            return None;
        }
        let i_slice = self.next;
        self.next += 1;

        let mask: Vec<bool> = self.row_slices.iter().map(|&s| s == i_slice).collect();
        if mask.iter().any(|&b| b) {
            Some(Some(RowSelection::Mask(mask)))
        } else {
            Some(None)
        }
    }
}

/// Contiguous row ranges of `ceil(num_rows / count)` rows; the last range holds
/// whatever remains.
#[derive(Debug, Clone)]
pub struct RowSlices {
    num_rows: usize,
    step: usize,
    next: usize,
}

impl RowSlices {
    pub fn new(vis: &Visibilities, count: usize) -> Result<RowSlices, ImagingError> {
        if count == 0 {
            return Err(ImagingError::InvalidPartition(
                "The number of row slices must be positive".to_string(),
            ));
        }
        let num_rows = vis.num_rows();
        Ok(RowSlices {
            num_rows,
            step: num_rows.div_ceil(count).max(1),
            next: 0,
        })
    }
}

impl Iterator for RowSlices {
    type Item = RowSelection;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.num_rows {
            return None;
        }
        let start = self.next;
        let end = (start + self.step).min(self.num_rows);
        self.next = end;
        Some(RowSelection::Range(start..end))
    }
}
