// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scatter a dataset into w slices, and gather per-slice results back into the
//! original row layout.

use log::trace;

use super::{
    iterators::{WSlices, WSlicing},
    RowSelection, Visibilities,
};
use crate::imaging::ImagingError;

/// A dataset partitioned into w slices. Empty slices are `None`.
#[derive(Debug, Clone)]
pub struct WScatter {
    /// The dataset that was scattered. Its row layout is the template for
    /// gathering.
    pub vis: Visibilities,

    /// One entry per w slice, with the rows of the slice and their copy.
    pub slices: Vec<Option<(RowSelection, Visibilities)>>,
}

impl WScatter {
    /// The visibilities of slice `i`, if the slice exists and is not empty.
    pub fn slice(&self, i: usize) -> Option<&Visibilities> {
        self.slices.get(i).and_then(|s| s.as_ref()).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

/// Partition `vis` into exactly `vis_slices` slices in w. A dataset without rows
/// gives `vis_slices` empty slices, so that graphs built for a fixed number of
/// slices stay well formed.
pub fn visibility_scatter_w(
    vis: &Visibilities,
    vis_slices: usize,
) -> Result<WScatter, ImagingError> {
    let mut slices = WSlices::new(vis, WSlicing::Count(vis_slices))?
        .map(|rows| match rows {
            Some(rows) => vis.select(&rows).map(|v| Some((rows, v))),
            None => Ok(None),
        })
        .collect::<Result<Vec<_>, _>>()?;
    slices.resize(vis_slices, None);
    trace!(
        "Scattered {} rows into {} w slices ({} empty)",
        vis.num_rows(),
        vis_slices,
        slices.iter().filter(|s| s.is_none()).count()
    );

    Ok(WScatter {
        vis: vis.clone(),
        slices,
    })
}

/// Gather per-slice datasets back into the row layout of the scattered
/// dataset. Rows of slices without a result keep their original visibilities.
pub fn visibility_gather_w(
    scatter: &WScatter,
    parts: &[&Option<Visibilities>],
) -> Result<Visibilities, ImagingError> {
    if parts.len() != scatter.len() {
        return Err(ImagingError::ShapeMismatch {
            stage: "w gather",
            expected: format!("{} slices", scatter.len()),
            got: format!("{} slices", parts.len()),
        });
    }

    let mut gathered = scatter.vis.clone();
    for (slice, part) in scatter.slices.iter().zip(parts) {
        if let (Some((rows, _)), Some(part)) = (slice, part) {
            gathered.insert_rows(rows, part)?;
        }
    }
    Ok(gathered)
}
