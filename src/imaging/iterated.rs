// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Drive an inner transform over the partitions of a dataset.

use log::{debug, trace};
use rayon::prelude::*;

use super::{
    accumulate::sum_invert_results, ImagingError, InvertOptions, Inverted, Transform, WStackSingle,
};
use crate::{
    image::Image,
    vis::{
        iterators::{partitions, VisPartitioning, WSlicing},
        RowSelection, Visibilities,
    },
};

/// Runs an inner transform once per partition of the dataset.
///
/// Predictions of different partitions cover different rows, so they are
/// merged into the row layout of the whole dataset rather than summed. Invert
/// results are accumulated as `Σ(weight · image) / Σ(weight)`, skipping empty
/// partitions; the inner transform always normalises, and the sum is
/// normalised once at the end.
#[derive(Debug, Clone)]
pub struct VisIterated<T> {
    inner: T,
    partitioning: VisPartitioning,
}

impl<T: Transform> VisIterated<T> {
    pub fn new(inner: T, partitioning: VisPartitioning) -> VisIterated<T> {
        VisIterated {
            inner,
            partitioning,
        }
    }
}

/// W-stacking: `base` runs once per w slice, with each slice corrected by the
/// Fresnel w term at its mean w.
pub fn wstack<T: Transform>(base: T, slicing: WSlicing) -> VisIterated<WStackSingle<T>> {
    VisIterated::new(WStackSingle::new(base), VisPartitioning::W(slicing))
}

/// Snapshot imaging: `base` runs once per time slice. If `width` \[seconds\]
/// isn't given, it is derived from the data.
pub fn timeslice<T: Transform>(base: T, width: Option<f64>) -> VisIterated<T> {
    VisIterated::new(base, VisPartitioning::Time(width))
}

impl<T: Transform> Transform for VisIterated<T> {
    fn predict(&self, vis: &Visibilities, model: &Image) -> Result<Visibilities, ImagingError> {
        let selections: Vec<RowSelection> =
            partitions(vis, self.partitioning)?.flatten().collect();
        debug!(
            "Predicting {} rows in {} partitions ({:?})",
            vis.num_rows(),
            selections.len(),
            self.partitioning
        );

        let predictions = selections
            .par_iter()
            .enumerate()
            .map(|(i_part, rows)| {
                trace!("Predicting partition {i_part} ({} rows)", rows.len());
                let part = vis.select(rows)?;
                self.inner.predict(&part, model)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut predicted = vis.zeroed();
        for (rows, part) in selections.iter().zip(predictions.iter()) {
            predicted.insert_rows(rows, part)?;
        }
        Ok(predicted)
    }

    fn invert(
        &self,
        vis: &Visibilities,
        template: &Image,
        opts: &InvertOptions,
    ) -> Result<Inverted, ImagingError> {
        let selections: Vec<Option<RowSelection>> =
            partitions(vis, self.partitioning)?.collect();
        debug!(
            "Inverting {} rows in {} partitions ({:?})",
            vis.num_rows(),
            selections.len(),
            self.partitioning
        );

        let inner_opts = InvertOptions {
            normalize: true,
            ..*opts
        };
        let results = selections
            .par_iter()
            .enumerate()
            .map(|(i_part, rows)| match rows {
                None => {
                    trace!("Partition {i_part} is empty; skipping");
                    Ok(None)
                }
                Some(rows) => {
                    trace!("Inverting partition {i_part} ({} rows)", rows.len());
                    let part = vis.select(rows)?;
                    self.inner.invert(&part, template, &inner_opts).map(Some)
                }
            })
            .collect::<Result<Vec<_>, ImagingError>>()?;

        sum_invert_results(results, opts.normalize)
    }
}
