// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Faceted imaging: run an inner transform per image facet.

use log::{debug, trace};
use rayon::prelude::*;

use super::{ImagingError, Inverted, InvertOptions, Transform};
use crate::{
    image::{Image, RasterTiling, Tiling},
    vis::Visibilities,
};

/// Runs an inner transform on each of `facets * facets` image facets.
///
/// Predict visits facets in the tiling's order, one at a time, adding each
/// facet's prediction for the whole dataset into one accumulator. Invert runs
/// every facet in parallel and gathers the facet images; all facets see the
/// same rows, so the weight is that of the first facet.
#[derive(Debug, Clone)]
pub struct Facets<T, S = RasterTiling> {
    inner: T,
    tiling: S,
    facets: usize,
}

impl<T: Transform> Facets<T> {
    pub fn new(inner: T, facets: usize) -> Facets<T> {
        Facets {
            inner,
            tiling: RasterTiling,
            facets,
        }
    }
}

impl<T: Transform, S: Tiling> Facets<T, S> {
    pub fn with_tiling(inner: T, tiling: S, facets: usize) -> Facets<T, S> {
        Facets {
            inner,
            tiling,
            facets,
        }
    }
}

impl<T: Transform, S: Tiling> Transform for Facets<T, S> {
    fn predict(&self, vis: &Visibilities, model: &Image) -> Result<Visibilities, ImagingError> {
        debug!(
            "Facet predict of {} rows with {} facets per axis",
            vis.num_rows(),
            self.facets
        );
        let tiles = self.tiling.scatter(model, self.facets)?;
        let mut predicted = vis.zeroed();
        for (i_facet, tile) in tiles.iter().enumerate() {
            trace!("Predicting facet {i_facet}");
            let contribution = self.inner.predict(vis, tile)?;
            predicted.add_vis(&contribution)?;
        }
        Ok(predicted)
    }

    fn invert(
        &self,
        vis: &Visibilities,
        template: &Image,
        opts: &InvertOptions,
    ) -> Result<Inverted, ImagingError> {
        debug!(
            "Facet invert of {} rows with {} facets per axis",
            vis.num_rows(),
            self.facets
        );
        let tiles = self.tiling.scatter(template, self.facets)?;
        let results = tiles
            .par_iter()
            .map(|tile| self.inner.invert(vis, tile, opts))
            .collect::<Result<Vec<_>, _>>()?;

        gather_inverted(&self.tiling, results, template, self.facets, opts.imaginary)
    }
}

/// Gather per-facet invert results into one image shaped like `template`.
/// Every facet saw the same rows, so the weight is that of the first facet.
pub(crate) fn gather_inverted<S: Tiling + ?Sized>(
    tiling: &S,
    results: Vec<Inverted>,
    template: &Image,
    facets: usize,
    imaginary: bool,
) -> Result<Inverted, ImagingError> {
    let mut weight = None;
    let mut images = Vec::with_capacity(results.len());
    let mut imaginaries = Vec::with_capacity(results.len());
    for result in results {
        weight.get_or_insert(result.weight);
        images.push(result.image);
        if let Some(im) = result.imaginary {
            imaginaries.push(im);
        }
    }
    let weight = weight.ok_or_else(|| {
        ImagingError::InvalidPartition("the tiling produced no facets".to_string())
    })?;

    let image = tiling.gather(&images, template, facets)?;
    let imaginary = if imaginary && imaginaries.len() == images.len() {
        Some(tiling.gather(&imaginaries, template, facets)?)
    } else {
        None
    };
    Ok(Inverted {
        image,
        weight,
        imaginary,
    })
}
