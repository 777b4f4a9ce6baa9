// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scatter an image into facets and gather facets back into one image.

use ndarray::s;

use super::Image;
use crate::imaging::ImagingError;

/// Cuts images into a grid of non-overlapping facets and pastes them back.
///
/// `gather(scatter(im, F), im, F)` must reproduce `im` exactly.
pub trait Tiling: Send + Sync {
    /// Split `image` into `facets * facets` facets.
    fn scatter(&self, image: &Image, facets: usize) -> Result<Vec<Image>, ImagingError>;

    /// Paste `tiles` (in the order given by `scatter`) into a new image shaped
    /// like `template`.
    fn gather(
        &self,
        tiles: &[Image],
        template: &Image,
        facets: usize,
    ) -> Result<Image, ImagingError>;
}

impl<T: Tiling + ?Sized> Tiling for &T {
    fn scatter(&self, image: &Image, facets: usize) -> Result<Vec<Image>, ImagingError> {
        (**self).scatter(image, facets)
    }

    fn gather(
        &self,
        tiles: &[Image],
        template: &Image,
        facets: usize,
    ) -> Result<Image, ImagingError> {
        (**self).gather(tiles, template, facets)
    }
}

/// Facets in raster order: rows of facets from the first image row, and
/// within a row, from the first image column. Each facet keeps the sky
/// positions of its pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterTiling;

impl RasterTiling {
    /// The (y0, x0) origins and the (dy, dx) size of every facet.
    fn facet_origins(
        image: &Image,
        facets: usize,
    ) -> Result<(Vec<(usize, usize)>, (usize, usize)), ImagingError> {
        let (ny, nx) = image.plane_dim();
        if facets == 0 || ny % facets != 0 || nx % facets != 0 {
            return Err(ImagingError::InvalidPartition(format!(
                "{facets} facets per axis don't evenly divide a {ny}x{nx} image"
            )));
        }
        let (dy, dx) = (ny / facets, nx / facets);
        let origins = (0..facets)
            .flat_map(|iy| (0..facets).map(move |ix| (iy * dy, ix * dx)))
            .collect();
        Ok((origins, (dy, dx)))
    }
}

impl Tiling for RasterTiling {
    fn scatter(&self, image: &Image, facets: usize) -> Result<Vec<Image>, ImagingError> {
        let (origins, (dy, dx)) = Self::facet_origins(image, facets)?;
        Ok(origins
            .into_iter()
            .map(|(y0, x0)| Image {
                data: image
                    .data
                    .slice(s![.., .., y0..y0 + dy, x0..x0 + dx])
                    .to_owned(),
                grid: image.grid.offset(x0, y0),
            })
            .collect())
    }

    fn gather(
        &self,
        tiles: &[Image],
        template: &Image,
        facets: usize,
    ) -> Result<Image, ImagingError> {
        let (origins, (dy, dx)) = Self::facet_origins(template, facets)?;
        if tiles.len() != origins.len() {
            return Err(ImagingError::ShapeMismatch {
                stage: "facet gather",
                expected: format!("{} facets", origins.len()),
                got: format!("{} facets", tiles.len()),
            });
        }

        let mut image = template.empty_like();
        let (nchan, npol, _, _) = template.data.dim();
        for ((y0, x0), tile) in origins.into_iter().zip(tiles) {
            if tile.data.dim() != (nchan, npol, dy, dx) {
                return Err(ImagingError::shape_mismatch(
                    "facet gather",
                    (nchan, npol, dy, dx),
                    tile.data.dim(),
                ));
            }
            image
                .data
                .slice_mut(s![.., .., y0..y0 + dy, x0..x0 + dx])
                .assign(&tile.data);
        }
        Ok(image)
    }
}
