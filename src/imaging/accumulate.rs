// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Weighted accumulation of invert results over dataset partitions.
//!
//! Partition images are summed as `Σ(weight_i · image_i)` alongside
//! `Σ(weight_i)`, and the sum is normalised once at the end.

use log::trace;
use ndarray::prelude::*;

use super::{ImagingError, Inverted};

/// Multiply every `[chan][pol]` plane of `data` by the matching weight.
fn weight_planes(data: &mut Array4<f64>, weight: &Array2<f64>) {
    for ((chan, pol), &wt) in weight.indexed_iter() {
        data.slice_mut(s![chan, pol, .., ..])
            .mapv_inplace(|v| v * wt);
    }
}

/// Divide every `[chan][pol]` plane of `data` by the matching summed weight.
/// Planes with a summed weight of zero become zero.
pub fn normalize_sumwt(data: &mut Array4<f64>, sumwt: &Array2<f64>) {
    for ((chan, pol), &wt) in sumwt.indexed_iter() {
        let mut plane = data.slice_mut(s![chan, pol, .., ..]);
        if wt > 0.0 {
            plane.mapv_inplace(|v| v / wt);
        } else {
            plane.fill(0.0);
        }
    }
}

/// Sum normalised invert results, skipping `None` (empty partitions). The
/// imaginary plane is kept only if every result has one.
///
/// If `normalize` is set, the sum is divided by the summed weight; otherwise
/// it is the weighted sum of the inputs.
///
/// Fails with [`ImagingError::EmptyAccumulation`] if nothing with a positive
/// weight was given.
pub fn sum_invert_results<I>(results: I, normalize: bool) -> Result<Inverted, ImagingError>
where
    I: IntoIterator<Item = Option<Inverted>>,
{
    let mut acc: Option<Inverted> = None;
    let mut num_skipped = 0;
    for result in results {
        let Inverted {
            mut image,
            weight,
            imaginary,
        } = match result {
            Some(r) => r,
            None => {
                num_skipped += 1;
                continue;
            }
        };
        weight_planes(&mut image.data, &weight);
        let imaginary = imaginary.map(|mut im| {
            weight_planes(&mut im.data, &weight);
            im
        });

        acc = Some(match acc.take() {
            None => Inverted {
                image,
                weight,
                imaginary,
            },
            Some(mut acc) => {
                if acc.weight.dim() != weight.dim() {
                    return Err(ImagingError::shape_mismatch(
                        "invert accumulation",
                        acc.weight.dim(),
                        weight.dim(),
                    ));
                }
                acc.image.add(&image)?;
                acc.weight += &weight;
                acc.imaginary = match (acc.imaginary.take(), imaginary) {
                    (Some(mut a), Some(b)) => {
                        a.add(&b)?;
                        Some(a)
                    }
                    _ => None,
                };
                acc
            }
        });
    }
    trace!("Accumulated invert results; skipped {num_skipped} empty partitions");

    let mut acc = match acc {
        Some(acc) if acc.total_weight() > 0.0 => acc,
        _ => return Err(ImagingError::EmptyAccumulation),
    };
    if normalize {
        normalize_sumwt(&mut acc.image.data, &acc.weight);
        if let Some(im) = acc.imaginary.as_mut() {
            normalize_sumwt(&mut im.data, &acc.weight);
        }
    }
    Ok(acc)
}
