// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.


use crate::{c64, constants::TAU};

/// Complex exponential. The argument is assumed to be purely imaginary.
///
/// This function doesn't actually use complex numbers; it just returns the real
/// and imag components from Euler's formula (i.e. e^{ix} = cos{x} + i sin{x}).
#[inline]
pub(crate) fn cexp(x: f64) -> c64 {
    let (im, re) = x.sin_cos();
    c64::new(re, im)
}

/// The direction cosine n - 1 for a position (l, m) on the sky. `None` is
/// returned for positions beyond the horizon (l^2 + m^2 >= 1).
#[inline]
pub(crate) fn n_minus_one(l: f64, m: f64) -> Option<f64> {
    let r2 = l * l + m * m;
    if r2 >= 1.0 {
        None
    } else {
        // Written this way to keep precision near the phase centre.
        Some(-r2 / (1.0 + (1.0 - r2).sqrt()))
    }
}

/// The Fourier phase 2π(ul + vm + w(n-1)) of a sky position for a baseline.
/// If `w` is `None`, the array is treated as coplanar.
#[inline]
pub(crate) fn fourier_phase(u: f64, v: f64, w: Option<f64>, l: f64, m: f64, n1: f64) -> f64 {
    TAU * (u * l + v * m + w.map(|w| w * n1).unwrap_or(0.0))
}

/// Arithmetic mean. Returns `None` if the iterator is empty.
pub(crate) fn mean<I: IntoIterator<Item = f64>>(iter: I) -> Option<f64> {
    let (sum, count) = iter
        .into_iter()
        .fold((0.0, 0usize), |(s, c), x| (s + x, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// `num` evenly spaced values over `[start, stop]`, like numpy's `linspace`.
pub(crate) fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|i| start + step * i as f64).collect()
        }
    }
}
