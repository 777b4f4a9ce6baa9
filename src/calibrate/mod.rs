// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Code to calibrate visibilities against a model.
 */


use log::{debug, trace, warn};
use ndarray::{parallel::prelude::*, prelude::*};
use num_traits::{One, Zero};

use crate::{
    c64,
    constants::{DEFAULT_CAL_MAX_ITERATIONS, DEFAULT_CAL_STOP_THRESHOLD},
    imaging::ImagingError,
    vis::Visibilities,
};

/// Solves for instrumental gains and removes them from observed visibilities.
pub trait Calibrator: Send + Sync {
    /// Return a copy of `observed` corrected by gains solved against
    /// `predicted`, which must have the same row layout.
    fn calibrate(
        &self,
        observed: &Visibilities,
        predicted: &Visibilities,
    ) -> Result<Visibilities, ImagingError>;
}

impl<T: Calibrator + ?Sized> Calibrator for &T {
    fn calibrate(
        &self,
        observed: &Visibilities,
        predicted: &Visibilities,
    ) -> Result<Visibilities, ImagingError> {
        (**self).calibrate(observed, predicted)
    }
}

/// One complex gain per antenna and polarisation, solved with Stefcal
/// ("MitchCal"): observed visibilities are modelled as `g1 conj(g2) M`.
///
/// Autocorrelations and samples with non-positive weight are ignored.
/// Antennas without any usable samples keep a unit gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AntennaGains {
    pub max_iterations: usize,

    /// Stop iterating when the largest squared change in any gain is below
    /// this.
    pub stop_threshold: f64,
}

impl Default for AntennaGains {
    fn default() -> Self {
        AntennaGains {
            max_iterations: DEFAULT_CAL_MAX_ITERATIONS,
            stop_threshold: DEFAULT_CAL_STOP_THRESHOLD,
        }
    }
}

impl AntennaGains {
    /// Solve for the gains, with dimensions `[antenna][pol]`.
    pub fn solve(
        &self,
        observed: &Visibilities,
        predicted: &Visibilities,
    ) -> Result<Array2<c64>, ImagingError> {
        check_layouts(observed, predicted)?;
        let num_antennas = observed
            .antenna1
            .iter()
            .chain(observed.antenna2.iter())
            .max()
            .map(|&a| a + 1)
            .unwrap_or(0);
        let num_pols = observed.num_pols();

        let solutions: Vec<Array1<c64>> = (0..num_pols)
            .into_par_iter()
            .map(|pol| self.solve_pol(observed, predicted, pol, num_antennas))
            .collect();
        let mut gains = Array2::from_elem((num_antennas, num_pols), c64::one());
        for (pol, solution) in solutions.into_iter().enumerate() {
            gains.column_mut(pol).assign(&solution);
        }
        Ok(gains)
    }

    fn solve_pol(
        &self,
        observed: &Visibilities,
        predicted: &Visibilities,
        pol: usize,
        num_antennas: usize,
    ) -> Array1<c64> {
        let mut gains = Array1::from_elem(num_antennas, c64::one());
        let mut new_gains = gains.clone();
        let mut top = Array1::<c64>::zeros(num_antennas);
        let mut bot = Array1::<f64>::zeros(num_antennas);

        let mut iteration = 0;
        let mut precision = f64::INFINITY;
        while iteration < self.max_iterations {
            iteration += 1;
            top.fill(c64::zero());
            bot.fill(0.0);

            for i_row in 0..observed.num_rows() {
                let (a1, a2) = (observed.antenna1[i_row], observed.antenna2[i_row]);
                let weight = observed.weight[[i_row, pol]];
                if a1 == a2 || weight <= 0.0 {
                    continue;
                }
                let data = observed.vis[[i_row, pol]];
                let model = predicted.vis[[i_row, pol]];

                let z = gains[a2].conj() * model;
                top[a1] += data * z.conj() * weight;
                bot[a1] += z.norm_sqr() * weight;

                // The same sample, seen from the second antenna.
                let z = gains[a1].conj() * model.conj();
                top[a2] += data.conj() * z.conj() * weight;
                bot[a2] += z.norm_sqr() * weight;
            }

            new_gains
                .iter_mut()
                .zip(gains.iter())
                .zip(top.iter().zip(bot.iter()))
                .for_each(|((new, &old), (&top, &bot))| {
                    *new = if bot > 0.0 { top / bot } else { old };
                });

            // On every even iteration, test for convergence and set the new
            // gains as the average of the last two, as per Stefcal.
            if iteration % 2 == 0 {
                precision = new_gains
                    .iter()
                    .zip(gains.iter())
                    .map(|(new, old)| (new - old).norm_sqr())
                    .fold(0.0, f64::max);
                gains += &new_gains;
                gains.mapv_inplace(|g| g * 0.5);
                if precision < self.stop_threshold {
                    break;
                }
            } else {
                gains.assign(&new_gains);
            }
        }

        if precision < self.stop_threshold {
            trace!("Pol {pol}: converged after {iteration} iterations (precision {precision:e})");
        } else {
            warn!(
                "Pol {pol}: gains did not converge after {iteration} iterations (precision {precision:e})"
            );
        }
        gains
    }
}

impl Calibrator for AntennaGains {
    fn calibrate(
        &self,
        observed: &Visibilities,
        predicted: &Visibilities,
    ) -> Result<Visibilities, ImagingError> {
        debug!(
            "Solving antenna gains from {} rows ({} polarisations)",
            observed.num_rows(),
            observed.num_pols()
        );
        let gains = self.solve(observed, predicted)?;

        let mut corrected = observed.clone();
        corrected
            .vis
            .outer_iter_mut()
            .zip(observed.antenna1.iter().zip(observed.antenna2.iter()))
            .for_each(|(mut row, (&a1, &a2))| {
                row.iter_mut().enumerate().for_each(|(pol, v)| {
                    let g = gains[[a1, pol]] * gains[[a2, pol]].conj();
                    if g.norm_sqr() > 0.0 && g.is_finite() {
                        *v /= g;
                    }
                });
            });
        Ok(corrected)
    }
}

fn check_layouts(observed: &Visibilities, predicted: &Visibilities) -> Result<(), ImagingError> {
    if observed.vis.dim() != predicted.vis.dim() {
        return Err(ImagingError::shape_mismatch(
            "gain calibration",
            observed.vis.dim(),
            predicted.vis.dim(),
        ));
    }
    Ok(())
}
