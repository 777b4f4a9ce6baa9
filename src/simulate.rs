// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Deterministic synthetic observations, for testing and demonstrating the
//! imaging code without any input files.

use itertools::iproduct;
use log::debug;
use ndarray::prelude::*;

use crate::{
    c64,
    constants::PI,
    vis::{Visibilities, UVW},
};

/// The golden angle [radians]. Antennas are laid out on a sunflower spiral so
/// that no two baselines are redundant.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// A snapshot (or short track) observation of an array of antennas.
#[derive(Debug, Clone)]
pub struct SyntheticObservation {
    pub num_antennas: usize,

    /// The outer radius of the array [wavelengths at the first frequency].
    pub radius: f64,

    /// The amplitude of antenna height variations [wavelengths at the first
    /// frequency]. Non-zero heights make the array non-coplanar.
    pub height: f64,

    /// The hour angles of each timestep [radians].
    pub hour_angles: Vec<f64>,

    /// The declination of the phase centre [radians].
    pub declination: f64,

    /// \[Hz\]
    pub frequencies: Vec<f64>,

    /// \[seconds\]
    pub integration_time: f64,

    pub num_pols: usize,

    /// The weight of every sample.
    pub weight: f64,
}

impl Default for SyntheticObservation {
    fn default() -> Self {
        SyntheticObservation {
            num_antennas: 12,
            radius: 120.0,
            height: 10.0,
            hour_angles: vec![-0.05, 0.0, 0.05],
            declination: -PI / 4.0,
            frequencies: vec![1e8],
            integration_time: 10.0,
            num_pols: 1,
            weight: 1.0,
        }
    }
}

impl SyntheticObservation {
    /// The antenna positions [wavelengths at the first frequency].
    fn antenna_xyzs(&self) -> Vec<[f64; 3]> {
        let n = self.num_antennas.max(1) as f64;
        (0..self.num_antennas)
            .map(|k| {
                let r = self.radius * ((k + 1) as f64 / n).sqrt();
                let theta = k as f64 * GOLDEN_ANGLE;
                [
                    r * theta.cos(),
                    r * theta.sin(),
                    self.height * (3.0 * theta).sin(),
                ]
            })
            .collect()
    }

    /// Generate zero-valued visibilities. Rows are ordered by time, then
    /// baseline, then frequency.
    pub fn visibilities(&self) -> Visibilities {
        let xyzs = self.antenna_xyzs();
        let ref_freq = self.frequencies.first().copied().unwrap_or(1.0);
        let (s_dec, c_dec) = self.declination.sin_cos();

        let mut uvw = vec![];
        let mut time = vec![];
        let mut frequency = vec![];
        let mut antenna1 = vec![];
        let mut antenna2 = vec![];
        for &ha in &self.hour_angles {
            let (s_ha, c_ha) = ha.sin_cos();
            for (a1, a2) in iproduct!(0..xyzs.len(), 0..xyzs.len()).filter(|(a1, a2)| a1 < a2) {
                let x = xyzs[a2][0] - xyzs[a1][0];
                let y = xyzs[a2][1] - xyzs[a1][1];
                let z = xyzs[a2][2] - xyzs[a1][2];
                let bl = UVW {
                    u: s_ha * x + c_ha * y,
                    v: s_dec * s_ha * y + c_dec * z - s_dec * c_ha * x,
                    w: c_dec * c_ha * x - c_dec * s_ha * y + s_dec * z,
                };
                for &freq in &self.frequencies {
                    let scale = freq / ref_freq;
                    uvw.push(UVW {
                        u: bl.u * scale,
                        v: bl.v * scale,
                        w: bl.w * scale,
                    });
                    time.push(ha * 43200.0 / PI);
                    frequency.push(freq);
                    antenna1.push(a1);
                    antenna2.push(a2);
                }
            }
        }

        let num_rows = uvw.len();
        debug!(
            "Simulated {num_rows} rows from {} antennas, {} timesteps and {} frequencies",
            self.num_antennas,
            self.hour_angles.len(),
            self.frequencies.len()
        );
        Visibilities {
            vis: Array2::from_elem((num_rows, self.num_pols), c64::default()),
            weight: Array2::from_elem((num_rows, self.num_pols), self.weight),
            uvw,
            time,
            integration_time: vec![self.integration_time; num_rows],
            frequency,
            antenna1,
            antenna2,
        }
    }
}

/// Zero-valued, unit-weight visibilities with the given baselines and
/// timestamps, all at one frequency.
pub fn visibilities_from_uvws(
    uvw: Vec<UVW>,
    time: Vec<f64>,
    frequency: f64,
    num_pols: usize,
) -> Visibilities {
    let num_rows = uvw.len();
    Visibilities {
        vis: Array2::zeros((num_rows, num_pols)),
        weight: Array2::ones((num_rows, num_pols)),
        uvw,
        time,
        integration_time: vec![1.0; num_rows],
        frequency: vec![frequency; num_rows],
        antenna1: vec![0; num_rows],
        antenna2: (1..=num_rows).collect(),
    }
}
