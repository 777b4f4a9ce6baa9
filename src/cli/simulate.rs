// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Image a synthetic observation of a handful of point sources.

use std::{fs::File, io::BufWriter, path::PathBuf};

use clap::Parser;
use log::info;
use serde::Serialize;

use super::{
    common::{print_config, read_config, ARG_FILE_HELP},
    HyperstackError,
};
use crate::{
    deconvolve::Hogbom,
    graph::{
        pipelines::{
            create_invert_all_graph, create_residual_all_graph, create_solve_image_graph,
            create_vis_graph_list, Operators, SolveStrategy,
        },
        Graph, Parallel, Sequential,
    },
    image::{Image, ImageStats},
    imaging::{DftTransform, InvertOptions, Transform},
    simulate::SyntheticObservation,
};

/// The hour-angle step between timesteps [radians].
const HOUR_ANGLE_STEP: f64 = 0.05;

#[derive(Parser, Debug)]
pub(super) struct SimulateArgs {
    #[clap(name = "CONFIG_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    config: Option<PathBuf>,

    /// The number of antennas in the array.
    #[clap(long, default_value_t = 16)]
    antennas: usize,

    /// The radius of the array [wavelengths].
    #[clap(long, default_value_t = 120.0)]
    radius: f64,

    /// The amplitude of antenna height variations [wavelengths]. Larger
    /// heights make larger w terms.
    #[clap(long, default_value_t = 10.0)]
    height: f64,

    /// The number of timesteps.
    #[clap(long, default_value_t = 3)]
    timesteps: usize,

    /// The number of pixels on each image axis.
    #[clap(long, default_value_t = 64)]
    npixel: usize,

    /// The angular size of a pixel [radians].
    #[clap(long, default_value_t = 0.002)]
    cellsize: f64,

    /// The number of CLEAN major cycles. If 0, no CLEAN is done.
    #[clap(long, default_value_t = 0)]
    nmajor: usize,

    /// Execute the pipeline nodes one at a time.
    #[clap(long)]
    sequential: bool,

    /// Write the image statistics to this json file.
    #[clap(long, parse(from_os_str))]
    json: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SimulateSummary {
    num_rows: usize,
    max_abs_w: f64,
    vis_slices: usize,
    facets: usize,
    num_nodes: usize,
    dirty: ImageStats,
    psf: ImageStats,
    residual: ImageStats,
    model: Option<ImageStats>,
}

impl SimulateArgs {
    fn check(&self) -> Result<(), HyperstackError> {
        let bad = |what: &str| Err(HyperstackError::Simulate(what.to_string()));
        if self.antennas < 2 {
            return bad("At least 2 antennas are needed");
        }
        if self.timesteps == 0 {
            return bad("At least 1 timestep is needed");
        }
        if self.npixel < 8 {
            return bad("Images must be at least 8 pixels wide");
        }
        if !(self.cellsize > 0.0) {
            return bad("The cell size must be positive");
        }
        Ok(())
    }

    /// The true sky: a bright source at the phase centre and two fainter ones
    /// away from it, where the w term matters.
    fn sky(&self, template: &Image) -> Image {
        let n = self.npixel;
        let c = n / 2;
        let mut sky = template.empty_like();
        let sources = [
            (c, c, 1.0),
            (c + n / 4, c - n / 8, 0.6),
            (c - n / 4, c + n / 8, 0.3),
        ];
        for (x, y, flux) in sources {
            sky.data[[0, 0, y, x]] = flux;
        }
        sky
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), HyperstackError> {
        self.check()?;
        let config = read_config(self.config.as_deref())?;
        print_config(&config);

        let obs = SyntheticObservation {
            num_antennas: self.antennas,
            radius: self.radius,
            height: self.height,
            hour_angles: (0..self.timesteps)
                .map(|i| (i as f64 - (self.timesteps - 1) as f64 / 2.0) * HOUR_ANGLE_STEP)
                .collect(),
            ..Default::default()
        };
        let template = Image::zeros(self.npixel, self.cellsize, obs.frequencies.clone(), 1);
        let sky = self.sky(&template);
        // The observation sees the exact 3-D Fourier transform of the sky.
        let vis = DftTransform { w_projection: true }.predict(&obs.visibilities(), &sky)?;
        let max_abs_w = vis.max_abs_w().unwrap_or(0.0);
        let vis_slices = config.num_w_slices(&vis, &template)?;
        let facets = config.facets;
        info!(
            "Simulated {} rows with max |w| {max_abs_w:.2} wavelengths",
            vis.num_rows()
        );
        info!("Imaging with {vis_slices} w slices and {facets} x {facets} facets");

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let base = DftTransform {
            w_projection: config.w_projection,
        };
        let hogbom = Hogbom::from(&config.deconvolution);
        let ops = Operators::new(&base);

        let mut graph = Graph::new();
        let vis_list = create_vis_graph_list(&mut graph, &vis, config.partitioning())?;
        let model = graph.constant("template", template);
        let dirty = create_invert_all_graph(
            &mut graph,
            ops,
            &vis_list,
            model,
            vis_slices,
            facets,
            config.invert_options(),
        )?;
        let psf = create_invert_all_graph(
            &mut graph,
            ops,
            &vis_list,
            model,
            vis_slices,
            facets,
            InvertOptions {
                dopsf: true,
                ..config.invert_options()
            },
        )?;
        let (model, residual) = if self.nmajor > 0 {
            let strategy = SolveStrategy {
                vis_slices,
                facets,
                nmajor: self.nmajor,
            };
            let (model, residual) =
                create_solve_image_graph(&mut graph, ops, &hogbom, &vis_list, model, strategy)?;
            (Some(model), residual)
        } else {
            let residual =
                create_residual_all_graph(&mut graph, ops, &vis_list, model, vis_slices, facets)?;
            (None, residual)
        };
        info!(
            "Executing {} nodes in {} waves",
            graph.len(),
            graph.waves()?.len()
        );
        let computed = if self.sequential {
            graph.compute(&Sequential)?
        } else {
            graph.compute(&Parallel)?
        };

        let summary = SimulateSummary {
            num_rows: vis.num_rows(),
            max_abs_w,
            vis_slices,
            facets,
            num_nodes: graph.len(),
            dirty: computed.get(dirty)?.image.stats(),
            psf: computed.get(psf)?.image.stats(),
            residual: computed.get(residual)?.image.stats(),
            model: model
                .map(|m| computed.get(m).map(Image::stats))
                .transpose()?,
        };
        info!("Dirty image:    {}", summary.dirty);
        info!("PSF:            {}", summary.psf);
        info!("Residual image: {}", summary.residual);
        if let Some(model) = &summary.model {
            info!("CLEAN model:    {model}");
        }

        if let Some(json) = &self.json {
            let f = BufWriter::new(File::create(json)?);
            serde_json::to_writer_pretty(f, &summary)?;
            info!("Wrote {}", json.display());
        }
        Ok(())
    }
}
