// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Builders for imaging pipelines as task graphs.

Every builder takes the graph to extend and handles to its inputs, and returns
handles to its outputs; nothing is computed until the graph is executed.
Datasets flow through the graphs as `Option<Visibilities>`; `None` stands for an
empty partition and is carried through predicts and skipped by inverts.

Invert results of dataset partitions are accumulated as
`Σ(weight · image) / Σ(weight)`, with the partitions themselves always
normalised. Predictions of different partitions are merged by row, never summed;
facet contributions to one partition are summed along a strict chain of nodes.
 */

use log::debug;

use super::{Graph, Handle};
use crate::{
    calibrate::Calibrator,
    deconvolve::{deconvolve_and_add, Deconvolver},
    image::{Image, RasterTiling, Tiling},
    imaging::{
        accumulate::sum_invert_results, gather_inverted, FresnelWTerm, ImagingError,
        InvertOptions, Inverted, Transform, WStackSingle, WTerm,
    },
    vis::{
        iterators::{partitions, VisPartitioning},
        visibility_gather_w, visibility_scatter_w, Visibilities, WScatter,
    },
};

/// A handle to one dataset partition.
pub type VisHandle = Handle<Option<Visibilities>>;

/// The collaborators pipelines are built from.
#[derive(Clone, Copy)]
pub struct Operators<'a> {
    /// The 2-D transform run on every partition and facet.
    pub base: &'a dyn Transform,

    /// The w-term used by w-stacking.
    pub w_term: &'a dyn WTerm,

    /// How images are cut into facets.
    pub tiling: &'a dyn Tiling,
}

impl<'a> Operators<'a> {
    /// Use `base` with the Fresnel w-term and raster facets.
    pub fn new(base: &'a dyn Transform) -> Operators<'a> {
        Operators {
            base,
            w_term: &FresnelWTerm,
            tiling: &RasterTiling,
        }
    }

    pub fn with_w_term(self, w_term: &'a dyn WTerm) -> Operators<'a> {
        Operators { w_term, ..self }
    }

    pub fn with_tiling(self, tiling: &'a dyn Tiling) -> Operators<'a> {
        Operators { tiling, ..self }
    }

    fn wstack_single(&self) -> WStackSingle<&'a dyn Transform, &'a dyn WTerm> {
        WStackSingle::with_w_term(self.base, self.w_term)
    }
}

fn check_count(what: &str, count: usize) -> Result<(), ImagingError> {
    if count == 0 {
        return Err(ImagingError::InvalidPartition(format!(
            "the number of {what} must be positive"
        )));
    }
    Ok(())
}

/// Inverts of partitions are normalised individually and accumulated.
fn partition_opts(opts: InvertOptions) -> InvertOptions {
    InvertOptions {
        normalize: true,
        ..opts
    }
}

/// Predict `model` for the rows of `vis`, added to the visibilities of `vis`.
fn predict_and_sum<P: Transform + ?Sized>(
    predict: &P,
    vis: &Visibilities,
    model: &Image,
) -> Result<Visibilities, ImagingError> {
    let mut predicted = predict.predict(vis, model)?;
    predicted.add_vis(vis)?;
    Ok(predicted)
}

/// One node per partition of `vis` under `partitioning`, holding a copy of
/// the partition's rows (or `None` for an empty partition).
pub fn create_vis_graph_list(
    graph: &mut Graph<'_>,
    vis: &Visibilities,
    partitioning: VisPartitioning,
) -> Result<Vec<VisHandle>, ImagingError> {
    let mut list = vec![];
    for (i, rows) in partitions(vis, partitioning)?.enumerate() {
        let part = rows.map(|rows| vis.select(&rows)).transpose()?;
        list.push(graph.constant(format!("vis[{i}]"), part));
    }
    debug!(
        "Partitioned {} rows into {} graph inputs ({partitioning:?})",
        vis.num_rows(),
        list.len()
    );
    Ok(list)
}

/// Copies of every dataset with all visibilities set to zero.
pub fn create_zero_vis_graph_list(graph: &mut Graph<'_>, vis_list: &[VisHandle]) -> Vec<VisHandle> {
    vis_list
        .iter()
        .enumerate()
        .map(|(i, &vis)| {
            graph.map(format!("zero_vis[vis {i}]"), vis, |vis: &Option<Visibilities>| {
                Ok(vis.as_ref().map(Visibilities::zeroed))
            })
        })
        .collect()
}

/// `vis - model_vis`, pairwise. A `None` dataset stays `None`; a `None` model
/// subtracts nothing. Row layouts must agree.
pub fn create_subtract_vis_graph_list(
    graph: &mut Graph<'_>,
    vis_list: &[VisHandle],
    model_vis_list: &[VisHandle],
) -> Result<Vec<VisHandle>, ImagingError> {
    if vis_list.len() != model_vis_list.len() {
        return Err(ImagingError::shape_mismatch(
            "visibility subtraction",
            vis_list.len(),
            model_vis_list.len(),
        ));
    }
    Ok(vis_list
        .iter()
        .zip(model_vis_list)
        .enumerate()
        .map(|(i, (&vis, &model_vis))| {
            graph.map2(
                format!("subtract_vis[vis {i}]"),
                vis,
                model_vis,
                |vis: &Option<Visibilities>, model_vis: &Option<Visibilities>| {
                    Ok(match (vis, model_vis) {
                        (Some(vis), Some(model_vis)) => Some(vis.subtract(model_vis)?),
                        (Some(vis), None) => Some(vis.clone()),
                        (None, _) => None,
                    })
                },
            )
        })
        .collect())
}

/// Invert every dataset of `vis_list` with `invert`, one node per dataset.
/// Empty partitions give `None`.
fn invert_parts<'a, P>(
    graph: &mut Graph<'a>,
    invert: P,
    vis_list: &[VisHandle],
    template: Handle<Image>,
    opts: InvertOptions,
    label: impl Fn(usize) -> String,
) -> Vec<Handle<Option<Inverted>>>
where
    P: Transform + Clone + 'a,
{
    let inner_opts = partition_opts(opts);
    vis_list
        .iter()
        .enumerate()
        .map(|(i, &vis)| {
            let invert = invert.clone();
            graph.map2(
                label(i),
                vis,
                template,
                move |vis: &Option<Visibilities>, template: &Image| {
                    vis.as_ref()
                        .map(|vis| invert.invert(vis, template, &inner_opts))
                        .transpose()
                },
            )
        })
        .collect()
}

/// Invert every dataset of `vis_list` with `invert` and accumulate.
fn invert_list<'a, P>(
    graph: &mut Graph<'a>,
    invert: P,
    vis_list: &[VisHandle],
    template: Handle<Image>,
    opts: InvertOptions,
    label: impl Fn(usize) -> String,
    sum_label: String,
) -> Handle<Inverted>
where
    P: Transform + Clone + 'a,
{
    let parts = invert_parts(graph, invert, vis_list, template, opts, label);
    graph.reduce(sum_label, &parts, move |parts: &[&Option<Inverted>]| {
        sum_invert_results(parts.iter().map(|&p| p.clone()), opts.normalize)
    })
}

/// Like [`invert_list`], but the sum of nothing but empty partitions is
/// `None` rather than an error.
fn invert_list_partial<'a, P>(
    graph: &mut Graph<'a>,
    invert: P,
    vis_list: &[VisHandle],
    template: Handle<Image>,
    opts: InvertOptions,
    label: impl Fn(usize) -> String,
    sum_label: String,
) -> Handle<Option<Inverted>>
where
    P: Transform + Clone + 'a,
{
    let parts = invert_parts(graph, invert, vis_list, template, opts, label);
    graph.reduce(sum_label, &parts, move |parts: &[&Option<Inverted>]| {
        if parts.iter().all(|p| p.is_none()) {
            return Ok(None);
        }
        sum_invert_results(parts.iter().map(|&p| p.clone()), opts.normalize).map(Some)
    })
}

/// Scatter one dataset in w. Returns the scatter and one handle per slice.
fn scatter_w_graph(
    graph: &mut Graph<'_>,
    vis: VisHandle,
    i_vis: usize,
    vis_slices: usize,
) -> (Handle<Option<WScatter>>, Vec<VisHandle>) {
    let scatter = graph.map(
        format!("scatter_w[vis {i_vis}]"),
        vis,
        move |vis: &Option<Visibilities>| {
            vis.as_ref()
                .map(|vis| visibility_scatter_w(vis, vis_slices))
                .transpose()
        },
    );
    let slices = (0..vis_slices)
        .map(|j| {
            graph.map(
                format!("w_slice[vis {i_vis}, w-slice {j}]"),
                scatter,
                move |scatter: &Option<WScatter>| {
                    Ok(scatter.as_ref().and_then(|s| s.slice(j)).cloned())
                },
            )
        })
        .collect();
    (scatter, slices)
}

/// Cut an image into `facets * facets` tiles, one handle per tile.
fn scatter_image_graph<'a>(
    graph: &mut Graph<'a>,
    tiling: &'a dyn Tiling,
    image: Handle<Image>,
    facets: usize,
    what: &str,
) -> Vec<Handle<Image>> {
    let tiles = graph.map(
        format!("scatter_image[{what}, facets {facets}]"),
        image,
        move |image: &Image| tiling.scatter(image, facets),
    );
    (0..facets * facets)
        .map(|f| {
            graph.map(
                format!("facet[{what}, facet {f}]"),
                tiles,
                move |tiles: &Vec<Image>| {
                    tiles.get(f).cloned().ok_or_else(|| {
                        ImagingError::shape_mismatch("image scatter", facets * facets, tiles.len())
                    })
                },
            )
        })
        .collect()
}

/// Invert every dataset with the base transform and accumulate.
pub fn create_invert_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    vis_list: &[VisHandle],
    template: Handle<Image>,
    opts: InvertOptions,
) -> Result<Handle<Inverted>, ImagingError> {
    Ok(invert_list(
        graph,
        ops.base,
        vis_list,
        template,
        opts,
        |i| format!("invert[vis {i}]"),
        "sum_invert".to_string(),
    ))
}

/// Invert every dataset with w-stacking: each dataset is scattered into
/// `vis_slices` w slices, every slice is inverted independently, and all
/// slices of all datasets are accumulated together.
pub fn create_invert_wstack_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    vis_list: &[VisHandle],
    template: Handle<Image>,
    vis_slices: usize,
    opts: InvertOptions,
) -> Result<Handle<Inverted>, ImagingError> {
    check_count("w slices", vis_slices)?;
    let mut slices = vec![];
    let mut labels = vec![];
    for (i, &vis) in vis_list.iter().enumerate() {
        let (_, handles) = scatter_w_graph(graph, vis, i, vis_slices);
        labels.extend((0..handles.len()).map(|j| format!("invert_wstack[vis {i}, w-slice {j}]")));
        slices.extend(handles);
    }
    Ok(invert_list(
        graph,
        ops.wstack_single(),
        &slices,
        template,
        opts,
        |k| labels[k].clone(),
        "sum_invert_wstack".to_string(),
    ))
}

/// Invert with facets: the template is cut into `facets * facets` tiles,
/// `c_invert` builds the invert of each tile, and the tile images are
/// gathered. The weight is that of the first tile.
pub fn create_invert_facet_graph<'a, F>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    template: Handle<Image>,
    facets: usize,
    opts: InvertOptions,
    mut c_invert: F,
) -> Result<Handle<Inverted>, ImagingError>
where
    F: FnMut(
        &mut Graph<'a>,
        Handle<Image>,
        InvertOptions,
    ) -> Result<Handle<Inverted>, ImagingError>,
{
    check_count("facets", facets)?;
    let tiling = ops.tiling;
    let tiles = scatter_image_graph(graph, tiling, template, facets, "template");
    let results = tiles
        .into_iter()
        .map(|tile| c_invert(graph, tile, opts))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(graph.reduce_with(
        format!("gather_invert[facets {facets}]"),
        template,
        &results,
        move |template: &Image, results: &[&Inverted]| {
            let results = results.iter().map(|&r| r.clone()).collect();
            gather_inverted(tiling, results, template, facets, opts.imaginary)
        },
    ))
}

/// Invert with facets of w-stacking. Each dataset is scattered in w once;
/// every (facet, w slice) pair is an independent node. A dataset that is an
/// empty partition contributes nothing.
pub fn create_invert_all_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    vis_list: &[VisHandle],
    template: Handle<Image>,
    vis_slices: usize,
    facets: usize,
    opts: InvertOptions,
) -> Result<Handle<Inverted>, ImagingError> {
    check_count("w slices", vis_slices)?;
    check_count("facets", facets)?;
    let tiling = ops.tiling;
    let tiles = scatter_image_graph(graph, tiling, template, facets, "template");
    let facet_opts = partition_opts(opts);
    let mut per_vis = vec![];
    for (i, &vis) in vis_list.iter().enumerate() {
        let (_, slices) = scatter_w_graph(graph, vis, i, vis_slices);
        let per_facet: Vec<Handle<Option<Inverted>>> = tiles
            .iter()
            .enumerate()
            .map(|(f, &tile)| {
                invert_list_partial(
                    graph,
                    ops.wstack_single(),
                    &slices,
                    tile,
                    facet_opts,
                    |j| format!("invert_wstack[vis {i}, facet {f}, w-slice {j}]"),
                    format!("sum_invert_wstack[vis {i}, facet {f}]"),
                )
            })
            .collect();
        // Every facet sees the same dataset, so either all of them are
        // empty or none are.
        per_vis.push(graph.reduce_with(
            format!("gather_invert[vis {i}, facets {facets}]"),
            template,
            &per_facet,
            move |template: &Image, results: &[&Option<Inverted>]| {
                let results: Option<Vec<Inverted>> = results.iter().map(|&r| r.clone()).collect();
                match results {
                    Some(results) => {
                        gather_inverted(tiling, results, template, facets, facet_opts.imaginary)
                            .map(Some)
                    }
                    None => Ok(None),
                }
            },
        ));
    }
    Ok(graph.reduce(
        "sum_invert_all",
        &per_vis,
        move |parts: &[&Option<Inverted>]| {
            sum_invert_results(parts.iter().map(|&p| p.clone()), opts.normalize)
        },
    ))
}

/// Predict `model` into every dataset with the base transform. The results
/// are the input visibilities plus the prediction.
pub fn create_predict_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    vis_list: &[VisHandle],
    model: Handle<Image>,
) -> Result<Vec<VisHandle>, ImagingError> {
    let base = ops.base;
    Ok(vis_list
        .iter()
        .enumerate()
        .map(|(i, &vis)| {
            graph.map2(
                format!("predict[vis {i}]"),
                vis,
                model,
                move |vis: &Option<Visibilities>, model: &Image| {
                    vis.as_ref()
                        .map(|vis| predict_and_sum(base, vis, model))
                        .transpose()
                },
            )
        })
        .collect())
}

/// Predict with w-stacking: each dataset is scattered into `vis_slices` w
/// slices, each slice is predicted independently and the slices are
/// gathered back into the dataset's row layout.
pub fn create_predict_wstack_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    vis_list: &[VisHandle],
    model: Handle<Image>,
    vis_slices: usize,
) -> Result<Vec<VisHandle>, ImagingError> {
    check_count("w slices", vis_slices)?;
    let mut predicted = vec![];
    for (i, &vis) in vis_list.iter().enumerate() {
        let (scatter, slices) = scatter_w_graph(graph, vis, i, vis_slices);
        let parts: Vec<VisHandle> = slices
            .into_iter()
            .enumerate()
            .map(|(j, slice)| {
                let wstack = ops.wstack_single();
                graph.map2(
                    format!("predict_wstack[vis {i}, w-slice {j}]"),
                    slice,
                    model,
                    move |slice: &Option<Visibilities>, model: &Image| {
                        slice
                            .as_ref()
                            .map(|slice| predict_and_sum(&wstack, slice, model))
                            .transpose()
                    },
                )
            })
            .collect();
        predicted.push(gather_w_graph(graph, scatter, &parts, i));
    }
    Ok(predicted)
}

fn gather_w_graph(
    graph: &mut Graph<'_>,
    scatter: Handle<Option<WScatter>>,
    parts: &[VisHandle],
    i_vis: usize,
) -> VisHandle {
    graph.reduce_with(
        format!("gather_w[vis {i_vis}]"),
        scatter,
        parts,
        |scatter: &Option<WScatter>, parts: &[&Option<Visibilities>]| {
            scatter
                .as_ref()
                .map(|scatter| visibility_gather_w(scatter, parts))
                .transpose()
        },
    )
}

/// For each dataset, a chain of nodes adding the prediction of every facet
/// of the model in turn. Each link depends on the one before.
fn facet_predict_chain<'a, P>(
    graph: &mut Graph<'a>,
    predict: P,
    vis: VisHandle,
    tiles: &[Handle<Image>],
    context: &str,
) -> VisHandle
where
    P: Transform + Clone + 'a,
{
    let mut acc = vis;
    for (f, &tile) in tiles.iter().enumerate() {
        let predict = predict.clone();
        acc = graph.map2(
            format!("predict_facet[{context}, facet {f}]"),
            acc,
            tile,
            move |acc: &Option<Visibilities>, tile: &Image| {
                acc.as_ref()
                    .map(|acc| predict_and_sum(&predict, acc, tile))
                    .transpose()
            },
        );
    }
    acc
}

/// Predict with facets. The model is cut into `facets * facets` tiles, and
/// the tiles' predictions are added to each dataset one after the other.
pub fn create_predict_facet_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    vis_list: &[VisHandle],
    model: Handle<Image>,
    facets: usize,
) -> Result<Vec<VisHandle>, ImagingError> {
    check_count("facets", facets)?;
    let tiles = scatter_image_graph(graph, ops.tiling, model, facets, "model");
    Ok(vis_list
        .iter()
        .enumerate()
        .map(|(i, &vis)| facet_predict_chain(graph, ops.base, vis, &tiles, &format!("vis {i}")))
        .collect())
}

/// Predict with w-stacking of facets: every w slice of every dataset gets
/// its own facet chain, and the slices are gathered back.
pub fn create_predict_all_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    vis_list: &[VisHandle],
    model: Handle<Image>,
    vis_slices: usize,
    facets: usize,
) -> Result<Vec<VisHandle>, ImagingError> {
    check_count("w slices", vis_slices)?;
    check_count("facets", facets)?;
    let tiles = scatter_image_graph(graph, ops.tiling, model, facets, "model");
    let mut predicted = vec![];
    for (i, &vis) in vis_list.iter().enumerate() {
        let (scatter, slices) = scatter_w_graph(graph, vis, i, vis_slices);
        let parts: Vec<VisHandle> = slices
            .into_iter()
            .enumerate()
            .map(|(j, slice)| {
                facet_predict_chain(
                    graph,
                    ops.wstack_single(),
                    slice,
                    &tiles,
                    &format!("vis {i}, w-slice {j}"),
                )
            })
            .collect();
        predicted.push(gather_w_graph(graph, scatter, &parts, i));
    }
    Ok(predicted)
}

fn residual_opts() -> InvertOptions {
    InvertOptions {
        dopsf: false,
        normalize: true,
        imaginary: false,
    }
}

/// The residual image of `model`: the model is predicted into zeroed copies
/// of the data, subtracted from the data, and the difference inverted on the
/// model's grid.
pub fn create_residual_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    vis_list: &[VisHandle],
    model: Handle<Image>,
) -> Result<Handle<Inverted>, ImagingError> {
    let zero = create_zero_vis_graph_list(graph, vis_list);
    let model_vis = create_predict_graph(graph, ops, &zero, model)?;
    let residual = create_subtract_vis_graph_list(graph, vis_list, &model_vis)?;
    create_invert_graph(graph, ops, &residual, model, residual_opts())
}

/// [`create_residual_graph`] with w-stacking in both directions.
pub fn create_residual_wstack_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    vis_list: &[VisHandle],
    model: Handle<Image>,
    vis_slices: usize,
) -> Result<Handle<Inverted>, ImagingError> {
    let zero = create_zero_vis_graph_list(graph, vis_list);
    let model_vis = create_predict_wstack_graph(graph, ops, &zero, model, vis_slices)?;
    let residual = create_subtract_vis_graph_list(graph, vis_list, &model_vis)?;
    create_invert_wstack_graph(graph, ops, &residual, model, vis_slices, residual_opts())
}

/// [`create_residual_graph`] with w-stacking and facets in both directions.
pub fn create_residual_all_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    vis_list: &[VisHandle],
    model: Handle<Image>,
    vis_slices: usize,
    facets: usize,
) -> Result<Handle<Inverted>, ImagingError> {
    let zero = create_zero_vis_graph_list(graph, vis_list);
    let model_vis = create_predict_all_graph(graph, ops, &zero, model, vis_slices, facets)?;
    let residual = create_subtract_vis_graph_list(graph, vis_list, &model_vis)?;
    create_invert_all_graph(
        graph,
        ops,
        &residual,
        model,
        vis_slices,
        facets,
        residual_opts(),
    )
}

/// Deconvolve the dirty image with the PSF and add the components to the
/// model.
pub fn create_deconvolve_graph<'a>(
    graph: &mut Graph<'a>,
    deconvolver: &'a dyn Deconvolver,
    dirty: Handle<Inverted>,
    psf: Handle<Inverted>,
    model: Handle<Image>,
) -> Handle<Image> {
    graph.map3(
        "deconvolve",
        dirty,
        psf,
        model,
        move |dirty: &Inverted, psf: &Inverted, model: &Image| {
            deconvolve_and_add(deconvolver, &dirty.image, &psf.image, model)
        },
    )
}

/// Deconvolve facet by facet: the dirty image is cut into `facets * facets`
/// tiles, each is deconvolved on its own with the same PSF, and the gathered
/// components are added to the (whole) model. Sources near facet edges are
/// only cleaned with the part of the PSF inside their facet.
pub fn create_deconvolve_facet_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    deconvolver: &'a dyn Deconvolver,
    dirty: Handle<Inverted>,
    psf: Handle<Inverted>,
    model: Handle<Image>,
    facets: usize,
) -> Result<Handle<Image>, ImagingError> {
    check_count("facets", facets)?;
    let tiling = ops.tiling;
    let dirty_image = graph.map("dirty_image", dirty, |dirty: &Inverted| {
        Ok(dirty.image.clone())
    });
    let tiles = scatter_image_graph(graph, tiling, dirty_image, facets, "dirty");
    let components: Vec<Handle<Image>> = tiles
        .into_iter()
        .enumerate()
        .map(|(f, tile)| {
            graph.map2(
                format!("deconvolve_facet[facet {f}]"),
                tile,
                psf,
                move |tile: &Image, psf: &Inverted| {
                    deconvolver.deconvolve(tile, &psf.image).map(|(model, _)| model)
                },
            )
        })
        .collect();
    Ok(graph.reduce_with(
        format!("gather_deconvolved[facets {facets}]"),
        model,
        &components,
        move |model: &Image, components: &[&Image]| {
            let components: Vec<Image> = components.iter().map(|&c| c.clone()).collect();
            let mut updated = tiling.gather(&components, &model.empty_like(), facets)?;
            updated.add(model)?;
            Ok(updated)
        },
    ))
}

/// Self-calibrate every dataset against the model: predict the model with
/// the base transform, solve with `calibrator`, and return the corrected
/// data.
pub fn create_selfcal_graph_list<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    calibrator: &'a dyn Calibrator,
    vis_list: &[VisHandle],
    model: Handle<Image>,
) -> Vec<VisHandle> {
    let base = ops.base;
    vis_list
        .iter()
        .enumerate()
        .map(|(i, &vis)| {
            graph.map2(
                format!("selfcal[vis {i}]"),
                vis,
                model,
                move |vis: &Option<Visibilities>, model: &Image| {
                    vis.as_ref()
                        .map(|vis| {
                            let predicted = base.predict(vis, model)?;
                            calibrator.calibrate(vis, &predicted)
                        })
                        .transpose()
                },
            )
        })
        .collect()
}

/// How the solve pipeline partitions the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveStrategy {
    pub vis_slices: usize,
    pub facets: usize,
    pub nmajor: usize,
}

/// Major-cycle imaging: make the PSF once, then `nmajor` times compute the
/// residual of the current model and deconvolve it into the model. Returns the
/// final model and its residual.
pub fn create_solve_image_graph<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    deconvolver: &'a dyn Deconvolver,
    vis_list: &[VisHandle],
    model: Handle<Image>,
    strategy: SolveStrategy,
) -> Result<(Handle<Image>, Handle<Inverted>), ImagingError> {
    let SolveStrategy {
        vis_slices,
        facets,
        nmajor,
    } = strategy;
    let psf = create_invert_all_graph(
        graph,
        ops,
        vis_list,
        model,
        vis_slices,
        facets,
        InvertOptions {
            dopsf: true,
            ..residual_opts()
        },
    )?;

    let mut model = model;
    let mut residual = create_residual_all_graph(graph, ops, vis_list, model, vis_slices, facets)?;
    for _ in 0..nmajor {
        model = create_deconvolve_graph(graph, deconvolver, residual, psf, model);
        residual = create_residual_all_graph(graph, ops, vis_list, model, vis_slices, facets)?;
    }
    Ok((model, residual))
}
