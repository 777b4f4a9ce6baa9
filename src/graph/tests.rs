// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::{pipelines::*, *};
use crate::{
    c64,
    calibrate::AntennaGains,
    deconvolve::{deconvolve_and_add, Hogbom},
    image::Image,
    imaging::{wstack, DftTransform, Facets, InvertOptions, Inverted, Transform},
    simulate::SyntheticObservation,
    vis::{
        iterators::{VisPartitioning, WSlicing},
        RowSelection, Visibilities,
    },
};

fn observation() -> Visibilities {
    SyntheticObservation {
        num_antennas: 8,
        height: 40.0,
        ..Default::default()
    }
    .visibilities()
}

fn template() -> Image {
    Image::zeros(16, 0.004, vec![1e8], 1)
}

fn model() -> Image {
    let mut model = template();
    model.data[[0, 0, 8, 8]] = 2.0;
    model.data[[0, 0, 3, 5]] = 1.0;
    model.data[[0, 0, 12, 10]] = 0.5;
    model
}

/// Visibilities of `model()` with the exact w term.
fn observed() -> Visibilities {
    DftTransform { w_projection: true }
        .predict(&observation(), &model())
        .unwrap()
}

fn max_image_diff(a: &Image, b: &Image) -> f64 {
    assert_eq!(a.data.dim(), b.data.dim());
    a.data
        .iter()
        .zip(b.data.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

fn max_vis_diff(a: &Visibilities, b: &Visibilities) -> f64 {
    assert_eq!(a.vis.dim(), b.vis.dim());
    a.vis
        .iter()
        .zip(b.vis.iter())
        .map(|(a, b)| (a - b).norm())
        .fold(0.0, f64::max)
}

fn abs_peak(image: &Image) -> f64 {
    image.data.iter().fold(0.0, |a, b| a.max(b.abs()))
}

fn vis_list(graph: &mut Graph<'_>, vis: &Visibilities) -> Vec<VisHandle> {
    create_vis_graph_list(graph, vis, VisPartitioning::Whole).unwrap()
}

fn compute_inverted(graph: &Graph<'_>, handle: Handle<Inverted>) -> Inverted {
    let mut computed = graph.compute(&Parallel).unwrap();
    computed.take(handle).unwrap()
}

fn compute_vis(graph: &Graph<'_>, handles: &[VisHandle]) -> Vec<Option<Visibilities>> {
    let mut computed = graph.compute(&Parallel).unwrap();
    handles.iter().map(|&h| computed.take(h).unwrap()).collect()
}

#[test]
fn test_schedulers_agree() {
    let mut graph = Graph::new();
    let a = graph.constant("a", 2.0_f64);
    let b = graph.constant("b", 3.0_f64);
    let c = graph.constant("c", vec![1.0_f64, 2.0]);
    let sum = graph.map2("sum", a, b, |a: &f64, b: &f64| Ok(a + b));
    let scaled = graph.map3("scaled", sum, b, c, |s: &f64, b: &f64, c: &Vec<f64>| {
        Ok(c.iter().map(|c| c * s * b).collect::<Vec<f64>>())
    });
    let total = graph.reduce("total", &[a, b, sum], |xs: &[&f64]| {
        Ok(xs.iter().copied().sum::<f64>())
    });
    let with = graph.reduce_with("with", scaled, &[total], |v: &Vec<f64>, t: &[&f64]| {
        Ok(v.len() as f64 + *t[0])
    });
    assert_eq!(graph.len(), 7);
    assert_eq!(graph.label(sum), Some("sum"));
    assert_eq!(graph.depth(with), Some(3));
    assert_eq!(
        graph.waves().unwrap(),
        vec![vec![0, 1, 2], vec![3], vec![4, 5], vec![6]]
    );

    for computed in [
        graph.compute(&Sequential).unwrap(),
        graph.compute(&Parallel).unwrap(),
    ] {
        assert_abs_diff_eq!(*computed.get(sum).unwrap(), 5.0);
        assert_eq!(computed.get(scaled).unwrap(), &vec![15.0, 30.0]);
        assert_abs_diff_eq!(*computed.get(total).unwrap(), 10.0);
        assert_abs_diff_eq!(*computed.get(with).unwrap(), 12.0);
    }
}

#[test]
fn test_failures_carry_the_node_label() {
    let mut graph = Graph::new();
    let a = graph.constant("a", 1_usize);
    let ok = graph.map("fine", a, |a: &usize| Ok(a + 1));
    let _bad = graph.map("broken[vis 3]", ok, |_: &usize| -> Result<usize, _> {
        Err(ImagingError::EmptyAccumulation)
    });
    let expected = GraphError::Node {
        label: "broken[vis 3]".to_string(),
        source: ImagingError::EmptyAccumulation,
    };
    assert_eq!(graph.compute(&Sequential).err(), Some(expected.clone()));
    assert_eq!(graph.compute(&Parallel).err(), Some(expected));
}

#[test]
fn test_computed_values_are_typed() {
    let mut graph = Graph::new();
    let a = graph.constant("a", 1_usize);
    let mut computed = graph.compute(&Sequential).unwrap();

    let forged: Handle<String> = Handle::new(a.index());
    assert_eq!(
        computed.get(forged).err(),
        Some(GraphError::WrongType {
            label: "a".to_string()
        })
    );
    assert!(computed.take(forged).is_err());
    // A failed take leaves the value in place.
    assert_eq!(computed.take(a), Ok(1));
    assert_eq!(computed.take(a), Err(GraphError::Missing { index: 0 }));
}

#[test]
fn test_foreign_handles_are_missing_on_both_schedulers() {
    let mut bigger = Graph::new();
    bigger.constant("a", 1.0_f64);
    bigger.constant("b", 2.0_f64);
    let foreign = bigger.constant("c", 3.0_f64);

    let mut graph = Graph::new();
    let a = graph.constant("a", 1.0_f64);
    graph.map2("sum", a, foreign, |a: &f64, c: &f64| Ok(a + c));
    let expected = GraphError::Missing { index: 2 };
    assert_eq!(graph.waves().err(), Some(expected.clone()));
    assert_eq!(graph.depth(a), None);
    assert_eq!(graph.compute(&Sequential).err(), Some(expected.clone()));
    assert_eq!(graph.compute(&Parallel).err(), Some(expected));
}

#[test]
fn test_vis_graph_list_partitions() {
    let vis = observation();
    let mut graph = Graph::new();
    let list = create_vis_graph_list(&mut graph, &vis, VisPartitioning::Time(None)).unwrap();
    assert_eq!(list.len(), 3);
    let parts = compute_vis(&graph, &list);
    let num_rows: usize = parts.iter().flatten().map(|p| p.num_rows()).sum();
    assert_eq!(num_rows, vis.num_rows());
}

#[test]
fn test_zero_and_subtract_lists() {
    let vis = observed();
    let mut graph = Graph::new();
    let list = vis_list(&mut graph, &vis);
    let zero = create_zero_vis_graph_list(&mut graph, &list);
    let same = create_subtract_vis_graph_list(&mut graph, &list, &zero).unwrap();
    let none = graph.constant("none", None::<Visibilities>);
    let skipped = create_subtract_vis_graph_list(&mut graph, &[none], &list).unwrap();
    assert!(create_subtract_vis_graph_list(&mut graph, &list, &[]).is_err());

    let mut computed = graph.compute(&Parallel).unwrap();
    let zero = computed.take(zero[0]).unwrap().unwrap();
    assert!(zero.vis.iter().all(|v| *v == c64::default()));
    assert_eq!(zero.uvw, vis.uvw);
    assert_eq!(computed.take(same[0]).unwrap(), Some(vis));
    assert_eq!(computed.take(skipped[0]).unwrap(), None);
}

#[test]
fn test_subtract_mismatched_rows_names_the_partition() {
    let vis = observed();
    let fewer = vis.select(&RowSelection::Range(0..10)).unwrap();
    let mut graph = Graph::new();
    let a = graph.constant("a", Some(vis));
    let b = graph.constant("b", Some(fewer));
    create_subtract_vis_graph_list(&mut graph, &[a], &[b]).unwrap();
    match graph.compute(&Parallel) {
        Err(GraphError::Node { label, source }) => {
            assert_eq!(label, "subtract_vis[vis 0]");
            assert!(matches!(source, ImagingError::ShapeMismatch { .. }));
        }
        other => panic!("unexpected result {:?}", other.err()),
    }
}

#[test]
fn test_invert_graph_matches_transform() {
    let vis = observed();
    let base = DftTransform::default();
    let opts = InvertOptions::default();
    let expected = base.invert(&vis, &template(), &opts).unwrap();

    // Accumulating time partitions gives the same normalised image.
    let mut graph = Graph::new();
    let list = create_vis_graph_list(&mut graph, &vis, VisPartitioning::Time(None)).unwrap();
    let template = graph.constant("template", template());
    let inverted =
        create_invert_graph(&mut graph, Operators::new(&base), &list, template, opts).unwrap();
    let inverted = compute_inverted(&graph, inverted);
    assert!(max_image_diff(&inverted.image, &expected.image) < 1e-10);
    assert_abs_diff_eq!(inverted.weight, expected.weight, epsilon = 1e-10);
}

#[test]
fn test_invert_wstack_graph_matches_operator() {
    let vis = observed();
    let base = DftTransform::default();
    let opts = InvertOptions::default();
    let expected = wstack(base, WSlicing::Count(3))
        .invert(&vis, &template(), &opts)
        .unwrap();

    let mut graph = Graph::new();
    let list = vis_list(&mut graph, &vis);
    let template = graph.constant("template", template());
    let inverted =
        create_invert_wstack_graph(&mut graph, Operators::new(&base), &list, template, 3, opts)
            .unwrap();
    let inverted = compute_inverted(&graph, inverted);
    assert!(max_image_diff(&inverted.image, &expected.image) < 1e-10);
    assert_abs_diff_eq!(inverted.total_weight(), vis.sum_weights(), epsilon = 1e-9);
}

#[test]
fn test_invert_facet_graph_matches_operator() {
    let vis = observed();
    let base = DftTransform::default();
    let ops = Operators::new(&base);
    let opts = InvertOptions {
        imaginary: true,
        ..Default::default()
    };
    let expected = Facets::new(base, 2)
        .invert(&vis, &template(), &opts)
        .unwrap();

    let mut graph = Graph::new();
    let list = vis_list(&mut graph, &vis);
    let template = graph.constant("template", template());
    let inverted = create_invert_facet_graph(&mut graph, ops, template, 2, opts, |g, tile, o| {
        create_invert_graph(g, ops, &list, tile, o)
    })
    .unwrap();
    let inverted = compute_inverted(&graph, inverted);
    assert!(max_image_diff(&inverted.image, &expected.image) < 1e-10);
    let (imaginary, expected_imaginary) = (
        inverted.imaginary.unwrap(),
        expected.imaginary.unwrap(),
    );
    assert!(max_image_diff(&imaginary, &expected_imaginary) < 1e-10);
    assert_eq!(inverted.weight, expected.weight);
}

#[test]
fn test_invert_all_graph_matches_nested_operator() {
    let vis = observed();
    let base = DftTransform::default();
    let opts = InvertOptions::default();
    let expected = Facets::new(wstack(base, WSlicing::Count(3)), 2)
        .invert(&vis, &template(), &opts)
        .unwrap();

    let mut graph = Graph::new();
    let list = vis_list(&mut graph, &vis);
    let template = graph.constant("template", template());
    let inverted =
        create_invert_all_graph(&mut graph, Operators::new(&base), &list, template, 3, 2, opts)
            .unwrap();
    let inverted = compute_inverted(&graph, inverted);
    assert!(max_image_diff(&inverted.image, &expected.image) < 1e-10);
    assert_abs_diff_eq!(inverted.total_weight(), vis.sum_weights(), epsilon = 1e-9);
}

/// Invert `with_empty` and `without` with every invert builder, and check
/// that the images and weights agree.
fn assert_inverts_skip_empty_partitions<'a>(
    graph: &mut Graph<'a>,
    ops: Operators<'a>,
    with_empty: &[VisHandle],
    without: &[VisHandle],
) {
    let template = graph.constant("template", template());
    let opts = InvertOptions::default();
    let mut pairs = vec![];
    for list in [with_empty, without] {
        pairs.push([
            create_invert_graph(graph, ops, list, template, opts).unwrap(),
            create_invert_wstack_graph(graph, ops, list, template, 3, opts).unwrap(),
            create_invert_all_graph(graph, ops, list, template, 3, 2, opts).unwrap(),
        ]);
    }
    let mut computed = graph.compute(&Parallel).unwrap();
    for (a, b) in pairs[0].into_iter().zip(pairs[1]) {
        let label = graph.label(a).unwrap_or_default().to_string();
        let a = computed.take(a).unwrap();
        let b = computed.take(b).unwrap();
        assert!(max_image_diff(&a.image, &b.image) < 1e-10, "{label}");
        assert_abs_diff_eq!(a.total_weight(), b.total_weight(), epsilon = 1e-9);
    }
}

#[test]
fn test_inverts_skip_an_empty_partition() {
    let vis = observed();
    let base = DftTransform::default();
    let mut graph = Graph::new();
    let whole = vis_list(&mut graph, &vis);
    let empty = graph.constant("vis[empty]", None::<Visibilities>);
    let with_empty = vec![whole[0], empty, whole[0]];
    let without = vec![whole[0], whole[0]];
    let ops = Operators::new(&base);
    assert_inverts_skip_empty_partitions(&mut graph, ops, &with_empty, &without);
}

#[test]
fn test_inverts_of_w_partitions_skip_empty_slices() {
    // With every w at zero, all rows land in the middle w slice.
    let mut vis = observed();
    vis.uvw.iter_mut().for_each(|uvw| uvw.w = 0.0);
    let base = DftTransform::default();
    let mut graph = Graph::new();
    let partitioned =
        create_vis_graph_list(&mut graph, &vis, VisPartitioning::W(WSlicing::Count(5))).unwrap();
    let whole = vis_list(&mut graph, &vis);
    let parts = compute_vis(&graph, &partitioned);
    assert_eq!(parts.len(), 5);
    assert_eq!(parts.iter().filter(|p| p.is_none()).count(), 4);
    assert_eq!(parts[2].as_ref().map(|p| p.num_rows()), Some(vis.num_rows()));

    let ops = Operators::new(&base);
    assert_inverts_skip_empty_partitions(&mut graph, ops, &partitioned, &whole);
}

#[test]
fn test_predict_graphs_match_operators() {
    let vis = observation();
    let base = DftTransform::default();
    let ops = Operators::new(&base);
    let model_image = model();

    let mut graph = Graph::new();
    let list = vis_list(&mut graph, &vis);
    let zero = create_zero_vis_graph_list(&mut graph, &list);
    let model = graph.constant("model", model_image.clone());
    let plain = create_predict_graph(&mut graph, ops, &zero, model).unwrap();
    let stacked = create_predict_wstack_graph(&mut graph, ops, &zero, model, 3).unwrap();
    let faceted = create_predict_facet_graph(&mut graph, ops, &zero, model, 2).unwrap();
    let all = create_predict_all_graph(&mut graph, ops, &zero, model, 3, 2).unwrap();
    let handles = [plain[0], stacked[0], faceted[0], all[0]];
    let results: Vec<Visibilities> = compute_vis(&graph, &handles)
        .into_iter()
        .map(|v| v.unwrap())
        .collect();

    let expected = [
        base.predict(&vis, &model_image).unwrap(),
        wstack(base, WSlicing::Count(3))
            .predict(&vis, &model_image)
            .unwrap(),
        Facets::new(base, 2).predict(&vis, &model_image).unwrap(),
        wstack(Facets::new(base, 2), WSlicing::Count(3))
            .predict(&vis, &model_image)
            .unwrap(),
    ];
    for (result, expected) in results.iter().zip(expected.iter()) {
        assert!(max_vis_diff(result, expected) < 1e-9);
        assert_eq!(result.uvw, vis.uvw);
    }
}

#[test]
fn test_predict_adds_to_the_input() {
    let vis = observed();
    let base = DftTransform { w_projection: true };
    let mut graph = Graph::new();
    let list = vis_list(&mut graph, &vis);
    let model = graph.constant("model", model());
    let doubled = create_predict_graph(&mut graph, Operators::new(&base), &list, model).unwrap();
    let doubled = compute_vis(&graph, &doubled).remove(0).unwrap();
    let mut expected = vis.clone();
    expected.vis.mapv_inplace(|v| v * 2.0);
    assert!(max_vis_diff(&doubled, &expected) < 1e-9);
}

#[test]
fn test_predict_facet_graph_is_a_chain() {
    let vis = observation();
    let base = DftTransform::default();
    let mut graph = Graph::new();
    let list = vis_list(&mut graph, &vis);
    let model = graph.constant("model", model());
    let predicted =
        create_predict_facet_graph(&mut graph, Operators::new(&base), &list, model, 2).unwrap();
    // Inputs, the model scatter, the tiles, then one link per facet.
    assert_eq!(graph.depth(predicted[0]), Some(2 + 4));
    assert_eq!(
        graph.label(predicted[0]),
        Some("predict_facet[vis 0, facet 3]")
    );

    // Facet inverts are independent of each other.
    let template = graph.constant("template", template());
    let inverted = create_invert_facet_graph(
        &mut graph,
        Operators::new(&base),
        template,
        2,
        InvertOptions::default(),
        |g, tile, o| create_invert_graph(g, Operators::new(&base), &list, tile, o),
    )
    .unwrap();
    assert_eq!(graph.depth(inverted), Some(5));
}

#[test]
fn test_builders_reject_zero_counts() {
    let vis = observation();
    let base = DftTransform::default();
    let ops = Operators::new(&base);
    let mut graph = Graph::new();
    let list = vis_list(&mut graph, &vis);
    let image = graph.constant("model", model());
    let opts = InvertOptions::default();
    assert!(matches!(
        create_invert_wstack_graph(&mut graph, ops, &list, image, 0, opts),
        Err(ImagingError::InvalidPartition(_))
    ));
    assert!(matches!(
        create_invert_all_graph(&mut graph, ops, &list, image, 2, 0, opts),
        Err(ImagingError::InvalidPartition(_))
    ));
    assert!(matches!(
        create_predict_facet_graph(&mut graph, ops, &list, image, 0),
        Err(ImagingError::InvalidPartition(_))
    ));
    assert!(matches!(
        create_predict_wstack_graph(&mut graph, ops, &list, image, 0),
        Err(ImagingError::InvalidPartition(_))
    ));
}

#[test]
fn test_uneven_facets_fail_when_executed() {
    let vis = observation();
    let base = DftTransform::default();
    let mut graph = Graph::new();
    let list = vis_list(&mut graph, &vis);
    let model = graph.constant("model", model());
    create_predict_facet_graph(&mut graph, Operators::new(&base), &list, model, 3).unwrap();
    match graph.compute(&Sequential) {
        Err(GraphError::Node { label, source }) => {
            assert_eq!(label, "scatter_image[model, facets 3]");
            assert!(matches!(source, ImagingError::InvalidPartition(_)));
        }
        other => panic!("unexpected result {:?}", other.err()),
    }
}

#[test]
fn test_residual_of_the_true_model_is_empty() {
    let vis = observed();
    let base = DftTransform { w_projection: true };
    let ops = Operators::new(&base);
    let mut graph = Graph::new();
    let list = create_vis_graph_list(&mut graph, &vis, VisPartitioning::Time(None)).unwrap();
    let model = graph.constant("model", model());
    let residuals = [
        create_residual_graph(&mut graph, ops, &list, model).unwrap(),
        create_residual_wstack_graph(&mut graph, ops, &list, model, 3).unwrap(),
        create_residual_all_graph(&mut graph, ops, &list, model, 3, 2).unwrap(),
    ];
    let mut computed = graph.compute(&Parallel).unwrap();
    for residual in residuals {
        let residual = computed.take(residual).unwrap();
        assert!(abs_peak(&residual.image) < 1e-9);
        assert_abs_diff_eq!(residual.total_weight(), vis.sum_weights(), epsilon = 1e-9);
    }
}

#[test]
fn test_residuals_skip_an_empty_partition() {
    let vis = observed();
    let base = DftTransform { w_projection: true };
    let ops = Operators::new(&base);
    let mut graph = Graph::new();
    let mut list = create_vis_graph_list(&mut graph, &vis, VisPartitioning::Time(None)).unwrap();
    list.insert(1, graph.constant("vis[empty]", None::<Visibilities>));
    let model = graph.constant("model", model());
    let empty_model = graph.constant("empty", template());
    let opts = InvertOptions::default();
    let dirty =
        create_invert_all_graph(&mut graph, ops, &list, empty_model, 3, 2, opts).unwrap();
    let residuals = [
        create_residual_graph(&mut graph, ops, &list, model).unwrap(),
        create_residual_wstack_graph(&mut graph, ops, &list, model, 3).unwrap(),
        create_residual_all_graph(&mut graph, ops, &list, model, 3, 2).unwrap(),
    ];
    let empty_residual = create_residual_all_graph(&mut graph, ops, &list, empty_model, 3, 2)
        .unwrap();

    let mut computed = graph.compute(&Parallel).unwrap();
    for residual in residuals {
        let residual = computed.take(residual).unwrap();
        assert!(abs_peak(&residual.image) < 1e-9);
        assert_abs_diff_eq!(residual.total_weight(), vis.sum_weights(), epsilon = 1e-9);
    }
    let dirty = computed.take(dirty).unwrap();
    let empty_residual = computed.take(empty_residual).unwrap();
    assert!(max_image_diff(&empty_residual.image, &dirty.image) < 1e-9);
}

#[test]
fn test_residual_of_an_empty_model_is_the_dirty_image() {
    let vis = observed();
    let base = DftTransform::default();
    let ops = Operators::new(&base);
    let mut graph = Graph::new();
    let list = vis_list(&mut graph, &vis);
    let empty = graph.constant("empty", template());
    let residual = create_residual_graph(&mut graph, ops, &list, empty).unwrap();
    let dirty = create_invert_graph(&mut graph, ops, &list, empty, InvertOptions::default())
        .unwrap();
    let mut computed = graph.compute(&Parallel).unwrap();
    let residual = computed.take(residual).unwrap();
    let dirty = computed.take(dirty).unwrap();
    assert!(max_image_diff(&residual.image, &dirty.image) < 1e-12);
    assert!(abs_peak(&dirty.image) > 1.0);
}

/// A 9x9 Gaussian PSF with a unit peak at its centre.
fn gaussian_psf() -> Inverted {
    let mut psf = Image::zeros(9, 0.004, vec![1e8], 1);
    psf.data.indexed_iter_mut().for_each(|((_, _, y, x), v)| {
        let r2 = (y as f64 - 4.0).powi(2) + (x as f64 - 4.0).powi(2);
        *v = (-r2 / 2.0).exp();
    });
    Inverted {
        image: psf,
        weight: Array2::ones((1, 1)),
        imaginary: None,
    }
}

fn dirty_with_sources(sources: &[(usize, usize, f64)]) -> Inverted {
    let psf = gaussian_psf();
    let mut dirty = template();
    for &(y, x, flux) in sources {
        for ((py, px), &p) in psf.image.data.slice(s![0, 0, .., ..]).indexed_iter() {
            let ty = y as isize + py as isize - 4;
            let tx = x as isize + px as isize - 4;
            if (0..16).contains(&ty) && (0..16).contains(&tx) {
                dirty.data[[0, 0, ty as usize, tx as usize]] += flux * p;
            }
        }
    }
    Inverted {
        image: dirty,
        weight: Array2::ones((1, 1)),
        imaginary: None,
    }
}

#[test]
fn test_deconvolve_graphs() {
    let clean = Hogbom {
        niter: 200,
        gain: 0.5,
        threshold: 1e-6,
        fractional_threshold: 0.0,
    };
    let dirty = dirty_with_sources(&[(4, 4, 1.0), (11, 12, 0.5)]);
    let psf = gaussian_psf();
    let mut start = template();
    start.data[[0, 0, 0, 15]] = 2.0;
    let expected = deconvolve_and_add(&clean, &dirty.image, &psf.image, &start).unwrap();

    let base = DftTransform::default();
    let ops = Operators::new(&base);
    let mut graph = Graph::new();
    let dirty_h = graph.constant("dirty", dirty);
    let psf_h = graph.constant("psf", psf);
    let model_h = graph.constant("model", start);
    let whole = create_deconvolve_graph(&mut graph, &clean, dirty_h, psf_h, model_h);
    let one_facet =
        create_deconvolve_facet_graph(&mut graph, ops, &clean, dirty_h, psf_h, model_h, 1)
            .unwrap();
    let faceted =
        create_deconvolve_facet_graph(&mut graph, ops, &clean, dirty_h, psf_h, model_h, 2)
            .unwrap();
    assert!(
        create_deconvolve_facet_graph(&mut graph, ops, &clean, dirty_h, psf_h, model_h, 0).is_err()
    );

    let mut computed = graph.compute(&Parallel).unwrap();
    let whole = computed.take(whole).unwrap();
    let one_facet = computed.take(one_facet).unwrap();
    let faceted = computed.take(faceted).unwrap();
    assert!(max_image_diff(&whole, &expected) < 1e-12);
    assert!(max_image_diff(&one_facet, &expected) < 1e-12);
    // Both sources are well inside their facets.
    assert_abs_diff_eq!(faceted.data[[0, 0, 4, 4]], 1.0, epsilon = 1e-4);
    assert_abs_diff_eq!(faceted.data[[0, 0, 11, 12]], 0.5, epsilon = 1e-4);
    assert_abs_diff_eq!(faceted.data[[0, 0, 0, 15]], 2.0);
}

#[test]
fn test_selfcal_graph_removes_gains() {
    let vis = observed();
    let gain = |a: usize| c64::from_polar(1.0 + 0.03 * a as f64, 0.15 * a as f64);
    let mut corrupted = vis.clone();
    for (i_row, mut row) in corrupted.vis.outer_iter_mut().enumerate() {
        let g = gain(vis.antenna1[i_row]) * gain(vis.antenna2[i_row]).conj();
        row.mapv_inplace(|v| v * g);
    }

    let base = DftTransform { w_projection: true };
    let cal = AntennaGains {
        max_iterations: 500,
        stop_threshold: 1e-24,
    };
    let mut graph = Graph::new();
    let list = vis_list(&mut graph, &corrupted);
    let model = graph.constant("model", model());
    let corrected =
        create_selfcal_graph_list(&mut graph, Operators::new(&base), &cal, &list, model);
    let corrected = compute_vis(&graph, &corrected).remove(0).unwrap();
    assert!(max_vis_diff(&corrected, &vis) < 1e-6);
}

#[test]
fn test_solve_image_graph_converges() {
    // A unit source at the phase centre is untouched by any w term, so the
    // dirty image is exactly the PSF.
    let vis = observation();
    let mut truth = template();
    truth.data[[0, 0, 8, 8]] = 1.0;
    let vis = DftTransform { w_projection: true }
        .predict(&vis, &truth)
        .unwrap();

    let base = DftTransform::default();
    let clean = Hogbom::default();
    let ops = Operators::new(&base);
    let mut graph = Graph::new();
    let list = create_vis_graph_list(&mut graph, &vis, VisPartitioning::Time(None)).unwrap();
    let model = graph.constant("model", template());
    let strategy = SolveStrategy {
        vis_slices: 3,
        facets: 2,
        nmajor: 3,
    };
    let (solved, residual) =
        create_solve_image_graph(&mut graph, ops, &clean, &list, model, strategy).unwrap();
    let (_, dirty) = create_solve_image_graph(
        &mut graph,
        ops,
        &clean,
        &list,
        model,
        SolveStrategy {
            nmajor: 0,
            ..strategy
        },
    )
    .unwrap();

    let mut computed = graph.compute(&Parallel).unwrap();
    let solved = computed.take(solved).unwrap();
    let residual = computed.take(residual).unwrap();
    let dirty = computed.take(dirty).unwrap();
    assert_abs_diff_eq!(dirty.image.data[[0, 0, 8, 8]], 1.0, epsilon = 1e-9);
    assert!(solved.data[[0, 0, 8, 8]] > 0.99);
    assert_abs_diff_eq!(solved.data.sum(), solved.data[[0, 0, 8, 8]]);
    assert!(abs_peak(&residual.image) < 1e-2);
}
