use graph_layout_coordinator::{
    compute_layout, Edge, LayeredEngine, LayoutJob, LayoutOptions, LayoutOutput, LayoutVertex, Phase, RankDir,
    SizeVertex,
};
use proptest::prelude::*;
use proptest::test_runner::{TestCaseError, TestRunner};

use crate::support::{extents, find_overlap};

#[derive(Debug, Clone)]
struct GraftCase {
    existing: Vec<(f64, f64)>,
    cohort: Vec<(f64, f64)>,
    anchor: usize,
    anchor_is_source: bool,
    rankdir: RankDir,
}

fn size_strategy() -> impl Strategy<Value = (f64, f64)> {
    (1u32..=20, 1u32..=20).prop_map(|(w, h)| (w as f64, h as f64))
}

fn graft_case_strategy() -> impl Strategy<Value = GraftCase> {
    (
        prop::collection::vec(size_strategy(), 2..=5),
        prop::collection::vec(size_strategy(), 1..=3),
        any::<prop::sample::Index>(),
        any::<bool>(),
        prop_oneof![Just(RankDir::LR), Just(RankDir::TB)],
    )
        .prop_map(|(existing, cohort, anchor, anchor_is_source, rankdir)| GraftCase {
            anchor: anchor.index(existing.len()),
            existing,
            cohort,
            anchor_is_source,
            rankdir,
        })
}

fn chain(prefix: &str, sizes: &[(f64, f64)]) -> (Vec<SizeVertex>, Vec<Edge>) {
    let vertices: Vec<SizeVertex> =
        sizes.iter().enumerate().map(|(i, (w, h))| SizeVertex::new(format!("{prefix}{i}"), *w, *h)).collect();
    let edges = vertices.windows(2).map(|pair| Edge::new(pair[0].key.clone(), pair[1].key.clone())).collect();
    (vertices, edges)
}

fn full_layout(vertices: Vec<SizeVertex>, edges: Vec<Edge>, options: &LayoutOptions) -> Result<LayoutOutput, TestCaseError> {
    let job = LayoutJob {
        phase: Phase::DotOnly,
        positioned_vertices: Vec::new(),
        new_vertices: vertices,
        positioned_edges: Vec::new(),
        new_edges: edges,
        options: options.clone(),
        prev_graph: None,
    };
    compute_layout(&LayeredEngine::new(), &job).map_err(|e| TestCaseError::fail(e.to_string()))
}

fn assert_origin(vertices: &[LayoutVertex]) -> Result<(), TestCaseError> {
    let (min_x, min_y, _, _) = extents(vertices);
    prop_assert!(min_x.abs() < 1e-6, "min x {}", min_x);
    prop_assert!(min_y.abs() < 1e-6, "min y {}", min_y);
    Ok(())
}

#[test]
fn full_layout_starts_at_origin() {
    let mut config = ProptestConfig::with_cases(20);
    config.failure_persistence = None;
    let mut runner = TestRunner::new(config);
    runner
        .run(&prop::collection::vec(size_strategy(), 1..=6), |sizes| {
            let options = LayoutOptions::default();
            let (vertices, edges) = chain("v", &sizes);
            let output = full_layout(vertices, edges, &options)?;

            prop_assert!(!output.layout_error);
            prop_assert_eq!(output.vertex_count(), sizes.len());
            prop_assert_eq!(output.edge_count(), Some(sizes.len() - 1));
            assert_origin(&output.new_vertices)?;

            let (_, _, max_x, max_y) = extents(&output.new_vertices);
            prop_assert!((max_x - output.graph.width).abs() < 1e-6);
            prop_assert!((max_y - output.graph.height).abs() < 1e-6);
            Ok(())
        })
        .expect("full layout properties");
}

#[test]
fn grafted_cohort_never_overlaps_existing_vertices() {
    let mut config = ProptestConfig::with_cases(20);
    config.failure_persistence = None;
    let mut runner = TestRunner::new(config);
    runner
        .run(&graft_case_strategy(), |case| {
            let options = LayoutOptions { rankdir: case.rankdir, use_dot_edges: true, ..Default::default() };
            let (existing, existing_edges) = chain("e", &case.existing);
            let base = full_layout(existing, existing_edges, &options)?;
            prop_assert!(!base.layout_error);

            let anchor = format!("e{}", case.anchor);
            let (cohort, mut cohort_edges) = chain("c", &case.cohort);
            if case.anchor_is_source {
                cohort_edges.push(Edge::new(anchor.clone(), "c0"));
            } else {
                // flow into the anchor
                cohort_edges = cohort_edges.into_iter().map(|e| Edge::new(e.to, e.from)).collect();
                cohort_edges.push(Edge::new("c0", anchor.clone()));
            }

            let job = LayoutJob {
                phase: Phase::DotOnly,
                positioned_vertices: base.moved_vertices.iter().chain(&base.new_vertices).cloned().collect(),
                new_vertices: cohort,
                positioned_edges: base
                    .moved_edges
                    .iter()
                    .flatten()
                    .chain(base.new_edges.iter().flatten())
                    .cloned()
                    .collect(),
                new_edges: cohort_edges,
                options,
                prev_graph: Some(base.graph),
            };
            let output = compute_layout(&LayeredEngine::new(), &job).map_err(|e| TestCaseError::fail(e.to_string()))?;

            let existing_count = case.existing.len();
            let cohort_count = case.cohort.len();
            prop_assert!(!output.layout_error, "{:?}", output.layout_error_message);
            prop_assert_eq!(output.moved_vertices.len(), existing_count);
            prop_assert_eq!(output.new_vertices.len(), cohort_count);
            prop_assert_eq!(output.edge_count(), Some(existing_count - 1 + cohort_count));
            prop_assert_eq!(output.cohorts, 1);

            let all: Vec<LayoutVertex> = output.moved_vertices.iter().chain(&output.new_vertices).cloned().collect();
            prop_assert!(find_overlap(&all, 1e-5).is_none(), "overlap {:?}", find_overlap(&all, 1e-5));
            assert_origin(&all)?;
            Ok(())
        })
        .expect("graft properties");
}
