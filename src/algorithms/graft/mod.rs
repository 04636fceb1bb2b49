//! Incremental graft of new vertices onto a positioned graph
//!
//! 1. Partition new vertices into anchored cohorts
//! 2. Lay out each cohort on its own (anchor included) and align it so the
//!    anchor lands on its existing position
//! 3. Push the cohort past the slide threshold if needed and slide existing
//!    vertices aside, one shared distance per side
//! 4. Reframe everything to a zero-based origin
//! 5. Reconcile edges: a path whose endpoints moved by the same delta is
//!    translated, anything else is reported as unresolved

pub mod cohort;
pub mod collision;
pub mod reframe;

use hashbrown::{HashMap, HashSet};

use tracing::{debug, info, warn};

use self::cohort::{partition_cohorts, Cohort};
use self::collision::{append_segment, cubic_segment, plan_slide, prepend_segment, RankFrame};
use self::reframe::reframe;
use super::{order_like, run_engine, vertices_validity, ExpectedVertex, LayoutJob, LayoutOutput, Validity};
use crate::engine::LayoutEngine;
use crate::error::{LayoutError, Result};
use crate::model::{Edge, LayoutEdge, LayoutVertex, Phase, Point, SizeVertex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeOrigin {
    /// Positioned before this request
    Existing,
    /// Laid out together with a cohort
    Cohort,
}

/// An edge path plus the endpoint positions it was drawn against
#[derive(Debug, Clone)]
struct TrackedEdge {
    edge: LayoutEdge,
    drawn_against: Option<(Point, Point)>,
    origin: EdgeOrigin,
}

/// Positioned vertices plus cohorts as they land
struct Placement {
    vertices: Vec<LayoutVertex>,
    index: HashMap<String, usize>,
}

impl Placement {
    fn new(vertices: Vec<LayoutVertex>) -> Self {
        let index = vertices.iter().enumerate().map(|(i, v)| (v.key.clone(), i)).collect();
        Self { vertices, index }
    }

    fn get(&self, key: &str) -> Option<&LayoutVertex> {
        self.index.get(key).map(|&i| &self.vertices[i])
    }

    fn center(&self, key: &str) -> Option<Point> {
        self.get(key).map(|v| Point::new(v.left, v.top))
    }

    fn push(&mut self, vertex: LayoutVertex) {
        self.index.insert(vertex.key.clone(), self.vertices.len());
        self.vertices.push(vertex);
    }
}

/// Cohort placed in the main graph, ready to be merged
struct PlacedCohort {
    vertices: Vec<LayoutVertex>,
    edges: Vec<LayoutEdge>,
    slid: usize,
}

pub fn graft(engine: &dyn LayoutEngine, job: &LayoutJob) -> Result<LayoutOutput> {
    let with_edges = job.phase != Phase::Positions;
    let positioned_keys: HashSet<&str> = job.positioned_vertices.iter().map(|v| v.key.as_str()).collect();
    let partition = partition_cohorts(&positioned_keys, &job.new_vertices, &job.new_edges)?;
    info!(
        "Grafting {} new vertices onto {} positioned in {} cohorts",
        job.new_vertices.len(),
        job.positioned_vertices.len(),
        partition.cohorts.len()
    );

    let sizes: HashMap<&str, &SizeVertex> = job.new_vertices.iter().map(|v| (v.key.as_str(), v)).collect();
    let mut placement = Placement::new(job.positioned_vertices.clone());
    let mut tracked: Vec<TrackedEdge> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    if with_edges {
        let original = Placement::new(job.positioned_vertices.clone());
        for edge in &job.positioned_edges {
            let drawn_against = original.center(&edge.edge.from).zip(original.center(&edge.edge.to));
            tracked.push(TrackedEdge { edge: edge.clone(), drawn_against, origin: EdgeOrigin::Existing });
        }
    }

    for cohort in &partition.cohorts {
        let placed = match place_cohort(engine, job, cohort, &sizes, &mut placement, &mut warnings)? {
            Ok(placed) => placed,
            Err(failed) => return Ok(failed),
        };
        debug!(
            "Cohort anchored at {} placed: {} vertices, {} existing vertices slid",
            cohort.anchor,
            placed.vertices.len(),
            placed.slid
        );
        for vertex in placed.vertices {
            placement.push(vertex);
        }
        for edge in placed.edges {
            let drawn_against = placement.center(&edge.edge.from).zip(placement.center(&edge.edge.to));
            tracked.push(TrackedEdge { edge, drawn_against, origin: EdgeOrigin::Cohort });
        }
    }

    let frame = reframe(&mut placement.vertices);

    let (moved_edges, new_edges, unresolved_edges) = if with_edges {
        let cross: Vec<&Edge> = partition.cross_edges.iter().map(|&i| &job.new_edges[i]).collect();
        let (moved, new, unresolved) = reconcile_edges(tracked, &cross, &placement, job.options.shift_threshold);
        if !unresolved.is_empty() {
            warn!("{} edges could not be moved with their endpoints and are left stale", unresolved.len());
        }
        (Some(moved), Some(new), unresolved)
    } else {
        (None, None, Vec::new())
    };

    let mut vertices = placement.vertices;
    let new_vertices = vertices.split_off(job.positioned_vertices.len());

    Ok(LayoutOutput {
        graph: frame.graph,
        new_vertices,
        moved_vertices: vertices,
        new_edges,
        moved_edges,
        unresolved_edges,
        cohorts: partition.cohorts.len(),
        layout_error: false,
        layout_error_message: (!warnings.is_empty()).then(|| warnings.join("; ")),
    })
}

/// Lays out one cohort, aligns it to its anchor and makes room for it.
///
/// The inner `Err` carries a failed-validation result for the caller.
fn place_cohort(
    engine: &dyn LayoutEngine,
    job: &LayoutJob,
    cohort: &Cohort,
    sizes: &HashMap<&str, &SizeVertex>,
    placement: &mut Placement,
    warnings: &mut Vec<String>,
) -> Result<std::result::Result<PlacedCohort, LayoutOutput>> {
    let options = &job.options;
    let anchor = placement
        .get(&cohort.anchor)
        .cloned()
        .ok_or_else(|| LayoutError::LostAnchor(cohort.anchor.clone()))?;

    let mut free = vec![anchor.size()];
    free.extend(cohort.vertices.iter().filter_map(|k| sizes.get(k.as_str()).map(|v| (*v).clone())));
    let edges: Vec<Edge> = cohort.edges.iter().map(|&i| job.new_edges[i].clone()).collect();

    let plain = run_engine(engine, job.phase, options, &[], &free, &edges)?;

    let expected: Vec<ExpectedVertex> = free.iter().map(Into::into).collect();
    match vertices_validity(&expected, &plain.vertices, options.shift_threshold) {
        Validity::Invalid(message) => return Ok(Err(LayoutOutput::failed(plain.graph, message))),
        Validity::Warning(message) => warnings.push(message),
        Validity::Valid => {}
    }

    let local_anchor = plain
        .vertices
        .iter()
        .find(|v| v.key == cohort.anchor)
        .ok_or_else(|| LayoutError::AnchorNotInGraft(cohort.anchor.clone()))?;
    let (dx, dy) = (anchor.left - local_anchor.left, anchor.top - local_anchor.top);

    let mut vertices = order_like(cohort.vertices.iter().map(String::as_str), plain.vertices);
    for v in &mut vertices {
        v.translate(dx, dy);
    }
    let mut cohort_edges = plain.edges;
    for e in &mut cohort_edges {
        e.translate(dx, dy);
    }

    let frame = RankFrame::new(options.rankdir, cohort.side);
    let existing_indices: Vec<usize> = placement
        .vertices
        .iter()
        .enumerate()
        .filter(|(_, v)| v.key != cohort.anchor)
        .map(|(i, _)| i)
        .collect();
    let existing: Vec<&LayoutVertex> = existing_indices.iter().map(|&i| &placement.vertices[i]).collect();
    let plan = plan_slide(
        &frame,
        &anchor,
        &vertices,
        &existing,
        options.ranksep * options.slide_margin_ratio,
        options.nodesep * options.slide_margin_ratio,
    );

    if plan.cohort_push > 0.0 {
        let (px, py) = frame.rank_offset(plan.cohort_push);
        debug!("Cohort at {} pushed past threshold {:.3} by {:.3}", cohort.anchor, plan.threshold, plan.cohort_push);
        for v in &mut vertices {
            v.translate(px, py);
        }
        for e in &mut cohort_edges {
            e.translate(px, py);
            if e.edge.from == cohort.anchor {
                if let Some(first) = e.points.first().copied() {
                    prepend_segment(&mut e.points, Point::new(first.x - px, first.y - py));
                }
            }
            if e.edge.to == cohort.anchor {
                if let Some(last) = e.points.last().copied() {
                    append_segment(&mut e.points, Point::new(last.x - px, last.y - py));
                }
            }
        }
    }

    let mut slid = 0;
    if plan.slides() {
        for &(i, side) in &plan.candidates {
            let (ox, oy) = plan.offset_for(&frame, side);
            if ox != 0.0 || oy != 0.0 {
                placement.vertices[existing_indices[i]].translate(ox, oy);
                slid += 1;
            }
        }
        info!(
            "Cohort at {} slid {} vertices aside (upper {:.3}, lower {:.3})",
            cohort.anchor, slid, plan.upper_shift, plan.lower_shift
        );
    }

    Ok(Ok(PlacedCohort { vertices, edges: cohort_edges, slid }))
}

fn delta(from: Point, to: Point) -> (f64, f64) {
    (to.x - from.x, to.y - from.y)
}

fn straight_path(edge: &Edge, placement: &Placement) -> LayoutEdge {
    let points = match (placement.center(&edge.from), placement.center(&edge.to)) {
        (Some(a), Some(b)) => cubic_segment(a, b).to_vec(),
        _ => Vec::new(),
    };
    LayoutEdge::new(edge.clone(), points)
}

/// Splits tracked edges into moved, new and unresolved.
///
/// Unresolved existing edges keep their previous path untouched; unresolved
/// cohort and cross edges get a straight segment.
fn reconcile_edges(
    tracked: Vec<TrackedEdge>,
    cross: &[&Edge],
    placement: &Placement,
    threshold: f64,
) -> (Vec<LayoutEdge>, Vec<LayoutEdge>, Vec<LayoutEdge>) {
    let mut moved = Vec::new();
    let mut new = Vec::new();
    let mut unresolved = Vec::new();

    for TrackedEdge { mut edge, drawn_against, origin } in tracked {
        let now = placement.center(&edge.edge.from).zip(placement.center(&edge.edge.to));
        let deltas = drawn_against.zip(now).map(|((from_was, to_was), (from_now, to_now))| {
            (delta(from_was, from_now), delta(to_was, to_now))
        });

        if let Some(((fx, fy), (tx, ty))) = deltas {
            if (fx - tx).abs() <= threshold && (fy - ty).abs() <= threshold {
                edge.translate(fx, fy);
                match origin {
                    EdgeOrigin::Existing => moved.push(edge),
                    EdgeOrigin::Cohort => new.push(edge),
                }
                continue;
            }
        }

        debug!("Edge {} -> {} endpoints moved apart", edge.edge.from, edge.edge.to);
        match origin {
            EdgeOrigin::Existing => unresolved.push(edge),
            EdgeOrigin::Cohort => unresolved.push(straight_path(&edge.edge, placement)),
        }
    }

    for edge in cross {
        unresolved.push(straight_path(edge, placement));
    }

    (moved, new, unresolved)
}
