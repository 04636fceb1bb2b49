//! Reframing to a zero-based origin
//!
//! After placement the tight bounding box over all vertices is recomputed
//! and everything is translated so that its lower-left corner (engine
//! space) sits at the origin.

use crate::model::{LayoutGraph, LayoutVertex};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

pub fn bounds<'a>(vertices: impl IntoIterator<Item = &'a LayoutVertex>) -> Option<Bounds> {
    vertices.into_iter().fold(None, |acc, v| {
        let (x0, y0) = (v.left - v.width / 2.0, v.top - v.height / 2.0);
        let (x1, y1) = (v.left + v.width / 2.0, v.top + v.height / 2.0);
        Some(match acc {
            None => Bounds { min_x: x0, min_y: y0, max_x: x1, max_y: y1 },
            Some(b) => Bounds {
                min_x: b.min_x.min(x0),
                min_y: b.min_y.min(y0),
                max_x: b.max_x.max(x1),
                max_y: b.max_y.max(y1),
            },
        })
    })
}

/// Offset applied by [`reframe`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reframe {
    pub graph: LayoutGraph,
    pub dx: f64,
    pub dy: f64,
}

/// Translates vertices to a zero-based origin and returns the new graph.
pub fn reframe(vertices: &mut [LayoutVertex]) -> Reframe {
    let Some(b) = bounds(vertices.iter()) else {
        return Reframe { graph: LayoutGraph::new(0.0, 0.0), dx: 0.0, dy: 0.0 };
    };

    let (dx, dy) = (-b.min_x, -b.min_y);
    if dx != 0.0 || dy != 0.0 {
        tracing::debug!("Reframing {} vertices by ({:.3}, {:.3})", vertices.len(), dx, dy);
        for v in vertices.iter_mut() {
            v.translate(dx, dy);
        }
    }

    Reframe { graph: LayoutGraph::new(b.max_x - b.min_x, b.max_y - b.min_y), dx, dy }
}
