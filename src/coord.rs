//! Coordinate conversion between engine space and pixel space.
//!
//! Engine ("dot") space has its origin at the bottom-left with y growing
//! upward; pixel space has its origin at the top-left with y growing
//! downward. The graph height is the flip reference, so every conversion is
//! an involution: applying it twice returns the input.

use crate::model::{LayoutEdge, LayoutGraph, LayoutVertex, Point};

fn flip(graph: &LayoutGraph, y: f64) -> f64 {
    graph.height - y
}

fn flip_point(graph: &LayoutGraph, point: &Point) -> Point {
    Point::new(point.x, flip(graph, point.y))
}

pub fn vertex_to_pixels(graph: &LayoutGraph, vertex: &LayoutVertex) -> LayoutVertex {
    LayoutVertex { top: flip(graph, vertex.top), ..vertex.clone() }
}

pub fn vertex_to_dot(graph: &LayoutGraph, vertex: &LayoutVertex) -> LayoutVertex {
    LayoutVertex { top: flip(graph, vertex.top), ..vertex.clone() }
}

pub fn edge_to_pixels(graph: &LayoutGraph, edge: &LayoutEdge) -> LayoutEdge {
    LayoutEdge {
        edge: edge.edge.clone(),
        points: edge.points.iter().map(|p| flip_point(graph, p)).collect(),
    }
}

pub fn edge_to_dot(graph: &LayoutGraph, edge: &LayoutEdge) -> LayoutEdge {
    LayoutEdge {
        edge: edge.edge.clone(),
        points: edge.points.iter().map(|p| flip_point(graph, p)).collect(),
    }
}

/// Width, height and scale pass through unchanged.
pub fn graph_to_pixels(graph: &LayoutGraph) -> LayoutGraph {
    *graph
}

pub fn graph_to_dot(graph: &LayoutGraph) -> LayoutGraph {
    *graph
}

pub fn vertices_to_pixels(graph: &LayoutGraph, vertices: &[LayoutVertex]) -> Vec<LayoutVertex> {
    vertices.iter().map(|v| vertex_to_pixels(graph, v)).collect()
}

pub fn vertices_to_dot(graph: &LayoutGraph, vertices: &[LayoutVertex]) -> Vec<LayoutVertex> {
    vertices.iter().map(|v| vertex_to_dot(graph, v)).collect()
}

pub fn edges_to_pixels(graph: &LayoutGraph, edges: &[LayoutEdge]) -> Vec<LayoutEdge> {
    edges.iter().map(|e| edge_to_pixels(graph, e)).collect()
}

pub fn edges_to_dot(graph: &LayoutGraph, edges: &[LayoutEdge]) -> Vec<LayoutEdge> {
    edges.iter().map(|e| edge_to_dot(graph, e)).collect()
}
