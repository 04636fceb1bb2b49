//! Key ↔ engine id bijection for a single request.
//!
//! Vertex keys are opaque to the engine, so every vertex gets a compact id
//! (`"0"`, `"1"`, ...), positioned vertices first. Edges are remapped onto
//! those ids and remembered by their engine-space edge id so results can be
//! translated back.

use hashbrown::{HashMap, HashSet};

use crate::error::{EdgeSide, LayoutError, Result};
use crate::model::{Edge, LayoutEdge, LayoutInput, LayoutVertex, SizeVertex};

#[derive(Debug, Clone, Default)]
pub struct InputMapping {
    key_to_id: HashMap<String, String>,
    id_to_key: Vec<String>,
    edges: HashMap<String, Edge>,
}

/// Request input rewritten in engine ids. Coordinates are untouched.
#[derive(Debug, Clone)]
pub struct MappedInput {
    pub mapping: InputMapping,
    pub positioned_vertices: Vec<LayoutVertex>,
    pub new_vertices: Vec<SizeVertex>,
    pub positioned_edges: Vec<LayoutEdge>,
    pub new_edges: Vec<Edge>,
}

impl InputMapping {
    pub fn map_input(input: &LayoutInput) -> Result<MappedInput> {
        let mut mapping = InputMapping::default();

        let positioned_vertices = input
            .positioned_vertices
            .iter()
            .map(|v| Ok(LayoutVertex { key: mapping.assign(&v.key)?, ..v.clone() }))
            .collect::<Result<Vec<_>>>()?;
        let new_vertices = input
            .new_vertices
            .iter()
            .map(|v| Ok(SizeVertex { key: mapping.assign(&v.key)?, ..v.clone() }))
            .collect::<Result<Vec<_>>>()?;

        let mut seen = HashSet::new();
        let positioned_edges = input
            .positioned_edges
            .iter()
            .map(|e| {
                let edge = mapping.map_edge(&e.edge, &mut seen)?;
                Ok(LayoutEdge::new(edge, e.points.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let new_edges = input
            .new_edges
            .iter()
            .map(|e| mapping.map_edge(e, &mut seen))
            .collect::<Result<Vec<_>>>()?;

        Ok(MappedInput { mapping, positioned_vertices, new_vertices, positioned_edges, new_edges })
    }

    fn assign(&mut self, key: &str) -> Result<String> {
        if self.key_to_id.contains_key(key) {
            return Err(LayoutError::DuplicateVertex(key.to_string()));
        }
        let id = self.id_to_key.len().to_string();
        self.key_to_id.insert(key.to_string(), id.clone());
        self.id_to_key.push(key.to_string());
        Ok(id)
    }

    fn map_edge(&mut self, edge: &Edge, seen: &mut HashSet<String>) -> Result<Edge> {
        let from = self.lookup(&edge.from, EdgeSide::From)?;
        let to = self.lookup(&edge.to, EdgeSide::To)?;
        if !seen.insert(edge.id()) {
            return Err(LayoutError::DuplicateEdge { from: edge.from.clone(), to: edge.to.clone() });
        }
        let mapped = Edge { from, to, is_bidirectional: edge.is_bidirectional };
        self.edges.insert(mapped.id(), edge.clone());
        Ok(mapped)
    }

    fn lookup(&self, key: &str, side: EdgeSide) -> Result<String> {
        self.key_to_id
            .get(key)
            .cloned()
            .ok_or_else(|| LayoutError::UnknownEdgeEndpoint { side, key: key.to_string() })
    }

    pub fn vertex_id(&self, key: &str) -> Option<&str> {
        self.key_to_id.get(key).map(String::as_str)
    }

    pub fn vertex_key(&self, id: &str) -> Result<&str> {
        id.parse::<usize>()
            .ok()
            .and_then(|index| self.id_to_key.get(index))
            .map(String::as_str)
            .ok_or_else(|| LayoutError::UnmappedVertex(id.to_string()))
    }

    pub fn unmap_vertex(&self, vertex: &LayoutVertex) -> Result<LayoutVertex> {
        let key = self.vertex_key(&vertex.key)?;
        Ok(LayoutVertex { key: key.to_string(), ..vertex.clone() })
    }

    pub fn unmap_edge(&self, edge: &LayoutEdge) -> Result<LayoutEdge> {
        let id = edge.id();
        let original = self
            .edges
            .get(&id)
            .ok_or_else(|| LayoutError::UnmappedEdge(id.replace(crate::model::EDGE_ID_SEPARATOR, " -> ")))?;
        Ok(LayoutEdge::new(original.clone(), edge.points.clone()))
    }

    pub fn vertex_count(&self) -> usize {
        self.id_to_key.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LayoutGraph, Point};

    fn sized(key: &str) -> SizeVertex {
        SizeVertex::new(key, 10.0, 10.0)
    }

    #[test]
    fn test_positioned_vertices_get_first_ids() {
        let input = LayoutInput::extend(
            LayoutGraph::new(10.0, 10.0),
            vec![LayoutVertex::new("old", 10.0, 10.0, 5.0, 5.0)],
            vec![],
            vec![sized("new")],
            vec![Edge::new("old", "new")],
        );

        let mapped = InputMapping::map_input(&input).unwrap();
        assert_eq!(mapped.positioned_vertices[0].key, "0");
        assert_eq!(mapped.new_vertices[0].key, "1");
        assert_eq!(mapped.new_edges[0], Edge::new("0", "1"));
        assert_eq!(mapped.mapping.vertex_id("new"), Some("1"));
    }

    #[test]
    fn test_duplicate_key_across_sets_is_rejected() {
        let input = LayoutInput::extend(
            LayoutGraph::new(10.0, 10.0),
            vec![LayoutVertex::new("a", 10.0, 10.0, 5.0, 5.0)],
            vec![],
            vec![sized("a")],
            vec![],
        );
        assert_eq!(
            InputMapping::map_input(&input).unwrap_err(),
            LayoutError::DuplicateVertex("a".into())
        );
    }

    #[test]
    fn test_unknown_endpoint_names_side() {
        let input = LayoutInput::fresh(vec![sized("a")], vec![Edge::new("a", "ghost")]);
        assert_eq!(
            InputMapping::map_input(&input).unwrap_err(),
            LayoutError::UnknownEdgeEndpoint { side: EdgeSide::To, key: "ghost".into() }
        );
    }

    #[test]
    fn test_duplicate_edge_is_rejected() {
        let input = LayoutInput::fresh(
            vec![sized("a"), sized("b")],
            vec![Edge::new("a", "b"), Edge::bidirectional("a", "b")],
        );
        assert!(matches!(
            InputMapping::map_input(&input),
            Err(LayoutError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn test_unmap_restores_keys_and_flags() {
        let input = LayoutInput::fresh(
            vec![sized("svc-a"), sized("svc-b")],
            vec![Edge::bidirectional("svc-a", "svc-b")],
        );
        let mapped = InputMapping::map_input(&input).unwrap();

        let vertex = mapped.mapping.unmap_vertex(&LayoutVertex::new("1", 10.0, 10.0, 3.0, 4.0)).unwrap();
        assert_eq!(vertex.key, "svc-b");

        let edge = LayoutEdge::new(Edge::new("0", "1"), vec![Point::new(1.0, 2.0)]);
        let edge = mapped.mapping.unmap_edge(&edge).unwrap();
        assert_eq!(edge.edge, Edge::bidirectional("svc-a", "svc-b"));
        assert_eq!(edge.points, vec![Point::new(1.0, 2.0)]);

        assert!(mapped.mapping.vertex_key("7").is_err());
        assert!(mapped.mapping.unmap_edge(&LayoutEdge::new(Edge::new("1", "0"), vec![])).is_err());
    }
}
