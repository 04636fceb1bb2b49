//! Cohort partitioning
//!
//! New vertices are grouped by breadth-first traversal over the new-edge
//! adjacency. The first already-positioned vertex a traversal reaches
//! becomes the cohort's anchor; the traversal continues through the anchor
//! only along the direction it was entered, so clusters hanging off the
//! same side of one anchor share a cohort.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::error::{LayoutError, Result};
use crate::model::{Edge, SizeVertex};

/// Which end of the attaching edge the anchor is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorSide {
    /// Anchor is the edge source; the cohort grows downstream
    Source,
    /// Anchor is the edge target; the cohort grows upstream
    Target,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    pub anchor: String,
    pub side: AnchorSide,
    /// New vertex keys in discovery order
    pub vertices: Vec<String>,
    /// Indices into the new edges, both endpoints in the cohort or its anchor
    pub edges: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CohortPartition {
    pub cohorts: Vec<Cohort>,
    /// New edges that belong to no single cohort
    pub cross_edges: Vec<usize>,
}

pub fn partition_cohorts(
    positioned: &HashSet<&str>,
    new_vertices: &[SizeVertex],
    new_edges: &[Edge],
) -> Result<CohortPartition> {
    let mut outgoing: HashMap<&str, SmallVec<[usize; 4]>> = HashMap::new();
    let mut incoming: HashMap<&str, SmallVec<[usize; 4]>> = HashMap::new();
    for (i, edge) in new_edges.iter().enumerate() {
        outgoing.entry(edge.from.as_str()).or_default().push(i);
        incoming.entry(edge.to.as_str()).or_default().push(i);
    }

    let mut cohort_of: HashMap<&str, usize> = HashMap::new();
    let mut cohorts: Vec<Cohort> = Vec::new();

    for start in new_vertices {
        if cohort_of.contains_key(start.key.as_str()) {
            continue;
        }

        let mut members: Vec<&str> = vec![start.key.as_str()];
        let mut visited: HashSet<&str> = HashSet::from([start.key.as_str()]);
        let mut queue: VecDeque<&str> = VecDeque::from([start.key.as_str()]);
        let mut anchor: Option<(&str, AnchorSide)> = None;

        while let Some(current) = queue.pop_front() {
            let is_anchor = anchor.map_or(false, |(key, _)| key == current);
            let (walk_out, walk_in) = match anchor {
                Some((_, AnchorSide::Source)) if is_anchor => (true, false),
                Some((_, AnchorSide::Target)) if is_anchor => (false, true),
                _ => (true, true),
            };

            let mut neighbours: SmallVec<[(usize, &str); 8]> = SmallVec::new();
            if walk_out {
                for &i in outgoing.get(current).into_iter().flatten() {
                    neighbours.push((i, new_edges[i].to.as_str()));
                }
            }
            if walk_in {
                for &i in incoming.get(current).into_iter().flatten() {
                    neighbours.push((i, new_edges[i].from.as_str()));
                }
            }

            for (i, next) in neighbours {
                if visited.contains(next) {
                    continue;
                }
                if positioned.contains(next) {
                    if anchor.is_none() {
                        let side = if new_edges[i].from == next {
                            AnchorSide::Source
                        } else {
                            AnchorSide::Target
                        };
                        anchor = Some((next, side));
                        visited.insert(next);
                        queue.push_back(next);
                    }
                    continue;
                }
                if cohort_of.contains_key(next) {
                    continue;
                }
                visited.insert(next);
                members.push(next);
                queue.push_back(next);
            }
        }

        let Some((anchor, side)) = anchor else {
            return Err(LayoutError::Unanchored(members.iter().map(|k| k.to_string()).collect()));
        };

        let index = cohorts.len();
        for key in &members {
            cohort_of.insert(*key, index);
        }
        cohorts.push(Cohort {
            anchor: anchor.to_string(),
            side,
            vertices: members.iter().map(|k| k.to_string()).collect(),
            edges: Vec::new(),
        });
    }

    let mut cross_edges = Vec::new();
    for (i, edge) in new_edges.iter().enumerate() {
        let from = cohort_of.get(edge.from.as_str()).copied();
        let to = cohort_of.get(edge.to.as_str()).copied();
        let owner = match (from, to) {
            (Some(a), Some(b)) if a == b => Some(a),
            (Some(c), None) if cohorts[c].anchor == edge.to => Some(c),
            (None, Some(c)) if cohorts[c].anchor == edge.from => Some(c),
            _ => None,
        };
        match owner {
            Some(c) => cohorts[c].edges.push(i),
            None => cross_edges.push(i),
        }
    }

    Ok(CohortPartition { cohorts, cross_edges })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized(keys: &[&str]) -> Vec<SizeVertex> {
        keys.iter().map(|k| SizeVertex::new(*k, 10.0, 10.0)).collect()
    }

    #[test]
    fn test_two_clusters_two_anchors() {
        let positioned = HashSet::from(["A", "B"]);
        let new = sized(&["x1", "x2", "y1"]);
        let edges = vec![Edge::new("A", "x1"), Edge::new("x1", "x2"), Edge::new("y1", "B")];

        let partition = partition_cohorts(&positioned, &new, &edges).unwrap();
        assert_eq!(partition.cohorts.len(), 2);

        let first = &partition.cohorts[0];
        assert_eq!(first.anchor, "A");
        assert_eq!(first.side, AnchorSide::Source);
        assert_eq!(first.vertices, vec!["x1", "x2"]);
        assert_eq!(first.edges, vec![0, 1]);

        let second = &partition.cohorts[1];
        assert_eq!(second.anchor, "B");
        assert_eq!(second.side, AnchorSide::Target);
        assert_eq!(second.vertices, vec!["y1"]);
        assert_eq!(second.edges, vec![2]);
        assert!(partition.cross_edges.is_empty());
    }

    #[test]
    fn test_siblings_off_one_anchor_share_cohort() {
        let positioned = HashSet::from(["A"]);
        let new = sized(&["x", "y"]);
        let edges = vec![Edge::new("A", "x"), Edge::new("A", "y")];

        let partition = partition_cohorts(&positioned, &new, &edges).unwrap();
        assert_eq!(partition.cohorts.len(), 1);
        assert_eq!(partition.cohorts[0].vertices, vec!["x", "y"]);
    }

    #[test]
    fn test_traversal_through_anchor_keeps_direction() {
        let positioned = HashSet::from(["A"]);
        let new = sized(&["down", "up"]);
        let edges = vec![Edge::new("A", "down"), Edge::new("up", "A")];

        let partition = partition_cohorts(&positioned, &new, &edges).unwrap();
        assert_eq!(partition.cohorts.len(), 2);
        assert_eq!(partition.cohorts[0].side, AnchorSide::Source);
        assert_eq!(partition.cohorts[1].side, AnchorSide::Target);
        assert_eq!(partition.cohorts[1].vertices, vec!["up"]);
    }

    #[test]
    fn test_edges_to_other_positioned_vertices_are_cross() {
        let positioned = HashSet::from(["A", "B"]);
        let new = sized(&["x"]);
        let edges = vec![Edge::new("A", "x"), Edge::new("x", "B"), Edge::new("A", "B")];

        let partition = partition_cohorts(&positioned, &new, &edges).unwrap();
        assert_eq!(partition.cohorts.len(), 1);
        // outgoing edges are walked first, so B is reached before A
        assert_eq!(partition.cohorts[0].anchor, "B");
        assert_eq!(partition.cohorts[0].side, AnchorSide::Target);
        assert_eq!(partition.cohorts[0].edges, vec![1]);
        assert_eq!(partition.cross_edges, vec![0, 2]);
    }

    #[test]
    fn test_unanchored_cluster_is_error() {
        let positioned = HashSet::from(["A"]);
        let new = sized(&["x", "y"]);
        let edges = vec![Edge::new("x", "y")];

        let err = partition_cohorts(&positioned, &new, &edges).unwrap_err();
        assert_eq!(err, LayoutError::Unanchored(vec!["x".into(), "y".into()]));
    }
}
