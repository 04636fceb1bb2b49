//! Built-in layered layout engine
//!
//! A small Sugiyama-style engine used when no external Graphviz is
//! configured (and in tests). It reads the description subset written by
//! [`crate::dot::to_dot`] and answers in the plain format:
//!
//! 1. Rank assignment: longest path from sources over the condensation of
//!    strongly connected components, so members of a cycle share a rank:
//!    `rank[target] = max(rank[all predecessors]) + 1`
//! 2. Ordering within a rank by one barycenter sweep
//! 3. Placement: ranks stacked `ranksep` apart along `rankdir`, vertices
//!    `nodesep` apart across it, every rank centered on the widest one
//! 4. Edges as straight cubic segments between vertex centers
//!
//! In `neato` mode with every vertex pinned the pins are kept and only
//! edges are routed.

use hashbrown::HashMap;
use std::fmt::Write;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use smallvec::SmallVec;

use super::{EngineKind, EngineOptions, LayoutEngine};
use crate::dot::quote;
use crate::error::{LayoutError, Result};
use crate::model::RankDir;

#[derive(Debug, Clone, Default)]
pub struct LayeredEngine;

impl LayeredEngine {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone)]
struct NodeSpec {
    id: String,
    width: f64,
    height: f64,
    pin: Option<(f64, f64)>,
}

#[derive(Debug, Clone)]
struct EdgeSpec {
    from: usize,
    to: usize,
    bidir: bool,
}

#[derive(Debug, Clone)]
struct Description {
    rankdir: RankDir,
    ranksep: f64,
    nodesep: f64,
    nodes: Vec<NodeSpec>,
    edges: Vec<EdgeSpec>,
}

fn unsupported(line: &str) -> LayoutError {
    LayoutError::Engine(format!("unsupported description statement: {}", line))
}

/// Reads a leading double-quoted id, returning it and the remainder.
fn read_quoted(s: &str) -> Option<(String, &str)> {
    let rest = s.strip_prefix('"')?;
    let mut id = String::new();
    let mut escaped = false;
    for (i, ch) in rest.char_indices() {
        if escaped {
            id.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            return Some((id, &rest[i + 1..]));
        } else {
            id.push(ch);
        }
    }
    None
}

/// Splits `a=1, b="x,y"` on commas outside quotes.
fn parse_attrs(body: &str) -> Vec<(String, String)> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in body.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);

    parts
        .iter()
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            Some((name.trim().to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

fn bracket_body(s: &str) -> Option<&str> {
    let start = s.find('[')?;
    let end = s.rfind(']')?;
    (end > start).then(|| &s[start + 1..end])
}

fn parse_number(name: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| LayoutError::Engine(format!("invalid {} value {:?}", name, value)))
}

fn parse_description(text: &str) -> Result<Description> {
    let mut description = Description {
        rankdir: RankDir::TB,
        ranksep: 0.5,
        nodesep: 0.25,
        nodes: Vec::new(),
        edges: Vec::new(),
    };
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut pending_edges: Vec<(String, String, bool)> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty()
            || line.starts_with("digraph")
            || line == "}"
            || line.starts_with("node [")
            || line.starts_with("edge [")
        {
            continue;
        }

        if line.starts_with("graph[") || line.starts_with("graph [") {
            let body = bracket_body(line).ok_or_else(|| unsupported(line))?;
            for (name, value) in parse_attrs(body) {
                match name.as_str() {
                    "rankdir" => {
                        description.rankdir = match value.as_str() {
                            "TB" => RankDir::TB,
                            "BT" => RankDir::BT,
                            "LR" => RankDir::LR,
                            "RL" => RankDir::RL,
                            _ => return Err(unsupported(line)),
                        }
                    }
                    "ranksep" => description.ranksep = parse_number(&name, &value)?,
                    "nodesep" => description.nodesep = parse_number(&name, &value)?,
                    _ => {}
                }
            }
            continue;
        }

        let (id, rest) = read_quoted(line).ok_or_else(|| unsupported(line))?;
        let rest = rest.trim_start();

        if let Some(target) = rest.strip_prefix("->") {
            let target = target.trim_start();
            if let Some(group) = target.strip_prefix('{') {
                let mut remaining = group.trim_start();
                while let Some((to, after)) = read_quoted(remaining) {
                    pending_edges.push((id.clone(), to, false));
                    remaining = after.trim_start();
                }
                if !remaining.starts_with('}') {
                    return Err(unsupported(line));
                }
            } else {
                let (to, after) = read_quoted(target).ok_or_else(|| unsupported(line))?;
                pending_edges.push((id, to, after.contains("dir=both")));
            }
            continue;
        }

        let body = bracket_body(rest).ok_or_else(|| unsupported(line))?;
        let mut node = NodeSpec { id: id.clone(), width: 0.0, height: 0.0, pin: None };
        for (name, value) in parse_attrs(body) {
            match name.as_str() {
                "width" => node.width = parse_number(&name, &value)?,
                "height" => node.height = parse_number(&name, &value)?,
                "pos" => {
                    let (x, y) = value
                        .trim_end_matches('!')
                        .split_once(',')
                        .ok_or_else(|| unsupported(line))?;
                    node.pin = Some((parse_number("pos", x)?, parse_number("pos", y)?));
                }
                _ => {}
            }
        }
        if index.insert(id, description.nodes.len()).is_some() {
            return Err(unsupported(line));
        }
        description.nodes.push(node);
    }

    for (from, to, bidir) in pending_edges {
        let from = *index
            .get(&from)
            .ok_or_else(|| LayoutError::Engine(format!("edge from undeclared node {}", from)))?;
        let to = *index
            .get(&to)
            .ok_or_else(|| LayoutError::Engine(format!("edge to undeclared node {}", to)))?;
        description.edges.push(EdgeSpec { from, to, bidir });
    }

    Ok(description)
}

/// Rank per node: longest path from the sources of the SCC condensation.
pub(crate) fn assign_ranks(node_count: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut graph = DiGraph::<usize, ()>::with_capacity(node_count, edges.len());
    let nodes: Vec<NodeIndex> = (0..node_count).map(|i| graph.add_node(i)).collect();
    for &(from, to) in edges {
        if from != to {
            graph.add_edge(nodes[from], nodes[to], ());
        }
    }

    // tarjan_scc yields components in reverse topological order
    let components = tarjan_scc(&graph);
    let mut component_of = vec![0usize; node_count];
    for (c, members) in components.iter().enumerate() {
        for node in members {
            component_of[node.index()] = c;
        }
    }

    let mut component_rank = vec![0usize; components.len()];
    for (c, members) in components.iter().enumerate().rev() {
        let mut rank = 0;
        for node in members {
            for pred in graph.neighbors_directed(*node, Direction::Incoming) {
                let pc = component_of[pred.index()];
                if pc != c {
                    rank = rank.max(component_rank[pc] + 1);
                }
            }
        }
        component_rank[c] = rank;
    }

    (0..node_count).map(|i| component_rank[component_of[i]]).collect()
}

/// Orders each rank by the mean order of its predecessors in earlier ranks.
fn order_ranks(ranks: &[usize], edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let rank_count = ranks.iter().max().map_or(0, |r| r + 1);
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); rank_count];
    for (node, &rank) in ranks.iter().enumerate() {
        layers[rank].push(node);
    }

    let mut preds: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); ranks.len()];
    for &(from, to) in edges {
        if ranks[from] < ranks[to] {
            preds[to].push(from);
        }
    }

    let mut order = vec![0usize; ranks.len()];
    for layer in &mut layers {
        let mut keyed: Vec<(f64, usize)> = layer
            .iter()
            .enumerate()
            .map(|(i, &node)| {
                let barycenter = if preds[node].is_empty() {
                    i as f64
                } else {
                    preds[node].iter().map(|&p| order[p] as f64).sum::<f64>()
                        / preds[node].len() as f64
                };
                (barycenter, node)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        *layer = keyed.into_iter().map(|(_, node)| node).collect();
        for (i, &node) in layer.iter().enumerate() {
            order[node] = i;
        }
    }

    layers
}

fn log_rank_statistics(layers: &[Vec<usize>]) {
    let widest = layers.iter().map(Vec::len).max().unwrap_or(0);
    tracing::debug!("Layered engine: {} ranks, widest rank holds {} vertices", layers.len(), widest);
}

/// Center positions for every node plus the bounding size.
fn place(description: &Description, layers: &[Vec<usize>]) -> (Vec<(f64, f64)>, f64, f64) {
    let vertical = matches!(description.rankdir, RankDir::TB | RankDir::BT);
    let rank_extent = |n: &NodeSpec| if vertical { n.height } else { n.width };
    let cross_extent = |n: &NodeSpec| if vertical { n.width } else { n.height };
    let nodes = &description.nodes;

    let thickness: Vec<f64> = layers
        .iter()
        .map(|layer| layer.iter().map(|&i| rank_extent(&nodes[i])).fold(0.0, f64::max))
        .collect();
    let lengths: Vec<f64> = layers
        .iter()
        .map(|layer| {
            let sum: f64 = layer.iter().map(|&i| cross_extent(&nodes[i])).sum();
            sum + description.nodesep * layer.len().saturating_sub(1) as f64
        })
        .collect();
    let cross_total = lengths.iter().copied().fold(0.0, f64::max);

    let mut rank_pos = vec![0.0; nodes.len()];
    let mut cross_pos = vec![0.0; nodes.len()];
    let mut offset = 0.0;
    for (r, layer) in layers.iter().enumerate() {
        let mut acc = (cross_total - lengths[r]) / 2.0;
        for &i in layer {
            let extent = cross_extent(&nodes[i]);
            rank_pos[i] = offset + thickness[r] / 2.0;
            cross_pos[i] = acc + extent / 2.0;
            acc += extent + description.nodesep;
        }
        offset += thickness[r];
        if r + 1 < layers.len() {
            offset += description.ranksep;
        }
    }
    let rank_total = offset;

    let positions = (0..nodes.len())
        .map(|i| match description.rankdir {
            RankDir::TB => (cross_pos[i], rank_total - rank_pos[i]),
            RankDir::BT => (cross_pos[i], rank_pos[i]),
            RankDir::LR => (rank_pos[i], cross_total - cross_pos[i]),
            RankDir::RL => (rank_total - rank_pos[i], cross_total - cross_pos[i]),
        })
        .collect();

    if vertical {
        (positions, cross_total, rank_total)
    } else {
        (positions, rank_total, cross_total)
    }
}

fn pinned_positions(description: &Description) -> Option<(Vec<(f64, f64)>, f64, f64)> {
    let positions: Vec<(f64, f64)> = description.nodes.iter().map(|n| n.pin).collect::<Option<_>>()?;
    let (width, height) = description
        .nodes
        .iter()
        .zip(&positions)
        .fold((0.0f64, 0.0f64), |(w, h), (node, &(x, y))| {
            (w.max(x + node.width / 2.0), h.max(y + node.height / 2.0))
        });
    Some((positions, width, height))
}

fn render_plain(description: &Description, positions: &[(f64, f64)], width: f64, height: f64) -> String {
    let mut out = String::new();
    // fmt::Write into a String never fails
    let _ = writeln!(out, "graph 1 {} {}", width, height);
    for (node, &(x, y)) in description.nodes.iter().zip(positions) {
        let _ = writeln!(
            out,
            "node {} {} {} {} {} \"\" solid box _ _",
            quote(&node.id),
            x,
            y,
            node.width,
            node.height
        );
    }
    for edge in &description.edges {
        let (x0, y0) = positions[edge.from];
        let (x3, y3) = positions[edge.to];
        let (dx, dy) = (x3 - x0, y3 - y0);
        let _ = writeln!(
            out,
            "edge {} {} 4 {} {} {} {} {} {} {} {} {} black",
            quote(&description.nodes[edge.from].id),
            quote(&description.nodes[edge.to].id),
            x0,
            y0,
            x0 + dx / 3.0,
            y0 + dy / 3.0,
            x0 + 2.0 * dx / 3.0,
            y0 + 2.0 * dy / 3.0,
            x3,
            y3,
            if edge.bidir { "bidir" } else { "solid" }
        );
    }
    out.push_str("stop\n");
    out
}

impl LayoutEngine for LayeredEngine {
    fn name(&self) -> &str {
        "layered"
    }

    fn layout(&self, text: &str, options: &EngineOptions) -> Result<String> {
        let description = parse_description(text)?;

        if options.engine == EngineKind::Neato {
            if let Some((positions, width, height)) = pinned_positions(&description) {
                return Ok(render_plain(&description, &positions, width, height));
            }
            tracing::debug!("Layered engine: neato mode without full pins, falling back to ranking");
        }

        let edges: Vec<(usize, usize)> = description.edges.iter().map(|e| (e.from, e.to)).collect();
        let ranks = assign_ranks(description.nodes.len(), &edges);
        let layers = order_ranks(&ranks, &edges);
        log_rank_statistics(&layers);

        let (positions, width, height) = place(&description, &layers);
        Ok(render_plain(&description, &positions, width, height))
    }
}
