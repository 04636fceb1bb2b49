//! Graph description writer
//!
//! Produces the textual description handed to the layout engine: global
//! attributes from the options, one statement per vertex with its fixed size
//! (and a pin for already-positioned vertices), then the edges. Plain edges
//! sharing a source are grouped into one statement.

use hashbrown::HashMap;
use std::fmt::Write;

use super::quote;
use crate::model::{Edge, LayoutOptions, LayoutVertex, SizeVertex};

pub fn to_dot(
    options: &LayoutOptions,
    pinned: &[LayoutVertex],
    free: &[SizeVertex],
    edges: &[Edge],
) -> String {
    let mut out = String::new();
    out.push_str("digraph G {\n");
    // fmt::Write into a String never fails
    let _ = writeln!(
        out,
        "  graph[sep={}, splines={}, overlap=false, rankdir={}, ranksep={}, nodesep={}];",
        options.sep, options.splines, options.rankdir, options.ranksep, options.nodesep
    );
    out.push_str("  node [shape=box, fixedsize=true, label=\"\", color=\"_\", fillcolor=\"_\"];\n");
    out.push_str("  edge [arrowhead=none, arrowtail=none];\n");

    for v in pinned {
        let _ = writeln!(
            out,
            "  {} [height={},width={},pos=\"{},{}!\",pin=true];",
            quote(&v.key),
            v.height,
            v.width,
            v.left,
            v.top
        );
    }
    for v in free {
        let _ = writeln!(out, "  {} [height={},width={}];", quote(&v.key), v.height, v.width);
    }

    let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
    let mut group_index: HashMap<&str, usize> = HashMap::new();
    for edge in edges {
        if edge.is_bidirectional {
            let _ = writeln!(
                out,
                "  {}->{} [style=\"bidir\", dir=both];",
                quote(&edge.from),
                quote(&edge.to)
            );
            continue;
        }
        let index = *group_index.entry(edge.from.as_str()).or_insert_with(|| {
            groups.push((edge.from.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[index].1.push(edge.to.as_str());
    }
    for (from, targets) in groups {
        if let [single] = targets.as_slice() {
            let _ = writeln!(out, "  {}->{};", quote(from), quote(single));
        } else {
            let joined: Vec<String> = targets.iter().map(|t| quote(t)).collect();
            let _ = writeln!(out, "  {}->{{ {} }};", quote(from), joined.join(" "));
        }
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RankDir;

    #[test]
    fn test_header_carries_options() {
        let options = LayoutOptions { rankdir: RankDir::TB, ranksep: 2.0, ..Default::default() };
        let dot = to_dot(&options, &[], &[], &[]);
        assert!(dot.contains("rankdir=TB"));
        assert!(dot.contains("ranksep=2"));
        assert!(dot.contains("nodesep=0.5"));
        assert!(dot.starts_with("digraph G {"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_vertices_and_pins() {
        let dot = to_dot(
            &LayoutOptions::default(),
            &[LayoutVertex::new("0", 10.0, 4.0, 5.0, 2.5)],
            &[SizeVertex::new("1", 3.0, 3.0)],
            &[],
        );
        assert!(dot.contains("\"0\" [height=4,width=10,pos=\"5,2.5!\",pin=true];"));
        assert!(dot.contains("\"1\" [height=3,width=3];"));
    }

    #[test]
    fn test_edges_grouped_by_source() {
        let dot = to_dot(
            &LayoutOptions::default(),
            &[],
            &[],
            &[Edge::new("0", "1"), Edge::bidirectional("1", "2"), Edge::new("0", "2"), Edge::new("2", "0")],
        );
        assert!(dot.contains("\"0\"->{ \"1\" \"2\" };"));
        assert!(dot.contains("\"1\"->\"2\" [style=\"bidir\", dir=both];"));
        assert!(dot.contains("\"2\"->\"0\";"));
    }
}
