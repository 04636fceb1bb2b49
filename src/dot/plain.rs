//! Parser for the engine's line-oriented "plain" output
//!
//! ```text
//! graph <scale> <width> <height>
//! node <name> <x> <y> <width> <height> ...
//! edge <tail> <head> <n> <x1> <y1> ... <xn> <yn> ...
//! stop
//! ```
//!
//! Names may be bare or double-quoted. Trailing fields after the numeric
//! ones are ignored except for the `bidir` style flag on edges.

use crate::error::{LayoutError, Result};
use crate::model::{Edge, LayoutEdge, LayoutGraph, LayoutVertex, Point};

#[derive(Debug, Clone, PartialEq)]
pub struct PlainLayout {
    pub graph: LayoutGraph,
    pub vertices: Vec<LayoutVertex>,
    /// Empty when edges were not requested
    pub edges: Vec<LayoutEdge>,
}

fn malformed(line: usize, reason: impl Into<String>) -> LayoutError {
    LayoutError::MalformedPlain { line, reason: reason.into() }
}

fn tokenize(line_no: usize, line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        let mut token = String::new();
        if ch == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            token.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => token.push(other),
                }
            }
            if !closed {
                return Err(malformed(line_no, "unterminated quoted name"));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}

fn number(line_no: usize, tokens: &[String], index: usize) -> Result<f64> {
    let token = tokens
        .get(index)
        .ok_or_else(|| malformed(line_no, format!("missing field {}", index)))?;
    token
        .parse::<f64>()
        .map_err(|_| malformed(line_no, format!("expected a number, got {:?}", token)))
}

fn name(line_no: usize, tokens: &[String], index: usize) -> Result<String> {
    tokens
        .get(index)
        .cloned()
        .ok_or_else(|| malformed(line_no, format!("missing field {}", index)))
}

pub fn parse_plain(text: &str, parse_edges: bool) -> Result<PlainLayout> {
    let mut graph = None;
    let mut vertices = Vec::new();
    let mut edges = Vec::new();
    let mut stopped = false;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let keyword = trimmed.split_whitespace().next().unwrap_or_default();
        match keyword {
            "graph" => {
                let tokens = tokenize(line_no, trimmed)?;
                graph = Some(LayoutGraph {
                    scale: number(line_no, &tokens, 1)?,
                    width: number(line_no, &tokens, 2)?,
                    height: number(line_no, &tokens, 3)?,
                });
            }
            "node" => {
                if graph.is_none() {
                    return Err(malformed(line_no, "node before graph line"));
                }
                let tokens = tokenize(line_no, trimmed)?;
                vertices.push(LayoutVertex {
                    key: name(line_no, &tokens, 1)?,
                    left: number(line_no, &tokens, 2)?,
                    top: number(line_no, &tokens, 3)?,
                    width: number(line_no, &tokens, 4)?,
                    height: number(line_no, &tokens, 5)?,
                });
            }
            "edge" => {
                if !parse_edges {
                    continue;
                }
                let tokens = tokenize(line_no, trimmed)?;
                let from = name(line_no, &tokens, 1)?;
                let to = name(line_no, &tokens, 2)?;
                let count = number(line_no, &tokens, 3)?;
                if count < 0.0 || count.fract() != 0.0 {
                    return Err(malformed(line_no, "invalid point count"));
                }
                let count = count as usize;
                let points = (0..count)
                    .map(|i| {
                        Ok(Point::new(
                            number(line_no, &tokens, 4 + 2 * i)?,
                            number(line_no, &tokens, 5 + 2 * i)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let is_bidirectional = tokens[4 + 2 * count..].iter().any(|t| t == "bidir");
                edges.push(LayoutEdge::new(Edge { from, to, is_bidirectional }, points));
            }
            "stop" => {
                stopped = true;
                break;
            }
            other => return Err(malformed(line_no, format!("unexpected statement {:?}", other))),
        }
    }

    if !stopped {
        return Err(malformed(text.lines().count(), "missing stop line"));
    }
    let graph = graph.ok_or_else(|| malformed(1, "missing graph line"))?;

    Ok(PlainLayout { graph, vertices, edges })
}
