//! Engine output validation
//!
//! Every engine result passes through here before it is used. Missing,
//! extra or duplicated vertices and size drift are hard failures; a pinned
//! vertex that drifted from its pin is only a warning.

use hashbrown::HashMap;

use crate::model::{LayoutVertex, SizeVertex};

/// What the engine was asked to lay out
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedVertex<'a> {
    pub key: &'a str,
    pub width: f64,
    pub height: f64,
    /// Set when the vertex was submitted with a position to keep
    pub position: Option<(f64, f64)>,
}

impl<'a> From<&'a SizeVertex> for ExpectedVertex<'a> {
    fn from(v: &'a SizeVertex) -> Self {
        Self { key: &v.key, width: v.width, height: v.height, position: None }
    }
}

impl<'a> From<&'a LayoutVertex> for ExpectedVertex<'a> {
    fn from(v: &'a LayoutVertex) -> Self {
        Self { key: &v.key, width: v.width, height: v.height, position: Some((v.left, v.top)) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validity {
    Valid,
    /// Usable result with a message for the caller
    Warning(String),
    /// Result must not be used
    Invalid(String),
}

impl Validity {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Validity::Invalid(_))
    }
}

pub fn vertices_validity(
    expected: &[ExpectedVertex<'_>],
    output: &[LayoutVertex],
    threshold: f64,
) -> Validity {
    let wanted: HashMap<&str, &ExpectedVertex<'_>> = expected.iter().map(|v| (v.key, v)).collect();
    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(output.len());
    let mut drifted = Vec::new();

    for vertex in output {
        let Some(input) = wanted.get(vertex.key.as_str()) else {
            return Validity::Invalid(format!("Extra vertex {} in layout output", vertex.key));
        };
        let count = seen.entry(vertex.key.as_str()).or_insert(0);
        *count += 1;
        if *count > 1 {
            return Validity::Invalid(format!("Vertex {} appears more than once", vertex.key));
        }

        if (vertex.width - input.width).abs() > threshold
            || (vertex.height - input.height).abs() > threshold
        {
            return Validity::Invalid(format!(
                "Vertex {} failed size threshold check: expected {}x{}, got {}x{}",
                vertex.key, input.width, input.height, vertex.width, vertex.height
            ));
        }

        if let Some((left, top)) = input.position {
            if (vertex.left - left).abs() > threshold || (vertex.top - top).abs() > threshold {
                drifted.push(vertex.key.clone());
            }
        }
    }

    let missing: Vec<&str> = expected
        .iter()
        .map(|v| v.key)
        .filter(|key| !seen.contains_key(key))
        .collect();
    if !missing.is_empty() {
        return Validity::Invalid(format!("Missing vertices in layout output: {}", missing.join(", ")));
    }

    if drifted.is_empty() {
        Validity::Valid
    } else {
        Validity::Warning(format!(
            "Vertices moved beyond threshold from their fixed positions: {}",
            drifted.join(", ")
        ))
    }
}
