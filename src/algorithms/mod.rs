/*!
# Функция укладки графа

Строит описание для движка, вызывает его, разбирает ответ, проверяет
инварианты и, если запрос инкрементальный, вставляет новые подграфы в уже
размещённый граф (см. [`graft`]).

Режимы:
- полная укладка: все вершины за один вызов движка, результат приводится к
  нулевому началу координат;
- вставка (graft): есть предыдущий граф и смесь размещённых и новых вершин;
- маршрутизация рёбер (фаза `Edges`): все вершины закреплены, движок только
  прокладывает новые рёбра.

Всё в этом модуле работает в пространстве движка (y вверх).
*/

pub mod graft;
pub mod validity;

use hashbrown::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dot::{parse_plain, to_dot, PlainLayout};
use crate::engine::{EngineOptions, LayoutEngine};
use crate::error::{LayoutError, Result};
use crate::model::{Edge, LayoutEdge, LayoutGraph, LayoutOptions, LayoutVertex, Phase, SizeVertex};

pub use graft::graft;
pub use validity::{vertices_validity, ExpectedVertex, Validity};

/// Задание на укладку (пространство движка, идентификаторы движка)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutJob {
    pub phase: Phase,
    pub positioned_vertices: Vec<LayoutVertex>,
    pub new_vertices: Vec<SizeVertex>,
    pub positioned_edges: Vec<LayoutEdge>,
    pub new_edges: Vec<Edge>,
    pub options: LayoutOptions,
    pub prev_graph: Option<LayoutGraph>,
}

/// Результат функции укладки
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutOutput {
    pub graph: LayoutGraph,
    pub new_vertices: Vec<LayoutVertex>,
    pub moved_vertices: Vec<LayoutVertex>,
    /// `None` когда рёбра в этой фазе не вычислялись
    pub new_edges: Option<Vec<LayoutEdge>>,
    pub moved_edges: Option<Vec<LayoutEdge>>,
    /// Рёбра, которые не удалось перенести сдвигом
    #[serde(default)]
    pub unresolved_edges: Vec<LayoutEdge>,
    #[serde(default)]
    pub cohorts: usize,
    pub layout_error: bool,
    pub layout_error_message: Option<String>,
}

impl LayoutOutput {
    /// Результат, не прошедший валидацию
    pub fn failed(graph: LayoutGraph, message: impl Into<String>) -> Self {
        Self {
            graph,
            new_vertices: Vec::new(),
            moved_vertices: Vec::new(),
            new_edges: None,
            moved_edges: None,
            unresolved_edges: Vec::new(),
            cohorts: 0,
            layout_error: true,
            layout_error_message: Some(message.into()),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.new_vertices.len() + self.moved_vertices.len()
    }

    /// Количество рёбер, если они вычислялись
    pub fn edge_count(&self) -> Option<usize> {
        match (&self.new_edges, &self.moved_edges) {
            (None, None) => None,
            (new, moved) => Some(
                new.as_ref().map_or(0, Vec::len)
                    + moved.as_ref().map_or(0, Vec::len)
                    + self.unresolved_edges.len(),
            ),
        }
    }
}

/// Вычисление укладки для одной фазы
pub fn compute_layout(engine: &dyn LayoutEngine, job: &LayoutJob) -> Result<LayoutOutput> {
    match job.phase {
        Phase::Edges => route_edges(engine, job),
        Phase::Positions | Phase::DotOnly => {
            let has_positioned = !job.positioned_vertices.is_empty();
            if has_positioned && job.prev_graph.is_none() {
                return Err(LayoutError::MissingPreviousGraph);
            }
            if has_positioned && !job.new_vertices.is_empty() {
                graft(engine, job)
            } else {
                full_layout(engine, job)
            }
        }
    }
}

/// Один вызов движка: описание → plain → разбор
pub(crate) fn run_engine(
    engine: &dyn LayoutEngine,
    phase: Phase,
    options: &LayoutOptions,
    pinned: &[LayoutVertex],
    free: &[SizeVertex],
    edges: &[Edge],
) -> Result<PlainLayout> {
    let description = to_dot(options, pinned, free, edges);
    let engine_options = EngineOptions::for_phase(phase, options.total_memory);
    debug!(
        "Engine {} ({:?}): {} vertices, {} edges",
        engine.name(),
        engine_options.engine,
        pinned.len() + free.len(),
        edges.len()
    );
    let plain = engine.layout(&description, &engine_options)?;
    parse_plain(&plain, phase != Phase::Positions)
}

/// Переупорядочивает вывод движка в порядке ключей; отсутствующие ключи пропускаются.
pub(crate) fn order_like<'a>(
    keys: impl IntoIterator<Item = &'a str>,
    vertices: Vec<LayoutVertex>,
) -> Vec<LayoutVertex> {
    let mut by_key: HashMap<String, LayoutVertex> =
        vertices.into_iter().map(|v| (v.key.clone(), v)).collect();
    keys.into_iter().filter_map(|key| by_key.remove(key)).collect()
}

fn full_layout(engine: &dyn LayoutEngine, job: &LayoutJob) -> Result<LayoutOutput> {
    let with_edges = job.phase != Phase::Positions;
    let free: Vec<SizeVertex> = job
        .positioned_vertices
        .iter()
        .map(LayoutVertex::size)
        .chain(job.new_vertices.iter().cloned())
        .collect();
    let edges: Vec<Edge> = job
        .positioned_edges
        .iter()
        .map(|e| e.edge.clone())
        .chain(job.new_edges.iter().cloned())
        .collect();

    let plain = run_engine(engine, job.phase, &job.options, &[], &free, &edges)?;

    // positioned vertices are checked against their previous place, before reframing
    let expected: Vec<ExpectedVertex> = job
        .positioned_vertices
        .iter()
        .map(ExpectedVertex::from)
        .chain(job.new_vertices.iter().map(ExpectedVertex::from))
        .collect();
    let warning = match vertices_validity(&expected, &plain.vertices, job.options.shift_threshold) {
        Validity::Invalid(message) => return Ok(LayoutOutput::failed(plain.graph, message)),
        Validity::Warning(message) => Some(message),
        Validity::Valid => None,
    };

    let mut vertices = order_like(free.iter().map(|v| v.key.as_str()), plain.vertices);
    let frame = graft::reframe::reframe(&mut vertices);
    let new_vertices = vertices.split_off(job.positioned_vertices.len());

    let (moved_edges, new_edges) = if with_edges {
        let positioned_ids: HashSet<String> = job.positioned_edges.iter().map(LayoutEdge::id).collect();
        let (moved, new): (Vec<LayoutEdge>, Vec<LayoutEdge>) = plain
            .edges
            .into_iter()
            .map(|mut e| {
                e.translate(frame.dx, frame.dy);
                e
            })
            .partition(|e| positioned_ids.contains(&e.id()));
        (Some(moved), Some(new))
    } else {
        (None, None)
    };

    debug!(
        "Full layout: {} moved, {} new vertices, graph {:.3}x{:.3}",
        vertices.len(),
        new_vertices.len(),
        frame.graph.width,
        frame.graph.height
    );

    Ok(LayoutOutput {
        graph: frame.graph,
        new_vertices,
        moved_vertices: vertices,
        new_edges,
        moved_edges,
        unresolved_edges: Vec::new(),
        cohorts: 0,
        layout_error: false,
        layout_error_message: warning,
    })
}

fn route_edges(engine: &dyn LayoutEngine, job: &LayoutJob) -> Result<LayoutOutput> {
    if !job.new_vertices.is_empty() {
        return Err(LayoutError::InvalidPhase {
            phase: Phase::Edges.to_string(),
            reason: "every vertex must already be positioned".to_string(),
        });
    }

    let plain = run_engine(engine, Phase::Edges, &job.options, &job.positioned_vertices, &[], &job.new_edges)?;

    let expected: Vec<ExpectedVertex> = job.positioned_vertices.iter().map(Into::into).collect();
    let warning = match vertices_validity(&expected, &plain.vertices, job.options.shift_threshold) {
        Validity::Invalid(message) => return Ok(LayoutOutput::failed(plain.graph, message)),
        Validity::Warning(message) => Some(message),
        Validity::Valid => None,
    };

    let vertices = order_like(job.positioned_vertices.iter().map(|v| v.key.as_str()), plain.vertices);
    debug!("Routed {} new edges around {} pinned vertices", plain.edges.len(), vertices.len());

    Ok(LayoutOutput {
        graph: job.prev_graph.unwrap_or(plain.graph),
        new_vertices: Vec::new(),
        moved_vertices: vertices,
        new_edges: Some(plain.edges),
        moved_edges: Some(job.positioned_edges.clone()),
        unresolved_edges: Vec::new(),
        cohorts: 0,
        layout_error: false,
        layout_error_message: warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LayeredEngine;

    fn sized(key: &str) -> SizeVertex {
        SizeVertex::new(key, 10.0, 10.0)
    }

    fn job(phase: Phase, new_vertices: Vec<SizeVertex>, new_edges: Vec<Edge>) -> LayoutJob {
        LayoutJob {
            phase,
            positioned_vertices: Vec::new(),
            new_vertices,
            positioned_edges: Vec::new(),
            new_edges,
            options: LayoutOptions::default(),
            prev_graph: None,
        }
    }

    /// Engine that inflates every vertex width in its output
    struct InflatingEngine;

    impl LayoutEngine for InflatingEngine {
        fn name(&self) -> &str {
            "inflating"
        }

        fn layout(&self, description: &str, options: &EngineOptions) -> Result<String> {
            let plain = LayeredEngine::new().layout(description, options)?;
            let mut out = String::new();
            for line in plain.lines() {
                let mut fields: Vec<String> = line.split(' ').map(str::to_string).collect();
                if fields[0] == "node" {
                    let width: f64 = fields[4].parse().unwrap_or_default();
                    fields[4] = (width + 1.0).to_string();
                }
                out.push_str(&fields.join(" "));
                out.push('\n');
            }
            Ok(out)
        }
    }

    #[test]
    fn test_two_vertex_dot_only_layout() {
        let engine = LayeredEngine::new();
        let output = compute_layout(
            &engine,
            &job(Phase::DotOnly, vec![sized("0"), sized("1")], vec![Edge::new("0", "1")]),
        )
        .unwrap();

        assert!(!output.layout_error);
        assert_eq!(output.new_vertices.len(), 2);
        assert!(output.moved_vertices.is_empty());
        assert_eq!(output.new_edges.as_ref().map(Vec::len), Some(1));
        assert_eq!(output.edge_count(), Some(1));
        assert!(output.graph.width >= 20.0 + LayoutOptions::default().ranksep - 1e-9);
        assert!(output.graph.height >= 10.0);
    }

    #[test]
    fn test_positions_phase_skips_edges() {
        let engine = LayeredEngine::new();
        let output = compute_layout(
            &engine,
            &job(Phase::Positions, vec![sized("0"), sized("1")], vec![Edge::new("0", "1")]),
        )
        .unwrap();
        assert_eq!(output.vertex_count(), 2);
        assert_eq!(output.edge_count(), None);
    }

    #[test]
    fn test_size_drift_fails_validation() {
        let output = compute_layout(
            &InflatingEngine,
            &job(Phase::DotOnly, vec![sized("0")], vec![]),
        )
        .unwrap();
        assert!(output.layout_error);
        assert!(output
            .layout_error_message
            .as_deref()
            .unwrap_or_default()
            .contains("size threshold"));
        assert_eq!(output.vertex_count(), 0);
    }

    #[test]
    fn test_relaid_positioned_vertices_warn_on_drift() {
        let mut request = job(Phase::DotOnly, Vec::new(), vec![Edge::new("0", "1")]);
        request.positioned_vertices = vec![
            LayoutVertex::new("0", 10.0, 10.0, 500.0, 500.0),
            LayoutVertex::new("1", 10.0, 10.0, 900.0, 900.0),
        ];
        request.prev_graph = Some(LayoutGraph::new(905.0, 905.0));

        let output = compute_layout(&LayeredEngine::new(), &request).unwrap();
        assert!(!output.layout_error);
        assert_eq!(output.moved_vertices.len(), 2);
        assert_eq!(output.edge_count(), Some(1));
        let warning = output.layout_error_message.unwrap();
        assert!(warning.contains("fixed positions"), "{}", warning);
        assert!(warning.contains('0') && warning.contains('1'));
    }

    #[test]
    fn test_relaid_vertices_in_place_do_not_warn() {
        let mut request = job(Phase::DotOnly, Vec::new(), vec![Edge::new("0", "1")]);
        request.positioned_vertices = vec![
            LayoutVertex::new("0", 10.0, 10.0, 5.0, 5.0),
            LayoutVertex::new("1", 10.0, 10.0, 16.8, 5.0),
        ];
        request.prev_graph = Some(LayoutGraph::new(21.8, 10.0));

        let output = compute_layout(&LayeredEngine::new(), &request).unwrap();
        assert!(!output.layout_error);
        assert_eq!(output.layout_error_message, None);
    }

    #[test]
    fn test_positioned_without_graph_is_error() {
        let mut request = job(Phase::DotOnly, vec![sized("1")], vec![]);
        request.positioned_vertices = vec![LayoutVertex::new("0", 10.0, 10.0, 5.0, 5.0)];
        assert_eq!(
            compute_layout(&LayeredEngine::new(), &request).unwrap_err(),
            LayoutError::MissingPreviousGraph
        );
    }

    #[test]
    fn test_edges_phase_keeps_pins_and_passes_edges_through() {
        let positioned = vec![
            LayoutVertex::new("0", 10.0, 10.0, 5.0, 5.0),
            LayoutVertex::new("1", 10.0, 10.0, 16.8, 5.0),
            LayoutVertex::new("2", 10.0, 10.0, 28.6, 5.0),
        ];
        let kept = LayoutEdge::new(Edge::new("0", "1"), vec![]);
        let request = LayoutJob {
            phase: Phase::Edges,
            positioned_vertices: positioned.clone(),
            new_vertices: Vec::new(),
            positioned_edges: vec![kept.clone()],
            new_edges: vec![Edge::new("1", "2")],
            options: LayoutOptions::default(),
            prev_graph: Some(LayoutGraph::new(33.6, 10.0)),
        };

        let output = compute_layout(&LayeredEngine::new(), &request).unwrap();
        assert!(output.layout_error_message.is_none());
        assert_eq!(output.moved_vertices, positioned);
        assert_eq!(output.moved_edges, Some(vec![kept]));
        assert_eq!(output.new_edges.as_ref().map(Vec::len), Some(1));
        assert_eq!(output.graph, LayoutGraph::new(33.6, 10.0));
    }

    #[test]
    fn test_edges_phase_rejects_new_vertices() {
        let request = job(Phase::Edges, vec![sized("0")], vec![]);
        assert!(matches!(
            compute_layout(&LayeredEngine::new(), &request),
            Err(LayoutError::InvalidPhase { .. })
        ));
    }
}
