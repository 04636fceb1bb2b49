/*!
# Модель данных укладки

Вершины, рёбра, метаданные графа и опции укладки. Все типы владеют своими
данными и сериализуются: через границу воркера передаются только копии.

`left`/`top` вершины всегда обозначают её центр. В пространстве движка ось y
направлена вверх, в пиксельном пространстве вниз (см. [`crate::coord`]).
*/

use serde::{Deserialize, Serialize};
use std::fmt;

/// Разделитель в идентификаторе ребра
pub const EDGE_ID_SEPARATOR: char = '\u{1}';

/// Допуск сравнения размеров и позиций по умолчанию
pub const SHIFT_THRESHOLD: f64 = 1e-3;

/// Идентификатор запроса укладки
pub type LayoutId = u64;

/// Точка пути ребра
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Вершина без позиции
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeVertex {
    pub key: String,
    pub width: f64,
    pub height: f64,
}

impl SizeVertex {
    pub fn new(key: impl Into<String>, width: f64, height: f64) -> Self {
        Self { key: key.into(), width, height }
    }
}

/// Размещённая вершина (`left`/`top` это центр)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutVertex {
    pub key: String,
    pub width: f64,
    pub height: f64,
    pub left: f64,
    pub top: f64,
}

impl LayoutVertex {
    pub fn new(key: impl Into<String>, width: f64, height: f64, left: f64, top: f64) -> Self {
        Self { key: key.into(), width, height, left, top }
    }

    pub fn size(&self) -> SizeVertex {
        SizeVertex::new(self.key.clone(), self.width, self.height)
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.left += dx;
        self.top += dy;
    }
}

/// Ребро, идентифицируемое парой ключей
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub is_bidirectional: bool,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into(), is_bidirectional: false }
    }

    pub fn bidirectional(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into(), is_bidirectional: true }
    }

    /// Идентификатор ребра: `from \u0001 to`
    pub fn id(&self) -> String {
        edge_id(&self.from, &self.to)
    }
}

pub fn edge_id(from: &str, to: &str) -> String {
    let mut id = String::with_capacity(from.len() + to.len() + 1);
    id.push_str(from);
    id.push(EDGE_ID_SEPARATOR);
    id.push_str(to);
    id
}

/// Ребро с путём
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEdge {
    #[serde(flatten)]
    pub edge: Edge,
    pub points: Vec<Point>,
}

impl LayoutEdge {
    pub fn new(edge: Edge, points: Vec<Point>) -> Self {
        Self { edge, points }
    }

    pub fn id(&self) -> String {
        self.edge.id()
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        for point in &mut self.points {
            point.x += dx;
            point.y += dy;
        }
    }
}

/// Метаданные графа, возвращённые движком
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutGraph {
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

impl LayoutGraph {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height, scale: 1.0 }
    }
}

/// Направление рангов
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RankDir {
    TB,
    BT,
    #[default]
    LR,
    RL,
}

impl fmt::Display for RankDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RankDir::TB => "TB",
            RankDir::BT => "BT",
            RankDir::LR => "LR",
            RankDir::RL => "RL",
        };
        f.write_str(name)
    }
}

/// Фаза задания
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Только позиции вершин
    Positions,
    /// Маршрутизация рёбер при закреплённых вершинах
    Edges,
    /// Вершины и рёбра за один проход
    DotOnly,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Positions => "positions",
            Phase::Edges => "edges",
            Phase::DotOnly => "dot-only",
        };
        f.write_str(name)
    }
}

/// Опции укладки, передаваемые движку
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub rankdir: RankDir,
    pub ranksep: f64,
    pub nodesep: f64,
    pub sep: f64,
    pub splines: String,
    pub use_dot_edges: bool,
    pub total_memory: Option<u64>,
    /// Доля `ranksep`/`nodesep`, используемая как зазор при вставке когорты
    pub slide_margin_ratio: f64,
    /// Абсолютный допуск сравнения размеров и позиций
    pub shift_threshold: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            rankdir: RankDir::LR,
            ranksep: 1.8,
            nodesep: 0.5,
            sep: 0.5,
            splines: "true".to_string(),
            use_dot_edges: false,
            total_memory: None,
            slide_margin_ratio: 1.0,
            shift_threshold: SHIFT_THRESHOLD,
        }
    }
}

/// Полное описание запроса от вызывающего (пиксельное пространство)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutInput {
    pub positioned_vertices: Vec<LayoutVertex>,
    pub new_vertices: Vec<SizeVertex>,
    pub positioned_edges: Vec<LayoutEdge>,
    pub new_edges: Vec<Edge>,
    pub prev_graph: Option<LayoutGraph>,
}

impl LayoutInput {
    /// Запрос полной укладки с нуля
    pub fn fresh(vertices: Vec<SizeVertex>, edges: Vec<Edge>) -> Self {
        Self { new_vertices: vertices, new_edges: edges, ..Default::default() }
    }

    /// Запрос на достройку уже размещённого графа
    pub fn extend(
        graph: LayoutGraph,
        vertices: Vec<LayoutVertex>,
        edges: Vec<LayoutEdge>,
        new_vertices: Vec<SizeVertex>,
        new_edges: Vec<Edge>,
    ) -> Self {
        Self {
            positioned_vertices: vertices,
            new_vertices,
            positioned_edges: edges,
            new_edges,
            prev_graph: Some(graph),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positioned_vertices.len() + self.new_vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.positioned_edges.len() + self.new_edges.len()
    }
}
