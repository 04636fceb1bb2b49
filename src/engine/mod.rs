/*!
# Граница движка укладки

Движок это чёрный ящик `layout(description) -> plain`. Есть две реализации:
внешний Graphviz (`dot`/`neato` через процесс) и встроенный ранговый движок
на Rust, который понимает подмножество описания, генерируемое этим крейтом.
*/

mod graphviz;
mod layered;

pub use graphviz::GraphvizEngine;
pub use layered::LayeredEngine;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{EngineBackend, EngineConfig};
use crate::error::{LayoutError, Result};
use crate::model::Phase;

/// Алгоритм движка
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Ранговая укладка
    Dot,
    /// Закреплённые вершины, только рёбра
    Neato,
}

/// Опции вызова движка
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub engine: EngineKind,
    pub format: String,
    pub total_memory: Option<u64>,
}

impl EngineOptions {
    /// Фаза `Edges` использует neato, остальные dot
    pub fn for_phase(phase: Phase, total_memory: Option<u64>) -> Self {
        let engine = match phase {
            Phase::Edges => EngineKind::Neato,
            Phase::Positions | Phase::DotOnly => EngineKind::Dot,
        };
        Self { engine, format: "plain".to_string(), total_memory }
    }
}

/// Флаг отмены задания, общий для воркера и вычисления
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Движок укладки
pub trait LayoutEngine: Send + Sync {
    /// Имя движка для логов
    fn name(&self) -> &str;

    /// Укладка описания графа, результат в формате plain
    fn layout(&self, description: &str, options: &EngineOptions) -> Result<String>;

    /// Укладка с отменой. По умолчанию флаг проверяется только перед вызовом;
    /// движки с долгой работой (внешний процесс) проверяют его и во время неё.
    fn layout_cancellable(&self, description: &str, options: &EngineOptions, cancel: &CancelFlag) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(LayoutError::Cancelled);
        }
        self.layout(description, options)
    }
}

/// Движок, каждый вызов которого можно прервать флагом
pub struct Cancellable<'a> {
    inner: &'a dyn LayoutEngine,
    cancel: &'a CancelFlag,
}

impl<'a> Cancellable<'a> {
    pub fn new(inner: &'a dyn LayoutEngine, cancel: &'a CancelFlag) -> Self {
        Self { inner, cancel }
    }
}

impl LayoutEngine for Cancellable<'_> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn layout(&self, description: &str, options: &EngineOptions) -> Result<String> {
        self.inner.layout_cancellable(description, options, self.cancel)
    }
}

/// Создание движка по конфигурации
pub fn engine_from_config(config: &EngineConfig) -> Arc<dyn LayoutEngine> {
    match config.backend {
        EngineBackend::Layered => Arc::new(LayeredEngine::new()),
        EngineBackend::Graphviz => {
            Arc::new(GraphvizEngine::new(&config.dot_path, &config.neato_path))
        }
    }
}
