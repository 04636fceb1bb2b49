/*!
# Конфигурация координатора укладки

Настройки пула воркеров, параметров укладки по умолчанию, политики вставки
подграфов, движка и метрик. Все секции необязательны в файле.
*/

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::LayoutOptions;

/// Основная конфигурация сервиса
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Конфигурация пула воркеров
    pub workers: WorkerConfig,

    /// Параметры укладки по умолчанию
    pub layout: LayoutOptions,

    /// Конфигурация вставки подграфов
    pub graft: GraftConfig,

    /// Конфигурация движка
    pub engine: EngineConfig,

    /// Конфигурация метрик
    pub metrics: MetricsConfig,
}

/// Конфигурация пула воркеров
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Сколько простаивающих воркеров держать в пуле; `None` - подобрать
    /// по системе (см. [`Config::optimize_for_system`])
    pub max_idle_workers: Option<usize>,

    /// Таймаут запроса для CLI (секунды)
    pub request_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_idle_workers: None, request_timeout_secs: 30 }
    }
}

impl WorkerConfig {
    /// Лимит пула: заданный в файле или по числу ядер
    pub fn idle_limit(&self) -> usize {
        self.max_idle_workers.unwrap_or_else(num_cpus::get)
    }
}

/// Что делать с рёбрами, которые не удалось перенести сдвигом
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnresolvedEdgePolicy {
    /// Оставить старую траекторию (или прямой отрезок для новых рёбер)
    #[default]
    LeaveStale,
    /// Проложить заново отдельной фазой `Edges`
    Reroute,
}

/// Конфигурация вставки подграфов
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraftConfig {
    pub unresolved_edges: UnresolvedEdgePolicy,
}

/// Движок укладки
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineBackend {
    /// Встроенный послойный движок
    #[default]
    Layered,
    /// Внешние `dot`/`neato`
    Graphviz,
}

/// Конфигурация движка
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: EngineBackend,

    /// Путь к `dot`
    pub dot_path: PathBuf,

    /// Путь к `neato`
    pub neato_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::Layered,
            dot_path: PathBuf::from("dot"),
            neato_path: PathBuf::from("neato"),
        }
    }
}

/// Конфигурация метрик
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Включить сбор метрик
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Загрузка конфигурации из файла
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Валидация конфигурации
    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;

        if layout.ranksep <= 0.0 || layout.nodesep <= 0.0 {
            return Err(anyhow::anyhow!("ranksep и nodesep должны быть больше 0"));
        }

        if layout.sep < 0.0 {
            return Err(anyhow::anyhow!("sep не может быть отрицательным"));
        }

        if layout.shift_threshold <= 0.0 {
            return Err(anyhow::anyhow!("Порог сдвига должен быть больше 0"));
        }

        if layout.slide_margin_ratio < 0.0 {
            return Err(anyhow::anyhow!("Доля отступа при сдвиге не может быть отрицательной"));
        }

        if self.workers.max_idle_workers == Some(0) {
            return Err(anyhow::anyhow!("Пул должен держать хотя бы одного воркера"));
        }

        Ok(())
    }

    /// Оптимизация конфигурации под конкретную систему
    pub fn optimize_for_system(&mut self) -> Result<()> {
        let available_memory = get_available_memory()?;
        let cpu_count = num_cpus::get();

        // Каждый простаивающий воркер держит свою копию графа; на машинах
        // с малым объёмом памяти пул держим меньше. Значение из файла не трогаем
        if self.workers.max_idle_workers.is_none() {
            self.workers.max_idle_workers = Some(if available_memory < 4 * 1024 * 1024 * 1024 {
                (cpu_count / 2).max(1)
            } else {
                cpu_count
            });
        }

        if self.layout.total_memory.is_none() {
            self.layout.total_memory = Some(available_memory);
        }

        Ok(())
    }
}

/// Получение количества доступной памяти в байтах
fn get_available_memory() -> Result<u64> {
    use sysinfo::System;

    let mut system = System::new_all();
    system.refresh_memory();

    Ok(system.available_memory())
}
