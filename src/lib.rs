/*!
# Graph Layout Coordinator

Библиотека координации укладки ориентированных графов: пул фоновых
воркеров, протокол запросов с отбрасыванием устаревших ответов,
преобразование координат и инкрементальная вставка новых подграфов в уже
размещённый граф.

## Модули

- `algorithms` - Функция укладки: полная укладка, вставка когорт, проверка результата
- `coord` - Преобразование между пространством движка и пиксельным
- `coordinator` - Пул воркеров и фильтрация устаревших ответов
- `dot` - Описание графа для движка и разбор формата plain
- `engine` - Граница движка: Graphviz и встроенный послойный движок
- `manager` - Публичный фасад с отложенными результатами
- `mapping` - Биекция ключей вершин и идентификаторов движка
- `metrics` - Метрики Prometheus
- `worker` - Фоновый воркер и протокол сообщений

*/

pub mod algorithms;
pub mod config;
pub mod coord;
pub mod coordinator;
pub mod dot;
pub mod engine;
pub mod error;
pub mod manager;
pub mod mapping;
pub mod metrics;
pub mod model;
pub mod worker;

// Re-export основных типов
pub use algorithms::{compute_layout, LayoutJob, LayoutOutput};
pub use config::Config;
pub use coordinator::{Coordinator, LayoutUpdate, PreparedLayout};
pub use engine::{GraphvizEngine, LayeredEngine, LayoutEngine};
pub use error::{LayoutError, Result};
pub use manager::{Layout, LayoutManager, LayoutOutcome, PendingLayout, Positions};
pub use model::{Edge, LayoutEdge, LayoutGraph, LayoutInput, LayoutOptions, LayoutVertex, Phase, RankDir, SizeVertex};

// Версия API
pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");
