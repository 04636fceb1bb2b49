/*!
# Graph Layout Coordinator

CLI для координатора укладки графов.

## Режимы

- **layout** - полная укладка графа из JSON файла
- **graft** - укладка графа и последующая вставка новых вершин из `--extend`
- **check-engine** - проверка настроенного движка на графе из двух вершин

Входной файл: `{ "vertices": [{ "key", "width", "height" }], "edges": [{ "from", "to" }] }`.
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use graph_layout_coordinator::{
    Config, Edge, Layout, LayoutInput, LayoutManager, LayoutOutcome, PendingLayout, SizeVertex,
};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Аргументы командной строки
#[derive(Parser, Debug)]
#[command(name = "graph-layout-coordinator")]
#[command(about = "Graph layout coordinator with incremental graft")]
#[command(version)]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Уровень логирования
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Режим работы
    #[arg(short, long, default_value = "layout")]
    mode: Mode,

    /// Граф для укладки (JSON)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Новые вершины и рёбра для режима graft (JSON)
    #[arg(short, long)]
    extend: Option<PathBuf>,

    /// Куда записать результат (по умолчанию stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum Mode {
    /// Полная укладка графа
    Layout,
    /// Укладка и вставка новых вершин
    Graft,
    /// Проверка движка
    CheckEngine,
}

/// Граф во входном файле
#[derive(Debug, Deserialize)]
struct GraphFile {
    vertices: Vec<SizeVertex>,
    #[serde(default)]
    edges: Vec<Edge>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Инициализация логирования
    init_logging(&args.log_level)?;

    info!("🦀 Запуск Graph Layout Coordinator v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    info!("🎯 Режим работы: {:?}", args.mode);
    let mut manager = LayoutManager::from_config(&config)?;
    let timeout = Duration::from_secs(config.workers.request_timeout_secs);

    let result = match args.mode {
        Mode::Layout => run_layout(&mut manager, &args, timeout).await,
        Mode::Graft => run_graft(&mut manager, &args, timeout).await,
        Mode::CheckEngine => run_check_engine(&mut manager, timeout).await,
    };

    if config.metrics.enabled {
        match manager.metrics().gather_text() {
            Ok(text) => info!("📊 Метрики:\n{}", text),
            Err(e) => warn!("⚠️ Не удалось собрать метрики: {}", e),
        }
    }
    manager.dispose().await;

    match result {
        Ok(()) => {
            info!("✅ Программа завершена успешно");
            Ok(())
        }
        Err(e) => {
            error!("❌ {}", e);
            Err(e)
        }
    }
}

/// Загрузка конфигурации; без файла используются значения по умолчанию
fn load_config(path: &str) -> Result<Config> {
    let mut config = if Path::new(path).exists() {
        let config = Config::load(path)?;
        info!("📋 Конфигурация загружена из {}", path);
        config
    } else {
        warn!("⚠️ Файл {} не найден, используется конфигурация по умолчанию", path);
        Config::default()
    };

    config.optimize_for_system()?;
    config.validate()?;
    Ok(config)
}

/// Инициализация системы логирования
fn init_logging(level: &str) -> Result<()> {
    let level = level
        .parse::<tracing::Level>()
        .map_err(|e| anyhow::anyhow!("Неверный уровень логирования: {}", e))?;

    std::fs::create_dir_all("logs").map_err(|e| anyhow::anyhow!("Не удалось создать директорию logs: {}", e))?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let file_appender = tracing_appender::rolling::never("logs", "layout_coordinator.log");
    let error_appender = tracing_appender::rolling::never("logs", "layout_coordinator_error.log");

    // Логи в stderr, stdout занят результатом
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_ansi(false);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_appender)
        .with_target(true)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .with(error_layer)
        .init();

    Ok(())
}

fn read_graph(path: Option<&PathBuf>, flag: &str) -> Result<GraphFile> {
    let path = path.ok_or_else(|| anyhow::anyhow!("Не указан {}", flag))?;
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Не удалось прочитать {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&content)?)
}

fn write_layout(layout: &Layout, output: Option<&PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(layout)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("💾 Результат записан в {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Ожидание финальной укладки с таймаутом вызывающего
async fn wait_layout(pending: PendingLayout, timeout: Duration) -> Result<Layout> {
    let id = pending.id;
    let outcome = tokio::time::timeout(timeout, LayoutOutcome::resolve(pending.layout))
        .await
        .map_err(|_| anyhow::anyhow!("Укладка {} не завершилась за {:?}", id, timeout))?;

    match outcome {
        LayoutOutcome::Ready(layout) => {
            if let Some(warning) = &layout.warning {
                warn!("⚠️ Укладка {}: {}", id, warning);
            }
            Ok(layout)
        }
        LayoutOutcome::Cancelled => Err(anyhow::anyhow!("Укладка {} отменена", id)),
        LayoutOutcome::Failed(message) => Err(anyhow::anyhow!("Укладка {} провалена: {}", id, message)),
    }
}

/// Полная укладка графа
async fn run_layout(manager: &mut LayoutManager, args: &Args, timeout: Duration) -> Result<()> {
    let graph = read_graph(args.input.as_ref(), "--input")?;
    info!("🧮 Укладка {} вершин и {} рёбер", graph.vertices.len(), graph.edges.len());

    let pending = manager.request_layout_with_defaults(&LayoutInput::fresh(graph.vertices, graph.edges))?;
    let layout = wait_layout(pending, timeout).await?;

    info!("📐 Граф {:.2}x{:.2}", layout.graph.width, layout.graph.height);
    write_layout(&layout, args.output.as_ref())
}

/// Укладка графа и вставка новых вершин
async fn run_graft(manager: &mut LayoutManager, args: &Args, timeout: Duration) -> Result<()> {
    let graph = read_graph(args.input.as_ref(), "--input")?;
    let extension = read_graph(args.extend.as_ref(), "--extend")?;

    let pending = manager.request_layout_with_defaults(&LayoutInput::fresh(graph.vertices, graph.edges))?;
    let base = wait_layout(pending, timeout).await?;
    info!("📐 Базовый граф {:.2}x{:.2}, вставка {} вершин", base.graph.width, base.graph.height, extension.vertices.len());

    let input = LayoutInput::extend(base.graph, base.vertices, base.edges, extension.vertices, extension.edges);
    let pending = manager.request_layout_with_defaults(&input)?;
    let layout = wait_layout(pending, timeout).await?;

    info!(
        "🌱 Вставлено {} вершин, граф {:.2}x{:.2}",
        layout.new_vertex_keys.len(),
        layout.graph.width,
        layout.graph.height
    );
    write_layout(&layout, args.output.as_ref())
}

/// Проверка движка на минимальном графе
async fn run_check_engine(manager: &mut LayoutManager, timeout: Duration) -> Result<()> {
    info!("🏥 Проверка движка...");
    let input = LayoutInput::fresh(
        vec![SizeVertex::new("a", 1.0, 1.0), SizeVertex::new("b", 1.0, 1.0)],
        vec![Edge::new("a", "b")],
    );
    let pending = manager.request_layout_with_defaults(&input)?;
    let layout = wait_layout(pending, timeout).await?;

    if layout.vertices.len() != 2 || layout.edges.len() != 1 {
        return Err(anyhow::anyhow!("Движок вернул неполную укладку"));
    }
    println!("✅ Движок работает: граф {:.2}x{:.2}", layout.graph.width, layout.graph.height);
    Ok(())
}
