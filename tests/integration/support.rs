use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use graph_layout_coordinator::config::MetricsConfig;
use graph_layout_coordinator::engine::EngineOptions;
use graph_layout_coordinator::metrics::MetricsCollector;
use graph_layout_coordinator::{
    Config, LayeredEngine, LayoutEngine, LayoutError, LayoutManager, LayoutVertex, Result, SizeVertex,
};

pub fn sized(key: &str) -> SizeVertex {
    SizeVertex::new(key, 10.0, 10.0)
}

pub fn manager_with(engine: Arc<dyn LayoutEngine>) -> LayoutManager {
    let metrics = Arc::new(MetricsCollector::new(&MetricsConfig::default()).expect("metrics registry"));
    LayoutManager::new(&Config::default(), engine, metrics)
}

/// Built-in engine that sleeps before every call
pub struct SlowEngine {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl SlowEngine {
    pub fn new(delay: Duration) -> Self {
        Self { delay, calls: AtomicUsize::new(0) }
    }
}

impl LayoutEngine for SlowEngine {
    fn name(&self) -> &str {
        "slow"
    }

    fn layout(&self, description: &str, options: &EngineOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        LayeredEngine::new().layout(description, options)
    }
}

/// Engine that reports every vertex one unit wider than requested
pub struct InflatingEngine;

impl LayoutEngine for InflatingEngine {
    fn name(&self) -> &str {
        "inflating"
    }

    fn layout(&self, description: &str, options: &EngineOptions) -> Result<String> {
        let plain = LayeredEngine::new().layout(description, options)?;
        let lines: Vec<String> = plain
            .lines()
            .map(|line| {
                let mut fields: Vec<String> = line.split(' ').map(str::to_string).collect();
                if fields[0] == "node" {
                    let width: f64 = fields[4].parse().unwrap_or_default();
                    fields[4] = (width + 1.0).to_string();
                }
                fields.join(" ")
            })
            .collect();
        Ok(lines.join("\n") + "\n")
    }
}

/// Engine that always fails like a crashed process
pub struct FailingEngine;

impl LayoutEngine for FailingEngine {
    fn name(&self) -> &str {
        "failing"
    }

    fn layout(&self, _description: &str, _options: &EngineOptions) -> Result<String> {
        Err(LayoutError::Engine("engine exited with status 139".into()))
    }
}

/// Tight bounds over vertex boxes: (min_x, min_y, max_x, max_y)
pub fn extents(vertices: &[LayoutVertex]) -> (f64, f64, f64, f64) {
    vertices.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(x0, y0, x1, y1), v| {
            (
                x0.min(v.left - v.width / 2.0),
                y0.min(v.top - v.height / 2.0),
                x1.max(v.left + v.width / 2.0),
                y1.max(v.top + v.height / 2.0),
            )
        },
    )
}

/// First pair of vertices whose boxes overlap by more than `tolerance`
pub fn find_overlap(vertices: &[LayoutVertex], tolerance: f64) -> Option<(String, String)> {
    for (i, a) in vertices.iter().enumerate() {
        for b in &vertices[i + 1..] {
            let dx = (a.left + a.width / 2.0).min(b.left + b.width / 2.0)
                - (a.left - a.width / 2.0).max(b.left - b.width / 2.0);
            let dy = (a.top + a.height / 2.0).min(b.top + b.height / 2.0)
                - (a.top - a.height / 2.0).max(b.top - b.height / 2.0);
            if dx > tolerance && dy > tolerance {
                return Some((a.key.clone(), b.key.clone()));
            }
        }
    }
    None
}
