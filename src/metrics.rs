/*!
# Метрики координатора укладки

Счётчики жизненного цикла запросов и пула воркеров в формате Prometheus:
- Запросы: начатые, завершённые, упавшие, отменённые
- Устаревшие ответы воркеров
- Воркеры: созданные, убитые, ошибки
- Когорты, вставленные в существующий граф
*/

use anyhow::Result;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::time::Duration;

use crate::config::MetricsConfig;

/// Сборщик метрик
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    registry: Registry,
    enabled: bool,

    requests_started: Counter,
    requests_completed: Counter,
    requests_failed: Counter,
    requests_cancelled: Counter,

    stale_replies: Counter,
    worker_errors: Counter,
    workers_spawned: Counter,
    workers_killed: Counter,

    cohorts_grafted: Counter,
    layout_duration: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl MetricsCollector {
    /// Создание нового сборщика метрик
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        let registry = Registry::new();

        let requests_started =
            counter(&registry, "layout_requests_started_total", "Total number of layout requests started")?;
        let requests_completed =
            counter(&registry, "layout_requests_completed_total", "Total number of layout requests completed")?;
        let requests_failed =
            counter(&registry, "layout_requests_failed_total", "Total number of layout requests failed")?;
        let requests_cancelled = counter(
            &registry,
            "layout_requests_cancelled_total",
            "Total number of layout requests superseded by a newer request",
        )?;

        let stale_replies =
            counter(&registry, "layout_stale_replies_total", "Worker replies discarded as stale")?;
        let worker_errors =
            counter(&registry, "layout_worker_errors_total", "Worker replies reporting an internal error")?;
        let workers_spawned = counter(&registry, "layout_workers_spawned_total", "Workers spawned")?;
        let workers_killed = counter(&registry, "layout_workers_killed_total", "Workers killed")?;

        let cohorts_grafted =
            counter(&registry, "layout_cohorts_grafted_total", "Cohorts grafted onto existing layouts")?;

        let layout_duration = Histogram::with_opts(
            HistogramOpts::new("layout_duration_seconds", "Duration from request to final layout in seconds")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(layout_duration.clone()))?;

        Ok(Self {
            registry,
            enabled: config.enabled,
            requests_started,
            requests_completed,
            requests_failed,
            requests_cancelled,
            stale_replies,
            worker_errors,
            workers_spawned,
            workers_killed,
            cohorts_grafted,
            layout_duration,
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_request_started(&self) {
        if self.enabled {
            self.requests_started.inc();
        }
    }

    /// Запись успешно завершённого запроса
    pub fn record_request_completed(&self, duration: Duration) {
        if self.enabled {
            self.requests_completed.inc();
            self.layout_duration.observe(duration.as_secs_f64());
        }
    }

    pub fn record_request_failed(&self) {
        if self.enabled {
            self.requests_failed.inc();
        }
    }

    pub fn record_request_cancelled(&self) {
        if self.enabled {
            self.requests_cancelled.inc();
        }
    }

    pub fn record_stale_reply(&self) {
        if self.enabled {
            self.stale_replies.inc();
        }
    }

    pub fn record_worker_error(&self) {
        if self.enabled {
            self.worker_errors.inc();
        }
    }

    pub fn record_worker_spawned(&self) {
        if self.enabled {
            self.workers_spawned.inc();
        }
    }

    pub fn record_workers_killed(&self, count: usize) {
        if self.enabled && count > 0 {
            self.workers_killed.inc_by(count as f64);
        }
    }

    pub fn record_cohorts(&self, count: usize) {
        if self.enabled && count > 0 {
            self.cohorts_grafted.inc_by(count as f64);
        }
    }

    /// Экспорт метрик в текстовом формате Prometheus
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
