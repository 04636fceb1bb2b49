/*!
# Координатор пула воркеров

Владеет пулом воркеров и текущим запросом. Каждый новый запрос убивает все
занятые воркеры; ответы на устаревшие запросы отбрасываются по сравнению
`layout_id`. Результаты переводятся в пиксельное пространство, ключи
восстанавливаются, и вызывающему уходят типизированные обновления.

Координатор ничего не повторяет сам: внутренняя ошибка воркера только
логируется, и запрос остаётся без финального обновления.
*/

use std::sync::Arc;
use std::time::Instant;

use hashbrown::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::algorithms::graft::cohort::partition_cohorts;
use crate::algorithms::{LayoutJob, LayoutOutput};
use crate::config::{Config, UnresolvedEdgePolicy};
use crate::coord::{edges_to_dot, edges_to_pixels, graph_to_dot, graph_to_pixels, vertices_to_dot, vertices_to_pixels};
use crate::engine::LayoutEngine;
use crate::error::{LayoutError, Result};
use crate::mapping::InputMapping;
use crate::metrics::MetricsCollector;
use crate::model::{Edge, LayoutEdge, LayoutGraph, LayoutId, LayoutInput, LayoutOptions, LayoutVertex, Phase};
use crate::worker::{JobMeta, LayoutWorker, WorkerId, WorkerJob, WorkerOutput, WorkerReply};

/// Обновление, отправляемое вызывающему
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutUpdate {
    /// Позиции вершин готовы, рёбра ещё прокладываются
    Positions { layout_id: LayoutId, graph: LayoutGraph, vertices: Vec<LayoutVertex> },
    /// Финальная укладка
    Done {
        layout_id: LayoutId,
        graph: LayoutGraph,
        vertices: Vec<LayoutVertex>,
        edges: Vec<LayoutEdge>,
        /// Ключи вершин, появившихся в этом запросе
        new_vertex_keys: Vec<String>,
        warning: Option<String>,
    },
    /// Запрос провален
    Error { layout_id: LayoutId, message: String },
}

impl LayoutUpdate {
    pub fn layout_id(&self) -> LayoutId {
        match self {
            LayoutUpdate::Positions { layout_id, .. }
            | LayoutUpdate::Done { layout_id, .. }
            | LayoutUpdate::Error { layout_id, .. } => *layout_id,
        }
    }
}

/// Запрос, проверенный и переведённый в пространство движка
#[derive(Debug, Clone)]
pub struct PreparedLayout {
    pub id: LayoutId,
    pub mapping: InputMapping,
    pub job: LayoutJob,
}

impl PreparedLayout {
    /// Проверка входных данных и перевод в идентификаторы и координаты движка.
    ///
    /// Ошибки входных данных возвращаются здесь, до запуска воркера.
    pub fn prepare(id: LayoutId, input: &LayoutInput, options: LayoutOptions) -> Result<Self> {
        let mapped = InputMapping::map_input(input)?;

        let has_positioned = !mapped.positioned_vertices.is_empty();
        let prev_graph = match (input.prev_graph, has_positioned) {
            (None, true) => return Err(LayoutError::MissingPreviousGraph),
            (graph, _) => graph,
        };

        if has_positioned && !mapped.new_vertices.is_empty() {
            let positioned: HashSet<&str> = mapped.positioned_vertices.iter().map(|v| v.key.as_str()).collect();
            match partition_cohorts(&positioned, &mapped.new_vertices, &mapped.new_edges) {
                // report caller keys, not engine ids
                Err(LayoutError::Unanchored(ids)) => {
                    let keys = ids
                        .iter()
                        .map(|id| mapped.mapping.vertex_key(id).map(str::to_string))
                        .collect::<Result<Vec<_>>>()?;
                    return Err(LayoutError::Unanchored(keys));
                }
                other => {
                    other?;
                }
            }
        }

        let (positioned_vertices, positioned_edges) = match &prev_graph {
            Some(graph) => (
                vertices_to_dot(graph, &mapped.positioned_vertices),
                edges_to_dot(graph, &mapped.positioned_edges),
            ),
            None => (mapped.positioned_vertices, mapped.positioned_edges),
        };

        let phase = if options.use_dot_edges { Phase::DotOnly } else { Phase::Positions };
        let job = LayoutJob {
            phase,
            positioned_vertices,
            new_vertices: mapped.new_vertices,
            positioned_edges,
            new_edges: mapped.new_edges,
            options,
            prev_graph: prev_graph.as_ref().map(graph_to_dot),
        };

        Ok(Self { id, mapping: mapped.mapping, job })
    }
}

/// Состояние, переносимое из первой фазы во вторую
#[derive(Debug, Clone, Default)]
struct CarriedOver {
    new_vertex_keys: Vec<String>,
    warning: Option<String>,
}

#[derive(Debug)]
struct CurrentLayout {
    id: LayoutId,
    mapping: InputMapping,
    options: LayoutOptions,
    /// Все рёбра запроса в идентификаторах движка
    edges: Vec<Edge>,
    started: Instant,
    carried: Option<CarriedOver>,
}

/// Результат в пиксельном пространстве с исходными ключами
struct Unmapped {
    graph: LayoutGraph,
    vertices: Vec<LayoutVertex>,
    edges: Vec<LayoutEdge>,
    new_vertex_keys: Vec<String>,
}

pub struct Coordinator {
    engine: Arc<dyn LayoutEngine>,
    policy: UnresolvedEdgePolicy,
    max_idle_workers: usize,
    metrics: Arc<MetricsCollector>,
    idle: Vec<LayoutWorker>,
    busy: HashMap<WorkerId, LayoutWorker>,
    next_worker_id: WorkerId,
    current: Option<CurrentLayout>,
    replies: mpsc::UnboundedSender<WorkerReply>,
    updates: mpsc::UnboundedSender<LayoutUpdate>,
    disposed: bool,
}

impl Coordinator {
    /// Создание координатора; ответы воркеров приходят в возвращаемый канал
    /// и передаются обратно в [`Coordinator::handle_reply`].
    pub fn new(
        engine: Arc<dyn LayoutEngine>,
        config: &Config,
        metrics: Arc<MetricsCollector>,
        updates: mpsc::UnboundedSender<LayoutUpdate>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerReply>) {
        let (replies, replies_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            engine,
            policy: config.graft.unresolved_edges,
            max_idle_workers: config.workers.idle_limit(),
            metrics,
            idle: Vec::new(),
            busy: HashMap::new(),
            next_worker_id: 0,
            current: None,
            replies,
            updates,
            disposed: false,
        };
        (coordinator, replies_rx)
    }

    pub fn idle_workers(&self) -> usize {
        self.idle.len()
    }

    pub fn busy_workers(&self) -> usize {
        self.busy.len()
    }

    pub fn current_layout_id(&self) -> Option<LayoutId> {
        self.current.as_ref().map(|c| c.id)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Запуск нового запроса; все занятые воркеры убиваются
    pub fn get_layout(&mut self, prepared: PreparedLayout) -> Result<()> {
        if self.disposed {
            return Err(LayoutError::Disposed);
        }

        let killed = self.busy.len();
        for (_, worker) in self.busy.drain() {
            worker.kill();
        }
        if killed > 0 {
            debug!("Killed {} busy workers for layout {}", killed, prepared.id);
            self.metrics.record_workers_killed(killed);
        }

        info!(
            "🔧 Layout {} started: {} positioned, {} new vertices, phase {}",
            prepared.id,
            prepared.job.positioned_vertices.len(),
            prepared.job.new_vertices.len(),
            prepared.job.phase
        );
        self.metrics.record_request_started();

        let edges = prepared
            .job
            .positioned_edges
            .iter()
            .map(|e| e.edge.clone())
            .chain(prepared.job.new_edges.iter().cloned())
            .collect();
        self.current = Some(CurrentLayout {
            id: prepared.id,
            mapping: prepared.mapping,
            options: prepared.job.options.clone(),
            edges,
            started: Instant::now(),
            carried: None,
        });
        self.post(prepared.id, prepared.job)
    }

    fn spawn_worker(&mut self) -> LayoutWorker {
        self.next_worker_id += 1;
        self.metrics.record_worker_spawned();
        debug!("Spawning worker {}", self.next_worker_id);
        LayoutWorker::spawn(self.next_worker_id, Arc::clone(&self.engine), self.replies.clone())
    }

    fn post(&mut self, layout_id: LayoutId, job: LayoutJob) -> Result<()> {
        let worker = match self.idle.pop() {
            Some(worker) => worker,
            None => self.spawn_worker(),
        };
        let meta = JobMeta { layout_id, worker_id: worker.id(), phase: job.phase };
        let job = WorkerJob { meta, job };

        let worker = match worker.post(job.clone()) {
            Ok(()) => worker,
            Err(e) => {
                warn!("{}, replacing it", e);
                worker.kill();
                self.metrics.record_workers_killed(1);
                let fresh = self.spawn_worker();
                let job = WorkerJob { meta: JobMeta { worker_id: fresh.id(), ..job.meta }, ..job };
                fresh.post(job)?;
                fresh
            }
        };

        debug!("Layout {} phase {} posted to worker {}", layout_id, meta.phase, worker.id());
        self.busy.insert(worker.id(), worker);
        Ok(())
    }

    /// Возвращает воркер в пул простаивающих, соблюдая лимит пула
    fn release(&mut self, worker_id: WorkerId) {
        let Some(worker) = self.busy.remove(&worker_id) else {
            return;
        };
        if self.idle.len() < self.max_idle_workers {
            self.idle.push(worker);
        } else {
            worker.kill();
            self.metrics.record_workers_killed(1);
        }
    }

    /// Обработка ответа воркера
    pub fn handle_reply(&mut self, reply: WorkerReply) {
        let meta = *reply.meta();
        self.release(meta.worker_id);

        let is_current = self.current.as_ref().map_or(false, |c| c.id == meta.layout_id);
        if !is_current {
            debug!("Discarding stale reply for layout {} from worker {}", meta.layout_id, meta.worker_id);
            self.metrics.record_stale_reply();
            return;
        }

        match reply {
            WorkerReply::Error(failure) => {
                error!(
                    "Worker {} failed layout {} ({}): {}",
                    meta.worker_id, meta.layout_id, meta.phase, failure.error_message
                );
                self.metrics.record_worker_error();
            }
            WorkerReply::LayoutError(out) => {
                let message = out
                    .output
                    .layout_error_message
                    .unwrap_or_else(|| "layout validation failed".to_string());
                error!("Layout {} failed: {}", meta.layout_id, message);
                self.fail(meta.layout_id, message);
            }
            WorkerReply::Positions(out) | WorkerReply::DotOnly(out) | WorkerReply::Edges(out) => {
                if let Err(e) = self.handle_output(out) {
                    error!("Layout {} result rejected: {}", meta.layout_id, e);
                    self.fail(meta.layout_id, e.to_string());
                }
            }
        }
    }

    fn fail(&mut self, layout_id: LayoutId, message: String) {
        self.current = None;
        self.metrics.record_request_failed();
        self.emit(LayoutUpdate::Error { layout_id, message });
    }

    fn emit(&self, update: LayoutUpdate) {
        if self.updates.send(update).is_err() {
            debug!("Update receiver dropped");
        }
    }

    fn handle_output(&mut self, out: WorkerOutput) -> Result<()> {
        let WorkerOutput { meta, output } = out;
        let Some(mut current) = self.current.take() else {
            return Ok(());
        };

        self.metrics.record_cohorts(output.cohorts);
        if let Some(warning) = &output.layout_error_message {
            warn!("Layout {} ({}): {}", meta.layout_id, meta.phase, warning);
        }

        let unmapped = unmap_output(&current.mapping, &output)?;
        if unmapped.vertices.len() != current.mapping.vertex_count() {
            return Err(LayoutError::Validation(format!(
                "expected {} vertices, worker returned {}",
                current.mapping.vertex_count(),
                unmapped.vertices.len()
            )));
        }
        if output.edge_count().is_some() && unmapped.edges.len() != current.mapping.edge_count() {
            return Err(LayoutError::Validation(format!(
                "expected {} edges, worker returned {}",
                current.mapping.edge_count(),
                unmapped.edges.len()
            )));
        }

        let reroute = meta.phase == Phase::DotOnly
            && self.policy == UnresolvedEdgePolicy::Reroute
            && !output.unresolved_edges.is_empty();

        if meta.phase == Phase::Positions || reroute {
            let job = if reroute {
                info!("Layout {}: rerouting {} unresolved edges", meta.layout_id, output.unresolved_edges.len());
                let resolved: Vec<LayoutEdge> = output
                    .moved_edges
                    .iter()
                    .flatten()
                    .chain(output.new_edges.iter().flatten())
                    .cloned()
                    .collect();
                let unresolved = output.unresolved_edges.iter().map(|e| e.edge.clone()).collect();
                edges_job(&output, &current.options, resolved, unresolved)
            } else {
                edges_job(&output, &current.options, Vec::new(), current.edges.clone())
            };

            current.carried = Some(CarriedOver {
                new_vertex_keys: unmapped.new_vertex_keys,
                warning: output.layout_error_message,
            });
            self.current = Some(current);
            self.emit(LayoutUpdate::Positions {
                layout_id: meta.layout_id,
                graph: unmapped.graph,
                vertices: unmapped.vertices,
            });
            return self.post(meta.layout_id, job);
        }

        let carried = current.carried.take().unwrap_or_default();
        let warning = match (carried.warning, output.layout_error_message) {
            (Some(a), Some(b)) => Some(format!("{a}; {b}")),
            (a, b) => a.or(b),
        };
        let new_vertex_keys = if meta.phase == Phase::Edges {
            carried.new_vertex_keys
        } else {
            unmapped.new_vertex_keys
        };
        let elapsed = current.started.elapsed();
        info!(
            "✅ Layout {} done: {} vertices, {} edges in {:.2?}",
            meta.layout_id,
            unmapped.vertices.len(),
            unmapped.edges.len(),
            elapsed
        );

        self.metrics.record_request_completed(elapsed);
        self.emit(LayoutUpdate::Done {
            layout_id: meta.layout_id,
            graph: unmapped.graph,
            vertices: unmapped.vertices,
            edges: unmapped.edges,
            new_vertex_keys,
            warning,
        });
        Ok(())
    }

    /// Остановка всех воркеров и сброс текущего запроса
    pub fn stop_and_release(&mut self) {
        let count = self.idle.len() + self.busy.len();
        for worker in self.idle.drain(..) {
            worker.kill();
        }
        for (_, worker) in self.busy.drain() {
            worker.kill();
        }
        self.metrics.record_workers_killed(count);
        self.current = None;
        info!("🛑 Released {} workers", count);
    }

    /// Окончательная остановка; дальнейшие запросы отклоняются
    pub fn dispose(&mut self) {
        self.stop_and_release();
        self.disposed = true;
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if !self.idle.is_empty() || !self.busy.is_empty() {
            self.stop_and_release();
        }
    }
}

/// Задание второй фазы: все вершины закреплены
fn edges_job(
    output: &LayoutOutput,
    options: &LayoutOptions,
    positioned_edges: Vec<LayoutEdge>,
    new_edges: Vec<Edge>,
) -> LayoutJob {
    LayoutJob {
        phase: Phase::Edges,
        positioned_vertices: output.moved_vertices.iter().chain(&output.new_vertices).cloned().collect(),
        new_vertices: Vec::new(),
        positioned_edges,
        new_edges,
        options: options.clone(),
        prev_graph: Some(output.graph),
    }
}

fn unmap_output(mapping: &InputMapping, output: &LayoutOutput) -> Result<Unmapped> {
    let graph = &output.graph;
    let vertices = vertices_to_pixels(graph, &output.moved_vertices)
        .into_iter()
        .chain(vertices_to_pixels(graph, &output.new_vertices))
        .map(|v| mapping.unmap_vertex(&v))
        .collect::<Result<Vec<_>>>()?;

    let edges = output
        .moved_edges
        .iter()
        .flatten()
        .chain(output.new_edges.iter().flatten())
        .chain(&output.unresolved_edges)
        .cloned()
        .collect::<Vec<_>>();
    let edges = edges_to_pixels(graph, &edges)
        .iter()
        .map(|e| mapping.unmap_edge(e))
        .collect::<Result<Vec<_>>>()?;

    let new_vertex_keys = output
        .new_vertices
        .iter()
        .map(|v| mapping.vertex_key(&v.key).map(str::to_string))
        .collect::<Result<Vec<_>>>()?;

    Ok(Unmapped { graph: graph_to_pixels(graph), vertices, edges, new_vertex_keys })
}
