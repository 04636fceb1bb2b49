/*!
# Менеджер укладки

Публичный фасад. Каждый запрос получает следующий по порядку идентификатор,
проверяется синхронно и передаётся актору, который владеет координатором.
Вызывающий получает два отложенных результата: позиции и полную укладку.
Незавершённый предыдущий запрос разрешается как отменённый.

После `dispose` новые запросы сразу получают [`LayoutError::Disposed`].
*/

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::coordinator::{Coordinator, LayoutUpdate, PreparedLayout};
use crate::engine::{engine_from_config, LayoutEngine};
use crate::error::{LayoutError, Result};
use crate::metrics::MetricsCollector;
use crate::model::{LayoutEdge, LayoutGraph, LayoutId, LayoutInput, LayoutOptions, LayoutVertex};
use crate::worker::WorkerReply;

/// Исход отложенного результата
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutOutcome<T> {
    Ready(T),
    /// Запрос вытеснен более новым или менеджер остановлен
    Cancelled,
    Failed(String),
}

impl<T> LayoutOutcome<T> {
    /// Ожидание результата; закрытый канал считается отменой
    pub async fn resolve(receiver: oneshot::Receiver<Self>) -> Self {
        receiver.await.unwrap_or(LayoutOutcome::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LayoutOutcome::Cancelled)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            LayoutOutcome::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Позиции вершин (пиксельное пространство)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Positions {
    pub graph: LayoutGraph,
    pub vertices: Vec<LayoutVertex>,
}

/// Полная укладка (пиксельное пространство)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub graph: LayoutGraph,
    pub vertices: Vec<LayoutVertex>,
    pub edges: Vec<LayoutEdge>,
    pub new_vertex_keys: Vec<String>,
    pub warning: Option<String>,
}

/// Отложенные результаты одного запроса
#[derive(Debug)]
pub struct PendingLayout {
    pub id: LayoutId,
    pub positions: oneshot::Receiver<LayoutOutcome<Positions>>,
    pub layout: oneshot::Receiver<LayoutOutcome<Layout>>,
}

enum Command {
    Start {
        prepared: PreparedLayout,
        positions: oneshot::Sender<LayoutOutcome<Positions>>,
        layout: oneshot::Sender<LayoutOutcome<Layout>>,
    },
    Dispose {
        done: oneshot::Sender<()>,
    },
}

/// Обещания текущего запроса внутри актора
struct Promises {
    id: LayoutId,
    positions: Option<oneshot::Sender<LayoutOutcome<Positions>>>,
    layout: Option<oneshot::Sender<LayoutOutcome<Layout>>>,
}

impl Promises {
    fn cancel(self, metrics: &MetricsCollector) {
        debug!("Layout {} cancelled", self.id);
        metrics.record_request_cancelled();
        if let Some(positions) = self.positions {
            let _ = positions.send(LayoutOutcome::Cancelled);
        }
        if let Some(layout) = self.layout {
            let _ = layout.send(LayoutOutcome::Cancelled);
        }
    }

    fn fail(self, message: String) {
        if let Some(positions) = self.positions {
            let _ = positions.send(LayoutOutcome::Failed(message.clone()));
        }
        if let Some(layout) = self.layout {
            let _ = layout.send(LayoutOutcome::Failed(message));
        }
    }
}

pub struct LayoutManager {
    instance_id: Uuid,
    next_id: LayoutId,
    defaults: LayoutOptions,
    metrics: Arc<MetricsCollector>,
    commands: mpsc::UnboundedSender<Command>,
    actor: Option<JoinHandle<()>>,
    disposed: bool,
}

impl LayoutManager {
    /// Создание менеджера по конфигурации: движок и метрики из неё же
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let engine = engine_from_config(&config.engine);
        let metrics = Arc::new(MetricsCollector::new(&config.metrics)?);
        Ok(Self::new(config, engine, metrics))
    }

    /// Запуск актора; должен вызываться внутри runtime tokio
    pub fn new(config: &Config, engine: Arc<dyn LayoutEngine>, metrics: Arc<MetricsCollector>) -> Self {
        let instance_id = Uuid::new_v4();
        let (updates_tx, updates) = mpsc::unbounded_channel();
        let (coordinator, replies) = Coordinator::new(engine, config, Arc::clone(&metrics), updates_tx);
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let span = tracing::info_span!("layout_manager", instance = %instance_id);
        let actor = tokio::spawn(
            run_actor(coordinator, Arc::clone(&metrics), commands_rx, updates, replies).instrument(span),
        );
        info!("🚀 LayoutManager {} started", instance_id);

        Self {
            instance_id,
            next_id: 0,
            defaults: config.layout.clone(),
            metrics,
            commands,
            actor: Some(actor),
            disposed: false,
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn default_options(&self) -> &LayoutOptions {
        &self.defaults
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Новый запрос укладки.
    ///
    /// Ошибки входных данных возвращаются сразу; предыдущий незавершённый
    /// запрос разрешается как отменённый.
    pub fn request_layout(&mut self, input: &LayoutInput, options: LayoutOptions) -> Result<PendingLayout> {
        if self.disposed {
            return Err(LayoutError::Disposed);
        }

        self.next_id += 1;
        let id = self.next_id;
        let prepared = PreparedLayout::prepare(id, input, options)?;

        let (positions_tx, positions) = oneshot::channel();
        let (layout_tx, layout) = oneshot::channel();
        self.commands
            .send(Command::Start { prepared, positions: positions_tx, layout: layout_tx })
            .map_err(|_| LayoutError::Disposed)?;

        debug!("Layout {} requested: {} vertices, {} edges", id, input.vertex_count(), input.edge_count());
        Ok(PendingLayout { id, positions, layout })
    }

    /// Запрос с параметрами по умолчанию из конфигурации
    pub fn request_layout_with_defaults(&mut self, input: &LayoutInput) -> Result<PendingLayout> {
        let options = self.defaults.clone();
        self.request_layout(input, options)
    }

    /// Остановка актора и всех воркеров
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        let (done_tx, done) = oneshot::channel();
        if self.commands.send(Command::Dispose { done: done_tx }).is_ok() {
            let _ = done.await;
        }
        if let Some(actor) = self.actor.take() {
            let _ = actor.await;
        }
        info!("🛑 LayoutManager {} disposed", self.instance_id);
    }
}

impl Drop for LayoutManager {
    fn drop(&mut self) {
        if !self.disposed {
            let (done, _) = oneshot::channel();
            let _ = self.commands.send(Command::Dispose { done });
        }
    }
}

async fn run_actor(
    mut coordinator: Coordinator,
    metrics: Arc<MetricsCollector>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut updates: mpsc::UnboundedReceiver<LayoutUpdate>,
    mut replies: mpsc::UnboundedReceiver<WorkerReply>,
) {
    let mut pending: Option<Promises> = None;

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(Command::Start { prepared, positions, layout }) => {
                    if let Some(previous) = pending.take() {
                        previous.cancel(&metrics);
                    }
                    let promises = Promises { id: prepared.id, positions: Some(positions), layout: Some(layout) };
                    match coordinator.get_layout(prepared) {
                        Ok(()) => pending = Some(promises),
                        Err(e) => promises.fail(e.to_string()),
                    }
                }
                Some(Command::Dispose { done }) => {
                    shutdown(&mut coordinator, pending.take(), &metrics);
                    let _ = done.send(());
                    break;
                }
                None => {
                    shutdown(&mut coordinator, pending.take(), &metrics);
                    break;
                }
            },

            Some(update) = updates.recv() => deliver(&mut pending, update),

            Some(reply) = replies.recv() => coordinator.handle_reply(reply),
        }
    }
}

fn shutdown(coordinator: &mut Coordinator, pending: Option<Promises>, metrics: &MetricsCollector) {
    coordinator.dispose();
    if let Some(promises) = pending {
        promises.cancel(metrics);
    }
}

fn deliver(pending: &mut Option<Promises>, update: LayoutUpdate) {
    let Some(promises) = pending.as_mut().filter(|p| p.id == update.layout_id()) else {
        debug!("Update for layout {} has no waiting caller", update.layout_id());
        return;
    };

    match update {
        LayoutUpdate::Positions { graph, vertices, .. } => {
            if let Some(positions) = promises.positions.take() {
                let _ = positions.send(LayoutOutcome::Ready(Positions { graph, vertices }));
            }
        }
        LayoutUpdate::Done { graph, vertices, edges, new_vertex_keys, warning, .. } => {
            if let Some(positions) = promises.positions.take() {
                let _ = positions.send(LayoutOutcome::Ready(Positions { graph, vertices: vertices.clone() }));
            }
            if let Some(layout) = promises.layout.take() {
                let _ = layout.send(LayoutOutcome::Ready(Layout { graph, vertices, edges, new_vertex_keys, warning }));
            }
            *pending = None;
        }
        LayoutUpdate::Error { message, .. } => {
            if let Some(promises) = pending.take() {
                promises.fail(message);
            }
        }
    }
}
