/*!
# Воркер укладки

Фоновая задача tokio, выполняющая по одному заданию за раз. Задание и ответ
передаются через каналы как владеющие копии; общего изменяемого состояния с
координатором нет. Вычисление идёт в `spawn_blocking`, чтобы не занимать
асинхронный runtime.

Убийство воркера прерывает его задачу: незавершённое задание ответа не
присылает. Флаг отмены останавливает и само вычисление: следующий вызов
движка не начинается, а запущенный процесс Graphviz убивается.
*/

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::algorithms::{compute_layout, LayoutJob, LayoutOutput};
use crate::engine::{CancelFlag, Cancellable, LayoutEngine};
use crate::error::{LayoutError, Result};
use crate::model::{LayoutGraph, LayoutId, Phase};

pub type WorkerId = u64;

/// Метаданные, сопровождающие задание и ответ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMeta {
    pub layout_id: LayoutId,
    pub worker_id: WorkerId,
    pub phase: Phase,
}

/// Сообщение с заданием для воркера
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub meta: JobMeta,
    #[serde(flatten)]
    pub job: LayoutJob,
}

/// Результат укладки от воркера
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    pub meta: JobMeta,
    #[serde(flatten)]
    pub output: LayoutOutput,
}

/// Внутренняя ошибка воркера
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub meta: JobMeta,
    pub error_message: String,
}

/// Ответ воркера
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerReply {
    Positions(WorkerOutput),
    DotOnly(WorkerOutput),
    Edges(WorkerOutput),
    /// Результат не прошёл валидацию или входные данные некорректны
    LayoutError(WorkerOutput),
    /// Сбой движка или самого воркера
    Error(WorkerFailure),
}

impl WorkerReply {
    pub fn meta(&self) -> &JobMeta {
        match self {
            WorkerReply::Positions(out)
            | WorkerReply::DotOnly(out)
            | WorkerReply::Edges(out)
            | WorkerReply::LayoutError(out) => &out.meta,
            WorkerReply::Error(failure) => &failure.meta,
        }
    }
}

/// Выполнение одного задания с классификацией результата
pub fn execute_job(engine: &dyn LayoutEngine, job: &WorkerJob) -> WorkerReply {
    execute_cancellable_job(engine, job, &CancelFlag::new())
}

/// То же, но каждый вызов движка сначала проверяет `cancel`
pub fn execute_cancellable_job(engine: &dyn LayoutEngine, job: &WorkerJob, cancel: &CancelFlag) -> WorkerReply {
    let meta = job.meta;
    let _span = tracing::debug_span!("layout_job", layout_id = meta.layout_id, worker_id = meta.worker_id).entered();
    debug!("Job started: phase {}", meta.phase);

    match compute_layout(&Cancellable::new(engine, cancel), &job.job) {
        Ok(output) if output.layout_error => {
            warn!("Layout rejected by validity check: {:?}", output.layout_error_message);
            WorkerReply::LayoutError(WorkerOutput { meta, output })
        }
        Ok(output) => {
            let reply = WorkerOutput { meta, output };
            match meta.phase {
                Phase::Positions => WorkerReply::Positions(reply),
                Phase::DotOnly => WorkerReply::DotOnly(reply),
                Phase::Edges => WorkerReply::Edges(reply),
            }
        }
        Err(e) if e.is_request_error() => {
            warn!("Request error: {}", e);
            let graph = job.job.prev_graph.unwrap_or(LayoutGraph::new(0.0, 0.0));
            WorkerReply::LayoutError(WorkerOutput { meta, output: LayoutOutput::failed(graph, e.to_string()) })
        }
        Err(LayoutError::Cancelled) => {
            debug!("Job cancelled");
            WorkerReply::Error(WorkerFailure { meta, error_message: LayoutError::Cancelled.to_string() })
        }
        Err(e) => {
            error!("Job failed: {}", e);
            WorkerReply::Error(WorkerFailure { meta, error_message: e.to_string() })
        }
    }
}

/// Дескриптор воркера, которым владеет координатор
#[derive(Debug)]
pub struct LayoutWorker {
    id: WorkerId,
    jobs: mpsc::UnboundedSender<WorkerJob>,
    cancel: CancelFlag,
    handle: JoinHandle<()>,
}

impl LayoutWorker {
    /// Запуск воркера; ответы уходят в `replies`
    pub fn spawn(
        id: WorkerId,
        engine: Arc<dyn LayoutEngine>,
        replies: mpsc::UnboundedSender<WorkerReply>,
    ) -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel::<WorkerJob>();
        let cancel = CancelFlag::new();
        let job_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = queue.recv().await {
                let meta = job.meta;
                let engine = Arc::clone(&engine);
                let cancel = job_cancel.clone();
                let blocking = move || execute_cancellable_job(engine.as_ref(), &job, &cancel);
                let reply = match tokio::task::spawn_blocking(blocking).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        error!("Worker {} job panicked: {}", id, e);
                        WorkerReply::Error(WorkerFailure { meta, error_message: format!("worker job panicked: {e}") })
                    }
                };
                if replies.send(reply).is_err() {
                    debug!("Worker {} has no one to reply to, exiting", id);
                    break;
                }
            }
        });

        Self { id, jobs, cancel, handle }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Отправка задания; воркер выполняет задания по одному
    pub fn post(&self, job: WorkerJob) -> Result<()> {
        self.jobs.send(job).map_err(|_| LayoutError::WorkerUnavailable(self.id))
    }

    /// Принудительная остановка; незавершённое задание не ответит и
    /// прекращает работу при следующей проверке флага
    pub fn kill(self) {
        debug!("Killing worker {}", self.id);
        self.cancel.cancel();
        self.handle.abort();
    }
}
