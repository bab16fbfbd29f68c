// master/src/state.rs

use common::{
    Dispatcher, KvStore, Settings, TaskError, TaskId, TaskRecordStore, QueuedTask, WorkerId,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::SystemTime,
};

use crate::broker::QueueBroker;

pub type SharedKv = Arc<dyn KvStore>;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub broker: Arc<QueueBroker>,
    pub dispatcher: Dispatcher<Arc<QueueBroker>>,
    pub records: TaskRecordStore<SharedKv>,
    pub workers: Arc<Mutex<HashMap<WorkerId, WorkerMeta>>>,
    // tareas ya entregadas a un worker pero no completadas
    pub in_flight: Arc<Mutex<HashMap<TaskId, InFlight>>>,
}

impl AppState {
    pub fn new(settings: Settings, kv: SharedKv) -> Self {
        let broker = Arc::new(QueueBroker::new());
        let dispatcher = Dispatcher::new(broker.clone(), settings.past_due);

        Self {
            settings: Arc::new(settings),
            broker,
            dispatcher,
            records: TaskRecordStore::new(kv),
            workers: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Lock que convierte el envenenamiento en error en vez de panic.
/// Un lock envenenado no se arregla solo: es `Internal`, no reintentable.
pub fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, TaskError> {
    m.lock()
        .map_err(|_| TaskError::Internal(format!("lock {} envenenado", what)))
}

#[derive(Debug, Clone)]
pub struct WorkerMeta {
    pub hostname: String,
    pub last_heartbeat: SystemTime,
    pub dead: bool,
    pub max_concurrency: u32,

    // Métricas
    pub tasks_started: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub total_task_time_ms: u64,

    pub last_cpu_percent: Option<f32>,
    pub last_mem_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct InFlight {
    pub task: QueuedTask,
    pub worker_id: WorkerId,
    pub started_at: SystemTime,
}
