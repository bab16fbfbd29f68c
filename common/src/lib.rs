pub mod config;
pub mod counter;
pub mod dispatch;
pub mod due;
pub mod error;
pub mod query;
pub mod store;
pub mod task;
pub mod worker;

pub use config::Settings;
pub use dispatch::{Broker, Dispatcher, PastDuePolicy};
pub use due::DueSpec;
pub use error::{ConfigError, TaskError};
pub use query::{TaskDetail, TaskListing, TaskSummary};
pub use store::{JsonFileKv, KvStore, MemoryKv, TaskRecordStore};
pub use task::{QueuedTask, TaskId, TaskRecord, TaskStatus, WorkPayload};
pub use worker::*;

/* --------- Respuestas de la API pública --------- */

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
    pub status: String,
    /// Hora local resuelta, solo en tareas programadas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
}

/// Cuerpo de `GET /api/task`: o hay tareas, o un mensaje informativo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskListResponse {
    Tasks { tasks: Vec<TaskSummary> },
    Info { info: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}
