use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use crate::error::TaskError;
use crate::store::{KvStore, TaskRecordStore};
use crate::task::{TaskId, TaskStatus};

/// Fila del listado de tareas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub status: TaskStatus,
    /// Fecha de finalización en la zona configurada (solo para mostrar)
    pub date: String,
}

/// Detalle de una tarea; no incluye la fecha de finalización.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetail {
    pub id: TaskId,
    pub status: TaskStatus,
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskListing {
    /// El store no tiene ningún registro
    NoTasks,
    /// Ordenadas por finalización, la más reciente primero
    Tasks(Vec<TaskSummary>),
}

/// Formatea un instante UTC como hora local de `tz`. No toca el valor guardado.
pub fn local_timestamp(utc: DateTime<Utc>, tz: Tz) -> String {
    utc.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn list_tasks<S: KvStore>(
    store: &TaskRecordStore<S>,
    tz: Tz,
) -> Result<TaskListing, TaskError> {
    // un solo fallo del store invalida el listado entero
    let mut records = store.scan_all()?.collect::<Result<Vec<_>, _>>()?;
    if records.is_empty() {
        return Ok(TaskListing::NoTasks);
    }

    // desempate por id para que el orden sea determinista
    records.sort_by(|a, b| {
        Reverse(a.date_done)
            .cmp(&Reverse(b.date_done))
            .then_with(|| a.task_id.cmp(&b.task_id))
    });

    let tasks = records
        .into_iter()
        .map(|r| TaskSummary {
            date: local_timestamp(r.date_done, tz),
            id: r.task_id,
            status: r.status,
        })
        .collect();

    Ok(TaskListing::Tasks(tasks))
}

pub fn get_task<S: KvStore>(store: &TaskRecordStore<S>, id: &str) -> Result<TaskDetail, TaskError> {
    let record = store.get(id)?;
    Ok(TaskDetail {
        id: record.task_id,
        status: record.status,
        result: record.result,
    })
}
