use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Started,
    Success,
    Failure,
}

impl TaskStatus {
    /// SUCCESS y FAILURE son terminales: el registro ya no cambia.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Started => "STARTED",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Registro persistido por cada tarea, escrito una sola vez por el backend
/// de ejecución al llegar a un estado terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Momento de finalización, siempre en UTC
    pub date_done: DateTime<Utc>,
    /// Payload arbitrario producido por la unidad de trabajo
    pub result: serde_json::Value,
}

/// Unidad de trabajo que ejecutan los workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkPayload {
    /// Cuenta de 1 a `until` (un paso por tick)
    Count { until: u32 },
}

impl fmt::Display for WorkPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkPayload::Count { until } => write!(f, "count(until={})", until),
        }
    }
}

/// Mensaje que viaja por el broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task_id: TaskId,
    pub payload: WorkPayload,
    /// Si está presente, el broker no entrega la tarea antes de este instante
    pub eta: Option<DateTime<Utc>>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    /// ¿Puede entregarse a un worker en `now`?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.eta.map_or(true, |eta| eta <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_se_serializa_en_mayusculas() {
        let json = serde_json::to_string(&TaskStatus::Success).unwrap();
        assert_eq!(json, "\"SUCCESS\"");
        let back: TaskStatus = serde_json::from_str("\"FAILURE\"").unwrap();
        assert_eq!(back, TaskStatus::Failure);
        assert!(back.is_terminal());
        assert!(!TaskStatus::Started.is_terminal());
    }

    #[test]
    fn payload_usa_tag_kind() {
        let json = serde_json::to_value(WorkPayload::Count { until: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "count", "until": 3}));
    }

    #[test]
    fn tarea_sin_eta_siempre_esta_lista() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let mut t = QueuedTask {
            task_id: "t1".into(),
            payload: WorkPayload::Count { until: 1 },
            eta: None,
            enqueued_at: now,
        };
        assert!(t.is_due(now));

        t.eta = Some(now + chrono::Duration::seconds(5));
        assert!(!t.is_due(now));
        assert!(t.is_due(now + chrono::Duration::seconds(5)));
    }
}
