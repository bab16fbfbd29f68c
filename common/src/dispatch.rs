use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::info;

use crate::error::TaskError;
use crate::task::{QueuedTask, TaskId, WorkPayload};

/// Cola del backend de ejecución. El dispatcher solo necesita encolar.
pub trait Broker: Send + Sync {
    /// Falla con `DispatchUnavailable` si el broker no acepta el trabajo.
    fn enqueue(&self, task: QueuedTask) -> Result<(), TaskError>;
}

impl<B: Broker + ?Sized> Broker for Arc<B> {
    fn enqueue(&self, task: QueuedTask) -> Result<(), TaskError> {
        (**self).enqueue(task)
    }
}

/// Qué hacer con un due time que ya pasó.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PastDuePolicy {
    /// Se encola igual; el broker la entrega en cuanto haya un slot
    #[default]
    RunNow,
    /// Se rechaza con `InvalidDateSpec`
    Reject,
}

/// Despacha unidades de trabajo: ya (`due = None`) o diferidas.
/// Una llamada = un id nuevo = exactamente un `enqueue`.
#[derive(Debug, Clone)]
pub struct Dispatcher<B> {
    broker: B,
    past_due: PastDuePolicy,
}

impl<B: Broker> Dispatcher<B> {
    pub fn new(broker: B, past_due: PastDuePolicy) -> Self {
        Self { broker, past_due }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn dispatch(
        &self,
        payload: WorkPayload,
        due: Option<DateTime<Tz>>,
    ) -> Result<TaskId, TaskError> {
        let now = Utc::now();
        let eta = due.map(|d| d.with_timezone(&Utc));

        if let Some(eta) = eta {
            if eta < now && self.past_due == PastDuePolicy::Reject {
                return Err(TaskError::InvalidDateSpec(format!(
                    "due time is in the past: {}",
                    eta.format("%Y-%m-%d %H:%M:%S UTC")
                )));
            }
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        let task = QueuedTask {
            task_id: task_id.clone(),
            payload,
            eta,
            enqueued_at: now,
        };

        let payload_desc = task.payload.to_string();
        self.broker.enqueue(task)?;

        match eta {
            Some(eta) => info!("tarea {} ({}) programada para {}", task_id, payload_desc, eta),
            None => info!("tarea {} ({}) encolada", task_id, payload_desc),
        }

        Ok(task_id)
    }

    /// Ejecutar en cuanto haya un slot libre.
    pub fn submit(&self, payload: WorkPayload) -> Result<TaskId, TaskError> {
        self.dispatch(payload, None)
    }

    /// Ejecutar no antes de `due` (ya localizado en su zona).
    pub fn schedule(&self, payload: WorkPayload, due: DateTime<Tz>) -> Result<TaskId, TaskError> {
        self.dispatch(payload, Some(due))
    }
}
