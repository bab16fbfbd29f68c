// master/src/broker.rs

use chrono::{DateTime, Utc};
use common::{Broker, QueuedTask, TaskError};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

/// Broker en memoria con soporte de ETA.
/// Los workers piden tareas; solo se entregan las que ya vencieron,
/// la de ETA más temprana primero y FIFO entre iguales.
#[derive(Debug)]
pub struct QueueBroker {
    inner: Mutex<Pending>,
    open: AtomicBool,
}

#[derive(Debug, Default)]
struct Pending {
    next_seq: u64,
    tasks: Vec<(u64, QueuedTask)>,
}

impl QueueBroker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Pending::default()),
            open: AtomicBool::new(true),
        }
    }

    /// Deja de aceptar trabajos (p.ej. al apagar el master).
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Saca la siguiente tarea lista para ejecutarse en `now`, si hay.
    pub fn take_due(&self, now: DateTime<Utc>) -> Result<Option<QueuedTask>, TaskError> {
        let mut pending = self.lock()?;

        let next = pending
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, (_, t))| t.is_due(now))
            .min_by_key(|(_, (seq, t))| (t.eta.unwrap_or(t.enqueued_at), *seq))
            .map(|(idx, _)| idx);

        Ok(next.map(|idx| pending.tasks.remove(idx).1))
    }

    /// Tareas encoladas (listas o no).
    pub fn len(&self) -> usize {
        self.lock().map(|p| p.tasks.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Pending>, TaskError> {
        self.inner
            .lock()
            .map_err(|_| TaskError::DispatchUnavailable("lock de la cola envenenado".to_string()))
    }
}

impl Default for QueueBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker for QueueBroker {
    fn enqueue(&self, task: QueuedTask) -> Result<(), TaskError> {
        if !self.is_open() {
            return Err(TaskError::DispatchUnavailable(
                "el broker no acepta trabajos".to_string(),
            ));
        }
        let mut pending = self.lock()?;
        let seq = pending.next_seq;
        pending.next_seq += 1;
        pending.tasks.push((seq, task));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::WorkPayload;

    fn task(id: &str, enqueued_at: DateTime<Utc>, eta: Option<DateTime<Utc>>) -> QueuedTask {
        QueuedTask {
            task_id: id.to_string(),
            payload: WorkPayload::Count { until: 1 },
            eta,
            enqueued_at,
        }
    }

    #[test]
    fn entrega_fifo_sin_eta() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let b = QueueBroker::new();
        b.enqueue(task("a", now, None)).unwrap();
        b.enqueue(task("b", now, None)).unwrap();

        assert_eq!(b.take_due(now).unwrap().unwrap().task_id, "a");
        assert_eq!(b.take_due(now).unwrap().unwrap().task_id, "b");
        assert!(b.take_due(now).unwrap().is_none());
    }

    #[test]
    fn retiene_tareas_hasta_su_eta() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let b = QueueBroker::new();
        b.enqueue(task("tarde", now, Some(now + Duration::minutes(5)))).unwrap();

        assert!(b.take_due(now).unwrap().is_none());
        assert_eq!(b.len(), 1);

        let later = now + Duration::minutes(5);
        assert_eq!(b.take_due(later).unwrap().unwrap().task_id, "tarde");
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn eta_mas_temprana_primero() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let b = QueueBroker::new();
        b.enqueue(task("dos", now, Some(now - Duration::seconds(10)))).unwrap();
        b.enqueue(task("uno", now, Some(now - Duration::seconds(60)))).unwrap();

        assert_eq!(b.take_due(now).unwrap().unwrap().task_id, "uno");
        assert_eq!(b.take_due(now).unwrap().unwrap().task_id, "dos");
    }

    #[test]
    fn broker_cerrado_rechaza_enqueue() {
        let b = QueueBroker::new();
        b.close();
        let err = b.enqueue(task("x", Utc::now(), None)).unwrap_err();
        assert!(matches!(err, TaskError::DispatchUnavailable(_)));
    }
}
