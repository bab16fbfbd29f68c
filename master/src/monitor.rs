use crate::state::{lock, AppState, InFlight};
use crate::{MONITOR_SWEEP_INTERVAL, WORKER_DEAD_TIMEOUT};
use chrono::Utc;
use common::{TaskError, TaskRecord, TaskStatus};
use serde_json::json;
use std::{collections::HashSet, time::SystemTime};
use tracing::{info, warn};

/// Loop de fondo: detecta workers sin heartbeat y cierra sus tareas.
pub async fn monitor_workers(state: AppState) {
    loop {
        tokio::time::sleep(MONITOR_SWEEP_INTERVAL).await;

        if let Err(e) = sweep_once(&state, SystemTime::now()) {
            warn!("error en sweep de workers: {}", e);
        }
    }
}

/// Una pasada:
/// 1. marca como muertos los workers sin heartbeat hace más de WORKER_DEAD_TIMEOUT
/// 2. escribe un registro FAILURE para cada tarea en vuelo de un worker muerto
///    (no hay reintentos)
/// 3. la saca de in_flight solo después de escribir el registro; si el store
///    falla, la tarea queda para la próxima pasada
///
/// Devuelve cuántas tareas se cerraron.
pub fn sweep_once(state: &AppState, now: SystemTime) -> Result<usize, TaskError> {
    let dead_workers: HashSet<String> = {
        let mut workers = lock(&state.workers, "workers")?;
        for (id, meta) in workers.iter_mut() {
            if meta.dead {
                continue;
            }
            // last_heartbeat en el futuro => lo ignoramos
            if let Ok(elapsed) = now.duration_since(meta.last_heartbeat) {
                if elapsed > WORKER_DEAD_TIMEOUT {
                    meta.dead = true;
                    warn!(
                        "marcando worker {} como muerto (sin heartbeat hace {:?})",
                        id, elapsed
                    );
                }
            }
        }
        workers
            .iter()
            .filter(|(_, meta)| meta.dead)
            .map(|(id, _)| id.clone())
            .collect()
    };

    if dead_workers.is_empty() {
        return Ok(0);
    }

    let lost: Vec<InFlight> = {
        let in_flight = lock(&state.in_flight, "in_flight")?;
        in_flight
            .values()
            .filter(|inflight| dead_workers.contains(&inflight.worker_id))
            .cloned()
            .collect()
    };

    let mut closed = 0;
    for inflight in &lost {
        info!(
            "tarea {} perdida con el worker {}, marcando FAILURE",
            inflight.task.task_id, inflight.worker_id
        );
        state.records.put(&TaskRecord {
            task_id: inflight.task.task_id.clone(),
            status: TaskStatus::Failure,
            date_done: Utc::now(),
            result: json!({ "error": "worker lost", "worker_id": inflight.worker_id }),
        })?;

        lock(&state.in_flight, "in_flight")?.remove(&inflight.task.task_id);
        closed += 1;
    }

    Ok(closed)
}
