use anyhow::Result;
use common::{
    counter, TaskAssignmentRequest, TaskAssignmentResponse, TaskCompleteRequest,
    WorkPayload, WorkerHeartbeatRequest, WorkerRegisterRequest, WorkerRegisterResponse,
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::{env, sync::Arc, time::Duration};
use sysinfo::{CpuExt, System, SystemExt};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{info, warn};

const DEFAULT_WORKER_CONCURRENCY: u32 = 2;
const DEFAULT_COUNT_TICK_MS: u64 = 1000;
const COMPLETE_ATTEMPTS: u32 = 5;
const COMPLETE_BACKOFF: Duration = Duration::from_millis(500);

/// Obtiene la URL base del master.
/// - En Docker: MASTER_URL=http://master:8080
/// - Si no está definida, usa http://localhost:8080 (para pruebas locales)
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Ejecuta la unidad de trabajo. Devuelve (success, result).
pub fn execute(payload: &WorkPayload, tick: Duration) -> (bool, Value) {
    match payload {
        WorkPayload::Count { until } => (true, json!(counter::count(*until, tick))),
    }
}

/// Registra el worker en el master y devuelve el id asignado.
async fn register(
    client: &Client,
    base_url: &str,
    hostname: &str,
    max_concurrency: u32,
) -> Result<String> {
    let register_url = format!("{}/api/v1/workers/register", base_url);
    let res = client
        .post(&register_url)
        .json(&WorkerRegisterRequest {
            hostname: hostname.to_string(),
            max_concurrency,
        })
        .send()
        .await?
        .error_for_status()?;
    let WorkerRegisterResponse { worker_id } = res.json().await?;
    Ok(worker_id)
}

/// Reporta el fin de una tarea, reintentando con backoff mientras el master
/// no confirme. Un 404 es definitivo: la tarea ya no está en vuelo (p.ej. el
/// monitor la cerró) y reintentar no cambia nada.
pub async fn report_completion(
    client: &Client,
    base_url: &str,
    req: &TaskCompleteRequest,
    backoff: Duration,
) -> bool {
    let complete_url = format!("{}/api/v1/tasks/complete", base_url);
    let mut delay = backoff;

    for attempt in 1..=COMPLETE_ATTEMPTS {
        match client.post(&complete_url).json(req).send().await {
            Ok(resp) if resp.status().is_success() => return true,
            Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                warn!("el master ya no tiene la tarea {} en vuelo", req.task_id);
                return false;
            }
            Ok(resp) => warn!(
                "complete de {} respondió {} (intento {}/{})",
                req.task_id,
                resp.status(),
                attempt,
                COMPLETE_ATTEMPTS
            ),
            Err(e) => warn!(
                "no se pudo reportar la tarea {} (intento {}/{}): {}",
                req.task_id, attempt, COMPLETE_ATTEMPTS, e
            ),
        }

        if attempt < COMPLETE_ATTEMPTS {
            sleep(delay).await;
            delay *= 2;
        }
    }

    warn!("se abandona el reporte de la tarea {}", req.task_id);
    false
}

/// Loop principal del worker.
/// - Se registra en el master.
/// - Hace heartbeats periódicos con CPU/MEM.
/// - Pide tareas mientras tenga "slots" libres.
/// - Ejecuta cada tarea en paralelo (hasta WORKER_CONCURRENCY).
pub async fn run() -> Result<()> {
    let base_url = master_base_url();
    let client = Client::new();

    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let max_concurrency: u32 = env_or("WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY).max(1);
    let tick = Duration::from_millis(env_or("COUNT_TICK_MS", DEFAULT_COUNT_TICK_MS));

    // Registro de worker (enviando max_concurrency)
    let mut worker_id = register(&client, &base_url, &hostname, max_concurrency).await?;

    info!(
        "worker {} registrado con concurrency={} contra {}",
        worker_id, max_concurrency, base_url
    );

    let sem = Arc::new(Semaphore::new(max_concurrency as usize));

    // System para leer CPU y memoria
    let mut sys = System::new_all();

    loop {
        // --------- Heartbeat al master con CPU/MEM ---------
        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu_percent = sys.global_cpu_info().cpu_usage();
        // used_memory devuelve bytes en sysinfo 0.29
        let mem_bytes = sys.used_memory();

        let hb_url = format!("{}/api/v1/workers/heartbeat", base_url);
        match client
            .post(&hb_url)
            .json(&WorkerHeartbeatRequest {
                worker_id: worker_id.clone(),
                cpu_percent,
                mem_bytes,
            })
            .send()
            .await
        {
            // el master no nos conoce (se reinició): volver a registrarse
            Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                warn!("el master no reconoce al worker {}, re-registrando", worker_id);
                match register(&client, &base_url, &hostname, max_concurrency).await {
                    Ok(id) => {
                        info!("worker re-registrado como {}", id);
                        worker_id = id;
                    }
                    Err(e) => warn!("re-registro falló: {}", e),
                }
            }
            Ok(resp) if !resp.status().is_success() => {
                warn!("heartbeat respondió {}", resp.status());
            }
            Ok(_) => {}
            Err(e) => warn!("heartbeat falló: {}", e),
        }

        // --------- Control de concurrencia local ---------
        let permit = match sem.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                sleep(Duration::from_millis(500)).await;
                continue;
            }
        };

        // Pedimos tarea al master; si no responde, esperamos y seguimos
        let assign_url = format!("{}/api/v1/tasks/next", base_url);
        let assignment: TaskAssignmentResponse = match client
            .post(&assign_url)
            .json(&TaskAssignmentRequest {
                worker_id: worker_id.clone(),
            })
            .send()
            .await
        {
            Ok(resp) => match resp.json().await {
                Ok(a) => a,
                Err(e) => {
                    warn!("respuesta inválida del master: {}", e);
                    drop(permit);
                    sleep(Duration::from_secs(2)).await;
                    continue;
                }
            },
            Err(e) => {
                warn!("master no disponible: {}", e);
                drop(permit);
                sleep(Duration::from_secs(2)).await;
                continue;
            }
        };

        if let Some(task) = assignment.task {
            info!("tengo tarea {} ({})", task.task_id, task.payload);

            let client_cloned = client.clone();
            let base_url_cloned = base_url.clone();

            tokio::spawn(async move {
                let payload = task.payload.clone();
                let handle = tokio::task::spawn_blocking(move || execute(&payload, tick));

                let (success, result) = match handle.await {
                    Ok(outcome) => {
                        info!("terminé tarea {} correctamente", task.task_id);
                        outcome
                    }
                    Err(e) => {
                        warn!("panic o join error en tarea {}: {:?}", task.task_id, e);
                        (false, json!({ "error": e.to_string() }))
                    }
                };

                // Reportar al master que terminamos
                let req = TaskCompleteRequest {
                    task_id: task.task_id.clone(),
                    success,
                    result,
                };
                report_completion(&client_cloned, &base_url_cloned, &req, COMPLETE_BACKOFF).await;

                // Liberar el "slot" de concurrencia al terminar
                drop(permit);
            });
        } else {
            // No hay tarea: devolvemos el permiso y dormimos
            drop(permit);
            sleep(Duration::from_secs(1)).await;
        }
    }
}
