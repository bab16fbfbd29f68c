use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use common::{
    due, query, ErrorBody, SubmitResponse, TaskAssignmentRequest, TaskAssignmentResponse,
    TaskCompleteRequest, TaskCompleteResponse, TaskDetail, TaskError, TaskListResponse,
    TaskListing, TaskRecord, TaskStatus, WorkPayload, WorkerHeartbeatRequest,
    WorkerHeartbeatResponse, WorkerId, WorkerMetrics, WorkerRegisterRequest,
    WorkerRegisterResponse,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::SystemTime;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::state::{lock, AppState, InFlight, WorkerMeta};

pub const NO_TASKS_INFO: &str = "No tasks has been issued so far.";
pub const NOT_FOUND_INFO: &str = "That id can't be found.";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // API pública
        .route("/api/task", get(list_tasks).post(submit_task))
        .route("/api/task/:id", get(get_task))
        .route("/api/schedule/:run_at", post(schedule_task))
        // protocolo master <-> worker
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/register", post(register_worker))
        .route("/api/v1/workers/heartbeat", post(worker_heartbeat))
        .route("/api/v1/tasks/next", post(assign_task))
        .route("/api/v1/tasks/complete", post(complete_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- errores -> HTTP ---------------- */

pub struct ApiError(pub TaskError);

impl From<TaskError> for ApiError {
    fn from(e: TaskError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TaskError::InvalidDateSpec(_) => StatusCode::BAD_REQUEST,
            TaskError::NotFound(_) => {
                return (StatusCode::NOT_FOUND, Json(json!({ "info": NOT_FOUND_INFO })))
                    .into_response();
            }
            TaskError::DispatchUnavailable(_) | TaskError::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            TaskError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            warn!("{}", self.0);
        }

        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct WorkParams {
    pub until: Option<u32>,
}

impl WorkParams {
    fn payload(&self, state: &AppState) -> WorkPayload {
        WorkPayload::Count {
            until: self.until.unwrap_or(state.settings.default_counter),
        }
    }
}

// Encola una tarea para ejecutarse ya
async fn submit_task(
    State(state): State<AppState>,
    Query(params): Query<WorkParams>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let task_id = state.dispatcher.submit(params.payload(&state))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id,
            status: "Your task is been processed.".to_string(),
            due: None,
        }),
    ))
}

// Programa una tarea para una fecha/hora parcial (YYYY-MM-DD-HH-mm-ss, leída de derecha a izquierda)
async fn schedule_task(
    State(state): State<AppState>,
    Path(run_at): Path<String>,
    Query(params): Query<WorkParams>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let tz = state.settings.timezone;
    let naive = due::resolve(&run_at, tz)?;
    let due_at = due::localize(naive, tz)?;

    let task_id = state.dispatcher.schedule(params.payload(&state), due_at)?;
    let due_str = naive.format("%Y-%m-%d %H:%M:%S").to_string();

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id,
            status: format!("Your task is scheduled to be processed at {}", due_str),
            due: Some(due_str),
        }),
    ))
}

// Lista las tareas procesadas, la más reciente primero
async fn list_tasks(State(state): State<AppState>) -> Result<Json<TaskListResponse>, ApiError> {
    let listing = query::list_tasks(&state.records, state.settings.timezone)?;

    let body = match listing {
        TaskListing::Tasks(tasks) => TaskListResponse::Tasks { tasks },
        TaskListing::NoTasks => TaskListResponse::Info {
            info: NO_TASKS_INFO.to_string(),
        },
    };
    Ok(Json(body))
}

// Detalle de una tarea por id
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskDetail>, ApiError> {
    Ok(Json(query::get_task(&state.records, &id)?))
}

/* ---------------- backend de ejecución ---------------- */

// Registra un worker nuevo
async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRegisterRequest>,
) -> Result<Json<WorkerRegisterResponse>, ApiError> {
    let worker_id = uuid::Uuid::new_v4().to_string();

    {
        let mut workers = lock(&state.workers, "workers")?;
        workers.insert(
            worker_id.clone(),
            WorkerMeta {
                hostname: req.hostname,
                last_heartbeat: SystemTime::now(),
                dead: false,
                max_concurrency: req.max_concurrency.max(1),

                tasks_started: 0,
                tasks_succeeded: 0,
                tasks_failed: 0,
                total_task_time_ms: 0,

                last_cpu_percent: None,
                last_mem_bytes: None,
            },
        );
    }

    info!(
        "worker registrado: {} (max_concurrency={})",
        worker_id, req.max_concurrency
    );
    Ok(Json(WorkerRegisterResponse { worker_id }))
}

// Heartbeat de worker
async fn worker_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<WorkerHeartbeatRequest>,
) -> Result<Json<WorkerHeartbeatResponse>, StatusCode> {
    let mut workers =
        lock(&state.workers, "workers").map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if let Some(meta) = workers.get_mut(&req.worker_id) {
        // un worker marcado muerto que vuelve a latir recupera su lugar;
        // las tareas que tenía ya quedaron cerradas como FAILURE
        if meta.dead {
            info!("worker {} volvió a dar señales, se reactiva", req.worker_id);
            meta.dead = false;
        }
        meta.last_heartbeat = SystemTime::now();
        meta.last_cpu_percent = Some(req.cpu_percent);
        meta.last_mem_bytes = Some(req.mem_bytes);
        Ok(Json(WorkerHeartbeatResponse { ok: true }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

// Entrega la siguiente tarea vencida (si hay y el worker tiene capacidad)
async fn assign_task(
    State(state): State<AppState>,
    Json(req): Json<TaskAssignmentRequest>,
) -> Result<Json<TaskAssignmentResponse>, ApiError> {
    // 1) Cuántas tareas tiene ya este worker en vuelo
    let active_for_worker = {
        let in_flight = lock(&state.in_flight, "in_flight")?;
        in_flight
            .values()
            .filter(|entry| entry.worker_id == req.worker_id)
            .count() as u32
    };

    // 2) Capacidad del worker; los desconocidos o muertos no reciben nada
    let max_for_worker = {
        let workers = lock(&state.workers, "workers")?;
        match workers.get(&req.worker_id) {
            Some(meta) if !meta.dead => meta.max_concurrency,
            _ => {
                warn!("worker {} desconocido o muerto pidió tarea", req.worker_id);
                return Ok(Json(TaskAssignmentResponse { task: None }));
            }
        }
    };

    if active_for_worker >= max_for_worker {
        info!(
            "worker {} pidió tarea pero ya tiene {}/{} en vuelo",
            req.worker_id, active_for_worker, max_for_worker
        );
        return Ok(Json(TaskAssignmentResponse { task: None }));
    }

    // 3) Sacar la siguiente tarea vencida del broker
    let task_opt = state.broker.take_due(Utc::now())?;

    if let Some(ref t) = task_opt {
        info!(
            "asignando tarea {} ({}) al worker {} ({}/{} en vuelo -> +1)",
            t.task_id, t.payload, req.worker_id, active_for_worker, max_for_worker,
        );

        {
            let mut in_flight = lock(&state.in_flight, "in_flight")?;
            in_flight.insert(
                t.task_id.clone(),
                InFlight {
                    task: t.clone(),
                    worker_id: req.worker_id.clone(),
                    started_at: SystemTime::now(),
                },
            );
        }

        {
            let mut workers = lock(&state.workers, "workers")?;
            if let Some(meta) = workers.get_mut(&req.worker_id) {
                meta.tasks_started += 1;
            }
        }
    } else {
        debug!(
            "worker {} pidió tarea pero no hay ninguna vencida ({} en cola)",
            req.worker_id,
            state.broker.len()
        );
    }

    Ok(Json(TaskAssignmentResponse { task: task_opt }))
}

// Worker reporta que terminó una tarea: se escribe el registro terminal
async fn complete_task(
    State(state): State<AppState>,
    Json(req): Json<TaskCompleteRequest>,
) -> Result<Json<TaskCompleteResponse>, ApiError> {
    // la entrada en vuelo se retira solo si el registro quedó escrito:
    // si el store falla, el worker puede reintentar el mismo complete
    let inflight = {
        let in_flight = lock(&state.in_flight, "in_flight")?;
        in_flight.get(&req.task_id).cloned()
    }
    .ok_or_else(|| TaskError::NotFound(req.task_id.clone()))?;

    let status = if req.success {
        TaskStatus::Success
    } else {
        TaskStatus::Failure
    };

    state.records.put(&TaskRecord {
        task_id: req.task_id.clone(),
        status,
        date_done: Utc::now(),
        result: req.result,
    })?;

    if lock(&state.in_flight, "in_flight")?
        .remove(&req.task_id)
        .is_none()
    {
        // el monitor la cerró mientras escribíamos; el registro del worker gana
        debug!("tarea {} ya no estaba en vuelo al completarla", req.task_id);
        return Ok(Json(TaskCompleteResponse { ok: true }));
    }

    let duration_ms: u64 = inflight
        .started_at
        .elapsed()
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    {
        let mut workers = lock(&state.workers, "workers")?;
        if let Some(meta) = workers.get_mut(&inflight.worker_id) {
            meta.total_task_time_ms += duration_ms;
            if req.success {
                meta.tasks_succeeded += 1;
            } else {
                meta.tasks_failed += 1;
            }
        }
    }

    info!(
        "tarea {} terminada por worker {} con estado {} en {} ms",
        req.task_id, inflight.worker_id, status, duration_ms
    );

    Ok(Json(TaskCompleteResponse { ok: true }))
}

async fn list_workers(State(state): State<AppState>) -> Result<Json<Vec<WorkerMetrics>>, ApiError> {
    let now = SystemTime::now();

    // Contar tareas activas por worker (desde in_flight)
    let mut active_by_worker: HashMap<WorkerId, u32> = HashMap::new();
    {
        let in_flight = lock(&state.in_flight, "in_flight")?;
        for inf in in_flight.values() {
            *active_by_worker.entry(inf.worker_id.clone()).or_insert(0) += 1;
        }
    }

    let workers = lock(&state.workers, "workers")?;
    let mut out = Vec::new();

    for (wid, meta) in workers.iter() {
        let age_secs = now
            .duration_since(meta.last_heartbeat)
            .unwrap_or_default()
            .as_secs();

        let finished = meta.tasks_succeeded + meta.tasks_failed;
        let avg_ms = if finished > 0 {
            Some(meta.total_task_time_ms as f64 / finished as f64)
        } else {
            None
        };

        out.push(WorkerMetrics {
            worker_id: wid.clone(),
            hostname: meta.hostname.clone(),
            dead: meta.dead,
            max_concurrency: meta.max_concurrency,
            last_heartbeat_secs_ago: age_secs,
            active_tasks: active_by_worker.get(wid).copied().unwrap_or(0),
            tasks_started: meta.tasks_started,
            tasks_succeeded: meta.tasks_succeeded,
            tasks_failed: meta.tasks_failed,
            avg_task_ms: avg_ms,
            cpu_percent: meta.last_cpu_percent,
            mem_bytes: meta.last_mem_bytes,
        });
    }

    out.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
    Ok(Json(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use crate::monitor::sweep_once;
    use crate::test_support::FlakyKv;
    use crate::WORKER_DEAD_TIMEOUT;
    use common::{MemoryKv, Settings};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(Settings::default(), Arc::new(MemoryKv::new()))
    }

    fn flaky_state() -> (AppState, Arc<FlakyKv>) {
        let kv = Arc::new(FlakyKv::default());
        (AppState::new(Settings::default(), kv.clone()), kv)
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(v) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&v).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = build_router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn register(state: &AppState, max: u32) -> String {
        let (_, body) = call(
            state,
            "POST",
            "/api/v1/workers/register",
            Some(json!({"hostname": "test", "max_concurrency": max})),
        )
        .await;
        body["worker_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_ok() {
        let state = test_state();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = build_router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn listado_vacio_devuelve_info() {
        let state = test_state();
        let (status, body) = call(&state, "GET", "/api/task", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"info": NO_TASKS_INFO}));
    }

    #[tokio::test]
    async fn id_desconocido_es_404_con_info() {
        let state = test_state();
        let (status, body) = call(&state, "GET", "/api/task/no-existe", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"info": NOT_FOUND_INFO}));
    }

    #[tokio::test]
    async fn submit_worker_complete_y_consulta() {
        let state = test_state();

        let (status, body) = call(&state, "POST", "/api/task?until=2", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let task_id = body["task_id"].as_str().unwrap().to_string();

        // el worker toma la tarea
        let worker_id = register(&state, 1).await;
        let (_, body) = call(
            &state,
            "POST",
            "/api/v1/tasks/next",
            Some(json!({"worker_id": worker_id})),
        )
        .await;
        assert_eq!(body["task"]["task_id"], json!(task_id));
        assert_eq!(body["task"]["payload"], json!({"kind": "count", "until": 2}));

        // mientras está en vuelo no hay registro
        let (status, _) = call(&state, "GET", &format!("/api/task/{}", task_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/tasks/complete",
            Some(json!({"task_id": task_id, "success": true, "result": "Counting completed!"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&state, "GET", &format!("/api/task/{}", task_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(task_id));
        assert_eq!(body["status"], json!("SUCCESS"));
        assert_eq!(body["result"], json!("Counting completed!"));

        let (_, body) = call(&state, "GET", "/api/task", None).await;
        assert_eq!(body["tasks"][0]["id"], json!(task_id));
        assert!(body["tasks"][0]["date"].is_string());
    }

    #[tokio::test]
    async fn schedule_futuro_no_se_entrega_todavia() {
        let state = test_state();
        let (status, body) = call(&state, "POST", "/api/schedule/2099-01-01-00-00-00", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["due"], json!("2099-01-01 00:00:00"));
        assert_eq!(
            body["status"],
            json!("Your task is scheduled to be processed at 2099-01-01 00:00:00")
        );

        let worker_id = register(&state, 1).await;
        let (_, body) = call(
            &state,
            "POST",
            "/api/v1/tasks/next",
            Some(json!({"worker_id": worker_id})),
        )
        .await;
        assert!(body["task"].is_null());
        assert_eq!(state.broker.len(), 1);
    }

    #[tokio::test]
    async fn schedule_en_el_pasado_se_entrega_ya() {
        let state = test_state();
        let (status, _) = call(&state, "POST", "/api/schedule/2000-01-01-00-00-00", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let worker_id = register(&state, 1).await;
        let (_, body) = call(
            &state,
            "POST",
            "/api/v1/tasks/next",
            Some(json!({"worker_id": worker_id})),
        )
        .await;
        assert!(body["task"]["task_id"].is_string());
    }

    #[tokio::test]
    async fn due_spec_invalido_es_400() {
        let state = test_state();
        let (status, body) = call(&state, "POST", "/api/schedule/2024-02-31-15-10-59", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("InvalidDateSpec"));
        assert_eq!(body["retryable"], json!(false));
        assert_eq!(state.broker.len(), 0);
    }

    #[tokio::test]
    async fn broker_cerrado_es_503_reintentable() {
        let state = test_state();
        state.broker.close();
        let (status, body) = call(&state, "POST", "/api/task", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], json!("DispatchUnavailable"));
        assert_eq!(body["retryable"], json!(true));
    }

    #[tokio::test]
    async fn worker_respeta_su_concurrencia() {
        let state = test_state();
        call(&state, "POST", "/api/task", None).await;
        call(&state, "POST", "/api/task", None).await;

        let worker_id = register(&state, 1).await;
        let next = Some(json!({"worker_id": worker_id}));

        let (_, first) = call(&state, "POST", "/api/v1/tasks/next", next.clone()).await;
        assert!(first["task"].is_object());
        let (_, second) = call(&state, "POST", "/api/v1/tasks/next", next).await;
        assert!(second["task"].is_null());
    }

    #[tokio::test]
    async fn complete_de_tarea_desconocida_es_404() {
        let state = test_state();
        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/tasks/complete",
            Some(json!({"task_id": "x", "success": true, "result": null})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn heartbeat_actualiza_metricas() {
        let state = test_state();
        let worker_id = register(&state, 2).await;

        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/workers/heartbeat",
            Some(json!({"worker_id": worker_id, "cpu_percent": 12.5, "mem_bytes": 1024})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&state, "GET", "/api/v1/workers", None).await;
        assert_eq!(body[0]["worker_id"], json!(worker_id));
        assert_eq!(body[0]["cpu_percent"], json!(12.5));
        assert_eq!(body[0]["mem_bytes"], json!(1024));
        assert_eq!(body[0]["max_concurrency"], json!(2));

        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/workers/heartbeat",
            Some(json!({"worker_id": "fantasma", "cpu_percent": 0.0, "mem_bytes": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn complete_con_store_caido_conserva_la_tarea_y_admite_reintento() {
        let (state, kv) = flaky_state();
        call(&state, "POST", "/api/task?until=1", None).await;
        let worker_id = register(&state, 1).await;
        let (_, body) = call(
            &state,
            "POST",
            "/api/v1/tasks/next",
            Some(json!({"worker_id": worker_id})),
        )
        .await;
        let task_id = body["task"]["task_id"].as_str().unwrap().to_string();
        let complete = json!({"task_id": task_id, "success": true, "result": "Counting completed!"});

        kv.fail_writes(true);
        let (status, body) =
            call(&state, "POST", "/api/v1/tasks/complete", Some(complete.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["retryable"], json!(true));
        // sigue en vuelo y sin métricas contadas
        assert!(state.in_flight.lock().unwrap().contains_key(&task_id));
        assert_eq!(state.workers.lock().unwrap()[&worker_id].tasks_succeeded, 0);

        kv.fail_writes(false);
        let (status, _) = call(&state, "POST", "/api/v1/tasks/complete", Some(complete.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.in_flight.lock().unwrap().is_empty());
        assert_eq!(state.workers.lock().unwrap()[&worker_id].tasks_succeeded, 1);

        let (_, body) = call(&state, "GET", &format!("/api/task/{}", task_id), None).await;
        assert_eq!(body["status"], json!("SUCCESS"));

        // un tercer complete ya no encuentra la tarea en vuelo
        let (status, _) = call(&state, "POST", "/api/v1/tasks/complete", Some(complete)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listado_con_store_caido_es_503_reintentable() {
        let (state, kv) = flaky_state();
        call(&state, "POST", "/api/task", None).await;
        let worker_id = register(&state, 1).await;
        let (_, body) = call(
            &state,
            "POST",
            "/api/v1/tasks/next",
            Some(json!({"worker_id": worker_id})),
        )
        .await;
        let task_id = body["task"]["task_id"].as_str().unwrap().to_string();
        call(
            &state,
            "POST",
            "/api/v1/tasks/complete",
            Some(json!({"task_id": task_id, "success": true, "result": null})),
        )
        .await;

        kv.fail_reads(true);
        let (status, body) = call(&state, "GET", "/api/task", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], json!("StoreUnavailable"));
        assert_eq!(body["retryable"], json!(true));

        let (status, _) = call(&state, "GET", &format!("/api/task/{}", task_id), None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn worker_marcado_muerto_revive_con_un_heartbeat() {
        let state = test_state();
        let worker_id = register(&state, 1).await;

        // sin heartbeat más allá del timeout: el monitor lo marca muerto
        state.workers.lock().unwrap().get_mut(&worker_id).unwrap().last_heartbeat =
            SystemTime::now() - WORKER_DEAD_TIMEOUT - Duration::from_secs(5);
        sweep_once(&state, SystemTime::now()).unwrap();
        assert!(state.workers.lock().unwrap()[&worker_id].dead);

        call(&state, "POST", "/api/task", None).await;
        let next = Some(json!({"worker_id": worker_id}));
        let (_, body) = call(&state, "POST", "/api/v1/tasks/next", next.clone()).await;
        assert!(body["task"].is_null());

        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/workers/heartbeat",
            Some(json!({"worker_id": worker_id, "cpu_percent": 1.0, "mem_bytes": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.workers.lock().unwrap()[&worker_id].dead);

        let (_, body) = call(&state, "POST", "/api/v1/tasks/next", next).await;
        assert!(body["task"]["task_id"].is_string());
    }

    #[tokio::test]
    async fn error_interno_es_500_no_reintentable() {
        let resp = ApiError(TaskError::Internal("lock workers envenenado".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], json!("Internal"));
        assert_eq!(body["retryable"], json!(false));
    }
}
