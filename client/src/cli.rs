use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use common::{ErrorBody, SubmitResponse, TaskDetail, TaskListResponse, WorkerMetrics};
use reqwest::{Client, Response, StatusCode};
use std::env;
use tracing::debug;

/// Igual que en el worker:
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para enviar, programar y consultar tareas")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Envía una tarea para ejecutarse ya
    Submit {
        /// Hasta cuánto contar (default: COUNTER del master)
        #[arg(long)]
        until: Option<u32>,
    },
    /// Programa una tarea. Formato YYYY-MM-DD-HH-mm-ss; todos los campos son
    /// opcionales salvo los segundos (ej: "59", "15-10-59")
    Schedule {
        #[arg(value_name = "RUN_AT")]
        run_at: String,

        #[arg(long)]
        until: Option<u32>,
    },
    /// Consulta el estado y resultado de una tarea
    Status {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Lista las tareas procesadas, la más reciente primero
    List,
    /// Lista los workers y sus métricas
    Workers,
}

fn with_until(url: String, until: Option<u32>) -> String {
    match until {
        Some(n) => format!("{}?until={}", url, n),
        None => url,
    }
}

/// Convierte una respuesta de error del master en un mensaje legible.
async fn fail(resp: Response) -> Result<()> {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) if body.retryable => {
            bail!("{} ({}): {}, se puede reintentar", body.error, status, body.message)
        }
        Ok(body) => bail!("{} ({}): {}", body.error, status, body.message),
        Err(_) => bail!("el master respondió {}", status),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Submit { until } => {
            let url = with_until(format!("{}/api/task", base_url), until);
            debug!("POST {}", url);
            let resp = client.post(&url).send().await?;
            if !resp.status().is_success() {
                return fail(resp).await;
            }
            let body: SubmitResponse = resp.json().await?;
            println!("Tarea enviada:");
            println!("  id    : {}", body.task_id);
            println!("  estado: {}", body.status);
        }

        Commands::Schedule { run_at, until } => {
            let url = with_until(format!("{}/api/schedule/{}", base_url, run_at), until);
            debug!("POST {}", url);
            let resp = client.post(&url).send().await?;
            if !resp.status().is_success() {
                return fail(resp).await;
            }
            let body: SubmitResponse = resp.json().await?;
            println!("Tarea programada:");
            println!("  id    : {}", body.task_id);
            if let Some(due) = body.due {
                println!("  para  : {}", due);
            }
            println!("  estado: {}", body.status);
        }

        Commands::Status { id } => {
            let url = format!("{}/api/task/{}", base_url, id);
            let resp = client.get(&url).send().await?;
            match resp.status() {
                StatusCode::OK => {
                    let task: TaskDetail = resp.json().await?;
                    println!("Tarea:");
                    println!("  id       : {}", task.id);
                    println!("  estado   : {}", task.status);
                    println!("  resultado: {}", task.result);
                }
                StatusCode::NOT_FOUND => {
                    println!("No se encontró la tarea con id {id} (¿todavía no terminó?)");
                }
                _ => return fail(resp).await,
            }
        }

        Commands::List => {
            let url = format!("{}/api/task", base_url);
            let resp = client.get(&url).send().await?;
            if !resp.status().is_success() {
                return fail(resp).await;
            }
            match resp.json::<TaskListResponse>().await? {
                TaskListResponse::Tasks { tasks } => {
                    for t in tasks {
                        println!("{}  {:<8}  {}", t.date, t.status, t.id);
                    }
                }
                TaskListResponse::Info { info } => println!("{}", info),
            }
        }

        Commands::Workers => {
            let url = format!("{}/api/v1/workers", base_url);
            let resp = client.get(&url).send().await?;
            if !resp.status().is_success() {
                return fail(resp).await;
            }
            let workers: Vec<WorkerMetrics> = resp.json().await?;
            if workers.is_empty() {
                println!("No hay workers registrados.");
            }
            for w in workers {
                println!("Worker {}", w.worker_id);
                println!("  host           : {}", w.hostname);
                println!("  dead           : {}", w.dead);
                println!("  last_heartbeat : {} s ago", w.last_heartbeat_secs_ago);
                println!(
                    "  concurrency    : {}/{} en vuelo",
                    w.active_tasks, w.max_concurrency
                );
                println!(
                    "  tareas         : started={}, ok={}, failed={}",
                    w.tasks_started, w.tasks_succeeded, w.tasks_failed
                );
                match w.avg_task_ms {
                    Some(avg) => println!("  avg_task_ms    : {:.1}", avg),
                    None => println!("  avg_task_ms    : (sin datos)"),
                }
                match w.cpu_percent {
                    Some(cpu) => println!("  cpu_percent    : {:.1}%", cpu),
                    None => println!("  cpu_percent    : (sin datos)"),
                }
                match w.mem_bytes {
                    Some(mem) => println!("  mem_bytes      : {}", mem),
                    None => println!("  mem_bytes      : (sin datos)"),
                }
                println!();
            }
        }
    }

    Ok(())
}
