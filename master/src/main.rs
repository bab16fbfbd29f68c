mod broker;
mod handlers;
mod monitor;
mod state;
#[cfg(test)]
mod test_support;

use crate::state::{AppState, SharedKv};
use anyhow::{Context, Result};
use common::{JsonFileKv, MemoryKv, Settings};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const WORKER_DEAD_TIMEOUT: Duration = Duration::from_secs(20);
pub const MONITOR_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=debug,common=debug,axum=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env().context("configuración inválida")?;

    let kv: SharedKv = match &settings.store_path {
        Some(path) => {
            info!("usando store JSON en {}", path.display());
            Arc::new(JsonFileKv::open(path).context("no se pudo abrir el store")?)
        }
        None => {
            info!("usando store en memoria");
            Arc::new(MemoryKv::new())
        }
    };

    info!(
        "zona horaria {}, counter por defecto {}, política de vencidas {:?}",
        settings.timezone.name(), settings.default_counter, settings.past_due
    );

    let bind = settings.bind;
    let state = AppState::new(settings, kv);

    // router HTTP
    let app = handlers::build_router(state.clone());

    // monitor de heartbeats en segundo plano
    let monitor_state = state.clone();
    tokio::spawn(async move {
        monitor::monitor_workers(monitor_state).await;
    });

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", bind))?;
    info!("master escuchando en {}", listener.local_addr()?);

    let broker = state.broker.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("apagando master, el broker deja de aceptar trabajos");
            broker.close();
        })
        .await?;

    Ok(())
}
