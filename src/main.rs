use relay::config::{self, Mode};
use relay::error::RelayError;
use relay::AppState;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let cfg = config::load_config()?;
    info!(mode = ?cfg.mode, listen = %cfg.listen_addr, "relay starting");

    let state = AppState::new();
    let ingress = state.ingress();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let ingestion_task = match cfg.mode {
        Mode::Live => {
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                relay::transport::run_live(&ingress, shutdown_rx).await;
            })
        }
        Mode::Replay => {
            let path = cfg
                .replay_file_path
                .clone()
                .expect("config validation guarantees REPLAY_FILE_PATH in replay mode");
            let speed = cfg.replay_speed;
            tokio::spawn(async move {
                if let Err(e) = relay::replay::run_replay(&ingress, &path, speed).await {
                    tracing::error!(error = %e, "replay task exited with an error");
                }
            })
        }
    };

    let router = relay::http::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .map_err(RelayError::Bind)?;
    info!(addr = %cfg.listen_addr, "listening for subscribers");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    ingestion_task.abort();

    persist_final_state(&state).await?;
    info!("relay shut down gracefully");
    Ok(())
}

async fn persist_final_state(state: &AppState) -> Result<(), RelayError> {
    let snapshot = state.store.snapshot().await;
    let pretty = serde_json::to_string_pretty(&snapshot).expect("snapshot always serializes");
    tokio::fs::write("final_structured_state.json", pretty)
        .await
        .map_err(RelayError::PersistState)
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received Ctrl+C, shutting down"); },
        () = terminate => { tracing::info!("received SIGTERM, shutting down"); },
    }
}
