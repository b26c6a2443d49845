//! tickerd-web entry point.
//!
//! Wires the in-memory task store, the worker pool, and the HTTP surface
//! together. All knobs come from environment variables; see `Settings`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use tickerd_core::envfile::EnvStore;
use tickerd_core::store::{Limits, TaskStore};
use tickerd_core::worker::{WorkerGroup, WorkerSettings};
use tickerd_web::routes::router;
use tickerd_web::runner::CommandRunner;
use tickerd_web::state::AppState;

#[derive(Debug)]
struct Settings {
    host: String,
    port: u16,
    analyze_cmd: String,
    workers: usize,
    limits: Limits,
    task_timeout: Option<Duration>,
    env_file: String,
}

impl Settings {
    fn from_env() -> Result<Self, String> {
        let defaults = Limits::default();
        Ok(Self {
            host: env_or("WEB_HOST", "127.0.0.1"),
            port: env_parse("WEB_PORT", 8000)?,
            analyze_cmd: std::env::var("ANALYZE_CMD")
                .map_err(|_| "ANALYZE_CMD must be set to the analysis command line".to_string())?,
            workers: env_parse("WORKERS", 2)?,
            limits: Limits {
                max_batch: env_parse("MAX_BATCH", defaults.max_batch)?,
                max_in_flight: env_parse("MAX_IN_FLIGHT", defaults.max_in_flight)?,
                max_retained: env_parse("MAX_RETAINED", defaults.max_retained)?,
            },
            task_timeout: match std::env::var("TASK_TIMEOUT_SECS") {
                Ok(raw) => {
                    let secs: u64 = raw
                        .parse()
                        .map_err(|_| format!("TASK_TIMEOUT_SECS is not a number: {raw}"))?;
                    Some(Duration::from_secs(secs))
                }
                Err(_) => None,
            },
            env_file: env_or("ENV_FILE", ".env"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| format!("{key} is not valid: {raw}")),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let settings = Settings::from_env()?;
    let runner = CommandRunner::new(&settings.analyze_cmd)
        .ok_or("ANALYZE_CMD must not be blank")?;

    let store = Arc::new(TaskStore::new(settings.limits));
    let workers = WorkerGroup::spawn(
        WorkerSettings {
            workers: settings.workers,
            task_timeout: settings.task_timeout,
        },
        Arc::clone(&store),
        Arc::new(runner),
    );

    let state = AppState::new(store, EnvStore::new(&settings.env_file));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, workers = settings.workers, "tickerd-web listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("draining workers");
    workers.shutdown_and_join().await;
    Ok(())
}

async fn shutdown_signal() {
    // Errors installing the handler leave no way to shut down cleanly
    // anyway, so treat them as an immediate shutdown request.
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!("shutdown signal received");
}
