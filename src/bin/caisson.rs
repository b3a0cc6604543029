//! Caisson control plane server.
//!
//! Usage:
//!
//! ```text
//! caisson [--config <path>]
//! ```
//!
//! Without `--config` the server starts with built-in defaults and
//! in-memory persistence. Setting `database.url` (or
//! `CAISSON_DATABASE_URL`) switches to `PostgreSQL`.

use caisson::api;
use caisson::config::{ConfigError, ControlPlaneConfig};
use caisson::logs::adapters::{LogError, LogStore};
use caisson::orchestrator::{ControlPlane, ControlPlaneParts, ControlPlaneSettings};
use caisson::runner::adapters::{HttpWorkerClient, StaticRunnerSelector};
use caisson::runner::services::WorkerRegistry;
use caisson::scan::adapters::memory::{InMemoryPolicyCatalog, InMemoryPolicyResultRepository};
use caisson::scan::adapters::postgres::{PostgresPolicyCatalog, PostgresPolicyResultRepository};
use caisson::scan::ports::{PolicyCatalog, PolicyResultRepository};
use caisson::task::adapters::access::AllowAll;
use caisson::task::adapters::memory::InMemoryTaskRepository;
use caisson::task::adapters::postgres::{PostgresTaskRepository, TaskPgPool};
use caisson::task::domain::{RunnerId, TaskDomainError};
use caisson::task::ports::TaskRepository;
use caisson::telemetry::{LogFormat, init_logging};
use caisson::vcs::{VcsProvider, VcsRegistry};
use caisson::vcs::adapters::PassthroughVcs;
use camino::Utf8PathBuf;
use clap::Parser;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::DefaultClock;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "caisson", about = "Infrastructure-as-Code execution control plane")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid runner id: {0}")]
    Runner(#[from] TaskDomainError),
    #[error("log directory is not UTF-8: {0}")]
    LogDir(PathBuf),
    #[error("failed to open log store: {0}")]
    Logs(#[from] LogError),
    #[error("failed to build database pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

struct Persistence {
    tasks: Arc<dyn TaskRepository>,
    catalog: Arc<dyn PolicyCatalog>,
    results: Arc<dyn PolicyResultRepository>,
}

fn persistence(config: &ControlPlaneConfig) -> Result<Persistence, StartupError> {
    let Some(url) = config.database.url.as_deref() else {
        info!("no database configured; using in-memory persistence");
        return Ok(Persistence {
            tasks: Arc::new(InMemoryTaskRepository::new()),
            catalog: Arc::new(InMemoryPolicyCatalog::new()),
            results: Arc::new(InMemoryPolicyResultRepository::new()),
        });
    };
    let pool: TaskPgPool = Pool::builder()
        .max_size(config.database.pool_size)
        .build(ConnectionManager::<PgConnection>::new(url))?;
    Ok(Persistence {
        tasks: Arc::new(PostgresTaskRepository::new(pool.clone())),
        catalog: Arc::new(PostgresPolicyCatalog::new(pool.clone())),
        results: Arc::new(PostgresPolicyResultRepository::new(pool)),
    })
}

fn workers(config: &ControlPlaneConfig) -> Result<WorkerRegistry, StartupError> {
    config
        .runners
        .endpoints
        .iter()
        .try_fold(WorkerRegistry::new(), |registry, endpoint| {
            let runner_id = RunnerId::new(endpoint.id.as_str())?;
            info!(runner = %endpoint.id, url = %endpoint.base_url, "registered worker");
            Ok(registry.with_worker(runner_id, Arc::new(HttpWorkerClient::new(&endpoint.base_url))))
        })
}

fn vcs() -> VcsRegistry {
    [
        VcsProvider::Gitlab,
        VcsProvider::Gitea,
        VcsProvider::Github,
        VcsProvider::Gitee,
        VcsProvider::Local,
    ]
    .into_iter()
    .fold(VcsRegistry::new(), |registry, provider| {
        registry.with_backend(provider, Arc::new(PassthroughVcs::new(provider)))
    })
}

fn build(config: &ControlPlaneConfig) -> Result<ControlPlane<DefaultClock>, StartupError> {
    let Persistence {
        tasks,
        catalog,
        results,
    } = persistence(config)?;
    let base_dir = Utf8PathBuf::from_path_buf(config.logs.base_dir.clone())
        .map_err(StartupError::LogDir)?;
    let default_runner = config
        .runners
        .default
        .as_deref()
        .map(RunnerId::new)
        .transpose()?;
    let parts = ControlPlaneParts {
        tasks,
        catalog,
        results,
        vcs: Arc::new(vcs()),
        access: Arc::new(AllowAll),
        workers: workers(config)?,
        selector: Arc::new(StaticRunnerSelector::new(default_runner)),
        logs: LogStore::open(&base_dir)?,
        clock: Arc::new(DefaultClock),
    };
    Ok(ControlPlane::new(parts, ControlPlaneSettings::from_config(config)))
}

async fn shutdown_signal(plane: ControlPlane<DefaultClock>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutting down");
    plane.shutdown();
}

async fn run(args: Args) -> Result<(), StartupError> {
    let config = args
        .config
        .as_deref()
        .map_or_else(|| ControlPlaneConfig::from_toml(""), ControlPlaneConfig::load)?;
    init_logging(config.telemetry.format);
    let plane = build(&config)?;
    let listener = tokio::net::TcpListener::bind(config.server.bind).await?;
    info!(address = %config.server.bind, "control plane listening");
    axum::serve(listener, api::router(plane.clone()))
        .with_graceful_shutdown(shutdown_signal(plane))
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            init_logging(LogFormat::default());
            error!(error = %err, "caisson failed");
            ExitCode::FAILURE
        }
    }
}
