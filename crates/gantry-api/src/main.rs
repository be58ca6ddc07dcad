//! Gantry API server

use anyhow::Context;
use clap::Parser;
use gantry_api::{AppState, routes};
use gantry_config::{StaticRegistry, load_config};
use gantry_db::{JobStore, MemoryJobStore, PgJobStore, create_pool, run_migrations};
use gantry_executor::ShellRunner;
use gantry_notify::{ConfiguredNotifiers, Dispatcher};
use gantry_scheduler::{PoolConfig, WorkerPool};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gantry-server")]
#[command(about = "Gantry CI server", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, env = "GANTRY_CONFIG", default_value = "gantry.kdl")]
    config: PathBuf,

    /// Address to listen on, overrides the config file
    #[arg(long, env = "GANTRY_LISTEN")]
    listen: Option<String>,

    /// PostgreSQL connection string, overrides the config file
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "GANTRY_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = load_config(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let server = config.server;
    let listen = args.listen.unwrap_or(server.listen);
    info!(
        config = %args.config.display(),
        repositories = config.repositories.len(),
        "Configuration loaded"
    );

    let store: Arc<dyn JobStore> = match args.database_url.or(server.database_url) {
        Some(database_url) => {
            info!("Connecting to database...");
            let pool = create_pool(&database_url)
                .await
                .context("failed to connect to database")?;
            run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            info!("Database connected");
            Arc::new(PgJobStore::new(pool))
        }
        None => {
            warn!("No database configured, jobs are kept in memory");
            Arc::new(MemoryJobStore::new())
        }
    };

    let notifiers =
        ConfiguredNotifiers::new(config.chat).context("failed to build notification client")?;
    let dispatcher = Dispatcher::new(server.url.clone(), Arc::new(notifiers));
    let pool = WorkerPool::start(
        PoolConfig {
            workers: server.workers,
            queue_capacity: server.queue_capacity,
            workspace: server.workspace,
            command_timeout: server.command_timeout,
        },
        Arc::new(StaticRegistry::new(config.repositories)),
        store.clone(),
        Arc::new(ShellRunner::new()),
        dispatcher,
    );

    let state = AppState::new(store, pool.admitter(), pool.canceller(), server.url);

    // Build router
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {}", listen))?;
    info!("Starting server on {}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
