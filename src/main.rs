//! trainer_workload - Trainer Workload Aggregation Service
//!
//! Keeps a per-trainer year/month tree of training minutes. Writes arrive
//! synchronously over HTTP or asynchronously as change-events on a queue
//! consumed by a scalable worker pool.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trainer_workload::api::{self, AppState};
use trainer_workload::config::StoreBackend;
use trainer_workload::db;
use trainer_workload::messaging::{
    DeadLetterHandler, InMemoryBroker, IngestionPipeline, MessageBroker,
};
use trainer_workload::store::{InMemoryWorkloadStore, PgWorkloadStore, WorkloadStore};
use trainer_workload::workers::{DeadLetterWorker, WorkerPool, WorkerPoolConfig};
use trainer_workload::{Config, WorkloadEngine};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "trainer_workload=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Open the configured aggregate store
async fn open_store(config: &Config) -> anyhow::Result<(Arc<dyn WorkloadStore>, Option<PgPool>)> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on shutdown");
            Ok((Arc::new(InMemoryWorkloadStore::new()), None))
        }
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres store"))?;

            tracing::info!("Connecting to database...");
            let pool = db::connect(database_url, config.database_max_connections).await?;
            db::verify_connection(&pool).await?;

            if !db::check_schema(&pool).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }

            tracing::info!("Database connected successfully");
            Ok((Arc::new(PgWorkloadStore::new(pool.clone())), Some(pool)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    init_tracing(config.log_json);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(
        environment = %config.environment,
        store = ?config.store_backend,
        create_update_mode = ?config.create_update_mode,
        "Starting trainer_workload service"
    );

    let (store, pool) = open_store(&config).await?;
    let engine = WorkloadEngine::new(store);

    let broker = Arc::new(
        InMemoryBroker::new(config.redelivery.clone(), config.dead_letter_queue.clone())
            .with_visibility_timeout(config.visibility_timeout),
    );
    let broker_dyn: Arc<dyn MessageBroker> = broker.clone();

    // Background consumers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pipeline = IngestionPipeline::new(
        engine.clone(),
        broker_dyn.clone(),
        config.dead_letter_queue.clone(),
    )
    .with_mode(config.create_update_mode);

    let pool_config = WorkerPoolConfig {
        min_workers: config.listener_concurrency.min,
        max_workers: config.listener_concurrency.max,
        receive_timeout: config.receive_timeout,
        ..WorkerPoolConfig::default()
    };
    let workers = WorkerPool::with_config(
        pipeline,
        broker_dyn.clone(),
        config.ingestion_queue.clone(),
        pool_config,
    )
    .start(shutdown_rx.clone());

    let dead_letters = DeadLetterWorker::new(
        DeadLetterHandler::new(broker_dyn.clone()),
        broker_dyn.clone(),
        config.dead_letter_queue.clone(),
        config.receive_timeout,
    )
    .start(shutdown_rx);

    // HTTP server
    let app = api::build_router(AppState::new(
        engine,
        broker_dyn,
        config.ingestion_queue.clone(),
    ));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down, stopping workers...");
    shutdown_tx.send(true).ok();
    workers.join().await;
    if let Err(e) = dead_letters.await {
        tracing::error!(error = %e, "Dead-letter consumer failed");
    }

    let unsettled = broker.in_flight().unwrap_or(0);
    if unsettled > 0 {
        tracing::warn!(in_flight = unsettled, "Deliveries left unsettled at shutdown");
    }

    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
