//! Load Testing Tool
//!
//! Pushes change-events through the broker, worker pool and engine and
//! reports throughput.
//!
//! Run with: cargo run --bin load_test --release -- --events 10000 --trainers 50
//! Set STORE_BACKEND=postgres (plus DATABASE_URL) to measure the database store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use trainer_workload::config::{ConcurrencyRange, StoreBackend};
use trainer_workload::db;
use trainer_workload::domain::ChangeEvent;
use trainer_workload::messaging::{InMemoryBroker, IngestionPipeline, Message, MessageBroker};
use trainer_workload::retry::RetryPolicy;
use trainer_workload::store::{InMemoryWorkloadStore, PgWorkloadStore, WorkloadStore};
use trainer_workload::workers::{WorkerPool, WorkerPoolConfig};
use trainer_workload::WorkloadEngine;

const QUEUE: &str = "load.workload";
const DLQ: &str = "load.workload.dlq";

fn arg<T: std::str::FromStr>(args: &[String], name: &str, default: T) -> T {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let event_count: u64 = arg(&args, "--events", 10_000);
    let trainer_count: u64 = arg(&args, "--trainers", 50).max(1);
    let concurrency: ConcurrencyRange =
        arg(&args, "--workers", ConcurrencyRange { min: 3, max: 10 });

    let backend: StoreBackend = std::env::var("STORE_BACKEND")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(StoreBackend::Memory);

    let store: Arc<dyn WorkloadStore> = match backend {
        StoreBackend::Memory => Arc::new(InMemoryWorkloadStore::new()),
        StoreBackend::Postgres => {
            let database_url = std::env::var("DATABASE_URL")?;
            println!("Connecting to database...");
            Arc::new(PgWorkloadStore::new(db::connect(&database_url, 10).await?))
        }
    };

    println!(
        "Load Test - {} events across {} trainers, workers {}-{}, store {:?}",
        event_count, trainer_count, concurrency.min, concurrency.max, backend
    );

    let engine = WorkloadEngine::new(store).with_conflict_retry(RetryPolicy {
        max_attempts: 20,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
    });
    let broker = Arc::new(InMemoryBroker::new(RetryPolicy::default(), DLQ));
    let broker_dyn: Arc<dyn MessageBroker> = broker.clone();

    let run_id = uuid::Uuid::new_v4().simple().to_string();
    for i in 0..event_count {
        let event = ChangeEvent::create_update(
            format!("load-{}-{}", &run_id[..8], i % trainer_count),
            "Load",
            "Trainer",
            true,
            2025,
            (i % 12) as i32 + 1,
            30,
        );
        broker.publish(QUEUE, Message::json(&event)?).await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = IngestionPipeline::new(engine, broker_dyn.clone(), DLQ);
    let start = Instant::now();

    let workers = WorkerPool::with_config(
        pipeline,
        broker_dyn,
        QUEUE,
        WorkerPoolConfig {
            min_workers: concurrency.min,
            max_workers: concurrency.max,
            receive_timeout: Duration::from_millis(100),
            scale_interval: Duration::from_millis(50),
            ..WorkerPoolConfig::default()
        },
    )
    .start(shutdown_rx);

    let mut peak_workers = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        peak_workers = peak_workers.max(workers.active_workers());

        let pending = broker.pending(QUEUE).await?;
        let in_flight = broker.in_flight()? + broker.scheduled()?;
        if pending == 0 && in_flight == 0 {
            break;
        }
        println!("Remaining: {} queued, {} in flight", pending, in_flight);
    }

    let elapsed = start.elapsed();
    shutdown_tx.send(true).ok();
    workers.join().await;

    let dead_lettered = broker.pending(DLQ).await?;
    let rate = event_count as f64 / elapsed.as_secs_f64();

    println!("\n=== Load Test Results ===");
    println!("Total events: {}", event_count);
    println!("Dead-lettered: {}", dead_lettered);
    println!("Peak workers: {}", peak_workers);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Rate: {:.0} events/sec", rate);

    Ok(())
}
