use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use armada_scheduler::builder::ResourceTaskBuilder;
use armada_scheduler::bus::EventBus;
use armada_scheduler::callbacks::NoopCallbacks;
use armada_scheduler::config::SchedulerConfig;
use armada_scheduler::driver::{MockDriver, SchedulerDriver};
use armada_scheduler::engine::{EngineContext, SchedulerEngine};
use armada_scheduler::health::NoopHealthChecks;
use armada_scheduler::limiter::RateLimiter;
use armada_scheduler::queue::TaskQueue;
use armada_scheduler::repository::AppRepository;
use armada_scheduler::store::{SchedulerStore, SqliteStore};
use armada_scheduler::tracker::TaskTracker;
use armada_scheduler::update::RollingRestartHook;
use armada_scheduler::worker::ReconcileWorker;

#[tokio::main]
async fn main() -> Result<()> {
    let config = SchedulerConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    std::fs::create_dir_all(&config.data_dir)?;
    let store: Arc<dyn SchedulerStore> = Arc::new(SqliteStore::open(format!(
        "{}/scheduler.db",
        config.data_dir
    ))?);

    let tracker = Arc::new(TaskTracker::new(
        Arc::clone(&store),
        config.store_timeout,
        config.staged_task_timeout,
    ));
    let recovered = store.load_tasks().await?;
    if !recovered.is_empty() {
        info!(task_count = recovered.len(), "Recovered task records");
    }
    tracker.hydrate(recovered).await;

    let engine = Arc::new(SchedulerEngine::new(
        config.clone(),
        EngineContext {
            tracker,
            queue: Arc::new(TaskQueue::new()),
            repository: Arc::new(AppRepository::new(Arc::clone(&store), config.store_timeout)),
            builder: Arc::new(ResourceTaskBuilder::new()),
            limiter: Arc::new(RateLimiter::new()),
            bus: EventBus::default(),
            health: Arc::new(NoopHealthChecks),
            callbacks: Arc::new(NoopCallbacks),
            update_hook: Arc::new(RollingRestartHook::from_config(&config)),
            store: Arc::clone(&store),
        },
    ));

    // Stand-in driver until a master binding is attached.
    let driver: Arc<dyn SchedulerDriver> = Arc::new(MockDriver::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ReconcileWorker::new(
        Arc::clone(&engine),
        Arc::clone(&driver),
        config.reconcile_interval,
    );
    let worker_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    info!("Scheduler running");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;

    Ok(())
}
