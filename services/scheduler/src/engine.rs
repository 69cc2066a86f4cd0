//! The scheduler engine.
//!
//! Callback handler for the cluster master. Owns:
//! - Offer matching and task launching
//! - Status-update handling
//! - Scaling apps toward their declared instance counts
//! - Reconciliation of tracked tasks against declared apps
//! - App lifecycle (start / stop / update)
//!
//! Three paths mutate shared per-app state concurrently: offers, status
//! updates, and admin operations. Per-app count arithmetic is serialised
//! by an app-keyed mutex; the tracker and queue are internally
//! thread-safe. Master callbacks never propagate errors — every offer is
//! answered and every failure is resolved locally.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use armada_id::{AgentId, AppId, FrameworkId, OfferId, TaskId};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::builder::TaskBuilder;
use crate::bus::{EventBus, SchedulerEvent};
use crate::callbacks::SchedulerCallbacks;
use crate::config::SchedulerConfig;
use crate::driver::SchedulerDriver;
use crate::health::HealthChecks;
use crate::limiter::RateLimiter;
use crate::model::{AppDefinition, AppUpdate, Offer, TaskRecord, TaskState, TaskStatus};
use crate::queue::TaskQueue;
use crate::repository::AppRepository;
use crate::store::{SchedulerStore, StoreError};
use crate::tracker::TaskTracker;
use crate::update::UpdateHook;

/// Errors surfaced to admin callers. Master callbacks never return these.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown app '{0}'")]
    UnknownApp(AppId),

    #[error("app '{0}' already exists")]
    AppExists(AppId),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("failed to expunge all versions of app '{0}'")]
    ExpungeIncomplete(AppId),
}

/// Collaborators wired into the engine at construction time.
pub struct EngineContext {
    pub tracker: Arc<TaskTracker>,
    pub queue: Arc<TaskQueue>,
    pub repository: Arc<AppRepository>,
    pub builder: Arc<dyn TaskBuilder>,
    pub limiter: Arc<RateLimiter>,
    pub bus: EventBus,
    pub health: Arc<dyn HealthChecks>,
    pub callbacks: Arc<dyn SchedulerCallbacks>,
    pub update_hook: Arc<dyn UpdateHook>,
    pub store: Arc<dyn SchedulerStore>,
}

pub struct SchedulerEngine {
    config: SchedulerConfig,
    tracker: Arc<TaskTracker>,
    queue: Arc<TaskQueue>,
    repository: Arc<AppRepository>,
    builder: Arc<dyn TaskBuilder>,
    limiter: Arc<RateLimiter>,
    bus: EventBus,
    health: Arc<dyn HealthChecks>,
    callbacks: Arc<dyn SchedulerCallbacks>,
    update_hook: Arc<dyn UpdateHook>,
    store: Arc<dyn SchedulerStore>,

    /// Per-app serialisation of scale arithmetic.
    scale_locks: std::sync::Mutex<HashMap<AppId, Arc<AsyncMutex<()>>>>,
}

impl SchedulerEngine {
    pub fn new(config: SchedulerConfig, ctx: EngineContext) -> Self {
        Self {
            config,
            tracker: ctx.tracker,
            queue: ctx.queue,
            repository: ctx.repository,
            builder: ctx.builder,
            limiter: ctx.limiter,
            bus: ctx.bus,
            health: ctx.health,
            callbacks: ctx.callbacks,
            update_hook: ctx.update_hook,
            store: ctx.store,
            scale_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Master callbacks
    // =========================================================================

    /// First registration: persist the framework identity for reconnects.
    pub async fn registered(
        &self,
        _driver: &dyn SchedulerDriver,
        framework_id: FrameworkId,
        master: &str,
    ) {
        info!(framework_id = %framework_id, master, "Registered with master");
        let write = tokio::time::timeout(
            self.config.store_timeout,
            self.store.set_framework_id(&framework_id),
        )
        .await;
        match write {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Failed to persist framework id"),
            Err(_) => error!("Timed out persisting framework id"),
        }
    }

    /// Identity is already persisted; nothing to do beyond logging.
    pub async fn reregistered(&self, _driver: &dyn SchedulerDriver, master: &str) {
        info!(master, "Re-registered with master");
    }

    /// Handles one batch of offers.
    ///
    /// Every offer is answered exactly once: a single launch on the first
    /// matching queued app, a decline otherwise — including on errors.
    pub async fn resource_offers(&self, driver: &dyn SchedulerDriver, offers: Vec<Offer>) {
        // Stuck-in-staging GC runs once per batch, before any matching.
        // This is the only cleanup path for tasks the master never moved
        // out of staging.
        for task in self.tracker.check_staged_tasks().await {
            warn!(
                task_id = %task.id,
                app_id = %task.app_id,
                staged_at = %task.staged_at,
                "Task stuck in staging, killing"
            );
            self.kill(driver, &task.id).await;
        }

        for offer in offers {
            if let Err(e) = self.process_offer(driver, &offer).await {
                warn!(offer_id = %offer.id, error = %e, "Offer processing failed, declining");
                if let Err(e) = driver.decline_offer(&offer.id).await {
                    warn!(offer_id = %offer.id, error = %e, "Failed to decline offer");
                }
            }
        }
    }

    /// Walks the queued apps against one offer. First match launches and
    /// ends the walk; apps that do not match requeue immediately.
    async fn process_offer(
        &self,
        driver: &dyn SchedulerDriver,
        offer: &Offer,
    ) -> anyhow::Result<()> {
        let apps = self.queue.remove_all();

        for (idx, app) in apps.iter().enumerate() {
            let Some(built) = self.builder.build(app, offer) else {
                self.queue.add(app.clone());
                continue;
            };

            let descriptor = built.descriptor;
            let task = TaskRecord::new(
                descriptor.task_id.clone(),
                app.id.clone(),
                offer.agent.clone(),
                offer.host.clone(),
                built.ports,
                offer.attributes.clone(),
                app.version,
            );
            info!(
                task_id = %task.id,
                app_id = %app.id,
                host = %task.host,
                offer_id = %offer.id,
                "Launching task"
            );
            self.tracker.created(task).await;

            let launched = driver.launch_tasks(&offer.id, vec![descriptor]).await;
            // Intents after the matched index go back in their original
            // order before any launch error surfaces.
            self.queue.add_all(apps[idx + 1..].to_vec());
            return launched;
        }

        debug!(offer_id = %offer.id, "No queued app matched offer, declining");
        driver.decline_offer(&offer.id).await
    }

    /// Ingests one task status update from the master.
    pub async fn status_update(&self, driver: &dyn SchedulerDriver, status: TaskStatus) {
        let app_id = status.task_id.app_id().clone();
        debug!(task_id = %status.task_id, state = %status.state, "Status update");

        if status.state.is_terminal() {
            match self.tracker.terminated(&status).await {
                Ok(Some(task)) => self.publish_status(&task.app_id, &status),
                Ok(None) => {
                    debug!(task_id = %status.task_id, "Terminal status for unknown task")
                }
                Err(e) => {
                    warn!(task_id = %status.task_id, error = %e, "Failed to record terminal status")
                }
            }

            if self.limiter.try_acquire(&app_id) {
                self.scale_app_by_name(driver, &app_id).await;
            } else {
                info!(app_id = %app_id, "Scale rate limit exceeded, skipping scale");
            }
        } else if status.state == TaskState::Running {
            match self.tracker.running(&status).await {
                Ok(task) => self.publish_status(&task.app_id, &status),
                Err(e) => {
                    warn!(
                        task_id = %status.task_id,
                        error = %e,
                        "Failed to record running status, killing task"
                    );
                    self.kill(driver, &status.task_id).await;
                }
            }
        } else if status.state == TaskState::Staging && !self.tracker.contains(&app_id).await {
            // Orphans from a deleted app must not resurface via staging.
            warn!(
                task_id = %status.task_id,
                app_id = %app_id,
                "Staging task for unknown app, killing"
            );
            self.kill(driver, &status.task_id).await;
        } else {
            match self.tracker.status_update(&status).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(task_id = %status.task_id, "Status for unknown task, killing");
                    self.kill(driver, &status.task_id).await;
                }
                Err(e) => {
                    warn!(
                        task_id = %status.task_id,
                        error = %e,
                        "Failed to record status, killing task"
                    );
                    self.kill(driver, &status.task_id).await;
                }
            }
        }
    }

    /// Offers are answered synchronously within `resource_offers`, so a
    /// rescind finds no held state.
    pub async fn offer_rescinded(&self, _driver: &dyn SchedulerDriver, offer_id: &OfferId) {
        info!(offer_id = %offer_id, "Offer rescinded");
    }

    pub async fn framework_message(
        &self,
        _driver: &dyn SchedulerDriver,
        agent: &AgentId,
        executor_id: &str,
        payload: Vec<u8>,
    ) {
        debug!(agent = %agent, executor_id, bytes = payload.len(), "Framework message");
        self.bus.post(SchedulerEvent::FrameworkMessage {
            agent: agent.clone(),
            executor_id: executor_id.to_string(),
            payload,
        });
    }

    pub async fn disconnected(&self, _driver: &dyn SchedulerDriver) {
        warn!("Disconnected from master");
        self.callbacks.disconnected();
    }

    /// Recovery happens through the terminal statuses the master sends for
    /// affected tasks, not here.
    pub async fn agent_lost(&self, _driver: &dyn SchedulerDriver, agent: &AgentId) {
        warn!(agent = %agent, "Agent lost");
    }

    pub async fn executor_lost(
        &self,
        _driver: &dyn SchedulerDriver,
        agent: &AgentId,
        executor_id: &str,
        status: i32,
    ) {
        warn!(agent = %agent, executor_id, status, "Executor lost");
    }

    /// Fatal master error: surrender leadership by exiting.
    pub async fn error(&self, _driver: &dyn SchedulerDriver, message: &str) {
        error!(message, "Fatal master error, terminating");
        // The exit must leave the callback thread first or in-process
        // shutdown hooks can deadlock against the driver.
        tokio::spawn(async {
            std::process::exit(9);
        });
    }

    // =========================================================================
    // Scaling & reconciliation
    // =========================================================================

    /// Aligns launch intents plus running tasks with the app's target.
    /// Serialised per app id.
    pub async fn scale_app(&self, driver: &dyn SchedulerDriver, app: &AppDefinition) {
        let lock = self.app_lock(&app.id);
        let _guard = lock.lock().await;

        let current = self.tracker.count(&app.id).await;
        let queued = self.queue.count(&app.id);
        let target = app.instances as usize;

        if target > current {
            let to_queue = target.saturating_sub(current + queued);
            if to_queue > 0 {
                info!(
                    app_id = %app.id,
                    current,
                    queued,
                    target,
                    to_queue,
                    "Queueing launch intents"
                );
                self.queue.add_all(vec![app.clone(); to_queue]);
            } else {
                debug!(
                    app_id = %app.id,
                    current,
                    queued,
                    target,
                    "Enough launch intents already in flight"
                );
            }
        } else if target < current {
            self.queue.purge(&app.id);
            let doomed = self.tracker.take(&app.id, current - target).await;
            info!(
                app_id = %app.id,
                current,
                target,
                kills = doomed.len(),
                "Scaling down"
            );
            for task in doomed {
                self.kill(driver, &task.id).await;
            }
        } else {
            debug!(app_id = %app.id, target, "Instance count already on target");
        }
    }

    /// Resolves the current app version and scales it. Unknown names log
    /// and return.
    pub async fn scale_app_by_name(&self, driver: &dyn SchedulerDriver, app_id: &AppId) {
        match self.repository.current_version(app_id).await {
            Ok(Some(app)) => self.scale_app(driver, &app).await,
            Ok(None) => info!(app_id = %app_id, "No current version for app, skipping scale"),
            Err(e) => warn!(app_id = %app_id, error = %e, "Failed to load app for scale"),
        }
    }

    /// Aligns every declared app, asks the master to replay task state,
    /// and cleans up tasks whose app is gone. Intended to run some time
    /// after (re-)registration; idempotent.
    pub async fn reconcile_and_scale(&self, driver: &dyn SchedulerDriver) {
        let known = match self.repository.app_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to list apps, skipping reconciliation");
                return;
            }
        };
        info!(app_count = known.len(), "Reconciling apps");

        for app_id in &known {
            self.scale_app_by_name(driver, app_id).await;
        }

        let mut statuses = Vec::new();
        for app_id in &known {
            for task in self.tracker.get(app_id).await {
                if let Some(status) = task.latest_status() {
                    statuses.push(status.clone());
                }
            }
        }
        if !statuses.is_empty() {
            if let Err(e) = driver.reconcile_tasks(statuses).await {
                warn!(error = %e, "Failed to submit task reconciliation");
            }
        }

        let known_set: HashSet<&AppId> = known.iter().collect();
        for app_id in self.tracker.app_ids().await {
            if known_set.contains(&app_id) {
                continue;
            }
            warn!(app_id = %app_id, "Tracked tasks for unknown app, cleaning up");
            for task in self.tracker.get(&app_id).await {
                self.kill(driver, &task.id).await;
            }
            self.tracker.shut_down(&app_id).await;
        }
    }

    // =========================================================================
    // App lifecycle
    // =========================================================================

    /// Registers a new app and queues its first launch intents.
    ///
    /// Starting an id that already has a current version is a caller bug,
    /// reported as [`EngineError::AppExists`].
    pub async fn start_app(
        &self,
        driver: &dyn SchedulerDriver,
        app: &AppDefinition,
    ) -> Result<(), EngineError> {
        if self.repository.current_version(&app.id).await?.is_some() {
            return Err(EngineError::AppExists(app.id.clone()));
        }

        info!(app_id = %app.id, instances = app.instances, "Starting app");
        self.repository.store_app(app).await?;
        self.limiter.set_permits(&app.id, app.task_rate_limit);
        self.scale_app(driver, app).await;
        self.health.reconcile_with(app);
        Ok(())
    }

    /// Removes an app entirely: history, health checks, tasks, queue
    /// entries, tracker slot.
    pub async fn stop_app(
        &self,
        driver: &dyn SchedulerDriver,
        app: &AppDefinition,
    ) -> Result<(), EngineError> {
        info!(app_id = %app.id, "Stopping app");
        let deleted = self.repository.expunge(&app.id).await?;
        if deleted.iter().any(|ok| !ok) {
            // Leftover versions would resurrect the app on the next
            // reconciliation; the caller may retry.
            return Err(EngineError::ExpungeIncomplete(app.id.clone()));
        }

        self.health.remove_for(&app.id);
        for task in self.tracker.get(&app.id).await {
            self.kill(driver, &task.id).await;
        }
        self.queue.purge(&app.id);
        self.tracker.shut_down(&app.id).await;
        self.limiter.remove(&app.id);
        self.scale_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&app.id);
        Ok(())
    }

    /// Stores a new version of an app and propagates the change to running
    /// tasks through the update hook.
    pub async fn update_app(
        &self,
        driver: &dyn SchedulerDriver,
        app_id: &AppId,
        update: AppUpdate,
    ) -> Result<AppDefinition, EngineError> {
        let current = self
            .repository
            .current_version(app_id)
            .await?
            .ok_or_else(|| EngineError::UnknownApp(app_id.clone()))?;

        let updated = current.with_update(update);
        info!(app_id = %app_id, version = %updated.version, "Updating app");
        self.health.reconcile_with(&updated);
        self.repository.store_app(&updated).await?;
        self.update_hook
            .on_update(driver, &self.tracker, &updated)
            .await;
        Ok(updated)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn publish_status(&self, app_id: &AppId, status: &TaskStatus) {
        self.bus.post(SchedulerEvent::TaskStatusChanged {
            task_id: status.task_id.clone(),
            app_id: app_id.clone(),
            state: status.state,
            message: status.message.clone(),
        });
    }

    async fn kill(&self, driver: &dyn SchedulerDriver, task_id: &TaskId) {
        if let Err(e) = driver.kill_task(task_id).await {
            warn!(task_id = %task_id, error = %e, "Failed to issue kill");
        }
    }

    fn app_lock(&self, app_id: &AppId) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .scale_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(app_id.clone()).or_default())
    }
}
