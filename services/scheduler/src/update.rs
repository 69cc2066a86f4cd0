//! Propagation of app updates to running tasks.
//!
//! `update_app` persists a new definition and then hands the running fleet
//! to an [`UpdateHook`]. The hook must be idempotent: invoking it again
//! after a partial rollout finishes the remainder without touching tasks
//! already on the new version.

use std::collections::HashSet;
use std::time::Duration;

use armada_id::TaskId;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::driver::SchedulerDriver;
use crate::model::AppDefinition;
use crate::tracker::TaskTracker;

/// Hook invoked after a new app version is persisted.
#[async_trait]
pub trait UpdateHook: Send + Sync {
    /// Propagates `updated` to the app's running tasks.
    async fn on_update(
        &self,
        driver: &dyn SchedulerDriver,
        tracker: &TaskTracker,
        updated: &AppDefinition,
    );
}

/// Rolling kill-and-relaunch with bounded parallelism.
///
/// Kills tasks still on an older app version in batches of `max_parallel`,
/// waiting for each batch's terminal statuses to clear the tracker before
/// the next. Replacements arrive through the ordinary terminal-status →
/// scale path, so this hook only ever kills.
pub struct RollingRestartHook {
    max_parallel: usize,
    poll_interval: Duration,
    batch_timeout: Duration,
}

impl RollingRestartHook {
    pub fn new(max_parallel: usize, poll_interval: Duration, batch_timeout: Duration) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            poll_interval,
            batch_timeout,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            config.update_max_parallel,
            config.update_poll_interval,
            config.update_batch_timeout,
        )
    }

    async fn outdated_tasks(&self, tracker: &TaskTracker, updated: &AppDefinition) -> Vec<TaskId> {
        tracker
            .get(&updated.id)
            .await
            .into_iter()
            .filter(|t| t.app_version < updated.version)
            .map(|t| t.id)
            .collect()
    }
}

#[async_trait]
impl UpdateHook for RollingRestartHook {
    async fn on_update(
        &self,
        driver: &dyn SchedulerDriver,
        tracker: &TaskTracker,
        updated: &AppDefinition,
    ) {
        loop {
            let outdated = self.outdated_tasks(tracker, updated).await;
            if outdated.is_empty() {
                info!(app_id = %updated.id, version = %updated.version, "Rollout complete");
                return;
            }

            let batch: Vec<TaskId> = outdated.into_iter().take(self.max_parallel).collect();
            info!(
                app_id = %updated.id,
                batch_size = batch.len(),
                "Restarting outdated tasks"
            );
            for task_id in &batch {
                if let Err(e) = driver.kill_task(task_id).await {
                    warn!(task_id = %task_id, error = %e, "Failed to kill outdated task");
                }
            }

            let deadline = Instant::now() + self.batch_timeout;
            loop {
                tokio::time::sleep(self.poll_interval).await;

                let live: HashSet<TaskId> = tracker
                    .get(&updated.id)
                    .await
                    .into_iter()
                    .map(|t| t.id)
                    .collect();
                if batch.iter().all(|id| !live.contains(id)) {
                    break;
                }
                if Instant::now() >= deadline {
                    warn!(
                        app_id = %updated.id,
                        "Timed out waiting for restart batch, stopping rollout"
                    );
                    return;
                }
            }
        }
    }
}
