//! Authoritative in-memory index of tasks per app.
//!
//! The tracker:
//! - Holds the live task records the engine reasons about
//! - Mirrors every record into the durable store
//! - Flags tasks stuck in staging for the offer path to garbage-collect
//!
//! In-memory state is authoritative; the store copy exists so a restarted
//! scheduler can rebuild the index before the master replays state. The
//! offer path only touches memory — the write behind `created` runs on a
//! background task, while the status paths await their store writes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use armada_id::{AppId, TaskId};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, warn};

use crate::model::{TaskRecord, TaskStatus};
use crate::store::{SchedulerStore, StoreError};

/// Errors from tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("no task '{0}' on record")]
    UnknownTask(TaskId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Default)]
struct AppTasks {
    tasks: HashMap<TaskId, TaskRecord>,

    /// Tasks handed out by `take` whose kills are still in flight.
    doomed: HashSet<TaskId>,
}

/// Task index with store-backed durability.
pub struct TaskTracker {
    apps: RwLock<HashMap<AppId, AppTasks>>,
    store: Arc<dyn SchedulerStore>,
    store_timeout: Duration,
    staged_timeout: Duration,
}

impl TaskTracker {
    pub fn new(
        store: Arc<dyn SchedulerStore>,
        store_timeout: Duration,
        staged_timeout: Duration,
    ) -> Self {
        Self {
            apps: RwLock::new(HashMap::new()),
            store,
            store_timeout,
            staged_timeout,
        }
    }

    /// Rebuilds the index from previously stored records.
    pub async fn hydrate(&self, tasks: Vec<TaskRecord>) {
        let mut apps = self.apps.write().await;
        for task in tasks {
            apps.entry(task.app_id.clone())
                .or_default()
                .tasks
                .insert(task.id.clone(), task);
        }
    }

    /// Records a freshly launched task.
    ///
    /// In-memory only on the calling path; the durable write happens on a
    /// background task so offer handling never waits on the store.
    pub async fn created(&self, task: TaskRecord) {
        {
            let mut apps = self.apps.write().await;
            apps.entry(task.app_id.clone())
                .or_default()
                .tasks
                .insert(task.id.clone(), task.clone());
        }

        let store = Arc::clone(&self.store);
        let store_timeout = self.store_timeout;
        tokio::spawn(async move {
            let write = tokio::time::timeout(store_timeout, store.put_task(&task)).await;
            match write {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(task_id = %task.id, error = %e, "Failed to persist created task")
                }
                Err(_) => {
                    error!(task_id = %task.id, "Timed out persisting created task")
                }
            }
        });
    }

    /// Tasks that have sat in staging beyond the configured timeout.
    pub async fn check_staged_tasks(&self) -> Vec<TaskRecord> {
        let apps = self.apps.read().await;
        apps.values()
            .flat_map(|slot| slot.tasks.values())
            .filter(|t| t.staged_longer_than(self.staged_timeout))
            .cloned()
            .collect()
    }

    /// Marks a task running and persists the updated record.
    pub async fn running(&self, status: &TaskStatus) -> Result<TaskRecord, TrackerError> {
        let app_id = status.task_id.app_id().clone();
        let updated = {
            let mut apps = self.apps.write().await;
            let task = apps
                .get_mut(&app_id)
                .and_then(|slot| slot.tasks.get_mut(&status.task_id))
                .ok_or_else(|| TrackerError::UnknownTask(status.task_id.clone()))?;
            task.mark_running(status.clone());
            task.clone()
        };

        self.persist(&updated).await?;
        Ok(updated)
    }

    /// Removes a task on a terminal status. Returns the prior record, if
    /// one existed. Store removal is best-effort: the in-memory removal is
    /// what the engine's invariants rest on.
    pub async fn terminated(
        &self,
        status: &TaskStatus,
    ) -> Result<Option<TaskRecord>, TrackerError> {
        let app_id = status.task_id.app_id().clone();
        let removed = {
            let mut apps = self.apps.write().await;
            match apps.get_mut(&app_id) {
                Some(slot) => {
                    slot.doomed.remove(&status.task_id);
                    slot.tasks.remove(&status.task_id)
                }
                None => None,
            }
        };

        if removed.is_some() {
            let erase = tokio::time::timeout(
                self.store_timeout,
                self.store.remove_task(&status.task_id),
            )
            .await;
            match erase {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(task_id = %status.task_id, error = %e, "Failed to erase terminated task")
                }
                Err(_) => {
                    warn!(task_id = %status.task_id, "Timed out erasing terminated task")
                }
            }
        }

        Ok(removed)
    }

    /// Records a non-terminal, non-running status observation.
    pub async fn status_update(
        &self,
        status: &TaskStatus,
    ) -> Result<Option<TaskRecord>, TrackerError> {
        let app_id = status.task_id.app_id().clone();
        let updated = {
            let mut apps = self.apps.write().await;
            match apps
                .get_mut(&app_id)
                .and_then(|slot| slot.tasks.get_mut(&status.task_id))
            {
                Some(task) => {
                    task.record_status(status.clone());
                    Some(task.clone())
                }
                None => None,
            }
        };

        match updated {
            Some(task) => {
                self.persist(&task).await?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Whether the tracker has a slot for the app.
    pub async fn contains(&self, app_id: &AppId) -> bool {
        self.apps.read().await.contains_key(app_id)
    }

    /// Number of tracked tasks for the app, kills in flight included.
    pub async fn count(&self, app_id: &AppId) -> usize {
        self.apps
            .read()
            .await
            .get(app_id)
            .map(|slot| slot.tasks.len())
            .unwrap_or(0)
    }

    /// All tracked tasks for the app, oldest first.
    pub async fn get(&self, app_id: &AppId) -> Vec<TaskRecord> {
        let apps = self.apps.read().await;
        let mut tasks: Vec<TaskRecord> = apps
            .get(app_id)
            .map(|slot| slot.tasks.values().cloned().collect())
            .unwrap_or_default();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    /// Apps with a tracker slot.
    pub async fn app_ids(&self) -> Vec<AppId> {
        self.apps.read().await.keys().cloned().collect()
    }

    /// Hands out up to `n` tasks to kill, newest first.
    ///
    /// Kills already in flight count against `n`, so asking twice for the
    /// same surplus hands out each task at most once.
    pub async fn take(&self, app_id: &AppId, n: usize) -> Vec<TaskRecord> {
        let mut apps = self.apps.write().await;
        let Some(slot) = apps.get_mut(app_id) else {
            return Vec::new();
        };

        let wanted = n.saturating_sub(slot.doomed.len());
        if wanted == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<&TaskRecord> = slot
            .tasks
            .values()
            .filter(|t| !slot.doomed.contains(&t.id))
            .collect();
        candidates.sort_by(|a, b| b.id.cmp(&a.id));

        let picked: Vec<TaskRecord> = candidates.into_iter().take(wanted).cloned().collect();
        for task in &picked {
            slot.doomed.insert(task.id.clone());
        }
        picked
    }

    /// Tears down the app's slot and erases its stored records.
    pub async fn shut_down(&self, app_id: &AppId) {
        let removed = {
            let mut apps = self.apps.write().await;
            apps.remove(app_id)
        };

        let Some(slot) = removed else { return };
        for task_id in slot.tasks.keys() {
            let erase =
                tokio::time::timeout(self.store_timeout, self.store.remove_task(task_id)).await;
            match erase {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(task_id = %task_id, error = %e, "Failed to erase task on shutdown")
                }
                Err(_) => warn!(task_id = %task_id, "Timed out erasing task on shutdown"),
            }
        }
    }

    async fn persist(&self, task: &TaskRecord) -> Result<(), StoreError> {
        tokio::time::timeout(self.store_timeout, self.store.put_task(task))
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}
