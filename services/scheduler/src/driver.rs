//! Outbound driver interface to the cluster master.
//!
//! The engine assumes all driver calls are fire-and-forget:
//! acknowledgement arrives as subsequent master callbacks, never as a
//! return value. A mock implementation is provided for testing and
//! development.

use std::sync::Mutex;

use anyhow::Result;
use armada_id::{OfferId, TaskId};
use async_trait::async_trait;
use tracing::info;

use crate::model::{TaskDescriptor, TaskStatus};

/// Driver handle supplied by the master binding.
#[async_trait]
pub trait SchedulerDriver: Send + Sync {
    /// Launch tasks against a held offer.
    async fn launch_tasks(&self, offer_id: &OfferId, tasks: Vec<TaskDescriptor>) -> Result<()>;

    /// Release an offer unused.
    async fn decline_offer(&self, offer_id: &OfferId) -> Result<()>;

    /// Ask the master to kill a task.
    async fn kill_task(&self, task_id: &TaskId) -> Result<()>;

    /// Ask the master to re-send authoritative state for the given tasks.
    async fn reconcile_tasks(&self, statuses: Vec<TaskStatus>) -> Result<()>;
}

/// One recorded outbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    Launch {
        offer_id: OfferId,
        tasks: Vec<TaskDescriptor>,
    },
    Decline {
        offer_id: OfferId,
    },
    Kill {
        task_id: TaskId,
    },
    Reconcile {
        statuses: Vec<TaskStatus>,
    },
}

/// Mock driver for testing and development.
///
/// Records every outbound command; call the accessors to assert on what
/// the engine sent.
pub struct MockDriver {
    commands: Mutex<Vec<DriverCommand>>,

    /// Whether calls should "fail".
    fail_calls: bool,
}

impl MockDriver {
    /// Create a new mock driver.
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            fail_calls: false,
        }
    }

    /// Create a mock driver that fails every call.
    pub fn failing() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            fail_calls: true,
        }
    }

    fn record(&self, command: DriverCommand) -> Result<()> {
        if self.fail_calls {
            anyhow::bail!("Mock driver configured to fail");
        }
        self.lock().push(command);
        Ok(())
    }

    /// All recorded commands, in issue order.
    pub fn commands(&self) -> Vec<DriverCommand> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DriverCommand>> {
        self.commands.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Recorded launch commands.
    pub fn launches(&self) -> Vec<(OfferId, Vec<TaskDescriptor>)> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                DriverCommand::Launch { offer_id, tasks } => Some((offer_id, tasks)),
                _ => None,
            })
            .collect()
    }

    /// Recorded declined offer ids.
    pub fn declines(&self) -> Vec<OfferId> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                DriverCommand::Decline { offer_id } => Some(offer_id),
                _ => None,
            })
            .collect()
    }

    /// Recorded kill targets.
    pub fn kills(&self) -> Vec<TaskId> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                DriverCommand::Kill { task_id } => Some(task_id),
                _ => None,
            })
            .collect()
    }

    /// Recorded reconciliation submissions.
    pub fn reconciles(&self) -> Vec<Vec<TaskStatus>> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                DriverCommand::Reconcile { statuses } => Some(statuses),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulerDriver for MockDriver {
    async fn launch_tasks(&self, offer_id: &OfferId, tasks: Vec<TaskDescriptor>) -> Result<()> {
        info!(
            offer_id = %offer_id,
            task_count = tasks.len(),
            "[MOCK] Launching tasks"
        );
        self.record(DriverCommand::Launch {
            offer_id: offer_id.clone(),
            tasks,
        })
    }

    async fn decline_offer(&self, offer_id: &OfferId) -> Result<()> {
        info!(offer_id = %offer_id, "[MOCK] Declining offer");
        self.record(DriverCommand::Decline {
            offer_id: offer_id.clone(),
        })
    }

    async fn kill_task(&self, task_id: &TaskId) -> Result<()> {
        info!(task_id = %task_id, "[MOCK] Killing task");
        self.record(DriverCommand::Kill {
            task_id: task_id.clone(),
        })
    }

    async fn reconcile_tasks(&self, statuses: Vec<TaskStatus>) -> Result<()> {
        info!(status_count = statuses.len(), "[MOCK] Reconciling tasks");
        self.record(DriverCommand::Reconcile { statuses })
    }
}
