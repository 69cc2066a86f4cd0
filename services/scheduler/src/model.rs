//! Core data model: app definitions, task records, offers.
//!
//! Ownership rules:
//! - The task tracker owns task records
//! - The app repository owns app definitions
//! - Offers are ephemeral; the engine holds one only between receipt and
//!   its response

use std::collections::BTreeMap;

use armada_id::{AgentId, AppId, OfferId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// App Definitions
// =============================================================================

/// A versioned declarative specification of a program to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDefinition {
    /// Stable user-chosen id.
    pub id: AppId,

    /// Desired number of running tasks.
    pub instances: u32,

    /// Scale-event tokens per second granted on terminal statuses.
    pub task_rate_limit: f64,

    /// Version timestamp; strictly increases across updates of one id.
    pub version: DateTime<Utc>,

    /// CPUs required per task.
    pub cpus: f64,

    /// Memory required per task, in MB.
    pub mem: f64,

    /// Ports to reserve per task; `0` requests any offered port.
    pub ports: Vec<u16>,

    /// Command line to execute.
    pub cmd: String,

    /// Environment passed to the task.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl AppDefinition {
    /// Returns a copy with the update applied and a fresh version stamp.
    #[must_use]
    pub fn with_update(&self, update: AppUpdate) -> Self {
        Self {
            id: self.id.clone(),
            instances: update.instances.unwrap_or(self.instances),
            task_rate_limit: update.task_rate_limit.unwrap_or(self.task_rate_limit),
            version: Utc::now(),
            cpus: update.cpus.unwrap_or(self.cpus),
            mem: update.mem.unwrap_or(self.mem),
            ports: update.ports.unwrap_or_else(|| self.ports.clone()),
            cmd: update.cmd.unwrap_or_else(|| self.cmd.clone()),
            env: update.env.unwrap_or_else(|| self.env.clone()),
        }
    }
}

/// A partial update to an app definition. `None` keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppUpdate {
    pub instances: Option<u32>,
    pub task_rate_limit: Option<f64>,
    pub cpus: Option<f64>,
    pub mem: Option<f64>,
    pub ports: Option<Vec<u16>>,
    pub cmd: Option<String>,
    pub env: Option<BTreeMap<String, String>>,
}

// =============================================================================
// Task State
// =============================================================================

/// Task state as reported by the cluster master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskState {
    /// Returns true for states a task never leaves.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Killed | Self::Lost
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Staging => "staging",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Killed => "killed",
            Self::Lost => "lost",
        };
        write!(f, "{}", s)
    }
}

/// A status observation for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(default)]
    pub message: String,
}

impl TaskStatus {
    /// Creates a status with an empty message.
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            message: String::new(),
        }
    }
}

/// Coarse lifecycle phase derived from a task's status history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Staging,
    Running,
    Terminal,
}

// =============================================================================
// Task Records
// =============================================================================

/// The tracker's authoritative record of one launched task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub app_id: AppId,
    pub agent: AgentId,
    pub host: String,
    pub ports: Vec<u16>,

    /// Attributes captured from the matched offer.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// App version at launch time.
    pub app_version: DateTime<Utc>,

    pub staged_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,

    /// Status observations in delivery order.
    #[serde(default)]
    pub statuses: Vec<TaskStatus>,
}

impl TaskRecord {
    /// Creates a freshly staged record.
    pub fn new(
        id: TaskId,
        app_id: AppId,
        agent: AgentId,
        host: String,
        ports: Vec<u16>,
        attributes: BTreeMap<String, String>,
        app_version: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            app_id,
            agent,
            host,
            ports,
            attributes,
            app_version,
            staged_at: Utc::now(),
            started_at: None,
            statuses: Vec::new(),
        }
    }

    /// Appends a status observation.
    pub fn record_status(&mut self, status: TaskStatus) {
        self.statuses.push(status);
    }

    /// Appends a running status and stamps `started_at` on first sight.
    pub fn mark_running(&mut self, status: TaskStatus) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.statuses.push(status);
    }

    /// The most recent status observation, if any.
    #[must_use]
    pub fn latest_status(&self) -> Option<&TaskStatus> {
        self.statuses.last()
    }

    /// Derived lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> TaskPhase {
        if self
            .latest_status()
            .is_some_and(|s| s.state.is_terminal())
        {
            TaskPhase::Terminal
        } else if self.started_at.is_some() {
            TaskPhase::Running
        } else {
            TaskPhase::Staging
        }
    }

    /// True when the task has sat in staging longer than `timeout`.
    #[must_use]
    pub fn staged_longer_than(&self, timeout: std::time::Duration) -> bool {
        if self.phase() != TaskPhase::Staging {
            return false;
        }
        let elapsed = Utc::now().signed_duration_since(self.staged_at);
        elapsed.to_std().map(|e| e > timeout).unwrap_or(false)
    }
}

// =============================================================================
// Offers
// =============================================================================

/// Resources carried by an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpus: f64,

    /// Memory in MB.
    pub mem: f64,

    /// Inclusive port ranges.
    #[serde(default)]
    pub port_ranges: Vec<(u16, u16)>,
}

/// A time-bounded grant of cluster resources from the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub agent: AgentId,
    pub host: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub resources: Resources,
}

/// A concrete launch request handed to the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: TaskId,
    pub app_id: AppId,
    pub agent: AgentId,
    pub cmd: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub cpus: f64,
    pub mem: f64,
    pub ports: Vec<u16>,
}
