use std::time::Duration;

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on any single durable-store call.
    pub store_timeout: Duration,

    /// Wait applied by synchronous admin bridges on engine futures.
    pub default_wait: Duration,

    /// Tasks still staging after this long are killed on the next offer batch.
    pub staged_task_timeout: Duration,

    /// Period of the background reconciliation worker.
    pub reconcile_interval: Duration,

    /// Tasks restarted concurrently by an app update.
    pub update_max_parallel: usize,

    /// Poll interval while waiting for an update batch to drain.
    pub update_poll_interval: Duration,

    /// Upper bound on waiting for one update batch to drain.
    pub update_batch_timeout: Duration,

    pub data_dir: String,
    pub log_level: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(10),
            default_wait: Duration::from_secs(3),
            staged_task_timeout: Duration::from_secs(60),
            reconcile_interval: Duration::from_secs(30),
            update_max_parallel: 1,
            update_poll_interval: Duration::from_millis(100),
            update_batch_timeout: Duration::from_secs(30),
            data_dir: "/var/lib/armada".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let store_timeout = env_secs("ARMADA_STORE_TIMEOUT_SECS", defaults.store_timeout);
        let default_wait = env_secs("ARMADA_DEFAULT_WAIT_SECS", defaults.default_wait);
        let staged_task_timeout =
            env_secs("ARMADA_STAGED_TASK_TIMEOUT_SECS", defaults.staged_task_timeout);
        let reconcile_interval =
            env_secs("ARMADA_RECONCILE_INTERVAL_SECS", defaults.reconcile_interval);

        let update_max_parallel = std::env::var("ARMADA_UPDATE_MAX_PARALLEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.update_max_parallel);

        let data_dir = std::env::var("ARMADA_DATA_DIR").unwrap_or(defaults.data_dir);
        let log_level = std::env::var("ARMADA_LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            store_timeout,
            default_wait,
            staged_task_timeout,
            reconcile_interval,
            update_max_parallel,
            update_poll_interval: defaults.update_poll_interval,
            update_batch_timeout: defaults.update_batch_timeout,
            data_dir,
            log_level,
        })
    }
}

fn env_secs(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
