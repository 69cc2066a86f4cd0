//! Background reconciliation worker.
//!
//! Runs `reconcile_and_scale` on a periodic interval, starting one full
//! interval after launch so the master has time to replay task state
//! after (re-)registration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::driver::SchedulerDriver;
use crate::engine::SchedulerEngine;

/// Worker that periodically reconciles tracked tasks against declared apps.
pub struct ReconcileWorker {
    engine: Arc<SchedulerEngine>,
    driver: Arc<dyn SchedulerDriver>,
    interval: Duration,
}

impl ReconcileWorker {
    pub fn new(
        engine: Arc<SchedulerEngine>,
        driver: Arc<dyn SchedulerDriver>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            driver,
            interval,
        }
    }

    /// Run the worker until shutdown is signaled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting reconciliation worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.engine.reconcile_and_scale(self.driver.as_ref()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reconciliation worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
