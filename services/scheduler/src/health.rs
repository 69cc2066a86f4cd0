//! Health-check collaborator interface.
//!
//! The engine only tells the health subsystem which apps exist; probing,
//! scheduling and result handling live outside the core.

use armada_id::AppId;
use tracing::debug;

use crate::model::AppDefinition;

/// Health-check bookkeeping hooks invoked on app lifecycle changes.
pub trait HealthChecks: Send + Sync {
    /// Aligns registered checks with the app's current definition.
    fn reconcile_with(&self, app: &AppDefinition);

    /// Drops all checks for a stopped app.
    fn remove_for(&self, app_id: &AppId);
}

/// No-op implementation for deployments without health checking.
#[derive(Default)]
pub struct NoopHealthChecks;

impl HealthChecks for NoopHealthChecks {
    fn reconcile_with(&self, app: &AppDefinition) {
        debug!(app_id = %app.id, "Health checks disabled, skipping reconcile");
    }

    fn remove_for(&self, app_id: &AppId) {
        debug!(app_id = %app_id, "Health checks disabled, skipping removal");
    }
}
