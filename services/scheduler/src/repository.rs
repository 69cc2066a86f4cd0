//! Versioned repository of app definitions.
//!
//! Thin domain wrapper over the durable store: every write lands a new
//! version row, reads resolve the highest version, and expunge removes the
//! full history of an id. All calls are bounded by the configured store
//! timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use armada_id::AppId;

use crate::model::AppDefinition;
use crate::store::{SchedulerStore, StoreError};

pub struct AppRepository {
    store: Arc<dyn SchedulerStore>,
    store_timeout: Duration,
}

impl AppRepository {
    pub fn new(store: Arc<dyn SchedulerStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Persists a new version of an app definition.
    pub async fn store_app(&self, app: &AppDefinition) -> Result<(), StoreError> {
        self.bounded(self.store.put_app_version(app)).await
    }

    /// Resolves the current (highest) version for an id.
    pub async fn current_version(
        &self,
        app_id: &AppId,
    ) -> Result<Option<AppDefinition>, StoreError> {
        self.bounded(self.store.current_app_version(app_id)).await
    }

    /// Deletes all versions of an id; one success flag per version.
    pub async fn expunge(&self, app_id: &AppId) -> Result<Vec<bool>, StoreError> {
        self.bounded(self.store.delete_app_versions(app_id)).await
    }

    /// All ids with at least one stored version.
    pub async fn app_ids(&self) -> Result<Vec<AppId>, StoreError> {
        self.bounded(self.store.app_ids()).await
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}
