//! Queue of apps awaiting task placement.
//!
//! A multiset: an app appears once per outstanding launch intent. Offer
//! handling drains the whole queue, walks it in order, and refills what it
//! did not place, so insertion order is the only fairness guarantee.

use std::sync::Mutex;

use armada_id::AppId;

use crate::model::AppDefinition;

/// FIFO multiset of apps awaiting placement.
#[derive(Default)]
pub struct TaskQueue {
    entries: Mutex<Vec<AppDefinition>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one launch intent.
    pub fn add(&self, app: AppDefinition) {
        self.lock().push(app);
    }

    /// Appends launch intents preserving their order.
    pub fn add_all(&self, apps: Vec<AppDefinition>) {
        self.lock().extend(apps);
    }

    /// Drains the queue, returning entries in insertion order.
    pub fn remove_all(&self) -> Vec<AppDefinition> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of queued intents for one app.
    pub fn count(&self, app_id: &AppId) -> usize {
        self.lock().iter().filter(|a| &a.id == app_id).count()
    }

    /// Drops every queued intent for one app.
    pub fn purge(&self, app_id: &AppId) {
        self.lock().retain(|a| &a.id != app_id);
    }

    /// Total queued intents across all apps.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AppDefinition>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
