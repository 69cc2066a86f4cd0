//! Hooks the enclosing service injects into the engine.

use tracing::warn;

/// Service-level callbacks, injected at construction time.
pub trait SchedulerCallbacks: Send + Sync {
    /// Invoked when the master connection is lost. The canonical
    /// implementation abdicates leadership so a peer can take over.
    fn disconnected(&self);
}

/// Default callbacks for single-instance deployments.
#[derive(Default)]
pub struct NoopCallbacks;

impl SchedulerCallbacks for NoopCallbacks {
    fn disconnected(&self) {
        warn!("Master disconnected and no callbacks are registered");
    }
}
