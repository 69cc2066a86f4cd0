//! End-to-end engine scenarios driven through the mock driver.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use armada_id::{AgentId, AppId, FrameworkId, OfferId, TaskId};
use armada_scheduler::builder::{BuiltTask, ResourceTaskBuilder, TaskBuilder};
use armada_scheduler::bus::{EventBus, SchedulerEvent};
use armada_scheduler::callbacks::SchedulerCallbacks;
use armada_scheduler::config::SchedulerConfig;
use armada_scheduler::driver::{MockDriver, SchedulerDriver};
use armada_scheduler::engine::{EngineContext, EngineError, SchedulerEngine};
use armada_scheduler::health::HealthChecks;
use armada_scheduler::limiter::RateLimiter;
use armada_scheduler::model::{
    AppDefinition, AppUpdate, Offer, Resources, TaskDescriptor, TaskRecord, TaskState, TaskStatus,
};
use armada_scheduler::queue::TaskQueue;
use armada_scheduler::repository::AppRepository;
use armada_scheduler::store::{SchedulerStore, SqliteStore, StoreError};
use armada_scheduler::tracker::TaskTracker;
use armada_scheduler::update::RollingRestartHook;
use armada_scheduler::worker::ReconcileWorker;
use async_trait::async_trait;

// =============================================================================
// Harness
// =============================================================================

struct RecordingHealthChecks {
    reconciled: Mutex<Vec<AppId>>,
    removed: Mutex<Vec<AppId>>,
}

impl RecordingHealthChecks {
    fn new() -> Self {
        Self {
            reconciled: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    fn removed_ids(&self) -> Vec<AppId> {
        self.removed.lock().unwrap().clone()
    }

    fn reconciled_ids(&self) -> Vec<AppId> {
        self.reconciled.lock().unwrap().clone()
    }
}

impl HealthChecks for RecordingHealthChecks {
    fn reconcile_with(&self, app: &AppDefinition) {
        self.reconciled.lock().unwrap().push(app.id.clone());
    }

    fn remove_for(&self, app_id: &AppId) {
        self.removed.lock().unwrap().push(app_id.clone());
    }
}

struct RecordingCallbacks {
    disconnects: AtomicUsize,
}

impl RecordingCallbacks {
    fn new() -> Self {
        Self {
            disconnects: AtomicUsize::new(0),
        }
    }
}

impl SchedulerCallbacks for RecordingCallbacks {
    fn disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builder that never matches.
struct NoMatchBuilder;

impl TaskBuilder for NoMatchBuilder {
    fn build(&self, _app: &AppDefinition, _offer: &Offer) -> Option<BuiltTask> {
        None
    }
}

/// Store whose task writes fail; everything else delegates.
struct FailingTaskStore {
    inner: SqliteStore,
}

impl FailingTaskStore {
    fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
        }
    }
}

#[async_trait]
impl SchedulerStore for FailingTaskStore {
    async fn framework_id(&self) -> Result<Option<FrameworkId>, StoreError> {
        self.inner.framework_id().await
    }

    async fn set_framework_id(&self, id: &FrameworkId) -> Result<(), StoreError> {
        self.inner.set_framework_id(id).await
    }

    async fn put_task(&self, _task: &TaskRecord) -> Result<(), StoreError> {
        Err(StoreError::Timeout)
    }

    async fn remove_task(&self, task_id: &TaskId) -> Result<(), StoreError> {
        self.inner.remove_task(task_id).await
    }

    async fn load_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.inner.load_tasks().await
    }

    async fn put_app_version(&self, app: &AppDefinition) -> Result<(), StoreError> {
        self.inner.put_app_version(app).await
    }

    async fn delete_app_versions(&self, app_id: &AppId) -> Result<Vec<bool>, StoreError> {
        self.inner.delete_app_versions(app_id).await
    }

    async fn current_app_version(
        &self,
        app_id: &AppId,
    ) -> Result<Option<AppDefinition>, StoreError> {
        self.inner.current_app_version(app_id).await
    }

    async fn app_ids(&self) -> Result<Vec<AppId>, StoreError> {
        self.inner.app_ids().await
    }
}

/// Driver whose launches fail; everything else records normally.
struct LaunchFailDriver {
    inner: MockDriver,
}

#[async_trait]
impl SchedulerDriver for LaunchFailDriver {
    async fn launch_tasks(
        &self,
        _offer_id: &OfferId,
        _tasks: Vec<TaskDescriptor>,
    ) -> anyhow::Result<()> {
        anyhow::bail!("launch channel down")
    }

    async fn decline_offer(&self, offer_id: &OfferId) -> anyhow::Result<()> {
        self.inner.decline_offer(offer_id).await
    }

    async fn kill_task(&self, task_id: &TaskId) -> anyhow::Result<()> {
        self.inner.kill_task(task_id).await
    }

    async fn reconcile_tasks(&self, statuses: Vec<TaskStatus>) -> anyhow::Result<()> {
        self.inner.reconcile_tasks(statuses).await
    }
}

struct Harness {
    engine: SchedulerEngine,
    driver: MockDriver,
    tracker: Arc<TaskTracker>,
    queue: Arc<TaskQueue>,
    repository: Arc<AppRepository>,
    limiter: Arc<RateLimiter>,
    bus: EventBus,
    health: Arc<RecordingHealthChecks>,
    callbacks: Arc<RecordingCallbacks>,
    store: Arc<dyn SchedulerStore>,
}

fn harness() -> Harness {
    harness_with(
        Arc::new(ResourceTaskBuilder::new()),
        Arc::new(SqliteStore::open_in_memory().unwrap()),
    )
}

fn harness_with(builder: Arc<dyn TaskBuilder>, store: Arc<dyn SchedulerStore>) -> Harness {
    let config = SchedulerConfig {
        update_poll_interval: Duration::from_millis(5),
        update_batch_timeout: Duration::from_millis(500),
        ..SchedulerConfig::default()
    };

    let tracker = Arc::new(TaskTracker::new(
        Arc::clone(&store),
        config.store_timeout,
        config.staged_task_timeout,
    ));
    let queue = Arc::new(TaskQueue::new());
    let repository = Arc::new(AppRepository::new(Arc::clone(&store), config.store_timeout));
    let limiter = Arc::new(RateLimiter::new());
    let bus = EventBus::default();
    let health = Arc::new(RecordingHealthChecks::new());
    let callbacks = Arc::new(RecordingCallbacks::new());

    let engine = SchedulerEngine::new(
        config.clone(),
        EngineContext {
            tracker: Arc::clone(&tracker),
            queue: Arc::clone(&queue),
            repository: Arc::clone(&repository),
            builder,
            limiter: Arc::clone(&limiter),
            bus: bus.clone(),
            health: Arc::clone(&health) as Arc<dyn HealthChecks>,
            callbacks: Arc::clone(&callbacks) as Arc<dyn SchedulerCallbacks>,
            update_hook: Arc::new(RollingRestartHook::from_config(&config)),
            store: Arc::clone(&store),
        },
    );

    Harness {
        engine,
        driver: MockDriver::new(),
        tracker,
        queue,
        repository,
        limiter,
        bus,
        health,
        callbacks,
        store,
    }
}

fn app(id: &str, instances: u32) -> AppDefinition {
    AppDefinition {
        id: AppId::parse(id).unwrap(),
        instances,
        task_rate_limit: 100.0,
        version: Utc::now(),
        cpus: 0.5,
        mem: 128.0,
        ports: vec![0],
        cmd: "./serve".to_string(),
        env: BTreeMap::new(),
    }
}

fn offer(id: &str) -> Offer {
    Offer {
        id: OfferId::new(id),
        agent: AgentId::new("agent-1"),
        host: "node-1.example.com".to_string(),
        attributes: BTreeMap::from([("zone".to_string(), "eu-1a".to_string())]),
        resources: Resources {
            cpus: 4.0,
            mem: 4096.0,
            port_ranges: vec![(31000, 31010)],
        },
    }
}

fn tracked_task(app: &AppDefinition) -> TaskRecord {
    TaskRecord::new(
        TaskId::for_app(&app.id),
        app.id.clone(),
        AgentId::new("agent-1"),
        "node-1.example.com".to_string(),
        vec![31000],
        BTreeMap::new(),
        app.version,
    )
}

// =============================================================================
// Offer handling
// =============================================================================

#[tokio::test]
async fn scale_up_by_offer_launches_exactly_one_task() {
    let h = harness();
    let a = app("x", 2);
    h.repository.store_app(&a).await.unwrap();
    h.queue.add(a.clone());
    h.queue.add(a.clone());

    h.engine.resource_offers(&h.driver, vec![offer("O-1")]).await;

    let launches = h.driver.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].1.len(), 1);
    assert_eq!(launches[0].1[0].app_id, a.id);
    assert!(h.driver.declines().is_empty());
    assert_eq!(h.tracker.count(&a.id).await, 1);
    assert_eq!(h.queue.count(&a.id), 1);
}

#[tokio::test]
async fn unmatched_offer_is_declined_and_queue_kept() {
    let h = harness_with(
        Arc::new(NoMatchBuilder),
        Arc::new(SqliteStore::open_in_memory().unwrap()),
    );
    let a = app("x", 1);
    h.queue.add(a.clone());

    h.engine.resource_offers(&h.driver, vec![offer("O-1")]).await;

    assert_eq!(h.driver.declines(), vec![OfferId::new("O-1")]);
    assert!(h.driver.launches().is_empty());
    assert_eq!(h.queue.count(&a.id), 1);
}

#[tokio::test]
async fn each_offer_in_batch_is_answered_once() {
    let h = harness();
    let a = app("x", 1);
    h.repository.store_app(&a).await.unwrap();
    h.queue.add(a.clone());

    // First offer takes the only queued intent; second has nothing to match.
    h.engine
        .resource_offers(&h.driver, vec![offer("O-1"), offer("O-2")])
        .await;

    assert_eq!(h.driver.launches().len(), 1);
    assert_eq!(h.driver.declines(), vec![OfferId::new("O-2")]);
}

#[tokio::test]
async fn launch_failure_declines_offer_and_keeps_remainder() {
    let h = harness();
    let a = app("x", 1);
    let b = app("y", 1);
    h.queue.add(a.clone());
    h.queue.add(b.clone());

    let driver = LaunchFailDriver {
        inner: MockDriver::new(),
    };
    h.engine.resource_offers(&driver, vec![offer("O-1")]).await;

    // The failed launch falls back to a decline; the unmatched remainder
    // stays queued in order.
    assert_eq!(driver.inner.declines(), vec![OfferId::new("O-1")]);
    assert_eq!(h.queue.count(&b.id), 1);
    assert_eq!(h.queue.count(&a.id), 0);
}

#[tokio::test]
async fn stuck_staging_tasks_are_killed_before_offers() {
    let h = harness();
    let a = app("x", 1);
    let mut stuck = tracked_task(&a);
    stuck.staged_at = Utc::now() - chrono::Duration::seconds(300);
    h.tracker.created(stuck.clone()).await;

    h.engine.resource_offers(&h.driver, vec![offer("O-1")]).await;

    assert_eq!(h.driver.kills(), vec![stuck.id]);
    // The empty queue means the offer itself is declined.
    assert_eq!(h.driver.declines(), vec![OfferId::new("O-1")]);
}

// =============================================================================
// Status updates
// =============================================================================

#[tokio::test]
async fn terminal_status_removes_task_and_scales() {
    let h = harness();
    let a = app("x", 3);
    h.repository.store_app(&a).await.unwrap();

    let tasks: Vec<TaskRecord> = (0..3).map(|_| tracked_task(&a)).collect();
    for task in &tasks {
        h.tracker.created(task.clone()).await;
    }

    let mut events = h.bus.subscribe();
    let failed = TaskStatus {
        task_id: tasks[0].id.clone(),
        state: TaskState::Failed,
        message: "oom".to_string(),
    };
    h.engine.status_update(&h.driver, failed.clone()).await;

    assert_eq!(h.tracker.count(&a.id).await, 2);
    assert_eq!(h.queue.count(&a.id), 1);

    let event = events.try_recv().unwrap();
    assert_eq!(
        event,
        SchedulerEvent::TaskStatusChanged {
            task_id: failed.task_id,
            app_id: a.id,
            state: TaskState::Failed,
            message: "oom".to_string(),
        }
    );
}

#[tokio::test]
async fn staging_status_for_unknown_app_kills_task() {
    let h = harness();
    let ghost = AppId::parse("ghost").unwrap();
    let task_id = TaskId::for_app(&ghost);

    h.engine
        .status_update(
            &h.driver,
            TaskStatus::new(task_id.clone(), TaskState::Staging),
        )
        .await;

    assert_eq!(h.driver.kills(), vec![task_id]);
    assert!(!h.tracker.contains(&ghost).await);
    assert_eq!(h.tracker.count(&ghost).await, 0);
}

#[tokio::test]
async fn running_status_marks_task_and_publishes() {
    let h = harness();
    let a = app("x", 1);
    let task = tracked_task(&a);
    h.tracker.created(task.clone()).await;

    let mut events = h.bus.subscribe();
    h.engine
        .status_update(
            &h.driver,
            TaskStatus::new(task.id.clone(), TaskState::Running),
        )
        .await;

    assert!(h.driver.kills().is_empty());
    let tracked = h.tracker.get(&a.id).await;
    assert!(tracked[0].started_at.is_some());
    assert!(matches!(
        events.try_recv().unwrap(),
        SchedulerEvent::TaskStatusChanged {
            state: TaskState::Running,
            ..
        }
    ));
}

#[tokio::test]
async fn running_status_persistence_failure_kills_task() {
    let h = harness_with(
        Arc::new(ResourceTaskBuilder::new()),
        Arc::new(FailingTaskStore::new()),
    );
    let a = app("x", 1);
    let task = tracked_task(&a);
    h.tracker.created(task.clone()).await;

    h.engine
        .status_update(
            &h.driver,
            TaskStatus::new(task.id.clone(), TaskState::Running),
        )
        .await;

    assert_eq!(h.driver.kills(), vec![task.id]);
}

#[tokio::test]
async fn status_for_unknown_task_kills_it() {
    let h = harness();
    let a = app("x", 1);
    // The app is known to the tracker, the task is not.
    h.tracker.created(tracked_task(&a)).await;

    let stray = TaskId::for_app(&a.id);
    h.engine
        .status_update(
            &h.driver,
            TaskStatus::new(stray.clone(), TaskState::Starting),
        )
        .await;

    assert_eq!(h.driver.kills(), vec![stray]);
}

#[tokio::test]
async fn scale_on_terminal_is_rate_limited() {
    let h = harness();
    let mut a = app("x", 3);
    a.task_rate_limit = 0.001;
    h.repository.store_app(&a).await.unwrap();
    h.limiter.set_permits(&a.id, a.task_rate_limit);

    let tasks: Vec<TaskRecord> = (0..3).map(|_| tracked_task(&a)).collect();
    for task in &tasks {
        h.tracker.created(task.clone()).await;
    }

    h.engine
        .status_update(
            &h.driver,
            TaskStatus::new(tasks[0].id.clone(), TaskState::Failed),
        )
        .await;
    h.engine
        .status_update(
            &h.driver,
            TaskStatus::new(tasks[1].id.clone(), TaskState::Failed),
        )
        .await;

    // Both removals land, but only the first terminal status got a scale
    // token: one queued replacement instead of two.
    assert_eq!(h.tracker.count(&a.id).await, 1);
    assert_eq!(h.queue.count(&a.id), 1);
}

// =============================================================================
// Scaling
// =============================================================================

#[tokio::test]
async fn scale_up_queues_only_the_shortfall() {
    let h = harness();
    let a = app("x", 3);
    h.tracker.created(tracked_task(&a)).await;
    h.queue.add(a.clone());

    h.engine.scale_app(&h.driver, &a).await;

    // current 1 + queued 1 → one more intent.
    assert_eq!(h.queue.count(&a.id), 2);

    // Idempotent: a second scale adds nothing.
    h.engine.scale_app(&h.driver, &a).await;
    assert_eq!(h.queue.count(&a.id), 2);
}

#[tokio::test]
async fn scale_down_kills_surplus_once() {
    let h = harness();
    let a = app("x", 3);
    for _ in 0..5 {
        h.tracker.created(tracked_task(&a)).await;
    }
    h.queue.add(a.clone());

    h.engine.scale_app(&h.driver, &a).await;

    assert_eq!(h.driver.kills().len(), 2);
    assert_eq!(h.queue.count(&a.id), 0);

    // Kills are in flight; a second scale must not double them.
    h.engine.scale_app(&h.driver, &a).await;
    assert_eq!(h.driver.kills().len(), 2);
}

#[tokio::test]
async fn scale_by_name_for_unknown_app_is_a_noop() {
    let h = harness();
    h.engine
        .scale_app_by_name(&h.driver, &AppId::parse("nope").unwrap())
        .await;

    assert!(h.driver.commands().is_empty());
    assert!(h.queue.is_empty());
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn reconcile_kills_orphans_and_submits_known_statuses() {
    let h = harness();
    let known = app("x", 2);
    h.repository.store_app(&known).await.unwrap();

    let mut known_statuses = Vec::new();
    for _ in 0..2 {
        let task = tracked_task(&known);
        h.tracker.created(task.clone()).await;
        let status = TaskStatus::new(task.id.clone(), TaskState::Running);
        h.engine.status_update(&h.driver, status.clone()).await;
        known_statuses.push(status);
    }

    let orphan = app("y", 1);
    let orphan_task = tracked_task(&orphan);
    h.tracker.created(orphan_task.clone()).await;

    h.engine.reconcile_and_scale(&h.driver).await;

    assert_eq!(h.driver.kills(), vec![orphan_task.id]);
    assert!(!h.tracker.contains(&orphan.id).await);

    let submitted = h.driver.reconciles();
    assert_eq!(submitted.len(), 1);
    let submitted_ids: HashSet<TaskId> =
        submitted[0].iter().map(|s| s.task_id.clone()).collect();
    let known_ids: HashSet<TaskId> =
        known_statuses.iter().map(|s| s.task_id.clone()).collect();
    assert_eq!(submitted_ids, known_ids);
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let h = harness();
    let known = app("x", 1);
    h.repository.store_app(&known).await.unwrap();
    h.tracker.created(tracked_task(&known)).await;

    let orphan_task = tracked_task(&app("y", 1));
    h.tracker.created(orphan_task.clone()).await;

    h.engine.reconcile_and_scale(&h.driver).await;
    h.engine.reconcile_and_scale(&h.driver).await;

    // The orphan is killed exactly once; known tasks survive both passes.
    assert_eq!(h.driver.kills(), vec![orphan_task.id]);
    assert_eq!(h.tracker.count(&known.id).await, 1);
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn reconcile_worker_runs_periodically() {
    let h = harness();
    let a = app("x", 1);
    h.repository.store_app(&a).await.unwrap();

    let engine = Arc::new(h.engine);
    let driver: Arc<dyn SchedulerDriver> = Arc::new(MockDriver::new());
    let worker = ReconcileWorker::new(
        Arc::clone(&engine),
        driver,
        Duration::from_millis(20),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(80)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    // The periodic scale queued the missing intent exactly once.
    assert_eq!(h.queue.count(&a.id), 1);
}

// =============================================================================
// App lifecycle
// =============================================================================

#[tokio::test]
async fn start_app_persists_scales_and_registers_checks() {
    let h = harness();
    let a = app("x", 2);

    h.engine.start_app(&h.driver, &a).await.unwrap();

    assert!(h
        .repository
        .current_version(&a.id)
        .await
        .unwrap()
        .is_some());
    assert_eq!(h.queue.count(&a.id), 2);
    assert_eq!(h.health.reconciled_ids(), vec![a.id.clone()]);

    // The configured rate limit is live immediately.
    h.limiter.set_permits(&a.id, a.task_rate_limit);
    assert!(h.limiter.try_acquire(&a.id));
}

#[tokio::test]
async fn start_app_twice_is_a_precondition_failure() {
    let h = harness();
    let a = app("x", 1);

    h.engine.start_app(&h.driver, &a).await.unwrap();
    let second = h.engine.start_app(&h.driver, &a).await;

    assert!(matches!(second, Err(EngineError::AppExists(_))));
}

#[tokio::test]
async fn stop_app_tears_everything_down() {
    let h = harness();
    let a = app("x", 2);
    h.engine.start_app(&h.driver, &a).await.unwrap();

    let tasks: Vec<TaskRecord> = (0..2).map(|_| tracked_task(&a)).collect();
    for task in &tasks {
        h.tracker.created(task.clone()).await;
    }

    h.engine.stop_app(&h.driver, &a).await.unwrap();

    let killed: HashSet<TaskId> = h.driver.kills().into_iter().collect();
    let expected: HashSet<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
    assert_eq!(killed, expected);
    assert_eq!(h.queue.count(&a.id), 0);
    assert!(h
        .repository
        .current_version(&a.id)
        .await
        .unwrap()
        .is_none());
    assert!(!h.tracker.contains(&a.id).await);
    assert_eq!(h.health.removed_ids(), vec![a.id.clone()]);
}

#[tokio::test]
async fn update_app_unknown_id_fails() {
    let h = harness();
    let result = h
        .engine
        .update_app(
            &h.driver,
            &AppId::parse("nope").unwrap(),
            AppUpdate::default(),
        )
        .await;

    assert!(matches!(result, Err(EngineError::UnknownApp(_))));
}

#[tokio::test]
async fn update_app_rolls_tasks_onto_new_version() {
    let h = harness();
    let a = app("x", 1);
    h.engine.start_app(&h.driver, &a).await.unwrap();

    // Place the one intent so a task of the old version is tracked.
    h.engine.resource_offers(&h.driver, vec![offer("O-1")]).await;
    assert_eq!(h.tracker.count(&a.id).await, 1);

    let update = AppUpdate {
        cmd: Some("./serve --v2".to_string()),
        ..Default::default()
    };

    // Answer each kill with a terminal status, the way the master would.
    let updated = tokio::select! {
        updated = h.engine.update_app(&h.driver, &a.id, update) => updated.unwrap(),
        _ = async {
            let mut acked: HashSet<TaskId> = HashSet::new();
            loop {
                tokio::time::sleep(Duration::from_millis(2)).await;
                for task_id in h.driver.kills() {
                    if acked.insert(task_id.clone()) {
                        h.engine
                            .status_update(
                                &h.driver,
                                TaskStatus::new(task_id, TaskState::Killed),
                            )
                            .await;
                    }
                }
            }
        } => unreachable!(),
    };

    assert_eq!(updated.cmd, "./serve --v2");
    assert_eq!(
        h.repository
            .current_version(&a.id)
            .await
            .unwrap()
            .unwrap()
            .cmd,
        "./serve --v2"
    );

    // The old task died and its terminal status queued a replacement
    // carrying the new definition.
    assert_eq!(h.driver.kills().len(), 1);
    assert_eq!(h.tracker.count(&a.id).await, 0);
    let requeued = h.queue.remove_all();
    assert_eq!(requeued.len(), 1);
    assert_eq!(requeued[0].cmd, "./serve --v2");
}

// =============================================================================
// Registration, disconnect, messages
// =============================================================================

#[tokio::test]
async fn registered_persists_framework_id() {
    let h = harness();
    h.engine
        .registered(&h.driver, FrameworkId::new("fw-1"), "master-1:5050")
        .await;

    assert_eq!(
        h.store.framework_id().await.unwrap(),
        Some(FrameworkId::new("fw-1"))
    );

    // Re-registration leaves the stored identity untouched.
    h.engine.reregistered(&h.driver, "master-2:5050").await;
    assert_eq!(
        h.store.framework_id().await.unwrap(),
        Some(FrameworkId::new("fw-1"))
    );
}

#[tokio::test]
async fn disconnect_invokes_callbacks() {
    let h = harness();
    h.engine.disconnected(&h.driver).await;
    assert_eq!(h.callbacks.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn framework_message_is_published() {
    let h = harness();
    let mut events = h.bus.subscribe();

    h.engine
        .framework_message(&h.driver, &AgentId::new("agent-1"), "exec-1", b"ping".to_vec())
        .await;

    assert_eq!(
        events.try_recv().unwrap(),
        SchedulerEvent::FrameworkMessage {
            agent: AgentId::new("agent-1"),
            executor_id: "exec-1".to_string(),
            payload: b"ping".to_vec(),
        }
    );
}

#[tokio::test]
async fn agent_loss_and_rescind_leave_state_untouched() {
    let h = harness();
    let a = app("x", 1);
    h.tracker.created(tracked_task(&a)).await;

    h.engine
        .agent_lost(&h.driver, &AgentId::new("agent-1"))
        .await;
    h.engine
        .executor_lost(&h.driver, &AgentId::new("agent-1"), "exec-1", 137)
        .await;
    h.engine
        .offer_rescinded(&h.driver, &OfferId::new("O-9"))
        .await;

    assert!(h.driver.commands().is_empty());
    assert_eq!(h.tracker.count(&a.id).await, 1);
}
