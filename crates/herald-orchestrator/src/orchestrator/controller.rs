//! Orchestrator.
//!
//! Owns the queue, the active set and the history. A dispatcher task pops
//! queued tasks while capacity allows and hands each to the plan builder and
//! executor. The dispatcher sleeps until something enqueues a task or frees
//! a slot.

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::history::TaskHistory;
use super::queue::TaskQueue;
use crate::classifier::DefaultClassifier;
use crate::collaborators::{
    Classifier, MemoryNotificationHistory, MemoryResultsStore, MemoryStateStore, NotificationHistory, ResultsStore,
    StateStore,
};
use crate::config::{HeraldConfig, OrchestratorConfig};
use crate::error::{HeraldError, Result};
use crate::execution::{ExecutionStatus, PlanExecutor};
use crate::planning::PlanBuilder;
use crate::task::{Task, TaskStatus};
use crate::tools::{ToolRegistry, ToolStats};

/// Key under which every task summary is appended in the results store.
pub const RESULTS_HISTORY_KEY: &str = "task_history";

/// External collaborators the orchestrator depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// Turns events into tasks and judges duplicates.
    pub classifier: Arc<dyn Classifier>,
    /// Tracked item, build and pull request state.
    pub state_store: Arc<dyn StateStore>,
    /// Notifications already sent.
    pub notification_history: Arc<dyn NotificationHistory>,
    /// Destination for task summaries.
    pub results_store: Arc<dyn ResultsStore>,
}

impl Collaborators {
    /// Default classifier and in-memory stores around `history`.
    pub fn in_memory(history: Arc<MemoryNotificationHistory>) -> Self {
        Self {
            classifier: Arc::new(DefaultClassifier::new()),
            state_store: Arc::new(MemoryStateStore::new()),
            notification_history: history,
            results_store: Arc::new(MemoryResultsStore::new()),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// What `enqueue` did with a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnqueueOutcome {
    /// The task is waiting for a slot.
    Queued {
        /// Id of the queued task.
        task_id: String,
    },
    /// The task duplicates queued or running work and was dropped.
    Duplicate {
        /// Id of the dropped task.
        task_id: String,
        /// Tasks it duplicates.
        of: Vec<String>,
    },
}

/// Snapshot for operators.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    /// Whether the dispatcher is running.
    pub running: bool,
    /// Tasks waiting for a slot.
    pub queue_depth: usize,
    /// Tasks being processed.
    pub active: usize,
    /// Concurrency cap.
    pub max_concurrent_tasks: usize,
    /// Highest number of simultaneously active tasks seen.
    pub peak_active: usize,
    /// Tasks that finished with every step succeeding.
    pub completed: u64,
    /// Tasks that finished with some failed steps.
    pub partial: u64,
    /// Tasks that failed.
    pub failed: u64,
    /// Tasks dropped as duplicates.
    pub duplicates_dropped: u64,
    /// Most recent reasoning lines, oldest first.
    pub recent_reasoning: Vec<String>,
    /// Tool registry statistics.
    pub tools: ToolStats,
}

struct ActiveTask {
    task: Task,
    cancel: CancellationToken,
}

struct Dispatcher {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

struct State {
    queue: TaskQueue,
    active: HashMap<String, ActiveTask>,
    history: TaskHistory,
    completed: u64,
    partial: u64,
    failed: u64,
    duplicates_dropped: u64,
    peak_active: usize,
    reasoning: VecDeque<String>,
    dispatcher: Option<Dispatcher>,
}

impl State {
    fn note(&mut self, capacity: usize, line: String) {
        if capacity == 0 {
            return;
        }
        while self.reasoning.len() >= capacity {
            self.reasoning.pop_front();
        }
        self.reasoning.push_back(line);
    }
}

struct Inner {
    config: OrchestratorConfig,
    registry: Arc<ToolRegistry>,
    collaborators: Collaborators,
    builder: PlanBuilder,
    executor: PlanExecutor,
    state: Mutex<State>,
    /// Signalled on enqueue and slot release.
    wake: Notify,
    /// Signalled whenever a task finishes or the queue is cleared.
    settled: Notify,
}

/// Task queue and concurrency controller.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator. The dispatcher does not run until [`start`](Self::start).
    ///
    /// # Errors
    /// Fails if the configuration is invalid or the plan builder's startup
    /// check rejects the registry.
    pub fn new(config: &HeraldConfig, registry: Arc<ToolRegistry>, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let builder = PlanBuilder::new(
            Arc::clone(&registry),
            Arc::clone(&collaborators.notification_history),
            config.planning.clone(),
        )?;
        let executor = PlanExecutor::new(Arc::clone(&registry), &config.execution);

        let state = State {
            queue: TaskQueue::new(),
            active: HashMap::new(),
            history: TaskHistory::new(config.orchestrator.history_size),
            completed: 0,
            partial: 0,
            failed: 0,
            duplicates_dropped: 0,
            peak_active: 0,
            reasoning: VecDeque::with_capacity(config.orchestrator.reasoning_buffer),
            dispatcher: None,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config: config.orchestrator.clone(),
                registry,
                collaborators,
                builder,
                executor,
                state: Mutex::new(state),
                wake: Notify::new(),
                settled: Notify::new(),
            }),
        })
    }

    /// Starts the dispatcher.
    ///
    /// # Errors
    /// Fails if the dispatcher is already running.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.dispatcher.is_some() {
            return Err(HeraldError::Orchestrator("dispatcher is already running".to_string()));
        }

        let shutdown = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { inner.dispatch_loop(token).await });
        state.dispatcher = Some(Dispatcher { shutdown, handle });

        info!(max_concurrent_tasks = self.inner.config.max_concurrent_tasks, "Orchestrator started");
        Ok(())
    }

    /// Stops the dispatcher, cancels active tasks and clears the queue.
    ///
    /// Returns once every cancelled task has finished. Cancelled tasks finish
    /// as failed and land in the history.
    pub async fn shutdown(&self) {
        let dispatcher = {
            let mut state = self.inner.state.lock().await;
            let dispatcher = state.dispatcher.take();
            if let Some(dispatcher) = &dispatcher {
                dispatcher.shutdown.cancel();
            }
            for (task_id, active) in &state.active {
                info!(task_id = %task_id, "Cancelling task");
                active.cancel.cancel();
            }
            let dropped = state.queue.clear();
            if dropped > 0 {
                warn!(dropped, "Dropped queued tasks on shutdown");
            }
            dispatcher
        };

        if let Some(dispatcher) = dispatcher {
            if let Err(e) = dispatcher.handle.await {
                error!(error = %e, "Dispatcher ended abnormally");
            }
        }
        self.inner.settled.notify_waiters();
        self.wait_until(|state| state.active.is_empty()).await;
        info!("Orchestrator stopped");
    }

    /// Validates a task and queues it unless it duplicates queued or running work.
    ///
    /// # Errors
    /// Returns [`HeraldError::Validation`] for structurally invalid tasks.
    pub async fn enqueue(&self, mut task: Task) -> Result<EnqueueOutcome> {
        let classifier = &self.inner.collaborators.classifier;
        let validation = classifier.validate_task(&task);
        if !validation.valid {
            let reason = validation.error.unwrap_or_else(|| "task failed validation".to_string());
            warn!(task_id = %task.id, reason = %reason, "Rejected invalid task");
            return Err(HeraldError::Validation(reason));
        }

        let mut state = self.inner.state.lock().await;
        let candidates: Vec<&Task> = state.queue.iter().chain(state.active.values().map(|a| &a.task)).collect();
        let relationships = classifier.analyze_relationships(&task, &candidates);

        if relationships.is_duplicate() {
            state.duplicates_dropped += 1;
            let line = format!("[{}] dropped as duplicate of {}", task.id, relationships.duplicates.join(", "));
            state.note(self.inner.config.reasoning_buffer, line);
            info!(task_id = %task.id, duplicates = ?relationships.duplicates, "Dropped duplicate task");
            return Ok(EnqueueOutcome::Duplicate { task_id: task.id, of: relationships.duplicates });
        }

        task.mark_queued();
        let task_id = task.id.clone();
        debug!(
            task_id = %task_id,
            task_type = %task.task_type,
            priority = %task.priority,
            queue_depth = state.queue.len() + 1,
            "Task queued"
        );
        state.queue.push(task);
        drop(state);

        self.inner.wake.notify_one();
        Ok(EnqueueOutcome::Queued { task_id })
    }

    /// Interprets an event and enqueues the resulting task.
    ///
    /// Returns `Ok(None)` when the event is not actionable.
    ///
    /// # Errors
    /// Returns [`HeraldError::Validation`] if the interpreted task is invalid.
    pub async fn ingest(&self, event_type: &str, payload: &Value) -> Result<Option<EnqueueOutcome>> {
        match self.inner.collaborators.classifier.interpret_event(event_type, payload) {
            Some(task) => self.enqueue(task).await.map(Some),
            None => {
                debug!(event_type, "Event not actionable");
                Ok(None)
            }
        }
    }

    /// Current status.
    pub async fn status(&self) -> OrchestratorStatus {
        let tools = self.inner.registry.stats().await;
        let state = self.inner.state.lock().await;
        OrchestratorStatus {
            running: state.dispatcher.is_some(),
            queue_depth: state.queue.len(),
            active: state.active.len(),
            max_concurrent_tasks: self.inner.config.max_concurrent_tasks,
            peak_active: state.peak_active,
            completed: state.completed,
            partial: state.partial,
            failed: state.failed,
            duplicates_dropped: state.duplicates_dropped,
            recent_reasoning: state.reasoning.iter().cloned().collect(),
            tools,
        }
    }

    /// Finished tasks, oldest first.
    pub async fn history(&self) -> Vec<Task> {
        self.inner.state.lock().await.history.iter().cloned().collect()
    }

    /// A finished task by id.
    pub async fn find_in_history(&self, task_id: &str) -> Option<Task> {
        self.inner.state.lock().await.history.find(task_id).cloned()
    }

    /// Waits until nothing is queued or active.
    ///
    /// Never returns while tasks are queued and the dispatcher is stopped.
    pub async fn wait_idle(&self) {
        self.wait_until(|state| state.queue.is_empty() && state.active.is_empty()).await;
    }

    async fn wait_until(&self, done: impl Fn(&State) -> bool) {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if done(&*self.inner.state.lock().await) {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    async fn dispatch_loop(self: Arc<Self>, shutdown: CancellationToken) {
        debug!("Dispatcher started");
        loop {
            self.dispatch_ready(&shutdown).await;
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = self.wake.notified() => {}
            }
        }
        debug!("Dispatcher stopped");
    }

    /// Starts queued tasks until the queue is empty or the cap is reached.
    async fn dispatch_ready(self: &Arc<Self>, shutdown: &CancellationToken) {
        let mut started = Vec::new();
        {
            let mut state = self.state.lock().await;
            while state.active.len() < self.config.max_concurrent_tasks {
                if shutdown.is_cancelled() {
                    break;
                }
                let Some(mut task) = state.queue.pop() else { break };
                task.mark_processing();

                let cancel = CancellationToken::new();
                state.active.insert(task.id.clone(), ActiveTask { task: task.clone(), cancel: cancel.clone() });
                state.peak_active = state.peak_active.max(state.active.len());
                let line = format!("[{}] started ({}, {})", task.id, task.task_type, task.priority);
                state.note(self.config.reasoning_buffer, line);
                started.push((task, cancel));
            }
        }

        for (task, cancel) in started {
            info!(task_id = %task.id, task_type = %task.task_type, priority = %task.priority, "Dispatching task");
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.run_task(task, cancel).await });
        }
    }

    /// Processes one task and always releases its slot, even if processing panics.
    async fn run_task(self: Arc<Self>, task: Task, cancel: CancellationToken) {
        let snapshot = task.clone();
        let inner = Arc::clone(&self);
        let processing = tokio::spawn(async move { inner.process_task(task, cancel).await });

        let finished = match processing.await {
            Ok(task) => task,
            Err(e) => {
                error!(task_id = %snapshot.id, error = %e, "Task processing aborted");
                let mut task = snapshot;
                task.finish(TaskStatus::Failed, Some(format!("task processing aborted: {e}")));
                task
            }
        };
        self.release(finished).await;
    }

    async fn process_task(&self, mut task: Task, cancel: CancellationToken) -> Task {
        if let Err(e) = self.collaborators.state_store.update_for_task(&task).await {
            warn!(task_id = %task.id, error = %e, "State update failed; continuing");
        }

        let plan = match self.builder.build_plan(&task).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Planning failed");
                task.finish(TaskStatus::Failed, Some(e.to_string()));
                self.persist(&task).await;
                return task;
            }
        };

        match self.executor.execute(plan, &cancel).await {
            Ok(execution) => {
                let status = match execution.status {
                    ExecutionStatus::Completed => TaskStatus::Completed,
                    ExecutionStatus::Partial => TaskStatus::Partial,
                    ExecutionStatus::Failed => TaskStatus::Failed,
                };
                let error = execution.error.clone();
                task.execution = Some(execution);
                task.finish(status, error);
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Execution failed");
                task.finish(TaskStatus::Failed, Some(e.to_string()));
            }
        }

        self.persist(&task).await;
        task
    }

    /// Stores the task summary. Failures are logged, never escalated.
    async fn persist(&self, task: &Task) {
        let summary = summarize(task);
        let results = &self.collaborators.results_store;
        if let Err(e) = results.store(&format!("task:{}", task.id), summary.clone()).await {
            warn!(task_id = %task.id, error = %e, "Storing task result failed");
        }
        if let Err(e) = results.append(RESULTS_HISTORY_KEY, summary).await {
            warn!(task_id = %task.id, error = %e, "Appending task summary failed");
        }
    }

    async fn release(&self, task: Task) {
        {
            let mut state = self.state.lock().await;
            state.active.remove(&task.id);
            match task.status {
                TaskStatus::Completed => state.completed += 1,
                TaskStatus::Partial => state.partial += 1,
                _ => state.failed += 1,
            }

            let capacity = self.config.reasoning_buffer;
            if let Some(execution) = &task.execution {
                for line in &execution.reasoning {
                    state.note(capacity, format!("[{}] {line}", task.id));
                }
            }
            let line = match &task.error {
                Some(error) => format!("[{}] {}: {error}", task.id, task.status),
                None => format!("[{}] {}", task.id, task.status),
            };
            state.note(capacity, line);

            info!(task_id = %task.id, status = %task.status, active = state.active.len(), "Task finished");
            state.history.push(task);
        }
        self.wake.notify_one();
        self.settled.notify_waiters();
    }
}

fn summarize(task: &Task) -> Value {
    json!({
        "task_id": task.id,
        "task_type": task.task_type,
        "target_id": task.context.target_id,
        "priority": task.priority,
        "status": task.status,
        "error": task.error,
        "metrics": task.execution.as_ref().map(|e| e.metrics),
        "completed_at": task.timestamps.completed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MemoryResultsStore, Relationships, Validation};
    use crate::task::{Priority, TaskContext, TaskType};
    use crate::test_support::{failing_registry, stub_registry};
    use crate::tools::catalog::{SEND_NOTIFICATION, standard_descriptors};
    use crate::tools::handler_fn;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    async fn idle(orchestrator: &Orchestrator) {
        tokio::time::timeout(Duration::from_secs(5), orchestrator.wait_idle()).await.expect("queue drained in time");
    }

    fn orchestrator_with(registry: ToolRegistry, collaborators: Collaborators, cap: usize) -> Orchestrator {
        let config = HeraldConfig::default().with_max_concurrent_tasks(cap);
        Orchestrator::new(&config, Arc::new(registry), collaborators).unwrap()
    }

    fn in_memory() -> Collaborators {
        Collaborators::in_memory(Arc::new(MemoryNotificationHistory::new()))
    }

    /// Registry whose tools sleep briefly so tasks overlap.
    fn slow_registry(delay_ms: u64) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for descriptor in standard_descriptors() {
            let handler = handler_fn(move |_args| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(json!({}))
            });
            registry.register_descriptor(descriptor.with_handler(handler)).unwrap();
        }
        registry
    }

    fn build(target: &str, result: &str, priority: Priority) -> Task {
        Task::new(TaskType::BuildCompleted, priority, TaskContext::for_target(target).with_result(result))
    }

    #[tokio::test]
    async fn test_processes_task_to_completion() {
        let results = Arc::new(MemoryResultsStore::new());
        let collaborators = Collaborators { results_store: results.clone(), ..in_memory() };
        let orchestrator = orchestrator_with(stub_registry(), collaborators, 3);
        orchestrator.start().await.unwrap();

        let outcome = orchestrator.enqueue(build("982", "failed", Priority::High)).await.unwrap();
        let EnqueueOutcome::Queued { task_id } = outcome else { panic!("expected queued") };
        idle(&orchestrator).await;

        let task = orchestrator.find_in_history(&task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.execution.as_ref().unwrap().metrics.completed, 5);
        assert!(task.timestamps.started_at.is_some());
        assert!(task.timestamps.completed_at.is_some());

        let stored = results.get(&format!("task:{task_id}")).await.unwrap();
        assert_eq!(stored["status"], json!("completed"));
        assert_eq!(results.history(RESULTS_HISTORY_KEY).await.len(), 1);

        let status = orchestrator.status().await;
        assert_eq!(status.completed, 1);
        assert_eq!(status.queue_depth, 0);
        assert!(status.recent_reasoning.iter().any(|l| l.contains(&task_id)));
        assert_eq!(status.tools.total_tools, 12);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_task_is_rejected() {
        let orchestrator = orchestrator_with(stub_registry(), in_memory(), 3);
        let task = Task::new(TaskType::ItemUpdated, Priority::Medium, TaskContext::default());
        let err = orchestrator.enqueue(task).await.unwrap_err();
        assert!(matches!(err, HeraldError::Validation(_)));
        assert_eq!(orchestrator.status().await.queue_depth, 0);
    }

    #[tokio::test]
    async fn test_duplicate_of_queued_task_is_dropped() {
        let orchestrator = orchestrator_with(stub_registry(), in_memory(), 3);
        let first = Task::new(
            TaskType::ItemUpdated,
            Priority::Medium,
            TaskContext::for_target("42").with_transition("New", "Active"),
        );
        let second = Task { id: "task-second".to_string(), ..first.clone() };

        assert!(matches!(orchestrator.enqueue(first.clone()).await.unwrap(), EnqueueOutcome::Queued { .. }));
        let outcome = orchestrator.enqueue(second).await.unwrap();
        assert_eq!(
            outcome,
            EnqueueOutcome::Duplicate { task_id: "task-second".to_string(), of: vec![first.id.clone()] }
        );

        orchestrator.start().await.unwrap();
        idle(&orchestrator).await;
        let history = orchestrator.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, first.id);
        assert_eq!(orchestrator.status().await.duplicates_dropped, 1);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_of_processing_task_is_dropped() {
        let orchestrator = orchestrator_with(slow_registry(200), in_memory(), 3);
        orchestrator.start().await.unwrap();
        let event = json!({"id": "42", "previous_state": "New", "state": "Active"});

        let Some(EnqueueOutcome::Queued { task_id }) = orchestrator.ingest("item.updated", &event).await.unwrap() else {
            panic!("expected queued");
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = orchestrator.status().await;
        assert_eq!((status.active, status.queue_depth), (1, 0));

        let outcome = orchestrator.ingest("item.updated", &event).await.unwrap().unwrap();
        let EnqueueOutcome::Duplicate { of, .. } = outcome else { panic!("expected duplicate") };
        assert_eq!(of, vec![task_id]);

        idle(&orchestrator).await;
        assert_eq!(orchestrator.history().await.len(), 1);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_order_follows_priority() {
        let orchestrator = orchestrator_with(stub_registry(), in_memory(), 1);
        let now = Utc::now();
        let tasks = [
            ("low", Priority::Low, 0),
            ("medium-late", Priority::Medium, 1),
            ("critical", Priority::Critical, 2),
            ("medium-early", Priority::Medium, 5),
            ("high", Priority::High, 3),
        ];
        for (target, priority, minutes_ago) in tasks {
            let task = build(target, "succeeded", priority).with_event_time(now - ChronoDuration::minutes(minutes_ago));
            orchestrator.enqueue(task).await.unwrap();
        }

        orchestrator.start().await.unwrap();
        idle(&orchestrator).await;

        let order: Vec<String> = orchestrator.history().await.iter().map(|t| t.target().to_string()).collect();
        assert_eq!(order, vec!["critical", "high", "medium-early", "medium-late", "low"]);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_active_count_never_exceeds_cap() {
        let orchestrator = orchestrator_with(slow_registry(20), in_memory(), 2);
        orchestrator.start().await.unwrap();
        for i in 0..6 {
            orchestrator.enqueue(build(&format!("b{i}"), "succeeded", Priority::Medium)).await.unwrap();
        }
        idle(&orchestrator).await;

        let status = orchestrator.status().await;
        assert_eq!(status.completed, 6);
        assert_eq!(status.peak_active, 2);
        assert_eq!(status.active, 0);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_partial_when_notification_fails() {
        let orchestrator = orchestrator_with(failing_registry(&[SEND_NOTIFICATION]), in_memory(), 3);
        orchestrator.start().await.unwrap();
        let Some(EnqueueOutcome::Queued { task_id }) = orchestrator
            .ingest("build.completed", &json!({"id": "982", "result": "failed"}))
            .await
            .unwrap()
        else {
            panic!("expected queued")
        };
        idle(&orchestrator).await;

        let task = orchestrator.find_in_history(&task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Partial);
        assert_eq!(orchestrator.status().await.partial, 1);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_ignores_unknown_events() {
        let orchestrator = orchestrator_with(stub_registry(), in_memory(), 3);
        assert!(orchestrator.ingest("item.deleted", &json!({"id": "1"})).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_panicking_tool_fails_task_and_frees_slot() {
        let mut registry = ToolRegistry::new();
        for descriptor in standard_descriptors() {
            let panics = descriptor.name == SEND_NOTIFICATION;
            let handler = handler_fn(move |_args| async move {
                assert!(!panics, "notification transport exploded");
                Ok(json!({}))
            });
            registry.register_descriptor(descriptor.with_handler(handler)).unwrap();
        }
        let orchestrator = orchestrator_with(registry, in_memory(), 1);
        orchestrator.start().await.unwrap();

        orchestrator.enqueue(build("1", "succeeded", Priority::High)).await.unwrap();
        let poll = Task::new(TaskType::PollingBuilds, Priority::Low, TaskContext::default());
        orchestrator.enqueue(poll).await.unwrap();
        idle(&orchestrator).await;

        let history = orchestrator.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, TaskStatus::Failed);
        assert!(history[0].error.as_deref().unwrap().contains("aborted"));
        assert_eq!(history[1].status, TaskStatus::Completed);
        orchestrator.shutdown().await;
    }

    struct BrokenStores;

    #[async_trait]
    impl StateStore for BrokenStores {
        async fn update_for_task(&self, _task: &Task) -> Result<()> {
            Err(HeraldError::collaborator("state_store", "disk full"))
        }
    }

    #[async_trait]
    impl ResultsStore for BrokenStores {
        async fn store(&self, _key: &str, _record: Value) -> Result<()> {
            Err(HeraldError::collaborator("results_store", "disk full"))
        }

        async fn append(&self, _history_key: &str, _summary: Value) -> Result<()> {
            Err(HeraldError::collaborator("results_store", "disk full"))
        }
    }

    #[tokio::test]
    async fn test_store_failures_do_not_fail_tasks() {
        let collaborators =
            Collaborators { state_store: Arc::new(BrokenStores), results_store: Arc::new(BrokenStores), ..in_memory() };
        let orchestrator = orchestrator_with(stub_registry(), collaborators, 3);
        orchestrator.start().await.unwrap();
        orchestrator.enqueue(build("982", "succeeded", Priority::Low)).await.unwrap();
        idle(&orchestrator).await;

        assert_eq!(orchestrator.history().await[0].status, TaskStatus::Completed);
        orchestrator.shutdown().await;
    }

    struct BrokenHistory;

    #[async_trait]
    impl NotificationHistory for BrokenHistory {
        async fn is_recent_for_target(&self, _target_id: &str, _window_hours: u64) -> Result<bool> {
            Err(HeraldError::collaborator("notification_history", "unreachable"))
        }

        async fn should_escalate(
            &self,
            _target_id: &str,
            _category: &str,
            _threshold: u32,
            _window_hours: u64,
        ) -> Result<crate::collaborators::EscalationVerdict> {
            Err(HeraldError::collaborator("notification_history", "unreachable"))
        }
    }

    #[tokio::test]
    async fn test_planning_failure_fails_task_without_running_steps() {
        let registry = Arc::new(stub_registry());
        let collaborators = Collaborators { notification_history: Arc::new(BrokenHistory), ..in_memory() };
        let orchestrator = Orchestrator::new(&HeraldConfig::default(), Arc::clone(&registry), collaborators).unwrap();
        orchestrator.start().await.unwrap();
        orchestrator.enqueue(build("982", "failed", Priority::High)).await.unwrap();
        idle(&orchestrator).await;

        let task = &orchestrator.history().await[0];
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_deref().unwrap().contains("Planning failed"));
        assert!(task.execution.is_none());
        assert!(registry.stats().await.usage.is_empty());
        orchestrator.shutdown().await;
    }

    struct RejectAll;

    impl Classifier for RejectAll {
        fn interpret_event(&self, _event_type: &str, _payload: &Value) -> Option<Task> {
            None
        }

        fn validate_task(&self, _task: &Task) -> Validation {
            Validation::invalid("closed for maintenance")
        }

        fn analyze_relationships(&self, _task: &Task, _candidates: &[&Task]) -> Relationships {
            Relationships::default()
        }
    }

    #[tokio::test]
    async fn test_uses_injected_classifier() {
        let collaborators = Collaborators { classifier: Arc::new(RejectAll), ..in_memory() };
        let orchestrator = orchestrator_with(stub_registry(), collaborators, 3);
        let err = orchestrator.enqueue(build("1", "failed", Priority::High)).await.unwrap_err();
        assert!(err.to_string().contains("closed for maintenance"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_active_and_clears_queue() {
        let orchestrator = orchestrator_with(slow_registry(5_000), in_memory(), 1);
        orchestrator.start().await.unwrap();
        orchestrator.enqueue(build("a", "succeeded", Priority::High)).await.unwrap();
        orchestrator.enqueue(build("b", "succeeded", Priority::Low)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(orchestrator.status().await.active, 1);

        tokio::time::timeout(Duration::from_secs(2), orchestrator.shutdown()).await.expect("shutdown finished");
        let status = orchestrator.status().await;
        assert!(!status.running);
        assert_eq!(status.queue_depth, 0);
        assert_eq!(status.active, 0);

        let history = orchestrator.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_tasks_enqueued_after_shutdown_wait_for_restart() {
        let orchestrator = orchestrator_with(slow_registry(20), in_memory(), 1);
        orchestrator.start().await.unwrap();
        orchestrator.shutdown().await;

        orchestrator.enqueue(build("a", "succeeded", Priority::High)).await.unwrap();
        orchestrator.enqueue(build("b", "succeeded", Priority::High)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = orchestrator.status().await;
        assert_eq!((status.active, status.queue_depth), (0, 2));

        orchestrator.start().await.unwrap();
        idle(&orchestrator).await;
        let status = orchestrator.status().await;
        assert_eq!(status.completed, 2);
        assert_eq!(status.peak_active, 1);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_counts_cancelled_tasks_until_released() {
        let orchestrator = orchestrator_with(slow_registry(5_000), in_memory(), 1);
        orchestrator.start().await.unwrap();
        orchestrator.enqueue(build("a", "succeeded", Priority::High)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        orchestrator.shutdown().await;
        orchestrator.start().await.unwrap();
        orchestrator.enqueue(build("b", "succeeded", Priority::High)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = orchestrator.status().await;
        assert_eq!(status.peak_active, 1);
        assert_eq!(status.active, 1);
        assert_eq!(status.failed, 1);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let orchestrator = orchestrator_with(stub_registry(), in_memory(), 3);
        orchestrator.start().await.unwrap();
        assert!(matches!(orchestrator.start().await, Err(HeraldError::Orchestrator(_))));
        orchestrator.shutdown().await;
    }
}
