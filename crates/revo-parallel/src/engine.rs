use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use revo_config::ParallelConfig;
use revo_core::{AppError, TaskPriority, TaskType};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::executor::{SimulatedExecutor, TaskExecutor};
use crate::graph::TaskGraph;
use crate::task::{Task, TaskStatus};

const CANCELLED_BY_REQUEST: &str = "cancelled by request";

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    /// Task ids in the order they completed.
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    pub cancelled_steps: Vec<String>,
    pub results: BTreeMap<String, Value>,
    pub errors: BTreeMap<String, String>,
    pub timed_out: bool,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl WorkflowResult {
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.failed_steps.is_empty() && self.cancelled_steps.is_empty()
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub busy: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParallelStats {
    pub pools: BTreeMap<String, PoolStats>,
    /// Tasks currently tracked, by status.
    pub tasks_by_status: BTreeMap<String, usize>,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_cancelled: u64,
    pub total_retries: u64,
    pub workflows_run: u64,
}

/// Worker pools plus a registry of every task they have been given.
///
/// Each task type gets its own fixed-size pool; a task holds one permit of
/// its type's pool while its executor runs. Cloning is cheap and clones share
/// pools and registry.
#[derive(Clone)]
pub struct ParallelMindEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    pools: BTreeMap<TaskType, Pool>,
    executor: Arc<dyn TaskExecutor>,
    max_retries: u32,
    default_timeout: Duration,
    registry: Mutex<HashMap<String, TaskSlot>>,
    counters: Counters,
}

struct Pool {
    size: usize,
    semaphore: Arc<Semaphore>,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    retried: AtomicU64,
    workflows: AtomicU64,
}

impl Counters {
    fn record(&self, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Completed => &self.completed,
            TaskStatus::Failed => &self.failed,
            TaskStatus::Cancelled => &self.cancelled,
            TaskStatus::Pending | TaskStatus::Running => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct TaskSlot {
    task: Task,
    cancel: Arc<Notify>,
    status: watch::Sender<TaskStatus>,
}

impl TaskSlot {
    fn new(mut task: Task) -> Self {
        task.status = TaskStatus::Pending;
        let (status, _) = watch::channel(TaskStatus::Pending);
        Self {
            task,
            cancel: Arc::new(Notify::new()),
            status,
        }
    }

    fn set_status(&mut self, status: TaskStatus) {
        if status.is_terminal() {
            self.task.finish(status);
        } else {
            if status == TaskStatus::Running {
                self.task.started_at = Some(chrono::Utc::now());
            }
            self.task.status = status;
        }
        self.status.send_replace(status);
    }
}

enum RunOutcome {
    Succeeded(Value),
    Failed(String),
    Cancelled(String),
}

/// Aborts the wrapped task when dropped, so a cancelled or timed-out
/// scheduler future never leaves its executor running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl ParallelMindEngine {
    pub fn new(config: &ParallelConfig, executor: Arc<dyn TaskExecutor>) -> Self {
        let pools = TaskType::ALL
            .into_iter()
            .map(|task_type| {
                let size = config.pool_size(task_type).max(1);
                (
                    task_type,
                    Pool {
                        size,
                        semaphore: Arc::new(Semaphore::new(size)),
                    },
                )
            })
            .collect();

        Self {
            inner: Arc::new(EngineInner {
                pools,
                executor,
                max_retries: config.max_retries,
                default_timeout: Duration::from_secs(config.workflow_timeout_secs),
                registry: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    /// Engine backed by [`SimulatedExecutor`] scaled by `work_scale`.
    pub fn simulated(config: &ParallelConfig) -> Self {
        Self::new(config, Arc::new(SimulatedExecutor::new(config.work_scale)))
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Run `tasks` to completion in dependency order.
    ///
    /// Ready tasks start in priority order (then submission order). Failed
    /// tasks are resubmitted until their retry budget is spent; after that
    /// every downstream task fails too. When `timeout` elapses, whatever is
    /// still running is aborted and all unfinished tasks are cancelled.
    pub async fn execute_workflow(&self, tasks: Vec<Task>, timeout: Duration) -> Result<WorkflowResult> {
        let started = Instant::now();
        // None when the timeout is too large to represent: no deadline.
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        let graph = TaskGraph::build(&tasks)?;
        self.inner.register_all(&tasks)?;
        self.inner.counters.workflows.fetch_add(1, Ordering::Relaxed);

        let workflow_id = Ulid::new().to_string();
        info!(
            %workflow_id,
            tasks = graph.len(),
            edges = graph.edge_count(),
            timeout_secs = timeout.as_secs_f64(),
            "starting workflow"
        );

        let mut run = WorkflowRun::new(&graph, tasks, workflow_id);
        let mut join_set: JoinSet<(usize, RunOutcome)> = JoinSet::new();
        let mut timed_out = false;

        loop {
            self.dispatch_ready(&mut run, &mut join_set)?;
            let blocked = run.next_blocked();
            if join_set.is_empty() && blocked.is_none() {
                break;
            }

            tokio::select! {
                _ = sleep_until_deadline(deadline) => {
                    timed_out = true;
                    warn!(workflow_id = %run.result.workflow_id, "workflow timed out, aborting running tasks");
                    join_set.shutdown().await;
                    break;
                }
                joined = join_set.join_next(), if !join_set.is_empty() => match joined {
                    None => {}
                    Some(Err(error)) => {
                        warn!(workflow_id = %run.result.workflow_id, %error, "workflow task join error");
                    }
                    Some(Ok((position, outcome))) => run.apply(&self.inner, position, outcome)?,
                },
                acquired = self.inner.acquire_slot(blocked) => {
                    let (task_type, permit) = acquired?;
                    self.launch_next(&mut run, &mut join_set, task_type, permit)?;
                }
            }
        }

        run.sweep(&self.inner, timed_out)?;
        let mut result = run.result;
        result.timed_out = timed_out;
        result.duration = started.elapsed();
        info!(
            workflow_id = %result.workflow_id,
            completed = result.completed_steps.len(),
            failed = result.failed_steps.len(),
            cancelled = result.cancelled_steps.len(),
            timed_out,
            duration_ms = result.duration.as_millis() as u64,
            "workflow finished"
        );
        Ok(result)
    }

    /// Start ready tasks while their pools have free slots. A task is only
    /// spawned once it holds a slot, so slots go out in priority order.
    fn dispatch_ready(
        &self,
        run: &mut WorkflowRun<'_>,
        join_set: &mut JoinSet<(usize, RunOutcome)>,
    ) -> Result<()> {
        for (task_type, pool) in &self.inner.pools {
            while run.has_ready(*task_type) {
                let Ok(permit) = Arc::clone(&pool.semaphore).try_acquire_owned() else {
                    break;
                };
                self.launch_next(run, join_set, *task_type, permit)?;
            }
        }
        Ok(())
    }

    /// Spawn the highest-priority ready task of `task_type` on `permit`.
    fn launch_next(
        &self,
        run: &mut WorkflowRun<'_>,
        join_set: &mut JoinSet<(usize, RunOutcome)>,
        task_type: TaskType,
        permit: OwnedSemaphorePermit,
    ) -> Result<()> {
        let Some(position) = run.pop_ready(task_type) else {
            return Ok(());
        };
        let Some(cancel) = self.inner.cancel_handle_if_pending(run.graph.id(position))? else {
            // Cancelled while waiting for its dependencies.
            return run.settle(&self.inner, position, RunOutcome::Cancelled(CANCELLED_BY_REQUEST.into()));
        };
        let task = run.tasks[position].clone();
        let inner = Arc::clone(&self.inner);
        join_set.spawn(async move { (position, run_with_slot(inner, task, cancel, permit).await) });
        Ok(())
    }

    /// Start a single task in the background and return its id.
    ///
    /// Every dependency must already be known to the engine. Dependencies
    /// that have not finished yet are waited for; if one ends in any state
    /// other than completed, this task fails without running.
    pub fn submit_task(&self, task: Task) -> Result<String> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| anyhow!("submit_task must be called inside a tokio runtime"))?;

        let mut waits = Vec::new();
        {
            let mut registry = self.inner.registry()?;
            if let Some(existing) = registry.get(&task.id) {
                if !existing.task.status.is_terminal() {
                    bail!("task '{}' is already {}", task.id, existing.task.status);
                }
            }
            for dependency in &task.dependencies {
                let slot = registry.get(dependency).ok_or_else(|| AppError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dependency.clone(),
                })?;
                if slot.task.status != TaskStatus::Completed {
                    waits.push((dependency.clone(), slot.status.subscribe()));
                }
            }
            registry.insert(task.id.clone(), TaskSlot::new(task.clone()));
        }

        let id = task.id.clone();
        debug!(task_id = %id, task_type = %task.task_type, waits = waits.len(), "task submitted");
        runtime.spawn(run_submitted(Arc::clone(&self.inner), task, waits));
        Ok(id)
    }

    pub fn get_task_status(&self, id: &str) -> Result<Task> {
        self.inner.update_slot(id, |slot| slot.task.clone())
    }

    /// Wait until the task reaches a terminal state and return it.
    pub async fn wait_for_task(&self, id: &str) -> Result<Task> {
        let receiver = self.inner.update_slot(id, |slot| slot.status.subscribe())?;
        wait_terminal(receiver).await;
        self.get_task_status(id)
    }

    /// Cancel a task. Pending tasks never start; running tasks are aborted.
    /// Returns false when the task had already finished.
    pub fn cancel_task(&self, id: &str) -> Result<bool> {
        let cancelled = self.inner.update_slot(id, |slot| {
            if slot.task.status.is_terminal() {
                return false;
            }
            slot.task.error = Some(CANCELLED_BY_REQUEST.to_string());
            slot.set_status(TaskStatus::Cancelled);
            slot.cancel.notify_one();
            true
        })?;
        if cancelled {
            self.inner.counters.record(TaskStatus::Cancelled);
            info!(task_id = id, "task cancelled");
        }
        Ok(cancelled)
    }

    /// Drop finished tasks from the registry. Returns how many were removed.
    pub fn forget_finished(&self) -> Result<usize> {
        let mut registry = self.inner.registry()?;
        let before = registry.len();
        registry.retain(|_, slot| !slot.task.status.is_terminal());
        Ok(before - registry.len())
    }

    pub fn stats(&self) -> Result<ParallelStats> {
        let mut tasks_by_status = BTreeMap::new();
        for slot in self.inner.registry()?.values() {
            *tasks_by_status
                .entry(slot.task.status.to_string())
                .or_insert(0usize) += 1;
        }

        let pools = self
            .inner
            .pools
            .iter()
            .map(|(task_type, pool)| {
                let busy = pool.size.saturating_sub(pool.semaphore.available_permits());
                (
                    task_type.to_string(),
                    PoolStats {
                        size: pool.size,
                        busy,
                    },
                )
            })
            .collect();

        let counters = &self.inner.counters;
        Ok(ParallelStats {
            pools,
            tasks_by_status,
            total_completed: counters.completed.load(Ordering::Relaxed),
            total_failed: counters.failed.load(Ordering::Relaxed),
            total_cancelled: counters.cancelled.load(Ordering::Relaxed),
            total_retries: counters.retried.load(Ordering::Relaxed),
            workflows_run: counters.workflows.load(Ordering::Relaxed),
        })
    }
}

impl EngineInner {
    fn registry(&self) -> Result<MutexGuard<'_, HashMap<String, TaskSlot>>> {
        self.registry
            .lock()
            .map_err(|_| anyhow!("parallel mind registry poisoned"))
    }

    fn update_slot<T>(&self, id: &str, apply: impl FnOnce(&mut TaskSlot) -> T) -> Result<T> {
        let mut registry = self.registry()?;
        let slot = registry
            .get_mut(id)
            .ok_or_else(|| AppError::TaskNotFound(id.to_string()))?;
        Ok(apply(slot))
    }

    fn register_all(&self, tasks: &[Task]) -> Result<()> {
        let mut registry = self.registry()?;
        for task in tasks {
            if let Some(existing) = registry.get(&task.id) {
                if !existing.task.status.is_terminal() {
                    bail!("task '{}' is already {}", task.id, existing.task.status);
                }
            }
        }
        for task in tasks {
            registry.insert(task.id.clone(), TaskSlot::new(task.clone()));
        }
        Ok(())
    }

    /// The task's cancel signal, or None when it was cancelled before it
    /// could start.
    fn cancel_handle_if_pending(&self, id: &str) -> Result<Option<Arc<Notify>>> {
        self.update_slot(id, |slot| {
            (slot.task.status == TaskStatus::Pending).then(|| Arc::clone(&slot.cancel))
        })
    }

    /// Pending -> Running. False when the task was cancelled in the meantime.
    fn mark_running(&self, id: &str) -> Result<bool> {
        self.update_slot(id, |slot| {
            if slot.task.status.is_terminal() {
                return false;
            }
            slot.set_status(TaskStatus::Running);
            true
        })
    }

    /// Put a failed task back to Pending if it has retries left. Returns the
    /// new attempt number.
    fn schedule_retry(&self, id: &str, error: &str, max_retries: u32) -> Result<Option<u32>> {
        let attempt = self.update_slot(id, |slot| {
            if slot.task.status.is_terminal() || slot.task.retry_count >= max_retries {
                return None;
            }
            slot.task.retry_count += 1;
            slot.task.error = Some(error.to_string());
            slot.set_status(TaskStatus::Pending);
            Some(slot.task.retry_count)
        })?;
        if let Some(attempt) = attempt {
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
            warn!(task_id = id, attempt, max_retries, error, "task failed, retrying");
        }
        Ok(attempt)
    }

    /// Record a final outcome. A task that is already terminal (cancelled
    /// while its executor was finishing) keeps its state. Returns the
    /// resulting status.
    fn settle(&self, id: &str, outcome: &RunOutcome) -> Result<TaskStatus> {
        let (status, changed) = self.update_slot(id, |slot| {
            if slot.task.status.is_terminal() {
                return (slot.task.status, false);
            }
            match outcome {
                RunOutcome::Succeeded(value) => {
                    slot.task.result = Some(value.clone());
                    slot.task.error = None;
                    slot.set_status(TaskStatus::Completed);
                }
                RunOutcome::Failed(error) => {
                    slot.task.error = Some(error.clone());
                    slot.set_status(TaskStatus::Failed);
                }
                RunOutcome::Cancelled(reason) => {
                    slot.task.error = Some(reason.clone());
                    slot.set_status(TaskStatus::Cancelled);
                }
            }
            (slot.task.status, true)
        })?;

        if changed {
            self.counters.record(status);
            match outcome {
                RunOutcome::Failed(error) => warn!(task_id = id, error = %error, "task failed"),
                _ => debug!(task_id = id, %status, "task settled"),
            }
        }
        Ok(status)
    }

    /// Wait for a free slot in `task_type`'s pool. Never resolves for None.
    async fn acquire_slot(&self, task_type: Option<TaskType>) -> Result<(TaskType, OwnedSemaphorePermit)> {
        let Some((task_type, pool)) =
            task_type.and_then(|task_type| self.pools.get(&task_type).map(|pool| (task_type, pool)))
        else {
            return std::future::pending().await;
        };
        let permit = Arc::clone(&pool.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| anyhow!("worker pool for {task_type} closed"))?;
        Ok((task_type, permit))
    }

    async fn run_on_pool(&self, task: Task) -> RunOutcome {
        let Some(pool) = self.pools.get(&task.task_type) else {
            return RunOutcome::Failed(format!("no worker pool for task type {}", task.task_type));
        };
        let Ok(_permit) = pool.semaphore.acquire().await else {
            return RunOutcome::Failed("worker pool closed".to_string());
        };
        self.run_holding_slot(task).await
    }

    /// Run one attempt. The caller holds a slot of the task's pool.
    async fn run_holding_slot(&self, task: Task) -> RunOutcome {
        match self.mark_running(&task.id) {
            Ok(true) => {}
            Ok(false) => return RunOutcome::Cancelled(CANCELLED_BY_REQUEST.to_string()),
            Err(error) => return RunOutcome::Failed(format!("{error:#}")),
        }
        debug!(task_id = %task.id, task_type = %task.task_type, attempt = task.retry_count, "task started");

        let executor = Arc::clone(&self.executor);
        let mut handle = AbortOnDrop(tokio::spawn(async move { executor.execute(&task).await }));
        match (&mut handle.0).await {
            Ok(Ok(value)) => RunOutcome::Succeeded(value),
            Ok(Err(error)) => RunOutcome::Failed(format!("{error:#}")),
            Err(join_error) => RunOutcome::Failed(format!("task executor panicked: {join_error}")),
        }
    }
}

/// One attempt: wait for a pool slot and run, unless cancelled first.
async fn run_task(inner: Arc<EngineInner>, task: Task, cancel: Arc<Notify>) -> RunOutcome {
    tokio::select! {
        _ = cancel.notified() => RunOutcome::Cancelled(CANCELLED_BY_REQUEST.to_string()),
        outcome = inner.run_on_pool(task) => outcome,
    }
}

/// One workflow attempt on an already acquired pool slot, unless cancelled
/// first. The slot is released when the attempt ends.
async fn run_with_slot(
    inner: Arc<EngineInner>,
    task: Task,
    cancel: Arc<Notify>,
    permit: OwnedSemaphorePermit,
) -> RunOutcome {
    let _permit = permit;
    tokio::select! {
        _ = cancel.notified() => RunOutcome::Cancelled(CANCELLED_BY_REQUEST.to_string()),
        outcome = inner.run_holding_slot(task) => outcome,
    }
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_terminal(mut receiver: watch::Receiver<TaskStatus>) -> TaskStatus {
    match receiver.wait_for(|status| status.is_terminal()).await {
        Ok(status) => *status,
        // Sender dropped: the task was forgotten before it finished.
        Err(_) => TaskStatus::Cancelled,
    }
}

async fn run_submitted(
    inner: Arc<EngineInner>,
    mut task: Task,
    waits: Vec<(String, watch::Receiver<TaskStatus>)>,
) {
    let id = task.id.clone();
    let outcome = match prepare_submitted(&inner, &mut task, waits).await {
        Ok(outcome) => outcome,
        Err(error) => RunOutcome::Failed(format!("{error:#}")),
    };
    if let Err(error) = inner.settle(&id, &outcome) {
        let reason = format!("{error:#}");
        warn!(task_id = %id, %reason, "failed to record task outcome");
    }
}

async fn prepare_submitted(
    inner: &Arc<EngineInner>,
    task: &mut Task,
    waits: Vec<(String, watch::Receiver<TaskStatus>)>,
) -> Result<RunOutcome> {
    let cancel = inner.update_slot(&task.id, |slot| Arc::clone(&slot.cancel))?;

    for (dependency, receiver) in waits {
        let status = tokio::select! {
            _ = cancel.notified() => {
                return Ok(RunOutcome::Cancelled(CANCELLED_BY_REQUEST.to_string()));
            }
            status = wait_terminal(receiver) => status,
        };
        if status != TaskStatus::Completed {
            return Ok(RunOutcome::Failed(format!("dependency '{dependency}' {status}")));
        }
    }

    let max_retries = task.max_retries.unwrap_or(inner.max_retries);
    loop {
        match run_task(Arc::clone(inner), task.clone(), Arc::clone(&cancel)).await {
            RunOutcome::Failed(error) => match inner.schedule_retry(&task.id, &error, max_retries)? {
                Some(attempt) => task.retry_count = attempt,
                None => return Ok(RunOutcome::Failed(error)),
            },
            other => return Ok(other),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ReadyTask {
    priority: TaskPriority,
    seq: usize,
    position: usize,
}

impl Ord for ReadyTask {
    /// Max-heap order: higher priority first, then lower sequence number.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Scheduler state for one `execute_workflow` call.
struct WorkflowRun<'g> {
    graph: &'g TaskGraph,
    tasks: Vec<Task>,
    /// Unfinished dependency count per task.
    waiting_on: Vec<usize>,
    settled: Vec<bool>,
    /// Ready tasks waiting for a slot, per pool.
    ready: BTreeMap<TaskType, BinaryHeap<ReadyTask>>,
    next_seq: usize,
    result: WorkflowResult,
}

impl<'g> WorkflowRun<'g> {
    fn new(graph: &'g TaskGraph, tasks: Vec<Task>, workflow_id: String) -> Self {
        let count = tasks.len();
        let mut run = Self {
            graph,
            tasks,
            waiting_on: (0..count).map(|p| graph.dependencies(p).len()).collect(),
            settled: vec![false; count],
            ready: BTreeMap::new(),
            next_seq: 0,
            result: WorkflowResult {
                workflow_id,
                completed_steps: Vec::new(),
                failed_steps: Vec::new(),
                cancelled_steps: Vec::new(),
                results: BTreeMap::new(),
                errors: BTreeMap::new(),
                timed_out: false,
                duration: Duration::ZERO,
            },
        };
        for position in 0..count {
            if run.waiting_on[position] == 0 {
                run.push_ready(position);
            }
        }
        run
    }

    fn push_ready(&mut self, position: usize) {
        let task = &self.tasks[position];
        self.ready.entry(task.task_type).or_default().push(ReadyTask {
            priority: task.priority,
            seq: self.next_seq,
            position,
        });
        self.next_seq += 1;
    }

    fn has_ready(&self, task_type: TaskType) -> bool {
        self.ready.get(&task_type).is_some_and(|heap| !heap.is_empty())
    }

    fn pop_ready(&mut self, task_type: TaskType) -> Option<usize> {
        self.ready.get_mut(&task_type)?.pop().map(|ready| ready.position)
    }

    /// The pool whose best waiting task outranks every other waiting task.
    fn next_blocked(&self) -> Option<TaskType> {
        self.ready
            .iter()
            .filter_map(|(task_type, heap)| heap.peek().map(|top| (top, *task_type)))
            .max_by(|a, b| a.0.cmp(b.0))
            .map(|(_, task_type)| task_type)
    }

    fn apply(&mut self, inner: &EngineInner, position: usize, outcome: RunOutcome) -> Result<()> {
        if let RunOutcome::Failed(error) = &outcome {
            let task = &self.tasks[position];
            let max_retries = task.max_retries.unwrap_or(inner.max_retries);
            if let Some(attempt) = inner.schedule_retry(&task.id, error, max_retries)? {
                self.tasks[position].retry_count = attempt;
                self.push_ready(position);
                return Ok(());
            }
        }
        self.settle(inner, position, outcome)
    }

    /// Record a final outcome and push its consequences downstream.
    fn settle(&mut self, inner: &EngineInner, position: usize, outcome: RunOutcome) -> Result<()> {
        let id = self.graph.id(position).to_string();
        let status = inner.settle(&id, &outcome)?;
        self.record(inner, position, status)?;

        match status {
            TaskStatus::Completed => {
                if let RunOutcome::Succeeded(value) = outcome {
                    self.result.results.insert(id, value);
                }
                for &next in self.graph.dependents(position) {
                    self.waiting_on[next] = self.waiting_on[next].saturating_sub(1);
                    if self.waiting_on[next] == 0 && !self.settled[next] {
                        self.push_ready(next);
                    }
                }
            }
            TaskStatus::Failed | TaskStatus::Cancelled => {
                let verb = if status == TaskStatus::Failed { "failed" } else { "was cancelled" };
                let reason = format!("dependency '{id}' {verb}");
                for downstream in self.graph.transitive_dependents(position) {
                    if self.settled[downstream] {
                        continue;
                    }
                    let downstream_outcome = if status == TaskStatus::Failed {
                        RunOutcome::Failed(reason.clone())
                    } else {
                        RunOutcome::Cancelled(reason.clone())
                    };
                    let downstream_status =
                        inner.settle(self.graph.id(downstream), &downstream_outcome)?;
                    self.record(inner, downstream, downstream_status)?;
                }
            }
            TaskStatus::Pending | TaskStatus::Running => {}
        }
        Ok(())
    }

    fn record(&mut self, inner: &EngineInner, position: usize, status: TaskStatus) -> Result<()> {
        if self.settled[position] {
            return Ok(());
        }
        self.settled[position] = true;
        let id = self.graph.id(position).to_string();
        match status {
            TaskStatus::Completed => self.result.completed_steps.push(id),
            TaskStatus::Failed | TaskStatus::Cancelled => {
                if let Some(error) = inner.update_slot(&id, |slot| slot.task.error.clone())? {
                    self.result.errors.insert(id.clone(), error);
                }
                if status == TaskStatus::Failed {
                    self.result.failed_steps.push(id);
                } else {
                    self.result.cancelled_steps.push(id);
                }
            }
            TaskStatus::Pending | TaskStatus::Running => self.settled[position] = false,
        }
        Ok(())
    }

    /// Cancel everything still unfinished once scheduling stops.
    fn sweep(&mut self, inner: &EngineInner, timed_out: bool) -> Result<()> {
        let reason = if timed_out {
            "workflow timed out"
        } else {
            "workflow ended before the task could run"
        };
        for position in 0..self.tasks.len() {
            if self.settled[position] {
                continue;
            }
            let status = inner.settle(
                self.graph.id(position),
                &RunOutcome::Cancelled(reason.to_string()),
            )?;
            self.record(inner, position, status)?;
        }
        Ok(())
    }
}
