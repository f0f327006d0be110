//! Commissioner - entry point for submitting and tracking tasks
//!
//! The commissioner validates parameters, builds a task's group queue through
//! the planner, records the task and its ledger entry, then runs the queue on
//! its own tokio task. `submit` returns as soon as the task is scheduled.
//! Status is always derived from the store, so it survives the in-process
//! handle going away.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEvent, AuditSink, TracingAuditSink};
use crate::config::CommissionerConfig;
use crate::error::{Error, Result};
use crate::ledger::{Actor, LedgerEntry, TaskListing};
use crate::store::{LedgerStore, TaskStore};
use crate::target::TargetDirectory;
use crate::task::{
    compute_progress, FailedSubtask, ProgressStatus, SubtaskInfo, SubtaskState, TaskEvent, TaskId,
    TaskInfo, TaskParams, TaskPlanner, TaskProgress, TaskState, TaskType,
};

/// Handle to a task running in this process
struct RunningTask {
    cancel: CancellationToken,
    done: watch::Receiver<Option<TaskState>>,
}

type RunningTasks = Arc<Mutex<HashMap<TaskId, RunningTask>>>;

pub struct Commissioner {
    store: Arc<dyn TaskStore>,
    ledger: Arc<dyn LedgerStore>,
    targets: Arc<dyn TargetDirectory>,
    planner: Arc<TaskPlanner>,
    audit: Arc<dyn AuditSink>,
    config: CommissionerConfig,
    running: RunningTasks,
}

impl Commissioner {
    pub fn new(
        store: Arc<dyn TaskStore>,
        ledger: Arc<dyn LedgerStore>,
        targets: Arc<dyn TargetDirectory>,
        planner: TaskPlanner,
    ) -> Self {
        Self {
            store,
            ledger,
            targets,
            planner: Arc::new(planner),
            audit: Arc::new(TracingAuditSink),
            config: CommissionerConfig::default(),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_config(mut self, config: CommissionerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CommissionerConfig {
        &self.config
    }

    pub fn planner(&self) -> &TaskPlanner {
        &self.planner
    }

    /// Submit a task. Returns once the task is recorded and scheduled.
    pub async fn submit(&self, actor: &Actor, task_type: TaskType, params: Value) -> Result<TaskId> {
        self.submit_inner(actor, task_type, params, None, AuditAction::Submit, None)
            .await
    }

    /// Submit a task and stream its execution events to `events`
    pub async fn submit_with_events(
        &self,
        actor: &Actor,
        task_type: TaskType,
        params: Value,
        events: mpsc::UnboundedSender<TaskEvent>,
    ) -> Result<TaskId> {
        self.submit_inner(actor, task_type, params, None, AuditAction::Submit, Some(events))
            .await
    }

    async fn submit_inner(
        &self,
        actor: &Actor,
        task_type: TaskType,
        mut details: Value,
        target_name: Option<String>,
        action: AuditAction,
        events: Option<mpsc::UnboundedSender<TaskEvent>>,
    ) -> Result<TaskId> {
        // Everything that can reject the request runs before the first write
        let params = TaskParams::parse(task_type, details.clone())?;
        let task_id = Uuid::new_v4();
        let mut queue = self.planner.plan(task_id, task_type, &params)?;
        if let Some(tx) = events {
            queue = queue.with_events(tx);
        }
        // Stored as given, plus the first_try default
        if let Some(map) = details.as_object_mut() {
            map.entry("first_try")
                .or_insert(Value::Bool(params.first_try()));
        }
        let target_name = target_name.unwrap_or_else(|| params.universe_name().to_string());

        self.store
            .insert_task(TaskInfo::new(task_id, task_type, details.clone()))
            .await?;
        self.ledger
            .insert_entry(LedgerEntry::new(
                task_id,
                actor,
                task_type,
                params.target_uuid(),
                &target_name,
            ))
            .await?;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);
        self.running.lock().insert(
            task_id,
            RunningTask {
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        let store = self.store.clone();
        let ledger = self.ledger.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            let state = match queue.run(store.clone(), cancel).await {
                Ok(state) => state,
                Err(e) => {
                    error!(task_id = %task_id, "Task could not run: {}", e);
                    record_failure(store.as_ref(), task_id).await
                }
            };

            let completion_time = match store.get_task(task_id).await {
                Ok(Some(task)) => task.completion_time.unwrap_or_else(chrono::Utc::now),
                _ => chrono::Utc::now(),
            };
            if let Err(e) = ledger.mark_completed(task_id, completion_time).await {
                warn!(task_id = %task_id, "Failed to record ledger completion: {}", e);
            }

            running.lock().remove(&task_id);
            let _ = done_tx.send(Some(state));
        });

        info!(
            task_id = %task_id,
            task_type = %task_type,
            target = %params.target_uuid(),
            first_try = params.first_try(),
            "Submitted task"
        );
        self.audit
            .record(AuditEvent::new(action, *actor, task_id, task_type, details))
            .await;

        Ok(task_id)
    }

    /// Current state and percent complete of a task
    pub async fn get_status(&self, task_id: TaskId) -> Result<TaskProgress> {
        let task = self.load_task(task_id).await?;
        let subtasks = self.store.list_subtasks(task_id).await?;
        Ok(compute_progress(&task, &subtasks))
    }

    /// Parameters the task was submitted with
    pub async fn get_task_details(&self, task_id: TaskId) -> Result<Value> {
        Ok(self.load_task(task_id).await?.details)
    }

    pub async fn get_task(&self, task_id: TaskId) -> Result<TaskInfo> {
        self.load_task(task_id).await
    }

    /// All subtask records of a task, by position
    pub async fn subtasks(&self, task_id: TaskId) -> Result<Vec<SubtaskInfo>> {
        self.load_task(task_id).await?;
        self.store.list_subtasks(task_id).await
    }

    /// Failed subtasks of a task, latest position first
    pub async fn list_failed_subtasks(&self, task_id: TaskId) -> Result<Vec<FailedSubtask>> {
        self.load_task(task_id).await?;
        let failed = self
            .store
            .list_subtasks_in_state(task_id, SubtaskState::Failure)
            .await?;
        Ok(failed.iter().map(FailedSubtask::from).collect())
    }

    /// Resubmit a finished task from scratch with `first_try` cleared.
    ///
    /// The original task and its ledger entry are left untouched.
    pub async fn retry(&self, actor: &Actor, task_id: TaskId) -> Result<TaskId> {
        self.retry_inner(actor, task_id, None).await
    }

    /// Retry a task and stream the new task's execution events to `events`
    pub async fn retry_with_events(
        &self,
        actor: &Actor,
        task_id: TaskId,
        events: mpsc::UnboundedSender<TaskEvent>,
    ) -> Result<TaskId> {
        self.retry_inner(actor, task_id, Some(events)).await
    }

    async fn retry_inner(
        &self,
        actor: &Actor,
        task_id: TaskId,
        events: Option<mpsc::UnboundedSender<TaskEvent>>,
    ) -> Result<TaskId> {
        let task = self.load_task(task_id).await?;

        if !self.config.is_retryable(task.task_type) {
            return Err(Error::UnsupportedOperation(format!(
                "Invalid task type: {}. Only {} task retries are supported.",
                task.task_type,
                self.retryable_names()
            )));
        }
        if !task.state.is_terminal() {
            return Err(Error::UnsupportedOperation(format!(
                "task {} is still {:?} and cannot be retried",
                task_id, task.state
            )));
        }

        // Same parameters with only first_try flipped
        let mut details = task.details;
        let Some(map) = details.as_object_mut() else {
            return Err(Error::Validation(format!(
                "task {} has no stored parameters",
                task_id
            )));
        };
        map.insert("first_try".to_string(), Value::Bool(false));
        let params = TaskParams::parse(task.task_type, details.clone())?;

        let target = self
            .targets
            .resolve(params.target_uuid())
            .await
            .ok_or_else(|| Error::NotFound(format!("target {}", params.target_uuid())))?;

        let new_task_id = self
            .submit_inner(
                actor,
                task.task_type,
                details,
                Some(target.name.clone()),
                AuditAction::Retry,
                events,
            )
            .await?;
        info!(
            original_task_id = %task_id,
            task_id = %new_task_id,
            target = %target.id,
            target_name = %target.name,
            "Submitted retry task"
        );
        Ok(new_task_id)
    }

    /// Ask a running task to stop before its next group.
    ///
    /// Subtasks already running are left to finish. No-op for finished tasks.
    pub async fn abort(&self, task_id: TaskId) -> Result<()> {
        let cancel = self
            .running
            .lock()
            .get(&task_id)
            .map(|running| running.cancel.clone());
        if let Some(cancel) = cancel {
            info!(task_id = %task_id, "Abort requested");
            cancel.cancel();
            return Ok(());
        }

        let task = self.load_task(task_id).await?;
        debug!(task_id = %task_id, state = ?task.state, "Abort ignored, task not running");
        Ok(())
    }

    pub fn is_running(&self, task_id: TaskId) -> bool {
        self.running.lock().contains_key(&task_id)
    }

    /// Wait until the task reaches a terminal state
    pub async fn wait_for_completion(&self, task_id: TaskId) -> Result<TaskState> {
        let done = self
            .running
            .lock()
            .get(&task_id)
            .map(|running| running.done.clone());

        if let Some(mut done) = done {
            let finished = done
                .wait_for(|state| state.is_some())
                .await
                .ok()
                .and_then(|state| *state);
            if let Some(state) = finished {
                return Ok(state);
            }
        }

        // Not running here any more: fall back to the store
        loop {
            let task = self.load_task(task_id).await?;
            if task.state.is_terminal() {
                return Ok(task.state);
            }
            tokio::time::sleep(self.config.wait_poll_interval()).await;
        }
    }

    /// Ledger entries for a target, newest first
    pub async fn list_by_target(&self, target_id: Uuid) -> Result<Vec<LedgerEntry>> {
        self.ledger
            .list_by_target(target_id, self.config.task_query_limit)
            .await
    }

    /// Task history of a customer grouped by target, newest first per target.
    ///
    /// Entries whose status cannot be determined are logged and left out.
    pub async fn list_tasks(
        &self,
        customer_id: Uuid,
        target_id: Option<Uuid>,
    ) -> Result<BTreeMap<Uuid, Vec<TaskListing>>> {
        let limit = self.config.task_query_limit;
        let entries = match target_id {
            Some(target_id) => {
                self.ledger
                    .list_by_customer_and_target(customer_id, target_id, limit)
                    .await?
            }
            None => self.ledger.list_by_customer(customer_id, limit).await?,
        };

        let mut listing: BTreeMap<Uuid, Vec<TaskListing>> = BTreeMap::new();
        for entry in entries {
            let progress = match self.get_status(entry.task_id).await {
                Ok(progress) if progress.status == ProgressStatus::Unknown => {
                    error!(task_id = %entry.task_id, "Error fetching task progress, status unknown");
                    continue;
                }
                Ok(progress) => progress,
                Err(Error::NotFound(_)) => {
                    error!(task_id = %entry.task_id, "Error fetching task progress, task record not found");
                    continue;
                }
                Err(e) => return Err(e),
            };
            listing
                .entry(entry.target_id)
                .or_default()
                .push(TaskListing::new(&entry, progress));
        }
        Ok(listing)
    }

    async fn load_task(&self, task_id: TaskId) -> Result<TaskInfo> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::task_not_found(task_id))
    }

    fn retryable_names(&self) -> String {
        self.config
            .retryable_task_types
            .iter()
            .map(|t| format!("'{}'", t.friendly_name()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Mark a task that could not run as failed, counting the subtask records
/// already written
async fn record_failure(store: &dyn TaskStore, task_id: TaskId) -> TaskState {
    match store.get_task(task_id).await {
        Ok(Some(mut task)) if !task.state.is_terminal() => {
            match store.list_subtasks(task_id).await {
                Ok(subtasks) => task.subtask_count = subtasks.len(),
                Err(e) => warn!(task_id = %task_id, "Failed to count subtasks: {}", e),
            }
            task.transition(TaskState::Failure);
            if let Err(e) = store.update_task(task).await {
                error!(task_id = %task_id, "Failed to record task failure: {}", e);
            }
            TaskState::Failure
        }
        Ok(Some(task)) => task.state,
        _ => TaskState::Failure,
    }
}
