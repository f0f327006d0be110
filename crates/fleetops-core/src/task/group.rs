//! Subtask groups
//!
//! A group is a named bucket of subtasks. When the group starts every member is
//! dispatched (all at once, or one at a time for serial groups) and the group
//! only reaches a terminal state once every member has. A failing member never
//! cancels its siblings.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::queue::TaskEvent;
use super::{GroupLabel, SubtaskInfo, SubtaskState, TaskId};
use crate::error::{Error, Result};
use crate::store::TaskStore;

/// Context handed to a subtask when it runs
#[derive(Debug, Clone)]
pub struct SubtaskContext {
    pub task_id: TaskId,
    pub subtask_id: uuid::Uuid,
    pub position: u32,
}

/// One opaque unit of work
#[async_trait]
pub trait Subtask: Send + Sync {
    /// Subtask type name, recorded on the subtask record
    fn name(&self) -> &str;

    /// Run the unit of work. An error marks the subtask as failed.
    async fn run(&self, ctx: &SubtaskContext) -> Result<()>;
}

/// How members of a group are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMode {
    #[default]
    Parallel,
    /// One at a time, in position order
    Serial,
}

/// Aggregate state of a group, derived from its members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Running,
    Success,
    Failure,
}

impl GroupState {
    pub fn from_states<'a>(states: impl IntoIterator<Item = &'a SubtaskState>) -> Self {
        let mut all_success = true;
        for state in states {
            match state {
                SubtaskState::Failure => return GroupState::Failure,
                SubtaskState::Success => {}
                _ => all_success = false,
            }
        }
        if all_success {
            GroupState::Success
        } else {
            GroupState::Running
        }
    }
}

pub struct SubtaskGroup {
    label: GroupLabel,
    mode: GroupMode,
    abort_on_failure: bool,
    subtasks: Vec<Arc<dyn Subtask>>,
}

impl SubtaskGroup {
    pub fn new(label: GroupLabel) -> Self {
        Self {
            label,
            mode: GroupMode::Parallel,
            abort_on_failure: true,
            subtasks: Vec::new(),
        }
    }

    pub fn with_subtask(mut self, subtask: Arc<dyn Subtask>) -> Self {
        self.subtasks.push(subtask);
        self
    }

    pub fn add(&mut self, subtask: Arc<dyn Subtask>) {
        self.subtasks.push(subtask);
    }

    pub fn with_mode(mut self, mode: GroupMode) -> Self {
        self.mode = mode;
        self
    }

    /// Let later groups run even if this one fails
    pub fn ignore_errors(mut self) -> Self {
        self.abort_on_failure = false;
        self
    }

    pub fn with_abort_on_failure(mut self, abort_on_failure: bool) -> Self {
        self.abort_on_failure = abort_on_failure;
        self
    }

    pub fn label(&self) -> &GroupLabel {
        &self.label
    }

    pub fn mode(&self) -> GroupMode {
        self.mode
    }

    pub fn abort_on_failure(&self) -> bool {
        self.abort_on_failure
    }

    pub fn len(&self) -> usize {
        self.subtasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }

    /// Records for this group's members, positions starting at `first_position`
    pub(crate) fn plan_records(&self, task_id: TaskId, first_position: u32) -> Vec<SubtaskInfo> {
        self.subtasks
            .iter()
            .enumerate()
            .map(|(i, subtask)| {
                SubtaskInfo::new(
                    task_id,
                    first_position + i as u32,
                    subtask.name(),
                    self.label.clone(),
                )
            })
            .collect()
    }

    /// Run every member to a terminal state, then report the group's state as
    /// read back from the store.
    pub(crate) async fn run(
        &self,
        records: Vec<SubtaskInfo>,
        store: Arc<dyn TaskStore>,
        events: Option<mpsc::UnboundedSender<TaskEvent>>,
    ) -> Result<GroupState> {
        let Some(first) = records.first() else {
            return Ok(GroupState::Success);
        };
        let task_id = first.parent_id;
        let positions: Vec<u32> = records.iter().map(|r| r.position).collect();

        let members = self.subtasks.iter().cloned().zip(records);
        match self.mode {
            GroupMode::Parallel => {
                let mut join_set = JoinSet::new();
                for (subtask, record) in members {
                    join_set.spawn(run_member(subtask, record, store.clone(), events.clone()));
                }
                while let Some(joined) = join_set.join_next().await {
                    if let Err(e) = joined {
                        error!(task_id = %task_id, "Subtask worker did not complete: {}", e);
                    }
                }
            }
            GroupMode::Serial => {
                for (subtask, record) in members {
                    run_member(subtask, record, store.clone(), events.clone()).await;
                }
            }
        }

        let recorded = store.list_subtasks(task_id).await?;
        let states: Vec<SubtaskState> = recorded
            .iter()
            .filter(|s| positions.contains(&s.position))
            .map(|s| s.state)
            .collect();

        if states.len() != positions.len() {
            return Err(Error::StoreInconsistency(format!(
                "group {} of task {} expected {} subtask records, found {}",
                self.label,
                task_id,
                positions.len(),
                states.len()
            )));
        }

        match GroupState::from_states(&states) {
            GroupState::Running => Err(Error::StoreInconsistency(format!(
                "group {} of task {} has non-terminal subtasks after completion",
                self.label, task_id
            ))),
            state => Ok(state),
        }
    }
}

/// Drive one subtask through Running to a terminal state. Only this subtask's
/// own record is written.
async fn run_member(
    subtask: Arc<dyn Subtask>,
    mut record: SubtaskInfo,
    store: Arc<dyn TaskStore>,
    events: Option<mpsc::UnboundedSender<TaskEvent>>,
) {
    let ctx = SubtaskContext {
        task_id: record.parent_id,
        subtask_id: record.id,
        position: record.position,
    };

    record.transition(SubtaskState::Running, None);
    if let Err(e) = store.update_subtask(record.clone()).await {
        warn!(subtask_id = %record.id, "Failed to record subtask start: {}", e);
    }
    emit(
        &events,
        TaskEvent::SubtaskStarted {
            subtask_id: record.id,
            position: record.position,
            name: record.subtask_type.clone(),
        },
    );

    debug!(task_id = %ctx.task_id, subtask = %record.subtask_type, position = record.position, "Running subtask");
    let outcome = AssertUnwindSafe(subtask.run(&ctx)).catch_unwind().await;

    let error_detail = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(format!("subtask {} panicked", record.subtask_type)),
    };
    let success = error_detail.is_none();

    if let Some(detail) = &error_detail {
        warn!(
            task_id = %ctx.task_id,
            subtask_id = %record.id,
            subtask = %record.subtask_type,
            "Subtask failed: {}",
            detail
        );
        record.transition(SubtaskState::Failure, error_detail.clone());
    } else {
        record.transition(SubtaskState::Success, None);
    }

    if let Err(e) = store.update_subtask(record.clone()).await {
        error!(subtask_id = %record.id, "Failed to record subtask completion: {}", e);
    }
    emit(
        &events,
        TaskEvent::SubtaskCompleted {
            subtask_id: record.id,
            position: record.position,
            success,
            error: error_detail,
        },
    );
}

pub(crate) fn emit(events: &Option<mpsc::UnboundedSender<TaskEvent>>, event: TaskEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}
