//! Group queue - runs a task's subtask groups strictly in order

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::group::{emit, GroupState, SubtaskGroup};
use super::{GroupLabel, SubtaskId, TaskId, TaskState};
use crate::error::{Error, Result};
use crate::store::TaskStore;

/// Events emitted while a task runs
#[derive(Debug, Clone)]
pub enum TaskEvent {
    GroupStarted {
        index: usize,
        label: GroupLabel,
        subtasks: usize,
    },
    SubtaskStarted {
        subtask_id: SubtaskId,
        position: u32,
        name: String,
    },
    SubtaskCompleted {
        subtask_id: SubtaskId,
        position: u32,
        success: bool,
        error: Option<String>,
    },
    GroupCompleted {
        index: usize,
        label: GroupLabel,
        success: bool,
    },
    TaskCompleted {
        task_id: TaskId,
        state: TaskState,
    },
}

/// Ordered subtask groups of one task
pub struct GroupQueue {
    task_id: TaskId,
    groups: Vec<SubtaskGroup>,
    events: Option<mpsc::UnboundedSender<TaskEvent>>,
}

impl GroupQueue {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            groups: Vec::new(),
            events: None,
        }
    }

    pub fn with_groups(mut self, groups: Vec<SubtaskGroup>) -> Self {
        self.groups.extend(groups);
        self
    }

    pub fn add(&mut self, group: SubtaskGroup) {
        self.groups.push(group);
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<TaskEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn subtask_count(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }

    /// Run all groups and record the task's terminal state.
    ///
    /// Subtask records for every group are written up front with contiguous
    /// positions, so the subtask total a poller sees never changes while the
    /// task runs. `cancel` is only observed between groups.
    pub async fn run(self, store: Arc<dyn TaskStore>, cancel: CancellationToken) -> Result<TaskState> {
        let task_id = self.task_id;
        let mut task = store
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::task_not_found(task_id))?;

        let mut next_position = 0u32;
        let mut planned = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let records = group.plan_records(task_id, next_position);
            next_position += records.len() as u32;
            planned.push(records);
        }
        store
            .insert_subtasks(planned.iter().flatten().cloned().collect())
            .await?;

        task.subtask_count = next_position as usize;
        task.transition(TaskState::Running);
        store.update_task(task.clone()).await?;
        info!(task_id = %task_id, groups = self.groups.len(), subtasks = task.subtask_count, "Task started");

        let mut final_state = TaskState::Success;
        for (index, (group, records)) in self.groups.iter().zip(planned).enumerate() {
            if cancel.is_cancelled() {
                info!(task_id = %task_id, group = %group.label(), "Abort requested, not starting group");
                final_state = TaskState::Aborted;
                break;
            }

            emit(
                &self.events,
                TaskEvent::GroupStarted {
                    index,
                    label: group.label().clone(),
                    subtasks: group.len(),
                },
            );

            let state = match group.run(records, store.clone(), self.events.clone()).await {
                Ok(state) => state,
                Err(e) => {
                    error!(task_id = %task_id, group = %group.label(), "Could not determine group outcome: {}", e);
                    GroupState::Failure
                }
            };

            emit(
                &self.events,
                TaskEvent::GroupCompleted {
                    index,
                    label: group.label().clone(),
                    success: state == GroupState::Success,
                },
            );

            if state == GroupState::Failure {
                if group.abort_on_failure() {
                    warn!(task_id = %task_id, group = %group.label(), "Group failed, skipping remaining groups");
                    final_state = TaskState::Failure;
                    break;
                }
                warn!(task_id = %task_id, group = %group.label(), "Group failed, errors ignored");
            }

            if cancel.is_cancelled() {
                info!(task_id = %task_id, group = %group.label(), "Abort requested, stopping after group");
                final_state = TaskState::Aborted;
                break;
            }
        }

        let mut task = store
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::task_not_found(task_id))?;
        task.transition(final_state);
        store.update_task(task).await?;

        info!(task_id = %task_id, state = ?final_state, "Task finished");
        emit(
            &self.events,
            TaskEvent::TaskCompleted {
                task_id,
                state: final_state,
            },
        );
        Ok(final_state)
    }
}
