//! Progress calculation
//!
//! Turns a task record and its subtask records into a percent complete and a
//! coarse status. Pure; never fails. A task whose records cannot be reconciled
//! reports `Unknown`, which callers treat as "poll again later".

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{SubtaskInfo, SubtaskState, TaskInfo, TaskState};

/// Coarse status reported to pollers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProgressStatus {
    Running,
    Success,
    Failure,
    Aborted,
    Unknown,
}

/// Snapshot returned by a status poll
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskProgress {
    pub status: ProgressStatus,
    pub percent_complete: u8,
}

impl TaskProgress {
    pub fn unknown() -> Self {
        Self {
            status: ProgressStatus::Unknown,
            percent_complete: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ProgressStatus::Success | ProgressStatus::Failure | ProgressStatus::Aborted
        )
    }
}

/// Compute progress for `task` from its `subtasks`
pub fn compute_progress(task: &TaskInfo, subtasks: &[SubtaskInfo]) -> TaskProgress {
    if let Some(reason) = inconsistency(task, subtasks) {
        tracing::warn!(task_id = %task.id, reason = %reason, "Cannot reconcile task with its subtasks");
        return TaskProgress::unknown();
    }

    match task.state {
        TaskState::Created => TaskProgress {
            status: ProgressStatus::Running,
            percent_complete: 0,
        },
        TaskState::Success => TaskProgress {
            status: ProgressStatus::Success,
            percent_complete: 100,
        },
        TaskState::Running => TaskProgress {
            status: ProgressStatus::Running,
            percent_complete: percent_succeeded(subtasks),
        },
        TaskState::Failure => TaskProgress {
            status: ProgressStatus::Failure,
            percent_complete: percent_succeeded(subtasks),
        },
        TaskState::Aborted => TaskProgress {
            status: ProgressStatus::Aborted,
            percent_complete: percent_succeeded(subtasks),
        },
    }
}

fn percent_succeeded(subtasks: &[SubtaskInfo]) -> u8 {
    let total = subtasks.len();
    if total == 0 {
        return 0;
    }
    let succeeded = subtasks
        .iter()
        .filter(|s| s.state == SubtaskState::Success)
        .count();
    (succeeded * 100 / total) as u8
}

fn inconsistency(task: &TaskInfo, subtasks: &[SubtaskInfo]) -> Option<String> {
    if let Some(stray) = subtasks.iter().find(|s| s.parent_id != task.id) {
        return Some(format!(
            "subtask {} belongs to task {}",
            stray.id, stray.parent_id
        ));
    }

    let mut positions = HashSet::with_capacity(subtasks.len());
    if let Some(dup) = subtasks.iter().find(|s| !positions.insert(s.position)) {
        return Some(format!("duplicate subtask position {}", dup.position));
    }

    // Subtask records are written before the task leaves Created
    if task.state != TaskState::Created && subtasks.len() != task.subtask_count {
        return Some(format!(
            "expected {} subtasks, found {}",
            task.subtask_count,
            subtasks.len()
        ));
    }

    None
}
