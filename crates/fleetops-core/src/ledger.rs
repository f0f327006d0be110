//! Task ledger
//!
//! One entry per submitted task, linking it to the acting user, the customer
//! that user belongs to and the resource the task targets. Entries are written
//! once at submission and touched once more when the task completes. They live
//! apart from task records so listing a target's history never needs the task
//! store to be scanned.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{ProgressStatus, TaskId, TaskProgress, TaskType};

/// Kind of resource a task targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TargetType {
    Universe,
    Backup,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TargetType::Universe => "Universe",
            TargetType::Backup => "Backup",
        };
        write!(f, "{}", name)
    }
}

/// What a task does to its target, as shown in task history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LedgerAction {
    Create,
    Update,
    Delete,
    Upgrade,
    Backup,
    Restore,
}

impl LedgerAction {
    pub fn friendly_name(&self) -> &'static str {
        match self {
            LedgerAction::Create => "Create",
            LedgerAction::Update => "Update",
            LedgerAction::Delete => "Delete",
            LedgerAction::Upgrade => "Upgrade",
            LedgerAction::Backup => "Backup",
            LedgerAction::Restore => "Restore",
        }
    }
}

/// The user a request is made on behalf of
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub customer_id: Uuid,
    pub user_id: Uuid,
}

impl Actor {
    pub fn new(customer_id: Uuid, user_id: Uuid) -> Self {
        Self {
            customer_id,
            user_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub task_id: TaskId,
    pub customer_id: Uuid,
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub target_type: TargetType,
    pub action: LedgerAction,
    pub task_type: TaskType,
    pub title: String,
    pub create_time: chrono::DateTime<chrono::Utc>,
    pub completion_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl LedgerEntry {
    pub fn new(
        task_id: TaskId,
        actor: &Actor,
        task_type: TaskType,
        target_id: Uuid,
        target_name: &str,
    ) -> Self {
        let target_type = task_type.target_type();
        let action = task_type.ledger_action();
        Self {
            task_id,
            customer_id: actor.customer_id,
            user_id: actor.user_id,
            target_id,
            target_type,
            action,
            task_type,
            title: friendly_title(action, target_type, target_name),
            create_time: chrono::Utc::now(),
            completion_time: None,
        }
    }
}

/// Human friendly description, e.g. "Create Universe : orders-prod"
pub fn friendly_title(action: LedgerAction, target_type: TargetType, target_name: &str) -> String {
    format!("{} {} : {}", action.friendly_name(), target_type, target_name)
}

/// A ledger entry joined with the live status of its task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskListing {
    pub id: TaskId,
    pub title: String,
    pub task_type: String,
    pub target: TargetType,
    pub target_id: Uuid,
    pub status: ProgressStatus,
    pub percent_complete: u8,
    pub create_time: chrono::DateTime<chrono::Utc>,
    pub completion_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl TaskListing {
    pub fn new(entry: &LedgerEntry, progress: TaskProgress) -> Self {
        Self {
            id: entry.task_id,
            title: entry.title.clone(),
            task_type: entry.action.friendly_name().to_string(),
            target: entry.target_type,
            target_id: entry.target_id,
            status: progress.status,
            percent_complete: progress.percent_complete,
            create_time: entry.create_time,
            completion_time: entry.completion_time,
        }
    }
}
