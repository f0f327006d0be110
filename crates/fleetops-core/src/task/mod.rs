//! Task orchestration
//!
//! Tasks represent long-running administrative operations against a managed
//! universe. The task system handles:
//! - Task and subtask records and their lifecycle states
//! - Building ordered subtask groups per task type
//! - Running groups strictly in order with fail-soft groups
//! - Deriving progress from recorded subtask states

mod group;
mod params;
mod planner;
mod progress;
mod queue;

pub use group::{GroupMode, GroupState, Subtask, SubtaskContext, SubtaskGroup};
pub use params::{
    BackupParams, MonitoringParams, SoftwareUpgradeParams, TaskParams, UniverseDefinitionParams,
};
pub use planner::{TaskBuilder, TaskPlanner};
pub use progress::{compute_progress, ProgressStatus, TaskProgress};
pub use queue::{GroupQueue, TaskEvent};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::{LedgerAction, TargetType};

/// Unique task identifier
pub type TaskId = Uuid;

/// Unique subtask identifier
pub type SubtaskId = Uuid;

/// Operations the commissioner can run. Serialized by `as_str` name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(into = "&'static str", try_from = "String")]
pub enum TaskType {
    CreateUniverse,
    EditUniverse,
    DestroyUniverse,
    UpgradeSoftware,
    CreateBackup,
    RestoreBackup,
    ConfigureMonitoring,
}

/// Parameter shapes accepted by task types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamsKind {
    UniverseDefinition,
    SoftwareUpgrade,
    Backup,
    Monitoring,
}

impl TaskType {
    pub const ALL: [TaskType; 7] = [
        TaskType::CreateUniverse,
        TaskType::EditUniverse,
        TaskType::DestroyUniverse,
        TaskType::UpgradeSoftware,
        TaskType::CreateBackup,
        TaskType::RestoreBackup,
        TaskType::ConfigureMonitoring,
    ];

    pub fn params_kind(&self) -> ParamsKind {
        match self {
            TaskType::CreateUniverse | TaskType::EditUniverse | TaskType::DestroyUniverse => {
                ParamsKind::UniverseDefinition
            }
            TaskType::UpgradeSoftware => ParamsKind::SoftwareUpgrade,
            TaskType::CreateBackup | TaskType::RestoreBackup => ParamsKind::Backup,
            TaskType::ConfigureMonitoring => ParamsKind::Monitoring,
        }
    }

    /// Kind of resource recorded in the task ledger
    pub fn target_type(&self) -> TargetType {
        match self {
            TaskType::CreateBackup | TaskType::RestoreBackup => TargetType::Backup,
            _ => TargetType::Universe,
        }
    }

    pub fn ledger_action(&self) -> LedgerAction {
        match self {
            TaskType::CreateUniverse => LedgerAction::Create,
            TaskType::EditUniverse | TaskType::ConfigureMonitoring => LedgerAction::Update,
            TaskType::DestroyUniverse => LedgerAction::Delete,
            TaskType::UpgradeSoftware => LedgerAction::Upgrade,
            TaskType::CreateBackup => LedgerAction::Backup,
            TaskType::RestoreBackup => LedgerAction::Restore,
        }
    }

    /// Wire name, used for serde, `Display` and `FromStr`
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::CreateUniverse => "create_universe",
            TaskType::EditUniverse => "edit_universe",
            TaskType::DestroyUniverse => "destroy_universe",
            TaskType::UpgradeSoftware => "upgrade_software",
            TaskType::CreateBackup => "create_backup",
            TaskType::RestoreBackup => "restore_backup",
            TaskType::ConfigureMonitoring => "configure_monitoring",
        }
    }

    pub fn friendly_name(&self) -> &'static str {
        match self {
            TaskType::CreateUniverse => "Create Universe",
            TaskType::EditUniverse => "Edit Universe",
            TaskType::DestroyUniverse => "Destroy Universe",
            TaskType::UpgradeSoftware => "Upgrade Software",
            TaskType::CreateBackup => "Create Backup",
            TaskType::RestoreBackup => "Restore Backup",
            TaskType::ConfigureMonitoring => "Configure Monitoring",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::error::Error::Validation(format!("unknown task type '{}'", s)))
    }
}

impl From<TaskType> for &'static str {
    fn from(task_type: TaskType) -> Self {
        task_type.as_str()
    }
}

impl TryFrom<String> for TaskType {
    type Error = crate::error::Error;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskState {
    Created,
    Running,
    Success,
    Failure,
    Aborted,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure | TaskState::Aborted)
    }
}

/// Lifecycle state of a subtask
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SubtaskState {
    Created,
    Running,
    Success,
    Failure,
}

impl SubtaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubtaskState::Success | SubtaskState::Failure)
    }
}

/// Logical phase a subtask belongs to. Only used for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GroupLabel {
    Provisioning,
    ConfigureUniverse,
    InstallingSoftware,
    StartingMasters,
    StartingTservers,
    UpgradingSoftware,
    CreatingBackup,
    RestoringBackup,
    ConfigureMonitoring,
    RemovingUniverse,
    Custom(String),
}

impl std::fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupLabel::Provisioning => write!(f, "Provisioning"),
            GroupLabel::ConfigureUniverse => write!(f, "ConfigureUniverse"),
            GroupLabel::InstallingSoftware => write!(f, "InstallingSoftware"),
            GroupLabel::StartingMasters => write!(f, "StartingMasters"),
            GroupLabel::StartingTservers => write!(f, "StartingTservers"),
            GroupLabel::UpgradingSoftware => write!(f, "UpgradingSoftware"),
            GroupLabel::CreatingBackup => write!(f, "CreatingBackup"),
            GroupLabel::RestoringBackup => write!(f, "RestoringBackup"),
            GroupLabel::ConfigureMonitoring => write!(f, "ConfigureMonitoring"),
            GroupLabel::RemovingUniverse => write!(f, "RemovingUniverse"),
            GroupLabel::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Durable record of a submitted task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub task_type: TaskType,
    pub state: TaskState,
    /// Serialized parameters as submitted
    pub details: serde_json::Value,
    /// Number of subtasks planned for this task, fixed when the queue starts
    pub subtask_count: usize,
    pub creation_time: chrono::DateTime<chrono::Utc>,
    pub update_time: chrono::DateTime<chrono::Utc>,
    pub completion_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl TaskInfo {
    pub fn new(id: TaskId, task_type: TaskType, details: serde_json::Value) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            task_type,
            state: TaskState::Created,
            details,
            subtask_count: 0,
            creation_time: now,
            update_time: now,
            completion_time: None,
        }
    }

    pub fn transition(&mut self, state: TaskState) {
        let now = chrono::Utc::now();
        self.state = state;
        self.update_time = now;
        if state.is_terminal() {
            self.completion_time = Some(now);
        }
    }
}

/// Durable record of one unit of work inside a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtaskInfo {
    pub id: SubtaskId,
    pub parent_id: TaskId,
    pub position: u32,
    pub subtask_type: String,
    pub group_label: GroupLabel,
    pub state: SubtaskState,
    pub creation_time: chrono::DateTime<chrono::Utc>,
    pub update_time: chrono::DateTime<chrono::Utc>,
    pub error_detail: Option<String>,
}

impl SubtaskInfo {
    pub fn new(
        parent_id: TaskId,
        position: u32,
        subtask_type: impl Into<String>,
        group_label: GroupLabel,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent_id,
            position,
            subtask_type: subtask_type.into(),
            group_label,
            state: SubtaskState::Created,
            creation_time: now,
            update_time: now,
            error_detail: None,
        }
    }

    pub fn transition(&mut self, state: SubtaskState, error_detail: Option<String>) {
        self.state = state;
        self.update_time = chrono::Utc::now();
        self.error_detail = match state {
            SubtaskState::Failure => error_detail,
            _ => None,
        };
    }
}

/// Failed subtask view, as surfaced to callers inspecting a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedSubtask {
    pub subtask_id: SubtaskId,
    pub subtask_type: String,
    pub state: SubtaskState,
    pub creation_time: chrono::DateTime<chrono::Utc>,
    pub group_label: GroupLabel,
    pub error_detail: String,
}

impl From<&SubtaskInfo> for FailedSubtask {
    fn from(info: &SubtaskInfo) -> Self {
        Self {
            subtask_id: info.id,
            subtask_type: info.subtask_type.clone(),
            state: info.state,
            creation_time: info.creation_time,
            group_label: info.group_label.clone(),
            error_detail: info.error_detail.clone().unwrap_or_default(),
        }
    }
}
