//! FleetOps Core - Task orchestration for managed database clusters
//!
//! This crate provides the engine behind long-running fleet operations:
//! - Task and subtask records, parameters and lifecycle states
//! - Ordered subtask groups run by a group queue
//! - Progress calculation from recorded subtask states
//! - The commissioner: submit, status, retry, abort
//! - The task ledger linking tasks to users and targets

pub mod audit;
pub mod commissioner;
pub mod config;
pub mod error;
pub mod ledger;
pub mod store;
pub mod target;
pub mod task;

pub use audit::{AuditAction, AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use commissioner::Commissioner;
pub use config::{CommissionerConfig, Config, ConfigManager, LoggingConfig};
pub use error::{Error, Result};
pub use ledger::{Actor, LedgerAction, LedgerEntry, TargetType, TaskListing};
pub use store::{InMemoryStore, LedgerStore, TaskStore};
pub use target::{InMemoryTargets, TargetDirectory, TargetInfo};

// Task exports
pub use task::{
    compute_progress, FailedSubtask, GroupLabel, GroupMode, GroupQueue, GroupState,
    ProgressStatus, Subtask, SubtaskContext, SubtaskGroup, SubtaskInfo, SubtaskState, TaskBuilder,
    TaskEvent, TaskId, TaskInfo, TaskParams, TaskPlanner, TaskProgress, TaskState, TaskType,
};
