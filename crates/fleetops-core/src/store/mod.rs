//! Storage seams for task records and the task ledger
//!
//! The engine never assumes a storage engine. It talks to these traits and
//! relies on read-your-writes consistency for a task's own records: a
//! subtask's terminal write must be visible to the queue once the write call
//! has returned.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::ledger::LedgerEntry;
use crate::task::{SubtaskInfo, SubtaskState, TaskId, TaskInfo};

/// Persistence for task and subtask records
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_task(&self, task: TaskInfo) -> Result<()>;

    /// Replace an existing task record
    async fn update_task(&self, task: TaskInfo) -> Result<()>;

    async fn get_task(&self, task_id: TaskId) -> Result<Option<TaskInfo>>;

    async fn insert_subtasks(&self, subtasks: Vec<SubtaskInfo>) -> Result<()>;

    /// Replace an existing subtask record
    async fn update_subtask(&self, subtask: SubtaskInfo) -> Result<()>;

    /// All subtasks of `parent_id`, ordered by ascending position
    async fn list_subtasks(&self, parent_id: TaskId) -> Result<Vec<SubtaskInfo>>;

    /// Subtasks of `parent_id` in `state`, ordered by descending position
    async fn list_subtasks_in_state(
        &self,
        parent_id: TaskId,
        state: SubtaskState,
    ) -> Result<Vec<SubtaskInfo>> {
        let mut subtasks: Vec<SubtaskInfo> = self
            .list_subtasks(parent_id)
            .await?
            .into_iter()
            .filter(|s| s.state == state)
            .collect();
        subtasks.sort_by(|a, b| b.position.cmp(&a.position));
        Ok(subtasks)
    }
}

/// Persistence for ledger entries linking tasks to actors and targets
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_entry(&self, entry: LedgerEntry) -> Result<()>;

    async fn get_entry(&self, task_id: TaskId) -> Result<Option<LedgerEntry>>;

    /// Record the completion time of the entry for `task_id`
    async fn mark_completed(
        &self,
        task_id: TaskId,
        completion_time: chrono::DateTime<chrono::Utc>,
    ) -> Result<()>;

    /// Entries for `target_id`, newest first, at most `limit` rows
    async fn list_by_target(&self, target_id: Uuid, limit: usize) -> Result<Vec<LedgerEntry>>;

    /// Entries for `customer_id`, newest first, at most `limit` rows
    async fn list_by_customer(&self, customer_id: Uuid, limit: usize) -> Result<Vec<LedgerEntry>>;

    /// Entries for `customer_id` on `target_id`, newest first, at most `limit` rows
    async fn list_by_customer_and_target(
        &self,
        customer_id: Uuid,
        target_id: Uuid,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>>;
}
