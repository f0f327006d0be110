//! In-memory store backing both task records and the ledger

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{LedgerStore, TaskStore};
use crate::error::{Error, Result};
use crate::ledger::LedgerEntry;
use crate::task::{SubtaskId, SubtaskInfo, TaskId, TaskInfo};

/// Process-local store. Every write is visible to the next read.
#[derive(Default)]
pub struct InMemoryStore {
    tasks: RwLock<HashMap<TaskId, TaskInfo>>,
    subtasks: RwLock<HashMap<SubtaskId, SubtaskInfo>>,
    ledger: RwLock<Vec<LedgerEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }

    fn newest_first(
        &self,
        limit: usize,
        filter: impl Fn(&LedgerEntry) -> bool,
    ) -> Vec<LedgerEntry> {
        let ledger = self.ledger.read();
        let mut entries: Vec<LedgerEntry> = ledger.iter().filter(|e| filter(e)).cloned().collect();
        entries.sort_by(|a, b| b.create_time.cmp(&a.create_time));
        entries.truncate(limit);
        entries
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn insert_task(&self, task: TaskInfo) -> Result<()> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&task.id) {
            return Err(Error::Store(format!("task {} already exists", task.id)));
        }
        tasks.insert(task.id, task);
        Ok(())
    }

    async fn update_task(&self, task: TaskInfo) -> Result<()> {
        let mut tasks = self.tasks.write();
        match tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task;
                Ok(())
            }
            None => Err(Error::task_not_found(task.id)),
        }
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Option<TaskInfo>> {
        Ok(self.tasks.read().get(&task_id).cloned())
    }

    async fn insert_subtasks(&self, subtasks: Vec<SubtaskInfo>) -> Result<()> {
        let mut map = self.subtasks.write();
        if let Some(dup) = subtasks.iter().find(|s| map.contains_key(&s.id)) {
            return Err(Error::Store(format!("subtask {} already exists", dup.id)));
        }
        for subtask in subtasks {
            map.insert(subtask.id, subtask);
        }
        Ok(())
    }

    async fn update_subtask(&self, subtask: SubtaskInfo) -> Result<()> {
        let mut map = self.subtasks.write();
        match map.get_mut(&subtask.id) {
            Some(existing) => {
                *existing = subtask;
                Ok(())
            }
            None => Err(Error::NotFound(format!("subtask {}", subtask.id))),
        }
    }

    async fn list_subtasks(&self, parent_id: TaskId) -> Result<Vec<SubtaskInfo>> {
        let map = self.subtasks.read();
        let mut subtasks: Vec<SubtaskInfo> = map
            .values()
            .filter(|s| s.parent_id == parent_id)
            .cloned()
            .collect();
        subtasks.sort_by_key(|s| s.position);
        Ok(subtasks)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn insert_entry(&self, entry: LedgerEntry) -> Result<()> {
        let mut ledger = self.ledger.write();
        if ledger.iter().any(|e| e.task_id == entry.task_id) {
            return Err(Error::Store(format!(
                "ledger entry for task {} already exists",
                entry.task_id
            )));
        }
        ledger.push(entry);
        Ok(())
    }

    async fn get_entry(&self, task_id: TaskId) -> Result<Option<LedgerEntry>> {
        Ok(self
            .ledger
            .read()
            .iter()
            .find(|e| e.task_id == task_id)
            .cloned())
    }

    async fn mark_completed(
        &self,
        task_id: TaskId,
        completion_time: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let mut ledger = self.ledger.write();
        let entry = ledger
            .iter_mut()
            .find(|e| e.task_id == task_id)
            .ok_or_else(|| Error::NotFound(format!("ledger entry for task {}", task_id)))?;
        entry.completion_time = Some(completion_time);
        Ok(())
    }

    async fn list_by_target(&self, target_id: Uuid, limit: usize) -> Result<Vec<LedgerEntry>> {
        Ok(self.newest_first(limit, |e| e.target_id == target_id))
    }

    async fn list_by_customer(&self, customer_id: Uuid, limit: usize) -> Result<Vec<LedgerEntry>> {
        Ok(self.newest_first(limit, |e| e.customer_id == customer_id))
    }

    async fn list_by_customer_and_target(
        &self,
        customer_id: Uuid,
        target_id: Uuid,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self.newest_first(limit, |e| {
            e.customer_id == customer_id && e.target_id == target_id
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Actor;
    use crate::task::{GroupLabel, SubtaskState, TaskType};

    #[tokio::test]
    async fn test_subtasks_listed_by_position() {
        let store = InMemoryStore::new();
        let parent = Uuid::new_v4();
        let subtasks = (0..4)
            .rev()
            .map(|i| SubtaskInfo::new(parent, i, "Step", GroupLabel::Provisioning))
            .collect();
        store.insert_subtasks(subtasks).await.unwrap();
        store
            .insert_subtasks(vec![SubtaskInfo::new(Uuid::new_v4(), 0, "Other", GroupLabel::Provisioning)])
            .await
            .unwrap();

        let listed = store.list_subtasks(parent).await.unwrap();
        let positions: Vec<u32> = listed.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_subtasks_newest_position_first() {
        let store = InMemoryStore::new();
        let parent = Uuid::new_v4();
        let mut subtasks: Vec<SubtaskInfo> = (0..3)
            .map(|i| SubtaskInfo::new(parent, i, "Step", GroupLabel::Provisioning))
            .collect();
        subtasks[0].transition(SubtaskState::Failure, Some("a".into()));
        subtasks[2].transition(SubtaskState::Failure, Some("c".into()));
        store.insert_subtasks(subtasks).await.unwrap();

        let failed = store
            .list_subtasks_in_state(parent, SubtaskState::Failure)
            .await
            .unwrap();
        let positions: Vec<u32> = failed.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![2, 0]);
    }

    #[tokio::test]
    async fn test_update_unknown_task_is_not_found() {
        let store = InMemoryStore::new();
        let task = TaskInfo::new(Uuid::new_v4(), TaskType::CreateUniverse, serde_json::json!({}));
        assert!(matches!(store.update_task(task).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_ledger_listing_is_newest_first_and_limited() {
        let store = InMemoryStore::new();
        let actor = Actor::new(Uuid::new_v4(), Uuid::new_v4());
        let target = Uuid::new_v4();
        let mut ids = Vec::new();
        for i in 0..3 {
            let mut entry = LedgerEntry::new(Uuid::new_v4(), &actor, TaskType::EditUniverse, target, "u");
            entry.create_time += chrono::Duration::seconds(i);
            ids.push(entry.task_id);
            store.insert_entry(entry).await.unwrap();
        }

        let listed = store.list_by_target(target, 2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].task_id, ids[2]);
        assert_eq!(listed[1].task_id, ids[1]);

        let by_customer = store.list_by_customer(actor.customer_id, 10).await.unwrap();
        assert_eq!(by_customer.len(), 3);
        assert!(store.list_by_customer(Uuid::new_v4(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_customer_and_target_filter_applies_before_limit() {
        let store = InMemoryStore::new();
        let ours = Actor::new(Uuid::new_v4(), Uuid::new_v4());
        let theirs = Actor::new(Uuid::new_v4(), Uuid::new_v4());
        let target = Uuid::new_v4();

        let own = LedgerEntry::new(Uuid::new_v4(), &ours, TaskType::EditUniverse, target, "u");
        let own_id = own.task_id;
        let mut newer = LedgerEntry::new(Uuid::new_v4(), &theirs, TaskType::EditUniverse, target, "u");
        newer.create_time = own.create_time + chrono::Duration::seconds(5);
        let elsewhere = LedgerEntry::new(Uuid::new_v4(), &ours, TaskType::EditUniverse, Uuid::new_v4(), "v");
        for entry in [own, newer, elsewhere] {
            store.insert_entry(entry).await.unwrap();
        }

        let listed = store
            .list_by_customer_and_target(ours.customer_id, target, 1)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].task_id, own_id);
    }

    #[tokio::test]
    async fn test_mark_completed() {
        let store = InMemoryStore::new();
        let actor = Actor::new(Uuid::new_v4(), Uuid::new_v4());
        let entry = LedgerEntry::new(Uuid::new_v4(), &actor, TaskType::CreateUniverse, Uuid::new_v4(), "u");
        let task_id = entry.task_id;
        store.insert_entry(entry).await.unwrap();

        let now = chrono::Utc::now();
        store.mark_completed(task_id, now).await.unwrap();
        let stored = store.get_entry(task_id).await.unwrap().unwrap();
        assert_eq!(stored.completion_time, Some(now));

        assert!(store.mark_completed(Uuid::new_v4(), now).await.is_err());
    }
}
