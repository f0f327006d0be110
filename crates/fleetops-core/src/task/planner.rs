//! Task planner - maps task types to the groups they run

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};

use super::{GroupQueue, SubtaskGroup, TaskId, TaskParams, TaskType};

/// Builds the ordered subtask groups for one task from its parameters
pub type TaskBuilder = Arc<dyn Fn(&TaskParams) -> Result<Vec<SubtaskGroup>> + Send + Sync>;

/// Registry of per-type builders, assembled once at startup
pub struct TaskPlanner {
    builders: HashMap<TaskType, TaskBuilder>,
    /// Maximum subtasks per task
    max_subtasks: usize,
}

impl TaskPlanner {
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
            max_subtasks: 1000,
        }
    }

    pub fn with_max_subtasks(mut self, max: usize) -> Self {
        self.max_subtasks = max;
        self
    }

    pub fn register<F>(&mut self, task_type: TaskType, builder: F)
    where
        F: Fn(&TaskParams) -> Result<Vec<SubtaskGroup>> + Send + Sync + 'static,
    {
        self.builders.insert(task_type, Arc::new(builder));
    }

    pub fn with_builder<F>(mut self, task_type: TaskType, builder: F) -> Self
    where
        F: Fn(&TaskParams) -> Result<Vec<SubtaskGroup>> + Send + Sync + 'static,
    {
        self.register(task_type, builder);
        self
    }

    pub fn is_registered(&self, task_type: TaskType) -> bool {
        self.builders.contains_key(&task_type)
    }

    pub fn task_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.builders.keys().copied().collect();
        types.sort();
        types
    }

    /// Build the group queue for a task
    pub fn plan(&self, task_id: TaskId, task_type: TaskType, params: &TaskParams) -> Result<GroupQueue> {
        let builder = self.builders.get(&task_type).ok_or_else(|| {
            Error::Validation(format!("no builder registered for task type {}", task_type))
        })?;

        let groups = builder(params)?;
        self.validate(&groups)?;
        Ok(GroupQueue::new(task_id).with_groups(groups))
    }

    /// Validate a plan
    pub fn validate(&self, groups: &[SubtaskGroup]) -> Result<()> {
        let total: usize = groups.iter().map(|g| g.len()).sum();
        if total > self.max_subtasks {
            return Err(Error::Validation(format!(
                "Plan exceeds maximum subtasks ({})",
                self.max_subtasks
            )));
        }

        if let Some(empty) = groups.iter().find(|g| g.is_empty()) {
            return Err(Error::Validation(format!(
                "Group {} has no subtasks",
                empty.label()
            )));
        }

        Ok(())
    }
}

impl Default for TaskPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::group::SubtaskContext;
    use crate::task::{GroupLabel, Subtask};
    use async_trait::async_trait;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl Subtask for Noop {
        fn name(&self) -> &str {
            "Noop"
        }

        async fn run(&self, _ctx: &SubtaskContext) -> Result<()> {
            Ok(())
        }
    }

    fn params() -> TaskParams {
        TaskParams::parse(
            TaskType::CreateUniverse,
            json!({"universe_uuid": uuid::Uuid::new_v4(), "universe_name": "u1"}),
        )
        .unwrap()
    }

    #[test]
    fn test_unregistered_type_is_rejected() {
        let planner = TaskPlanner::new();
        let err = planner
            .plan(uuid::Uuid::new_v4(), TaskType::CreateUniverse, &params())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_plan_builds_queue() {
        let planner = TaskPlanner::new().with_builder(TaskType::CreateUniverse, |_| {
            Ok(vec![
                SubtaskGroup::new(GroupLabel::Provisioning)
                    .with_subtask(Arc::new(Noop))
                    .with_subtask(Arc::new(Noop)),
                SubtaskGroup::new(GroupLabel::ConfigureUniverse).with_subtask(Arc::new(Noop)),
            ])
        });

        let queue = planner
            .plan(uuid::Uuid::new_v4(), TaskType::CreateUniverse, &params())
            .unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.subtask_count(), 3);
        assert_eq!(planner.task_types(), vec![TaskType::CreateUniverse]);
    }

    #[test]
    fn test_plan_limits() {
        let planner = TaskPlanner::new()
            .with_max_subtasks(1)
            .with_builder(TaskType::CreateUniverse, |_| {
                Ok(vec![SubtaskGroup::new(GroupLabel::Provisioning)
                    .with_subtask(Arc::new(Noop))
                    .with_subtask(Arc::new(Noop))])
            });
        assert!(planner
            .plan(uuid::Uuid::new_v4(), TaskType::CreateUniverse, &params())
            .is_err());

        let planner = TaskPlanner::new()
            .with_builder(TaskType::CreateUniverse, |_| Ok(vec![SubtaskGroup::new(GroupLabel::Provisioning)]));
        assert!(planner
            .plan(uuid::Uuid::new_v4(), TaskType::CreateUniverse, &params())
            .is_err());
    }
}
