//! Scripted task plans
//!
//! A plan file names a task type, the parameters to submit it with and the
//! groups the task runs. Subtasks are simulated: they sleep for a while and
//! then succeed or fail as scripted.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use fleetops_core::{
    Error, GroupLabel, GroupMode, Subtask, SubtaskContext, SubtaskGroup, TaskParams, TaskPlanner,
    TaskType,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PlanFile {
    pub task_type: TaskType,
    pub params: toml::Table,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupSpec {
    pub label: String,
    #[serde(default)]
    pub mode: GroupMode,
    /// Keep going with later groups when this one fails
    #[serde(default)]
    pub ignore_errors: bool,
    #[serde(default)]
    pub subtasks: Vec<SubtaskSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtaskSpec {
    pub name: String,
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Always fail
    #[serde(default)]
    pub fail: bool,
    /// Fail only when the task is not a retry
    #[serde(default)]
    pub fail_on_first_try: bool,
}

fn default_duration_ms() -> u64 {
    300
}

impl PlanFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid plan {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Submission parameters as JSON
    pub fn params_json(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.params)?)
    }

    /// Planner with a single builder for this plan's task type
    pub fn planner(&self) -> TaskPlanner {
        let groups = self.groups.clone();
        TaskPlanner::new().with_builder(self.task_type, move |params: &TaskParams| {
            Ok(groups
                .iter()
                .map(|spec| spec.build(params.first_try()))
                .collect())
        })
    }
}

impl GroupSpec {
    fn build(&self, first_try: bool) -> SubtaskGroup {
        let mut group = SubtaskGroup::new(parse_label(&self.label))
            .with_mode(self.mode)
            .with_abort_on_failure(!self.ignore_errors);
        for spec in &self.subtasks {
            group.add(Arc::new(ScriptedSubtask {
                name: spec.name.clone(),
                duration: Duration::from_millis(spec.duration_ms),
                fail: spec.fail || (spec.fail_on_first_try && first_try),
            }));
        }
        group
    }
}

/// Known labels map onto their variant; anything else is kept as written
fn parse_label(label: &str) -> GroupLabel {
    serde_json::from_value(serde_json::Value::String(label.to_string()))
        .unwrap_or_else(|_| GroupLabel::Custom(label.to_string()))
}

struct ScriptedSubtask {
    name: String,
    duration: Duration,
    fail: bool,
}

#[async_trait]
impl Subtask for ScriptedSubtask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &SubtaskContext) -> fleetops_core::Result<()> {
        tokio::time::sleep(self.duration).await;
        if self.fail {
            return Err(Error::subtask_failure(format!(
                "{} failed at position {}",
                self.name, ctx.position
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PLAN: &str = r#"
task_type = "create_universe"

[params]
universe_uuid = "6f1c2a3e-8d7b-4e1a-9f00-1b2c3d4e5f60"
universe_name = "orders-prod"
num_nodes = 3

[[groups]]
label = "provisioning"

[[groups.subtasks]]
name = "CreateServer"
duration_ms = 10

[[groups.subtasks]]
name = "CreateServer"
fail_on_first_try = true

[[groups]]
label = "wait_for_dns"
mode = "serial"
ignore_errors = true

[[groups.subtasks]]
name = "CheckDns"
"#;

    #[test]
    fn test_parse_plan() {
        let plan = PlanFile::parse(PLAN).unwrap();
        assert_eq!(plan.task_type, TaskType::CreateUniverse);
        assert_eq!(plan.groups.len(), 2);
        assert_eq!(plan.groups[0].subtasks[0].duration_ms, 10);
        assert_eq!(plan.groups[0].subtasks[1].duration_ms, 300);
        assert!(plan.groups[0].subtasks[1].fail_on_first_try);
        assert_eq!(plan.groups[1].mode, GroupMode::Serial);
        assert!(plan.groups[1].ignore_errors);

        let params = plan.params_json().unwrap();
        assert_eq!(params["universe_name"], "orders-prod");
        assert_eq!(params["num_nodes"], 3);
    }

    #[test]
    fn test_labels() {
        assert_eq!(parse_label("provisioning"), GroupLabel::Provisioning);
        assert_eq!(
            parse_label("wait_for_dns"),
            GroupLabel::Custom("wait_for_dns".to_string())
        );
    }

    #[test]
    fn test_planner_builds_groups() {
        let plan = PlanFile::parse(PLAN).unwrap();
        let planner = plan.planner();
        assert!(planner.is_registered(TaskType::CreateUniverse));

        let params = TaskParams::parse(TaskType::CreateUniverse, plan.params_json().unwrap()).unwrap();
        let queue = planner
            .plan(uuid::Uuid::new_v4(), TaskType::CreateUniverse, &params)
            .unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.subtask_count(), 3);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PLAN.as_bytes()).unwrap();

        let plan = PlanFile::load(file.path()).unwrap();
        assert_eq!(plan.groups[0].label, "provisioning");
    }

    #[test]
    fn test_unknown_task_type() {
        assert!(PlanFile::parse("task_type = \"reboot\"\n[params]\n").is_err());
    }
}
