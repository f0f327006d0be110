//! Task parameters
//!
//! Each task type accepts one parameter shape. Parameters arrive as a JSON blob
//! and are parsed against the shape the task type expects before any record is
//! written. Fields the shape does not know about are carried along untouched so
//! the stored blob can be handed back for a retry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{ParamsKind, TaskType};
use crate::error::{Error, Result};

fn default_first_try() -> bool {
    true
}

fn default_rolling() -> bool {
    true
}

/// Parameters for creating, editing or destroying a universe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UniverseDefinitionParams {
    pub universe_uuid: Uuid,
    pub universe_name: String,
    #[serde(default = "default_first_try")]
    pub first_try: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters for a software upgrade
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoftwareUpgradeParams {
    pub universe_uuid: Uuid,
    pub universe_name: String,
    pub software_version: String,
    #[serde(default = "default_rolling")]
    pub rolling: bool,
    #[serde(default = "default_first_try")]
    pub first_try: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters for backup and restore
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupParams {
    pub universe_uuid: Uuid,
    pub universe_name: String,
    pub storage_config_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyspace: Option<String>,
    #[serde(default = "default_first_try")]
    pub first_try: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters for (re)writing the monitoring scrape targets of a universe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitoringParams {
    pub universe_uuid: Uuid,
    pub universe_name: String,
    #[serde(default)]
    pub remove_targets: bool,
    #[serde(default = "default_first_try")]
    pub first_try: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed task parameters, one variant per parameter shape
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TaskParams {
    UniverseDefinition(UniverseDefinitionParams),
    SoftwareUpgrade(SoftwareUpgradeParams),
    Backup(BackupParams),
    Monitoring(MonitoringParams),
}

impl TaskParams {
    /// Parse a parameter blob against the shape `task_type` expects
    pub fn parse(task_type: TaskType, value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::Validation(format!(
                "parameters for {} must be an object",
                task_type
            )));
        }

        let params = match task_type.params_kind() {
            ParamsKind::UniverseDefinition => {
                TaskParams::UniverseDefinition(from_value(task_type, value)?)
            }
            ParamsKind::SoftwareUpgrade => TaskParams::SoftwareUpgrade(from_value(task_type, value)?),
            ParamsKind::Backup => TaskParams::Backup(from_value(task_type, value)?),
            ParamsKind::Monitoring => TaskParams::Monitoring(from_value(task_type, value)?),
        };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<()> {
        if self.universe_name().trim().is_empty() {
            return Err(Error::Validation("universe_name must not be empty".to_string()));
        }
        if self.target_uuid().is_nil() {
            return Err(Error::Validation("universe_uuid must not be nil".to_string()));
        }
        if let TaskParams::SoftwareUpgrade(p) = self
            && p.software_version.trim().is_empty()
        {
            return Err(Error::Validation("software_version must not be empty".to_string()));
        }
        Ok(())
    }

    /// Identifier of the resource this task targets
    pub fn target_uuid(&self) -> Uuid {
        match self {
            TaskParams::UniverseDefinition(p) => p.universe_uuid,
            TaskParams::SoftwareUpgrade(p) => p.universe_uuid,
            TaskParams::Backup(p) => p.universe_uuid,
            TaskParams::Monitoring(p) => p.universe_uuid,
        }
    }

    pub fn universe_name(&self) -> &str {
        match self {
            TaskParams::UniverseDefinition(p) => &p.universe_name,
            TaskParams::SoftwareUpgrade(p) => &p.universe_name,
            TaskParams::Backup(p) => &p.universe_name,
            TaskParams::Monitoring(p) => &p.universe_name,
        }
    }

    pub fn first_try(&self) -> bool {
        match self {
            TaskParams::UniverseDefinition(p) => p.first_try,
            TaskParams::SoftwareUpgrade(p) => p.first_try,
            TaskParams::Backup(p) => p.first_try,
            TaskParams::Monitoring(p) => p.first_try,
        }
    }

    /// Additional fields supplied by the caller that the shape does not model
    pub fn extra(&self) -> &Map<String, Value> {
        match self {
            TaskParams::UniverseDefinition(p) => &p.extra,
            TaskParams::SoftwareUpgrade(p) => &p.extra,
            TaskParams::Backup(p) => &p.extra,
            TaskParams::Monitoring(p) => &p.extra,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn from_value<T: serde::de::DeserializeOwned>(task_type: TaskType, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::Validation(format!("parameters for {}: {}", task_type, e)))
}
