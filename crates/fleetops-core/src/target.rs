//! Target directory - resolves the resources tasks operate on

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::TargetType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetInfo {
    pub id: Uuid,
    pub name: String,
    pub kind: TargetType,
}

#[async_trait]
pub trait TargetDirectory: Send + Sync {
    /// Look up a target; `None` when it no longer exists
    async fn resolve(&self, target_id: Uuid) -> Option<TargetInfo>;
}

#[derive(Debug, Default)]
pub struct InMemoryTargets {
    targets: RwLock<HashMap<Uuid, TargetInfo>>,
}

impl InMemoryTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, target: TargetInfo) {
        self.targets.write().insert(target.id, target);
    }

    pub fn with_target(self, id: Uuid, name: impl Into<String>, kind: TargetType) -> Self {
        self.insert(TargetInfo {
            id,
            name: name.into(),
            kind,
        });
        self
    }

    pub fn remove(&self, target_id: Uuid) -> Option<TargetInfo> {
        self.targets.write().remove(&target_id)
    }
}

#[async_trait]
impl TargetDirectory for InMemoryTargets {
    async fn resolve(&self, target_id: Uuid) -> Option<TargetInfo> {
        self.targets.read().get(&target_id).cloned()
    }
}
