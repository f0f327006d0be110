//! Audit events
//!
//! The engine only produces audit events; where they end up is up to the
//! embedding service.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ledger::Actor;
use crate::task::{TaskId, TaskType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditAction {
    Submit,
    Retry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor: Actor,
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub payload: Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, actor: Actor, task_id: TaskId, task_type: TaskType, payload: Value) -> Self {
        Self {
            action,
            actor,
            task_id,
            task_type,
            payload,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Writes audit events to the `audit` tracing target
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            action = ?event.action,
            task_id = %event.task_id,
            task_type = %event.task_type,
            customer_id = %event.actor.customer_id,
            user_id = %event.actor.user_id,
            payload = %event.payload,
            "audit"
        );
    }
}

/// Keeps audit events in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}
