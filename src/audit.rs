//! Audit trail for approval activity.
//!
//! Every state change made through the workflow is reported to an [`AuditSink`] as who
//! (role, username, name) did what (activity type) in which module, with a free-text
//! description.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::approval::{Actor, ApprovalRequestId};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Create,
    Submit,
    Defer,
    Approve,
    Decline,
    Execute,
    ExecutionFailed,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Create => "CREATE",
            ActivityType::Submit => "SUBMIT",
            ActivityType::Defer => "DEFER",
            ActivityType::Approve => "APPROVE",
            ActivityType::Decline => "DECLINE",
            ActivityType::Execute => "EXECUTE",
            ActivityType::ExecutionFailed => "EXECUTION_FAILED",
        }
    }
}

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub role: String,
    pub username: String,
    pub name: String,
    pub activity_type: ActivityType,
    /// Module the activity belongs to; the handler type of the request
    pub module: String,
    pub description: String,
    pub approval_id: Option<ApprovalRequestId>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor: &Actor,
        activity_type: ActivityType,
        module: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            role: actor.role.clone(),
            username: actor.username.clone(),
            name: actor.name().to_string(),
            activity_type,
            module: module.into(),
            description: description.into(),
            approval_id: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_approval_id(mut self, id: ApprovalRequestId) -> Self {
        self.approval_id = Some(id);
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, entry: AuditEntry) -> Result<()>;
}

/// Writes audit entries as structured `tracing` events on the `countersign::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, entry: AuditEntry) -> Result<()> {
        tracing::info!(
            target: "countersign::audit",
            role = %entry.role,
            username = %entry.username,
            name = %entry.name,
            activity_type = entry.activity_type.as_str(),
            module = %entry.module,
            approval_id = ?entry.approval_id,
            "{}",
            entry.description
        );
        Ok(())
    }
}

/// Keeps entries in memory; for tests and inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn activities(&self) -> Vec<ActivityType> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.activity_type)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log(&self, entry: AuditEntry) -> Result<()> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entry_takes_actor_fields() {
        let actor = Actor::new("ada", "CHECKER").with_display_name("Ada Obi");
        let id = ApprovalRequestId::new();
        let sink = MemoryAuditSink::new();
        sink.log(
            AuditEntry::new(&actor, ActivityType::Approve, "fee", "approved UPDATE_FEE")
                .with_approval_id(id),
        )
        .await
        .unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].role, "CHECKER");
        assert_eq!(entries[0].username, "ada");
        assert_eq!(entries[0].name, "Ada Obi");
        assert_eq!(entries[0].module, "fee");
        assert_eq!(entries[0].approval_id, Some(id));
        assert_eq!(sink.activities(), vec![ActivityType::Approve]);
    }

    #[test_log::test(tokio::test)]
    async fn test_tracing_sink_never_fails() {
        let actor = Actor::new("ada", "MAKER");
        TracingAuditSink
            .log(AuditEntry::new(&actor, ActivityType::Create, "outlet", "created"))
            .await
            .unwrap();
    }
}
