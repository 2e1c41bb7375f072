//! Best-effort admin audit trail.
//!
//! Every admin mutation records a before/after snapshot. A failed audit write is logged
//! and dropped; it never aborts the mutation that triggered it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::domain::{AuditEntryId, UserId};
use super::repository::{AuditSink, RepositoryError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub actor_id: UserId,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub before_data: Value,
    pub after_data: Value,
    pub created_at: DateTime<Utc>,
}

/// Builder for an entry; snapshots default to `null`.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    actor_id: UserId,
    action: &'static str,
    entity_type: &'static str,
    entity_id: String,
    before: Value,
    after: Value,
}

impl AuditRecord {
    pub fn new(
        actor_id: &UserId,
        action: &'static str,
        entity_type: &'static str,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.clone(),
            action,
            entity_type,
            entity_id: entity_id.into(),
            before: Value::Null,
            after: Value::Null,
        }
    }

    pub fn before(mut self, snapshot: Value) -> Self {
        self.before = snapshot;
        self
    }

    pub fn after(mut self, snapshot: Value) -> Self {
        self.after = snapshot;
        self
    }

    fn into_entry(self, now: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id: AuditEntryId::generate(),
            actor_id: self.actor_id,
            action: self.action.to_string(),
            entity_type: self.entity_type.to_string(),
            entity_id: self.entity_id,
            before_data: self.before,
            after_data: self.after,
            created_at: now,
        }
    }
}

#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Returns whether the entry was stored.
    pub fn record(&self, record: AuditRecord, now: DateTime<Utc>) -> bool {
        let entry = record.into_entry(now);
        let action = entry.action.clone();
        let entity_id = entry.entity_id.clone();
        match self.sink.append(entry) {
            Ok(()) => true,
            Err(err) => {
                warn!(%action, %entity_id, error = %err, "audit entry dropped");
                false
            }
        }
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, RepositoryError> {
        self.sink.recent(limit)
    }
}
