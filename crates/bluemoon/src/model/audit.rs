//! Audit trail of changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actor recorded when a caller does not identify itself.
pub const SYSTEM_ACTOR: &str = "system";

/// A stored audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Row identifier.
    pub id: i64,
    /// Who made the change.
    pub actor: String,
    /// Dotted action name, e.g. `invoice.payment_recorded`.
    pub action: String,
    /// Kind of record changed.
    pub entity: String,
    /// Identifier of the record changed.
    pub entity_id: i64,
    /// Structured details of the change.
    pub detail: serde_json::Value,
    /// When the change was committed.
    pub at: DateTime<Utc>,
}

/// An audit entry about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord<'a> {
    /// Who made the change.
    pub actor: &'a str,
    /// Dotted action name.
    pub action: &'static str,
    /// Kind of record changed.
    pub entity: &'static str,
    /// Identifier of the record changed.
    pub entity_id: i64,
    /// Structured details.
    pub detail: serde_json::Value,
}

impl<'a> AuditRecord<'a> {
    /// Start a record for `entity` `entity_id`.
    #[must_use]
    pub fn new(actor: &'a str, action: &'static str, entity: &'static str, entity_id: i64) -> Self {
        Self {
            actor,
            action,
            entity,
            entity_id,
            detail: serde_json::Value::Null,
        }
    }

    /// Attach details.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Filters for listing audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuditFilter {
    /// Only this kind of record.
    pub entity: Option<String>,
    /// Only this record.
    pub entity_id: Option<i64>,
}
