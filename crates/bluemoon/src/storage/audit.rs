//! Audit log persistence.

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use super::{now, Storage};
use crate::error::Result;
use crate::model::{AuditEntry, AuditFilter, AuditRecord, Page};

const AUDIT_COLUMNS: &str = "id, actor, action, entity, entity_id, detail, at";

/// Append an entry to the audit log.
///
/// Call this with the transaction that makes the change so both commit
/// or roll back together.
pub(crate) fn write_audit(conn: &Connection, record: &AuditRecord<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO audit_log (actor, action, entity, entity_id, detail, at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.actor,
            record.action,
            record.entity,
            record.entity_id,
            record.detail.to_string(),
            now(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(
        "Audit {} {} {}#{} by {}",
        id, record.action, record.entity, record.entity_id, record.actor
    );
    Ok(id)
}

impl Storage {
    /// List audit entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_audit(&self, filter: &AuditFilter, page: Page) -> Result<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log
             WHERE (?1 IS NULL OR entity = ?1) AND (?2 IS NULL OR entity_id = ?2)
             ORDER BY id DESC LIMIT ?3 OFFSET ?4"
        ))?;
        let entries = stmt
            .query_map(
                params![filter.entity, filter.entity_id, page.limit, page.offset],
                row_to_entry,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let detail_text: String = row.get(5)?;
    let detail = serde_json::from_str(&detail_text).unwrap_or_else(|e| {
        warn!("Unreadable audit detail: {}", e);
        serde_json::Value::String(detail_text)
    });
    Ok(AuditEntry {
        id: row.get(0)?,
        actor: row.get(1)?,
        action: row.get(2)?,
        entity: row.get(3)?,
        entity_id: row.get(4)?,
        detail,
        at: row.get(6)?,
    })
}
