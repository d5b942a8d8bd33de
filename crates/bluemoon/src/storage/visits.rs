//! Visitor log.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::{debug, info};

use super::{ensure_exists, now, write_audit, Storage};
use crate::error::{Error, Result};
use crate::model::{AuditRecord, NewVisit, Page, Visit, VisitFilter};

const VISIT_COLUMNS: &str = "id, apartment_id, visitor_name, id_card, phone, purpose, \
     vehicle_plate, checked_in_at, checked_out_at";

fn fetch_visit(conn: &Connection, id: i64) -> Result<Visit> {
    conn.query_row(
        &format!("SELECT {VISIT_COLUMNS} FROM visits WHERE id = ?1"),
        [id],
        row_to_visit,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("visit", id))
}

impl Storage {
    /// Check a visitor in to an apartment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown apartment or a validation error for a
    /// blank visitor name.
    pub fn check_in_visitor(&mut self, input: NewVisit, actor: &str) -> Result<Visit> {
        let input = input.normalized()?;
        let tx = self.write_txn()?;
        ensure_exists(&tx, "apartments", "apartment", input.apartment_id)?;
        tx.execute(
            "INSERT INTO visits (apartment_id, visitor_name, id_card, phone, purpose,
                 vehicle_plate, checked_in_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                input.apartment_id,
                input.visitor_name,
                input.id_card,
                input.phone,
                input.purpose,
                input.vehicle_plate,
                now(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_audit(
            &tx,
            &AuditRecord::new(actor, "visit.checked_in", "visit", id).with_detail(json!({
                "apartment_id": input.apartment_id,
                "visitor_name": input.visitor_name,
            })),
        )?;
        let visit = fetch_visit(&tx, id)?;
        tx.commit()?;

        info!(
            "Visitor {} checked in to apartment {}",
            visit.visitor_name, visit.apartment_id
        );
        Ok(visit)
    }

    /// Check a visitor out.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or a conflict if the visitor already left.
    pub fn check_out_visitor(&mut self, id: i64, actor: &str) -> Result<Visit> {
        let tx = self.write_txn()?;
        let visit = fetch_visit(&tx, id)?;
        if !visit.is_active() {
            return Err(Error::conflict(format!(
                "visit {id} is already checked out"
            )));
        }
        tx.execute(
            "UPDATE visits SET checked_out_at = ?1 WHERE id = ?2",
            params![now(), id],
        )?;
        write_audit(&tx, &AuditRecord::new(actor, "visit.checked_out", "visit", id))?;
        let visit = fetch_visit(&tx, id)?;
        tx.commit()?;

        info!("Visitor {} checked out", visit.visitor_name);
        Ok(visit)
    }

    /// Get a visit by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such visit.
    pub fn get_visit(&self, id: i64) -> Result<Visit> {
        fetch_visit(&self.conn, id)
    }

    /// List visits, most recent check-in first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_visits(&self, filter: &VisitFilter, page: Page) -> Result<Vec<Visit>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits
             WHERE (?1 IS NULL OR apartment_id = ?1)
               AND (?2 = 0 OR checked_out_at IS NULL)
               AND (?3 IS NULL OR substr(checked_in_at, 1, 10) = ?3)
             ORDER BY checked_in_at DESC, id DESC LIMIT ?4 OFFSET ?5"
        ))?;
        let visits = stmt
            .query_map(
                params![
                    filter.apartment_id,
                    filter.active_only,
                    filter.date,
                    page.limit,
                    page.offset
                ],
                row_to_visit,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Listed {} visits", visits.len());
        Ok(visits)
    }
}

fn row_to_visit(row: &rusqlite::Row<'_>) -> rusqlite::Result<Visit> {
    Ok(Visit {
        id: row.get(0)?,
        apartment_id: row.get(1)?,
        visitor_name: row.get(2)?,
        id_card: row.get(3)?,
        phone: row.get(4)?,
        purpose: row.get(5)?,
        vehicle_plate: row.get(6)?,
        checked_in_at: row.get(7)?,
        checked_out_at: row.get(8)?,
    })
}
