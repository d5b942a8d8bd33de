//! Resident registry.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::{info, warn};

use super::apartments::{fetch_apartment, refresh_occupancy};
use super::{contains_pattern, now, write_audit, Storage};
use crate::error::{map_unique, Error, Result};
use crate::model::{
    AuditRecord, NewResident, Page, Resident, ResidentFilter, ResidentStatus,
    ResidentStatusChange, ResidentUpdate,
};

const RESIDENT_COLUMNS: &str = "id, apartment_id, full_name, date_of_birth, gender, id_card, \
     phone, email, relationship, status, moved_in_on, moved_out_on, created_at";

pub(crate) fn fetch_resident(conn: &Connection, id: i64) -> Result<Resident> {
    conn.query_row(
        &format!("SELECT {RESIDENT_COLUMNS} FROM residents WHERE id = ?1"),
        [id],
        row_to_resident,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("resident", id))
}

pub(crate) fn find_resident_by_id_card(
    conn: &Connection,
    id_card: &str,
) -> Result<Option<Resident>> {
    Ok(conn
        .query_row(
            &format!("SELECT {RESIDENT_COLUMNS} FROM residents WHERE id_card = ?1"),
            [id_card],
            row_to_resident,
        )
        .optional()?)
}

/// Insert a validated resident and mark the apartment occupied.
pub(crate) fn insert_resident(conn: &Connection, input: &NewResident) -> Result<i64> {
    fetch_apartment(conn, input.apartment_id)?;
    let moved_in_on = input
        .moved_in_on
        .unwrap_or_else(|| now().date_naive());
    conn.execute(
        "INSERT INTO residents (apartment_id, full_name, date_of_birth, gender, id_card, phone,
             email, relationship, status, moved_in_on, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            input.apartment_id,
            input.full_name,
            input.date_of_birth,
            input.gender,
            input.id_card,
            input.phone,
            input.email,
            input.relationship,
            ResidentStatus::Active,
            moved_in_on,
            now(),
        ],
    )
    .map_err(|e| {
        map_unique(e, || {
            format!(
                "identity card {} is already registered",
                input.id_card.as_deref().unwrap_or_default()
            )
        })
    })?;
    let id = conn.last_insert_rowid();
    refresh_occupancy(conn, input.apartment_id)?;
    Ok(id)
}

impl Storage {
    /// Register a resident into an apartment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown apartment, a validation error for bad
    /// input, or a conflict if the identity card is already registered.
    pub fn register_resident(&mut self, input: NewResident, actor: &str) -> Result<Resident> {
        let input = input.normalized()?;
        let tx = self.write_txn()?;
        let id = insert_resident(&tx, &input)?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "resident.registered", "resident", id).with_detail(json!({
                "apartment_id": input.apartment_id,
                "full_name": input.full_name,
            })),
        )?;
        let resident = fetch_resident(&tx, id)?;
        tx.commit()?;

        info!(
            "Registered resident {} into apartment {}",
            id, resident.apartment_id
        );
        Ok(resident)
    }

    /// Get a resident by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such resident.
    pub fn get_resident(&self, id: i64) -> Result<Resident> {
        fetch_resident(&self.conn, id)
    }

    /// List residents ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_residents(&self, filter: &ResidentFilter, page: Page) -> Result<Vec<Resident>> {
        let pattern = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(contains_pattern);

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RESIDENT_COLUMNS} FROM residents
             WHERE (?1 IS NULL OR apartment_id = ?1)
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR fold(full_name) LIKE ?3 ESCAPE '\\'
                    OR fold(coalesce(phone, '')) LIKE ?3 ESCAPE '\\'
                    OR fold(coalesce(id_card, '')) LIKE ?3 ESCAPE '\\')
             ORDER BY full_name, id LIMIT ?4 OFFSET ?5"
        ))?;
        let residents = stmt
            .query_map(
                params![
                    filter.apartment_id,
                    filter.status,
                    pattern,
                    page.limit,
                    page.offset
                ],
                row_to_resident,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(residents)
    }

    /// Update a resident's profile fields.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, a validation error, or a conflict on a duplicate
    /// identity card.
    pub fn update_resident(
        &mut self,
        id: i64,
        update: ResidentUpdate,
        actor: &str,
    ) -> Result<Resident> {
        let tx = self.write_txn()?;
        let mut resident = fetch_resident(&tx, id)?;
        let detail = serde_json::to_value(&update)?;
        update.apply_to(&mut resident)?;

        tx.execute(
            "UPDATE residents SET full_name = ?1, date_of_birth = ?2, gender = ?3, id_card = ?4,
                 phone = ?5, email = ?6, relationship = ?7
             WHERE id = ?8",
            params![
                resident.full_name,
                resident.date_of_birth,
                resident.gender,
                resident.id_card,
                resident.phone,
                resident.email,
                resident.relationship,
                id
            ],
        )
        .map_err(|e| map_unique(e, || "identity card is already registered".to_string()))?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "resident.updated", "resident", id).with_detail(detail),
        )?;
        tx.commit()?;
        Ok(resident)
    }

    /// Change a resident's status, keeping apartment occupancy in step.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or `InvalidTransition` for a move the lifecycle
    /// does not allow.
    pub fn set_resident_status(
        &mut self,
        id: i64,
        change: ResidentStatusChange,
        actor: &str,
    ) -> Result<Resident> {
        let tx = self.write_txn()?;
        let mut resident = fetch_resident(&tx, id)?;
        let from = resident.status;
        if !from.can_transition_to(change.status) {
            warn!(
                "Rejected resident {} status change {} -> {}",
                id, from, change.status
            );
            return Err(Error::invalid_transition("resident", from, change.status));
        }

        let effective_on = change
            .effective_on
            .unwrap_or_else(|| now().date_naive());
        resident.status = change.status;
        if change.status == ResidentStatus::MovedOut {
            if effective_on < resident.moved_in_on {
                return Err(Error::validation(format!(
                    "move-out date {effective_on} is before move-in date {}",
                    resident.moved_in_on
                )));
            }
            resident.moved_out_on = Some(effective_on);
        }

        tx.execute(
            "UPDATE residents SET status = ?1, moved_out_on = ?2 WHERE id = ?3",
            params![resident.status, resident.moved_out_on, id],
        )?;
        let occupancy = refresh_occupancy(&tx, resident.apartment_id)?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "resident.status_changed", "resident", id).with_detail(
                json!({
                    "from": from,
                    "to": resident.status,
                    "effective_on": effective_on,
                    "apartment_status": occupancy,
                }),
            ),
        )?;
        tx.commit()?;

        info!("Resident {} moved from {} to {}", id, from, resident.status);
        Ok(resident)
    }

    /// Delete a resident record entered by mistake.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or a conflict while vehicles or incidents reference
    /// the resident.
    pub fn delete_resident(&mut self, id: i64, actor: &str) -> Result<()> {
        let tx = self.write_txn()?;
        let resident = fetch_resident(&tx, id)?;
        let references: i64 = tx.query_row(
            "SELECT (SELECT COUNT(*) FROM vehicles WHERE owner_resident_id = ?1)
                  + (SELECT COUNT(*) FROM incidents WHERE reporter_resident_id = ?1)",
            [id],
            |row| row.get(0),
        )?;
        if references > 0 {
            return Err(Error::conflict(format!(
                "resident {id} is referenced by vehicles or incidents; move them out instead"
            )));
        }
        tx.execute("DELETE FROM residents WHERE id = ?1", [id])?;
        refresh_occupancy(&tx, resident.apartment_id)?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "resident.deleted", "resident", id)
                .with_detail(json!({ "full_name": resident.full_name })),
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn row_to_resident(row: &rusqlite::Row<'_>) -> rusqlite::Result<Resident> {
    Ok(Resident {
        id: row.get(0)?,
        apartment_id: row.get(1)?,
        full_name: row.get(2)?,
        date_of_birth: row.get(3)?,
        gender: row.get(4)?,
        id_card: row.get(5)?,
        phone: row.get(6)?,
        email: row.get(7)?,
        relationship: row.get(8)?,
        status: row.get(9)?,
        moved_in_on: row.get(10)?,
        moved_out_on: row.get(11)?,
        created_at: row.get(12)?,
    })
}
