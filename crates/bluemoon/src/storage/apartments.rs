//! Apartment registry.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::{debug, info};

use super::{now, write_audit, Storage};
use crate::error::{map_unique, Error, Result};
use crate::model::{
    Apartment, ApartmentFilter, ApartmentStatus, AuditRecord, NewApartment, Page, ResidentStatus,
};

pub(crate) const APARTMENT_COLUMNS: &str =
    "id, code, building, floor, area_m2, status, owner_name, created_at";

pub(crate) fn fetch_apartment(conn: &Connection, id: i64) -> Result<Apartment> {
    conn.query_row(
        &format!("SELECT {APARTMENT_COLUMNS} FROM apartments WHERE id = ?1"),
        [id],
        row_to_apartment,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("apartment", id))
}

pub(crate) fn find_apartment_by_code(conn: &Connection, code: &str) -> Result<Option<Apartment>> {
    Ok(conn
        .query_row(
            &format!("SELECT {APARTMENT_COLUMNS} FROM apartments WHERE code = ?1"),
            [code],
            row_to_apartment,
        )
        .optional()?)
}

pub(crate) fn insert_apartment(conn: &Connection, input: &NewApartment) -> Result<i64> {
    conn.execute(
        "INSERT INTO apartments (code, building, floor, area_m2, status, owner_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            input.code,
            input.building,
            input.floor,
            input.area_m2,
            ApartmentStatus::Vacant,
            input.owner_name,
            now(),
        ],
    )
    .map_err(|e| map_unique(e, || format!("apartment code {} already exists", input.code)))?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn replace_apartment(conn: &Connection, id: i64, input: &NewApartment) -> Result<()> {
    let affected = conn
        .execute(
            "UPDATE apartments SET code = ?1, building = ?2, floor = ?3, area_m2 = ?4,
             owner_name = ?5 WHERE id = ?6",
            params![
                input.code,
                input.building,
                input.floor,
                input.area_m2,
                input.owner_name,
                id
            ],
        )
        .map_err(|e| map_unique(e, || format!("apartment code {} already exists", input.code)))?;
    if affected == 0 {
        return Err(Error::not_found("apartment", id));
    }
    Ok(())
}

/// Recompute an apartment's occupancy from its residents.
pub(crate) fn refresh_occupancy(conn: &Connection, apartment_id: i64) -> Result<ApartmentStatus> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM residents WHERE apartment_id = ?1 GROUP BY status",
    )?;
    let rows = stmt.query_map([apartment_id], |row| {
        Ok((row.get::<_, ResidentStatus>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut residents = 0_i64;
    for row in rows {
        let (status, count) = row?;
        if status.is_resident() {
            residents += count;
        }
    }
    let status = if residents > 0 {
        ApartmentStatus::Occupied
    } else {
        ApartmentStatus::Vacant
    };
    conn.execute(
        "UPDATE apartments SET status = ?1 WHERE id = ?2",
        params![status, apartment_id],
    )?;
    Ok(status)
}

impl Storage {
    /// Register an apartment.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input or a conflict if the code is taken.
    pub fn create_apartment(&mut self, input: NewApartment, actor: &str) -> Result<Apartment> {
        let input = input.normalized()?;
        let tx = self.write_txn()?;
        let id = insert_apartment(&tx, &input)?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "apartment.created", "apartment", id)
                .with_detail(json!({ "code": input.code })),
        )?;
        let apartment = fetch_apartment(&tx, id)?;
        tx.commit()?;

        info!("Created apartment {} ({})", apartment.code, id);
        Ok(apartment)
    }

    /// Get an apartment by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such apartment.
    pub fn get_apartment(&self, id: i64) -> Result<Apartment> {
        fetch_apartment(&self.conn, id)
    }

    /// List apartments ordered by building and code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_apartments(&self, filter: &ApartmentFilter, page: Page) -> Result<Vec<Apartment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APARTMENT_COLUMNS} FROM apartments
             WHERE (?1 IS NULL OR building = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY building, code LIMIT ?3 OFFSET ?4"
        ))?;
        let apartments = stmt
            .query_map(
                params![filter.building, filter.status, page.limit, page.offset],
                row_to_apartment,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Listed {} apartments", apartments.len());
        Ok(apartments)
    }

    /// Replace an apartment's descriptive fields. Occupancy is not editable.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, a validation error, or a conflict on a duplicate code.
    pub fn update_apartment(
        &mut self,
        id: i64,
        input: NewApartment,
        actor: &str,
    ) -> Result<Apartment> {
        let input = input.normalized()?;
        let tx = self.write_txn()?;
        replace_apartment(&tx, id, &input)?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "apartment.updated", "apartment", id)
                .with_detail(serde_json::to_value(&input)?),
        )?;
        let apartment = fetch_apartment(&tx, id)?;
        tx.commit()?;
        Ok(apartment)
    }

    /// Delete an apartment that nothing references.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or a conflict while residents, invoices, vehicles,
    /// visits, contributions, incidents or targeted notices still reference it.
    pub fn delete_apartment(&mut self, id: i64, actor: &str) -> Result<()> {
        let tx = self.write_txn()?;
        let apartment = fetch_apartment(&tx, id)?;

        for (table, column, what) in [
            ("residents", "apartment_id", "residents"),
            ("invoices", "apartment_id", "invoices"),
            ("vehicles", "apartment_id", "vehicles"),
            ("visits", "apartment_id", "visits"),
            ("contributions", "apartment_id", "contributions"),
            ("incidents", "apartment_id", "incidents"),
            ("notifications", "audience_apartment_id", "notifications"),
        ] {
            let count: i64 = tx.query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?1"),
                [id],
                |row| row.get(0),
            )?;
            if count > 0 {
                return Err(Error::conflict(format!(
                    "apartment {} still has {count} {what}",
                    apartment.code
                )));
            }
        }

        tx.execute("DELETE FROM notification_reads WHERE apartment_id = ?1", [id])?;
        tx.execute("DELETE FROM apartments WHERE id = ?1", [id])?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "apartment.deleted", "apartment", id)
                .with_detail(json!({ "code": apartment.code })),
        )?;
        tx.commit()?;

        info!("Deleted apartment {} ({})", apartment.code, id);
        Ok(())
    }
}

pub(crate) fn row_to_apartment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Apartment> {
    Ok(Apartment {
        id: row.get(0)?,
        code: row.get(1)?,
        building: row.get(2)?,
        floor: row.get(3)?,
        area_m2: row.get(4)?,
        status: row.get(5)?,
        owner_name: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Audience, IncidentCategory, NewIncident, NewNotification, NotificationPriority, Priority,
    };
    use crate::storage::test_support::{self, ACTOR};

    fn input(code: &str) -> NewApartment {
        NewApartment {
            code: code.to_string(),
            building: "Tower B".to_string(),
            floor: 5,
            area_m2: 82.0,
            owner_name: Some("Pham Minh".to_string()),
        }
    }

    #[test]
    fn test_create_and_get() {
        let mut storage = test_support::storage();
        let apt = storage.create_apartment(input("b-501"), ACTOR).unwrap();

        assert_eq!(apt.code, "B-501");
        assert_eq!(apt.status, ApartmentStatus::Vacant);

        let fetched = storage.get_apartment(apt.id).unwrap();
        assert_eq!(fetched, apt);
    }

    #[test]
    fn test_duplicate_code_conflicts() {
        let mut storage = test_support::storage();
        storage.create_apartment(input("B-501"), ACTOR).unwrap();
        let err = storage.create_apartment(input("b-501"), ACTOR).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_get_missing() {
        let storage = test_support::storage();
        assert!(storage.get_apartment(42).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_filters() {
        let mut storage = test_support::storage();
        storage.create_apartment(input("B-501"), ACTOR).unwrap();
        let mut other = input("C-101");
        other.building = "Tower C".to_string();
        let c101 = storage.create_apartment(other, ACTOR).unwrap();
        test_support::resident(&mut storage, c101.id, "Vo Thi Hoa");

        let tower_c = storage
            .list_apartments(
                &ApartmentFilter {
                    building: Some("Tower C".to_string()),
                    status: None,
                },
                Page::default(),
            )
            .unwrap();
        assert_eq!(tower_c.len(), 1);

        let occupied = storage
            .list_apartments(
                &ApartmentFilter {
                    building: None,
                    status: Some(ApartmentStatus::Occupied),
                },
                Page::default(),
            )
            .unwrap();
        assert_eq!(occupied.len(), 1);
        assert_eq!(occupied[0].code, "C-101");
    }

    #[test]
    fn test_list_pagination() {
        let mut storage = test_support::storage();
        for i in 0..5 {
            storage
                .create_apartment(input(&format!("B-50{i}")), ACTOR)
                .unwrap();
        }
        let page = storage
            .list_apartments(&ApartmentFilter::default(), Page::new(2, 2))
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].code, "B-502");
    }

    #[test]
    fn test_update() {
        let mut storage = test_support::storage();
        let apt = storage.create_apartment(input("B-501"), ACTOR).unwrap();

        let mut changed = input("B-501");
        changed.area_m2 = 90.0;
        let updated = storage.update_apartment(apt.id, changed, ACTOR).unwrap();
        assert!((updated.area_m2 - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_update_missing() {
        let mut storage = test_support::storage();
        let err = storage
            .update_apartment(9, input("B-501"), ACTOR)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_blocked_by_residents() {
        let mut storage = test_support::storage();
        let apt = storage.create_apartment(input("B-501"), ACTOR).unwrap();
        test_support::resident(&mut storage, apt.id, "Dang Van Long");

        let err = storage.delete_apartment(apt.id, ACTOR).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_delete_blocked_by_incidents() {
        let mut storage = test_support::storage();
        let apt = storage.create_apartment(input("B-501"), ACTOR).unwrap();
        storage
            .report_incident(
                NewIncident {
                    apartment_id: Some(apt.id),
                    reporter_resident_id: None,
                    title: "Leaking pipe".to_string(),
                    description: String::new(),
                    category: IncidentCategory::Maintenance,
                    priority: Priority::High,
                },
                ACTOR,
            )
            .unwrap();

        let err = storage.delete_apartment(apt.id, ACTOR).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert!(err.to_string().contains("incidents"));
    }

    #[test]
    fn test_delete_blocked_by_targeted_notification() {
        let mut storage = test_support::storage();
        let apt = storage.create_apartment(input("B-501"), ACTOR).unwrap();
        storage
            .publish_notification(
                NewNotification {
                    title: "Water meter".to_string(),
                    body: "Reading on Friday".to_string(),
                    audience: Audience::Apartment { apartment_id: apt.id },
                    priority: NotificationPriority::Normal,
                    expires_at: None,
                },
                ACTOR,
            )
            .unwrap();

        let err = storage.delete_apartment(apt.id, ACTOR).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert!(err.to_string().contains("notifications"));
    }

    #[test]
    fn test_delete_empty() {
        let mut storage = test_support::storage();
        let apt = storage.create_apartment(input("B-501"), ACTOR).unwrap();
        storage.delete_apartment(apt.id, ACTOR).unwrap();
        assert!(storage.get_apartment(apt.id).unwrap_err().is_not_found());
    }
}
