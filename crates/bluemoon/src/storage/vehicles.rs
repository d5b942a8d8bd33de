//! Vehicle registry and parking gate log.

use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::{debug, info, warn};

use super::apartments::fetch_apartment;
use super::residents::fetch_resident;
use super::{now, write_audit, Storage};
use crate::error::{map_unique, Error, Result};
use crate::model::vehicle::{normalize_plate, validate_plate};
use crate::model::{
    AuditRecord, Direction, NewVehicle, Page, ParkingLog, ParkingState, Vehicle, VehicleFilter,
    VehicleStatus, VehicleStatusChange,
};

const VEHICLE_COLUMNS: &str =
    "id, apartment_id, plate, kind, owner_resident_id, status, parking_state, registered_at";

fn fetch_vehicle(conn: &Connection, id: i64) -> Result<Vehicle> {
    conn.query_row(
        &format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = ?1"),
        [id],
        row_to_vehicle,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("vehicle", id))
}

pub(crate) fn plate_registered(conn: &Connection, plate: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM vehicles WHERE plate = ?1)",
        [plate],
        |row| row.get(0),
    )?)
}

/// Check a registration against the apartment and plate rules.
///
/// Returns the input with its plate normalized.
pub(crate) fn validate_vehicle(
    conn: &Connection,
    input: NewVehicle,
    plate_pattern: &Regex,
) -> Result<NewVehicle> {
    let plate = validate_plate(&input.plate, plate_pattern)?;
    fetch_apartment(conn, input.apartment_id)?;
    if let Some(resident_id) = input.owner_resident_id {
        let owner = fetch_resident(conn, resident_id)?;
        if owner.apartment_id != input.apartment_id {
            return Err(Error::validation(format!(
                "resident {resident_id} does not live in apartment {}",
                input.apartment_id
            )));
        }
    }
    Ok(NewVehicle { plate, ..input })
}

/// Insert a validated vehicle, parked outside.
pub(crate) fn insert_vehicle(conn: &Connection, input: &NewVehicle) -> Result<i64> {
    conn.execute(
        "INSERT INTO vehicles (apartment_id, plate, kind, owner_resident_id, status,
             parking_state, registered_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            input.apartment_id,
            input.plate,
            input.kind,
            input.owner_resident_id,
            VehicleStatus::Active,
            ParkingState::Outside,
            now(),
        ],
    )
    .map_err(|e| map_unique(e, || format!("plate {} is already registered", input.plate)))?;
    Ok(conn.last_insert_rowid())
}

fn log_passage(conn: &Connection, vehicle_id: i64, direction: Direction) -> Result<ParkingLog> {
    let at = now();
    let state = match direction {
        Direction::Entry => ParkingState::Inside,
        Direction::Exit => ParkingState::Outside,
    };
    conn.execute(
        "UPDATE vehicles SET parking_state = ?1 WHERE id = ?2",
        params![state, vehicle_id],
    )?;
    conn.execute(
        "INSERT INTO parking_logs (vehicle_id, direction, at) VALUES (?1, ?2, ?3)",
        params![vehicle_id, direction, at],
    )?;
    Ok(ParkingLog {
        id: conn.last_insert_rowid(),
        vehicle_id,
        direction,
        at,
    })
}

impl Storage {
    /// Register a vehicle to an apartment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown apartment or owner, a validation error
    /// for a malformed plate or an owner from another apartment, or a conflict
    /// if the plate is already registered.
    pub fn register_vehicle(&mut self, input: NewVehicle, actor: &str) -> Result<Vehicle> {
        let pattern = self.rules.plate_pattern.clone();
        let tx = self.write_txn()?;
        let input = validate_vehicle(&tx, input, &pattern)?;
        let id = insert_vehicle(&tx, &input)?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "vehicle.registered", "vehicle", id).with_detail(json!({
                "apartment_id": input.apartment_id,
                "plate": input.plate,
                "kind": input.kind,
            })),
        )?;
        let vehicle = fetch_vehicle(&tx, id)?;
        tx.commit()?;

        info!("Registered vehicle {} ({})", vehicle.plate, id);
        Ok(vehicle)
    }

    /// Get a vehicle by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such vehicle.
    pub fn get_vehicle(&self, id: i64) -> Result<Vehicle> {
        fetch_vehicle(&self.conn, id)
    }

    /// Look up a vehicle by plate, normalizing the input first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_vehicle_by_plate(&self, plate: &str) -> Result<Option<Vehicle>> {
        let plate = normalize_plate(plate);
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE plate = ?1"),
                [&plate],
                row_to_vehicle,
            )
            .optional()?)
    }

    /// List vehicles ordered by plate.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_vehicles(&self, filter: &VehicleFilter, page: Page) -> Result<Vec<Vehicle>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles
             WHERE (?1 IS NULL OR apartment_id = ?1)
               AND (?2 IS NULL OR kind = ?2)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY plate LIMIT ?4 OFFSET ?5"
        ))?;
        let vehicles = stmt
            .query_map(
                params![
                    filter.apartment_id,
                    filter.kind,
                    filter.status,
                    page.limit,
                    page.offset
                ],
                row_to_vehicle,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Listed {} vehicles", vehicles.len());
        Ok(vehicles)
    }

    /// Suspend, reinstate or deregister a vehicle.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidTransition` for a move the lifecycle does
    /// not allow, or a conflict when deregistering a vehicle still parked inside.
    pub fn set_vehicle_status(
        &mut self,
        id: i64,
        change: VehicleStatusChange,
        actor: &str,
    ) -> Result<Vehicle> {
        let tx = self.write_txn()?;
        let vehicle = fetch_vehicle(&tx, id)?;
        if !vehicle.status.can_transition_to(change.status) {
            return Err(Error::invalid_transition(
                "vehicle",
                vehicle.status,
                change.status,
            ));
        }
        if change.status == VehicleStatus::Deregistered
            && vehicle.parking_state == ParkingState::Inside
        {
            return Err(Error::conflict(format!(
                "vehicle {} is parked inside and cannot be deregistered",
                vehicle.plate
            )));
        }

        tx.execute(
            "UPDATE vehicles SET status = ?1 WHERE id = ?2",
            params![change.status, id],
        )?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "vehicle.status_changed", "vehicle", id)
                .with_detail(json!({ "from": vehicle.status, "to": change.status })),
        )?;
        let updated = fetch_vehicle(&tx, id)?;
        tx.commit()?;

        info!(
            "Vehicle {} moved from {} to {}",
            updated.plate, vehicle.status, updated.status
        );
        Ok(updated)
    }

    /// Let a vehicle into the car park.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or a conflict unless the vehicle is active and
    /// currently outside.
    pub fn record_entry(&mut self, id: i64) -> Result<ParkingLog> {
        let tx = self.write_txn()?;
        let vehicle = fetch_vehicle(&tx, id)?;
        if vehicle.status != VehicleStatus::Active {
            warn!("Refused entry to {} vehicle {}", vehicle.status, vehicle.plate);
            return Err(Error::conflict(format!(
                "vehicle {} is {} and may not enter",
                vehicle.plate, vehicle.status
            )));
        }
        if vehicle.parking_state == ParkingState::Inside {
            return Err(Error::conflict(format!(
                "vehicle {} is already inside",
                vehicle.plate
            )));
        }
        let log = log_passage(&tx, id, Direction::Entry)?;
        tx.commit()?;

        debug!("Vehicle {} entered", vehicle.plate);
        Ok(log)
    }

    /// Let a vehicle out of the car park. Suspended vehicles may still leave.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or a conflict unless the vehicle is inside.
    pub fn record_exit(&mut self, id: i64) -> Result<ParkingLog> {
        let tx = self.write_txn()?;
        let vehicle = fetch_vehicle(&tx, id)?;
        if vehicle.parking_state != ParkingState::Inside {
            return Err(Error::conflict(format!(
                "vehicle {} is not inside",
                vehicle.plate
            )));
        }
        let log = log_passage(&tx, id, Direction::Exit)?;
        tx.commit()?;

        debug!("Vehicle {} left", vehicle.plate);
        Ok(log)
    }

    /// Gate passages of a vehicle, newest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such vehicle.
    pub fn parking_history(&self, vehicle_id: i64, page: Page) -> Result<Vec<ParkingLog>> {
        fetch_vehicle(&self.conn, vehicle_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, vehicle_id, direction, at FROM parking_logs
             WHERE vehicle_id = ?1 ORDER BY at DESC, id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let logs = stmt
            .query_map(params![vehicle_id, page.limit, page.offset], |row| {
                Ok(ParkingLog {
                    id: row.get(0)?,
                    vehicle_id: row.get(1)?,
                    direction: row.get(2)?,
                    at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(logs)
    }
}

fn row_to_vehicle(row: &rusqlite::Row<'_>) -> rusqlite::Result<Vehicle> {
    Ok(Vehicle {
        id: row.get(0)?,
        apartment_id: row.get(1)?,
        plate: row.get(2)?,
        kind: row.get(3)?,
        owner_resident_id: row.get(4)?,
        status: row.get(5)?,
        parking_state: row.get(6)?,
        registered_at: row.get(7)?,
    })
}
