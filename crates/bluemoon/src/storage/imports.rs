//! Master-data import.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::{debug, info, warn};

use super::apartments::{find_apartment_by_code, insert_apartment, replace_apartment};
use super::residents::{find_resident_by_id_card, insert_resident};
use super::vehicles::{insert_vehicle, plate_registered};
use super::{now, write_audit, Storage};
use crate::error::{Error, Result, RowFailure};
use crate::import::{
    content_hash, decode_rows, parse, ImportReport, MasterData, ResidentRow, VehicleRow,
};
use crate::model::apartment::normalize_code;
use crate::model::vehicle::validate_plate;
use crate::model::{AuditRecord, NewApartment, NewResident, NewVehicle};

/// A document whose rows have all passed validation.
struct Validated {
    apartments: Vec<NewApartment>,
    residents: Vec<(String, NewResident)>,
    vehicles: Vec<(String, NewVehicle)>,
}

fn previous_batch(conn: &Connection, hash: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM import_batches WHERE content_hash = ?1",
            [hash],
            |row| row.get(0),
        )
        .optional()?)
}

fn existing_codes(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT code FROM apartments")?;
    let codes = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<String>, _>>()?;
    Ok(codes)
}

fn resident_row(row: ResidentRow) -> Result<(String, NewResident)> {
    let code = normalize_code(&row.apartment_code)?;
    let resident = NewResident {
        apartment_id: 0,
        full_name: row.full_name,
        date_of_birth: row.date_of_birth,
        gender: row.gender,
        id_card: row.id_card,
        phone: row.phone,
        email: row.email,
        relationship: row.relationship,
        moved_in_on: row.moved_in_on,
    }
    .normalized()?;
    Ok((code, resident))
}

fn vehicle_row(row: VehicleRow, plate_pattern: &Regex) -> Result<(String, NewVehicle)> {
    let code = normalize_code(&row.apartment_code)?;
    let plate = validate_plate(&row.plate, plate_pattern)?;
    Ok((
        code,
        NewVehicle {
            apartment_id: 0,
            plate,
            kind: row.kind,
            owner_resident_id: None,
        },
    ))
}

/// Validate every row, collecting all failures rather than stopping at the first.
fn validate(
    conn: &Connection,
    document: MasterData,
    plate_pattern: &Regex,
) -> Result<std::result::Result<Validated, Vec<RowFailure>>> {
    let mut failures = Vec::new();
    let mut fail = |section: &'static str, row: usize, err: &Error| {
        failures.push(RowFailure {
            section,
            row,
            message: err.to_string(),
        });
    };

    let mut known = existing_codes(conn)?;
    let mut in_document = HashSet::new();
    let mut apartments = Vec::with_capacity(document.apartments.len());
    for (row, input) in decode_rows::<NewApartment>(document.apartments) {
        match input.and_then(NewApartment::normalized) {
            Ok(apartment) if !in_document.insert(apartment.code.clone()) => fail(
                "apartments",
                row,
                &Error::conflict(format!("apartment code {} appears twice", apartment.code)),
            ),
            Ok(apartment) => {
                known.insert(apartment.code.clone());
                apartments.push(apartment);
            }
            Err(e) => fail("apartments", row, &e),
        }
    }

    let mut id_cards = HashSet::new();
    let mut residents = Vec::with_capacity(document.residents.len());
    for (row, input) in decode_rows::<ResidentRow>(document.residents) {
        match input.and_then(resident_row) {
            Ok((code, _)) if !known.contains(&code) => fail(
                "residents",
                row,
                &Error::validation(format!("unknown apartment code {code}")),
            ),
            Ok((_, resident))
                if resident
                    .id_card
                    .as_ref()
                    .is_some_and(|card| !id_cards.insert(card.clone())) =>
            {
                fail(
                    "residents",
                    row,
                    &Error::conflict("identity card appears twice in the document"),
                );
            }
            Ok(pair) => residents.push(pair),
            Err(e) => fail("residents", row, &e),
        }
    }

    let mut plates = HashSet::new();
    let mut vehicles = Vec::with_capacity(document.vehicles.len());
    for (row, input) in decode_rows::<VehicleRow>(document.vehicles) {
        match input.and_then(|input| vehicle_row(input, plate_pattern)) {
            Ok((code, _)) if !known.contains(&code) => fail(
                "vehicles",
                row,
                &Error::validation(format!("unknown apartment code {code}")),
            ),
            Ok((_, vehicle)) if !plates.insert(vehicle.plate.clone()) => fail(
                "vehicles",
                row,
                &Error::conflict(format!("plate {} appears twice", vehicle.plate)),
            ),
            Ok(pair) => vehicles.push(pair),
            Err(e) => fail("vehicles", row, &e),
        }
    }

    if failures.is_empty() {
        Ok(Ok(Validated {
            apartments,
            residents,
            vehicles,
        }))
    } else {
        Ok(Err(failures))
    }
}

/// Write a validated document, tallying each row into the report.
fn apply(conn: &Connection, data: Validated, report: &mut ImportReport) -> Result<()> {
    let mut ids: HashMap<String, i64> = HashMap::new();

    for apartment in &data.apartments {
        match find_apartment_by_code(conn, &apartment.code)? {
            Some(existing)
                if existing.building == apartment.building
                    && existing.floor == apartment.floor
                    && (existing.area_m2 - apartment.area_m2).abs() < f64::EPSILON
                    && existing.owner_name == apartment.owner_name =>
            {
                report.apartments.skipped += 1;
                ids.insert(existing.code, existing.id);
            }
            Some(existing) => {
                replace_apartment(conn, existing.id, apartment)?;
                report.apartments.updated += 1;
                ids.insert(existing.code, existing.id);
            }
            None => {
                let id = insert_apartment(conn, apartment)?;
                report.apartments.created += 1;
                ids.insert(apartment.code.clone(), id);
            }
        }
    }

    for (code, mut resident) in data.residents {
        if let Some(card) = resident.id_card.as_deref() {
            if find_resident_by_id_card(conn, card)?.is_some() {
                debug!("Skipping resident {}: identity card on file", resident.full_name);
                report.residents.skipped += 1;
                continue;
            }
        }
        resident.apartment_id = apartment_id(conn, &mut ids, &code)?;
        insert_resident(conn, &resident)?;
        report.residents.created += 1;
    }

    for (code, mut vehicle) in data.vehicles {
        if plate_registered(conn, &vehicle.plate)? {
            debug!("Skipping vehicle {}: already registered", vehicle.plate);
            report.vehicles.skipped += 1;
            continue;
        }
        vehicle.apartment_id = apartment_id(conn, &mut ids, &code)?;
        insert_vehicle(conn, &vehicle)?;
        report.vehicles.created += 1;
    }

    Ok(())
}

fn apartment_id(conn: &Connection, ids: &mut HashMap<String, i64>, code: &str) -> Result<i64> {
    if let Some(id) = ids.get(code) {
        return Ok(*id);
    }
    let apartment = find_apartment_by_code(conn, code)?
        .ok_or_else(|| Error::internal(format!("apartment {code} vanished during import")))?;
    ids.insert(apartment.code, apartment.id);
    Ok(apartment.id)
}

impl Storage {
    /// Import a master-data document.
    ///
    /// A document whose hash matches an earlier import is reported as
    /// `already_imported` and nothing is written. Otherwise every row is
    /// validated before anything is written, and the whole document is
    /// applied in one transaction.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed document, or
    /// [`Error::Import`] listing every rejected row.
    pub fn import_master_data(
        &mut self,
        bytes: &[u8],
        source: Option<&str>,
        actor: &str,
    ) -> Result<ImportReport> {
        let hash = content_hash(bytes);
        let document = parse(bytes)?;
        let plate_pattern = self.rules.plate_pattern.clone();
        let mut report = ImportReport::new(hash.clone());

        let tx = self.write_txn()?;
        if let Some(batch) = previous_batch(&tx, &hash)? {
            info!("Document {} already imported as batch {}", hash, batch);
            report.already_imported = true;
            return Ok(report);
        }

        let data = match validate(&tx, document, &plate_pattern)? {
            Ok(data) => data,
            Err(failures) => {
                warn!("Import rejected: {} rows failed validation", failures.len());
                return Err(Error::Import {
                    message: format!("{} rows failed validation", failures.len()),
                    failures,
                });
            }
        };
        apply(&tx, data, &mut report)?;

        tx.execute(
            "INSERT INTO import_batches (content_hash, source, summary, imported_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![hash, source, serde_json::to_string(&report)?, now()],
        )?;
        let batch = tx.last_insert_rowid();
        write_audit(
            &tx,
            &AuditRecord::new(actor, "import.applied", "import_batch", batch).with_detail(json!({
                "content_hash": hash,
                "source": source,
                "apartments": report.apartments,
                "residents": report.residents,
                "vehicles": report.vehicles,
            })),
        )?;
        tx.commit()?;

        info!(
            "Imported batch {}: {} rows written",
            batch,
            report.written()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApartmentFilter, ApartmentStatus, Page};
    use crate::storage::test_support::{self, ACTOR};

    const DOCUMENT: &str = r#"{
        "apartments": [
            {"code": "a-101", "building": "Tower A", "floor": 3, "area_m2": 60.5},
            {"code": "A-102", "building": "Tower A", "floor": 1, "area_m2": 48}
        ],
        "residents": [
            {"apartment_code": "A-101", "full_name": "Nguyen Van An", "id_card": "001090000001",
             "relationship": "owner"},
            {"apartment_code": "a-101", "full_name": "Nguyen Thi Binh"}
        ],
        "vehicles": [
            {"apartment_code": "A-101", "plate": "30a-123.45", "kind": "car"}
        ]
    }"#;

    #[test]
    fn test_import_creates_everything() {
        let mut storage = test_support::storage();
        let report = storage
            .import_master_data(DOCUMENT.as_bytes(), Some("seed.json"), ACTOR)
            .unwrap();

        assert!(!report.already_imported);
        assert_eq!(report.apartments.created, 2);
        assert_eq!(report.residents.created, 2);
        assert_eq!(report.vehicles.created, 1);

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
        assert_eq!(occupied[0].code, "A-101");
        assert!(storage.find_vehicle_by_plate("30A-12345").unwrap().is_some());
    }

    #[test]
    fn test_same_document_is_skipped() {
        let mut storage = test_support::storage();
        storage
            .import_master_data(DOCUMENT.as_bytes(), None, ACTOR)
            .unwrap();
        let again = storage
            .import_master_data(DOCUMENT.as_bytes(), None, ACTOR)
            .unwrap();

        assert!(again.already_imported);
        assert_eq!(again.written(), 0);
        assert_eq!(storage.stats().unwrap().rows["residents"], 2);
    }

    #[test]
    fn test_upsert_by_code_and_skip_known_rows() {
        let mut storage = test_support::storage();
        let unchanged = test_support::apartment(&mut storage, "A-101", 60.5);
        let resized = test_support::apartment(&mut storage, "A-102", 30.0);
        storage
            .register_resident(
                NewResident {
                    apartment_id: unchanged.id,
                    full_name: "Nguyen Van An".to_string(),
                    date_of_birth: None,
                    gender: None,
                    id_card: Some("001090000001".to_string()),
                    phone: None,
                    email: None,
                    relationship: crate::model::Relationship::Owner,
                    moved_in_on: None,
                },
                ACTOR,
            )
            .unwrap();

        let report = storage
            .import_master_data(DOCUMENT.as_bytes(), None, ACTOR)
            .unwrap();
        assert_eq!(report.apartments.skipped, 1);
        assert_eq!(report.apartments.updated, 1);
        assert_eq!(report.apartments.created, 0);
        assert_eq!(report.residents.skipped, 1);
        assert_eq!(report.residents.created, 1);

        let resized = storage.get_apartment(resized.id).unwrap();
        assert!((resized.area_m2 - 48.0).abs() < f64::EPSILON);
        assert_eq!(storage.stats().unwrap().rows["import_batches"], 1);
    }

    #[test]
    fn test_invalid_rows_abort_everything() {
        let mut storage = test_support::storage();
        let document = r#"{
            "apartments": [
                {"code": "B-1", "building": "Tower B", "floor": 1, "area_m2": 0},
                {"code": "B-2", "building": "Tower B", "floor": 1, "area_m2": 40}
            ],
            "residents": [
                {"apartment_code": "Z-9", "full_name": "Nobody"},
                {"apartment_code": "B-2", "full_name": " "}
            ],
            "vehicles": [
                {"apartment_code": "B-2", "plate": "not a plate", "kind": "motorbike"}
            ]
        }"#;

        let err = storage
            .import_master_data(document.as_bytes(), None, ACTOR)
            .unwrap_err();
        let Error::Import { failures, .. } = err else {
            panic!("expected an import error, got {err:?}");
        };
        let located: Vec<(&str, usize)> = failures.iter().map(|f| (f.section, f.row)).collect();
        assert_eq!(
            located,
            [("apartments", 0), ("residents", 0), ("residents", 1), ("vehicles", 0)]
        );
        assert_eq!(storage.stats().unwrap().rows["apartments"], 0);
        assert_eq!(storage.stats().unwrap().rows["import_batches"], 0);
    }

    #[test]
    fn test_undecodable_rows_are_listed_with_the_rest() {
        let mut storage = test_support::storage();
        test_support::apartment(&mut storage, "C-1", 50.0);
        let document = r#"{
            "apartments": [
                {"code": "C-2", "building": "Tower C", "floor": "ground", "area_m2": 40}
            ],
            "residents": [
                {"apartment_code": "C-1", "full_name": "Do Van Em", "date_of_birth": "31/12/1990"}
            ],
            "vehicles": [
                {"apartment_code": "C-1", "plate": "30A-12345", "kind": "truck"},
                {"apartment_code": "C-1", "plate": "bad", "kind": "car"}
            ]
        }"#;

        let err = storage
            .import_master_data(document.as_bytes(), None, ACTOR)
            .unwrap_err();
        let Error::Import { failures, .. } = err else {
            panic!("expected an import error, got {err:?}");
        };
        let located: Vec<(&str, usize)> = failures.iter().map(|f| (f.section, f.row)).collect();
        assert_eq!(
            located,
            [("apartments", 0), ("residents", 0), ("vehicles", 0), ("vehicles", 1)]
        );
        assert!(failures[2].message.contains("truck"));
        assert_eq!(storage.stats().unwrap().rows["vehicles"], 0);
    }

    #[test]
    fn test_duplicate_plate_in_document() {
        let mut storage = test_support::storage();
        test_support::apartment(&mut storage, "C-1", 50.0);
        let document = r#"{"vehicles": [
            {"apartment_code": "C-1", "plate": "29B-11111", "kind": "car"},
            {"apartment_code": "C-1", "plate": "29b-111.11", "kind": "car"}
        ]}"#;

        let err = storage
            .import_master_data(document.as_bytes(), None, ACTOR)
            .unwrap_err();
        assert!(matches!(err, Error::Import { ref failures, .. } if failures.len() == 1));
    }
}
