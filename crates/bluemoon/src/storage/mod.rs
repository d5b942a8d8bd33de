//! Storage layer for bluemoon.
//!
//! This module provides `SQLite`-based persistent storage for the registry,
//! the billing ledger and the activity logs. Each domain lives in its own
//! submodule as an `impl Storage` block; multi-row changes run inside an
//! immediate transaction so the write lock is held from the first read.

pub mod migrations;
pub mod schema;

mod apartments;
mod audit;
mod billing;
mod dashboard;
mod donations;
mod imports;
mod incidents;
mod notifications;
mod residents;
mod vehicles;
mod visits;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};

pub(crate) use audit::write_audit;

/// Business rules that come from configuration.
#[derive(Debug, Clone)]
pub struct Rules {
    /// Day of the month invoices fall due.
    pub due_day: u32,
    /// Format a normalized licence plate must match.
    pub plate_pattern: Regex,
}

impl Rules {
    /// Build the rules from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the plate pattern is not a valid regex.
    pub fn from_config(config: &Config) -> Result<Self> {
        let plate_pattern =
            Regex::new(&config.vehicles.plate_pattern).map_err(|e| Error::ConfigValidation {
                message: format!("invalid regex pattern: {e}"),
            })?;
        Ok(Self {
            due_day: config.billing.due_day,
            plate_pattern,
        })
    }
}

impl Default for Rules {
    fn default() -> Self {
        let config = Config::default();
        Self {
            due_day: config.billing.due_day,
            plate_pattern: Regex::new(&config.vehicles.plate_pattern)
                .expect("default plate pattern compiles"),
        }
    }
}

/// Storage engine for the condominium registry.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
    /// Configured business rules.
    rules: Rules,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets the dashboard read while a payment is being written
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::prepare(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn,
            rules: Rules::default(),
        })
    }

    /// Open the database named by the configuration and apply its rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the rules are invalid.
    pub fn open_with_config(config: &Config) -> Result<Self> {
        let rules = Rules::from_config(config)?;
        let storage = Self::open(config.database_path())?;
        storage.set_busy_timeout(config.busy_timeout())?;
        Ok(storage.with_rules(rules))
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        Self::prepare(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
            rules: Rules::default(),
        })
    }

    fn prepare(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        // SQLite's lower() only folds ASCII
        conn.create_scalar_function(
            "fold",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
        )?;
        migrations::initialize_schema(conn)
    }

    /// Replace the business rules.
    #[must_use]
    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    /// The business rules in force.
    #[must_use]
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Set how long writers wait for a locked database.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma cannot be applied.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin an immediate transaction, taking the write lock up front.
    fn write_txn(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let mut rows = BTreeMap::new();
        for table in schema::COUNTED_TABLES {
            let count: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
            rows.insert((*table).to_string(), count);
        }

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            path: self.path.clone(),
            schema_version: migrations::get_schema_version(&self.conn)?,
            rows,
            db_size_bytes,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Database file.
    pub path: PathBuf,
    /// Applied schema version.
    pub schema_version: i32,
    /// Row counts per table.
    pub rows: BTreeMap<String, i64>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// The current time, truncated to milliseconds so stored values round-trip.
/// A case-folded `LIKE` substring pattern escaped with `\`.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Fail with `NotFound` unless `table` has a row with `id`.
pub(crate) fn ensure_exists(
    conn: &Connection,
    table: &'static str,
    entity: &'static str,
    id: i64,
) -> Result<()> {
    let found: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"),
        [id],
        |row| row.get(0),
    )?;
    if found {
        Ok(())
    } else {
        Err(Error::not_found(entity, id))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Storage;
    use crate::model::{
        Apartment, FeeCalculation, FeeKind, NewApartment, NewFee, NewResident, Relationship,
        Resident,
    };

    pub const ACTOR: &str = "tester";

    pub fn storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    pub fn apartment(storage: &mut Storage, code: &str, area_m2: f64) -> Apartment {
        storage
            .create_apartment(
                NewApartment {
                    code: code.to_string(),
                    building: "Tower A".to_string(),
                    floor: 3,
                    area_m2,
                    owner_name: None,
                },
                ACTOR,
            )
            .expect("failed to create apartment")
    }

    pub fn resident(storage: &mut Storage, apartment_id: i64, name: &str) -> Resident {
        storage
            .register_resident(
                NewResident {
                    apartment_id,
                    full_name: name.to_string(),
                    date_of_birth: None,
                    gender: None,
                    id_card: None,
                    phone: None,
                    email: None,
                    relationship: Relationship::Owner,
                    moved_in_on: None,
                },
                ACTOR,
            )
            .expect("failed to register resident")
    }

    pub fn fee(
        storage: &mut Storage,
        name: &str,
        calculation: FeeCalculation,
        unit_price: i64,
    ) -> crate::model::Fee {
        storage
            .create_fee(
                NewFee {
                    name: name.to_string(),
                    kind: FeeKind::Mandatory,
                    calculation,
                    unit_price,
                    description: None,
                },
                ACTOR,
            )
            .expect("failed to create fee")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("Văn"), "%văn%");
        assert_eq!(contains_pattern("10%_off\\"), "%10\\%\\_off\\\\%");
    }

    #[test]
    fn test_open_in_memory() {
        let storage = Storage::open_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_path() {
        let storage = test_support::storage();
        assert_eq!(storage.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_stats_empty() {
        let storage = test_support::storage();
        let stats = storage.stats().unwrap();

        assert_eq!(stats.schema_version, migrations::CURRENT_VERSION);
        assert_eq!(stats.rows["apartments"], 0);
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_stats_counts_rows() {
        let mut storage = test_support::storage();
        test_support::apartment(&mut storage, "A-101", 60.0);
        test_support::apartment(&mut storage, "A-102", 70.0);

        let stats = storage.stats().unwrap();
        assert_eq!(stats.rows["apartments"], 2);
        // creation is audited
        assert_eq!(stats.rows["audit_log"], 2);
    }

    #[test]
    fn test_ensure_exists() {
        let mut storage = test_support::storage();
        let apt = test_support::apartment(&mut storage, "B-1", 50.0);

        assert!(ensure_exists(&storage.conn, "apartments", "apartment", apt.id).is_ok());
        let err = ensure_exists(&storage.conn, "apartments", "apartment", 999).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_rules_from_config() {
        let mut config = Config::default();
        config.billing.due_day = 5;
        let rules = Rules::from_config(&config).unwrap();
        assert_eq!(rules.due_day, 5);
        assert!(rules.plate_pattern.is_match("30A12345"));
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = std::env::temp_dir().join(format!("bluemoon-test-{}", std::process::id()));
        let path = dir.join("nested").join("bluemoon.db");
        let storage = Storage::open(&path).unwrap();
        assert!(storage.path().exists());
        drop(storage);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
