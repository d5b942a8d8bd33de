//! `SQLite` schema definitions for bluemoon.
//!
//! This module contains the SQL statements for creating the database schema.
//! Money columns are whole VND, dates are `YYYY-MM-DD` text, timestamps are
//! RFC 3339 text.

/// SQL statement to create the apartments table.
pub const CREATE_APARTMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS apartments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    building TEXT NOT NULL,
    floor INTEGER NOT NULL,
    area_m2 REAL NOT NULL CHECK (area_m2 > 0),
    status TEXT NOT NULL DEFAULT 'vacant',
    owner_name TEXT,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the residents table.
pub const CREATE_RESIDENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS residents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    apartment_id INTEGER NOT NULL REFERENCES apartments(id),
    full_name TEXT NOT NULL,
    date_of_birth TEXT,
    gender TEXT,
    id_card TEXT UNIQUE,
    phone TEXT,
    email TEXT,
    relationship TEXT NOT NULL,
    status TEXT NOT NULL,
    moved_in_on TEXT NOT NULL,
    moved_out_on TEXT,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the fee catalogue table.
pub const CREATE_FEES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS fees (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    calculation TEXT NOT NULL,
    unit_price INTEGER NOT NULL CHECK (unit_price >= 0),
    active INTEGER NOT NULL DEFAULT 1,
    description TEXT,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the invoices table.
pub const CREATE_INVOICES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS invoices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    apartment_id INTEGER NOT NULL REFERENCES apartments(id),
    fee_id INTEGER NOT NULL REFERENCES fees(id),
    period TEXT NOT NULL,
    amount_due INTEGER NOT NULL CHECK (amount_due >= 0),
    amount_paid INTEGER NOT NULL DEFAULT 0 CHECK (amount_paid >= 0),
    status TEXT NOT NULL,
    due_date TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (apartment_id, fee_id, period)
)
";

/// SQL statement to create the payments table.
pub const CREATE_PAYMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    invoice_id INTEGER NOT NULL REFERENCES invoices(id),
    amount INTEGER NOT NULL CHECK (amount > 0),
    method TEXT NOT NULL,
    payer TEXT,
    note TEXT,
    paid_at TEXT NOT NULL
)
";

/// SQL statement to create the vehicles table.
pub const CREATE_VEHICLES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS vehicles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    apartment_id INTEGER NOT NULL REFERENCES apartments(id),
    plate TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    owner_resident_id INTEGER REFERENCES residents(id),
    status TEXT NOT NULL,
    parking_state TEXT NOT NULL,
    registered_at TEXT NOT NULL
)
";

/// SQL statement to create the parking gate log.
pub const CREATE_PARKING_LOGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS parking_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vehicle_id INTEGER NOT NULL REFERENCES vehicles(id),
    direction TEXT NOT NULL,
    at TEXT NOT NULL
)
";

/// SQL statement to create the visitor log.
pub const CREATE_VISITS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS visits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    apartment_id INTEGER NOT NULL REFERENCES apartments(id),
    visitor_name TEXT NOT NULL,
    id_card TEXT,
    phone TEXT,
    purpose TEXT,
    vehicle_plate TEXT,
    checked_in_at TEXT NOT NULL,
    checked_out_at TEXT
)
";

/// SQL statement to create the incidents table.
pub const CREATE_INCIDENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS incidents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    apartment_id INTEGER REFERENCES apartments(id),
    reporter_resident_id INTEGER REFERENCES residents(id),
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    category TEXT NOT NULL,
    priority TEXT NOT NULL,
    priority_rank INTEGER NOT NULL,
    status TEXT NOT NULL,
    assignee TEXT,
    resolution TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    resolved_at TEXT
)
";

/// SQL statement to create the notifications table.
pub const CREATE_NOTIFICATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    audience_kind TEXT NOT NULL,
    audience_building TEXT,
    audience_apartment_id INTEGER REFERENCES apartments(id),
    priority TEXT NOT NULL,
    published_at TEXT NOT NULL,
    expires_at TEXT
)
";

/// SQL statement to create the per-apartment read receipts.
pub const CREATE_NOTIFICATION_READS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS notification_reads (
    notification_id INTEGER NOT NULL REFERENCES notifications(id) ON DELETE CASCADE,
    apartment_id INTEGER NOT NULL REFERENCES apartments(id),
    read_at TEXT NOT NULL,
    PRIMARY KEY (notification_id, apartment_id)
)
";

/// SQL statement to create the donation campaigns table.
pub const CREATE_CAMPAIGNS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS campaigns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    target_amount INTEGER,
    starts_on TEXT NOT NULL,
    ends_on TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the contributions table.
pub const CREATE_CONTRIBUTIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS contributions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id INTEGER NOT NULL REFERENCES campaigns(id),
    apartment_id INTEGER NOT NULL REFERENCES apartments(id),
    amount INTEGER NOT NULL CHECK (amount > 0),
    note TEXT,
    contributed_at TEXT NOT NULL
)
";

/// SQL statement to create the audit log.
pub const CREATE_AUDIT_LOG_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor TEXT NOT NULL,
    action TEXT NOT NULL,
    entity TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    detail TEXT NOT NULL,
    at TEXT NOT NULL
)
";

/// SQL statement to create the record of applied master-data imports.
pub const CREATE_IMPORT_BATCHES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS import_batches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_hash TEXT NOT NULL UNIQUE,
    source TEXT,
    summary TEXT NOT NULL,
    imported_at TEXT NOT NULL
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Indexes backing the list filters.
pub const CREATE_INDEXES: &str = r"
CREATE INDEX IF NOT EXISTS idx_residents_apartment ON residents(apartment_id);
CREATE INDEX IF NOT EXISTS idx_residents_status ON residents(status);
CREATE INDEX IF NOT EXISTS idx_invoices_period ON invoices(period);
CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status);
CREATE INDEX IF NOT EXISTS idx_payments_invoice ON payments(invoice_id);
CREATE INDEX IF NOT EXISTS idx_payments_paid_at ON payments(paid_at);
CREATE INDEX IF NOT EXISTS idx_vehicles_apartment ON vehicles(apartment_id);
CREATE INDEX IF NOT EXISTS idx_parking_logs_vehicle ON parking_logs(vehicle_id, at DESC);
CREATE INDEX IF NOT EXISTS idx_visits_apartment ON visits(apartment_id);
CREATE INDEX IF NOT EXISTS idx_visits_active ON visits(checked_out_at);
CREATE INDEX IF NOT EXISTS idx_incidents_status ON incidents(status, priority_rank DESC);
CREATE INDEX IF NOT EXISTS idx_contributions_campaign ON contributions(campaign_id);
CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity, entity_id);
";

/// All table creation statements in dependency order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_APARTMENTS_TABLE,
    CREATE_RESIDENTS_TABLE,
    CREATE_FEES_TABLE,
    CREATE_INVOICES_TABLE,
    CREATE_PAYMENTS_TABLE,
    CREATE_VEHICLES_TABLE,
    CREATE_PARKING_LOGS_TABLE,
    CREATE_VISITS_TABLE,
    CREATE_INCIDENTS_TABLE,
    CREATE_NOTIFICATIONS_TABLE,
    CREATE_NOTIFICATION_READS_TABLE,
    CREATE_CAMPAIGNS_TABLE,
    CREATE_CONTRIBUTIONS_TABLE,
    CREATE_AUDIT_LOG_TABLE,
    CREATE_IMPORT_BATCHES_TABLE,
    CREATE_METADATA_TABLE,
];

/// Tables counted by `db status`.
pub const COUNTED_TABLES: &[&str] = &[
    "apartments",
    "residents",
    "fees",
    "invoices",
    "payments",
    "vehicles",
    "visits",
    "incidents",
    "notifications",
    "campaigns",
    "contributions",
    "audit_log",
    "import_batches",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(stmt.contains("CREATE TABLE IF NOT EXISTS"));
        }
    }

    #[test]
    fn test_invoice_uniqueness_per_period() {
        assert!(CREATE_INVOICES_TABLE.contains("UNIQUE (apartment_id, fee_id, period)"));
    }

    #[test]
    fn test_counted_tables_are_created() {
        for table in COUNTED_TABLES {
            let needle = format!("CREATE TABLE IF NOT EXISTS {table} ");
            assert!(
                SCHEMA_STATEMENTS.iter().any(|s| s.contains(&needle)),
                "missing table {table}"
            );
        }
    }
}
