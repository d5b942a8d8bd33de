//! Master-data import.
//!
//! A master-data document lists apartments, residents and vehicles in one
//! JSON object. Residents and vehicles name their apartment by code, so a
//! single document can set up a building from nothing. Documents are
//! identified by the BLAKE3 hash of their bytes; re-importing the same bytes
//! is reported and otherwise ignored.

use std::path::Path;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{Gender, Relationship, VehicleKind};

/// A master-data document.
///
/// Rows are kept as raw JSON until [`decode_rows`] checks them one at a
/// time, so a malformed row is reported alongside every other bad row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasterData {
    /// Apartment rows ([`NewApartment`](crate::model::NewApartment)), matched to
    /// existing ones by code.
    #[serde(default)]
    pub apartments: Vec<Value>,
    /// Resident rows ([`ResidentRow`]).
    #[serde(default)]
    pub residents: Vec<Value>,
    /// Vehicle rows ([`VehicleRow`]).
    #[serde(default)]
    pub vehicles: Vec<Value>,
}

/// A resident row, addressed to an apartment by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentRow {
    /// Apartment code.
    pub apartment_code: String,
    /// Full name.
    pub full_name: String,
    /// Date of birth.
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    /// Gender.
    #[serde(default)]
    pub gender: Option<Gender>,
    /// Identity card number; rows whose card is already registered are skipped.
    #[serde(default)]
    pub id_card: Option<String>,
    /// Phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Email.
    #[serde(default)]
    pub email: Option<String>,
    /// Relationship to the owner.
    #[serde(default = "default_relationship")]
    pub relationship: Relationship,
    /// Move-in date; defaults to the import date.
    #[serde(default)]
    pub moved_in_on: Option<NaiveDate>,
}

fn default_relationship() -> Relationship {
    Relationship::Member
}

/// A vehicle row, addressed to an apartment by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRow {
    /// Apartment code.
    pub apartment_code: String,
    /// Licence plate; rows whose plate is already registered are skipped.
    pub plate: String,
    /// Category.
    pub kind: VehicleKind,
}

/// Per-section outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionCounts {
    /// Rows inserted.
    pub created: usize,
    /// Existing rows changed.
    pub updated: usize,
    /// Rows already present and left alone.
    pub skipped: usize,
}

/// Result of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// BLAKE3 hash of the document bytes.
    pub content_hash: String,
    /// The same document was imported before; nothing was written.
    pub already_imported: bool,
    /// Apartment outcome.
    pub apartments: SectionCounts,
    /// Resident outcome.
    pub residents: SectionCounts,
    /// Vehicle outcome.
    pub vehicles: SectionCounts,
}

impl ImportReport {
    pub(crate) fn new(content_hash: String) -> Self {
        Self {
            content_hash,
            already_imported: false,
            apartments: SectionCounts::default(),
            residents: SectionCounts::default(),
            vehicles: SectionCounts::default(),
        }
    }

    /// Total rows written.
    #[must_use]
    pub fn written(&self) -> usize {
        [self.apartments, self.residents, self.vehicles]
            .iter()
            .map(|s| s.created + s.updated)
            .sum()
    }
}

/// Hash document bytes the way import batches are keyed.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Parse a master-data document.
///
/// # Errors
///
/// Returns a validation error if the bytes are not a well-formed document.
pub fn parse(bytes: &[u8]) -> Result<MasterData> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::validation(format!("malformed master-data document: {e}")))
}

/// Decode each row of a section, pairing it with its zero-based index.
pub fn decode_rows<T: DeserializeOwned>(
    rows: Vec<Value>,
) -> impl Iterator<Item = (usize, Result<T>)> {
    rows.into_iter().enumerate().map(|(row, value)| {
        let decoded = serde_json::from_value(value)
            .map_err(|e| Error::validation(format!("malformed row: {e}")));
        (row, decoded)
    })
}

/// Read a document from disk, returning its bytes.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn read_document(path: &Path) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}
