//! Apartments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{optional, required};
use crate::error::{Error, Result};

text_enum! {
    /// Occupancy of an apartment, derived from its active residents.
    pub enum ApartmentStatus {
        /// No active resident.
        Vacant => "vacant",
        /// At least one active resident.
        Occupied => "occupied",
    }
}

/// A unit in the building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Apartment {
    /// Row identifier.
    pub id: i64,
    /// Unique code such as `A-1203`.
    pub code: String,
    /// Building or tower name.
    pub building: String,
    /// Floor number.
    pub floor: i64,
    /// Floor area in square metres.
    pub area_m2: f64,
    /// Derived occupancy.
    pub status: ApartmentStatus,
    /// Name of the registered owner, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    /// When the apartment was registered.
    pub created_at: DateTime<Utc>,
}

/// Input for creating or replacing an apartment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApartment {
    /// Unique code; normalized to upper case.
    pub code: String,
    /// Building or tower name.
    pub building: String,
    /// Floor number.
    pub floor: i64,
    /// Floor area in square metres.
    pub area_m2: f64,
    /// Owner name.
    #[serde(default)]
    pub owner_name: Option<String>,
}

impl NewApartment {
    /// Validate and normalize the input.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank code or building, or a
    /// non-positive area.
    pub fn normalized(self) -> Result<Self> {
        let code = normalize_code(&self.code)?;
        let building = required("building", &self.building)?;
        if !self.area_m2.is_finite() || self.area_m2 <= 0.0 {
            return Err(Error::validation(format!(
                "area_m2 must be positive, got {}",
                self.area_m2
            )));
        }
        Ok(Self {
            code,
            building,
            floor: self.floor,
            area_m2: self.area_m2,
            owner_name: optional(self.owner_name),
        })
    }
}

/// Normalize an apartment code: trimmed, upper-cased.
///
/// # Errors
///
/// Returns a validation error if the code is blank.
pub fn normalize_code(code: &str) -> Result<String> {
    Ok(required("code", code)?.to_uppercase())
}

/// Filters for listing apartments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApartmentFilter {
    /// Only this building.
    pub building: Option<String>,
    /// Only this occupancy.
    pub status: Option<ApartmentStatus>,
}
