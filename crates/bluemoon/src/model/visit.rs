//! Visitor log.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{optional, required};
use crate::error::Result;

/// A visitor's stay in the building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    /// Row identifier.
    pub id: i64,
    /// Apartment visited.
    pub apartment_id: i64,
    /// Visitor's name.
    pub visitor_name: String,
    /// Identity document number shown at reception.
    pub id_card: Option<String>,
    /// Visitor's phone.
    pub phone: Option<String>,
    /// Reason for the visit.
    pub purpose: Option<String>,
    /// Plate of the visitor's vehicle, if any.
    pub vehicle_plate: Option<String>,
    /// Arrival.
    pub checked_in_at: DateTime<Utc>,
    /// Departure; `None` while the visitor is inside.
    pub checked_out_at: Option<DateTime<Utc>>,
}

impl Visit {
    /// Whether the visitor is still inside.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.checked_out_at.is_none()
    }
}

/// Input for checking a visitor in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVisit {
    /// Apartment visited.
    pub apartment_id: i64,
    /// Visitor's name.
    pub visitor_name: String,
    /// Identity document number.
    #[serde(default)]
    pub id_card: Option<String>,
    /// Visitor's phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Reason for the visit.
    #[serde(default)]
    pub purpose: Option<String>,
    /// Visitor's vehicle plate.
    #[serde(default)]
    pub vehicle_plate: Option<String>,
}

impl NewVisit {
    /// Validate and normalize the input.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank visitor name.
    pub fn normalized(self) -> Result<Self> {
        Ok(Self {
            apartment_id: self.apartment_id,
            visitor_name: required("visitor_name", &self.visitor_name)?,
            id_card: optional(self.id_card),
            phone: optional(self.phone),
            purpose: optional(self.purpose),
            vehicle_plate: optional(self.vehicle_plate)
                .map(|p| super::vehicle::normalize_plate(&p)),
        })
    }
}

/// Filters for listing visits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VisitFilter {
    /// Only visits to this apartment.
    pub apartment_id: Option<i64>,
    /// Only visitors still inside.
    #[serde(default)]
    pub active_only: bool,
    /// Only visits that checked in on this date (UTC).
    pub date: Option<NaiveDate>,
}
