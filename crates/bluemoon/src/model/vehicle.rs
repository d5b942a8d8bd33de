//! Registered vehicles and the parking gate log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

text_enum! {
    /// Vehicle category.
    pub enum VehicleKind {
        /// Bicycle.
        Bicycle => "bicycle",
        /// Motorbike or scooter.
        Motorbike => "motorbike",
        /// Car.
        Car => "car",
        /// Electric bicycle or scooter.
        ElectricBike => "electric_bike",
    }
}

text_enum! {
    /// Registration status.
    pub enum VehicleStatus {
        /// May use the car park.
        Active => "active",
        /// Blocked from entering, e.g. for unpaid parking fees.
        Suspended => "suspended",
        /// Registration withdrawn. Terminal.
        Deregistered => "deregistered",
    }
}

text_enum! {
    /// Where the vehicle is relative to the car park.
    pub enum ParkingState {
        /// Parked inside.
        Inside => "inside",
        /// Outside.
        Outside => "outside",
    }
}

text_enum! {
    /// Direction of a gate passage.
    pub enum Direction {
        /// Entered the car park.
        Entry => "entry",
        /// Left the car park.
        Exit => "exit",
    }
}

impl VehicleStatus {
    /// Whether a vehicle may move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Suspended | Self::Deregistered)
                | (Self::Suspended, Self::Active | Self::Deregistered)
        )
    }
}

/// A vehicle registered to an apartment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Row identifier.
    pub id: i64,
    /// Owning apartment.
    pub apartment_id: i64,
    /// Normalized licence plate.
    pub plate: String,
    /// Category.
    pub kind: VehicleKind,
    /// Resident who owns the vehicle.
    pub owner_resident_id: Option<i64>,
    /// Registration status.
    pub status: VehicleStatus,
    /// Whether the vehicle is parked inside.
    pub parking_state: ParkingState,
    /// When the vehicle was registered.
    pub registered_at: DateTime<Utc>,
}

/// Input for registering a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVehicle {
    /// Owning apartment.
    pub apartment_id: i64,
    /// Licence plate as written; normalized on registration.
    pub plate: String,
    /// Category.
    pub kind: VehicleKind,
    /// Owning resident.
    #[serde(default)]
    pub owner_resident_id: Option<i64>,
}

/// A requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleStatusChange {
    /// Target status.
    pub status: VehicleStatus,
}

/// One passage through the parking gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkingLog {
    /// Row identifier.
    pub id: i64,
    /// Vehicle that passed.
    pub vehicle_id: i64,
    /// Entry or exit.
    pub direction: Direction,
    /// When it passed.
    pub at: DateTime<Utc>,
}

/// Filters for listing vehicles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VehicleFilter {
    /// Only this apartment.
    pub apartment_id: Option<i64>,
    /// Only this category.
    pub kind: Option<VehicleKind>,
    /// Only this status.
    pub status: Option<VehicleStatus>,
}

/// Normalize a licence plate: drop whitespace and dots, upper-case.
///
/// `"30a-123.45"` becomes `"30A-12345"`.
#[must_use]
pub fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Normalize a plate and check it against the configured format.
///
/// # Errors
///
/// Returns a validation error if the normalized plate does not match.
pub fn validate_plate(plate: &str, pattern: &regex::Regex) -> Result<String> {
    let normalized = normalize_plate(plate);
    if normalized.is_empty() || !pattern.is_match(&normalized) {
        return Err(Error::validation(format!(
            "licence plate '{}' is not in a recognised format",
            plate.trim()
        )));
    }
    Ok(normalized)
}
