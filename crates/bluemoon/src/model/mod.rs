//! Domain records for the condominium registry.
//!
//! Each submodule holds the stored record, the input accepted when creating
//! it, and the filters used when listing. Status fields are closed
//! enumerations stored as snake_case text.

/// Declare a closed enumeration that is stored and serialized as text.
///
/// Generates `as_str`, `ALL`, `Display`, `FromStr`, serde impls and the
/// rusqlite `ToSql`/`FromSql` conversions from a single variant table.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The stored text form.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::Error;

            fn from_str(s: &str) -> crate::error::Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::error::Error::validation(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: crate::error::Error| {
                        rusqlite::types::FromSqlError::Other(e.to_string().into())
                    })
            }
        }
    };
}

pub mod apartment;
pub mod audit;
pub mod billing;
pub mod dashboard;
pub mod donation;
pub mod incident;
pub mod notification;
pub mod period;
pub mod resident;
pub mod vehicle;
pub mod visit;

use serde::{Deserialize, Serialize};

pub use apartment::{Apartment, ApartmentFilter, ApartmentStatus, NewApartment};
pub use audit::{AuditEntry, AuditFilter, AuditRecord};
pub use billing::{
    ApartmentBalance, Fee, FeeCalculation, FeeKind, GenerationReport, Invoice, InvoiceDetail,
    InvoiceFilter, InvoiceStatus, NewFee, NewInvoice, NewPayment, Payment, PaymentMethod,
};
pub use dashboard::DashboardSummary;
pub use donation::{
    Campaign, CampaignStatus, CampaignSummary, Contribution, NewCampaign, NewContribution,
};
pub use incident::{
    Incident, IncidentCategory, IncidentFilter, IncidentStatus, IncidentStatusChange,
    NewIncident, Priority,
};
pub use notification::{
    ApartmentNotification, Audience, NewNotification, Notification, NotificationPriority,
};
pub use period::Period;
pub use resident::{
    Gender, NewResident, Relationship, Resident, ResidentFilter, ResidentStatus,
    ResidentStatusChange, ResidentUpdate,
};
pub use vehicle::{
    Direction, NewVehicle, ParkingLog, ParkingState, Vehicle, VehicleFilter, VehicleKind,
    VehicleStatus, VehicleStatusChange,
};
pub use visit::{NewVisit, Visit, VisitFilter};

use crate::error::{Error, Result};

/// A window into a list result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Maximum number of rows to return.
    pub limit: i64,
    /// Number of rows to skip.
    pub offset: i64,
}

impl Page {
    /// Create a page, clamping negative values to zero.
    #[must_use]
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.max(0),
            offset: offset.max(0),
        }
    }

    /// The first `limit` rows.
    #[must_use]
    pub fn first(limit: i64) -> Self {
        Self::new(limit, 0)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(50)
    }
}

/// Trim a required text field, rejecting blank input.
pub(crate) fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field, mapping blank input to `None`.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reject non-positive money amounts.
pub(crate) fn positive_amount(field: &str, amount: i64) -> Result<i64> {
    if amount <= 0 {
        return Err(Error::validation(format!("{field} must be greater than 0")));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps_negative() {
        let page = Page::new(-5, -1);
        assert_eq!(page, Page { limit: 0, offset: 0 });
    }

    #[test]
    fn test_required_trims() {
        assert_eq!(required("name", "  Block A ").unwrap(), "Block A");
        assert!(required("name", "   ").is_err());
    }

    #[test]
    fn test_optional_blank_is_none() {
        assert_eq!(optional(Some("  ".to_string())), None);
        assert_eq!(optional(Some(" x ".to_string())), Some("x".to_string()));
        assert_eq!(optional(None), None);
    }

    #[test]
    fn test_text_enum_round_trip_through_str() {
        for status in ResidentStatus::ALL {
            let parsed: ResidentStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, *status);
        }
        assert!("sleeping".parse::<ResidentStatus>().is_err());
    }

    #[test]
    fn test_text_enum_serde_matches_stored_text() {
        let json = serde_json::to_string(&InvoiceStatus::PartiallyPaid).unwrap();
        assert_eq!(json, "\"partially_paid\"");
        let kind: VehicleKind = serde_json::from_str("\"electric_bike\"").unwrap();
        assert_eq!(kind, VehicleKind::ElectricBike);
    }
}
