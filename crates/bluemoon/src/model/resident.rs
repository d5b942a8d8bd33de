//! Residents and their lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{optional, required};
use crate::error::{Error, Result};

text_enum! {
    /// How a resident relates to the apartment.
    pub enum Relationship {
        /// Registered owner.
        Owner => "owner",
        /// Household member.
        Member => "member",
        /// Renter.
        Tenant => "tenant",
    }
}

text_enum! {
    /// Residency status.
    pub enum ResidentStatus {
        /// Living in the apartment.
        Active => "active",
        /// Registered but away (temporary absence declaration).
        TemporarilyAbsent => "temporarily_absent",
        /// Left the building. Terminal.
        MovedOut => "moved_out",
    }
}

text_enum! {
    /// Gender as declared on registration.
    pub enum Gender {
        /// Male.
        Male => "male",
        /// Female.
        Female => "female",
        /// Other or undisclosed.
        Other => "other",
    }
}

impl ResidentStatus {
    /// Whether a resident may move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::TemporarilyAbsent | Self::MovedOut)
                | (Self::TemporarilyAbsent, Self::Active | Self::MovedOut)
        )
    }

    /// Whether the resident still counts towards occupancy.
    #[must_use]
    pub fn is_resident(self) -> bool {
        !matches!(self, Self::MovedOut)
    }
}

/// A registered resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resident {
    /// Row identifier.
    pub id: i64,
    /// Apartment the resident lives in.
    pub apartment_id: i64,
    /// Full name.
    pub full_name: String,
    /// Date of birth.
    pub date_of_birth: Option<NaiveDate>,
    /// Declared gender.
    pub gender: Option<Gender>,
    /// National identity card number; unique when present.
    pub id_card: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Relationship to the apartment.
    pub relationship: Relationship,
    /// Residency status.
    pub status: ResidentStatus,
    /// Move-in date.
    pub moved_in_on: NaiveDate,
    /// Move-out date, once moved out.
    pub moved_out_on: Option<NaiveDate>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// Input for registering a resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResident {
    /// Apartment to register into.
    pub apartment_id: i64,
    /// Full name.
    pub full_name: String,
    /// Date of birth.
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    /// Declared gender.
    #[serde(default)]
    pub gender: Option<Gender>,
    /// Identity card number.
    #[serde(default)]
    pub id_card: Option<String>,
    /// Contact phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Relationship; defaults to `member`.
    #[serde(default = "default_relationship")]
    pub relationship: Relationship,
    /// Move-in date; defaults to today.
    #[serde(default)]
    pub moved_in_on: Option<NaiveDate>,
}

fn default_relationship() -> Relationship {
    Relationship::Member
}

impl NewResident {
    /// Validate and normalize the input.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name or malformed email.
    pub fn normalized(self) -> Result<Self> {
        let email = validate_email(optional(self.email))?;
        Ok(Self {
            apartment_id: self.apartment_id,
            full_name: required("full_name", &self.full_name)?,
            date_of_birth: self.date_of_birth,
            gender: self.gender,
            id_card: optional(self.id_card),
            phone: optional(self.phone),
            email,
            relationship: self.relationship,
            moved_in_on: self.moved_in_on,
        })
    }
}

/// Partial update of a resident's profile. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentUpdate {
    /// New full name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// New date of birth.
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    /// New gender.
    #[serde(default)]
    pub gender: Option<Gender>,
    /// New identity card number.
    #[serde(default)]
    pub id_card: Option<String>,
    /// New phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// New email.
    #[serde(default)]
    pub email: Option<String>,
    /// New relationship.
    #[serde(default)]
    pub relationship: Option<Relationship>,
}

impl ResidentUpdate {
    /// Apply the update to an existing record.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name or malformed email.
    pub fn apply_to(self, resident: &mut Resident) -> Result<()> {
        if let Some(name) = self.full_name {
            resident.full_name = required("full_name", &name)?;
        }
        if let Some(dob) = self.date_of_birth {
            resident.date_of_birth = Some(dob);
        }
        if let Some(gender) = self.gender {
            resident.gender = Some(gender);
        }
        if self.id_card.is_some() {
            resident.id_card = optional(self.id_card);
        }
        if self.phone.is_some() {
            resident.phone = optional(self.phone);
        }
        if self.email.is_some() {
            resident.email = validate_email(optional(self.email))?;
        }
        if let Some(relationship) = self.relationship {
            resident.relationship = relationship;
        }
        Ok(())
    }
}

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentStatusChange {
    /// Target status.
    pub status: ResidentStatus,
    /// Date the change takes effect; defaults to today.
    #[serde(default)]
    pub effective_on: Option<NaiveDate>,
}

/// Filters for listing residents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResidentFilter {
    /// Only residents of this apartment.
    pub apartment_id: Option<i64>,
    /// Only residents with this status.
    pub status: Option<ResidentStatus>,
    /// Case-insensitive substring of name, phone or id card.
    pub search: Option<String>,
}

fn validate_email(email: Option<String>) -> Result<Option<String>> {
    match email {
        Some(e) if !e.contains('@') || e.starts_with('@') || e.ends_with('@') => {
            Err(Error::validation(format!("invalid email address '{e}'")))
        }
        other => Ok(other),
    }
}
