//! Notices published to residents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::required;
use crate::error::{Error, Result};

text_enum! {
    /// Display weight of a notice.
    pub enum NotificationPriority {
        /// Regular notice.
        Normal => "normal",
        /// Highlighted notice.
        Important => "important",
    }
}

/// Who a notice is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Audience {
    /// Every apartment.
    All,
    /// Every apartment in one building.
    Building {
        /// Building name.
        building: String,
    },
    /// A single apartment.
    Apartment {
        /// Target apartment.
        apartment_id: i64,
    },
}

impl Audience {
    /// The stored discriminator.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Building { .. } => "building",
            Self::Apartment { .. } => "apartment",
        }
    }

    /// Rebuild an audience from its stored columns.
    pub(crate) fn from_columns(
        kind: &str,
        building: Option<String>,
        apartment_id: Option<i64>,
    ) -> Result<Self> {
        match (kind, building, apartment_id) {
            ("all", _, _) => Ok(Self::All),
            ("building", Some(building), _) => Ok(Self::Building { building }),
            ("apartment", _, Some(apartment_id)) => Ok(Self::Apartment { apartment_id }),
            (other, _, _) => Err(Error::internal(format!(
                "malformed notification audience '{other}'"
            ))),
        }
    }
}

/// A published notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Row identifier.
    pub id: i64,
    /// Headline.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Recipients.
    pub audience: Audience,
    /// Display weight.
    pub priority: NotificationPriority,
    /// Publication time.
    pub published_at: DateTime<Utc>,
    /// After this time the notice is no longer shown to apartments.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Input for publishing a notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    /// Headline.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Recipients; defaults to everyone.
    #[serde(default = "default_audience")]
    pub audience: Audience,
    /// Display weight; defaults to normal.
    #[serde(default = "default_priority")]
    pub priority: NotificationPriority,
    /// Expiry time.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_audience() -> Audience {
    Audience::All
}

fn default_priority() -> NotificationPriority {
    NotificationPriority::Normal
}

impl NewNotification {
    /// Validate and normalize the input.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title, body or building, or an
    /// expiry in the past.
    pub fn normalized(self, now: DateTime<Utc>) -> Result<Self> {
        let audience = match self.audience {
            Audience::Building { building } => Audience::Building {
                building: required("building", &building)?,
            },
            other => other,
        };
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(Error::validation("expires_at must be in the future"));
            }
        }
        Ok(Self {
            title: required("title", &self.title)?,
            body: required("body", &self.body)?,
            audience,
            priority: self.priority,
            expires_at: self.expires_at,
        })
    }
}

/// A notice as seen by one apartment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApartmentNotification {
    /// The notice.
    #[serde(flatten)]
    pub notification: Notification,
    /// Whether the apartment has marked it read.
    pub read: bool,
}
