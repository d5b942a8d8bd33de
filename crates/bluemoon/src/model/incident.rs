//! Incident reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{optional, required};
use crate::error::Result;

text_enum! {
    /// What kind of problem was reported.
    pub enum IncidentCategory {
        /// Broken equipment, leaks, lifts.
        Maintenance => "maintenance",
        /// Intrusion, theft, suspicious activity.
        Security => "security",
        /// Noise complaints.
        Noise => "noise",
        /// Rubbish and cleaning.
        Sanitation => "sanitation",
        /// Anything else.
        Other => "other",
    }
}

text_enum! {
    /// Urgency of an incident.
    pub enum Priority {
        /// Can wait.
        Low => "low",
        /// Normal handling.
        Medium => "medium",
        /// Handle today.
        High => "high",
        /// Handle immediately.
        Urgent => "urgent",
    }
}

text_enum! {
    /// Handling status of an incident.
    pub enum IncidentStatus {
        /// Reported, not yet picked up.
        Open => "open",
        /// Someone is working on it.
        InProgress => "in_progress",
        /// Fixed; awaiting confirmation.
        Resolved => "resolved",
        /// Done. Terminal.
        Closed => "closed",
    }
}

impl Priority {
    /// Sort rank, higher is more urgent.
    #[must_use]
    pub fn rank(self) -> i64 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Urgent => 3,
        }
    }
}

impl IncidentStatus {
    /// Whether an incident may move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::InProgress | Self::Resolved | Self::Closed)
                | (Self::InProgress, Self::Resolved | Self::Open)
                | (Self::Resolved, Self::Closed | Self::Open)
        )
    }

    /// Whether the incident still needs attention.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

/// A reported incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Row identifier.
    pub id: i64,
    /// Apartment concerned, if any.
    pub apartment_id: Option<i64>,
    /// Resident who reported it, if any.
    pub reporter_resident_id: Option<i64>,
    /// Short title.
    pub title: String,
    /// Details.
    pub description: String,
    /// Category.
    pub category: IncidentCategory,
    /// Urgency.
    pub priority: Priority,
    /// Handling status.
    pub status: IncidentStatus,
    /// Staff member handling it.
    pub assignee: Option<String>,
    /// How it was resolved.
    pub resolution: Option<String>,
    /// When it was reported.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
    /// When it was last resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Input for reporting an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncident {
    /// Apartment concerned.
    #[serde(default)]
    pub apartment_id: Option<i64>,
    /// Reporting resident.
    #[serde(default)]
    pub reporter_resident_id: Option<i64>,
    /// Short title.
    pub title: String,
    /// Details.
    #[serde(default)]
    pub description: String,
    /// Category; defaults to `other`.
    #[serde(default = "default_category")]
    pub category: IncidentCategory,
    /// Urgency; defaults to `medium`.
    #[serde(default = "default_priority")]
    pub priority: Priority,
}

fn default_category() -> IncidentCategory {
    IncidentCategory::Other
}

fn default_priority() -> Priority {
    Priority::Medium
}

impl NewIncident {
    /// Validate and normalize the input.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title.
    pub fn normalized(self) -> Result<Self> {
        Ok(Self {
            title: required("title", &self.title)?,
            description: self.description.trim().to_string(),
            ..self
        })
    }
}

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentStatusChange {
    /// Target status.
    pub status: IncidentStatus,
    /// Staff member to assign.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Resolution note; required when resolving.
    #[serde(default)]
    pub resolution: Option<String>,
}

impl IncidentStatusChange {
    pub(crate) fn normalized(self) -> Self {
        Self {
            status: self.status,
            assignee: optional(self.assignee),
            resolution: optional(self.resolution),
        }
    }
}

/// Filters for listing incidents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IncidentFilter {
    /// Only this status.
    pub status: Option<IncidentStatus>,
    /// Only this priority.
    pub priority: Option<Priority>,
    /// Only this apartment.
    pub apartment_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use IncidentStatus::{Closed, InProgress, Open, Resolved};

        assert!(Open.can_transition_to(InProgress));
        assert!(Open.can_transition_to(Closed));
        assert!(InProgress.can_transition_to(Resolved));
        assert!(Resolved.can_transition_to(Open));
        assert!(!Closed.can_transition_to(Open));
        assert!(!InProgress.can_transition_to(Closed));
    }

    #[test]
    fn test_priority_rank_orders_urgent_first() {
        let mut priorities = Priority::ALL.to_vec();
        priorities.sort_by_key(|p| std::cmp::Reverse(p.rank()));
        assert_eq!(priorities[0], Priority::Urgent);
        assert_eq!(priorities[3], Priority::Low);
    }

    #[test]
    fn test_defaults() {
        let input: NewIncident = serde_json::from_str(r#"{"title": "Lift stuck"}"#).unwrap();
        assert_eq!(input.category, IncidentCategory::Other);
        assert_eq!(input.priority, Priority::Medium);
    }
}
