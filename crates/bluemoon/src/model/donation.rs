//! Donation campaigns and contributions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{optional, required};
use crate::error::{Error, Result};

text_enum! {
    /// Whether a campaign accepts contributions.
    pub enum CampaignStatus {
        /// Accepting contributions within its date window.
        Open => "open",
        /// Closed by management.
        Closed => "closed",
    }
}

/// A fundraising campaign, e.g. for a holiday or a charity drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    /// Row identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Fundraising goal in VND.
    pub target_amount: Option<i64>,
    /// First day contributions are accepted.
    pub starts_on: NaiveDate,
    /// Last day contributions are accepted.
    pub ends_on: Option<NaiveDate>,
    /// Open or closed.
    pub status: CampaignStatus,
    /// When the campaign was created.
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Whether `date` falls within the campaign's window.
    #[must_use]
    pub fn accepts_on(&self, date: NaiveDate) -> bool {
        date >= self.starts_on && self.ends_on.is_none_or(|end| date <= end)
    }
}

/// Input for creating a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCampaign {
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Fundraising goal in VND.
    #[serde(default)]
    pub target_amount: Option<i64>,
    /// First day; defaults to today.
    #[serde(default)]
    pub starts_on: Option<NaiveDate>,
    /// Last day.
    #[serde(default)]
    pub ends_on: Option<NaiveDate>,
}

impl NewCampaign {
    /// Validate and normalize the input, resolving the start date.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name, a non-positive target or
    /// an end date before the start date.
    pub fn normalized(self, today: NaiveDate) -> Result<Self> {
        let starts_on = self.starts_on.unwrap_or(today);
        if let Some(ends_on) = self.ends_on {
            if ends_on < starts_on {
                return Err(Error::validation(format!(
                    "ends_on ({ends_on}) is before starts_on ({starts_on})"
                )));
            }
        }
        if let Some(target) = self.target_amount {
            super::positive_amount("target_amount", target)?;
        }
        Ok(Self {
            name: required("name", &self.name)?,
            description: optional(self.description),
            target_amount: self.target_amount,
            starts_on: Some(starts_on),
            ends_on: self.ends_on,
        })
    }
}

/// Money given by an apartment to a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// Row identifier.
    pub id: i64,
    /// Campaign.
    pub campaign_id: i64,
    /// Contributing apartment.
    pub apartment_id: i64,
    /// Amount in VND.
    pub amount: i64,
    /// Note from the contributor.
    pub note: Option<String>,
    /// When it was recorded.
    pub contributed_at: DateTime<Utc>,
}

/// Input for recording a contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContribution {
    /// Contributing apartment.
    pub apartment_id: i64,
    /// Amount in VND.
    pub amount: i64,
    /// Note.
    #[serde(default)]
    pub note: Option<String>,
}

/// Campaign totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignSummary {
    /// The campaign.
    pub campaign: Campaign,
    /// Sum of contributions.
    pub total_raised: i64,
    /// Distinct contributing apartments.
    pub contributor_count: i64,
    /// Progress towards the target, when one is set.
    pub progress_percent: Option<f64>,
}
