//! Donation campaigns and contributions.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::info;

use super::{ensure_exists, now, write_audit, Storage};
use crate::error::{Error, Result};
use crate::model::{
    optional, AuditRecord, Campaign, CampaignStatus, CampaignSummary, Contribution, NewCampaign,
    NewContribution, Page,
};

const CAMPAIGN_COLUMNS: &str =
    "id, name, description, target_amount, starts_on, ends_on, status, created_at";

const CONTRIBUTION_COLUMNS: &str =
    "id, campaign_id, apartment_id, amount, note, contributed_at";

fn fetch_campaign(conn: &Connection, id: i64) -> Result<Campaign> {
    conn.query_row(
        &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
        [id],
        row_to_campaign,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("campaign", id))
}

/// Percentage of `target` reached, rounded to two decimals.
#[allow(clippy::cast_precision_loss)]
fn progress_percent(raised: i64, target: Option<i64>) -> Option<f64> {
    target
        .filter(|t| *t > 0)
        .map(|t| (raised as f64 * 10_000.0 / t as f64).round() / 100.0)
}

impl Storage {
    /// Open a donation campaign.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name, a non-positive target or
    /// an end date before the start date.
    pub fn create_campaign(&mut self, input: NewCampaign, actor: &str) -> Result<Campaign> {
        let created_at = now();
        let input = input.normalized(created_at.date_naive())?;
        let tx = self.write_txn()?;
        tx.execute(
            "INSERT INTO campaigns (name, description, target_amount, starts_on, ends_on, status,
                 created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                input.name,
                input.description,
                input.target_amount,
                input.starts_on,
                input.ends_on,
                CampaignStatus::Open,
                created_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_audit(
            &tx,
            &AuditRecord::new(actor, "campaign.created", "campaign", id)
                .with_detail(serde_json::to_value(&input)?),
        )?;
        let campaign = fetch_campaign(&tx, id)?;
        tx.commit()?;

        info!("Opened campaign {} ({})", campaign.name, id);
        Ok(campaign)
    }

    /// Get a campaign by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such campaign.
    pub fn get_campaign(&self, id: i64) -> Result<Campaign> {
        fetch_campaign(&self.conn, id)
    }

    /// List campaigns, open ones first, newest start date first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_campaigns(&self, page: Page) -> Result<Vec<Campaign>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
             ORDER BY status = 'open' DESC, starts_on DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let campaigns = stmt
            .query_map(params![page.limit, page.offset], row_to_campaign)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(campaigns)
    }

    /// Close a campaign to further contributions.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or a conflict if it is already closed.
    pub fn close_campaign(&mut self, id: i64, actor: &str) -> Result<Campaign> {
        let tx = self.write_txn()?;
        let campaign = fetch_campaign(&tx, id)?;
        if campaign.status == CampaignStatus::Closed {
            return Err(Error::conflict(format!(
                "campaign {} is already closed",
                campaign.name
            )));
        }
        tx.execute(
            "UPDATE campaigns SET status = ?1 WHERE id = ?2",
            params![CampaignStatus::Closed, id],
        )?;
        write_audit(&tx, &AuditRecord::new(actor, "campaign.closed", "campaign", id))?;
        let campaign = fetch_campaign(&tx, id)?;
        tx.commit()?;

        info!("Closed campaign {} ({})", campaign.name, id);
        Ok(campaign)
    }

    /// Record a contribution from an apartment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown campaign or apartment, a conflict if
    /// the campaign is closed, or a validation error for a non-positive amount
    /// or a date outside the campaign window.
    pub fn contribute(
        &mut self,
        campaign_id: i64,
        input: NewContribution,
        actor: &str,
    ) -> Result<Contribution> {
        if input.amount <= 0 {
            return Err(Error::validation("amount must be greater than 0"));
        }
        let contributed_at = now();
        let tx = self.write_txn()?;
        let campaign = fetch_campaign(&tx, campaign_id)?;
        if campaign.status == CampaignStatus::Closed {
            return Err(Error::conflict(format!(
                "campaign {} is closed",
                campaign.name
            )));
        }
        let today = contributed_at.date_naive();
        if !campaign.accepts_on(today) {
            return Err(Error::validation(format!(
                "campaign {} does not accept contributions on {today}",
                campaign.name
            )));
        }
        ensure_exists(&tx, "apartments", "apartment", input.apartment_id)?;

        tx.execute(
            "INSERT INTO contributions (campaign_id, apartment_id, amount, note, contributed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                campaign_id,
                input.apartment_id,
                input.amount,
                optional(input.note),
                contributed_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_audit(
            &tx,
            &AuditRecord::new(actor, "campaign.contribution_recorded", "campaign", campaign_id)
                .with_detail(json!({
                    "contribution_id": id,
                    "apartment_id": input.apartment_id,
                    "amount": input.amount,
                })),
        )?;
        let contribution = tx.query_row(
            &format!("SELECT {CONTRIBUTION_COLUMNS} FROM contributions WHERE id = ?1"),
            [id],
            row_to_contribution,
        )?;
        tx.commit()?;

        info!(
            "Apartment {} gave {} VND to {}",
            input.apartment_id, input.amount, campaign.name
        );
        Ok(contribution)
    }

    /// A campaign with its totals.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such campaign.
    pub fn campaign_summary(&self, id: i64) -> Result<CampaignSummary> {
        let campaign = fetch_campaign(&self.conn, id)?;
        let (total_raised, contributor_count): (i64, i64) = self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0), COUNT(DISTINCT apartment_id)
             FROM contributions WHERE campaign_id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(CampaignSummary {
            progress_percent: progress_percent(total_raised, campaign.target_amount),
            campaign,
            total_raised,
            contributor_count,
        })
    }

    /// Contributions to a campaign, newest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such campaign.
    pub fn list_contributions(&self, campaign_id: i64, page: Page) -> Result<Vec<Contribution>> {
        ensure_exists(&self.conn, "campaigns", "campaign", campaign_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions
             WHERE campaign_id = ?1 ORDER BY contributed_at DESC, id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let contributions = stmt
            .query_map(params![campaign_id, page.limit, page.offset], row_to_contribution)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(contributions)
    }
}

fn row_to_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        target_amount: row.get(3)?,
        starts_on: row.get(4)?,
        ends_on: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn row_to_contribution(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contribution> {
    Ok(Contribution {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        apartment_id: row.get(2)?,
        amount: row.get(3)?,
        note: row.get(4)?,
        contributed_at: row.get(5)?,
    })
}
