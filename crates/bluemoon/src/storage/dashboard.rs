//! Dashboard aggregates.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use tracing::debug;

use super::Storage;
use crate::error::Result;
use crate::model::dashboard::{
    BillingStats, OccupancyStats, ResidentStats, RevenuePoint, VehicleStats,
};
use crate::model::{DashboardSummary, IncidentStatus, Period, Priority, VehicleKind};

fn scalar(conn: &Connection, sql: &str) -> Result<i64> {
    Ok(conn.query_row(sql, [], |row| row.get(0))?)
}

/// Counts keyed by a text column, with every `keys` entry present.
fn grouped(conn: &Connection, sql: &str, keys: &[&str]) -> Result<BTreeMap<String, i64>> {
    let mut counts: BTreeMap<String, i64> = keys.iter().map(|k| ((*k).to_string(), 0)).collect();
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count);
    }
    Ok(counts)
}

/// Incidents still needing attention, keyed by priority.
fn open_incidents(conn: &Connection, priorities: &[&str]) -> Result<BTreeMap<String, i64>> {
    let mut counts: BTreeMap<String, i64> =
        priorities.iter().map(|p| ((*p).to_string(), 0)).collect();
    let mut stmt =
        conn.prepare("SELECT priority, status, COUNT(*) FROM incidents GROUP BY priority, status")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, Priority>(0)?,
            row.get::<_, IncidentStatus>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    for row in rows {
        let (priority, status, count) = row?;
        if status.is_open() {
            *counts.entry(priority.to_string()).or_default() += count;
        }
    }
    Ok(counts)
}

fn billing_stats(conn: &Connection, period: Period) -> Result<BillingStats> {
    let (invoiced, collected, unpaid) = conn.query_row(
        "SELECT COALESCE(SUM(i.amount_due), 0), COALESCE(SUM(i.amount_paid), 0),
                COALESCE(SUM(i.status != 'paid'), 0)
         FROM invoices i JOIN fees f ON f.id = i.fee_id
         WHERE i.period = ?1 AND f.kind = 'mandatory'",
        [period],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    Ok(BillingStats::from_totals(invoiced, collected, unpaid))
}

/// Payments per month for the `months` months ending at `period`, zero-filled.
fn revenue(conn: &Connection, period: Period, months: u32) -> Result<Vec<RevenuePoint>> {
    let window = period.trailing(months);
    let Some(oldest) = window.first() else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(
        "SELECT substr(paid_at, 1, 7), SUM(amount) FROM payments
         WHERE paid_at >= ?1 GROUP BY substr(paid_at, 1, 7)",
    )?;
    let totals = stmt
        .query_map(params![oldest.first_day()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;

    Ok(window
        .into_iter()
        .map(|month| RevenuePoint {
            amount: totals.get(&month.to_string()).copied().unwrap_or(0),
            period: month,
        })
        .collect())
}

impl Storage {
    /// Build the dashboard for a billing period.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn dashboard_summary(
        &self,
        period: Period,
        revenue_months: u32,
    ) -> Result<DashboardSummary> {
        let conn = &self.conn;

        let total = scalar(conn, "SELECT COUNT(*) FROM apartments")?;
        let occupied = scalar(
            conn,
            "SELECT COUNT(*) FROM apartments WHERE status = 'occupied'",
        )?;

        let kinds: Vec<&str> = VehicleKind::ALL.iter().map(|k| k.as_str()).collect();
        let priorities: Vec<&str> = Priority::ALL.iter().map(|p| p.as_str()).collect();

        let summary = DashboardSummary {
            period,
            apartments: OccupancyStats {
                total,
                occupied,
                vacant: total - occupied,
            },
            residents: ResidentStats {
                active: scalar(conn, "SELECT COUNT(*) FROM residents WHERE status = 'active'")?,
                temporarily_absent: scalar(
                    conn,
                    "SELECT COUNT(*) FROM residents WHERE status = 'temporarily_absent'",
                )?,
            },
            vehicles: VehicleStats {
                by_kind: grouped(
                    conn,
                    "SELECT kind, COUNT(*) FROM vehicles WHERE status = 'active' GROUP BY kind",
                    &kinds,
                )?,
                inside: scalar(
                    conn,
                    "SELECT COUNT(*) FROM vehicles WHERE parking_state = 'inside'",
                )?,
            },
            visitors_inside: scalar(
                conn,
                "SELECT COUNT(*) FROM visits WHERE checked_out_at IS NULL",
            )?,
            open_incidents: open_incidents(conn, &priorities)?,
            billing: billing_stats(conn, period)?,
            revenue: revenue(conn, period, revenue_months)?,
            donations_open_campaigns: scalar(
                conn,
                "SELECT COALESCE(SUM(c.amount), 0) FROM contributions c
                 JOIN campaigns k ON k.id = c.campaign_id WHERE k.status = 'open'",
            )?,
        };

        debug!(
            "Dashboard for {}: {} invoiced, {} collected",
            period, summary.billing.invoiced, summary.billing.collected
        );
        Ok(summary)
    }
}
