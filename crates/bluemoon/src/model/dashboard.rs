//! Dashboard aggregates.

use std::collections::BTreeMap;

use serde::Serialize;

use super::Period;

/// Everything the admin dashboard shows for one billing period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    /// Billing period the billing block refers to.
    pub period: Period,
    /// Apartment occupancy.
    pub apartments: OccupancyStats,
    /// Resident counts.
    pub residents: ResidentStats,
    /// Vehicle counts.
    pub vehicles: VehicleStats,
    /// Visitors currently inside.
    pub visitors_inside: i64,
    /// Open incidents by priority.
    pub open_incidents: BTreeMap<String, i64>,
    /// Mandatory-fee billing for the period.
    pub billing: BillingStats,
    /// Payments received per month, oldest first.
    pub revenue: Vec<RevenuePoint>,
    /// Total raised by open campaigns.
    pub donations_open_campaigns: i64,
}

/// Apartment occupancy counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OccupancyStats {
    /// All apartments.
    pub total: i64,
    /// With at least one active resident.
    pub occupied: i64,
    /// Without active residents.
    pub vacant: i64,
}

/// Resident counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResidentStats {
    /// Living in the building.
    pub active: i64,
    /// Declared temporarily absent.
    pub temporarily_absent: i64,
}

/// Vehicle counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleStats {
    /// Active registrations by kind.
    pub by_kind: BTreeMap<String, i64>,
    /// Vehicles parked inside now.
    pub inside: i64,
}

/// Collection figures for mandatory fees in a period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BillingStats {
    /// Sum of amounts due.
    pub invoiced: i64,
    /// Sum of amounts paid.
    pub collected: i64,
    /// `invoiced - collected`.
    pub outstanding: i64,
    /// `collected / invoiced * 100`; `None` when nothing was invoiced.
    pub collection_rate_percent: Option<f64>,
    /// Invoices not fully paid.
    pub unpaid_invoices: i64,
}

impl BillingStats {
    /// Build the figures from raw sums.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_totals(invoiced: i64, collected: i64, unpaid_invoices: i64) -> Self {
        let collection_rate_percent = if invoiced > 0 {
            let rate = collected as f64 / invoiced as f64 * 100.0;
            Some((rate * 100.0).round() / 100.0)
        } else {
            None
        };
        Self {
            invoiced,
            collected,
            outstanding: (invoiced - collected).max(0),
            collection_rate_percent,
            unpaid_invoices,
        }
    }
}

/// Payments received in one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenuePoint {
    /// Month.
    pub period: Period,
    /// Sum of payments.
    pub amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_stats_rate() {
        let stats = BillingStats::from_totals(300, 100, 2);
        assert_eq!(stats.outstanding, 200);
        assert_eq!(stats.collection_rate_percent, Some(33.33));
    }

    #[test]
    fn test_billing_stats_nothing_invoiced() {
        let stats = BillingStats::from_totals(0, 0, 0);
        assert_eq!(stats.collection_rate_percent, None);
        assert_eq!(stats.outstanding, 0);
    }
}
