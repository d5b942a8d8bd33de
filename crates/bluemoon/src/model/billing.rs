//! Fee catalogue, invoices and payments.
//!
//! Money is whole VND held in `i64`. An invoice's status is always a
//! function of `amount_due` and `amount_paid`; see [`InvoiceStatus::from_amounts`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{optional, required, Period};
use crate::error::{Error, Result};

text_enum! {
    /// Whether every apartment owes the fee.
    pub enum FeeKind {
        /// Billed to every occupied apartment; counts towards collection rate.
        Mandatory => "mandatory",
        /// Contribution-style fee billed on request.
        Voluntary => "voluntary",
    }
}

text_enum! {
    /// How the amount due is derived from the unit price.
    pub enum FeeCalculation {
        /// Unit price times floor area.
        PerSquareMetre => "per_square_metre",
        /// Unit price once per apartment.
        PerApartment => "per_apartment",
        /// Unit price times active vehicles of the apartment.
        PerVehicle => "per_vehicle",
        /// A flat amount.
        Fixed => "fixed",
    }
}

impl FeeCalculation {
    /// Compute the amount due for one apartment.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the result overflows.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn quote(self, unit_price: i64, area_m2: f64, active_vehicles: i64) -> Result<i64> {
        let overflow = || Error::validation("invoice amount is too large");
        match self {
            Self::PerSquareMetre => {
                let amount = (unit_price as f64 * area_m2).round();
                if !amount.is_finite() || amount >= i64::MAX as f64 {
                    return Err(overflow());
                }
                Ok(amount as i64)
            }
            Self::PerApartment | Self::Fixed => Ok(unit_price),
            Self::PerVehicle => unit_price.checked_mul(active_vehicles).ok_or_else(overflow),
        }
    }
}

/// An entry in the fee catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    /// Row identifier.
    pub id: i64,
    /// Unique display name, e.g. "Service fee".
    pub name: String,
    /// Mandatory or voluntary.
    pub kind: FeeKind,
    /// Calculation basis.
    pub calculation: FeeCalculation,
    /// Price per unit in VND.
    pub unit_price: i64,
    /// Inactive fees cannot be invoiced.
    pub active: bool,
    /// Free-form description.
    pub description: Option<String>,
    /// When the fee was created.
    pub created_at: DateTime<Utc>,
}

/// Input for creating or replacing a fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFee {
    /// Unique display name.
    pub name: String,
    /// Mandatory or voluntary.
    pub kind: FeeKind,
    /// Calculation basis.
    pub calculation: FeeCalculation,
    /// Price per unit in VND.
    pub unit_price: i64,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl NewFee {
    /// Validate and normalize the input.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name or negative price.
    pub fn normalized(self) -> Result<Self> {
        if self.unit_price < 0 {
            return Err(Error::validation("unit_price must not be negative"));
        }
        Ok(Self {
            name: required("name", &self.name)?,
            kind: self.kind,
            calculation: self.calculation,
            unit_price: self.unit_price,
            description: optional(self.description),
        })
    }
}

text_enum! {
    /// Settlement state of an invoice.
    pub enum InvoiceStatus {
        /// Nothing paid.
        Unpaid => "unpaid",
        /// Some but not all paid.
        PartiallyPaid => "partially_paid",
        /// Fully settled.
        Paid => "paid",
    }
}

impl InvoiceStatus {
    /// Derive the status from the amounts.
    #[must_use]
    pub fn from_amounts(amount_due: i64, amount_paid: i64) -> Self {
        if amount_paid >= amount_due {
            Self::Paid
        } else if amount_paid == 0 {
            Self::Unpaid
        } else {
            Self::PartiallyPaid
        }
    }
}

text_enum! {
    /// How a payment was made.
    pub enum PaymentMethod {
        /// Cash at the management office.
        Cash => "cash",
        /// Bank transfer.
        BankTransfer => "bank_transfer",
        /// Card terminal.
        Card => "card",
    }
}

/// An amount billed to an apartment for one fee and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Row identifier.
    pub id: i64,
    /// Billed apartment.
    pub apartment_id: i64,
    /// Fee being billed.
    pub fee_id: i64,
    /// Billing month.
    pub period: Period,
    /// Amount billed.
    pub amount_due: i64,
    /// Sum of recorded payments.
    pub amount_paid: i64,
    /// Settlement state.
    pub status: InvoiceStatus,
    /// Payment deadline.
    pub due_date: NaiveDate,
    /// When the invoice was issued.
    pub created_at: DateTime<Utc>,
    /// Last change to amounts or status.
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Amount still owed; never negative.
    #[must_use]
    pub fn remaining(&self) -> i64 {
        (self.amount_due - self.amount_paid).max(0)
    }
}

/// An invoice together with its payments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceDetail {
    /// The invoice.
    #[serde(flatten)]
    pub invoice: Invoice,
    /// Amount still owed.
    pub remaining: i64,
    /// Payments, oldest first.
    pub payments: Vec<Payment>,
}

/// A payment against an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Row identifier.
    pub id: i64,
    /// Invoice paid.
    pub invoice_id: i64,
    /// Amount in VND.
    pub amount: i64,
    /// Payment method.
    pub method: PaymentMethod,
    /// Who paid.
    pub payer: Option<String>,
    /// Cashier note.
    pub note: Option<String>,
    /// When the payment was taken.
    pub paid_at: DateTime<Utc>,
}

/// Input for issuing a single invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    /// Apartment to bill.
    pub apartment_id: i64,
    /// Fee to bill.
    pub fee_id: i64,
    /// Billing month.
    pub period: Period,
    /// Explicit amount, overriding the fee's calculation.
    #[serde(default)]
    pub amount: Option<i64>,
}

/// Input for recording a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    /// Amount in VND.
    pub amount: i64,
    /// Payment method; defaults to cash.
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
    /// Who paid.
    #[serde(default)]
    pub payer: Option<String>,
    /// Cashier note.
    #[serde(default)]
    pub note: Option<String>,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::Cash
}

/// Filters for listing invoices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InvoiceFilter {
    /// Only this apartment.
    pub apartment_id: Option<i64>,
    /// Only this billing month.
    pub period: Option<Period>,
    /// Only this status.
    pub status: Option<InvoiceStatus>,
    /// Only this fee.
    pub fee_id: Option<i64>,
}

/// What an apartment still owes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApartmentBalance {
    /// The apartment.
    pub apartment_id: i64,
    /// Sum of remaining amounts over its invoices.
    pub outstanding: i64,
    /// Invoices not yet fully paid.
    pub open_invoices: i64,
}

/// Outcome of bulk invoice generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Fee billed.
    pub fee_id: i64,
    /// Billing month.
    pub period: Period,
    /// Invoices issued.
    pub created: usize,
    /// Apartments that already had an invoice.
    pub skipped: usize,
    /// Sum of the amounts issued.
    pub total_amount: i64,
}
