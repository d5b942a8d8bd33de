//! Fee catalogue and the invoice ledger.
//!
//! Every ledger change runs in an immediate transaction: the invoice row is
//! read, the delta computed and the new totals written while the write lock
//! is held, so two cashiers cannot both settle the same remaining balance.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::{debug, info, warn};

use super::apartments::{fetch_apartment, row_to_apartment, APARTMENT_COLUMNS};
use super::{ensure_exists, now, write_audit, Storage};
use crate::error::{map_unique, Error, Result};
use crate::model::{
    optional, Apartment, ApartmentBalance, AuditRecord, Fee, GenerationReport, Invoice,
    InvoiceDetail, InvoiceFilter, InvoiceStatus, NewFee, NewInvoice, NewPayment, Page, Payment,
    Period,
};

const FEE_COLUMNS: &str =
    "id, name, kind, calculation, unit_price, active, description, created_at";

const INVOICE_COLUMNS: &str = "id, apartment_id, fee_id, period, amount_due, amount_paid, \
     status, due_date, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, invoice_id, amount, method, payer, note, paid_at";

fn fetch_fee(conn: &Connection, id: i64) -> Result<Fee> {
    conn.query_row(
        &format!("SELECT {FEE_COLUMNS} FROM fees WHERE id = ?1"),
        [id],
        row_to_fee,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("fee", id))
}

fn fetch_invoice(conn: &Connection, id: i64) -> Result<Invoice> {
    conn.query_row(
        &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1"),
        [id],
        row_to_invoice,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("invoice", id))
}

fn fetch_payments(conn: &Connection, invoice_id: i64) -> Result<Vec<Payment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE invoice_id = ?1 ORDER BY paid_at, id"
    ))?;
    let payments = stmt
        .query_map([invoice_id], row_to_payment)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(payments)
}

fn invoice_exists(
    conn: &Connection,
    apartment_id: i64,
    fee_id: i64,
    period: Period,
) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM invoices
             WHERE apartment_id = ?1 AND fee_id = ?2 AND period = ?3)",
        params![apartment_id, fee_id, period],
        |row| row.get(0),
    )?)
}

fn occupied_apartments(conn: &Connection) -> Result<Vec<Apartment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APARTMENT_COLUMNS} FROM apartments WHERE status = 'occupied' ORDER BY code"
    ))?;
    let apartments = stmt
        .query_map([], row_to_apartment)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(apartments)
}

fn detail(conn: &Connection, invoice: Invoice) -> Result<InvoiceDetail> {
    let payments = fetch_payments(conn, invoice.id)?;
    Ok(InvoiceDetail {
        remaining: invoice.remaining(),
        invoice,
        payments,
    })
}

/// Price a fee for one apartment using its area and active vehicles.
pub(crate) fn quote_amount(conn: &Connection, fee: &Fee, apartment: &Apartment) -> Result<i64> {
    let active_vehicles: i64 = conn.query_row(
        "SELECT COUNT(*) FROM vehicles WHERE apartment_id = ?1 AND status = 'active'",
        [apartment.id],
        |row| row.get(0),
    )?;
    fee.calculation
        .quote(fee.unit_price, apartment.area_m2, active_vehicles)
}

/// Insert an invoice row; a zero amount is issued already settled.
fn insert_invoice(
    conn: &Connection,
    apartment_id: i64,
    fee_id: i64,
    period: Period,
    amount_due: i64,
    due_day: u32,
) -> Result<i64> {
    let issued_at = now();
    conn.execute(
        "INSERT INTO invoices (apartment_id, fee_id, period, amount_due, amount_paid, status,
             due_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?7)",
        params![
            apartment_id,
            fee_id,
            period,
            amount_due,
            InvoiceStatus::from_amounts(amount_due, 0),
            period.due_date(due_day),
            issued_at,
        ],
    )
    .map_err(|e| {
        map_unique(e, || {
            format!("apartment {apartment_id} already has an invoice for fee {fee_id} in {period}")
        })
    })?;
    Ok(conn.last_insert_rowid())
}

/// Recompute an invoice's paid total and status from its payments.
pub(crate) fn update_payment_status(conn: &Connection, invoice_id: i64) -> Result<Invoice> {
    let invoice = fetch_invoice(conn, invoice_id)?;
    let amount_paid: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE invoice_id = ?1",
        [invoice_id],
        |row| row.get(0),
    )?;
    let status = InvoiceStatus::from_amounts(invoice.amount_due, amount_paid);
    conn.execute(
        "UPDATE invoices SET amount_paid = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
        params![amount_paid, status, now(), invoice_id],
    )?;
    if status != invoice.status {
        debug!(
            "Invoice {} moved from {} to {}",
            invoice_id, invoice.status, status
        );
    }
    fetch_invoice(conn, invoice_id)
}

impl Storage {
    /// Add a fee to the catalogue.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input or a conflict on a duplicate name.
    pub fn create_fee(&mut self, input: NewFee, actor: &str) -> Result<Fee> {
        let input = input.normalized()?;
        let tx = self.write_txn()?;
        tx.execute(
            "INSERT INTO fees (name, kind, calculation, unit_price, active, description, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
            params![
                input.name,
                input.kind,
                input.calculation,
                input.unit_price,
                input.description,
                now()
            ],
        )
        .map_err(|e| map_unique(e, || format!("fee {} already exists", input.name)))?;
        let id = tx.last_insert_rowid();
        write_audit(
            &tx,
            &AuditRecord::new(actor, "fee.created", "fee", id)
                .with_detail(serde_json::to_value(&input)?),
        )?;
        let fee = fetch_fee(&tx, id)?;
        tx.commit()?;

        info!("Created fee {} ({})", fee.name, id);
        Ok(fee)
    }

    /// Get a fee by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such fee.
    pub fn get_fee(&self, id: i64) -> Result<Fee> {
        fetch_fee(&self.conn, id)
    }

    /// List fees by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_fees(&self, active_only: bool) -> Result<Vec<Fee>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FEE_COLUMNS} FROM fees WHERE (?1 = 0 OR active = 1) ORDER BY name"
        ))?;
        let fees = stmt
            .query_map([active_only], row_to_fee)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(fees)
    }

    /// Replace a fee's definition. Existing invoices keep their amounts.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, a validation error, or a conflict on a duplicate name.
    pub fn update_fee(&mut self, id: i64, input: NewFee, actor: &str) -> Result<Fee> {
        let input = input.normalized()?;
        let tx = self.write_txn()?;
        ensure_exists(&tx, "fees", "fee", id)?;
        tx.execute(
            "UPDATE fees SET name = ?1, kind = ?2, calculation = ?3, unit_price = ?4,
                 description = ?5
             WHERE id = ?6",
            params![
                input.name,
                input.kind,
                input.calculation,
                input.unit_price,
                input.description,
                id
            ],
        )
        .map_err(|e| map_unique(e, || format!("fee {} already exists", input.name)))?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "fee.updated", "fee", id)
                .with_detail(serde_json::to_value(&input)?),
        )?;
        let fee = fetch_fee(&tx, id)?;
        tx.commit()?;
        Ok(fee)
    }

    /// Stop a fee from being invoiced. Fees are never deleted so invoices
    /// keep their reference.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such fee.
    pub fn deactivate_fee(&mut self, id: i64, actor: &str) -> Result<Fee> {
        let tx = self.write_txn()?;
        let fee = fetch_fee(&tx, id)?;
        if fee.active {
            tx.execute("UPDATE fees SET active = 0 WHERE id = ?1", [id])?;
            write_audit(&tx, &AuditRecord::new(actor, "fee.deactivated", "fee", id))?;
            info!("Deactivated fee {} ({})", fee.name, id);
        }
        let fee = fetch_fee(&tx, id)?;
        tx.commit()?;
        Ok(fee)
    }

    /// Issue one invoice.
    ///
    /// Without an explicit amount the fee's calculation prices the apartment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown apartment or fee, a validation error
    /// for an inactive fee or negative amount, or a conflict if the apartment
    /// already has an invoice for this fee and period.
    pub fn create_invoice(&mut self, input: NewInvoice, actor: &str) -> Result<Invoice> {
        if input.amount.is_some_and(|amount| amount < 0) {
            return Err(Error::validation("amount must not be negative"));
        }
        let due_day = self.rules.due_day;
        let tx = self.write_txn()?;
        let apartment = fetch_apartment(&tx, input.apartment_id)?;
        let fee = fetch_fee(&tx, input.fee_id)?;
        if !fee.active {
            return Err(Error::validation(format!("fee {} is inactive", fee.name)));
        }
        if invoice_exists(&tx, apartment.id, fee.id, input.period)? {
            return Err(Error::conflict(format!(
                "apartment {} already has an invoice for {} in {}",
                apartment.code, fee.name, input.period
            )));
        }

        let amount_due = match input.amount {
            Some(amount) => amount,
            None => quote_amount(&tx, &fee, &apartment)?,
        };
        let id = insert_invoice(&tx, apartment.id, fee.id, input.period, amount_due, due_day)?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "invoice.created", "invoice", id).with_detail(json!({
                "apartment_id": apartment.id,
                "fee_id": fee.id,
                "period": input.period,
                "amount_due": amount_due,
            })),
        )?;
        let invoice = fetch_invoice(&tx, id)?;
        tx.commit()?;

        info!(
            "Issued invoice {} to {} for {} {}: {} VND",
            id, apartment.code, fee.name, input.period, amount_due
        );
        Ok(invoice)
    }

    /// Bill a fee to every occupied apartment for a period.
    ///
    /// Apartments that already have the invoice are skipped, so running this
    /// twice for the same period issues nothing the second time.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown fee or a validation error for an
    /// inactive one. Nothing is written on error.
    pub fn generate_invoices(
        &mut self,
        fee_id: i64,
        period: Period,
        actor: &str,
    ) -> Result<GenerationReport> {
        let due_day = self.rules.due_day;
        let tx = self.write_txn()?;
        let fee = fetch_fee(&tx, fee_id)?;
        if !fee.active {
            return Err(Error::validation(format!("fee {} is inactive", fee.name)));
        }

        let apartments = occupied_apartments(&tx)?;

        let mut report = GenerationReport {
            fee_id,
            period,
            created: 0,
            skipped: 0,
            total_amount: 0,
        };
        for apartment in &apartments {
            if invoice_exists(&tx, apartment.id, fee.id, period)? {
                report.skipped += 1;
                continue;
            }
            let amount_due = quote_amount(&tx, &fee, apartment)?;
            let id = insert_invoice(&tx, apartment.id, fee.id, period, amount_due, due_day)?;
            write_audit(
                &tx,
                &AuditRecord::new(actor, "invoice.created", "invoice", id).with_detail(json!({
                    "apartment_id": apartment.id,
                    "fee_id": fee.id,
                    "period": period,
                    "amount_due": amount_due,
                    "generated": true,
                })),
            )?;
            report.created += 1;
            report.total_amount = report
                .total_amount
                .checked_add(amount_due)
                .ok_or_else(|| Error::validation("generated total is too large"))?;
        }
        tx.commit()?;

        info!(
            "Generated {} invoices for {} in {} ({} skipped, {} VND)",
            report.created, fee.name, period, report.skipped, report.total_amount
        );
        Ok(report)
    }

    /// Record a payment against an invoice and settle its status.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, a validation error for a non-positive amount or one
    /// exceeding the remaining balance, or a conflict if the invoice is
    /// already paid.
    pub fn record_payment(
        &mut self,
        invoice_id: i64,
        input: NewPayment,
        actor: &str,
    ) -> Result<InvoiceDetail> {
        if input.amount <= 0 {
            return Err(Error::validation("amount must be greater than 0"));
        }
        let tx = self.write_txn()?;
        let invoice = fetch_invoice(&tx, invoice_id)?;
        if invoice.status == InvoiceStatus::Paid {
            return Err(Error::conflict(format!("invoice {invoice_id} is already paid")));
        }
        let remaining = invoice.remaining();
        if input.amount > remaining {
            warn!(
                "Rejected overpayment of {} on invoice {} (remaining {})",
                input.amount, invoice_id, remaining
            );
            return Err(Error::validation(format!(
                "payment of {} exceeds the remaining balance of {remaining}",
                input.amount
            )));
        }

        tx.execute(
            "INSERT INTO payments (invoice_id, amount, method, payer, note, paid_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                invoice_id,
                input.amount,
                input.method,
                optional(input.payer),
                optional(input.note),
                now(),
            ],
        )?;
        let payment_id = tx.last_insert_rowid();
        let updated = update_payment_status(&tx, invoice_id)?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "invoice.payment_recorded", "invoice", invoice_id)
                .with_detail(json!({
                    "payment_id": payment_id,
                    "amount": input.amount,
                    "method": input.method,
                    "status": updated.status,
                    "remaining": updated.remaining(),
                })),
        )?;
        let detail = detail(&tx, updated)?;
        tx.commit()?;

        info!(
            "Recorded payment {} of {} VND on invoice {} ({})",
            payment_id, input.amount, invoice_id, detail.invoice.status
        );
        Ok(detail)
    }

    /// Recompute an invoice's paid total from its payments.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such invoice.
    pub fn update_payment_status(&mut self, invoice_id: i64) -> Result<Invoice> {
        let tx = self.write_txn()?;
        let invoice = update_payment_status(&tx, invoice_id)?;
        tx.commit()?;
        Ok(invoice)
    }

    /// Get an invoice with its payments.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such invoice.
    pub fn get_invoice(&self, id: i64) -> Result<InvoiceDetail> {
        let invoice = fetch_invoice(&self.conn, id)?;
        detail(&self.conn, invoice)
    }

    /// List invoices, newest period first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_invoices(&self, filter: &InvoiceFilter, page: Page) -> Result<Vec<Invoice>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices
             WHERE (?1 IS NULL OR apartment_id = ?1)
               AND (?2 IS NULL OR period = ?2)
               AND (?3 IS NULL OR status = ?3)
               AND (?4 IS NULL OR fee_id = ?4)
             ORDER BY period DESC, apartment_id, id LIMIT ?5 OFFSET ?6"
        ))?;
        let invoices = stmt
            .query_map(
                params![
                    filter.apartment_id,
                    filter.period,
                    filter.status,
                    filter.fee_id,
                    page.limit,
                    page.offset
                ],
                row_to_invoice,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Listed {} invoices", invoices.len());
        Ok(invoices)
    }

    /// Delete an invoice issued in error.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or a conflict once any payment has been recorded.
    pub fn delete_invoice(&mut self, id: i64, actor: &str) -> Result<()> {
        let tx = self.write_txn()?;
        let invoice = fetch_invoice(&tx, id)?;
        let payments: i64 = tx.query_row(
            "SELECT COUNT(*) FROM payments WHERE invoice_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        if payments > 0 {
            return Err(Error::conflict(format!(
                "invoice {id} has {payments} payments and cannot be deleted"
            )));
        }
        tx.execute("DELETE FROM invoices WHERE id = ?1", [id])?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "invoice.deleted", "invoice", id).with_detail(json!({
                "apartment_id": invoice.apartment_id,
                "fee_id": invoice.fee_id,
                "period": invoice.period,
            })),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Total an apartment still owes across its invoices.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such apartment.
    pub fn apartment_balance(&self, apartment_id: i64) -> Result<ApartmentBalance> {
        ensure_exists(&self.conn, "apartments", "apartment", apartment_id)?;
        let (outstanding, open_invoices) = self.conn.query_row(
            "SELECT COALESCE(SUM(amount_due - amount_paid), 0), COUNT(*)
             FROM invoices WHERE apartment_id = ?1 AND status != 'paid'",
            [apartment_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(ApartmentBalance {
            apartment_id,
            outstanding,
            open_invoices,
        })
    }
}

fn row_to_fee(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fee> {
    Ok(Fee {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        calculation: row.get(3)?,
        unit_price: row.get(4)?,
        active: row.get(5)?,
        description: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn row_to_invoice(row: &rusqlite::Row<'_>) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        id: row.get(0)?,
        apartment_id: row.get(1)?,
        fee_id: row.get(2)?,
        period: row.get(3)?,
        amount_due: row.get(4)?,
        amount_paid: row.get(5)?,
        status: row.get(6)?,
        due_date: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_payment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        invoice_id: row.get(1)?,
        amount: row.get(2)?,
        method: row.get(3)?,
        payer: row.get(4)?,
        note: row.get(5)?,
        paid_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::{FeeCalculation, FeeKind, PaymentMethod};
    use crate::storage::test_support::{self, ACTOR};

    fn period() -> Period {
        "2025-03".parse().unwrap()
    }

    fn payment(amount: i64) -> NewPayment {
        NewPayment {
            amount,
            method: PaymentMethod::BankTransfer,
            payer: Some("Le Thi Mai".to_string()),
            note: None,
        }
    }

    /// An occupied apartment with a per-square-metre service fee.
    fn setup(storage: &mut Storage) -> (Apartment, Fee) {
        let apt = test_support::apartment(storage, "A-101", 75.5);
        test_support::resident(storage, apt.id, "Hoang Van Nam");
        let fee = test_support::fee(storage, "Service", FeeCalculation::PerSquareMetre, 7_000);
        (apt, fee)
    }

    fn invoice_for(storage: &mut Storage, apt: &Apartment, fee: &Fee) -> Invoice {
        storage
            .create_invoice(
                NewInvoice {
                    apartment_id: apt.id,
                    fee_id: fee.id,
                    period: period(),
                    amount: None,
                },
                ACTOR,
            )
            .unwrap()
    }

    #[test]
    fn test_fee_crud() {
        let mut storage = test_support::storage();
        let fee = test_support::fee(&mut storage, "Parking", FeeCalculation::PerVehicle, 100_000);
        assert!(fee.active);

        let updated = storage
            .update_fee(
                fee.id,
                NewFee {
                    name: "Parking".to_string(),
                    kind: FeeKind::Mandatory,
                    calculation: FeeCalculation::PerVehicle,
                    unit_price: 120_000,
                    description: Some("monthly".to_string()),
                },
                ACTOR,
            )
            .unwrap();
        assert_eq!(updated.unit_price, 120_000);

        let inactive = storage.deactivate_fee(fee.id, ACTOR).unwrap();
        assert!(!inactive.active);
        assert!(storage.list_fees(true).unwrap().is_empty());
        assert_eq!(storage.list_fees(false).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_fee_name() {
        let mut storage = test_support::storage();
        test_support::fee(&mut storage, "Service", FeeCalculation::Fixed, 1);
        let err = storage
            .create_fee(
                NewFee {
                    name: "Service".to_string(),
                    kind: FeeKind::Voluntary,
                    calculation: FeeCalculation::Fixed,
                    unit_price: 2,
                    description: None,
                },
                ACTOR,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_create_invoice_quotes_area() {
        let mut storage = test_support::storage();
        let (apt, fee) = setup(&mut storage);

        let invoice = invoice_for(&mut storage, &apt, &fee);
        assert_eq!(invoice.amount_due, 528_500);
        assert_eq!(invoice.status, InvoiceStatus::Unpaid);
        assert_eq!(invoice.due_date, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
    }

    #[test]
    fn test_due_day_follows_rules() {
        let mut config = crate::config::Config::default();
        config.billing.due_day = 5;
        let mut storage = test_support::storage()
            .with_rules(crate::storage::Rules::from_config(&config).unwrap());
        let (apt, fee) = setup(&mut storage);

        let invoice = invoice_for(&mut storage, &apt, &fee);
        assert_eq!(invoice.due_date, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
    }

    #[test]
    fn test_duplicate_invoice_conflicts() {
        let mut storage = test_support::storage();
        let (apt, fee) = setup(&mut storage);
        invoice_for(&mut storage, &apt, &fee);

        let err = storage
            .create_invoice(
                NewInvoice {
                    apartment_id: apt.id,
                    fee_id: fee.id,
                    period: period(),
                    amount: Some(1),
                },
                ACTOR,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_inactive_fee_rejected() {
        let mut storage = test_support::storage();
        let (apt, fee) = setup(&mut storage);
        storage.deactivate_fee(fee.id, ACTOR).unwrap();

        let err = storage
            .create_invoice(
                NewInvoice {
                    apartment_id: apt.id,
                    fee_id: fee.id,
                    period: period(),
                    amount: None,
                },
                ACTOR,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_zero_amount_invoice_is_paid() {
        let mut storage = test_support::storage();
        let apt = test_support::apartment(&mut storage, "A-101", 60.0);
        let fee = test_support::fee(&mut storage, "Parking", FeeCalculation::PerVehicle, 100_000);

        let invoice = invoice_for(&mut storage, &apt, &fee);
        assert_eq!(invoice.amount_due, 0);
        assert_eq!(invoice.status, InvoiceStatus::Paid);

        let err = storage
            .record_payment(invoice.id, payment(1), ACTOR)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_payments_settle_invoice() {
        let mut storage = test_support::storage();
        let (apt, fee) = setup(&mut storage);
        let invoice = invoice_for(&mut storage, &apt, &fee);

        let partial = storage
            .record_payment(invoice.id, payment(200_000), ACTOR)
            .unwrap();
        assert_eq!(partial.invoice.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(partial.remaining, 328_500);

        let settled = storage
            .record_payment(invoice.id, payment(328_500), ACTOR)
            .unwrap();
        assert_eq!(settled.invoice.status, InvoiceStatus::Paid);
        assert_eq!(settled.invoice.amount_paid, 528_500);
        assert_eq!(settled.remaining, 0);
        assert_eq!(settled.payments.len(), 2);

        let err = storage
            .record_payment(invoice.id, payment(1), ACTOR)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_overpayment_rejected() {
        let mut storage = test_support::storage();
        let (apt, fee) = setup(&mut storage);
        let invoice = invoice_for(&mut storage, &apt, &fee);

        let err = storage
            .record_payment(invoice.id, payment(528_501), ACTOR)
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = storage
            .record_payment(invoice.id, payment(0), ACTOR)
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        // nothing was written
        assert!(storage.get_invoice(invoice.id).unwrap().payments.is_empty());
    }

    #[test]
    fn test_payment_missing_invoice() {
        let mut storage = test_support::storage();
        let err = storage.record_payment(5, payment(10), ACTOR).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_update_payment_status_recomputes() {
        let mut storage = test_support::storage();
        let (apt, fee) = setup(&mut storage);
        let invoice = invoice_for(&mut storage, &apt, &fee);
        storage
            .record_payment(invoice.id, payment(100_000), ACTOR)
            .unwrap();

        storage
            .conn
            .execute(
                "UPDATE invoices SET amount_paid = 0, status = 'unpaid' WHERE id = ?1",
                [invoice.id],
            )
            .unwrap();
        let repaired = storage.update_payment_status(invoice.id).unwrap();
        assert_eq!(repaired.amount_paid, 100_000);
        assert_eq!(repaired.status, InvoiceStatus::PartiallyPaid);
    }

    #[test]
    fn test_generate_skips_vacant_and_existing() {
        let mut storage = test_support::storage();
        let (apt, fee) = setup(&mut storage);
        let other = test_support::apartment(&mut storage, "A-102", 50.0);
        test_support::resident(&mut storage, other.id, "Bui Thi Lan");
        test_support::apartment(&mut storage, "A-103", 40.0);
        invoice_for(&mut storage, &apt, &fee);

        let report = storage.generate_invoices(fee.id, period(), ACTOR).unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total_amount, 350_000);

        let again = storage.generate_invoices(fee.id, period(), ACTOR).unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.skipped, 2);
    }

    #[test]
    fn test_list_by_status() {
        let mut storage = test_support::storage();
        let (apt, fee) = setup(&mut storage);
        let invoice = invoice_for(&mut storage, &apt, &fee);
        storage
            .record_payment(invoice.id, payment(1_000), ACTOR)
            .unwrap();

        let filter = InvoiceFilter {
            status: Some(InvoiceStatus::PartiallyPaid),
            ..InvoiceFilter::default()
        };
        assert_eq!(storage.list_invoices(&filter, Page::default()).unwrap().len(), 1);

        let filter = InvoiceFilter {
            status: Some(InvoiceStatus::Paid),
            ..InvoiceFilter::default()
        };
        assert!(storage.list_invoices(&filter, Page::default()).unwrap().is_empty());
    }

    #[test]
    fn test_delete_blocked_by_payments() {
        let mut storage = test_support::storage();
        let (apt, fee) = setup(&mut storage);
        let invoice = invoice_for(&mut storage, &apt, &fee);
        storage
            .record_payment(invoice.id, payment(1_000), ACTOR)
            .unwrap();

        let err = storage.delete_invoice(invoice.id, ACTOR).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_delete_unpaid_invoice() {
        let mut storage = test_support::storage();
        let (apt, fee) = setup(&mut storage);
        let invoice = invoice_for(&mut storage, &apt, &fee);

        storage.delete_invoice(invoice.id, ACTOR).unwrap();
        assert!(storage.get_invoice(invoice.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_apartment_balance() {
        let mut storage = test_support::storage();
        let (apt, fee) = setup(&mut storage);
        let invoice = invoice_for(&mut storage, &apt, &fee);
        storage
            .record_payment(invoice.id, payment(28_500), ACTOR)
            .unwrap();

        let balance = storage.apartment_balance(apt.id).unwrap();
        assert_eq!(balance.outstanding, 500_000);
        assert_eq!(balance.open_invoices, 1);

        assert!(storage.apartment_balance(999).unwrap_err().is_not_found());
    }
}
