//! Invoice repository
//!
//! Invoices are saved whole: the header is inserted or version-checked and
//! updated, and the line items are replaced, all inside one transaction.

use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgConnection, PgPool, Postgres, Row};
use uuid::Uuid;

use core_kernel::{CustomerId, DueId, EnrollmentId, InvoiceId, LineItemId};
use domain_ledger::{Invoice, InvoiceLineItem, InvoiceStatus};

use crate::error::DatabaseError;
use crate::repositories::dues::{audit_columns, currency_column, money_column};

const INVOICE_ENTITY: &str = "Invoice";

const INSERT_INVOICE: &str = r#"
    INSERT INTO invoices (
        invoice_id, invoice_number, customer_id, enrollment_id, invoice_date,
        due_date, currency, subtotal, discount_amount, tax_amount, total_amount,
        amount_paid, amount_due, status, issued_at, paid_at, notes, lifecycle,
        created_at, updated_at, created_by, updated_by, version
    ) VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
        $17, $18, $19, $20, $21, $22, $23
    )
"#;

const UPDATE_INVOICE: &str = r#"
    UPDATE invoices SET
        invoice_number = $2, customer_id = $3, enrollment_id = $4,
        invoice_date = $5, due_date = $6, currency = $7, subtotal = $8,
        discount_amount = $9, tax_amount = $10, total_amount = $11,
        amount_paid = $12, amount_due = $13, status = $14, issued_at = $15,
        paid_at = $16, notes = $17, lifecycle = $18, created_at = $19,
        updated_at = $20, created_by = $21, updated_by = $22,
        version = version + 1
    WHERE invoice_id = $1 AND version = $23
"#;

const INSERT_LINE: &str = r#"
    INSERT INTO invoice_line_items (
        line_item_id, invoice_id, line_number, description, quantity, unit_price,
        discount_percentage, discount_amount, line_total, due_id
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

/// Repository for invoices and their line items
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stores an invoice with its lines and returns the stored copy
    ///
    /// Version 0 inserts at version 1; otherwise the header is updated only
    /// if the stored version matches, and the version is bumped.
    pub async fn save(&self, invoice: &Invoice) -> Result<Invoice, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let mut stored = invoice.clone();
        if invoice.version == 0 {
            stored.version = 1;
            bind_invoice(sqlx::query(INSERT_INVOICE), &stored)?
                .execute(&mut *tx)
                .await?;
        } else {
            update_versioned(&mut tx, invoice).await?;
            stored.version += 1;
        }

        sqlx::query("DELETE FROM invoice_line_items WHERE invoice_id = $1")
            .bind(*invoice.id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for item in &invoice.line_items {
            let line_number = i32::try_from(item.line_number)
                .map_err(|_| DatabaseError::bad_value("line_number", item.line_number))?;

            sqlx::query(INSERT_LINE)
                .bind(*item.id.as_uuid())
                .bind(*invoice.id.as_uuid())
                .bind(line_number)
                .bind(item.description.as_str())
                .bind(item.quantity)
                .bind(item.unit_price.amount())
                .bind(item.discount_percentage)
                .bind(item.discount_amount.amount())
                .bind(item.line_total.amount())
                .bind(item.due_id.map(|id| *id.as_uuid()))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        Ok(stored)
    }

    /// Retrieves an invoice with its lines in line-number order
    pub async fn get(&self, invoice_id: InvoiceId) -> Result<Invoice, DatabaseError> {
        let row = sqlx::query("SELECT * FROM invoices WHERE invoice_id = $1")
            .bind(*invoice_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Invoice", invoice_id))?;

        let mut invoice = invoice_from_row(&row)?;
        invoice.line_items = self.lines(invoice_id, &invoice).await?;
        Ok(invoice)
    }

    /// Active invoices of a customer, newest first
    pub async fn find_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Invoice>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM invoices
            WHERE customer_id = $1 AND lifecycle = 'active'
            ORDER BY invoice_date DESC, invoice_id DESC
            "#,
        )
        .bind(*customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut invoices = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut invoice = invoice_from_row(row)?;
            invoice.line_items = self.lines(invoice.id, &invoice).await?;
            invoices.push(invoice);
        }
        Ok(invoices)
    }

    async fn lines(
        &self,
        invoice_id: InvoiceId,
        invoice: &Invoice,
    ) -> Result<Vec<InvoiceLineItem>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT * FROM invoice_line_items WHERE invoice_id = $1 ORDER BY line_number",
        )
        .bind(*invoice_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| line_from_row(row, invoice)).collect()
    }
}

/// Guarded header update; a missing row and a stale version are told apart
async fn update_versioned(conn: &mut PgConnection, invoice: &Invoice) -> Result<(), DatabaseError> {
    let result = bind_invoice(sqlx::query(UPDATE_INVOICE), invoice)?
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        let current: Option<i64> =
            sqlx::query_scalar("SELECT version FROM invoices WHERE invoice_id = $1")
                .bind(*invoice.id.as_uuid())
                .fetch_optional(&mut *conn)
                .await?;

        return Err(match current {
            None => DatabaseError::not_found(INVOICE_ENTITY, invoice.id),
            Some(actual) => DatabaseError::VersionConflict {
                entity: INVOICE_ENTITY,
                id: invoice.id.to_string(),
                expected: invoice.version,
                actual: u64::try_from(actual)
                    .map_err(|_| DatabaseError::bad_value("version", actual))?,
            },
        });
    }
    Ok(())
}

/// Binds every header column in statement order, version last
fn bind_invoice<'q>(
    query: Query<'q, Postgres, PgArguments>,
    invoice: &'q Invoice,
) -> Result<Query<'q, Postgres, PgArguments>, DatabaseError> {
    let version = i64::try_from(invoice.version)
        .map_err(|_| DatabaseError::bad_value("version", invoice.version))?;

    Ok(query
        .bind(*invoice.id.as_uuid())
        .bind(invoice.invoice_number.as_str())
        .bind(*invoice.customer_id.as_uuid())
        .bind(invoice.enrollment_id.map(|id| *id.as_uuid()))
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(invoice.currency.code())
        .bind(invoice.subtotal.amount())
        .bind(invoice.discount_amount.amount())
        .bind(invoice.tax_amount.amount())
        .bind(invoice.total_amount.amount())
        .bind(invoice.amount_paid.amount())
        .bind(invoice.amount_due.amount())
        .bind(invoice.status.as_str())
        .bind(invoice.issued_at)
        .bind(invoice.paid_at)
        .bind(invoice.notes.as_deref())
        .bind(invoice.audit.lifecycle.as_str())
        .bind(invoice.audit.created_at)
        .bind(invoice.audit.updated_at)
        .bind(invoice.audit.created_by.as_deref())
        .bind(invoice.audit.updated_by.as_deref())
        .bind(version))
}

fn invoice_from_row(row: &PgRow) -> Result<Invoice, DatabaseError> {
    let currency = currency_column(row, "currency")?;
    let status: String = row.try_get("status")?;
    let version: i64 = row.try_get("version")?;

    Ok(Invoice {
        id: InvoiceId::from_uuid(row.try_get("invoice_id")?),
        invoice_number: row.try_get("invoice_number")?,
        customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
        enrollment_id: row
            .try_get::<Option<Uuid>, _>("enrollment_id")?
            .map(EnrollmentId::from_uuid),
        invoice_date: row.try_get("invoice_date")?,
        due_date: row.try_get("due_date")?,
        currency,
        line_items: Vec::new(),
        subtotal: money_column(row, "subtotal", currency)?,
        discount_amount: money_column(row, "discount_amount", currency)?,
        tax_amount: money_column(row, "tax_amount", currency)?,
        total_amount: money_column(row, "total_amount", currency)?,
        amount_paid: money_column(row, "amount_paid", currency)?,
        amount_due: money_column(row, "amount_due", currency)?,
        status: InvoiceStatus::parse(&status)
            .ok_or_else(|| DatabaseError::bad_value("status", &status))?,
        issued_at: row.try_get("issued_at")?,
        paid_at: row.try_get("paid_at")?,
        notes: row.try_get("notes")?,
        audit: audit_columns(row)?,
        version: u64::try_from(version).map_err(|_| DatabaseError::bad_value("version", version))?,
    })
}

fn line_from_row(row: &PgRow, invoice: &Invoice) -> Result<InvoiceLineItem, DatabaseError> {
    let currency = invoice.currency;
    let line_number: i32 = row.try_get("line_number")?;
    let quantity: Decimal = row.try_get("quantity")?;

    Ok(InvoiceLineItem {
        id: LineItemId::from_uuid(row.try_get("line_item_id")?),
        line_number: u32::try_from(line_number)
            .map_err(|_| DatabaseError::bad_value("line_number", line_number))?,
        description: row.try_get("description")?,
        quantity,
        unit_price: money_column(row, "unit_price", currency)?,
        discount_percentage: row.try_get("discount_percentage")?,
        discount_amount: money_column(row, "discount_amount", currency)?,
        line_total: money_column(row, "line_total", currency)?,
        due_id: row.try_get::<Option<Uuid>, _>("due_id")?.map(DueId::from_uuid),
    })
}
