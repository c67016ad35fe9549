//! Due ledger repository
//!
//! Database access for dues and the payment and penalty records hanging off
//! them. Dues are versioned: every update is guarded by
//! `WHERE version = $expected` and bumps the version, so a writer holding a
//! stale copy changes nothing and gets a [`DatabaseError::VersionConflict`].
//!
//! Combined writes (entry plus payment, entry plus penalty record) run in
//! one transaction.

use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use core_kernel::{
    AuditMetadata, Currency, CustomerId, DueId, EnrollmentId, Lifecycle, Money, PaymentId,
    PenaltyId, Rate,
};
use domain_ledger::{
    DueLedgerEntry, DueQuery, DueStatus, LatePaymentPenalty, PaymentHistory, PaymentMethod,
    PaymentStatus,
};

use crate::error::DatabaseError;

const DUE_ENTITY: &str = "DueLedgerEntry";

const INSERT_DUE: &str = r#"
    INSERT INTO due_ledger_entries (
        due_id, customer_id, enrollment_id, installment_number, category_code,
        currency, invoice_reference, invoice_date, academic_year, semester,
        original_rate, gross_amount, scholarship_percentage, scholarship_amount,
        scholarship_expiry_date, discount_amount, net_payable_amount,
        service_charge_amount, late_penalty_rate, late_penalty_amount,
        total_amount_with_charges, amount_paid, amount_outstanding, due_date,
        paid_date, status, is_refundable, is_transferable, remarks, lifecycle,
        created_at, updated_at, created_by, updated_by, version
    ) VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
        $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32,
        $33, $34, $35
    )
"#;

const UPDATE_DUE: &str = r#"
    UPDATE due_ledger_entries SET
        customer_id = $2, enrollment_id = $3, installment_number = $4,
        category_code = $5, currency = $6, invoice_reference = $7,
        invoice_date = $8, academic_year = $9, semester = $10,
        original_rate = $11, gross_amount = $12, scholarship_percentage = $13,
        scholarship_amount = $14, scholarship_expiry_date = $15,
        discount_amount = $16, net_payable_amount = $17,
        service_charge_amount = $18, late_penalty_rate = $19,
        late_penalty_amount = $20, total_amount_with_charges = $21,
        amount_paid = $22, amount_outstanding = $23, due_date = $24,
        paid_date = $25, status = $26, is_refundable = $27,
        is_transferable = $28, remarks = $29, lifecycle = $30,
        created_at = $31, updated_at = $32, created_by = $33, updated_by = $34,
        version = version + 1
    WHERE due_id = $1 AND version = $35
"#;

const INSERT_PAYMENT: &str = r#"
    INSERT INTO payment_history (
        payment_id, due_id, customer_id, enrollment_id, amount, currency,
        payment_date, payment_method, reference, receipt_number, cashier_name,
        status, remarks, recorded_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
"#;

const INSERT_PENALTY: &str = r#"
    INSERT INTO late_payment_penalties (
        penalty_id, due_id, customer_id, currency, penalty_amount, delta,
        penalty_date, days_overdue, weeks_charged, penalty_rate, is_paid,
        remarks, recorded_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
"#;

/// Repository for dues, payment history and penalty records
#[derive(Debug, Clone)]
pub struct DueRepository {
    pool: PgPool,
}

impl DueRepository {
    /// Creates a new DueRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Dues
    // ========================================================================

    /// Inserts a new entry at version 1 and returns the stored copy
    pub async fn insert(&self, entry: &DueLedgerEntry) -> Result<DueLedgerEntry, DatabaseError> {
        let mut stored = entry.clone();
        stored.version = 1;

        bind_due(sqlx::query(INSERT_DUE), &stored)?
            .execute(&self.pool)
            .await?;

        Ok(stored)
    }

    /// Retrieves an entry by id, whatever its lifecycle
    pub async fn get(&self, due_id: DueId) -> Result<DueLedgerEntry, DatabaseError> {
        let row = sqlx::query("SELECT * FROM due_ledger_entries WHERE due_id = $1")
            .bind(*due_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found(DUE_ENTITY, due_id))?;

        due_from_row(&row)
    }

    /// Version-guarded update outside of any wider transaction
    pub async fn update(&self, entry: &DueLedgerEntry) -> Result<DueLedgerEntry, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        update_versioned(&mut conn, entry).await
    }

    /// Finds entries matching the query, ordered by due date then id
    pub async fn find(&self, query: &DueQuery) -> Result<Vec<DueLedgerEntry>, DatabaseError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM due_ledger_entries WHERE TRUE");

        if !query.include_deleted {
            builder.push(" AND lifecycle = ").push_bind(Lifecycle::Active.as_str());
        }
        if let Some(customer_id) = query.customer_id {
            builder.push(" AND customer_id = ").push_bind(*customer_id.as_uuid());
        }
        if let Some(enrollment_id) = query.enrollment_id {
            builder.push(" AND enrollment_id = ").push_bind(*enrollment_id.as_uuid());
        }
        if !query.statuses.is_empty() {
            let statuses: Vec<String> = query.statuses.iter().map(|s| s.as_str().to_string()).collect();
            builder.push(" AND status = ANY(").push_bind(statuses).push(")");
        }
        if let Some(range) = query.due_between {
            builder
                .push(" AND due_date BETWEEN ")
                .push_bind(range.start)
                .push(" AND ")
                .push_bind(range.end);
        }
        if let Some(year) = &query.academic_year {
            builder.push(" AND academic_year = ").push_bind(year.clone());
        }
        if let Some(semester) = &query.semester {
            builder.push(" AND semester = ").push_bind(semester.clone());
        }
        if query.outstanding_only {
            builder.push(" AND amount_outstanding > 0");
        }
        if let Some(as_of) = query.overdue_as_of {
            builder
                .push(" AND due_date < ")
                .push_bind(as_of)
                .push(" AND amount_outstanding > 0");
        }

        builder.push(" ORDER BY due_date, due_id");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }
        if let Some(offset) = query.offset {
            builder.push(" OFFSET ").push_bind(i64::from(offset));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(due_from_row).collect()
    }

    // ========================================================================
    // Combined writes
    // ========================================================================

    /// Updates the entry and appends its payment record in one transaction
    pub async fn commit_payment(
        &self,
        entry: &DueLedgerEntry,
        payment: &PaymentHistory,
    ) -> Result<DueLedgerEntry, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let stored = update_versioned(&mut tx, entry).await?;
        insert_payment(&mut tx, payment).await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        Ok(stored)
    }

    /// Updates the entry and appends an accrual record, if any, in one transaction
    pub async fn commit_penalty(
        &self,
        entry: &DueLedgerEntry,
        penalty: Option<&LatePaymentPenalty>,
    ) -> Result<DueLedgerEntry, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let stored = update_versioned(&mut tx, entry).await?;
        if let Some(record) = penalty {
            insert_penalty(&mut tx, record).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        Ok(stored)
    }

    // ========================================================================
    // History
    // ========================================================================

    pub async fn payments_for_due(&self, due_id: DueId) -> Result<Vec<PaymentHistory>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT * FROM payment_history WHERE due_id = $1 ORDER BY recorded_at, payment_id",
        )
        .bind(*due_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }

    pub async fn payments_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<PaymentHistory>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT * FROM payment_history WHERE customer_id = $1 ORDER BY recorded_at, payment_id",
        )
        .bind(*customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }

    pub async fn penalties_for_due(
        &self,
        due_id: DueId,
    ) -> Result<Vec<LatePaymentPenalty>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT * FROM late_payment_penalties WHERE due_id = $1 ORDER BY recorded_at, penalty_id",
        )
        .bind(*due_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(penalty_from_row).collect()
    }
}

/// Runs the guarded update on an open connection or transaction
///
/// When no row matched, a second read tells a missing entry apart from a
/// stale version.
async fn update_versioned(
    conn: &mut PgConnection,
    entry: &DueLedgerEntry,
) -> Result<DueLedgerEntry, DatabaseError> {
    let result = bind_due(sqlx::query(UPDATE_DUE), entry)?
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        let current: Option<i64> =
            sqlx::query_scalar("SELECT version FROM due_ledger_entries WHERE due_id = $1")
                .bind(*entry.id.as_uuid())
                .fetch_optional(&mut *conn)
                .await?;

        return Err(match current {
            None => DatabaseError::not_found(DUE_ENTITY, entry.id),
            Some(actual) => DatabaseError::VersionConflict {
                entity: DUE_ENTITY,
                id: entry.id.to_string(),
                expected: entry.version,
                actual: to_version(actual)?,
            },
        });
    }

    let mut stored = entry.clone();
    stored.version += 1;
    Ok(stored)
}

async fn insert_payment(conn: &mut PgConnection, payment: &PaymentHistory) -> Result<(), DatabaseError> {
    sqlx::query(INSERT_PAYMENT)
        .bind(*payment.id.as_uuid())
        .bind(*payment.due_id.as_uuid())
        .bind(*payment.customer_id.as_uuid())
        .bind(payment.enrollment_id.map(|id| *id.as_uuid()))
        .bind(payment.amount.amount())
        .bind(payment.currency.code())
        .bind(payment.payment_date)
        .bind(payment.method.as_str())
        .bind(payment.reference.as_deref())
        .bind(payment.receipt_number.as_str())
        .bind(payment.cashier_name.as_deref())
        .bind(payment.status.as_str())
        .bind(payment.remarks.as_deref())
        .bind(payment.recorded_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_penalty(
    conn: &mut PgConnection,
    penalty: &LatePaymentPenalty,
) -> Result<(), DatabaseError> {
    sqlx::query(INSERT_PENALTY)
        .bind(*penalty.id.as_uuid())
        .bind(*penalty.due_id.as_uuid())
        .bind(*penalty.customer_id.as_uuid())
        .bind(penalty.penalty_amount.currency().code())
        .bind(penalty.penalty_amount.amount())
        .bind(penalty.delta.amount())
        .bind(penalty.penalty_date)
        .bind(penalty.days_overdue)
        .bind(penalty.weeks_charged)
        .bind(penalty.penalty_rate.as_decimal())
        .bind(penalty.is_paid)
        .bind(penalty.remarks.as_deref())
        .bind(penalty.recorded_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Binds every due column in statement order, version last
fn bind_due<'q>(
    query: Query<'q, Postgres, PgArguments>,
    entry: &'q DueLedgerEntry,
) -> Result<Query<'q, Postgres, PgArguments>, DatabaseError> {
    let installment = entry
        .installment_number
        .map(i32::try_from)
        .transpose()
        .map_err(|_| DatabaseError::bad_value("installment_number", format!("{:?}", entry.installment_number)))?;
    let version = i64::try_from(entry.version)
        .map_err(|_| DatabaseError::bad_value("version", entry.version))?;

    Ok(query
        .bind(*entry.id.as_uuid())
        .bind(*entry.customer_id.as_uuid())
        .bind(entry.enrollment_id.map(|id| *id.as_uuid()))
        .bind(installment)
        .bind(entry.category_code.as_str())
        .bind(entry.currency.code())
        .bind(entry.invoice_reference.as_deref())
        .bind(entry.invoice_date)
        .bind(entry.academic_year.as_deref())
        .bind(entry.semester.as_deref())
        .bind(entry.original_rate.amount())
        .bind(entry.gross_amount.amount())
        .bind(entry.scholarship_percentage)
        .bind(entry.scholarship_amount.amount())
        .bind(entry.scholarship_expiry_date)
        .bind(entry.discount_amount.amount())
        .bind(entry.net_payable_amount.amount())
        .bind(entry.service_charge_amount.amount())
        .bind(entry.late_penalty_rate.as_decimal())
        .bind(entry.late_penalty_amount.amount())
        .bind(entry.total_amount_with_charges.amount())
        .bind(entry.amount_paid.amount())
        .bind(entry.amount_outstanding.amount())
        .bind(entry.due_date)
        .bind(entry.paid_date)
        .bind(entry.status.as_str())
        .bind(entry.is_refundable)
        .bind(entry.is_transferable)
        .bind(entry.remarks.as_deref())
        .bind(entry.audit.lifecycle.as_str())
        .bind(entry.audit.created_at)
        .bind(entry.audit.updated_at)
        .bind(entry.audit.created_by.as_deref())
        .bind(entry.audit.updated_by.as_deref())
        .bind(version))
}

// ============================================================================
// Row decoding
// ============================================================================

pub(crate) fn currency_column(row: &PgRow, column: &str) -> Result<Currency, DatabaseError> {
    let code: String = row.try_get(column)?;
    Currency::from_code(code.trim()).ok_or_else(|| DatabaseError::bad_value(column, code))
}

pub(crate) fn money_column(
    row: &PgRow,
    column: &str,
    currency: Currency,
) -> Result<Money, DatabaseError> {
    let amount: Decimal = row.try_get(column)?;
    Ok(Money::new(amount, currency))
}

pub(crate) fn audit_columns(row: &PgRow) -> Result<AuditMetadata, DatabaseError> {
    let lifecycle: String = row.try_get("lifecycle")?;
    Ok(AuditMetadata {
        lifecycle: Lifecycle::parse(&lifecycle)
            .ok_or_else(|| DatabaseError::bad_value("lifecycle", &lifecycle))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        created_by: row.try_get("created_by")?,
        updated_by: row.try_get("updated_by")?,
    })
}

fn to_version(value: i64) -> Result<u64, DatabaseError> {
    u64::try_from(value).map_err(|_| DatabaseError::bad_value("version", value))
}

fn due_from_row(row: &PgRow) -> Result<DueLedgerEntry, DatabaseError> {
    let currency = currency_column(row, "currency")?;
    let status: String = row.try_get("status")?;
    let installment: Option<i32> = row.try_get("installment_number")?;
    let installment_number = installment
        .map(u32::try_from)
        .transpose()
        .map_err(|_| DatabaseError::bad_value("installment_number", format!("{:?}", installment)))?;

    Ok(DueLedgerEntry {
        id: DueId::from_uuid(row.try_get("due_id")?),
        version: to_version(row.try_get("version")?)?,
        customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
        enrollment_id: row
            .try_get::<Option<Uuid>, _>("enrollment_id")?
            .map(EnrollmentId::from_uuid),
        installment_number,
        category_code: row.try_get("category_code")?,
        currency,
        invoice_reference: row.try_get("invoice_reference")?,
        invoice_date: row.try_get("invoice_date")?,
        academic_year: row.try_get("academic_year")?,
        semester: row.try_get("semester")?,
        original_rate: money_column(row, "original_rate", currency)?,
        gross_amount: money_column(row, "gross_amount", currency)?,
        scholarship_percentage: row.try_get("scholarship_percentage")?,
        scholarship_amount: money_column(row, "scholarship_amount", currency)?,
        scholarship_expiry_date: row.try_get("scholarship_expiry_date")?,
        discount_amount: money_column(row, "discount_amount", currency)?,
        net_payable_amount: money_column(row, "net_payable_amount", currency)?,
        service_charge_amount: money_column(row, "service_charge_amount", currency)?,
        late_penalty_rate: Rate::new(row.try_get("late_penalty_rate")?),
        late_penalty_amount: money_column(row, "late_penalty_amount", currency)?,
        total_amount_with_charges: money_column(row, "total_amount_with_charges", currency)?,
        amount_paid: money_column(row, "amount_paid", currency)?,
        amount_outstanding: money_column(row, "amount_outstanding", currency)?,
        due_date: row.try_get("due_date")?,
        paid_date: row.try_get("paid_date")?,
        status: DueStatus::parse(&status).ok_or_else(|| DatabaseError::bad_value("status", &status))?,
        is_refundable: row.try_get("is_refundable")?,
        is_transferable: row.try_get("is_transferable")?,
        remarks: row.try_get("remarks")?,
        audit: audit_columns(row)?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<PaymentHistory, DatabaseError> {
    let currency = currency_column(row, "currency")?;
    let method: String = row.try_get("payment_method")?;
    let status: String = row.try_get("status")?;

    Ok(PaymentHistory {
        id: PaymentId::from_uuid(row.try_get("payment_id")?),
        due_id: DueId::from_uuid(row.try_get("due_id")?),
        customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
        enrollment_id: row
            .try_get::<Option<Uuid>, _>("enrollment_id")?
            .map(EnrollmentId::from_uuid),
        amount: money_column(row, "amount", currency)?,
        currency,
        payment_date: row.try_get("payment_date")?,
        method: PaymentMethod::parse(&method)
            .ok_or_else(|| DatabaseError::bad_value("payment_method", &method))?,
        reference: row.try_get("reference")?,
        receipt_number: row.try_get("receipt_number")?,
        cashier_name: row.try_get("cashier_name")?,
        status: PaymentStatus::parse(&status).ok_or_else(|| DatabaseError::bad_value("status", &status))?,
        remarks: row.try_get("remarks")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

fn penalty_from_row(row: &PgRow) -> Result<LatePaymentPenalty, DatabaseError> {
    let currency = currency_column(row, "currency")?;

    Ok(LatePaymentPenalty {
        id: PenaltyId::from_uuid(row.try_get("penalty_id")?),
        due_id: DueId::from_uuid(row.try_get("due_id")?),
        customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
        penalty_amount: money_column(row, "penalty_amount", currency)?,
        delta: money_column(row, "delta", currency)?,
        penalty_date: row.try_get("penalty_date")?,
        days_overdue: row.try_get("days_overdue")?,
        weeks_charged: row.try_get("weeks_charged")?,
        penalty_rate: Rate::new(row.try_get("penalty_rate")?),
        is_paid: row.try_get("is_paid")?,
        remarks: row.try_get("remarks")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}
