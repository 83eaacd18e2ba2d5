use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};

use crate::{
    domain::{NewPayment, Payment, PaymentStatus, SessionGuard},
    error::{AppError, Result},
    repository::{
        therapy_session_repository::{session_payment_status_to_str, session_status_to_str},
        PaymentRepository, Settlement,
    },
};

#[derive(FromRow)]
struct PaymentRow {
    id: i64,
    user_id: i64,
    payment_intent_id: String,
    amount_cents: i64,
    currency: String,
    description: Option<String>,
    session_id: Option<i64>,
    status: String,
    charge_id: Option<String>,
    refunded_amount_cents: Option<i64>,
    failure_reason: Option<String>,
    metadata: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        let metadata: HashMap<String, String> = serde_json::from_str(&row.metadata)
            .map_err(|e| AppError::Database(format!("Invalid payment metadata: {}", e)))?;

        Ok(Payment {
            id: row.id,
            user_id: row.user_id,
            payment_intent_id: row.payment_intent_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            description: row.description,
            session_id: row.session_id,
            status: Self::parse_payment_status(&row.status)?,
            charge_id: row.charge_id,
            refunded_amount_cents: row.refunded_amount_cents,
            failure_reason: row.failure_reason,
            metadata,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_payment_status(s: &str) -> Result<PaymentStatus> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "partially_refunded" => Ok(PaymentStatus::PartiallyRefunded),
            _ => Err(AppError::Database(format!("Invalid payment status: {}", s))),
        }
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: NewPayment) -> Result<Payment> {
        let metadata = serde_json::to_string(&payment.metadata)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let now = Utc::now().naive_utc();

        let id = sqlx::query(
            r#"
            INSERT INTO payments (
                user_id, payment_intent_id, amount_cents, currency, description,
                session_id, status, metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(payment.user_id)
        .bind(&payment.payment_intent_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(&payment.description)
        .bind(payment.session_id)
        .bind(PaymentStatus::Pending.as_str())
        .bind(&metadata)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created payment".to_string())
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, user_id, payment_intent_id, amount_cents, currency, description,
                   session_id, status, charge_id, refunded_amount_cents, failure_reason,
                   metadata, created_at, updated_at
            FROM payments
            WHERE id = ?
            "#
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_by_intent_id(&self, payment_intent_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, user_id, payment_intent_id, amount_cents, currency, description,
                   session_id, status, charge_id, refunded_amount_cents, failure_reason,
                   metadata, created_at, updated_at
            FROM payments
            WHERE payment_intent_id = ?
            "#
        )
        .bind(payment_intent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, user_id, payment_intent_id, amount_cents, currency, description,
                   session_id, status, charge_id, refunded_amount_cents, failure_reason,
                   metadata, created_at, updated_at
            FROM payments
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(Self::row_to_payment)
            .collect()
    }

    async fn settle(&self, settlement: Settlement) -> Result<Option<Payment>> {
        let now = Utc::now().naive_utc();
        let mut tx = self.pool.begin().await?;

        // Optional columns keep their previous value when not supplied.
        // Refund totals only ever grow.
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?,
                charge_id = COALESCE(?, charge_id),
                failure_reason = COALESCE(?, failure_reason),
                refunded_amount_cents = COALESCE(?, refunded_amount_cents),
                updated_at = ?
            WHERE id = ?
              AND status = ?
              AND (? IS NULL OR refunded_amount_cents IS NULL OR refunded_amount_cents < ?)
            "#
        )
        .bind(settlement.status.as_str())
        .bind(&settlement.charge_id)
        .bind(&settlement.failure_reason)
        .bind(settlement.refunded_amount_cents)
        .bind(now)
        .bind(settlement.payment_id)
        .bind(settlement.expected_status.as_str())
        .bind(settlement.refunded_amount_cents)
        .bind(settlement.refunded_amount_cents)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM payments WHERE id = ?")
                .bind(settlement.payment_id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();

            if !exists {
                return Err(AppError::NotFound(format!(
                    "Payment {} not found",
                    settlement.payment_id
                )));
            }
            return Ok(None);
        }

        if let Some(change) = &settlement.session {
            let (guard_sql, guard_status) = match change.guard {
                SessionGuard::StatusIs(status) => ("status = ?", status),
                SessionGuard::StatusIsNot(status) => ("status != ?", status),
            };

            let query = format!(
                r#"
                UPDATE therapy_sessions
                SET status = ?,
                    payment_status = ?,
                    cancellation_reason = COALESCE(?, cancellation_reason),
                    updated_at = ?
                WHERE id = ? AND {}
                "#,
                guard_sql
            );

            let updated = sqlx::query(&query)
                .bind(session_status_to_str(&change.status))
                .bind(session_payment_status_to_str(&change.payment_status))
                .bind(&change.cancellation_reason)
                .bind(now)
                .bind(change.session_id)
                .bind(session_status_to_str(&guard_status))
                .execute(&mut *tx)
                .await?;

            if updated.rows_affected() == 0 {
                tracing::debug!(
                    "Session {} no longer matches {:?}, left unchanged",
                    change.session_id, change.guard
                );
            }
        }

        tx.commit().await?;

        self.find_by_id(settlement.payment_id).await?
            .map(Some)
            .ok_or_else(|| AppError::Database("Failed to retrieve settled payment".to_string()))
    }
}
