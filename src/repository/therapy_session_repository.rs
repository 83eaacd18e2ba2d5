use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};

use crate::{
    domain::{NewTherapySession, SessionPaymentStatus, SessionStatus, TherapySession},
    error::{AppError, Result},
    repository::TherapySessionRepository,
};

#[derive(FromRow)]
struct TherapySessionRow {
    id: i64,
    patient_id: i64,
    therapist_name: Option<String>,
    scheduled_at: NaiveDateTime,
    duration_minutes: i64,
    status: String,
    payment_status: String,
    cancellation_reason: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteTherapySessionRepository {
    pool: SqlitePool,
}

impl SqliteTherapySessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_session(row: TherapySessionRow) -> Result<TherapySession> {
        Ok(TherapySession {
            id: row.id,
            patient_id: row.patient_id,
            therapist_name: row.therapist_name,
            scheduled_at: DateTime::from_naive_utc_and_offset(row.scheduled_at, Utc),
            duration_minutes: row.duration_minutes,
            status: parse_session_status(&row.status)?,
            payment_status: parse_session_payment_status(&row.payment_status)?,
            cancellation_reason: row.cancellation_reason,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }
}

fn parse_session_status(s: &str) -> Result<SessionStatus> {
    match s {
        "scheduled" => Ok(SessionStatus::Scheduled),
        "pending_payment" => Ok(SessionStatus::PendingPayment),
        "confirmed" => Ok(SessionStatus::Confirmed),
        "payment_failed" => Ok(SessionStatus::PaymentFailed),
        "cancelled" => Ok(SessionStatus::Cancelled),
        "completed" => Ok(SessionStatus::Completed),
        _ => Err(AppError::Database(format!("Invalid session status: {}", s))),
    }
}

pub(crate) fn session_status_to_str(status: &SessionStatus) -> &'static str {
    match status {
        SessionStatus::Scheduled => "scheduled",
        SessionStatus::PendingPayment => "pending_payment",
        SessionStatus::Confirmed => "confirmed",
        SessionStatus::PaymentFailed => "payment_failed",
        SessionStatus::Cancelled => "cancelled",
        SessionStatus::Completed => "completed",
    }
}

fn parse_session_payment_status(s: &str) -> Result<SessionPaymentStatus> {
    match s {
        "unpaid" => Ok(SessionPaymentStatus::Unpaid),
        "paid" => Ok(SessionPaymentStatus::Paid),
        "failed" => Ok(SessionPaymentStatus::Failed),
        "refunded" => Ok(SessionPaymentStatus::Refunded),
        _ => Err(AppError::Database(format!("Invalid session payment status: {}", s))),
    }
}

pub(crate) fn session_payment_status_to_str(status: &SessionPaymentStatus) -> &'static str {
    match status {
        SessionPaymentStatus::Unpaid => "unpaid",
        SessionPaymentStatus::Paid => "paid",
        SessionPaymentStatus::Failed => "failed",
        SessionPaymentStatus::Refunded => "refunded",
    }
}

#[async_trait]
impl TherapySessionRepository for SqliteTherapySessionRepository {
    async fn create(&self, session: NewTherapySession) -> Result<TherapySession> {
        let now = Utc::now().naive_utc();

        let id = sqlx::query(
            r#"
            INSERT INTO therapy_sessions (
                patient_id, therapist_name, scheduled_at, duration_minutes,
                status, payment_status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(session.patient_id)
        .bind(&session.therapist_name)
        .bind(session.scheduled_at.naive_utc())
        .bind(session.duration_minutes)
        .bind(session_status_to_str(&session.status))
        .bind(session_payment_status_to_str(&SessionPaymentStatus::Unpaid))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created session".to_string())
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<TherapySession>> {
        let row = sqlx::query_as::<_, TherapySessionRow>(
            r#"
            SELECT id, patient_id, therapist_name, scheduled_at, duration_minutes,
                   status, payment_status, cancellation_reason, created_at, updated_at
            FROM therapy_sessions
            WHERE id = ?
            "#
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_session).transpose()
    }

    async fn list_by_patient(&self, patient_id: i64) -> Result<Vec<TherapySession>> {
        let rows = sqlx::query_as::<_, TherapySessionRow>(
            r#"
            SELECT id, patient_id, therapist_name, scheduled_at, duration_minutes,
                   status, payment_status, cancellation_reason, created_at, updated_at
            FROM therapy_sessions
            WHERE patient_id = ?
            ORDER BY scheduled_at ASC
            "#
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(Self::row_to_session)
            .collect()
    }
}
