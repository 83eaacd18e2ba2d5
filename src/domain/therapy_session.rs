use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled therapy session. Owned by the scheduling side of the app;
/// payments only move its status along when money changes hands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TherapySession {
    pub id: i64,
    pub patient_id: i64,
    pub therapist_name: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: SessionStatus,
    pub payment_status: SessionPaymentStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    PendingPayment,
    Confirmed,
    PaymentFailed,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Unpaid,
    Paid,
    Failed,
    Refunded,
}

#[derive(Debug, Clone)]
pub struct NewTherapySession {
    pub patient_id: i64,
    pub therapist_name: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: SessionStatus,
}

/// Condition the stored session must still meet when the change is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionGuard {
    StatusIs(SessionStatus),
    StatusIsNot(SessionStatus),
}

/// Write to apply to a session alongside a payment update.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionChange {
    pub session_id: i64,
    pub status: SessionStatus,
    pub payment_status: SessionPaymentStatus,
    pub cancellation_reason: Option<String>,
    pub guard: SessionGuard,
}

pub const REFUND_CANCELLATION_REASON: &str = "Payment refunded";

impl TherapySession {
    pub fn on_payment_succeeded(&self) -> Option<SessionChange> {
        (self.status == SessionStatus::PendingPayment).then(|| SessionChange {
            session_id: self.id,
            status: SessionStatus::Confirmed,
            payment_status: SessionPaymentStatus::Paid,
            cancellation_reason: None,
            guard: SessionGuard::StatusIs(SessionStatus::PendingPayment),
        })
    }

    pub fn on_payment_failed(&self) -> Option<SessionChange> {
        (self.status == SessionStatus::PendingPayment).then(|| SessionChange {
            session_id: self.id,
            status: SessionStatus::PaymentFailed,
            payment_status: SessionPaymentStatus::Failed,
            cancellation_reason: None,
            guard: SessionGuard::StatusIs(SessionStatus::PendingPayment),
        })
    }

    /// Only a full refund cancels the session.
    pub fn on_refund(&self, full: bool) -> Option<SessionChange> {
        if !full || self.status == SessionStatus::Cancelled {
            return None;
        }
        Some(SessionChange {
            session_id: self.id,
            status: SessionStatus::Cancelled,
            payment_status: SessionPaymentStatus::Refunded,
            cancellation_reason: Some(REFUND_CANCELLATION_REASON.to_string()),
            guard: SessionGuard::StatusIsNot(SessionStatus::Cancelled),
        })
    }
}

/// Trimmed view of a session embedded in payment responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: SessionStatus,
    pub payment_status: SessionPaymentStatus,
    pub therapist_name: Option<String>,
}

impl From<TherapySession> for SessionSummary {
    fn from(session: TherapySession) -> Self {
        Self {
            id: session.id,
            scheduled_at: session.scheduled_at,
            duration_minutes: session.duration_minutes,
            status: session.status,
            payment_status: session.payment_status,
            therapist_name: session.therapist_name,
        }
    }
}
