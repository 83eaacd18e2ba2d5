use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub payment_intent_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub description: Option<String>,
    pub session_id: Option<i64>,
    pub status: PaymentStatus,
    pub charge_id: Option<String>,
    pub refunded_amount_cents: Option<i64>,
    pub failure_reason: Option<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
}

/// Outcome of checking a status change against the payment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply,
    /// Same state, nothing new to write.
    Replay,
    Reject,
}

impl PaymentStatus {
    /// Lifecycle guard applied before any webhook writes.
    ///
    /// Nothing returns to `Pending`. A refund may land on a pending record
    /// because it proves the charge went through; once refunded, a late
    /// success notification is stale and rejected.
    pub fn transition_to(self, next: PaymentStatus) -> Transition {
        use PaymentStatus::*;

        match (self, next) {
            (Completed, Completed) | (Refunded, Refunded) => Transition::Replay,
            (Pending, Completed | Failed | Refunded | PartiallyRefunded) => Transition::Apply,
            (Failed, Completed | Failed) => Transition::Apply,
            (Completed, Refunded | PartiallyRefunded) => Transition::Apply,
            (PartiallyRefunded, Refunded | PartiallyRefunded) => Transition::Apply,
            _ => Transition::Reject,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
        }
    }
}

/// Largest single charge the processor accepts, in minor units.
pub const MAX_AMOUNT_CENTS: i64 = 99_999_999;

impl Payment {
    /// Checks a webhook settlement against this record. Refund totals on
    /// charge events are cumulative, so one that does not raise the stored
    /// total is older than what is already recorded.
    pub fn settlement_transition(
        &self,
        next: PaymentStatus,
        refunded_amount_cents: Option<i64>,
    ) -> Transition {
        let transition = self.status.transition_to(next);
        if transition != Transition::Apply {
            return transition;
        }

        match (self.refunded_amount_cents, refunded_amount_cents) {
            (Some(stored), Some(incoming)) if incoming == stored => Transition::Replay,
            (Some(stored), Some(incoming)) if incoming < stored => Transition::Reject,
            _ => Transition::Apply,
        }
    }

    pub fn amount(&self) -> f64 {
        self.amount_cents as f64 / 100.0
    }

    pub fn refunded_amount(&self) -> Option<f64> {
        self.refunded_amount_cents.map(|cents| cents as f64 / 100.0)
    }
}

/// Fields needed to open a local record for a freshly created intent.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: i64,
    pub payment_intent_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub description: Option<String>,
    pub session_id: Option<i64>,
    pub metadata: HashMap<String, String>,
}

/// Converts a decimal amount in currency units to minor units.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}
