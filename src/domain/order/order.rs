//! The Order aggregate.
//!
//! An order is created `Pending`, mutated only through
//! [`Order::apply_transition`], and never deleted. Every persisted write is
//! conditioned on the `version` read by the writer (optimistic concurrency);
//! the aggregate itself never decreases `version`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PaymentError, Plan};

/// Globally unique, client-visible order number.
///
/// Format: `ORDER<yyyymmddhhmmss><8 uppercase hex chars>`. Immutable and
/// never reused; doubles as the idempotency key for membership activation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNo(String);

impl OrderNo {
    /// Generate a fresh order number from the current time plus a random
    /// suffix.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        OrderNo(format!("ORDER{}{}", now.format("%Y%m%d%H%M%S"), suffix))
    }

    /// Wrap an externally supplied order number (e.g. from a callback).
    pub fn from_string(s: impl Into<String>) -> Self {
        OrderNo(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to the owning account.
///
/// This core never interprets or joins on the underlying identifier; the
/// account service that mints it is the single source of truth for identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRef(String);

impl UserRef {
    pub fn new(s: impl Into<String>) -> Self {
        UserRef(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payment gateway selection for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Direct wallet gateway, query-string transport, asymmetric signatures.
    Alipay,

    /// Direct wallet gateway, XML transport, sorted-key digest signatures.
    Wechat,

    /// Aggregator gateway, form transport, sorted-key digest signatures.
    Epay,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Alipay => "alipay",
            PaymentMethod::Wechat => "wechat",
            PaymentMethod::Epay => "epay",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alipay" => Ok(PaymentMethod::Alipay),
            "wechat" => Ok(PaymentMethod::Wechat),
            "epay" => Ok(PaymentMethod::Epay),
            other => Err(PaymentError::UnknownPaymentMethod(other.to_string())),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order lifecycle states.
///
/// Transitions only move forward through the table enforced by
/// [`Order::apply_transition`]; `Paid`, `Failed` and `Refunded` are terminal
/// except for `Paid -> Refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, awaiting payment.
    Pending,

    /// Client claims to have paid out-of-band; awaiting verification.
    AwaitingConfirmation,

    /// Gateway-verified payment received.
    Paid,

    /// Gateway reported failure, or the order expired unpaid.
    Failed,

    /// Explicitly refunded after payment.
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::AwaitingConfirmation => "awaiting_confirmation",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested target state for a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionTarget {
    /// Client-initiated "I paid" signal. Never triggers activation.
    AwaitingConfirmation,

    /// Verified payment confirmation carrying the gateway transaction id.
    Paid { transaction_id: String },

    /// Gateway-reported failure or expiry.
    Failed,

    /// Explicit refund of a paid order.
    Refunded,
}

impl TransitionTarget {
    fn name(&self) -> &'static str {
        match self {
            TransitionTarget::AwaitingConfirmation => "awaiting_confirmation",
            TransitionTarget::Paid { .. } => "paid",
            TransitionTarget::Failed => "failed",
            TransitionTarget::Refunded => "refunded",
        }
    }
}

/// Outcome of applying a transition to the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    /// The order changed state; the caller must persist it.
    Applied,

    /// The order was already in the target state. Nothing changed and
    /// nothing needs persisting. Duplicate `Paid` confirmations land here.
    AlreadyApplied,
}

/// A purchase order for a membership plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_no: OrderNo,
    pub user_ref: UserRef,
    pub plan: Plan,

    /// Amount due, in minor currency units.
    pub amount_minor: u64,

    pub payment_method: PaymentMethod,
    pub status: OrderStatus,

    /// Gateway-side transaction id, set once on the first verified
    /// confirmation and never overwritten.
    pub gateway_transaction_id: Option<String>,

    /// Monotonic version for optimistic concurrency control.
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a new `Pending` order for the given plan.
    pub fn create(
        user_ref: UserRef,
        plan: Plan,
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Order {
            order_no: OrderNo::generate(now),
            user_ref,
            plan,
            amount_minor: plan.price_minor(),
            payment_method,
            status: OrderStatus::Pending,
            gateway_transaction_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
            paid_at: None,
        }
    }

    /// Apply a state transition in place.
    ///
    /// Returns [`TransitionEffect::Applied`] when the order changed,
    /// [`TransitionEffect::AlreadyApplied`] when the order was already in the
    /// target state (the idempotent no-op path), and
    /// [`PaymentError::InvalidTransition`] for any edge outside the
    /// transition table. On error the order is left untouched.
    pub fn apply_transition(
        &mut self,
        target: TransitionTarget,
        now: DateTime<Utc>,
    ) -> Result<TransitionEffect, PaymentError> {
        use OrderStatus::*;

        match (&self.status, &target) {
            // Client "I paid" signal.
            (Pending, TransitionTarget::AwaitingConfirmation) => {
                self.status = AwaitingConfirmation;
                self.updated_at = now;
                Ok(TransitionEffect::Applied)
            }
            (AwaitingConfirmation, TransitionTarget::AwaitingConfirmation) => {
                Ok(TransitionEffect::AlreadyApplied)
            }

            // Verified confirmation, the only path into Paid.
            (Pending, TransitionTarget::Paid { transaction_id })
            | (AwaitingConfirmation, TransitionTarget::Paid { transaction_id }) => {
                self.status = Paid;
                self.gateway_transaction_id = Some(transaction_id.clone());
                self.paid_at = Some(now);
                self.updated_at = now;
                Ok(TransitionEffect::Applied)
            }
            (Paid, TransitionTarget::Paid { .. }) => Ok(TransitionEffect::AlreadyApplied),

            // Gateway-reported failure or expiry.
            (Pending, TransitionTarget::Failed)
            | (AwaitingConfirmation, TransitionTarget::Failed) => {
                self.status = Failed;
                self.updated_at = now;
                Ok(TransitionEffect::Applied)
            }
            (Failed, TransitionTarget::Failed) => Ok(TransitionEffect::AlreadyApplied),

            // Refunds only ever leave Paid.
            (Paid, TransitionTarget::Refunded) => {
                self.status = Refunded;
                self.updated_at = now;
                Ok(TransitionEffect::Applied)
            }
            (Refunded, TransitionTarget::Refunded) => Ok(TransitionEffect::AlreadyApplied),

            (from, target) => Err(PaymentError::InvalidTransition {
                from: *from,
                target: target.name(),
            }),
        }
    }
}
