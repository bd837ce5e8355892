//! Reconciliation engine.
//!
//! Applies state transitions to orders through an optimistic-concurrency
//! read-check-write loop. The `version` check on every write is the
//! system's sole correctness mechanism: callbacks for the same order may
//! race across handlers or across instances, and the loser of a CAS race
//! simply re-reads and re-checks. A duplicate confirmation re-reads a
//! `Paid` order and resolves to a no-op before ever writing, so each
//! `(order_no, transaction)` pair produces at most one transition.
//!
//! Membership activation runs synchronously inside the first transition to
//! `Paid`. If activation fails, the paid order stays paid (the money has
//! moved); the failure is logged and can be retried via
//! [`ReconciliationEngine::retry_activation`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::order::{
    Order, OrderNo, PaymentError, PaymentMethod, TransitionEffect, TransitionTarget,
};
use crate::ports::{CasOutcome, OrderStore};

use super::activation::{ActivationOutcome, MembershipActivator};

/// How a `Paid` transition was verified.
///
/// Only verified evidence reaches the engine; the ingestion layer has
/// already checked the signature (callback) or queried the provider over
/// an authenticated channel (status query).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidEvidence {
    VerifiedCallback { provider: PaymentMethod },
    VerifiedQuery { provider: PaymentMethod },
}

/// Activation result attached to a successful `Paid` transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationStatus {
    Granted,
    AlreadyGranted,

    /// Activation failed after the order durably became paid. Recorded for
    /// independent retry; never reverts the order.
    Failed(String),
}

/// Result of a transition request.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// The order as stored after the request.
    pub order: Order,

    pub effect: TransitionEffect,

    /// Present only when this request newly reached `Paid`.
    pub activation: Option<ActivationStatus>,
}

/// Bounded retry with exponential backoff for CAS races.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Applies transition requests to orders exactly once.
pub struct ReconciliationEngine {
    orders: Arc<dyn OrderStore>,
    activator: MembershipActivator,
    policy: RetryPolicy,
}

impl ReconciliationEngine {
    pub fn new(orders: Arc<dyn OrderStore>, activator: MembershipActivator) -> Self {
        Self {
            orders,
            activator,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply a verified payment confirmation.
    ///
    /// The first confirmation transitions the order to `Paid` and activates
    /// the membership; duplicates are success no-ops that do not
    /// re-activate.
    pub async fn confirm_paid(
        &self,
        order_no: &OrderNo,
        transaction_id: &str,
        evidence: PaidEvidence,
    ) -> Result<ReconcileOutcome, PaymentError> {
        let (order, effect) = self
            .transition(
                order_no,
                TransitionTarget::Paid {
                    transaction_id: transaction_id.to_string(),
                },
            )
            .await?;

        match effect {
            TransitionEffect::Applied => {
                tracing::info!(
                    order_no = %order_no,
                    transaction_id,
                    ?evidence,
                    "order confirmed paid"
                );
                let activation = self.try_activate(&order).await;
                Ok(ReconcileOutcome {
                    order,
                    effect,
                    activation: Some(activation),
                })
            }
            TransitionEffect::AlreadyApplied => {
                tracing::debug!(
                    order_no = %order_no,
                    transaction_id,
                    "duplicate payment confirmation ignored"
                );
                Ok(ReconcileOutcome {
                    order,
                    effect,
                    activation: None,
                })
            }
        }
    }

    /// Record a client's out-of-band "I paid" claim.
    ///
    /// Never activates membership; the order waits for a verified
    /// confirmation.
    pub async fn claim_paid(&self, order_no: &OrderNo) -> Result<ReconcileOutcome, PaymentError> {
        let (order, effect) = self
            .transition(order_no, TransitionTarget::AwaitingConfirmation)
            .await?;
        Ok(ReconcileOutcome {
            order,
            effect,
            activation: None,
        })
    }

    /// Record a gateway-reported failure or expiry.
    pub async fn note_failed(&self, order_no: &OrderNo) -> Result<ReconcileOutcome, PaymentError> {
        let (order, effect) = self.transition(order_no, TransitionTarget::Failed).await?;
        Ok(ReconcileOutcome {
            order,
            effect,
            activation: None,
        })
    }

    /// Refund a paid order.
    ///
    /// Does not revoke the membership; that policy belongs to the caller.
    pub async fn refund(&self, order_no: &OrderNo) -> Result<ReconcileOutcome, PaymentError> {
        let (order, effect) = self.transition(order_no, TransitionTarget::Refunded).await?;
        Ok(ReconcileOutcome {
            order,
            effect,
            activation: None,
        })
    }

    /// Re-run activation for an order that paid but failed to activate.
    pub async fn retry_activation(
        &self,
        order_no: &OrderNo,
    ) -> Result<ActivationStatus, PaymentError> {
        let order = self
            .orders
            .get(order_no)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_no.clone()))?;

        Ok(self.try_activate(&order).await)
    }

    async fn try_activate(&self, order: &Order) -> ActivationStatus {
        match self.activator.activate(order).await {
            Ok(ActivationOutcome::Granted(_)) => ActivationStatus::Granted,
            Ok(ActivationOutcome::AlreadyGranted) => ActivationStatus::AlreadyGranted,
            Err(err) => {
                // The order transition is already durable; never unwind it.
                tracing::error!(
                    order_no = %order.order_no,
                    error = %err,
                    "membership activation failed; order stays paid, retry independently"
                );
                ActivationStatus::Failed(err.to_string())
            }
        }
    }

    /// Read-check-write cycle with bounded CAS retries.
    async fn transition(
        &self,
        order_no: &OrderNo,
        target: TransitionTarget,
    ) -> Result<(Order, TransitionEffect), PaymentError> {
        for attempt in 0..self.policy.max_attempts {
            let order = self
                .orders
                .get(order_no)
                .await?
                .ok_or_else(|| PaymentError::OrderNotFound(order_no.clone()))?;

            let mut next = order.clone();
            let effect = next.apply_transition(target.clone(), Utc::now())?;

            if effect == TransitionEffect::AlreadyApplied {
                return Ok((order, effect));
            }

            next.version = order.version + 1;
            match self
                .orders
                .compare_and_swap(order.version, next.clone())
                .await?
            {
                CasOutcome::Swapped => return Ok((next, effect)),
                CasOutcome::VersionMismatch => {
                    tracing::debug!(
                        order_no = %order_no,
                        attempt,
                        "version conflict, retrying transition"
                    );
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                }
            }
        }

        Err(PaymentError::Conflict {
            order_no: order_no.clone(),
            attempts: self.policy.max_attempts,
        })
    }
}
