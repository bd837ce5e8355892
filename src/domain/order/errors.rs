//! Error taxonomy for the payment core.
//!
//! One enum covers the whole reconciliation surface, with retryability
//! semantics and HTTP status mapping for the client-facing endpoints.
//! Webhook endpoints do not use the status mapping: they always answer in
//! the provider's acknowledgement format.

use axum::http::StatusCode;
use thiserror::Error;

use super::order::{OrderNo, OrderStatus, PaymentMethod};

/// Errors that occur while creating, confirming, or reconciling orders.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// Callback authentication tag did not verify.
    #[error("Invalid signature from {provider}")]
    SignatureInvalid { provider: PaymentMethod },

    /// Callback payload could not be parsed. Not retryable from our side;
    /// the provider is acked failure and may redeliver corrected data.
    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    /// Gateway timed out or answered non-2xx. The operation outcome is
    /// unknown; callers must not assume a charge happened.
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Gateway accepted the request but rejected it at the business level.
    #[error("Gateway rejected request: {0}")]
    GatewayRejected(String),

    /// The provider does not support the requested operation.
    #[error("Operation not supported by gateway: {0}")]
    GatewayNotSupported(&'static str),

    /// Transition attempt outside the state machine's table.
    #[error("Invalid transition from {from} to {target}")]
    InvalidTransition {
        from: OrderStatus,
        target: &'static str,
    },

    /// Optimistic-concurrency retries exhausted; the caller can re-queue.
    #[error("Conflict updating order {order_no} after {attempts} attempts")]
    Conflict { order_no: OrderNo, attempts: u32 },

    /// Membership activation failed after the order durably became paid.
    /// The order stays `Paid`; activation is retried independently.
    #[error("Membership activation failed: {0}")]
    ActivationFailed(String),

    #[error("Order {0} not found")]
    OrderNotFound(OrderNo),

    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),

    /// The method is valid but no gateway is configured for it.
    #[error("No gateway configured for {0}")]
    MethodNotConfigured(PaymentMethod),

    /// Persistence failure in the order or membership store.
    #[error("Store error: {0}")]
    Store(String),
}

impl PaymentError {
    /// Whether the caller may retry the failed operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::GatewayUnavailable(_)
                | PaymentError::Conflict { .. }
                | PaymentError::ActivationFailed(_)
                | PaymentError::Store(_)
        )
    }

    /// HTTP status for client-facing endpoints.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::SignatureInvalid { .. } => StatusCode::UNAUTHORIZED,

            PaymentError::MalformedCallback(_)
            | PaymentError::UnknownPlan(_)
            | PaymentError::UnknownPaymentMethod(_) => StatusCode::BAD_REQUEST,

            PaymentError::OrderNotFound(_) => StatusCode::NOT_FOUND,

            PaymentError::InvalidTransition { .. } => StatusCode::CONFLICT,
            PaymentError::Conflict { .. } => StatusCode::CONFLICT,

            PaymentError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            PaymentError::GatewayRejected(_) => StatusCode::BAD_GATEWAY,
            PaymentError::GatewayNotSupported(_) => StatusCode::NOT_IMPLEMENTED,
            PaymentError::MethodNotConfigured(_) => StatusCode::NOT_IMPLEMENTED,

            PaymentError::ActivationFailed(_) | PaymentError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::SignatureInvalid { .. } => "SIGNATURE_INVALID",
            PaymentError::MalformedCallback(_) => "MALFORMED_CALLBACK",
            PaymentError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            PaymentError::GatewayRejected(_) => "GATEWAY_REJECTED",
            PaymentError::GatewayNotSupported(_) => "GATEWAY_NOT_SUPPORTED",
            PaymentError::InvalidTransition { .. } => "INVALID_TRANSITION",
            PaymentError::Conflict { .. } => "CONFLICT",
            PaymentError::ActivationFailed(_) => "ACTIVATION_FAILED",
            PaymentError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            PaymentError::UnknownPlan(_) => "UNKNOWN_PLAN",
            PaymentError::UnknownPaymentMethod(_) => "UNKNOWN_PAYMENT_METHOD",
            PaymentError::MethodNotConfigured(_) => "METHOD_NOT_CONFIGURED",
            PaymentError::Store(_) => "STORE_ERROR",
        }
    }
}
