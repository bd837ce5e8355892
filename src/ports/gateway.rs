//! Payment gateway port.
//!
//! One capability interface per external provider, selected by
//! [`PaymentMethod`]. Adapters talk to the provider network and translate
//! wire formats; they never touch the order store, so verification and
//! persistence stay independently testable.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::order::{OrderNo, PaymentError, PaymentMethod};
use crate::domain::signing::ParamMap;

/// Errors from gateway operations.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Timeout, connection failure, or non-2xx response. The outcome of the
    /// attempted operation is unknown; retryable with backoff.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The provider answered but rejected the request at the business
    /// level (bad merchant config, closed order, etc.). Not retryable.
    #[error("Gateway rejected request: {0}")]
    Rejected(String),

    /// Callback payload could not be decoded into the provider's schema.
    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    /// The provider has no endpoint for this operation.
    #[error("Not supported: {0}")]
    NotSupported(&'static str),

    /// Signing failed (bad key material).
    #[error("Signing error: {0}")]
    Signing(String),
}

impl From<GatewayError> for PaymentError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(msg) => PaymentError::GatewayUnavailable(msg),
            GatewayError::Rejected(msg) => PaymentError::GatewayRejected(msg),
            GatewayError::MalformedCallback(msg) => PaymentError::MalformedCallback(msg),
            GatewayError::NotSupported(what) => PaymentError::GatewayNotSupported(what),
            GatewayError::Signing(msg) => PaymentError::GatewayRejected(msg),
        }
    }
}

/// Request to open a payment with a provider.
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub order_no: OrderNo,

    /// Amount in minor units; adapters convert to the provider's unit.
    pub amount_minor: u64,

    /// Human-readable subject shown on the provider's payment page.
    pub description: String,

    /// Where the provider should deliver the asynchronous callback.
    pub notify_url: String,

    /// Where the provider should send the payer's browser afterwards.
    pub return_url: Option<String>,
}

/// What the client needs to complete payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentInstructions {
    /// Send the payer's browser to this URL.
    Redirect { url: String },

    /// Render this content as a QR code for the payer to scan.
    QrCode { content: String },
}

/// Successful payment creation.
#[derive(Debug, Clone)]
pub struct PaymentCreated {
    pub instructions: PaymentInstructions,

    /// Provider-side reference, when the provider returns one at creation.
    pub provider_ref: Option<String>,
}

/// Result claimed by a callback, before any verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimedResult {
    Success,
    Failure,
}

/// A parsed (but not yet verified) provider callback.
#[derive(Debug, Clone)]
pub struct CallbackNotice {
    pub provider: PaymentMethod,
    pub order_no: OrderNo,
    pub claimed_transaction_id: String,
    pub claimed_result: ClaimedResult,

    /// Full canonical parameter set, kept for signature verification.
    pub params: ParamMap,
}

/// Provider-reported order status from a synchronous query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOrderStatus {
    Paid { transaction_id: String },
    Pending,
    Failed,
}

/// Acknowledgement body a provider expects from our webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackAck {
    pub body: String,
    pub content_type: &'static str,
}

impl CallbackAck {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: "text/plain; charset=utf-8",
        }
    }

    pub fn xml(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: "text/xml; charset=utf-8",
        }
    }
}

/// Capability interface implemented once per provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// The provider this adapter speaks for.
    fn method(&self) -> PaymentMethod;

    /// Open a payment with the provider.
    ///
    /// # Errors
    ///
    /// - `Unavailable` on timeout or transport failure; the caller must not
    ///   assume the order was charged
    /// - `Rejected` when the provider refuses the request
    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<PaymentCreated, GatewayError>;

    /// Decode a raw callback body into a [`CallbackNotice`].
    ///
    /// Decoding performs no authentication; callers must pass the notice to
    /// [`PaymentGateway::verify_callback`] before acting on it.
    fn parse_callback(&self, raw: &[u8]) -> Result<CallbackNotice, GatewayError>;

    /// Verify the authentication tag carried by a parsed callback.
    fn verify_callback(&self, notice: &CallbackNotice) -> bool;

    /// Query the provider for an order's current status.
    ///
    /// Providers without a query endpoint return
    /// `GatewayError::NotSupported` rather than guessing.
    async fn query_status(&self, order_no: &OrderNo) -> Result<GatewayOrderStatus, GatewayError>;

    /// Acknowledgement telling the provider to stop redelivering.
    fn ack_success(&self) -> CallbackAck;

    /// Acknowledgement asking the provider to redeliver later.
    fn ack_failure(&self) -> CallbackAck;
}

/// Provider-keyed table of gateway adapters.
///
/// Replaces per-provider client singletons with one lookup point injected
/// at process start.
#[derive(Default)]
pub struct GatewayRegistry {
    gateways: std::collections::HashMap<PaymentMethod, std::sync::Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own method key.
    pub fn register(mut self, gateway: std::sync::Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.method(), gateway);
        self
    }

    /// Look up the adapter for a method.
    ///
    /// # Errors
    ///
    /// - `MethodNotConfigured` when the method has no registered adapter
    pub fn get(
        &self,
        method: PaymentMethod,
    ) -> Result<&std::sync::Arc<dyn PaymentGateway>, PaymentError> {
        self.gateways
            .get(&method)
            .ok_or(PaymentError::MethodNotConfigured(method))
    }

    /// Methods with a registered adapter.
    pub fn methods(&self) -> Vec<PaymentMethod> {
        self.gateways.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_gateway_is_object_safe() {
        fn _accepts_dyn(_gateway: &dyn PaymentGateway) {}
    }

    #[test]
    fn empty_registry_reports_method_not_configured() {
        let registry = GatewayRegistry::new();
        let result = registry.get(PaymentMethod::Alipay);
        assert!(matches!(
            result,
            Err(PaymentError::MethodNotConfigured(PaymentMethod::Alipay))
        ));
    }

    #[test]
    fn gateway_errors_map_to_payment_errors() {
        let err: PaymentError = GatewayError::Unavailable("timeout".into()).into();
        assert!(matches!(err, PaymentError::GatewayUnavailable(_)));

        let err: PaymentError = GatewayError::MalformedCallback("bad form".into()).into();
        assert!(matches!(err, PaymentError::MalformedCallback(_)));

        let err: PaymentError = GatewayError::NotSupported("status query").into();
        assert!(matches!(err, PaymentError::GatewayNotSupported(_)));
    }
}
