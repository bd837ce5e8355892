//! Request and response DTOs for the payment API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::{Order, Plan};
use crate::ports::{PaymentCreated, PaymentInstructions};

/// Body for `POST /api/payment/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub user_ref: String,
    pub plan: String,
    pub payment_method: String,
}

/// Query for `GET /api/payment/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListOrdersQuery {
    pub user_ref: String,
}

/// An order as exposed to clients.
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub order_no: String,
    pub user_ref: String,
    pub plan: String,
    pub amount_minor: u64,
    pub payment_method: String,
    pub status: String,
    pub gateway_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_no: order.order_no.as_str().to_string(),
            user_ref: order.user_ref.as_str().to_string(),
            plan: order.plan.id().to_string(),
            amount_minor: order.amount_minor,
            payment_method: order.payment_method.as_str().to_string(),
            status: order.status.as_str().to_string(),
            gateway_transaction_id: order.gateway_transaction_id.clone(),
            created_at: order.created_at,
            paid_at: order.paid_at,
        }
    }
}

/// Payment instructions for the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentInstructionsResponse {
    Redirect { url: String },
    QrCode { content: String },
}

/// Response for `POST /api/payment/orders`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderResponse {
    pub order: OrderResponse,
    pub payment: PaymentInstructionsResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
}

impl CreateOrderResponse {
    pub fn new(order: &Order, payment: PaymentCreated) -> Self {
        let instructions = match payment.instructions {
            PaymentInstructions::Redirect { url } => {
                PaymentInstructionsResponse::Redirect { url }
            }
            PaymentInstructions::QrCode { content } => {
                PaymentInstructionsResponse::QrCode { content }
            }
        };
        Self {
            order: order.into(),
            payment: instructions,
            provider_ref: payment.provider_ref,
        }
    }
}

/// Response for `POST /api/payment/orders/:order_no/reconcile`.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResponse {
    pub order: OrderResponse,

    /// Whether this call changed the order's state.
    pub transitioned: bool,
}

/// One catalog entry for `GET /api/payment/plans`.
#[derive(Debug, Clone, Serialize)]
pub struct PlanResponse {
    pub id: String,
    pub name: String,
    pub price_minor: u64,
    pub duration_days: i64,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id().to_string(),
            name: plan.display_name().to_string(),
            price_minor: plan.price_minor(),
            duration_days: plan.duration_days(),
        }
    }
}

/// Error body shared by all client-facing endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
