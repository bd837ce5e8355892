//! HTTP handlers for the payment API.
//!
//! Client endpoints speak JSON with typed error bodies. The webhook
//! endpoints are different: whatever happens internally, they answer in the
//! provider's own acknowledgement format, because the provider only needs
//! to know whether to redeliver. Retryable internal failures ack failure
//! (please redeliver); everything else acks success (stop redelivering).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::application::{
    CreateOrderCommand, OrderService, PaidEvidence, ReconcileResult, ReconciliationEngine,
};
use crate::domain::order::{OrderNo, PaymentError, PaymentMethod, Plan, UserRef};
use crate::ports::{CallbackAck, ClaimedResult, GatewayRegistry};

use super::dto::{
    CreateOrderRequest, CreateOrderResponse, ErrorResponse, ListOrdersQuery, OrderResponse,
    PlanResponse, ReconcileResponse,
};

// ════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════

/// Shared state cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub order_service: Arc<OrderService>,
    pub engine: Arc<ReconciliationEngine>,
    pub gateways: Arc<GatewayRegistry>,
}

/// Wrapper that renders [`PaymentError`] as a JSON error response.
pub struct ApiError(PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let body = ErrorResponse::new(self.0.code(), self.0.to_string());
        (status, Json(body)).into_response()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Client endpoints
// ════════════════════════════════════════════════════════════════════════════

pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let plan: Plan = request.plan.parse()?;
    let payment_method: PaymentMethod = request.payment_method.parse()?;

    let created = state
        .order_service
        .create_order(CreateOrderCommand {
            user_ref: UserRef::new(request.user_ref),
            plan,
            payment_method,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse::new(&created.order, created.payment)),
    ))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .order_service
        .get_order(&OrderNo::from_string(order_no))
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state
        .order_service
        .list_orders(&UserRef::new(query.user_ref))
        .await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// The client's out-of-band "I paid" signal.
pub async fn claim_paid(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let outcome = state
        .order_service
        .claim_paid(&OrderNo::from_string(order_no))
        .await?;
    Ok(Json(OrderResponse::from(&outcome.order)))
}

/// Resolve the order against the gateway's synchronous status query.
pub async fn reconcile(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let result = state
        .order_service
        .reconcile(&OrderNo::from_string(order_no))
        .await?;

    let response = match result {
        ReconcileResult::Transitioned(outcome) => ReconcileResponse {
            order: OrderResponse::from(&outcome.order),
            transitioned: outcome.effect == crate::domain::order::TransitionEffect::Applied,
        },
        ReconcileResult::Unchanged(order) => ReconcileResponse {
            order: OrderResponse::from(&order),
            transitioned: false,
        },
    };
    Ok(Json(response))
}

pub async fn refund(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let outcome = state
        .order_service
        .refund(&OrderNo::from_string(order_no))
        .await?;
    Ok(Json(OrderResponse::from(&outcome.order)))
}

pub async fn list_plans() -> Json<Vec<PlanResponse>> {
    Json(Plan::ALL.into_iter().map(PlanResponse::from).collect())
}

// ════════════════════════════════════════════════════════════════════════════
// Webhook endpoints
// ════════════════════════════════════════════════════════════════════════════

pub async fn notify_epay(State(state): State<AppState>, body: Bytes) -> Response {
    handle_notify(&state, PaymentMethod::Epay, &body).await
}

/// The aggregator also delivers notifications as GET requests with the
/// parameters in the query string.
pub async fn notify_epay_query(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Response {
    let raw = query.unwrap_or_default();
    handle_notify(&state, PaymentMethod::Epay, raw.as_bytes()).await
}

pub async fn notify_alipay(State(state): State<AppState>, body: Bytes) -> Response {
    handle_notify(&state, PaymentMethod::Alipay, &body).await
}

pub async fn notify_wechat(State(state): State<AppState>, body: Bytes) -> Response {
    handle_notify(&state, PaymentMethod::Wechat, &body).await
}

/// Shared ingestion flow: resolve adapter, parse, verify, reconcile, ack.
async fn handle_notify(state: &AppState, provider: PaymentMethod, raw: &[u8]) -> Response {
    let gateway = match state.gateways.get(provider) {
        Ok(gateway) => gateway.clone(),
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let notice = match gateway.parse_callback(raw) {
        Ok(notice) => notice,
        Err(err) => {
            tracing::warn!(provider = %provider, error = %err, "malformed callback");
            return ack_response(gateway.ack_failure());
        }
    };

    if !gateway.verify_callback(&notice) {
        let err = PaymentError::SignatureInvalid { provider };
        tracing::warn!(
            provider = %provider,
            order_no = %notice.order_no,
            claimed_transaction_id = %notice.claimed_transaction_id,
            error = %err,
            "rejecting callback"
        );
        return ack_response(gateway.ack_failure());
    }

    let result = match notice.claimed_result {
        ClaimedResult::Success => {
            state
                .engine
                .confirm_paid(
                    &notice.order_no,
                    &notice.claimed_transaction_id,
                    PaidEvidence::VerifiedCallback { provider },
                )
                .await
        }
        ClaimedResult::Failure => state.engine.note_failed(&notice.order_no).await,
    };

    match result {
        Ok(_) => ack_response(gateway.ack_success()),
        Err(err) if err.is_retryable() || matches!(err, PaymentError::OrderNotFound(_)) => {
            // Transient or possibly-early delivery: ask for redelivery.
            tracing::warn!(
                provider = %provider,
                order_no = %notice.order_no,
                error = %err,
                "callback processing failed, requesting redelivery"
            );
            ack_response(gateway.ack_failure())
        }
        Err(err) => {
            // Terminal outcome (e.g. a transition the state machine
            // rejects). Redelivering the same callback cannot change it.
            tracing::warn!(
                provider = %provider,
                order_no = %notice.order_no,
                error = %err,
                "callback produced no transition, acknowledging to stop redelivery"
            );
            ack_response(gateway.ack_success())
        }
    }
}

fn ack_response(ack: CallbackAck) -> Response {
    ([(header::CONTENT_TYPE, ack.content_type)], ack.body).into_response()
}
