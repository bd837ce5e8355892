//! Axum router configuration for the payment API.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers::{
    claim_paid, create_order, get_order, list_orders, list_plans, notify_alipay, notify_epay,
    notify_epay_query, notify_wechat, reconcile, refund, AppState,
};

/// Client-facing order routes.
///
/// # Routes
///
/// - `POST /orders` - Create an order and open the payment
/// - `GET /orders?user_ref=` - List a user's orders
/// - `GET /orders/:order_no` - Poll order status
/// - `POST /orders/:order_no/claim-paid` - Out-of-band "I paid" signal
/// - `POST /orders/:order_no/reconcile` - Resolve via gateway status query
/// - `POST /orders/:order_no/refund` - Refund a paid order
/// - `GET /plans` - Plan catalog
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:order_no", get(get_order))
        .route("/orders/:order_no/claim-paid", post(claim_paid))
        .route("/orders/:order_no/reconcile", post(reconcile))
        .route("/orders/:order_no/refund", post(refund))
        .route("/plans", get(list_plans))
}

/// Webhook routes, one per provider.
///
/// No authentication middleware here: authenticity comes from signature
/// verification inside the handler, and responses are always the
/// provider's own acknowledgement format.
pub fn notify_routes() -> Router<AppState> {
    Router::new()
        .route("/epay", post(notify_epay).get(notify_epay_query))
        .route("/alipay", post(notify_alipay))
        .route("/wechat", post(notify_wechat))
}

/// The complete API router.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/payment", payment_routes().nest("/notify", notify_routes()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::{InMemoryMembershipStore, InMemoryOrderStore};
    use crate::application::{MembershipActivator, OrderService, ReconciliationEngine};
    use crate::ports::GatewayRegistry;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let orders = Arc::new(InMemoryOrderStore::new());
        let memberships = Arc::new(InMemoryMembershipStore::new());
        let engine = Arc::new(ReconciliationEngine::new(
            orders.clone(),
            MembershipActivator::new(memberships),
        ));
        let gateways = Arc::new(GatewayRegistry::new());
        AppState {
            order_service: Arc::new(OrderService::new(
                orders,
                gateways.clone(),
                engine.clone(),
                "http://localhost:8080",
            )),
            engine,
            gateways,
        }
    }

    #[test]
    fn payment_routes_create_router() {
        let _: Router = payment_routes().with_state(test_state());
    }

    #[test]
    fn notify_routes_create_router() {
        let _: Router = notify_routes().with_state(test_state());
    }

    #[test]
    fn api_router_assembles() {
        let _ = api_router(test_state());
    }
}
