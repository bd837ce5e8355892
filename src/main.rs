//! Paylane service binary.
//!
//! Wires configuration, stores, gateway adapters, and the HTTP router
//! together at process start. All dependencies are constructed here and
//! passed down explicitly; nothing initializes itself at import time.

use std::sync::Arc;

use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use paylane::adapters::gateways::build_registry;
use paylane::adapters::http::{api_router, AppState};
use paylane::adapters::store::{InMemoryMembershipStore, InMemoryOrderStore};
use paylane::application::{MembershipActivator, OrderService, ReconciliationEngine};
use paylane::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let orders = Arc::new(InMemoryOrderStore::new());
    let memberships = Arc::new(InMemoryMembershipStore::new());
    let gateways = Arc::new(build_registry(&config)?);

    let engine = Arc::new(ReconciliationEngine::new(
        orders.clone(),
        MembershipActivator::new(memberships),
    ));
    let order_service = Arc::new(OrderService::new(
        orders,
        gateways.clone(),
        engine.clone(),
        config.server.public_base_url.clone(),
    ));

    let state = AppState {
        order_service,
        engine,
        gateways,
    };

    let mut app = api_router(state);

    let origins = config.server.cors_origins_list();
    if !origins.is_empty() {
        let allow = AllowOrigin::list(origins.iter().filter_map(|origin| origin.parse().ok()));
        app = app.layer(
            CorsLayer::new()
                .allow_origin(allow)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr = config.server.socket_addr()?;
    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        gateways = ?state_methods(&config),
        "paylane listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn state_methods(config: &AppConfig) -> Vec<&'static str> {
    let mut methods = Vec::new();
    if config.epay.is_some() {
        methods.push("epay");
    }
    if config.alipay.is_some() {
        methods.push("alipay");
    }
    if config.wechat.is_some() {
        methods.push("wechat");
    }
    methods
}
