//! HTTP adapter - axum routes and handlers over the application layer.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::api_router;
