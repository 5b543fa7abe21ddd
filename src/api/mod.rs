pub mod error;
pub mod metrics;
mod orders;
mod validation;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use orders::{CreateOrderResponse, DeployOrderResponse};

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Deployment orders
        .route(
            "/deployment-orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route("/deployment-orders/:id", get(orders::get_order))
        .route("/deployment-orders/:id/deploy", post(orders::deploy_order))
        .route("/deployment-orders/:id/cancel", post(orders::cancel_order));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api", api_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
