use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::handlers::payment_handlers;
use crate::middleware::auth::{auth_middleware, staff_middleware};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let customer = Router::new()
        .route("/link", post(payment_handlers::create_payment_link))
        .layer(middleware::from_fn(auth_middleware));

    let staff = Router::new()
        .route("/query", get(payment_handlers::query_transaction))
        .route("/refund", post(payment_handlers::refund))
        .layer(middleware::from_fn(staff_middleware))
        .layer(middleware::from_fn(auth_middleware));

    Router::new()
        // The gateway calls this unauthenticated from its own
        // infrastructure; verification happens inside.
        .route("/ipn", get(payment_handlers::ipn_callback))
        .route("/health", get(payments_health))
        .merge(customer)
        .merge(staff)
}

async fn payments_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "payments",
        "timestamp": Utc::now().to_rfc3339(),
        "features": ["redirect-link", "ipn", "querydr", "refund"]
    }))
}
