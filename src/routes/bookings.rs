use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::handlers::booking_handlers;
use crate::middleware::auth::{auth_middleware, staff_middleware};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let staff = Router::new()
        .route("/:id/status", patch(booking_handlers::update_status))
        .route_layer(middleware::from_fn(staff_middleware));

    Router::new()
        .route("/", post(booking_handlers::create_booking))
        .route("/:id", get(booking_handlers::get_booking))
        .merge(staff)
        .layer(middleware::from_fn(auth_middleware))
}
