use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::upload;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/licenses",
            post(upload::upload_license).layer(middleware::from_fn(auth_middleware)),
        )
        .route("/licenses/:file_name", get(upload::serve_license))
}
