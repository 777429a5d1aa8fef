use axum::{http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod config;
mod database;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use database::memory::MemoryStore;
use models::booking::PriceTerms;
use services::reaper::Reaper;
use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let app_config = config::AppConfig::from_env();
    create_upload_dir(&app_config).await;

    let store = Arc::new(MemoryStore::new());
    seed_catalog(&store);

    let app_state = AppState::new(app_config.clone(), store);

    let shutdown_token = CancellationToken::new();
    let reaper = Reaper::new(
        app_state.store.clone(),
        app_state.pending.clone(),
        app_state.uploads.clone(),
        PathBuf::from(&app_config.upload_dir),
        Duration::from_secs(app_config.reaper_interval_secs),
    );
    let reaper_handle = tokio::spawn(reaper.run(shutdown_token.clone()));

    let app = build_router(app_state);
    start_server(app, app_config.port, shutdown_token).await;

    let _ = reaper_handle.await;
}

async fn create_upload_dir(config: &config::AppConfig) {
    if let Err(e) = tokio::fs::create_dir_all(&config.upload_dir).await {
        tracing::warn!("Failed to create {}: {}", config.upload_dir, e);
    }
}

// The vehicle catalog is an external system; until its feed is wired in we
// run with a fixed rate table so bookings can price themselves.
fn seed_catalog(store: &MemoryStore) {
    let standard = PriceTerms {
        rate_per_day: 15_000_000,
        deposit_percent: 30,
        tax_percent: 10,
        discount_percent: 0,
    };
    let premium = PriceTerms {
        rate_per_day: 35_000_000,
        deposit_percent: 40,
        tax_percent: 10,
        discount_percent: 0,
    };
    for vehicle_id in 1..=20 {
        store.seed_vehicle(vehicle_id, standard);
    }
    for vehicle_id in 21..=30 {
        store.seed_vehicle(vehicle_id, premium);
    }
    tracing::info!("Catalog seeded with 30 vehicles");
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .nest("/api/bookings", routes::bookings::routes())
        .nest("/api/payments", routes::payments::routes())
        .nest("/api/uploads", routes::uploads::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn start_server(app: Router, port: u16, shutdown_token: CancellationToken) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("🚀 Server starting on {}", addr);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            let shutdown = async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutdown signal received");
                shutdown_token.cancel();
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("Server error: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    }
}

async fn root_handler() -> &'static str {
    "🏍️ Motorbike Rental API"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
