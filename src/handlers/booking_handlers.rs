// handlers/booking_handlers.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::booking::{Booking, BookingStatus};
use crate::models::user::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    #[validate(range(min = 1))]
    pub vehicle_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub license_image: Option<String>,
}

pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse> {
    info!("Received booking request: {:?}", request);
    request
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let booking = state
        .bookings
        .create_booking(
            claims.sub,
            request.vehicle_id,
            request.start_date,
            request.end_date,
            request.license_image,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Booking>> {
    let booking = state
        .bookings
        .booking(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("booking {}", id)))?;

    if booking.customer_id != claims.sub && !claims.is_staff() {
        return Err(AppError::Forbidden);
    }
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Booking>> {
    let booking = state.bookings.update_status(id, request.status).await?;
    Ok(Json(booking))
}
