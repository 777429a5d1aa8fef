// handlers/payment_handlers.rs
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;
use validator::Validate;

use chrono::Utc;

use crate::errors::{AppError, Result};
use crate::models::booking::BookingStatus;
use crate::models::user::Claims;
use crate::services::ipn_service::FINAL_PAYMENT_FLAG;
use crate::services::vnpay_service::{PaymentLinkRequest, REFUND_FULL, REFUND_PARTIAL};
use crate::state::AppState;

/// Best-effort client address: proxy header first, socket peer is not
/// plumbed through. The gateway only echoes this back.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentLinkApiRequest {
    #[validate(range(min = 1))]
    pub booking_id: i64,
    pub bank_code: Option<String>,
    pub locale: Option<String>,
}

/// Builds the signed redirect link for the booking's next payment phase:
/// a deposit while it awaits payment, the outstanding balance once the
/// deposit is in.
pub async fn create_payment_link(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(request): Json<PaymentLinkApiRequest>,
) -> Result<Json<serde_json::Value>> {
    request
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let booking = state
        .bookings
        .booking(request.booking_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("booking {}", request.booking_id)))?;
    if booking.customer_id != claims.sub && !claims.is_staff() {
        return Err(AppError::Forbidden);
    }

    let (txn_ref, amount) = match booking.status {
        BookingStatus::AwaitingPayment => (
            format!("{}_{}", booking.id, Utc::now().timestamp()),
            booking.deposit_amount(),
        ),
        BookingStatus::Upcoming | BookingStatus::Confirmed => {
            let outstanding = state.bookings.outstanding_amount(&booking).await?;
            if outstanding <= 0 {
                return Err(AppError::conflict(format!(
                    "booking {} has no outstanding balance",
                    booking.id
                )));
            }
            (
                format!("{}{}_{}", FINAL_PAYMENT_FLAG, booking.id, Utc::now().timestamp()),
                outstanding,
            )
        }
        status => {
            return Err(AppError::conflict(format!(
                "booking {} in status {} cannot take a payment",
                booking.id, status
            )));
        }
    };

    let url = state.vnpay.build_payment_link(&PaymentLinkRequest {
        client_ip: client_ip(&headers),
        bank_code: request.bank_code,
        amount,
        locale: request.locale,
        txn_ref: txn_ref.clone(),
    })?;

    info!("Issued payment link for booking {} ({})", booking.id, txn_ref);
    Ok(Json(serde_json::json!({
        "payment_url": url,
        "txn_ref": txn_ref,
        "amount": amount,
    })))
}

/// Gateway IPN endpoint. The gateway retries on anything but a bare 200, so
/// every internal outcome — mismatch included — answers 200 with an empty
/// body.
pub async fn ipn_callback(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    let outcome = state.ipn.process(&params).await;
    info!("IPN processed: {:?}", outcome);
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub txn_ref: String,
    pub transaction_date: String,
}

pub async fn query_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<HashMap<String, String>>> {
    let response = state
        .vnpay
        .query_transaction(&client_ip(&headers), &query.txn_ref, &query.transaction_date)
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub txn_ref: String,
    pub amount: i64,
    pub transaction_date: String,
    pub transaction_type: Option<String>,
}

pub async fn refund(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(request): Json<RefundRequest>,
) -> Result<Json<HashMap<String, String>>> {
    let transaction_type = request
        .transaction_type
        .unwrap_or_else(|| REFUND_FULL.to_string());
    if transaction_type != REFUND_FULL && transaction_type != REFUND_PARTIAL {
        return Err(AppError::validation("transaction_type must be 02 or 03"));
    }
    if request.amount <= 0 {
        return Err(AppError::validation("amount must be greater than 0"));
    }

    let response = state
        .vnpay
        .refund(
            &client_ip(&headers),
            &transaction_type,
            &request.txn_ref,
            request.amount,
            &request.transaction_date,
            &claims.sub.to_string(),
        )
        .await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::memory::MemoryStore;
    use crate::state::AppState;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let config = AppConfig {
            vnpay_tmn_code: "TESTCODE".to_string(),
            vnpay_hash_secret: "test-secret".to_string(),
            vnpay_pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            vnpay_api_url: "http://127.0.0.1:9/unreachable".to_string(),
            vnpay_return_url: "https://example.com/payment/return".to_string(),
            payment_timeout_minutes: 15,
            pending_hold_minutes: 15,
            upload_ttl_minutes: 30,
            reaper_interval_secs: 60,
            upload_dir: "uploads/licenses".to_string(),
            jwt_secret: "jwt-secret".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
        };
        AppState::new(config, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_ipn_endpoint_answers_200_to_garbage() {
        let state = test_state();
        let mut params = HashMap::new();
        params.insert("vnp_TxnRef".to_string(), "42".to_string());
        params.insert("vnp_ResponseCode".to_string(), "00".to_string());
        params.insert(
            "vnp_SecureHash".to_string(),
            "0000000000000000".to_string(),
        );

        let status = ipn_callback(State(state), Query(params)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ipn_endpoint_answers_200_without_hash() {
        let state = test_state();
        let status = ipn_callback(State(state), Query(HashMap::new())).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "1.2.3.4");
        assert_eq!(client_ip(&HeaderMap::new()), "127.0.0.1");
    }
}
