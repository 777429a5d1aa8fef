// services/ipn_service.rs
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::services::booking_service::BookingService;
use crate::services::signature::{SignatureEngine, SECURE_HASH_FIELD};
use crate::services::vnpay_service::RESPONSE_CODE_SUCCESS;

/// txnRef prefix marking a final payment; anything else is a deposit.
pub const FINAL_PAYMENT_FLAG: char = 'f';

/// What one inbound notification amounted to. The HTTP handler answers 200
/// to the gateway whatever the outcome; this is for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpnOutcome {
    /// Hash did not verify; notification discarded without any state change.
    SignatureMismatch,
    /// Verified but the txnRef did not resolve to a booking id.
    MalformedReference,
    /// Payment applied and the booking transitioned.
    Confirmed { booking_id: i64, is_final: bool },
    /// Replay of a notification whose txnRef is already settled; nothing to
    /// do on the second delivery.
    AlreadyProcessed { booking_id: i64 },
    /// Gateway captured money but the booking could not accept it;
    /// compensating refund attempted.
    ConflictRefunded { booking_id: i64, refunded: bool },
    /// Gateway reported a failed payment.
    PaymentFailed { booking_id: i64, cancelled: bool },
    /// Infrastructure failure while applying the outcome.
    InternalError,
}

/// Splits `<bookingId>[_<disambiguator>]` / `f<bookingId>[_<disambiguator>]`
/// into the booking id and the payment phase.
pub fn parse_txn_ref(txn_ref: &str) -> Option<(i64, bool)> {
    let (body, is_final) = match txn_ref.strip_prefix(FINAL_PAYMENT_FLAG) {
        Some(rest) => (rest, true),
        None => (txn_ref, false),
    };
    let id_part = body.split('_').next().unwrap_or(body);
    id_part.parse::<i64>().ok().map(|id| (id, is_final))
}

/// Consumes one gateway callback: verify the signature, resolve the booking,
/// dispatch the outcome. Replays are absorbed by the lifecycle's transition
/// guard and the settled-payment ledger, not here.
pub struct IpnService {
    signer: SignatureEngine,
    bookings: Arc<BookingService>,
}

impl IpnService {
    pub fn new(config: &AppConfig, bookings: Arc<BookingService>) -> Self {
        Self {
            signer: SignatureEngine::new(config.vnpay_hash_secret.clone()),
            bookings,
        }
    }

    pub async fn process(&self, params: &HashMap<String, String>) -> IpnOutcome {
        let claimed_hash = match params.get(SECURE_HASH_FIELD) {
            Some(hash) => hash,
            None => {
                warn!("IPN without secure hash, discarding");
                return IpnOutcome::SignatureMismatch;
            }
        };
        if !self.signer.verify(params, claimed_hash) {
            warn!("IPN signature mismatch, discarding");
            return IpnOutcome::SignatureMismatch;
        }

        let txn_ref = params.get("vnp_TxnRef").map(String::as_str).unwrap_or("");
        let (booking_id, is_final) = match parse_txn_ref(txn_ref) {
            Some(parsed) => parsed,
            None => {
                warn!("IPN with unparseable txnRef '{}', discarding", txn_ref);
                return IpnOutcome::MalformedReference;
            }
        };

        // Whole minor units only; anything fractional is truncated.
        let amount = params
            .get("vnp_Amount")
            .and_then(|raw| raw.parse::<f64>().ok())
            .map(|value| value.trunc() as i64)
            .unwrap_or(0);
        let pay_date = params.get("vnp_PayDate").map(String::as_str).unwrap_or("");
        let response_code = params
            .get("vnp_ResponseCode")
            .map(String::as_str)
            .unwrap_or("");

        if response_code == RESPONSE_CODE_SUCCESS {
            match self
                .bookings
                .confirm_payment(booking_id, amount, is_final, txn_ref, pay_date)
                .await
            {
                Ok(true) => IpnOutcome::Confirmed {
                    booking_id,
                    is_final,
                },
                Ok(false) => {
                    // A replayed delivery of a settled txnRef is a no-op; only
                    // a genuinely unreconcilable capture gets compensated.
                    match self.bookings.payment_recorded(txn_ref).await {
                        Ok(true) => {
                            info!("IPN replay for settled txnRef {}, ignoring", txn_ref);
                            return IpnOutcome::AlreadyProcessed { booking_id };
                        }
                        Ok(false) => {}
                        Err(e) => {
                            error!("Failed to check txnRef {}: {}", txn_ref, e);
                            return IpnOutcome::InternalError;
                        }
                    }
                    warn!(
                        "Payment captured for booking {} but confirmation was rejected, issuing refund",
                        booking_id
                    );
                    let refunded = match self
                        .bookings
                        .handle_cancel_and_refund(booking_id, txn_ref, amount, pay_date)
                        .await
                    {
                        Ok(refunded) => refunded,
                        Err(e) => {
                            error!(
                                "Compensating refund for txnRef {} failed: {}",
                                txn_ref, e
                            );
                            false
                        }
                    };
                    IpnOutcome::ConflictRefunded {
                        booking_id,
                        refunded,
                    }
                }
                Err(e) => {
                    error!("Failed to apply payment for booking {}: {}", booking_id, e);
                    IpnOutcome::InternalError
                }
            }
        } else {
            info!(
                "IPN reports failed payment for booking {} (code {})",
                booking_id, response_code
            );
            match self.bookings.mark_payment_failed(booking_id).await {
                Ok(cancelled) => IpnOutcome::PaymentFailed {
                    booking_id,
                    cancelled,
                },
                Err(e) => {
                    error!("Failed to cancel booking {}: {}", booking_id, e);
                    IpnOutcome::InternalError
                }
            }
        }
    }
}
