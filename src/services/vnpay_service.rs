// services/vnpay_service.rs
use chrono::{DateTime, Duration, FixedOffset, Utc};
use reqwest::{header, Client};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use tracing::{error, info};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::services::signature::{SignatureEngine, SECURE_HASH_FIELD};

pub const VNP_VERSION: &str = "2.1.0";
pub const RESPONSE_CODE_SUCCESS: &str = "00";
/// Full refund of a settled transaction.
pub const REFUND_FULL: &str = "02";
/// Partial refund.
pub const REFUND_PARTIAL: &str = "03";

const CMD_PAY: &str = "pay";
const CMD_QUERY: &str = "querydr";
const CMD_REFUND: &str = "refund";
const ORDER_TYPE: &str = "other";
const CURR_CODE: &str = "VND";
const DEFAULT_LOCALE: &str = "vn";
const DATE_FORMAT: &str = "%Y%m%d%H%M%S";
// The gateway timestamps everything in Vietnam civil time.
const GATEWAY_UTC_OFFSET_SECS: i32 = 7 * 3600;

#[derive(Debug, Clone)]
pub struct PaymentLinkRequest {
    pub client_ip: String,
    pub bank_code: Option<String>,
    pub amount: i64,
    pub locale: Option<String>,
    pub txn_ref: String,
}

pub struct VnpayService {
    tmn_code: String,
    pay_url: String,
    api_url: String,
    return_url: String,
    payment_timeout: Duration,
    signer: SignatureEngine,
    client: Client,
}

impl VnpayService {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        VnpayService {
            tmn_code: config.vnpay_tmn_code.clone(),
            pay_url: config.vnpay_pay_url.clone(),
            api_url: config.vnpay_api_url.clone(),
            return_url: config.vnpay_return_url.clone(),
            payment_timeout: Duration::minutes(config.payment_timeout_minutes),
            signer: SignatureEngine::new(config.vnpay_hash_secret.clone()),
            client,
        }
    }

    fn gateway_now(&self) -> DateTime<FixedOffset> {
        let offset =
            FixedOffset::east_opt(GATEWAY_UTC_OFFSET_SECS).expect("valid gateway UTC offset");
        Utc::now().with_timezone(&offset)
    }

    /// Builds the signed redirect URL for one payment attempt. Pure
    /// construction: no network call is made here.
    pub fn build_payment_link(&self, request: &PaymentLinkRequest) -> Result<String> {
        if request.client_ip.is_empty() {
            return Err(AppError::validation("client ip is required"));
        }
        if request.txn_ref.is_empty() {
            return Err(AppError::validation("transaction reference is required"));
        }
        if request.amount <= 0 {
            return Err(AppError::validation("amount must be greater than 0"));
        }

        let create = self.gateway_now();
        let expire = create + self.payment_timeout;

        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        fields.insert("vnp_Version".to_string(), VNP_VERSION.to_string());
        fields.insert("vnp_Command".to_string(), CMD_PAY.to_string());
        fields.insert("vnp_TmnCode".to_string(), self.tmn_code.clone());
        fields.insert("vnp_Amount".to_string(), request.amount.to_string());
        fields.insert("vnp_CurrCode".to_string(), CURR_CODE.to_string());
        fields.insert("vnp_TxnRef".to_string(), request.txn_ref.clone());
        fields.insert(
            "vnp_OrderInfo".to_string(),
            format!("Thanh toan dat xe {}", request.txn_ref),
        );
        fields.insert("vnp_OrderType".to_string(), ORDER_TYPE.to_string());
        fields.insert("vnp_ReturnUrl".to_string(), self.return_url.clone());
        fields.insert("vnp_IpAddr".to_string(), request.client_ip.clone());
        fields.insert(
            "vnp_Locale".to_string(),
            request
                .locale
                .clone()
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
        );
        fields.insert(
            "vnp_CreateDate".to_string(),
            create.format(DATE_FORMAT).to_string(),
        );
        fields.insert(
            "vnp_ExpireDate".to_string(),
            expire.format(DATE_FORMAT).to_string(),
        );
        if let Some(bank_code) = request.bank_code.as_ref().filter(|b| !b.is_empty()) {
            fields.insert("vnp_BankCode".to_string(), bank_code.clone());
        }

        // Signing string uses raw keys; the outgoing query encodes both
        // sides. The hash itself is appended untouched.
        let secure_hash = self.signer.sign_query(&fields);
        let query = fields
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| {
                format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!(
            "{}?{}&{}={}",
            self.pay_url, query, SECURE_HASH_FIELD, secure_hash
        ))
    }

    /// querydr: looks up a transaction's state at the gateway.
    pub async fn query_transaction(
        &self,
        client_ip: &str,
        txn_ref: &str,
        transaction_date: &str,
    ) -> Result<HashMap<String, String>> {
        let request_id = Uuid::new_v4().simple().to_string();
        let create_date = self.gateway_now().format(DATE_FORMAT).to_string();
        let order_info = format!("Tra cuu giao dich {}", txn_ref);

        let secure_hash = self.signer.sign_positional(&[
            &request_id,
            VNP_VERSION,
            CMD_QUERY,
            &self.tmn_code,
            txn_ref,
            transaction_date,
            &create_date,
            client_ip,
            &order_info,
        ]);

        let payload = serde_json::json!({
            "vnp_RequestId": request_id,
            "vnp_Version": VNP_VERSION,
            "vnp_Command": CMD_QUERY,
            "vnp_TmnCode": self.tmn_code,
            "vnp_TxnRef": txn_ref,
            "vnp_OrderInfo": order_info,
            "vnp_TransactionDate": transaction_date,
            "vnp_CreateDate": create_date,
            "vnp_IpAddr": client_ip,
            "vnp_SecureHash": secure_hash,
        });

        info!("Gateway query for txnRef {}", txn_ref);
        self.post_gateway(payload).await
    }

    /// refund: returns captured money. `transaction_type` is "02" for a full
    /// refund, "03" for partial.
    pub async fn refund(
        &self,
        client_ip: &str,
        transaction_type: &str,
        txn_ref: &str,
        amount: i64,
        transaction_date: &str,
        created_by: &str,
    ) -> Result<HashMap<String, String>> {
        let request_id = Uuid::new_v4().simple().to_string();
        let create_date = self.gateway_now().format(DATE_FORMAT).to_string();
        let order_info = format!("Hoan tien giao dich {}", txn_ref);
        let amount_str = amount.to_string();

        let secure_hash = self.signer.sign_positional(&[
            &request_id,
            VNP_VERSION,
            CMD_REFUND,
            &self.tmn_code,
            transaction_type,
            txn_ref,
            &amount_str,
            transaction_date,
            created_by,
            &create_date,
            client_ip,
            &order_info,
        ]);

        let payload = serde_json::json!({
            "vnp_RequestId": request_id,
            "vnp_Version": VNP_VERSION,
            "vnp_Command": CMD_REFUND,
            "vnp_TmnCode": self.tmn_code,
            "vnp_TransactionType": transaction_type,
            "vnp_TxnRef": txn_ref,
            "vnp_Amount": amount_str,
            "vnp_OrderInfo": order_info,
            "vnp_TransactionDate": transaction_date,
            "vnp_CreateBy": created_by,
            "vnp_CreateDate": create_date,
            "vnp_IpAddr": client_ip,
            "vnp_SecureHash": secure_hash,
        });

        info!("Gateway refund ({}) for txnRef {} - {}", transaction_type, txn_ref, amount);
        self.post_gateway(payload).await
    }

    /// Convenience wrapper: true iff the gateway acknowledged the refund.
    pub async fn issue_refund(
        &self,
        client_ip: &str,
        transaction_type: &str,
        txn_ref: &str,
        amount: i64,
        transaction_date: &str,
        created_by: &str,
    ) -> Result<bool> {
        let response = self
            .refund(
                client_ip,
                transaction_type,
                txn_ref,
                amount,
                transaction_date,
                created_by,
            )
            .await?;
        Ok(response
            .get("vnp_ResponseCode")
            .map(|code| code == RESPONSE_CODE_SUCCESS)
            .unwrap_or(false))
    }

    // Query and refund calls carry no idempotency key, so failures are
    // surfaced to the caller instead of retried here.
    async fn post_gateway(&self, payload: serde_json::Value) -> Result<HashMap<String, String>> {
        let response = self
            .client
            .post(&self.api_url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Gateway call failed: {} - {}", status, body);
            return Err(AppError::gateway(format!("gateway returned {}", status)));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::gateway(format!("malformed gateway response: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| AppError::gateway("gateway response is not a JSON object"))?;

        Ok(object
            .iter()
            .map(|(key, val)| {
                let text = match val {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::signature::SECURE_HASH_TYPE_FIELD;

    fn test_config() -> AppConfig {
        AppConfig {
            vnpay_tmn_code: "TESTCODE".to_string(),
            vnpay_hash_secret: "test-secret".to_string(),
            vnpay_pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            vnpay_api_url: "https://sandbox.vnpayment.vn/merchant_webapi/api/transaction"
                .to_string(),
            vnpay_return_url: "https://example.com/payment/return".to_string(),
            payment_timeout_minutes: 15,
            pending_hold_minutes: 15,
            upload_ttl_minutes: 30,
            reaper_interval_secs: 60,
            upload_dir: "uploads/licenses".to_string(),
            jwt_secret: "jwt-secret".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }

    fn link_request() -> PaymentLinkRequest {
        PaymentLinkRequest {
            client_ip: "1.2.3.4".to_string(),
            bank_code: None,
            amount: 1_000_000,
            locale: Some("vn".to_string()),
            txn_ref: "42".to_string(),
        }
    }

    fn parse_query(url: &str) -> Vec<(String, String)> {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
        query
            .split('&')
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (
                    urlencoding::decode(key).unwrap().into_owned(),
                    urlencoding::decode(value).unwrap().into_owned(),
                )
            })
            .collect()
    }

    #[test]
    fn test_build_payment_link_params_sorted_with_trailing_hash() {
        let service = VnpayService::new(&test_config());
        let url = service.build_payment_link(&link_request()).unwrap();

        let params = parse_query(&url);
        let keys: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();

        assert_eq!(keys.last(), Some(&SECURE_HASH_FIELD));
        let mut sorted = keys[..keys.len() - 1].to_vec();
        sorted.sort_unstable();
        assert_eq!(&keys[..keys.len() - 1], &sorted[..]);
    }

    #[test]
    fn test_build_payment_link_hash_round_trips() {
        let service = VnpayService::new(&test_config());
        let url = service.build_payment_link(&link_request()).unwrap();

        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        let mut embedded_hash = String::new();
        for (key, value) in parse_query(&url) {
            if key == SECURE_HASH_FIELD {
                embedded_hash = value;
            } else {
                fields.insert(key, value);
            }
        }

        let recomputed = SignatureEngine::new("test-secret").sign_query(&fields);
        assert_eq!(recomputed, embedded_hash);
    }

    #[test]
    fn test_build_payment_link_carries_expected_fields() {
        let service = VnpayService::new(&test_config());
        let url = service.build_payment_link(&link_request()).unwrap();
        let params: HashMap<String, String> = parse_query(&url).into_iter().collect();

        assert_eq!(params.get("vnp_Version").map(String::as_str), Some(VNP_VERSION));
        assert_eq!(params.get("vnp_Command").map(String::as_str), Some("pay"));
        assert_eq!(params.get("vnp_TmnCode").map(String::as_str), Some("TESTCODE"));
        assert_eq!(params.get("vnp_Amount").map(String::as_str), Some("1000000"));
        assert_eq!(params.get("vnp_CurrCode").map(String::as_str), Some("VND"));
        assert_eq!(params.get("vnp_TxnRef").map(String::as_str), Some("42"));
        assert_eq!(params.get("vnp_IpAddr").map(String::as_str), Some("1.2.3.4"));
        assert_eq!(params.get("vnp_Locale").map(String::as_str), Some("vn"));
        assert!(params.get("vnp_OrderInfo").unwrap().contains("42"));
        assert!(!params.contains_key("vnp_BankCode"));
        assert!(!params.contains_key(SECURE_HASH_TYPE_FIELD));

        // 14-digit civil timestamps
        assert_eq!(params.get("vnp_CreateDate").unwrap().len(), 14);
        assert_eq!(params.get("vnp_ExpireDate").unwrap().len(), 14);
    }

    #[test]
    fn test_build_payment_link_includes_bank_code_when_present() {
        let service = VnpayService::new(&test_config());
        let mut request = link_request();
        request.bank_code = Some("NCB".to_string());

        let url = service.build_payment_link(&request).unwrap();
        let params: HashMap<String, String> = parse_query(&url).into_iter().collect();
        assert_eq!(params.get("vnp_BankCode").map(String::as_str), Some("NCB"));
    }

    #[test]
    fn test_build_payment_link_rejects_bad_input() {
        let service = VnpayService::new(&test_config());

        let mut request = link_request();
        request.amount = 0;
        assert!(service.build_payment_link(&request).is_err());

        let mut request = link_request();
        request.client_ip = String::new();
        assert!(service.build_payment_link(&request).is_err());

        let mut request = link_request();
        request.txn_ref = String::new();
        assert!(service.build_payment_link(&request).is_err());
    }
}
