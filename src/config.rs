// config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub vnpay_tmn_code: String,
    pub vnpay_hash_secret: String,
    pub vnpay_pay_url: String,
    pub vnpay_api_url: String,
    pub vnpay_return_url: String,
    pub payment_timeout_minutes: i64,
    pub pending_hold_minutes: i64,
    pub upload_ttl_minutes: i64,
    pub reaper_interval_secs: u64,
    pub upload_dir: String,
    pub jwt_secret: String,
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        AppConfig {
            vnpay_tmn_code: env::var("VNPAY_TMN_CODE").expect("VNPAY_TMN_CODE must be set"),
            vnpay_hash_secret: env::var("VNPAY_HASH_SECRET")
                .expect("VNPAY_HASH_SECRET must be set"),
            vnpay_pay_url: env::var("VNPAY_PAY_URL").unwrap_or_else(|_| {
                "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string()
            }),
            vnpay_api_url: env::var("VNPAY_API_URL").unwrap_or_else(|_| {
                "https://sandbox.vnpayment.vn/merchant_webapi/api/transaction".to_string()
            }),
            vnpay_return_url: env::var("VNPAY_RETURN_URL")
                .expect("VNPAY_RETURN_URL must be set"),
            payment_timeout_minutes: env::var("PAYMENT_TIMEOUT_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .expect("PAYMENT_TIMEOUT_MINUTES must be a number"),
            pending_hold_minutes: env::var("PENDING_HOLD_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .expect("PENDING_HOLD_MINUTES must be a number"),
            upload_ttl_minutes: env::var("UPLOAD_TTL_MINUTES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("UPLOAD_TTL_MINUTES must be a number"),
            reaper_interval_secs: env::var("REAPER_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("REAPER_INTERVAL_SECS must be a number"),
            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads/licenses".to_string()),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("PORT must be a number"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
        }
    }
}
