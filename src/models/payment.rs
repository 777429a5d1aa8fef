// models/payment.rs
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One settled payment attempt. Rows are append-only: a payment is written
/// once by the notification path and never amended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub booking_id: i64,
    pub amount: i64,
    pub txn_ref: String,
    pub paid_at: DateTime<Utc>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub booking_id: i64,
    pub amount: i64,
    pub txn_ref: String,
    pub paid_at: DateTime<Utc>,
    pub success: bool,
}

/// Parses the gateway's yyyyMMddHHmmss timestamps, which are expressed in
/// the gateway's fixed UTC+7 civil time.
pub fn parse_gateway_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y%m%d%H%M%S").ok()?;
    let offset = FixedOffset::east_opt(7 * 3600)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_gateway_datetime() {
        let parsed = parse_gateway_datetime("20240110153000").unwrap();
        // 15:30 UTC+7 is 08:30 UTC
        assert_eq!(parsed.hour(), 8);
        assert_eq!(parsed.minute(), 30);
    }

    #[test]
    fn test_parse_gateway_datetime_rejects_garbage() {
        assert!(parse_gateway_datetime("not-a-date").is_none());
        assert!(parse_gateway_datetime("").is_none());
    }
}
