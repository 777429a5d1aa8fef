// services/signature.rs
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::collections::{BTreeMap, HashMap};

type HmacSha512 = Hmac<Sha512>;

pub const SECURE_HASH_FIELD: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE_FIELD: &str = "vnp_SecureHashType";

/// HMAC-SHA512 signer over the gateway's two canonicalizations: the sorted
/// query form used for redirect links and notifications, and the pipe-joined
/// positional form used for query/refund API calls.
pub struct SignatureEngine {
    secret: String,
}

impl SignatureEngine {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Signs the query-hash form of `fields`.
    pub fn sign_query(&self, fields: &BTreeMap<String, String>) -> String {
        self.hmac_hex(&query_hash_data(fields))
    }

    /// Signs an ordered positional tuple joined by `|`.
    pub fn sign_positional(&self, parts: &[&str]) -> String {
        self.hmac_hex(&parts.join("|"))
    }

    /// Recomputes the query-form hash over `fields` (minus the hash fields
    /// themselves) and compares case-insensitively. A mismatch is a normal
    /// outcome, not an error.
    pub fn verify(&self, fields: &HashMap<String, String>, claimed_hash: &str) -> bool {
        let filtered: BTreeMap<String, String> = fields
            .iter()
            .filter(|(key, _)| {
                key.as_str() != SECURE_HASH_FIELD && key.as_str() != SECURE_HASH_TYPE_FIELD
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.sign_query(&filtered).eq_ignore_ascii_case(claimed_hash)
    }

    fn hmac_hex(&self, data: &str) -> String {
        let mut mac = match HmacSha512::new_from_slice(self.secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC accepts keys of any size"),
        };
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Canonical query-hash string: keys in ordinal order, `rawKey=encodedValue`
/// joined by `&`, empty values excluded.
pub fn query_hash_data(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}
