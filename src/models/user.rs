// models/user.rs
use serde::{Deserialize, Serialize};

pub const STAFF_ROLE: &str = "staff";

/// Token claims issued by the external identity service. We only verify and
/// consume them; issuing/login lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn is_staff(&self) -> bool {
        self.role == STAFF_ROLE
    }
}
