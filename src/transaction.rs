//! The normalized pending-transaction shape both backend flavours are mapped into.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: String,
    pub message: String,
    pub postback_uri: String,
    /// Matches an enrolled factor's key-store label (`name`).
    pub key_name: String,
    pub factor_id: String,
    pub factor_type: String,
    /// The UTF-8 string that MUST be signed as-is.
    pub data_to_sign: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub additional_data: HashMap<String, String>,
}

impl PendingTransaction {
    /// The first four code points of `id`. Computed rather than stored so it can never drift
    /// from `id`.
    pub fn short_id(&self) -> String {
        self.id.chars().take(4).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionAction {
    Verify,
    Deny,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample() -> PendingTransaction {
        PendingTransaction {
            id: "abcdef0123456789".to_string(),
            message: "Approve login?".to_string(),
            postback_uri: "https://server/postback".to_string(),
            key_name: "K-up".to_string(),
            factor_id: "F0CF".to_string(),
            factor_type: "userPresence".to_string(),
            data_to_sign: "challenge-bytes".to_string(),
            timestamp: chrono::Utc::now(),
            additional_data: HashMap::new(),
        }
    }

    #[test]
    fn short_id_is_first_four_code_points() {
        assert_eq!(sample().short_id(), "abcd");
    }
}
