//! The persisted authenticator record — what survives across the host's app restarts.
//!
//! Modeled as a closed `Authenticator` enum over the two backend variants rather than a trait
//! object, since the variant set is fixed and a `#[serde(untagged)]` representation gives the
//! host exactly the decode-by-trying-each-in-order behaviour the original lifecycle calls for.

use crate::factor::{BiometricFactorInfo, FactorType, UserPresenceFactorInfo};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub additional_data: Map<String, Value>,
}

impl OAuthToken {
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// The `authenticator_id` entry the on-premise path requires in `additionalData`.
    pub fn authenticator_id(&self) -> Option<String> {
        self.additional_data.get("authenticator_id").and_then(Value::as_str).map(str::to_string)
    }
}

/// `deny_unknown_fields` matters here beyond strictness: [`Authenticator`] is `#[serde(untagged)]`
/// and tries this variant first, so without it a persisted on-premise record (a superset JSON
/// carrying `qr_login_uri`/`trust_all_tls`/`client_id`) would silently decode as `Cloud`, dropping
/// those fields and never falling through to `OnPremise`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudAuthenticator {
    pub id: String,
    pub account_name: String,
    pub service_name: String,
    pub token: OAuthToken,
    pub refresh_uri: String,
    pub transaction_uri: String,
    #[serde(default)]
    pub theme: HashMap<String, String>,
    pub certificate: Option<String>,
    pub biometric: Option<BiometricFactorInfo>,
    pub user_presence: Option<UserPresenceFactorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnPremiseAuthenticator {
    pub id: String,
    pub account_name: String,
    pub service_name: String,
    pub token: OAuthToken,
    pub refresh_uri: String,
    pub transaction_uri: String,
    #[serde(default)]
    pub theme: HashMap<String, String>,
    pub certificate: Option<String>,
    pub biometric: Option<BiometricFactorInfo>,
    pub user_presence: Option<UserPresenceFactorInfo>,
    pub qr_login_uri: Option<String>,
    pub trust_all_tls: bool,
    pub client_id: String,
}

/// The host persists whichever variant its registration provider produced and, on load, tries
/// each variant in order (cloud first) rather than carrying a discriminator tag on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Authenticator {
    Cloud(CloudAuthenticator),
    OnPremise(OnPremiseAuthenticator),
}

impl Authenticator {
    pub fn id(&self) -> &str {
        match self {
            Authenticator::Cloud(a) => &a.id,
            Authenticator::OnPremise(a) => &a.id,
        }
    }

    pub fn account_name(&self) -> &str {
        match self {
            Authenticator::Cloud(a) => &a.account_name,
            Authenticator::OnPremise(a) => &a.account_name,
        }
    }

    pub fn set_account_name(&mut self, name: String) {
        match self {
            Authenticator::Cloud(a) => a.account_name = name,
            Authenticator::OnPremise(a) => a.account_name = name,
        }
    }

    pub fn token(&self) -> &OAuthToken {
        match self {
            Authenticator::Cloud(a) => &a.token,
            Authenticator::OnPremise(a) => &a.token,
        }
    }

    /// Token refresh mutates only this field; the caller is responsible for re-persisting.
    pub fn set_token(&mut self, token: OAuthToken) {
        match self {
            Authenticator::Cloud(a) => a.token = token,
            Authenticator::OnPremise(a) => a.token = token,
        }
    }

    pub fn transaction_uri(&self) -> &str {
        match self {
            Authenticator::Cloud(a) => &a.transaction_uri,
            Authenticator::OnPremise(a) => &a.transaction_uri,
        }
    }

    fn biometric(&self) -> &Option<BiometricFactorInfo> {
        match self {
            Authenticator::Cloud(a) => &a.biometric,
            Authenticator::OnPremise(a) => &a.biometric,
        }
    }

    fn user_presence(&self) -> &Option<UserPresenceFactorInfo> {
        match self {
            Authenticator::Cloud(a) => &a.user_presence,
            Authenticator::OnPremise(a) => &a.user_presence,
        }
    }

    /// The order-independent set formed by wrapping whichever of biometric/userPresence are
    /// present into their `FactorType` variant — avoids branching at every lookup site.
    pub fn enrolled_factors(&self) -> Vec<FactorType> {
        let mut factors = Vec::with_capacity(2);
        if let Some(biometric) = self.biometric() {
            factors.push(FactorType::Biometric(biometric.clone()));
        }
        if let Some(user_presence) = self.user_presence() {
            factors.push(FactorType::UserPresence(user_presence.clone()));
        }
        factors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::SigningAlgorithm;

    fn sample_token() -> OAuthToken {
        OAuthToken {
            access_token: "a1b2c3".to_string(),
            refresh_token: "r1".to_string(),
            expires_in: 3600,
            additional_data: Map::new(),
        }
    }

    fn sample_cloud(biometric: bool, user_presence: bool) -> Authenticator {
        Authenticator::Cloud(CloudAuthenticator {
            id: "auth-1".to_string(),
            account_name: "Savings Account".to_string(),
            service_name: "Verify".to_string(),
            token: sample_token(),
            refresh_uri: "https://server/registration".to_string(),
            transaction_uri: "https://server/auth-1/verifications".to_string(),
            theme: HashMap::new(),
            certificate: None,
            biometric: biometric.then(|| BiometricFactorInfo {
                id: "b-1".to_string(),
                name: "K-bio".to_string(),
                algorithm: SigningAlgorithm::Sha256,
            }),
            user_presence: user_presence.then(|| UserPresenceFactorInfo {
                id: "u-1".to_string(),
                name: "K-up".to_string(),
                algorithm: SigningAlgorithm::Sha256,
            }),
        })
    }

    #[test]
    fn enrolled_factors_derivation() {
        assert_eq!(sample_cloud(false, false).enrolled_factors().len(), 0);
        assert_eq!(sample_cloud(true, false).enrolled_factors().len(), 1);
        assert_eq!(sample_cloud(true, true).enrolled_factors().len(), 2);
    }

    #[test]
    fn untagged_record_round_trips_through_json() {
        let authenticator = sample_cloud(true, true);
        let encoded = serde_json::to_value(&authenticator).unwrap();
        let decoded: Authenticator = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.id(), authenticator.id());
        assert_eq!(decoded.enrolled_factors().len(), 2);
    }

    #[test]
    fn authenticator_id_reads_from_additional_data() {
        let mut token = sample_token();
        token.additional_data.insert("authenticator_id".to_string(), Value::String("auth-xyz".to_string()));
        assert_eq!(token.authenticator_id().as_deref(), Some("auth-xyz"));
    }

    #[test]
    fn on_premise_record_round_trips_as_on_premise_not_cloud() {
        let authenticator = Authenticator::OnPremise(OnPremiseAuthenticator {
            id: "auth-1".to_string(),
            account_name: "Checking".to_string(),
            service_name: "Access Manager".to_string(),
            token: sample_token(),
            refresh_uri: "https://onprem.example/token".to_string(),
            transaction_uri: "https://onprem.example/authntrxn".to_string(),
            theme: HashMap::new(),
            certificate: None,
            biometric: None,
            user_presence: None,
            qr_login_uri: Some("https://onprem.example/qrlogin".to_string()),
            trust_all_tls: true,
            client_id: "client-1".to_string(),
        });
        let encoded = serde_json::to_value(&authenticator).unwrap();
        let decoded: Authenticator = serde_json::from_value(encoded).unwrap();
        match decoded {
            Authenticator::OnPremise(a) => {
                assert_eq!(a.qr_login_uri.as_deref(), Some("https://onprem.example/qrlogin"));
                assert!(a.trust_all_tls);
                assert_eq!(a.client_id, "client-1");
            }
            Authenticator::Cloud(_) => panic!("on-premise record must not decode as Cloud"),
        }
    }
}
