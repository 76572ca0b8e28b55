//! Bootstrap ingestion and the registration dispatcher.
//!
//! A bootstrap JSON string (scanned from a QR code, or returned by an in-app initiation call)
//! is tried against the cloud shape first, then the on-premise shape. Construction failure here
//! means the JSON did not parse into the expected descriptor — it is never a network failure;
//! network I/O only happens once a shape has matched, inside `initiate`.

pub mod cloud;
pub mod onprem;

pub use cloud::CloudRegistrationProvider;
pub use onprem::OnPremiseRegistrationProvider;

use crate::authenticator::Authenticator;
use crate::capabilities::{BiometricProvider, HttpClient, KeyStore, OAuthProvider};
use crate::error::{MfaError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapVersion {
    pub number: String,
    pub platform: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudBootstrap {
    pub code: String,
    #[serde(rename = "accountName")]
    pub account_name: String,
    #[serde(rename = "registrationUri")]
    pub registration_uri: String,
    pub version: BootstrapVersion,
}

impl CloudBootstrap {
    pub fn domain(&self) -> Option<String> {
        Url::parse(&self.registration_uri).ok().and_then(|url| url.host_str().map(str::to_string))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OnPremiseBootstrap {
    pub code: String,
    #[serde(default)]
    pub options: String,
    pub details_url: String,
    pub version: i64,
    pub client_id: String,
}

impl OnPremiseBootstrap {
    pub fn domain(&self) -> Option<String> {
        Url::parse(&self.details_url).ok().and_then(|url| url.host_str().map(str::to_string))
    }

    /// `true` iff `options` contains the token `ignoreSslCerts=true`, whitespace-trimmed and
    /// value lowercased, among its comma-separated `k=v` entries.
    pub fn ignore_ssl_certificate(&self) -> bool {
        self.options.split(',').any(|entry| {
            let mut parts = entry.splitn(2, '=');
            let key = parts.next().unwrap_or("").trim();
            let value = parts.next().unwrap_or("").trim().to_ascii_lowercase();
            key == "ignoreSslCerts" && value == "true"
        })
    }
}

/// A registration provider mid-lifecycle, dispatched to from [`RegistrationController::initiate`].
/// Once finalized it is terminal and not reused — the caller persists the [`Authenticator`] it
/// produced and discards the provider.
pub enum RegistrationSession {
    Cloud(CloudRegistrationProvider),
    OnPremise(OnPremiseRegistrationProvider),
}

impl RegistrationSession {
    pub fn domain(&self) -> Option<String> {
        match self {
            RegistrationSession::Cloud(provider) => provider.bootstrap.domain(),
            RegistrationSession::OnPremise(provider) => provider.bootstrap.domain(),
        }
    }

    pub fn can_enroll_biometric(&self) -> bool {
        match self {
            RegistrationSession::Cloud(provider) => provider.can_enroll_biometric(),
            RegistrationSession::OnPremise(provider) => provider.can_enroll_biometric(),
        }
    }

    pub fn can_enroll_user_presence(&self) -> bool {
        match self {
            RegistrationSession::Cloud(provider) => provider.can_enroll_user_presence(),
            RegistrationSession::OnPremise(provider) => provider.can_enroll_user_presence(),
        }
    }

    pub async fn enroll_user_presence(&mut self, key_store: &dyn KeyStore) -> Result<()> {
        match self {
            RegistrationSession::Cloud(provider) => provider.enroll_user_presence(key_store).await,
            RegistrationSession::OnPremise(provider) => provider.enroll_user_presence(key_store).await,
        }
    }

    pub async fn enroll_biometric(
        &mut self,
        biometric_provider: &dyn BiometricProvider,
        key_store: &dyn KeyStore,
    ) -> Result<()> {
        match self {
            RegistrationSession::Cloud(provider) => provider.enroll_biometric(biometric_provider, key_store).await,
            RegistrationSession::OnPremise(provider) => {
                provider.enroll_biometric(biometric_provider, key_store).await
            }
        }
    }

    pub async fn finalize(self) -> Result<Authenticator> {
        match self {
            RegistrationSession::Cloud(provider) => provider.finalize().await,
            RegistrationSession::OnPremise(provider) => provider.finalize().await,
        }
    }
}

pub struct RegistrationController;

impl RegistrationController {
    /// Parse `bootstrap_json`, dispatch to the matching provider, and drive its `initiate`.
    /// Cloud is attempted first; on-premise second; anything else is `invalidRegistrationData`.
    pub async fn initiate(
        bootstrap_json: &str,
        account_name: String,
        push_token: Option<String>,
        additional_data: Option<Map<String, Value>>,
        http_client: Arc<dyn HttpClient>,
        oauth_provider: Arc<dyn OAuthProvider>,
    ) -> Result<RegistrationSession> {
        if let Ok(bootstrap) = serde_json::from_str::<CloudBootstrap>(bootstrap_json) {
            let mut provider = CloudRegistrationProvider::new(bootstrap, http_client);
            provider.initiate(account_name, push_token, additional_data).await?;
            return Ok(RegistrationSession::Cloud(provider));
        }

        if let Ok(bootstrap) = serde_json::from_str::<OnPremiseBootstrap>(bootstrap_json) {
            let mut provider = OnPremiseRegistrationProvider::new(bootstrap, http_client, oauth_provider);
            provider.initiate(account_name, push_token, additional_data).await?;
            return Ok(RegistrationSession::OnPremise(provider));
        }

        Err(MfaError::InvalidRegistrationData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_premise_bootstrap_flag_parse() {
        let mut bootstrap = OnPremiseBootstrap {
            code: "c".into(),
            options: "ignoreSslCerts=true".into(),
            details_url: "https://onprem.example/details".into(),
            version: 1,
            client_id: "client".into(),
        };
        assert!(bootstrap.ignore_ssl_certificate());

        bootstrap.options = "ignoreSslCerts=false".into();
        assert!(!bootstrap.ignore_ssl_certificate());

        bootstrap.options = String::new();
        assert!(!bootstrap.ignore_ssl_certificate());
    }

    #[test]
    fn cloud_bootstrap_parses_distilled_shape() {
        let json = r#"{"code":"abc123","accountName":"Savings Account","registrationUri":"https://server/v1.0/authenticators/registration","version":{"number":"1.0.0","platform":"com.ibm.security.access.verify"}}"#;
        let bootstrap: CloudBootstrap = serde_json::from_str(json).unwrap();
        assert_eq!(bootstrap.domain().as_deref(), Some("server"));
    }
}
