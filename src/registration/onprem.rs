//! On-premise (access-manager-fronted) registration provider.

use super::OnPremiseBootstrap;
use crate::algorithm::SigningAlgorithm;
use crate::authenticator::{OAuthToken, OnPremiseAuthenticator};
use crate::capabilities::{
    BiometricProvider, BiometryKind, DefaultPrivateKeyStore, HttpClient, HttpMethod, HttpRequest, KeyStore,
    OAuthProvider, PrivateKeyStore,
};
use crate::crypto::SigningKeyPair;
use crate::error::{MfaError, Result};
use crate::factor::{BiometricFactorInfo, UserPresenceFactorInfo};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

const USER_PRESENCE_URN: &str = "urn:ibm:security:authentication:asf:mechanism:mobile_user_approval:user_presence";
const FINGERPRINT_URN: &str = "urn:ibm:security:authentication:asf:mechanism:mobile_user_approval:fingerprint";
const DEFAULT_ONPREM_ALGORITHM: &str = "SHA512withRSA";

#[derive(Debug, Clone, Deserialize)]
struct OnPremiseMetadataWire {
    #[serde(rename = "serviceName")]
    service_name: String,
    #[serde(default)]
    theme: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OnPremiseDetailsWire {
    authntrxn_endpoint: String,
    #[serde(default)]
    discovery_mechanisms: Vec<String>,
    enrollment_endpoint: String,
    #[serde(default)]
    qrlogin_endpoint: Option<String>,
    version: String,
    token_endpoint: String,
    metadata: OnPremiseMetadataWire,
    /// Per-mechanism algorithm override, keyed by discovery URN. Absent entries fall back to the
    /// default algorithm set's `SHA512withRSA`.
    #[serde(default)]
    mechanism_algorithms: std::collections::HashMap<String, String>,
}

#[derive(Clone)]
struct DiscoveredMethod {
    enrollment_uri: String,
    /// Unparsed server spelling; parsed at enrollment time so a bad value surfaces as
    /// `invalidAlgorithm` from `enrollBiometric`/`enrollUserPresence`, not from `initiate`.
    algorithm: String,
}

pub struct OnPremiseRegistrationProvider {
    pub bootstrap: OnPremiseBootstrap,
    http_client: Arc<dyn HttpClient>,
    oauth_provider: Arc<dyn OAuthProvider>,
    details: Option<OnPremiseDetailsWire>,
    token: Option<OAuthToken>,
    account_name: String,
    authenticator_id: Option<String>,
    user_presence_method: Option<DiscoveredMethod>,
    biometric_method: Option<DiscoveredMethod>,
    pub biometric: Option<BiometricFactorInfo>,
    pub user_presence: Option<UserPresenceFactorInfo>,
}

impl OnPremiseRegistrationProvider {
    pub fn new(
        bootstrap: OnPremiseBootstrap,
        http_client: Arc<dyn HttpClient>,
        oauth_provider: Arc<dyn OAuthProvider>,
    ) -> Self {
        Self {
            bootstrap,
            http_client,
            oauth_provider,
            details: None,
            token: None,
            account_name: String::new(),
            authenticator_id: None,
            user_presence_method: None,
            biometric_method: None,
            biometric: None,
            user_presence: None,
        }
    }

    pub fn can_enroll_user_presence(&self) -> bool {
        self.user_presence_method.is_some()
    }

    pub fn can_enroll_biometric(&self) -> bool {
        self.biometric_method.is_some()
    }

    pub async fn initiate(
        &mut self,
        account_name: String,
        push_token: Option<String>,
        additional_data: Option<Map<String, Value>>,
    ) -> Result<()> {
        self.account_name = account_name.clone();

        let request = HttpRequest::new(HttpMethod::Get, self.bootstrap.details_url.clone());
        let response = self.http_client.execute(request).await?;
        response.ensure_success()?;
        let details: OnPremiseDetailsWire = response.json()?;

        let mut attributes = additional_data.unwrap_or_default();
        let excess: Vec<String> = attributes.keys().skip(10).cloned().collect();
        for key in excess {
            attributes.remove(&key);
        }
        attributes.insert("tenant_id".to_string(), Value::String(Uuid::new_v4().to_string()));
        attributes.insert("account_name".to_string(), Value::String(account_name));
        if let Some(push_token) = push_token {
            attributes.insert("push_token".to_string(), Value::String(push_token));
        }

        let exchange = self
            .oauth_provider
            .exchange_code(&self.bootstrap.code, &["mmfaAuthn".to_string()], attributes)
            .await?;

        let authenticator_id = exchange
            .additional_data
            .get("authenticator_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(MfaError::MissingAuthenticatorIdentifier)?;

        let algorithm_for = |urn: &str| {
            details
                .mechanism_algorithms
                .get(urn)
                .cloned()
                .unwrap_or_else(|| DEFAULT_ONPREM_ALGORITHM.to_string())
        };

        if details.discovery_mechanisms.iter().any(|m| m == USER_PRESENCE_URN) {
            self.user_presence_method = Some(DiscoveredMethod {
                enrollment_uri: details.enrollment_endpoint.clone(),
                algorithm: algorithm_for(USER_PRESENCE_URN),
            });
        }
        if details.discovery_mechanisms.iter().any(|m| m == FINGERPRINT_URN) {
            self.biometric_method = Some(DiscoveredMethod {
                enrollment_uri: details.enrollment_endpoint.clone(),
                algorithm: algorithm_for(FINGERPRINT_URN),
            });
        }

        self.authenticator_id = Some(authenticator_id);
        self.token = Some(OAuthToken {
            access_token: exchange.access_token,
            refresh_token: exchange.refresh_token,
            expires_in: exchange.expires_in,
            additional_data: exchange.additional_data,
        });
        self.details = Some(details);
        Ok(())
    }

    /// SCIM PATCH enrollment, shared by both factor kinds — only the attribute path and subtype
    /// tag differ. The server-advertised algorithm is resolved before the key pair is generated
    /// or saved, so an unparseable algorithm leaves no key behind.
    async fn perform_scim_enrollment(
        &mut self,
        sub_type: &str,
        method: &DiscoveredMethod,
        key_store: &dyn KeyStore,
    ) -> Result<(String, String, SigningAlgorithm)> {
        let algorithm = SigningAlgorithm::parse(&method.algorithm)?;

        let token = self.token.as_ref().ok_or(MfaError::InvalidState)?;

        let key_pair = SigningKeyPair::generate()?;
        let public_key = key_pair.public_key_x509_base64()?;

        let private_key_store = DefaultPrivateKeyStore { key_store };
        let key_handle = private_key_store.save(&key_pair, sub_type).await?;

        let attribute_path = format!(
            "urn:ietf:params:scim:schemas:extension:isam:1.0:MMFA:Authenticator:{sub_type}Methods"
        );
        let body = serde_json::json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
            "Operations": [{
                "op": "add",
                "path": attribute_path,
                "value": [{
                    "enabled": true,
                    "keyHandle": key_handle,
                    "algorithm": algorithm.onprem_spelling(),
                    "publicKey": public_key,
                }]
            }]
        });

        let request = HttpRequest::new(HttpMethod::Patch, method.enrollment_uri.clone())
            .query("attributes", attribute_path)
            .bearer(&token.access_token)
            .json(body);
        let response = self.http_client.execute(request).await?;
        response.ensure_success()?;

        // The server never echoes a factor id back; mint one for local correlation only.
        Ok((Uuid::new_v4().to_string(), key_handle, algorithm))
    }

    pub async fn enroll_user_presence(&mut self, key_store: &dyn KeyStore) -> Result<()> {
        let method = self
            .user_presence_method
            .as_ref()
            .ok_or_else(|| MfaError::SignatureMethodNotEnabled("user_presence".to_string()))?
            .clone();
        let (id, name, algorithm) = self.perform_scim_enrollment("userPresence", &method, key_store).await?;
        self.user_presence = Some(UserPresenceFactorInfo { id, name, algorithm });
        Ok(())
    }

    pub async fn enroll_biometric(
        &mut self,
        biometric_provider: &dyn BiometricProvider,
        key_store: &dyn KeyStore,
    ) -> Result<()> {
        if !biometric_provider.is_available().await {
            return Err(MfaError::BiometryFailed("biometric sensor unavailable".to_string()));
        }
        let result = biometric_provider.authenticate("Enroll biometric sign-in").await?;
        // The on-premise server does not distinguish face from fingerprint; both map to the
        // single "fingerprint" subtype it understands.
        match result.kind {
            BiometryKind::FaceId | BiometryKind::TouchId => {}
            BiometryKind::Other => {
                return Err(MfaError::EnrollmentFailed("unsupported biometry kind".to_string()))
            }
        }
        let method = self
            .biometric_method
            .as_ref()
            .ok_or_else(|| MfaError::SignatureMethodNotEnabled("fingerprint".to_string()))?
            .clone();
        let (id, name, algorithm) = self.perform_scim_enrollment("biometric", &method, key_store).await?;
        self.biometric = Some(BiometricFactorInfo { id, name, algorithm });
        Ok(())
    }

    /// Unlike the cloud provider, on-premise finalization issues no further network call — the
    /// token obtained during `initiate` is already the long-lived one.
    pub async fn finalize(self) -> Result<OnPremiseAuthenticator> {
        let details = self.details.ok_or(MfaError::InvalidState)?;
        let token = self.token.ok_or(MfaError::InvalidState)?;
        let authenticator_id = self.authenticator_id.ok_or(MfaError::MissingAuthenticatorIdentifier)?;

        Ok(OnPremiseAuthenticator {
            id: authenticator_id,
            account_name: self.account_name,
            service_name: details.metadata.service_name,
            token,
            refresh_uri: details.token_endpoint,
            transaction_uri: details.authntrxn_endpoint,
            theme: details.metadata.theme,
            certificate: None,
            biometric: self.biometric,
            user_presence: self.user_presence,
            qr_login_uri: details.qrlogin_endpoint,
            trust_all_tls: self.bootstrap.ignore_ssl_certificate(),
            client_id: self.bootstrap.client_id,
        })
    }
}
