//! Cloud (SaaS tenant) registration provider.

use super::CloudBootstrap;
use crate::algorithm::SigningAlgorithm;
use crate::authenticator::{CloudAuthenticator, OAuthToken};
use crate::capabilities::{
    BiometricProvider, BiometryKind, DefaultPrivateKeyStore, HttpClient, HttpMethod, HttpRequest, KeyStore,
    PrivateKeyStore,
};
use crate::crypto::SigningKeyPair;
use crate::error::{MfaError, Result};
use crate::factor::{BiometricFactorInfo, UserPresenceFactorInfo};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
struct CloudMethodAttributes {
    #[serde(rename = "supportedAlgorithms", default)]
    supported_algorithms: Vec<String>,
    algorithm: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CloudMethodWire {
    #[serde(rename = "enrollmentUri")]
    enrollment_uri: String,
    #[serde(default)]
    attributes: Option<CloudMethodAttributes>,
    #[serde(default)]
    enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct CloudMetadataWire {
    #[serde(rename = "authenticationMethods", default)]
    authentication_methods: HashMap<String, CloudMethodWire>,
    #[serde(rename = "registrationUri")]
    registration_uri: String,
    #[serde(rename = "serviceName")]
    service_name: String,
    #[serde(default)]
    theme: HashMap<String, String>,
    #[serde(rename = "customAttributes", default)]
    custom_attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct CloudInitializationInfo {
    id: String,
    metadata: CloudMetadataWire,
}

#[derive(Debug, Clone, Deserialize)]
struct CloudTokenWire {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Debug, Serialize)]
struct EnrollmentAttributeEntry {
    name: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct EnrollmentAttributes {
    #[serde(rename = "signedData")]
    signed_data: String,
    #[serde(rename = "publicKey")]
    public_key: String,
    #[serde(rename = "deviceSecurity")]
    device_security: bool,
    algorithm: String,
    #[serde(rename = "additionalData")]
    additional_data: Vec<EnrollmentAttributeEntry>,
}

#[derive(Debug, Serialize)]
struct EnrollmentRequestEntry {
    #[serde(rename = "subType")]
    sub_type: String,
    enabled: bool,
    attributes: EnrollmentAttributes,
}

#[derive(Debug, Deserialize)]
struct EnrollmentResponseEntry {
    #[serde(rename = "subType")]
    sub_type: String,
    id: String,
}

pub struct CloudRegistrationProvider {
    pub bootstrap: CloudBootstrap,
    http_client: Arc<dyn HttpClient>,
    init_info: Option<CloudInitializationInfo>,
    token: Option<OAuthToken>,
    account_name: String,
    push_token: Option<String>,
    pub biometric: Option<BiometricFactorInfo>,
    pub user_presence: Option<UserPresenceFactorInfo>,
}

impl CloudRegistrationProvider {
    pub fn new(bootstrap: CloudBootstrap, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            bootstrap,
            http_client,
            init_info: None,
            token: None,
            account_name: String::new(),
            push_token: None,
            biometric: None,
            user_presence: None,
        }
    }

    /// Looks up an advertised signature method. `totp` is never a valid key here: the cloud
    /// provider explicitly ignores that entry even though it rides along in the same map.
    fn method(&self, key: &str) -> Result<&CloudMethodWire> {
        if key == "totp" {
            return Err(MfaError::SignatureMethodNotEnabled(key.to_string()));
        }
        let init_info = self.init_info.as_ref().ok_or(MfaError::InvalidState)?;
        init_info
            .metadata
            .authentication_methods
            .get(key)
            .ok_or_else(|| MfaError::SignatureMethodNotEnabled(key.to_string()))
    }

    pub fn can_enroll_biometric(&self) -> bool {
        self.method("signature_face").map(|m| m.enabled).unwrap_or(false)
    }

    pub fn can_enroll_user_presence(&self) -> bool {
        self.method("signature_userPresence").map(|m| m.enabled).unwrap_or(false)
    }

    pub async fn initiate(
        &mut self,
        account_name: String,
        push_token: Option<String>,
        additional_data: Option<Map<String, Value>>,
    ) -> Result<()> {
        self.account_name = account_name.clone();
        self.push_token = push_token.clone();

        let mut attributes = additional_data.unwrap_or_default();
        attributes.remove("applicationName");
        attributes.insert("accountName".to_string(), Value::String(account_name));
        if let Some(push_token) = push_token {
            attributes.insert("pushToken".to_string(), Value::String(push_token));
        }

        let request = HttpRequest::new(HttpMethod::Post, self.bootstrap.registration_uri.clone())
            .query("skipTotpEnrollment", "true")
            .json(serde_json::json!({ "code": self.bootstrap.code, "attributes": attributes }));
        let response = self.http_client.execute(request).await?;
        response.ensure_success()?;

        let init_info: CloudInitializationInfo = response.json()?;
        let token: CloudTokenWire = response.json()?;

        self.token = Some(OAuthToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            additional_data: Map::new(),
        });
        self.init_info = Some(init_info);
        Ok(())
    }

    /// Shared enrollment algorithm for both the user-presence and biometric paths: pick the
    /// advertised method, generate a key, sign the server's init id, save the key, and post the
    /// enrollment record.
    async fn perform_signature_enrollment(
        &mut self,
        method_key: &str,
        sub_type: &str,
        key_store: &dyn KeyStore,
    ) -> Result<(String, String)> {
        let init_info = self.init_info.as_ref().ok_or(MfaError::InvalidState)?.clone();
        let method = self.method(method_key)?.clone();
        if !method.enabled {
            return Err(MfaError::SignatureMethodNotEnabled(method_key.to_string()));
        }
        let attributes = method
            .attributes
            .as_ref()
            .ok_or_else(|| MfaError::SignatureMethodNotEnabled(method_key.to_string()))?;
        let algorithm = SigningAlgorithm::parse(&attributes.algorithm)?;

        let key_pair = SigningKeyPair::generate()?;
        let signed_data = key_pair.sign_and_encode(algorithm, init_info.id.as_bytes());
        let public_key = key_pair.public_key_x509_base64()?;

        let private_key_store = DefaultPrivateKeyStore { key_store };
        let key_handle = private_key_store.save(&key_pair, sub_type).await?;

        let token = self.token.as_ref().ok_or(MfaError::InvalidState)?;
        let body = vec![EnrollmentRequestEntry {
            sub_type: sub_type.to_string(),
            enabled: true,
            attributes: EnrollmentAttributes {
                signed_data,
                public_key,
                device_security: sub_type != "userPresence",
                algorithm: algorithm.cloud_spelling().to_string(),
                additional_data: vec![EnrollmentAttributeEntry {
                    name: "name".to_string(),
                    value: key_handle.clone(),
                }],
            },
        }];

        let request = HttpRequest::new(HttpMethod::Post, method.enrollment_uri.clone())
            .bearer(&token.access_token)
            .json(serde_json::to_value(&body)?);
        let response = self.http_client.execute(request).await?;
        response.ensure_success()?;

        let entries: Vec<EnrollmentResponseEntry> = response.json()?;
        let entry = entries
            .into_iter()
            .find(|e| e.sub_type == sub_type)
            .ok_or_else(|| MfaError::EnrollmentFailed(format!("no {sub_type} entry in enrollment response")))?;

        Ok((entry.id, key_handle))
    }

    pub async fn enroll_user_presence(&mut self, key_store: &dyn KeyStore) -> Result<()> {
        let (id, name) = self
            .perform_signature_enrollment("signature_userPresence", "userPresence", key_store)
            .await?;
        let algorithm = self.method("signature_userPresence")?.attributes.as_ref().unwrap().algorithm.clone();
        self.user_presence = Some(UserPresenceFactorInfo {
            id,
            name,
            algorithm: SigningAlgorithm::parse(&algorithm)?,
        });
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
        let (method_key, sub_type) = match result.kind {
            BiometryKind::FaceId => ("signature_face", "face"),
            BiometryKind::TouchId => ("signature_fingerprint", "fingerprint"),
            BiometryKind::Other => {
                return Err(MfaError::EnrollmentFailed("unsupported biometry kind".to_string()))
            }
        };
        let (id, name) = self.perform_signature_enrollment(method_key, sub_type, key_store).await?;
        let algorithm = self.method(method_key)?.attributes.as_ref().unwrap().algorithm.clone();
        self.biometric = Some(BiometricFactorInfo {
            id,
            name,
            algorithm: SigningAlgorithm::parse(&algorithm)?,
        });
        Ok(())
    }

    pub async fn finalize(self) -> Result<CloudAuthenticator> {
        let init_info = self.init_info.ok_or(MfaError::InvalidState)?;
        let token = self.token.ok_or(MfaError::InvalidState)?;

        let request = HttpRequest::new(HttpMethod::Post, self.bootstrap.registration_uri.clone())
            .query("metadataInResponse", "false")
            .bearer(&token.access_token)
            .json(serde_json::json!({
                "refreshToken": token.refresh_token,
                "attributes": {
                    "accountName": self.account_name,
                    "pushToken": self.push_token,
                },
            }));
        let response = self.http_client.execute(request).await?;
        response.ensure_success()?;
        let refreshed: CloudTokenWire = response.json()?;

        let transaction_uri = replace_last_path_segment(
            &self.bootstrap.registration_uri,
            &format!("{}/verifications", init_info.id),
        );

        Ok(CloudAuthenticator {
            id: init_info.id,
            account_name: self.account_name,
            service_name: init_info.metadata.service_name,
            token: OAuthToken {
                access_token: refreshed.access_token,
                refresh_token: refreshed.refresh_token,
                expires_in: refreshed.expires_in,
                additional_data: Map::new(),
            },
            refresh_uri: self.bootstrap.registration_uri,
            transaction_uri,
            theme: init_info.metadata.theme,
            certificate: None,
            biometric: self.biometric,
            user_presence: self.user_presence,
        })
    }

    /// In-app initiation (no QR scan): exchange an account name for a fresh bootstrap payload
    /// using a token the host already holds, returning the raw JSON body for the caller to feed
    /// back into [`super::RegistrationController::initiate`].
    pub async fn initiate_in_app(
        client_id: &str,
        account_name: &str,
        access_token: &str,
        initiation_uri: &str,
        http_client: &dyn HttpClient,
    ) -> Result<String> {
        let request = HttpRequest::new(HttpMethod::Post, initiation_uri)
            .bearer(access_token)
            .json(serde_json::json!({ "clientId": client_id, "accountName": account_name }));
        let response = http_client.execute(request).await?;
        response.ensure_success()?;
        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }
}

fn replace_last_path_segment(uri: &str, replacement: &str) -> String {
    match uri.rfind('/') {
        Some(idx) => format!("{}/{}", &uri[..idx], replacement),
        None => replacement.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{MockBiometricProvider, MockHttpClient, MockKeyStore};

    fn bootstrap() -> CloudBootstrap {
        CloudBootstrap {
            code: "abc123".to_string(),
            account_name: "Savings Account".to_string(),
            registration_uri: "https://server/v1.0/authenticators/registration".to_string(),
            version: super::super::BootstrapVersion { number: "1.0.0".to_string(), platform: "ios".to_string() },
        }
    }

    fn initiation_body() -> Value {
        serde_json::json!({
            "id": "auth-1",
            "metadata": {
                "authenticationMethods": {
                    "signature_userPresence": {
                        "enrollmentUri": "https://server/v1.0/authenticators/auth-1/enrollment",
                        "attributes": {"supportedAlgorithms": ["SHA256"], "algorithm": "SHA256"},
                        "enabled": true
                    },
                    "totp": {"enrollmentUri": "https://server/totp", "enabled": true}
                },
                "registrationUri": "https://server/v1.0/authenticators/registration",
                "serviceName": "Verify",
                "theme": {},
                "customAttributes": {}
            },
            "access_token": "tok-1",
            "refresh_token": "ref-1",
            "expires_in": 3600
        })
    }

    #[tokio::test]
    async fn initiate_filters_totp_and_exposes_flags() {
        let http = MockHttpClient::new();
        http.on("https://server/v1.0/authenticators/registration", 200, initiation_body());
        let mut provider = CloudRegistrationProvider::new(bootstrap(), Arc::new(http));
        provider.initiate("Savings Account".to_string(), None, None).await.unwrap();
        assert!(provider.can_enroll_user_presence());
        assert!(!provider.can_enroll_biometric());
    }

    #[tokio::test]
    async fn enroll_user_presence_happy_path() {
        let http = MockHttpClient::new();
        http.on("https://server/v1.0/authenticators/registration", 200, initiation_body());
        http.on(
            "https://server/v1.0/authenticators/auth-1/enrollment",
            200,
            serde_json::json!([{"subType": "userPresence", "id": "f-1"}]),
        );
        let mut provider = CloudRegistrationProvider::new(bootstrap(), Arc::new(http));
        provider.initiate("Savings Account".to_string(), None, None).await.unwrap();

        let key_store = MockKeyStore::new();
        provider.enroll_user_presence(&key_store).await.unwrap();
        assert!(provider.user_presence.is_some());
    }

    #[tokio::test]
    async fn enroll_user_presence_resolves_sha256_alias_to_rsasha256_on_wire() {
        let http = Arc::new(MockHttpClient::new());
        http.on("https://server/v1.0/authenticators/registration", 200, initiation_body());
        http.on(
            "https://server/v1.0/authenticators/auth-1/enrollment",
            200,
            serde_json::json!([{"subType": "userPresence", "id": "f-1"}]),
        );
        let mut provider = CloudRegistrationProvider::new(bootstrap(), http.clone());
        provider.initiate("Savings Account".to_string(), None, None).await.unwrap();

        let key_store = MockKeyStore::new();
        provider.enroll_user_presence(&key_store).await.unwrap();

        let request = http
            .last_request_to("https://server/v1.0/authenticators/auth-1/enrollment")
            .expect("enrollment request recorded");
        let body = request.json_body.expect("enrollment request has a json body");
        assert_eq!(body[0]["attributes"]["algorithm"], "RSASHA256");
    }

    #[tokio::test]
    async fn enroll_user_presence_request_matches_cloud_wire_shape() {
        let http = Arc::new(MockHttpClient::new());
        http.on("https://server/v1.0/authenticators/registration", 200, initiation_body());
        http.on(
            "https://server/v1.0/authenticators/auth-1/enrollment",
            200,
            serde_json::json!([{"subType": "userPresence", "id": "f-1"}]),
        );
        let mut provider = CloudRegistrationProvider::new(bootstrap(), http.clone());
        provider.initiate("Savings Account".to_string(), None, None).await.unwrap();

        let key_store = MockKeyStore::new();
        provider.enroll_user_presence(&key_store).await.unwrap();

        let request = http
            .last_request_to("https://server/v1.0/authenticators/auth-1/enrollment")
            .expect("enrollment request recorded");
        let body = request.json_body.expect("enrollment request has a json body");
        let entry = &body[0];
        assert_eq!(entry["subType"], "userPresence");
        assert_eq!(entry["enabled"], true);
        assert_eq!(entry["attributes"]["deviceSecurity"], false);
        assert!(entry["attributes"]["signedData"].is_string());
        assert!(entry["attributes"]["publicKey"].is_string());
        assert_eq!(entry["attributes"]["additionalData"][0]["name"], "name");
        assert!(entry["attributes"]["additionalData"][0]["value"].is_string());
    }

    #[tokio::test]
    async fn enroll_biometric_requires_availability() {
        let http = MockHttpClient::new();
        http.on("https://server/v1.0/authenticators/registration", 200, initiation_body());
        let mut provider = CloudRegistrationProvider::new(bootstrap(), Arc::new(http));
        provider.initiate("Savings Account".to_string(), None, None).await.unwrap();

        let key_store = MockKeyStore::new();
        let biometric = MockBiometricProvider { available: false, ..Default::default() };
        let err = provider.enroll_biometric(&biometric, &key_store).await.unwrap_err();
        assert!(matches!(err, MfaError::BiometryFailed(_)));
    }
}
