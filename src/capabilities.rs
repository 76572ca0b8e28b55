//! Capability traits for the collaborators this crate treats as pure interfaces: the HTTP
//! client, the secure local key store, the biometric evaluator, and the on-premise OAuth
//! provider. None of these are implemented for a real platform here — a host supplies concrete
//! implementations (a `reqwest`-backed HTTP client, a keychain-backed key store, a platform
//! biometry binding, an OAuth client). The `Mock*` types below exist for this crate's own tests.

use crate::crypto::SigningKeyPair;
use crate::error::{MfaError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
}

/// A request descriptor, built by a provider/service and handed to the host's HTTP capability.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub query: Vec<(String, String)>,
    pub json_body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            query: Vec::new(),
            json_body: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.json_body = Some(body);
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Into::into)
    }

    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(MfaError::Transport {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// In-memory HTTP stub for tests: matches the longest registered URL prefix, and records every
/// request it served so a caller can assert on the outbound wire shape.
#[derive(Default)]
pub struct MockHttpClient {
    responses: Mutex<Vec<(String, HttpResponse)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, url_prefix: impl Into<String>, status: u16, body: Value) {
        let body = serde_json::to_vec(&body).expect("mock response must serialize");
        self.responses
            .lock()
            .unwrap()
            .push((url_prefix.into(), HttpResponse { status, body }));
    }

    /// The most recent request whose URL starts with `url_prefix`, if any were recorded.
    pub fn last_request_to(&self, url_prefix: &str) -> Option<HttpRequest> {
        self.requests.lock().unwrap().iter().rev().find(|r| r.url.starts_with(url_prefix)).cloned()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let responses = self.responses.lock().unwrap();
        responses
            .iter()
            .rev()
            .find(|(prefix, _)| request.url.starts_with(prefix.as_str()))
            .map(|(_, response)| response.clone())
            .ok_or_else(|| MfaError::Transport {
                status: 0,
                body: format!("no mock response registered for {}", request.url),
            })
    }
}

// ---------------------------------------------------------------------------------------------
// Key store
// ---------------------------------------------------------------------------------------------

#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn store(&self, label: &str, private_key_der: &[u8], biometry_gated: bool) -> Result<()>;
    async fn read(&self, label: &str) -> Result<Vec<u8>>;
    async fn rename(&self, old_label: &str, new_label: &str) -> Result<()>;
    async fn delete(&self, label: &str) -> Result<()>;
    async fn exists(&self, label: &str) -> Result<bool>;
}

#[derive(Default)]
pub struct MockKeyStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl KeyStore for MockKeyStore {
    async fn store(&self, label: &str, private_key_der: &[u8], _biometry_gated: bool) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(label) {
            return Err(MfaError::DuplicateKey(label.to_string()));
        }
        entries.insert(label.to_string(), private_key_der.to_vec());
        Ok(())
    }

    async fn read(&self, label: &str) -> Result<Vec<u8>> {
        self.entries
            .lock()
            .unwrap()
            .get(label)
            .cloned()
            .ok_or_else(|| MfaError::InvalidKey(label.to_string()))
    }

    async fn rename(&self, old_label: &str, new_label: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let value = entries
            .remove(old_label)
            .ok_or_else(|| MfaError::InvalidKey(old_label.to_string()))?;
        entries.insert(new_label.to_string(), value);
        Ok(())
    }

    async fn delete(&self, label: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(label);
        Ok(())
    }

    async fn exists(&self, label: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().contains_key(label))
    }
}

// ---------------------------------------------------------------------------------------------
// Private key storage (the "biometric callback for key storage" design note)
// ---------------------------------------------------------------------------------------------

/// Saves a freshly generated key pair and returns the label it is saved under. Modeled as a
/// trait rather than a bare closure so a host can carry state (e.g. a handle to its keychain).
#[async_trait]
pub trait PrivateKeyStore: Send + Sync {
    async fn save(&self, key_pair: &SigningKeyPair, subtype: &str) -> Result<String>;
}

/// The default save behaviour: a UUID-suffixed label (`"<uuid>.biometrics"` /
/// `"<uuid>.userPresence"`). This exact convention matters because the server echoes the label
/// back as the enrolled factor's `name`.
pub struct DefaultPrivateKeyStore<'a> {
    pub key_store: &'a dyn KeyStore,
}

#[async_trait]
impl<'a> PrivateKeyStore for DefaultPrivateKeyStore<'a> {
    async fn save(&self, key_pair: &SigningKeyPair, subtype: &str) -> Result<String> {
        let suffix = if subtype == "userPresence" { "userPresence" } else { "biometrics" };
        let label = format!("{}.{}", Uuid::new_v4(), suffix);
        let der = key_pair.private_key_pkcs8_der()?;
        self.key_store.store(&label, &der, subtype != "userPresence").await?;
        Ok(label)
    }
}

// ---------------------------------------------------------------------------------------------
// Biometric evaluation
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometryKind {
    FaceId,
    TouchId,
    Other,
}

#[derive(Debug, Clone, Copy)]
pub struct BiometricAuthResult {
    pub kind: BiometryKind,
}

#[async_trait]
pub trait BiometricProvider: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn authenticate(&self, reason: &str) -> Result<BiometricAuthResult>;
}

pub struct MockBiometricProvider {
    pub available: bool,
    pub kind: BiometryKind,
    pub force_fail: bool,
}

impl Default for MockBiometricProvider {
    fn default() -> Self {
        Self { available: true, kind: BiometryKind::FaceId, force_fail: false }
    }
}

#[async_trait]
impl BiometricProvider for MockBiometricProvider {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn authenticate(&self, reason: &str) -> Result<BiometricAuthResult> {
        if !self.available {
            return Err(MfaError::BiometryFailed(format!("biometry unavailable for: {reason}")));
        }
        if self.force_fail {
            return Err(MfaError::FailedBiometryVerification(format!("forced failure for: {reason}")));
        }
        Ok(BiometricAuthResult { kind: self.kind })
    }
}

// ---------------------------------------------------------------------------------------------
// On-premise OAuth exchange
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OAuthExchangeResult {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub additional_data: Map<String, Value>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        scope: &[String],
        extra_params: Map<String, Value>,
    ) -> Result<OAuthExchangeResult>;
}

pub struct MockOAuthProvider {
    pub authenticator_id: Option<String>,
}

impl Default for MockOAuthProvider {
    fn default() -> Self {
        Self { authenticator_id: Some(Uuid::new_v4().to_string()) }
    }
}

#[async_trait]
impl OAuthProvider for MockOAuthProvider {
    async fn exchange_code(
        &self,
        _code: &str,
        _scope: &[String],
        mut extra_params: Map<String, Value>,
    ) -> Result<OAuthExchangeResult> {
        if let Some(id) = &self.authenticator_id {
            extra_params.entry("authenticator_id".to_string()).or_insert_with(|| Value::String(id.clone()));
        }
        Ok(OAuthExchangeResult {
            access_token: "mock-access-token".to_string(),
            refresh_token: "mock-refresh-token".to_string(),
            expires_in: 3600,
            additional_data: extra_params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_key_store_round_trip() {
        let store = MockKeyStore::new();
        store.store("label-1", b"material", false).await.unwrap();
        assert!(store.exists("label-1").await.unwrap());
        assert_eq!(store.read("label-1").await.unwrap(), b"material");
        store.rename("label-1", "label-2").await.unwrap();
        assert!(!store.exists("label-1").await.unwrap());
        assert!(store.exists("label-2").await.unwrap());
    }

    #[tokio::test]
    async fn mock_key_store_rejects_duplicate_label() {
        let store = MockKeyStore::new();
        store.store("label-1", b"a", false).await.unwrap();
        let err = store.store("label-1", b"b", false).await.unwrap_err();
        assert!(matches!(err, MfaError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn mock_biometric_success() {
        let provider = MockBiometricProvider::default();
        let result = provider.authenticate("enroll").await.unwrap();
        assert_eq!(result.kind, BiometryKind::FaceId);
    }

    #[tokio::test]
    async fn mock_biometric_failure_when_unavailable() {
        let provider = MockBiometricProvider { available: false, ..Default::default() };
        assert!(matches!(
            provider.authenticate("enroll").await,
            Err(MfaError::BiometryFailed(_))
        ));
    }

    #[tokio::test]
    async fn mock_oauth_provider_sets_authenticator_id() {
        let provider = MockOAuthProvider::default();
        let result = provider
            .exchange_code("code", &["mmfaAuthn".to_string()], Map::new())
            .await
            .unwrap();
        assert!(result.additional_data.contains_key("authenticator_id"));
    }

    #[tokio::test]
    async fn mock_http_client_matches_longest_prefix() {
        let client = MockHttpClient::new();
        client.on("https://server/v1.0", 200, serde_json::json!({"generic": true}));
        client.on("https://server/v1.0/authenticators/registration", 200, serde_json::json!({"specific": true}));

        let response = client
            .execute(HttpRequest::new(HttpMethod::Get, "https://server/v1.0/authenticators/registration"))
            .await
            .unwrap();
        let value: Value = response.json().unwrap();
        assert_eq!(value["specific"], true);
    }
}
