//! Pending-transaction polling, signing and completion, QR login, and token refresh.

pub mod cloud;
pub mod onprem;

pub use cloud::CloudService;
pub use onprem::OnPremiseService;

use crate::algorithm::SigningAlgorithm;
use crate::authenticator::Authenticator;
use crate::capabilities::{HttpClient, KeyStore};
use crate::crypto::encode_signature;
use crate::error::{MfaError, Result};
use crate::factor::FactorType;
use crate::transaction::{PendingTransaction, TransactionAction};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use sha2::{Sha256, Sha384, Sha512};
use signature::{SignatureEncoding, Signer};
use std::sync::Arc;

/// The next pending transaction together with how many are outstanding in total.
#[derive(Debug, Clone)]
pub struct NextTransaction {
    pub transaction: Option<PendingTransaction>,
    pub total_pending: u64,
}

/// A backend-specific driver for a single authenticator's transactions. The controller picks
/// which implementation to build from an [`Authenticator`] variant.
#[async_trait::async_trait]
pub trait MfaService: Send + Sync {
    async fn next_transaction(&self, filter: Option<&str>) -> Result<NextTransaction>;
    async fn complete_transaction(
        &self,
        transaction: &PendingTransaction,
        action: TransactionAction,
        signed_data: &str,
    ) -> Result<()>;
    async fn login(&self, qr_login_url: &str, code: &str) -> Result<()>;
    async fn refresh_token(
        &self,
        refresh_token: &str,
        account_name: &str,
        push_token: Option<&str>,
        additional_data: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<crate::authenticator::OAuthToken>;
}

/// Dispatches an [`Authenticator`] to the matching service, and holds the convenience-signing and
/// factor-lookup logic shared by both backends.
pub struct MFAServiceController {
    pub authenticator: Authenticator,
    http_client: Arc<dyn HttpClient>,
}

impl MFAServiceController {
    pub fn new(authenticator: Authenticator, http_client: Arc<dyn HttpClient>) -> Self {
        Self { authenticator, http_client }
    }

    /// The first enrolled factor whose key label equals the transaction's `key_name`.
    pub fn transaction_factor(&self, transaction: &PendingTransaction) -> Option<FactorType> {
        self.authenticator
            .enrolled_factors()
            .into_iter()
            .find(|factor| factor.key_label().as_deref() == Some(transaction.key_name.as_str()))
    }

    fn service(&self) -> Box<dyn MfaService + '_> {
        match &self.authenticator {
            Authenticator::Cloud(a) => Box::new(CloudService::new(a, self.http_client.clone())),
            Authenticator::OnPremise(a) => Box::new(OnPremiseService::new(a, self.http_client.clone())),
        }
    }

    pub async fn next_transaction(&self, filter: Option<&str>) -> Result<NextTransaction> {
        self.service().next_transaction(filter).await
    }

    pub async fn complete_transaction(
        &self,
        transaction: &PendingTransaction,
        action: TransactionAction,
        signed_data: &str,
    ) -> Result<()> {
        self.service().complete_transaction(transaction, action, signed_data).await
    }

    pub async fn login(&self, qr_login_url: &str, code: &str) -> Result<()> {
        self.service().login(qr_login_url, code).await
    }

    /// Exchange `refresh_token` for a new access/refresh pair and write it into the held
    /// authenticator. The caller is responsible for re-persisting the authenticator afterward.
    pub async fn refresh_token(
        &mut self,
        refresh_token: &str,
        account_name: String,
        push_token: Option<&str>,
        additional_data: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<()> {
        let token = self.service().refresh_token(refresh_token, &account_name, push_token, additional_data).await?;
        self.authenticator.set_account_name(account_name);
        self.authenticator.set_token(token);
        Ok(())
    }

    /// Convenience: locate the private key backing `factor` by its key-store label, hash and
    /// sign `transaction.data_to_sign` per the factor's algorithm, and complete with `verify`.
    pub async fn complete_transaction_with_factor(
        &self,
        transaction: &PendingTransaction,
        factor: &FactorType,
        key_store: &dyn KeyStore,
    ) -> Result<()> {
        let (label, algorithm) = factor
            .name_and_algorithm()
            .ok_or_else(|| MfaError::InvalidKey("factor has no backing key".to_string()))?;
        let der = key_store.read(&label).await?;
        let signed_data = sign_for_convenience_path(&der, algorithm, transaction.data_to_sign.as_bytes())?;
        self.complete_transaction(transaction, TransactionAction::Verify, &signed_data).await
    }
}

/// The convenience path's hash selection differs from [`SigningAlgorithm::hash`]: sha384 picks
/// SHA-384, sha512 picks SHA-512, and every other algorithm (including sha1/sha256) falls back to
/// SHA-256.
fn sign_for_convenience_path(private_key_der: &[u8], algorithm: SigningAlgorithm, data: &[u8]) -> Result<String> {
    let private_key = RsaPrivateKey::from_pkcs8_der(private_key_der)?;
    let signature = match algorithm {
        SigningAlgorithm::Sha384 => SigningKey::<Sha384>::new(private_key).sign(data).to_vec(),
        SigningAlgorithm::Sha512 => SigningKey::<Sha512>::new(private_key).sign(data).to_vec(),
        SigningAlgorithm::Sha1 | SigningAlgorithm::Sha256 => {
            SigningKey::<Sha256>::new(private_key).sign(data).to_vec()
        }
    };
    Ok(encode_signature(&signature))
}
