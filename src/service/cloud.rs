//! Cloud transaction polling and completion.

use super::{MfaService, NextTransaction};
use crate::authenticator::{CloudAuthenticator, OAuthToken};
use crate::capabilities::{HttpClient, HttpMethod, HttpRequest};
use crate::error::Result;
use crate::transaction::{PendingTransaction, TransactionAction};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct CloudTransactionWire {
    id: String,
    message: String,
    #[serde(rename = "postbackUri")]
    postback_uri: String,
    #[serde(rename = "keyName")]
    key_name: String,
    #[serde(rename = "factorId")]
    factor_id: String,
    #[serde(rename = "factorType")]
    factor_type: String,
    #[serde(rename = "dataToSign")]
    data_to_sign: String,
    #[serde(default)]
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct CloudRefreshedTokenWire {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct CloudTransactionListWire {
    #[serde(default)]
    transactions: Vec<CloudTransactionWire>,
    #[serde(rename = "totalPending", default)]
    total_pending: u64,
}

impl From<CloudTransactionWire> for PendingTransaction {
    fn from(wire: CloudTransactionWire) -> Self {
        PendingTransaction {
            id: wire.id,
            message: wire.message,
            postback_uri: wire.postback_uri,
            key_name: wire.key_name,
            factor_id: wire.factor_id,
            factor_type: wire.factor_type,
            data_to_sign: wire.data_to_sign,
            timestamp: wire.timestamp.unwrap_or_else(chrono::Utc::now),
            additional_data: Default::default(),
        }
    }
}

pub struct CloudService<'a> {
    authenticator: &'a CloudAuthenticator,
    http_client: Arc<dyn HttpClient>,
}

impl<'a> CloudService<'a> {
    pub fn new(authenticator: &'a CloudAuthenticator, http_client: Arc<dyn HttpClient>) -> Self {
        Self { authenticator, http_client }
    }
}

#[async_trait::async_trait]
impl<'a> MfaService for CloudService<'a> {
    async fn next_transaction(&self, filter: Option<&str>) -> Result<NextTransaction> {
        let mut request = HttpRequest::new(HttpMethod::Get, self.authenticator.transaction_uri.clone())
            .bearer(&self.authenticator.token.access_token);
        if let Some(filter) = filter {
            request = request.query("filter", filter);
        }
        let response = self.http_client.execute(request).await?;
        response.ensure_success()?;
        let list: CloudTransactionListWire = response.json()?;
        Ok(NextTransaction {
            total_pending: list.total_pending,
            transaction: list.transactions.into_iter().next().map(Into::into),
        })
    }

    async fn complete_transaction(
        &self,
        transaction: &PendingTransaction,
        action: TransactionAction,
        signed_data: &str,
    ) -> Result<()> {
        let request = HttpRequest::new(HttpMethod::Post, transaction.postback_uri.clone())
            .bearer(&self.authenticator.token.access_token)
            .json(serde_json::json!({ "action": action, "signedData": signed_data }));
        let response = self.http_client.execute(request).await?;
        response.ensure_success()
    }

    async fn login(&self, qr_login_url: &str, code: &str) -> Result<()> {
        let request = HttpRequest::new(HttpMethod::Post, qr_login_url)
            .bearer(&self.authenticator.token.access_token)
            .json(serde_json::json!({ "code": code }));
        let response = self.http_client.execute(request).await?;
        response.ensure_success()
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
        account_name: &str,
        push_token: Option<&str>,
        _additional_data: Option<Map<String, Value>>,
    ) -> Result<OAuthToken> {
        let request = HttpRequest::new(HttpMethod::Post, self.authenticator.refresh_uri.clone())
            .query("metadataInResponse", "false")
            .bearer(&self.authenticator.token.access_token)
            .json(serde_json::json!({
                "refreshToken": refresh_token,
                "accountName": account_name,
                "pushToken": push_token,
            }));
        let response = self.http_client.execute(request).await?;
        response.ensure_success()?;
        let refreshed: CloudRefreshedTokenWire = response.json()?;
        Ok(OAuthToken {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_in: refreshed.expires_in,
            additional_data: Map::new(),
        })
    }
}
