//! On-premise transaction polling and completion (SCIM-shaped).

use super::{MfaService, NextTransaction};
use crate::authenticator::{OAuthToken, OnPremiseAuthenticator};
use crate::capabilities::{HttpClient, HttpMethod, HttpRequest};
use crate::error::Result;
use crate::transaction::{PendingTransaction, TransactionAction};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct OnPremiseTransactionWire {
    id: String,
    message: String,
    postback_uri: String,
    key_name: String,
    factor_id: String,
    factor_type: String,
    data_to_sign: String,
    #[serde(default)]
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct OnPremiseRefreshedTokenWire {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OnPremiseTransactionListWire {
    #[serde(default)]
    transactions: Vec<OnPremiseTransactionWire>,
    #[serde(default)]
    total_pending: u64,
}

impl From<OnPremiseTransactionWire> for PendingTransaction {
    fn from(wire: OnPremiseTransactionWire) -> Self {
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

pub struct OnPremiseService<'a> {
    authenticator: &'a OnPremiseAuthenticator,
    http_client: Arc<dyn HttpClient>,
}

impl<'a> OnPremiseService<'a> {
    pub fn new(authenticator: &'a OnPremiseAuthenticator, http_client: Arc<dyn HttpClient>) -> Self {
        Self { authenticator, http_client }
    }
}

#[async_trait::async_trait]
impl<'a> MfaService for OnPremiseService<'a> {
    async fn next_transaction(&self, filter: Option<&str>) -> Result<NextTransaction> {
        let mut request = HttpRequest::new(HttpMethod::Get, self.authenticator.transaction_uri.clone())
            .bearer(&self.authenticator.token.access_token);
        if let Some(filter) = filter {
            request = request.query("filter", filter);
        }
        let response = self.http_client.execute(request).await?;
        response.ensure_success()?;
        let list: OnPremiseTransactionListWire = response.json()?;
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
        let body = serde_json::json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
            "Operations": [{
                "op": "replace",
                "path": "urn:ietf:params:scim:schemas:extension:isam:1.0:MMFA:Transaction:status",
                "value": { "action": action, "signedData": signed_data }
            }]
        });
        let request = HttpRequest::new(HttpMethod::Patch, transaction.postback_uri.clone())
            .bearer(&self.authenticator.token.access_token)
            .json(body);
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
            .bearer(&self.authenticator.token.access_token)
            .json(serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
                "account_name": account_name,
                "push_token": push_token,
                "client_id": self.authenticator.client_id,
            }));
        let response = self.http_client.execute(request).await?;
        response.ensure_success()?;
        let refreshed: OnPremiseRefreshedTokenWire = response.json()?;
        Ok(OAuthToken {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_in: refreshed.expires_in,
            additional_data: Map::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::OAuthToken;
    use crate::capabilities::MockHttpClient;
    use serde_json::Map;
    use std::collections::HashMap;

    fn authenticator() -> OnPremiseAuthenticator {
        OnPremiseAuthenticator {
            id: "auth-1".to_string(),
            account_name: "Checking".to_string(),
            service_name: "Access Manager".to_string(),
            token: OAuthToken {
                access_token: "tok".to_string(),
                refresh_token: "ref".to_string(),
                expires_in: 3600,
                additional_data: Map::new(),
            },
            refresh_uri: "https://onprem.example/token".to_string(),
            transaction_uri: "https://onprem.example/authntrxn".to_string(),
            theme: HashMap::new(),
            certificate: None,
            biometric: None,
            user_presence: None,
            qr_login_uri: None,
            trust_all_tls: false,
            client_id: "client-1".to_string(),
        }
    }

    #[tokio::test]
    async fn next_transaction_parses_first_record() {
        let http = MockHttpClient::new();
        http.on(
            "https://onprem.example/authntrxn",
            200,
            serde_json::json!({
                "transactions": [{
                    "id": "t-1",
                    "message": "Approve login?",
                    "postback_uri": "https://onprem.example/authntrxn/t-1",
                    "key_name": "K-up",
                    "factor_id": "F0CF",
                    "factor_type": "userPresence",
                    "data_to_sign": "abc"
                }],
                "total_pending": 1
            }),
        );
        let authenticator = authenticator();
        let service = OnPremiseService::new(&authenticator, Arc::new(http));
        let next = service.next_transaction(None).await.unwrap();
        assert_eq!(next.total_pending, 1);
        assert_eq!(next.transaction.unwrap().key_name, "K-up");
    }
}
