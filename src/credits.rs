//! Credit debit collaborator
//!
//! One `POST` per commit, forwarding the caller's `Authorization` header
//! unchanged. 200 is success, 401/403 unauthorized, anything else a failure
//! carrying the service's explanation.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::error::{EngineError, EngineResult};

#[async_trait::async_trait]
pub trait CreditDebit: Send + Sync {
    /// Debit exactly one credit for the caller identified by `authorization`.
    async fn debit_one(&self, authorization: Option<&str>) -> EngineResult<()>;
}

pub struct HttpCreditDebit {
    client: Client,
    endpoint: String,
}

impl HttpCreditDebit {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl CreditDebit for HttpCreditDebit {
    async fn debit_one(&self, authorization: Option<&str>) -> EngineResult<()> {
        let mut request = self.client.post(&self.endpoint);
        if let Some(auth) = authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        tracing::debug!(endpoint = %self.endpoint, "debiting one credit");
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(EngineError::Unauthorized),
            _ => {
                let body = response.text().await.unwrap_or_default();
                let detail = match serde_json::from_str::<serde_json::Value>(&body) {
                    Ok(json) => json.to_string(),
                    Err(_) => serde_json::json!({ "detail": body }).to_string(),
                };
                Err(EngineError::DebitFailed(format!("{status}: {detail}")))
            }
        }
    }
}
