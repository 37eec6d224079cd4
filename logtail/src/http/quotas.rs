//! Organization quotas API client

use std::sync::Arc;

use async_trait::async_trait;
use openapi_client::models::QuotasResponse;
use secrecy::SecretString;
use tracing::{debug, warn};

use crate::authn::token::TokenProvider;
use crate::errors::LogsError;
use crate::http::client::HttpClient;
use crate::viewer::quota::QuotaProvider;

impl HttpClient {
    /// Get the quotas of an organization
    pub async fn get_quotas(
        &self,
        organization_id: &str,
        token: &SecretString,
    ) -> Result<QuotasResponse, LogsError> {
        let path = format!("/v1/organizations/{}/quotas", organization_id);
        self.get(&path, &[], token).await
    }
}

/// Reads the log retention from the organization quotas
pub struct HttpQuotaProvider {
    client: Arc<HttpClient>,
    tokens: Arc<dyn TokenProvider>,
    organization_id: String,
}

impl HttpQuotaProvider {
    pub fn new(
        client: Arc<HttpClient>,
        tokens: Arc<dyn TokenProvider>,
        organization_id: String,
    ) -> Self {
        Self {
            client,
            tokens,
            organization_id,
        }
    }
}

#[async_trait]
impl QuotaProvider for HttpQuotaProvider {
    async fn logs_retention(&self) -> Result<Option<u32>, LogsError> {
        let token = self.tokens.get_token().await?;
        let response = self
            .client
            .get_quotas(&self.organization_id, &token)
            .await
            .map_err(|e| LogsError::QuotaError(e.to_string()))?;
        debug!(
            organization_id = %self.organization_id,
            logs_retention = ?response.quotas.logs_retention,
            "Organization quotas fetched"
        );
        if response.quotas.logs_retention.is_none() {
            warn!("Organization has no log retention quota, history stays disabled");
        }
        Ok(response.quotas.logs_retention)
    }
}
