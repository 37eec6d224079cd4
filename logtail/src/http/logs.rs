//! Logs query API client

use std::sync::Arc;

use async_trait::async_trait;
use openapi_client::models::QueryLogsResponse;
use secrecy::SecretString;

use crate::authn::token::TokenProvider;
use crate::errors::LogsError;
use crate::http::client::HttpClient;
use crate::viewer::history::{LogPage, LogPageSource, PageQuery};

/// Path of the historical logs endpoint
pub const QUERY_PATH: &str = "/v1/streams/logs/query";

impl HttpClient {
    /// Query one page of historical logs
    pub async fn query_logs(
        &self,
        query: &PageQuery,
        token: &SecretString,
    ) -> Result<QueryLogsResponse, LogsError> {
        self.get(QUERY_PATH, &query.query_pairs(), token).await
    }
}

/// Page source backed by the logs query endpoint
pub struct HttpLogSource {
    client: Arc<HttpClient>,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpLogSource {
    pub fn new(client: Arc<HttpClient>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { client, tokens }
    }
}

#[async_trait]
impl LogPageSource for HttpLogSource {
    async fn query_page(&self, query: &PageQuery) -> Result<LogPage, LogsError> {
        let token = self.tokens.get_token().await?;
        let response = self.client.query_logs(query, &token).await?;
        LogPage::from_response(response)
    }
}
