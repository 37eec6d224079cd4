//! Retry policy for history page queries

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::LogsError;
use crate::utils::{calc_exp_backoff, CooldownOptions};
use crate::viewer::history::{LogPage, LogPageSource, PageQuery};

/// Retry options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Attempts after the first one
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default)]
    pub cooldown: CooldownOptions,
}

fn default_retries() -> u32 {
    3
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            cooldown: CooldownOptions::default(),
        }
    }
}

/// Whether a failed query is worth repeating
pub fn is_retryable(error: &LogsError) -> bool {
    match error {
        LogsError::HttpError(_) | LogsError::IoError(_) => true,
        LogsError::Api { status, .. } => *status >= 500 || *status == 429,
        _ => false,
    }
}

/// Retries transient failures with capped exponential backoff
pub struct RetryingPageSource<S> {
    inner: S,
    options: RetryOptions,
}

impl<S: LogPageSource> RetryingPageSource<S> {
    pub fn new(inner: S, options: RetryOptions) -> Self {
        Self { inner, options }
    }
}

#[async_trait]
impl<S: LogPageSource> LogPageSource for RetryingPageSource<S> {
    async fn query_page(&self, query: &PageQuery) -> Result<LogPage, LogsError> {
        let mut attempt = 0;
        loop {
            match self.inner.query_page(query).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt < self.options.retries && is_retryable(&e) => {
                    let delay = calc_exp_backoff(&self.options.cooldown, attempt);
                    warn!("Logs page query failed: {}. Retrying in {:?}...", e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
