//! Retention quota lookup

use async_trait::async_trait;

use crate::errors::LogsError;

/// Returns the organization's log retention in days, `None` while unknown
#[async_trait]
pub trait QuotaProvider: Send + Sync {
    async fn logs_retention(&self) -> Result<Option<u32>, LogsError>;
}

/// A retention value known up front
#[derive(Debug, Clone, Copy)]
pub struct FixedQuota(pub Option<u32>);

#[async_trait]
impl QuotaProvider for FixedQuota {
    async fn logs_retention(&self) -> Result<Option<u32>, LogsError> {
        Ok(self.0)
    }
}
