//! Bearer token provider

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::errors::LogsError;

/// Environment variable overriding the configured token
pub const TOKEN_ENV_VAR: &str = "LOGTAIL_TOKEN";

/// Token provider trait for testability
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get the current bearer token
    async fn get_token(&self) -> Result<SecretString, LogsError>;
}

/// A token fixed for the lifetime of the process
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    /// Create a provider, rejecting empty tokens
    pub fn new(token: SecretString) -> Result<Self, LogsError> {
        if token.expose_secret().trim().is_empty() {
            return Err(LogsError::AuthError("API token is empty".to_string()));
        }
        Ok(Self { token })
    }

    /// Prefer the environment variable, falling back to the configured token
    pub fn from_env_or(configured: Option<&SecretString>) -> Result<Self, LogsError> {
        match std::env::var(TOKEN_ENV_VAR) {
            Ok(token) if !token.trim().is_empty() => Self::new(SecretString::from(token)),
            _ => match configured {
                Some(token) => Self::new(SecretString::from(token.expose_secret().to_string())),
                None => Err(LogsError::AuthError(format!(
                    "No API token configured, set {} or the settings token",
                    TOKEN_ENV_VAR
                ))),
            },
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn get_token(&self) -> Result<SecretString, LogsError> {
        Ok(SecretString::from(self.token.expose_secret().to_string()))
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken").field("token", &"[REDACTED]").finish()
    }
}
