//! Identity-provider collaborator: resolves a bearer token to an account.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("bearer token rejected by identity provider")]
    InvalidToken,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// The caller resolved from a bearer token. The email, when the provider
/// supplies one, feeds the entitlement allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account_id: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify_bearer(&self, token: &str) -> Result<CallerIdentity, IdentityError>;
}
