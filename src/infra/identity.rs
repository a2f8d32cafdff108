//! HTTP adapter for the external identity provider.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::application::identity::{CallerIdentity, IdentityError, IdentityVerifier};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    account_id: String,
    email: Option<String>,
}

/// Verifies bearer tokens against the identity provider's verification
/// endpoint. The token is forwarded as-is in the `Authorization` header;
/// a 2xx answer carries the caller's account id and email.
pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    verify_url: Url,
}

impl HttpIdentityVerifier {
    pub fn new(verify_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            verify_url,
        }
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify_bearer(&self, token: &str) -> Result<CallerIdentity, IdentityError> {
        let response = self
            .client
            .post(self.verify_url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| {
                warn!(
                    target = "mindprint::identity",
                    op = "identity::verify",
                    error = %err,
                    "Identity provider unreachable"
                );
                IdentityError::Unavailable(err.to_string())
            })?;

        match response.status() {
            status if status.is_success() => {
                let verified: VerifyResponse = response
                    .json()
                    .await
                    .map_err(|err| IdentityError::Unavailable(err.to_string()))?;
                Ok(CallerIdentity {
                    account_id: verified.account_id,
                    email: verified.email,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::InvalidToken),
            status => Err(IdentityError::Unavailable(format!(
                "identity provider answered {status}"
            ))),
        }
    }
}
