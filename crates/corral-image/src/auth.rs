//! Anonymous pull-token negotiation.
//!
//! The token endpoint is queried without credentials for a token scoped to
//! `repository:<path>:pull`. The token lives only as long as the run.

use corral_common::config::RegistryConfig;
use corral_common::error::{CorralError, Result};
use corral_common::types::AuthToken;
use reqwest::blocking::Client;
use serde::Deserialize;

/// Body of a token endpoint response.
///
/// Registries send `token`, `access_token`, or both with the same value.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    expires_in: Option<u64>,
    issued_at: Option<String>,
}

/// Returns the `scope` parameter for pulling `repository`.
#[must_use]
pub fn pull_scope(repository: &str) -> String {
    format!("repository:{repository}:pull")
}

/// Requests a pull token for `repository`.
///
/// # Errors
///
/// Returns `CorralError::Auth` on transport failure, a non-2xx status, an
/// undecodable body, or a body without a token. The request is not retried.
pub fn fetch_token(client: &Client, config: &RegistryConfig, repository: &str) -> Result<AuthToken> {
    let fail = |message: String| CorralError::Auth {
        repository: repository.to_string(),
        message,
    };
    let scope = pull_scope(repository);
    tracing::info!(repository, "requesting pull token");

    let response = client
        .get(&config.auth_url)
        .query(&[
            ("service", config.auth_service.as_str()),
            ("scope", scope.as_str()),
        ])
        .send()
        .map_err(|e| fail(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(fail(format!("token endpoint returned HTTP {status}")));
    }

    let body: TokenResponse = response
        .json()
        .map_err(|e| fail(format!("undecodable token response: {e}")))?;
    let value = body
        .token
        .or(body.access_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| fail("token response carried no token".into()))?;

    tracing::debug!(
        repository,
        expires_in = ?body.expires_in,
        issued_at = ?body.issued_at,
        "pull token issued"
    );
    Ok(AuthToken::new(value, repository))
}
