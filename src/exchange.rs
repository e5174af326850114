//! Credential-exchange calls against the backend auth endpoints.
//!
//! The four credential-producing operations (login, federated sign-in,
//! refresh, logout) plus the profile check. Each call returns data for the
//! session controller to persist; nothing here touches the credential store.

use crate::config::ApiSettings;
use crate::error::ExchangeError;
use crate::types::{unix_now_secs, TokenPair, UserProfile};
use serde::Deserialize;
use std::time::Duration;

/// Shared HTTP timeout for auth requests.
const AUTH_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback message when the server error payload carries no message.
const GENERIC_FAILURE_MESSAGE: &str = "the request could not be processed";

/// Profile plus credential pair returned by credential-producing calls.
#[derive(Debug, Clone)]
pub struct AuthPayload {
    pub profile: UserProfile,
    pub tokens: TokenPair,
}

/// Token shape on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTokens {
    access_token: String,
    /// Access token lifetime in seconds.
    access_token_expires_in: i64,
    refresh_token: String,
    /// ISO-8601 timestamp.
    refresh_token_expires_at: String,
}

/// Envelope returned by login/federated/refresh.
#[derive(Debug, Deserialize)]
struct WireAuthResponse {
    user: UserProfile,
    tokens: WireTokens,
}

/// Envelope returned by the profile endpoint.
#[derive(Debug, Deserialize)]
struct WireProfileResponse {
    user: UserProfile,
}

/// Server error payload; only the message is interesting.
#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: Option<String>,
}

/// Client for the backend's auth endpoints.
pub struct TokenExchangeClient {
    http: reqwest::Client,
    base_url: String,
    federated_path: String,
}

impl TokenExchangeClient {
    /// Build a client from resolved API configuration.
    pub fn new(api: &ApiSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(AUTH_HTTP_TIMEOUT)
            .user_agent("roomkey/0.1")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            federated_path: format!("auth/{}", api.federated_provider.trim_matches('/')),
        }
    }

    /// Exchange a password login for a credential pair.
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<AuthPayload, ExchangeError> {
        if identifier.trim().is_empty() {
            return Err(ExchangeError::Validation(
                "login identifier must not be empty".to_string(),
            ));
        }
        if secret.is_empty() {
            return Err(ExchangeError::Validation(
                "password must not be empty".to_string(),
            ));
        }
        let response = self
            .http
            .post(self.url("auth/login"))
            .json(&serde_json::json!({ "identifier": identifier, "secret": secret }))
            .send()
            .await?;
        decode_auth_response(response).await
    }

    /// Trade a third-party provider token for this system's credential pair.
    ///
    /// The provider token is consumed here and never persisted; only the
    /// resulting pair is.
    pub async fn exchange_federated(
        &self,
        provider_token: &str,
    ) -> Result<AuthPayload, ExchangeError> {
        if provider_token.trim().is_empty() {
            return Err(ExchangeError::Validation(
                "provider token must not be empty".to_string(),
            ));
        }
        let response = self
            .http
            .post(self.url(&self.federated_path))
            .json(&serde_json::json!({ "providerToken": provider_token }))
            .send()
            .await?;
        decode_auth_response(response).await
    }

    /// Exchange a refresh token for a new credential pair.
    ///
    /// The refresh token is single-use: after a successful call the caller
    /// must discard the old one whether or not the new pair is stored.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthPayload, ExchangeError> {
        if refresh_token.trim().is_empty() {
            return Err(ExchangeError::Validation(
                "refresh token must not be empty".to_string(),
            ));
        }
        let response = self
            .http
            .post(self.url("auth/refresh"))
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await?;
        decode_auth_response(response).await
    }

    /// Notify the backend that this refresh token is being discarded.
    ///
    /// Best effort: callers absorb the error, local teardown never waits on
    /// the outcome being a success.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ExchangeError> {
        let response = self
            .http
            .post(self.url("auth/logout"))
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), &body))
    }

    /// Validate an access token against the profile endpoint.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, ExchangeError> {
        let response = self
            .http
            .get(self.url("auth/me"))
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }
        let payload: WireProfileResponse = response
            .json()
            .await
            .map_err(|err| ExchangeError::Transport(format!("invalid profile response: {err}")))?;
        Ok(payload.user)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

/// Decode a login/federated/refresh response or classify its failure.
async fn decode_auth_response(response: reqwest::Response) -> Result<AuthPayload, ExchangeError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status.as_u16(), &body));
    }
    let payload: WireAuthResponse = response
        .json()
        .await
        .map_err(|err| ExchangeError::Transport(format!("invalid auth response: {err}")))?;
    let access_token = payload.tokens.access_token.trim().to_string();
    let refresh_token = payload.tokens.refresh_token.trim().to_string();
    if access_token.is_empty() || refresh_token.is_empty() {
        return Err(ExchangeError::Transport(
            "auth response missing token fields".to_string(),
        ));
    }
    let lifetime = payload.tokens.access_token_expires_in.max(1);
    Ok(AuthPayload {
        profile: payload.user,
        tokens: TokenPair {
            access_token,
            access_expires_at_unix: unix_now_secs().saturating_add(lifetime),
            refresh_token,
            refresh_expires_at_unix: parse_refresh_expiry(&payload.tokens.refresh_token_expires_at),
        },
    })
}

/// Map an HTTP failure status into the error taxonomy.
fn classify_status(code: u16, body: &str) -> ExchangeError {
    match code {
        401 => ExchangeError::Unauthorized(server_message(body)),
        400 | 422 => ExchangeError::Validation(server_message(body)),
        _ => ExchangeError::Transport(format!("status {code}: {body}")),
    }
}

/// Extract the server's human-readable message, with a generic fallback.
fn server_message(body: &str) -> String {
    serde_json::from_str::<WireErrorBody>(body)
        .ok()
        .and_then(|payload| payload.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
}

/// Parse the ISO-8601 refresh expiry; unknown on malformed input.
fn parse_refresh_expiry(raw: &str) -> i64 {
    match chrono::DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(ts) => ts.timestamp(),
        Err(err) => {
            tracing::warn!("unparseable refreshTokenExpiresAt `{raw}`: {err}");
            0
        }
    }
}
