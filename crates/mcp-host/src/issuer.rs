//! HTTP client for the session issuer.
//!
//! The issuer authenticates the caller with a bearer JWT and hands out a
//! session plus per-app tokens. Every answer carries a `status` field; any
//! value other than `success` is surfaced as [`Error::UpstreamSession`].

use crate::config::CallerConfig;
use crate::session::{AppGrant, IssuedSession, TokenRefresh};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use url::Url;

/// Session init endpoint, relative to the issuer base URL.
pub const SESSION_INIT_PATH: &str = "mcp/v1/session/init";

/// Token refresh endpoint, relative to the issuer base URL.
pub const TOKEN_REFRESH_PATH: &str = "mcp/v1/token/refresh";

/// Client for the session issuer and for inline app calls.
#[derive(Debug, Clone)]
pub struct SessionIssuerClient {
    http: reqwest::Client,
    base: Url,
    language: String,
    bearer: String,
}

impl SessionIssuerClient {
    /// Build a client authenticating with the caller's JWT.
    pub fn new(config: &CallerConfig, bearer: impl Into<String>) -> Result<Self> {
        config.validate()?;
        let bearer = bearer.into();
        if bearer.trim().is_empty() {
            return Err(Error::Config("bearer token is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base: config.base_url()?,
            language: config.language.clone(),
            bearer,
        })
    }

    /// Issuer base URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `GET session/init`: open a session and list the authorized apps.
    pub async fn init_session(&self) -> Result<IssuedSession> {
        let mut url = self.base.join(SESSION_INIT_PATH)?;
        url.query_pairs_mut().append_pair("language", &self.language);
        tracing::debug!("Session init: {}", url);

        let response = self.http.get(url).bearer_auth(&self.bearer).send().await?;
        let session: IssuedSession = read_success(response).await?;

        tracing::info!(
            "Session {} issued with {} app(s), expires {}",
            session.session.id,
            session.apps.len(),
            session.session.expires_at
        );
        Ok(session)
    }

    /// `POST token/refresh`: renew one app's token.
    pub async fn refresh_token(&self, app_id: &str) -> Result<TokenRefresh> {
        let url = self.base.join(TOKEN_REFRESH_PATH)?;
        tracing::debug!("Token refresh for {}: {}", app_id, url);

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.bearer)
            .json(&json!({ "app_id": app_id }))
            .send()
            .await?;
        let mut refresh: TokenRefresh = read_success(response).await?;
        if refresh.app_id.is_empty() {
            refresh.app_id = app_id.to_string();
        }

        tracing::info!("Token for {} refreshed, expires {}", app_id, refresh.expires_at);
        Ok(refresh)
    }

    /// Post a launch context to an inline app and return its JSON answer.
    pub async fn call_inline(&self, app: &AppGrant, context: &Value) -> Result<Value> {
        let url = Url::parse(&app.endpoint)?;
        tracing::debug!("Calling inline app {} at {}", app.id, url);

        let response = self
            .http
            .post(url)
            .bearer_auth(&app.token)
            .json(context)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Decode an issuer answer, requiring `status == "success"`.
async fn read_success<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let http_status = response.status();
    let text = response.text().await?;

    let body: Value = match serde_json::from_str(&text) {
        Ok(body) => body,
        Err(err) if http_status.is_success() => return Err(err.into()),
        Err(_) => {
            tracing::error!("Session issuer answered {}: {}", http_status, text);
            return Err(Error::UpstreamSession {
                status: http_status.to_string(),
                message: text,
            });
        }
    };

    match body.get("status").and_then(Value::as_str) {
        Some("success") => Ok(serde_json::from_value(body)?),
        status => {
            let message = body
                .pointer("/error/message")
                .or_else(|| body.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            let status = status
                .map(str::to_string)
                .unwrap_or_else(|| http_status.to_string());
            tracing::error!("Session issuer rejected request ({}): {}", status, message);
            Err(Error::UpstreamSession { status, message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bearer_is_rejected() {
        let config = CallerConfig::new("http://127.0.0.1:9");
        assert!(matches!(
            SessionIssuerClient::new(&config, " "),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn endpoints_resolve_under_base() {
        let config = CallerConfig::new("https://issuer.example/tenant");
        let client = SessionIssuerClient::new(&config, "jwt").unwrap();
        assert_eq!(
            client.base_url().join(TOKEN_REFRESH_PATH).unwrap().as_str(),
            "https://issuer.example/tenant/mcp/v1/token/refresh"
        );
    }
}
