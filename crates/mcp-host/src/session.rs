//! Types returned by the session issuer.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How an app is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Loaded as an embedded surface that speaks the lifecycle protocol.
    Layer,
    /// Called over HTTP; its JSON answer is rendered inline.
    Inline,
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseType::Layer => f.write_str("layer"),
            ResponseType::Inline => f.write_str("inline"),
        }
    }
}

/// The issued session itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub expires_at: DateTime<Utc>,
    pub customer_id: String,
    pub project_id: String,
}

/// An app the session authorizes, with its scoped token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppGrant {
    pub id: String,
    pub name: String,
    /// Where the app is loaded from (layer) or posted to (inline).
    pub endpoint: String,
    /// App-scoped bearer token.
    pub token: String,
    pub token_expires_at: DateTime<Utc>,
    pub response_type: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Value>,
}

impl AppGrant {
    /// Whether the app token has expired at `now`.
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at <= now
    }

    /// The `keywords.intent` hint, if the issuer sent one.
    pub fn intent(&self) -> Option<&str> {
        self.keywords.as_ref()?.get("intent")?.as_str()
    }
}

/// A successful `session/init` answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedSession {
    pub session: SessionInfo,
    #[serde(default)]
    pub apps: Vec<AppGrant>,
}

impl IssuedSession {
    /// Look an app up by id, then by name.
    pub fn find_app(&self, id_or_name: &str) -> Result<&AppGrant> {
        self.apps
            .iter()
            .find(|app| app.id == id_or_name)
            .or_else(|| self.apps.iter().find(|app| app.name == id_or_name))
            .ok_or_else(|| Error::AppNotFound(id_or_name.to_string()))
    }

    /// Store a refreshed app token.
    pub fn apply_refresh(&mut self, refresh: &TokenRefresh) -> Result<&AppGrant> {
        let app = self
            .apps
            .iter_mut()
            .find(|app| app.id == refresh.app_id)
            .ok_or_else(|| Error::AppNotFound(refresh.app_id.clone()))?;
        app.token = refresh.token.clone();
        app.token_expires_at = refresh.expires_at;
        Ok(app)
    }
}

/// A successful `token/refresh` answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRefresh {
    /// The app the token was refreshed for.
    #[serde(default)]
    pub app_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issued() -> IssuedSession {
        serde_json::from_value(json!({
            "session": {
                "id": "s-1",
                "expires_at": "2026-10-19T12:00:00Z",
                "customer_id": "c1",
                "project_id": "p1"
            },
            "apps": [
                {
                    "id": "arcade",
                    "name": "Arcade",
                    "endpoint": "https://arcade.example/play",
                    "token": "app-token",
                    "token_expires_at": "2026-10-19T11:00:00Z",
                    "response_type": "layer",
                    "keywords": { "intent": "play_game" }
                },
                {
                    "id": "weather",
                    "name": "Weather",
                    "endpoint": "https://weather.example/inline",
                    "token": "w-token",
                    "token_expires_at": "2026-10-19T11:00:00Z",
                    "response_type": "inline"
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn finds_apps_by_id_or_name() {
        let session = issued();
        assert_eq!(session.find_app("arcade").unwrap().name, "Arcade");
        assert_eq!(session.find_app("Weather").unwrap().id, "weather");
        assert!(matches!(
            session.find_app("chess"),
            Err(Error::AppNotFound(name)) if name == "chess"
        ));
    }

    #[test]
    fn keywords_expose_intent() {
        let session = issued();
        assert_eq!(session.apps[0].intent(), Some("play_game"));
        assert_eq!(session.apps[1].intent(), None);
        assert_eq!(session.apps[1].response_type, ResponseType::Inline);
    }

    #[test]
    fn refresh_replaces_token_and_expiry() {
        let mut session = issued();
        let expires_at: DateTime<Utc> = "2026-10-19T13:00:00Z".parse().unwrap();
        let app = session
            .apply_refresh(&TokenRefresh {
                app_id: "arcade".to_string(),
                token: "fresh".to_string(),
                expires_at,
            })
            .unwrap();
        assert_eq!(app.token, "fresh");
        assert!(!app.token_expired("2026-10-19T12:30:00Z".parse().unwrap()));
    }
}
