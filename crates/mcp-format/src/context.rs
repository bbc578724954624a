use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Theme applied when neither the host nor the URL names one.
pub const DEFAULT_THEME: &str = "dark";

/// Language applied when neither the host nor the URL names one.
pub const DEFAULT_LANGUAGE: &str = "tr";

/// URL query keys with a dedicated slot in [`InvocationContext`].
const RESERVED_QUERY_KEYS: [&str; 10] = [
    "customerId",
    "projectId",
    "userId",
    "resourceId",
    "theme",
    "language",
    "protocol",
    "username",
    "mode",
    "token",
];

/// Channel connecting a mini-app to its host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// In-process event bus.
    Layer,
    /// Cross-frame postMessage.
    Iframe,
    /// No host at all.
    #[default]
    Standalone,
}

impl TransportMode {
    /// Lowercase name as used in URLs and context payloads.
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportMode::Layer => "layer",
            TransportMode::Iframe => "iframe",
            TransportMode::Standalone => "standalone",
        }
    }

    /// Whether a host is on the other side of the transport.
    pub const fn is_embedded(self) -> bool {
        !matches!(self, TransportMode::Standalone)
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "layer" => Ok(TransportMode::Layer),
            "iframe" => Ok(TransportMode::Iframe),
            "standalone" => Ok(TransportMode::Standalone),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

/// Message dialect the host speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolDialect {
    /// postMessage-based hosts.
    #[default]
    Standard,
    /// Native layer hosts.
    Ainoodle,
}

impl ProtocolDialect {
    fn parse_lenient(value: Option<String>) -> Self {
        match value.as_deref() {
            Some("ainoodle") => ProtocolDialect::Ainoodle,
            _ => ProtocolDialect::Standard,
        }
    }
}

/// Canonical invocation context handed to the mini-app's business logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    /// Tenant identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    /// Project identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// End-user identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Identifier of the resource being played/viewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Opaque per-app bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Host-provided configuration.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// UI language.
    pub language: String,
    /// UI theme.
    pub theme: String,
    /// Host dialect.
    #[serde(default)]
    pub protocol: ProtocolDialect,
    /// Transport the context arrived over.
    #[serde(default)]
    pub mode: TransportMode,
    /// Extra fields.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl InvocationContext {
    /// Context with every optional field unset and defaults applied.
    pub fn empty(mode: TransportMode) -> Self {
        Self {
            customer_id: None,
            project_id: None,
            user_id: None,
            resource_id: None,
            token: None,
            config: Map::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            theme: DEFAULT_THEME.to_string(),
            protocol: ProtocolDialect::Standard,
            mode,
            params: Map::new(),
        }
    }

    /// Normalize a host-delivered init body.
    ///
    /// Accepts camelCase or snake_case identity keys and reads the theme from
    /// `config.theme` when it is not given at the top level.
    pub fn from_init(body: &Value, mode: TransportMode) -> Result<Self> {
        let object = body.as_object().ok_or_else(|| Error::InvalidField {
            field: "context",
            reason: "init body must be a JSON object".to_string(),
        })?;

        let config = first_object(object, &["config"]).cloned().unwrap_or_default();
        let theme = first_str(object, &["theme"])
            .or_else(|| first_str(&config, &["theme"]))
            .unwrap_or_else(|| DEFAULT_THEME.to_string());

        Ok(Self {
            customer_id: first_str(object, &["customerId", "customer_id"]),
            project_id: first_str(object, &["projectId", "project_id"]),
            user_id: first_str(object, &["userId", "user_id"]),
            resource_id: first_str(object, &["resourceId", "resource_id"]),
            token: first_str(object, &["token"]),
            language: first_str(object, &["language"])
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            theme,
            protocol: ProtocolDialect::parse_lenient(first_str(object, &["protocol"])),
            mode,
            params: first_object(object, &["params"]).cloned().unwrap_or_default(),
            config,
        })
    }

    /// Build the fallback context from an invocation URL.
    pub fn from_url(url: &Url, mode: TransportMode) -> Self {
        Self::from_query(url.query().unwrap_or_default(), mode)
    }

    /// Build the fallback context from a raw query string (without `?`).
    ///
    /// Known keys fill their dedicated slot (first occurrence wins); any
    /// other key lands in `params`, JSON-decoded when it parses as JSON.
    pub fn from_query(query: &str, mode: TransportMode) -> Self {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
                .filter(|value| !value.is_empty())
        };

        let mut context = Self::empty(mode);
        context.customer_id = get("customerId");
        context.project_id = get("projectId");
        context.user_id = get("userId");
        context.resource_id = get("resourceId");
        context.token = get("token");
        if let Some(theme) = get("theme") {
            context.theme = theme;
        }
        if let Some(language) = get("language") {
            context.language = language;
        }
        context.protocol = ProtocolDialect::parse_lenient(get("protocol"));

        if let Some(username) = get("username") {
            context
                .params
                .insert("username".to_string(), Value::String(username));
        }

        for (key, value) in pairs {
            if RESERVED_QUERY_KEYS.contains(&key.as_str()) {
                continue;
            }
            let parsed = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
            context.params.insert(key, parsed);
        }

        context
    }

    /// Apply a later init to an active context.
    ///
    /// Only the token and config are refreshed; identity fields stay as
    /// first resolved. Returns whether anything changed.
    pub fn refresh_from(&mut self, newer: &InvocationContext) -> bool {
        let mut changed = false;
        if newer.token.is_some() && newer.token != self.token {
            self.token = newer.token.clone();
            changed = true;
        }
        if !newer.config.is_empty() && newer.config != self.config {
            self.config = newer.config.clone();
            changed = true;
        }
        changed
    }

    /// Canonical JSON form (camelCase keys).
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// First non-empty string among `keys`; numbers are rendered as strings.
pub(crate) fn first_str(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key) {
        Some(Value::String(value)) if !value.is_empty() => Some(value.clone()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

/// First object-valued field among `keys`.
pub(crate) fn first_object<'a>(
    object: &'a Map<String, Value>,
    keys: &[&str],
) -> Option<&'a Map<String, Value>> {
    keys.iter().find_map(|key| object.get(*key).and_then(Value::as_object))
}
