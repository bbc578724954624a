use crate::{Error, Result};
use mcp_format::DEFAULT_LANGUAGE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Caller configuration, usually read from `mcp.toml`.
///
/// ```toml
/// server_url = "https://issuer.example"
/// language = "tr"
/// request_timeout_secs = 30
/// default_theme = "dark"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerConfig {
    /// Base URL of the session issuer.
    pub server_url: String,
    /// Language requested at session init.
    #[serde(default = "default_language")]
    pub language: String,
    /// Timeout for each issuer request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Theme put in the init config when the launch context sets none.
    #[serde(default)]
    pub default_theme: Option<String>,
}

impl CallerConfig {
    /// Configuration with defaults for everything but the server.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            language: default_language(),
            request_timeout_secs: default_request_timeout_secs(),
            default_theme: None,
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check the server URL and timeout.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.server_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "server_url must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Issuer base URL with a trailing slash, so relative joins keep any path prefix.
    pub fn base_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.server_url)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_fill_missing_keys() {
        let config = CallerConfig::from_toml_str(r#"server_url = "https://issuer.example""#)
            .unwrap();
        assert_eq!(config.language, "tr");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.default_theme.is_none());
    }

    #[test]
    fn base_url_keeps_path_prefix() {
        let config = CallerConfig::new("https://issuer.example/api");
        let base = config.base_url().unwrap();
        assert_eq!(
            base.join("mcp/v1/session/init").unwrap().as_str(),
            "https://issuer.example/api/mcp/v1/session/init"
        );
    }

    #[test]
    fn rejects_bad_server_url() {
        assert!(matches!(
            CallerConfig::from_toml_str(r#"server_url = "not a url""#),
            Err(Error::Url(_))
        ));
        assert!(matches!(
            CallerConfig::from_toml_str(r#"server_url = "ftp://issuer.example""#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            CallerConfig::from_toml_str("language = 5"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server_url = \"http://127.0.0.1:8080\"\nlanguage = \"en\"\ndefault_theme = \"light\""
        )
        .unwrap();

        let config = CallerConfig::load(file.path()).unwrap();
        assert_eq!(config.language, "en");
        assert_eq!(config.default_theme.as_deref(), Some("light"));
    }
}
