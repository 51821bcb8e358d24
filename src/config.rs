use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::RelayError;

pub const DEFAULT_API_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_API_VERSION: &str = "v17.0";
pub const DEFAULT_GREETING_TEMPLATE: &str = "hello_world";
pub const DEFAULT_MEDIA_TEMPLATE: &str = "moksha_event";
pub const DEFAULT_TEMPLATE_LANGUAGE: &str = "en_US";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while loading [`RelayConfig`].
///
/// Missing credentials are not a load error; they surface per request as
/// [`RelayError::Configuration`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Which payload `/api/sendmessage` sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Pre-registered greeting template; only `phone` is required.
    #[default]
    Template,
    /// Free-form text; `phone` and `message` are required.
    Text,
}

impl FromStr for SendMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "template" => Ok(Self::Template),
            "text" => Ok(Self::Text),
            _ => Err(()),
        }
    }
}

/// Provider credentials. Read-only for the lifetime of the process.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub phone_number_id: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, phone_number_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            phone_number_id: phone_number_id.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("phone_number_id", &self.phone_number_id)
            .finish()
    }
}

/// Process-wide relay configuration, built once at startup and passed to
/// every handler.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub credentials: Option<Credentials>,
    pub api_base_url: String,
    pub api_version: String,
    pub send_mode: SendMode,
    pub greeting_template: String,
    pub media_template: String,
    pub template_language: String,
    pub timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            send_mode: SendMode::default(),
            greeting_template: DEFAULT_GREETING_TEMPLATE.to_string(),
            media_template: DEFAULT_MEDIA_TEMPLATE.to_string(),
            template_language: DEFAULT_TEMPLATE_LANGUAGE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RelayConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let credentials = match (
            var("WHATSAPP_ACCESS_TOKEN"),
            var("WHATSAPP_PHONE_NUMBER_ID"),
        ) {
            (Some(token), Some(id)) => {
                debug!("Loaded WhatsApp credentials for phone number id {}", id);
                Some(Credentials::new(token, id))
            }
            (token, id) => {
                if token.is_none() {
                    warn!("WHATSAPP_ACCESS_TOKEN is not set");
                }
                if id.is_none() {
                    warn!("WHATSAPP_PHONE_NUMBER_ID is not set");
                }
                None
            }
        };

        let mut config = Self {
            credentials,
            ..Self::default()
        };

        if let Some(url) = var("WHATSAPP_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(version) = var("WHATSAPP_API_VERSION") {
            config.api_version = version.trim_matches('/').to_string();
        }
        if let Some(mode) = var("WHATSAPP_SEND_MODE") {
            config.send_mode = mode.parse().map_err(|()| ConfigError::InvalidValue {
                name: "WHATSAPP_SEND_MODE",
                value: mode.clone(),
            })?;
        }
        if let Some(name) = var("WHATSAPP_GREETING_TEMPLATE") {
            config.greeting_template = name;
        }
        if let Some(name) = var("WHATSAPP_MEDIA_TEMPLATE") {
            config.media_template = name;
        }
        if let Some(code) = var("WHATSAPP_TEMPLATE_LANGUAGE") {
            config.template_language = code;
        }
        if let Some(secs) = var("WHATSAPP_HTTP_TIMEOUT_SECS") {
            let parsed = secs
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    name: "WHATSAPP_HTTP_TIMEOUT_SECS",
                    value: secs.clone(),
                })?;
            config.timeout = Duration::from_secs(parsed);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_send_mode(mut self, mode: SendMode) -> Self {
        self.send_mode = mode;
        self
    }

    /// The provider credentials, or a configuration error when either value
    /// was absent at startup.
    pub fn credentials(&self) -> Result<&Credentials, RelayError> {
        self.credentials.as_ref().ok_or(RelayError::Configuration)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RelayConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_without_any_variables() {
        let config = load(&[]).unwrap();
        assert!(config.credentials.is_none());
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.api_version, "v17.0");
        assert_eq!(config.send_mode, SendMode::Template);
        assert_eq!(config.greeting_template, "hello_world");
        assert_eq!(config.media_template, "moksha_event");
        assert_eq!(config.template_language, "en_US");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn missing_credentials_is_a_request_time_error() {
        let config = load(&[("WHATSAPP_ACCESS_TOKEN", "token")]).unwrap();
        assert!(matches!(
            config.credentials(),
            Err(RelayError::Configuration)
        ));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let config = load(&[
            ("WHATSAPP_ACCESS_TOKEN", "   "),
            ("WHATSAPP_PHONE_NUMBER_ID", "123"),
        ])
        .unwrap();
        assert!(config.credentials.is_none());
    }

    #[test]
    fn loads_credentials_and_overrides() {
        let config = load(&[
            ("WHATSAPP_ACCESS_TOKEN", "token"),
            ("WHATSAPP_PHONE_NUMBER_ID", "1055"),
            ("WHATSAPP_API_BASE_URL", "http://127.0.0.1:9000/"),
            ("WHATSAPP_API_VERSION", "/v19.0/"),
            ("WHATSAPP_SEND_MODE", "Text"),
            ("WHATSAPP_HTTP_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        let creds = config.credentials().unwrap();
        assert_eq!(creds.access_token, "token");
        assert_eq!(creds.phone_number_id, "1055");
        assert_eq!(config.api_base_url, "http://127.0.0.1:9000");
        assert_eq!(config.api_version, "v19.0");
        assert_eq!(config.send_mode, SendMode::Text);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_unknown_send_mode() {
        let err = load(&[("WHATSAPP_SEND_MODE", "carrier-pigeon")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "WHATSAPP_SEND_MODE",
                value: "carrier-pigeon".into(),
            }
        );
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(load(&[("WHATSAPP_HTTP_TIMEOUT_SECS", "0")]).is_err());
        assert!(load(&[("WHATSAPP_HTTP_TIMEOUT_SECS", "soon")]).is_err());
    }

    #[test]
    fn debug_redacts_access_token() {
        let creds = Credentials::new("EAAG-secret-token", "1055");
        let debug = format!("{creds:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("EAAG-secret-token"));
    }
}
