// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client settings.
//!
//! Settings are built in code with [`ClientSettings::builder`] or loaded from
//! a YAML, TOML or JSON file with [`ClientSettings::from_file`]. Durations
//! are written in humantime form (`"10s"`, `"1m 30s"`).
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use uabin_client::settings::ClientSettings;
//!
//! let settings = ClientSettings::builder()
//!     .application_name("uabin demo")
//!     .discovery_url("opc.tcp://localhost:48010")
//!     .request_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//! assert_eq!(settings.discovery_urls.len(), 1);
//! ```
//!
//! # Environment Override
//!
//! `UABIN_DISCOVERY_URLS` (comma separated) replaces the discovery URLs of a
//! loaded file.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigurationError, UaError, UaResult};
use crate::types::{SecurityMode, SecurityPolicy, UserIdentity};

/// Environment variable overriding the discovery URLs.
pub const DISCOVERY_URLS_ENV: &str = "UABIN_DISCOVERY_URLS";

/// Smallest buffer size a peer must accept.
pub const MIN_BUFFER_SIZE: u32 = 8192;

// =============================================================================
// ClientSettings
// =============================================================================

/// Settings of a [`Client`](crate::client::Client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Application name sent in CreateSession.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Application URI. Derived from the name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_uri: Option<String>,

    /// Product URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_uri: Option<String>,

    /// Endpoint URLs, tried in order until one connects.
    #[serde(default)]
    pub discovery_urls: Vec<String>,

    /// Session name. Derived from the application name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,

    /// Message security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,

    /// User identity presented on activation.
    #[serde(default)]
    pub user_token: UserIdentity,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Timeout of a single service call.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Timeout of connecting to one endpoint.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Idle time after which a keep-alive request is sent.
    #[serde(default = "default_keepalive_interval", with = "humantime_serde")]
    pub keepalive_interval: Duration,

    /// Time a keep-alive response may take before the connection is lost.
    #[serde(default = "default_keepalive_timeout", with = "humantime_serde")]
    pub keepalive_timeout: Duration,

    /// Requested secure channel token lifetime.
    #[serde(default = "default_secure_channel_lifetime", with = "humantime_serde")]
    pub secure_channel_lifetime: Duration,

    /// Requests that may be outstanding on the channel at once.
    #[serde(default = "default_max_pending_requests")]
    pub max_pending_requests: usize,

    /// Largest message accepted; 0 for no limit.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: u32,

    /// Largest number of chunks in one message; 0 for no limit.
    #[serde(default = "default_max_chunk_count")]
    pub max_chunk_count: u32,

    /// Receive buffer size announced in Hello.
    #[serde(default = "default_buffer_size")]
    pub receive_buffer_size: u32,

    /// Send buffer size announced in Hello.
    #[serde(default = "default_buffer_size")]
    pub send_buffer_size: u32,
}

fn default_application_name() -> String {
    "uabin client".to_string()
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_keepalive_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_secure_channel_lifetime() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_pending_requests() -> usize {
    16
}

fn default_max_message_size() -> u32 {
    16 * 1024 * 1024
}

fn default_max_chunk_count() -> u32 {
    256
}

fn default_buffer_size() -> u32 {
    65535
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            application_uri: None,
            product_uri: None,
            discovery_urls: Vec::new(),
            session_name: None,
            security_mode: SecurityMode::default(),
            security_policy: SecurityPolicy::default(),
            user_token: UserIdentity::default(),
            session_timeout: default_session_timeout(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            keepalive_interval: default_keepalive_interval(),
            keepalive_timeout: default_keepalive_timeout(),
            secure_channel_lifetime: default_secure_channel_lifetime(),
            max_pending_requests: default_max_pending_requests(),
            max_message_size: default_max_message_size(),
            max_chunk_count: default_max_chunk_count(),
            receive_buffer_size: default_buffer_size(),
            send_buffer_size: default_buffer_size(),
        }
    }
}

impl ClientSettings {
    /// Creates a settings builder.
    pub fn builder() -> ClientSettingsBuilder {
        ClientSettingsBuilder::default()
    }

    /// Creates settings with one discovery URL and defaults otherwise.
    pub fn new(discovery_url: impl Into<String>) -> Self {
        Self {
            discovery_urls: vec![discovery_url.into()],
            ..Self::default()
        }
    }

    /// Loads settings from a file.
    ///
    /// The format follows the extension: `.yaml`/`.yml`, `.toml` or `.json`.
    /// [`DISCOVERY_URLS_ENV`] is applied before validation.
    pub fn from_file(path: impl AsRef<Path>) -> UaResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading client settings");

        let content = fs::read_to_string(path).map_err(|source| {
            UaError::configuration(ConfigurationError::FileRead {
                path: path.display().to_string(),
                source,
            })
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let format = SettingsFormat::from_extension(&extension).ok_or_else(|| {
            UaError::configuration(ConfigurationError::UnsupportedFormat { extension })
        })?;

        let mut settings = Self::from_str_with_format(&content, format)?;
        if let Ok(urls) = env::var(DISCOVERY_URLS_ENV) {
            settings.apply_discovery_override(&urls);
        }
        settings.validate()?;

        debug!(
            discovery_urls = settings.discovery_urls.len(),
            security_mode = %settings.security_mode,
            "Client settings loaded"
        );
        Ok(settings)
    }

    /// Parses settings without validating them.
    pub fn from_str_with_format(content: &str, format: SettingsFormat) -> UaResult<Self> {
        let parsed = match format {
            SettingsFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            SettingsFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            SettingsFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| {
            UaError::configuration(ConfigurationError::Parse {
                format: format.name(),
                message,
            })
        })
    }

    fn apply_discovery_override(&mut self, urls: &str) {
        let urls: Vec<String> = urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(String::from)
            .collect();
        if !urls.is_empty() {
            debug!(count = urls.len(), "Discovery URLs overridden from environment");
            self.discovery_urls = urls;
        }
    }

    /// Validates these settings.
    pub fn validate(&self) -> UaResult<()> {
        if self.application_name.trim().is_empty() {
            return Err(ConfigurationError::missing_field("application_name").into());
        }

        if self.discovery_urls.is_empty() {
            return Err(ConfigurationError::missing_field("discovery_urls").into());
        }
        for url in &self.discovery_urls {
            parse_endpoint(url)?;
        }

        match (self.security_mode, self.security_policy) {
            (SecurityMode::None, SecurityPolicy::None) => {}
            (SecurityMode::None, _) => {
                return Err(ConfigurationError::invalid_value(
                    "security_policy",
                    "a security policy requires a security mode other than None",
                )
                .into());
            }
            (_, SecurityPolicy::None) => {
                return Err(ConfigurationError::invalid_value(
                    "security_mode",
                    "a security mode requires a security policy other than None",
                )
                .into());
            }
            _ => {}
        }

        if let UserIdentity::UserName { username, .. } = &self.user_token {
            if username.is_empty() {
                return Err(ConfigurationError::missing_field("user_token.username").into());
            }
        }

        for (field, value) in [
            ("session_timeout", self.session_timeout),
            ("request_timeout", self.request_timeout),
            ("connect_timeout", self.connect_timeout),
            ("keepalive_interval", self.keepalive_interval),
            ("keepalive_timeout", self.keepalive_timeout),
            ("secure_channel_lifetime", self.secure_channel_lifetime),
        ] {
            if value.is_zero() {
                return Err(ConfigurationError::invalid_value(field, "must be greater than 0").into());
            }
        }

        if self.max_pending_requests == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_pending_requests",
                "must be at least 1",
            )
            .into());
        }

        for (field, value) in [
            ("receive_buffer_size", self.receive_buffer_size),
            ("send_buffer_size", self.send_buffer_size),
        ] {
            if value < MIN_BUFFER_SIZE {
                return Err(ConfigurationError::invalid_value(
                    field,
                    format!("must be at least {} bytes", MIN_BUFFER_SIZE),
                )
                .into());
            }
        }

        Ok(())
    }

    /// Returns the application URI, derived from the name when unset.
    pub fn effective_application_uri(&self) -> String {
        self.application_uri
            .clone()
            .unwrap_or_else(|| format!("urn:uabin:{}", self.application_name.replace(' ', "")))
    }

    /// Returns the session name, derived from the name when unset.
    pub fn effective_session_name(&self) -> String {
        self.session_name
            .clone()
            .unwrap_or_else(|| format!("{} session", self.application_name))
    }
}

/// Splits an `opc.tcp://host:port/path` URL into a socket address string.
pub fn parse_endpoint(url: &str) -> UaResult<String> {
    let rest = url.strip_prefix("opc.tcp://").ok_or_else(|| {
        UaError::configuration(ConfigurationError::invalid_endpoint(
            url,
            "endpoint must start with opc.tcp://",
        ))
    })?;
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(ConfigurationError::invalid_endpoint(url, "missing host").into());
    }

    let has_port = match authority.rfind(':') {
        Some(pos) => !authority[pos + 1..].is_empty() && !authority.ends_with(']'),
        None => false,
    };
    if has_port {
        Ok(authority.to_string())
    } else {
        Ok(format!("{}:4840", authority))
    }
}

// =============================================================================
// SettingsFormat
// =============================================================================

/// Settings file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    /// YAML.
    Yaml,
    /// TOML.
    Toml,
    /// JSON.
    Json,
}

impl SettingsFormat {
    /// Picks the format for a file extension.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Format name for errors.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Yaml => "YAML",
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

// =============================================================================
// ClientSettingsBuilder
// =============================================================================

/// Builder for [`ClientSettings`].
#[derive(Debug, Default)]
pub struct ClientSettingsBuilder {
    settings: ClientSettings,
}

impl ClientSettingsBuilder {
    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.settings.application_name = name.into();
        self
    }

    /// Sets the application URI.
    pub fn application_uri(mut self, uri: impl Into<String>) -> Self {
        self.settings.application_uri = Some(uri.into());
        self
    }

    /// Sets the product URI.
    pub fn product_uri(mut self, uri: impl Into<String>) -> Self {
        self.settings.product_uri = Some(uri.into());
        self
    }

    /// Appends a discovery URL.
    pub fn discovery_url(mut self, url: impl Into<String>) -> Self {
        self.settings.discovery_urls.push(url.into());
        self
    }

    /// Replaces the discovery URLs.
    pub fn discovery_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.discovery_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the session name.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_name = Some(name.into());
        self
    }

    /// Sets the security mode and policy.
    pub fn security(mut self, mode: SecurityMode, policy: SecurityPolicy) -> Self {
        self.settings.security_mode = mode;
        self.settings.security_policy = policy;
        self
    }

    /// Uses user name authentication.
    pub fn username(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.settings.user_token = UserIdentity::UserName {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Uses anonymous authentication.
    pub fn anonymous(mut self) -> Self {
        self.settings.user_token = UserIdentity::Anonymous;
        self
    }

    /// Sets the requested session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.settings.session_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.settings.request_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    /// Sets the keep-alive interval and timeout.
    pub fn keepalive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.settings.keepalive_interval = interval;
        self.settings.keepalive_timeout = timeout;
        self
    }

    /// Sets the requested secure channel lifetime.
    pub fn secure_channel_lifetime(mut self, lifetime: Duration) -> Self {
        self.settings.secure_channel_lifetime = lifetime;
        self
    }

    /// Sets the pipelining window.
    pub fn max_pending_requests(mut self, max: usize) -> Self {
        self.settings.max_pending_requests = max;
        self
    }

    /// Sets the message size and chunk count limits.
    pub fn message_limits(mut self, max_message_size: u32, max_chunk_count: u32) -> Self {
        self.settings.max_message_size = max_message_size;
        self.settings.max_chunk_count = max_chunk_count;
        self
    }

    /// Sets the buffer sizes announced in Hello.
    pub fn buffer_sizes(mut self, receive: u32, send: u32) -> Self {
        self.settings.receive_buffer_size = receive;
        self.settings.send_buffer_size = send;
        self
    }

    /// Builds and validates the settings.
    pub fn build(self) -> UaResult<ClientSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

// =============================================================================
// humantime_serde module for Duration
// =============================================================================

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base() -> ClientSettingsBuilder {
        ClientSettings::builder().discovery_url("opc.tcp://localhost:48010")
    }

    #[test]
    fn test_defaults() {
        let settings = base().build().unwrap();
        assert_eq!(settings.security_mode, SecurityMode::None);
        assert_eq!(settings.max_pending_requests, 16);
        assert_eq!(settings.effective_application_uri(), "urn:uabin:uabinclient");
    }

    #[test]
    fn test_requires_discovery_url() {
        let err = ClientSettings::builder().build().unwrap_err();
        assert!(matches!(
            err,
            UaError::Configuration(ConfigurationError::MissingField { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let err = ClientSettings::builder()
            .discovery_url("http://localhost:4840")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            UaError::Configuration(ConfigurationError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_security_combination() {
        assert!(base()
            .security(SecurityMode::Sign, SecurityPolicy::None)
            .build()
            .is_err());
        assert!(base()
            .security(SecurityMode::None, SecurityPolicy::Basic256Sha256)
            .build()
            .is_err());
        assert!(base()
            .security(SecurityMode::SignAndEncrypt, SecurityPolicy::Basic256Sha256)
            .build()
            .is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let err = base().request_timeout(Duration::ZERO).build().unwrap_err();
        assert!(err.to_string().contains("request_timeout"));
    }

    #[test]
    fn test_small_buffers_rejected() {
        assert!(base().buffer_sizes(1024, 65535).build().is_err());
    }

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(parse_endpoint("opc.tcp://host:48010").unwrap(), "host:48010");
        assert_eq!(parse_endpoint("opc.tcp://host/path").unwrap(), "host:4840");
        assert_eq!(
            parse_endpoint("opc.tcp://10.0.0.1:4841/UA/Server").unwrap(),
            "10.0.0.1:4841"
        );
        assert!(parse_endpoint("opc.tcp://").is_err());
    }

    #[test]
    fn test_yaml_with_humantime() {
        let yaml = r#"
application_name: demo
discovery_urls:
  - opc.tcp://localhost:48010
request_timeout: 2s
user_token:
  type: user_name
  username: operator
  password: secret
"#;
        let settings = ClientSettings::from_str_with_format(yaml, SettingsFormat::Yaml).unwrap();
        assert_eq!(settings.request_timeout, Duration::from_secs(2));
        assert_eq!(settings.session_timeout, Duration::from_secs(60));
        assert!(matches!(settings.user_token, UserIdentity::UserName { .. }));
        settings.validate().unwrap();
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "application_name = \"demo\"\ndiscovery_urls = [\"opc.tcp://a:1\", \"opc.tcp://b:2\"]\nkeepalive_interval = \"500ms\""
        )
        .unwrap();
        let settings = ClientSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.keepalive_interval, Duration::from_millis(500));
        assert!(!settings.discovery_urls.is_empty());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = ClientSettings::from_file(file.path()).unwrap_err();
        assert!(matches!(
            err,
            UaError::Configuration(ConfigurationError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_discovery_override() {
        let mut settings = ClientSettings::new("opc.tcp://a:1");
        settings.apply_discovery_override(" opc.tcp://b:2 , ,opc.tcp://c:3");
        assert_eq!(settings.discovery_urls, vec!["opc.tcp://b:2", "opc.tcp://c:3"]);
        settings.apply_discovery_override("");
        assert_eq!(settings.discovery_urls.len(), 2);
    }

    #[test]
    fn test_json_round_trip() {
        let settings = base().username("op", "pw").build().unwrap();
        let json = serde_json::to_string(&settings).unwrap();
        let parsed = ClientSettings::from_str_with_format(&json, SettingsFormat::Json).unwrap();
        assert_eq!(parsed, settings);
    }
}
