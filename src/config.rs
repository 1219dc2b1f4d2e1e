//! Device connection settings.

use std::time::Duration;

/// Default base URL of the device API.
pub const DEFAULT_DEVICE_URL: &str = "http://127.0.0.1/api/v2";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Settings for [`crate::backend::http::HttpBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Base URL including the API prefix, without trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DEVICE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl DeviceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().with_base_url(base_url)
    }

    /// Reads settings from the process environment.
    ///
    /// - `QUESTLOG_DEVICE_URL`: base URL (default: `http://127.0.0.1/api/v2`)
    /// - `QUESTLOG_REQUEST_TIMEOUT_MS`: request timeout (default: 30000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`DeviceConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup("QUESTLOG_DEVICE_URL") {
            config = config.with_base_url(url);
        }
        if let Some(ms) = parse_millis(&lookup, "QUESTLOG_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = ms;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Parses an optional millisecond value from `var`.
pub(crate) fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|e| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        })
}
