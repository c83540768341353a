//! Configuration management for the gatekeeper.

use serde::{Deserialize, Serialize};

/// Main configuration for the gatekeeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Remote authority configuration
    #[serde(default)]
    pub authority: AuthorityConfig,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            authority: AuthorityConfig::default(),
        }
    }
}

/// Remote rate limit authority configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Base URL of the authority. Absent or empty means rate limiting
    /// is administratively disabled.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Credential sent with every request to the authority
    #[serde(default)]
    pub api_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            api_key: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    10
}

impl AuthorityConfig {
    /// Whether an authority endpoint is configured at all.
    pub fn is_enabled(&self) -> bool {
        self.endpoint_url
            .as_deref()
            .is_some_and(|url| !url.is_empty())
    }
}

impl GatekeeperConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GatekeeperConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::GatekeeperError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `GATEHOUSE_ENDPOINT_URL`, `GATEHOUSE_API_KEY`, and
    /// `GATEHOUSE_REQUEST_TIMEOUT_SECS`. A missing or empty endpoint URL
    /// means rate limiting is disabled, not a configuration error.
    pub fn from_env() -> Self {
        let endpoint_url = std::env::var("GATEHOUSE_ENDPOINT_URL")
            .ok()
            .filter(|url| !url.is_empty());
        let api_key = std::env::var("GATEHOUSE_API_KEY").unwrap_or_default();
        let request_timeout_secs = std::env::var("GATEHOUSE_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.parse().ok())
            .unwrap_or_else(default_request_timeout);

        Self {
            authority: AuthorityConfig {
                endpoint_url,
                api_key,
                request_timeout_secs,
            },
        }
    }
}
