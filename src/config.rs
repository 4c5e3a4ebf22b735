//! Configuration Management
//!
//! Provider connection settings, read from a YAML file and overridden by
//! the `NSXT_*` environment variables.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

pub const ENV_HOST: &str = "NSXT_MANAGER_HOST";
pub const ENV_USERNAME: &str = "NSXT_USERNAME";
pub const ENV_PASSWORD: &str = "NSXT_PASSWORD";
pub const ENV_ALLOW_UNVERIFIED_SSL: &str = "NSXT_ALLOW_UNVERIFIED_SSL";
pub const ENV_REQUEST_TIMEOUT: &str = "NSXT_REQUEST_TIMEOUT";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// NSX Manager connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Manager host name, `host:port`, or full `https://` URL
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Skip TLS certificate verification
    #[serde(default)]
    pub allow_unverified_ssl: bool,
    /// Per-request timeout enforced by the HTTP client
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            allow_unverified_ssl: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

// Never print the password
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("allow_unverified_ssl", &self.allow_unverified_ssl)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("nsxt-provider").join("config.yaml"))
    }

    /// Load configuration from `path` (or the default location), then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply `NSXT_*` overrides from the given lookup (environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(username) = lookup(ENV_USERNAME) {
            self.username = username;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.password = password;
        }
        if let Some(flag) = lookup(ENV_ALLOW_UNVERIFIED_SSL) {
            self.allow_unverified_ssl = parse_bool(&flag)
                .with_context(|| format!("Invalid value for {}", ENV_ALLOW_UNVERIFIED_SSL))?;
        }
        if let Some(timeout) = lookup(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for {}", ENV_REQUEST_TIMEOUT))?;
        }
        Ok(())
    }

    /// Check that the settings are usable before any client is built
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("No NSX manager configured. Set {} or `host` in the config file", ENV_HOST);
        }
        if self.username.is_empty() {
            bail!("No NSX username configured. Set {} or `username` in the config file", ENV_USERNAME);
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        self.base_url()?;
        Ok(())
    }

    /// Manager base URL, always ending in `/`
    pub fn base_url(&self) -> Result<Url> {
        let host = self.host.trim().trim_end_matches('/');
        let raw = if host.contains("://") {
            format!("{}/", host)
        } else {
            format!("https://{}/", host)
        };

        let url = Url::parse(&raw).with_context(|| format!("Invalid NSX manager host {:?}", self.host))?;
        match url.scheme() {
            "https" | "http" => {}
            other => bail!("Unsupported scheme {:?} for NSX manager", other),
        }
        if url.host_str().is_none() {
            bail!("NSX manager host {:?} has no host name", self.host);
        }
        Ok(url)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config: ProviderConfig =
            serde_yaml::from_str("host: file.example.com\nusername: admin\n").unwrap();
        config
            .apply_overrides(lookup(&[
                (ENV_HOST, "env.example.com"),
                (ENV_PASSWORD, "pw"),
                (ENV_ALLOW_UNVERIFIED_SSL, "true"),
            ]))
            .unwrap();

        assert_eq!(config.host, "env.example.com");
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "pw");
        assert!(config.allow_unverified_ssl);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_invalid_boolean_override_is_rejected() {
        let mut config = ProviderConfig::default();
        let result = config.apply_overrides(lookup(&[(ENV_ALLOW_UNVERIFIED_SSL, "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_base_url_defaults_to_https() {
        let config = ProviderConfig {
            host: "10.0.0.5:8443".to_string(),
            ..ProviderConfig::default()
        };
        assert_eq!(config.base_url().unwrap().as_str(), "https://10.0.0.5:8443/");

        let config = ProviderConfig {
            host: "http://localhost:9000/".to_string(),
            ..ProviderConfig::default()
        };
        assert_eq!(config.base_url().unwrap().as_str(), "http://localhost:9000/");
    }

    #[test]
    fn test_validate_requires_host_and_username() {
        assert!(ProviderConfig::default().validate().is_err());

        let config = ProviderConfig {
            host: "nsx.example.com".to_string(),
            ..ProviderConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ProviderConfig {
            host: "nsx.example.com".to_string(),
            username: "admin".to_string(),
            ..ProviderConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ProviderConfig {
            password: "hunter2".to_string(),
            ..ProviderConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
