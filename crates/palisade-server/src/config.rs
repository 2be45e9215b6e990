//! Server configuration: TOML file plus environment overrides.
//!
//! Secret-bearing fields can be supplied through `PALISADE_*` environment
//! variables so they stay out of config files checked into deployments.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use palisade_core::{config::SignSecret, ProxyConfig};
use palisade_error::{ProxyError, Result};

/// Environment variable overriding `proxy.origin_url`.
pub const ENV_ORIGIN_URL: &str = "PALISADE_ORIGIN_URL";

/// Environment variable overriding `proxy.sign_secret` (SHA-256).
pub const ENV_SIGN_SECRET: &str = "PALISADE_SIGN_SECRET";

/// Environment variable overriding `proxy.pass_through_hash`.
pub const ENV_PASS_THROUGH_HASH: &str = "PALISADE_PASS_THROUGH_HASH";

/// Environment variable overriding `log_filter`.
pub const ENV_LOG_FILTER: &str = "PALISADE_LOG";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listener address.
    #[serde(default)]
    pub listen: ListenConfig,

    /// Admission mode.
    #[serde(default)]
    pub mode: AdmissionModeSetting,

    /// Path to the operations manifest (required in store mode).
    #[serde(default)]
    pub operations_manifest: Option<PathBuf>,

    /// Tracing filter, `tracing_subscriber::EnvFilter` syntax.
    #[serde(default)]
    pub log_filter: Option<String>,

    /// Policy engine configuration.
    pub proxy: ProxyConfig,
}

/// Which admission implementation serves requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionModeSetting {
    /// Signature verification over the canonical query.
    #[default]
    Signature,
    /// Preregistered operation store.
    Store,
}

/// Listener host and port.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ListenConfig {
    /// The bind address as `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Configuration`] when the file is unreadable or
    /// does not decode.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| ProxyError::config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Apply `PALISADE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup (environment in production,
    /// a map in tests).
    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(origin_url) = get(ENV_ORIGIN_URL) {
            self.proxy.origin_url = origin_url;
        }
        if let Some(secret) = get(ENV_SIGN_SECRET) {
            self.proxy.sign_secret = Some(SignSecret::Plain(secret));
        }
        if let Some(hash) = get(ENV_PASS_THROUGH_HASH) {
            self.proxy.pass_through_hash = Some(hash);
        }
        if let Some(filter) = get(ENV_LOG_FILTER) {
            self.log_filter = Some(filter);
        }
    }

    /// Fail fast on configurations that cannot serve.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Configuration`] when store mode has no
    /// manifest, or the proxy configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.mode == AdmissionModeSetting::Store && self.operations_manifest.is_none() {
            return Err(ProxyError::config(
                "store mode requires operations_manifest",
            ));
        }
        self.proxy.validate()
    }
}
