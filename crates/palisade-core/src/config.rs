//! Proxy configuration types.

use serde::Deserialize;

use palisade_error::{ProxyError, Result};

use crate::crypto::HashAlgorithm;

/// Replacement text for masked schema suggestions.
pub const DEFAULT_ERROR_MASK: &str = "[Suggestion hidden]";

/// Default document parse cap, in lexical tokens.
pub const DEFAULT_MAX_TOKENS: usize = 2000;

/// Default canonicalization memo bound, in entries.
pub const DEFAULT_CACHE_ENTRIES: usize = 10_000;

/// Configuration of the policy engine.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// URL of the upstream GraphQL server.
    pub origin_url: String,

    /// Document parse cap; parsing fails before any crypto or I/O when a
    /// query exceeds this many lexical tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// SHA-256 hex of the passthrough token. Requests presenting the
    /// matching token skip signature verification.
    #[serde(default)]
    pub pass_through_hash: Option<String>,

    /// HMAC secret for operation-hash verification, either a plain string
    /// (SHA-256) or `{secret, algorithm}`.
    #[serde(default)]
    pub sign_secret: Option<SignSecret>,

    /// Response shaping rules.
    #[serde(default)]
    pub response_rules: ResponseRules,

    /// Upper bound on canonicalization memo entries; 0 disables the memo.
    #[serde(default = "default_cache_entries")]
    pub cache_entries: usize,
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

fn default_cache_entries() -> usize {
    DEFAULT_CACHE_ENTRIES
}

impl ProxyConfig {
    /// Create a configuration with defaults for everything but the origin.
    #[must_use]
    pub fn new(origin_url: impl Into<String>) -> Self {
        Self {
            origin_url:        origin_url.into(),
            max_tokens:        DEFAULT_MAX_TOKENS,
            pass_through_hash: None,
            sign_secret:       None,
            response_rules:    ResponseRules::default(),
            cache_entries:     DEFAULT_CACHE_ENTRIES,
        }
    }

    /// Validate invariants that cannot be expressed in the type system.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Configuration`] when the origin URL does not
    /// parse, the passthrough hash is not 64 lowercase hex characters, the
    /// sign secret is empty, or the token cap is zero.
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.origin_url)
            .map_err(|e| ProxyError::config(format!("invalid origin_url: {e}")))?;

        if self.max_tokens == 0 {
            return Err(ProxyError::config("max_tokens must be positive"));
        }

        if let Some(hash) = &self.pass_through_hash {
            let well_formed = hash.len() == 64
                && hash
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
            if !well_formed {
                return Err(ProxyError::config(
                    "pass_through_hash must be 64 lowercase hex characters",
                ));
            }
        }

        if let Some(secret) = &self.sign_secret {
            if secret.secret().is_empty() {
                return Err(ProxyError::config("sign_secret must not be empty"));
            }
        }

        Ok(())
    }
}

/// HMAC signing secret, with an optional explicit algorithm.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignSecret {
    /// Bare secret string; the algorithm defaults to SHA-256.
    Plain(String),
    /// Secret with an explicit digest algorithm.
    WithAlgorithm {
        /// Key material.
        secret: String,
        /// Digest algorithm.
        algorithm: HashAlgorithm,
    },
}

impl SignSecret {
    /// The key material.
    #[must_use]
    pub fn secret(&self) -> &str {
        match self {
            Self::Plain(secret) | Self::WithAlgorithm { secret, .. } => secret,
        }
    }

    /// The configured digest algorithm.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Plain(_) => HashAlgorithm::default(),
            Self::WithAlgorithm { algorithm, .. } => *algorithm,
        }
    }
}

/// Post-origin response shaping rules.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseRules {
    /// Replacement for schema-suggestion matches in error messages; `None`
    /// disables masking.
    #[serde(default = "default_error_masking")]
    pub error_masking: Option<String>,

    /// Delete the `extensions` key from shaped payloads.
    #[serde(default)]
    pub remove_extensions: bool,

    /// Apply shaping to passthrough-admitted requests as well. Deployments
    /// reproducing the historical signature-handler behavior set this to
    /// false.
    #[serde(default = "default_shape_passthrough")]
    pub shape_passthrough: bool,
}

fn default_error_masking() -> Option<String> {
    Some(DEFAULT_ERROR_MASK.to_string())
}

fn default_shape_passthrough() -> bool {
    true
}

impl Default for ResponseRules {
    fn default() -> Self {
        Self {
            error_masking:     default_error_masking(),
            remove_extensions: false,
            shape_passthrough: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::new("https://origin.example/graphql");
        assert_eq!(config.max_tokens, 2000);
        assert!(config.pass_through_hash.is_none());
        assert!(config.sign_secret.is_none());
        assert_eq!(
            config.response_rules.error_masking.as_deref(),
            Some("[Suggestion hidden]")
        );
        assert!(!config.response_rules.remove_extensions);
        assert!(config.response_rules.shape_passthrough);
    }

    #[test]
    fn test_validate_accepts_sane_config() {
        let mut config = ProxyConfig::new("https://origin.example/graphql");
        config.pass_through_hash =
            Some("d74ff0ee8da3b9806b18c877dbf29bbde50b5bd8e4dad7a3a725000feb82e8f1".to_string());
        config.sign_secret = Some(SignSecret::Plain("signature".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_origin() {
        let config = ProxyConfig::new("not a url");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_hash() {
        let mut config = ProxyConfig::new("https://origin.example/graphql");
        config.pass_through_hash = Some("abcd".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_uppercase_hash() {
        let mut config = ProxyConfig::new("https://origin.example/graphql");
        config.pass_through_hash =
            Some("D74FF0EE8DA3B9806B18C877DBF29BBDE50B5BD8E4DAD7A3A725000FEB82E8F1".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_secret() {
        let mut config = ProxyConfig::new("https://origin.example/graphql");
        config.sign_secret = Some(SignSecret::Plain(String::new()));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sign_secret_plain_defaults_to_sha256() {
        let secret: SignSecret = serde_json::from_str("\"signature\"").unwrap();
        assert_eq!(secret.secret(), "signature");
        assert_eq!(secret.algorithm(), HashAlgorithm::Sha256);
    }

    #[test]
    fn test_sign_secret_with_algorithm() {
        let secret: SignSecret =
            serde_json::from_str(r#"{"secret": "signature", "algorithm": "sha512"}"#).unwrap();
        assert_eq!(secret.secret(), "signature");
        assert_eq!(secret.algorithm(), HashAlgorithm::Sha512);
    }

    #[test]
    fn test_response_rules_from_toml() {
        let rules: ResponseRules = toml::from_str(
            r#"
            error_masking = "<hidden>"
            remove_extensions = true
            "#,
        )
        .unwrap();
        assert_eq!(rules.error_masking.as_deref(), Some("<hidden>"));
        assert!(rules.remove_extensions);
        assert!(rules.shape_passthrough);
    }
}
