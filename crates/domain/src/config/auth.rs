use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Where a collaborator's API key comes from.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer `env`).
    #[serde(default)]
    pub key: Option<String>,
}

impl AuthConfig {
    /// Resolve the key.
    ///
    /// Precedence:
    /// 1. `key` field (plaintext — warn)
    /// 2. `env` field (reads environment variable)
    /// 3. Error
    pub fn resolve(&self) -> Result<String> {
        if let Some(ref key) = self.key {
            tracing::warn!(
                "API key loaded from plaintext config field 'key' — prefer 'env' instead"
            );
            return Ok(key.clone());
        }

        if let Some(ref env_var) = self.env {
            return match std::env::var(env_var) {
                Ok(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(Error::Auth(format!(
                    "environment variable '{env_var}' not set or empty"
                ))),
            };
        }

        Err(Error::Auth(
            "no API key configured: set 'key' or 'env'".into(),
        ))
    }
}
