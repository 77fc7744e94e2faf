mod auth;
mod drift;
mod extended_cache;
mod injection;
mod judge;
mod memory;
mod observability;
mod server;
mod sessions;
mod upstream;

pub use auth::*;
pub use drift::*;
pub use extended_cache::*;
pub use injection::*;
pub use judge::*;
pub use memory::*;
pub use observability::*;
pub use server::*;
pub use sessions::*;
pub use upstream::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub injection: InjectionConfig,
    #[serde(default)]
    pub extended_cache: ExtendedCacheConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Any `Error` entry is fatal at startup. Secrets for enabled
    /// collaborators are resolved here so a missing key stops the process
    /// before it accepts traffic.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.upstream.base_url.is_empty() {
            errors.push(ConfigError::error(
                "upstream.base_url",
                "base_url must not be empty",
            ));
        }
        if self.upstream.timeout_ms == 0 {
            errors.push(ConfigError::error(
                "upstream.timeout_ms",
                "timeout must be greater than 0",
            ));
        }

        if !self.drift.thresholds.is_descending() {
            errors.push(ConfigError::error(
                "drift.thresholds",
                "thresholds must be strictly descending: no_injection > nudge > correct > intervene",
            ));
        }

        let ratio = self.injection.summary_precompute_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            errors.push(ConfigError::error(
                "injection.summary_precompute_ratio",
                "ratio must be within 0.0..=1.0",
            ));
        }

        let ec = &self.extended_cache;
        if ec.enabled && ec.keep_alive_after_secs >= ec.max_idle_secs {
            errors.push(ConfigError::warning(
                "extended_cache.keep_alive_after_secs",
                "keep-alive threshold is not below max_idle_secs; no keep-alive will ever be sent",
            ));
        }
        if ec.enabled && ec.max_entries == 0 {
            errors.push(ConfigError::error(
                "extended_cache.max_entries",
                "max_entries must be greater than 0",
            ));
        }

        if self.judge.enabled {
            if let Err(e) = self.judge.auth.resolve() {
                errors.push(ConfigError::error("judge.auth", e.to_string()));
            }
        } else if self.drift.enabled {
            errors.push(ConfigError::warning(
                "judge.enabled",
                "drift detection is enabled but no judge is configured; no drift will be scored",
            ));
        }

        if self.memory.enabled {
            if self.memory.base_url.is_empty() {
                errors.push(ConfigError::error(
                    "memory.base_url",
                    "base_url must not be empty",
                ));
            }
            if self.memory.team_id.as_deref().map_or(true, str::is_empty) {
                errors.push(ConfigError::error(
                    "memory.team_id",
                    "team_id is required when memory is enabled",
                ));
            }
            if let Err(e) = self.memory.auth.resolve() {
                errors.push(ConfigError::error("memory.auth", e.to_string()));
            }
            if self.memory.lookup_timeout_ms == 0 {
                errors.push(ConfigError::error(
                    "memory.lookup_timeout_ms",
                    "timeout must be greater than 0",
                ));
            }
        }

        errors
    }
}
