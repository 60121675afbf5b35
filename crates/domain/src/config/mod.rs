mod credentials;
mod exchange;
mod service;
mod stream;

pub use credentials::*;
pub use exchange::*;
pub use service::*;
pub use stream::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Emit structured JSON lines instead of the compact human format.
    #[serde(default)]
    pub json: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
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

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut error = |field: &str, message: &str| {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: field.into(),
                message: message.into(),
            })
        };

        if self.service.base_url.is_empty() {
            error("service.base_url", "base_url must not be empty");
        } else if !self.service.base_url.starts_with("http://")
            && !self.service.base_url.starts_with("https://")
        {
            error("service.base_url", "base_url must be an http(s) URL");
        }

        if self.service.org_id.is_empty() {
            error("service.org_id", "org_id must not be empty");
        }

        if self.service.es_developer_name.is_empty() {
            error(
                "service.es_developer_name",
                "es_developer_name must not be empty",
            );
        }

        if self.credentials.key_path.is_empty() {
            error("credentials.key_path", "key_path must not be empty");
        }

        // The window is measured from the skewed `iat`, so it has to outlast
        // the skew or the assertion is born expired.
        if self.credentials.validity_window_secs <= self.credentials.clock_skew_tolerance_secs {
            error(
                "credentials.validity_window_secs",
                "validity window must be longer than clock_skew_tolerance_secs",
            );
        }

        if self.exchange.request_timeout_ms == 0 {
            error("exchange.request_timeout_ms", "timeout must be greater than 0");
        }

        if self.stream.idle_timeout_ms == 0 {
            error("stream.idle_timeout_ms", "idle timeout must be greater than 0");
        }

        if self.stream.channel_capacity == 0 {
            error("stream.channel_capacity", "channel capacity must be greater than 0");
        }

        if self.stream.initial_backoff_ms > self.stream.max_backoff_ms {
            error(
                "stream.initial_backoff_ms",
                "initial backoff must not exceed max_backoff_ms",
            );
        }

        if let Some(cc) = &self.exchange.client_credentials {
            if cc.client_id.trim().is_empty() {
                error(
                    "exchange.client_credentials.client_id",
                    "client_id must not be empty",
                );
            }
            if cc.client_secret.is_none() && cc.client_secret_env.is_none() {
                error(
                    "exchange.client_credentials.client_secret",
                    "set client_secret_env (or client_secret)",
                );
            }
        }

        // Warnings below.
        if self.credentials.kid.is_none() && self.credentials.key_format == KeyFormat::Pem {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "credentials.kid".into(),
                message: "PEM keys carry no kid; set credentials.kid".into(),
            });
        }

        if self.credentials.validity_window_secs > 600 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "credentials.validity_window_secs".into(),
                message: "assertions valid for more than 10 minutes are often rejected".into(),
            });
        }

        if self
            .exchange
            .client_credentials
            .as_ref()
            .is_some_and(|cc| cc.client_secret.is_some())
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "exchange.client_credentials.client_secret".into(),
                message: "client secret stored in plaintext; prefer client_secret_env".into(),
            });
        }

        if self.session.safety_margin_secs >= self.exchange.default_token_lifetime_secs {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "session.safety_margin_secs".into(),
                message: "safety margin exceeds the default token lifetime; every token \
                          without expires_in will be refreshed immediately"
                    .into(),
            });
        }

        errors
    }

    /// Audience for assertions: explicit setting or the service base URL.
    pub fn assertion_audience(&self) -> String {
        self.credentials
            .audience
            .clone()
            .unwrap_or_else(|| self.service.base_url.trim_end_matches('/').to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
