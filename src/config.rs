use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::util::get_env_with_prefix;

/// Main configuration for a Quotewise deployment
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub billing: BillingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes (default: 1MB; webhook payloads are small)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

/// Billing and webhook processing settings.
///
/// The webhook secret is held in a [`SecretString`] so it never shows up in
/// debug output or serialized config.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Shared secret used to verify provider webhook signatures.
    pub webhook_secret: SecretString,
    /// Maximum age of a webhook signature timestamp, in seconds.
    pub webhook_tolerance_secs: i64,
    /// How many times a webhook event is attempted before being marked failed.
    pub max_event_attempts: u32,
    /// How many times a failed invoice payment is retried.
    pub max_payment_attempts: u32,
    /// Default currency for refunds and credit notes.
    pub default_currency: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            billing: BillingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            webhook_secret: SecretString::from(String::new()),
            webhook_tolerance_secs: 300,
            max_event_attempts: 3,
            max_payment_attempts: 3,
            default_currency: "usd".to_string(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.server.max_body_size = max_body_size;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<SecretString>) -> Self {
        self.config.billing.webhook_secret = secret.into();
        self
    }

    pub fn with_webhook_tolerance_secs(mut self, secs: i64) -> Self {
        self.config.billing.webhook_tolerance_secs = secs;
        self
    }

    pub fn with_max_event_attempts(mut self, attempts: u32) -> Self {
        self.config.billing.max_event_attempts = attempts;
        self
    }

    pub fn with_max_payment_attempts(mut self, attempts: u32) -> Self {
        self.config.billing.max_payment_attempts = attempts;
        self
    }

    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.config.billing.default_currency = currency.into();
        self
    }

    /// Load configuration from environment variables with QUOTEWISE_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
        // Check QUOTEWISE_PORT first, fall back to PORT (for Railway/Heroku compatibility)
        if let Some(port) = get_env_with_prefix("PORT") {
            if let Ok(p) = port.parse() {
                self.config.server.port = p;
            }
        }
        if let Some(max_body_size) = get_env_with_prefix("MAX_BODY_SIZE") {
            if let Ok(size) = max_body_size.parse() {
                self.config.server.max_body_size = size;
            }
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        if let Some(secret) = get_env_with_prefix("WEBHOOK_SECRET") {
            self.config.billing.webhook_secret = SecretString::from(secret);
        }
        if let Some(tolerance) = get_env_with_prefix("WEBHOOK_TOLERANCE_SECS") {
            if let Ok(t) = tolerance.parse() {
                self.config.billing.webhook_tolerance_secs = t;
            }
        }
        if let Some(attempts) = get_env_with_prefix("MAX_EVENT_ATTEMPTS") {
            if let Ok(a) = attempts.parse() {
                self.config.billing.max_event_attempts = a;
            }
        }
        if let Some(attempts) = get_env_with_prefix("MAX_PAYMENT_ATTEMPTS") {
            if let Ok(a) = attempts.parse() {
                self.config.billing.max_payment_attempts = a;
            }
        }
        if let Some(currency) = get_env_with_prefix("DEFAULT_CURRENCY") {
            self.config.billing.default_currency = currency;
        }

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration is invalid:
    /// - Invalid server address (host:port)
    /// - Invalid log level
    /// - Zero webhook tolerance or attempt bounds
    pub fn build(self) -> crate::error::Result<Config> {
        self.config.server.addr().map_err(|e| {
            crate::error::QuotewiseError::bad_request(format!(
                "Invalid server address {}:{} - {}",
                self.config.server.host, self.config.server.port, e
            ))
        })?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(crate::error::QuotewiseError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if self.config.server.port == 0 {
            return Err(crate::error::QuotewiseError::bad_request(
                "Server port must be greater than 0",
            ));
        }

        if self.config.server.max_body_size == 0 {
            return Err(crate::error::QuotewiseError::bad_request(
                "Maximum body size must be greater than 0",
            ));
        }

        if self.config.billing.webhook_tolerance_secs <= 0 {
            return Err(crate::error::QuotewiseError::bad_request(
                "Webhook tolerance must be greater than 0 seconds",
            ));
        }

        if self.config.billing.max_event_attempts == 0 {
            return Err(crate::error::QuotewiseError::bad_request(
                "Webhook event attempts must be greater than 0",
            ));
        }

        if self.config.billing.max_payment_attempts == 0 {
            return Err(crate::error::QuotewiseError::bad_request(
                "Payment retry attempts must be greater than 0",
            ));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.billing.webhook_tolerance_secs, 300);
        assert_eq!(config.billing.max_event_attempts, 3);
        assert_eq!(config.billing.default_currency, "usd");
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConfigBuilder::new()
            .with_port(9000)
            .with_log_level("debug")
            .with_webhook_secret("whsec_test".to_string())
            .with_max_event_attempts(5)
            .build()
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.billing.max_event_attempts, 5);
    }

    #[test]
    fn test_build_rejects_invalid_log_level() {
        let result = ConfigBuilder::new().with_log_level("verbose").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_zero_port() {
        let result = ConfigBuilder::new().with_port(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_zero_attempts() {
        let result = ConfigBuilder::new().with_max_event_attempts(0).build();
        assert!(result.is_err());

        let result = ConfigBuilder::new().with_max_payment_attempts(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_zero_tolerance() {
        let result = ConfigBuilder::new().with_webhook_tolerance_secs(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        let config = ConfigBuilder::new()
            .with_webhook_secret("whsec_super_secret".to_string())
            .build()
            .unwrap();

        let debug = format!("{:?}", config.billing);
        assert!(!debug.contains("whsec_super_secret"));
    }
}
