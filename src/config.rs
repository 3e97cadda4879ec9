use crate::error::{PaymentError, Result};
use std::time::Duration;

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:5000/api";

/// Timing rules for the payment token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Validity window of locally built tokens. Gateway tokens carry their own.
    pub token_ttl: Duration,
    pub gateway_timeout: Duration,
    /// Quiet period before an amount or message edit triggers a new token.
    pub amount_debounce: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(5 * 60),
            gateway_timeout: Duration::from_secs(10),
            amount_debounce: Duration::from_millis(300),
        }
    }
}

/// Client settings, usually filled in from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub gateway_url: String,
    /// Bearer token of the current session, owned by the auth layer.
    pub auth_token: Option<String>,
    pub gateway_timeout: Duration,
    pub token_ttl: Duration,
    pub tick_interval: Duration,
    pub amount_debounce: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let policy = TokenPolicy::default();
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            auth_token: None,
            gateway_timeout: policy.gateway_timeout,
            token_ttl: policy.token_ttl,
            tick_interval: Duration::from_secs(1),
            amount_debounce: policy.amount_debounce,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.gateway_url.starts_with("http://") || self.gateway_url.starts_with("https://")) {
            return Err(PaymentError::Config(format!(
                "gateway url must be http(s): {}",
                self.gateway_url
            )));
        }
        if self.gateway_timeout.is_zero() {
            return Err(PaymentError::Config("gateway timeout must be positive".into()));
        }
        if self.token_ttl.is_zero() {
            return Err(PaymentError::Config("token ttl must be positive".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(PaymentError::Config("tick interval must be positive".into()));
        }
        Ok(())
    }

    /// Token timings derived from this configuration.
    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            token_ttl: self.token_ttl,
            gateway_timeout: self.gateway_timeout,
            amount_debounce: self.amount_debounce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.token_ttl, Duration::from_secs(300));
        assert_eq!(config.gateway_timeout, Duration::from_secs(10));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = ClientConfig {
            gateway_url: "ftp://example.com".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PaymentError::Config(_))));

        let config = ClientConfig {
            gateway_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PaymentError::Config(_))));
    }

    #[test]
    fn test_token_policy_follows_config() {
        let config = ClientConfig {
            amount_debounce: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.token_policy().amount_debounce, Duration::ZERO);
    }
}
