use crate::domain::waterfall::WaterfallOrder;
use crate::error::{AllocationError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 5_000;

/// Engine settings.
///
/// Loaded from TOML, for example:
///
/// ```toml
/// default_order = ["rent", "late_fee", "utility", "other"]
/// transaction_timeout_ms = 2000
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Waterfall used when a request does not carry its own order.
    pub default_order: WaterfallOrder,
    /// Upper bound for one allocation transaction, lock waits included.
    pub transaction_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_order: WaterfallOrder::default(),
            transaction_timeout: Duration::from_millis(DEFAULT_TRANSACTION_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    default_order: Option<WaterfallOrder>,
    transaction_timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(source).map_err(|e| AllocationError::Config(e.to_string()))?;
        let defaults = Self::default();

        let default_order = raw.default_order.unwrap_or(defaults.default_order);
        if default_order.types().is_empty() {
            return Err(AllocationError::Config(
                "default_order must list at least one charge type".to_string(),
            ));
        }
        let transaction_timeout = match raw.transaction_timeout_ms {
            Some(0) => {
                return Err(AllocationError::Config(
                    "transaction_timeout_ms must be greater than zero".to_string(),
                ));
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.transaction_timeout,
        };

        Ok(Self {
            default_order,
            transaction_timeout,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::charge::ChargeType;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_config_overrides() {
        let config = EngineConfig::from_toml_str(
            "default_order = [\"utility\", \"rent\"]\ntransaction_timeout_ms = 250\n",
        )
        .unwrap();
        assert_eq!(
            config.default_order.types(),
            &[ChargeType::Utility, ChargeType::Rent]
        );
        assert_eq!(config.transaction_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(EngineConfig::from_toml_str("default_order = []").is_err());
        assert!(EngineConfig::from_toml_str("transaction_timeout_ms = 0").is_err());
        assert!(EngineConfig::from_toml_str("default_order = [\"parking\"]").is_err());
        assert!(EngineConfig::from_toml_str("unknown = 1").is_err());
    }
}
