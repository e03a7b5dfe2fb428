//! Runtime configuration.

use serde::Deserialize;

use crate::error::ConfigError;

/// Tunables of a [`Runtime`](crate::reactive::Runtime).
///
/// Every field has a default, so a partial (or empty) JSON document is a
/// valid configuration.
///
/// ```rust,ignore
/// let config = RuntimeConfig::from_json(r#"{ "sweep_interval": 64 }"#)?;
/// let rt = Runtime::with_config(config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Log a warning when a read-only proxy is written to.
    pub warn_on_readonly_write: bool,
    /// New dependency entries between two sweeps of dead targets.
    pub sweep_interval: usize,
    /// Upper bound on microtasks run by one drain.
    pub microtask_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            warn_on_readonly_write: true,
            sweep_interval: 256,
            microtask_limit: 100_000,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval == 0 {
            return Err(ConfigError::Zero {
                field: "sweep_interval",
            });
        }
        if self.microtask_limit == 0 {
            return Err(ConfigError::Zero {
                field: "microtask_limit",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = RuntimeConfig::from_json(r#"{ "sweep_interval": 8 }"#).unwrap();
        assert_eq!(config.sweep_interval, 8);
        assert!(config.warn_on_readonly_write);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = RuntimeConfig::from_json(r#"{ "microtask_limit": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Zero { field: "microtask_limit" }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = RuntimeConfig::from_json(r#"{ "sweep": 1 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
