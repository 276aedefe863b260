//! Configuration system for Keystone.
//! TOML-based, `#[serde(default)]` structs with compiled defaults.

pub mod engine_config;
pub mod simulation_config;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use engine_config::EngineConfig;
pub use simulation_config::{PolicyConfig, RankerConfig};

use crate::errors::ConfigError;

/// Top-level configuration aggregating all sub-configs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeystoneConfig {
    pub engine: EngineConfig,
    pub ranker: RankerConfig,
    pub policy: PolicyConfig,
}

impl KeystoneConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// absent fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_compiled_values() {
        let cfg = KeystoneConfig::default();
        assert_eq!(cfg.engine.effective_law(), "cobb-douglas");
        assert_eq!(cfg.engine.effective_alpha_dev(), 0.5);
        assert_eq!(cfg.engine.effective_iter_max(), 10_000);
        assert!(cfg.engine.effective_stationary());
        assert_eq!(cfg.ranker.effective_group_size(), 100);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: KeystoneConfig =
            toml::from_str("[engine]\nlaw = \"linear\"\niter_max = 50\n").unwrap();
        assert_eq!(cfg.engine.effective_law(), "linear");
        assert_eq!(cfg.engine.effective_iter_max(), 50);
        assert_eq!(cfg.engine.effective_alpha_dep(), 0.5);
    }
}
