//! Cache configuration with layered loading.
//!
//! Uses figment for layered configuration loading from multiple sources:
//!
//! 1. Environment variables (DOCSTACK_*)
//! 2. TOML config file (if DOCSTACK_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Cache configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (DOCSTACK_*)
/// 2. TOML config file (if DOCSTACK_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the persistent cache tier.
    ///
    /// Set via DOCSTACK_CACHE_DIR environment variable. Defaults to
    /// `docstack` under the per-user cache directory. Resolved once at load
    /// time.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache")).join("docstack")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { cache_dir: default_cache_dir() }
    }
}

impl CacheConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("DOCSTACK_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("DOCSTACK_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
