//! User configuration.
//!
//! Read from `<config-dir>/cforge/config.toml`. Every field is optional:
//!
//! ```toml
//! [registry]
//! url = "https://github.com/ChaseSunstrom/cforge-index.git"
//! auto_update = true
//!
//! [net]
//! offline = false
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Upstream of the package index.
pub const DEFAULT_REGISTRY_URL: &str = "https://github.com/ChaseSunstrom/cforge-index.git";

/// cforge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub net: NetConfig,
}

/// Package index settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Git URL of the index repository
    pub url: String,

    /// Refresh a stale index before resolving
    pub auto_update: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            url: DEFAULT_REGISTRY_URL.to_string(),
            auto_update: true,
        }
    }
}

/// Network settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Never contact remotes; work from caches only
    pub offline: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("ignoring config at {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }
}

/// `<config-dir>/cforge/config.toml` for this user.
pub fn global_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("cforge").join("config.toml"))
}
