//! Global context for cforge operations.
//!
//! Provides centralized access to configuration, paths, and environment.
//! Everything a command needs to know about the user's environment is
//! captured here once, at startup.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};

use crate::core::manifest::ManifestError;
use crate::core::workspace;
use crate::util::config::{self, Config};

/// Overrides the user cache root.
pub const CACHE_DIR_ENV: &str = "CFORGE_CACHE_DIR";

/// Overrides the install root.
pub const INSTALL_PATH_ENV: &str = "CFORGE_INSTALL_PATH";

/// Points at the vcpkg installation.
pub const VCPKG_ROOT_ENV: &str = "VCPKG_ROOT";

/// Set to `1` or `true` to forbid remote operations.
pub const OFFLINE_ENV: &str = "CFORGE_OFFLINE";

/// Project directories for cforge
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("", "", "cforge"));

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// User cache root (`<cache>/cforge`)
    cache_root: PathBuf,

    /// Where installed projects go
    install_root: PathBuf,

    vcpkg_root: Option<PathBuf>,

    verbose: bool,

    color: bool,

    /// Offline forced through the environment
    offline_env: bool,

    config: Config,
}

impl GlobalContext {
    /// Create a new GlobalContext from the process environment.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::for_dir(cwd))
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        Ok(Self::for_dir(cwd))
    }

    fn for_dir(cwd: PathBuf) -> Self {
        let cache_root = env_path(CACHE_DIR_ENV).unwrap_or_else(|| {
            BaseDirs::new()
                .map(|dirs| dirs.cache_dir().join("cforge"))
                .unwrap_or_else(|| cwd.join(".cforge").join("cache"))
        });

        let install_root = env_path(INSTALL_PATH_ENV).unwrap_or_else(|| {
            PROJECT_DIRS
                .as_ref()
                .map(|dirs| dirs.data_dir().join("installed"))
                .unwrap_or_else(|| cwd.join(".cforge").join("installed"))
        });

        let config = config::global_config_path()
            .map(|path| Config::load_or_default(&path))
            .unwrap_or_default();

        GlobalContext {
            cwd,
            cache_root,
            install_root,
            vcpkg_root: env_path(VCPKG_ROOT_ENV),
            verbose: false,
            color: true,
            offline_env: env_flag(OFFLINE_ENV),
            config,
        }
    }

    /// Use a different cache root.
    pub fn with_cache_root(mut self, root: PathBuf) -> Self {
        self.cache_root = root;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// The user cache root (`<cache>/cforge`).
    pub fn cache_dir(&self) -> &Path {
        &self.cache_root
    }

    /// Index mirror, timestamp and tag cache live here.
    pub fn registry_cache_dir(&self) -> PathBuf {
        self.cache_root.join("registry")
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn vcpkg_root(&self) -> Option<&Path> {
        self.vcpkg_root.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_offline(&self) -> bool {
        self.offline_env || self.config.net.offline
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Find `cforge.toml` starting from cwd and searching upward.
    pub fn find_manifest(&self) -> Result<PathBuf, ManifestError> {
        workspace::find_manifest(&self.cwd)
    }
}
