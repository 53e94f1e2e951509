//! The package index: a local mirror of the remote index repository.
//!
//! Layout under the user cache (`<cache>/cforge/registry`):
//!
//! ```text
//! cforge-index/packages/<letter>/<name>.toml   mirrored package files
//! .last_update                                  epoch seconds of last refresh
//! versions/<name>.cache                         tag discovery cache
//! ```
//!
//! The mirror is stale when it is missing, when `.last_update` is missing,
//! or when the last refresh is more than 24 hours old.

pub mod remote;
pub mod search;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use thiserror::Error;

use crate::core::manifest::{Manifest, ManifestError};
use crate::core::package::PackageDefinition;
use crate::resolver::PackageProvider;
use crate::sources::tags::{GitTagLister, TagCache, TagDiscovery, TagLister};
use crate::util::{fs, GlobalContext};

pub use remote::{GitIndexRemote, IndexRemote};
pub use search::SearchHit;

/// Maximum age of a fresh mirror.
pub const INDEX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default result limit for search.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

const INDEX_DIR: &str = "cforge-index";
const STAGING_DIR: &str = ".cforge-index.staging";
const TIMESTAMP_FILE: &str = ".last_update";
const VERSIONS_DIR: &str = "versions";

/// Errors raised by index refresh.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("package index at {url} is unavailable: {message}")]
    UpstreamUnavailable { url: String, message: String },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// What `update` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The mirror was fresh; nothing was done.
    Fresh,
    /// The existing mirror was fast-forwarded.
    Updated,
    /// A new mirror was cloned.
    Cloned,
    /// Offline mode: the refresh was skipped.
    Skipped,
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOutcome::Fresh => write!(f, "package index is up to date"),
            UpdateOutcome::Updated => write!(f, "package index updated"),
            UpdateOutcome::Cloned => write!(f, "package index cloned"),
            UpdateOutcome::Skipped => write!(f, "package index refresh skipped (offline)"),
        }
    }
}

fn epoch_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Local mirror of the package index.
#[derive(Debug, Clone)]
pub struct PackageIndex<R = GitIndexRemote> {
    root: PathBuf,
    url: String,
    remote: R,
    offline: bool,
}

impl<R: IndexRemote> PackageIndex<R> {
    /// `root` is the registry cache directory (`<cache>/cforge/registry`).
    pub fn new(root: impl Into<PathBuf>, url: impl Into<String>, remote: R) -> Self {
        PackageIndex {
            root: root.into(),
            url: url.into(),
            remote,
            offline: false,
        }
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mirror_dir(&self) -> PathBuf {
        self.root.join(INDEX_DIR)
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.mirror_dir().join("packages")
    }

    pub fn timestamp_path(&self) -> PathBuf {
        self.root.join(TIMESTAMP_FILE)
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join(VERSIONS_DIR)
    }

    /// Epoch seconds of the last successful refresh.
    pub fn last_update(&self) -> Option<u64> {
        std::fs::read_to_string(self.timestamp_path())
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update_at(SystemTime::now())
    }

    pub fn needs_update_at(&self, now: SystemTime) -> bool {
        if !self.packages_dir().is_dir() {
            return true;
        }
        match self.last_update() {
            None => true,
            Some(stamp) => epoch_secs(now).saturating_sub(stamp) > INDEX_TTL.as_secs(),
        }
    }

    pub fn update(&self, force: bool) -> Result<UpdateOutcome, IndexError> {
        self.update_at(force, SystemTime::now())
    }

    /// Refresh the mirror if forced or stale.
    ///
    /// An existing mirror is fast-forwarded; if that fails a fresh clone is
    /// staged beside it and swapped in only once complete, so a failed
    /// refresh leaves the previous mirror usable. The timestamp is written
    /// only on success.
    pub fn update_at(&self, force: bool, now: SystemTime) -> Result<UpdateOutcome, IndexError> {
        if !force && !self.needs_update_at(now) {
            tracing::debug!("package index is fresh");
            return Ok(UpdateOutcome::Fresh);
        }
        if self.offline {
            return Ok(UpdateOutcome::Skipped);
        }

        fs::ensure_dir(&self.root)?;

        let mirror = self.mirror_dir();
        let outcome = if mirror.is_dir() {
            match self.remote.pull(&mirror) {
                Ok(()) => UpdateOutcome::Updated,
                Err(e) => {
                    tracing::warn!("index pull failed, trying a fresh clone: {:#}", e);
                    self.fresh_clone()?;
                    UpdateOutcome::Cloned
                }
            }
        } else {
            self.fresh_clone()?;
            UpdateOutcome::Cloned
        };

        fs::write_atomic(&self.timestamp_path(), &epoch_secs(now).to_string())?;
        Ok(outcome)
    }

    fn fresh_clone(&self) -> Result<(), IndexError> {
        let staging = self.root.join(STAGING_DIR);
        fs::remove_dir_all_if_exists(&staging)?;

        tracing::info!("cloning package index from {}", self.url);
        if let Err(e) = self.remote.clone_into(&self.url, &staging) {
            let _ = fs::remove_dir_all_if_exists(&staging);
            return Err(IndexError::UpstreamUnavailable {
                url: self.url.clone(),
                message: format!("{:#}", e),
            });
        }

        let mirror = self.mirror_dir();
        fs::remove_dir_all_if_exists(&mirror)?;
        std::fs::rename(&staging, &mirror).map_err(|e| {
            anyhow::Error::new(e).context(format!(
                "failed to move fresh index into {}",
                mirror.display()
            ))
        })?;
        Ok(())
    }

    /// Path of a package file: `packages/<first letter, lowercased>/<name>.toml`.
    pub fn package_path(&self, name: &str) -> Option<PathBuf> {
        let first = name.chars().next()?.to_lowercase().to_string();
        Some(self.packages_dir().join(first).join(format!("{}.toml", name)))
    }

    /// All package names in the mirror, sorted.
    pub fn list_packages(&self) -> Vec<String> {
        fs::files_at_depth(&self.packages_dir(), 2, "toml")
            .iter()
            .filter_map(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Parse a package file without version discovery.
    pub fn read_definition(&self, name: &str) -> Result<Option<PackageDefinition>, ManifestError> {
        let Some(path) = self.package_path(name) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        let manifest = Manifest::load(&path)?;
        Ok(Some(PackageDefinition::from_manifest(&manifest, name)))
    }

    /// Score every package against `query`.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        for name in self.list_packages() {
            let definition = self.read_definition(&name).ok().flatten();
            let description = definition
                .as_ref()
                .map(|d| d.description.clone())
                .unwrap_or_default();

            let mut score = search::score_name(&name, query);
            if score == 0 {
                if let Some(ref d) = definition {
                    score = search::score_metadata(&d.description, &d.keywords, query);
                }
            }

            if score > 0 {
                hits.push(SearchHit {
                    name,
                    description,
                    score,
                });
            }
        }

        search::rank(&mut hits, limit);
        hits
    }
}

/// Package loader: index mirror plus tag discovery.
pub struct Registry<R = GitIndexRemote, L = GitTagLister> {
    index: PackageIndex<R>,
    discovery: TagDiscovery<L>,
    now: SystemTime,
    loaded: HashMap<String, PackageDefinition>,
}

impl Registry {
    /// The registry configured for this user.
    pub fn from_context(ctx: &GlobalContext) -> Self {
        let offline = ctx.is_offline();
        let index = PackageIndex::new(
            ctx.registry_cache_dir(),
            ctx.config().registry.url.clone(),
            GitIndexRemote,
        )
        .offline(offline);
        Registry::new(index, GitTagLister::new()).offline(offline)
    }
}

impl<R: IndexRemote, L: TagLister> Registry<R, L> {
    pub fn new(index: PackageIndex<R>, lister: L) -> Self {
        let cache = TagCache::new(index.versions_dir());
        Registry {
            index,
            discovery: TagDiscovery::new(lister, cache),
            now: SystemTime::now(),
            loaded: HashMap::new(),
        }
    }

    /// Evaluate cache lifetimes against a fixed clock.
    pub fn at_time(mut self, now: SystemTime) -> Self {
        self.now = now;
        self
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.discovery = self.discovery.offline(offline);
        self
    }

    pub fn index(&self) -> &PackageIndex<R> {
        &self.index
    }

    /// Refresh the index if stale, downgrading upstream failures to a warning.
    pub fn refresh(&mut self, force: bool) -> Result<UpdateOutcome> {
        match self.index.update_at(force, self.now) {
            Ok(outcome) => {
                if outcome != UpdateOutcome::Fresh {
                    self.loaded.clear();
                }
                Ok(outcome)
            }
            Err(IndexError::UpstreamUnavailable { url, message }) => {
                tracing::warn!("package index at {} is unavailable: {}", url, message);
                Ok(UpdateOutcome::Skipped)
            }
            Err(IndexError::Io(e)) => Err(e),
        }
    }

    /// Load a package, filling its version list from upstream tags when the
    /// file enumerates none.
    pub fn load(&mut self, name: &str) -> Result<Option<PackageDefinition>, ManifestError> {
        if let Some(hit) = self.loaded.get(name) {
            return Ok(Some(hit.clone()));
        }

        let Some(mut definition) = self.index.read_definition(name)? else {
            return Ok(None);
        };

        if definition.versions.is_empty()
            && definition.auto_versions
            && !definition.repository.is_empty()
        {
            definition.versions = self.discovery.versions(
                name,
                &definition.repository,
                &definition.tags,
                self.now,
            );
        }

        self.loaded.insert(name.to_string(), definition.clone());
        Ok(Some(definition))
    }
}

impl<R: IndexRemote, L: TagLister> PackageProvider for Registry<R, L> {
    fn get_package(&mut self, name: &str) -> Result<Option<PackageDefinition>, ManifestError> {
        self.load(name)
    }
}
