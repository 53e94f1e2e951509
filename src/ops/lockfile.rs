//! Lock file engine.
//!
//! `cforge.lock` pins every resolved dependency so later builds fetch the
//! same artifacts:
//!
//! ```toml
//! # cforge.lock - Dependency lock file for reproducible builds
//! # Generated by cforge - DO NOT EDIT MANUALLY
//! # Mode: FetchContent
//!
//! [metadata]
//! version = 1
//! manifest_hash = "…"
//!
//! [dependency.fmt]
//! source_type = "index"
//! url = "https://github.com/fmtlib/fmt"
//! version = "11.2.0"
//! resolved = "11.2.0"
//! ```
//!
//! The file carries no timestamp: generating twice from an unchanged
//! manifest produces identical bytes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use git2::Repository;
use miette::Diagnostic as MietteDiagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::dependency::{DependencySpec, SourceKind};
use crate::resolver::{PackageProvider, Resolution, ResolvedDependency, Resolver};
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::fs;
use crate::util::hash::sha256_bytes;

/// Current lock file schema.
pub const LOCKFILE_VERSION: u32 = 1;

const HEADER: &str = "# cforge.lock - Dependency lock file for reproducible builds\n\
                      # Generated by cforge - DO NOT EDIT MANUALLY\n\
                      # Mode: FetchContent\n\n";

/// Shortest commit prefix accepted when matching a checkout.
const MIN_COMMIT_PREFIX: usize = 7;

#[derive(Debug, Error, MietteDiagnostic)]
pub enum LockfileError {
    #[error("lock file `{}` already exists", path.display())]
    #[diagnostic(
        code(cforge::lockfile::exists),
        help("run `cforge lock --force` to regenerate it")
    )]
    Exists { path: PathBuf },

    #[error("`{name}` does not match the lock file: expected {expected}, found {found}")]
    #[diagnostic(code(cforge::lockfile::mismatch))]
    Mismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("lock file schema version {version} is not supported (expected 1)")]
    #[diagnostic(code(cforge::lockfile::unsupported_version))]
    UnsupportedVersion { version: u32 },
}

impl LockfileError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            LockfileError::Exists { path } => {
                Diagnostic::warning(format!("`{}` already exists", path.display()))
                    .with_suggestion(suggestions::STALE_LOCK)
            }
            LockfileError::Mismatch {
                name,
                expected,
                found,
            } => Diagnostic::error(format!("`{}` does not match the lock file", name))
                .with_context(format!("locked at {}", expected))
                .with_context(format!("found {}", found))
                .with_suggestion(suggestions::FETCH_DEPS)
                .with_suggestion(suggestions::STALE_LOCK),
            LockfileError::UnsupportedVersion { version } => Diagnostic::error(format!(
                "lock file schema version {} is not supported",
                version
            ))
            .with_suggestion(suggestions::STALE_LOCK),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub version: u32,
    /// Fingerprint of the dependency specifications the file was generated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_hash: Option<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata {
            version: LOCKFILE_VERSION,
            manifest_hash: None,
        }
    }
}

/// One pinned dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDependency {
    pub source_type: SourceKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Tag or commit the working tree must be at
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resolved: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
}

impl LockedDependency {
    pub fn from_resolved(dep: &ResolvedDependency) -> Self {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();

        match dep.kind() {
            SourceKind::Index => LockedDependency {
                source_type: SourceKind::Index,
                url: text(&dep.url),
                version: dep.version.clone(),
                resolved: text(&dep.tag),
                branch: String::new(),
            },
            SourceKind::Git => LockedDependency {
                source_type: SourceKind::Git,
                url: text(&dep.url),
                version: dep
                    .tag
                    .clone()
                    .or_else(|| dep.branch.clone())
                    .or_else(|| dep.commit.clone())
                    .unwrap_or_default(),
                resolved: dep.commit.clone().or_else(|| dep.tag.clone()).unwrap_or_default(),
                branch: text(&dep.branch),
            },
            SourceKind::Vcpkg => LockedDependency {
                source_type: SourceKind::Vcpkg,
                url: String::new(),
                version: dep.version.clone(),
                resolved: match (&dep.vcpkg_name, &dep.vcpkg_triplet) {
                    (Some(name), Some(triplet)) => format!("{}:{}", name, triplet),
                    (Some(name), None) => name.clone(),
                    _ => dep.name.clone(),
                },
                branch: String::new(),
            },
            SourceKind::System => LockedDependency {
                source_type: SourceKind::System,
                url: String::new(),
                version: dep.version.clone(),
                resolved: dep.system_name.clone().unwrap_or_else(|| dep.name.clone()),
                branch: String::new(),
            },
            SourceKind::Project => LockedDependency {
                source_type: SourceKind::Project,
                url: dep
                    .path
                    .as_ref()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default(),
                version: dep.version.clone(),
                resolved: String::new(),
                branch: String::new(),
            },
        }
    }

    /// Whether verify compares this entry against a checkout.
    pub fn is_checked_out(&self) -> bool {
        matches!(self.source_type, SourceKind::Index | SourceKind::Git)
    }
}

/// A parsed or freshly generated lock file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(default)]
    pub metadata: Metadata,
    /// Keyed by dependency name, so iteration is alphabetical
    #[serde(rename = "dependency", default)]
    pub dependencies: BTreeMap<String, LockedDependency>,
}

impl Lockfile {
    pub fn from_resolution(resolution: &Resolution, manifest_hash: Option<String>) -> Self {
        let dependencies = resolution
            .iter()
            .map(|dep| (dep.name.clone(), LockedDependency::from_resolved(dep)))
            .collect();
        Lockfile {
            metadata: Metadata {
                version: LOCKFILE_VERSION,
                manifest_hash,
            },
            dependencies,
        }
    }

    pub fn get(&self, name: &str) -> Option<&LockedDependency> {
        self.dependencies.get(name)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn manifest_hash(&self) -> Option<&str> {
        self.metadata.manifest_hash.as_deref()
    }

    /// The canonical text of this lock file, header included.
    pub fn render(&self) -> Result<String> {
        let body = toml::to_string(self).context("failed to serialize lock file")?;
        Ok(format!("{}{}", HEADER, body))
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let lockfile: Lockfile = toml::from_str(content)
            .with_context(|| format!("failed to parse lock file: {}", path.display()))?;

        if lockfile.metadata.version != LOCKFILE_VERSION {
            return Err(LockfileError::UnsupportedVersion {
                version: lockfile.metadata.version,
            }
            .into());
        }
        Ok(lockfile)
    }

    /// Load a lock file; `None` when it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Lockfile::parse(&content, path).map(Some)
    }

    /// Replace `path` with this lock file in one step.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write_atomic(path, &self.render()?)
    }
}

/// Fingerprint of a dependency list. Insensitive to declaration order,
/// whitespace and comments in the manifest.
pub fn manifest_hash(specs: &[DependencySpec]) -> Result<String> {
    let mut sorted: Vec<&DependencySpec> = specs.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    let bytes = serde_json::to_vec(&sorted).context("failed to serialize dependency list")?;
    Ok(sha256_bytes(&bytes))
}

/// Whether the lock file at `path` is missing, unreadable, or generated
/// from a different dependency list than `specs`.
pub fn lockfile_needs_update(path: &Path, specs: &[DependencySpec]) -> Result<bool> {
    let lockfile = match Lockfile::load(path) {
        Ok(Some(lockfile)) => lockfile,
        Ok(None) => return Ok(true),
        Err(e) => {
            tracing::debug!("lock file is unreadable: {:#}", e);
            return Ok(true);
        }
    };

    let current = manifest_hash(specs)?;
    Ok(lockfile.manifest_hash() != Some(current.as_str()))
}

/// Resolve `specs` and write the lock file at `path`.
///
/// Refuses to replace an existing file unless `force` is set. With no
/// dependencies nothing is written and a previous lock file is removed; the
/// returned lock file is then empty.
pub fn generate<P: PackageProvider>(
    path: &Path,
    specs: &[DependencySpec],
    resolver: &mut Resolver<P>,
    force: bool,
) -> Result<Lockfile> {
    if path.exists() && !force {
        return Err(LockfileError::Exists {
            path: path.to_path_buf(),
        }
        .into());
    }

    let resolution = resolver.resolve_all(specs)?;
    let lockfile = Lockfile::from_resolution(&resolution, Some(manifest_hash(specs)?));

    if lockfile.is_empty() {
        tracing::info!("no dependencies to lock");
        if clean(path)? {
            tracing::debug!("removed stale {}", path.display());
        }
        return Ok(lockfile);
    }

    lockfile.save(path)?;
    tracing::debug!("wrote {} entries to {}", lockfile.len(), path.display());
    Ok(lockfile)
}

/// Remove the lock file. Returns whether there was one.
pub fn clean(path: &Path) -> Result<bool> {
    fs::remove_file_if_exists(path)
}

/// State of a checked-out dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoHead {
    /// Full hex commit id of HEAD
    pub commit: String,
    /// Tags pointing at HEAD
    pub tags: Vec<String>,
}

impl RepoHead {
    /// Whether this checkout is at `resolved`, given as a tag, a full
    /// commit id or an abbreviated one.
    pub fn matches(&self, resolved: &str) -> bool {
        if self.tags.iter().any(|t| t == resolved) {
            return true;
        }
        let resolved = resolved.to_ascii_lowercase();
        self.commit == resolved
            || (resolved.len() >= MIN_COMMIT_PREFIX
                && resolved.chars().all(|c| c.is_ascii_hexdigit())
                && self.commit.starts_with(&resolved))
    }

    fn describe(&self) -> String {
        let short = &self.commit[..self.commit.len().min(MIN_COMMIT_PREFIX)];
        match self.tags.first() {
            Some(tag) => format!("{} ({})", tag, short),
            None => short.to_string(),
        }
    }
}

/// Reads the working-tree state of a fetched dependency.
pub trait RepoInspector {
    fn head(&self, dir: &Path) -> Result<RepoHead>;
}

/// [`RepoInspector`] backed by libgit2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Git2Inspector;

impl RepoInspector for Git2Inspector {
    fn head(&self, dir: &Path) -> Result<RepoHead> {
        let repo = Repository::open(dir)
            .with_context(|| format!("not a git repository: {}", dir.display()))?;
        let head = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .with_context(|| format!("failed to read HEAD of {}", dir.display()))?;

        let mut tags = Vec::new();
        let names = repo.tag_names(None).context("failed to list tags")?;
        for name in names.iter().flatten() {
            let points_at_head = repo
                .find_reference(&format!("refs/tags/{}", name))
                .and_then(|r| r.peel_to_commit())
                .map(|c| c.id() == head.id())
                .unwrap_or(false);
            if points_at_head {
                tags.push(name.to_string());
            }
        }
        tags.sort();

        Ok(RepoHead {
            commit: head.id().to_string(),
            tags,
        })
    }
}

/// Compare `lockfile` with the checkouts under `deps_dir`.
///
/// Returns every mismatch; an empty list means the tree matches. Nothing on
/// disk is modified.
pub fn verify(
    lockfile: &Lockfile,
    deps_dir: &Path,
    inspector: &dyn RepoInspector,
) -> Vec<LockfileError> {
    let mut mismatches = Vec::new();

    for (name, locked) in &lockfile.dependencies {
        if !locked.is_checked_out() {
            tracing::debug!("skipping {} dependency `{}`", locked.source_type, name);
            continue;
        }

        let expected = if locked.resolved.is_empty() {
            locked.version.clone()
        } else {
            locked.resolved.clone()
        };

        let dir = deps_dir.join(name);
        if !dir.is_dir() {
            mismatches.push(LockfileError::Mismatch {
                name: name.clone(),
                expected,
                found: format!("nothing at {}", dir.display()),
            });
            continue;
        }

        // Branch pins only need the checkout to exist.
        if locked.resolved.is_empty() {
            continue;
        }

        match inspector.head(&dir) {
            Ok(head) if head.matches(&locked.resolved) => {
                tracing::debug!("`{}` matches {}", name, locked.resolved);
            }
            Ok(head) => mismatches.push(LockfileError::Mismatch {
                name: name.clone(),
                expected,
                found: head.describe(),
            }),
            Err(e) => mismatches.push(LockfileError::Mismatch {
                name: name.clone(),
                expected,
                found: format!("{:#}", e),
            }),
        }
    }

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dependency::DependencySource;
    use crate::resolver::tests::{provider, FMT, SPDLOG};
    use std::collections::HashMap;
    use tempfile::TempDir;

    impl RepoInspector for HashMap<PathBuf, RepoHead> {
        fn head(&self, dir: &Path) -> Result<RepoHead> {
            self.get(dir)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("not a git repository: {}", dir.display()))
        }
    }

    fn specs() -> Vec<DependencySpec> {
        vec![
            DependencySpec::index("fmt", "11.*"),
            DependencySpec::index("mylib", "*").with_source(DependencySource::Git {
                url: "https://host/mylib.git".into(),
                tag: Some("v1.0".into()),
                branch: None,
                commit: None,
            }),
        ]
    }

    fn generate_into(dir: &Path, force: bool) -> Result<Lockfile> {
        let mut resolver = Resolver::new(provider(&[("fmt", FMT), ("spdlog", SPDLOG)]));
        generate(&dir.join("cforge.lock"), &specs(), &mut resolver, force)
    }

    fn head(commit: &str, tags: &[&str]) -> RepoHead {
        RepoHead {
            commit: commit.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_generate_records_index_and_git() {
        let tmp = TempDir::new().unwrap();
        let lock = generate_into(tmp.path(), false).unwrap();

        let fmt = lock.get("fmt").unwrap();
        assert_eq!(fmt.source_type, SourceKind::Index);
        assert_eq!(fmt.version, "11.2.0");
        assert_eq!(fmt.resolved, "11.2.0");
        assert_eq!(fmt.url, "https://github.com/fmtlib/fmt");

        let mylib = lock.get("mylib").unwrap();
        assert_eq!(mylib.source_type, SourceKind::Git);
        assert_eq!(mylib.url, "https://host/mylib.git");
        assert_eq!(mylib.resolved, "v1.0");

        let text = std::fs::read_to_string(tmp.path().join("cforge.lock")).unwrap();
        assert!(text.starts_with(
            "# cforge.lock - Dependency lock file for reproducible builds\n\
             # Generated by cforge - DO NOT EDIT MANUALLY\n\
             # Mode: FetchContent\n\n[metadata]"
        ));
        assert!(text.contains("[metadata]"));
        assert!(text.contains("version = 1"));
        assert!(text.contains("source_type = \"git\""));
        assert!(text.find("[dependency.fmt]").unwrap() < text.find("[dependency.mylib]").unwrap());
    }

    #[test]
    fn test_generate_is_bit_identical() {
        let tmp = TempDir::new().unwrap();
        generate_into(tmp.path(), false).unwrap();
        let first = std::fs::read(tmp.path().join("cforge.lock")).unwrap();
        generate_into(tmp.path(), true).unwrap();
        let second = std::fs::read(tmp.path().join("cforge.lock")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_generate_refuses_existing_without_force() {
        let tmp = TempDir::new().unwrap();
        generate_into(tmp.path(), false).unwrap();

        let err = generate_into(tmp.path(), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LockfileError>(),
            Some(LockfileError::Exists { .. })
        ));
    }

    #[test]
    fn test_empty_dependency_list_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cforge.lock");
        let mut resolver = Resolver::new(provider(&[]));
        let lock = generate(&path, &[], &mut resolver, false).unwrap();
        assert!(lock.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_emptied_dependency_list_removes_lock() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cforge.lock");
        generate_into(tmp.path(), false).unwrap();
        assert!(path.exists());

        let mut resolver = Resolver::new(provider(&[("fmt", FMT)]));
        let lock = generate(&path, &[], &mut resolver, true).unwrap();
        assert!(lock.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_round_trip_then_verify_clean() {
        let tmp = TempDir::new().unwrap();
        let written = generate_into(tmp.path(), false).unwrap();
        let loaded = Lockfile::load(&tmp.path().join("cforge.lock"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded, written);

        let deps = tmp.path().join("deps");
        std::fs::create_dir_all(deps.join("fmt")).unwrap();
        std::fs::create_dir_all(deps.join("mylib")).unwrap();
        let inspector: HashMap<PathBuf, RepoHead> = [
            (deps.join("fmt"), head("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678", &["11.2.0"])),
            (deps.join("mylib"), head("0123456789abcdef0123456789abcdef01234567", &["v1.0"])),
        ]
        .into_iter()
        .collect();

        assert!(verify(&loaded, &deps, &inspector).is_empty());
    }

    #[test]
    fn test_verify_reports_wrong_tag() {
        let tmp = TempDir::new().unwrap();
        let lock = generate_into(tmp.path(), false).unwrap();
        let before = std::fs::read(tmp.path().join("cforge.lock")).unwrap();

        let deps = tmp.path().join("deps");
        std::fs::create_dir_all(deps.join("fmt")).unwrap();
        std::fs::create_dir_all(deps.join("mylib")).unwrap();
        let inspector: HashMap<PathBuf, RepoHead> = [
            (deps.join("fmt"), head("ffffffffffffffffffffffffffffffffffffffff", &["11.1.4"])),
            (deps.join("mylib"), head("0123456789abcdef0123456789abcdef01234567", &["v1.0"])),
        ]
        .into_iter()
        .collect();

        let mismatches = verify(&lock, &deps, &inspector);
        assert_eq!(mismatches.len(), 1);
        match &mismatches[0] {
            LockfileError::Mismatch { name, expected, found } => {
                assert_eq!(name, "fmt");
                assert_eq!(expected, "11.2.0");
                assert!(found.contains("11.1.4"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(std::fs::read(tmp.path().join("cforge.lock")).unwrap(), before);
    }

    #[test]
    fn test_verify_missing_checkout_and_skipped_kinds() {
        let mut lock = Lockfile::default();
        lock.dependencies.insert(
            "zlib".into(),
            LockedDependency {
                source_type: SourceKind::Index,
                url: String::new(),
                version: "1.3.1".into(),
                resolved: "v1.3.1".into(),
                branch: String::new(),
            },
        );
        lock.dependencies.insert(
            "OpenGL".into(),
            LockedDependency {
                source_type: SourceKind::System,
                url: String::new(),
                version: "*".into(),
                resolved: "OpenGL".into(),
                branch: String::new(),
            },
        );

        let tmp = TempDir::new().unwrap();
        let mismatches = verify(&lock, tmp.path(), &HashMap::<PathBuf, RepoHead>::new());
        assert_eq!(mismatches.len(), 1);
        assert!(mismatches[0].to_string().contains("`zlib`"));
    }

    #[test]
    fn test_commit_prefix_matching() {
        let h = head("0123456789abcdef0123456789abcdef01234567", &[]);
        assert!(h.matches("0123456789abcdef0123456789abcdef01234567"));
        assert!(h.matches("0123456"));
        assert!(h.matches("0123456789ABCDEF"));
        assert!(!h.matches("012345"));
        assert!(!h.matches("1234567"));
    }

    #[test]
    fn test_needs_update_tracks_specs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cforge.lock");
        assert!(lockfile_needs_update(&path, &specs()).unwrap());

        generate_into(tmp.path(), false).unwrap();
        assert!(!lockfile_needs_update(&path, &specs()).unwrap());

        let mut reordered = specs();
        reordered.reverse();
        assert!(!lockfile_needs_update(&path, &reordered).unwrap());

        let mut changed = specs();
        changed[0].version = "10.*".into();
        assert!(lockfile_needs_update(&path, &changed).unwrap());
    }

    #[test]
    fn test_rejects_unknown_schema_version() {
        let content = "[metadata]\nversion = 2\n";
        let err = Lockfile::parse(content, Path::new("cforge.lock")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LockfileError>(),
            Some(LockfileError::UnsupportedVersion { version: 2 })
        ));
    }

    #[test]
    fn test_clean() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cforge.lock");
        assert!(!clean(&path).unwrap());
        generate_into(tmp.path(), false).unwrap();
        assert!(clean(&path).unwrap());
        assert!(!path.exists());
    }
}
