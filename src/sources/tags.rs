//! Upstream tag discovery.
//!
//! When a package file enumerates no `[[versions]]`, its version list is read
//! from the upstream repository's tags. A tag pattern such as `v{version}`
//! selects which tags are releases and where the version sits inside them.
//! Results are cached in memory per URL and on disk per package, one
//! `version<TAB>tag` line each, for one hour.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use regex::Regex;

use crate::core::package::{sort_newest_first, TagConfig, VersionEntry};
use crate::util::fs;
use crate::util::process::ProcessBuilder;

/// Time allowed for listing remote tags.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifetime of an on-disk tag cache entry.
pub const TAG_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

const VERSION_CAPTURE: &str = r"([0-9]+(?:\.[0-9]+)*)";

/// A compiled tag pattern.
#[derive(Debug, Clone)]
pub struct TagMatcher {
    regex: Regex,
}

impl TagMatcher {
    /// Compile a pattern. Text around `{version}` is matched literally; a
    /// pattern without the placeholder treats the whole tag as the version.
    pub fn new(pattern: &str) -> Result<Self> {
        let source = match pattern.split_once("{version}") {
            Some((prefix, suffix)) => format!(
                "^{}{}{}$",
                regex::escape(prefix),
                VERSION_CAPTURE,
                regex::escape(suffix)
            ),
            None => format!("^{}$", VERSION_CAPTURE),
        };

        let regex = Regex::new(&source)
            .with_context(|| format!("invalid tag pattern `{}`", pattern))?;
        Ok(TagMatcher { regex })
    }

    /// Extract the version from a tag, if the tag matches in full.
    pub fn version_of<'t>(&self, tag: &'t str) -> Option<&'t str> {
        self.regex
            .captures(tag)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Turn raw tag names into version entries: drop excluded tags, keep those
/// matching the pattern, sort newest-first, deduplicate and truncate.
pub fn versions_from_tags<I, S>(tags: I, config: &TagConfig) -> Result<Vec<VersionEntry>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let matcher = TagMatcher::new(&config.pattern)?;

    let mut entries: Vec<VersionEntry> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if tag.is_empty() || config.exclude.iter().any(|ex| tag.contains(ex.as_str())) {
            continue;
        }
        if let Some(version) = matcher.version_of(tag) {
            if entries.iter().any(|e| e.version == version) {
                continue;
            }
            entries.push(VersionEntry::new(version, tag));
        }
    }

    sort_newest_first(&mut entries);
    entries.truncate(config.max_versions);
    Ok(entries)
}

/// Lists the tags of a remote repository.
pub trait TagLister {
    fn list_tags(&self, url: &str) -> Result<Vec<String>>;
}

/// Lists tags with `git ls-remote --tags --refs`.
#[derive(Debug, Clone)]
pub struct GitTagLister {
    timeout: Duration,
}

impl GitTagLister {
    pub fn new() -> Self {
        GitTagLister {
            timeout: LIST_TIMEOUT,
        }
    }
}

impl Default for GitTagLister {
    fn default() -> Self {
        Self::new()
    }
}

impl TagLister for GitTagLister {
    fn list_tags(&self, url: &str) -> Result<Vec<String>> {
        let output = ProcessBuilder::new("git")
            .args(["ls-remote", "--tags", "--refs", url])
            .env("GIT_TERMINAL_PROMPT", "0")
            .timeout(self.timeout)
            .exec_and_check()?;

        Ok(parse_ls_remote(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `<sha>\trefs/tags/<tag>` lines.
pub fn parse_ls_remote(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_once("refs/tags/"))
        .map(|(_, tag)| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// On-disk tag cache: `<dir>/<name>.cache`.
#[derive(Debug, Clone)]
pub struct TagCache {
    dir: PathBuf,
    ttl: Duration,
}

impl TagCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        TagCache {
            dir: dir.into(),
            ttl: TAG_CACHE_TTL,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.cache", name))
    }

    /// Whether a cache file modified at `modified` is still fresh at `now`.
    pub fn is_fresh(&self, modified: SystemTime, now: SystemTime) -> bool {
        match now.duration_since(modified) {
            Ok(age) => age <= self.ttl,
            // modified in the future: clock skew, treat as fresh
            Err(_) => true,
        }
    }

    /// Load a fresh cache entry. Missing, expired and empty entries yield `None`.
    pub fn load(&self, name: &str, now: SystemTime) -> Option<Vec<VersionEntry>> {
        let path = self.path_for(name);
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        if !self.is_fresh(modified, now) {
            tracing::debug!("tag cache for `{}` expired", name);
            return None;
        }

        let content = std::fs::read_to_string(&path).ok()?;
        let entries: Vec<VersionEntry> = content
            .lines()
            .filter_map(|line| line.split_once('\t'))
            .map(|(version, tag)| VersionEntry::new(version, tag))
            .collect();

        if entries.is_empty() {
            None
        } else {
            Some(entries)
        }
    }

    /// Overwrite the cache entry for a package.
    pub fn store(&self, name: &str, entries: &[VersionEntry]) -> Result<()> {
        let mut content = String::new();
        for entry in entries {
            content.push_str(&entry.version);
            content.push('\t');
            content.push_str(&entry.tag);
            content.push('\n');
        }
        fs::write_atomic(&self.path_for(name), &content)
    }
}

/// Tag discovery with in-memory and on-disk caching.
pub struct TagDiscovery<L> {
    lister: L,
    cache: TagCache,
    memory: HashMap<String, Vec<VersionEntry>>,
    offline: bool,
}

impl<L: TagLister> TagDiscovery<L> {
    pub fn new(lister: L, cache: TagCache) -> Self {
        TagDiscovery {
            lister,
            cache,
            memory: HashMap::new(),
            offline: false,
        }
    }

    /// Never contact the upstream; serve caches only.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn cache(&self) -> &TagCache {
        &self.cache
    }

    /// Versions of package `name` hosted at `url`.
    ///
    /// Listing failures are logged and produce an empty list.
    pub fn versions(
        &mut self,
        name: &str,
        url: &str,
        config: &TagConfig,
        now: SystemTime,
    ) -> Vec<VersionEntry> {
        if let Some(hit) = self.memory.get(url) {
            return hit.clone();
        }

        if let Some(cached) = self.cache.load(name, now) {
            tracing::debug!("using cached tags for `{}`", name);
            self.memory.insert(url.to_string(), cached.clone());
            return cached;
        }

        if self.offline {
            tracing::debug!("offline: skipping tag discovery for `{}`", name);
            return Vec::new();
        }

        tracing::debug!("discovering versions of `{}` from {}", name, url);
        let discovered = self
            .lister
            .list_tags(url)
            .and_then(|tags| versions_from_tags(tags, config));

        let entries = match discovered {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("could not list tags for `{}`: {:#}", name, e);
                return Vec::new();
            }
        };

        if !entries.is_empty() {
            if let Err(e) = self.cache.store(name, &entries) {
                tracing::warn!("failed to write tag cache for `{}`: {:#}", name, e);
            }
        }
        self.memory.insert(url.to_string(), entries.clone());
        entries
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Serves a fixed tag list and counts calls.
    #[derive(Clone, Default)]
    pub(crate) struct StubLister {
        pub tags: Vec<String>,
        pub fail: bool,
        pub calls: Rc<Cell<usize>>,
    }

    impl StubLister {
        pub fn new(tags: &[&str]) -> Self {
            StubLister {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    impl TagLister for StubLister {
        fn list_tags(&self, _url: &str) -> Result<Vec<String>> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                anyhow::bail!("network unreachable");
            }
            Ok(self.tags.clone())
        }
    }

    fn config(pattern: &str, exclude: &[&str]) -> TagConfig {
        TagConfig {
            pattern: pattern.to_string(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            max_versions: 50,
        }
    }

    #[test]
    fn test_pattern_matching() {
        let m = TagMatcher::new("v{version}").unwrap();
        assert_eq!(m.version_of("v1.2.3"), Some("1.2.3"));
        assert_eq!(m.version_of("1.2.3"), None);
        assert_eq!(m.version_of("xv1.2.3"), None);

        let m = TagMatcher::new("release-{version}.final").unwrap();
        assert_eq!(m.version_of("release-2.0.final"), Some("2.0"));
        assert_eq!(m.version_of("release-2.0xfinal"), None);

        let bare = TagMatcher::new("anything").unwrap();
        assert_eq!(bare.version_of("3.4"), Some("3.4"));
        assert_eq!(bare.version_of("v3.4"), None);
    }

    #[test]
    fn test_exclusion_applies_before_matching() {
        let tags = ["v1.2.3", "v1.3.0"];

        let kept = versions_from_tags(tags, &config("v{version}", &[])).unwrap();
        assert_eq!(kept.len(), 2);

        let kept = versions_from_tags(tags, &config("v{version}", &["1.3"])).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].tag, "v1.2.3");
    }

    #[test]
    fn test_prerelease_tags_do_not_match() {
        let m = TagMatcher::new("v{version}").unwrap();
        assert_eq!(m.version_of("v1.2.3-rc1"), None);
        assert_eq!(m.version_of("v2.0.0-beta.2"), None);

        let kept =
            versions_from_tags(["v1.9.0", "v2.0.0-rc1"], &config("v{version}", &[])).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].version, "1.9.0");
    }

    #[test]
    fn test_sorted_deduplicated_truncated() {
        let tags = ["v0.9", "v1.10", "v1.2", "v1.10", "junk"];
        let mut cfg = config("v{version}", &[]);
        cfg.max_versions = 2;

        let entries = versions_from_tags(tags, &cfg).unwrap();
        let versions: Vec<&str> = entries.iter().map(|e| e.version.as_str()).collect();
        assert_eq!(versions, vec!["1.10", "1.2"]);
    }

    #[test]
    fn test_parse_ls_remote() {
        let out = "abc123\trefs/tags/v1.0\nfff000\trefs/tags/v0.9\n\ngarbage line\n";
        assert_eq!(parse_ls_remote(out), vec!["v1.0", "v0.9"]);
    }

    #[test]
    fn test_cache_round_trip_and_ttl_boundary() {
        let tmp = TempDir::new().unwrap();
        let cache = TagCache::new(tmp.path().join("versions"));
        let entries = vec![VersionEntry::new("1.0", "v1.0"), VersionEntry::new("0.9", "v0.9")];
        cache.store("demo", &entries).unwrap();

        let modified = std::fs::metadata(cache.path_for("demo"))
            .unwrap()
            .modified()
            .unwrap();

        let fresh = modified + TAG_CACHE_TTL - Duration::from_secs(1);
        let loaded = cache.load("demo", fresh).unwrap();
        assert_eq!(loaded, entries);

        let stale = modified + TAG_CACHE_TTL + Duration::from_secs(1);
        assert!(cache.load("demo", stale).is_none());
    }

    #[test]
    fn test_discovery_scenario_with_exclusion() {
        let tmp = TempDir::new().unwrap();
        let lister = StubLister::new(&["v1.0", "v0.9", "rc-bad"]);
        let calls = lister.calls.clone();
        let mut discovery = TagDiscovery::new(lister, TagCache::new(tmp.path()));

        let now = SystemTime::now();
        let entries = discovery.versions("mylib", "https://host/mylib.git", &config("v{version}", &["rc"]), now);
        assert_eq!(
            entries,
            vec![VersionEntry::new("1.0", "v1.0"), VersionEntry::new("0.9", "v0.9")]
        );

        // memory cache
        discovery.versions("mylib", "https://host/mylib.git", &TagConfig::default(), now);
        assert_eq!(calls.get(), 1);
        assert!(tmp.path().join("mylib.cache").exists());
    }

    #[test]
    fn test_disk_cache_short_circuits_listing() {
        let tmp = TempDir::new().unwrap();
        let cache = TagCache::new(tmp.path());
        cache.store("cached", &[VersionEntry::new("2.0", "v2.0")]).unwrap();

        let lister = StubLister::new(&["v9.9"]);
        let calls = lister.calls.clone();
        let mut discovery = TagDiscovery::new(lister, cache);

        let entries = discovery.versions("cached", "u", &TagConfig::default(), SystemTime::now());
        assert_eq!(entries[0].version, "2.0");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_listing_failure_is_empty() {
        let tmp = TempDir::new().unwrap();
        let lister = StubLister {
            fail: true,
            ..Default::default()
        };
        let mut discovery = TagDiscovery::new(lister, TagCache::new(tmp.path()));

        let entries = discovery.versions("x", "u", &TagConfig::default(), SystemTime::now());
        assert!(entries.is_empty());
        assert!(!tmp.path().join("x.cache").exists());
    }
}
