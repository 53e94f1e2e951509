//! Package definitions as published in the package index.
//!
//! A definition is read from `packages/<letter>/<name>.toml` inside the index
//! mirror. Both the current `[integration]` table and the legacy `[cmake]`
//! table are understood.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::manifest::{Manifest, View};
use crate::resolver::version::Version;

/// Default upstream tag pattern.
pub const DEFAULT_TAG_PATTERN: &str = "v{version}";

/// Default number of discovered versions retained.
pub const DEFAULT_MAX_VERSIONS: usize = 50;

/// Default minimum C++ standard for a version entry.
pub const DEFAULT_MIN_CPP: u32 = 11;

/// One published version of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    /// Dotted numeric version
    pub version: String,
    /// Upstream tag for this version
    pub tag: String,
    /// Minimum C++ standard required
    pub min_cpp: u32,
    pub checksum: Option<String>,
    pub yanked: bool,
    pub yanked_reason: Option<String>,
}

impl VersionEntry {
    pub fn new(version: impl Into<String>, tag: impl Into<String>) -> Self {
        VersionEntry {
            version: version.into(),
            tag: tag.into(),
            min_cpp: DEFAULT_MIN_CPP,
            checksum: None,
            yanked: false,
            yanked_reason: None,
        }
    }

    pub fn yanked(mut self, reason: Option<&str>) -> Self {
        self.yanked = true;
        self.yanked_reason = reason.map(str::to_string);
        self
    }

    pub fn parsed(&self) -> Version {
        Version::parse(&self.version)
    }

    fn from_view(view: View<'_>) -> Option<Self> {
        let version = view.at("version").string_opt()?;
        Some(VersionEntry {
            tag: view.at("tag").string(""),
            min_cpp: u32::try_from(view.at("min_cpp").int(i64::from(DEFAULT_MIN_CPP)))
                .unwrap_or(DEFAULT_MIN_CPP),
            checksum: view.at("checksum").string_opt(),
            yanked: view.at("yanked").bool(false),
            yanked_reason: view.at("yanked_reason").string_opt(),
            version,
        })
    }
}

/// Sort newest-first. The sort is stable, so equal versions keep input order.
pub fn sort_newest_first(entries: &mut [VersionEntry]) {
    entries.sort_by(|a, b| b.parsed().cmp(&a.parsed()));
}

/// Upstream tag discovery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagConfig {
    /// Tag pattern with at most one `{version}` placeholder
    pub pattern: String,
    /// Tags containing any of these substrings are ignored
    pub exclude: Vec<String>,
    pub max_versions: usize,
}

impl Default for TagConfig {
    fn default() -> Self {
        TagConfig {
            pattern: DEFAULT_TAG_PATTERN.to_string(),
            exclude: Vec::new(),
            max_versions: DEFAULT_MAX_VERSIONS,
        }
    }
}

impl TagConfig {
    /// Instantiate the pattern for a concrete version.
    pub fn tag_for(&self, version: &str) -> String {
        if self.pattern.contains("{version}") {
            self.pattern.replacen("{version}", version, 1)
        } else {
            version.to_string()
        }
    }
}

/// How a package is incorporated into the consuming build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationKind {
    /// Built through the meta-build generator (`add_subdirectory`-style)
    #[default]
    Generator,
    /// Headers only; nothing to compile
    HeaderOnly,
    /// Located through the host's package configuration
    SystemConfig,
}

impl IntegrationKind {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "header_only" | "headers" | "header" => IntegrationKind::HeaderOnly,
            "system" | "pkg_config" | "pkgconfig" | "find_package" => IntegrationKind::SystemConfig,
            _ => IntegrationKind::Generator,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationKind::Generator => "cmake",
            IntegrationKind::HeaderOnly => "header_only",
            IntegrationKind::SystemConfig => "system",
        }
    }
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integration descriptor of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Integration {
    pub kind: IntegrationKind,
    /// Generator target to link against (e.g. `fmt::fmt`)
    pub target: Option<String>,
    pub include_dir: Option<String>,
    /// Relative path of a single-header distribution
    pub single_header: Option<String>,
    /// Subdirectory holding the generator project
    pub subdir: Option<String>,
    /// Generator option that switches the package to header-only mode
    pub header_only_option: Option<String>,
}

impl Integration {
    fn from_manifest(m: &Manifest) -> Self {
        let pick = |new: &str, legacy: &str| {
            m.at(new)
                .string_opt()
                .or_else(|| m.at(legacy).string_opt())
        };

        let kind = if m.get_bool("cmake.header_only", false) {
            IntegrationKind::HeaderOnly
        } else {
            IntegrationKind::parse(&pick("integration.type", "cmake.type").unwrap_or_default())
        };

        Integration {
            kind,
            target: pick("integration.cmake_target", "cmake.target")
                .or_else(|| m.at("integration.target").string_opt()),
            include_dir: pick("integration.include_dir", "cmake.include_dir"),
            single_header: pick("integration.single_header", "cmake.single_header"),
            subdir: pick("integration.cmake_subdir", "cmake.subdir")
                .or_else(|| m.at("integration.subdir").string_opt()),
            header_only_option: pick("integration.header_only_option", "cmake.header_only_option"),
        }
    }
}

/// A named optional capability of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    /// Generator option turned `ON` when the feature is active
    pub option: Option<String>,
    pub description: String,
    /// Packages this feature pulls in, as `name` or `name@spec`
    pub requires: Vec<String>,
}

/// A package definition loaded from the index.
#[derive(Debug, Clone, Default)]
pub struct PackageDefinition {
    pub name: String,
    pub description: String,
    pub repository: String,
    pub homepage: Option<String>,
    pub documentation: Option<String>,
    pub license: Option<String>,
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
    pub verified: bool,
    pub tags: TagConfig,
    pub auto_versions: bool,
    pub integration: Integration,
    pub features: BTreeMap<String, Feature>,
    pub default_features: Vec<String>,
    /// Newest-first
    pub versions: Vec<VersionEntry>,
    pub owners: Vec<String>,
    pub authors: Vec<String>,
}

impl PackageDefinition {
    /// Populate a definition from a package file. The version list holds only
    /// explicit `[[versions]]` entries; discovery is the loader's job.
    pub fn from_manifest(m: &Manifest, name: &str) -> Self {
        let mut features = BTreeMap::new();
        for key in m.get_table_keys("features") {
            if key == "default" || key == "groups" {
                continue;
            }
            let view = m.at("features").key(&key);
            if !view.is_table() {
                continue;
            }
            let mut requires = view.at("requires").string_array();
            if requires.is_empty() {
                requires = view.at("requires.dependencies").string_array();
            }
            features.insert(
                key.clone(),
                Feature {
                    name: key,
                    option: view.at("option").string_opt(),
                    description: view.at("description").string(""),
                    requires,
                },
            );
        }

        let mut default_features = m.get_string_array("package.features.default");
        if default_features.is_empty() {
            default_features = m.get_string_array("features.default");
        }

        let mut versions: Vec<VersionEntry> = m
            .at("versions")
            .tables()
            .into_iter()
            .filter_map(VersionEntry::from_view)
            .collect();
        sort_newest_first(&mut versions);

        let max_versions = m.get_int("package.max_versions", DEFAULT_MAX_VERSIONS as i64);

        PackageDefinition {
            name: m.get_string("package.name", name),
            description: m.get_string("package.description", ""),
            repository: m.get_string("package.repository", ""),
            homepage: m.at("package.homepage").string_opt(),
            documentation: m.at("package.documentation").string_opt(),
            license: m.at("package.license").string_opt(),
            keywords: m.get_string_array("package.keywords"),
            categories: m.get_string_array("package.categories"),
            verified: m.get_bool("package.verified", false),
            tags: TagConfig {
                pattern: m.get_string("package.tag_pattern", DEFAULT_TAG_PATTERN),
                exclude: m.get_string_array("package.tag_exclude"),
                max_versions: usize::try_from(max_versions).unwrap_or(DEFAULT_MAX_VERSIONS),
            },
            auto_versions: m.get_bool("package.auto_versions", true),
            integration: Integration::from_manifest(m),
            features,
            default_features,
            versions,
            owners: m.get_string_array("maintainers.owners"),
            authors: m.get_string_array("maintainers.authors"),
        }
    }

    /// Non-yanked versions, newest-first.
    pub fn available_versions(&self) -> impl Iterator<Item = &VersionEntry> {
        self.versions.iter().filter(|v| !v.yanked)
    }

    /// Newest non-yanked version.
    pub fn latest(&self) -> Option<&VersionEntry> {
        self.available_versions().next()
    }

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.get(name)
    }
}
