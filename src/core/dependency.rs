//! Dependency specifications.
//!
//! Each entry under `[dependencies]` becomes one [`DependencySpec`]. The
//! source kind is decided once here, from an explicit `source` field or from
//! which option fields are present, and carried as a [`DependencySource`]
//! variant holding only the fields that kind needs.
//!
//! The dedicated tables `[dependencies.git]`, `[dependencies.vcpkg]`,
//! `[dependencies.system]` and `[dependencies.project]` declare collections of
//! their respective kinds.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::manifest::{Manifest, View};
use crate::resolver::errors::ResolveError;

/// Keys under `[dependencies]` that configure rather than declare.
const SETTING_KEYS: &[&str] = &["directory", "fetch_content"];

/// Where a dependency comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Index,
    Git,
    Vcpkg,
    System,
    Project,
}

impl SourceKind {
    /// Parse a `source` field. Unknown values mean the index.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "git" => SourceKind::Git,
            "vcpkg" => SourceKind::Vcpkg,
            "system" => SourceKind::System,
            "project" | "path" => SourceKind::Project,
            _ => SourceKind::Index,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Index => "index",
            SourceKind::Git => "git",
            SourceKind::Vcpkg => "vcpkg",
            SourceKind::System => "system",
            SourceKind::Project => "project",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Source-specific part of a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum DependencySource {
    /// Resolved through the package index.
    Index,
    /// A repository pinned by tag, branch or commit.
    Git {
        url: String,
        tag: Option<String>,
        branch: Option<String>,
        commit: Option<String>,
    },
    /// A port of the external binary registry.
    Vcpkg {
        package: Option<String>,
        triplet: Option<String>,
    },
    /// Already installed on the host.
    System {
        package: Option<String>,
        components: Vec<String>,
        target: Option<String>,
    },
    /// A sibling directory in the user's tree.
    Project { path: PathBuf },
}

impl DependencySource {
    pub fn kind(&self) -> SourceKind {
        match self {
            DependencySource::Index => SourceKind::Index,
            DependencySource::Git { .. } => SourceKind::Git,
            DependencySource::Vcpkg { .. } => SourceKind::Vcpkg,
            DependencySource::System { .. } => SourceKind::System,
            DependencySource::Project { .. } => SourceKind::Project,
        }
    }
}

/// One declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySpec {
    pub name: String,
    /// Textual version specification (`*`, `1.2.*`, `1.2.3`)
    pub version: String,
    #[serde(flatten)]
    pub source: DependencySource,
    pub header_only: bool,
    pub link: bool,
    pub default_features: bool,
    pub features: Vec<String>,
}

impl DependencySpec {
    /// An index dependency with default options.
    pub fn index(name: impl Into<String>, version: impl Into<String>) -> Self {
        DependencySpec {
            name: name.into(),
            version: version.into(),
            source: DependencySource::Index,
            header_only: false,
            link: true,
            default_features: true,
            features: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: DependencySource) -> Self {
        self.source = source;
        self
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    /// Parse a requirement string `name` or `name@spec` into an index spec.
    pub fn from_requirement(requirement: &str) -> Self {
        match requirement.split_once('@') {
            Some((name, spec)) if !spec.trim().is_empty() => {
                DependencySpec::index(name.trim(), spec.trim())
            }
            Some((name, _)) => DependencySpec::index(name.trim(), "*"),
            None => DependencySpec::index(requirement.trim(), "*"),
        }
    }

    /// Parse an inline entry of `[dependencies]`.
    fn from_entry(name: &str, view: View<'_>) -> Self {
        if let Some(version) = view.as_str() {
            return DependencySpec::index(name, version);
        }

        let field = |key: &str| view.at(key).string_opt();
        let explicit = field("source").map(|s| SourceKind::parse(&s));

        let kind = explicit.unwrap_or_else(|| {
            if view.at("git").exists() {
                SourceKind::Git
            } else if view.at("vcpkg").exists() {
                SourceKind::Vcpkg
            } else if view.at("path").exists() {
                SourceKind::Project
            } else if view.at("system").bool(false) {
                SourceKind::System
            } else {
                SourceKind::Index
            }
        });

        let source = match kind {
            SourceKind::Index => DependencySource::Index,
            SourceKind::Git => DependencySource::Git {
                url: field("git").or_else(|| field("url")).unwrap_or_default(),
                tag: field("tag"),
                branch: field("branch"),
                commit: field("commit"),
            },
            SourceKind::Vcpkg => DependencySource::Vcpkg {
                package: view.at("vcpkg").as_str().map(str::to_string),
                triplet: field("triplet"),
            },
            SourceKind::System => system_source(view),
            SourceKind::Project => DependencySource::Project {
                path: PathBuf::from(field("path").unwrap_or_else(|| format!("../{}", name))),
            },
        };

        DependencySpec {
            name: name.to_string(),
            version: view.at("version").string("*"),
            source,
            header_only: view.at("header_only").bool(false),
            link: view.at("link").bool(true),
            default_features: view.at("default_features").bool(true),
            features: view.at("features").string_array(),
        }
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            DependencySource::Index => write!(f, "{}@{}", self.name, self.version),
            DependencySource::Git {
                url,
                tag,
                branch,
                commit,
            } => {
                write!(f, "{} ({}", self.name, url)?;
                if let Some(r) = tag.as_ref().or(branch.as_ref()).or(commit.as_ref()) {
                    write!(f, "#{}", r)?;
                }
                write!(f, ")")
            }
            DependencySource::Project { path } => {
                write!(f, "{} ({})", self.name, path.display())
            }
            _ => write!(f, "{} ({})", self.name, self.kind()),
        }
    }
}

fn system_source(view: View<'_>) -> DependencySource {
    DependencySource::System {
        package: view.at("package").string_opt(),
        components: view.at("components").string_array(),
        target: view.at("target").string_opt(),
    }
}

fn base_spec(name: &str, view: View<'_>, source: DependencySource) -> DependencySpec {
    DependencySpec {
        name: name.to_string(),
        version: view.at("version").string("*"),
        source,
        header_only: view.at("header_only").bool(false),
        link: view.at("link").bool(true),
        default_features: true,
        features: Vec::new(),
    }
}

/// `[dependencies.git.<name>]` tables.
fn git_table(view: View<'_>) -> Vec<DependencySpec> {
    view.table_keys()
        .into_iter()
        .map(|name| {
            let entry = view.key(&name);
            let source = DependencySource::Git {
                url: entry.at("url").string(""),
                tag: entry.at("tag").string_opt(),
                branch: entry.at("branch").string_opt(),
                commit: entry.at("commit").string_opt(),
            };
            base_spec(&name, entry, source)
        })
        .collect()
}

/// `[dependencies.vcpkg]`: a `packages` array of `name` or `name:triplet`,
/// a bare array in the same form, or `name = "version"` entries.
fn vcpkg_table(view: View<'_>) -> Vec<DependencySpec> {
    let from_item = |item: String| {
        let (name, triplet) = match item.split_once(':') {
            Some((name, triplet)) => (name.to_string(), Some(triplet.to_string())),
            None => (item, None),
        };
        DependencySpec::index(&name, "*").with_source(DependencySource::Vcpkg {
            package: None,
            triplet,
        })
    };

    if view.is_array() {
        return view.string_array().into_iter().map(from_item).collect();
    }

    let mut specs: Vec<DependencySpec> = view
        .at("packages")
        .string_array()
        .into_iter()
        .map(from_item)
        .collect();

    for name in view.table_keys() {
        if name == "packages" || name == "enabled" || name == "path" || name == "triplet" {
            continue;
        }
        let entry = view.key(&name);
        let source = DependencySource::Vcpkg {
            package: entry.at("package").string_opt(),
            triplet: entry.at("triplet").string_opt(),
        };
        let mut spec = base_spec(&name, entry, source);
        if let Some(version) = entry.as_str() {
            spec.version = version.to_string();
        }
        specs.push(spec);
    }
    specs
}

/// `[dependencies.system]`: `name = true` or `name = { package, components, target }`.
fn system_table(view: View<'_>) -> Vec<DependencySpec> {
    view.table_keys()
        .into_iter()
        .filter_map(|name| {
            let entry = view.key(&name);
            if !entry.is_table() && !entry.bool(false) {
                return None;
            }
            Some(base_spec(&name, entry, system_source(entry)))
        })
        .collect()
}

/// `[dependencies.project.<name>]`: sibling projects, `path` defaulting to `../<name>`.
fn project_table(view: View<'_>) -> Vec<DependencySpec> {
    view.table_keys()
        .into_iter()
        .map(|name| {
            let entry = view.key(&name);
            let path = entry
                .at("path")
                .string_opt()
                .unwrap_or_else(|| format!("../{}", name));
            base_spec(
                &name,
                entry,
                DependencySource::Project {
                    path: PathBuf::from(path),
                },
            )
        })
        .collect()
}

/// Parse every dependency declared under `view` (a `dependencies` table).
pub fn parse_table(view: View<'_>) -> Result<Vec<DependencySpec>, ResolveError> {
    parse_entries(view, &[])
}

/// Parse a workspace's shared `[dependencies]`, where `project` holds
/// per-member maps rather than sibling projects.
pub fn parse_shared_table(view: View<'_>) -> Result<Vec<DependencySpec>, ResolveError> {
    parse_entries(view, &["project"])
}

fn parse_entries(view: View<'_>, skip: &[&str]) -> Result<Vec<DependencySpec>, ResolveError> {
    let mut specs = Vec::new();

    for key in view.table_keys() {
        if SETTING_KEYS.contains(&key.as_str()) || skip.contains(&key.as_str()) {
            continue;
        }
        let entry = view.key(&key);
        let dedicated = entry.is_table() || entry.is_array();
        match key.as_str() {
            "git" if dedicated => specs.extend(git_table(entry)),
            "vcpkg" if dedicated => specs.extend(vcpkg_table(entry)),
            "system" if entry.is_table() => specs.extend(system_table(entry)),
            "project" if entry.is_table() => specs.extend(project_table(entry)),
            _ => specs.push(DependencySpec::from_entry(&key, entry)),
        }
    }

    let mut seen = std::collections::HashSet::new();
    for spec in &specs {
        if !seen.insert(spec.name.as_str()) {
            return Err(ResolveError::DuplicateDependency {
                name: spec.name.clone(),
            });
        }
    }

    Ok(specs)
}

/// Parse the `[dependencies]` table of a manifest.
pub fn parse_dependencies(manifest: &Manifest) -> Result<Vec<DependencySpec>, ResolveError> {
    parse_table(manifest.at("dependencies"))
}
