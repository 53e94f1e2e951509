//! Implementation of `cforge deps add` and `cforge deps remove`.
//!
//! Both edit `cforge.toml` with `toml_edit`, so comments and layout of the
//! rest of the file survive.

use std::path::Path;

use anyhow::{Context, Result};
use toml_edit::{value, Array, DocumentMut, InlineTable, Item, Table, Value};

use crate::core::dependency::SourceKind;
use crate::resolver::{PackageProvider, ResolveError};
use crate::util::fs;

/// Where an added dependency comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AddSource {
    #[default]
    Index,
    Git {
        url: String,
        tag: Option<String>,
        branch: Option<String>,
        commit: Option<String>,
    },
    Vcpkg {
        triplet: Option<String>,
    },
    System,
    Path(String),
}

impl AddSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            AddSource::Index => SourceKind::Index,
            AddSource::Git { .. } => SourceKind::Git,
            AddSource::Vcpkg { .. } => SourceKind::Vcpkg,
            AddSource::System => SourceKind::System,
            AddSource::Path(_) => SourceKind::Project,
        }
    }
}

/// Options for adding a dependency.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub name: String,

    /// Version requirement; `*` when absent
    pub version: Option<String>,

    pub source: AddSource,

    pub features: Vec<String>,

    pub no_default_features: bool,
}

impl AddOptions {
    /// Options for `name` or `name@spec` from the index.
    pub fn from_requirement(requirement: &str) -> Self {
        let (name, version) = match requirement.split_once('@') {
            Some((name, spec)) if !spec.trim().is_empty() => {
                (name.trim().to_string(), Some(spec.trim().to_string()))
            }
            Some((name, _)) => (name.trim().to_string(), None),
            None => (requirement.trim().to_string(), None),
        };
        AddOptions {
            name,
            version,
            ..Default::default()
        }
    }

    fn version(&self) -> &str {
        self.version.as_deref().unwrap_or("*")
    }
}

/// Result of [`add_dependency`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddResult {
    pub name: String,
    pub kind: SourceKind,
    /// What was written, for the status line
    pub requirement: String,
    /// Whether an existing declaration was replaced
    pub replaced: bool,
}

fn load_document(manifest_path: &Path) -> Result<DocumentMut> {
    let content = fs::read_to_string(manifest_path)?;
    content
        .parse()
        .with_context(|| format!("failed to parse {}", manifest_path.display()))
}

/// Get `parent[key]` as a table, creating it when missing.
fn table_mut<'a>(parent: &'a mut Table, key: &str) -> Result<&'a mut Table> {
    if !parent.contains_key(key) {
        let mut table = Table::new();
        table.set_implicit(true);
        parent.insert(key, Item::Table(table));
    }
    parent[key]
        .as_table_mut()
        .with_context(|| format!("`{}` is not a table", key))
}

fn string_array(items: &[String]) -> Array {
    items.iter().map(|s| s.as_str()).collect()
}

/// Add a dependency to `cforge.toml`.
///
/// Index packages must exist in `provider`; other kinds are written as given.
pub fn add_dependency<P: PackageProvider>(
    manifest_path: &Path,
    opts: &AddOptions,
    provider: &mut P,
) -> Result<AddResult> {
    if opts.source == AddSource::Index && provider.get_package(&opts.name)?.is_none() {
        return Err(ResolveError::UnknownPackage {
            package: opts.name.clone(),
        }
        .into());
    }

    if let AddSource::Git {
        tag, branch, commit, ..
    } = &opts.source
    {
        let refs: Vec<String> = [("tag", tag), ("branch", branch), ("commit", commit)]
            .into_iter()
            .filter(|(_, v)| v.is_some())
            .map(|(k, _)| k.to_string())
            .collect();
        if refs.len() > 1 {
            return Err(ResolveError::AmbiguousGitReference {
                package: opts.name.clone(),
                refs,
            }
            .into());
        }
    }

    let mut doc = load_document(manifest_path)?;
    let replaced = remove_from(doc.as_table_mut(), &opts.name);
    let deps = table_mut(doc.as_table_mut(), "dependencies")?;

    let requirement = match &opts.source {
        AddSource::Index => {
            if opts.features.is_empty() && !opts.no_default_features {
                deps[opts.name.as_str()] = value(opts.version());
            } else {
                let mut table = InlineTable::new();
                table.insert("version", opts.version().into());
                insert_feature_flags(&mut table, opts);
                deps[opts.name.as_str()] = value(table);
            }
            opts.version().to_string()
        }
        AddSource::Git {
            url,
            tag,
            branch,
            commit,
        } => {
            let git = table_mut(deps, "git")?;
            let mut table = Table::new();
            table.insert("url", value(url.as_str()));
            for (key, v) in [("tag", tag), ("branch", branch), ("commit", commit)] {
                if let Some(v) = v {
                    table.insert(key, value(v.as_str()));
                }
            }
            git.insert(&opts.name, Item::Table(table));
            match tag.as_ref().or(branch.as_ref()).or(commit.as_ref()) {
                Some(r) => format!("{}#{}", url, r),
                None => url.clone(),
            }
        }
        AddSource::Vcpkg { triplet } => {
            let vcpkg = table_mut(deps, "vcpkg")?;
            let entry = match triplet {
                Some(t) => format!("{}:{}", opts.name, t),
                None => opts.name.clone(),
            };
            match vcpkg.get_mut("packages").and_then(Item::as_array_mut) {
                Some(packages) => packages.push(entry.as_str()),
                None => {
                    vcpkg.insert("packages", value(string_array(&[entry.clone()])));
                }
            }
            entry
        }
        AddSource::System => {
            let mut table = InlineTable::new();
            table.insert("system", true.into());
            deps[opts.name.as_str()] = value(table);
            "system".to_string()
        }
        AddSource::Path(path) => {
            let mut table = InlineTable::new();
            table.insert("path", path.as_str().into());
            insert_feature_flags(&mut table, opts);
            deps[opts.name.as_str()] = value(table);
            path.clone()
        }
    };

    fs::write_string(manifest_path, &doc.to_string())?;

    Ok(AddResult {
        name: opts.name.clone(),
        kind: opts.source.kind(),
        requirement,
        replaced,
    })
}

fn insert_feature_flags(table: &mut InlineTable, opts: &AddOptions) {
    if !opts.features.is_empty() {
        table.insert("features", Value::Array(string_array(&opts.features)));
    }
    if opts.no_default_features {
        table.insert("default_features", false.into());
    }
}

/// Remove `name` from every dependency table of `root`. Returns whether
/// anything was removed.
fn remove_from(root: &mut Table, name: &str) -> bool {
    let Some(deps) = root.get_mut("dependencies").and_then(Item::as_table_mut) else {
        return false;
    };

    let mut removed = false;
    let is_dedicated = |key: &str, deps: &Table| {
        matches!(key, "git" | "vcpkg" | "system" | "project") && deps.get(key).is_some_and(Item::is_table)
    };

    if !is_dedicated(name, &*deps) {
        removed |= deps.remove(name).is_some();
    }

    for section in ["git", "system", "project", "vcpkg"] {
        if let Some(table) = deps.get_mut(section).and_then(Item::as_table_mut) {
            removed |= table.remove(name).is_some();
        }
    }

    if let Some(packages) = deps
        .get_mut("vcpkg")
        .and_then(Item::as_table_mut)
        .and_then(|t| t.get_mut("packages"))
        .and_then(Item::as_array_mut)
    {
        let before = packages.len();
        packages.retain(|v| {
            v.as_str()
                .map(|s| s.split(':').next() != Some(name))
                .unwrap_or(true)
        });
        removed |= packages.len() != before;
    }

    removed
}

/// Remove a dependency from `cforge.toml`. Returns `false` when it was not
/// declared; the file is then left untouched.
pub fn remove_dependency(manifest_path: &Path, name: &str) -> Result<bool> {
    let mut doc = load_document(manifest_path)?;
    if !remove_from(doc.as_table_mut(), name) {
        return Ok(false);
    }
    fs::write_string(manifest_path, &doc.to_string())?;
    Ok(true)
}
