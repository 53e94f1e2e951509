//! `cforge.toml` manifest reader.
//!
//! The manifest is exposed as a read-only view over the parsed TOML document,
//! addressed by dotted paths (`dependencies.git.fmt.url`). Lookups never fail:
//! a missing key, a value of the wrong shape and an empty string all fall back
//! to the caller's default. Only loading itself can fail.

use std::path::{Path, PathBuf};

use thiserror::Error;
use toml::Value;

/// Canonical manifest file name.
pub const MANIFEST_NAME: &str = "cforge.toml";

/// Errors raised while locating or loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("could not find `cforge.toml` in `{}` or any parent directory", dir.display())]
    NotFound { dir: PathBuf },

    #[error("failed to read `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest `{}`: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// A borrowed, possibly-absent node of a TOML document.
///
/// Every accessor degrades to a default on absence so call sites never branch
/// on optional manifest fields.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    value: Option<&'a Value>,
}

impl<'a> View<'a> {
    pub fn new(value: &'a Value) -> Self {
        View { value: Some(value) }
    }

    /// A view that resolves nothing.
    pub fn missing() -> Self {
        View { value: None }
    }

    /// Walk a dotted path. Numeric segments index into arrays.
    pub fn at(self, path: &str) -> View<'a> {
        if path.is_empty() {
            return self;
        }
        path.split('.').fold(self, |view, segment| view.key(segment))
    }

    /// Step into a single key without splitting on dots.
    pub fn key(self, key: &str) -> View<'a> {
        let value = match self.value {
            Some(Value::Table(table)) => table.get(key),
            Some(Value::Array(items)) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        View { value }
    }

    pub fn value(self) -> Option<&'a Value> {
        self.value
    }

    pub fn exists(self) -> bool {
        self.value.is_some()
    }

    pub fn is_table(self) -> bool {
        matches!(self.value, Some(Value::Table(_)))
    }

    pub fn is_array(self) -> bool {
        matches!(self.value, Some(Value::Array(_)))
    }

    /// The raw string, if this node is a non-empty string.
    pub fn as_str(self) -> Option<&'a str> {
        match self.value {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Scalar as text. Integers, floats and booleans are rendered.
    pub fn string_opt(self) -> Option<String> {
        match self.value? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn string(self, default: &str) -> String {
        self.string_opt().unwrap_or_else(|| default.to_string())
    }

    pub fn bool_opt(self) -> Option<bool> {
        match self.value? {
            Value::Boolean(b) => Some(*b),
            Value::String(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            Value::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn bool(self, default: bool) -> bool {
        self.bool_opt().unwrap_or(default)
    }

    pub fn int_opt(self) -> Option<i64> {
        match self.value? {
            Value::Integer(i) => Some(*i),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn int(self, default: i64) -> i64 {
        self.int_opt().unwrap_or(default)
    }

    /// A string array. A bare string counts as a one-element array.
    pub fn string_array(self) -> Vec<String> {
        match self.value {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| View::new(item).string_opt())
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Keys of a table, sorted.
    pub fn table_keys(self) -> Vec<String> {
        match self.value {
            Some(Value::Table(table)) => table.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Entries of an array of tables (`[[versions]]`).
    pub fn tables(self) -> Vec<View<'a>> {
        match self.value {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|item| item.is_table())
                .map(View::new)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A loaded TOML manifest (project, workspace or index package file).
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    root: Value,
}

impl Manifest {
    /// Load a manifest from a file path.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content, path)
    }

    /// Parse manifest content. `path` is only used for diagnostics.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ManifestError> {
        let table: toml::Table = toml::from_str(content).map_err(|e| ManifestError::Invalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(Manifest {
            path: path.to_path_buf(),
            root: Value::Table(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the manifest.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    /// Root view of the document.
    pub fn view(&self) -> View<'_> {
        View::new(&self.root)
    }

    /// View at a dotted path.
    pub fn at(&self, path: &str) -> View<'_> {
        self.view().at(path)
    }

    pub fn get_string(&self, path: &str, default: &str) -> String {
        self.at(path).string(default)
    }

    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        self.at(path).bool(default)
    }

    pub fn get_int(&self, path: &str, default: i64) -> i64 {
        self.at(path).int(default)
    }

    pub fn get_string_array(&self, path: &str) -> Vec<String> {
        self.at(path).string_array()
    }

    pub fn get_table_keys(&self, path: &str) -> Vec<String> {
        self.at(path).table_keys()
    }

    pub fn has_key(&self, path: &str) -> bool {
        self.at(path).exists()
    }

    /// `project.name`, falling back to the directory name.
    pub fn project_name(&self) -> String {
        let fallback = self
            .dir()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        self.get_string("project.name", &fallback)
    }

    /// `project.version`, defaulting to `0.1.0`.
    pub fn project_version(&self) -> String {
        self.get_string("project.version", "0.1.0")
    }

    /// Directory holding fetched dependency sources.
    pub fn deps_dir(&self) -> PathBuf {
        self.dir()
            .join(self.get_string("dependencies.directory", "deps"))
    }

    /// Build output directory.
    pub fn build_dir(&self) -> PathBuf {
        self.dir().join(self.get_string("build.directory", "build"))
    }
}
