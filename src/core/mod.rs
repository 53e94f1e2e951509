//! Core data structures.
//!
//! - The manifest reader and its dotted-path view
//! - Dependency specifications
//! - Package definitions from the index
//! - Workspaces and manifest discovery

pub mod dependency;
pub mod manifest;
pub mod package;
pub mod workspace;

pub use dependency::{DependencySource, DependencySpec, SourceKind};
pub use manifest::{Manifest, ManifestError, View, MANIFEST_NAME};
pub use package::{PackageDefinition, TagConfig, VersionEntry};
pub use workspace::{find_manifest, find_workspace, Workspace, LOCKFILE_NAME};
