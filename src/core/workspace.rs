//! Workspaces and manifest discovery.
//!
//! A workspace is a directory holding `workspace.toml` and a set of member
//! projects. Its `[dependencies]` table is a baseline every member inherits
//! unless the member redeclares the same name, and
//! `[dependencies.project.<member>]` adds dependencies for one member only.

use std::path::{Path, PathBuf};

use crate::core::dependency::{self, DependencySpec};
use crate::core::manifest::{Manifest, ManifestError, MANIFEST_NAME};
use crate::resolver::errors::ResolveError;
use crate::util::fs::normalize_path;

/// Canonical workspace file name.
pub const WORKSPACE_NAME: &str = "workspace.toml";

/// Alternate workspace file name.
pub const WORKSPACE_ALIAS: &str = "cforge.workspace.toml";

/// Lock file name, next to the manifest.
pub const LOCKFILE_NAME: &str = "cforge.lock";

/// Find `cforge.toml` in `start` or any parent directory.
pub fn find_manifest(start: &Path) -> Result<PathBuf, ManifestError> {
    start
        .ancestors()
        .map(|dir| dir.join(MANIFEST_NAME))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ManifestError::NotFound {
            dir: start.to_path_buf(),
        })
}

/// Find a workspace file in `start` or any parent directory.
pub fn find_workspace(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        [WORKSPACE_NAME, WORKSPACE_ALIAS]
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// A member project of a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceMember {
    pub name: String,
    /// Relative to the workspace root
    pub path: PathBuf,
}

/// A loaded workspace file.
#[derive(Debug, Clone)]
pub struct Workspace {
    manifest: Manifest,
    members: Vec<WorkspaceMember>,
}

impl Workspace {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let manifest = Manifest::load(path)?;

        let projects = manifest.at("workspace.projects");
        let mut members: Vec<WorkspaceMember> = projects
            .string_array()
            .into_iter()
            .map(|path| WorkspaceMember {
                name: Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone()),
                path: PathBuf::from(path),
            })
            .collect();

        for table in projects.tables() {
            let Some(name) = table.at("name").string_opt() else {
                continue;
            };
            let path = table.at("path").string(&name);
            members.push(WorkspaceMember {
                name,
                path: PathBuf::from(path),
            });
        }

        Ok(Workspace { manifest, members })
    }

    /// Load the workspace enclosing `dir`, if any.
    pub fn enclosing(dir: &Path) -> Result<Option<Self>, ManifestError> {
        match find_workspace(dir) {
            Some(path) => Workspace::load(&path).map(Some),
            None => Ok(None),
        }
    }

    pub fn root(&self) -> &Path {
        self.manifest.dir()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// `workspace.name`, falling back to the directory name.
    pub fn name(&self) -> String {
        let fallback = self
            .root()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        self.manifest.get_string("workspace.name", &fallback)
    }

    pub fn cpp_standard(&self) -> String {
        self.manifest.get_string("workspace.cpp_standard", "17")
    }

    pub fn members(&self) -> &[WorkspaceMember] {
        &self.members
    }

    /// The member whose directory is `dir`.
    pub fn member_for(&self, dir: &Path) -> Option<&WorkspaceMember> {
        let dir = normalize_path(dir);
        self.members
            .iter()
            .find(|m| normalize_path(&self.root().join(&m.path)) == dir)
    }

    /// Dependencies shared by every member.
    pub fn baseline(&self) -> Result<Vec<DependencySpec>, ResolveError> {
        dependency::parse_shared_table(self.manifest.at("dependencies"))
    }

    /// Dependencies declared for one member in the workspace file.
    pub fn member_dependencies(&self, member: &str) -> Result<Vec<DependencySpec>, ResolveError> {
        dependency::parse_table(self.manifest.at("dependencies.project").key(member))
    }

    /// Complete `own` with the workspace's dependencies for `member`.
    ///
    /// Names the project already declares keep the project's declaration.
    pub fn inherit(
        &self,
        member: &str,
        own: Vec<DependencySpec>,
    ) -> Result<Vec<DependencySpec>, ResolveError> {
        let mut specs = own;
        let inherited = self
            .member_dependencies(member)?
            .into_iter()
            .chain(self.baseline()?);

        for spec in inherited {
            if specs.iter().all(|s| s.name != spec.name) {
                tracing::debug!("`{}` inherits `{}` from the workspace", member, spec.name);
                specs.push(spec);
            }
        }
        Ok(specs)
    }
}

/// All dependency specifications for a project: its own, plus those it
/// inherits when it is a workspace member.
pub fn project_dependencies(manifest: &Manifest) -> Result<Vec<DependencySpec>, ResolveError> {
    let own = dependency::parse_dependencies(manifest)?;

    let Some(parent) = manifest.dir().parent() else {
        return Ok(own);
    };
    let Some(workspace) = Workspace::enclosing(parent)? else {
        return Ok(own);
    };
    match workspace.member_for(manifest.dir()) {
        Some(member) => {
            let name = member.name.clone();
            workspace.inherit(&name, own)
        }
        None => Ok(own),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dependency::SourceKind;
    use tempfile::TempDir;

    const WORKSPACE: &str = r#"
[workspace]
name = "suite"

[[workspace.projects]]
name = "app"

[[workspace.projects]]
name = "engine"
path = "libs/engine"

[dependencies]
fmt = "11.*"
spdlog = "1.*"

[dependencies.project.app]
cli11 = "2.*"
"#;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_find_manifest_walks_upward() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("cforge.toml"), "[project]\nname = \"x\"\n");
        let nested = tmp.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_manifest(&nested).unwrap(), tmp.path().join("cforge.toml"));
    }

    #[test]
    fn test_find_manifest_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = find_manifest(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("could not find `cforge.toml`"));
    }

    #[test]
    fn test_workspace_alias_name() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join(WORKSPACE_ALIAS), "[workspace]\nname = \"w\"\n");
        assert_eq!(find_workspace(tmp.path()), Some(tmp.path().join(WORKSPACE_ALIAS)));
    }

    #[test]
    fn test_members_and_metadata() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join(WORKSPACE_NAME), WORKSPACE);
        let ws = Workspace::load(&tmp.path().join(WORKSPACE_NAME)).unwrap();

        assert_eq!(ws.name(), "suite");
        assert_eq!(ws.cpp_standard(), "17");
        let names: Vec<&str> = ws.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["app", "engine"]);
        assert_eq!(ws.members()[1].path, PathBuf::from("libs/engine"));

        let baseline: Vec<String> = ws.baseline().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(baseline, vec!["fmt", "spdlog"]);
    }

    #[test]
    fn test_string_project_list() {
        let tmp = TempDir::new().unwrap();
        write(
            &tmp.path().join(WORKSPACE_NAME),
            "[workspace]\nprojects = [\"app\", \"libs/core\"]\n",
        );
        let ws = Workspace::load(&tmp.path().join(WORKSPACE_NAME)).unwrap();
        assert_eq!(
            ws.members()[1],
            WorkspaceMember {
                name: "core".into(),
                path: PathBuf::from("libs/core")
            }
        );
    }

    #[test]
    fn test_member_inherits_missing_dependencies() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join(WORKSPACE_NAME), WORKSPACE);
        write(
            &tmp.path().join("app/cforge.toml"),
            "[project]\nname = \"app\"\n[dependencies]\nfmt = \"10.*\"\n",
        );

        let manifest = Manifest::load(&tmp.path().join("app/cforge.toml")).unwrap();
        let specs = project_dependencies(&manifest).unwrap();

        let summary: Vec<(&str, &str)> = specs
            .iter()
            .map(|s| (s.name.as_str(), s.version.as_str()))
            .collect();
        assert_eq!(summary, vec![("fmt", "10.*"), ("cli11", "2.*"), ("spdlog", "1.*")]);
        assert!(specs.iter().all(|s| s.kind() == SourceKind::Index));
    }

    #[test]
    fn test_standalone_project_has_only_own_dependencies() {
        let tmp = TempDir::new().unwrap();
        write(
            &tmp.path().join("solo/cforge.toml"),
            "[dependencies]\nzlib = \"*\"\n",
        );
        let manifest = Manifest::load(&tmp.path().join("solo/cforge.toml")).unwrap();
        assert_eq!(project_dependencies(&manifest).unwrap().len(), 1);
    }
}
