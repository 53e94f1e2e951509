//! Implementation of the `cforge deps` family and `cforge lock`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::core::dependency::{DependencySource, DependencySpec, SourceKind};
use crate::core::manifest::Manifest;
use crate::core::package::PackageDefinition;
use crate::core::workspace::{self, LOCKFILE_NAME};
use crate::ops::lockfile::{self, LockfileError, Lockfile, RepoInspector};
use crate::resolver::{PackageProvider, Resolution, ResolvedDependency, Resolver, Version, VersionSpec};
use crate::sources::registry::{IndexRemote, Registry, UpdateOutcome};
use crate::sources::tags::TagLister;
use crate::util::shell::{Shell, Status};
use crate::util::GlobalContext;

/// Versions `deps info` shows unless asked for all of them.
const INFO_VERSIONS: usize = 10;

/// A project manifest with its dependency specifications.
#[derive(Debug, Clone)]
pub struct Project {
    pub manifest: Manifest,
    /// Own declarations first, then those inherited from a workspace
    pub specs: Vec<DependencySpec>,
}

impl Project {
    /// Load the project enclosing the context's working directory.
    pub fn load(ctx: &GlobalContext) -> Result<Self> {
        let path = ctx.find_manifest()?;
        Project::from_path(&path)
    }

    pub fn from_path(manifest_path: &Path) -> Result<Self> {
        let manifest = Manifest::load(manifest_path)?;
        let specs = workspace::project_dependencies(&manifest)?;
        Ok(Project { manifest, specs })
    }

    pub fn root(&self) -> &Path {
        self.manifest.dir()
    }

    pub fn name(&self) -> String {
        self.manifest.project_name()
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.root().join(LOCKFILE_NAME)
    }

    pub fn deps_dir(&self) -> PathBuf {
        self.manifest.deps_dir()
    }

    pub fn build_dir(&self) -> PathBuf {
        self.manifest.build_dir()
    }
}

/// Open the user's registry, refreshing a stale index when auto-update is on.
pub fn open_registry(ctx: &GlobalContext, shell: &Arc<Shell>) -> Result<Registry> {
    let mut registry = Registry::from_context(ctx);
    if ctx.config().registry.auto_update && registry.index().needs_update() {
        update_index(&mut registry, shell, false)?;
    }
    Ok(registry)
}

/// Refresh the package index and report the outcome.
pub fn update_index<R: IndexRemote, L: TagLister>(
    registry: &mut Registry<R, L>,
    shell: &Arc<Shell>,
    force: bool,
) -> Result<UpdateOutcome> {
    let span = shell.span(Status::Updating, format!("package index ({})", registry.index().url()));
    let outcome = registry.refresh(force)?;
    match outcome {
        UpdateOutcome::Fresh => shell.status(Status::Fresh, "package index is up to date"),
        UpdateOutcome::Updated | UpdateOutcome::Cloned => {
            shell.status(Status::Updated, format!("package index ({})", outcome))
        }
        UpdateOutcome::Skipped => shell.status(Status::Skipped, "package index refresh"),
    }
    drop(span);
    Ok(outcome)
}

/// Resolve `specs`, showing a progress bar while more than one resolves.
pub fn resolve_with_progress<P: PackageProvider>(
    resolver: &mut Resolver<P>,
    specs: &[DependencySpec],
    shell: &Arc<Shell>,
) -> Result<Resolution> {
    let mut progress = shell.progress(specs.len() as u64, "Resolving");
    let result = resolver.resolve_all_with(specs, |dep| {
        progress.set_detail(&dep.name);
        progress.inc(1);
    });
    progress.finish();
    Ok(result?)
}

/// One line of `deps list`.
pub fn describe_spec(spec: &DependencySpec) -> String {
    let detail = match &spec.source {
        DependencySource::Index => spec.version.clone(),
        DependencySource::Git {
            url,
            tag,
            branch,
            commit,
        } => match tag.as_ref().or(branch.as_ref()).or(commit.as_ref()) {
            Some(r) => format!("{}#{}", url, r),
            None => url.clone(),
        },
        DependencySource::Vcpkg { package, triplet } => {
            let port = package.as_deref().unwrap_or(&spec.name);
            match triplet {
                Some(t) => format!("{}:{}", port, t),
                None => port.to_string(),
            }
        }
        DependencySource::System { package, .. } => {
            package.clone().unwrap_or_else(|| spec.name.clone())
        }
        DependencySource::Project { path } => path.display().to_string(),
    };

    let mut line = format!("{:<20} {:<8} {}", spec.name, spec.kind(), detail);
    if !spec.features.is_empty() {
        line.push_str(&format!(" [{}]", spec.features.join(", ")));
    }
    line.trim_end().to_string()
}

fn tree_label(dep: &ResolvedDependency) -> String {
    let mut label = match dep.kind() {
        SourceKind::Index => format!("{} v{}", dep.name, dep.version),
        SourceKind::Git => format!(
            "{} (git: {}{})",
            dep.name,
            dep.url.as_deref().unwrap_or(""),
            dep.git_ref().map(|r| format!("#{}", r)).unwrap_or_default()
        ),
        SourceKind::Project => format!(
            "{} (path: {})",
            dep.name,
            dep.path.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
        ),
        kind => format!("{} ({})", dep.name, kind),
    };
    if !dep.features.is_empty() {
        label.push_str(&format!(" [{}]", dep.features.join(", ")));
    }
    if let Some((_, feature)) = &dep.required_by {
        label.push_str(&format!(" (feature `{}`)", feature));
    }
    label
}

fn push_subtree(
    resolution: &Resolution,
    dep: &ResolvedDependency,
    indent: &str,
    last: bool,
    lines: &mut Vec<String>,
) {
    let branch = if last { "└── " } else { "├── " };
    lines.push(format!("{}{}{}", indent, branch, tree_label(dep)));

    let children: Vec<&ResolvedDependency> = resolution
        .iter()
        .filter(|d| d.required_by.as_ref().is_some_and(|(parent, _)| *parent == dep.name))
        .collect();
    let child_indent = format!("{}{}", indent, if last { "    " } else { "│   " });
    for (i, child) in children.iter().enumerate() {
        push_subtree(resolution, child, &child_indent, i + 1 == children.len(), lines);
    }
}

/// Render `resolution` as a tree under `root`. Dependencies pulled in by a
/// feature nest under the dependency that enabled it.
pub fn tree_lines(root: &str, resolution: &Resolution) -> Vec<String> {
    let mut lines = vec![root.to_string()];
    let top: Vec<&ResolvedDependency> = resolution.iter().filter(|d| d.required_by.is_none()).collect();
    for (i, dep) in top.iter().enumerate() {
        push_subtree(resolution, dep, "", i + 1 == top.len(), &mut lines);
    }
    lines
}

/// Render `deps info` for a package.
pub fn info_lines(package: &PackageDefinition, all_versions: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if package.description.is_empty() {
        lines.push(package.name.clone());
    } else {
        lines.push(format!("{} - {}", package.name, package.description));
    }

    let mut field = |label: &str, value: &str| {
        if !value.is_empty() {
            lines.push(format!("  {:<14}{}", format!("{}:", label), value));
        }
    };
    field("repository", &package.repository);
    field("homepage", package.homepage.as_deref().unwrap_or(""));
    field("documentation", package.documentation.as_deref().unwrap_or(""));
    field("license", package.license.as_deref().unwrap_or(""));
    field("keywords", &package.keywords.join(", "));

    let integration = &package.integration;
    let integration_line = match &integration.target {
        Some(target) => format!("{} ({})", integration.kind, target),
        None => integration.kind.to_string(),
    };
    field("integration", &integration_line);

    let features: Vec<String> = package
        .features
        .values()
        .map(|f| {
            if package.default_features.contains(&f.name) {
                format!("{} (default)", f.name)
            } else {
                f.name.clone()
            }
        })
        .collect();
    field("features", &features.join(", "));

    if package.verified {
        field("verified", "yes");
    }

    if package.versions.is_empty() {
        lines.push("  no versions published".to_string());
        return lines;
    }

    lines.push("  versions:".to_string());
    let shown = if all_versions {
        package.versions.len()
    } else {
        INFO_VERSIONS
    };
    for entry in package.versions.iter().take(shown) {
        let mut line = format!("    {}", entry.version);
        if !entry.tag.is_empty() && entry.tag != entry.version {
            line.push_str(&format!(" (tag {})", entry.tag));
        }
        if entry.yanked {
            line.push_str(" [yanked]");
            if let Some(reason) = &entry.yanked_reason {
                line.push_str(&format!(": {}", reason));
            }
        }
        lines.push(line);
    }
    if package.versions.len() > shown {
        lines.push(format!("    … and {} more", package.versions.len() - shown));
    }
    lines
}

/// An index dependency with a newer version available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outdated {
    pub name: String,
    pub requirement: String,
    /// Locked version, or what the requirement resolves to today
    pub current: String,
    pub latest: String,
}

/// Compare each index dependency with its package's newest version.
pub fn outdated<P: PackageProvider>(
    specs: &[DependencySpec],
    lock: Option<&Lockfile>,
    resolver: &mut Resolver<P>,
) -> Result<Vec<Outdated>> {
    let mut behind = Vec::new();

    for spec in specs.iter().filter(|s| s.kind() == SourceKind::Index) {
        let locked = lock
            .and_then(|l| l.get(&spec.name))
            .filter(|l| l.source_type == SourceKind::Index && !l.version.is_empty())
            .map(|l| l.version.clone());
        let current = match locked {
            Some(version) => version,
            None => resolver.resolve_dependency(spec)?.version,
        };

        let Some(package) = resolver.provider().get_package(&spec.name)? else {
            continue;
        };
        let Some(latest) = package.latest() else {
            continue;
        };

        if Version::parse(&latest.version) > Version::parse(&current) {
            behind.push(Outdated {
                name: spec.name.clone(),
                requirement: spec.version.clone(),
                current,
                latest: latest.version.clone(),
            });
        }
    }

    Ok(behind)
}

impl Outdated {
    /// Whether the manifest requirement already admits the newest version.
    pub fn within_requirement(&self) -> bool {
        VersionSpec::parse(&self.requirement).matches(&self.latest)
    }
}

/// Options for `cforge lock`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockOptions {
    pub force: bool,
    pub verify: bool,
    pub clean: bool,
}

#[derive(Debug)]
pub enum LockOutcome {
    /// `--clean`; whether a file was removed
    Removed(bool),
    /// Verification ran, either on request or because the file existed
    Verified {
        requested: bool,
        mismatches: Vec<LockfileError>,
    },
    /// A new lock file; empty when there was nothing to lock
    Generated(Lockfile),
}

/// Generate, verify or remove the project's lock file.
pub fn lock<P: PackageProvider>(
    project: &Project,
    resolver: &mut Resolver<P>,
    inspector: &dyn RepoInspector,
    opts: LockOptions,
) -> Result<LockOutcome> {
    let path = project.lockfile_path();

    if opts.clean {
        return Ok(LockOutcome::Removed(lockfile::clean(&path)?));
    }

    if opts.verify || (path.exists() && !opts.force) {
        let Some(lock) = Lockfile::load(&path)? else {
            bail!("no lock file found; run `cforge lock` to create one");
        };
        let mismatches = lockfile::verify(&lock, &project.deps_dir(), inspector);
        return Ok(LockOutcome::Verified {
            requested: opts.verify,
            mismatches,
        });
    }

    let lock = lockfile::generate(&path, &project.specs, resolver, true)?;
    Ok(LockOutcome::Generated(lock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::lockfile::RepoHead;
    use crate::resolver::tests::{provider, FMT, SPDLOG};
    use std::collections::HashMap;
    use tempfile::TempDir;

    const UTFCPP: &str = r#"
[package]
repository = "https://github.com/nemtrif/utfcpp"

[[versions]]
version = "4.0.5"
"#;

    fn project(dir: &Path, deps: &str) -> Project {
        let path = dir.join("cforge.toml");
        std::fs::write(&path, format!("[project]\nname = \"demo\"\n\n[dependencies]\n{}", deps)).unwrap();
        Project::from_path(&path).unwrap()
    }

    fn resolver() -> Resolver<HashMap<String, PackageDefinition>> {
        Resolver::new(provider(&[("fmt", FMT), ("spdlog", SPDLOG), ("utfcpp", UTFCPP)]))
    }

    #[test]
    fn test_describe_spec() {
        assert_eq!(
            describe_spec(&DependencySpec::index("fmt", "11.*")),
            format!("{:<20} {:<8} 11.*", "fmt", "index")
        );
        let git = DependencySpec::index("mylib", "*").with_source(DependencySource::Git {
            url: "https://host/mylib.git".into(),
            tag: Some("v1.0".into()),
            branch: None,
            commit: None,
        });
        assert!(describe_spec(&git).ends_with("git      https://host/mylib.git#v1.0"));
    }

    #[test]
    fn test_tree_nests_feature_requirements() {
        let specs = vec![
            DependencySpec::index("spdlog", "1.*").with_features(vec!["utf8".into()]),
            DependencySpec::index("utfcpp", "*").with_features(Vec::new()),
        ];
        // utfcpp is declared directly, so only fmt nests under spdlog
        let resolution = resolver().resolve_all(&specs).unwrap();
        let lines = tree_lines("demo", &resolution);
        assert_eq!(
            lines,
            vec![
                "demo".to_string(),
                "├── spdlog v1.15.0 [external_fmt, utf8]".to_string(),
                "│   └── fmt v11.2.0 (feature `external_fmt`)".to_string(),
                "└── utfcpp v4.0.5".to_string(),
            ]
        );
    }

    #[test]
    fn test_info_marks_defaults_and_yanked() {
        let mut registry = provider(&[("spdlog", SPDLOG), ("fmt", FMT)]);
        let fmt = registry.get_package("fmt").unwrap().unwrap();
        let lines = info_lines(&fmt, false);
        assert_eq!(lines[0], "fmt");
        assert!(lines.iter().any(|l| l.contains("cmake (fmt::fmt)")));
        assert!(lines.iter().any(|l| l == "    11.1.4 [yanked]"));

        let spdlog = registry.get_package("spdlog").unwrap().unwrap();
        let lines = info_lines(&spdlog, true);
        assert!(lines
            .iter()
            .any(|l| l.contains("external_fmt (default), old_fmt, utf8")));
    }

    #[test]
    fn test_outdated_uses_lockfile_version() {
        let specs = vec![
            DependencySpec::index("fmt", "10.*"),
            DependencySpec::index("spdlog", "1.*"),
        ];
        let behind = outdated(&specs, None, &mut resolver()).unwrap();
        assert_eq!(
            behind,
            vec![Outdated {
                name: "fmt".into(),
                requirement: "10.*".into(),
                current: "10.2.1".into(),
                latest: "11.2.0".into(),
            }]
        );
        assert!(!behind[0].within_requirement());

        let mut lock = Lockfile::default();
        lock.dependencies.insert(
            "spdlog".into(),
            lockfile::LockedDependency {
                source_type: SourceKind::Index,
                url: String::new(),
                version: "1.14.1".into(),
                resolved: "v1.14.1".into(),
                branch: String::new(),
            },
        );
        let behind = outdated(&specs, Some(&lock), &mut resolver()).unwrap();
        let spdlog = behind.iter().find(|o| o.name == "spdlog").unwrap();
        assert_eq!(spdlog.current, "1.14.1");
        assert!(spdlog.within_requirement());
    }

    #[test]
    fn test_lock_generates_then_verifies_existing() {
        let tmp = TempDir::new().unwrap();
        let project = project(tmp.path(), "fmt = \"11.*\"\n");
        let inspector: HashMap<PathBuf, RepoHead> = HashMap::new();

        let outcome = lock(&project, &mut resolver(), &inspector, LockOptions::default()).unwrap();
        assert!(matches!(outcome, LockOutcome::Generated(ref l) if l.len() == 1));
        let written = std::fs::read(project.lockfile_path()).unwrap();

        // existing file without --force: verify, fmt is not checked out
        let outcome = lock(&project, &mut resolver(), &inspector, LockOptions::default()).unwrap();
        match outcome {
            LockOutcome::Verified {
                requested,
                mismatches,
            } => {
                assert!(!requested);
                assert_eq!(mismatches.len(), 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(std::fs::read(project.lockfile_path()).unwrap(), written);

        let outcome = lock(
            &project,
            &mut resolver(),
            &inspector,
            LockOptions {
                clean: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(outcome, LockOutcome::Removed(true)));
        assert!(!project.lockfile_path().exists());
    }

    #[test]
    fn test_verify_without_lockfile_fails() {
        let tmp = TempDir::new().unwrap();
        let project = project(tmp.path(), "");
        let inspector: HashMap<PathBuf, RepoHead> = HashMap::new();
        let opts = LockOptions {
            verify: true,
            ..Default::default()
        };
        assert!(lock(&project, &mut resolver(), &inspector, opts).is_err());
    }
}
