//! Dependency resolution.
//!
//! Each specification is resolved on its own: there is no backtracking
//! between dependencies. An INDEX dependency picks the newest non-yanked
//! version its specification accepts; other kinds pass their declared
//! location through.
//!
//! Features may require further packages. Those requirements are returned to
//! the caller rather than resolved recursively; [`Resolver::resolve_all`]
//! merges them in a second pass.

pub mod errors;
pub mod version;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;

use crate::core::dependency::{DependencySource, DependencySpec, SourceKind};
use crate::core::manifest::ManifestError;
use crate::core::package::{IntegrationKind, PackageDefinition};

pub use errors::ResolveError;
pub use version::{satisfies, Version, VersionSpec};

/// Looks up package definitions by name.
pub trait PackageProvider {
    fn get_package(&mut self, name: &str) -> Result<Option<PackageDefinition>, ManifestError>;
}

impl PackageProvider for HashMap<String, PackageDefinition> {
    fn get_package(&mut self, name: &str) -> Result<Option<PackageDefinition>, ManifestError> {
        Ok(self.get(name).cloned())
    }
}

/// A package required by an active feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRequirement {
    pub feature: String,
    pub spec: DependencySpec,
}

/// A fully resolved dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub name: String,
    pub kind: Option<SourceKind>,
    /// Upstream repository (index and git)
    pub url: Option<String>,
    /// Selected exact version, or the declared specification for
    /// kinds that are not version-resolved
    pub version: String,
    /// Upstream tag to check out
    pub tag: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub vcpkg_name: Option<String>,
    pub vcpkg_triplet: Option<String>,
    /// Host package-configuration name
    pub system_name: Option<String>,
    pub components: Vec<String>,
    pub path: Option<PathBuf>,
    pub header_only: bool,
    pub link: bool,
    pub features: Vec<String>,
    /// Generator target to link against
    pub target: Option<String>,
    pub include_dir: Option<String>,
    pub single_header: Option<String>,
    pub subdir: Option<String>,
    /// Generator options switched by active features
    pub options: BTreeMap<String, String>,
    /// Packages required by active features
    pub requires: Vec<FeatureRequirement>,
    /// `(dependency, feature)` that pulled this one in
    pub required_by: Option<(String, String)>,
}

impl ResolvedDependency {
    pub fn kind(&self) -> SourceKind {
        self.kind.unwrap_or(SourceKind::Index)
    }

    /// The git reference to fetch: tag, then commit, then branch.
    pub fn git_ref(&self) -> Option<&str> {
        self.tag
            .as_deref()
            .or(self.commit.as_deref())
            .or(self.branch.as_deref())
    }

    /// Whether a re-introduced requirement `spec` is already satisfied.
    fn accepts(&self, spec: &DependencySpec) -> bool {
        if spec.kind() != self.kind() {
            return false;
        }
        match self.kind() {
            SourceKind::Index => satisfies(&self.version, &spec.version),
            _ => !VersionSpec::parse(&spec.version).is_restrictive() || spec.version == self.version,
        }
    }

    fn describe(&self) -> String {
        match self.kind() {
            SourceKind::Index => self.version.clone(),
            SourceKind::Git => self.git_ref().unwrap_or("HEAD").to_string(),
            kind => format!("{} ({})", self.version, kind),
        }
    }
}

/// Result of resolving a whole dependency list.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Declared dependencies first, then feature-pulled ones, in discovery order.
    pub dependencies: Vec<ResolvedDependency>,
}

impl Resolution {
    pub fn get(&self, name: &str) -> Option<&ResolvedDependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedDependency> {
        self.dependencies.iter()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Dependencies sorted by name.
    pub fn sorted(&self) -> Vec<&ResolvedDependency> {
        let mut deps: Vec<&ResolvedDependency> = self.dependencies.iter().collect();
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        deps
    }
}

/// Resolves dependency specifications against a package provider.
pub struct Resolver<P> {
    provider: P,
}

impl<P: PackageProvider> Resolver<P> {
    pub fn new(provider: P) -> Self {
        Resolver { provider }
    }

    pub fn provider(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Resolve a single specification.
    pub fn resolve_dependency(
        &mut self,
        spec: &DependencySpec,
    ) -> Result<ResolvedDependency, ResolveError> {
        let mut resolved = ResolvedDependency {
            name: spec.name.clone(),
            kind: Some(spec.kind()),
            version: spec.version.clone(),
            header_only: spec.header_only,
            link: spec.link,
            features: spec.features.clone(),
            ..Default::default()
        };

        match &spec.source {
            DependencySource::Index => self.resolve_index(spec, &mut resolved)?,
            DependencySource::Git {
                url,
                tag,
                branch,
                commit,
            } => {
                let refs: Vec<String> = [("tag", tag), ("branch", branch), ("commit", commit)]
                    .into_iter()
                    .filter(|(_, value)| value.is_some())
                    .map(|(key, _)| key.to_string())
                    .collect();
                if refs.len() > 1 {
                    return Err(ResolveError::AmbiguousGitReference {
                        package: spec.name.clone(),
                        refs,
                    });
                }
                resolved.url = Some(url.clone());
                resolved.tag = tag.clone();
                resolved.branch = branch.clone();
                resolved.commit = commit.clone();
            }
            DependencySource::Vcpkg { package, triplet } => {
                resolved.vcpkg_name = Some(package.clone().unwrap_or_else(|| spec.name.clone()));
                resolved.vcpkg_triplet = triplet.clone();
            }
            DependencySource::System {
                package,
                components,
                target,
            } => {
                resolved.system_name = Some(package.clone().unwrap_or_else(|| spec.name.clone()));
                resolved.components = components.clone();
                resolved.target = target.clone();
            }
            DependencySource::Project { path } => {
                resolved.path = Some(path.clone());
            }
        }

        Ok(resolved)
    }

    fn resolve_index(
        &mut self,
        spec: &DependencySpec,
        resolved: &mut ResolvedDependency,
    ) -> Result<(), ResolveError> {
        let package = self
            .provider
            .get_package(&spec.name)?
            .ok_or_else(|| ResolveError::UnknownPackage {
                package: spec.name.clone(),
            })?;

        let requirement = VersionSpec::parse(&spec.version);
        let entry = package
            .available_versions()
            .find(|v| requirement.matches(&v.version));

        let Some(entry) = entry else {
            if requirement.is_restrictive() {
                return Err(ResolveError::NoMatchingVersion {
                    package: spec.name.clone(),
                    requirement: spec.version.clone(),
                    available: package
                        .available_versions()
                        .map(|v| v.version.clone())
                        .collect(),
                });
            }
            return Err(ResolveError::NoVersionsPublished {
                package: spec.name.clone(),
            });
        };

        tracing::debug!("resolved `{}` {} to {}", spec.name, spec.version, entry.version);

        resolved.version = entry.version.clone();
        resolved.tag = Some(if entry.tag.is_empty() {
            package.tags.tag_for(&entry.version)
        } else {
            entry.tag.clone()
        });
        if !package.repository.is_empty() {
            resolved.url = Some(package.repository.clone());
        }

        let integration = &package.integration;
        resolved.target = integration.target.clone();
        resolved.include_dir = integration.include_dir.clone();
        resolved.single_header = integration.single_header.clone();
        resolved.subdir = integration.subdir.clone();
        if integration.kind == IntegrationKind::HeaderOnly {
            resolved.header_only = true;
        }
        if resolved.header_only {
            if let Some(option) = &integration.header_only_option {
                resolved.options.insert(option.clone(), "ON".to_string());
            }
        }

        let mut requested: Vec<String> = Vec::new();
        if spec.default_features {
            requested.extend(package.default_features.iter().cloned());
        }
        for feature in &spec.features {
            if !requested.contains(feature) {
                requested.push(feature.clone());
            }
        }

        resolved.features.clear();
        for name in requested {
            let Some(feature) = package.feature(&name) else {
                tracing::warn!("package `{}` has no feature `{}`; ignoring it", spec.name, name);
                continue;
            };
            if let Some(option) = &feature.option {
                resolved.options.insert(option.clone(), "ON".to_string());
            }
            for requirement in &feature.requires {
                resolved.requires.push(FeatureRequirement {
                    feature: name.clone(),
                    spec: DependencySpec::from_requirement(requirement),
                });
            }
            resolved.features.push(name);
        }

        Ok(())
    }

    /// Resolve every specification, then merge feature requirements.
    ///
    /// A requirement naming a dependency that is already resolved is dropped
    /// when the resolution satisfies it and is a conflict otherwise.
    pub fn resolve_all(&mut self, specs: &[DependencySpec]) -> Result<Resolution, ResolveError> {
        self.resolve_all_with(specs, |_| {})
    }

    /// [`resolve_all`](Self::resolve_all), reporting each resolved dependency.
    pub fn resolve_all_with(
        &mut self,
        specs: &[DependencySpec],
        mut on_resolved: impl FnMut(&ResolvedDependency),
    ) -> Result<Resolution, ResolveError> {
        let mut resolution = Resolution::default();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut pending: VecDeque<(String, FeatureRequirement)> = VecDeque::new();

        for spec in specs {
            let resolved = self.resolve_dependency(spec)?;
            on_resolved(&resolved);
            for req in &resolved.requires {
                pending.push_back((resolved.name.clone(), req.clone()));
            }
            index.insert(resolved.name.clone(), resolution.dependencies.len());
            resolution.dependencies.push(resolved);
        }

        while let Some((parent, req)) = pending.pop_front() {
            if let Some(&i) = index.get(&req.spec.name) {
                let existing = &resolution.dependencies[i];
                if existing.accepts(&req.spec) {
                    tracing::debug!(
                        "`{}` required by `{}[{}]` is already resolved",
                        req.spec.name,
                        parent,
                        req.feature
                    );
                    continue;
                }
                return Err(ResolveError::FeatureRequirementConflict {
                    package: req.spec.name.clone(),
                    requirement: req.spec.version.clone(),
                    resolved: existing.describe(),
                    required_by: parent,
                    feature: req.feature,
                });
            }

            let mut resolved = self.resolve_dependency(&req.spec)?;
            resolved.required_by = Some((parent, req.feature));
            on_resolved(&resolved);
            for next in &resolved.requires {
                pending.push_back((resolved.name.clone(), next.clone()));
            }
            index.insert(resolved.name.clone(), resolution.dependencies.len());
            resolution.dependencies.push(resolved);
        }

        Ok(resolution)
    }
}
