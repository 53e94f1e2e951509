//! Resolution error types and diagnostics.

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::manifest::ManifestError;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error during dependency resolution.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ResolveError {
    #[error("invalid manifest `{}`: {message}", path.display())]
    #[diagnostic(code(cforge::resolve::manifest_invalid))]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("package `{package}` not found in the index")]
    #[diagnostic(
        code(cforge::resolve::unknown_package),
        help("run `cforge deps search {package}` to find similar packages")
    )]
    UnknownPackage { package: String },

    #[error("no version of `{package}` matches `{requirement}`")]
    #[diagnostic(code(cforge::resolve::no_matching_version))]
    NoMatchingVersion {
        package: String,
        requirement: String,
        available: Vec<String>,
    },

    #[error("package `{package}` has no published versions")]
    #[diagnostic(code(cforge::resolve::no_versions_published))]
    NoVersionsPublished { package: String },

    #[error("git dependency `{package}` sets more than one of tag, branch and commit")]
    #[diagnostic(code(cforge::resolve::ambiguous_git_reference))]
    AmbiguousGitReference { package: String, refs: Vec<String> },

    #[error("dependency `{name}` is declared more than once")]
    #[diagnostic(code(cforge::resolve::duplicate_dependency))]
    DuplicateDependency { name: String },

    #[error("feature `{feature}` of `{required_by}` requires `{package}@{requirement}`, but `{package}` resolved to {resolved}")]
    #[diagnostic(code(cforge::resolve::feature_requirement_conflict))]
    FeatureRequirementConflict {
        package: String,
        requirement: String,
        resolved: String,
        required_by: String,
        feature: String,
    },
}

impl From<ManifestError> for ResolveError {
    fn from(e: ManifestError) -> Self {
        match e {
            ManifestError::Invalid { path, message } => ResolveError::ManifestInvalid { path, message },
            ManifestError::Io { path, source } => ResolveError::ManifestInvalid {
                path,
                message: source.to_string(),
            },
            ManifestError::NotFound { dir } => ResolveError::ManifestInvalid {
                message: "no manifest found".to_string(),
                path: dir,
            },
        }
    }
}

impl ResolveError {
    /// The dependency this error is about.
    pub fn package(&self) -> Option<&str> {
        match self {
            ResolveError::ManifestInvalid { .. } => None,
            ResolveError::UnknownPackage { package }
            | ResolveError::NoMatchingVersion { package, .. }
            | ResolveError::NoVersionsPublished { package }
            | ResolveError::AmbiguousGitReference { package, .. }
            | ResolveError::FeatureRequirementConflict { package, .. } => Some(package.as_str()),
            ResolveError::DuplicateDependency { name } => Some(name.as_str()),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolveError::ManifestInvalid { path, message } => {
                Diagnostic::error(format!("failed to parse `{}`", path.display()))
                    .with_context(message.clone())
                    .with_location(path.clone())
            }

            ResolveError::UnknownPackage { package } => {
                Diagnostic::error(format!("package `{}` not found in the index", package))
                    .with_suggestion(suggestions::search(package))
                    .with_suggestion(suggestions::REFRESH_INDEX)
            }

            ResolveError::NoMatchingVersion {
                package,
                requirement,
                available,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "no version of `{}` matches `{}`",
                    package, requirement
                ));

                if available.is_empty() {
                    diag = diag.with_context("no non-yanked versions are published");
                } else {
                    diag = diag.with_context(format!(
                        "available versions: {}",
                        available.join(", ")
                    ));
                }

                diag.with_suggestion(format!(
                    "update the version requirement for `{}` in cforge.toml",
                    package
                ))
                .with_suggestion(suggestions::REFRESH_INDEX)
            }

            ResolveError::NoVersionsPublished { package } => {
                Diagnostic::error(format!("package `{}` has no published versions", package))
                    .with_suggestion(suggestions::REFRESH_INDEX)
                    .with_suggestion(format!(
                        "depend on `{}` through `[dependencies.git]` instead",
                        package
                    ))
            }

            ResolveError::AmbiguousGitReference { package, refs } => Diagnostic::error(format!(
                "git dependency `{}` has an ambiguous reference",
                package
            ))
            .with_context(format!("set: {}", refs.join(", ")))
            .with_suggestion("keep exactly one of `tag`, `branch` or `commit`"),

            ResolveError::DuplicateDependency { name } => {
                Diagnostic::error(format!("dependency `{}` is declared more than once", name))
                    .with_suggestion(format!(
                        "remove all but one declaration of `{}` from cforge.toml",
                        name
                    ))
            }

            ResolveError::FeatureRequirementConflict {
                package,
                requirement,
                resolved,
                required_by,
                feature,
            } => Diagnostic::error(format!("conflicting requirements for `{}`", package))
                .with_context(format!("resolved to {}", resolved))
                .with_context(format!(
                    "`{}[{}]` requires {}@{}",
                    required_by, feature, package, requirement
                ))
                .with_suggestion(format!(
                    "align the version of `{}` with what `{}` requires",
                    package, required_by
                )),
        }
    }
}
