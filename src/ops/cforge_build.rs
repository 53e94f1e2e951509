//! Implementation of `cforge build`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::core::dependency::SourceKind;
use crate::ops::cforge_deps::{open_registry, resolve_with_progress, Project};
use crate::ops::{fetch_content, lockfile};
use crate::resolver::{Resolution, Resolver};
use crate::util::diagnostic::suggestions;
use crate::util::process::{find_cmake, ProcessBuilder};
use crate::util::shell::{Shell, Status};
use crate::util::GlobalContext;

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Build in release mode
    pub release: bool,

    /// Number of parallel jobs
    pub jobs: Option<usize>,

    /// Stop after generating the dependency glue and configuring
    pub configure_only: bool,
}

impl BuildOptions {
    pub fn profile(&self) -> &'static str {
        if self.release {
            "Release"
        } else {
            "Debug"
        }
    }
}

#[derive(Debug)]
pub struct BuildResult {
    pub build_dir: PathBuf,
    pub dependencies: usize,
    pub elapsed: Duration,
}

/// The vcpkg toolchain file, when the resolution pulls anything from vcpkg
/// and the vcpkg root is known.
pub fn vcpkg_toolchain(resolution: &Resolution, vcpkg_root: Option<&Path>) -> Option<PathBuf> {
    if !resolution.iter().any(|dep| dep.kind() == SourceKind::Vcpkg) {
        return None;
    }
    let Some(root) = vcpkg_root else {
        tracing::warn!("vcpkg dependencies requested but VCPKG_ROOT is not set");
        return None;
    };
    Some(root.join("scripts").join("buildsystems").join("vcpkg.cmake"))
}

/// The configure and build invocations for a project.
pub fn cmake_commands(
    cmake: &Path,
    root: &Path,
    build_dir: &Path,
    toolchain: Option<&Path>,
    opts: &BuildOptions,
) -> (ProcessBuilder, ProcessBuilder) {
    let mut configure = ProcessBuilder::new(cmake)
        .arg("-S")
        .arg(root)
        .arg("-B")
        .arg(build_dir)
        .arg(format!("-DCMAKE_BUILD_TYPE={}", opts.profile()))
        .cwd(root);
    if let Some(toolchain) = toolchain {
        configure = configure.arg(format!("-DCMAKE_TOOLCHAIN_FILE={}", toolchain.display()));
    }

    let mut build = ProcessBuilder::new(cmake)
        .arg("--build")
        .arg(build_dir)
        .args(["--config", opts.profile()])
        .cwd(root);
    if let Some(jobs) = opts.jobs {
        build = build.args(["--parallel".to_string(), jobs.to_string()]);
    }

    (configure, build)
}

fn run(shell: &Shell, status: Status, cmd: &ProcessBuilder) -> Result<()> {
    shell.status(status, cmd.display_command());
    let exit = cmd.status()?;
    if !exit.success() {
        bail!(
            "`{}` failed with exit code {}",
            cmd.display_command(),
            exit.code().map_or_else(|| "unknown".to_string(), |c| c.to_string())
        );
    }
    Ok(())
}

/// Resolve dependencies, generate the CMake glue and drive CMake.
pub fn build(ctx: &GlobalContext, shell: &Arc<Shell>, opts: &BuildOptions) -> Result<BuildResult> {
    let start = Instant::now();
    let project = Project::load(ctx)?;

    let Some(cmake) = find_cmake() else {
        bail!("`cmake` was not found\nhint: {}", suggestions::CMAKE_MISSING);
    };
    tracing::debug!("using {}", cmake.display());

    let registry = open_registry(ctx, shell)?;
    let mut resolver = Resolver::new(registry);
    let resolution = resolve_with_progress(&mut resolver, &project.specs, shell)?;

    let lock_path = project.lockfile_path();
    if lock_path.exists() && lockfile::lockfile_needs_update(&lock_path, &project.specs)? {
        shell.warn(format!(
            "{} is out of date with the manifest\nhint: {}",
            lock_path.display(),
            suggestions::STALE_LOCK
        ));
    }

    let build_dir = project.build_dir();
    let glue = fetch_content::write_dependencies(&build_dir, &resolution)
        .with_context(|| format!("failed to write dependency glue under {}", build_dir.display()))?;
    shell.status(Status::Generating, glue.display());

    let toolchain = vcpkg_toolchain(&resolution, ctx.vcpkg_root());
    let (configure, compile) =
        cmake_commands(&cmake, project.root(), &build_dir, toolchain.as_deref(), opts);
    run(shell, Status::Generating, &configure)?;
    if !opts.configure_only {
        run(shell, Status::Building, &compile)?;
    }

    Ok(BuildResult {
        build_dir,
        dependencies: resolution.len(),
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dependency::{DependencySource, DependencySpec};
    use crate::resolver::tests::{provider, FMT};

    #[test]
    fn test_cmake_commands_debug() {
        let (configure, build) = cmake_commands(
            Path::new("cmake"),
            Path::new("/proj"),
            Path::new("/proj/build"),
            None,
            &BuildOptions::default(),
        );
        assert_eq!(
            configure.get_args(),
            ["-S", "/proj", "-B", "/proj/build", "-DCMAKE_BUILD_TYPE=Debug"]
        );
        assert_eq!(build.get_args(), ["--build", "/proj/build", "--config", "Debug"]);
    }

    #[test]
    fn test_cmake_commands_release_parallel() {
        let opts = BuildOptions {
            release: true,
            jobs: Some(8),
            ..Default::default()
        };
        let (configure, build) =
            cmake_commands(Path::new("cmake"), Path::new("/p"), Path::new("/p/out"), None, &opts);
        assert!(configure
            .display_command()
            .ends_with("-DCMAKE_BUILD_TYPE=Release"));
        assert_eq!(
            build.display_command(),
            "cmake --build /p/out --config Release --parallel 8"
        );
    }

    #[test]
    fn test_vcpkg_dependency_passes_toolchain_file() {
        let mut resolver = Resolver::new(provider(&[("fmt", FMT)]));

        let index_only = resolver
            .resolve_all(&[DependencySpec::index("fmt", "*")])
            .unwrap();
        assert_eq!(vcpkg_toolchain(&index_only, Some(Path::new("/vcpkg"))), None);

        let with_vcpkg = resolver
            .resolve_all(&[
                DependencySpec::index("fmt", "*"),
                DependencySpec::index("zlib", "*").with_source(DependencySource::Vcpkg {
                    package: None,
                    triplet: None,
                }),
            ])
            .unwrap();
        assert_eq!(vcpkg_toolchain(&with_vcpkg, None), None);

        let toolchain = vcpkg_toolchain(&with_vcpkg, Some(Path::new("/vcpkg")));
        assert_eq!(
            toolchain.as_deref(),
            Some(Path::new("/vcpkg/scripts/buildsystems/vcpkg.cmake"))
        );

        let (configure, _) = cmake_commands(
            Path::new("cmake"),
            Path::new("/proj"),
            Path::new("/proj/build"),
            toolchain.as_deref(),
            &BuildOptions::default(),
        );
        assert_eq!(
            configure.get_args(),
            [
                "-S",
                "/proj",
                "-B",
                "/proj/build",
                "-DCMAKE_BUILD_TYPE=Debug",
                "-DCMAKE_TOOLCHAIN_FILE=/vcpkg/scripts/buildsystems/vcpkg.cmake"
            ]
        );
    }
}
