//! CMake glue for resolved dependencies.
//!
//! Writes `<build-dir>/_cforge/dependencies.cmake`, which the project's
//! `CMakeLists.txt` includes after `project()`. Index and git dependencies
//! are fetched with FetchContent; host packages go through `find_package`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::dependency::SourceKind;
use crate::resolver::{Resolution, ResolvedDependency};
use crate::util::fs;

/// Directory under the build dir holding generated files.
pub const GENERATED_DIR: &str = "_cforge";

pub const DEPENDENCIES_FILE: &str = "dependencies.cmake";

/// Where [`write_dependencies`] puts its output.
pub fn dependencies_path(build_dir: &Path) -> PathBuf {
    build_dir.join(GENERATED_DIR).join(DEPENDENCIES_FILE)
}

fn is_fetched(dep: &ResolvedDependency) -> bool {
    matches!(dep.kind(), SourceKind::Index | SourceKind::Git) && dep.url.is_some()
}

/// CMake variable prefix FetchContent uses for `name`.
fn content_var(name: &str) -> String {
    name.to_lowercase()
}

fn cmake_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Render the CMake snippet for `resolution`.
pub fn render(resolution: &Resolution) -> String {
    let deps = resolution.sorted();
    let mut out = String::new();

    out.push_str("# Generated by cforge - DO NOT EDIT MANUALLY\n\n");
    out.push_str("include(FetchContent)\n");

    let fetched: Vec<&ResolvedDependency> = deps.iter().copied().filter(|d| is_fetched(d)).collect();
    for dep in &fetched {
        let _ = writeln!(out);
        for (option, value) in &dep.options {
            let _ = writeln!(out, "set({} {} CACHE BOOL \"\" FORCE)", option, value);
        }

        let _ = writeln!(out, "FetchContent_Declare({}", dep.name);
        if let Some(url) = &dep.url {
            let _ = writeln!(out, "    GIT_REPOSITORY {}", url);
        }
        if let Some(git_ref) = dep.git_ref() {
            let _ = writeln!(out, "    GIT_TAG {}", git_ref);
        }
        // A shallow clone cannot reach an arbitrary commit.
        if dep.tag.is_some() || dep.commit.is_none() {
            out.push_str("    GIT_SHALLOW TRUE\n");
        }
        if let Some(subdir) = &dep.subdir {
            let _ = writeln!(out, "    SOURCE_SUBDIR {}", subdir);
        }
        out.push_str(")\n");
    }

    if !fetched.is_empty() {
        let names: Vec<&str> = fetched.iter().map(|d| d.name.as_str()).collect();
        let _ = writeln!(out, "\nFetchContent_MakeAvailable({})", names.join(" "));
    }

    for dep in &deps {
        match dep.kind() {
            SourceKind::System => {
                let package = dep.system_name.as_deref().unwrap_or(&dep.name);
                if dep.components.is_empty() {
                    let _ = writeln!(out, "find_package({} REQUIRED)", package);
                } else {
                    let _ = writeln!(
                        out,
                        "find_package({} REQUIRED COMPONENTS {})",
                        package,
                        dep.components.join(" ")
                    );
                }
            }
            SourceKind::Vcpkg => {
                let package = dep.vcpkg_name.as_deref().unwrap_or(&dep.name);
                let _ = writeln!(out, "find_package({} CONFIG REQUIRED)", package);
            }
            SourceKind::Project => {
                if let Some(path) = &dep.path {
                    let _ = writeln!(
                        out,
                        "add_subdirectory({} ${{CMAKE_BINARY_DIR}}/{}/{})",
                        cmake_path(path),
                        GENERATED_DIR,
                        dep.name
                    );
                }
            }
            SourceKind::Index | SourceKind::Git => {}
        }
    }

    let mut targets = Vec::new();
    let mut include_dirs = Vec::new();
    for dep in &deps {
        if !dep.link {
            continue;
        }
        let header_only = dep.header_only || dep.single_header.is_some();
        match (&dep.target, header_only && is_fetched(dep)) {
            (Some(target), _) => targets.push(target.clone()),
            (None, true) => include_dirs.push(format!(
                "${{{}_SOURCE_DIR}}/{}",
                content_var(&dep.name),
                dep.include_dir.as_deref().unwrap_or("include")
            )),
            (None, false) => targets.push(dep.name.clone()),
        }
    }

    if !targets.is_empty() {
        let _ = writeln!(
            out,
            "\ntarget_link_libraries(${{PROJECT_NAME}} PUBLIC {})",
            targets.join(" ")
        );
    }
    if !include_dirs.is_empty() {
        let _ = writeln!(
            out,
            "target_include_directories(${{PROJECT_NAME}} PUBLIC {})",
            include_dirs.join(" ")
        );
    }

    out
}

/// Write the snippet for `resolution` under `build_dir`.
pub fn write_dependencies(build_dir: &Path, resolution: &Resolution) -> Result<PathBuf> {
    let path = dependencies_path(build_dir);
    fs::write_atomic(&path, &render(resolution))?;
    tracing::debug!("wrote {}", path.display());
    Ok(path)
}
