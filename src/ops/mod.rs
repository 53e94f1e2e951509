//! High-level operations.
//!
//! This module contains the implementation of cforge commands.

pub mod cforge_add;
pub mod cforge_build;
pub mod cforge_deps;
pub mod fetch_content;
pub mod lockfile;

pub use cforge_add::{add_dependency, remove_dependency, AddOptions, AddResult, AddSource};
pub use cforge_build::{build, BuildOptions, BuildResult};
pub use cforge_deps::{
    describe_spec, info_lines, lock, open_registry, outdated, resolve_with_progress, tree_lines,
    update_index, LockOptions, LockOutcome, Outdated, Project,
};
pub use lockfile::{Git2Inspector, LockedDependency, Lockfile, LockfileError, RepoInspector};
