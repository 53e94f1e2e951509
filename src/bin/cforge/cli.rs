//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell as CompletionShell;

use cforge::util::shell::ColorChoice;

/// cforge - a project manager for C and C++
#[derive(Parser)]
#[command(name = "cforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    pub color: ColorChoice,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve dependencies, generate CMake glue and build
    Build(BuildArgs),

    /// Generate, verify or remove cforge.lock
    Lock(LockArgs),

    /// Manage dependencies
    Deps(DepsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Build in release mode
    #[arg(short, long)]
    pub release: bool,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Configure only, do not compile
    #[arg(long)]
    pub configure_only: bool,
}

#[derive(Args, Clone, Copy)]
pub struct LockArgs {
    /// Overwrite an existing lock file
    #[arg(long, conflicts_with_all = ["verify", "clean"])]
    pub force: bool,

    /// Check fetched dependencies against the lock file
    #[arg(long, conflicts_with = "clean")]
    pub verify: bool,

    /// Remove the lock file
    #[arg(long)]
    pub clean: bool,
}

#[derive(Args)]
pub struct DepsArgs {
    #[command(subcommand)]
    pub command: DepsCommand,
}

#[derive(Subcommand)]
pub enum DepsCommand {
    /// Add a dependency to cforge.toml
    Add(AddArgs),

    /// Remove a dependency from cforge.toml
    Remove(RemoveArgs),

    /// Refresh the package index
    Update(UpdateArgs),

    /// Search the package index
    Search(SearchArgs),

    /// Show details about a package
    Info(InfoArgs),

    /// Display the resolved dependency tree
    Tree,

    /// Alias for `cforge lock`
    Lock(LockArgs),

    /// List index dependencies with newer versions
    Outdated,

    /// List declared dependencies
    List,
}

#[derive(Args)]
pub struct AddArgs {
    /// Package name, optionally with a version: `fmt@11.*`
    pub package: String,

    /// Git repository URL
    #[arg(long, conflicts_with_all = ["vcpkg", "system", "path"])]
    pub git: Option<String>,

    /// Git tag
    #[arg(long, requires = "git")]
    pub tag: Option<String>,

    /// Git branch
    #[arg(long, requires = "git")]
    pub branch: Option<String>,

    /// Git commit
    #[arg(long, requires = "git")]
    pub commit: Option<String>,

    /// Install through vcpkg
    #[arg(long, conflicts_with_all = ["system", "path"])]
    pub vcpkg: bool,

    /// vcpkg triplet
    #[arg(long, requires = "vcpkg")]
    pub triplet: Option<String>,

    /// Locate on the host with find_package
    #[arg(long, conflicts_with = "path")]
    pub system: bool,

    /// Local project directory
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Features to enable, comma separated
    #[arg(long, value_delimiter = ',')]
    pub features: Vec<String>,

    /// Do not enable the package's default features
    #[arg(long)]
    pub no_default_features: bool,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Dependency name
    pub name: String,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Refresh even when the index is fresh
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Maximum number of results
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Package name
    pub name: String,

    /// Show every version
    #[arg(long)]
    pub versions: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: CompletionShell,
}
