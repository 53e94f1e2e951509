//! Remote operations on the package index repository.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::util::process::ProcessBuilder;

/// Time allowed for a fast-forward refresh of an existing mirror.
pub const PULL_TIMEOUT: Duration = Duration::from_secs(60);

/// Time allowed for a fresh shallow clone.
pub const CLONE_TIMEOUT: Duration = Duration::from_secs(120);

/// Fetches the package index from its upstream.
pub trait IndexRemote {
    /// Fast-forward an existing mirror in place.
    fn pull(&self, mirror: &Path) -> Result<()>;

    /// Shallow-clone `url` into `dest`, which must not exist.
    fn clone_into(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Index remote backed by the `git` command line.
#[derive(Debug, Clone, Default)]
pub struct GitIndexRemote;

impl IndexRemote for GitIndexRemote {
    fn pull(&self, mirror: &Path) -> Result<()> {
        ProcessBuilder::new("git")
            .args(["pull", "--quiet"])
            .cwd(mirror)
            .env("GIT_TERMINAL_PROMPT", "0")
            .timeout(PULL_TIMEOUT)
            .exec_and_check()?;
        Ok(())
    }

    fn clone_into(&self, url: &str, dest: &Path) -> Result<()> {
        ProcessBuilder::new("git")
            .args(["clone", "--quiet", "--depth", "1", url])
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .timeout(CLONE_TIMEOUT)
            .exec_and_check()?;
        Ok(())
    }
}
