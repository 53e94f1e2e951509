//! `cforge lock` command

use anyhow::{bail, Result};

use crate::cli::LockArgs;
use crate::GlobalOptions;
use cforge::ops::cforge_deps::{lock, open_registry, LockOptions, LockOutcome, Project};
use cforge::ops::lockfile::{Git2Inspector, LockfileError};
use cforge::resolver::Resolver;
use cforge::sources::Registry;
use cforge::util::diagnostic;
use cforge::util::shell::Status;

pub fn execute(args: LockArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let shell = &opts.shell;
    let project = Project::load(&ctx)?;
    let path = project.lockfile_path();

    let lock_opts = LockOptions {
        force: args.force,
        verify: args.verify,
        clean: args.clean,
    };

    // Only generation consults the index.
    let generating = !args.clean && !args.verify && (args.force || !path.exists());
    let registry = if generating {
        open_registry(&ctx, shell)?
    } else {
        Registry::from_context(&ctx)
    };
    let mut resolver = Resolver::new(registry);

    if generating {
        shell.status(Status::Locking, project.name());
    }

    match lock(&project, &mut resolver, &Git2Inspector, lock_opts)? {
        LockOutcome::Removed(true) => shell.status(Status::Removed, path.display()),
        LockOutcome::Removed(false) => shell.note("no lock file to remove"),
        LockOutcome::Generated(lockfile) if lockfile.is_empty() => {
            shell.note("no dependencies to lock")
        }
        LockOutcome::Generated(lockfile) => shell.status(
            Status::Locked,
            format!("{} dependencies in {}", lockfile.len(), path.display()),
        ),
        LockOutcome::Verified {
            requested,
            mismatches,
        } => {
            if !requested {
                let exists = LockfileError::Exists { path: path.clone() };
                diagnostic::emit(&exists.to_diagnostic(), shell.use_color());
            }
            shell.status(Status::Verifying, path.display());
            if !mismatches.is_empty() {
                for mismatch in &mismatches {
                    diagnostic::emit(&mismatch.to_diagnostic(), shell.use_color());
                }
                bail!(
                    "{} {} not match the lock file",
                    mismatches.len(),
                    if mismatches.len() == 1 {
                        "dependency does"
                    } else {
                        "dependencies do"
                    }
                );
            }
        }
    }

    shell.status(Status::Finished, format!("lock for `{}`", project.name()));
    Ok(())
}
