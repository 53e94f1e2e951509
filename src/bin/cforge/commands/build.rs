//! `cforge build` command

use anyhow::Result;

use crate::cli::BuildArgs;
use crate::GlobalOptions;
use cforge::ops::cforge_build::{build, BuildOptions};
use cforge::util::shell::Status;

pub fn execute(args: BuildArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;

    let build_opts = BuildOptions {
        release: args.release,
        jobs: args.jobs,
        configure_only: args.configure_only,
    };

    let result = build(&ctx, &opts.shell, &build_opts)?;

    tracing::debug!(
        "{} dependencies, build directory {}",
        result.dependencies,
        result.build_dir.display()
    );
    opts.shell.status(
        Status::Finished,
        format!(
            "`{}` profile in {:.2}s",
            build_opts.profile().to_lowercase(),
            result.elapsed.as_secs_f64()
        ),
    );

    Ok(())
}
