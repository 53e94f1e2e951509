//! cforge CLI - a project manager for C and C++

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cforge::core::ManifestError;
use cforge::ops::LockfileError;
use cforge::resolver::ResolveError;
use cforge::sources::registry::IndexError;
use cforge::util::diagnostic::{self, suggestions, Diagnostic};
use cforge::util::{GlobalContext, Shell};
use cli::{Cli, Commands, DepsCommand};

/// Options shared by every command.
pub struct GlobalOptions {
    pub shell: Arc<Shell>,
    pub verbose: bool,
}

impl GlobalOptions {
    /// Context for the current directory with the CLI's output settings.
    pub fn context(&self) -> Result<GlobalContext> {
        let mut ctx = GlobalContext::new()?;
        ctx.set_verbose(self.verbose);
        ctx.set_color(self.shell.use_color());
        Ok(ctx)
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("cforge=debug")
    } else if cli.quiet {
        EnvFilter::new("cforge=error")
    } else {
        EnvFilter::new("cforge=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let opts = GlobalOptions {
        shell: Arc::new(Shell::from_flags(cli.quiet, cli.verbose, cli.color)),
        verbose: cli.verbose,
    };

    if let Err(e) = run(cli.command, &opts) {
        report(&e, &opts.shell);
        std::process::exit(1);
    }
}

fn run(command: Commands, opts: &GlobalOptions) -> Result<()> {
    match command {
        Commands::Build(args) => commands::build::execute(args, opts),
        Commands::Lock(args) => commands::lock::execute(args, opts),
        Commands::Deps(args) => match args.command {
            DepsCommand::Add(args) => commands::deps::add(args, opts),
            DepsCommand::Remove(args) => commands::deps::remove(args, opts),
            DepsCommand::Update(args) => commands::deps::update(args, opts),
            DepsCommand::Search(args) => commands::deps::search(args, opts),
            DepsCommand::Info(args) => commands::deps::info(args, opts),
            DepsCommand::Tree => commands::deps::tree(opts),
            DepsCommand::Lock(args) => commands::lock::execute(args, opts),
            DepsCommand::Outdated => commands::deps::outdated(opts),
            DepsCommand::List => commands::deps::list(opts),
        },
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Print `err`, as a diagnostic when its type carries remedial hints.
fn report(err: &anyhow::Error, shell: &Shell) {
    let color = shell.use_color();
    let diag = if let Some(e) = err.downcast_ref::<ResolveError>() {
        Some(e.to_diagnostic())
    } else if let Some(e) = err.downcast_ref::<LockfileError>() {
        Some(e.to_diagnostic())
    } else if let Some(e @ ManifestError::NotFound { .. }) = err.downcast_ref::<ManifestError>() {
        Some(Diagnostic::error(e.to_string()).with_suggestion(suggestions::NO_MANIFEST))
    } else if let Some(e) = err.downcast_ref::<IndexError>() {
        Some(Diagnostic::error(e.to_string()).with_suggestion(suggestions::REFRESH_INDEX))
    } else {
        None
    };

    match diag {
        Some(diag) => diagnostic::emit(&diag, color),
        None => eprintln!("error: {:#}", err),
    }
}
