//! `cforge deps` subcommands

use std::collections::HashMap;

use anyhow::Result;

use crate::cli::{AddArgs, InfoArgs, RemoveArgs, SearchArgs, UpdateArgs};
use crate::GlobalOptions;
use cforge::core::PackageDefinition;
use cforge::ops::cforge_add::{add_dependency, remove_dependency, AddOptions, AddSource};
use cforge::ops::cforge_deps::{
    describe_spec, info_lines, open_registry, outdated as find_outdated, resolve_with_progress,
    tree_lines, update_index, Project,
};
use cforge::ops::lockfile::Lockfile;
use cforge::resolver::{ResolveError, Resolver};
use cforge::sources::Registry;
use cforge::util::shell::Status;

pub fn add(args: AddArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let manifest_path = ctx.find_manifest()?;

    let mut add = AddOptions::from_requirement(&args.package);
    add.features = args.features;
    add.no_default_features = args.no_default_features;
    add.source = if let Some(url) = args.git {
        AddSource::Git {
            url,
            tag: args.tag,
            branch: args.branch,
            commit: args.commit,
        }
    } else if args.vcpkg {
        AddSource::Vcpkg {
            triplet: args.triplet,
        }
    } else if args.system {
        AddSource::System
    } else if let Some(path) = args.path {
        AddSource::Path(path.to_string_lossy().replace('\\', "/"))
    } else {
        AddSource::Index
    };

    let result = if add.source == AddSource::Index {
        let mut registry = open_registry(&ctx, &opts.shell)?;
        add_dependency(&manifest_path, &add, &mut registry)?
    } else {
        let mut none: HashMap<String, PackageDefinition> = HashMap::new();
        add_dependency(&manifest_path, &add, &mut none)?
    };

    let status = if result.replaced {
        Status::Updated
    } else {
        Status::Added
    };
    opts.shell.status(
        status,
        format!("{} {} ({})", result.name, result.requirement, result.kind),
    );
    finished(opts, "add");
    Ok(())
}

pub fn remove(args: RemoveArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let manifest_path = ctx.find_manifest()?;

    if remove_dependency(&manifest_path, &args.name)? {
        opts.shell.status(Status::Removed, &args.name);
    } else {
        opts.shell
            .warn(format!("dependency `{}` is not declared in {}", args.name, manifest_path.display()));
    }
    finished(opts, "remove");
    Ok(())
}

pub fn update(args: UpdateArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let mut registry = Registry::from_context(&ctx);
    update_index(&mut registry, &opts.shell, args.force)?;
    finished(opts, "update");
    Ok(())
}

pub fn search(args: SearchArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let registry = open_registry(&ctx, &opts.shell)?;

    let hits = registry.index().search(&args.query, args.limit);
    if hits.is_empty() {
        opts.shell.note(format!("no packages match `{}`", args.query));
    }
    for hit in &hits {
        if hit.description.is_empty() {
            opts.shell.print(&hit.name);
        } else {
            opts.shell.print(format!("{:<24} {}", hit.name, hit.description));
        }
    }
    finished(opts, "search");
    Ok(())
}

pub fn info(args: InfoArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let mut registry = open_registry(&ctx, &opts.shell)?;

    let Some(package) = registry.load(&args.name)? else {
        return Err(ResolveError::UnknownPackage { package: args.name }.into());
    };

    for line in info_lines(&package, args.versions) {
        opts.shell.print(line);
    }
    finished(opts, "info");
    Ok(())
}

pub fn tree(opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let project = Project::load(&ctx)?;
    let registry = open_registry(&ctx, &opts.shell)?;
    let mut resolver = Resolver::new(registry);

    let resolution = resolve_with_progress(&mut resolver, &project.specs, &opts.shell)?;
    for line in tree_lines(&project.name(), &resolution) {
        opts.shell.print(line);
    }
    finished(opts, "tree");
    Ok(())
}

pub fn outdated(opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let project = Project::load(&ctx)?;
    let lock = Lockfile::load(&project.lockfile_path())?;
    let registry = open_registry(&ctx, &opts.shell)?;
    let mut resolver = Resolver::new(registry);

    let behind = find_outdated(&project.specs, lock.as_ref(), &mut resolver)?;
    if behind.is_empty() {
        opts.shell.status(Status::Fresh, "all index dependencies are up to date");
    } else {
        opts.shell.print(format!(
            "{:<20} {:<12} {:<12} {}",
            "name", "current", "latest", "requirement"
        ));
        for entry in &behind {
            let mut line = format!(
                "{:<20} {:<12} {:<12} {}",
                entry.name, entry.current, entry.latest, entry.requirement
            );
            if !entry.within_requirement() {
                line.push_str(" (excludes latest)");
            }
            opts.shell.print(line);
        }
    }
    finished(opts, "outdated");
    Ok(())
}

pub fn list(opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let project = Project::load(&ctx)?;

    if project.specs.is_empty() {
        opts.shell.note("no dependencies declared");
    }
    for spec in &project.specs {
        opts.shell.print(describe_spec(spec));
    }
    finished(opts, "list");
    Ok(())
}

fn finished(opts: &GlobalOptions, command: &str) {
    opts.shell.status(Status::Finished, format!("deps {}", command));
}
