//! Default verb: reconcile a specifier into a running container and
//! attach, or run a one-shot command inside it. See spec.md §8.

use crate::cli::UpArgs;
use crate::picker;
use anyhow::{Context, Result};
use wtd_core::catalog::ExtensionCatalog;
use wtd_core::config::{ConfigOverrides, WtdConfig};
use wtd_core::docker::CliDocker;
use wtd_core::paths::PathModel;
use wtd_core::reconciler::{self, Action};
use wtd_core::spec::RepoSpecifier;

pub async fn run(args: UpArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        builder: args.builder.clone(),
        platforms: args.platforms.clone(),
        rebuild: args.rebuild,
        nocache: args.nocache,
        no_gui: args.no_gui,
        no_gpu: args.no_gpu,
        no_container: args.no_container || args.no_docker,
        dry_run: args.dry_run,
        ..Default::default()
    };
    let config = WtdConfig::from_env(overrides);

    let raw_spec = match args.spec {
        Some(s) => s,
        None => {
            let known = reconciler::list_worktrees(&config.cache_dir).unwrap_or_default();
            picker::pick(known).context("no specifier given and nothing was picked")?
        }
    };
    let spec = RepoSpecifier::parse(&raw_spec)?;
    let model = PathModel::new(&config.cache_dir, &spec);

    // `discover` tolerates a nonexistent worktree root: repo-local
    // extensions just come up empty and only built-ins are seeded, which
    // is correct for a worktree that `reconcile` hasn't created yet.
    let catalog = ExtensionCatalog::discover(&model.effective_workdir)?;

    let docker = CliDocker::new();
    // Join then re-split with shell-word rules: whether the trailing
    // command arrived pre-split by the caller's shell (`-- pytest -q`)
    // or as one quoted string (`"bash -c '...'"`), this normalizes both
    // to the argv docker exec expects.
    let exec_argv = if args.exec_command.is_empty() {
        Vec::new()
    } else {
        shell_words::split(&args.exec_command.join(" "))
            .context("could not parse the trailing command as shell words")?
    };
    let exec_command = if exec_argv.is_empty() { None } else { Some(exec_argv.as_slice()) };

    let plan = reconciler::reconcile(&spec, &config, &catalog, &docker, &args.extensions, exec_command).await?;

    if config.dry_run {
        println!("planned actions for {raw_spec}:");
        for action in &plan.actions {
            println!("  - {}", describe(action));
        }
        if let Some(build_plan) = &plan.build_plan {
            println!("image tag: {}", build_plan.image_tag);
        }
        return Ok(());
    }

    if args.no_docker {
        return exec_on_host(&model.worktree_path, &exec_argv);
    }

    Ok(())
}

/// `--no-docker`'s divergence from `--no-container`: chdir into the
/// worktree and hand the process over to the trailing command (or the
/// user's shell if none was given), on the host rather than in a
/// container.
fn exec_on_host(worktree_path: &std::path::Path, exec_argv: &[String]) -> Result<()> {
    use std::os::unix::process::CommandExt;

    std::env::set_current_dir(worktree_path)
        .with_context(|| format!("could not chdir into {}", worktree_path.display()))?;

    let err = if exec_argv.is_empty() {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        std::process::Command::new(shell).exec()
    } else {
        std::process::Command::new(&exec_argv[0]).args(&exec_argv[1..]).exec()
    };

    Err(err).context("failed to exec command on host")
}

fn describe(action: &Action) -> &'static str {
    match action {
        Action::CloneBare => "clone bare mirror",
        Action::RefreshBare => "refresh bare mirror",
        Action::CreateWorktree => "create worktree",
        Action::BuildImage => "build image",
        Action::CreateContainer => "create container",
        Action::RecreateStaleContainer => "stop and recreate stale container",
        Action::StartAndAttach => "start and attach",
        Action::ExecInRunningContainer => "exec in running container",
        Action::Cancelled => "cancelled",
    }
}
