//! Command-line surface. See spec.md §6 for the canonical flag table and
//! SPEC_FULL.md §12 for the supplemented verbs (`--list`,
//! `--list-containers`, `doctor`).

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(name = "wtd", version, about = "Reconcile a git worktree and its dev container")]
pub struct Cli {
    #[command(flatten)]
    pub up: UpArgs,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Logging verbosity, also settable via RUST_LOG.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Write a completion script for the shell named by `$SHELL` under the
    /// user's home directory, then exit. Exits 2 if `$SHELL` isn't one of
    /// bash/zsh/fish.
    #[arg(long)]
    pub install: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Remove a worktree and its container without touching the bare mirror.
    Prune(PruneArgs),
    /// List known worktrees under the cache root.
    List,
    /// List containers managed by wtd.
    ListContainers,
    /// List the effective extension catalog for a worktree.
    ExtList(ExtListArgs),
    /// Check that git and docker are reachable and report their versions.
    Doctor,
    /// Emit a shell completion script for an explicit shell to stdout.
    Completions { shell: Shell },
}

#[derive(Debug, Args)]
pub struct UpArgs {
    /// `owner/repo[@branch][#subfolder]`. Omit to pick interactively.
    pub spec: Option<String>,

    /// A command to run non-interactively inside the container instead of
    /// attaching a shell, e.g. `wtd owner/repo -- pytest -q`.
    #[arg(last = true)]
    pub exec_command: Vec<String>,

    /// Force a full rebuild, bypassing the build engine's layer cache.
    #[arg(long)]
    pub rebuild: bool,

    /// Disable the build engine's layer cache without forcing a rebuild salt.
    #[arg(long)]
    pub nocache: bool,

    /// Drop the `gui` extension even if auto-detected.
    #[arg(long)]
    pub no_gui: bool,

    /// Drop the `gpu` extension even if auto-detected.
    #[arg(long)]
    pub no_gpu: bool,

    /// Stop after ensuring the worktree exists; skip image/container work.
    #[arg(long)]
    pub no_container: bool,

    /// Like `--no-container`, but also chdir into the worktree and exec the
    /// trailing command (or an interactive shell) on the host instead of
    /// inside a container.
    #[arg(long, visible_alias = "wt")]
    pub no_docker: bool,

    /// Request an extension explicitly, in addition to auto-detected ones.
    /// Repeatable.
    #[arg(short = 'e', long = "extension")]
    pub extensions: Vec<String>,

    /// Override the docker buildx builder name.
    #[arg(long)]
    pub builder: Option<String>,

    /// Override target platforms passed to the build engine.
    #[arg(long)]
    pub platforms: Option<String>,

    /// Print the planned action sequence without touching git or docker.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct PruneArgs {
    /// Prune only this specifier's worktree and container; omit to prune all.
    pub spec: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExtListArgs {
    /// Worktree root to evaluate auto-detection against.
    pub worktree: Option<std::path::PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_bare_spec() {
        let cli = Cli::parse_from(["wtd", "blooop/test_wtd"]);
        assert_eq!(cli.up.spec.as_deref(), Some("blooop/test_wtd"));
        assert!(cli.up.exec_command.is_empty());
    }

    #[test]
    fn parses_trailing_exec_command() {
        let cli = Cli::parse_from(["wtd", "blooop/test_wtd", "--", "pytest", "-q"]);
        assert_eq!(cli.up.exec_command, vec!["pytest".to_string(), "-q".to_string()]);
    }

    #[test]
    fn parses_repeated_extension_flags() {
        let cli = Cli::parse_from(["wtd", "blooop/test_wtd", "-e", "python", "-e", "node"]);
        assert_eq!(cli.up.extensions, vec!["python".to_string(), "node".to_string()]);
    }

    #[test]
    fn parses_prune_subcommand() {
        let cli = Cli::parse_from(["wtd", "prune", "blooop/test_wtd"]);
        assert!(matches!(cli.command, Some(Command::Prune(_))));
    }

    #[test]
    fn no_container_and_no_docker_are_distinct_flags() {
        let cli = Cli::parse_from(["wtd", "blooop/test_wtd", "--no-docker"]);
        assert!(cli.up.no_docker);
        assert!(!cli.up.no_container);
    }

    #[test]
    fn no_docker_accepts_wt_alias() {
        let cli = Cli::parse_from(["wtd", "blooop/test_wtd", "--wt"]);
        assert!(cli.up.no_docker);
    }

    #[test]
    fn install_is_a_top_level_flag() {
        let cli = Cli::parse_from(["wtd", "--install"]);
        assert!(cli.install);
    }
}
