//! Git coordinator: owns the bare mirror and the per-branch worktree.
//! See spec.md §4.2 and §4.8 (component 7).
//!
//! Shells out to the `git` binary rather than linking `git2`, matching
//! the subprocess style of `workspace.rs` and worktrunk's
//! `git/repository/mod.rs`. Never deletes a worktree: pruning is a
//! separate, explicit operation (`crate::reconciler`'s prune path).

use crate::errors::{Result, WtdError};
use crate::spec::RepoSpecifier;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument, warn};

const LAST_FETCH_FILE: &str = ".wtd-last-fetch";

fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<Output> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    debug!("running git {}", args.join(" "));
    cmd.output().map_err(|e| WtdError::GitFailure {
        cmd: format!("git {}", args.join(" ")),
        stderr: e.to_string(),
    })
}

fn require_success(args: &[&str], output: Output) -> Result<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(WtdError::GitFailure {
            cmd: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

const DEFAULT_REMOTE_TEMPLATE: &str = "git@github.com:{owner}/{repo}.git";

/// Build the clone URL for `spec`, defaulting to GitHub SSH per spec.md
/// §4.7 and overridable via `WTD_REMOTE_TEMPLATE` (with `{owner}`/`{repo}`
/// placeholders) for tests and alternate hosts.
fn remote_url(spec: &RepoSpecifier) -> String {
    let template = std::env::var("WTD_REMOTE_TEMPLATE").unwrap_or_else(|_| DEFAULT_REMOTE_TEMPLATE.to_string());
    template
        .replace("{owner}", &spec.owner)
        .replace("{repo}", &spec.repo)
}

/// Ensure the bare mirror exists at `bare_path`, cloning it if absent.
/// If it already exists, this only verifies it, it does not fetch:
/// fetching is [`refresh`]'s job so callers can respect the fetch TTL.
#[instrument(skip(spec))]
pub fn ensure_bare(bare_path: &Path, spec: &RepoSpecifier) -> Result<()> {
    if bare_path.join("HEAD").is_file() {
        debug!("bare mirror already present at {}", bare_path.display());
        return Ok(());
    }
    if let Some(parent) = bare_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!("cloning {} into {}", remote_url(spec), bare_path.display());
    let args = vec![
        "clone",
        "--bare",
        remote_url(spec).as_str(),
        bare_path.to_str().ok_or_else(|| WtdError::GitFailure {
            cmd: "git clone --bare".to_string(),
            stderr: "bare path is not valid UTF-8".to_string(),
        })?,
    ];
    let output = run_git(&args, None)?;
    require_success(&args, output)?;
    touch_last_fetch(bare_path)?;
    Ok(())
}

/// Fetch the bare mirror if the last fetch is older than `ttl`, or if no
/// fetch timestamp exists yet. A fetch failure is logged as a warning
/// and treated as non-fatal: an existing bare mirror is still usable
/// offline.
#[instrument(skip(ttl))]
pub fn refresh(bare_path: &Path, ttl: Duration) -> Result<()> {
    if let Some(last) = last_fetch_age(bare_path) {
        if last < ttl {
            debug!("skipping fetch, last fetch was {:?} ago (ttl {:?})", last, ttl);
            return Ok(());
        }
    }
    let args = vec!["fetch", "--prune"];
    match run_git(&args, Some(bare_path)) {
        Ok(output) if output.status.success() => {
            touch_last_fetch(bare_path)?;
        }
        Ok(output) => {
            warn!(
                "git fetch --prune failed, continuing with existing mirror: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Err(e) => {
            warn!("git fetch --prune could not run, continuing offline: {e}");
        }
    }
    Ok(())
}

fn last_fetch_age(bare_path: &Path) -> Option<Duration> {
    let marker = bare_path.join(LAST_FETCH_FILE);
    let modified = std::fs::metadata(marker).ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

fn touch_last_fetch(bare_path: &Path) -> Result<()> {
    let marker = bare_path.join(LAST_FETCH_FILE);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    std::fs::write(marker, now.to_string())?;
    Ok(())
}

/// Ensure a worktree for `spec.branch` exists at `worktree_path`,
/// checked out from `bare_path`. Creates the branch from the remote
/// default branch (tracked as `origin/HEAD`) if it doesn't exist yet.
///
/// Never removes or recreates an existing worktree: if `worktree_path`
/// exists but isn't registered with `bare_path`, this is a conflict the
/// caller must resolve manually rather than silently clobbering it.
#[instrument(skip(spec))]
pub fn ensure_worktree(bare_path: &Path, worktree_path: &Path, spec: &RepoSpecifier) -> Result<()> {
    if worktree_path.is_dir() {
        if is_registered_worktree(bare_path, worktree_path)? {
            debug!("worktree already present at {}", worktree_path.display());
            return Ok(());
        }
        return Err(WtdError::WorktreeConflict {
            path: worktree_path.display().to_string(),
        });
    }

    if let Some(parent) = worktree_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if branch_exists(bare_path, &spec.branch)? {
        let args = vec![
            "worktree",
            "add",
            path_str(worktree_path)?,
            spec.branch.as_str(),
        ];
        let output = run_git(&args, Some(bare_path))?;
        require_success(&args, output)?;
    } else {
        info!("branch '{}' does not exist, creating it from the default branch", spec.branch);
        let args = vec![
            "worktree",
            "add",
            "-b",
            spec.branch.as_str(),
            path_str(worktree_path)?,
        ];
        let output = run_git(&args, Some(bare_path))?;
        require_success(&args, output)?;

        let push_args = vec!["push", "-u", "origin", spec.branch.as_str()];
        if let Ok(output) = run_git(&push_args, Some(worktree_path)) {
            if !output.status.success() {
                warn!(
                    "could not push new branch '{}' upstream: {}",
                    spec.branch,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
        }
    }

    Ok(())
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| WtdError::GitFailure {
        cmd: "git worktree add".to_string(),
        stderr: format!("path is not valid UTF-8: {}", path.display()),
    })
}

fn branch_exists(bare_path: &Path, branch: &str) -> Result<bool> {
    let args = vec!["rev-parse", "--verify", "--quiet", branch];
    let output = run_git(&args, Some(bare_path))?;
    Ok(output.status.success())
}

fn is_registered_worktree(bare_path: &Path, worktree_path: &Path) -> Result<bool> {
    let args = vec!["worktree", "list", "--porcelain"];
    let output = run_git(&args, Some(bare_path))?;
    let output = require_success(&args, output)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let canonical = std::fs::canonicalize(worktree_path).unwrap_or_else(|_| worktree_path.to_path_buf());
    Ok(stdout.lines().any(|line| {
        line.strip_prefix("worktree ")
            .map(PathBuf::from)
            .map(|p| std::fs::canonicalize(&p).unwrap_or(p) == canonical)
            .unwrap_or(false)
    }))
}

/// Remove a worktree registration and its directory. Only ever invoked
/// explicitly from the prune path, never from the reconcile-and-launch
/// path.
#[instrument]
pub fn remove_worktree(bare_path: &Path, worktree_path: &Path) -> Result<()> {
    let args_vec = vec![
        "worktree".to_string(),
        "remove".to_string(),
        "--force".to_string(),
        worktree_path.display().to_string(),
    ];
    let args: Vec<&str> = args_vec.iter().map(|s| s.as_str()).collect();
    let output = run_git(&args, Some(bare_path))?;
    require_success(&args, output)?;
    Ok(())
}
