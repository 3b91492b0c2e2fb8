//! Reconciler: the goal-state dispatch for one `wtd` invocation. See
//! spec.md §4.9.
//!
//! The teacher's `commands/up/mod.rs::execute_up_with_runtime` runs this
//! as one long imperative function. Per spec.md §9's redesign note, this
//! is restructured as an explicit state machine over
//! `(image present?, container present?, running?)`, so the minimal
//! action sequence for each combination is a lookup rather than buried
//! in conditionals.

use crate::buildplan::{self, BuildPlan};
use crate::catalog::ExtensionCatalog;
use crate::config::WtdConfig;
use crate::docker::{ContainerOps, ContainerSpec, ContainerState, Docker};
use crate::errors::Result;
use crate::git;
use crate::paths::PathModel;
use crate::resolver;
use crate::spec::RepoSpecifier;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// What the reconciler decided to do, for `--dry-run` reporting and
/// logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CloneBare,
    RefreshBare,
    CreateWorktree,
    BuildImage,
    CreateContainer,
    /// The existing container was built from a stage identity that no
    /// longer matches the resolved plan; it is stopped and removed before
    /// a fresh one is created.
    RecreateStaleContainer,
    StartAndAttach,
    ExecInRunningContainer,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub build_plan: Option<BuildPlan>,
}

/// Reconcile the desired state for `spec` against what's observed on
/// disk and in Docker, and either execute the plan or (with
/// `config.dry_run`) just return it.
#[instrument(skip(config, docker, catalog, exec_command))]
pub async fn reconcile<D>(
    spec: &RepoSpecifier,
    config: &WtdConfig,
    catalog: &ExtensionCatalog,
    docker: &D,
    user_requested_extensions: &[String],
    exec_command: Option<&[String]>,
) -> Result<Plan>
where
    D: Docker + ContainerOps,
{
    let model = PathModel::new(&config.cache_dir, spec);
    let mut actions = Vec::new();

    if !model.bare_path.join("HEAD").is_file() {
        actions.push(Action::CloneBare);
        if !config.dry_run {
            git::ensure_bare(&model.bare_path, spec)?;
        }
    } else {
        actions.push(Action::RefreshBare);
        if !config.dry_run {
            git::refresh(&model.bare_path, Duration::from_secs(config.fetch_ttl_secs))?;
        }
    }

    if !model.worktree_path.is_dir() {
        actions.push(Action::CreateWorktree);
    }
    if !config.dry_run {
        git::ensure_worktree(&model.bare_path, &model.worktree_path, spec)?;
        ensure_gitignore(&model.worktree_path)?;
    }

    if config.no_container {
        info!("--no-container set, stopping after worktree readiness");
        return Ok(Plan {
            actions,
            build_plan: None,
        });
    }

    let resolved = resolver::resolve(
        catalog,
        &model.effective_workdir,
        user_requested_extensions,
        config.no_gui,
        config.no_gpu,
    )?;

    let rebuild_salt = config.rebuild.then(|| fastrand::u64(..).to_string());
    let plan = buildplan::build(
        catalog,
        &resolved,
        &config.base_image,
        &model.image_tag_base,
        rebuild_salt.as_deref(),
    )?;

    let image_present = !config.dry_run && docker.image_present(&plan.image_tag).await?;
    let needs_build = config.rebuild || !image_present;

    if needs_build {
        actions.push(Action::BuildImage);
        if !config.dry_run {
            buildplan::write_plan(
                &plan,
                &model.dockerfile_path(),
                &model.bake_path(),
                &model.compose_path(),
                &model.buildx_cache_dir(),
            )?;
            docker
                .build(
                    &model.dockerfile_path(),
                    &model.worktree_path,
                    &plan.image_tag,
                    config.nocache,
                )
                .await?;
        }
    }

    let final_identity = plan.stages.last().map(|s| s.identity.clone()).unwrap_or_default();

    let state = if config.dry_run {
        ContainerState::Absent
    } else {
        docker.container_state(&model.container_name).await?
    };

    let make_container_spec = |plan: &BuildPlan| ContainerSpec {
        container_name: model.container_name.clone(),
        image_tag: plan.image_tag.clone(),
        workspace_host_path: model.effective_workdir.clone(),
        workspace_container_path: "/workspace".to_string(),
        spec_label: format!("{}/{}@{}", spec.owner, spec.repo, spec.branch),
        ssh_auth_sock: config.ssh_auth_sock.clone(),
        mount_gitconfig: true,
        service_description: plan.service_description.clone(),
        stage_identity: final_identity.clone(),
    };

    match state {
        ContainerState::Absent => {
            actions.push(Action::CreateContainer);
            actions.push(Action::StartAndAttach);
            if !config.dry_run {
                docker.create(&make_container_spec(&plan)).await?;
                dispatch_attach_or_exec(docker, &model, exec_command).await?;
            }
        }
        ContainerState::Stopped | ContainerState::Running => {
            let existing_identity = if config.dry_run {
                None
            } else {
                docker.container_identity(&model.container_name).await?
            };

            if existing_identity.as_deref() != Some(final_identity.as_str()) {
                // The override clause in spec.md §4.9: an existing
                // container built from a different stage identity is
                // never silently reused, even if it happens to be running.
                actions.push(Action::RecreateStaleContainer);
                actions.push(Action::StartAndAttach);
                if !config.dry_run {
                    docker.remove(&model.container_name).await?;
                    docker.create(&make_container_spec(&plan)).await?;
                    dispatch_attach_or_exec(docker, &model, exec_command).await?;
                }
            } else if state == ContainerState::Stopped {
                actions.push(Action::StartAndAttach);
                if !config.dry_run {
                    dispatch_attach_or_exec(docker, &model, exec_command).await?;
                }
            } else {
                actions.push(Action::ExecInRunningContainer);
                if !config.dry_run {
                    dispatch_attach_or_exec(docker, &model, exec_command).await?;
                }
            }
        }
    }

    Ok(Plan {
        actions,
        build_plan: Some(plan),
    })
}

/// Add the generated build artifacts to the worktree's `.gitignore`,
/// preserving any existing content and appending only missing entries.
fn ensure_gitignore(worktree_path: &Path) -> Result<()> {
    let gitignore_path = worktree_path.join(".gitignore");
    let existing = std::fs::read_to_string(&gitignore_path).unwrap_or_default();
    let mut lines: Vec<&str> = existing.lines().collect();
    let mut changed = false;
    for entry in PathModel::generated_gitignore_entries() {
        if !lines.contains(entry) {
            lines.push(entry);
            changed = true;
        }
    }
    if changed {
        let mut content = lines.join("\n");
        content.push('\n');
        std::fs::write(&gitignore_path, content)?;
    }
    Ok(())
}

async fn dispatch_attach_or_exec<D: ContainerOps>(
    docker: &D,
    model: &PathModel,
    exec_command: Option<&[String]>,
) -> Result<()> {
    match exec_command {
        Some(command) if !command.is_empty() => docker.exec(&model.container_name, command).await,
        _ => docker.start_attach(&model.container_name).await,
    }
}

/// Prune the worktree (and, if legacy, the legacy-prefixed path) and its
/// container for `spec`, without touching the bare mirror.
#[instrument(skip(config, docker))]
pub async fn prune<D: DockerLifecycleLike>(spec: &RepoSpecifier, config: &WtdConfig, docker: &D) -> Result<()> {
    let model = PathModel::new(&config.cache_dir, spec);
    docker.prune_one(&model.container_name).await?;

    for candidate in [model.worktree_path.clone(), model.legacy_worktree_path(spec)] {
        if candidate.is_dir() {
            git::remove_worktree(&model.bare_path, &candidate)?;
        }
    }
    Ok(())
}

/// Local alias so `prune` doesn't need the full `Docker + ContainerOps`
/// bound just to remove one container.
pub trait DockerLifecycleLike: crate::docker::DockerLifecycle {}
impl<T: crate::docker::DockerLifecycle> DockerLifecycleLike for T {}

/// Full prune: remove every `wtd`-labeled container, then every worktree
/// (current and legacy-prefixed) under the cache root. Bare mirrors are
/// retained, per spec.md §8 scenario 5.
#[instrument(skip(config, docker))]
pub async fn prune_all<D: DockerLifecycleLike>(config: &WtdConfig, docker: &D) -> Result<Vec<String>> {
    let removed_containers = docker.prune_all().await?;

    let mut removed_worktrees = Vec::new();
    let workspaces = config.cache_dir.join("workspaces");
    if workspaces.is_dir() {
        for owner_entry in std::fs::read_dir(&workspaces)? {
            let owner_path = owner_entry?.path();
            if !owner_path.is_dir() {
                continue;
            }
            for repo_entry in std::fs::read_dir(&owner_path)? {
                let repo_path = repo_entry?.path();
                if !repo_path.is_dir() {
                    continue;
                }
                let bare_path = repo_path.join("bare");
                for wt_entry in std::fs::read_dir(&repo_path)? {
                    let wt_path = wt_entry?.path();
                    let Some(name) = wt_path.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    if !wt_path.is_dir() {
                        continue;
                    }
                    if name.starts_with(crate::paths::WORKTREE_PREFIX)
                        || name.starts_with(crate::paths::LEGACY_WORKTREE_PREFIX)
                    {
                        git::remove_worktree(&bare_path, &wt_path)?;
                        removed_worktrees.push(wt_path.display().to_string());
                    }
                }
            }
        }
    }

    info!(
        "pruned {} containers and {} worktrees",
        removed_containers.len(),
        removed_worktrees.len()
    );
    Ok(removed_worktrees)
}

/// One worktree found under the cache root: enough to label a `--list`
/// row and to re-derive its container name/image tag without a full
/// `RepoSpecifier` round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub owner: String,
    pub repo: String,
    /// The branch label baked into the worktree dir name (`/` already
    /// replaced by `-`; see `RepoSpecifier::safe_branch`).
    pub safe_branch: String,
    pub container_name: String,
    pub image_tag_base: String,
}

/// Walk the cache root and collect every current or legacy-prefixed
/// worktree, in owner/repo/branch order.
fn scan_worktree_entries(cache_root: &Path) -> Result<Vec<WorktreeEntry>> {
    let mut out = Vec::new();
    let workspaces = cache_root.join("workspaces");
    if !workspaces.is_dir() {
        return Ok(out);
    }
    for owner_entry in std::fs::read_dir(&workspaces)? {
        let owner_entry = owner_entry?;
        if !owner_entry.path().is_dir() {
            continue;
        }
        let owner = owner_entry.file_name().to_string_lossy().to_string();
        for repo_entry in std::fs::read_dir(owner_entry.path())? {
            let repo_entry = repo_entry?;
            if !repo_entry.path().is_dir() {
                continue;
            }
            let repo = repo_entry.file_name().to_string_lossy().to_string();
            for wt_entry in std::fs::read_dir(repo_entry.path())? {
                let wt_entry = wt_entry?;
                let name = wt_entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let safe_branch = if let Some(rest) = name.strip_prefix(crate::paths::WORKTREE_PREFIX) {
                    rest
                } else if let Some(rest) = name.strip_prefix(crate::paths::LEGACY_WORKTREE_PREFIX) {
                    rest
                } else {
                    continue;
                };
                let container_name = format!("{repo}-{safe_branch}");
                let image_tag_base = format!("{container_name}:latest");
                out.push(WorktreeEntry {
                    owner: owner.clone(),
                    repo: repo.clone(),
                    safe_branch: safe_branch.to_string(),
                    container_name,
                    image_tag_base,
                });
            }
        }
    }
    out.sort_by(|a, b| (&a.owner, &a.repo, &a.safe_branch).cmp(&(&b.owner, &b.repo, &b.safe_branch)));
    Ok(out)
}

/// Resolve which worktrees under the cache root are known to wtd, for
/// `--list`. See SPEC_FULL.md §12.1.
pub fn list_worktrees(cache_root: &Path) -> Result<Vec<String>> {
    Ok(scan_worktree_entries(cache_root)?
        .into_iter()
        .map(|e| format!("{}/{} (worktree-{})", e.owner, e.repo, e.safe_branch))
        .collect())
}

/// Structured variant of [`list_worktrees`] for `--list`'s
/// `(name, branch, image, container state)` reporting.
pub fn list_worktree_entries(cache_root: &Path) -> Result<Vec<WorktreeEntry>> {
    scan_worktree_entries(cache_root)
}
