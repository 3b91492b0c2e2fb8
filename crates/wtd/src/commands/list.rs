//! `wtd --list`/`--list-containers`: supplemented verbs (SPEC_FULL.md
//! §12.1) for inspecting what's under the cache root and in Docker.

use anyhow::Result;
use wtd_core::config::{ConfigOverrides, WtdConfig};
use wtd_core::docker::{CliDocker, ContainerOps, Docker};
use wtd_core::reconciler;

pub async fn run_list() -> Result<()> {
    let config = WtdConfig::from_env(ConfigOverrides::default());
    let entries = reconciler::list_worktree_entries(&config.cache_dir)?;
    if entries.is_empty() {
        println!("no worktrees under {}", config.cache_dir.display());
        return Ok(());
    }

    let docker = CliDocker::new();
    for entry in entries {
        let image_present = docker.image_present(&entry.image_tag_base).await.unwrap_or(false);
        let image = if image_present { entry.image_tag_base.as_str() } else { "(not built)" };
        let state = docker
            .container_state(&entry.container_name)
            .await
            .unwrap_or(wtd_core::docker::ContainerState::Absent);
        println!(
            "{}/{} ({})  image: {image}  container: {state:?}",
            entry.owner, entry.repo, entry.safe_branch
        );
    }
    Ok(())
}

pub async fn run_list_containers() -> Result<()> {
    use wtd_core::docker::DockerLifecycle;
    let docker = CliDocker::new();
    // Reuse prune_all's discovery query path without actually removing
    // anything: list the same `wtd=1`-labeled containers.
    let names = docker.list_managed().await?;
    if names.is_empty() {
        println!("no wtd-managed containers");
        return Ok(());
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}
