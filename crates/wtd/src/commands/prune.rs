//! `wtd --prune [spec]`: with a specifier, remove only the artifacts
//! whose `wtd.spec` label matches it; without one, remove everything
//! under the `wtd=1` label and every worktree under the cache root. The
//! bare mirrors are always retained. See spec.md §4.8 and §8 scenario 5.

use crate::cli::PruneArgs;
use anyhow::Result;
use wtd_core::config::{ConfigOverrides, WtdConfig};
use wtd_core::docker::CliDocker;
use wtd_core::reconciler;
use wtd_core::spec::RepoSpecifier;

pub async fn run(args: PruneArgs) -> Result<()> {
    let config = WtdConfig::from_env(ConfigOverrides::default());
    let docker = CliDocker::new();

    match args.spec {
        Some(raw) => {
            let spec = RepoSpecifier::parse(&raw)?;
            reconciler::prune(&spec, &config, &docker).await?;
            println!("pruned {raw}");
        }
        None => {
            let removed = reconciler::prune_all(&config, &docker).await?;
            println!("pruned {} worktree(s)", removed.len());
            for entry in &removed {
                println!("  - {entry}");
            }
        }
    }

    Ok(())
}
