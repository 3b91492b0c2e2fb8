//! `wtd --ext-list`: print the effective extension catalog and resolved
//! set for a worktree. See spec.md §6.

use crate::cli::ExtListArgs;
use anyhow::Result;
use wtd_core::catalog::ExtensionCatalog;
use wtd_core::resolver;

pub fn run(args: ExtListArgs) -> Result<()> {
    let root = args.worktree.unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let catalog = ExtensionCatalog::discover(&root)?;
    let resolved = resolver::resolve(&catalog, &root, &[], false, false)?;

    for manifest in catalog.iter() {
        let marker = if resolved.contains(&manifest.name) { "*" } else { " " };
        println!(
            "{marker} {:<20} {:<10} {}",
            manifest.name,
            if manifest.always_load { "always" } else { "auto" },
            manifest.description
        );
    }
    Ok(())
}
