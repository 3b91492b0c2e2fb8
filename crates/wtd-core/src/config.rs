//! The single configuration record, threaded explicitly through every
//! component instead of being read from `std::env` ad hoc. See spec.md §9
//! ("Configuration structs").

use std::path::PathBuf;

/// Default base image. Documented in DESIGN.md as resolving a discrepancy
/// present in the original tool's own docs (`ubuntu:22.04` vs `:24.04`).
pub const DEFAULT_BASE_IMAGE: &str = "ubuntu:22.04";

/// Default fetch TTL in seconds (see SPEC_FULL.md §12.3).
pub const DEFAULT_FETCH_TTL_SECS: u64 = 300;

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct WtdConfig {
    /// Root of the cache tree (default `~/.wtd`).
    pub cache_dir: PathBuf,
    /// Base image for the root build stage.
    pub base_image: String,
    /// Optional registry used to salt/namespace cache-from/cache-to refs.
    pub cache_registry: Option<String>,
    /// `docker buildx` builder name, if the user wants a specific one.
    pub builder: Option<String>,
    /// Target platforms passed to the build engine.
    pub platforms: Option<String>,
    /// `SSH_AUTH_SOCK`, forwarded into created containers when present.
    pub ssh_auth_sock: Option<String>,
    /// Fetch TTL: skip `git fetch` if the bare was fetched more recently.
    pub fetch_ttl_secs: u64,
    /// Force a cache miss on the next build (`--rebuild`).
    pub rebuild: bool,
    /// Disable the build engine's own layer cache (`--nocache`).
    pub nocache: bool,
    /// Drop the GUI extension from the root request set (`--no-gui`).
    pub no_gui: bool,
    /// Drop the GPU extension from the root request set (`--no-gpu`).
    pub no_gpu: bool,
    /// Stop after worktree readiness (`--no-container`/`--no-docker`).
    pub no_container: bool,
    /// Print the planned action sequence without executing anything.
    pub dry_run: bool,
}

impl WtdConfig {
    /// Build a configuration from environment variables, applying the
    /// given CLI-derived overrides on top. This is the one place that
    /// reads `std::env` for these values.
    pub fn from_env(overrides: ConfigOverrides) -> Self {
        let cache_dir = overrides.cache_dir.unwrap_or_else(|| {
            std::env::var_os("WTD_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_cache_dir)
        });

        let base_image = overrides
            .base_image
            .or_else(|| std::env::var("WTD_BASE_IMAGE").ok())
            .unwrap_or_else(|| DEFAULT_BASE_IMAGE.to_string());

        let cache_registry = overrides
            .cache_registry
            .or_else(|| std::env::var("WTD_CACHE_REGISTRY").ok());

        let ssh_auth_sock = std::env::var("SSH_AUTH_SOCK").ok();

        let fetch_ttl_secs = std::env::var("WTD_FETCH_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_FETCH_TTL_SECS);

        WtdConfig {
            cache_dir,
            base_image,
            cache_registry,
            builder: overrides.builder,
            platforms: overrides.platforms,
            ssh_auth_sock,
            fetch_ttl_secs,
            rebuild: overrides.rebuild,
            nocache: overrides.nocache,
            no_gui: overrides.no_gui,
            no_gpu: overrides.no_gpu,
            no_container: overrides.no_container,
            dry_run: overrides.dry_run,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    directories_next::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".wtd"))
        .unwrap_or_else(|| PathBuf::from(".wtd"))
}

/// CLI-sourced overrides applied on top of environment defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub cache_dir: Option<PathBuf>,
    pub base_image: Option<String>,
    pub cache_registry: Option<String>,
    pub builder: Option<String>,
    pub platforms: Option<String>,
    pub rebuild: bool,
    pub nocache: bool,
    pub no_gui: bool,
    pub no_gpu: bool,
    pub no_container: bool,
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_image_is_ubuntu_2204() {
        // Clear the env var so this test is stable regardless of environment leakage.
        std::env::remove_var("WTD_BASE_IMAGE");
        let cfg = WtdConfig::from_env(ConfigOverrides::default());
        assert_eq!(cfg.base_image, "ubuntu:22.04");
    }

    #[test]
    fn override_wins_over_env() {
        let cfg = WtdConfig::from_env(ConfigOverrides {
            base_image: Some("ubuntu:24.04".to_string()),
            ..Default::default()
        });
        assert_eq!(cfg.base_image, "ubuntu:24.04");
    }
}
