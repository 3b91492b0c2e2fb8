//! Path model: a pure function of a [`RepoSpecifier`] plus a cache root.
//!
//! No I/O happens here; [`crate::git`] and [`crate::docker`] are
//! responsible for creating/observing what these paths name.

use crate::spec::RepoSpecifier;
use std::path::{Path, PathBuf};

pub const DOCKERFILE_NAME: &str = "Dockerfile";
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";
pub const BAKE_FILE_NAME: &str = "docker-bake.hcl";
pub const BUILDX_CACHE_DIR: &str = ".buildx-cache";

/// The legacy worktree-path template (`wt-<safe-branch>`) that `--prune`
/// must still recognize, per spec.md §9.
pub const LEGACY_WORKTREE_PREFIX: &str = "wt-";
pub const WORKTREE_PREFIX: &str = "worktree-";

/// All filesystem paths and runtime identifiers derived from a specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathModel {
    /// `<cache>/workspaces/<owner>/<repo>`
    pub repo_root: PathBuf,
    /// `<cache>/workspaces/<owner>/<repo>/bare`
    pub bare_path: PathBuf,
    /// `<cache>/workspaces/<owner>/<repo>/worktree-<safe-branch>`
    pub worktree_path: PathBuf,
    /// `worktree_path` joined with the optional subfolder.
    pub effective_workdir: PathBuf,
    /// `repo + "-" + safe-branch"`.
    pub container_name: String,
    /// `<container_name>:latest`, before any stage-identity suffix.
    pub image_tag_base: String,
}

impl PathModel {
    /// Derive all paths for `spec` rooted at `cache_root`.
    pub fn new(cache_root: &Path, spec: &RepoSpecifier) -> Self {
        let repo_root = cache_root
            .join("workspaces")
            .join(&spec.owner)
            .join(&spec.repo);
        let bare_path = repo_root.join("bare");
        let safe_branch = spec.safe_branch();
        let worktree_path = repo_root.join(format!("{WORKTREE_PREFIX}{safe_branch}"));
        let effective_workdir = match &spec.subfolder {
            Some(sub) => worktree_path.join(sub),
            None => worktree_path.clone(),
        };
        let container_name = spec.container_name();
        let image_tag_base = format!("{container_name}:latest");

        PathModel {
            repo_root,
            bare_path,
            worktree_path,
            effective_workdir,
            container_name,
            image_tag_base,
        }
    }

    pub fn dockerfile_path(&self) -> PathBuf {
        self.worktree_path.join(DOCKERFILE_NAME)
    }

    pub fn compose_path(&self) -> PathBuf {
        self.worktree_path.join(COMPOSE_FILE_NAME)
    }

    pub fn bake_path(&self) -> PathBuf {
        self.worktree_path.join(BAKE_FILE_NAME)
    }

    pub fn buildx_cache_dir(&self) -> PathBuf {
        self.worktree_path.join(BUILDX_CACHE_DIR)
    }

    /// The legacy `wt-<safe-branch>` path `--prune` must also match.
    pub fn legacy_worktree_path(&self, spec: &RepoSpecifier) -> PathBuf {
        self.repo_root
            .join(format!("{LEGACY_WORKTREE_PREFIX}{}", spec.safe_branch()))
    }

    /// Names that a generated `.gitignore` in the worktree must carry,
    /// per spec.md §6.
    pub fn generated_gitignore_entries() -> &'static [&'static str] {
        &[DOCKERFILE_NAME, COMPOSE_FILE_NAME, BAKE_FILE_NAME, BUILDX_CACHE_DIR]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::RepoSpecifier;
    use std::path::Path;

    #[test]
    fn derives_expected_layout() {
        let spec = RepoSpecifier::parse("blooop/test_wtd").unwrap();
        let model = PathModel::new(Path::new("/cache"), &spec);
        assert_eq!(
            model.bare_path,
            Path::new("/cache/workspaces/blooop/test_wtd/bare")
        );
        assert_eq!(
            model.worktree_path,
            Path::new("/cache/workspaces/blooop/test_wtd/worktree-main")
        );
        assert_eq!(model.container_name, "test_wtd-main");
        assert_eq!(model.image_tag_base, "test_wtd-main:latest");
    }

    #[test]
    fn safe_branch_replaces_slash_in_path() {
        let spec = RepoSpecifier::parse("blooop/test_wtd@feature/foo").unwrap();
        let model = PathModel::new(Path::new("/cache"), &spec);
        assert_eq!(
            model.worktree_path,
            Path::new("/cache/workspaces/blooop/test_wtd/worktree-feature-foo")
        );
        assert_eq!(model.container_name, "test_wtd-feature-foo");
    }

    #[test]
    fn subfolder_extends_effective_workdir() {
        let spec = RepoSpecifier::parse("blooop/test_wtd#services/api").unwrap();
        let model = PathModel::new(Path::new("/cache"), &spec);
        assert_eq!(
            model.effective_workdir,
            Path::new("/cache/workspaces/blooop/test_wtd/worktree-main/services/api")
        );
    }

    #[test]
    fn legacy_path_uses_wt_prefix() {
        let spec = RepoSpecifier::parse("blooop/test_wtd").unwrap();
        let model = PathModel::new(Path::new("/cache"), &spec);
        assert_eq!(
            model.legacy_worktree_path(&spec),
            Path::new("/cache/workspaces/blooop/test_wtd/wt-main")
        );
    }
}
