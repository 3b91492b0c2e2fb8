//! Cross-module scenario: the reconciler's dispatch over the
//! (image present?, container present?, running?) state table, against a
//! fake `Docker`/`ContainerOps` so no real daemon is required. Git state
//! is pre-seeded on disk so `ensure_bare`/`ensure_worktree` find
//! everything already present and never touch the network.

use async_trait::async_trait;
use serial_test::serial;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use tempfile::TempDir;
use wtd_core::buildplan;
use wtd_core::catalog::ExtensionCatalog;
use wtd_core::config::{ConfigOverrides, WtdConfig};
use wtd_core::docker::{ContainerOps, ContainerSpec, ContainerState, Docker};
use wtd_core::paths::PathModel;
use wtd_core::reconciler::{self, Action};
use wtd_core::resolver;
use wtd_core::spec::RepoSpecifier;

struct FakeDocker {
    image_present: bool,
    container_state: ContainerState,
    /// The `wtd.identity` label a pre-existing container would report.
    /// Irrelevant when `container_state` is `Absent`.
    container_identity: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeDocker {
    fn new(image_present: bool, container_state: ContainerState, container_identity: Option<String>) -> Self {
        FakeDocker {
            image_present,
            container_state,
            container_identity,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Docker for FakeDocker {
    async fn image_present(&self, _image_tag: &str) -> wtd_core::Result<bool> {
        Ok(self.image_present)
    }

    async fn build(&self, _dockerfile: &Path, _context: &Path, _tag: &str, _nocache: bool) -> wtd_core::Result<()> {
        self.record("build");
        Ok(())
    }
}

#[async_trait]
impl ContainerOps for FakeDocker {
    async fn container_state(&self, _name: &str) -> wtd_core::Result<ContainerState> {
        Ok(self.container_state)
    }

    async fn container_identity(&self, _name: &str) -> wtd_core::Result<Option<String>> {
        Ok(self.container_identity.clone())
    }

    async fn create(&self, _spec: &ContainerSpec) -> wtd_core::Result<()> {
        self.record("create");
        Ok(())
    }

    async fn remove(&self, _name: &str) -> wtd_core::Result<()> {
        self.record("remove");
        Ok(())
    }

    async fn start_attach(&self, _name: &str) -> wtd_core::Result<()> {
        self.record("start_attach");
        Ok(())
    }

    async fn exec(&self, _name: &str, _command: &[String]) -> wtd_core::Result<()> {
        self.record("exec");
        Ok(())
    }
}

/// Replicate the identity the reconciler would compute for an empty
/// extension request against `catalog`, so tests can pre-seed a
/// "container already built from the current plan" fixture.
fn expected_final_identity(catalog: &ExtensionCatalog, config: &WtdConfig, model: &PathModel) -> String {
    let resolved = resolver::resolve(catalog, &model.effective_workdir, &[], false, false).unwrap();
    let plan = buildplan::build(catalog, &resolved, &config.base_image, &model.image_tag_base, None).unwrap();
    plan.stages.last().map(|s| s.identity.clone()).unwrap_or_default()
}

fn seed_git_state(cache_dir: &Path, spec: &RepoSpecifier) -> PathModel {
    let model = PathModel::new(cache_dir, spec);

    let seed = cache_dir.join("seed");
    std::fs::create_dir_all(&seed).unwrap();
    Command::new("git").args(["init", "-q"]).current_dir(&seed).output().unwrap();
    Command::new("git").args(["config", "user.email", "test@example.com"]).current_dir(&seed).output().unwrap();
    Command::new("git").args(["config", "user.name", "test"]).current_dir(&seed).output().unwrap();
    std::fs::write(seed.join("README.md"), "hi").unwrap();
    Command::new("git").args(["add", "."]).current_dir(&seed).output().unwrap();
    Command::new("git").args(["commit", "-q", "-m", "init"]).current_dir(&seed).output().unwrap();

    std::fs::create_dir_all(model.bare_path.parent().unwrap()).unwrap();
    Command::new("git")
        .args(["clone", "--bare", "-q", seed.to_str().unwrap(), model.bare_path.to_str().unwrap()])
        .output()
        .unwrap();
    Command::new("git")
        .args(["worktree", "add", "-q", model.worktree_path.to_str().unwrap(), "main"])
        .current_dir(&model.bare_path)
        .output()
        .unwrap();

    model
}

fn test_config(cache_dir: &Path) -> WtdConfig {
    WtdConfig::from_env(ConfigOverrides {
        cache_dir: Some(cache_dir.to_path_buf()),
        ..Default::default()
    })
}

#[tokio::test]
#[serial]
async fn absent_image_and_container_builds_creates_and_attaches() {
    let tmp = TempDir::new().unwrap();
    let spec = RepoSpecifier::parse("someone/somerepo").unwrap();
    seed_git_state(tmp.path(), &spec);
    let config = test_config(tmp.path());
    let catalog = ExtensionCatalog::discover(tmp.path()).unwrap();
    let docker = FakeDocker::new(false, ContainerState::Absent, None);

    let plan = reconciler::reconcile(&spec, &config, &catalog, &docker, &[], None).await.unwrap();

    assert!(plan.actions.contains(&Action::BuildImage));
    assert!(plan.actions.contains(&Action::CreateContainer));
    assert!(plan.actions.contains(&Action::StartAndAttach));
    assert_eq!(docker.calls(), vec!["build", "create", "start_attach"]);
}

#[tokio::test]
#[serial]
async fn present_image_absent_container_skips_build() {
    let tmp = TempDir::new().unwrap();
    let spec = RepoSpecifier::parse("someone/somerepo").unwrap();
    seed_git_state(tmp.path(), &spec);
    let config = test_config(tmp.path());
    let catalog = ExtensionCatalog::discover(tmp.path()).unwrap();
    let docker = FakeDocker::new(true, ContainerState::Absent, None);

    let plan = reconciler::reconcile(&spec, &config, &catalog, &docker, &[], None).await.unwrap();

    assert!(!plan.actions.contains(&Action::BuildImage));
    assert_eq!(docker.calls(), vec!["create", "start_attach"]);
}

#[tokio::test]
#[serial]
async fn stopped_container_starts_without_recreating() {
    let tmp = TempDir::new().unwrap();
    let spec = RepoSpecifier::parse("someone/somerepo").unwrap();
    seed_git_state(tmp.path(), &spec);
    let config = test_config(tmp.path());
    let catalog = ExtensionCatalog::discover(tmp.path()).unwrap();
    let identity = expected_final_identity(&catalog, &config, &PathModel::new(tmp.path(), &spec));
    let docker = FakeDocker::new(true, ContainerState::Stopped, Some(identity));

    let plan = reconciler::reconcile(&spec, &config, &catalog, &docker, &[], None).await.unwrap();

    assert_eq!(plan.actions.last(), Some(&Action::StartAndAttach));
    assert_eq!(docker.calls(), vec!["start_attach"]);
}

#[tokio::test]
#[serial]
async fn running_container_execs_instead_of_recreating() {
    let tmp = TempDir::new().unwrap();
    let spec = RepoSpecifier::parse("someone/somerepo").unwrap();
    seed_git_state(tmp.path(), &spec);
    let config = test_config(tmp.path());
    let catalog = ExtensionCatalog::discover(tmp.path()).unwrap();
    let identity = expected_final_identity(&catalog, &config, &PathModel::new(tmp.path(), &spec));
    let docker = FakeDocker::new(true, ContainerState::Running, Some(identity));

    let plan = reconciler::reconcile(&spec, &config, &catalog, &docker, &[], Some(&["git".to_string(), "status".to_string()]))
        .await
        .unwrap();

    assert_eq!(plan.actions.last(), Some(&Action::ExecInRunningContainer));
    assert_eq!(docker.calls(), vec!["exec"]);
}

#[tokio::test]
#[serial]
async fn stale_stage_identity_recreates_running_container() {
    let tmp = TempDir::new().unwrap();
    let spec = RepoSpecifier::parse("someone/somerepo").unwrap();
    seed_git_state(tmp.path(), &spec);
    let config = test_config(tmp.path());
    let catalog = ExtensionCatalog::discover(tmp.path()).unwrap();
    let docker = FakeDocker::new(true, ContainerState::Running, Some("stale-from-a-previous-build".to_string()));

    let plan = reconciler::reconcile(&spec, &config, &catalog, &docker, &[], None).await.unwrap();

    assert_eq!(plan.actions.last(), Some(&Action::StartAndAttach));
    assert!(plan.actions.contains(&Action::RecreateStaleContainer));
    assert_eq!(docker.calls(), vec!["remove", "create", "start_attach"]);
}

#[tokio::test]
#[serial]
async fn no_container_stops_after_worktree_readiness() {
    let tmp = TempDir::new().unwrap();
    let spec = RepoSpecifier::parse("someone/somerepo").unwrap();
    seed_git_state(tmp.path(), &spec);
    let mut config = test_config(tmp.path());
    config.no_container = true;
    let catalog = ExtensionCatalog::discover(tmp.path()).unwrap();
    let docker = FakeDocker::new(false, ContainerState::Absent, None);

    let plan = reconciler::reconcile(&spec, &config, &catalog, &docker, &[], None).await.unwrap();

    assert!(plan.build_plan.is_none());
    assert!(docker.calls().is_empty());
}
