//! Container supervisor: observes and drives the Docker CLI. See spec.md
//! §4.8 (component 8).
//!
//! Mirrors the teacher's `CliDocker` split into narrow traits
//! (`Docker`/`ContainerOps`/`DockerLifecycle`) so the reconciler can be
//! tested against a fake. Every call shells out via
//! `tokio::task::spawn_blocking` wrapping `std::process::Command`,
//! matching `docker.rs`'s async-wrapper-over-blocking-CLI pattern.

use crate::errors::{Result, WtdError};
use async_trait::async_trait;
use serde_json::Value;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{instrument, warn};

pub const LABEL_MANAGED: &str = "wtd=1";
pub const LABEL_SPEC_PREFIX: &str = "wtd.spec=";
pub const LABEL_IDENTITY_PREFIX: &str = "wtd.identity=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

/// Everything needed to create a container: mount wiring and the merged
/// service description from [`crate::buildplan::BuildPlan`].
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub container_name: String,
    pub image_tag: String,
    pub workspace_host_path: PathBuf,
    pub workspace_container_path: String,
    pub spec_label: String,
    pub ssh_auth_sock: Option<String>,
    pub mount_gitconfig: bool,
    pub service_description: Value,
    /// The final stage identity this container was built from, stamped as
    /// a label so a later invocation can tell a stale container from a
    /// current one without re-hashing anything.
    pub stage_identity: String,
}

#[async_trait]
pub trait Docker: Send + Sync {
    async fn image_present(&self, image_tag: &str) -> Result<bool>;
    async fn build(&self, dockerfile: &std::path::Path, context: &std::path::Path, tag: &str, nocache: bool) -> Result<()>;
}

#[async_trait]
pub trait ContainerOps: Send + Sync {
    async fn container_state(&self, name: &str) -> Result<ContainerState>;
    /// The `wtd.identity` label stamped on `name` at creation time, or
    /// `None` if the container is absent or carries no such label.
    async fn container_identity(&self, name: &str) -> Result<Option<String>>;
    async fn create(&self, spec: &ContainerSpec) -> Result<()>;
    /// Stop and remove a container without touching its image. Used when
    /// the reconciler finds a container built from a stale stage identity
    /// and needs to recreate it.
    async fn remove(&self, name: &str) -> Result<()>;
    async fn start_attach(&self, name: &str) -> Result<()>;
    async fn exec(&self, name: &str, command: &[String]) -> Result<()>;
}

#[async_trait]
pub trait DockerLifecycle: Send + Sync {
    async fn prune_one(&self, name: &str) -> Result<()>;
    async fn prune_all(&self) -> Result<Vec<String>>;
    async fn list_managed(&self) -> Result<Vec<String>>;
    async fn list_managed_images(&self) -> Result<Vec<String>>;
}

/// Shells out to the `docker` binary on the host.
#[derive(Debug, Clone, Default)]
pub struct CliDocker;

impl CliDocker {
    pub fn new() -> Self {
        CliDocker
    }
}

fn run_blocking(mut cmd: Command) -> Result<std::process::Output> {
    let program = format!("{:?}", cmd);
    cmd.output().map_err(|e| WtdError::ContainerFailure {
        op: program,
        stderr: e.to_string(),
    })
}

async fn spawn(args: Vec<String>) -> Result<std::process::Output> {
    tokio::task::spawn_blocking(move || {
        let mut cmd = Command::new("docker");
        cmd.args(&args);
        run_blocking(cmd)
    })
    .await
    .map_err(|e| WtdError::ContainerFailure {
        op: "docker".to_string(),
        stderr: e.to_string(),
    })?
}

fn require_success(op: &str, output: std::process::Output) -> Result<std::process::Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(WtdError::ContainerFailure {
            op: op.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl Docker for CliDocker {
    #[instrument(skip(self))]
    async fn image_present(&self, image_tag: &str) -> Result<bool> {
        let output = spawn(vec![
            "image".to_string(),
            "inspect".to_string(),
            image_tag.to_string(),
        ])
        .await?;
        Ok(output.status.success())
    }

    #[instrument(skip(self))]
    async fn build(&self, dockerfile: &std::path::Path, context: &std::path::Path, tag: &str, nocache: bool) -> Result<()> {
        let mut args = vec![
            "build".to_string(),
            "-f".to_string(),
            dockerfile.display().to_string(),
            "-t".to_string(),
            tag.to_string(),
            "--label".to_string(),
            LABEL_MANAGED.to_string(),
        ];
        if nocache {
            args.push("--no-cache".to_string());
        }
        args.push(context.display().to_string());
        let output = spawn(args).await?;
        require_success("docker build", output).map(|_| ())
    }
}

#[async_trait]
impl ContainerOps for CliDocker {
    #[instrument(skip(self))]
    async fn container_state(&self, name: &str) -> Result<ContainerState> {
        let output = spawn(vec![
            "inspect".to_string(),
            "--format".to_string(),
            "{{.State.Running}}".to_string(),
            name.to_string(),
        ])
        .await?;
        if !output.status.success() {
            return Ok(ContainerState::Absent);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim() == "true" {
            Ok(ContainerState::Running)
        } else {
            Ok(ContainerState::Stopped)
        }
    }

    #[instrument(skip(self))]
    async fn container_identity(&self, name: &str) -> Result<Option<String>> {
        let output = spawn(vec![
            "inspect".to_string(),
            "--format".to_string(),
            format!("{{{{index .Config.Labels \"{}\"}}}}", LABEL_IDENTITY_PREFIX.trim_end_matches('=')),
            name.to_string(),
        ])
        .await?;
        if !output.status.success() {
            return Ok(None);
        }
        let label = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if label.is_empty() || label == "<no value>" {
            Ok(None)
        } else {
            Ok(Some(label))
        }
    }

    #[instrument(skip(self))]
    async fn remove(&self, name: &str) -> Result<()> {
        let output = spawn(vec!["rm".to_string(), "-f".to_string(), name.to_string()]).await?;
        require_success("docker rm -f", output).map(|_| ())
    }

    #[instrument(skip(self, spec))]
    async fn create(&self, spec: &ContainerSpec) -> Result<()> {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            spec.container_name.clone(),
            "--label".to_string(),
            LABEL_MANAGED.to_string(),
            "--label".to_string(),
            format!("{LABEL_SPEC_PREFIX}{}", spec.spec_label),
            "--label".to_string(),
            format!("{}{}", LABEL_IDENTITY_PREFIX, spec.stage_identity),
            "-v".to_string(),
            format!(
                "{}:{}",
                spec.workspace_host_path.display(),
                spec.workspace_container_path
            ),
        ];

        if let Some(sock) = &spec.ssh_auth_sock {
            args.push("-v".to_string());
            args.push(format!("{sock}:/ssh-agent"));
            args.push("-e".to_string());
            args.push("SSH_AUTH_SOCK=/ssh-agent".to_string());
        }
        if spec.mount_gitconfig {
            if let Some(home) = directories_next::UserDirs::new() {
                args.push("-v".to_string());
                args.push(format!(
                    "{}:/home/vscode/.gitconfig:ro",
                    home.home_dir().join(".gitconfig").display()
                ));
            }
        }

        for (key, values) in service_volumes(&spec.service_description) {
            for v in values {
                args.push(key.clone());
                args.push(v);
            }
        }

        args.push(spec.image_tag.clone());
        args.push("sleep".to_string());
        args.push("infinity".to_string());

        let output = spawn(args).await?;
        require_success("docker create", output).map(|_| ())
    }

    #[instrument(skip(self))]
    async fn start_attach(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            let mut cmd = Command::new("docker");
            cmd.args(["start", &name]);
            run_blocking(cmd)
        })
        .await
        .map_err(|e| WtdError::ContainerFailure {
            op: "docker start".to_string(),
            stderr: e.to_string(),
        })??;

        let tty = std::io::stdout().is_terminal();
        let name_for_attach = name.clone();
        tokio::task::spawn_blocking(move || {
            let mut cmd = Command::new("docker");
            if tty {
                cmd.args(["exec", "-it", &name_for_attach, "bash"]);
            } else {
                cmd.args(["exec", "-i", &name_for_attach, "bash"]);
            }
            cmd.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());
            cmd.status().map_err(|e| WtdError::ContainerFailure {
                op: "docker exec".to_string(),
                stderr: e.to_string(),
            })
        })
        .await
        .map_err(|e| WtdError::ContainerFailure {
            op: "docker exec".to_string(),
            stderr: e.to_string(),
        })??;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn exec(&self, name: &str, command: &[String]) -> Result<()> {
        let name = name.to_string();
        let command = command.to_vec();
        let tty = std::io::stdout().is_terminal();
        tokio::task::spawn_blocking(move || {
            let mut cmd = Command::new("docker");
            cmd.arg("exec");
            cmd.arg(if tty { "-it" } else { "-i" });
            cmd.arg(&name);
            cmd.args(&command);
            cmd.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());
            cmd.status().map_err(|e| WtdError::ContainerFailure {
                op: "docker exec".to_string(),
                stderr: e.to_string(),
            })
        })
        .await
        .map_err(|e| WtdError::ContainerFailure {
            op: "docker exec".to_string(),
            stderr: e.to_string(),
        })??;
        Ok(())
    }
}

#[async_trait]
impl DockerLifecycle for CliDocker {
    #[instrument(skip(self))]
    async fn prune_one(&self, name: &str) -> Result<()> {
        let image_tag = container_image_tag(name).await?;
        let output = spawn(vec!["rm".to_string(), "-f".to_string(), name.to_string()]).await?;
        require_success("docker rm -f", output)?;
        if let Some(tag) = image_tag {
            remove_image(&tag).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn prune_all(&self) -> Result<Vec<String>> {
        let names = self.list_managed().await?;
        for name in &names {
            self.prune_one(name).await?;
        }
        // Containers point at a single image each, but a prior `--rebuild`
        // can leave older identity-tagged images around with no container
        // left referencing them. Sweep those up by label too.
        for image in self.list_managed_images().await? {
            remove_image(&image).await?;
        }
        Ok(names)
    }

    #[instrument(skip(self))]
    async fn list_managed(&self) -> Result<Vec<String>> {
        let output = spawn(vec![
            "ps".to_string(),
            "-a".to_string(),
            "--filter".to_string(),
            format!("label={LABEL_MANAGED}"),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ])
        .await?;
        let output = require_success("docker ps", output)?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|s| s.to_string())
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_managed_images(&self) -> Result<Vec<String>> {
        let output = spawn(vec![
            "images".to_string(),
            "--filter".to_string(),
            format!("label={LABEL_MANAGED}"),
            "--format".to_string(),
            "{{.Repository}}:{{.Tag}}".to_string(),
        ])
        .await?;
        let output = require_success("docker images", output)?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|s| s.to_string())
            .collect())
    }
}

/// The image tag a container was created from, or `None` if it's absent
/// or the field can't be read.
async fn container_image_tag(name: &str) -> Result<Option<String>> {
    let output = spawn(vec![
        "inspect".to_string(),
        "--format".to_string(),
        "{{.Config.Image}}".to_string(),
        name.to_string(),
    ])
    .await?;
    if !output.status.success() {
        return Ok(None);
    }
    let tag = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if tag.is_empty() {
        Ok(None)
    } else {
        Ok(Some(tag))
    }
}

/// Best-effort image removal: a shared base layer still referenced
/// elsewhere, or an already-removed image, is logged and not fatal to the
/// surrounding prune.
async fn remove_image(tag: &str) -> Result<()> {
    let output = spawn(vec!["rmi".to_string(), "-f".to_string(), tag.to_string()]).await?;
    if !output.status.success() {
        warn!(
            "failed to remove image {tag}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Pull `volumes` out of a merged service description, returning
/// `(flag, values)` pairs ready to splice into a `docker create` call.
fn service_volumes(description: &Value) -> Vec<(String, Vec<String>)> {
    let mut out = Vec::new();
    if let Some(volumes) = description.get("volumes").and_then(|v| v.as_array()) {
        let values: Vec<String> = volumes
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect();
        if !values.is_empty() {
            out.push(("-v".to_string(), values));
        }
    }
    if let Some(env) = description.get("environment").and_then(|v| v.as_object()) {
        let values: Vec<String> = env
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|val| format!("{k}={val}")))
            .collect();
        if !values.is_empty() {
            out.push(("-e".to_string(), values));
        }
    }
    out
}
