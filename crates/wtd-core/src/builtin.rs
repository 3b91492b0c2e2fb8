//! Vendored built-in extensions.
//!
//! These are shipped with the binary (component 3 in spec.md §2). Out of
//! core scope per spec.md §1 ("the vendored lists of built-in
//! extensions"), so they are plain Rust literals rather than a generated
//! asset pipeline, mirroring how the teacher keeps its own small fixed
//! tables (e.g. `container.rs`'s `LABEL_*` constants) as source, not data
//! files.
//!
//! Includes `git-clone` per spec.md §9's resolution of the source's two
//! conflicting default-extension lists.

use crate::catalog::{build_manifest, AutoDetect, ExtensionManifest, ManifestSource, ManifestToml};
use indexmap::IndexMap;
use serde_json::json;

struct BuiltIn {
    name: &'static str,
    description: &'static str,
    dependencies: &'static [&'static str],
    never_load: &'static [&'static str],
    always_load: bool,
    files: &'static [&'static str],
    directories: &'static [&'static str],
    host_paths: &'static [&'static str],
    file_contents: &'static [(&'static str, &'static [&'static str])],
    dockerfile: &'static str,
    service: fn() -> serde_json::Value,
}

fn no_service() -> serde_json::Value {
    json!({})
}

const BUILT_INS: &[BuiltIn] = &[
    BuiltIn {
        name: "git-clone",
        description: "Installs git and configures the container's git identity from the host.",
        dependencies: &[],
        never_load: &[],
        always_load: true,
        files: &[],
        directories: &[],
        host_paths: &[],
        file_contents: &[],
        dockerfile: "RUN apt-get update && apt-get install -y --no-install-recommends git && rm -rf /var/lib/apt/lists/*\n",
        service: no_service,
    },
    BuiltIn {
        name: "ssh-agent",
        description: "Forwards the host SSH agent socket into the container.",
        dependencies: &[],
        never_load: &[],
        always_load: true,
        files: &[],
        directories: &[],
        host_paths: &[],
        file_contents: &[],
        dockerfile: "RUN apt-get update && apt-get install -y --no-install-recommends openssh-client && rm -rf /var/lib/apt/lists/*\n",
        service: || json!({ "environment": { "SSH_AUTH_SOCK": "/ssh-agent" } }),
    },
    BuiltIn {
        name: "gitconfig",
        description: "Mounts the host ~/.gitconfig read-only into the container.",
        dependencies: &["git-clone"],
        never_load: &[],
        always_load: true,
        files: &[],
        directories: &[],
        host_paths: &[],
        file_contents: &[],
        dockerfile: "",
        service: || json!({ "volumes": ["~/.gitconfig:/home/vscode/.gitconfig:ro"] }),
    },
    BuiltIn {
        name: "docker-in-docker",
        description: "Installs the Docker CLI and mounts the host docker socket.",
        dependencies: &[],
        never_load: &[],
        always_load: false,
        files: &["^Dockerfile$", "^docker-compose\\.ya?ml$"],
        directories: &[],
        host_paths: &["/var/run/docker.sock"],
        file_contents: &[],
        dockerfile: "RUN apt-get update && apt-get install -y --no-install-recommends docker.io && rm -rf /var/lib/apt/lists/*\n",
        service: || json!({ "volumes": ["/var/run/docker.sock:/var/run/docker.sock"] }),
    },
    BuiltIn {
        name: "gui",
        description: "Mounts the host X11 socket for graphical applications.",
        dependencies: &[],
        never_load: &[],
        always_load: false,
        files: &[],
        directories: &[],
        host_paths: &["/tmp/.X11-unix"],
        file_contents: &[],
        dockerfile: "RUN apt-get update && apt-get install -y --no-install-recommends x11-apps && rm -rf /var/lib/apt/lists/*\n",
        service: || {
            json!({
                "environment": { "DISPLAY": "${DISPLAY}" },
                "volumes": ["/tmp/.X11-unix:/tmp/.X11-unix:ro"]
            })
        },
    },
    BuiltIn {
        name: "gpu",
        description: "Requests NVIDIA GPU access via the container runtime.",
        dependencies: &[],
        never_load: &[],
        always_load: false,
        files: &[],
        directories: &[],
        host_paths: &["/dev/nvidia0", "/dev/nvidiactl"],
        file_contents: &[],
        dockerfile: "",
        service: || json!({ "deploy": { "resources": { "reservations": { "devices": [{"capabilities": ["gpu"]}] } } } }),
    },
    BuiltIn {
        name: "python",
        description: "Installs Python 3 and pip.",
        dependencies: &[],
        never_load: &[],
        always_load: false,
        files: &["^pyproject\\.toml$", "^requirements.*\\.txt$", "^setup\\.py$"],
        directories: &[],
        host_paths: &[],
        file_contents: &[],
        dockerfile: "RUN apt-get update && apt-get install -y --no-install-recommends python3 python3-pip python3-venv && rm -rf /var/lib/apt/lists/*\n",
        service: no_service,
    },
    BuiltIn {
        name: "node",
        description: "Installs Node.js via nodesource.",
        dependencies: &[],
        never_load: &[],
        always_load: false,
        files: &["^package\\.json$"],
        directories: &["^node_modules$"],
        host_paths: &[],
        file_contents: &[],
        dockerfile: "RUN apt-get update && apt-get install -y --no-install-recommends curl ca-certificates && curl -fsSL https://deb.nodesource.com/setup_lts.x | bash - && apt-get install -y nodejs && rm -rf /var/lib/apt/lists/*\n",
        service: no_service,
    },
    BuiltIn {
        name: "rust",
        description: "Installs the Rust toolchain via rustup.",
        dependencies: &[],
        never_load: &[],
        always_load: false,
        files: &["^Cargo\\.toml$"],
        directories: &[],
        host_paths: &[],
        file_contents: &[("Cargo.toml", &["[workspace]", "[package]"])],
        dockerfile: "RUN apt-get update && apt-get install -y --no-install-recommends curl build-essential && curl https://sh.rustup.rs -sSf | sh -s -- -y && rm -rf /var/lib/apt/lists/*\nENV PATH=\"/root/.cargo/bin:${PATH}\"\n",
        service: no_service,
    },
];

/// Build the in-memory list of built-in [`ExtensionManifest`]s.
pub fn built_in_manifests() -> Vec<ExtensionManifest> {
    BUILT_INS
        .iter()
        .map(|b| {
            let mut file_contents: IndexMap<String, Vec<String>> = IndexMap::new();
            for (file, subs) in b.file_contents {
                file_contents.insert(
                    file.to_string(),
                    subs.iter().map(|s| s.to_string()).collect(),
                );
            }
            let parsed = ManifestToml {
                name: b.name.to_string(),
                description: b.description.to_string(),
                dependencies: b.dependencies.iter().map(|s| s.to_string()).collect(),
                never_load: b.never_load.iter().map(|s| s.to_string()).collect(),
                always_load: b.always_load,
                auto_detect: AutoDetect {
                    files: b.files.iter().map(|s| s.to_string()).collect(),
                    directories: b.directories.iter().map(|s| s.to_string()).collect(),
                    host_paths: b.host_paths.iter().map(|s| s.to_string()).collect(),
                    file_contents,
                },
                version: None,
                platforms: Vec::new(),
            };
            build_manifest(parsed, b.dockerfile.to_string(), (b.service)(), ManifestSource::BuiltIn)
                .expect("built-in manifests are constructed correctly")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_names_are_unique() {
        let manifests = built_in_manifests();
        let mut names: Vec<_> = manifests.iter().map(|m| m.name.clone()).collect();
        names.sort();
        let mut deduped = names.clone();
        deduped.dedup();
        assert_eq!(names, deduped);
    }

    #[test]
    fn git_clone_is_always_load() {
        let manifests = built_in_manifests();
        let git_clone = manifests.iter().find(|m| m.name == "git-clone").unwrap();
        assert!(git_clone.always_load);
    }

    #[test]
    fn gitconfig_depends_on_git_clone() {
        let manifests = built_in_manifests();
        let gitconfig = manifests.iter().find(|m| m.name == "gitconfig").unwrap();
        assert_eq!(gitconfig.dependencies, vec!["git-clone".to_string()]);
    }
}
