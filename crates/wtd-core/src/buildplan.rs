//! Build-plan emitter: renders the resolved extension list into a
//! multi-stage Dockerfile, a merged service description, and a bake
//! manifest. See spec.md §4.6 and §4.7.
//!
//! Grounded on `dockerfile_generator.rs`'s stage-chaining approach and
//! `compose.rs`'s fragment-merge idiom, with a BLAKE3 content hash per
//! stage (SPEC_FULL.md §13) standing in for the teacher's template-hash
//! cache key.

use crate::catalog::ExtensionCatalog;
use crate::errors::{Result, WtdError};
use serde_json::Value;
use std::path::Path;

/// One built Dockerfile stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub extension: String,
    pub stage_name: String,
    pub parent_stage: Option<String>,
    pub dockerfile_fragment: String,
    /// BLAKE3 hex digest (truncated to 16 chars) identifying this stage's
    /// content plus its ancestry.
    pub identity: String,
}

/// The full build plan for one invocation.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub stages: Vec<Stage>,
    pub dockerfile: String,
    pub service_description: Value,
    pub image_tag: String,
}

const IDENTITY_LEN: usize = 16;

/// Build a [`BuildPlan`] from an ordered, resolved list of extension
/// names (dependencies-before-dependents, as produced by
/// [`crate::resolver::resolve`]).
pub fn build(
    catalog: &ExtensionCatalog,
    resolved: &[String],
    base_image: &str,
    image_tag_base: &str,
    rebuild_salt: Option<&str>,
) -> Result<BuildPlan> {
    let mut stages = Vec::with_capacity(resolved.len());
    let mut parent_identity: Option<String> = None;
    let mut parent_stage_name: Option<String> = None;

    for name in resolved {
        let manifest = catalog
            .get(name)
            .expect("resolver only returns names present in the catalog");
        let stage_name = stage_name_for(name);

        let mut hasher = blake3::Hasher::new();
        hasher.update(stage_name.as_bytes());
        if let Some(parent_id) = &parent_identity {
            hasher.update(parent_id.as_bytes());
        } else {
            hasher.update(base_image.as_bytes());
        }
        hasher.update(manifest.dockerfile_fragment.as_bytes());
        if let Some(salt) = rebuild_salt {
            hasher.update(salt.as_bytes());
        }
        let digest = hasher.finalize().to_hex();
        let identity = digest[..IDENTITY_LEN].to_string();

        stages.push(Stage {
            extension: name.clone(),
            stage_name: stage_name.clone(),
            parent_stage: parent_stage_name.clone(),
            dockerfile_fragment: manifest.dockerfile_fragment.clone(),
            identity: identity.clone(),
        });

        parent_identity = Some(identity);
        parent_stage_name = Some(stage_name);
    }

    let final_identity = parent_identity.clone().unwrap_or_default();
    let image_tag = if final_identity.is_empty() {
        image_tag_base.to_string()
    } else {
        format!("{image_tag_base}-{final_identity}")
    };

    let dockerfile = render_dockerfile(base_image, &stages);
    let service_description = merge_service_fragments(catalog, resolved)?;

    Ok(BuildPlan {
        stages,
        dockerfile,
        service_description,
        image_tag,
    })
}

fn stage_name_for(extension: &str) -> String {
    extension.replace(['/', '.'], "_")
}

fn render_dockerfile(base_image: &str, stages: &[Stage]) -> String {
    let mut out = String::new();
    for (i, stage) in stages.iter().enumerate() {
        let from = if i == 0 {
            base_image.to_string()
        } else {
            stages[i - 1].stage_name.clone()
        };
        out.push_str(&format!("FROM {from} AS {}\n", stage.stage_name));
        if !stage.dockerfile_fragment.trim().is_empty() {
            out.push_str(&stage.dockerfile_fragment);
            if !stage.dockerfile_fragment.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push('\n');
    }
    let last = stages.last().map(|s| s.stage_name.clone()).unwrap_or_else(|| base_image.to_string());
    out.push_str(&format!("FROM {last} AS final\n"));
    out
}

/// Deep-merge every resolved extension's service fragment, in resolved
/// order, per spec.md §4.7's merge rules: objects merge recursively,
/// arrays concatenate then dedupe (preserving first-seen order), scalars
/// are overwritten by the later fragment.
fn merge_service_fragments(catalog: &ExtensionCatalog, resolved: &[String]) -> Result<Value> {
    let mut merged = Value::Object(serde_json::Map::new());
    for name in resolved {
        let manifest = catalog
            .get(name)
            .expect("resolver only returns names present in the catalog");
        merge_into(&mut merged, &manifest.service_fragment);
    }
    Ok(merged)
}

fn merge_into(base: &mut Value, incoming: &Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (key, incoming_val) in incoming_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_into(existing, incoming_val),
                    None => {
                        base_map.insert(key.clone(), incoming_val.clone());
                    }
                }
            }
        }
        (Value::Array(base_arr), Value::Array(incoming_arr)) => {
            for item in incoming_arr {
                if !base_arr.contains(item) {
                    base_arr.push(item.clone());
                }
            }
        }
        (base_slot, incoming_val) => {
            *base_slot = incoming_val.clone();
        }
    }
}

/// Write the Dockerfile, bake manifest and compose file to disk, skipping
/// writes whose content is already identical (idempotent regeneration,
/// per spec.md §4.6: regenerating the plan must not perturb an unrelated
/// cache).
pub fn write_plan(
    plan: &BuildPlan,
    dockerfile_path: &Path,
    bake_path: &Path,
    compose_path: &Path,
    cache_dir: &Path,
) -> Result<()> {
    write_if_changed(dockerfile_path, &plan.dockerfile)?;
    let bake = render_bake(plan, dockerfile_path, cache_dir);
    write_if_changed(bake_path, &bake)?;
    let compose = render_compose(plan)?;
    write_if_changed(compose_path, &compose)?;
    Ok(())
}

/// Render the merged service description as a `docker-compose.yml`
/// artifact. Not used by `wtd` itself to drive the container (the
/// reconciler talks to `docker create`/`start`/`exec` directly), but
/// emitted alongside the Dockerfile so other tooling (editors, `docker
/// compose` invoked by hand) can see the same mounts and environment.
fn render_compose(plan: &BuildPlan) -> Result<String> {
    let doc = serde_json::json!({
        "version": "3.8",
        "services": {
            "workspace": plan.service_description,
        }
    });
    serde_yaml::to_string(&doc).map_err(|e| WtdError::Io(std::io::Error::other(e.to_string())))
}

fn render_bake(plan: &BuildPlan, dockerfile_path: &Path, cache_dir: &Path) -> String {
    format!(
        "group \"default\" {{\n  targets = [\"final\"]\n}}\n\ntarget \"final\" {{\n  dockerfile = \"{}\"\n  target = \"final\"\n  tags = [\"{}\"]\n  cache-from = [\"type=local,src={}\"]\n  cache-to = [\"type=local,dest={},mode=max\"]\n}}\n",
        dockerfile_path.display(),
        plan.image_tag,
        cache_dir.display(),
        cache_dir.display(),
    )
}

fn write_if_changed(path: &Path, content: &str) -> Result<()> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == content {
            return Ok(());
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AutoDetect, ExtensionCatalog, ExtensionManifest, ManifestSource};
    use indexmap::IndexMap;
    use std::collections::HashSet;

    fn manifest(name: &str, dockerfile: &str, service: Value) -> ExtensionManifest {
        ExtensionManifest {
            name: name.to_string(),
            description: String::new(),
            dependencies: vec![],
            never_load: HashSet::new(),
            always_load: false,
            auto_detect: AutoDetect {
                files: vec![],
                directories: vec![],
                host_paths: vec![],
                file_contents: IndexMap::new(),
            },
            version: None,
            platforms: vec![],
            dockerfile_fragment: dockerfile.to_string(),
            service_fragment: service,
            source: ManifestSource::BuiltIn,
        }
    }

    #[test]
    fn single_stage_dockerfile_chains_from_base() {
        let catalog = ExtensionCatalog::from_manifests_for_test(vec![manifest(
            "git-clone",
            "RUN apt-get install -y git\n",
            serde_json::json!({}),
        )]);
        let plan = build(&catalog, &["git-clone".to_string()], "ubuntu:22.04", "demo:latest", None).unwrap();
        assert!(plan.dockerfile.starts_with("FROM ubuntu:22.04 AS git_clone\n"));
        assert!(plan.dockerfile.contains("FROM git_clone AS final\n"));
    }

    #[test]
    fn stage_identity_changes_with_fragment() {
        let catalog_a = ExtensionCatalog::from_manifests_for_test(vec![manifest("a", "RUN one\n", serde_json::json!({}))]);
        let catalog_b = ExtensionCatalog::from_manifests_for_test(vec![manifest("a", "RUN two\n", serde_json::json!({}))]);
        let plan_a = build(&catalog_a, &["a".to_string()], "ubuntu:22.04", "demo:latest", None).unwrap();
        let plan_b = build(&catalog_b, &["a".to_string()], "ubuntu:22.04", "demo:latest", None).unwrap();
        assert_ne!(plan_a.image_tag, plan_b.image_tag);
    }

    #[test]
    fn rebuild_salt_changes_identity() {
        let catalog = ExtensionCatalog::from_manifests_for_test(vec![manifest("a", "RUN one\n", serde_json::json!({}))]);
        let plan_a = build(&catalog, &["a".to_string()], "ubuntu:22.04", "demo:latest", None).unwrap();
        let plan_b = build(&catalog, &["a".to_string()], "ubuntu:22.04", "demo:latest", Some("salt")).unwrap();
        assert_ne!(plan_a.image_tag, plan_b.image_tag);
    }

    #[test]
    fn service_fragments_deep_merge() {
        let catalog = ExtensionCatalog::from_manifests_for_test(vec![
            manifest(
                "a",
                "",
                serde_json::json!({ "volumes": ["/a:/a"], "environment": { "X": "1" } }),
            ),
            manifest(
                "b",
                "",
                serde_json::json!({ "volumes": ["/b:/b"], "environment": { "Y": "2" } }),
            ),
        ]);
        let plan = build(
            &catalog,
            &["a".to_string(), "b".to_string()],
            "ubuntu:22.04",
            "demo:latest",
            None,
        )
        .unwrap();
        let volumes = plan.service_description["volumes"].as_array().unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(plan.service_description["environment"]["X"], "1");
        assert_eq!(plan.service_description["environment"]["Y"], "2");
    }

    #[test]
    fn array_merge_dedupes() {
        let catalog = ExtensionCatalog::from_manifests_for_test(vec![
            manifest("a", "", serde_json::json!({ "volumes": ["/shared:/shared"] })),
            manifest("b", "", serde_json::json!({ "volumes": ["/shared:/shared"] })),
        ]);
        let plan = build(
            &catalog,
            &["a".to_string(), "b".to_string()],
            "ubuntu:22.04",
            "demo:latest",
            None,
        )
        .unwrap();
        let volumes = plan.service_description["volumes"].as_array().unwrap();
        assert_eq!(volumes.len(), 1);
    }

    #[test]
    fn write_plan_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let catalog = ExtensionCatalog::from_manifests_for_test(vec![manifest("a", "RUN one\n", serde_json::json!({}))]);
        let plan = build(&catalog, &["a".to_string()], "ubuntu:22.04", "demo:latest", None).unwrap();
        let dockerfile_path = tmp.path().join("Dockerfile");
        let bake_path = tmp.path().join("docker-bake.hcl");
        let compose_path = tmp.path().join("docker-compose.yml");
        write_plan(&plan, &dockerfile_path, &bake_path, &compose_path, &tmp.path().join(".buildx-cache")).unwrap();
        let first_mtime = std::fs::metadata(&dockerfile_path).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        write_plan(&plan, &dockerfile_path, &bake_path, &compose_path, &tmp.path().join(".buildx-cache")).unwrap();
        let second_mtime = std::fs::metadata(&dockerfile_path).unwrap().modified().unwrap();
        assert_eq!(first_mtime, second_mtime);
    }

    #[test]
    fn compose_file_embeds_merged_service_description() {
        let catalog = ExtensionCatalog::from_manifests_for_test(vec![manifest(
            "a",
            "",
            serde_json::json!({ "volumes": ["/shared:/shared"] }),
        )]);
        let plan = build(&catalog, &["a".to_string()], "ubuntu:22.04", "demo:latest", None).unwrap();
        let compose = render_compose(&plan).unwrap();
        assert!(compose.contains("workspace"));
        assert!(compose.contains("/shared:/shared"));
    }
}
