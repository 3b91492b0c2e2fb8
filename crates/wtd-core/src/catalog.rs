//! Extension catalog: manifest parsing and discovery across built-in and
//! repo-local sources, with repo-local shadowing built-ins of the same
//! name. See spec.md §3 and §4.3.

use crate::errors::{Result, WtdError};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Auto-detection predicates for one extension. See spec.md §4.4.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutoDetect {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub host_paths: Vec<String>,
    /// filename -> substrings that, if any is found, count as a match.
    #[serde(default)]
    pub file_contents: IndexMap<String, Vec<String>>,
}

/// Raw, serde-deserialized manifest body (everything but the two text
/// fragments, which are read from sibling files).
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestToml {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub never_load: Vec<String>,
    #[serde(default)]
    pub always_load: bool,
    #[serde(default)]
    pub auto_detect: AutoDetect,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// One resolved, validated extension: its declaration plus the two text
/// fragments it contributes to the build plan.
#[derive(Debug, Clone)]
pub struct ExtensionManifest {
    pub name: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub never_load: HashSet<String>,
    pub always_load: bool,
    pub auto_detect: AutoDetect,
    pub version: Option<String>,
    pub platforms: Vec<String>,
    /// Dockerfile body fragment (may be empty).
    pub dockerfile_fragment: String,
    /// Service-config fragment, as a JSON object (may be `{}`).
    pub service_fragment: serde_json::Value,
    /// Which tier this manifest came from, for shadowing diagnostics.
    pub source: ManifestSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSource {
    BuiltIn,
    RepoLocal,
}

/// The effective catalog: a name -> manifest map, repo-local shadows
/// built-in by name. Backed by an [`IndexMap`] so discovery order
/// (relevant for duplicate-in-same-tier diagnostics) is preserved.
#[derive(Debug, Clone, Default)]
pub struct ExtensionCatalog {
    extensions: IndexMap<String, ExtensionManifest>,
}

const MANIFEST_FILE_NAME: &str = "manifest.toml";
const DOCKERFILE_FRAGMENT_NAME: &str = "Dockerfile";
const SERVICE_FRAGMENT_NAME: &str = "service.json";

impl ExtensionCatalog {
    /// Discover the effective catalog: built-ins first, then
    /// `.wtd/extensions/*/` under `worktree_root` (later wins on name
    /// collision), per spec.md §4.3.
    #[instrument(skip(worktree_root))]
    pub fn discover(worktree_root: &Path) -> Result<Self> {
        let mut catalog = ExtensionCatalog::default();

        for manifest in crate::builtin::built_in_manifests() {
            catalog.insert_checked(manifest, ManifestSource::BuiltIn)?;
        }

        let repo_local_dir = worktree_root.join(".wtd").join("extensions");
        if repo_local_dir.is_dir() {
            let mut seen_this_tier: HashSet<String> = HashSet::new();
            for entry in discover_extension_dirs(&repo_local_dir)? {
                let manifest = load_manifest_dir(&entry, ManifestSource::RepoLocal)?;
                if !seen_this_tier.insert(manifest.name.clone()) {
                    return Err(WtdError::CatalogInvalid {
                        reason: format!(
                            "duplicate repo-local extension name '{}' in {}",
                            manifest.name,
                            entry.display()
                        ),
                    });
                }
                catalog.insert_checked(manifest, ManifestSource::RepoLocal)?;
            }
        } else {
            debug!("no repo-local extensions directory at {}", repo_local_dir.display());
        }

        catalog.validate_dependencies()?;
        Ok(catalog)
    }

    fn insert_checked(&mut self, manifest: ExtensionManifest, source: ManifestSource) -> Result<()> {
        for pattern_src in manifest
            .auto_detect
            .files
            .iter()
            .chain(manifest.auto_detect.directories.iter())
        {
            Regex::new(pattern_src).map_err(|e| WtdError::CatalogInvalid {
                reason: format!(
                    "invalid auto_detect regex '{pattern_src}' in extension '{}': {e}",
                    manifest.name
                ),
            })?;
        }
        if source == ManifestSource::RepoLocal && self.extensions.contains_key(&manifest.name) {
            debug!("repo-local extension '{}' shadows a built-in", manifest.name);
        }
        self.extensions.insert(manifest.name.clone(), manifest);
        Ok(())
    }

    fn validate_dependencies(&self) -> Result<()> {
        for manifest in self.extensions.values() {
            for dep in &manifest.dependencies {
                if !self.extensions.contains_key(dep) {
                    return Err(WtdError::CatalogInvalid {
                        reason: format!(
                            "extension '{}' depends on unknown extension '{}'",
                            manifest.name, dep
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionManifest> {
        self.extensions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionManifest> {
        self.extensions.values()
    }

    pub fn always_load_names(&self) -> Vec<String> {
        self.extensions
            .values()
            .filter(|m| m.always_load)
            .map(|m| m.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Build a catalog directly from manifests, skipping discovery and
    /// dependency validation. Used by other modules' unit tests that need
    /// a small synthetic catalog.
    #[cfg(test)]
    pub fn from_manifests_for_test(manifests: Vec<ExtensionManifest>) -> Self {
        let mut catalog = ExtensionCatalog::default();
        for m in manifests {
            catalog.extensions.insert(m.name.clone(), m);
        }
        catalog
    }
}

fn discover_extension_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) => {
                warn!("failed to read extensions directory {}: {e}", dir.display());
                continue;
            }
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                if path.join(MANIFEST_FILE_NAME).is_file() {
                    out.push(path);
                } else {
                    stack.push(path);
                }
            }
        }
    }
    out.sort();
    Ok(out)
}

fn load_manifest_dir(dir: &Path, source: ManifestSource) -> Result<ExtensionManifest> {
    let manifest_path = dir.join(MANIFEST_FILE_NAME);
    let raw = std::fs::read_to_string(&manifest_path).map_err(|e| WtdError::ManifestInvalid {
        path: manifest_path.display().to_string(),
        reason: e.to_string(),
    })?;
    let parsed: ManifestToml = toml::from_str(&raw).map_err(|e| WtdError::ManifestInvalid {
        path: manifest_path.display().to_string(),
        reason: e.to_string(),
    })?;

    if parsed.name.is_empty() {
        return Err(WtdError::ManifestInvalid {
            path: manifest_path.display().to_string(),
            reason: "extension name must not be empty".to_string(),
        });
    }

    let dockerfile_fragment = std::fs::read_to_string(dir.join(DOCKERFILE_FRAGMENT_NAME))
        .unwrap_or_default();
    let service_fragment = match std::fs::read_to_string(dir.join(SERVICE_FRAGMENT_NAME)) {
        Ok(raw) => serde_json::from_str(&raw).map_err(|e| WtdError::ManifestInvalid {
            path: dir.join(SERVICE_FRAGMENT_NAME).display().to_string(),
            reason: e.to_string(),
        })?,
        Err(_) => serde_json::json!({}),
    };

    build_manifest(parsed, dockerfile_fragment, service_fragment, source)
}

pub(crate) fn build_manifest(
    parsed: ManifestToml,
    dockerfile_fragment: String,
    service_fragment: serde_json::Value,
    source: ManifestSource,
) -> Result<ExtensionManifest> {
    Ok(ExtensionManifest {
        name: parsed.name,
        description: parsed.description,
        dependencies: parsed.dependencies,
        never_load: parsed.never_load.into_iter().collect(),
        always_load: parsed.always_load,
        auto_detect: parsed.auto_detect,
        version: parsed.version,
        platforms: parsed.platforms,
        dockerfile_fragment,
        service_fragment,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_extension(root: &Path, name: &str, manifest_toml: &str, dockerfile: &str) {
        let dir = root.join(".wtd").join("extensions").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE_NAME), manifest_toml).unwrap();
        if !dockerfile.is_empty() {
            fs::write(dir.join(DOCKERFILE_FRAGMENT_NAME), dockerfile).unwrap();
        }
    }

    #[test]
    fn discovers_builtin_extensions() {
        let tmp = TempDir::new().unwrap();
        let catalog = ExtensionCatalog::discover(tmp.path()).unwrap();
        assert!(catalog.get("git-clone").is_some());
        assert!(catalog.always_load_names().contains(&"git-clone".to_string()));
    }

    #[test]
    fn repo_local_shadows_builtin_of_same_name() {
        let tmp = TempDir::new().unwrap();
        write_extension(
            tmp.path(),
            "git-clone",
            "name = \"git-clone\"\nalways_load = true\n",
            "RUN echo custom",
        );
        let catalog = ExtensionCatalog::discover(tmp.path()).unwrap();
        let ext = catalog.get("git-clone").unwrap();
        assert_eq!(ext.source, ManifestSource::RepoLocal);
        assert!(ext.dockerfile_fragment.contains("custom"));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let tmp = TempDir::new().unwrap();
        write_extension(
            tmp.path(),
            "needs-ghost",
            "name = \"needs-ghost\"\ndependencies = [\"ghost\"]\n",
            "",
        );
        let result = ExtensionCatalog::discover(tmp.path());
        assert!(matches!(result, Err(WtdError::CatalogInvalid { .. })));
    }

    #[test]
    fn rejects_duplicate_repo_local_name() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join(".wtd").join("extensions");
        for sub in ["a", "b"] {
            let dir = base.join(sub).join("dup");
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(MANIFEST_FILE_NAME), "name = \"dup\"\n").unwrap();
        }
        let result = ExtensionCatalog::discover(tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_regex() {
        let tmp = TempDir::new().unwrap();
        write_extension(
            tmp.path(),
            "bad-regex",
            "name = \"bad-regex\"\n[auto_detect]\nfiles = [\"(unclosed\"]\n",
            "",
        );
        let result = ExtensionCatalog::discover(tmp.path());
        assert!(matches!(result, Err(WtdError::CatalogInvalid { .. })));
    }
}
