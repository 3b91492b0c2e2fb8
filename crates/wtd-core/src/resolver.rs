//! Dependency resolver: turns a root request set (auto-detected +
//! always-load + user `-e` requests) into a deterministic, dependency-
//! ordered load list. See spec.md §4.5.
//!
//! Grounded on `lockfile.rs::merge_lockfile_features`'s closure-then-sort
//! shape and `feature_installer.rs`'s level-by-level install plan, with
//! the pairwise `never_load` conflict check layered on top.

use crate::autodetect;
use crate::catalog::ExtensionCatalog;
use crate::errors::{Result, WtdError};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, instrument};

/// Compute the final, ordered list of extension names to load.
///
/// Order is a valid topological order (dependencies before dependents)
/// with name-ascending tie-breaking at every choice point, so the same
/// catalog + inputs always produce the same list.
#[instrument(skip(catalog))]
pub fn resolve(
    catalog: &ExtensionCatalog,
    worktree_root: &Path,
    user_requested: &[String],
    no_gui: bool,
    no_gpu: bool,
) -> Result<Vec<String>> {
    for name in user_requested {
        if catalog.get(name).is_none() {
            return Err(WtdError::DependencyMissing {
                extension: name.clone(),
                dependency: name.clone(),
            });
        }
    }

    let mut roots: HashSet<String> = catalog.always_load_names().into_iter().collect();
    roots.extend(user_requested.iter().cloned());

    for manifest in catalog.iter() {
        if roots.contains(&manifest.name) {
            continue;
        }
        if autodetect::matches(&manifest.auto_detect, worktree_root) {
            roots.insert(manifest.name.clone());
        }
    }

    // `--no-gui`/`--no-gpu` drop the named extension outright, and with it
    // anything reachable only through it: `excluded` nodes are skipped
    // both as roots and as dependency edges, so a dependent that also has
    // another reason to be in the closure survives, minus the excluded
    // branch, while one that existed purely to pull in `gui`/`gpu` never
    // gets visited at all.
    let mut excluded: HashSet<String> = HashSet::new();
    if no_gui {
        excluded.insert("gui".to_string());
    }
    if no_gpu {
        excluded.insert("gpu".to_string());
    }

    let closure = transitive_closure(catalog, &roots, &excluded)?;
    check_never_load(catalog, &closure)?;
    topo_sort(catalog, &closure)
}

fn transitive_closure(
    catalog: &ExtensionCatalog,
    roots: &HashSet<String>,
    excluded: &HashSet<String>,
) -> Result<HashSet<String>> {
    let mut closure: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = roots.iter().filter(|r| !excluded.contains(*r)).cloned().collect();
    while let Some(name) = stack.pop() {
        if excluded.contains(&name) || !closure.insert(name.clone()) {
            continue;
        }
        let manifest = catalog.get(&name).ok_or_else(|| WtdError::DependencyMissing {
            extension: name.clone(),
            dependency: name.clone(),
        })?;
        for dep in &manifest.dependencies {
            if excluded.contains(dep) {
                continue;
            }
            if catalog.get(dep).is_none() {
                return Err(WtdError::DependencyMissing {
                    extension: name.clone(),
                    dependency: dep.clone(),
                });
            }
            stack.push(dep.clone());
        }
    }
    Ok(closure)
}

fn check_never_load(catalog: &ExtensionCatalog, closure: &HashSet<String>) -> Result<()> {
    let mut names: Vec<&String> = closure.iter().collect();
    names.sort();
    for (i, a) in names.iter().enumerate() {
        let manifest_a = catalog.get(a).expect("closure members exist in catalog");
        for b in &names[i + 1..] {
            if manifest_a.never_load.contains(b.as_str()) {
                return Err(WtdError::IncompatibleExtensions {
                    a: (*a).clone(),
                    b: (*b).clone(),
                });
            }
            let manifest_b = catalog.get(b).expect("closure members exist in catalog");
            if manifest_b.never_load.contains(a.as_str()) {
                return Err(WtdError::IncompatibleExtensions {
                    a: (*a).clone(),
                    b: (*b).clone(),
                });
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Grey/black DFS topological sort over the dependency graph restricted
/// to `closure`, visiting candidates in name-ascending order at every
/// branch point for determinism.
fn topo_sort(catalog: &ExtensionCatalog, closure: &HashSet<String>) -> Result<Vec<String>> {
    use std::collections::HashMap;

    let mut colors: HashMap<&str, Color> = closure.iter().map(|n| (n.as_str(), Color::White)).collect();
    let mut order: Vec<String> = Vec::with_capacity(closure.len());
    let mut sorted_names: Vec<&String> = closure.iter().collect();
    sorted_names.sort();

    for name in &sorted_names {
        if colors[name.as_str()] == Color::White {
            let mut path = Vec::new();
            visit(catalog, name.as_str(), &mut colors, &mut order, &mut path)?;
        }
    }
    Ok(order)
}

fn visit<'a>(
    catalog: &'a ExtensionCatalog,
    name: &'a str,
    colors: &mut std::collections::HashMap<&'a str, Color>,
    order: &mut Vec<String>,
    path: &mut Vec<String>,
) -> Result<()> {
    colors.insert(name, Color::Grey);
    path.push(name.to_string());

    let manifest = catalog.get(name).expect("visited names exist in catalog");
    let mut deps: Vec<&String> = manifest.dependencies.iter().collect();
    deps.sort();

    for dep in deps {
        match colors.get(dep.as_str()) {
            Some(Color::White) | None => {
                // `None` only when dep fell outside the closure, which
                // transitive_closure already rules out.
                colors.entry(dep.as_str()).or_insert(Color::White);
                visit(catalog, dep.as_str(), colors, order, path)?;
            }
            Some(Color::Grey) => {
                let mut cycle_path = path.clone();
                cycle_path.push(dep.clone());
                return Err(WtdError::DependencyCycle {
                    path: cycle_path.join(" -> "),
                });
            }
            Some(Color::Black) => {}
        }
    }

    colors.insert(name, Color::Black);
    path.pop();
    order.push(name.to_string());
    debug!("resolved extension '{name}'");
    Ok(())
}
