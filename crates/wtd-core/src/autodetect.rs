//! Auto-detector: evaluates an extension's [`AutoDetect`] predicates
//! against a worktree root. See spec.md §4.4.
//!
//! Missing files/dirs are non-matches, not errors. Files that exist but
//! can't be opened (permissions, races) are logged and treated as
//! non-matches rather than failing the whole evaluation, mirroring how
//! `host_requirements.rs` treats an unreadable probe as "requirement not
//! met" instead of propagating an I/O error.

use crate::catalog::AutoDetect;
use regex::Regex;
use std::path::Path;
use tracing::{instrument, warn};

/// Evaluate whether `detect` matches anything under `worktree_root`.
///
/// Patterns in `files`/`directories` are matched against the *name* of
/// each direct child of `worktree_root` (not the full path, and not
/// recursively) using the pattern as an anchored regex.
#[instrument(skip(detect))]
pub fn matches(detect: &AutoDetect, worktree_root: &Path) -> bool {
    if !detect.files.is_empty() && match_any_child(worktree_root, &detect.files, false) {
        return true;
    }
    if !detect.directories.is_empty() && match_any_child(worktree_root, &detect.directories, true)
    {
        return true;
    }
    if detect.host_paths.iter().any(|p| Path::new(p).exists()) {
        return true;
    }
    if match_file_contents(worktree_root, detect) {
        return true;
    }
    false
}

fn match_any_child(root: &Path, patterns: &[String], want_dir: bool) -> bool {
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(e) => {
            warn!("failed to read {}: {e}", root.display());
            return false;
        }
    };

    let compiled: Vec<Regex> = patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("invalid auto_detect pattern '{p}': {e}");
                None
            }
        })
        .collect();

    for entry in entries.flatten() {
        let is_dir = entry.path().is_dir();
        if is_dir != want_dir {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if compiled.iter().any(|r| r.is_match(name)) {
            return true;
        }
    }
    false
}

fn match_file_contents(root: &Path, detect: &AutoDetect) -> bool {
    for (filename, substrings) in &detect.file_contents {
        let path = root.join(filename);
        if !path.is_file() {
            continue;
        }
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to read {}: {e}", path.display());
                continue;
            }
        };
        if substrings.iter().any(|s| contents.contains(s.as_str())) {
            return true;
        }
    }
    false
}
