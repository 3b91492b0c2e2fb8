//! Repo specifier parsing
//!
//! Parses `owner/repo[@branch][#subfolder]` into a normalized
//! [`RepoSpecifier`]. This is pure parsing with no I/O: existence of the
//! owner/repo/branch on any remote is not checked here.

use crate::errors::{Result, WtdError};
use tracing::instrument;

const DEFAULT_BRANCH: &str = "main";

/// A normalized, validated repo specifier.
///
/// Identity is the `(owner, repo, branch, subfolder)` tuple: two specifiers
/// with the same fields are considered the same workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSpecifier {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub subfolder: Option<String>,
}

impl RepoSpecifier {
    /// Parse a raw specifier string per the grammar in spec.md §4.1:
    /// `owner "/" repo ("@" branch)? ("#" subfolder)?`.
    #[instrument]
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim() != raw || raw.is_empty() {
            return Err(WtdError::MalformedSpec {
                reason: "specifier must be non-empty and contain no leading/trailing whitespace"
                    .to_string(),
            });
        }
        if raw.chars().any(|c| c.is_whitespace()) {
            return Err(WtdError::MalformedSpec {
                reason: "specifier must not contain whitespace".to_string(),
            });
        }

        // Split off subfolder first: it runs to the end of the string.
        let (before_subfolder, subfolder) = match raw.split_once('#') {
            Some((head, tail)) => (head, Some(tail)),
            None => (raw, None),
        };

        let subfolder = match subfolder {
            Some(s) => Some(validate_subfolder(s)?),
            None => None,
        };

        // Split off branch: runs from '@' to the end of before_subfolder.
        let (before_branch, branch) = match before_subfolder.split_once('@') {
            Some((head, "")) => {
                return Err(WtdError::MalformedSpec {
                    reason: format!("empty branch in specifier after '@' in '{head}'"),
                })
            }
            Some((head, tail)) => (head, Some(tail)),
            None => (before_subfolder, None),
        };

        let (owner, repo) = before_branch.split_once('/').ok_or_else(|| WtdError::MalformedSpec {
            reason: format!("missing '/' between owner and repo in '{raw}'"),
        })?;

        validate_field("owner", owner)?;
        validate_field("repo", repo)?;
        let branch = match branch {
            Some(b) => validate_branch(b)?,
            None => DEFAULT_BRANCH.to_string(),
        };

        if repo.contains('/') {
            return Err(WtdError::MalformedSpec {
                reason: format!("repo must not contain '/': '{repo}'"),
            });
        }

        Ok(RepoSpecifier {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch,
            subfolder,
        })
    }

    /// Branch name with every `/` replaced by `-`, used for filesystem and
    /// container-identifier derivation. See spec.md §3.
    pub fn safe_branch(&self) -> String {
        self.branch.replace('/', "-")
    }

    /// `repo + "-" + safe_branch`, the base for container/image names.
    pub fn container_name(&self) -> String {
        format!("{}-{}", self.repo, self.safe_branch())
    }
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn validate_field(label: &str, value: &str) -> Result<()> {
    if value.is_empty() || !value.chars().all(is_allowed_char) {
        return Err(WtdError::MalformedSpec {
            reason: format!(
                "{label} must be non-empty and match [A-Za-z0-9._-]+, got '{value}'"
            ),
        });
    }
    Ok(())
}

fn validate_branch(value: &str) -> Result<String> {
    if value.is_empty() || !value.chars().all(|c| is_allowed_char(c) || c == '/') {
        return Err(WtdError::MalformedSpec {
            reason: format!(
                "branch must be non-empty and match [A-Za-z0-9._/-]+, got '{value}'"
            ),
        });
    }
    Ok(value.to_string())
}

fn validate_subfolder(value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(WtdError::MalformedSpec {
            reason: "subfolder after '#' must not be empty".to_string(),
        });
    }
    if value.split('/').any(|segment| segment == "..") {
        return Err(WtdError::MalformedSpec {
            reason: format!("subfolder must not contain path traversal: '{value}'"),
        });
    }
    if value.starts_with('/') {
        return Err(WtdError::MalformedSpec {
            reason: format!("subfolder must be relative: '{value}'"),
        });
    }
    Ok(value.to_string())
}
