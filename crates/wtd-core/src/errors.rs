//! Error types and handling
//!
//! Domain errors for the reconciliation engine, one variant per failure
//! kind named in the CLI specification. Each variant is mapped to a fixed
//! process exit code so `wtd`'s `main` never has to re-derive the table.

use thiserror::Error;

/// Domain errors produced by the reconciliation engine.
#[derive(Error, Debug)]
pub enum WtdError {
    /// The `owner/repo[@branch][#subfolder]` specifier failed to parse.
    #[error("malformed specifier: {reason}")]
    MalformedSpec { reason: String },

    /// The effective extension catalog failed validation (unknown
    /// dependency, duplicate name within a tier, malformed regex).
    #[error("catalog invalid: {reason}")]
    CatalogInvalid { reason: String },

    /// A single extension manifest failed to parse.
    #[error("manifest invalid at {path}: {reason}")]
    ManifestInvalid { path: String, reason: String },

    /// An extension's dependency list names an extension absent from the
    /// effective catalog.
    #[error("extension '{extension}' depends on missing extension '{dependency}'")]
    DependencyMissing {
        extension: String,
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected: {path}")]
    DependencyCycle { path: String },

    /// Two requested extensions are mutually exclusive via `never_load`.
    #[error("incompatible extensions requested: '{a}' and '{b}'")]
    IncompatibleExtensions { a: String, b: String },

    /// A worktree directory exists but is not a registered git worktree.
    #[error("worktree conflict at {path}: directory exists but is not a registered worktree")]
    WorktreeConflict { path: String },

    /// A `git` subprocess invocation failed.
    #[error("git command failed ({cmd}): {stderr}")]
    GitFailure { cmd: String, stderr: String },

    /// The image build (via the build engine) failed.
    #[error("build failed: {stderr}")]
    BuildFailed { stderr: String },

    /// A container operation (create/start/attach/exec/prune) failed.
    #[error("container operation '{op}' failed: {stderr}")]
    ContainerFailure { op: String, stderr: String },

    /// The invocation was cancelled by a signal.
    #[error("cancelled")]
    Cancelled,

    /// A best-effort lock on the worktree could not be acquired.
    #[error("busy: {path} is locked by another invocation")]
    Busy { path: String },

    /// Wrapping I/O error with no more specific domain meaning.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WtdError {
    /// The process exit code this error should produce, per spec.md §7.
    pub fn exit_code(&self) -> i32 {
        match self {
            WtdError::MalformedSpec { .. }
            | WtdError::CatalogInvalid { .. }
            | WtdError::ManifestInvalid { .. }
            | WtdError::DependencyMissing { .. }
            | WtdError::DependencyCycle { .. }
            | WtdError::IncompatibleExtensions { .. } => 3,
            WtdError::WorktreeConflict { .. } | WtdError::GitFailure { .. } => 4,
            WtdError::BuildFailed { .. } => 5,
            WtdError::ContainerFailure { .. } | WtdError::Busy { .. } => 6,
            WtdError::Cancelled => 130,
            WtdError::Io(_) => 1,
        }
    }
}

/// Convenience alias for results returned by the reconciliation engine.
pub type Result<T> = std::result::Result<T, WtdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_spec_table() {
        assert_eq!(
            WtdError::MalformedSpec {
                reason: "x".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            WtdError::GitFailure {
                cmd: "fetch".into(),
                stderr: "x".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(
            WtdError::BuildFailed { stderr: "x".into() }.exit_code(),
            5
        );
        assert_eq!(
            WtdError::ContainerFailure {
                op: "create".into(),
                stderr: "x".into()
            }
            .exit_code(),
            6
        );
        assert_eq!(WtdError::Cancelled.exit_code(), 130);
        assert_eq!(
            WtdError::Busy { path: "x".into() }.exit_code(),
            6
        );
    }
}
