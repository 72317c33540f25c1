use super::image::ReferenceError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a git operation, with the sub-command and its stderr.
#[derive(Debug, Clone, Error)]
#[error("git {operation} failed: {reason}")]
pub struct VcsError {
    pub operation: String,
    pub reason: String,
}

impl VcsError {
    pub fn new(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Image '{0}' is not referenced by the manifest")]
    NotTracked(String),
    #[error("Cannot build a lookup pattern for image '{image}': {reason}")]
    Pattern { image: String, reason: String },
    #[error("Manifest {path} would no longer parse after the update: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

#[derive(Debug, Error)]
pub enum UpdateError {
    /// Missing tool or credential. Raised before anything is mutated.
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Policy rejected update of '{component}' on '{base_branch}': {reason}")]
    PolicyRejection {
        component: String,
        base_branch: String,
        reason: String,
    },
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("Pull request operation failed: {0}")]
    PullRequest(String),
    #[error("Registry lookup failed: {0}")]
    Registry(String),
    #[error(transparent)]
    InvalidReference(#[from] ReferenceError),
}

impl UpdateError {
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Self::PolicyRejection { .. })
    }
}
