//! GitOps-specific error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Error, Debug)]
pub enum GitOpsError {
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Destination is not a directory: {0}")]
    DestinationNotDirectory(PathBuf),

    #[error("File operation failed: {0}")]
    FileOperation(String),

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Git network error: {0}")]
    GitNetworkError(String),

    #[error("Git authentication failed: {0}")]
    GitAuthFailed(String),

    #[error("Git repository not initialized")]
    GitNotInitialized,

    #[error("Nothing to commit")]
    NothingToCommit,

    #[error("Path does not exist: {0}")]
    PathNotFound(String),

    #[error("Path traversal detected: {0}")]
    PathTraversal(String),

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<std::io::Error> for GitOpsError {
    fn from(err: std::io::Error) -> Self {
        GitOpsError::FileOperation(err.to_string())
    }
}

impl GitOpsError {
    /// Returns true if the error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GitOpsError::GitNetworkError(_))
    }

    /// Returns true if the operation was aborted by its cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GitOpsError::Cancelled)
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> GitOpsError {
    let lower = stderr.to_lowercase();

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("could not read username")
        || lower.contains("could not read password")
    {
        return GitOpsError::GitAuthFailed(stderr.trim().to_string());
    }

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return GitOpsError::GitNetworkError(stderr.trim().to_string());
    }

    GitOpsError::GitOperation(stderr.trim().to_string())
}

/// Result type for GitOps operations.
pub type Result<T> = std::result::Result<T, GitOpsError>;
