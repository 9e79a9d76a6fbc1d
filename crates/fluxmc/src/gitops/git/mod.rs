//! Git operations for writing manifests back to a remote repository.

pub mod auth;
pub mod memory;
pub mod parse;
pub mod repository;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::gitops::error::{GitOpsError, Result};
use crate::sanitize::safe_relative_path;

pub use memory::{MemoryCommit, MemoryRemote, MemoryRepository};
pub use repository::GitRepository;

/// A single working-directory-backed repository.
///
/// Every operation except [`VersionControl::clone_into`] requires a prior
/// successful clone and fails with [`GitOpsError::GitNotInitialized`] otherwise.
/// Paths passed to `add` and `remove` are relative to the working directory root.
#[async_trait]
pub trait VersionControl: Send {
    /// Clones the remote into `dir`. On failure or cancellation nothing usable is
    /// left in `dir` and the handle stays uncloned.
    async fn clone_into(&mut self, cancel: &CancellationToken, dir: &Path) -> Result<()>;

    /// Stages the file at `path`, including its deletion if it was removed on disk.
    fn add(&mut self, path: &Path) -> Result<()>;

    /// Stages removal of a file, or of every tracked file below a directory.
    fn remove(&mut self, path: &Path) -> Result<()>;

    /// Commits the staging area on top of the current branch tip.
    fn commit(&mut self, message: &str, author_name: &str, author_email: &str) -> Result<()>;

    /// Pushes the current branch to the remote it was cloned from.
    async fn push(&mut self, cancel: &CancellationToken) -> Result<()>;

    /// The working directory, once cloned.
    fn workdir(&self) -> Option<&Path>;
}

/// Validates a caller-supplied path and returns it relative to the working directory.
pub(crate) fn worktree_relative(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() || path.has_root() {
        return Err(GitOpsError::InvalidPath(format!(
            "'{}' must be relative to the working directory",
            path.display()
        )));
    }
    safe_relative_path(path).ok_or_else(|| {
        GitOpsError::InvalidPath(format!(
            "'{}' does not name a path inside the working directory",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worktree_relative() {
        assert_eq!(
            worktree_relative(Path::new("control-plane/ns.yaml")).unwrap(),
            PathBuf::from("control-plane/ns.yaml")
        );
        assert!(matches!(
            worktree_relative(Path::new("/tmp/repo/file")),
            Err(GitOpsError::InvalidPath(_))
        ));
        assert!(matches!(
            worktree_relative(Path::new("../outside")),
            Err(GitOpsError::InvalidPath(_))
        ));
    }
}
