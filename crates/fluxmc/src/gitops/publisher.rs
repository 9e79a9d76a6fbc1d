//! Writes a manifest tree into a remote repository: clone, write, stage, commit, push.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::error::GitOpsError;
use super::git::VersionControl;
use super::manifests::EmbeddedFile;
use super::resource::PublishSettings;
use crate::sanitize::safe_relative_path;

/// The publish step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    CreateWorkdir,
    Clone,
    Write,
    Stage,
    Commit,
    Push,
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PublishStep::CreateWorkdir => "create temporary directory",
            PublishStep::Clone => "clone git repository",
            PublishStep::Write => "copy bootstrap files to local clone",
            PublishStep::Stage => "stage bootstrap files",
            PublishStep::Commit => "commit bootstrap content",
            PublishStep::Push => "push bootstrap content",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
#[error("could not {step}: {source}")]
pub struct PublishError {
    pub step: PublishStep,
    #[source]
    pub source: GitOpsError,
}

impl PublishError {
    fn at(step: PublishStep) -> impl FnOnce(GitOpsError) -> Self {
        move |source| Self { step, source }
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }
}

/// What a publish run pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Repository-relative paths written, in tree order.
    pub files: Vec<PathBuf>,
}

/// Commits a fixed file tree into a repository subdirectory and pushes it.
#[derive(Debug, Clone, Default)]
pub struct ManifestPublisher {
    settings: PublishSettings,
}

impl ManifestPublisher {
    pub fn new(settings: PublishSettings) -> Self {
        Self { settings }
    }

    /// Clones `repo` into a temporary directory, writes `files` below the
    /// configured subdirectory, commits them in one commit and pushes.
    ///
    /// The temporary clone is removed when this returns, on success or not.
    pub async fn publish<R>(
        &self,
        repo: &mut R,
        files: &[EmbeddedFile],
        cancel: &CancellationToken,
    ) -> Result<PublishReport, PublishError>
    where
        R: VersionControl + ?Sized,
    {
        let workdir = tempfile::Builder::new()
            .prefix("fluxmc-bootstrap-")
            .tempdir()
            .map_err(|e| PublishError::at(PublishStep::CreateWorkdir)(e.into()))?;

        repo.clone_into(cancel, workdir.path())
            .await
            .map_err(PublishError::at(PublishStep::Clone))?;

        let subdir = safe_relative_path(Path::new(&self.settings.subdirectory)).ok_or_else(|| {
            PublishError::at(PublishStep::Write)(GitOpsError::PathTraversal(
                self.settings.subdirectory.clone(),
            ))
        })?;

        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let relative = subdir.join(
                safe_relative_path(Path::new(file.path)).ok_or_else(|| {
                    PublishError::at(PublishStep::Write)(GitOpsError::PathTraversal(
                        file.path.to_string(),
                    ))
                })?,
            );

            write_manifest(workdir.path(), &relative, file.contents.as_bytes())
                .map_err(PublishError::at(PublishStep::Write))?;
            repo.add(&relative)
                .map_err(PublishError::at(PublishStep::Stage))?;
            log::debug!("Staged {}", relative.display());
            written.push(relative);
        }

        repo.commit(
            &self.settings.commit_message,
            &self.settings.author_name,
            &self.settings.author_email,
        )
        .map_err(PublishError::at(PublishStep::Commit))?;

        repo.push(cancel)
            .await
            .map_err(PublishError::at(PublishStep::Push))?;
        log::info!(
            "Pushed {} manifest(s) to {}/ on branch {}",
            written.len(),
            subdir.display(),
            self.settings.branch
        );

        Ok(PublishReport { files: written })
    }
}

/// Writes `contents` to `root/relative` with owner-only permissions.
fn write_manifest(root: &Path, relative: &Path, contents: &[u8]) -> Result<(), GitOpsError> {
    let dest = root.join(relative);
    if let Some(parent) = dest.parent() {
        ensure_directory(root, parent)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let write_error = |e| GitOpsError::WriteFile {
        path: dest.clone(),
        source: e,
    };
    let mut file = options.open(&dest).map_err(write_error)?;
    file.write_all(contents).map_err(write_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o600))
            .map_err(write_error)?;
    }
    Ok(())
}

/// Creates `dir` and its missing parents below `root`.
///
/// Fails with [`GitOpsError::DestinationNotDirectory`] when a file occupies `dir`
/// or one of its ancestors.
pub(crate) fn ensure_directory(root: &Path, dir: &Path) -> Result<(), GitOpsError> {
    for ancestor in dir.ancestors() {
        match std::fs::metadata(ancestor) {
            Ok(meta) if meta.is_dir() => break,
            Ok(_) => return Err(GitOpsError::DestinationNotDirectory(ancestor.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            // a file further up answers NotADirectory; keep walking to report it
            Err(_) if ancestor != root => {}
            Err(e) => {
                return Err(GitOpsError::ReadFile {
                    path: ancestor.to_path_buf(),
                    source: e,
                })
            }
        }
        if ancestor == root {
            break;
        }
    }

    std::fs::create_dir_all(dir).map_err(|e| GitOpsError::CreateDirectory {
        path: dir.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitops::git::{MemoryRemote, MemoryRepository};
    use crate::gitops::manifests::CONTROL_PLANE_MANIFESTS;
    use tempfile::TempDir;

    const FILES: &[EmbeddedFile] = &[
        EmbeddedFile::new("namespace.yaml", "kind: Namespace\n"),
        EmbeddedFile::new("crds/app.yaml", "kind: CustomResourceDefinition\n"),
    ];

    #[tokio::test]
    async fn test_publish_single_commit() {
        let remote = MemoryRemote::with_files([("README.md", "cp")]);
        let mut repo = MemoryRepository::new(remote.clone());

        let report = ManifestPublisher::default()
            .publish(&mut repo, FILES, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            report.files,
            vec![
                PathBuf::from("control-plane/namespace.yaml"),
                PathBuf::from("control-plane/crds/app.yaml"),
            ]
        );

        let commits = remote.commits();
        assert_eq!(commits.len(), 2);
        let tip = commits.last().unwrap();
        assert_eq!(tip.message, "add bootstrap manifests");
        assert_eq!(tip.author_name, "Flux MC");
        assert_eq!(tip.added.len(), 2);
        assert_eq!(
            remote.file("control-plane/crds/app.yaml").unwrap(),
            b"kind: CustomResourceDefinition\n"
        );
    }

    #[tokio::test]
    async fn test_publish_embedded_tree() {
        let remote = MemoryRemote::with_files([("README.md", "cp")]);
        let mut repo = MemoryRepository::new(remote.clone());

        ManifestPublisher::default()
            .publish(&mut repo, CONTROL_PLANE_MANIFESTS, &CancellationToken::new())
            .await
            .unwrap();
        for file in CONTROL_PLANE_MANIFESTS {
            let path = format!("control-plane/{}", file.path);
            assert_eq!(remote.file(&path).unwrap(), file.contents.as_bytes(), "{}", path);
        }
    }

    #[tokio::test]
    async fn test_republish_unchanged_fails_at_commit() {
        let remote = MemoryRemote::with_files([("README.md", "cp")]);
        let publisher = ManifestPublisher::default();
        let cancel = CancellationToken::new();

        publisher
            .publish(&mut MemoryRepository::new(remote.clone()), FILES, &cancel)
            .await
            .unwrap();
        let err = publisher
            .publish(&mut MemoryRepository::new(remote.clone()), FILES, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.step, PublishStep::Commit);
        assert!(matches!(err.source, GitOpsError::NothingToCommit));
        assert!(err.to_string().starts_with("could not commit bootstrap content"));
        assert_eq!(remote.commits().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_cancelled_before_clone() {
        let remote = MemoryRemote::with_files([("README.md", "cp")]);
        let mut repo = MemoryRepository::new(remote.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ManifestPublisher::default()
            .publish(&mut repo, FILES, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.step, PublishStep::Clone);
        assert!(err.is_cancelled());
        assert_eq!(remote.commits().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_push_rejected() {
        let remote = MemoryRemote::with_files([("README.md", "cp")]);
        remote.reject_pushes("pre-receive hook declined");
        let mut repo = MemoryRepository::new(remote.clone());

        let err = ManifestPublisher::default()
            .publish(&mut repo, FILES, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.step, PublishStep::Push);
        assert!(err.to_string().starts_with("could not push bootstrap content"));
        assert!(remote.file("control-plane/namespace.yaml").is_none());
    }

    #[tokio::test]
    async fn test_publish_destination_not_directory() {
        let remote = MemoryRemote::with_files([("control-plane", "i am a file")]);
        let mut repo = MemoryRepository::new(remote.clone());

        let err = ManifestPublisher::default()
            .publish(&mut repo, FILES, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.step, PublishStep::Write);
        assert!(matches!(err.source, GitOpsError::DestinationNotDirectory(_)));
    }

    #[tokio::test]
    async fn test_publish_subdirectory_is_file_nested_manifest_first() {
        let remote = MemoryRemote::with_files([("control-plane", "i am a file")]);
        let mut repo = MemoryRepository::new(remote.clone());
        let files = [EmbeddedFile::new("crds/app.yaml", "kind: CustomResourceDefinition\n")];

        let err = ManifestPublisher::default()
            .publish(&mut repo, &files, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.step, PublishStep::Write);
        match err.source {
            GitOpsError::DestinationNotDirectory(path) => assert!(path.ends_with("control-plane")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(remote.commits().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_rejects_escaping_paths() {
        let remote = MemoryRemote::with_files([("README.md", "cp")]);
        let mut repo = MemoryRepository::new(remote.clone());
        let files = [EmbeddedFile::new("../outside.yaml", "kind: Secret\n")];

        let err = ManifestPublisher::default()
            .publish(&mut repo, &files, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err.source, GitOpsError::PathTraversal(_)));
        assert_eq!(remote.commits().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_manifest_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), Path::new("a/b/c.yaml"), b"x").unwrap();
        let mode = std::fs::metadata(dir.path().join("a/b/c.yaml"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_ensure_directory_nested_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("blocker"), "x").unwrap();

        let err = ensure_directory(dir.path(), &dir.path().join("blocker/nested")).unwrap_err();
        match err {
            GitOpsError::DestinationNotDirectory(path) => assert_eq!(path, dir.path().join("blocker")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
