//! The `bootstrap` workflow: push the control-plane manifests and describe the
//! `GitRepository` source that makes Flux pull them.

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::gitops::git::{GitRepository, VersionControl};
use crate::gitops::manifests::CONTROL_PLANE_MANIFESTS;
use crate::gitops::publisher::{ManifestPublisher, PublishReport};
use crate::gitops::resource::GitRepositorySource;
use crate::sanitize::redact_repo_url;

/// Name of the source object tracking the control-plane repository.
pub const CONTROL_PLANE_SOURCE_NAME: &str = "control-plane";

/// Namespace the Flux source controller watches.
pub const FLUX_NAMESPACE: &str = "flux-system";

/// Result of a bootstrap run.
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub report: PublishReport,
    /// Source object to apply to the cluster.
    pub source: GitRepositorySource,
}

/// The `GitRepository` source for the control-plane repository at `url`.
pub fn control_plane_source(url: &str, branch: &str) -> GitRepositorySource {
    GitRepositorySource::git_repository(FLUX_NAMESPACE, CONTROL_PLANE_SOURCE_NAME, url, branch)
}

/// Publishes the embedded control-plane manifests to `config.git.repository`.
///
/// The repository is cloned at `config.publish.branch`, regardless of `config.git.branch`.
pub async fn bootstrap(config: &Config, cancel: &CancellationToken) -> Result<BootstrapOutcome> {
    if config.git.repository.trim().is_empty() {
        return Err(ConfigError::MissingRepository.into());
    }

    let mut settings = config.git.clone();
    settings.branch = config.publish.branch.clone();
    let mut repo = GitRepository::new(settings);

    bootstrap_with(&mut repo, config, cancel).await
}

/// Like [`bootstrap`], with a caller-provided repository handle.
pub async fn bootstrap_with<R>(
    repo: &mut R,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<BootstrapOutcome>
where
    R: VersionControl + ?Sized,
{
    log::info!(
        "Bootstrapping control plane into {}",
        redact_repo_url(&config.git.repository)
    );

    let publisher = ManifestPublisher::new(config.publish.clone());
    let report = publisher
        .publish(repo, CONTROL_PLANE_MANIFESTS, cancel)
        .await?;

    Ok(BootstrapOutcome {
        report,
        source: control_plane_source(&config.git.repository, &config.publish.branch),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FluxmcError;
    use crate::gitops::git::{MemoryRemote, MemoryRepository};

    #[test]
    fn test_control_plane_source() {
        let source = control_plane_source("https://git.example.org/cp.git", "main");
        assert_eq!(source.metadata.name, "control-plane");
        assert_eq!(source.metadata.namespace, "flux-system");
        assert_eq!(source.spec.url, "https://git.example.org/cp.git");
        assert_eq!(source.spec.interval, "1m");
        assert_eq!(source.spec.reference.as_ref().unwrap().branch, "main");
    }

    #[tokio::test]
    async fn test_bootstrap_requires_repository() {
        let err = bootstrap(&Config::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FluxmcError::Config(ConfigError::MissingRepository)));
        assert_eq!(
            err.to_string(),
            "Configuration error: a control-plane repository needs to be provided"
        );
    }

    #[tokio::test]
    async fn test_bootstrap_with_memory_repository() {
        let remote = MemoryRemote::with_files([("README.md", "cp")]);
        let mut repo = MemoryRepository::new(remote.clone());
        let mut config = Config::default();
        config.git.repository = "https://git.example.org/cp.git".to_string();

        let outcome = bootstrap_with(&mut repo, &config, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.report.files.len(), CONTROL_PLANE_MANIFESTS.len());
        assert_eq!(outcome.source.spec.url, "https://git.example.org/cp.git");
        assert!(remote.file("control-plane/kustomization.yaml").is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_push_failure() {
        let remote = MemoryRemote::with_files([("README.md", "cp")]);
        remote.reject_pushes("remote: permission to cp.git denied");
        let mut repo = MemoryRepository::new(remote);
        let mut config = Config::default();
        config.git.repository = "https://git.example.org/cp.git".to_string();

        let err = bootstrap_with(&mut repo, &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("could not push control plane manifests: could not push bootstrap content"));
    }
}
