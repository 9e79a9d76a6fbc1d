//! Artifact sync reconciler: fetch → extract → discover → create-or-update.
//!
//! Invoked once per source event by an external work queue. Each call is a full,
//! idempotent pass: every application directory found in the source's latest
//! artifact ends up as an `Application` object pointing back at the source.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::artifact::{discover_apps, ArtifactError, ArtifactExtractor, ArtifactFetcher};
use super::resource::{Application, GitRepositorySource, NamespacedName, Object, SyncSettings};
use super::store::{ObjectStore, StoreError};
use super::sync_errors::AppSyncErrors;
use crate::sanitize::redact_repo_url;

/// Errors that end a reconcile cycle.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to get source {key}: {source}")]
    GetSource {
        key: NamespacedName,
        #[source]
        source: StoreError,
    },

    #[error("failed to fetch artifact: {0}")]
    Fetch(#[source] ArtifactError),

    #[error("failed to extract artifact: {0}")]
    Extract(#[source] ArtifactError),

    #[error("failed to discover applications: {0}")]
    Discover(#[source] ArtifactError),

    #[error("failed to sync applications:\n{0}")]
    Apps(AppSyncErrors),

    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            SyncError::Cancelled => true,
            SyncError::Fetch(e) | SyncError::Extract(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Per-application failures, if the cycle got as far as syncing them.
    pub fn app_errors(&self) -> Option<&AppSyncErrors> {
        match self {
            SyncError::Apps(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Expands the `apps/` directories of a source artifact into `Application` objects.
///
/// Holds only shared handles, so one reconciler can serve concurrent cycles for
/// different sources.
pub struct ArtifactSyncReconciler {
    sources: Arc<dyn ObjectStore<GitRepositorySource>>,
    apps: Arc<dyn ObjectStore<Application>>,
    fetcher: Arc<dyn ArtifactFetcher>,
    extractor: Arc<dyn ArtifactExtractor>,
    settings: SyncSettings,
}

impl ArtifactSyncReconciler {
    pub fn new(
        sources: Arc<dyn ObjectStore<GitRepositorySource>>,
        apps: Arc<dyn ObjectStore<Application>>,
        fetcher: Arc<dyn ArtifactFetcher>,
        extractor: Arc<dyn ArtifactExtractor>,
    ) -> Self {
        Self {
            sources,
            apps,
            fetcher,
            extractor,
            settings: SyncSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Runs one sync cycle for the source identified by `key`.
    ///
    /// A missing source or one without an artifact yet is not an error.
    /// Per-application failures do not stop the cycle; they are returned together
    /// as [`SyncError::Apps`] once every application was attempted.
    pub async fn reconcile(
        &self,
        key: &NamespacedName,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let source = match self.sources.get(key).await {
            Ok(source) => source,
            Err(StoreError::NotFound(_)) => {
                log::debug!("Source {} not found, nothing to sync", key);
                return Ok(());
            }
            Err(e) => {
                return Err(SyncError::GetSource {
                    key: key.clone(),
                    source: e,
                })
            }
        };

        let url = source.artifact_url();
        if url.is_empty() {
            log::info!("Source {} not ready, no artifact yet", key);
            return Ok(());
        }

        let data = self
            .fetcher
            .fetch(url, cancel)
            .await
            .map_err(SyncError::Fetch)?;
        log::debug!(
            "Fetched {} bytes from {}",
            data.len(),
            redact_repo_url(url)
        );

        // Removed on every return path.
        let workdir = tempfile::Builder::new()
            .prefix("fluxmc-artifact-")
            .tempdir()
            .map_err(|e| SyncError::Extract(ArtifactError::Unpack(e)))?;
        let extractor = Arc::clone(&self.extractor);
        let dest = workdir.path().to_path_buf();
        tokio::task::spawn_blocking(move || extractor.extract(&data, &dest))
            .await
            .map_err(|e| SyncError::Extract(ArtifactError::Unpack(std::io::Error::other(e))))?
            .map_err(SyncError::Extract)?;

        let names = discover_apps(workdir.path(), &self.settings.apps_directory)
            .map_err(SyncError::Discover)?;
        log::info!("Syncing {} application(s) from {}", names.len(), key);

        let mut errors = AppSyncErrors::new();
        for name in &names {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if let Err(e) = self.sync_app(name, key).await {
                log::warn!("Failed to sync application {}: {}", name, e);
                errors.insert(name.clone(), e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Apps(errors))
        }
    }

    async fn sync_app(&self, name: &str, source: &NamespacedName) -> Result<(), StoreError> {
        let desired = Application::for_source(name, source);

        match self.apps.create(&desired).await {
            Ok(_) => {
                log::debug!("Created application {}", desired.key());
                Ok(())
            }
            Err(StoreError::AlreadyExists(_)) => {
                let mut existing = self.apps.get(&desired.key()).await?;
                existing.spec = desired.spec;
                self.apps.update(&existing).await?;
                log::debug!("Updated application {}", existing.key());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
