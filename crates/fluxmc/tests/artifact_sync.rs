//! Artifact sync through the production fetcher and extractor.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{apps_artifact, tarball};
use fluxmc::gitops::{
    Application, ArtifactSyncReconciler, GitRepositorySource, HttpFetcher, MemoryStore,
    NamespacedName, Object, StoreOp, SyncError, SyncSettings, TarGzExtractor,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct SyncHarness {
    artifacts: TempDir,
    sources: Arc<MemoryStore<GitRepositorySource>>,
    apps: Arc<MemoryStore<Application>>,
    reconciler: ArtifactSyncReconciler,
    key: NamespacedName,
}

impl SyncHarness {
    fn new() -> Self {
        let sources = Arc::new(MemoryStore::new());
        let apps = Arc::new(MemoryStore::new());
        let reconciler = ArtifactSyncReconciler::new(
            sources.clone(),
            apps.clone(),
            Arc::new(HttpFetcher::new().unwrap()),
            Arc::new(TarGzExtractor),
        );
        Self {
            artifacts: TempDir::new().unwrap(),
            sources,
            apps,
            reconciler,
            key: NamespacedName::new("flux-system", "control-plane"),
        }
    }

    /// Publishes `data` as the source's latest artifact.
    fn serve(&self, name: &str, data: &[u8]) {
        let path = self.artifacts.path().join(name);
        std::fs::write(&path, data).unwrap();
        self.sources.insert(
            GitRepositorySource::git_repository(
                &self.key.namespace,
                &self.key.name,
                "https://git.example.org/cp.git",
                "main",
            )
            .with_artifact_url(file_url(&path)),
        );
    }

    async fn reconcile(&self) -> Result<(), SyncError> {
        self.reconciler
            .reconcile(&self.key, &CancellationToken::new())
            .await
    }

    fn app_names(&self) -> Vec<String> {
        self.apps
            .list()
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[tokio::test]
async fn test_sync_creates_then_updates() {
    let h = SyncHarness::new();
    h.serve("a.tar.gz", &apps_artifact(&["a", "b", "c"]));

    h.reconcile().await.unwrap();
    assert_eq!(h.app_names(), vec!["a", "b", "c"]);
    let first = h.apps.list();

    h.reconcile().await.unwrap();
    let second = h.apps.list();
    assert_eq!(second.len(), 3);
    for (before, after) in first.iter().zip(&second) {
        assert_eq!(before.key(), after.key());
        assert_ne!(before.metadata.resource_version, after.metadata.resource_version);
        assert_eq!(after.spec.repo.namespace, "flux-system");
        assert_eq!(after.spec.repo.name, "control-plane");
    }
}

#[tokio::test]
async fn test_sync_partial_failure() {
    let h = SyncHarness::new();
    h.serve("a.tar.gz", &apps_artifact(&["a", "b", "c"]));
    h.apps.fail_on(StoreOp::Create, "b", "quota exceeded");

    let err = h.reconcile().await.unwrap_err();
    let errors = err.app_errors().expect("per-app errors");
    assert_eq!(errors.len(), 1);
    assert!(errors.contains("b"));
    assert_eq!(h.app_names(), vec!["a", "c"]);
    assert_eq!(
        err.to_string(),
        "failed to sync applications:\nb: quota exceeded\n"
    );
}

#[tokio::test]
async fn test_sync_ignores_files_and_other_directories() {
    let h = SyncHarness::new();
    h.serve(
        "a.tar.gz",
        &tarball(&[
            ("apps/podinfo/kustomization.yaml", "resources: []\n"),
            ("apps/notes.md", "not an app\n"),
            ("infrastructure/ingress/kustomization.yaml", "resources: []\n"),
        ]),
    );

    h.reconcile().await.unwrap();
    assert_eq!(h.app_names(), vec!["podinfo"]);
}

#[tokio::test]
async fn test_sync_without_apps_directory() {
    let h = SyncHarness::new();
    h.serve("a.tar.gz", &tarball(&[("README.md", "hello\n")]));

    h.reconcile().await.unwrap();
    assert!(h.apps.is_empty());
}

#[tokio::test]
async fn test_sync_custom_apps_directory() {
    let mut h = SyncHarness::new();
    h.reconciler = ArtifactSyncReconciler::new(
        h.sources.clone(),
        h.apps.clone(),
        Arc::new(HttpFetcher::new().unwrap()),
        Arc::new(TarGzExtractor),
    )
    .with_settings(SyncSettings {
        apps_directory: "clusters/mgmt/apps".to_string(),
    });
    h.serve(
        "a.tar.gz",
        &tarball(&[("clusters/mgmt/apps/x/kustomization.yaml", "resources: []\n")]),
    );

    h.reconcile().await.unwrap();
    assert_eq!(h.app_names(), vec!["x"]);
}

#[tokio::test]
async fn test_sync_missing_artifact() {
    let h = SyncHarness::new();
    h.serve("a.tar.gz", &apps_artifact(&["a"]));
    std::fs::remove_file(h.artifacts.path().join("a.tar.gz")).unwrap();

    let err = h.reconcile().await.unwrap_err();
    assert!(matches!(err, SyncError::Fetch(_)));
    assert!(h.apps.is_empty());
}

#[tokio::test]
async fn test_sync_corrupt_artifact() {
    let h = SyncHarness::new();
    h.serve("a.tar.gz", b"definitely not gzip");

    let err = h.reconcile().await.unwrap_err();
    assert!(matches!(err, SyncError::Extract(_)));
}
