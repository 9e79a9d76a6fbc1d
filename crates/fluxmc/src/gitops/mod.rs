//! GitOps building blocks for fluxmc.
//!
//! - `git`: clone/stage/commit/push against a remote repository
//! - `publisher`: commit-and-push of a fixed manifest tree
//! - `reconciler`: expands source artifacts into `Application` objects
//! - `store`: object store seam with an in-memory implementation

pub mod artifact;
pub mod error;
pub mod git;
pub mod manifests;
pub mod publisher;
pub mod reconciler;
pub mod resource;
pub mod store;
pub mod sync_errors;

pub use artifact::{
    discover_apps, ArtifactError, ArtifactExtractor, ArtifactFetcher, HttpFetcher, TarGzExtractor,
};
pub use error::{GitOpsError, Result};
pub use git::{GitRepository, MemoryRemote, MemoryRepository, VersionControl};
pub use manifests::{EmbeddedFile, CONTROL_PLANE_MANIFESTS};
pub use publisher::{ManifestPublisher, PublishError, PublishReport, PublishStep};
pub use reconciler::{ArtifactSyncReconciler, SyncError};
pub use resource::{
    Application, ApplicationSpec, CrossNamespaceSourceReference, GitAuthSettings, GitAuthType,
    GitRepositoryRef, GitRepositorySource, GitRepositorySpec, GitRepositoryStatus, GitSettings,
    NamespacedName, Object, ObjectMeta, PublishSettings, Resource, ResourceKind, SyncSettings,
    APPLICATION_API_VERSION, SOURCE_API_VERSION,
};
pub use store::{MemoryStore, ObjectStore, StoreError, StoreOp};
pub use sync_errors::AppSyncErrors;
