pub mod bootstrap;
pub mod config;
pub mod error;
pub mod gitops;
pub mod sanitize;
pub mod secrets;

pub use bootstrap::{bootstrap, control_plane_source, BootstrapOutcome};
pub use config::{load_config, load_config_from_str, Config};
pub use error::{ConfigError, FluxmcError, Result};
pub use gitops::{ArtifactSyncReconciler, GitOpsError, ManifestPublisher, VersionControl};
pub use secrets::{resolve_secret, SecretError};
