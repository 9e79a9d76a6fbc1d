//! K8s-style resource types and GitOps settings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The API version of Flux source objects.
pub const SOURCE_API_VERSION: &str = "source.toolkit.fluxcd.io/v1beta1";

/// The API version of fluxmc applications.
pub const APPLICATION_API_VERSION: &str = "core.fluxmc.makk.es/v1alpha1";

/// The kind of resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    GitRepository,
    Application,
}

impl ResourceKind {
    /// Returns the API version objects of this kind are served under.
    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::GitRepository => SOURCE_API_VERSION,
            ResourceKind::Application => APPLICATION_API_VERSION,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::GitRepository => write!(f, "GitRepository"),
            ResourceKind::Application => write!(f, "Application"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gitrepository" => Ok(ResourceKind::GitRepository),
            "application" => Ok(ResourceKind::Application),
            _ => Err(format!("Unknown resource kind: {}", s)),
        }
    }
}

/// Identifies an object by namespace and name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Metadata for a resource, following K8s conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// The unique name of the resource within its namespace and kind.
    pub name: String,

    /// Namespace the resource lives in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Opaque version assigned by the object store, used for optimistic concurrency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Key-value labels for organizing and selecting resources.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    /// Key-value annotations for storing additional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

impl ObjectMeta {
    /// Creates a new ObjectMeta with a namespace and name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

/// A generic K8s-style resource wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource<T, S = ()> {
    pub api_version: String,

    pub kind: ResourceKind,

    pub metadata: ObjectMeta,

    pub spec: T,

    /// Observed state, written by the owning controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<S>,
}

impl<T, S> Resource<T, S> {
    /// Creates a new resource with the given kind and spec.
    pub fn new(
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: T,
    ) -> Self {
        Self {
            api_version: kind.api_version().to_string(),
            kind,
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: None,
        }
    }

    /// Returns the name of the resource.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// Common view over stored objects.
pub trait Object: Clone + Send + Sync + 'static {
    fn kind(&self) -> ResourceKind;
    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// The store key of this object.
    fn key(&self) -> NamespacedName {
        let meta = self.metadata();
        NamespacedName::new(meta.namespace.clone(), meta.name.clone())
    }
}

impl<T, S> Object for Resource<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// ============================================================================
// GitRepository source
// ============================================================================

/// Branch reference of a GitRepository source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitRepositoryRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
}

/// GitRepository specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositorySpec {
    /// Repository URL.
    pub url: String,

    /// Reconciliation interval, e.g. `1m`.
    #[serde(default = "default_interval")]
    pub interval: String,

    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<GitRepositoryRef>,
}

fn default_interval() -> String {
    "1m".to_string()
}

/// GitRepository status as published by the source controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryStatus {
    /// Download URL of the latest artifact. Empty until the source is ready.
    #[serde(default)]
    pub url: String,
}

pub type GitRepositorySource = Resource<GitRepositorySpec, GitRepositoryStatus>;

impl Resource<GitRepositorySpec, GitRepositoryStatus> {
    /// Creates a GitRepository source tracking `branch` of `url`.
    pub fn git_repository(
        namespace: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self::new(
            ResourceKind::GitRepository,
            namespace,
            name,
            GitRepositorySpec {
                url: url.into(),
                interval: default_interval(),
                reference: Some(GitRepositoryRef {
                    branch: branch.into(),
                }),
            },
        )
    }

    /// Sets the artifact URL reported in the status.
    pub fn with_artifact_url(mut self, url: impl Into<String>) -> Self {
        self.status = Some(GitRepositoryStatus { url: url.into() });
        self
    }

    /// Returns the artifact URL, or an empty string while the source is not ready.
    pub fn artifact_url(&self) -> &str {
        self.status.as_ref().map(|s| s.url.as_str()).unwrap_or("")
    }
}

// ============================================================================
// Application
// ============================================================================

/// Reference to a source object that may live in another namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossNamespaceSourceReference {
    pub namespace: String,
    pub name: String,
}

/// Application specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    /// The source this application was discovered in.
    pub repo: CrossNamespaceSourceReference,
}

pub type Application = Resource<ApplicationSpec>;

impl Resource<ApplicationSpec> {
    /// Creates an application discovered in `source`.
    pub fn for_source(name: impl Into<String>, source: &NamespacedName) -> Self {
        Self::new(
            ResourceKind::Application,
            source.namespace.clone(),
            name,
            ApplicationSpec {
                repo: CrossNamespaceSourceReference {
                    namespace: source.namespace.clone(),
                    name: source.name.clone(),
                },
            },
        )
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Git repository settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSettings {
    /// Git repository URL.
    #[serde(default)]
    pub repository: String,

    /// Branch to clone. Empty means the remote's default branch.
    #[serde(default)]
    pub branch: String,

    /// Shallow clone depth, 0 for full history.
    #[serde(default)]
    pub depth: u32,

    /// Skip TLS certificate verification for HTTPS remotes.
    #[serde(default)]
    pub insecure_skip_tls: bool,

    /// Authentication settings.
    #[serde(default)]
    pub auth: GitAuthSettings,
}

impl GitSettings {
    /// Settings for cloning `url` with no credential.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            repository: url.into(),
            ..Default::default()
        }
    }
}

/// Git authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitAuthSettings {
    /// Authentication type: none, basic, or ssh-key.
    #[serde(default, rename = "type")]
    pub auth_type: GitAuthType,

    /// User name for basic authentication.
    #[serde(default)]
    pub username: String,

    /// Environment variable containing the password.
    #[serde(default)]
    pub password_env_var: String,

    /// Direct password value (for local development).
    /// WARNING: This stores the password in plaintext in the config file.
    /// Prefer password_env_var or password_file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_insecure: Option<String>,

    /// Path to a file containing the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<String>,

    /// Path to the SSH private key. Defaults to `~/.ssh/id_ed25519`.
    #[serde(default)]
    pub ssh_key_path: String,
}

impl GitAuthSettings {
    /// Basic authentication with an inline password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            auth_type: GitAuthType::Basic,
            username: username.into(),
            password_insecure: Some(password.into()),
            ..Default::default()
        }
    }
}

/// Git authentication type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GitAuthType {
    #[default]
    None,
    Basic,
    SshKey,
}

/// Settings of the bootstrap manifest publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishSettings {
    /// Branch the manifests are pushed to.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Repository subdirectory receiving the manifests.
    #[serde(default = "default_subdirectory")]
    pub subdirectory: String,

    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    #[serde(default = "default_author_name")]
    pub author_name: String,

    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_subdirectory() -> String {
    "control-plane".to_string()
}

fn default_commit_message() -> String {
    "add bootstrap manifests".to_string()
}

fn default_author_name() -> String {
    "Flux MC".to_string()
}

fn default_author_email() -> String {
    "fluxmc@localhost".to_string()
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            subdirectory: default_subdirectory(),
            commit_message: default_commit_message(),
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

/// Settings of the artifact sync reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Artifact directory whose subdirectories are applications.
    #[serde(default = "default_apps_directory")]
    pub apps_directory: String,
}

fn default_apps_directory() -> String {
    "apps".to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            apps_directory: default_apps_directory(),
        }
    }
}
