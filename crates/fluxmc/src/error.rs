use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FluxmcError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Git error: {0}")]
    GitOps(#[from] crate::gitops::GitOpsError),

    #[error("could not push control plane manifests: {0}")]
    Publish(#[from] crate::gitops::PublishError),

    #[error("Sync error: {0}")]
    Sync(#[from] crate::gitops::SyncError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] crate::gitops::ArtifactError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

impl FluxmcError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            FluxmcError::GitOps(e) => e.is_cancelled(),
            FluxmcError::Publish(e) => e.is_cancelled(),
            FluxmcError::Sync(e) => e.is_cancelled(),
            FluxmcError::Artifact(e) => e.is_cancelled(),
            FluxmcError::Config(_) | FluxmcError::Secret(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid path for {field}: '{value}' must be relative and stay inside the repository")]
    InvalidPath { field: String, value: String },

    #[error("a control-plane repository needs to be provided")]
    MissingRepository,
}

pub type Result<T> = std::result::Result<T, FluxmcError>;
