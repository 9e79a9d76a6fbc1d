//! Artifact retrieval, extraction and application discovery.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::sanitize::redact_repo_url;

/// Errors produced while fetching or unpacking an artifact.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("GET {url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("invalid artifact URL '{0}'")]
    InvalidUrl(String),

    #[error("failed to read artifact '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to unpack artifact: {0}")]
    Unpack(#[from] std::io::Error),

    #[error("archive entry escapes the destination: {0}")]
    PathTraversal(String),

    #[error("invalid discovery pattern: {0}")]
    Pattern(String),

    #[error("failed to enumerate applications: {0}")]
    Enumerate(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ArtifactError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ArtifactError::Cancelled)
    }
}

/// Downloads artifact bytes.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, ArtifactError>;
}

/// Unpacks artifact bytes into a directory.
pub trait ArtifactExtractor: Send + Sync {
    fn extract(&self, data: &[u8], dest: &Path) -> Result<(), ArtifactError>;
}

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Fetches artifacts over HTTP(S), or from disk for `file://` URLs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, ArtifactError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ArtifactError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArtifactError::Client(e.to_string()))?;
        Ok(Self { http })
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, ArtifactError> {
        let request_error = |e: reqwest::Error| ArtifactError::Request {
            url: redact_repo_url(url),
            message: e.to_string(),
        };

        let resp = self.http.get(url).send().await.map_err(request_error)?;
        if !resp.status().is_success() {
            return Err(ArtifactError::Status {
                url: redact_repo_url(url),
                status: resp.status().as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(request_error)?;
        Ok(body.to_vec())
    }
}

async fn read_file_url(url: &str) -> Result<Vec<u8>, ArtifactError> {
    let path = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.to_file_path().ok())
        .ok_or_else(|| ArtifactError::InvalidUrl(url.to_string()))?;
    tokio::fs::read(&path)
        .await
        .map_err(|e| ArtifactError::ReadFile { path, source: e })
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, ArtifactError> {
        if cancel.is_cancelled() {
            return Err(ArtifactError::Cancelled);
        }
        log::debug!("Fetching artifact {}", redact_repo_url(url));

        let download = async {
            if url.starts_with("file://") {
                read_file_url(url).await
            } else {
                self.fetch_http(url).await
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ArtifactError::Cancelled),
            result = download => result,
        }
    }
}

/// Unpacks gzip-compressed tarballs as produced by the source controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzExtractor;

impl ArtifactExtractor for TarGzExtractor {
    fn extract(&self, data: &[u8], dest: &Path) -> Result<(), ArtifactError> {
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(data));

        for entry in archive.entries()? {
            let mut entry = entry?;
            let raw = entry.path()?.into_owned();

            // "./" and similar root entries
            if raw.components().all(|c| matches!(c, std::path::Component::CurDir)) {
                continue;
            }

            let entry_type = entry.header().entry_type();
            if entry_type.is_symlink() || entry_type.is_hard_link() {
                log::debug!("Skipping link entry {}", raw.display());
                continue;
            }

            // false: the entry names a path outside `dest`
            if !entry.unpack_in(dest)? {
                return Err(ArtifactError::PathTraversal(raw.display().to_string()));
            }
        }

        Ok(())
    }
}

/// Returns the names of the directories directly below `root/apps_dir`, sorted.
///
/// Plain files are ignored and a missing directory yields no applications.
pub fn discover_apps(root: &Path, apps_dir: &str) -> Result<Vec<String>, ArtifactError> {
    let base = root.join(apps_dir);
    let pattern = format!("{}/*", glob::Pattern::escape(&base.to_string_lossy()));

    let mut names = Vec::new();
    for entry in glob::glob(&pattern).map_err(|e| ArtifactError::Pattern(e.to_string()))? {
        let path = entry.map_err(|e| ArtifactError::Enumerate(e.to_string()))?;
        if !path.is_dir() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }

    names.sort();
    Ok(names)
}
