//! In-memory [`VersionControl`] implementation.
//!
//! The remote lives in a shared [`MemoryRemote`]; clones materialize its files
//! on disk so callers can write into the working directory exactly as they would
//! with a real checkout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{worktree_relative, VersionControl};
use crate::gitops::error::{GitOpsError, Result};

/// A commit recorded by [`MemoryRepository`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCommit {
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    /// Paths added or modified by this commit.
    pub added: Vec<String>,
    /// Paths deleted by this commit.
    pub removed: Vec<String>,
}

#[derive(Debug, Default)]
struct RemoteState {
    files: BTreeMap<String, Vec<u8>>,
    commits: Vec<MemoryCommit>,
    reject_pushes: Option<String>,
}

/// A remote shared between handles and inspected by tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a remote whose history starts with one commit of `files`.
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        let remote = Self::default();
        {
            let mut state = remote.lock();
            for (path, content) in files {
                state.files.insert(path.into(), content.into());
            }
            let added = state.files.keys().cloned().collect();
            state.commits.push(MemoryCommit {
                message: "initial commit".to_string(),
                author_name: "seed".to_string(),
                author_email: "seed@localhost".to_string(),
                timestamp: Utc::now(),
                added,
                removed: Vec::new(),
            });
        }
        remote
    }

    /// Makes every following push fail with `reason`.
    pub fn reject_pushes(&self, reason: impl Into<String>) {
        self.lock().reject_pushes = Some(reason.into());
    }

    /// Returns the content of `path` at the remote tip.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    /// Returns every path at the remote tip, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Returns the remote history, oldest first.
    pub fn commits(&self) -> Vec<MemoryCommit> {
        self.lock().commits.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Repository handle over a [`MemoryRemote`].
#[derive(Debug)]
pub struct MemoryRepository {
    remote: MemoryRemote,
    workdir: Option<PathBuf>,
    tree: BTreeMap<String, Vec<u8>>,
    history: Vec<MemoryCommit>,
    /// Staged changes; `None` stages a deletion.
    index: BTreeMap<String, Option<Vec<u8>>>,
}

impl MemoryRepository {
    pub fn new(remote: MemoryRemote) -> Self {
        Self {
            remote,
            workdir: None,
            tree: BTreeMap::new(),
            history: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Paths currently staged, sorted.
    pub fn staged(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    /// Local history, oldest first.
    pub fn history(&self) -> &[MemoryCommit] {
        &self.history
    }

    fn require_workdir(&self) -> Result<&Path> {
        self.workdir.as_deref().ok_or(GitOpsError::GitNotInitialized)
    }
}

fn index_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[async_trait]
impl VersionControl for MemoryRepository {
    async fn clone_into(&mut self, cancel: &CancellationToken, dir: &Path) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(GitOpsError::Cancelled);
        }

        let (files, commits) = {
            let state = self.remote.lock();
            (state.files.clone(), state.commits.clone())
        };

        for (path, content) in &files {
            let dest = dir.join(path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| GitOpsError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            std::fs::write(&dest, content).map_err(|e| GitOpsError::WriteFile {
                path: dest.clone(),
                source: e,
            })?;
        }

        self.workdir = Some(dir.to_path_buf());
        self.tree = files;
        self.history = commits;
        self.index.clear();
        Ok(())
    }

    fn add(&mut self, path: &Path) -> Result<()> {
        let workdir = self.require_workdir()?.to_path_buf();
        let relative = worktree_relative(path)?;
        let key = index_key(&relative);
        let on_disk = workdir.join(&relative);

        if on_disk.is_file() {
            let content = std::fs::read(&on_disk).map_err(|e| GitOpsError::ReadFile {
                path: on_disk.clone(),
                source: e,
            })?;
            self.index.insert(key, Some(content));
        } else if self.tree.contains_key(&key) {
            self.index.insert(key, None);
        } else {
            return Err(GitOpsError::PathNotFound(key));
        }
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        let workdir = self.require_workdir()?.to_path_buf();
        let relative = worktree_relative(path)?;
        let key = index_key(&relative);
        let prefix = format!("{}/", key);

        let matched: Vec<String> = self
            .tree
            .keys()
            .filter(|p| **p == key || p.starts_with(&prefix))
            .cloned()
            .collect();
        if matched.is_empty() {
            return Err(GitOpsError::PathNotFound(key));
        }

        for path in matched {
            let on_disk = workdir.join(&path);
            if on_disk.exists() {
                std::fs::remove_file(&on_disk)?;
            }
            self.index.insert(path, None);
        }
        Ok(())
    }

    fn commit(&mut self, message: &str, author_name: &str, author_email: &str) -> Result<()> {
        self.require_workdir()?;

        let changes = std::mem::take(&mut self.index);
        let mut added = Vec::new();
        let mut removed = Vec::new();
        for (path, content) in changes {
            match content {
                Some(content) => {
                    if self.tree.get(&path) != Some(&content) {
                        added.push(path.clone());
                    }
                    self.tree.insert(path, content);
                }
                None => {
                    if self.tree.remove(&path).is_some() {
                        removed.push(path);
                    }
                }
            }
        }

        if added.is_empty() && removed.is_empty() {
            return Err(GitOpsError::NothingToCommit);
        }

        self.history.push(MemoryCommit {
            message: message.to_string(),
            author_name: author_name.to_string(),
            author_email: author_email.to_string(),
            timestamp: Utc::now(),
            added,
            removed,
        });
        Ok(())
    }

    async fn push(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.require_workdir()?;
        if cancel.is_cancelled() {
            return Err(GitOpsError::Cancelled);
        }

        let mut state = self.remote.lock();
        if let Some(reason) = &state.reject_pushes {
            return Err(GitOpsError::GitOperation(reason.clone()));
        }
        if !self.history.starts_with(&state.commits) {
            return Err(GitOpsError::GitOperation(
                "rejected: remote contains work that is not present locally".to_string(),
            ));
        }
        state.files = self.tree.clone();
        state.commits = self.history.clone();
        Ok(())
    }

    fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }
}
