//! Git repository operations backed by the `git` executable.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;

use super::auth::{build_auth_env, AuthEnv};
use super::parse::{format_git_error, parse_ls_files};
use super::{worktree_relative, VersionControl};
use crate::gitops::error::{classify_git_error, GitOpsError, Result};
use crate::gitops::resource::GitSettings;
use crate::sanitize::redact_repo_url;

/// Git repository handle.
///
/// Created uncloned from [`GitSettings`]; [`VersionControl::clone_into`] binds it
/// to a working directory.
pub struct GitRepository {
    settings: GitSettings,
    workdir: Option<PathBuf>,
}

impl GitRepository {
    /// Creates a new, not yet cloned, repository handle.
    pub fn new(settings: GitSettings) -> Self {
        Self {
            settings,
            workdir: None,
        }
    }

    /// Returns true once a clone has completed.
    pub fn is_cloned(&self) -> bool {
        self.workdir.is_some()
    }

    /// Gets the current branch name.
    pub fn current_branch(&self) -> Result<String> {
        let output = self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if !output.status.success() {
            return Err(GitOpsError::GitOperation(format_git_error(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Gets the full hash of the current HEAD commit.
    pub fn head_commit(&self) -> Result<String> {
        let output = self.run_git(&["rev-parse", "HEAD"])?;
        if !output.status.success() {
            return Err(GitOpsError::GitOperation(format_git_error(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Lists tracked files at or below `path`.
    fn tracked_files(&self, path: &Path) -> Result<Vec<String>> {
        let output = self.run_git_os(&[
            OsString::from("ls-files"),
            OsString::from("-z"),
            OsString::from("--"),
            path.as_os_str().to_owned(),
        ])?;
        if !output.status.success() {
            return Err(GitOpsError::GitOperation(format_git_error(&output)));
        }
        Ok(parse_ls_files(&output.stdout))
    }

    fn require_workdir(&self) -> Result<&Path> {
        self.workdir.as_deref().ok_or(GitOpsError::GitNotInitialized)
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    /// Runs a local git command in the working directory.
    fn run_git(&self, args: &[&str]) -> Result<Output> {
        let args: Vec<OsString> = args.iter().map(OsString::from).collect();
        self.run_git_os(&args)
    }

    fn run_git_os(&self, args: &[OsString]) -> Result<Output> {
        self.run_git_with_env(args, &[])
    }

    fn run_git_with_env(&self, args: &[OsString], env: &[(&str, &str)]) -> Result<Output> {
        let workdir = self.require_workdir()?;

        let mut cmd = Command::new("git");
        cmd.current_dir(workdir).args(args).stdin(Stdio::null());
        for (key, value) in env {
            cmd.env(key, value);
        }

        cmd.output()
            .map_err(|e| GitOpsError::GitOperation(format!("failed to run git: {}", e)))
    }

    /// Gets authentication environment for git commands.
    fn get_auth_env(&self) -> Result<AuthEnv> {
        build_auth_env(&self.settings.auth)
    }

    /// Runs a git command that talks to the remote.
    ///
    /// The child is killed as soon as `cancel` fires; stderr is forwarded to the
    /// debug log and used to classify failures.
    async fn run_remote(
        &self,
        cancel: &CancellationToken,
        cwd: Option<&Path>,
        operation: &str,
        args: Vec<OsString>,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(GitOpsError::Cancelled);
        }

        let auth = self.get_auth_env()?;

        let mut cmd = TokioCommand::new("git");
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        if self.settings.insecure_skip_tls {
            cmd.args(["-c", "http.sslVerify=false"]);
        }
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &auth.env_vars {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| GitOpsError::GitOperation(format!("failed to spawn git: {}", e)))?;

        let stderr_pipe = child.stderr.take();
        let stdout_pipe = child.stdout.take();

        let stderr_task = async {
            let mut collected = Vec::new();
            if let Some(stderr) = stderr_pipe {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("git {}: {}", operation, line);
                    collected.push(line);
                }
            }
            collected
        };

        let stdout_task = async {
            if let Some(stdout) = stdout_pipe {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                while let Ok(Some(_line)) = lines.next_line().await {
                    // Drain stdout to prevent pipe buffer from filling
                }
            }
        };

        let run = async {
            let (stderr_lines, ()) = tokio::join!(stderr_task, stdout_task);
            let status = child.wait().await;
            (status, stderr_lines)
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = run => Some(outcome),
        };

        let Some((status, stderr_lines)) = outcome else {
            if let Err(e) = child.kill().await {
                log::warn!("Failed to kill cancelled git {}: {}", operation, e);
            }
            drop(auth);
            log::info!("git {} cancelled", operation);
            return Err(GitOpsError::Cancelled);
        };

        // Drop auth env (cleanup guard) after command completes
        drop(auth);

        let status = status.map_err(|e| GitOpsError::GitOperation(e.to_string()))?;
        if status.success() {
            return Ok(());
        }

        let stderr = stderr_lines.join("\n");
        if stderr.trim().is_empty() {
            return Err(GitOpsError::GitOperation(format!(
                "{} failed with exit code {}",
                operation,
                status.code().unwrap_or(-1)
            )));
        }
        Err(classify_git_error(&stderr))
    }
}

#[async_trait]
impl VersionControl for GitRepository {
    async fn clone_into(&mut self, cancel: &CancellationToken, dir: &Path) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(GitOpsError::Cancelled);
        }

        let existed = dir.exists();
        if existed {
            let mut entries = std::fs::read_dir(dir).map_err(|e| GitOpsError::ReadFile {
                path: dir.to_path_buf(),
                source: e,
            })?;
            if entries.next().is_some() {
                return Err(GitOpsError::GitOperation(format!(
                    "destination '{}' already exists and is not empty",
                    dir.display()
                )));
            }
        }

        log::info!(
            "Cloning {} into {}",
            redact_repo_url(&self.settings.repository),
            dir.display()
        );

        let mut args: Vec<OsString> = vec!["clone".into(), "--progress".into()];
        if self.settings.depth > 0 {
            args.push("--depth".into());
            args.push(self.settings.depth.to_string().into());
        }
        if !self.settings.branch.is_empty() {
            args.push("--branch".into());
            args.push(self.settings.branch.clone().into());
        }
        args.push("--".into());
        args.push(self.settings.repository.clone().into());
        args.push(dir.as_os_str().to_owned());

        match self.run_remote(cancel, None, "clone", args).await {
            Ok(()) => {
                self.workdir = Some(dir.to_path_buf());
                Ok(())
            }
            Err(e) => {
                discard_partial_clone(dir, existed);
                Err(e)
            }
        }
    }

    fn add(&mut self, path: &Path) -> Result<()> {
        let workdir = self.require_workdir()?;
        let relative = worktree_relative(path)?;

        if !workdir.join(&relative).exists() && self.tracked_files(&relative)?.is_empty() {
            return Err(GitOpsError::PathNotFound(relative.display().to_string()));
        }

        let output = self.run_git_os(&[
            OsString::from("add"),
            OsString::from("--"),
            relative.as_os_str().to_owned(),
        ])?;
        if !output.status.success() {
            return Err(GitOpsError::GitOperation(format!(
                "could not add '{}' to index: {}",
                relative.display(),
                format_git_error(&output)
            )));
        }

        Ok(())
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        self.require_workdir()?;
        let relative = worktree_relative(path)?;

        if self.tracked_files(&relative)?.is_empty() {
            return Err(GitOpsError::PathNotFound(relative.display().to_string()));
        }

        let output = self.run_git_os(&[
            OsString::from("rm"),
            OsString::from("-r"),
            OsString::from("-f"),
            OsString::from("-q"),
            OsString::from("--"),
            relative.as_os_str().to_owned(),
        ])?;
        if !output.status.success() {
            return Err(GitOpsError::GitOperation(format!(
                "could not remove '{}': {}",
                relative.display(),
                format_git_error(&output)
            )));
        }

        Ok(())
    }

    fn commit(&mut self, message: &str, author_name: &str, author_email: &str) -> Result<()> {
        self.require_workdir()?;

        // Exit code 0 means the index matches HEAD.
        let staged = self.run_git(&["diff", "--cached", "--quiet"])?;
        match staged.status.code() {
            Some(0) => return Err(GitOpsError::NothingToCommit),
            Some(1) => {}
            _ => return Err(GitOpsError::GitOperation(format_git_error(&staged))),
        }

        let args: Vec<OsString> = [
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "--no-verify",
            "-m",
            message,
        ]
        .iter()
        .map(OsString::from)
        .collect();

        let output = self.run_git_with_env(
            &args,
            &[
                ("GIT_AUTHOR_NAME", author_name),
                ("GIT_AUTHOR_EMAIL", author_email),
                ("GIT_COMMITTER_NAME", author_name),
                ("GIT_COMMITTER_EMAIL", author_email),
            ],
        )?;

        if !output.status.success() {
            return Err(GitOpsError::GitOperation(format_git_error(&output)));
        }

        log::debug!("Created commit '{}'", message);
        Ok(())
    }

    async fn push(&mut self, cancel: &CancellationToken) -> Result<()> {
        let workdir = self.require_workdir()?.to_path_buf();

        log::info!(
            "Pushing to {}",
            redact_repo_url(&self.settings.repository)
        );

        let args: Vec<OsString> = vec![
            "push".into(),
            "--progress".into(),
            "origin".into(),
            "HEAD".into(),
        ];
        self.run_remote(cancel, Some(&workdir), "push", args).await
    }

    fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }
}

/// Removes whatever an aborted clone left behind.
///
/// A directory the clone created is deleted; a pre-existing (empty) directory
/// is emptied again.
fn discard_partial_clone(dir: &Path, existed: bool) {
    if !dir.exists() {
        return;
    }

    if !existed {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            log::warn!("Failed to remove partial clone {}: {}", dir.display(), e);
        }
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Failed to read partial clone {}: {}", dir.display(), e);
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        if let Err(e) = result {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
