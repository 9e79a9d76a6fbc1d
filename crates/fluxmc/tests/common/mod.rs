//! Shared utilities for fluxmc integration tests.
//!
//! - `GitFixture`: a local bare repository on branch `main`, seeded through the
//!   system `git` binary and reachable through a `file://` URL
//! - `tarball`: builds gzip-compressed artifacts the way the source controller
//!   serves them

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use fluxmc::gitops::GitSettings;

/// Runs git in `dir` and returns trimmed stdout, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(["-c", "user.name=fixture", "-c", "user.email=fixture@localhost"])
        .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A bare `origin` repository plus a scratch clone used to seed it.
pub struct GitFixture {
    temp_dir: TempDir,
    pub origin: PathBuf,
    seed: PathBuf,
}

impl GitFixture {
    /// Creates an origin whose `main` holds `README.md`, `folder1/a.txt` and
    /// `folder1/b.txt`, spread over two commits.
    pub fn new() -> Self {
        let fixture = Self::empty();
        fixture.commit_files(&[("README.md", "control plane\n")], "initial commit");
        fixture.commit_files(
            &[("folder1/a.txt", "a\n"), ("folder1/b.txt", "b\n")],
            "add folder1",
        );
        fixture
    }

    /// Creates an origin without any commit.
    pub fn empty() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let origin = temp_dir.path().join("origin.git");
        let seed = temp_dir.path().join("seed");
        std::fs::create_dir_all(&origin).unwrap();
        std::fs::create_dir_all(&seed).unwrap();

        git(&origin, &["init", "--bare", "-q"]);
        git(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&seed, &["init", "-q"]);
        git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&seed, &["remote", "add", "origin", origin.to_str().unwrap()]);

        Self {
            temp_dir,
            origin,
            seed,
        }
    }

    /// Commits `files` through the seed clone and pushes them to origin.
    pub fn commit_files(&self, files: &[(&str, &str)], message: &str) {
        for (path, content) in files {
            let dest = self.seed.join(path);
            std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
            std::fs::write(dest, content).unwrap();
        }
        git(&self.seed, &["add", "-A"]);
        git(&self.seed, &["commit", "-q", "-m", message]);
        git(&self.seed, &["push", "-q", "origin", "main"]);
    }

    /// `file://` URL of the origin; unlike a plain path it honours `--depth`.
    pub fn url(&self) -> String {
        format!("file://{}", self.origin.display())
    }

    pub fn settings(&self) -> GitSettings {
        GitSettings::new(self.url())
    }

    /// A fresh, not yet existing directory inside the fixture.
    pub fn workdir(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Files at the tip of origin's `main`.
    pub fn remote_files(&self) -> Vec<String> {
        let out = git(&self.origin, &["ls-tree", "-r", "--name-only", "main"]);
        out.lines().map(str::to_string).collect()
    }

    /// Content of `path` at the tip of origin's `main`.
    pub fn remote_file(&self, path: &str) -> String {
        git(&self.origin, &["show", &format!("main:{}", path)])
    }

    /// Number of commits on origin's `main`.
    pub fn remote_commit_count(&self) -> usize {
        git(&self.origin, &["rev-list", "--count", "main"])
            .parse()
            .unwrap()
    }

    /// Subject of the tip commit on origin's `main`.
    pub fn remote_tip_subject(&self) -> String {
        git(&self.origin, &["log", "-1", "--format=%s", "main"])
    }

    /// `Name <email>` of the tip commit author on origin's `main`.
    pub fn remote_tip_author(&self) -> String {
        git(&self.origin, &["log", "-1", "--format=%an <%ae>", "main"])
    }

    /// Paths changed by the tip commit on origin's `main`, with their status letter.
    pub fn remote_tip_changes(&self) -> Vec<String> {
        let out = git(
            &self.origin,
            &["diff-tree", "--no-commit-id", "--name-status", "-r", "main"],
        );
        out.lines()
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect()
    }
}

/// Builds a `.tar.gz` holding `entries` (path, content).
pub fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// An artifact with one `kustomization.yaml` per application under `apps/`.
pub fn apps_artifact(apps: &[&str]) -> Vec<u8> {
    let paths: Vec<String> = apps
        .iter()
        .map(|app| format!("apps/{}/kustomization.yaml", app))
        .collect();
    let entries: Vec<(&str, &str)> = paths
        .iter()
        .map(|p| (p.as_str(), "resources: []\n"))
        .collect();
    tarball(&entries)
}
