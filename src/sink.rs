//! Where patched files go.
//!
//! A [`PatchSink`] persists each patched file and optionally records it in
//! version control. The pipeline calls [`PatchSink::begin`] once before the
//! first issue, [`PatchSink::write`] and [`PatchSink::publish`] per patched
//! issue, and [`PatchSink::finish`] once at the end.

use crate::edit::{rewrite_file, Edit, EditError, EditResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("{path} changed since it was read; not overwriting")]
    Changed { path: PathBuf },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: EditError,
    },

    #[error("failed to run git {args}: {source}")]
    GitSpawn {
        args: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {args} failed: {stderr}")]
    Git { args: String, stderr: String },
}

pub trait PatchSink {
    fn begin(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Persist the full new contents of `path`. `before` is the text the
    /// patch was computed from; the write fails if the file no longer
    /// holds it.
    fn write(&mut self, path: &Path, before: &str, after: &str) -> Result<(), SinkError>;

    /// Record the change to `path` (already written) with `message`.
    fn publish(&mut self, path: &Path, message: &str) -> Result<(), SinkError>;

    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<T: PatchSink + ?Sized> PatchSink for Box<T> {
    fn begin(&mut self) -> Result<(), SinkError> {
        (**self).begin()
    }

    fn write(&mut self, path: &Path, before: &str, after: &str) -> Result<(), SinkError> {
        (**self).write(path, before, after)
    }

    fn publish(&mut self, path: &Path, message: &str) -> Result<(), SinkError> {
        (**self).publish(path, message)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

fn write_error(path: &Path, source: EditError) -> SinkError {
    match source {
        EditError::BeforeTextMismatch { .. } => SinkError::Changed {
            path: path.to_path_buf(),
        },
        source => SinkError::Write {
            path: path.to_path_buf(),
            source,
        },
    }
}

/// Verified atomic writes to the filesystem; publishing is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSink;

impl PatchSink for FsSink {
    fn write(&mut self, path: &Path, before: &str, after: &str) -> Result<(), SinkError> {
        match rewrite_file(path, before, after).map_err(|e| write_error(path, e))? {
            EditResult::Applied { bytes_changed, .. } => {
                debug!(path = %path.display(), bytes_changed, "wrote patched file")
            }
            EditResult::AlreadyApplied => {
                debug!(path = %path.display(), "file already holds patched text")
            }
        }
        Ok(())
    }

    fn publish(&mut self, _path: &Path, _message: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes files, then commits each one on a dedicated branch and
/// optionally pushes the branch at the end of the run.
#[derive(Debug, Clone)]
pub struct GitSink {
    root: PathBuf,
    branch: String,
    remote: String,
    push: bool,
    commits: usize,
}

impl GitSink {
    pub fn new(root: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            branch: branch.into(),
            remote: "origin".to_string(),
            push: false,
            commits: 0,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    fn git(&self, args: &[&str]) -> Result<String, SinkError> {
        let joined = args.join(" ");
        debug!(root = %self.root.display(), "git {joined}");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()
            .map_err(|source| SinkError::GitSpawn {
                args: joined.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SinkError::Git {
                args: joined,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl PatchSink for GitSink {
    /// Switch to the patch branch, creating or resetting it at HEAD.
    /// Uncommitted changes in the worktree are carried over.
    fn begin(&mut self) -> Result<(), SinkError> {
        self.git(&["checkout", "-B", &self.branch])?;
        info!(branch = %self.branch, "checked out patch branch");
        Ok(())
    }

    fn write(&mut self, path: &Path, before: &str, after: &str) -> Result<(), SinkError> {
        FsSink.write(path, before, after)
    }

    fn publish(&mut self, path: &Path, message: &str) -> Result<(), SinkError> {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let relative = relative.to_string_lossy();
        self.git(&["add", "--", &relative])?;
        self.git(&["commit", "-m", message, "--", &relative])?;
        self.commits += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if !self.push || self.commits == 0 {
            return Ok(());
        }
        self.git(&["push", "-u", &self.remote, &self.branch])?;
        info!(remote = %self.remote, branch = %self.branch, commits = self.commits, "pushed patch branch");
        Ok(())
    }
}

/// Keeps patched files in memory and leaves the filesystem alone.
#[derive(Debug, Default, Clone)]
pub struct DryRunSink {
    files: BTreeMap<PathBuf, String>,
    messages: Vec<(PathBuf, String)>,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest contents of every file that would have been written.
    pub fn files(&self) -> &BTreeMap<PathBuf, String> {
        &self.files
    }

    /// Commit messages that would have been recorded, in order.
    pub fn messages(&self) -> &[(PathBuf, String)] {
        &self.messages
    }
}

impl PatchSink for DryRunSink {
    /// Checked against the last recorded text for `path`, or the file on
    /// disk, the same way [`FsSink`] checks before writing.
    fn write(&mut self, path: &Path, before: &str, after: &str) -> Result<(), SinkError> {
        let current = match self.files.get(path) {
            Some(text) => text.clone(),
            None => fs::read_to_string(path).map_err(|e| write_error(path, e.into()))?,
        };
        Edit::new(0, current.len(), after, before)
            .apply_to(&current)
            .map_err(|e| write_error(path, e))?;
        self.files.insert(path.to_path_buf(), after.to_string());
        Ok(())
    }

    fn publish(&mut self, path: &Path, message: &str) -> Result<(), SinkError> {
        self.messages.push((path.to_path_buf(), message.to_string()));
        Ok(())
    }
}
