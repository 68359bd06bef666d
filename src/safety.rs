use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Keeps every file the pipeline touches inside the repository being
/// patched, and out of its `.git` directory.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Absolute path to workspace root
    workspace_root: PathBuf,
    /// Canonical paths to forbidden directories
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("No file matching '{reported}' in {workspace}")]
    NotFound { reported: String, workspace: PathBuf },

    #[error("'{reported}' is ambiguous: {}", join_paths(.candidates))]
    Ambiguous {
        reported: String,
        candidates: Vec<PathBuf>,
    },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl WorkspaceGuard {
    /// Create a new workspace guard with the given root.
    ///
    /// The workspace root will be canonicalized to handle symlinks correctly.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;

        let mut forbidden_paths = Vec::new();
        if let Ok(git_dir) = workspace_root.join(".git").canonicalize() {
            forbidden_paths.push(git_dir);
        }

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Check if a path is safe to edit.
    ///
    /// Returns the canonicalized absolute path if safe.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();

        // Resolve relative paths against workspace root
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        // Canonicalize to resolve symlinks and .. components
        let canonical = absolute.canonicalize()?;

        self.check_canonical(&canonical)?;

        Ok(canonical)
    }

    /// Re-validate a previously-validated canonical path right before a
    /// write.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        let canonical = path.canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Map a file path from an issue report onto a file in the workspace.
    ///
    /// Reports are produced by scanners that do not always agree with the
    /// checkout layout, so a path that does not exist relative to the root
    /// is looked up by its trailing components. Exactly one match is
    /// required.
    pub fn resolve(&self, reported: &str) -> Result<PathBuf, SafetyError> {
        let direct = Path::new(reported);
        let absolute = if direct.is_absolute() {
            direct.to_path_buf()
        } else {
            self.workspace_root.join(direct)
        };
        if absolute.is_file() {
            return self.validate_path(&absolute);
        }

        let wanted: Vec<_> = direct
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_os_string()),
                _ => None,
            })
            .collect();
        if wanted.is_empty() {
            return Err(SafetyError::NotFound {
                reported: reported.to_string(),
                workspace: self.workspace_root.clone(),
            });
        }

        let mut candidates: Vec<PathBuf> = WalkDir::new(&self.workspace_root)
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| ends_with_components(path, &wanted))
            .collect();
        candidates.sort();

        match candidates.len() {
            0 => Err(SafetyError::NotFound {
                reported: reported.to_string(),
                workspace: self.workspace_root.clone(),
            }),
            1 => {
                let found = candidates.remove(0);
                tracing::debug!(reported, found = %found.display(), "resolved by file name");
                self.validate_path(found)
            }
            _ => Err(SafetyError::Ambiguous {
                reported: reported.to_string(),
                candidates,
            }),
        }
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        // Check if inside workspace
        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        // Check against forbidden paths
        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }

    /// Get the workspace root.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Path relative to the workspace root, for messages and commits.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.workspace_root).unwrap_or(path)
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn ends_with_components(path: &Path, wanted: &[std::ffi::OsString]) -> bool {
    let parts: Vec<_> = path.components().collect();
    if parts.len() < wanted.len() {
        return false;
    }
    parts[parts.len() - wanted.len()..]
        .iter()
        .zip(wanted)
        .all(|(have, want)| have.as_os_str() == want.as_os_str())
}
