use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("function name must not be empty")]
    EmptyName,

    #[error("function '{name}' not found")]
    NotFound { name: String },

    #[error("function '{name}' opened at line {line} but its body never closes (brace depth {depth} at end of file)")]
    Unbalanced { name: String, line: usize, depth: i64 },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LocateError {
    /// True for every variant that means "no brace-balanced span exists".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LocateError::NotFound { .. } | LocateError::Unbalanced { .. }
        )
    }
}
