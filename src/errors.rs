//! Error types for catmap.

use std::path::PathBuf;

use crate::output::OutputError;
use crate::sourcemap::SourceMapError;
use crate::walker::WalkError;

/// Top-level error type for catmap operations.
#[derive(Debug, thiserror::Error)]
pub enum CatmapError {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("no matching source files found in {0}")]
    NoFilesFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] WalkError),

    #[error("source map error: {0}")]
    SourceMap(#[from] SourceMapError),

    #[error("output error: {0}")]
    Output(#[from] OutputError),
}

/// Map an error to its exit code.
pub fn exit_code(error: &CatmapError) -> i32 {
    match error {
        CatmapError::PathNotFound(_) => 3,
        CatmapError::PermissionDenied(_) => 4,
        CatmapError::NoFilesFound(_) => 5,
        CatmapError::Read { .. } => 1,
        CatmapError::Io(_) => 1,
        CatmapError::Walk(WalkError::NotFound { .. }) => 3,
        CatmapError::Walk(WalkError::PermissionDenied { .. }) => 4,
        CatmapError::Walk(_) => 2,
        CatmapError::SourceMap(_) => 6,
        CatmapError::Output(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let missing = CatmapError::Walk(WalkError::NotFound {
            path: PathBuf::from("nope"),
        });
        assert_eq!(exit_code(&missing), 3);
        assert_eq!(exit_code(&CatmapError::NoFilesFound(PathBuf::from("."))), 5);
        assert_eq!(
            exit_code(&CatmapError::SourceMap(SourceMapError::UnsupportedVersion(2))),
            6
        );
    }
}
