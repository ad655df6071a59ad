//! Persisting a finished bundle.
//!
//! The artifact is written first, then its map, then the trailer that links
//! the two is appended to the artifact. The first failing step stops the
//! sequence.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::sourcemap::{map_file_name, map_path, ArtifactKind, SourceMap};

/// Errors that can occur while writing outputs.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact {path}: {source}")]
    WriteArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write source map {path}: {source}")]
    WriteMap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append source map trailer to {path}: {source}")]
    AppendTrailer {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where a bundle ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenBundle {
    pub artifact_path: PathBuf,
    pub map_path: PathBuf,
    /// The directive appended to the artifact.
    pub trailer: String,
}

/// Write the artifact, its map and the linking trailer.
///
/// The map goes to `<artifact>.map` next to the artifact. Missing parent
/// directories are created.
pub fn write_bundle(
    artifact_path: &Path,
    artifact: &str,
    map: &SourceMap,
    kind: ArtifactKind,
) -> Result<WrittenBundle, OutputError> {
    // Render before touching the filesystem
    let map_json = serde_json::to_string(map)?;
    let map_path = map_path(artifact_path);
    let trailer = kind.trailer(&map_file_name(artifact_path));

    if let Some(parent) = artifact_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| OutputError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(artifact_path, artifact).map_err(|source| OutputError::WriteArtifact {
        path: artifact_path.to_path_buf(),
        source,
    })?;
    tracing::info!("Successfully concatenated files into {}", artifact_path.display());

    fs::write(&map_path, map_json).map_err(|source| OutputError::WriteMap {
        path: map_path.clone(),
        source,
    })?;
    tracing::info!("Source map generated at {}", map_path.display());

    append_trailer(artifact_path, &trailer).map_err(|source| OutputError::AppendTrailer {
        path: artifact_path.to_path_buf(),
        source,
    })?;

    Ok(WrittenBundle {
        artifact_path: artifact_path.to_path_buf(),
        map_path,
        trailer,
    })
}

fn append_trailer(path: &Path, trailer: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(trailer.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concat::{concatenate, InputFile, MappingDensity};
    use crate::sourcemap::serialize;
    use tempfile::TempDir;

    fn bundle(artifact_path: &Path) -> (String, SourceMap) {
        let files = [InputFile::new("a.js", "let a;"), InputFile::new("b.js", "let b;\n")];
        let result = concatenate(artifact_path, &files, MappingDensity::Character);
        let map = serialize(&result.store, "").unwrap();
        (result.artifact, map)
    }

    #[test]
    fn test_write_bundle_script() {
        let dir = TempDir::new().unwrap();
        let artifact_path = dir.path().join("wwwroot/nested/site.min.js");
        let (artifact, map) = bundle(&artifact_path);

        let written = write_bundle(&artifact_path, &artifact, &map, ArtifactKind::Script).unwrap();

        assert_eq!(written.map_path, dir.path().join("wwwroot/nested/site.min.js.map"));

        let on_disk = fs::read_to_string(&artifact_path).unwrap();
        assert_eq!(
            on_disk,
            "let a;\nlet b;\n\n//# sourceMappingURL=site.min.js.map\n"
        );

        let map_json = fs::read_to_string(&written.map_path).unwrap();
        assert_eq!(SourceMap::from_json(&map_json).unwrap(), map);
    }

    #[test]
    fn test_write_bundle_stylesheet() {
        let dir = TempDir::new().unwrap();
        let artifact_path = dir.path().join("site.css");
        let files = [InputFile::new("a.css", "body {}")];
        let result = concatenate(&artifact_path, &files, MappingDensity::Line);
        let map = serialize(&result.store, "").unwrap();

        write_bundle(&artifact_path, &result.artifact, &map, ArtifactKind::Stylesheet).unwrap();

        let on_disk = fs::read_to_string(&artifact_path).unwrap();
        assert!(on_disk.ends_with("\n/*# sourceMappingURL=site.css.map*/\n"));
    }

    #[test]
    fn test_artifact_failure_writes_no_map() {
        let dir = TempDir::new().unwrap();
        // A directory where the artifact should go makes the first write fail
        let artifact_path = dir.path().join("bundle.js");
        fs::create_dir(&artifact_path).unwrap();
        let (artifact, map) = bundle(&artifact_path);

        let result = write_bundle(&artifact_path, &artifact, &map, ArtifactKind::Script);

        assert!(matches!(result, Err(OutputError::WriteArtifact { .. })));
        assert!(!dir.path().join("bundle.js.map").exists());
    }
}
