//! Fluent builder API for catmap.
//!
//! Composes discovery, reading, concatenation, serialization and output
//! into one build, and exposes the pure in-memory pipeline as functions.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::concat::{concatenate, InputFile, MappingDensity};
use crate::errors::CatmapError;
use crate::mapping::normalize_source_path;
use crate::output::write_bundle;
use crate::sourcemap::{serialize, ArtifactKind, SourceMap, SourceMapError};
use crate::walker::{discover, DiscoverOptions};

/// Output directory used when none is given, relative to the root.
pub const DEFAULT_OUTPUT_DIR: &str = "wwwroot";

/// Artifact file name used when none is given.
pub const DEFAULT_OUTPUT_FILE: &str = "site.min.js";

/// Builder for bundling a project's sources.
///
/// # Examples
///
/// ```no_run
/// use catmap::builder::Bundler;
/// use catmap::concat::MappingDensity;
///
/// let report = Bundler::new("./project")
///     .output_dir("dist")
///     .output_file("app.js")
///     .exclude_files(["*.test.js"])
///     .density(MappingDensity::Line)
///     .build()
///     .unwrap();
///
/// println!("{} files, {} mappings", report.files.len(), report.mapping_count);
/// ```
#[derive(Debug, Clone)]
pub struct Bundler {
    root: PathBuf,
    output_dir: PathBuf,
    output_file: String,
    discover: DiscoverOptions,
    density: MappingDensity,
    source_root: Option<String>,
    artifact_kind: Option<ArtifactKind>,
}

impl Bundler {
    /// Create a new builder for the given root path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            discover: DiscoverOptions::default(),
            density: MappingDensity::default(),
            source_root: None,
            artifact_kind: None,
        }
    }

    /// Directory for the artifact and map; relative paths are under the root.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Artifact file name; the map is written as `<name>.map`.
    pub fn output_file(mut self, name: impl Into<String>) -> Self {
        self.output_file = name.into();
        self
    }

    /// File name suffix that selects inputs (default `.js`).
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.discover.extension = extension.into();
        self
    }

    /// Skip these root-relative directories, in addition to the defaults.
    pub fn exclude_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.discover
            .walk
            .exclude_dirs
            .extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Skip files and directories whose name matches any of these `*` patterns.
    pub fn exclude_files<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.discover
            .exclude_files
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn density(mut self, density: MappingDensity) -> Self {
        self.density = density;
        self
    }

    /// Override the map's `sourceRoot`.
    ///
    /// Defaults to the path from the output directory back to the root.
    pub fn source_root(mut self, source_root: impl Into<String>) -> Self {
        self.source_root = Some(source_root.into());
        self
    }

    /// Override the trailer style; otherwise chosen from the file extension.
    pub fn artifact_kind(mut self, kind: ArtifactKind) -> Self {
        self.artifact_kind = Some(kind);
        self
    }

    /// Include hidden files.
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.discover.walk.include_hidden = include;
        self
    }

    /// Respect .gitignore files (default: true).
    pub fn respect_gitignore(mut self, respect: bool) -> Self {
        self.discover.walk.respect_gitignore = respect;
        self
    }

    /// Set maximum directory depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.discover.walk.max_depth = Some(depth);
        self
    }

    /// Where the artifact will be written.
    pub fn artifact_path(&self) -> PathBuf {
        self.root.join(&self.output_dir).join(&self.output_file)
    }

    /// Discover inputs without building.
    pub fn plan(&self) -> Result<Vec<PathBuf>, CatmapError> {
        if !self.root.exists() {
            return Err(CatmapError::PathNotFound(self.root.clone()));
        }

        // Never feed a previous build back into the bundle
        let mut options = self.discover.clone();
        let root = std::path::absolute(&self.root)?;
        let output_dir = std::path::absolute(self.root.join(&self.output_dir))?;
        match normalize_source_path(&root, &output_dir).as_str() {
            "." => options.walk.exclude_dirs.push(PathBuf::from(&self.output_file)),
            outside if outside == ".." || outside.starts_with("../") => {}
            relative => options.walk.exclude_dirs.push(PathBuf::from(relative)),
        }

        Ok(discover(&self.root, &options)?)
    }

    /// Build the bundle and write artifact, map and trailer.
    pub fn build(self) -> Result<BundleReport, CatmapError> {
        let paths = self.plan()?;
        if paths.is_empty() {
            return Err(CatmapError::NoFilesFound(self.root));
        }

        let sources = read_sources(&self.root, &paths)?;

        let artifact_path = self.artifact_path();
        let source_root = match self.source_root {
            Some(source_root) => source_root,
            None => default_source_root(&self.root, &self.root.join(&self.output_dir))?,
        };

        let bundle = bundle_sources(&artifact_path, &sources, self.density, &source_root)?;

        let kind = self
            .artifact_kind
            .unwrap_or_else(|| ArtifactKind::from_path(&artifact_path));
        let written = write_bundle(&artifact_path, &bundle.artifact, &bundle.map, kind)?;

        Ok(BundleReport {
            artifact_path: written.artifact_path,
            map_path: written.map_path,
            files: sources.iter().map(FileSummary::of).collect(),
            mapping_count: bundle.mapping_count,
            source_count: bundle.map.sources.len(),
            density: self.density.to_string(),
        })
    }
}

/// Result of a bundle build.
#[derive(Debug, Clone, Serialize)]
pub struct BundleReport {
    pub artifact_path: PathBuf,
    pub map_path: PathBuf,
    /// Inputs in bundle order.
    pub files: Vec<FileSummary>,
    pub mapping_count: usize,
    pub source_count: usize,
    pub density: String,
}

/// Per-input statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    /// Lines this file occupies in the artifact.
    pub lines: usize,
    pub bytes: usize,
}

impl FileSummary {
    fn of(file: &InputFile) -> Self {
        let bytes = file.text.as_bytes();
        Self {
            path: file.path.clone(),
            lines: bytecount::count(bytes, b'\n') + usize::from(!file.text.ends_with('\n')),
            bytes: bytes.len(),
        }
    }
}

// ============================================================================
// Functional API
// ============================================================================

/// An in-memory artifact and its map.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub artifact: String,
    pub map: SourceMap,
    pub mapping_count: usize,
}

/// Concatenate already-read sources and serialize their map.
///
/// Nothing touches the filesystem.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use catmap::builder::bundle_sources;
/// use catmap::concat::{InputFile, MappingDensity};
///
/// let files = [
///     InputFile::new("foo.js", "let a=1;"),
///     InputFile::new("bar.js", "let b=2;\n"),
/// ];
/// let bundle = bundle_sources(Path::new("out/all.js"), &files, MappingDensity::Character, "").unwrap();
///
/// assert_eq!(bundle.artifact, "let a=1;\nlet b=2;\n");
/// assert_eq!(bundle.map.sources, vec!["foo.js", "bar.js"]);
/// ```
pub fn bundle_sources(
    artifact_path: &Path,
    files: &[InputFile],
    density: MappingDensity,
    source_root: &str,
) -> Result<Bundle, SourceMapError> {
    let result = concatenate(artifact_path, files, density);
    let map = serialize(&result.store, source_root)?;

    Ok(Bundle {
        artifact: result.artifact,
        map,
        mapping_count: result.store.len(),
    })
}

/// Read root-relative `paths` in parallel, keeping their order.
pub fn read_sources(root: &Path, paths: &[PathBuf]) -> Result<Vec<InputFile>, CatmapError> {
    let files = paths
        .par_iter()
        .map(|relative| {
            let full = root.join(relative);
            let text = fs::read_to_string(&full).map_err(|source| match source.kind() {
                std::io::ErrorKind::PermissionDenied => CatmapError::PermissionDenied(full.clone()),
                _ => CatmapError::Read {
                    path: full.clone(),
                    source,
                },
            })?;
            Ok(InputFile::new(relative.clone(), text))
        })
        .collect::<Result<Vec<_>, CatmapError>>()?;

    for file in &files {
        tracing::info!("Reading {}", file.path.display());
    }

    Ok(files)
}

/// Path from `output_dir` back to `root`, with a trailing slash.
fn default_source_root(root: &Path, output_dir: &Path) -> Result<String, CatmapError> {
    let root = std::path::absolute(root)?;
    let output_dir = std::path::absolute(output_dir)?;

    let relative = normalize_source_path(&output_dir, &root);
    if relative == "." {
        Ok(String::new())
    } else {
        Ok(format!("{}/", relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_project() -> TempDir {
        let dir = TempDir::new().unwrap();

        fs::create_dir_all(dir.path().join("src/lib")).unwrap();
        fs::write(dir.path().join("src/app.js"), "let a=1;").unwrap();
        fs::write(dir.path().join("src/lib/util.js"), "\u{FEFF}let b=2;\n").unwrap();
        fs::write(dir.path().join("src/app.test.js"), "test();\n").unwrap();
        fs::write(dir.path().join("README.md"), "# readme\n").unwrap();

        dir
    }

    #[test]
    fn test_bundler_build() {
        let dir = create_test_project();

        let report = Bundler::new(dir.path())
            .exclude_files(["*.test.js"])
            .build()
            .unwrap();

        assert_eq!(report.artifact_path, dir.path().join("wwwroot/site.min.js"));
        assert_eq!(report.map_path, dir.path().join("wwwroot/site.min.js.map"));
        assert_eq!(report.source_count, 2);
        assert_eq!(
            report.files,
            vec![
                FileSummary {
                    path: PathBuf::from("src/app.js"),
                    lines: 1,
                    bytes: 8,
                },
                FileSummary {
                    path: PathBuf::from("src/lib/util.js"),
                    lines: 1,
                    bytes: 12,
                },
            ]
        );

        let artifact = fs::read_to_string(&report.artifact_path).unwrap();
        assert_eq!(
            artifact,
            "let a=1;\nlet b=2;\n\n//# sourceMappingURL=site.min.js.map\n"
        );

        let map = SourceMap::from_json(&fs::read_to_string(&report.map_path).unwrap()).unwrap();
        assert_eq!(map.file, "site.min.js");
        assert_eq!(map.source_root, "../");
        assert_eq!(map.sources, vec!["src/app.js", "src/lib/util.js"]);

        let second = map.lookup(2, 4).unwrap().unwrap();
        assert_eq!((second.source.as_str(), second.line, second.column), ("src/lib/util.js", 1, 4));
    }

    #[test]
    fn test_rebuild_skips_previous_output() {
        let dir = create_test_project();

        let first = Bundler::new(dir.path()).build().unwrap();
        let first_artifact = fs::read_to_string(&first.artifact_path).unwrap();

        let second = Bundler::new(dir.path()).build().unwrap();
        let second_artifact = fs::read_to_string(&second.artifact_path).unwrap();

        assert_eq!(first_artifact, second_artifact);
        assert_eq!(second.files.len(), 3);
    }

    #[test]
    fn test_output_dir_outside_default_is_excluded() {
        let dir = create_test_project();

        let bundler = Bundler::new(dir.path()).output_dir("src/dist");
        fs::create_dir_all(dir.path().join("src/dist")).unwrap();
        fs::write(dir.path().join("src/dist/old.js"), "old();").unwrap();

        let planned = bundler.plan().unwrap();
        assert!(!planned.iter().any(|p| p.starts_with("src/dist")));

        let report = bundler.build().unwrap();
        let map = SourceMap::from_json(&fs::read_to_string(&report.map_path).unwrap()).unwrap();
        assert_eq!(map.source_root, "../../");
    }

    #[test]
    fn test_rebuild_with_parent_segments_in_output_dir() {
        let dir = create_test_project();

        let first = Bundler::new(dir.path()).output_dir("src/../dist").build().unwrap();
        let second = Bundler::new(dir.path()).output_dir("src/../dist").build().unwrap();

        assert_eq!(first.files, second.files);
        assert!(!second.files.iter().any(|f| f.path.starts_with("dist")));
        assert_eq!(
            fs::read_to_string(&first.artifact_path).unwrap(),
            fs::read_to_string(&second.artifact_path).unwrap()
        );
    }

    #[test]
    fn test_read_sources_keeps_order() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..16).rev().map(|i| PathBuf::from(format!("f{i}.js"))).collect();
        for path in &paths {
            fs::write(dir.path().join(path), path.to_string_lossy().as_bytes()).unwrap();
        }

        let files = read_sources(dir.path(), &paths).unwrap();

        let read: Vec<&PathBuf> = files.iter().map(|f| &f.path).collect();
        assert_eq!(read, paths.iter().collect::<Vec<_>>());
        assert_eq!(files[0].text, "f15.js");
    }

    #[test]
    fn test_stylesheet_bundle() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.css"), "a {}\n").unwrap();
        fs::write(dir.path().join("b.css"), "b {}\n").unwrap();

        let report = Bundler::new(dir.path())
            .output_dir(".")
            .output_file("site.css")
            .extension(".css")
            .density(MappingDensity::Line)
            .build()
            .unwrap();

        assert_eq!(report.mapping_count, 2);
        assert_eq!(report.density, "line");

        let artifact = fs::read_to_string(&report.artifact_path).unwrap();
        assert_eq!(artifact, "a {}\nb {}\n\n/*# sourceMappingURL=site.css.map*/\n");

        let map = SourceMap::from_json(&fs::read_to_string(&report.map_path).unwrap()).unwrap();
        assert_eq!(map.source_root, "");
        assert_eq!(map.sources, vec!["a.css", "b.css"]);

        // The artifact sits in the root, so a rebuild must not pick it up
        let rebuilt = Bundler::new(dir.path())
            .output_dir(".")
            .output_file("site.css")
            .extension(".css")
            .build()
            .unwrap();
        assert_eq!(rebuilt.files.len(), 2);
    }

    #[test]
    fn test_no_files_found() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "nothing").unwrap();

        let result = Bundler::new(dir.path()).build();
        assert!(matches!(result, Err(CatmapError::NoFilesFound(_))));
        assert!(!dir.path().join("wwwroot").exists());
    }

    #[test]
    fn test_missing_root() {
        let result = Bundler::new("/nonexistent/project").build();
        assert!(matches!(result, Err(CatmapError::PathNotFound(_))));
    }

    #[test]
    fn test_read_sources_rejects_non_utf8() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.js"), [0xff, 0xfe, 0x00]).unwrap();

        let result = read_sources(dir.path(), &[PathBuf::from("bad.js")]);
        assert!(matches!(result, Err(CatmapError::Read { .. })));
    }

    #[test]
    fn test_bundle_sources_same_path_twice() {
        let files = [InputFile::new("x", "one"), InputFile::new("x", "two")];
        let bundle =
            bundle_sources(Path::new("out.js"), &files, MappingDensity::Character, "").unwrap();

        assert_eq!(bundle.artifact, "one\ntwo\n");
        assert_eq!(bundle.map.sources, vec!["x"]);
        assert!(bundle
            .map
            .decoded_mappings()
            .unwrap()
            .iter()
            .all(|m| m.source_index == 0));
    }
}
