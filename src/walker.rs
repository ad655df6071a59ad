//! Source discovery.
//!
//! Uses the `ignore` crate to walk the project root, honoring .gitignore,
//! .git/info/exclude, the global gitignore and `.catmapignore` files, then
//! narrows the result down to bundle inputs by extension and exclusion rules.

use std::path::{Path, PathBuf};

use glob::Pattern;
use ignore::WalkBuilder;
use thiserror::Error;

/// Per-directory ignore file, gitignore syntax.
pub const IGNORE_FILE_NAME: &str = ".catmapignore";

/// Directories skipped unless the caller replaces the defaults.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &["node_modules", "bin", "obj"];

/// Errors that can occur during source discovery.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("path not found: {path}")]
    NotFound { path: PathBuf },

    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("symlink loop detected: {path}")]
    SymlinkLoop { path: PathBuf },

    #[error("invalid exclude pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Options for directory walking.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Maximum depth to recurse (None = unlimited).
    pub max_depth: Option<usize>,
    /// Follow symbolic links.
    pub follow_symlinks: bool,
    /// Include hidden files and directories.
    pub include_hidden: bool,
    /// Respect .gitignore patterns.
    pub respect_gitignore: bool,
    /// Root-relative paths whose whole subtree is skipped.
    pub exclude_dirs: Vec<PathBuf>,
    /// Entries whose file name matches are skipped; matching directories are pruned.
    pub exclude_names: Vec<Pattern>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            follow_symlinks: false,
            include_hidden: false,
            respect_gitignore: true,
            exclude_dirs: Vec::new(),
            exclude_names: Vec::new(),
        }
    }
}

impl WalkOptions {
    /// Create options that include hidden files.
    pub fn with_hidden() -> Self {
        Self {
            include_hidden: true,
            ..Default::default()
        }
    }

    /// Set maximum depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

/// Entry from directory walk.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Path to the entry.
    pub path: PathBuf,
    /// Whether this is a file or directory.
    pub is_file: bool,
}

/// Walk a directory tree, yielding entries in file-name order.
///
/// # Examples
///
/// ```no_run
/// use catmap::walker::{walk_with_options, WalkOptions};
/// use std::path::Path;
///
/// for entry in walk_with_options(Path::new("."), &WalkOptions::default()).flatten() {
///     println!("{}", entry.path.display());
/// }
/// ```
pub fn walk_with_options(
    root: &Path,
    options: &WalkOptions,
) -> impl Iterator<Item = Result<WalkEntry, WalkError>> {
    let root = root.to_path_buf();

    if !root.exists() {
        return itertools_lite::Either::Left(std::iter::once(Err(WalkError::NotFound {
            path: root,
        })));
    }

    let mut builder = WalkBuilder::new(&root);

    builder
        .hidden(!options.include_hidden)
        .parents(options.respect_gitignore)
        .git_ignore(options.respect_gitignore)
        .git_global(options.respect_gitignore)
        .git_exclude(options.respect_gitignore)
        .follow_links(options.follow_symlinks)
        .add_custom_ignore_filename(IGNORE_FILE_NAME)
        .sort_by_file_name(|a, b| a.cmp(b));

    if let Some(depth) = options.max_depth {
        builder.max_depth(Some(depth));
    }

    if !options.exclude_dirs.is_empty() || !options.exclude_names.is_empty() {
        let filter_root = root.clone();
        let excluded = options.exclude_dirs.clone();
        let names = options.exclude_names.clone();
        builder.filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            if is_excluded(&filter_root, &excluded, entry.path()) {
                return false;
            }
            let matched = entry
                .file_name()
                .to_str()
                .is_some_and(|name| names.iter().any(|p| p.matches(name)));
            if matched {
                tracing::debug!(path = %entry.path().display(), "excluded by pattern");
            }
            !matched
        });
    }

    let walker = builder.build();

    itertools_lite::Either::Right(walker.filter_map(|result| match result {
        Ok(entry) => Some(Ok(WalkEntry {
            path: entry.path().to_path_buf(),
            is_file: entry.file_type().is_some_and(|ft| ft.is_file()),
        })),
        Err(e) => convert_error(e, None),
    }))
}

/// Component-wise prefix test against the excluded root-relative paths.
fn is_excluded(root: &Path, excluded: &[PathBuf], path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    !relative.as_os_str().is_empty() && excluded.iter().any(|dir| relative.starts_with(dir))
}

fn convert_error(error: ignore::Error, path: Option<PathBuf>) -> Option<Result<WalkEntry, WalkError>> {
    match error {
        ignore::Error::WithPath { path, err } => convert_error(*err, Some(path)),
        ignore::Error::WithDepth { err, .. } => convert_error(*err, path),
        ignore::Error::Loop { child, .. } => Some(Err(WalkError::SymlinkLoop { path: child })),
        ignore::Error::Io(io_err) => {
            let path = path.unwrap_or_else(|| PathBuf::from("<walk error>"));
            if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                Some(Err(WalkError::PermissionDenied { path }))
            } else {
                Some(Err(WalkError::Io {
                    path,
                    source: io_err,
                }))
            }
        }
        // Skip non-IO errors (like ignore-file parse errors)
        _ => None,
    }
}

/// What counts as a bundle input.
#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    /// Required file name suffix, e.g. `.js`. Empty accepts every file.
    pub extension: String,
    /// Wildcard patterns matched against file names.
    pub exclude_files: Vec<String>,
    pub walk: WalkOptions,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            extension: ".js".to_string(),
            exclude_files: Vec::new(),
            walk: WalkOptions {
                exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(PathBuf::from).collect(),
                ..Default::default()
            },
        }
    }
}

/// Find bundle inputs under `root`, returned root-relative in walk order.
pub fn discover(root: &Path, options: &DiscoverOptions) -> Result<Vec<PathBuf>, WalkError> {
    if !root.exists() {
        return Err(WalkError::NotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(WalkError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let mut walk = options.walk.clone();
    for rule in &options.exclude_files {
        walk.exclude_names.push(wildcard_pattern(rule)?);
    }

    let mut files = Vec::new();
    for entry in walk_with_options(root, &walk) {
        let entry = entry?;
        if !entry.is_file {
            continue;
        }

        let Some(name) = entry.path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(options.extension.as_str()) {
            continue;
        }

        let relative = entry
            .path
            .strip_prefix(root)
            .unwrap_or(&entry.path)
            .to_path_buf();
        files.push(relative);
    }

    Ok(files)
}

/// Compile an exclude rule where `*` matches any run of characters and
/// everything else, including `?` and `[`, is literal.
pub fn wildcard_pattern(rule: &str) -> Result<Pattern, WalkError> {
    let mut escaped = String::with_capacity(rule.len() + 8);
    for (i, piece) in rule.split('*').enumerate() {
        // a run of stars is one wildcard
        if i > 0 && !escaped.ends_with('*') {
            escaped.push('*');
        }
        escaped.push_str(&Pattern::escape(piece));
    }

    Pattern::new(&escaped).map_err(|source| WalkError::InvalidPattern {
        pattern: rule.to_string(),
        source,
    })
}

/// Simple Either type to avoid adding itertools dependency.
mod itertools_lite {
    pub enum Either<L, R> {
        Left(L),
        Right(R),
    }

    impl<L, R, T> Iterator for Either<L, R>
    where
        L: Iterator<Item = T>,
        R: Iterator<Item = T>,
    {
        type Item = T;

        fn next(&mut self) -> Option<Self::Item> {
            match self {
                Either::Left(l) => l.next(),
                Either::Right(r) => r.next(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, relative: &str, contents: &str) {
        let path = dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();

        write(&dir, "src/z.js", "z();");
        write(&dir, "src/a.js", "a();");
        write(&dir, "lib/util.js", "util();");
        write(&dir, "styles/site.css", "body {}");
        write(&dir, "node_modules/dep/index.js", "dep();");
        write(&dir, "bin/tool.js", "tool();");
        write(&dir, "bin.js", "main();");

        dir
    }

    #[test]
    fn test_discover_filters_and_orders() {
        let dir = create_test_dir();

        let files = discover(dir.path(), &DiscoverOptions::default()).unwrap();

        assert_eq!(
            files,
            vec![
                PathBuf::from("bin.js"),
                PathBuf::from("lib/util.js"),
                PathBuf::from("src/a.js"),
                PathBuf::from("src/z.js"),
            ]
        );
    }

    #[test]
    fn test_discover_other_extension() {
        let dir = create_test_dir();

        let options = DiscoverOptions {
            extension: ".css".to_string(),
            ..Default::default()
        };
        let files = discover(dir.path(), &options).unwrap();

        assert_eq!(files, vec![PathBuf::from("styles/site.css")]);
    }

    #[test]
    fn test_discover_exclude_files_wildcard() {
        let dir = create_test_dir();
        write(&dir, "src/app.test.js", "test();");

        let options = DiscoverOptions {
            exclude_files: vec!["*.test.js".to_string(), "z*".to_string()],
            ..Default::default()
        };
        let files = discover(dir.path(), &options).unwrap();

        assert!(files.contains(&PathBuf::from("src/a.js")));
        assert!(!files.contains(&PathBuf::from("src/app.test.js")));
        assert!(!files.contains(&PathBuf::from("src/z.js")));
    }

    #[test]
    fn test_discover_custom_exclude_dirs() {
        let dir = create_test_dir();

        let mut options = DiscoverOptions::default();
        options.walk.exclude_dirs = vec![PathBuf::from("src")];
        let files = discover(dir.path(), &options).unwrap();

        assert!(files.contains(&PathBuf::from("node_modules/dep/index.js")));
        assert!(files.contains(&PathBuf::from("bin/tool.js")));
        assert!(!files.iter().any(|f| f.starts_with("src")));
    }

    #[test]
    fn test_discover_respects_catmapignore() {
        let dir = create_test_dir();
        write(&dir, IGNORE_FILE_NAME, "lib/\n");

        let files = discover(dir.path(), &DiscoverOptions::default()).unwrap();

        assert!(!files.contains(&PathBuf::from("lib/util.js")));
        assert!(files.contains(&PathBuf::from("src/a.js")));
    }

    #[test]
    fn test_exclude_rule_brackets_are_literal() {
        let dir = TempDir::new().unwrap();
        write(&dir, "app[1].js", "a();");
        write(&dir, "app1.js", "b();");
        write(&dir, "keep.js", "c();");

        let options = DiscoverOptions {
            exclude_files: vec!["app[1].js".to_string()],
            ..Default::default()
        };
        let files = discover(dir.path(), &options).unwrap();

        assert_eq!(files, vec![PathBuf::from("app1.js"), PathBuf::from("keep.js")]);
    }

    #[test]
    fn test_exclude_rule_question_mark_is_literal() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a1.js", "a();");
        write(&dir, "a?.js", "b();");

        let options = DiscoverOptions {
            exclude_files: vec!["a?.js".to_string()],
            ..Default::default()
        };
        let files = discover(dir.path(), &options).unwrap();

        assert_eq!(files, vec![PathBuf::from("a1.js")]);
    }

    #[test]
    fn test_exclude_rule_prunes_directories() {
        let dir = TempDir::new().unwrap();
        write(&dir, "main.js", "main();");
        write(&dir, "tests/x.js", "x();");
        write(&dir, "src/testing/y.js", "y();");
        write(&dir, "src/z.js", "z();");

        let options = DiscoverOptions {
            exclude_files: vec!["test*".to_string()],
            ..Default::default()
        };
        let files = discover(dir.path(), &options).unwrap();

        assert_eq!(files, vec![PathBuf::from("main.js"), PathBuf::from("src/z.js")]);
    }

    #[test]
    fn test_exclude_rule_does_not_match_root() {
        let dir = TempDir::new().unwrap();
        write(&dir, "tests/x.js", "x();");

        let options = DiscoverOptions {
            exclude_files: vec!["test*".to_string()],
            ..Default::default()
        };
        let files = discover(&dir.path().join("tests"), &options).unwrap();

        assert_eq!(files, vec![PathBuf::from("x.js")]);
    }

    #[test]
    fn test_wildcard_pattern() {
        let pattern = wildcard_pattern("*.min.*").unwrap();
        assert!(pattern.matches("site.min.js"));
        assert!(!pattern.matches("site.js"));

        let pattern = wildcard_pattern("a**b").unwrap();
        assert!(pattern.matches("ab"));
        assert!(pattern.matches("a-x-b"));

        assert!(wildcard_pattern("[").unwrap().matches("["));
    }

    #[test]
    fn test_discover_missing_root() {
        let result = discover(Path::new("/nonexistent/path"), &DiscoverOptions::default());
        assert!(matches!(result, Err(WalkError::NotFound { .. })));
    }

    #[test]
    fn test_discover_root_is_file() {
        let dir = create_test_dir();
        let result = discover(&dir.path().join("bin.js"), &DiscoverOptions::default());
        assert!(matches!(result, Err(WalkError::NotADirectory { .. })));
    }

    #[test]
    fn test_walk_nonexistent() {
        let result: Vec<_> =
            walk_with_options(Path::new("/nonexistent/path"), &WalkOptions::default()).collect();
        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], Err(WalkError::NotFound { .. })));
    }

    #[test]
    fn test_walk_respects_gitignore() {
        let dir = TempDir::new().unwrap();

        // ignore crate needs a repository to apply .gitignore
        fs::create_dir(dir.path().join(".git")).unwrap();

        fs::write(dir.path().join("visible.js"), "// visible").unwrap();
        fs::write(dir.path().join("generated.js"), "// generated").unwrap();
        fs::write(dir.path().join(".gitignore"), "generated.js").unwrap();

        let entries: Vec<_> = walk_with_options(dir.path(), &WalkOptions::default())
            .filter_map(|r| r.ok())
            .collect();
        let paths: Vec<_> = entries.iter().map(|e| &e.path).collect();

        assert!(paths.iter().any(|p| p.ends_with("visible.js")));
        assert!(!paths.iter().any(|p| p.ends_with("generated.js")));

        let options = WalkOptions {
            respect_gitignore: false,
            ..Default::default()
        };
        let entries: Vec<_> = walk_with_options(dir.path(), &options)
            .filter_map(|r| r.ok())
            .collect();
        assert!(entries.iter().any(|e| e.path.ends_with("generated.js")));
    }

    #[test]
    fn test_walk_hidden_files() {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("visible.js"), "// visible").unwrap();
        fs::write(dir.path().join(".hidden.js"), "// hidden").unwrap();

        let entries: Vec<_> = walk_with_options(dir.path(), &WalkOptions::default())
            .filter_map(|r| r.ok())
            .collect();
        assert!(!entries.iter().any(|e| e.path.ends_with(".hidden.js")));

        let entries: Vec<_> = walk_with_options(dir.path(), &WalkOptions::with_hidden())
            .filter_map(|r| r.ok())
            .collect();
        assert!(entries.iter().any(|e| e.path.ends_with(".hidden.js")));
    }

    #[test]
    fn test_walk_max_depth() {
        let dir = TempDir::new().unwrap();

        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::write(dir.path().join("a/b/c/deep.js"), "").unwrap();
        fs::write(dir.path().join("a/shallow.js"), "").unwrap();

        let options = WalkOptions::default().max_depth(2);
        let entries: Vec<_> = walk_with_options(dir.path(), &options)
            .filter_map(|r| r.ok())
            .collect();

        let paths: Vec<_> = entries.iter().map(|e| &e.path).collect();
        assert!(paths.iter().any(|p| p.ends_with("shallow.js")));
        assert!(!paths.iter().any(|p| p.ends_with("deep.js")));
    }
}
