//! Mapping records and the source/name tables they index into.
//!
//! A [`MappingStore`] lives for exactly one build: the concatenation engine
//! fills it, the serializer consumes it, and nothing persists afterwards.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use compact_str::CompactString;

/// One link from a generated position to an original position.
///
/// Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub source_index: u32,
    pub original_line: u32,
    pub original_column: u32,
    pub name_index: Option<u32>,
}

/// Append-only store of mappings plus the deduplicated Source and Name tables.
#[derive(Debug, Clone)]
pub struct MappingStore {
    file: CompactString,
    base_dir: PathBuf,
    sources: Vec<CompactString>,
    source_lookup: HashMap<CompactString, u32>,
    sources_content: Vec<Option<String>>,
    names: Vec<CompactString>,
    name_lookup: HashMap<CompactString, u32>,
    mappings: Vec<Mapping>,
}

impl MappingStore {
    /// Create an empty store for the artifact at `artifact_path`.
    ///
    /// Source identifiers are normalized relative to the artifact's directory.
    pub fn new(artifact_path: impl AsRef<Path>) -> Self {
        let artifact_path = artifact_path.as_ref();

        let file = artifact_path
            .file_name()
            .map(|n| CompactString::from(n.to_string_lossy()))
            .unwrap_or_default();

        let parent = match artifact_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let base_dir = std::path::absolute(&parent).unwrap_or(parent);

        Self {
            file,
            base_dir,
            sources: Vec::new(),
            source_lookup: HashMap::new(),
            sources_content: Vec::new(),
            names: Vec::new(),
            name_lookup: HashMap::new(),
            mappings: Vec::new(),
        }
    }

    /// Look up or insert a source, returning its table index.
    pub fn add_source(&mut self, path: impl AsRef<Path>) -> u32 {
        let normalized = CompactString::from(normalize_source_path(&self.base_dir, path.as_ref()));
        if let Some(&index) = self.source_lookup.get(&normalized) {
            return index;
        }

        let index = self.sources.len() as u32;
        self.sources.push(normalized.clone());
        self.sources_content.push(None);
        self.source_lookup.insert(normalized, index);
        index
    }

    /// Look up or insert a symbol name, returning its table index.
    pub fn add_name(&mut self, name: &str) -> u32 {
        if let Some(&index) = self.name_lookup.get(name) {
            return index;
        }

        let index = self.names.len() as u32;
        let name = CompactString::from(name);
        self.names.push(name.clone());
        self.name_lookup.insert(name, index);
        index
    }

    /// Record a mapping, resolving the source path and optional name.
    ///
    /// No ordering is enforced here; the serializer sorts.
    pub fn add_mapping(
        &mut self,
        generated_line: u32,
        generated_column: u32,
        source: impl AsRef<Path>,
        original_line: u32,
        original_column: u32,
        name: Option<&str>,
    ) {
        let source_index = self.add_source(source);
        let name_index = name.map(|n| self.add_name(n));

        self.mappings.push(Mapping {
            generated_line,
            generated_column,
            source_index,
            original_line,
            original_column,
            name_index,
        });
    }

    /// Append an already-resolved mapping.
    ///
    /// Table indices are checked when the store is serialized.
    pub fn push(&mut self, mapping: Mapping) {
        self.mappings.push(mapping);
    }

    /// Store the full text of a source for embedding in the map.
    ///
    /// A leading byte-order mark is dropped. Later calls for the same source
    /// replace earlier ones.
    pub fn set_source_content(&mut self, path: impl AsRef<Path>, text: impl Into<String>) {
        let index = self.add_source(path) as usize;
        let mut text = text.into();
        if text.starts_with(crate::concat::BOM) {
            text.remove(0);
        }
        self.sources_content[index] = Some(text);
    }

    /// Base name of the artifact this store describes.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Directory that source identifiers are relative to.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn sources(&self) -> &[CompactString] {
        &self.sources
    }

    pub fn names(&self) -> &[CompactString] {
        &self.names
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Snapshots, index-aligned with [`sources`](Self::sources).
    pub fn sources_content(&self) -> &[Option<String>] {
        &self.sources_content
    }

    /// Whether any source has an embedded snapshot.
    pub fn has_source_content(&self) -> bool {
        self.sources_content.iter().any(Option::is_some)
    }

    /// Number of mappings recorded.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Normalize a source path into a forward-slash identifier.
///
/// Absolute paths are made relative to `base_dir`; relative paths are taken
/// as already relative to it. `.` and `..` are resolved lexically.
pub fn normalize_source_path(base_dir: &Path, path: &Path) -> String {
    let parts = if path.is_absolute() {
        relative_to(&lexical_parts(path), &lexical_parts(base_dir))
    } else {
        lexical_parts(path)
    };

    let joined = parts
        .iter()
        .filter_map(|c| match c {
            Part::Normal(s) => Some(s.as_str()),
            Part::Parent => Some(".."),
            Part::Root(_) => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    match parts.first() {
        Some(Part::Root(root)) => format!("{root}{joined}"),
        _ if joined.is_empty() => ".".to_string(),
        _ => joined,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Root(String),
    Parent,
    Normal(String),
}

fn lexical_parts(path: &Path) -> Vec<Part> {
    let mut parts: Vec<Part> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                parts.push(Part::Root(prefix.as_os_str().to_string_lossy().replace('\\', "/")));
            }
            Component::RootDir => {
                if let Some(Part::Root(root)) = parts.last_mut() {
                    root.push('/');
                } else {
                    parts.push(Part::Root("/".to_string()));
                }
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(parts.last(), Some(Part::Normal(_))) {
                    parts.pop();
                } else if !matches!(parts.last(), Some(Part::Root(_))) {
                    // `/..` stays `/`
                    parts.push(Part::Parent);
                }
            }
            Component::Normal(name) => parts.push(Part::Normal(name.to_string_lossy().into_owned())),
        }
    }
    parts
}

fn relative_to(path: &[Part], base: &[Part]) -> Vec<Part> {
    // Different roots (e.g. drive letters) cannot be related.
    if path.first() != base.first() {
        return path.to_vec();
    }

    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    std::iter::repeat(Part::Parent)
        .take(base.len() - common)
        .chain(path[common..].iter().cloned())
        .collect()
}
