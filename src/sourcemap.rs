//! Source map (revision 3) serialization.
//!
//! Turns a [`MappingStore`] into the JSON interchange document, and reads
//! such documents back for position lookups.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mapping::{Mapping, MappingStore};
use crate::vlq::{self, VlqError};

/// The only revision this crate reads or writes.
pub const SOURCE_MAP_VERSION: u32 = 3;

/// Errors from building or reading a source map.
#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("mapping at {line}:{column} references source {index}, but only {len} sources exist")]
    SourceIndexOutOfBounds {
        line: u32,
        column: u32,
        index: u32,
        len: usize,
    },

    #[error("mapping at {line}:{column} references name {index}, but only {len} names exist")]
    NameIndexOutOfBounds {
        line: u32,
        column: u32,
        index: u32,
        len: usize,
    },

    #[error("mapping at {line}:{column} has a zero line number")]
    ZeroLine { line: u32, column: u32 },

    #[error("mapping at {line}:{column}: {source}")]
    Vlq {
        line: u32,
        column: u32,
        #[source]
        source: VlqError,
    },

    #[error("malformed mappings on generated line {line}: {source}")]
    Decode {
        line: u32,
        #[source]
        source: VlqError,
    },

    #[error("invalid segment {segment:?} on generated line {line}: {reason}")]
    InvalidSegment {
        line: u32,
        segment: String,
        reason: &'static str,
    },

    #[error("unsupported source map version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid source map JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A revision 3 source map document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub source_root: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
}

/// Where a generated position came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginalPosition {
    pub source: String,
    /// 1-based.
    pub line: u32,
    /// 0-based.
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SourceMap {
    /// Parse a map document.
    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        let map: SourceMap = serde_json::from_str(json)?;
        if map.version != SOURCE_MAP_VERSION {
            return Err(SourceMapError::UnsupportedVersion(map.version));
        }
        Ok(map)
    }

    /// Render as compact JSON.
    pub fn to_json(&self) -> Result<String, SourceMapError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the `mappings` field.
    pub fn decoded_mappings(&self) -> Result<Vec<Mapping>, SourceMapError> {
        decode_mappings(&self.mappings)
    }

    /// Resolve a generated position (1-based line, 0-based column).
    ///
    /// Picks the closest mapping at or before `column` on the same line.
    pub fn lookup(&self, line: u32, column: u32) -> Result<Option<OriginalPosition>, SourceMapError> {
        let mappings = self.decoded_mappings()?;

        let Some(found) = mappings
            .iter()
            .filter(|m| m.generated_line == line && m.generated_column <= column)
            .max_by_key(|m| m.generated_column)
        else {
            return Ok(None);
        };

        let source = self
            .sources
            .get(found.source_index as usize)
            .ok_or(SourceMapError::SourceIndexOutOfBounds {
                line: found.generated_line,
                column: found.generated_column,
                index: found.source_index,
                len: self.sources.len(),
            })?
            .clone();

        let name = match found.name_index {
            Some(index) => Some(
                self.names
                    .get(index as usize)
                    .ok_or(SourceMapError::NameIndexOutOfBounds {
                        line: found.generated_line,
                        column: found.generated_column,
                        index,
                        len: self.names.len(),
                    })?
                    .clone(),
            ),
            None => None,
        };

        Ok(Some(OriginalPosition {
            source,
            line: found.original_line,
            column: found.original_column,
            name,
        }))
    }
}

/// Serialize a finished store into a map document.
///
/// # Examples
///
/// ```
/// use catmap::concat::{concatenate, InputFile, MappingDensity};
/// use catmap::sourcemap::serialize;
///
/// let files = [InputFile::new("a.js", "x")];
/// let result = concatenate("out.js", &files, MappingDensity::Character);
/// let map = serialize(&result.store, "").unwrap();
///
/// assert_eq!(map.sources, vec!["a.js"]);
/// assert_eq!(map.mappings, "AAAA,CAAC");
/// ```
pub fn serialize(store: &MappingStore, source_root: &str) -> Result<SourceMap, SourceMapError> {
    let mappings = encode_mappings(store)?;

    tracing::debug!(
        mappings = store.len(),
        encoded_bytes = mappings.len(),
        "encoded mappings"
    );

    Ok(SourceMap {
        version: SOURCE_MAP_VERSION,
        file: store.file().to_string(),
        source_root: source_root.to_string(),
        sources: store.sources().iter().map(|s| s.to_string()).collect(),
        names: store.names().iter().map(|n| n.to_string()).collect(),
        mappings,
        sources_content: store
            .has_source_content()
            .then(|| store.sources_content().to_vec()),
    })
}

/// Encode the store's mappings as the `mappings` string.
///
/// Mappings are stably sorted by generated position, then delta-encoded
/// against the previous record.
pub fn encode_mappings(store: &MappingStore) -> Result<String, SourceMapError> {
    let mut sorted: Vec<&Mapping> = store.mappings().iter().collect();
    sorted.sort_by_key(|m| (m.generated_line, m.generated_column));

    let mut out = String::with_capacity(sorted.len() * 5);

    let mut prev_generated_line = 1u32;
    let mut prev_generated_column = 0i64;
    let mut prev_source = 0i64;
    let mut prev_original_line = 1i64;
    let mut prev_original_column = 0i64;
    let mut prev_name = 0i64;
    let mut line_has_segment = false;

    for mapping in sorted {
        check_bounds(store, mapping)?;

        if mapping.generated_line > prev_generated_line {
            for _ in prev_generated_line..mapping.generated_line {
                out.push(';');
            }
            prev_generated_line = mapping.generated_line;
            prev_generated_column = 0;
            line_has_segment = false;
        }

        if line_has_segment {
            out.push(',');
        }
        line_has_segment = true;

        let push = |out: &mut String, value: i64| {
            vlq::encode_into(value, out).map_err(|source| SourceMapError::Vlq {
                line: mapping.generated_line,
                column: mapping.generated_column,
                source,
            })
        };

        let generated_column = i64::from(mapping.generated_column);
        push(&mut out, generated_column - prev_generated_column)?;
        prev_generated_column = generated_column;

        let source = i64::from(mapping.source_index);
        let original_line = i64::from(mapping.original_line);
        let original_column = i64::from(mapping.original_column);
        push(&mut out, source - prev_source)?;
        push(&mut out, original_line - prev_original_line)?;
        push(&mut out, original_column - prev_original_column)?;
        prev_source = source;
        prev_original_line = original_line;
        prev_original_column = original_column;

        if let Some(name_index) = mapping.name_index {
            let name = i64::from(name_index);
            push(&mut out, name - prev_name)?;
            prev_name = name;
        }
    }

    Ok(out)
}

fn check_bounds(store: &MappingStore, mapping: &Mapping) -> Result<(), SourceMapError> {
    let (line, column) = (mapping.generated_line, mapping.generated_column);

    if mapping.generated_line == 0 || mapping.original_line == 0 {
        return Err(SourceMapError::ZeroLine { line, column });
    }

    if mapping.source_index as usize >= store.sources().len() {
        return Err(SourceMapError::SourceIndexOutOfBounds {
            line,
            column,
            index: mapping.source_index,
            len: store.sources().len(),
        });
    }

    if let Some(index) = mapping.name_index {
        if index as usize >= store.names().len() {
            return Err(SourceMapError::NameIndexOutOfBounds {
                line,
                column,
                index,
                len: store.names().len(),
            });
        }
    }

    Ok(())
}

/// Decode a `mappings` string back into records.
///
/// Single-field segments (generated column only) carry no origin and are
/// skipped after advancing the column.
pub fn decode_mappings(mappings: &str) -> Result<Vec<Mapping>, SourceMapError> {
    let mut result = Vec::new();

    let mut source = 0i64;
    let mut original_line = 1i64;
    let mut original_column = 0i64;
    let mut name = 0i64;

    for (line_index, line) in mappings.split(';').enumerate() {
        let generated_line = line_index as u32 + 1;
        let mut generated_column = 0i64;

        for segment in line.split(',').filter(|s| !s.is_empty()) {
            let values = vlq::decode_segment(segment).map_err(|source| SourceMapError::Decode {
                line: generated_line,
                source,
            })?;

            let invalid = |reason| SourceMapError::InvalidSegment {
                line: generated_line,
                segment: segment.to_string(),
                reason,
            };

            if !matches!(values.len(), 1 | 4 | 5) {
                return Err(invalid("expected 1, 4 or 5 fields"));
            }

            generated_column += values[0];
            if values.len() == 1 {
                continue;
            }

            source += values[1];
            original_line += values[2];
            original_column += values[3];

            let name_index = if values.len() == 5 {
                name += values[4];
                Some(u32::try_from(name).map_err(|_| invalid("negative name index"))?)
            } else {
                None
            };

            result.push(Mapping {
                generated_line,
                generated_column: u32::try_from(generated_column)
                    .map_err(|_| invalid("negative generated column"))?,
                source_index: u32::try_from(source).map_err(|_| invalid("negative source index"))?,
                original_line: u32::try_from(original_line)
                    .ok()
                    .filter(|&l| l > 0)
                    .ok_or_else(|| invalid("original line before line 1"))?,
                original_column: u32::try_from(original_column)
                    .map_err(|_| invalid("negative original column"))?,
                name_index,
            });
        }
    }

    Ok(result)
}

/// Kind of artifact, which decides the trailer comment syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactKind {
    #[default]
    Script,
    Stylesheet,
}

impl ArtifactKind {
    /// Guess from the artifact's extension (`.css` is a stylesheet).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("css") => ArtifactKind::Stylesheet,
            _ => ArtifactKind::Script,
        }
    }

    /// The directive appended to the artifact to link its map.
    pub fn trailer(self, map_file_name: &str) -> String {
        match self {
            ArtifactKind::Script => format!("\n//# sourceMappingURL={}\n", map_file_name),
            ArtifactKind::Stylesheet => format!("\n/*# sourceMappingURL={}*/\n", map_file_name),
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Script => write!(f, "script"),
            ArtifactKind::Stylesheet => write!(f, "stylesheet"),
        }
    }
}

/// `<artifact file name>.map`.
pub fn map_file_name(artifact_path: &Path) -> String {
    let name = artifact_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}.map", name)
}

/// Path of the map written next to the artifact.
pub fn map_path(artifact_path: &Path) -> PathBuf {
    artifact_path.with_file_name(map_file_name(artifact_path))
}
