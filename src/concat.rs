//! Concatenation engine.
//!
//! Folds an ordered list of files into one artifact while recording where
//! every generated position came from. The generated cursor is owned here and
//! only moves forward.

use std::path::{Path, PathBuf};

use crate::mapping::{Mapping, MappingStore};

/// Byte-order mark, stripped from the start of every input.
pub const BOM: char = '\u{FEFF}';

/// How many mappings to emit per input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MappingDensity {
    /// One mapping per character plus one for the end of each line.
    #[default]
    Character,
    /// One mapping per line, at column 0 on both sides.
    Line,
}

impl std::fmt::Display for MappingDensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingDensity::Character => write!(f, "character"),
            MappingDensity::Line => write!(f, "line"),
        }
    }
}

impl std::str::FromStr for MappingDensity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "character" | "char" => Ok(MappingDensity::Character),
            "line" => Ok(MappingDensity::Line),
            _ => Err(format!("unknown mapping density: {}", s)),
        }
    }
}

/// An input file already read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Path used as the source identifier (usually root-relative).
    pub path: PathBuf,
    pub text: String,
}

impl InputFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Output of a finished concatenation.
#[derive(Debug, Clone)]
pub struct Concatenation {
    /// Every input's text in order, each newline-terminated.
    pub artifact: String,
    /// Mappings and tables describing `artifact`.
    pub store: MappingStore,
}

/// Streams files into one buffer and records mappings as it goes.
///
/// # Examples
///
/// ```
/// use catmap::concat::{Concatenator, MappingDensity};
///
/// let mut concat = Concatenator::new("dist/app.js", MappingDensity::Character);
/// concat.push("a.js", "x");
/// concat.push("b.js", "y\n");
///
/// let result = concat.finish();
/// assert_eq!(result.artifact, "x\ny\n");
/// ```
#[derive(Debug)]
pub struct Concatenator {
    density: MappingDensity,
    artifact: String,
    store: MappingStore,
    line: u32,
    column: u32,
}

impl Concatenator {
    /// Start an empty build for the artifact at `artifact_path`.
    pub fn new(artifact_path: impl AsRef<Path>, density: MappingDensity) -> Self {
        Self {
            density,
            artifact: String::new(),
            store: MappingStore::new(artifact_path),
            line: 1,
            column: 0,
        }
    }

    pub fn density(&self) -> MappingDensity {
        self.density
    }

    /// Current generated `(line, column)`.
    pub fn cursor(&self) -> (u32, u32) {
        (self.line, self.column)
    }

    pub fn push_file(&mut self, file: &InputFile) {
        self.push(&file.path, &file.text);
    }

    /// Append one file and record its mappings.
    pub fn push(&mut self, path: impl AsRef<Path>, text: &str) {
        let path = path.as_ref();
        let text = strip_bom(text);
        let source_index = self.store.add_source(path);
        let first_line = self.line;

        for (line_index, line) in split_lines(text).enumerate() {
            let original_line = line_index as u32 + 1;

            match self.density {
                MappingDensity::Character => {
                    let mut original_column = 0;
                    for ch in line.chars() {
                        self.record(source_index, original_line, original_column);
                        let width = ch.len_utf16() as u32;
                        self.column += width;
                        original_column += width;
                    }
                    // End-of-line position, also covers the newline appended below
                    self.record(source_index, original_line, original_column);
                }
                MappingDensity::Line => self.record(source_index, original_line, 0),
            }

            self.line += 1;
            self.column = 0;
        }

        self.artifact.push_str(text);
        if !text.ends_with('\n') {
            self.artifact.push('\n');
        }

        self.store.set_source_content(path, text);

        tracing::debug!(
            source = %path.display(),
            first_line,
            last_line = self.line - 1,
            "appended source"
        );
    }

    /// Finish the build, handing over the artifact and its mappings.
    pub fn finish(self) -> Concatenation {
        tracing::debug!(
            mappings = self.store.len(),
            sources = self.store.sources().len(),
            density = %self.density,
            "concatenation finished"
        );

        Concatenation {
            artifact: self.artifact,
            store: self.store,
        }
    }

    fn record(&mut self, source_index: u32, original_line: u32, original_column: u32) {
        self.store.push(Mapping {
            generated_line: self.line,
            generated_column: self.column,
            source_index,
            original_line,
            original_column,
            name_index: None,
        });
    }
}

/// Concatenate `files` in order.
pub fn concatenate<'a>(
    artifact_path: impl AsRef<Path>,
    files: impl IntoIterator<Item = &'a InputFile>,
    density: MappingDensity,
) -> Concatenation {
    let mut concat = Concatenator::new(artifact_path, density);
    for file in files {
        concat.push_file(file);
    }
    concat.finish()
}

/// Drop a leading byte-order mark.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix(BOM).unwrap_or(text)
}

/// Lines of `text` without terminators.
///
/// A final `\n` ends the last line rather than starting a new one, and empty
/// text is a single empty line, matching the newline-terminated artifact.
fn split_lines(text: &str) -> std::str::Split<'_, char> {
    text.strip_suffix('\n').unwrap_or(text).split('\n')
}
