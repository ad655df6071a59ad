//! Catmap - concatenate source files into one bundle with a source map.
//!
//! Catmap walks a project, concatenates every matching file into a single
//! artifact and writes a revision 3 source map next to it, so debuggers and
//! error reporters can trace any generated line and column back to the file
//! it came from.
//!
//! # Quick Start
//!
//! ```no_run
//! use catmap::builder::Bundler;
//!
//! let report = Bundler::new("./my-project")
//!     .output_dir("wwwroot")
//!     .output_file("site.min.js")
//!     .exclude_dirs(["vendor"])
//!     .build()
//!     .unwrap();
//!
//! println!("Wrote {}", report.artifact_path.display());
//! ```
//!
//! # Modules
//!
//! - [`vlq`] - Base64 variable-length quantities
//! - [`mapping`] - Mapping records with source and name tables
//! - [`concat`] - Concatenation engine and generated cursor
//! - [`sourcemap`] - Map serialization, decoding and lookup
//! - [`walker`] - Source discovery with gitignore support
//! - [`output`] - Writing artifact, map and trailer
//! - [`builder`] - Fluent API for whole builds

pub mod vlq;
pub mod mapping;
pub mod concat;
pub mod sourcemap;
pub mod errors;
pub mod walker;
pub mod output;
pub mod builder;

// Re-export key types at crate root for convenience
pub use builder::{bundle_sources, Bundle, BundleReport, Bundler};
pub use concat::{concatenate, Concatenation, Concatenator, InputFile, MappingDensity};
pub use errors::CatmapError;
pub use mapping::{Mapping, MappingStore};
pub use output::OutputError;
pub use sourcemap::{ArtifactKind, OriginalPosition, SourceMap, SourceMapError};
pub use vlq::VlqError;
pub use walker::WalkError;
